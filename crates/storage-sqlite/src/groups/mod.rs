//! Groups and their membership.

mod model;
mod repository;

pub use model::{GroupDB, GroupMemberDB};
pub use repository::GroupMembershipRepository;
