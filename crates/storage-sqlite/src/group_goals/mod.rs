//! SQLite storage implementation for group goals.

mod model;
mod repository;

pub use model::{GroupGoalDB, GroupGoalPeriodDB, GroupGoalProgressDB, ProgressEntryDB};
pub use repository::GroupGoalRepository;
