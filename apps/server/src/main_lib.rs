use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use chainforge_core::group_goals::{
    GroupGoalService, GroupGoalServiceTrait, PeriodTransitionOrchestrator,
};
use chainforge_storage_sqlite::{db, GroupGoalRepository, GroupMembershipRepository};

use crate::auth::{decode_secret_key, AuthConfig, AuthManager};
use crate::config::Config;
use crate::entitlement::ConfiguredEntitlementGate;

/// Access tokens minted by this server are short lived; production tokens
/// come from the identity service with their own expiry.
const ACCESS_TOKEN_TTL_SECS: u64 = 60 * 60;

#[derive(Debug, Clone)]
pub struct SweepSettings {
    pub interval: Duration,
    pub initial_delay: Duration,
    pub timeout: Duration,
}

pub struct AppState {
    pub goal_service: Arc<dyn GroupGoalServiceTrait>,
    pub orchestrator: Arc<PeriodTransitionOrchestrator>,
    /// Membership is managed elsewhere; the handle is kept for seeding.
    pub membership_repository: Arc<GroupMembershipRepository>,
    pub auth: Option<Arc<AuthManager>>,
    pub sweep: SweepSettings,
    pub db_path: String,
}

pub fn init_tracing() {
    let log_format = std::env::var("CF_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let db_path = db::init(&config.db_path)?;
    tracing::info!("Database path in use: {}", db_path);
    let pool = db::create_pool(&db_path)?;
    db::run_migrations(&pool)?;
    let writer = db::spawn_writer(Arc::clone(&pool));

    let goal_repository = Arc::new(GroupGoalRepository::new(pool.clone(), writer.clone()));
    let membership_repository = Arc::new(GroupMembershipRepository::new(pool.clone(), writer));
    let entitlement = Arc::new(ConfiguredEntitlementGate::new(
        config.entitled_users.clone(),
    ));

    let orchestrator = Arc::new(PeriodTransitionOrchestrator::new(
        goal_repository.clone(),
        membership_repository.clone(),
        config.sweep.concurrency,
    ));
    let goal_service: Arc<dyn GroupGoalServiceTrait> = Arc::new(GroupGoalService::new(
        goal_repository,
        membership_repository.clone(),
        entitlement,
        orchestrator.clone(),
        config.points,
    ));

    let auth = match config.jwt_secret.as_deref() {
        Some(raw) => {
            let jwt_secret = decode_secret_key(raw)?;
            Some(Arc::new(AuthManager::new(&AuthConfig {
                jwt_secret,
                access_token_ttl: Duration::from_secs(ACCESS_TOKEN_TTL_SECS),
            })))
        }
        None => {
            tracing::warn!("CF_JWT_SECRET is not set; authenticated routes will be unavailable");
            None
        }
    };

    Ok(Arc::new(AppState {
        goal_service,
        orchestrator,
        membership_repository,
        auth,
        sweep: SweepSettings {
            interval: config.sweep.interval,
            initial_delay: config.sweep.initial_delay,
            timeout: config.sweep.timeout,
        },
        db_path,
    }))
}
