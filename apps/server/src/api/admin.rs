use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::post,
    Extension, Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    main_lib::AppState,
};
use chainforge_core::group_goals::{SweepOptions, SweepReport};

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct SweepQuery {
    #[serde(default)]
    dry_run: bool,
}

/// Runs the period sweep now. With `dryRun=true` nothing is written and the
/// report lists what a real sweep would finalize and open.
async fn trigger_sweep(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<SweepQuery>,
) -> ApiResult<Json<SweepReport>> {
    if !user.is_admin() {
        return Err(ApiError::Forbidden(
            "Only administrators can trigger a sweep".to_string(),
        ));
    }
    tracing::info!(
        "Sweep triggered by {}{}",
        user.user_id,
        if query.dry_run { " (dry run)" } else { "" }
    );
    let options = SweepOptions {
        dry_run: query.dry_run,
        timeout: Some(state.sweep.timeout),
    };
    let report = state.orchestrator.sweep(Utc::now(), options, None).await?;
    Ok(Json(report))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/admin/sweep", post(trigger_sweep))
}
