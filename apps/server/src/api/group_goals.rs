use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{auth::AuthUser, error::ApiResult, main_lib::AppState};
use chainforge_core::group_goals::{
    CurrentPeriodView, GroupGoal, GroupGoalProgress, GroupGoalUpdate, Leaderboard, NewGroupGoal,
    PeriodSummary, RecordProgress,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetBaseTargetRequest {
    amount: Decimal,
}

async fn list_goals(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(group_id): Path<String>,
) -> ApiResult<Json<Vec<GroupGoal>>> {
    let goals = state.goal_service.list_goals(&user.user_id, &group_id)?;
    Ok(Json(goals))
}

async fn create_goal(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(group_id): Path<String>,
    Json(mut new_goal): Json<NewGroupGoal>,
) -> ApiResult<(StatusCode, Json<GroupGoal>)> {
    new_goal.group_id = group_id;
    let goal = state
        .goal_service
        .create_goal(&user.user_id, new_goal, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(goal)))
}

async fn get_goal(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((group_id, goal_id)): Path<(String, String)>,
) -> ApiResult<Json<GroupGoal>> {
    let goal = state
        .goal_service
        .get_goal(&user.user_id, &group_id, &goal_id)?;
    Ok(Json(goal))
}

async fn update_goal(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((group_id, goal_id)): Path<(String, String)>,
    Json(update): Json<GroupGoalUpdate>,
) -> ApiResult<Json<GroupGoal>> {
    let goal = state
        .goal_service
        .update_goal(&user.user_id, &group_id, &goal_id, update)
        .await?;
    Ok(Json(goal))
}

async fn set_base_target(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((group_id, goal_id)): Path<(String, String)>,
    Json(body): Json<SetBaseTargetRequest>,
) -> ApiResult<Json<GroupGoal>> {
    let goal = state
        .goal_service
        .set_base_target(&user.user_id, &group_id, &goal_id, body.amount)
        .await?;
    Ok(Json(goal))
}

async fn record_progress(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((group_id, goal_id)): Path<(String, String)>,
    Json(input): Json<RecordProgress>,
) -> ApiResult<Json<GroupGoalProgress>> {
    let row = state
        .goal_service
        .record_progress(&user.user_id, &group_id, &goal_id, input, Utc::now())
        .await?;
    Ok(Json(row))
}

async fn get_current_period(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((group_id, goal_id)): Path<(String, String)>,
) -> ApiResult<Json<CurrentPeriodView>> {
    let view = state
        .goal_service
        .get_current_period(&user.user_id, &group_id, &goal_id, Utc::now())?;
    Ok(Json(view))
}

async fn list_period_history(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((group_id, goal_id)): Path<(String, String)>,
) -> ApiResult<Json<Vec<PeriodSummary>>> {
    let history = state
        .goal_service
        .list_period_history(&user.user_id, &group_id, &goal_id)?;
    Ok(Json(history))
}

async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((group_id, goal_id)): Path<(String, String)>,
) -> ApiResult<Json<Leaderboard>> {
    let leaderboard = state
        .goal_service
        .get_leaderboard(&user.user_id, &group_id, &goal_id, Utc::now())?;
    Ok(Json(leaderboard))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/groups/{group_id}/goals",
            get(list_goals).post(create_goal),
        )
        .route(
            "/groups/{group_id}/goals/{goal_id}",
            get(get_goal).put(update_goal),
        )
        .route(
            "/groups/{group_id}/goals/{goal_id}/target",
            post(set_base_target),
        )
        .route(
            "/groups/{group_id}/goals/{goal_id}/progress",
            post(record_progress),
        )
        .route(
            "/groups/{group_id}/goals/{goal_id}/period",
            get(get_current_period),
        )
        .route(
            "/groups/{group_id}/goals/{goal_id}/periods",
            get(list_period_history),
        )
        .route(
            "/groups/{group_id}/goals/{goal_id}/leaderboard",
            get(get_leaderboard),
        )
}
