use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chainforge_core::errors::{DatabaseError, Error as CoreError};
use chainforge_core::group_goals::GroupGoalError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Core(#[from] CoreError),
    #[error("{0}")]
    Forbidden(String),
}

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    message: String,
}

fn group_goal_status(err: &GroupGoalError) -> StatusCode {
    match err {
        GroupGoalError::InvalidAmount(_)
        | GroupGoalError::AmountOverflow { .. }
        | GroupGoalError::EntryOutsidePeriod { .. }
        | GroupGoalError::InvalidTarget(_)
        | GroupGoalError::InvalidPeriodType(_) => StatusCode::BAD_REQUEST,
        GroupGoalError::NotPermitted { .. } => StatusCode::FORBIDDEN,
        GroupGoalError::NotEntitled(_) => StatusCode::PAYMENT_REQUIRED,
        GroupGoalError::GoalNotFound(_)
        | GroupGoalError::PeriodNotFound(_)
        | GroupGoalError::ProgressRowNotFound { .. } => StatusCode::NOT_FOUND,
        GroupGoalError::PeriodClosed(_)
        | GroupGoalError::DuplicateRow { .. }
        | GroupGoalError::PeriodTypeImmutable
        | GroupGoalError::NoActivePeriod(_)
        | GroupGoalError::PeriodAlreadyOpen(_) => StatusCode::CONFLICT,
        GroupGoalError::GoalTransition { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn core_status(err: &CoreError) -> StatusCode {
    match err {
        CoreError::GroupGoal(e) => group_goal_status(e),
        CoreError::Validation(_) => StatusCode::BAD_REQUEST,
        CoreError::Database(DatabaseError::NotFound(_)) => StatusCode::NOT_FOUND,
        CoreError::Database(DatabaseError::UniqueViolation(_)) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Core(e) => core_status(e),
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        let body = Json(ErrorBody {
            code: status.as_u16(),
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chainforge_core::errors::ValidationError;
    use rust_decimal::Decimal;

    fn status_of(err: impl Into<CoreError>) -> StatusCode {
        ApiError::from(err.into()).status()
    }

    #[test]
    fn engine_errors_map_to_http_statuses() {
        assert_eq!(
            status_of(GroupGoalError::InvalidAmount(Decimal::NEGATIVE_ONE)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(GroupGoalError::AmountOverflow {
                total: Decimal::MAX,
                amount: Decimal::ONE
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(GroupGoalError::PeriodClosed("p".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(GroupGoalError::NotEntitled("u".into())),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            status_of(GroupGoalError::NotPermitted {
                user_id: "u".into(),
                action: "manage".into()
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(GroupGoalError::GoalNotFound("g".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ValidationError::InvalidInput("name".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(CoreError::Repository("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
