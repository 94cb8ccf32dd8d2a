use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chainforge_core::group_goals::MemberRole;
use chainforge_server::{
    api::app_router, auth::UserRole, build_state, config::Config, AppState,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

const SECRET: &str = "0123456789abcdef0123456789abcdef";
const GOALS: &str = "/api/v1/groups/runners/goals";

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    _tmp: TempDir,
}

impl TestApp {
    fn token(&self, user: &str, role: UserRole) -> String {
        self.state
            .auth
            .as_ref()
            .unwrap()
            .issue_token(user, role)
            .unwrap()
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            let role = if user == "root" {
                UserRole::Admin
            } else {
                UserRole::User
            };
            builder = builder.header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.token(user, role)),
            );
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }
}

async fn test_app(extra: &[(&str, &str)]) -> TestApp {
    let tmp = tempdir().unwrap();
    let mut vars: HashMap<String, String> = HashMap::from([
        (
            "CF_DB_PATH".to_string(),
            tmp.path().join("test.db").to_string_lossy().to_string(),
        ),
        ("CF_JWT_SECRET".to_string(), SECRET.to_string()),
    ]);
    for (key, value) in extra {
        vars.insert(key.to_string(), value.to_string());
    }
    let config = Config::from_lookup(|key| vars.get(key).cloned()).unwrap();
    let state = build_state(&config).await.unwrap();

    let joined = Utc::now() - Duration::days(1);
    let members = &state.membership_repository;
    members
        .create_group("runners", "Runners", joined)
        .await
        .unwrap();
    members
        .add_member("runners", "alice", MemberRole::Owner, joined)
        .await
        .unwrap();
    members
        .add_member("runners", "bob", MemberRole::Member, joined)
        .await
        .unwrap();
    members
        .add_member("runners", "carol", MemberRole::Member, joined)
        .await
        .unwrap();

    TestApp {
        router: app_router(state.clone(), &config),
        state,
        _tmp: tmp,
    }
}

fn weekly_goal() -> Value {
    json!({
        "name": "Weekly distance",
        "description": "Run together",
        "unit": "km",
        "periodType": "weekly",
        "baseTarget": 10
    })
}

async fn create_goal(app: &TestApp) -> String {
    let (status, goal) = app
        .send(Method::POST, GOALS, Some("alice"), Some(weekly_goal()))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{goal}");
    goal["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_public_and_goals_require_a_token() {
    let app = test_app(&[]).await;

    let (status, _) = app.send(Method::GET, "/api/v1/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.send(Method::GET, GOALS, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 401);

    let request = Request::builder()
        .uri(GOALS)
        .header(header::AUTHORIZATION, "Bearer not-a-token")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn members_record_progress_and_see_the_leaderboard() {
    let app = test_app(&[]).await;
    let goal_id = create_goal(&app).await;
    let goal_uri = format!("{}/{}", GOALS, goal_id);

    let (status, goals) = app.send(Method::GET, GOALS, Some("carol"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(goals.as_array().unwrap().len(), 1);

    let (status, row) = app
        .send(
            Method::POST,
            &format!("{}/progress", goal_uri),
            Some("bob"),
            Some(json!({ "amount": 4, "note": "easy run" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{row}");
    assert_eq!(row["currentAmount"].as_f64(), Some(4.0));
    assert_eq!(row["dailyEntries"].as_array().unwrap().len(), 1);

    let (status, view) = app
        .send(Method::GET, &format!("{}/period", goal_uri), Some("bob"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["members"].as_array().unwrap().len(), 3);
    assert_eq!(view["totalProgress"].as_f64(), Some(4.0));
    assert_eq!(view["goal"]["id"], goal_id.as_str());

    let (status, board) = app
        .send(
            Method::GET,
            &format!("{}/leaderboard", goal_uri),
            Some("carol"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let rankings = board["rankings"].as_array().unwrap();
    assert_eq!(rankings[0]["userId"], "bob");
    assert_eq!(rankings[0]["rank"], 1);
    assert_eq!(rankings[0]["points"], 100);
    assert_eq!(rankings[1]["userId"], "alice");
    assert_eq!(rankings[1]["rank"], 2);
    assert_eq!(rankings[2]["userId"], "carol");
    assert_eq!(rankings[2]["rank"], 3);
    assert_eq!(rankings[2]["points"], 80);

    let (status, history) = app
        .send(Method::GET, &format!("{}/periods", goal_uri), Some("alice"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["participantCount"], 3);
}

#[tokio::test]
async fn engine_errors_become_http_statuses() {
    let app = test_app(&[]).await;
    let goal_id = create_goal(&app).await;
    let goal_uri = format!("{}/{}", GOALS, goal_id);

    let (status, body) = app
        .send(
            Method::POST,
            &format!("{}/progress", goal_uri),
            Some("bob"),
            Some(json!({ "amount": -1 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);

    let (status, _) = app
        .send(Method::POST, GOALS, Some("bob"), Some(weekly_goal()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(
            Method::POST,
            &format!("{}/target", goal_uri),
            Some("bob"),
            Some(json!({ "amount": 20 })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send(Method::GET, GOALS, Some("mallory"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(Method::GET, &format!("{}/missing", GOALS), Some("alice"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(
            Method::PUT,
            &goal_uri,
            Some("alice"),
            Some(json!({ "periodType": "monthly" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, goal) = app
        .send(
            Method::PUT,
            &goal_uri,
            Some("alice"),
            Some(json!({ "name": "Long runs" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(goal["name"], "Long runs");

    let (status, goal) = app
        .send(
            Method::POST,
            &format!("{}/target", goal_uri),
            Some("alice"),
            Some(json!({ "amount": 15 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(goal["baseTarget"].as_f64(), Some(15.0));
}

#[tokio::test]
async fn unentitled_users_get_payment_required() {
    let app = test_app(&[("CF_ENTITLED_USERS", "alice")]).await;
    let goal_id = create_goal(&app).await;

    let (status, body) = app
        .send(
            Method::POST,
            &format!("{}/{}/progress", GOALS, goal_id),
            Some("bob"),
            Some(json!({ "amount": 2 })),
        )
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["code"], 402);
}

#[tokio::test]
async fn only_admins_trigger_sweeps() {
    let app = test_app(&[]).await;
    create_goal(&app).await;

    let (status, _) = app
        .send(Method::POST, "/api/v1/admin/sweep", Some("alice"), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, report) = app
        .send(
            Method::POST,
            "/api/v1/admin/sweep?dryRun=true",
            Some("root"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{report}");
    assert_eq!(report["dryRun"], true);
    assert_eq!(report["goalsConsidered"], 1);
    assert_eq!(report["periodsOpened"], 0);
    assert_eq!(report["results"][0]["status"], "up_to_date");
}
