use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tower::ServiceExt;

use slotbook::config::AppConfig;
use slotbook::db::{self, queries};
use slotbook::handlers;
use slotbook::models::PaymentStatus;
use slotbook::services::calendar::CalendarProvider;
use slotbook::services::messaging::NotificationSender;
use slotbook::state::AppState;

// ── Mock Providers ──

struct MockCalendar {
    connected: HashSet<i64>,
    fail: bool,
    calls: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl CalendarProvider for MockCalendar {
    async fn is_connected(&self, owner_id: i64) -> anyhow::Result<bool> {
        Ok(self.connected.contains(&owner_id))
    }

    async fn create_event(
        &self,
        owner_id: i64,
        _title: &str,
        _start: NaiveDateTime,
        _end: NaiveDateTime,
    ) -> anyhow::Result<String> {
        if self.fail {
            anyhow::bail!("calendar API unavailable");
        }
        self.calls.lock().unwrap().push(format!("create:{owner_id}"));
        Ok(format!("evt-{owner_id}"))
    }

    async fn update_event(
        &self,
        owner_id: i64,
        event_id: &str,
        _title: &str,
        _start: NaiveDateTime,
        _end: NaiveDateTime,
    ) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("update:{owner_id}:{event_id}"));
        Ok(())
    }

    async fn delete_event(&self, owner_id: i64, event_id: &str) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("delete:{owner_id}:{event_id}"));
        Ok(())
    }
}

struct MockSender;

#[async_trait]
impl NotificationSender for MockSender {
    async fn send(&self, _to_email: &str, _subject: &str, _body: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

// ── Helpers ──

struct TestEnv {
    state: Arc<AppState>,
    calls: Arc<Mutex<Vec<String>>>,
    provider: i64,
    customer: i64,
    resource: i64,
}

fn test_env() -> TestEnv {
    test_env_with(false)
}

fn test_env_with(calendar_fails: bool) -> TestEnv {
    let conn = db::init_db(":memory:").unwrap();
    let provider = queries::create_user(&conn, "prov@example.com", "Pat", "Provider", None).unwrap();
    let customer = queries::create_user(&conn, "alice@example.com", "Alice", "Smith", None).unwrap();
    let resource = queries::create_resource(&conn, provider, "Chair 1", Some(40.0)).unwrap();

    let calls = Arc::new(Mutex::new(vec![]));
    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: AppConfig {
            database_url: ":memory:".to_string(),
            ..AppConfig::default()
        },
        calendar: Box::new(MockCalendar {
            connected: [provider].into_iter().collect(),
            fail: calendar_fails,
            calls: Arc::clone(&calls),
        }),
        notifier: Box::new(MockSender),
    });

    TestEnv {
        state,
        calls,
        provider,
        customer,
        resource,
    }
}

fn test_app(state: Arc<AppState>) -> Router {
    handlers::router(state)
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn booking_body(resource: i64, start: &str, end: &str) -> serde_json::Value {
    serde_json::json!({
        "resource_id": resource,
        "customer_name": "Alice Smith",
        "customer_email": "alice@example.com",
        "start_time": start,
        "end_time": end,
        "status": "confirmed",
    })
}

async fn send(state: &Arc<AppState>, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let res = test_app(Arc::clone(state)).oneshot(req).await.unwrap();
    let status = res.status();
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

async fn create(env: &TestEnv, start: &str, end: &str) -> i64 {
    let (status, json) = send(
        &env.state,
        json_request("POST", "/api/bookings", booking_body(env.resource, start, end)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json["value"]["id"].as_i64().unwrap()
}

// ── Health ──

#[tokio::test]
async fn test_health() {
    let env = test_env();
    let (status, json) = send(&env.state, empty_request("GET", "/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
}

// ── Create ──

#[tokio::test]
async fn test_create_booking() {
    let env = test_env();
    let (status, json) = send(
        &env.state,
        json_request(
            "POST",
            "/api/bookings",
            booking_body(env.resource, "2025-06-16T09:00:00", "2025-06-16T10:00:00"),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["value"]["status"], "confirmed");
    assert_eq!(json["value"]["payment_status"], "pending");
    // Resolved from the directory by email.
    assert_eq!(json["value"]["customer_id"], env.customer);
    assert_eq!(json["value"]["provider_event_id"], format!("evt-{}", env.provider));
    assert!(json["value"]["customer_event_id"].is_null());
    assert_eq!(json["suppressed"].as_array().unwrap().len(), 0);
    assert_eq!(
        env.calls.lock().unwrap().clone(),
        vec![format!("create:{}", env.provider)]
    );
}

#[tokio::test]
async fn test_calendar_failure_still_creates_booking() {
    let env = test_env_with(true);
    let (status, json) = send(
        &env.state,
        json_request(
            "POST",
            "/api/bookings",
            booking_body(env.resource, "2025-06-16T09:00:00", "2025-06-16T10:00:00"),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(json["value"]["provider_event_id"].is_null());
    let suppressed = json["suppressed"].as_array().unwrap();
    assert_eq!(suppressed.len(), 1);
    assert_eq!(suppressed[0]["party"], "provider");
    assert_eq!(suppressed[0]["action"], "create");
    assert!(suppressed[0]["reason"]
        .as_str()
        .unwrap()
        .contains("calendar API unavailable"));

    let id = json["value"]["id"].as_i64().unwrap();
    let (status, _) = send(&env.state, empty_request("GET", &format!("/api/bookings/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_create_uses_actor_header_as_customer() {
    let env = test_env();
    let other = {
        let conn = env.state.conn().unwrap();
        queries::create_user(&conn, "bob@example.com", "Bob", "Jones", None).unwrap()
    };

    let mut req = json_request(
        "POST",
        "/api/bookings",
        booking_body(env.resource, "2025-06-16T09:00:00", "2025-06-16T10:00:00"),
    );
    req.headers_mut()
        .insert("X-User-Id", other.to_string().parse().unwrap());
    let (status, json) = send(&env.state, req).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["value"]["customer_id"], other);
}

#[tokio::test]
async fn test_bad_actor_header_rejected() {
    let env = test_env();
    let mut req = json_request(
        "POST",
        "/api/bookings",
        booking_body(env.resource, "2025-06-16T09:00:00", "2025-06-16T10:00:00"),
    );
    req.headers_mut()
        .insert("X-User-Id", "not-a-number".parse().unwrap());
    let (status, _) = send(&env.state, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_inverted_interval_rejected() {
    let env = test_env();
    let (status, json) = send(
        &env.state,
        json_request(
            "POST",
            "/api/bookings",
            booking_body(env.resource, "2025-06-16T10:00:00", "2025-06-16T09:00:00"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("before"));
}

#[tokio::test]
async fn test_sub_second_times_rejected() {
    let env = test_env();
    for (start, end) in [
        ("2025-06-16T10:00:00.200", "2025-06-16T10:00:00.700"),
        ("2025-06-16T11:00:00.500", "2025-06-16T12:00:00.500"),
    ] {
        let (status, json) = send(
            &env.state,
            json_request("POST", "/api/bookings", booking_body(env.resource, start, end)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{start}: {json}");
        assert!(json["error"].as_str().unwrap().contains("whole seconds"));
    }

    let (_, list) = send(
        &env.state,
        empty_request("GET", &format!("/api/resources/{}/bookings", env.resource)),
    )
    .await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_resource_is_not_found() {
    let env = test_env();
    let (status, _) = send(
        &env.state,
        json_request(
            "POST",
            "/api/bookings",
            booking_body(999, "2025-06-16T09:00:00", "2025-06-16T10:00:00"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_conflicting_booking_rejected() {
    let env = test_env();
    let existing = create(&env, "2025-06-16T09:00:00", "2025-06-16T10:00:00").await;

    let (status, json) = send(
        &env.state,
        json_request(
            "POST",
            "/api/bookings",
            booking_body(env.resource, "2025-06-16T09:30:00", "2025-06-16T10:30:00"),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    let conflicts = json["conflicts"].as_array().unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0]["booking_id"], existing);
    assert_eq!(conflicts[0]["customer_name"], "Alice Smith");
    assert!(json["error"].as_str().unwrap().contains(&format!("#{existing}")));

    let (_, list) = send(
        &env.state,
        empty_request("GET", &format!("/api/resources/{}/bookings", env.resource)),
    )
    .await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_touching_booking_accepted() {
    let env = test_env();
    create(&env, "2025-06-16T09:00:00", "2025-06-16T10:00:00").await;
    create(&env, "2025-06-16T10:00:00", "2025-06-16T11:00:00").await;
}

// ── Read / Update / Patch ──

#[tokio::test]
async fn test_get_booking_and_missing_booking() {
    let env = test_env();
    let id = create(&env, "2025-06-16T09:00:00", "2025-06-16T10:00:00").await;

    let (status, json) = send(&env.state, empty_request("GET", &format!("/api/bookings/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], id);
    assert_eq!(json["start_time"], "2025-06-16T09:00:00");

    let (status, _) = send(&env.state, empty_request("GET", "/api/bookings/4242")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_moves_booking_and_calendar_event() {
    let env = test_env();
    let id = create(&env, "2025-06-16T09:00:00", "2025-06-16T10:00:00").await;

    let (status, json) = send(
        &env.state,
        json_request(
            "PUT",
            &format!("/api/bookings/{id}"),
            booking_body(env.resource, "2025-06-16T09:30:00", "2025-06-16T10:30:00"),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["value"]["start_time"], "2025-06-16T09:30:00");
    assert_eq!(
        env.calls.lock().unwrap().last().unwrap(),
        &format!("update:{0}:evt-{0}", env.provider)
    );
}

#[tokio::test]
async fn test_update_into_other_booking_conflicts() {
    let env = test_env();
    let first = create(&env, "2025-06-16T09:00:00", "2025-06-16T10:00:00").await;
    let second = create(&env, "2025-06-16T11:00:00", "2025-06-16T12:00:00").await;

    let (status, json) = send(
        &env.state,
        json_request(
            "PUT",
            &format!("/api/bookings/{second}"),
            booking_body(env.resource, "2025-06-16T09:30:00", "2025-06-16T11:30:00"),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    let ids: Vec<i64> = json["conflicts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["booking_id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![first]);
}

#[tokio::test]
async fn test_patch_payment_status() {
    let env = test_env();
    let id = create(&env, "2025-06-16T09:00:00", "2025-06-16T10:00:00").await;

    let (status, json) = send(
        &env.state,
        json_request(
            "PATCH",
            &format!("/api/bookings/{id}"),
            serde_json::json!({ "payment_status": "paid", "final_amount": 40.0 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["payment_status"], "paid");
    assert_eq!(json["final_amount"], 40.0);
    assert_eq!(json["status"], "confirmed");

    let (status, json) = send(
        &env.state,
        json_request(
            "PATCH",
            &format!("/api/bookings/{id}"),
            serde_json::json!({ "final_amount": null }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["final_amount"].is_null());
    assert_eq!(json["payment_status"], "paid");
}

// ── Cancel / Delete ──

#[tokio::test]
async fn test_cancel_frees_slot_and_removes_event() {
    let env = test_env();
    let id = create(&env, "2025-06-16T09:00:00", "2025-06-16T10:00:00").await;
    {
        let conn = env.state.conn().unwrap();
        queries::create_payment(&conn, id, 40.0, PaymentStatus::Paid).unwrap();
    }

    let (status, json) = send(
        &env.state,
        empty_request("POST", &format!("/api/bookings/{id}/cancel")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["value"]["status"], "cancelled");
    assert!(json["value"]["provider_event_id"].is_null());
    assert_eq!(
        env.calls.lock().unwrap().last().unwrap(),
        &format!("delete:{0}:evt-{0}", env.provider)
    );
    {
        let conn = env.state.conn().unwrap();
        assert!(queries::find_payments_by_booking(&conn, id).unwrap().is_empty());
    }

    // A second cancel is rejected.
    let (status, _) = send(
        &env.state,
        empty_request("POST", &format!("/api/bookings/{id}/cancel")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // The interval is free again.
    create(&env, "2025-06-16T09:00:00", "2025-06-16T10:00:00").await;
}

#[tokio::test]
async fn test_delete_booking() {
    let env = test_env();
    let id = create(&env, "2025-06-16T09:00:00", "2025-06-16T10:00:00").await;

    let (status, json) = send(&env.state, empty_request("DELETE", &format!("/api/bookings/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["value"]["id"], id);

    let (status, _) = send(&env.state, empty_request("GET", &format!("/api/bookings/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&env.state, empty_request("DELETE", &format!("/api/bookings/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Multi-slot ──

#[tokio::test]
async fn test_multi_slot_create_reports_each_slot() {
    let env = test_env();
    let date = NaiveDate::from_ymd_opt(2025, 6, 16).unwrap();
    let t = |h: u32| NaiveTime::from_hms_opt(h, 0, 0).unwrap();
    let (morning, taken) = {
        let conn = env.state.conn().unwrap();
        (
            queries::create_slot(&conn, env.resource, date, t(9), t(10)).unwrap(),
            queries::create_slot(&conn, env.resource, date, t(11), t(12)).unwrap(),
        )
    };
    create(&env, "2025-06-16T11:30:00", "2025-06-16T12:30:00").await;

    let (status, json) = send(
        &env.state,
        json_request(
            "POST",
            "/api/bookings/multi",
            serde_json::json!({
                "resource_id": env.resource,
                "slot_ids": [morning, taken, 999],
                "customer_name": "Alice Smith",
                "customer_email": "alice@example.com",
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let created = json["created"].as_array().unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0]["slot_id"], morning);
    assert_eq!(created[0]["start_time"], "2025-06-16T09:00:00");

    let failed: Vec<i64> = json["failed"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["slot_id"].as_i64().unwrap())
        .collect();
    assert_eq!(failed, vec![taken, 999]);
}

#[tokio::test]
async fn test_multi_slot_requires_slots() {
    let env = test_env();
    let (status, _) = send(
        &env.state,
        json_request(
            "POST",
            "/api/bookings/multi",
            serde_json::json!({
                "resource_id": env.resource,
                "slot_ids": [],
                "customer_name": "Alice Smith",
                "customer_email": "alice@example.com",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ── Listings ──

#[tokio::test]
async fn test_listings_by_customer_and_provider() {
    let env = test_env();
    let late = create(&env, "2025-06-17T09:00:00", "2025-06-17T10:00:00").await;
    let early = create(&env, "2025-06-16T09:00:00", "2025-06-16T10:00:00").await;

    for uri in [
        format!("/api/customers/{}/bookings", env.customer),
        format!("/api/providers/{}/bookings", env.provider),
        format!("/api/resources/{}/bookings", env.resource),
    ] {
        let (status, json) = send(&env.state, empty_request("GET", &uri)).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        let ids: Vec<i64> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![early, late], "{uri}");
    }

    let (status, _) = send(&env.state, empty_request("GET", "/api/resources/999/bookings")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
