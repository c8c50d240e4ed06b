//! API integration tests, driven through the router against the in-memory store

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use borrowdesk_server::{
    api,
    config::AppConfig,
    models::{user::UserClaims, BookInfo, UserInfo, UserRole},
    repository::{memory::MemoryStore, Repository},
    services::{clock::ManualClock, Services},
    AppState,
};

const STUDENT: i32 = 1;
const TEACHER: i32 = 2;
const LIBRARIAN: i32 = 10;
const ADMIN: i32 = 11;
const BOOK: i32 = 500;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap()
}

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    secret: String,
}

impl TestApp {
    async fn new(copies: i32) -> Self {
        let store = Arc::new(MemoryStore::new());
        for (id, username, role) in [
            (STUDENT, "mina", UserRole::Student),
            (TEACHER, "dr.okafor", UserRole::Teacher),
            (LIBRARIAN, "lib.jo", UserRole::Librarian),
            (ADMIN, "root", UserRole::Admin),
        ] {
            store.add_user(UserInfo { id, username: username.into(), role }).await;
        }
        store
            .add_book(BookInfo {
                id: BOOK,
                name: "pragmatic-programmer".into(),
                title: Some("The Pragmatic Programmer".into()),
                copies,
            })
            .await;

        let clock = Arc::new(ManualClock::new(start()));
        let config = AppConfig::default();
        let services = Services::new(
            Repository::in_memory(store.clone()),
            clock.clone(),
            &config.borrowing,
        );
        let secret = config.auth.jwt_secret.clone();
        let state = AppState {
            config: Arc::new(config),
            services: Arc::new(services),
        };

        Self {
            router: api::router(state),
            store,
            clock,
            secret,
        }
    }

    fn token(&self, user_id: i32, username: &str, role: UserRole) -> String {
        let now = Utc::now().timestamp();
        UserClaims {
            sub: user_id.to_string(),
            user_id,
            username: username.into(),
            role,
            exp: now + 3600,
            iat: now,
        }
        .create_token(&self.secret)
        .expect("Failed to sign token")
    }

    fn student(&self) -> String {
        self.token(STUDENT, "mina", UserRole::Student)
    }

    fn librarian(&self) -> String {
        self.token(LIBRARIAN, "lib.jo", UserRole::Librarian)
    }

    fn admin(&self) -> String {
        self.token(ADMIN, "root", UserRole::Admin)
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(format!("/api/v1{}", uri));
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Router failed");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("Response is not JSON")
        };
        (status, value)
    }

    async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(token), Some(body)).await
    }

    async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, Some(token), None).await
    }
}

fn student_request(due_in_days: i64) -> Value {
    json!({
        "userId": STUDENT,
        "username": "mina",
        "bookId": BOOK,
        "bookName": "pragmatic-programmer",
        "dueDate": (start() + Duration::days(due_in_days)).to_rfc3339(),
        "userType": "student"
    })
}

#[tokio::test]
async fn test_health_and_readiness() {
    let app = TestApp::new(1).await;

    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.send(Method::GET, "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_borrow_endpoints_require_a_token() {
    let app = TestApp::new(1).await;

    let (status, body) = app
        .send(Method::POST, "/borrows/request", None, Some(student_request(7)))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 2);

    let (status, _) = app.get("/borrows/my-borrow", "not-a-jwt").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_request_approve_return_lifecycle() {
    let app = TestApp::new(2).await;
    let student = app.student();
    let librarian = app.librarian();

    let (status, body) = app.post("/borrows/request", &student, student_request(7)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["record"]["status"], "pending");
    assert_eq!(body["bookAvailable"], true);
    assert_eq!(body["pendingRequests"], 1);
    assert_eq!(body["finePolicy"]["gracePeriodDays"], 1);
    let borrow_id = body["record"]["id"].as_str().unwrap().to_string();
    assert_eq!(app.store.copies(BOOK).await, Some(2));

    let (status, body) = app.post("/borrows/request", &student, student_request(3)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "ActiveBorrowExists");
    assert_eq!(body["details"]["status"], "pending");

    let decision = json!({ "borrowId": borrow_id, "action": "approve" });
    let (status, _) = app.post("/borrows/approve", &student, decision.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.post("/borrows/approve", &librarian, decision.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "borrowed");
    assert_eq!(body["record"]["approvedBy"], LIBRARIAN);
    assert_eq!(app.store.copies(BOOK).await, Some(1));

    let (status, body) = app.post("/borrows/approve", &librarian, decision).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["details"]["status"], "borrowed");
    assert_eq!(app.store.copies(BOOK).await, Some(1));

    app.clock.advance(Duration::days(9));
    let (status, body) = app.get("/borrows/my-borrow", &student).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isOverdue"], true);
    assert_eq!(body["liveFine"], 10);
    assert_eq!(body["record"]["fine"], 0);

    let (status, body) = app
        .post("/borrows/return", &librarian, json!({ "userId": STUDENT, "bookId": BOOK }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fine"], 10);
    assert_eq!(body["daysLate"], 2);
    assert_eq!(body["gracePeriod"], 1);
    assert_eq!(app.store.copies(BOOK).await, Some(2));

    let (status, body) = app.get("/borrows/my-borrow", &student).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_null());

    let (status, body) = app
        .post("/borrows/settle-fine", &librarian, json!({ "recordId": borrow_id }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fine"], 0);
    assert_eq!(body["status"], "returned");
}

#[tokio::test]
async fn test_rejection_starts_cooldown() {
    let app = TestApp::new(1).await;
    let student = app.student();

    let (_, body) = app.post("/borrows/request", &student, student_request(7)).await;
    let borrow_id = body["record"]["id"].clone();

    let (status, body) = app
        .post(
            "/borrows/approve",
            &app.librarian(),
            json!({ "borrowId": borrow_id, "action": "reject", "reason": "Reserved for a course" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["record"]["rejectionReason"], "Reserved for a course");

    app.clock.advance(Duration::hours(23));
    let (status, body) = app.post("/borrows/request", &student, student_request(7)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 11);
    assert_eq!(body["details"]["remainingSeconds"], 3600);
    assert!(body["message"].as_str().unwrap().ends_with("1h 0m"));

    app.clock.advance(Duration::hours(2));
    let (status, _) = app.post("/borrows/request", &student, student_request(7)).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_request_validation_and_ownership() {
    let app = TestApp::new(1).await;
    let student = app.student();

    let mut blank = student_request(7);
    blank["username"] = json!("");
    let (status, body) = app.post("/borrows/request", &student, blank).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 5);

    let (status, _) = app.post("/borrows/request", &student, student_request(-2)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let for_teacher = json!({
        "userId": TEACHER,
        "username": "dr.okafor",
        "bookId": BOOK,
        "bookName": "pragmatic-programmer",
        "dueDate": (start() + Duration::days(7)).to_rfc3339()
    });
    let (status, _) = app.post("/borrows/request", &student, for_teacher.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.post("/borrows/request", &app.librarian(), for_teacher).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["record"]["userType"], "teacher");

    let mut unknown_book = student_request(7);
    unknown_book["bookId"] = json!(999);
    let (status, _) = app.post("/borrows/request", &student, unknown_book).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_direct_borrow_and_admin_delete() {
    let app = TestApp::new(1).await;
    let librarian = app.librarian();

    let (status, body) = app
        .post("/borrows/librarian-borrow", &librarian, student_request(14))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "borrowed");
    assert!(body["requestedAt"].is_null());
    assert_eq!(app.store.copies(BOOK).await, Some(0));
    let record_id = body["id"].as_str().unwrap().to_string();

    let teacher_borrow = json!({
        "userId": TEACHER,
        "username": "dr.okafor",
        "bookId": BOOK,
        "bookName": "pragmatic-programmer",
        "dueDate": (start() + Duration::days(14)).to_rfc3339()
    });
    let (status, body) = app
        .post("/borrows/librarian-borrow", &librarian, teacher_borrow)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "NoCopiesAvailable");

    let uri = format!("/borrows/{}", record_id);
    let (status, _) = app.send(Method::DELETE, &uri, Some(&librarian), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = app.admin();
    let (status, body) = app.send(Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["returnedCopy"], true);
    assert_eq!(app.store.copies(BOOK).await, Some(1));

    let (status, _) = app.send(Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.store.copies(BOOK).await, Some(1));
}

#[tokio::test]
async fn test_listings_and_fine_policy() {
    let app = TestApp::new(3).await;
    let student = app.student();
    app.post("/borrows/request", &student, student_request(7)).await;

    let (status, _) = app.get("/borrows", &student).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .get("/borrows?status=pending&search=MINA", &app.librarian())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["record"]["username"], "mina");

    let (status, body) = app.get("/borrows/my-requests?page=1&limit=5", &student).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["limit"], 5);

    let (status, body) = app.get("/borrows/fine-policy", &student).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userType"], "student");
    assert_eq!(body["gracePeriodDays"], 1);
    assert_eq!(body["finePerDay"], 10);

    // Borrowers cannot look up another role's policy
    let (_, body) = app.get("/borrows/fine-policy?userType=teacher", &student).await;
    assert_eq!(body["userType"], "student");

    let (_, body) = app
        .get("/borrows/fine-policy?userType=teacher", &app.librarian())
        .await;
    assert_eq!(body["gracePeriodDays"], 2);
}

#[tokio::test]
async fn test_malformed_input_gets_error_body() {
    let app = TestApp::new(1).await;
    let student = app.student();

    let mut no_due_date = student_request(7);
    no_due_date.as_object_mut().unwrap().remove("dueDate");
    let (status, body) = app.post("/borrows/request", &student, no_due_date).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 5);
    assert_eq!(body["error"], "BadValue");
    assert!(body["message"].as_str().unwrap().contains("dueDate"));

    let (status, body) = app
        .post("/borrows/approve", &app.librarian(), json!({ "borrowId": "nope", "action": "approve" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 5);

    let (status, body) = app
        .send(Method::DELETE, "/borrows/not-a-uuid", Some(&app.admin()), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 5);

    let (status, body) = app.get("/borrows?page=abc", &app.librarian()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 5);
}

#[tokio::test]
async fn test_page_beyond_offset_range() {
    let app = TestApp::new(1).await;
    let (status, body) = app
        .get("/borrows?page=9223372036854775807", &app.librarian())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 5);

    let (status, _) = app
        .get("/borrows/my-requests?page=9223372036854775807&limit=5", &app.student())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
