/// Test fixtures for HTTP integration tests
/// Builds the full route table over the in-memory store and media backends.
use actix_http::Request;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::{test, web, App, Error};
use crypto_core::JwtCodec;
use serde_json::{json, Value};
use social_api::db::MemoryStore;
use social_api::handlers::{self, AppState};
use social_api::services::{DirectoryPolicy, MediaStore, MemoryMediaStore};
use std::sync::Arc;

pub const TEST_SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const TEST_MAX_UPLOAD_BYTES: usize = 64 * 1024;
pub const BOUNDARY: &str = "----social-api-test-boundary";

pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub media: Arc<MemoryMediaStore>,
    pub state: web::Data<AppState>,
}

impl TestContext {
    pub fn new() -> Self {
        let media = Arc::new(MemoryMediaStore::new());
        let (store, state) = build_state(media.clone(), DirectoryPolicy::default());
        Self {
            store,
            media,
            state,
        }
    }
}

pub fn codec() -> JwtCodec {
    JwtCodec::from_secret(TEST_SECRET).expect("test secret is long enough")
}

pub fn build_state(
    media: Arc<dyn MediaStore>,
    policy: DirectoryPolicy,
) -> (Arc<MemoryStore>, web::Data<AppState>) {
    let store = Arc::new(MemoryStore::new());
    let state = web::Data::new(AppState::new(
        store.clone(),
        media,
        codec(),
        policy,
        TEST_MAX_UPLOAD_BYTES,
    ));
    (store, state)
}

pub async fn init_app(
    state: web::Data<AppState>,
) -> impl Service<Request, Response = ServiceResponse, Error = Error> {
    test::init_service(App::new().configure(move |cfg| handlers::configure(cfg, state))).await
}

/// A signed-up account as the tests see it.
pub struct TestUser {
    pub id: String,
    pub username: String,
    pub token: String,
}

impl TestUser {
    pub fn bearer(&self) -> (&'static str, String) {
        ("Authorization", format!("Bearer {}", self.token))
    }
}

pub async fn signup<S>(app: &S, username: &str) -> TestUser
where
    S: Service<Request, Response = ServiceResponse, Error = Error>,
{
    let req = test::TestRequest::post()
        .uri("/api/v1/auth/signup")
        .set_json(json!({
            "username": username,
            "fullname": format!("{username} Test"),
            "email": format!("{username}@example.com"),
            "password": "correct-horse-battery",
        }))
        .to_request();
    let resp = test::call_service(app, req).await;
    assert_eq!(resp.status(), 201, "signup for {username} failed");

    let body: Value = test::read_body_json(resp).await;
    TestUser {
        id: body["data"]["user"]["id"].as_str().unwrap().to_string(),
        username: username.to_string(),
        token: body["data"]["token"].as_str().unwrap().to_string(),
    }
}

/// Issue a request as `user` and return status plus parsed body.
pub async fn call_as<S>(app: &S, user: &TestUser, req: test::TestRequest) -> (u16, Value)
where
    S: Service<Request, Response = ServiceResponse, Error = Error>,
{
    let resp = test::call_service(app, req.insert_header(user.bearer()).to_request()).await;
    let status = resp.status().as_u16();
    let body: Value = test::read_body_json(resp).await;
    (status, body)
}

pub async fn follow<S>(app: &S, viewer: &TestUser, target: &TestUser)
where
    S: Service<Request, Response = ServiceResponse, Error = Error>,
{
    let (status, _) = call_as(
        app,
        viewer,
        test::TestRequest::post().uri(&format!("/api/v1/users/{}/follow", target.id)),
    )
    .await;
    assert_eq!(status, 200);
}

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

/// Encode a multipart/form-data body using `BOUNDARY`.
pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, filename, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_request(method: &str, uri: &str, parts: &[Part<'_>]) -> test::TestRequest {
    let req = match method {
        "PUT" => test::TestRequest::put(),
        _ => test::TestRequest::post(),
    };
    req.uri(uri)
        .insert_header((
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(multipart_body(parts))
}

/// Create a text-only post and return its id.
pub async fn create_post<S>(app: &S, user: &TestUser, caption: &str, tags: &str) -> String
where
    S: Service<Request, Response = ServiceResponse, Error = Error>,
{
    let (status, body) = call_as(
        app,
        user,
        multipart_request(
            "POST",
            "/api/v1/posts",
            &[Part::Text("caption", caption), Part::Text("tags", tags)],
        ),
    )
    .await;
    assert_eq!(status, 201, "create post failed: {body}");
    body["data"]["id"].as_str().unwrap().to_string()
}
