use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

use estate_client::{
    ClientConfig, Credentials, EstateClient, EstateClientError, FetchOutcome, FileStorage,
    KeyValueStorage, MemoryStorage,
};

#[derive(Default)]
struct Counters {
    refreshes: usize,
    unauthorized: usize,
    pages: usize,
}

#[derive(Clone)]
struct AppState {
    base_url: String,
    // токен, который сервер сейчас принимает
    valid_token: Arc<Mutex<String>>,
    counters: Arc<Mutex<Counters>>,
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn post_json(id: &str) -> Value {
    json!({
        "id": id,
        "author": {"id": 7, "username": "anna"},
        "content": format!("post {id}"),
        "likes_count": 3,
        "is_liked": false,
        "status": "published",
        "created_at": "2026-03-01T10:00:00Z",
        "updated_at": "2026-03-01T10:00:00Z",
    })
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["password"] != "correct-horse" {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "No active account found with the given credentials"})),
        )
            .into_response();
    }
    Json(json!({
        "access": "a1",
        "refresh": "r1",
        "user": {"id": 7, "username": "anna", "email": "anna@example.com"},
    }))
    .into_response()
}

async fn refresh(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    state.counters.lock().expect("counters").refreshes += 1;
    if body["refresh"] != "r1" {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Token is invalid or expired"})),
        )
            .into_response();
    }
    Json(json!({ "access": "a2" })).into_response()
}

async fn list_posts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let valid = state.valid_token.lock().expect("token").clone();
    if bearer(&headers).as_deref() != Some(valid.as_str()) {
        state.counters.lock().expect("counters").unauthorized += 1;
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Given token not valid for any token type"})),
        )
            .into_response();
    }

    state.counters.lock().expect("counters").pages += 1;
    match query.get("cursor").map(String::as_str) {
        Some("p2") => Json(json!({
            "results": [post_json("3"), post_json("4")],
            "next": null,
            "previous": null,
        }))
        .into_response(),
        _ => Json(json!({
            "results": [post_json("1"), post_json("2"), post_json("3")],
            "next": format!("{}/api/posts/?cursor=p2", state.base_url),
            "previous": null,
        }))
        .into_response(),
    }
}

async fn like_post(Path(id): Path<String>, headers: HeaderMap) -> Response {
    if bearer(&headers).is_none() {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let likes = if id == "1" { 10 } else { 1 };
    Json(json!({"likes_count": likes, "is_liked": true})).into_response()
}

async fn spawn_server(valid_token: &str) -> (AppState, String) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr: SocketAddr = listener.local_addr().expect("local addr");
    let base_url = format!("http://{addr}");

    let state = AppState {
        base_url: base_url.clone(),
        valid_token: Arc::new(Mutex::new(valid_token.to_string())),
        counters: Arc::new(Mutex::new(Counters::default())),
    };
    let app = Router::new()
        .route("/api/auth/login/", post(login))
        .route("/api/auth/token/refresh/", post(refresh))
        .route("/api/posts/", get(list_posts))
        .route("/api/posts/{id}/like/", post(like_post))
        .with_state(state.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    (state, base_url)
}

fn client(base_url: &str, local: Arc<dyn KeyValueStorage>) -> EstateClient {
    let config = ClientConfig {
        base_url: base_url.to_string(),
        ..ClientConfig::default()
    };
    EstateClient::new(&config, local, Arc::new(MemoryStorage::new())).expect("client")
}

fn credentials(password: &str) -> Credentials {
    Credentials {
        username: "anna".to_string(),
        password: password.to_string(),
    }
}

#[tokio::test]
async fn expired_token_is_refreshed_once_and_request_retried() {
    let (state, base_url) = spawn_server("a2").await;
    let client = client(&base_url, Arc::new(MemoryStorage::new()));
    client.login(&credentials("correct-horse")).await.expect("login");

    let posts = client.posts();
    let outcome = posts.fetch_first_page().await.expect("fetch");

    assert_eq!(outcome, FetchOutcome::Fetched);
    assert_eq!(posts.len(), 3);
    assert_eq!(client.auth().access_token().as_deref(), Some("a2"));
    assert_eq!(client.auth().refresh_token().as_deref(), Some("r1"));

    let counters = state.counters.lock().expect("counters");
    assert_eq!(counters.refreshes, 1);
    assert_eq!(counters.unauthorized, 1);
    assert_eq!(counters.pages, 1);
}

#[tokio::test]
async fn second_unauthorized_ends_session() {
    // после refresh сервер всё равно не принимает выданный токен
    let (state, base_url) = spawn_server("a1").await;
    let client = client(&base_url, Arc::new(MemoryStorage::new()));
    client.login(&credentials("correct-horse")).await.expect("login");
    *state.valid_token.lock().expect("token") = "rotated".to_string();

    let posts = client.posts();
    let result = posts.fetch_first_page().await;

    assert!(matches!(result, Err(EstateClientError::SessionExpired)));
    assert!(!client.auth().is_authenticated());
    assert!(posts.last_error().is_some());

    let counters = state.counters.lock().expect("counters");
    assert_eq!(counters.refreshes, 1);
    assert_eq!(counters.unauthorized, 2);
}

#[tokio::test]
async fn wrong_password_reports_server_message() {
    let (state, base_url) = spawn_server("a1").await;
    let client = client(&base_url, Arc::new(MemoryStorage::new()));

    let result = client.login(&credentials("wrong")).await;

    match result {
        Err(EstateClientError::Api { status, message }) => {
            assert_eq!(status, 401);
            assert_eq!(message, "No active account found with the given credentials");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(!client.auth().is_authenticated());
    assert_eq!(state.counters.lock().expect("counters").refreshes, 0);
}

#[tokio::test]
async fn absolute_cursor_url_is_followed() {
    let (state, base_url) = spawn_server("a1").await;
    let client = client(&base_url, Arc::new(MemoryStorage::new()));
    client.login(&credentials("correct-horse")).await.expect("login");

    let posts = client.posts();
    posts.fetch_first_page().await.expect("fetch");
    posts.load_more().await.expect("more");

    let ids: Vec<String> = posts.items().into_iter().map(|post| post.id).collect();
    assert_eq!(ids, vec!["1", "2", "3", "4"]);
    assert!(!posts.has_more());
    assert_eq!(state.counters.lock().expect("counters").pages, 2);

    let like = posts.like("1").await.expect("like");
    assert_eq!(like.likes_count, 10);
    assert_eq!(posts.get("1").map(|post| post.likes_count), Some(10));
}

#[tokio::test]
async fn session_survives_restart_with_file_storage() {
    let (_state, base_url) = spawn_server("a1").await;
    let dir = tempfile::tempdir().expect("temp dir");

    let first = client(
        &base_url,
        Arc::new(FileStorage::open(dir.path()).expect("storage")),
    );
    first.login(&credentials("correct-horse")).await.expect("login");

    let second = client(
        &base_url,
        Arc::new(FileStorage::open(dir.path()).expect("storage")),
    );
    assert!(second.auth().is_authenticated());
    assert_eq!(
        second.auth().user().map(|user| user.username).as_deref(),
        Some("anna")
    );

    second.logout();
    let third = client(
        &base_url,
        Arc::new(FileStorage::open(dir.path()).expect("storage")),
    );
    assert!(!third.auth().is_authenticated());
}
