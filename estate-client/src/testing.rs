//! Общие заглушки для unit-тестов.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::api::ApiClient;
use crate::auth::AuthStore;
use crate::error::EstateClientResult;
use crate::models::{Session, User};
use crate::storage::MemoryStorage;
use crate::transport::{ApiRequest, ApiResponse, Transport};

type Handler = dyn Fn(&ApiRequest) -> ApiResponse + Send + Sync;

/// Транспорт, который отвечает замыканием и записывает все запросы.
pub(crate) struct FakeTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<ApiRequest>>,
    delay: Option<Duration>,
}

impl FakeTransport {
    pub(crate) fn new(handler: impl Fn(&ApiRequest) -> ApiResponse + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .expect("requests mutex poisoned")
            .clone()
    }

    /// Сколько запросов ушло на путь, заканчивающийся `path`.
    pub(crate) fn count(&self, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.path.ends_with(path))
            .count()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: ApiRequest) -> EstateClientResult<ApiResponse> {
        self.requests
            .lock()
            .expect("requests mutex poisoned")
            .push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok((self.handler)(&request))
    }
}

/// Клиент с уже открытой сессией: access `a1`, refresh `r1`.
pub(crate) fn authed_client(transport: Arc<FakeTransport>) -> ApiClient {
    let auth = AuthStore::new(Arc::new(MemoryStorage::new()));
    auth.establish(
        Session {
            user_id: "7".to_string(),
            access_token: "a1".to_string(),
            refresh_token: Some("r1".to_string()),
            expires_at: None,
        },
        User {
            id: "7".to_string(),
            username: "anna".to_string(),
            email: "anna@example.com".to_string(),
            full_name: None,
            avatar: None,
        },
    )
    .expect("establish test session");
    ApiClient::new(transport, auth)
}

/// Клиент без сессии.
pub(crate) fn anonymous_client(transport: Arc<FakeTransport>) -> ApiClient {
    ApiClient::new(transport, AuthStore::new(Arc::new(MemoryStorage::new())))
}

pub(crate) fn user_json(id: &str, username: &str) -> Value {
    json!({
        "id": id,
        "username": username,
        "email": format!("{username}@example.com"),
    })
}

pub(crate) fn post_json(id: &str, likes: u64) -> Value {
    json!({
        "id": id,
        "author": {"id": 7, "username": "anna"},
        "content": format!("post {id}"),
        "likes_count": likes,
        "comments_count": 0,
        "views_count": 0,
        "is_liked": false,
        "status": "published",
        "created_at": "2026-03-01T10:00:00Z",
        "updated_at": "2026-03-01T10:00:00Z",
    })
}

pub(crate) fn page_json(items: Vec<Value>, next: Option<&str>) -> Value {
    json!({
        "results": items,
        "next": next,
        "previous": null,
    })
}
