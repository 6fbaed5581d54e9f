//! Транспортный слой: запрос, ответ и реализация на `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{EstateClientError, EstateClientResult, extract_server_message};

#[derive(Debug, Clone)]
/// Запрос к REST API до отправки.
pub struct ApiRequest {
    /// HTTP-метод.
    pub method: Method,
    /// Путь относительно базового URL или абсолютный URL (курсор).
    pub path: String,
    /// Query-параметры.
    pub query: Vec<(String, String)>,
    /// JSON-тело.
    pub body: Option<Value>,
    /// Bearer-токен.
    pub bearer: Option<String>,
}

impl ApiRequest {
    /// Запрос без тела и параметров.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            bearer: None,
        }
    }

    /// Добавляет JSON-тело.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Добавляет query-параметры.
    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Ответ сервера: статус и сырое тело.
pub struct ApiResponse {
    /// HTTP-статус.
    pub status: u16,
    /// Тело ответа.
    pub body: String,
}

impl ApiResponse {
    /// Ответ с JSON-телом.
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    /// 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Разбирает тело успешного ответа.
    pub fn decode<T: DeserializeOwned>(&self) -> EstateClientResult<T> {
        // 204 No Content на DELETE
        let body = if self.body.trim().is_empty() {
            "null"
        } else {
            self.body.as_str()
        };
        serde_json::from_str(body).map_err(|err| EstateClientError::Decode(err.to_string()))
    }

    /// Сообщение об ошибке из тела, если сервер его прислал.
    pub fn server_message(&self) -> Option<String> {
        extract_server_message(&self.body)
    }
}

/// Низкоуровневый канал до REST API.
///
/// Не знает ни про сессию, ни про повторы: этим занимается
/// [`ApiClient`](crate::api::ApiClient).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Отправляет запрос и возвращает ответ с любым HTTP-статусом.
    async fn send(&self, request: ApiRequest) -> EstateClientResult<ApiResponse>;
}

#[derive(Debug, Clone)]
/// HTTP-транспорт на `reqwest`.
pub struct HttpTransport {
    base_url: String,
    client: Client,
}

impl HttpTransport {
    /// Создаёт транспорт с базовым URL сервера и таймаутами.
    pub fn new(
        base_url: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> EstateClientResult<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        // курсоры приходят полным URL
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> EstateClientResult<ApiResponse> {
        let url = self.endpoint(&request.path);
        debug!(method = %request.method, %url, "sending request");

        let mut builder = self.client.request(request.method, url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(EstateClientError::from_reqwest)?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(EstateClientError::from_reqwest)?;

        Ok(ApiResponse { status, body })
    }
}
