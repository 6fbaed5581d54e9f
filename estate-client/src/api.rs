//! HTTP-обёртка: bearer-токен, refresh на 401, вход и регистрация.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::auth::AuthStore;
use crate::error::{EstateClientError, EstateClientResult};
use crate::models::{Credentials, Session, SignupRequest, User};
use crate::transport::{ApiRequest, ApiResponse, Transport};

pub(crate) const LOGIN_PATH: &str = "/api/auth/login/";
pub(crate) const REGISTER_PATH: &str = "/api/auth/register/";
pub(crate) const REFRESH_PATH: &str = "/api/auth/token/refresh/";
pub(crate) const USER_PATH: &str = "/api/auth/user/";

#[derive(Debug, Deserialize)]
struct AuthResponseDto {
    #[serde(alias = "access_token")]
    access: String,
    #[serde(default, alias = "refresh_token")]
    refresh: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: User,
}

#[derive(Debug, Deserialize)]
struct RefreshResponseDto {
    #[serde(alias = "access_token")]
    access: String,
    #[serde(default, alias = "refresh_token")]
    refresh: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

fn is_auth_endpoint(path: &str) -> bool {
    [LOGIN_PATH, REGISTER_PATH, REFRESH_PATH]
        .iter()
        .any(|auth_path| path.ends_with(auth_path))
}

fn expires_at(expires_in: Option<i64>) -> Option<chrono::DateTime<Utc>> {
    expires_in
        .filter(|secs| *secs > 0)
        .map(|secs| Utc::now() + TimeDelta::seconds(secs))
}

fn to_body<B: Serialize>(body: &B) -> EstateClientResult<Value> {
    serde_json::to_value(body)
        .map_err(|err| EstateClientError::Decode(format!("encode request body: {err}")))
}

#[derive(Clone)]
/// HTTP-обёртка над [`Transport`]: прикладывает bearer-токен и на 401
/// один раз обновляет токен и один раз повторяет запрос.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    auth: AuthStore,
    // один refresh за раз; заодно не даёт зациклиться
    refresh_gate: Arc<Mutex<()>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Создаёт обёртку над транспортом и состоянием сессии.
    pub fn new(transport: Arc<dyn Transport>, auth: AuthStore) -> Self {
        Self {
            transport,
            auth,
            refresh_gate: Arc::new(Mutex::new(())),
        }
    }

    /// Состояние сессии.
    pub fn auth(&self) -> &AuthStore {
        &self.auth
    }

    /// Выполняет запрос и разбирает JSON-ответ.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> EstateClientResult<T> {
        let mut request = ApiRequest::new(method, path);
        request.body = body;
        self.send(request).await
    }

    /// `GET path`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> EstateClientResult<T> {
        self.request(Method::GET, path, None).await
    }

    /// `GET path?query`.
    pub async fn get_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> EstateClientResult<T> {
        let request = ApiRequest::new(Method::GET, path).with_query(query.to_vec());
        self.send(request).await
    }

    /// `POST path` с JSON-телом.
    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> EstateClientResult<T> {
        self.request(Method::POST, path, Some(to_body(body)?)).await
    }

    /// `POST path` без тела.
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> EstateClientResult<T> {
        self.request(Method::POST, path, None).await
    }

    /// `PATCH path` с JSON-телом.
    pub async fn patch<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> EstateClientResult<T> {
        self.request(Method::PATCH, path, Some(to_body(body)?)).await
    }

    /// `DELETE path`, тело ответа игнорируется.
    pub async fn delete(&self, path: &str) -> EstateClientResult<()> {
        let response = self.execute(ApiRequest::new(Method::DELETE, path)).await?;
        if response.is_success() {
            return Ok(());
        }
        Err(into_error(path, &response))
    }

    /// Отправляет запрос с текущим токеном.
    ///
    /// На 401 (кроме auth-эндпоинтов) выполняется ровно один refresh и ровно
    /// один повтор; повторный 401 сбрасывает сессию.
    pub async fn execute(&self, request: ApiRequest) -> EstateClientResult<ApiResponse> {
        let token = self.auth.access_token();
        let response = self.send_with_token(&request, token.clone()).await?;

        if response.status != 401 || is_auth_endpoint(&request.path) {
            return Ok(response);
        }
        let Some(stale) = token else {
            return Ok(response);
        };

        debug!(path = %request.path, "got 401, refreshing token");
        let fresh = self.refresh_after_unauthorized(&stale).await?;
        let retried = self.send_with_token(&request, Some(fresh)).await?;
        if retried.status == 401 {
            warn!(path = %request.path, "still unauthorized after refresh, logging out");
            self.auth.clear();
            return Err(EstateClientError::SessionExpired);
        }
        Ok(retried)
    }

    /// Вход по логину и паролю.
    pub async fn login(&self, credentials: &Credentials) -> EstateClientResult<User> {
        credentials.validate()?;
        self.authenticate(LOGIN_PATH, to_body(credentials)?).await
    }

    /// Регистрация; сервер сразу выдаёт токены.
    pub async fn signup(&self, request: &SignupRequest) -> EstateClientResult<User> {
        request.validate()?;
        self.authenticate(REGISTER_PATH, to_body(request)?).await
    }

    /// Обменивает refresh-токен на новый bearer-токен.
    ///
    /// Любая неудача означает полный выход.
    pub async fn refresh(&self) -> EstateClientResult<String> {
        let _gate = self.refresh_gate.lock().await;
        self.refresh_locked().await
    }

    /// Выход. Учётные данные удаляются до возврата из функции.
    pub fn logout(&self) {
        self.auth.clear();
    }

    /// Загружает профиль текущего пользователя.
    pub async fn current_user(&self) -> EstateClientResult<User> {
        self.auth.require_authenticated()?;
        let user: User = self.get(USER_PATH).await?;
        self.auth.set_user(user.clone())?;
        Ok(user)
    }

    async fn authenticate(&self, path: &str, body: Value) -> EstateClientResult<User> {
        self.auth.begin_authentication();

        let request = ApiRequest::new(Method::POST, path).with_body(body);
        let result = match self.transport.send(request).await {
            Ok(response) => decode_response::<AuthResponseDto>(path, &response),
            Err(err) => Err(err),
        };
        let dto = match result {
            Ok(dto) => dto,
            Err(err) => {
                self.auth.clear();
                return Err(err);
            }
        };

        let session = Session {
            user_id: dto.user.id.clone(),
            access_token: dto.access,
            refresh_token: dto.refresh,
            expires_at: expires_at(dto.expires_in),
        };
        self.auth.establish(session, dto.user.clone())?;
        info!(username = %dto.user.username, "logged in");
        Ok(dto.user)
    }

    async fn refresh_after_unauthorized(&self, stale: &str) -> EstateClientResult<String> {
        let _gate = self.refresh_gate.lock().await;

        // пока ждали, токен мог обновить другой запрос
        match self.auth.access_token() {
            Some(current) if current != stale => return Ok(current),
            Some(_) => {}
            None => return Err(EstateClientError::SessionExpired),
        }
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> EstateClientResult<String> {
        match self.try_refresh().await {
            Ok(token) => {
                debug!("token refreshed");
                Ok(token)
            }
            Err(err) => {
                warn!(error = %err, "token refresh failed, logging out");
                self.auth.clear();
                Err(EstateClientError::SessionExpired)
            }
        }
    }

    async fn try_refresh(&self) -> EstateClientResult<String> {
        let refresh_token = self
            .auth
            .refresh_token()
            .ok_or(EstateClientError::SessionExpired)?;

        let request = ApiRequest::new(Method::POST, REFRESH_PATH)
            .with_body(json!({ "refresh": refresh_token }));
        let response = self.transport.send(request).await?;
        let dto: RefreshResponseDto = decode_response(REFRESH_PATH, &response)?;

        self.auth
            .replace_tokens(dto.access.clone(), dto.refresh, expires_at(dto.expires_in))?;
        Ok(dto.access)
    }

    /// Выполняет готовый [`ApiRequest`] и разбирает JSON-ответ.
    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> EstateClientResult<T> {
        let path = request.path.clone();
        let response = self.execute(request).await?;
        decode_response(&path, &response)
    }

    async fn send_with_token(
        &self,
        request: &ApiRequest,
        token: Option<String>,
    ) -> EstateClientResult<ApiResponse> {
        let mut request = request.clone();
        request.bearer = token;
        self.transport.send(request).await
    }
}

fn decode_response<T: DeserializeOwned>(
    path: &str,
    response: &ApiResponse,
) -> EstateClientResult<T> {
    if response.is_success() {
        return response.decode();
    }
    Err(into_error(path, response))
}

fn into_error(path: &str, response: &ApiResponse) -> EstateClientError {
    let message = response.server_message();
    if response.status == 401 && is_auth_endpoint(path) {
        return EstateClientError::Api {
            status: 401,
            message: message.unwrap_or_else(|| "Invalid credentials".to_string()),
        };
    }
    EstateClientError::from_http_status(response.status, message)
}
