use serde_json::Value;
use thiserror::Error;
use validator::ValidationErrors;

#[derive(Debug, Error)]
/// Ошибки клиентской библиотеки `estate-client`.
pub enum EstateClientError {
    /// Ошибка HTTP-транспорта (`reqwest`).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Операция требует входа, а сессии нет.
    #[error("authentication required")]
    AuthRequired,

    /// Сессия истекла и не была обновлена: учётные данные сброшены.
    #[error("session expired, please log in again")]
    SessionExpired,

    /// Запрошенный ресурс не найден.
    #[error("not found")]
    NotFound,

    /// Локальная валидация не прошла, запрос на сервер не отправлялся.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Сервер ответил ошибкой; `message` по возможности взят из тела ответа.
    #[error("{message}")]
    Api {
        /// HTTP-статус ответа.
        status: u16,
        /// Сообщение для пользователя.
        message: String,
    },

    /// Тело ответа не удалось разобрать.
    #[error("decode error: {0}")]
    Decode(String),

    /// Ошибка локального хранилища (токены, кэш).
    #[error("storage error: {0}")]
    Storage(String),

    /// Над этим ресурсом уже выполняется операция.
    #[error("operation already in progress for {0}")]
    Busy(String),

    /// Операция отменена вместе с владельцем.
    #[error("request cancelled")]
    Cancelled,
}

/// Результат операций `estate-client`.
pub type EstateClientResult<T> = Result<T, EstateClientError>;

impl From<ValidationErrors> for EstateClientError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl EstateClientError {
    /// `true` для ошибок, после которых пользователю нужно войти заново.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::AuthRequired | Self::SessionExpired)
    }

    pub(crate) fn from_http_status(status: u16, message: Option<String>) -> Self {
        match status {
            401 => Self::AuthRequired,
            404 => Self::NotFound,
            _ => Self::Api {
                status,
                message: message.unwrap_or_else(|| fallback_message(status)),
            },
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_http_status(status.as_u16(), None);
        }
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        Self::Http(err)
    }
}

pub(crate) fn fallback_message(status: u16) -> String {
    match status {
        400 => "Invalid request".to_string(),
        401 => "Authentication required".to_string(),
        403 => "You do not have permission to perform this action".to_string(),
        404 => "Resource not found".to_string(),
        409 => "Conflict with the current state of the resource".to_string(),
        429 => "Too many requests, try again later".to_string(),
        500..=599 => "Server error, try again later".to_string(),
        _ => format!("Something went wrong (http status {status})"),
    }
}

/// Достаёт сообщение об ошибке из тела ответа сервера.
///
/// Порядок: `detail`, `error`, `message`, `non_field_errors`, затем первая
/// ошибка поля в виде `field: message`.
pub(crate) fn extract_server_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value {
        Value::String(text) => non_blank(text),
        Value::Array(items) => items.into_iter().find_map(first_text),
        Value::Object(map) => {
            for key in ["detail", "error", "message", "non_field_errors"] {
                if let Some(text) = map.get(key).cloned().and_then(first_text) {
                    return Some(text);
                }
            }
            map.into_iter()
                .find_map(|(field, value)| first_text(value).map(|text| format!("{field}: {text}")))
        }
        _ => None,
    }
}

fn first_text(value: Value) -> Option<String> {
    match value {
        Value::String(text) => non_blank(text),
        Value::Array(items) => items.into_iter().find_map(first_text),
        _ => None,
    }
}

fn non_blank(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}
