//! Диалог с AI-ассистентом.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use validator::Validate;

use crate::api::ApiClient;
use crate::error::{EstateClientError, EstateClientResult};
use crate::models::id;

const CHAT_PATH: &str = "/api/chat/";

static LOCAL_MESSAGE_IDS: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Автор сообщения.
pub enum ChatRole {
    /// Пользователь.
    User,
    /// Ассистент.
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Судьба сообщения пользователя.
pub enum Delivery {
    /// Сервер принял сообщение.
    Sent,
    /// Ждём ответа сервера.
    Pending,
    /// Отправка не удалась; можно повторить вручную.
    Failed,
}

fn delivered() -> Delivery {
    Delivery::Sent
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Сообщение диалога.
pub struct ChatMessage {
    /// Серверный id или временный `local-N`.
    #[serde(deserialize_with = "id::deserialize")]
    pub id: String,
    /// Автор.
    pub role: ChatRole,
    /// Текст.
    pub content: String,
    /// Время создания (UTC).
    pub created_at: DateTime<Utc>,
    /// Статус доставки.
    #[serde(default = "delivered")]
    pub delivery: Delivery,
}

#[derive(Debug, Clone, Validate, Serialize)]
struct ChatRequestDto<'a> {
    #[validate(length(min = 1, max = 4000))]
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ChatReplyDto {
    #[serde(deserialize_with = "id::deserialize")]
    conversation_id: String,
    #[serde(default)]
    user_message: Option<ChatMessage>,
    reply: ChatMessage,
}

#[derive(Debug, Default)]
struct ChatState {
    conversation_id: Option<String>,
    messages: Vec<ChatMessage>,
    in_flight: bool,
    // растёт на каждый reset; ответы прошлых поколений отбрасываются
    generation: u64,
    last_error: Option<String>,
}

/// Снимает `in_flight`, даже если future отправки бросили посреди запроса.
///
/// Сообщение, так и оставшееся `Pending`, помечается `Failed`.
struct InFlightGuard {
    state: Arc<Mutex<ChatState>>,
    generation: u64,
    local_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.generation != self.generation {
            return;
        }
        state.in_flight = false;
        if let Some(message) = state
            .messages
            .iter_mut()
            .find(|message| message.id == self.local_id && message.delivery == Delivery::Pending)
        {
            message.delivery = Delivery::Failed;
        }
    }
}

#[derive(Clone)]
/// Состояние диалога с ассистентом.
pub struct ChatStore {
    api: ApiClient,
    state: Arc<Mutex<ChatState>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ChatStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStore")
            .field("conversation_id", &self.conversation_id())
            .finish_non_exhaustive()
    }
}

impl ChatStore {
    /// Новый пустой диалог.
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            state: Arc::new(Mutex::new(ChatState::default())),
            cancel: CancellationToken::new(),
        }
    }

    /// Продолжает существующий диалог.
    pub fn resume(api: ApiClient, conversation_id: impl Into<String>) -> Self {
        let store = Self::new(api);
        store.lock().conversation_id = Some(conversation_id.into());
        store
    }

    /// Отправляет сообщение и возвращает ответ ассистента.
    ///
    /// Сообщение сразу попадает в историю как `Pending`; при ошибке оно
    /// помечается `Failed` и может быть отправлено повторно через
    /// [`ChatStore::retry`].
    pub async fn send(&self, text: &str) -> EstateClientResult<ChatMessage> {
        let text = text.trim();
        let local_id = format!("local-{}", LOCAL_MESSAGE_IDS.fetch_add(1, Ordering::Relaxed));
        self.deliver(local_id, text.to_string(), true).await
    }

    /// Повторно отправляет сообщение, помеченное `Failed`.
    pub async fn retry(&self, message_id: &str) -> EstateClientResult<ChatMessage> {
        let content = {
            let state = self.lock();
            state
                .messages
                .iter()
                .find(|message| message.id == message_id && message.delivery == Delivery::Failed)
                .map(|message| message.content.clone())
        };
        let Some(content) = content else {
            return Err(EstateClientError::NotFound);
        };
        self.deliver(message_id.to_string(), content, false).await
    }

    /// Загружает историю текущего диалога с сервера.
    pub async fn load_history(&self) -> EstateClientResult<Vec<ChatMessage>> {
        self.api.auth().require_authenticated()?;
        let Some(conversation_id) = self.conversation_id() else {
            return Ok(Vec::new());
        };

        let path = format!("{CHAT_PATH}{conversation_id}/messages/");
        let messages = self.cancellable(self.api.get::<Vec<ChatMessage>>(&path)).await?;
        self.lock().messages = messages.clone();
        Ok(messages)
    }

    /// Забывает диалог. Ответы на запросы, отправленные до сброса,
    /// в новое состояние не попадают.
    pub fn reset(&self) {
        let mut state = self.lock();
        let generation = state.generation + 1;
        *state = ChatState {
            generation,
            ..ChatState::default()
        };
    }

    /// Отменяет идущие запросы.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Идентификатор диалога, если сервер его уже выдал.
    pub fn conversation_id(&self) -> Option<String> {
        self.lock().conversation_id.clone()
    }

    /// Снимок истории.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().messages.clone()
    }

    /// Последняя ошибка.
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    async fn deliver(
        &self,
        local_id: String,
        content: String,
        is_new: bool,
    ) -> EstateClientResult<ChatMessage> {
        let conversation_id = self.conversation_id();
        let payload = ChatRequestDto {
            message: &content,
            conversation_id: conversation_id.as_deref(),
        };
        if let Err(errors) = payload.validate() {
            return Err(self.record(EstateClientError::from(errors)));
        }
        if let Err(err) = self.api.auth().require_authenticated() {
            return Err(self.record(err));
        }

        let guard = {
            let mut state = self.lock();
            if state.in_flight {
                return Err(EstateClientError::Busy("chat".to_string()));
            }
            state.in_flight = true;
            if is_new {
                state.messages.push(ChatMessage {
                    id: local_id.clone(),
                    role: ChatRole::User,
                    content: content.clone(),
                    created_at: Utc::now(),
                    delivery: Delivery::Pending,
                });
            } else {
                set_delivery(&mut state.messages, &local_id, Delivery::Pending);
            }
            InFlightGuard {
                state: self.state.clone(),
                generation: state.generation,
                local_id: local_id.clone(),
            }
        };

        debug!(conversation_id = ?conversation_id, "sending chat message");
        let result = self
            .cancellable(self.api.post::<ChatRequestDto<'_>, ChatReplyDto>(CHAT_PATH, &payload))
            .await;

        let mut state = self.lock();
        if state.generation != guard.generation {
            debug!("chat was reset while sending, dropping reply");
            return result.map(|dto| dto.reply);
        }
        match result {
            Ok(dto) => {
                state.conversation_id = Some(dto.conversation_id);
                if let Some(position) = state.messages.iter().position(|m| m.id == local_id) {
                    let confirmed = dto.user_message.unwrap_or_else(|| ChatMessage {
                        delivery: Delivery::Sent,
                        ..state.messages[position].clone()
                    });
                    state.messages[position] = ChatMessage {
                        delivery: Delivery::Sent,
                        ..confirmed
                    };
                }
                state.messages.push(dto.reply.clone());
                state.last_error = None;
                Ok(dto.reply)
            }
            Err(err) => {
                set_delivery(&mut state.messages, &local_id, Delivery::Failed);
                drop(state);
                Err(self.record(err))
            }
        }
    }

    async fn cancellable<T, F>(&self, request: F) -> EstateClientResult<T>
    where
        F: std::future::Future<Output = EstateClientResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EstateClientError::Cancelled),
            result = request => result,
        }
    }

    fn record(&self, err: EstateClientError) -> EstateClientError {
        if !matches!(err, EstateClientError::Cancelled) {
            self.lock().last_error = Some(err.to_string());
        }
        err
    }

    fn lock(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn set_delivery(messages: &mut [ChatMessage], id: &str, delivery: Delivery) {
    if let Some(message) = messages.iter_mut().find(|message| message.id == id) {
        message.delivery = delivery;
    }
}
