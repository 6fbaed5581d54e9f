//! Клиентская библиотека для REST API маркетплейса недвижимости.
//!
//! Предоставляет единую точку входа (`EstateClient`) поверх:
//! - HTTP-обёртки с bearer-токеном и одним refresh+повтором на 401;
//! - хранилища сессии (`AuthStore`);
//! - кэша первой страницы с TTL (`TtlCache`);
//! - постраничных списков с оптимистичным созданием (`ResourceStore`);
//! - диалога с AI-ассистентом (`ChatStore`).
#![warn(missing_docs)]

pub mod api;
pub mod auth;
pub mod cache;
pub mod chat;
mod error;
pub mod feed;
pub mod listings;
mod models;
pub mod resource;
pub mod storage;
pub mod transport;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

pub use api::ApiClient;
pub use auth::{AuthStatus, AuthStore};
pub use cache::{Clock, DEFAULT_CACHE_TTL, SystemClock, TtlCache};
pub use chat::{ChatMessage, ChatRole, ChatStore, Delivery};
pub use error::{EstateClientError, EstateClientResult};
pub use feed::{PostStore, StoryStore};
pub use listings::{BookingStore, PropertyStore, ReviewStore};
pub use models::{
    AuthorRef, Booking, BookingDraft, BookingStatus, Comment, CommentDraft, Credentials, Cursor,
    LikeState, ListingType, Page, Post, PostDraft, PostStatus, Property, PropertyDraft,
    PropertyPatch, PropertyStatus, PropertyType, Review, ReviewDraft, Session, SignupRequest,
    Story, StoryDraft, User, ViewCount,
};
pub use resource::{BatchReport, Entry, FetchOutcome, LoadState, PendingItem, ResourceStore};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport};

/// Базовый URL по умолчанию.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

#[derive(Debug, Clone)]
/// Настройки клиента.
pub struct ClientConfig {
    /// Базовый URL API, например `https://api.example.com`.
    pub base_url: String,
    /// Таймаут установки соединения.
    pub connect_timeout: Duration,
    /// Таймаут всего запроса.
    pub request_timeout: Duration,
    /// TTL кэша первой страницы.
    pub cache_ttl: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(15),
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

#[derive(Debug, Clone)]
/// Единая точка входа: сессия, кэш и списки ресурсов над одним транспортом.
///
/// `local` хранит сессию между запусками, `session` хранит кэш страниц.
pub struct EstateClient {
    api: ApiClient,
    cache: TtlCache,
}

impl EstateClient {
    /// Создаёт клиент с HTTP-транспортом и восстанавливает сохранённую сессию.
    pub fn new(
        config: &ClientConfig,
        local: Arc<dyn KeyValueStorage>,
        session: Arc<dyn KeyValueStorage>,
    ) -> EstateClientResult<Self> {
        let transport = HttpTransport::new(
            config.base_url.clone(),
            config.connect_timeout,
            config.request_timeout,
        )?;
        let cache = TtlCache::new(session, config.cache_ttl);
        Ok(Self::with_transport(Arc::new(transport), local, cache))
    }

    /// Создаёт клиент над произвольным транспортом и готовым кэшем.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        local: Arc<dyn KeyValueStorage>,
        cache: TtlCache,
    ) -> Self {
        let auth = AuthStore::restore(local).with_session_cache(cache.clone());
        Self {
            api: ApiClient::new(transport, auth),
            cache,
        }
    }

    /// HTTP-обёртка.
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Состояние сессии.
    pub fn auth(&self) -> &AuthStore {
        self.api.auth()
    }

    /// Кэш страниц.
    pub fn cache(&self) -> &TtlCache {
        &self.cache
    }

    /// Вход.
    pub async fn login(&self, credentials: &Credentials) -> EstateClientResult<User> {
        self.api.login(credentials).await
    }

    /// Регистрация.
    pub async fn signup(&self, request: &SignupRequest) -> EstateClientResult<User> {
        self.api.signup(request).await
    }

    /// Выход: удаляет сессию и весь кэш страниц.
    pub fn logout(&self) {
        self.api.logout();
    }

    /// Профиль текущего пользователя.
    pub async fn whoami(&self) -> EstateClientResult<User> {
        self.api.current_user().await
    }

    /// Лента постов.
    pub fn posts(&self) -> PostStore {
        ResourceStore::new(self.api.clone(), self.cache.clone())
    }

    /// Истории.
    pub fn stories(&self) -> StoryStore {
        ResourceStore::new(self.api.clone(), self.cache.clone())
    }

    /// Объявления.
    pub fn properties(&self) -> PropertyStore {
        ResourceStore::new(self.api.clone(), self.cache.clone())
    }

    /// Бронирования текущего пользователя.
    pub fn bookings(&self) -> BookingStore {
        ResourceStore::new(self.api.clone(), self.cache.clone())
    }

    /// Отзывы об объявлении.
    pub fn reviews_for(&self, property_id: &str) -> ReviewStore {
        ResourceStore::new(self.api.clone(), self.cache.clone()).with_filter("property", property_id)
    }

    /// Новый диалог с ассистентом.
    pub fn chat(&self) -> ChatStore {
        ChatStore::new(self.api.clone())
    }

    /// Продолжение существующего диалога.
    pub fn resume_chat(&self, conversation_id: &str) -> ChatStore {
        ChatStore::resume(self.api.clone(), conversation_id)
    }
}
