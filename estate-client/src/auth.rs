//! Состояние аутентификации и его сохранение.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::cache::TtlCache;
use crate::error::{EstateClientError, EstateClientResult};
use crate::models::{Session, User};
use crate::storage::KeyValueStorage;

const SESSION_KEY: &str = "estate.session";
const USER_KEY: &str = "estate.user";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Состояние аутентификации.
pub enum AuthStatus {
    /// Сессии нет.
    Unauthenticated,
    /// Идёт вход или регистрация.
    Authenticating,
    /// Есть действующая сессия.
    Authenticated,
}

#[derive(Debug)]
struct AuthInner {
    status: AuthStatus,
    session: Option<Session>,
    user: Option<User>,
}

#[derive(Clone)]
/// Владелец сессии: текущий пользователь, токены и их сохранение.
///
/// Клонирование даёт ещё один handle на то же состояние.
/// Кэш страниц, привязанный через [`AuthStore::with_session_cache`],
/// очищается при каждой смене пользователя и при любом выходе.
pub struct AuthStore {
    inner: Arc<RwLock<AuthInner>>,
    storage: Arc<dyn KeyValueStorage>,
    session_cache: Option<TtlCache>,
}

impl std::fmt::Debug for AuthStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthStore")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl AuthStore {
    /// Пустое состояние без чтения хранилища.
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(AuthInner {
                status: AuthStatus::Unauthenticated,
                session: None,
                user: None,
            })),
            storage,
            session_cache: None,
        }
    }

    /// Восстанавливает сессию, сохранённую прошлым запуском.
    pub fn restore(storage: Arc<dyn KeyValueStorage>) -> Self {
        let session: Option<Session> = load_json(storage.as_ref(), SESSION_KEY);
        let user: Option<User> = session
            .as_ref()
            .and_then(|_| load_json(storage.as_ref(), USER_KEY));
        let status = if session.is_some() {
            AuthStatus::Authenticated
        } else {
            AuthStatus::Unauthenticated
        };

        Self {
            inner: Arc::new(RwLock::new(AuthInner {
                status,
                session,
                user,
            })),
            storage,
            session_cache: None,
        }
    }

    /// Привязывает кэш, данные которого принадлежат текущему пользователю.
    pub fn with_session_cache(mut self, cache: TtlCache) -> Self {
        self.session_cache = Some(cache);
        self
    }

    /// Текущее состояние.
    pub fn status(&self) -> AuthStatus {
        self.read().status
    }

    /// Есть ли действующая сессия.
    pub fn is_authenticated(&self) -> bool {
        self.status() == AuthStatus::Authenticated
    }

    /// Копия текущей сессии.
    pub fn session(&self) -> Option<Session> {
        self.read().session.clone()
    }

    /// Текущий bearer-токен.
    pub fn access_token(&self) -> Option<String> {
        let inner = self.read();
        match inner.status {
            AuthStatus::Authenticated => inner
                .session
                .as_ref()
                .map(|session| session.access_token.clone()),
            _ => None,
        }
    }

    /// Текущий refresh-токен.
    pub fn refresh_token(&self) -> Option<String> {
        self.read()
            .session
            .as_ref()
            .and_then(|session| session.refresh_token.clone())
    }

    /// Текущий пользователь.
    pub fn user(&self) -> Option<User> {
        self.read().user.clone()
    }

    /// Требует сессию, иначе [`EstateClientError::AuthRequired`].
    pub fn require_authenticated(&self) -> EstateClientResult<()> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(EstateClientError::AuthRequired)
        }
    }

    pub(crate) fn begin_authentication(&self) {
        self.write().status = AuthStatus::Authenticating;
    }

    /// Сохраняет новую сессию и переходит в `Authenticated`.
    pub(crate) fn establish(&self, session: Session, user: User) -> EstateClientResult<()> {
        if let Err(err) = self
            .persist(SESSION_KEY, &session)
            .and_then(|()| self.persist(USER_KEY, &user))
        {
            self.clear();
            return Err(err);
        }

        info!(user_id = %session.user_id, "session established");
        let mut inner = self.write();
        let same_user = inner
            .session
            .as_ref()
            .is_some_and(|current| current.user_id == session.user_id);
        if !same_user {
            self.clear_session_cache();
        }
        inner.status = AuthStatus::Authenticated;
        inner.session = Some(session);
        inner.user = Some(user);
        Ok(())
    }

    /// Заменяет токены после успешного refresh.
    pub(crate) fn replace_tokens(
        &self,
        access_token: String,
        refresh_token: Option<String>,
        expires_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> EstateClientResult<()> {
        let session = {
            let inner = self.read();
            let Some(current) = inner.session.as_ref() else {
                return Err(EstateClientError::SessionExpired);
            };
            Session {
                user_id: current.user_id.clone(),
                access_token,
                refresh_token: refresh_token.or_else(|| current.refresh_token.clone()),
                expires_at,
            }
        };

        self.persist(SESSION_KEY, &session)?;
        let mut inner = self.write();
        inner.session = Some(session);
        inner.status = AuthStatus::Authenticated;
        Ok(())
    }

    /// Обновляет сохранённый профиль.
    pub(crate) fn set_user(&self, user: User) -> EstateClientResult<()> {
        self.persist(USER_KEY, &user)?;
        self.write().user = Some(user);
        Ok(())
    }

    /// Полный выход: сначала чистит хранилище, затем состояние.
    ///
    /// Ошибки хранилища логируются, но не оставляют частичного состояния.
    pub fn clear(&self) {
        for key in [SESSION_KEY, USER_KEY] {
            if let Err(err) = self.storage.remove(key) {
                warn!(key, error = %err, "failed to remove stored credentials");
            }
        }

        let mut inner = self.write();
        if inner.status != AuthStatus::Unauthenticated {
            info!("session cleared");
        }
        inner.status = AuthStatus::Unauthenticated;
        inner.session = None;
        inner.user = None;
        drop(inner);
        self.clear_session_cache();
    }

    fn clear_session_cache(&self) {
        if let Some(cache) = &self.session_cache {
            cache.clear_all();
        }
    }

    fn persist<T: serde::Serialize>(&self, key: &str, value: &T) -> EstateClientResult<()> {
        let raw = serde_json::to_string(value)
            .map_err(|err| EstateClientError::Storage(format!("serialize {key}: {err}")))?;
        self.storage.set(key, &raw)
    }

    fn read(&self) -> RwLockReadGuard<'_, AuthInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, AuthInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn load_json<T: DeserializeOwned>(storage: &dyn KeyValueStorage, key: &str) -> Option<T> {
    let raw = match storage.get(key) {
        Ok(raw) => raw?,
        Err(err) => {
            warn!(key, error = %err, "failed to read stored credentials");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key, error = %err, "ignoring unreadable stored credentials");
            None
        }
    }
}
