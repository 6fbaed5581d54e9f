//! Кэш с TTL поверх [`KeyValueStorage`].
//!
//! Вся логика свежести живёт здесь: запись старше TTL считается
//! отсутствующей и удаляется при чтении.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::error::{EstateClientError, EstateClientResult};
use crate::storage::KeyValueStorage;

/// TTL по умолчанию для первой страницы списка.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

const KEY_PREFIX: &str = "estate.cache.";

/// Источник текущего времени.
pub trait Clock: Send + Sync {
    /// Текущий момент (UTC).
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
/// Системные часы.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Запись кэша вместе с моментом получения данных.
pub struct CacheEntry<T> {
    /// Закэшированные данные.
    pub payload: T,
    /// Когда данные получены с сервера.
    pub fetched_at: DateTime<Utc>,
    /// Время жизни записи в секундах.
    pub ttl_secs: u64,
}

impl<T> CacheEntry<T> {
    /// Свежа ли запись к моменту `now`.
    ///
    /// Запись с `fetched_at` в будущем считается протухшей.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.fetched_at);
        if age < TimeDelta::zero() {
            return false;
        }
        let Ok(ttl) = TimeDelta::from_std(Duration::from_secs(self.ttl_secs)) else {
            return false;
        };
        age < ttl
    }
}

#[derive(Clone)]
/// Кэш с TTL, разделяемый между хранилищами ресурсов.
pub struct TtlCache {
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl std::fmt::Debug for TtlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl TtlCache {
    /// Кэш с системными часами.
    pub fn new(storage: Arc<dyn KeyValueStorage>, default_ttl: Duration) -> Self {
        Self::with_clock(storage, Arc::new(SystemClock), default_ttl)
    }

    /// Кэш с подменяемыми часами.
    pub fn with_clock(
        storage: Arc<dyn KeyValueStorage>,
        clock: Arc<dyn Clock>,
        default_ttl: Duration,
    ) -> Self {
        Self {
            storage,
            clock,
            default_ttl,
        }
    }

    /// TTL, применяемый в [`TtlCache::set_default`].
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Текущее время по часам кэша.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Возвращает свежие данные по ключу или `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_entry(key).map(|entry| entry.payload)
    }

    /// Возвращает свежую запись целиком.
    ///
    /// Протухшие и повреждённые записи удаляются.
    pub fn get_entry<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        let storage_key = storage_key(key);
        let raw = match self.storage.get(&storage_key) {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(key, error = %err, "cache read failed");
                return None;
            }
        };

        let entry = match serde_json::from_str::<CacheEntry<T>>(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(key, error = %err, "dropping unreadable cache entry");
                self.drop_key(&storage_key);
                return None;
            }
        };

        if !entry.is_fresh(self.clock.now()) {
            debug!(key, fetched_at = %entry.fetched_at, "cache entry expired");
            self.drop_key(&storage_key);
            return None;
        }

        debug!(key, "cache hit");
        Some(entry)
    }

    /// Сохраняет данные с заданным TTL.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> EstateClientResult<()> {
        let entry = CacheEntry {
            payload: value,
            fetched_at: self.clock.now(),
            ttl_secs: ttl.as_secs(),
        };
        let raw = serde_json::to_string(&entry)
            .map_err(|err| EstateClientError::Storage(format!("cache serialize: {err}")))?;
        self.storage.set(&storage_key(key), &raw)
    }

    /// Сохраняет данные с TTL по умолчанию.
    pub fn set_default<T: Serialize>(&self, key: &str, value: &T) -> EstateClientResult<()> {
        self.set(key, value, self.default_ttl)
    }

    /// Удаляет запись.
    pub fn invalidate(&self, key: &str) {
        self.drop_key(&storage_key(key));
    }

    /// Удаляет все записи кэша; прочие ключи хранилища не трогает.
    pub fn clear_all(&self) {
        match self.storage.remove_prefix(KEY_PREFIX) {
            Ok(()) => debug!("cache cleared"),
            Err(err) => warn!(error = %err, "cache clear failed"),
        }
    }

    fn drop_key(&self, storage_key: &str) {
        if let Err(err) = self.storage.remove(storage_key) {
            warn!(key = storage_key, error = %err, "cache remove failed");
        }
    }
}

fn storage_key(key: &str) -> String {
    format!("{KEY_PREFIX}{key}")
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    use super::Clock;

    /// Часы, которые двигаются только вручную.
    pub(crate) struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub(crate) fn new() -> Self {
            Self {
                now: Mutex::new(
                    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
                        .single()
                        .expect("valid ts"),
                ),
            }
        }

        pub(crate) fn advance(&self, delta: TimeDelta) {
            let mut now = self.now.lock().expect("clock mutex poisoned");
            *now += delta;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().expect("clock mutex poisoned")
        }
    }
}
