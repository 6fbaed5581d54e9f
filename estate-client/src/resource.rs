//! Кэшируемый постраничный список ресурсов с оптимистичным созданием.
//!
//! [`ResourceStore`] держит упорядоченный список записей, курсор следующей
//! страницы, состояние загрузки и последнюю ошибку. Первая страница кэшируется
//! через [`TtlCache`]; дозагрузка кэш не трогает.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use validator::Validate;

use crate::api::ApiClient;
use crate::cache::TtlCache;
use crate::error::{EstateClientError, EstateClientResult};
use crate::models::{Cursor, LikeState, Page, ViewCount};
use crate::transport::ApiRequest;

static TEMP_IDS: AtomicU64 = AtomicU64::new(1);

/// Сущность REST-коллекции.
pub trait Resource:
    Debug + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Черновик, из которого сервер создаёт сущность.
    type Draft: Debug + Clone + Serialize + Validate + Send + Sync + 'static;

    /// Путь коллекции со слешем на конце, например `/api/posts/`.
    const COLLECTION: &'static str;
    /// Ключ кэша первой страницы.
    const CACHE_KEY: &'static str;

    /// Стабильный идентификатор.
    fn id(&self) -> &str;
}

/// Сущность с лайками.
pub trait Likeable: Resource {
    /// Применяет авторитетное состояние лайка от сервера.
    fn apply_like(&mut self, state: LikeState);
}

/// Сущность со счётчиком просмотров.
pub trait Viewable: Resource {
    /// Применяет авторитетный счётчик просмотров от сервера.
    fn apply_views(&mut self, views: ViewCount);
}

#[derive(Debug, Clone)]
/// Ещё не подтверждённая сервером запись.
pub struct PendingItem<D> {
    /// Временный клиентский идентификатор.
    pub temp_id: String,
    /// Отправленный черновик.
    pub draft: D,
    /// Когда запись добавлена локально.
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
/// Элемент списка.
pub enum Entry<R: Resource> {
    /// Подтверждённая сервером сущность.
    Confirmed(R),
    /// Оптимистичная запись, ждущая ответа сервера.
    Pending(PendingItem<R::Draft>),
}

impl<R: Resource> Entry<R> {
    /// Идентификатор: серверный или временный.
    pub fn id(&self) -> &str {
        match self {
            Self::Confirmed(item) => item.id(),
            Self::Pending(pending) => &pending.temp_id,
        }
    }

    /// Подтверждённая сущность, если есть.
    pub fn confirmed(&self) -> Option<&R> {
        match self {
            Self::Confirmed(item) => Some(item),
            Self::Pending(_) => None,
        }
    }

    /// Запись ещё ждёт подтверждения.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Состояние загрузки списка.
pub enum LoadState {
    /// Ничего не загружалось.
    Idle,
    /// Идёт загрузка страницы.
    Loading,
    /// Последняя загрузка успешна.
    Success,
    /// Последняя загрузка завершилась ошибкой.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Чем закончился вызов загрузки.
pub enum FetchOutcome {
    /// Данные взяты из свежего кэша, сетевого запроса не было.
    Cached,
    /// Данные получены с сервера.
    Fetched,
    /// Нечего делать: нет курсора или загрузка уже идёт.
    Skipped,
}

#[derive(Debug)]
/// Итог пакетной операции: каждая единица отчитывается отдельно.
pub struct BatchReport<T> {
    /// Успешные результаты.
    pub succeeded: Vec<T>,
    /// Индекс во входных данных и ошибка.
    pub failed: Vec<(usize, EstateClientError)>,
}

impl<T> BatchReport<T> {
    /// Все единицы прошли успешно.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Serialize, Deserialize)]
struct CachedPage<R> {
    items: Vec<R>,
    next: Option<Cursor>,
}

struct StoreState<R: Resource> {
    entries: Vec<Entry<R>>,
    next: Option<Cursor>,
    load_state: LoadState,
    last_error: Option<String>,
    page_in_flight: bool,
    busy_ids: HashSet<String>,
    // загружены поштучно через fetch_one, переживают обновление первой страницы
    pinned: HashSet<String>,
}

impl<R: Resource> StoreState<R> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            next: None,
            load_state: LoadState::Idle,
            last_error: None,
            page_in_flight: false,
            busy_ids: HashSet::new(),
            pinned: HashSet::new(),
        }
    }

    fn merge_first_page(&mut self, items: Vec<R>, next: Option<Cursor>) {
        let fetched: HashSet<String> = items.iter().map(|item| item.id().to_string()).collect();

        let mut pending = Vec::new();
        let mut pinned = Vec::new();
        for entry in std::mem::take(&mut self.entries) {
            match entry {
                Entry::Pending(_) => pending.push(entry),
                Entry::Confirmed(item) => {
                    if self.pinned.contains(item.id()) && !fetched.contains(item.id()) {
                        pinned.push(Entry::Confirmed(item));
                    }
                }
            }
        }

        self.entries = pending;
        self.entries.extend(items.into_iter().map(Entry::Confirmed));
        self.entries.extend(pinned);
        self.next = next;
    }

    fn append_page(&mut self, items: Vec<R>) {
        let mut positions: HashMap<String, usize> = self
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (entry.id().to_string(), index))
            .collect();

        for item in items {
            match positions.get(item.id()) {
                Some(&index) => self.entries[index] = Entry::Confirmed(item),
                None => {
                    positions.insert(item.id().to_string(), self.entries.len());
                    self.entries.push(Entry::Confirmed(item));
                }
            }
        }
    }

    fn upsert(&mut self, item: R) {
        match self.position(item.id()) {
            Some(index) => self.entries[index] = Entry::Confirmed(item),
            None => self.entries.push(Entry::Confirmed(item)),
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id() == id)
    }
}

/// Повторы одного id внутри страницы: остаётся первая позиция, поля от
/// последнего вхождения.
fn dedupe<R: Resource>(items: Vec<R>) -> Vec<R> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<R> = Vec::with_capacity(items.len());
    for item in items {
        match positions.get(item.id()) {
            Some(&index) => unique[index] = item,
            None => {
                positions.insert(item.id().to_string(), unique.len());
                unique.push(item);
            }
        }
    }
    unique
}

struct PageGuard<R: Resource> {
    state: Arc<Mutex<StoreState<R>>>,
}

impl<R: Resource> Drop for PageGuard<R> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.page_in_flight = false;
    }
}

struct IdGuard<R: Resource> {
    state: Arc<Mutex<StoreState<R>>>,
    id: String,
}

impl<R: Resource> Drop for IdGuard<R> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.busy_ids.remove(&self.id);
    }
}

struct PageStart<R: Resource> {
    _guard: PageGuard<R>,
    cursor: Option<Cursor>,
    previous: LoadState,
}

/// Список ресурсов одного типа с кэшем, пагинацией и мутациями.
///
/// Клонирование даёт ещё один handle на то же состояние.
pub struct ResourceStore<R: Resource> {
    api: ApiClient,
    cache: TtlCache,
    filters: Vec<(String, String)>,
    state: Arc<Mutex<StoreState<R>>>,
    cancel: CancellationToken,
}

impl<R: Resource> Clone for ResourceStore<R> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            cache: self.cache.clone(),
            filters: self.filters.clone(),
            state: self.state.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<R: Resource> Debug for ResourceStore<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceStore")
            .field("collection", &R::COLLECTION)
            .field("filters", &self.filters)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl<R: Resource> ResourceStore<R> {
    /// Пустой список поверх общего клиента и кэша.
    pub fn new(api: ApiClient, cache: TtlCache) -> Self {
        Self {
            api,
            cache,
            filters: Vec::new(),
            state: Arc::new(Mutex::new(StoreState::new())),
            cancel: CancellationToken::new(),
        }
    }

    /// Добавляет фильтр к запросу списка (и к ключу кэша).
    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((key.into(), value.into()));
        self
    }

    // --- загрузка ---

    /// Загружает первую страницу.
    ///
    /// Свежий кэш используется без сетевого запроса. Если загрузка страницы
    /// уже идёт, вызов ничего не делает.
    pub async fn fetch_first_page(&self) -> EstateClientResult<FetchOutcome> {
        let key = self.cache_key();
        if let Some(page) = self.cache.get::<CachedPage<R>>(&key) {
            let mut state = self.lock();
            state.merge_first_page(page.items, page.next);
            state.load_state = LoadState::Success;
            state.last_error = None;
            return Ok(FetchOutcome::Cached);
        }

        let Some(start) = self.begin_page(false) else {
            debug!(collection = R::COLLECTION, "page fetch already in flight");
            return Ok(FetchOutcome::Skipped);
        };

        debug!(collection = R::COLLECTION, "fetching first page");
        let request = ApiRequest::new(Method::GET, R::COLLECTION).with_query(self.filters.clone());
        let page = match self.cancellable(self.api.send::<Page<R>>(request)).await {
            Ok(page) => page,
            Err(err) => return Err(self.fail_load(err, start.previous)),
        };

        let cached = CachedPage {
            items: dedupe(page.results),
            next: page.next,
        };
        if let Err(err) = self.cache.set_default(&key, &cached) {
            warn!(key = %key, error = %err, "failed to cache first page");
        }

        let mut state = self.lock();
        state.merge_first_page(cached.items, cached.next);
        state.load_state = LoadState::Success;
        state.last_error = None;
        Ok(FetchOutcome::Fetched)
    }

    /// Сбрасывает кэш и загружает первую страницу заново.
    pub async fn refresh(&self) -> EstateClientResult<FetchOutcome> {
        self.cache.invalidate(&self.cache_key());
        self.fetch_first_page().await
    }

    /// Дозагружает следующую страницу по курсору.
    ///
    /// Без курсора или при идущей загрузке ничего не делает. Кэш не
    /// обновляется: свежей считается только первая страница.
    pub async fn load_more(&self) -> EstateClientResult<FetchOutcome> {
        let Some(start) = self.begin_page(true) else {
            return Ok(FetchOutcome::Skipped);
        };
        let Some(cursor) = start.cursor.as_ref() else {
            return Ok(FetchOutcome::Skipped);
        };

        debug!(collection = R::COLLECTION, cursor = cursor.as_str(), "loading next page");
        let request = self.cursor_request(cursor);
        let page = match self.cancellable(self.api.send::<Page<R>>(request)).await {
            Ok(page) => page,
            Err(err) => return Err(self.fail_load(err, start.previous)),
        };

        let mut state = self.lock();
        state.append_page(dedupe(page.results));
        state.next = page.next;
        state.load_state = LoadState::Success;
        state.last_error = None;
        Ok(FetchOutcome::Fetched)
    }

    /// Загружает одну сущность и вставляет её в список.
    ///
    /// Такая сущность переживает обновление первой страницы, даже если её там
    /// нет.
    pub async fn fetch_one(&self, id: &str) -> EstateClientResult<R> {
        let path = Self::item_path(id, None);
        let item = match self.cancellable(self.api.get::<R>(&path)).await {
            Ok(item) => item,
            Err(err) => {
                self.record_error(&err);
                return Err(err);
            }
        };

        let mut state = self.lock();
        state.pinned.insert(item.id().to_string());
        state.upsert(item.clone());
        Ok(item)
    }

    // --- мутации ---

    /// Создаёт сущность с оптимистичной записью в начале списка.
    ///
    /// При отказе сервера запись удаляется, ошибка сохраняется.
    pub async fn create(&self, draft: R::Draft) -> EstateClientResult<R> {
        if let Err(errors) = draft.validate() {
            let err = EstateClientError::from(errors);
            self.record_error(&err);
            return Err(err);
        }
        if let Err(err) = self.api.auth().require_authenticated() {
            self.record_error(&err);
            return Err(err);
        }

        let temp_id = format!("local-{}", TEMP_IDS.fetch_add(1, Ordering::Relaxed));
        self.lock().entries.insert(
            0,
            Entry::Pending(PendingItem {
                temp_id: temp_id.clone(),
                draft: draft.clone(),
                created_at: self.cache.now(),
            }),
        );

        let result = self
            .cancellable(self.api.post::<R::Draft, R>(R::COLLECTION, &draft))
            .await;

        let mut state = self.lock();
        match result {
            Ok(item) => {
                state
                    .entries
                    .retain(|entry| !matches!(entry, Entry::Confirmed(existing) if existing.id() == item.id()));
                match state.position(&temp_id) {
                    Some(index) => state.entries[index] = Entry::Confirmed(item.clone()),
                    None => state.entries.insert(0, Entry::Confirmed(item.clone())),
                }
                state.last_error = None;
                drop(state);

                self.cache.invalidate(&self.cache_key());
                Ok(item)
            }
            Err(err) => {
                state.entries.retain(|entry| entry.id() != temp_id);
                drop(state);

                self.record_error(&err);
                Err(err)
            }
        }
    }

    /// Создаёт несколько сущностей; неудача одной не останавливает остальные.
    pub async fn create_many(&self, drafts: Vec<R::Draft>) -> BatchReport<R> {
        let mut report = BatchReport {
            succeeded: Vec::new(),
            failed: Vec::new(),
        };
        for (index, draft) in drafts.into_iter().enumerate() {
            match self.create(draft).await {
                Ok(item) => report.succeeded.push(item),
                Err(err) => report.failed.push((index, err)),
            }
        }
        report
    }

    /// Частично изменяет сущность; список обновляется после ответа сервера.
    pub async fn update<P>(&self, id: &str, patch: &P) -> EstateClientResult<R>
    where
        P: Serialize + Validate + Sync,
    {
        if let Err(errors) = patch.validate() {
            let err = EstateClientError::from(errors);
            self.record_error(&err);
            return Err(err);
        }

        let path = Self::item_path(id, None);
        let item = self.mutate(id, self.api.patch::<P, R>(&path, patch)).await?;
        self.replace_confirmed(item.clone());
        Ok(item)
    }

    /// Удаляет сущность. Из списка она уходит только после ответа сервера.
    pub async fn delete(&self, id: &str) -> EstateClientResult<()> {
        let path = Self::item_path(id, None);
        self.mutate(id, self.api.delete(&path)).await?;

        let mut state = self.lock();
        state.entries.retain(|entry| entry.id() != id);
        state.pinned.remove(id);
        state.last_error = None;
        drop(state);

        self.cache.invalidate(&self.cache_key());
        Ok(())
    }

    /// Действие над сущностью (`POST {id}/{action}/`), возвращающее её новую
    /// версию.
    pub(crate) async fn perform(&self, id: &str, action: &str) -> EstateClientResult<R> {
        let path = Self::item_path(id, Some(action));
        let item = self.mutate(id, self.api.post_empty::<R>(&path)).await?;
        self.replace_confirmed(item.clone());
        Ok(item)
    }

    // --- состояние ---

    /// Снимок списка.
    pub fn entries(&self) -> Vec<Entry<R>> {
        self.lock().entries.clone()
    }

    /// Только подтверждённые сущности.
    pub fn items(&self) -> Vec<R> {
        self.lock()
            .entries
            .iter()
            .filter_map(|entry| entry.confirmed().cloned())
            .collect()
    }

    /// Сущность по id.
    pub fn get(&self, id: &str) -> Option<R> {
        self.lock()
            .entries
            .iter()
            .find(|entry| entry.id() == id)
            .and_then(|entry| entry.confirmed().cloned())
    }

    /// Длина списка, включая ожидающие записи.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Список пуст.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Есть ли следующая страница.
    pub fn has_more(&self) -> bool {
        self.lock().next.is_some()
    }

    /// Состояние загрузки.
    pub fn load_state(&self) -> LoadState {
        self.lock().load_state
    }

    /// Последняя ошибка для показа пользователю.
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Скрывает показанную ошибку.
    pub fn clear_error(&self) {
        self.lock().last_error = None;
    }

    /// Отменяет запросы этого списка; их результаты не применяются.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Список закрыт.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    // --- внутреннее ---

    pub(crate) fn api(&self) -> &ApiClient {
        &self.api
    }

    pub(crate) fn item_path(id: &str, action: Option<&str>) -> String {
        match action {
            Some(action) => format!("{}{id}/{action}/", R::COLLECTION),
            None => format!("{}{id}/", R::COLLECTION),
        }
    }

    pub(crate) fn cache_key(&self) -> String {
        if self.filters.is_empty() {
            return R::CACHE_KEY.to_string();
        }
        let query: Vec<String> = self
            .filters
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        format!("{}?{}", R::CACHE_KEY, query.join("&"))
    }

    pub(crate) fn replace_confirmed(&self, item: R) {
        self.lock().upsert(item);
        self.cache.invalidate(&self.cache_key());
    }

    pub(crate) fn patch_item(&self, id: &str, apply: impl FnOnce(&mut R)) {
        let mut state = self.lock();
        if let Some(Entry::Confirmed(item)) =
            state.entries.iter_mut().find(|entry| entry.id() == id)
        {
            apply(item);
        }
        drop(state);
        self.cache.invalidate(&self.cache_key());
    }

    /// Мутация над одной сущностью: требует вход, не пускает параллельную
    /// мутацию того же id и не трогает ожидающие записи.
    pub(crate) async fn mutate<T, F>(&self, id: &str, request: F) -> EstateClientResult<T>
    where
        F: Future<Output = EstateClientResult<T>>,
    {
        if let Err(err) = self.api.auth().require_authenticated() {
            self.record_error(&err);
            return Err(err);
        }
        let _guard = self.begin_mutation(id)?;

        let result = self.cancellable(request).await;
        if let Err(err) = &result {
            self.record_error(err);
        }
        result
    }

    pub(crate) async fn cancellable<T, F>(&self, request: F) -> EstateClientResult<T>
    where
        F: Future<Output = EstateClientResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EstateClientError::Cancelled),
            result = request => result,
        }
    }

    pub(crate) fn record_error(&self, err: &EstateClientError) {
        if matches!(
            err,
            EstateClientError::Cancelled | EstateClientError::Busy(_)
        ) {
            return;
        }
        self.lock().last_error = Some(err.to_string());
    }

    fn fail_load(&self, err: EstateClientError, previous: LoadState) -> EstateClientError {
        let mut state = self.lock();
        if matches!(err, EstateClientError::Cancelled) {
            state.load_state = previous;
        } else {
            state.load_state = LoadState::Error;
            state.last_error = Some(err.to_string());
        }
        err
    }

    fn begin_page(&self, cursor_required: bool) -> Option<PageStart<R>> {
        let mut state = self.lock();
        if state.page_in_flight {
            return None;
        }
        let cursor = state.next.clone();
        if cursor_required && cursor.is_none() {
            return None;
        }
        state.page_in_flight = true;
        let previous = std::mem::replace(&mut state.load_state, LoadState::Loading);
        Some(PageStart {
            _guard: PageGuard {
                state: self.state.clone(),
            },
            cursor,
            previous,
        })
    }

    fn begin_mutation(&self, id: &str) -> EstateClientResult<IdGuard<R>> {
        let mut state = self.lock();
        let pending = state
            .entries
            .iter()
            .any(|entry| entry.is_pending() && entry.id() == id);
        if pending || !state.busy_ids.insert(id.to_string()) {
            return Err(EstateClientError::Busy(id.to_string()));
        }
        Ok(IdGuard {
            state: self.state.clone(),
            id: id.to_string(),
        })
    }

    fn cursor_request(&self, cursor: &Cursor) -> ApiRequest {
        let raw = cursor.as_str();
        // курсор-URL отправляем как есть, голый токен параметром
        if raw.starts_with('/') || raw.starts_with("http://") || raw.starts_with("https://") {
            return ApiRequest::new(Method::GET, raw);
        }
        let mut query = self.filters.clone();
        query.push(("cursor".to_string(), raw.to_string()));
        ApiRequest::new(Method::GET, R::COLLECTION).with_query(query)
    }

    fn lock(&self) -> MutexGuard<'_, StoreState<R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<R: Likeable> ResourceStore<R> {
    /// Ставит лайк. Счётчик берётся только из ответа сервера.
    pub async fn like(&self, id: &str) -> EstateClientResult<LikeState> {
        self.toggle_like(id, "like").await
    }

    /// Снимает лайк. Счётчик берётся только из ответа сервера.
    pub async fn unlike(&self, id: &str) -> EstateClientResult<LikeState> {
        self.toggle_like(id, "unlike").await
    }

    async fn toggle_like(&self, id: &str, action: &str) -> EstateClientResult<LikeState> {
        let path = Self::item_path(id, Some(action));
        let like = self
            .mutate(id, self.api.post_empty::<LikeState>(&path))
            .await?;
        self.patch_item(id, |item| item.apply_like(like));
        Ok(like)
    }
}

impl<R: Viewable> ResourceStore<R> {
    /// Отмечает просмотр; вход не требуется.
    pub async fn record_view(&self, id: &str) -> EstateClientResult<ViewCount> {
        let path = Self::item_path(id, Some("view"));
        let views = match self.cancellable(self.api.post_empty::<ViewCount>(&path)).await {
            Ok(views) => views,
            Err(err) => {
                self.record_error(&err);
                return Err(err);
            }
        };
        self.patch_item(id, |item| item.apply_views(views));
        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeDelta;
    use serde_json::json;

    use super::*;
    use crate::cache::DEFAULT_CACHE_TTL;
    use crate::cache::testing::ManualClock;
    use crate::models::{Post, PostDraft};
    use crate::storage::MemoryStorage;
    use crate::testing::{FakeTransport, anonymous_client, authed_client, page_json, post_json};
    use crate::transport::ApiResponse;

    fn cache() -> TtlCache {
        TtlCache::new(Arc::new(MemoryStorage::new()), DEFAULT_CACHE_TTL)
    }

    fn store(client: ApiClient) -> ResourceStore<Post> {
        ResourceStore::new(client, cache())
    }

    fn draft(content: &str) -> PostDraft {
        PostDraft {
            content: content.to_string(),
            images: Vec::new(),
            location: None,
            property_id: None,
        }
    }

    fn ids(store: &ResourceStore<Post>) -> Vec<String> {
        store
            .entries()
            .iter()
            .map(|entry| entry.id().to_string())
            .collect()
    }

    fn has_cursor(request: &ApiRequest) -> bool {
        request.query.iter().any(|(key, _)| key == "cursor")
    }

    #[tokio::test]
    async fn second_fetch_within_ttl_uses_cache() {
        let transport = Arc::new(FakeTransport::new(|_| {
            ApiResponse::json(200, &page_json(vec![post_json("1", 0)], None))
        }));
        let client = anonymous_client(transport.clone());
        let shared = cache();

        let first = ResourceStore::<Post>::new(client.clone(), shared.clone());
        assert_eq!(first.fetch_first_page().await.expect("fetch"), FetchOutcome::Fetched);

        let second = ResourceStore::<Post>::new(client, shared);
        assert_eq!(second.fetch_first_page().await.expect("fetch"), FetchOutcome::Cached);
        assert_eq!(ids(&second), vec!["1"]);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn expired_cache_triggers_refetch() {
        let transport = Arc::new(FakeTransport::new(|_| {
            ApiResponse::json(200, &page_json(vec![post_json("1", 0)], None))
        }));
        let clock = Arc::new(ManualClock::new());
        let cache = TtlCache::with_clock(
            Arc::new(MemoryStorage::new()),
            clock.clone(),
            DEFAULT_CACHE_TTL,
        );
        let posts = ResourceStore::<Post>::new(anonymous_client(transport.clone()), cache);

        posts.fetch_first_page().await.expect("fetch");
        clock.advance(TimeDelta::seconds(299));
        assert_eq!(posts.fetch_first_page().await.expect("fetch"), FetchOutcome::Cached);

        clock.advance(TimeDelta::seconds(1));
        assert_eq!(posts.fetch_first_page().await.expect("fetch"), FetchOutcome::Fetched);
        assert_eq!(transport.count("/api/posts/"), 2);
    }

    #[tokio::test]
    async fn load_more_appends_and_exhausts_cursor() {
        let transport = Arc::new(FakeTransport::new(|req| {
            if has_cursor(req) {
                ApiResponse::json(200, &page_json(vec![post_json("D", 0), post_json("E", 0)], None))
            } else {
                let items = vec![post_json("A", 0), post_json("B", 0), post_json("C", 0)];
                ApiResponse::json(200, &page_json(items, Some("p2")))
            }
        }));
        let posts = store(anonymous_client(transport.clone()));

        posts.fetch_first_page().await.expect("fetch");
        assert!(posts.has_more());

        assert_eq!(posts.load_more().await.expect("more"), FetchOutcome::Fetched);
        assert_eq!(ids(&posts), vec!["A", "B", "C", "D", "E"]);
        assert!(!posts.has_more());
        assert_eq!(posts.load_state(), LoadState::Success);

        let cursor_request = &transport.requests()[1];
        assert_eq!(cursor_request.path, "/api/posts/");
        assert_eq!(
            cursor_request.query,
            vec![("cursor".to_string(), "p2".to_string())]
        );

        assert_eq!(posts.load_more().await.expect("more"), FetchOutcome::Skipped);
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn overlapping_pages_do_not_duplicate_ids() {
        let transport = Arc::new(FakeTransport::new(|req| {
            if req.path.starts_with("http") {
                let items = vec![post_json("B", 4), post_json("C", 0), post_json("C", 1)];
                ApiResponse::json(200, &page_json(items, None))
            } else {
                let items = vec![post_json("A", 0), post_json("B", 0)];
                ApiResponse::json(
                    200,
                    &page_json(items, Some("http://api.test/api/posts/?cursor=xyz")),
                )
            }
        }));
        let posts = store(anonymous_client(transport.clone()));

        posts.fetch_first_page().await.expect("fetch");
        posts.load_more().await.expect("more");

        assert_eq!(ids(&posts), vec!["A", "B", "C"]);
        assert_eq!(posts.get("B").map(|post| post.likes_count), Some(4));
        assert_eq!(posts.get("C").map(|post| post.likes_count), Some(1));
        assert_eq!(
            transport.requests()[1].path,
            "http://api.test/api/posts/?cursor=xyz"
        );
    }

    #[tokio::test]
    async fn concurrent_load_more_sends_one_request() {
        let transport = Arc::new(
            FakeTransport::new(|req| {
                if has_cursor(req) {
                    ApiResponse::json(200, &page_json(vec![post_json("B", 0)], None))
                } else {
                    ApiResponse::json(200, &page_json(vec![post_json("A", 0)], Some("p2")))
                }
            })
            .with_delay(Duration::from_millis(30)),
        );
        let posts = store(anonymous_client(transport.clone()));
        posts.fetch_first_page().await.expect("fetch");

        let (first, second) = tokio::join!(posts.load_more(), posts.load_more());
        let outcomes = [first.expect("more"), second.expect("more")];

        assert!(outcomes.contains(&FetchOutcome::Fetched));
        assert!(outcomes.contains(&FetchOutcome::Skipped));
        assert_eq!(
            transport
                .requests()
                .iter()
                .filter(|request| has_cursor(request))
                .count(),
            1
        );
        assert_eq!(ids(&posts), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn failed_fetch_sets_error_state() {
        let transport = Arc::new(FakeTransport::new(|_| {
            ApiResponse::json(500, &json!({}))
        }));
        let posts = store(anonymous_client(transport));

        let result = posts.fetch_first_page().await;
        assert!(matches!(result, Err(EstateClientError::Api { status: 500, .. })));
        assert_eq!(posts.load_state(), LoadState::Error);
        assert!(posts.last_error().is_some());

        posts.clear_error();
        assert!(posts.last_error().is_none());
    }

    #[tokio::test]
    async fn create_shows_pending_entry_then_confirms() {
        let transport = Arc::new(
            FakeTransport::new(|_| ApiResponse::json(201, &post_json("42", 0)))
                .with_delay(Duration::from_millis(30)),
        );
        let posts = store(authed_client(transport.clone()));

        let (created, pending_seen) = tokio::join!(posts.create(draft("Sunny loft")), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            posts.entries().first().is_some_and(Entry::is_pending)
        });

        assert!(pending_seen);
        assert_eq!(created.expect("create").id, "42");
        assert_eq!(ids(&posts), vec!["42"]);
        assert!(!posts.entries()[0].is_pending());
    }

    #[tokio::test]
    async fn rejected_create_rolls_back() {
        let transport = Arc::new(FakeTransport::new(|req| match req.method {
            Method::POST => ApiResponse::json(400, &json!({"detail": "Content rejected"})),
            _ => ApiResponse::json(
                200,
                &page_json(vec![post_json("1", 0), post_json("2", 0)], None),
            ),
        }));
        let posts = store(authed_client(transport.clone()));
        posts.fetch_first_page().await.expect("fetch");

        let result = posts.create(draft("Sunny loft")).await;

        assert!(matches!(result, Err(EstateClientError::Api { status: 400, .. })));
        assert_eq!(ids(&posts), vec!["1", "2"]);
        assert_eq!(posts.load_state(), LoadState::Success);
        assert_eq!(posts.last_error().as_deref(), Some("Content rejected"));
    }

    #[tokio::test]
    async fn invalid_or_anonymous_create_sends_nothing() {
        let transport = Arc::new(FakeTransport::new(|_| ApiResponse::json(201, &json!({}))));

        let posts = store(authed_client(transport.clone()));
        let result = posts.create(draft("")).await;
        assert!(matches!(result, Err(EstateClientError::Validation(_))));
        assert!(posts.is_empty());

        let anonymous = store(anonymous_client(transport.clone()));
        let result = anonymous.create(draft("Sunny loft")).await;
        assert!(matches!(result, Err(EstateClientError::AuthRequired)));
        assert!(anonymous.last_error().is_some());

        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn create_many_reports_each_draft() {
        let transport = Arc::new(FakeTransport::new(|req| {
            let content = req
                .body
                .as_ref()
                .and_then(|body| body["content"].as_str())
                .unwrap_or_default()
                .to_string();
            if content == "taken" {
                ApiResponse::json(409, &json!({"detail": "Duplicate"}))
            } else {
                ApiResponse::json(201, &post_json(&content, 0))
            }
        }));
        let posts = store(authed_client(transport));

        let report = posts
            .create_many(vec![draft("one"), draft(""), draft("taken"), draft("two")])
            .await;

        assert!(!report.is_complete());
        assert_eq!(report.succeeded.len(), 2);
        let failed: Vec<usize> = report.failed.iter().map(|(index, _)| *index).collect();
        assert_eq!(failed, vec![1, 2]);
        assert_eq!(posts.len(), 2);
    }

    #[tokio::test]
    async fn like_uses_server_counter() {
        let transport = Arc::new(FakeTransport::new(|req| {
            if req.path.ends_with("/like/") {
                ApiResponse::json(200, &json!({"likes_count": 10, "is_liked": true}))
            } else {
                ApiResponse::json(200, &page_json(vec![post_json("1", 3)], None))
            }
        }));
        let posts = store(authed_client(transport.clone()));
        posts.fetch_first_page().await.expect("fetch");

        let like = posts.like("1").await.expect("like");

        assert_eq!(like.likes_count, 10);
        let post = posts.get("1").expect("post");
        assert_eq!(post.likes_count, 10);
        assert!(post.is_liked);
        assert_eq!(transport.requests()[1].path, "/api/posts/1/like/");
    }

    #[tokio::test]
    async fn concurrent_mutation_of_same_id_is_busy() {
        let transport = Arc::new(
            FakeTransport::new(|_| {
                ApiResponse::json(200, &json!({"likes_count": 1, "is_liked": true}))
            })
            .with_delay(Duration::from_millis(30)),
        );
        let posts = store(authed_client(transport.clone()));

        let (first, second) = tokio::join!(posts.like("1"), posts.like("1"));
        let busy = [first, second]
            .into_iter()
            .filter(|result| matches!(result, Err(EstateClientError::Busy(_))))
            .count();

        assert_eq!(busy, 1);
        assert_eq!(transport.count("/api/posts/1/like/"), 1);
        assert!(posts.last_error().is_none());

        posts.like("1").await.expect("guard released");
    }

    fn abc_store(delete_status: u16) -> ResourceStore<Post> {
        let transport = Arc::new(FakeTransport::new(move |req| match req.method {
            Method::DELETE if delete_status == 204 => ApiResponse {
                status: 204,
                body: String::new(),
            },
            Method::DELETE => {
                ApiResponse::json(delete_status, &json!({"detail": "Not your post"}))
            }
            _ => {
                let items = vec![post_json("A", 0), post_json("B", 0), post_json("C", 0)];
                ApiResponse::json(200, &page_json(items, None))
            }
        }));
        store(authed_client(transport))
    }

    #[tokio::test]
    async fn delete_removes_entry_after_success() {
        let posts = abc_store(204);
        posts.fetch_first_page().await.expect("fetch");

        posts.delete("B").await.expect("delete");

        assert_eq!(ids(&posts), vec!["A", "C"]);
        assert!(posts.last_error().is_none());
    }

    #[tokio::test]
    async fn failed_delete_keeps_entry_and_records_error() {
        let posts = abc_store(403);
        posts.fetch_first_page().await.expect("fetch");

        let result = posts.delete("B").await;

        assert!(matches!(result, Err(EstateClientError::Api { status: 403, .. })));
        assert_eq!(ids(&posts), vec!["A", "B", "C"]);
        assert_eq!(posts.last_error().as_deref(), Some("Not your post"));
    }

    #[tokio::test]
    async fn fetched_item_survives_first_page_refresh() {
        let transport = Arc::new(FakeTransport::new(|req| {
            if req.path == "/api/posts/9/" {
                ApiResponse::json(200, &post_json("9", 0))
            } else {
                ApiResponse::json(200, &page_json(vec![post_json("1", 0)], None))
            }
        }));
        let posts = store(anonymous_client(transport.clone()));

        posts.fetch_one("9").await.expect("fetch one");
        posts.refresh().await.expect("refresh");

        assert_eq!(ids(&posts), vec!["1", "9"]);
        assert!(posts.get("9").is_some());
    }

    #[tokio::test]
    async fn close_cancels_in_flight_fetch() {
        let transport = Arc::new(
            FakeTransport::new(|_| {
                ApiResponse::json(200, &page_json(vec![post_json("1", 0)], None))
            })
            .with_delay(Duration::from_millis(100)),
        );
        let posts = store(anonymous_client(transport));

        let (result, ()) = tokio::join!(posts.fetch_first_page(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            posts.close();
        });

        assert!(matches!(result, Err(EstateClientError::Cancelled)));
        assert!(posts.is_closed());
        assert!(posts.is_empty());
        assert_eq!(posts.load_state(), LoadState::Idle);
        assert!(posts.last_error().is_none());
    }
}
