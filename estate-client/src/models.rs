use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Разбор идентификаторов: сервер может прислать как строку, так и число.
pub(crate) mod id {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Int(i64),
        Unsigned(u64),
    }

    impl From<RawId> for String {
        fn from(raw: RawId) -> Self {
            match raw {
                RawId::Text(text) => text,
                RawId::Int(value) => value.to_string(),
                RawId::Unsigned(value) => value.to_string(),
            }
        }
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        RawId::deserialize(deserializer).map(String::from)
    }

    pub(crate) fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<RawId>::deserialize(deserializer).map(|raw| raw.map(String::from))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Публичная модель пользователя.
pub struct User {
    /// Идентификатор пользователя.
    #[serde(deserialize_with = "id::deserialize")]
    pub id: String,
    /// Логин.
    pub username: String,
    /// Email.
    #[serde(default)]
    pub email: String,
    /// Отображаемое имя.
    #[serde(default)]
    pub full_name: Option<String>,
    /// URL аватара.
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Краткая ссылка на автора/владельца внутри ресурса.
pub struct AuthorRef {
    /// Идентификатор пользователя.
    #[serde(deserialize_with = "id::deserialize")]
    pub id: String,
    /// Логин.
    pub username: String,
    /// URL аватара.
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Сессия авторизованного пользователя.
pub struct Session {
    /// Идентификатор пользователя.
    pub user_id: String,
    /// Bearer-токен, прикладываемый к запросам.
    pub access_token: String,
    /// Токен для обмена на новый `access_token`.
    pub refresh_token: Option<String>,
    /// Момент истечения `access_token`, если сервер его сообщил.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Истёк ли `access_token` к моменту `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
/// Непрозрачный курсор следующей/предыдущей страницы.
///
/// Клиент его не разбирает, только передаёт обратно серверу.
pub struct Cursor(String);

impl Cursor {
    /// Оборачивает значение, полученное от сервера.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Исходное значение курсора.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Страница списка в формате `{ results, next, previous }`.
pub struct Page<T> {
    /// Элементы страницы.
    pub results: Vec<T>,
    /// Курсор следующей страницы; `None`, если данных больше нет.
    #[serde(default)]
    pub next: Option<Cursor>,
    /// Курсор предыдущей страницы.
    #[serde(default)]
    pub previous: Option<Cursor>,
    /// Общее количество, если сервер его считает.
    #[serde(default)]
    pub count: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Авторитетное состояние лайка, возвращаемое сервером.
pub struct LikeState {
    /// Количество лайков.
    pub likes_count: u64,
    /// Лайкнул ли текущий пользователь.
    pub is_liked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Авторитетный счётчик просмотров.
pub struct ViewCount {
    /// Количество просмотров.
    pub views_count: u64,
}

#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
/// Данные для входа.
pub struct Credentials {
    /// Логин или email.
    #[validate(length(min = 1, max = 150))]
    pub username: String,
    /// Пароль.
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
/// Данные для регистрации.
pub struct SignupRequest {
    /// Логин.
    #[validate(length(min = 3, max = 150))]
    pub username: String,
    /// Email.
    #[validate(email)]
    pub email: String,
    /// Пароль.
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    /// Отображаемое имя.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

// --- posts / stories / comments ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Статус поста в ленте.
pub enum PostStatus {
    /// Опубликован.
    Published,
    /// Черновик.
    Draft,
    /// В архиве.
    Archived,
    /// Значение, неизвестное этой версии клиента.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Пост социальной ленты.
pub struct Post {
    /// Идентификатор поста.
    #[serde(deserialize_with = "id::deserialize")]
    pub id: String,
    /// Автор.
    pub author: AuthorRef,
    /// Текст поста.
    pub content: String,
    /// URL изображений.
    #[serde(default)]
    pub images: Vec<String>,
    /// Локация.
    #[serde(default)]
    pub location: Option<String>,
    /// Объявление, к которому привязан пост.
    #[serde(default, deserialize_with = "id::deserialize_opt")]
    pub property_id: Option<String>,
    /// Количество лайков.
    #[serde(default)]
    pub likes_count: u64,
    /// Количество комментариев.
    #[serde(default)]
    pub comments_count: u64,
    /// Количество просмотров.
    #[serde(default)]
    pub views_count: u64,
    /// Лайкнул ли текущий пользователь.
    #[serde(default)]
    pub is_liked: bool,
    /// Статус.
    pub status: PostStatus,
    /// Дата создания (UTC).
    pub created_at: DateTime<Utc>,
    /// Дата последнего изменения (UTC).
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Validate, Serialize, Deserialize)]
/// Черновик нового поста.
pub struct PostDraft {
    /// Текст поста.
    #[validate(length(min = 1, max = 5000))]
    pub content: String,
    /// URL уже загруженных изображений.
    #[serde(default)]
    #[validate(length(max = 10))]
    pub images: Vec<String>,
    /// Локация.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Объявление, к которому привязан пост.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// История (story).
pub struct Story {
    /// Идентификатор.
    #[serde(deserialize_with = "id::deserialize")]
    pub id: String,
    /// Автор.
    pub author: AuthorRef,
    /// URL медиа.
    pub media_url: String,
    /// Подпись.
    #[serde(default)]
    pub caption: Option<String>,
    /// Количество лайков.
    #[serde(default)]
    pub likes_count: u64,
    /// Количество просмотров.
    #[serde(default)]
    pub views_count: u64,
    /// Лайкнул ли текущий пользователь.
    #[serde(default)]
    pub is_liked: bool,
    /// Когда история перестанет показываться.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Дата создания (UTC).
    pub created_at: DateTime<Utc>,
    /// Дата последнего изменения (UTC).
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Validate, Serialize, Deserialize)]
/// Черновик истории.
pub struct StoryDraft {
    /// URL уже загруженного медиа.
    #[validate(url)]
    pub media_url: String,
    /// Подпись.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 500))]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Комментарий к посту.
pub struct Comment {
    /// Идентификатор.
    #[serde(deserialize_with = "id::deserialize")]
    pub id: String,
    /// Пост, к которому относится комментарий.
    #[serde(deserialize_with = "id::deserialize")]
    pub post_id: String,
    /// Родительский комментарий для ответов.
    #[serde(default, deserialize_with = "id::deserialize_opt")]
    pub parent_id: Option<String>,
    /// Автор.
    pub author: AuthorRef,
    /// Текст.
    pub content: String,
    /// Количество лайков.
    #[serde(default)]
    pub likes_count: u64,
    /// Ответы.
    #[serde(default)]
    pub replies: Vec<Comment>,
    /// Дата создания (UTC).
    pub created_at: DateTime<Utc>,
    /// Дата последнего изменения (UTC).
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Validate, Serialize, Deserialize)]
/// Текст нового комментария или ответа.
pub struct CommentDraft {
    /// Текст.
    #[validate(length(min = 1, max = 2000))]
    pub content: String,
}

// --- listings ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Тип недвижимости.
pub enum PropertyType {
    /// Дом.
    House,
    /// Квартира.
    Apartment,
    /// Участок.
    Land,
    /// Коммерческая недвижимость.
    Commercial,
    /// Прочее.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Тип сделки.
pub enum ListingType {
    /// Продажа.
    Sale,
    /// Аренда.
    Rent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Статус объявления.
pub enum PropertyStatus {
    /// Доступно.
    Available,
    /// Идёт сделка.
    Pending,
    /// Продано.
    Sold,
    /// Сдано.
    Rented,
    /// Значение, неизвестное этой версии клиента.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Объявление о недвижимости.
pub struct Property {
    /// Идентификатор.
    #[serde(deserialize_with = "id::deserialize")]
    pub id: String,
    /// Владелец или агент.
    pub owner: AuthorRef,
    /// Заголовок.
    pub title: String,
    /// Описание.
    #[serde(default)]
    pub description: String,
    /// Тип недвижимости.
    pub property_type: PropertyType,
    /// Тип сделки.
    pub listing_type: ListingType,
    /// Статус.
    pub status: PropertyStatus,
    /// Цена.
    pub price: f64,
    /// Валюта.
    #[serde(default)]
    pub currency: String,
    /// Город.
    pub city: String,
    /// Адрес.
    #[serde(default)]
    pub address: String,
    /// Спальни.
    #[serde(default)]
    pub bedrooms: Option<u32>,
    /// Санузлы.
    #[serde(default)]
    pub bathrooms: Option<u32>,
    /// Площадь, м².
    #[serde(default)]
    pub area_sqm: Option<f64>,
    /// URL изображений.
    #[serde(default)]
    pub images: Vec<String>,
    /// Количество просмотров.
    #[serde(default)]
    pub views_count: u64,
    /// Дата создания (UTC).
    pub created_at: DateTime<Utc>,
    /// Дата последнего изменения (UTC).
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Validate, Serialize, Deserialize)]
/// Черновик объявления.
pub struct PropertyDraft {
    /// Заголовок.
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    /// Описание.
    #[serde(default)]
    pub description: String,
    /// Тип недвижимости.
    pub property_type: PropertyType,
    /// Тип сделки.
    pub listing_type: ListingType,
    /// Цена.
    #[validate(range(min = 0.0))]
    pub price: f64,
    /// Валюта.
    #[validate(length(equal = 3))]
    pub currency: String,
    /// Город.
    #[validate(length(min = 1, max = 128))]
    pub city: String,
    /// Адрес.
    #[serde(default)]
    pub address: String,
    /// Спальни.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<u32>,
    /// Санузлы.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<u32>,
    /// Площадь, м².
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub area_sqm: Option<f64>,
    /// URL уже загруженных изображений.
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Validate, Serialize, Deserialize)]
/// Частичное изменение объявления.
pub struct PropertyPatch {
    /// Новый заголовок.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    /// Новое описание.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Новая цена.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub price: Option<f64>,
    /// Новый статус.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PropertyStatus>,
}

// --- bookings / reviews ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Статус бронирования.
pub enum BookingStatus {
    /// Ждёт подтверждения владельцем.
    Pending,
    /// Подтверждено.
    Confirmed,
    /// Отменено.
    Cancelled,
    /// Завершено.
    Completed,
    /// Значение, неизвестное этой версии клиента.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Бронирование объекта.
pub struct Booking {
    /// Идентификатор.
    #[serde(deserialize_with = "id::deserialize")]
    pub id: String,
    /// Объявление.
    #[serde(deserialize_with = "id::deserialize")]
    pub property_id: String,
    /// Гость.
    pub guest: AuthorRef,
    /// Дата заезда.
    pub check_in: NaiveDate,
    /// Дата выезда.
    pub check_out: NaiveDate,
    /// Количество гостей.
    pub guests: u32,
    /// Итоговая стоимость, если рассчитана сервером.
    #[serde(default)]
    pub total_price: Option<f64>,
    /// Сообщение владельцу.
    #[serde(default)]
    pub message: Option<String>,
    /// Статус.
    pub status: BookingStatus,
    /// Дата создания (UTC).
    pub created_at: DateTime<Utc>,
    /// Дата последнего изменения (UTC).
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Validate, Serialize, Deserialize)]
#[validate(schema(function = "validate_booking_dates"))]
/// Черновик бронирования.
pub struct BookingDraft {
    /// Объявление.
    #[validate(length(min = 1))]
    pub property_id: String,
    /// Дата заезда.
    pub check_in: NaiveDate,
    /// Дата выезда, строго после заезда.
    pub check_out: NaiveDate,
    /// Количество гостей.
    #[validate(range(min = 1, max = 50))]
    pub guests: u32,
    /// Сообщение владельцу.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 1000))]
    pub message: Option<String>,
}

fn validate_booking_dates(draft: &BookingDraft) -> Result<(), ValidationError> {
    if draft.check_out <= draft.check_in {
        let mut error = ValidationError::new("check_out_before_check_in");
        error.message = Some("check_out must be after check_in".into());
        return Err(error);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Отзыв об объекте.
pub struct Review {
    /// Идентификатор.
    #[serde(deserialize_with = "id::deserialize")]
    pub id: String,
    /// Объявление.
    #[serde(deserialize_with = "id::deserialize")]
    pub property_id: String,
    /// Автор.
    pub author: AuthorRef,
    /// Оценка 1..=5.
    pub rating: u8,
    /// Текст отзыва.
    #[serde(default)]
    pub comment: String,
    /// Дата создания (UTC).
    pub created_at: DateTime<Utc>,
    /// Дата последнего изменения (UTC).
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Validate, Serialize, Deserialize)]
/// Черновик отзыва.
pub struct ReviewDraft {
    /// Объявление.
    #[validate(length(min = 1))]
    pub property_id: String,
    /// Оценка 1..=5.
    #[validate(range(min = 1, max = 5))]
    pub rating: u8,
    /// Текст отзыва.
    #[validate(length(min = 1, max = 2000))]
    pub comment: String,
}
