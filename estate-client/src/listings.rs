//! Объявления, бронирования и отзывы.

use crate::error::EstateClientResult;
use crate::models::{
    Booking, BookingDraft, Property, PropertyDraft, Review, ReviewDraft, ViewCount,
};
use crate::resource::{Resource, ResourceStore, Viewable};

impl Resource for Property {
    type Draft = PropertyDraft;

    const COLLECTION: &'static str = "/api/properties/";
    const CACHE_KEY: &'static str = "properties";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Viewable for Property {
    fn apply_views(&mut self, views: ViewCount) {
        self.views_count = views.views_count;
    }
}

impl Resource for Booking {
    type Draft = BookingDraft;

    const COLLECTION: &'static str = "/api/bookings/";
    const CACHE_KEY: &'static str = "bookings";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Resource for Review {
    type Draft = ReviewDraft;

    const COLLECTION: &'static str = "/api/reviews/";
    const CACHE_KEY: &'static str = "reviews";

    fn id(&self) -> &str {
        &self.id
    }
}

/// Объявления.
pub type PropertyStore = ResourceStore<Property>;
/// Бронирования текущего пользователя.
pub type BookingStore = ResourceStore<Booking>;
/// Отзывы; обычно отфильтрованы по объявлению.
pub type ReviewStore = ResourceStore<Review>;

impl ResourceStore<Booking> {
    /// Отменяет бронирование; статус берётся из ответа сервера.
    pub async fn cancel(&self, id: &str) -> EstateClientResult<Booking> {
        self.perform(id, "cancel").await
    }
}
