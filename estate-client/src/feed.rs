//! Социальная лента: посты, истории, комментарии.

use tracing::warn;
use validator::Validate;

use crate::error::{EstateClientError, EstateClientResult};
use crate::models::{
    Comment, CommentDraft, LikeState, Page, Post, PostDraft, Story, StoryDraft, ViewCount,
};
use crate::resource::{Likeable, Resource, ResourceStore, Viewable};

impl Resource for Post {
    type Draft = PostDraft;

    const COLLECTION: &'static str = "/api/posts/";
    const CACHE_KEY: &'static str = "posts";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Likeable for Post {
    fn apply_like(&mut self, state: LikeState) {
        self.likes_count = state.likes_count;
        self.is_liked = state.is_liked;
    }
}

impl Viewable for Post {
    fn apply_views(&mut self, views: ViewCount) {
        self.views_count = views.views_count;
    }
}

impl Resource for Story {
    type Draft = StoryDraft;

    const COLLECTION: &'static str = "/api/stories/";
    const CACHE_KEY: &'static str = "stories";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Likeable for Story {
    fn apply_like(&mut self, state: LikeState) {
        self.likes_count = state.likes_count;
        self.is_liked = state.is_liked;
    }
}

impl Viewable for Story {
    fn apply_views(&mut self, views: ViewCount) {
        self.views_count = views.views_count;
    }
}

/// Лента постов.
pub type PostStore = ResourceStore<Post>;
/// Лента историй.
pub type StoryStore = ResourceStore<Story>;

impl ResourceStore<Post> {
    /// Комментарии к посту (первая страница).
    pub async fn fetch_comments(&self, post_id: &str) -> EstateClientResult<Page<Comment>> {
        let path = Self::item_path(post_id, Some("comments"));
        self.cancellable(self.api().get::<Page<Comment>>(&path)).await
    }

    /// Комментирует пост.
    ///
    /// Ошибка возвращается вызывающему и не попадает в `last_error`.
    pub async fn create_comment(
        &self,
        post_id: &str,
        draft: &CommentDraft,
    ) -> EstateClientResult<Comment> {
        draft.validate()?;
        self.api().auth().require_authenticated()?;

        let path = Self::item_path(post_id, Some("comments"));
        let comment = self
            .cancellable(self.api().post::<CommentDraft, Comment>(&path, draft))
            .await?;
        self.reconcile_post(post_id).await;
        Ok(comment)
    }

    /// Отвечает на комментарий.
    ///
    /// Ошибка возвращается вызывающему и не попадает в `last_error`.
    pub async fn reply_to_comment(
        &self,
        post_id: &str,
        comment_id: &str,
        draft: &CommentDraft,
    ) -> EstateClientResult<Comment> {
        draft.validate()?;
        self.api().auth().require_authenticated()?;

        let path = format!("/api/comments/{comment_id}/reply/");
        let reply = self
            .cancellable(self.api().post::<CommentDraft, Comment>(&path, draft))
            .await?;
        self.reconcile_post(post_id).await;
        Ok(reply)
    }

    // счётчик комментариев берём у сервера, а не считаем сами
    async fn reconcile_post(&self, post_id: &str) {
        if let Err(err) = self.fetch_one(post_id).await {
            if !matches!(err, EstateClientError::Cancelled) {
                warn!(post_id, error = %err, "failed to refresh post after comment");
            }
        }
    }
}
