//! Viewer-relative read models produced by view aggregation.

use crate::model::article::{Article, Comment};
use crate::model::id::Id;
use crate::model::user::User;
use serde::Serialize;

/// Public author projection, relative to the viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub id: Id,
    pub username: String,
    pub bio: String,
    pub image: String,
    /// Whether the viewer follows this user; `false` without a viewer.
    pub is_followed: bool,
}

impl Profile {
    pub fn of(user: &User, is_followed: bool) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            bio: user.bio.clone(),
            image: user.image.clone(),
            is_followed,
        }
    }
}

/// Fully decorated article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleView {
    #[serde(flatten)]
    pub article: Article,
    pub author: Profile,
    /// Tag names sorted lexicographically.
    pub tag_list: Vec<String>,
    pub favorites_count: u64,
    /// Whether the viewer favorited this article; `false` without a viewer.
    pub is_favorite: bool,
}

/// Comment decorated with its author profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: Profile,
}
