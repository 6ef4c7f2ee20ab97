//! Stored document shapes.
//!
//! Timestamps are stored as integer microseconds so documents sort by
//! creation time; join rows and tags are stored as their model types.

use crate::error::{AppError, AppResult};
use crate::model::article::{Article, Comment};
use crate::model::id::Id;
use crate::model::user::User;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub(super) fn from_micros(micros: i64) -> AppResult<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| AppError::internal(format!("stored timestamp out of range: {micros}")))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct UserDoc {
    pub id: Id,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub bio: String,
    pub image: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<&User> for UserDoc {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            password_hash: user.password_hash.clone(),
            bio: user.bio.clone(),
            image: user.image.clone(),
            created_at: user.created_at.timestamp_micros(),
            updated_at: user.updated_at.timestamp_micros(),
        }
    }
}

impl TryFrom<UserDoc> for User {
    type Error = AppError;

    fn try_from(doc: UserDoc) -> AppResult<Self> {
        Ok(Self {
            id: doc.id,
            email: doc.email,
            username: doc.username,
            password_hash: doc.password_hash,
            bio: doc.bio,
            image: doc.image,
            created_at: from_micros(doc.created_at)?,
            updated_at: from_micros(doc.updated_at)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct ArticleDoc {
    pub id: Id,
    pub author_id: Id,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub body: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<&Article> for ArticleDoc {
    fn from(article: &Article) -> Self {
        Self {
            id: article.id,
            author_id: article.author_id,
            title: article.title.clone(),
            slug: article.slug.clone(),
            description: article.description.clone(),
            body: article.body.clone(),
            created_at: article.created_at.timestamp_micros(),
            updated_at: article.updated_at.timestamp_micros(),
        }
    }
}

impl TryFrom<ArticleDoc> for Article {
    type Error = AppError;

    fn try_from(doc: ArticleDoc) -> AppResult<Self> {
        Ok(Self {
            id: doc.id,
            author_id: doc.author_id,
            title: doc.title,
            slug: doc.slug,
            description: doc.description,
            body: doc.body,
            created_at: from_micros(doc.created_at)?,
            updated_at: from_micros(doc.updated_at)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct CommentDoc {
    pub id: Id,
    pub article_id: Id,
    pub author_id: Id,
    pub body: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<&Comment> for CommentDoc {
    fn from(comment: &Comment) -> Self {
        Self {
            id: comment.id,
            article_id: comment.article_id,
            author_id: comment.author_id,
            body: comment.body.clone(),
            created_at: comment.created_at.timestamp_micros(),
            updated_at: comment.updated_at.timestamp_micros(),
        }
    }
}

impl TryFrom<CommentDoc> for Comment {
    type Error = AppError;

    fn try_from(doc: CommentDoc) -> AppResult<Self> {
        Ok(Self {
            id: doc.id,
            article_id: doc.article_id,
            author_id: doc.author_id,
            body: doc.body,
            created_at: from_micros(doc.created_at)?,
            updated_at: from_micros(doc.updated_at)?,
        })
    }
}
