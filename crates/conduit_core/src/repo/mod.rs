//! Storage-agnostic repository contracts.
//!
//! # Responsibility
//! - Define the user and article data access surface shared by every
//!   storage backend.
//! - Define the atomic boundary: `Repository::atomic` hands its closure a
//!   handle scoped to one transaction (or session) that exposes the exact
//!   same surface as the top-level handle.
//!
//! # Invariants
//! - Every operation calls `Context::check` before touching storage.
//! - Backend failures are translated into `AppError` before they leave a
//!   backend: uniqueness and isolation conflicts become `Validation`,
//!   missing single rows become `NotFound`.
//! - Filter lists use `Option<Vec<_>>`: `None` leaves the column
//!   unconstrained, `Some(vec![])` matches nothing.
//! - A closure error (or a cancelled context) rolls back every write made
//!   through the scoped handle.
//!
//! # See also
//! - `sql` for the SQLite backend, `document` for the embedded document
//!   store backend.

pub mod document;
pub mod sql;

use crate::config::{BackendKind, CoreConfig};
use crate::context::Context;
use crate::error::{AppError, AppResult};
use crate::model::article::{Article, ArticleFavorite, ArticleTag, Comment, FavoriteCount, Tag};
use crate::model::id::Id;
use crate::model::user::{User, UserFollow};

/// Closure run inside an atomic scope.
pub type AtomicFn<'a> = dyn FnMut(&dyn Repository) -> AppResult<()> + 'a;

/// Entry point to one storage backend.
pub trait Repository {
    /// Runs `f` against a handle scoped to a single transaction.
    ///
    /// Writes commit when `f` returns `Ok`; any error rolls all of them back.
    /// Calling `atomic` on an already-scoped handle reuses the open scope.
    fn atomic(&self, ctx: &Context, f: &mut AtomicFn<'_>) -> AppResult<()>;

    fn user(&self) -> Box<dyn UserRepository + '_>;

    fn article(&self) -> Box<dyn ArticleRepository + '_>;
}

impl<R: Repository + ?Sized> Repository for Box<R> {
    fn atomic(&self, ctx: &Context, f: &mut AtomicFn<'_>) -> AppResult<()> {
        (**self).atomic(ctx, f)
    }

    fn user(&self) -> Box<dyn UserRepository + '_> {
        (**self).user()
    }

    fn article(&self) -> Box<dyn ArticleRepository + '_> {
        (**self).article()
    }
}

/// Typed convenience over `Repository::atomic`.
pub trait RepositoryExt: Repository {
    /// Runs `f` atomically and returns its value.
    fn run_atomic<T, F>(&self, ctx: &Context, f: F) -> AppResult<T>
    where
        F: FnOnce(&dyn Repository) -> AppResult<T>,
    {
        let mut f = Some(f);
        let mut out = None;
        self.atomic(ctx, &mut |repo: &dyn Repository| {
            let f = f
                .take()
                .ok_or_else(|| AppError::internal("atomic closure invoked twice"))?;
            out = Some(f(repo)?);
            Ok(())
        })?;
        out.ok_or_else(|| AppError::internal("atomic scope finished without running"))
    }
}

impl<R: Repository + ?Sized> RepositoryExt for R {}

/// Opens the backend selected by `config`.
pub fn open_repository(config: &CoreConfig) -> AppResult<Box<dyn Repository + Send>> {
    match config.backend {
        BackendKind::Sql => Ok(Box::new(sql::SqlRepository::open(config)?)),
        BackendKind::Document => Ok(Box::new(document::DocumentRepository::open()?)),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub ids: Option<Vec<Id>>,
    pub emails: Option<Vec<String>>,
    pub usernames: Option<Vec<String>>,
}

impl UserFilter {
    pub fn by_ids(ids: Vec<Id>) -> Self {
        Self {
            ids: Some(ids),
            ..Self::default()
        }
    }

    pub fn by_email(email: &str) -> Self {
        Self {
            emails: Some(vec![email.to_string()]),
            ..Self::default()
        }
    }

    pub fn by_usernames(usernames: Vec<String>) -> Self {
        Self {
            usernames: Some(usernames),
            ..Self::default()
        }
    }

    pub fn by_username(username: &str) -> Self {
        Self::by_usernames(vec![username.to_string()])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowFilter {
    pub follower_ids: Option<Vec<Id>>,
    pub followee_ids: Option<Vec<Id>>,
}

/// Article query. Results are ordered newest first (`created_at`, then id).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleFilter {
    pub ids: Option<Vec<Id>>,
    pub slugs: Option<Vec<String>>,
    pub author_ids: Option<Vec<Id>>,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl ArticleFilter {
    pub fn by_slug(slug: &str) -> Self {
        Self {
            slugs: Some(vec![slug.to_string()]),
            ..Self::default()
        }
    }

    pub fn by_ids(ids: Vec<Id>) -> Self {
        Self {
            ids: Some(ids),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    pub ids: Option<Vec<Id>>,
    pub names: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleTagFilter {
    pub article_ids: Option<Vec<Id>>,
    pub tag_ids: Option<Vec<Id>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FavoriteFilter {
    pub article_ids: Option<Vec<Id>>,
    pub user_ids: Option<Vec<Id>>,
}

/// Comment query. Results are ordered oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentFilter {
    pub ids: Option<Vec<Id>>,
    pub article_ids: Option<Vec<Id>>,
    pub author_ids: Option<Vec<Id>>,
}

/// User and follow persistence.
pub trait UserRepository {
    fn create_user(&self, ctx: &Context, user: &User) -> AppResult<()>;

    /// Replaces every mutable column of an existing user.
    fn update_user(&self, ctx: &Context, user: &User) -> AppResult<()>;

    fn filter_users(&self, ctx: &Context, filter: &UserFilter) -> AppResult<Vec<User>>;

    /// First user matching `filter`, or `NotFound`.
    fn find_user(&self, ctx: &Context, filter: &UserFilter) -> AppResult<User> {
        self.filter_users(ctx, filter)?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::not_found("user not found"))
    }

    /// Inserts a follow row; a duplicate pair is a validation failure.
    fn follow(&self, ctx: &Context, follow: &UserFollow) -> AppResult<()>;

    /// Removes a follow row; absent rows are ignored.
    fn unfollow(&self, ctx: &Context, follow: &UserFollow) -> AppResult<()>;

    fn filter_follows(&self, ctx: &Context, filter: &FollowFilter) -> AppResult<Vec<UserFollow>>;
}

/// Article, tag, favorite and comment persistence.
pub trait ArticleRepository {
    fn create_article(&self, ctx: &Context, article: &Article) -> AppResult<()>;

    /// Replaces title, slug, description, body and `updated_at`.
    fn update_article(&self, ctx: &Context, article: &Article) -> AppResult<()>;

    /// Deletes the article with its tag links, favorites and comments.
    fn delete_article(&self, ctx: &Context, id: Id) -> AppResult<()>;

    fn filter_articles(&self, ctx: &Context, filter: &ArticleFilter) -> AppResult<Vec<Article>>;

    /// First article matching `filter`, or `NotFound`.
    fn find_article(&self, ctx: &Context, filter: &ArticleFilter) -> AppResult<Article> {
        let filter = ArticleFilter {
            limit: Some(1),
            ..filter.clone()
        };
        self.filter_articles(ctx, &filter)?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::not_found("article not found"))
    }

    /// Tags ordered by name.
    fn filter_tags(&self, ctx: &Context, filter: &TagFilter) -> AppResult<Vec<Tag>>;

    /// Returns existing-or-created tags for normalized `names`.
    ///
    /// Reads the existing names with one membership query and bulk-inserts
    /// only the missing ones. Concurrent creators of the same new name race
    /// on the unique index; the loser fails with `Validation` and no retry
    /// is attempted here.
    fn add_tags_if_not_exists(&self, ctx: &Context, names: &[String]) -> AppResult<Vec<Tag>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let mut tags = self.filter_tags(
            ctx,
            &TagFilter {
                names: Some(names.to_vec()),
                ..TagFilter::default()
            },
        )?;
        let missing: Vec<Tag> = names
            .iter()
            .filter(|name| !tags.iter().any(|tag| tag.name == **name))
            .map(|name| Tag::new(name.as_str()))
            .collect();
        if !missing.is_empty() {
            self.insert_tags(ctx, &missing)?;
            tags.extend(missing);
        }
        tags.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(tags)
    }

    /// Bulk-inserts tags; any duplicate name fails the whole batch.
    fn insert_tags(&self, ctx: &Context, tags: &[Tag]) -> AppResult<()>;

    /// Links `article_id` to every tag in `tag_ids`.
    fn assign_tags(&self, ctx: &Context, article_id: Id, tag_ids: &[Id]) -> AppResult<()>;

    fn filter_article_tags(
        &self,
        ctx: &Context,
        filter: &ArticleTagFilter,
    ) -> AppResult<Vec<ArticleTag>>;

    /// Inserts a favorite row; a duplicate pair is a validation failure.
    fn add_favorite(&self, ctx: &Context, favorite: &ArticleFavorite) -> AppResult<()>;

    /// Removes a favorite row; absent rows are ignored.
    fn remove_favorite(&self, ctx: &Context, favorite: &ArticleFavorite) -> AppResult<()>;

    fn filter_favorites(
        &self,
        ctx: &Context,
        filter: &FavoriteFilter,
    ) -> AppResult<Vec<ArticleFavorite>>;

    /// Favorite counts grouped by article; articles without favorites are
    /// omitted.
    fn count_favorites(&self, ctx: &Context, article_ids: &[Id]) -> AppResult<Vec<FavoriteCount>>;

    fn add_comment(&self, ctx: &Context, comment: &Comment) -> AppResult<()>;

    fn filter_comments(&self, ctx: &Context, filter: &CommentFilter) -> AppResult<Vec<Comment>>;

    fn delete_comment(&self, ctx: &Context, id: Id) -> AppResult<()>;
}
