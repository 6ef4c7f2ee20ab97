//! Use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into viewer-conditioned use cases.
//! - Own every write that spans several rows, running it inside the
//!   atomic boundary.
//!
//! # Invariants
//! - The viewer is an already-authenticated user id supplied by the
//!   caller, or `None` for anonymous reads.
//! - Services hold no state between calls beyond the repository handle and
//!   configuration they were constructed with.
//!
//! # See also
//! - `aggregate` for view decoration, `resolver` for list/feed narrowing.

pub mod aggregate;
pub mod article_service;
pub mod resolver;
pub mod user_service;

pub use aggregate::ViewAggregator;
pub use article_service::ArticleService;
pub use resolver::{ArticleList, FeedParams, ListArticlesParams, ListQueryResolver};
pub use user_service::UserService;

use crate::config::CoreConfig;
use crate::context::Context;
use crate::error::{AppError, AppResult, ErrorKind};
use crate::model::id::Id;
use crate::model::user::User;
use crate::repo::{Repository, UserFilter};

/// Owns a repository and configuration and hands out per-area services.
pub struct Service<R: Repository> {
    repo: R,
    config: CoreConfig,
}

impl<R: Repository> Service<R> {
    pub fn new(repo: R, config: CoreConfig) -> Self {
        Self { repo, config }
    }

    pub fn users(&self) -> UserService<'_> {
        UserService::new(&self.repo)
    }

    pub fn articles(&self) -> ArticleService<'_> {
        ArticleService::new(&self.repo, &self.config)
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }
}

/// Loads the acting user; a missing viewer is a permission failure.
pub(crate) fn load_viewer(
    repo: &dyn Repository,
    ctx: &Context,
    viewer: Option<Id>,
) -> AppResult<User> {
    let viewer = require_viewer(viewer)?;
    let mut users = repo.user().filter_users(ctx, &UserFilter::by_ids(vec![viewer]))?;
    users
        .pop()
        .ok_or_else(|| AppError::permission_denied("viewer does not exist"))
}

pub(crate) fn require_viewer(viewer: Option<Id>) -> AppResult<Id> {
    viewer.ok_or_else(|| AppError::permission_denied("authentication required"))
}

/// Whether `err` reports that the unique pair `index` already holds the row,
/// which happens when a concurrent writer inserted it first.
pub(crate) fn is_duplicate_pair(err: &AppError, index: &str) -> bool {
    err.is(ErrorKind::Validation) && err.fields().contains_key(index)
}
