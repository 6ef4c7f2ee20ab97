//! Core domain logic for the Conduit content platform.
//! This crate is the single source of truth for business invariants.

pub mod config;
pub mod context;
pub mod db;
pub mod docstore;
pub mod error;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{BackendKind, CoreConfig};
pub use context::Context;
pub use error::{AppError, AppResult, ErrorKind};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status};
pub use model::article::{Article, ArticleChanges, Comment, NewArticle, Tag};
pub use model::id::Id;
pub use model::user::{NewUser, User, UserChanges};
pub use model::view::{ArticleView, CommentView, Profile};
pub use repo::document::DocumentRepository;
pub use repo::sql::SqlRepository;
pub use repo::{open_repository, Repository, RepositoryExt};
pub use service::{ArticleList, FeedParams, ListArticlesParams, Service};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
