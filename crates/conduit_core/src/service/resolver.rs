//! List and feed query resolution.
//!
//! # Responsibility
//! - Narrow the candidate article set from named filters (author, tag,
//!   favorited-by) and explicit ids before the paged article fetch.
//! - Hand the fetched page to `ViewAggregator` for decoration.
//!
//! # Invariants
//! - Active id-producing filters (explicit ids, tags, favorited-by) are
//!   intersected; values inside one filter are unioned.
//! - A named filter that matches no entity yields an empty page, never an
//!   error.
//! - Feed without followed authors returns before querying articles.
//! - Pages are ordered newest first; `limit` is bounded by configuration.

use crate::config::CoreConfig;
use crate::context::Context;
use crate::error::{AppError, AppResult};
use crate::model::article::normalize_tags;
use crate::model::id::Id;
use crate::model::view::ArticleView;
use crate::repo::{
    ArticleFilter, ArticleTagFilter, FavoriteFilter, FollowFilter, Repository, TagFilter,
    UserFilter,
};
use crate::service::aggregate::ViewAggregator;
use serde::Serialize;
use std::collections::BTreeSet;

/// List query input. Empty vectors leave that filter inactive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListArticlesParams {
    /// Explicit candidate ids; `None` leaves ids unconstrained.
    pub ids: Option<Vec<Id>>,
    /// Tag names; articles carrying any of them match.
    pub tags: Vec<String>,
    /// Author usernames; articles by any of them match.
    pub authors: Vec<String>,
    /// Usernames; articles favorited by any of them match.
    pub favorited_by: Vec<String>,
    pub limit: Option<u32>,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedParams {
    pub limit: Option<u32>,
    pub offset: u32,
}

/// One page of decorated articles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArticleList {
    pub articles: Vec<ArticleView>,
    /// Number of articles in this page.
    pub count: usize,
}

impl ArticleList {
    fn from_views(articles: Vec<ArticleView>) -> Self {
        Self {
            count: articles.len(),
            articles,
        }
    }
}

pub struct ListQueryResolver<'a> {
    repo: &'a dyn Repository,
    config: &'a CoreConfig,
}

impl<'a> ListQueryResolver<'a> {
    pub fn new(repo: &'a dyn Repository, config: &'a CoreConfig) -> Self {
        Self { repo, config }
    }

    pub fn list(
        &self,
        ctx: &Context,
        viewer: Option<Id>,
        params: &ListArticlesParams,
    ) -> AppResult<ArticleList> {
        let Some(mut filter) = self.resolve(ctx, params)? else {
            return Ok(ArticleList::default());
        };
        filter.limit = Some(self.config.page_limit(params.limit));
        filter.offset = params.offset;
        self.fetch(ctx, viewer, &filter)
    }

    pub fn feed(
        &self,
        ctx: &Context,
        viewer: Option<Id>,
        params: &FeedParams,
    ) -> AppResult<ArticleList> {
        let viewer = viewer.ok_or_else(|| AppError::permission_denied("feed requires a viewer"))?;
        let followee_ids: Vec<Id> = self
            .repo
            .user()
            .filter_follows(
                ctx,
                &FollowFilter {
                    follower_ids: Some(vec![viewer]),
                    followee_ids: None,
                },
            )?
            .into_iter()
            .map(|follow| follow.followee_id)
            .collect();
        if followee_ids.is_empty() {
            return Ok(ArticleList::default());
        }
        let filter = ArticleFilter {
            author_ids: Some(followee_ids),
            limit: Some(self.config.page_limit(params.limit)),
            offset: params.offset,
            ..ArticleFilter::default()
        };
        self.fetch(ctx, Some(viewer), &filter)
    }

    fn fetch(
        &self,
        ctx: &Context,
        viewer: Option<Id>,
        filter: &ArticleFilter,
    ) -> AppResult<ArticleList> {
        let articles = self.repo.article().filter_articles(ctx, filter)?;
        let views = ViewAggregator::new(self.repo).articles(ctx, viewer, articles)?;
        Ok(ArticleList::from_views(views))
    }

    /// Builds the article filter, or `None` when the result must be empty.
    fn resolve(&self, ctx: &Context, params: &ListArticlesParams) -> AppResult<Option<ArticleFilter>> {
        let mut candidates: Option<BTreeSet<Id>> =
            params.ids.as_ref().map(|ids| ids.iter().copied().collect());

        let author_ids = if params.authors.is_empty() {
            None
        } else {
            let ids = self.user_ids(ctx, &params.authors)?;
            if ids.is_empty() {
                return Ok(None);
            }
            Some(ids)
        };

        let tag_names = normalize_tags(&params.tags);
        if !tag_names.is_empty() {
            let tagged = self.tagged_article_ids(ctx, tag_names)?;
            candidates = Some(intersect(candidates, tagged));
        }

        if !params.favorited_by.is_empty() {
            let user_ids = self.user_ids(ctx, &params.favorited_by)?;
            if user_ids.is_empty() {
                return Ok(None);
            }
            let favorited: BTreeSet<Id> = self
                .repo
                .article()
                .filter_favorites(
                    ctx,
                    &FavoriteFilter {
                        article_ids: None,
                        user_ids: Some(user_ids),
                    },
                )?
                .into_iter()
                .map(|favorite| favorite.article_id)
                .collect();
            candidates = Some(intersect(candidates, favorited));
        }

        if candidates.as_ref().is_some_and(BTreeSet::is_empty) {
            return Ok(None);
        }
        Ok(Some(ArticleFilter {
            ids: candidates.map(|ids| ids.into_iter().collect()),
            author_ids,
            ..ArticleFilter::default()
        }))
    }

    fn user_ids(&self, ctx: &Context, usernames: &[String]) -> AppResult<Vec<Id>> {
        Ok(self
            .repo
            .user()
            .filter_users(ctx, &UserFilter::by_usernames(usernames.to_vec()))?
            .into_iter()
            .map(|user| user.id)
            .collect())
    }

    /// Ids of articles carrying any of `names`; empty when no tag matches.
    fn tagged_article_ids(&self, ctx: &Context, names: Vec<String>) -> AppResult<BTreeSet<Id>> {
        let repo = self.repo.article();
        let tag_ids: Vec<Id> = repo
            .filter_tags(
                ctx,
                &TagFilter {
                    ids: None,
                    names: Some(names),
                },
            )?
            .into_iter()
            .map(|tag| tag.id)
            .collect();
        if tag_ids.is_empty() {
            return Ok(BTreeSet::new());
        }
        Ok(repo
            .filter_article_tags(
                ctx,
                &ArticleTagFilter {
                    article_ids: None,
                    tag_ids: Some(tag_ids),
                },
            )?
            .into_iter()
            .map(|link| link.article_id)
            .collect())
    }
}

fn intersect(current: Option<BTreeSet<Id>>, next: BTreeSet<Id>) -> BTreeSet<Id> {
    match current {
        Some(current) => current.intersection(&next).copied().collect(),
        None => next,
    }
}

#[cfg(test)]
mod tests {
    use super::intersect;
    use crate::model::id::Id;
    use std::collections::BTreeSet;

    #[test]
    fn intersect_starts_from_first_active_set() {
        let (a, b, c) = (Id::new(), Id::new(), Id::new());
        let first: BTreeSet<Id> = [a, b].into_iter().collect();
        let second: BTreeSet<Id> = [b, c].into_iter().collect();

        let started = intersect(None, first.clone());
        assert_eq!(started, first);
        let narrowed = intersect(Some(started), second);
        assert_eq!(narrowed.into_iter().collect::<Vec<_>>(), vec![b]);
    }
}
