//! View aggregation: scatter-gather decoration of articles and comments.
//!
//! # Responsibility
//! - Turn raw article/comment rows into viewer-relative views with one
//!   batched lookup per related collection, never one per row.
//!
//! # Invariants
//! - Pure read transform: nothing is written and no state outlives a call.
//! - Empty input returns empty output without touching storage.
//! - Without a viewer, `is_followed` and `is_favorite` are always `false`.
//! - Any lookup failure aborts the whole decoration.
//! - A row whose author cannot be loaded is an `Internal` error.

use crate::context::Context;
use crate::error::{AppError, AppResult};
use crate::model::article::{Article, Comment};
use crate::model::id::Id;
use crate::model::view::{ArticleView, CommentView, Profile};
use crate::repo::{
    ArticleTagFilter, FavoriteFilter, FollowFilter, Repository, TagFilter, UserFilter,
};
use std::collections::{BTreeSet, HashMap, HashSet};

pub struct ViewAggregator<'a> {
    repo: &'a dyn Repository,
}

impl<'a> ViewAggregator<'a> {
    pub fn new(repo: &'a dyn Repository) -> Self {
        Self { repo }
    }

    /// Decorates `articles`, preserving their order.
    pub fn articles(
        &self,
        ctx: &Context,
        viewer: Option<Id>,
        articles: Vec<Article>,
    ) -> AppResult<Vec<ArticleView>> {
        if articles.is_empty() {
            return Ok(Vec::new());
        }
        let article_ids: Vec<Id> = articles.iter().map(|article| article.id).collect();
        let profiles = self.profiles(ctx, viewer, articles.iter().map(|a| a.author_id))?;
        let mut tag_names = self.tag_names(ctx, &article_ids)?;

        let repo = self.repo.article();
        let counts: HashMap<Id, u64> = repo
            .count_favorites(ctx, &article_ids)?
            .into_iter()
            .map(|row| (row.article_id, row.count))
            .collect();
        let favorited: HashSet<Id> = match viewer {
            Some(viewer) => repo
                .filter_favorites(
                    ctx,
                    &FavoriteFilter {
                        article_ids: Some(article_ids.clone()),
                        user_ids: Some(vec![viewer]),
                    },
                )?
                .into_iter()
                .map(|favorite| favorite.article_id)
                .collect(),
            None => HashSet::new(),
        };

        articles
            .into_iter()
            .map(|article| {
                author_profile(&profiles, article.author_id).map(|author| ArticleView {
                    tag_list: tag_names.remove(&article.id).unwrap_or_default(),
                    favorites_count: counts.get(&article.id).copied().unwrap_or(0),
                    is_favorite: favorited.contains(&article.id),
                    author,
                    article,
                })
            })
            .collect()
    }

    /// Decorates `comments` with author profiles, preserving their order.
    pub fn comments(
        &self,
        ctx: &Context,
        viewer: Option<Id>,
        comments: Vec<Comment>,
    ) -> AppResult<Vec<CommentView>> {
        if comments.is_empty() {
            return Ok(Vec::new());
        }
        let profiles = self.profiles(ctx, viewer, comments.iter().map(|c| c.author_id))?;
        comments
            .into_iter()
            .map(|comment| {
                author_profile(&profiles, comment.author_id)
                    .map(|author| CommentView { comment, author })
            })
            .collect()
    }

    /// Loads the distinct authors and marks the ones the viewer follows.
    fn profiles(
        &self,
        ctx: &Context,
        viewer: Option<Id>,
        author_ids: impl Iterator<Item = Id>,
    ) -> AppResult<HashMap<Id, Profile>> {
        let author_ids: Vec<Id> = author_ids.collect::<BTreeSet<_>>().into_iter().collect();
        let repo = self.repo.user();
        let authors = repo.filter_users(ctx, &UserFilter::by_ids(author_ids.clone()))?;
        let followed: HashSet<Id> = match viewer {
            Some(viewer) => repo
                .filter_follows(
                    ctx,
                    &FollowFilter {
                        follower_ids: Some(vec![viewer]),
                        followee_ids: Some(author_ids),
                    },
                )?
                .into_iter()
                .map(|follow| follow.followee_id)
                .collect(),
            None => HashSet::new(),
        };
        Ok(authors
            .iter()
            .map(|user| (user.id, Profile::of(user, followed.contains(&user.id))))
            .collect())
    }

    /// Article id -> sorted tag names.
    fn tag_names(&self, ctx: &Context, article_ids: &[Id]) -> AppResult<HashMap<Id, Vec<String>>> {
        let repo = self.repo.article();
        let links = repo.filter_article_tags(
            ctx,
            &ArticleTagFilter {
                article_ids: Some(article_ids.to_vec()),
                tag_ids: None,
            },
        )?;
        if links.is_empty() {
            return Ok(HashMap::new());
        }
        let tag_ids: Vec<Id> = links
            .iter()
            .map(|link| link.tag_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let names: HashMap<Id, String> = repo
            .filter_tags(
                ctx,
                &TagFilter {
                    ids: Some(tag_ids),
                    names: None,
                },
            )?
            .into_iter()
            .map(|tag| (tag.id, tag.name))
            .collect();

        let mut by_article: HashMap<Id, Vec<String>> = HashMap::new();
        for link in links {
            let name = names.get(&link.tag_id).ok_or_else(|| {
                AppError::internal(format!("tag {} linked but missing", link.tag_id))
            })?;
            by_article
                .entry(link.article_id)
                .or_default()
                .push(name.clone());
        }
        for names in by_article.values_mut() {
            names.sort();
        }
        Ok(by_article)
    }
}

fn author_profile(profiles: &HashMap<Id, Profile>, author_id: Id) -> AppResult<Profile> {
    profiles
        .get(&author_id)
        .cloned()
        .ok_or_else(|| AppError::internal(format!("author {author_id} missing")))
}
