//! Article use cases: authoring, favorites, comments, tags, list and feed.
//!
//! # Responsibility
//! - Create an article with its tags as one atomic unit.
//! - Enforce authorship before updates and deletes.
//! - Return viewer-decorated views for every read and write.
//!
//! # Invariants
//! - Article creation runs `create_article -> add_tags_if_not_exists ->
//!   assign_tags` in a single atomic scope; a tag-name race fails the whole
//!   creation with `Validation` and leaves no rows behind.
//! - An article or comment the viewer does not own is reported as
//!   `NotFound`, indistinguishable from one that does not exist.
//! - Favoriting twice and unfavoriting a non-favorite are no-ops, including
//!   when two favorites of the same pair race.

use crate::config::CoreConfig;
use crate::context::Context;
use crate::error::{AppError, AppResult};
use crate::logging::OpTimer;
use crate::model::article::{
    validate_tags, Article, ArticleChanges, ArticleFavorite, Comment, NewArticle,
};
use crate::model::id::Id;
use crate::model::view::{ArticleView, CommentView};
use crate::repo::{ArticleFilter, CommentFilter, FavoriteFilter, Repository, RepositoryExt, TagFilter};
use crate::service::aggregate::ViewAggregator;
use crate::service::resolver::{ArticleList, FeedParams, ListArticlesParams, ListQueryResolver};
use crate::service::{is_duplicate_pair, load_viewer, require_viewer};

const MODULE: &str = "service.article";
const FAVORITE_PAIR: &str = "article_favorites";

pub struct ArticleService<'a> {
    repo: &'a dyn Repository,
    config: &'a CoreConfig,
}

impl<'a> ArticleService<'a> {
    pub fn new(repo: &'a dyn Repository, config: &'a CoreConfig) -> Self {
        Self { repo, config }
    }

    /// Creates an article authored by the viewer together with its tags.
    pub fn create(
        &self,
        ctx: &Context,
        viewer: Option<Id>,
        input: NewArticle,
        tags: &[String],
    ) -> AppResult<ArticleView> {
        OpTimer::run("article_create", MODULE, || {
            let author = load_viewer(self.repo, ctx, viewer)?;
            let article = Article::new(author.id, input)?;
            let tag_names = validate_tags(tags)?;

            self.repo.run_atomic(ctx, |scope| {
                let articles = scope.article();
                articles.create_article(ctx, &article)?;
                let tag_ids: Vec<Id> = articles
                    .add_tags_if_not_exists(ctx, &tag_names)?
                    .iter()
                    .map(|tag| tag.id)
                    .collect();
                articles.assign_tags(ctx, article.id, &tag_ids)
            })?;
            self.decorate_one(ctx, viewer, article)
        })
    }

    /// Updates an article the viewer authored; a new title moves the slug.
    pub fn update(
        &self,
        ctx: &Context,
        viewer: Option<Id>,
        slug: &str,
        changes: ArticleChanges,
    ) -> AppResult<ArticleView> {
        OpTimer::run("article_update", MODULE, || {
            let mut article = self.owned_article(ctx, viewer, slug)?;
            if article.apply(changes)? {
                self.repo.article().update_article(ctx, &article)?;
            }
            self.decorate_one(ctx, viewer, article)
        })
    }

    /// Deletes an article the viewer authored with its tag links, favorites
    /// and comments.
    pub fn delete(&self, ctx: &Context, viewer: Option<Id>, slug: &str) -> AppResult<()> {
        OpTimer::run("article_delete", MODULE, || {
            let article = self.owned_article(ctx, viewer, slug)?;
            self.repo.article().delete_article(ctx, article.id)
        })
    }

    pub fn get(&self, ctx: &Context, viewer: Option<Id>, slug: &str) -> AppResult<ArticleView> {
        let article = self.by_slug(ctx, slug)?;
        self.decorate_one(ctx, viewer, article)
    }

    pub fn list(
        &self,
        ctx: &Context,
        viewer: Option<Id>,
        params: &ListArticlesParams,
    ) -> AppResult<ArticleList> {
        OpTimer::run("article_list", MODULE, || {
            ListQueryResolver::new(self.repo, self.config).list(ctx, viewer, params)
        })
    }

    /// Articles by authors the viewer follows.
    pub fn feed(
        &self,
        ctx: &Context,
        viewer: Option<Id>,
        params: &FeedParams,
    ) -> AppResult<ArticleList> {
        OpTimer::run("article_feed", MODULE, || {
            ListQueryResolver::new(self.repo, self.config).feed(ctx, viewer, params)
        })
    }

    pub fn favorite(&self, ctx: &Context, viewer: Option<Id>, slug: &str) -> AppResult<ArticleView> {
        OpTimer::run("article_favorite", MODULE, || {
            let user = load_viewer(self.repo, ctx, viewer)?;
            let article = self.by_slug(ctx, slug)?;
            let favorite = ArticleFavorite {
                article_id: article.id,
                user_id: user.id,
            };
            let added = self.repo.run_atomic(ctx, |scope| {
                let articles = scope.article();
                let existing = articles.filter_favorites(ctx, &favorite_filter(&favorite))?;
                if existing.is_empty() {
                    articles.add_favorite(ctx, &favorite)?;
                }
                Ok(())
            });
            if let Err(err) = added {
                let raced = is_duplicate_pair(&err, FAVORITE_PAIR)
                    && !self
                        .repo
                        .article()
                        .filter_favorites(ctx, &favorite_filter(&favorite))?
                        .is_empty();
                if !raced {
                    return Err(err);
                }
            }
            self.decorate_one(ctx, viewer, article)
        })
    }

    pub fn unfavorite(
        &self,
        ctx: &Context,
        viewer: Option<Id>,
        slug: &str,
    ) -> AppResult<ArticleView> {
        OpTimer::run("article_unfavorite", MODULE, || {
            let user_id = require_viewer(viewer)?;
            let article = self.by_slug(ctx, slug)?;
            self.repo.article().remove_favorite(
                ctx,
                &ArticleFavorite {
                    article_id: article.id,
                    user_id,
                },
            )?;
            self.decorate_one(ctx, viewer, article)
        })
    }

    pub fn add_comment(
        &self,
        ctx: &Context,
        viewer: Option<Id>,
        slug: &str,
        body: &str,
    ) -> AppResult<CommentView> {
        OpTimer::run("comment_add", MODULE, || {
            let author = load_viewer(self.repo, ctx, viewer)?;
            let article = self.by_slug(ctx, slug)?;
            let comment = Comment::new(article.id, author.id, body)?;
            self.repo.article().add_comment(ctx, &comment)?;
            ViewAggregator::new(self.repo)
                .comments(ctx, viewer, vec![comment])?
                .pop()
                .ok_or_else(|| AppError::internal("decorated comment missing"))
        })
    }

    /// Comments on an article, oldest first.
    pub fn list_comments(
        &self,
        ctx: &Context,
        viewer: Option<Id>,
        slug: &str,
    ) -> AppResult<Vec<CommentView>> {
        let article = self.by_slug(ctx, slug)?;
        let comments = self.repo.article().filter_comments(
            ctx,
            &CommentFilter {
                article_ids: Some(vec![article.id]),
                ..CommentFilter::default()
            },
        )?;
        ViewAggregator::new(self.repo).comments(ctx, viewer, comments)
    }

    /// Deletes a comment the viewer wrote on the article at `slug`.
    pub fn delete_comment(
        &self,
        ctx: &Context,
        viewer: Option<Id>,
        slug: &str,
        comment_id: Id,
    ) -> AppResult<()> {
        OpTimer::run("comment_delete", MODULE, || {
            let author_id = require_viewer(viewer)?;
            let article = self.by_slug(ctx, slug)?;
            let owned = self.repo.article().filter_comments(
                ctx,
                &CommentFilter {
                    ids: Some(vec![comment_id]),
                    article_ids: Some(vec![article.id]),
                    author_ids: Some(vec![author_id]),
                },
            )?;
            if owned.is_empty() {
                return Err(AppError::not_found("comment not found"));
            }
            self.repo.article().delete_comment(ctx, comment_id)
        })
    }

    /// Every tag name, sorted.
    pub fn list_tags(&self, ctx: &Context) -> AppResult<Vec<String>> {
        let tags = self.repo.article().filter_tags(ctx, &TagFilter::default())?;
        Ok(tags.into_iter().map(|tag| tag.name).collect())
    }

    fn by_slug(&self, ctx: &Context, slug: &str) -> AppResult<Article> {
        self.repo
            .article()
            .find_article(ctx, &ArticleFilter::by_slug(slug))
    }

    fn owned_article(&self, ctx: &Context, viewer: Option<Id>, slug: &str) -> AppResult<Article> {
        let author_id = require_viewer(viewer)?;
        self.repo.article().find_article(
            ctx,
            &ArticleFilter {
                author_ids: Some(vec![author_id]),
                ..ArticleFilter::by_slug(slug)
            },
        )
    }

    fn decorate_one(
        &self,
        ctx: &Context,
        viewer: Option<Id>,
        article: Article,
    ) -> AppResult<ArticleView> {
        ViewAggregator::new(self.repo)
            .articles(ctx, viewer, vec![article])?
            .pop()
            .ok_or_else(|| AppError::internal("decorated article missing"))
    }
}

fn favorite_filter(favorite: &ArticleFavorite) -> FavoriteFilter {
    FavoriteFilter {
        article_ids: Some(vec![favorite.article_id]),
        user_ids: Some(vec![favorite.user_id]),
    }
}
