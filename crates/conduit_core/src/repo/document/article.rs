//! Document-store article, tag, favorite and comment repository.
//!
//! # Invariants
//! - Sort orders match the SQLite backend: articles newest first, comments
//!   oldest first, tags by name, ties broken by id.
//! - `delete_article` removes the article and its dependents in one
//!   session.

use super::model::{ArticleDoc, CommentDoc};
use super::{
    by_id, restrict, set_fields, DocHandle, ARTICLES, ARTICLE_FAVORITES, ARTICLE_TAGS, COMMENTS,
    TAGS,
};
use crate::context::Context;
use crate::docstore::{Filter, FindOptions, SortOrder};
use crate::error::{AppError, AppResult};
use crate::model::article::{Article, ArticleFavorite, ArticleTag, Comment, FavoriteCount, Tag};
use crate::model::id::Id;
use crate::repo::{
    ArticleFilter, ArticleRepository, ArticleTagFilter, CommentFilter, FavoriteFilter, TagFilter,
};
use serde_json::json;

pub(super) struct DocArticleRepository<'a> {
    handle: DocHandle<'a>,
}

impl<'a> DocArticleRepository<'a> {
    pub(super) fn new(handle: DocHandle<'a>) -> Self {
        Self { handle }
    }
}

fn favorite_filter(favorite: &ArticleFavorite) -> Filter {
    Filter::all()
        .eq("article_id", favorite.article_id.to_string())
        .eq("user_id", favorite.user_id.to_string())
}

impl ArticleRepository for DocArticleRepository<'_> {
    fn create_article(&self, ctx: &Context, article: &Article) -> AppResult<()> {
        ctx.check()?;
        self.handle.insert(ARTICLES, &[ArticleDoc::from(article)])
    }

    fn update_article(&self, ctx: &Context, article: &Article) -> AppResult<()> {
        ctx.check()?;
        let set = set_fields(json!({
            "title": article.title,
            "slug": article.slug,
            "description": article.description,
            "body": article.body,
            "updated_at": article.updated_at.timestamp_micros(),
        }));
        let updated = self
            .handle
            .write(|session| Ok(session.update_one(ARTICLES, &by_id(article.id), set)?))?;
        if !updated {
            return Err(AppError::not_found("article not found"));
        }
        Ok(())
    }

    fn delete_article(&self, ctx: &Context, id: Id) -> AppResult<()> {
        ctx.check()?;
        let dependents = Filter::all().eq("article_id", id.to_string());
        self.handle.write(|session| {
            if !session.delete_one(ARTICLES, &by_id(id))? {
                return Err(AppError::not_found("article not found"));
            }
            session.delete_many(ARTICLE_TAGS, &dependents)?;
            session.delete_many(ARTICLE_FAVORITES, &dependents)?;
            session.delete_many(COMMENTS, &dependents)?;
            Ok(())
        })
    }

    fn filter_articles(&self, ctx: &Context, filter: &ArticleFilter) -> AppResult<Vec<Article>> {
        ctx.check()?;
        let query = restrict(Filter::all(), "id", filter.ids.as_deref());
        let query = restrict(query, "slug", filter.slugs.as_deref());
        let query = restrict(query, "author_id", filter.author_ids.as_deref());
        let mut options = FindOptions::new()
            .sort("created_at", SortOrder::Desc)
            .sort("id", SortOrder::Desc)
            .skip(filter.offset as usize);
        if let Some(limit) = filter.limit {
            options = options.limit(limit as usize);
        }
        self.handle
            .find::<ArticleDoc>(ARTICLES, &query, &options)?
            .into_iter()
            .map(Article::try_from)
            .collect()
    }

    fn filter_tags(&self, ctx: &Context, filter: &TagFilter) -> AppResult<Vec<Tag>> {
        ctx.check()?;
        let query = restrict(Filter::all(), "id", filter.ids.as_deref());
        let query = restrict(query, "name", filter.names.as_deref());
        self.handle.find(
            TAGS,
            &query,
            &FindOptions::new().sort("name", SortOrder::Asc),
        )
    }

    fn insert_tags(&self, ctx: &Context, tags: &[Tag]) -> AppResult<()> {
        ctx.check()?;
        if tags.is_empty() {
            return Ok(());
        }
        self.handle.insert(TAGS, tags)
    }

    fn assign_tags(&self, ctx: &Context, article_id: Id, tag_ids: &[Id]) -> AppResult<()> {
        ctx.check()?;
        if tag_ids.is_empty() {
            return Ok(());
        }
        let links: Vec<ArticleTag> = tag_ids
            .iter()
            .map(|tag_id| ArticleTag {
                article_id,
                tag_id: *tag_id,
            })
            .collect();
        self.handle.insert(ARTICLE_TAGS, &links)
    }

    fn filter_article_tags(
        &self,
        ctx: &Context,
        filter: &ArticleTagFilter,
    ) -> AppResult<Vec<ArticleTag>> {
        ctx.check()?;
        let query = restrict(Filter::all(), "article_id", filter.article_ids.as_deref());
        let query = restrict(query, "tag_id", filter.tag_ids.as_deref());
        let options = FindOptions::new()
            .sort("article_id", SortOrder::Asc)
            .sort("tag_id", SortOrder::Asc);
        self.handle.find(ARTICLE_TAGS, &query, &options)
    }

    fn add_favorite(&self, ctx: &Context, favorite: &ArticleFavorite) -> AppResult<()> {
        ctx.check()?;
        self.handle.insert(ARTICLE_FAVORITES, &[*favorite])
    }

    fn remove_favorite(&self, ctx: &Context, favorite: &ArticleFavorite) -> AppResult<()> {
        ctx.check()?;
        let filter = favorite_filter(favorite);
        self.handle
            .write(|session| Ok(session.delete_many(ARTICLE_FAVORITES, &filter)?))?;
        Ok(())
    }

    fn filter_favorites(
        &self,
        ctx: &Context,
        filter: &FavoriteFilter,
    ) -> AppResult<Vec<ArticleFavorite>> {
        ctx.check()?;
        let query = restrict(Filter::all(), "article_id", filter.article_ids.as_deref());
        let query = restrict(query, "user_id", filter.user_ids.as_deref());
        let options = FindOptions::new()
            .sort("article_id", SortOrder::Asc)
            .sort("user_id", SortOrder::Asc);
        self.handle.find(ARTICLE_FAVORITES, &query, &options)
    }

    fn count_favorites(&self, ctx: &Context, article_ids: &[Id]) -> AppResult<Vec<FavoriteCount>> {
        ctx.check()?;
        if article_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = restrict(Filter::all(), "article_id", Some(article_ids));
        let groups = self.handle.read(|session| {
            Ok(session.count_by(ARTICLE_FAVORITES, &query, "article_id")?)
        })?;
        groups
            .into_iter()
            .map(|(value, count)| {
                serde_json::from_value(value)
                    .map(|article_id| FavoriteCount { article_id, count })
                    .map_err(AppError::from)
            })
            .collect()
    }

    fn add_comment(&self, ctx: &Context, comment: &Comment) -> AppResult<()> {
        ctx.check()?;
        self.handle.insert(COMMENTS, &[CommentDoc::from(comment)])
    }

    fn filter_comments(&self, ctx: &Context, filter: &CommentFilter) -> AppResult<Vec<Comment>> {
        ctx.check()?;
        let query = restrict(Filter::all(), "id", filter.ids.as_deref());
        let query = restrict(query, "article_id", filter.article_ids.as_deref());
        let query = restrict(query, "author_id", filter.author_ids.as_deref());
        let options = FindOptions::new()
            .sort("created_at", SortOrder::Asc)
            .sort("id", SortOrder::Asc);
        self.handle
            .find::<CommentDoc>(COMMENTS, &query, &options)?
            .into_iter()
            .map(Comment::try_from)
            .collect()
    }

    fn delete_comment(&self, ctx: &Context, id: Id) -> AppResult<()> {
        ctx.check()?;
        let deleted = self
            .handle
            .write(|session| Ok(session.delete_one(COMMENTS, &by_id(id))?))?;
        if !deleted {
            return Err(AppError::not_found("comment not found"));
        }
        Ok(())
    }
}
