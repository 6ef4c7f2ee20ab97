//! SQLite article, tag, favorite and comment repository.
//!
//! # Invariants
//! - Articles list newest first (`created_at DESC, id DESC`), comments
//!   oldest first, tags by name.
//! - Multi-row inserts are single statements, so a duplicate anywhere in a
//!   batch rejects the whole batch even outside an atomic scope.

use super::query::{timestamp, to_micros, values_placeholders, Conditions};
use crate::context::Context;
use crate::error::{AppError, AppResult};
use crate::model::article::{Article, ArticleFavorite, ArticleTag, Comment, FavoriteCount, Tag};
use crate::model::id::Id;
use crate::repo::{
    ArticleFilter, ArticleRepository, ArticleTagFilter, CommentFilter, FavoriteFilter, TagFilter,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

const ARTICLE_COLUMNS: &str =
    "id, author_id, title, slug, description, body, created_at, updated_at";
const COMMENT_COLUMNS: &str = "id, article_id, author_id, body, created_at, updated_at";

pub(super) struct SqlArticleRepository<'c> {
    conn: &'c Connection,
}

impl<'c> SqlArticleRepository<'c> {
    pub(super) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn query_all<T, F>(&self, sql: &str, params: Vec<Value>, map: F) -> AppResult<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(params), map)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

impl ArticleRepository for SqlArticleRepository<'_> {
    fn create_article(&self, ctx: &Context, article: &Article) -> AppResult<()> {
        ctx.check()?;
        self.conn.execute(
            "INSERT INTO articles (id, author_id, title, slug, description, body, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                article.id,
                article.author_id,
                article.title,
                article.slug,
                article.description,
                article.body,
                to_micros(&article.created_at),
                to_micros(&article.updated_at),
            ],
        )?;
        Ok(())
    }

    fn update_article(&self, ctx: &Context, article: &Article) -> AppResult<()> {
        ctx.check()?;
        let changed = self.conn.execute(
            "UPDATE articles
             SET title = ?2,
                 slug = ?3,
                 description = ?4,
                 body = ?5,
                 updated_at = ?6
             WHERE id = ?1;",
            params![
                article.id,
                article.title,
                article.slug,
                article.description,
                article.body,
                to_micros(&article.updated_at),
            ],
        )?;
        if changed == 0 {
            return Err(AppError::not_found("article not found"));
        }
        Ok(())
    }

    fn delete_article(&self, ctx: &Context, id: Id) -> AppResult<()> {
        ctx.check()?;
        // Tag links, favorites and comments cascade.
        let changed = self
            .conn
            .execute("DELETE FROM articles WHERE id = ?1;", params![id])?;
        if changed == 0 {
            return Err(AppError::not_found("article not found"));
        }
        Ok(())
    }

    fn filter_articles(&self, ctx: &Context, filter: &ArticleFilter) -> AppResult<Vec<Article>> {
        ctx.check()?;
        let mut conditions = Conditions::new();
        conditions
            .any_of("id", filter.ids.as_deref())
            .any_of("slug", filter.slugs.as_deref())
            .any_of("author_id", filter.author_ids.as_deref());
        if conditions.is_unsatisfiable() || filter.limit == Some(0) {
            return Ok(Vec::new());
        }

        let mut sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles{} ORDER BY created_at DESC, id DESC",
            conditions.where_sql()
        );
        if filter.limit.is_some() || filter.offset > 0 {
            // SQLite requires LIMIT before OFFSET; -1 means unbounded.
            sql.push_str(" LIMIT ? OFFSET ?");
            conditions.push_param(Value::Integer(filter.limit.map_or(-1, i64::from)));
            conditions.push_param(Value::Integer(i64::from(filter.offset)));
        }
        self.query_all(&sql, conditions.into_params(), article_from_row)
    }

    fn filter_tags(&self, ctx: &Context, filter: &TagFilter) -> AppResult<Vec<Tag>> {
        ctx.check()?;
        let mut conditions = Conditions::new();
        conditions
            .any_of("id", filter.ids.as_deref())
            .any_of("name", filter.names.as_deref());
        if conditions.is_unsatisfiable() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, name FROM tags{} ORDER BY name ASC;",
            conditions.where_sql()
        );
        self.query_all(&sql, conditions.into_params(), |row| {
            Ok(Tag {
                id: row.get("id")?,
                name: row.get("name")?,
            })
        })
    }

    fn insert_tags(&self, ctx: &Context, tags: &[Tag]) -> AppResult<()> {
        ctx.check()?;
        if tags.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "INSERT INTO tags (id, name) VALUES {};",
            values_placeholders(tags.len(), 2)
        );
        let params: Vec<Value> = tags
            .iter()
            .flat_map(|tag| [Value::from(tag.id), Value::Text(tag.name.clone())])
            .collect();
        self.conn.execute(&sql, params_from_iter(params))?;
        Ok(())
    }

    fn assign_tags(&self, ctx: &Context, article_id: Id, tag_ids: &[Id]) -> AppResult<()> {
        ctx.check()?;
        if tag_ids.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "INSERT INTO article_tags (article_id, tag_id) VALUES {};",
            values_placeholders(tag_ids.len(), 2)
        );
        let params: Vec<Value> = tag_ids
            .iter()
            .flat_map(|tag_id| [Value::from(article_id), Value::from(*tag_id)])
            .collect();
        self.conn.execute(&sql, params_from_iter(params))?;
        Ok(())
    }

    fn filter_article_tags(
        &self,
        ctx: &Context,
        filter: &ArticleTagFilter,
    ) -> AppResult<Vec<ArticleTag>> {
        ctx.check()?;
        let mut conditions = Conditions::new();
        conditions
            .any_of("article_id", filter.article_ids.as_deref())
            .any_of("tag_id", filter.tag_ids.as_deref());
        if conditions.is_unsatisfiable() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT article_id, tag_id FROM article_tags{} ORDER BY article_id, tag_id;",
            conditions.where_sql()
        );
        self.query_all(&sql, conditions.into_params(), |row| {
            Ok(ArticleTag {
                article_id: row.get("article_id")?,
                tag_id: row.get("tag_id")?,
            })
        })
    }

    fn add_favorite(&self, ctx: &Context, favorite: &ArticleFavorite) -> AppResult<()> {
        ctx.check()?;
        self.conn.execute(
            "INSERT INTO article_favorites (article_id, user_id) VALUES (?1, ?2);",
            params![favorite.article_id, favorite.user_id],
        )?;
        Ok(())
    }

    fn remove_favorite(&self, ctx: &Context, favorite: &ArticleFavorite) -> AppResult<()> {
        ctx.check()?;
        self.conn.execute(
            "DELETE FROM article_favorites WHERE article_id = ?1 AND user_id = ?2;",
            params![favorite.article_id, favorite.user_id],
        )?;
        Ok(())
    }

    fn filter_favorites(
        &self,
        ctx: &Context,
        filter: &FavoriteFilter,
    ) -> AppResult<Vec<ArticleFavorite>> {
        ctx.check()?;
        let mut conditions = Conditions::new();
        conditions
            .any_of("article_id", filter.article_ids.as_deref())
            .any_of("user_id", filter.user_ids.as_deref());
        if conditions.is_unsatisfiable() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT article_id, user_id FROM article_favorites{} ORDER BY article_id, user_id;",
            conditions.where_sql()
        );
        self.query_all(&sql, conditions.into_params(), |row| {
            Ok(ArticleFavorite {
                article_id: row.get("article_id")?,
                user_id: row.get("user_id")?,
            })
        })
    }

    fn count_favorites(&self, ctx: &Context, article_ids: &[Id]) -> AppResult<Vec<FavoriteCount>> {
        ctx.check()?;
        if article_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conditions = Conditions::new();
        conditions.any_of("article_id", Some(article_ids));

        let sql = format!(
            "SELECT article_id, COUNT(*) AS favorites
             FROM article_favorites{}
             GROUP BY article_id
             ORDER BY article_id;",
            conditions.where_sql()
        );
        self.query_all(&sql, conditions.into_params(), |row| {
            let count: i64 = row.get("favorites")?;
            Ok(FavoriteCount {
                article_id: row.get("article_id")?,
                count: u64::try_from(count).unwrap_or_default(),
            })
        })
    }

    fn add_comment(&self, ctx: &Context, comment: &Comment) -> AppResult<()> {
        ctx.check()?;
        self.conn.execute(
            "INSERT INTO comments (id, article_id, author_id, body, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                comment.id,
                comment.article_id,
                comment.author_id,
                comment.body,
                to_micros(&comment.created_at),
                to_micros(&comment.updated_at),
            ],
        )?;
        Ok(())
    }

    fn filter_comments(&self, ctx: &Context, filter: &CommentFilter) -> AppResult<Vec<Comment>> {
        ctx.check()?;
        let mut conditions = Conditions::new();
        conditions
            .any_of("id", filter.ids.as_deref())
            .any_of("article_id", filter.article_ids.as_deref())
            .any_of("author_id", filter.author_ids.as_deref());
        if conditions.is_unsatisfiable() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments{} ORDER BY created_at ASC, id ASC;",
            conditions.where_sql()
        );
        self.query_all(&sql, conditions.into_params(), |row| {
            Ok(Comment {
                id: row.get("id")?,
                article_id: row.get("article_id")?,
                author_id: row.get("author_id")?,
                body: row.get("body")?,
                created_at: timestamp(row, "created_at")?,
                updated_at: timestamp(row, "updated_at")?,
            })
        })
    }

    fn delete_comment(&self, ctx: &Context, id: Id) -> AppResult<()> {
        ctx.check()?;
        let changed = self
            .conn
            .execute("DELETE FROM comments WHERE id = ?1;", params![id])?;
        if changed == 0 {
            return Err(AppError::not_found("comment not found"));
        }
        Ok(())
    }
}

fn article_from_row(row: &Row<'_>) -> rusqlite::Result<Article> {
    Ok(Article {
        id: row.get("id")?,
        author_id: row.get("author_id")?,
        title: row.get("title")?,
        slug: row.get("slug")?,
        description: row.get("description")?,
        body: row.get("body")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}
