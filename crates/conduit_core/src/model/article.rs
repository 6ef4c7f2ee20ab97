//! Article, tag, favorite and comment domain model.
//!
//! # Responsibility
//! - Define persisted article/comment records and the join rows that link
//!   articles to tags and favoriting users.
//! - Derive the article slug from its title.
//! - Normalize tag names.
//!
//! # Invariants
//! - `slug` is a pure function of `title` and is recomputed on every title
//!   change.
//! - `author_id` is fixed at creation.
//! - Tag names are trimmed, lowercase and non-empty.

use crate::error::{AppError, AppResult, Violations};
use crate::model::id::Id;
use crate::model::now;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: Id,
    pub author_id: Id,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Article creation input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewArticle {
    pub title: String,
    pub description: String,
    pub body: String,
}

/// Partial article update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub body: Option<String>,
}

impl Article {
    pub fn new(author_id: Id, input: NewArticle) -> AppResult<Self> {
        let mut violations = Violations::new();
        let slug = violations.check("title", slug_for_title(&input.title));
        violations.check("description", require_text(&input.description));
        violations.check("body", require_text(&input.body));
        violations.into_result()?;

        let created_at = now();
        Ok(Self {
            id: Id::new(),
            author_id,
            title: input.title,
            slug: slug.unwrap_or_default(),
            description: input.description,
            body: input.body,
            created_at,
            updated_at: created_at,
        })
    }

    /// Replaces the title and recomputes the slug.
    pub fn set_title(&mut self, title: String) -> AppResult<()> {
        let slug = slug_for_title(&title).map_err(|msg| AppError::invalid_field("title", msg))?;
        self.title = title;
        self.slug = slug;
        Ok(())
    }

    /// Applies a partial update in place and reports whether anything changed.
    pub fn apply(&mut self, changes: ArticleChanges) -> AppResult<bool> {
        let mut violations = Violations::new();
        let title = changes.title.filter(|value| *value != self.title);
        if let Some(value) = title.as_deref() {
            violations.check("title", slug_for_title(value));
        }
        let description = changes.description.filter(|value| *value != self.description);
        if let Some(value) = description.as_deref() {
            violations.check("description", require_text(value));
        }
        let body = changes.body.filter(|value| *value != self.body);
        if let Some(value) = body.as_deref() {
            violations.check("body", require_text(value));
        }
        violations.into_result()?;

        let changed = title.is_some() || description.is_some() || body.is_some();
        if let Some(value) = title {
            self.set_title(value)?;
        }
        if let Some(value) = description {
            self.description = value;
        }
        if let Some(value) = body {
            self.body = value;
        }
        if changed {
            self.updated_at = now();
        }
        Ok(changed)
    }
}

/// Derives the URL slug for a title.
pub fn slug_for_title(title: &str) -> Result<String, String> {
    if title.trim().is_empty() {
        return Err("is required".to_string());
    }
    let slug = slug::slugify(title);
    if slug.is_empty() {
        return Err("must contain at least one letter or digit".to_string());
    }
    Ok(slug)
}

fn require_text(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err("is required".to_string());
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub id: Id,
    pub name: String,
}

impl Tag {
    /// Builds a tag for an already-normalized name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Id::new(),
            name: name.into(),
        }
    }
}

/// Normalizes one tag value: trimmed and lowercase, `None` when blank.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let trimmed = tag.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Normalizes and deduplicates tag values, sorted by name.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut unique = BTreeSet::new();
    for tag in tags {
        if let Some(value) = normalize_tag(tag) {
            unique.insert(value);
        }
    }
    unique.into_iter().collect()
}

/// Normalizes tag input, rejecting blank entries.
pub fn validate_tags(tags: &[String]) -> AppResult<Vec<String>> {
    if let Some(blank) = tags.iter().find(|tag| tag.trim().is_empty()) {
        return Err(AppError::invalid_field(
            "tags",
            format!("invalid tag: `{blank}`"),
        ));
    }
    Ok(normalize_tags(tags))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArticleTag {
    pub article_id: Id,
    pub tag_id: Id,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArticleFavorite {
    pub article_id: Id,
    pub user_id: Id,
}

/// Grouped favorite count for one article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteCount {
    pub article_id: Id,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Id,
    pub article_id: Id,
    pub author_id: Id,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(article_id: Id, author_id: Id, body: impl Into<String>) -> AppResult<Self> {
        let body = body.into();
        require_text(&body).map_err(|msg| AppError::invalid_field("body", msg))?;
        let created_at = now();
        Ok(Self {
            id: Id::new(),
            article_id,
            author_id,
            body,
            created_at,
            updated_at: created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_tags, slug_for_title, validate_tags, Article, ArticleChanges, NewArticle};
    use crate::error::ErrorKind;
    use crate::model::id::Id;

    fn new_article(title: &str) -> NewArticle {
        NewArticle {
            title: title.to_string(),
            description: "desc".to_string(),
            body: "body".to_string(),
        }
    }

    #[test]
    fn slug_is_derived_from_title() {
        assert_eq!(slug_for_title("Hello World").unwrap(), "hello-world");
        assert!(slug_for_title("   ").is_err());
        assert!(slug_for_title("!!!").is_err());
    }

    #[test]
    fn title_change_recomputes_slug() {
        let mut article = Article::new(Id::new(), new_article("First Title")).unwrap();
        assert_eq!(article.slug, "first-title");

        let changed = article
            .apply(ArticleChanges {
                title: Some("Second Title".to_string()),
                ..ArticleChanges::default()
            })
            .unwrap();
        assert!(changed);
        assert_eq!(article.slug, "second-title");
    }

    #[test]
    fn blank_fields_are_rejected() {
        let err = Article::new(
            Id::new(),
            NewArticle {
                title: " ".to_string(),
                description: String::new(),
                body: String::new(),
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.fields().len(), 3);
    }

    #[test]
    fn tags_are_lowercased_deduplicated_and_sorted() {
        let tags = vec!["Go".to_string(), " backend ".to_string(), "GO".to_string()];
        assert_eq!(normalize_tags(&tags), vec!["backend", "go"]);
    }

    #[test]
    fn blank_tag_is_a_validation_error() {
        let err = validate_tags(&["rust".to_string(), "  ".to_string()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
