#![allow(dead_code)]

use conduit_core::{
    ArticleView, Context, CoreConfig, DocumentRepository, Id, NewArticle, NewUser, Repository,
    Service, SqlRepository, User,
};

/// Expands each scenario `fn name<R: Repository>(repo: R)` into one test per
/// storage backend: `sql::name` and `document::name`.
macro_rules! backend_tests {
    ($($name:ident),* $(,)?) => {
        mod sql {
            $(
                #[test]
                fn $name() {
                    super::$name(crate::common::sql_repo());
                }
            )*
        }

        mod document {
            $(
                #[test]
                fn $name() {
                    super::$name(crate::common::document_repo());
                }
            )*
        }
    };
}

pub fn sql_repo() -> SqlRepository {
    SqlRepository::in_memory().unwrap()
}

pub fn document_repo() -> DocumentRepository {
    DocumentRepository::open().unwrap()
}

pub fn service<R: Repository>(repo: R) -> Service<R> {
    Service::new(repo, CoreConfig::default())
}

pub fn ctx() -> Context {
    Context::background()
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

pub fn register<R: Repository>(service: &Service<R>, username: &str) -> User {
    service
        .users()
        .register(
            &ctx(),
            NewUser {
                email: format!("{username}@example.com"),
                username: username.to_string(),
                password_hash: format!("hash-{username}"),
                ..NewUser::default()
            },
        )
        .unwrap()
}

pub fn new_article(title: &str) -> NewArticle {
    NewArticle {
        title: title.to_string(),
        description: format!("about {title}"),
        body: format!("body of {title}"),
    }
}

pub fn publish<R: Repository>(
    service: &Service<R>,
    author: &User,
    title: &str,
    tags: &[&str],
) -> ArticleView {
    service
        .articles()
        .create(&ctx(), Some(author.id), new_article(title), &strings(tags))
        .unwrap()
}

pub fn titles(views: &[ArticleView]) -> Vec<String> {
    views.iter().map(|view| view.article.title.clone()).collect()
}

pub fn ids(views: &[ArticleView]) -> Vec<Id> {
    views.iter().map(|view| view.article.id).collect()
}
