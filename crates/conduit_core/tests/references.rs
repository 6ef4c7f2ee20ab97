#[macro_use]
mod common;

use common::{ctx, new_article, publish, register, service, strings};
use conduit_core::model::article::ArticleFavorite;
use conduit_core::model::user::UserFollow;
use conduit_core::repo::{CommentFilter, FavoriteFilter, FollowFilter};
use conduit_core::{
    AppError, Article, Comment, DocumentRepository, ErrorKind, Id, Repository, RepositoryExt,
    SqlRepository,
};

fn assert_dangling(err: AppError) {
    assert_eq!(err.kind(), ErrorKind::Validation, "{err}");
    assert!(err.fields().contains_key("reference"), "{err}");
}

fn writes_to_missing_records_are_rejected<R: Repository>(repo: R) {
    let service = service(repo);
    let ann = register(&service, "ann");
    let view = publish(&service, &ann, "Hello World", &["go"]);
    let repo = service.repository();
    let articles = repo.article();
    let ctx = ctx();
    let ghost = Id::new();

    assert_dangling(
        articles
            .add_favorite(&ctx, &ArticleFavorite { article_id: ghost, user_id: ann.id })
            .unwrap_err(),
    );
    assert_dangling(
        articles
            .add_favorite(&ctx, &ArticleFavorite { article_id: view.article.id, user_id: ghost })
            .unwrap_err(),
    );
    assert_dangling(
        articles
            .add_comment(&ctx, &Comment::new(ghost, ann.id, "lost").unwrap())
            .unwrap_err(),
    );
    assert_dangling(
        articles
            .add_comment(&ctx, &Comment::new(view.article.id, ghost, "lost").unwrap())
            .unwrap_err(),
    );
    let go = articles.add_tags_if_not_exists(&ctx, &strings(&["go"])).unwrap();
    assert_dangling(articles.assign_tags(&ctx, ghost, &[go[0].id]).unwrap_err());
    assert_dangling(articles.assign_tags(&ctx, view.article.id, &[ghost]).unwrap_err());
    assert_dangling(
        articles
            .create_article(&ctx, &Article::new(ghost, new_article("Orphan")).unwrap())
            .unwrap_err(),
    );
    assert_dangling(
        repo.user()
            .follow(&ctx, &UserFollow::new(ann.id, ghost).unwrap())
            .unwrap_err(),
    );

    let favorites = articles
        .filter_favorites(&ctx, &FavoriteFilter::default())
        .unwrap();
    assert!(favorites.is_empty());
    let comments = articles
        .filter_comments(&ctx, &CommentFilter::default())
        .unwrap();
    assert!(comments.is_empty());
    let follows = repo
        .user()
        .filter_follows(&ctx, &FollowFilter::default())
        .unwrap();
    assert!(follows.is_empty());
}

fn favorite_after_delete_is_refused<R: Repository>(repo: R) {
    let service = service(repo);
    let ann = register(&service, "ann");
    let bob = register(&service, "bob");
    let view = publish(&service, &ann, "Hello World", &[]);
    let ctx = ctx();

    service
        .articles()
        .delete(&ctx, Some(ann.id), "hello-world")
        .unwrap();

    let err = service
        .articles()
        .favorite(&ctx, Some(bob.id), "hello-world")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    // A caller still holding the stale id cannot recreate the link either.
    let stale = ArticleFavorite {
        article_id: view.article.id,
        user_id: bob.id,
    };
    assert_dangling(
        service
            .repository()
            .run_atomic(&ctx, |scope| scope.article().add_favorite(&ctx, &stale))
            .unwrap_err(),
    );
}

backend_tests!(
    writes_to_missing_records_are_rejected,
    favorite_after_delete_is_refused,
);

#[test]
fn document_delete_racing_an_open_favorite_fails_its_commit() {
    let repo = DocumentRepository::open().unwrap();
    let service = service(repo.clone());
    let ann = register(&service, "ann");
    let bob = register(&service, "bob");
    let view = publish(&service, &ann, "Hello World", &[]);
    let ctx = ctx();
    let favorite = ArticleFavorite {
        article_id: view.article.id,
        user_id: bob.id,
    };

    let err = repo
        .run_atomic(&ctx, |scope| {
            scope.article().add_favorite(&ctx, &favorite)?;
            // Another writer removes the article before this scope commits.
            service.articles().delete(&ctx, Some(ann.id), "hello-world")
        })
        .unwrap_err();
    assert_dangling(err);

    let favorites = repo
        .article()
        .filter_favorites(&ctx, &FavoriteFilter::default())
        .unwrap();
    assert!(favorites.is_empty());
}

/// Bypasses the schema so aggregation sees rows the backends never produce.
fn corrupted(statement: &str) -> (conduit_core::Service<SqlRepository>, conduit_core::User) {
    let service = service(SqlRepository::in_memory().unwrap());
    let ann = register(&service, "ann");
    publish(&service, &ann, "Hello World", &["go"]);
    service
        .repository()
        .connection()
        .execute_batch(&format!("PRAGMA foreign_keys = OFF; {statement}"))
        .unwrap();
    (service, ann)
}

#[test]
fn tag_link_without_tag_row_is_internal() {
    let (service, ann) = corrupted("DELETE FROM tags;");
    let err = service
        .articles()
        .get(&ctx(), Some(ann.id), "hello-world")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(err.message().contains("linked but missing"), "{err}");
}

#[test]
fn article_without_author_row_is_internal() {
    let (service, _) = corrupted("DELETE FROM users;");
    let err = service.articles().get(&ctx(), None, "hello-world").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(err.message().contains("missing"), "{err}");
}
