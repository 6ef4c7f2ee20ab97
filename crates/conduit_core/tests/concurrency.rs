mod common;

use common::{ctx, new_article, publish, register, service, strings};
use conduit_core::db::open_db;
use conduit_core::repo::{ArticleFilter, FavoriteFilter, FollowFilter, TagFilter};
use conduit_core::{AppResult, ArticleView, DocumentRepository, ErrorKind, Repository, SqlRepository};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WRITERS: usize = 8;
const SHARED_TAGS: [&str; 3] = ["alpha", "beta", "gamma"];

/// Every writer publishes a distinct article carrying the same tag set.
fn publish_concurrently<R, F>(open: F) -> (R, Vec<AppResult<ArticleView>>)
where
    R: Repository,
    F: Fn() -> R + Send + Sync + 'static,
{
    let open = Arc::new(open);
    let setup = service(open());
    let author = register(&setup, "ann").id;

    let handles: Vec<_> = (0..WRITERS)
        .map(|index| {
            let open = Arc::clone(&open);
            thread::spawn(move || {
                let service = service(open());
                service.articles().create(
                    &ctx(),
                    Some(author),
                    new_article(&format!("Concurrent {index}")),
                    &strings(&SHARED_TAGS),
                )
            })
        })
        .collect();
    let results = handles
        .into_iter()
        .map(|handle| handle.join().expect("writer thread panicked"))
        .collect();
    (open(), results)
}

fn assert_consistent<R: Repository>(repo: R, results: Vec<AppResult<ArticleView>>) {
    let mut successes = 0;
    for result in results {
        match result {
            Ok(view) => {
                successes += 1;
                assert_eq!(view.tag_list, strings(&SHARED_TAGS));
            }
            Err(err) => assert_eq!(err.kind(), ErrorKind::Validation, "{err}"),
        }
    }
    assert!(successes > 0);

    let ctx = ctx();
    let tags = repo
        .article()
        .filter_tags(&ctx, &TagFilter::default())
        .unwrap();
    let names: Vec<String> = tags.into_iter().map(|tag| tag.name).collect();
    assert_eq!(names, strings(&SHARED_TAGS));

    let articles = repo
        .article()
        .filter_articles(&ctx, &ArticleFilter::default())
        .unwrap();
    assert_eq!(articles.len(), successes);
}

#[test]
fn sql_writers_share_tags_without_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conduit.db");
    let (repo, results) = publish_concurrently(move || {
        SqlRepository::new(open_db(&path, Duration::from_secs(5)).unwrap())
    });
    assert_consistent(repo, results);
}

#[test]
fn document_writers_share_tags_without_duplicates() {
    let shared = DocumentRepository::open().unwrap();
    let (repo, results) = publish_concurrently(move || shared.clone());
    assert_consistent(repo, results);
}

/// Every writer favorites the same article and follows the same author as
/// one viewer; returns the repository once all writers are done.
fn repeat_favorite_and_follow<R, F>(open: F) -> R
where
    R: Repository,
    F: Fn() -> R + Send + Sync + 'static,
{
    let open = Arc::new(open);
    let setup = service(open());
    let ann = register(&setup, "ann");
    let bob = register(&setup, "bob").id;
    publish(&setup, &ann, "Hello World", &[]);

    let handles: Vec<_> = (0..WRITERS)
        .map(|_| {
            let open = Arc::clone(&open);
            thread::spawn(move || {
                let service = service(open());
                let view = service.articles().favorite(&ctx(), Some(bob), "hello-world")?;
                let profile = service.users().follow(&ctx(), Some(bob), "ann")?;
                Ok::<_, conduit_core::AppError>((view, profile))
            })
        })
        .collect();
    for handle in handles {
        let (view, profile) = handle
            .join()
            .expect("writer thread panicked")
            .unwrap_or_else(|err| panic!("repeated favorite or follow failed: {err}"));
        assert!(view.is_favorite);
        assert_eq!(view.favorites_count, 1);
        assert!(profile.is_followed);
    }
    open()
}

fn assert_single_pair<R: Repository>(repo: R) {
    let ctx = ctx();
    let favorites = repo
        .article()
        .filter_favorites(&ctx, &FavoriteFilter::default())
        .unwrap();
    assert_eq!(favorites.len(), 1);
    let follows = repo
        .user()
        .filter_follows(&ctx, &FollowFilter::default())
        .unwrap();
    assert_eq!(follows.len(), 1);
}

#[test]
fn sql_repeated_favorite_and_follow_stay_single() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conduit.db");
    let repo = repeat_favorite_and_follow(move || {
        SqlRepository::new(open_db(&path, Duration::from_secs(5)).unwrap())
    });
    assert_single_pair(repo);
}

#[test]
fn document_repeated_favorite_and_follow_stay_single() {
    let shared = DocumentRepository::open().unwrap();
    let repo = repeat_favorite_and_follow(move || shared.clone());
    assert_single_pair(repo);
}
