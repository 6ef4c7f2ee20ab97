#[macro_use]
mod common;

use common::{ctx, publish, register, service};
use conduit_core::repo::FollowFilter;
use conduit_core::{ErrorKind, NewUser, Repository, UserChanges};

fn registration_validates_and_enforces_uniqueness<R: Repository>(repo: R) {
    let service = service(repo);
    let users = service.users();
    let ann = register(&service, "ann");
    assert_eq!(ann.image, conduit_core::model::user::USER_DEFAULT_IMAGE);

    let duplicate = users
        .register(
            &ctx(),
            NewUser {
                email: "ann@example.com".to_string(),
                username: "ann_two".to_string(),
                password_hash: "hash".to_string(),
                ..NewUser::default()
            },
        )
        .unwrap_err();
    assert_eq!(duplicate.kind(), ErrorKind::Validation);
    assert!(duplicate.fields().contains_key("email"));

    let invalid = users
        .register(
            &ctx(),
            NewUser {
                email: "not-an-email".to_string(),
                username: "Bad Name".to_string(),
                password_hash: "hash".to_string(),
                ..NewUser::default()
            },
        )
        .unwrap_err();
    assert_eq!(invalid.kind(), ErrorKind::Validation);
    assert!(invalid.fields().contains_key("email"));
    assert!(invalid.fields().contains_key("username"));

    let found = users.find_by_email(&ctx(), "ann@example.com").unwrap();
    assert_eq!(found.id, ann.id);
    assert_eq!(found.password_hash, "hash-ann");
    let missing = users.find_by_email(&ctx(), "zed@example.com").unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
}

fn current_requires_viewer<R: Repository>(repo: R) {
    let service = service(repo);
    let ann = register(&service, "ann");
    let users = service.users();

    assert_eq!(users.current(&ctx(), Some(ann.id)).unwrap().username, "ann");
    let err = users.current(&ctx(), None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

fn update_changes_only_supplied_fields<R: Repository>(repo: R) {
    let service = service(repo);
    let ann = register(&service, "ann");
    register(&service, "bob");
    let users = service.users();

    let updated = users
        .update(
            &ctx(),
            Some(ann.id),
            UserChanges {
                bio: Some("writes about go".to_string()),
                ..UserChanges::default()
            },
        )
        .unwrap();
    assert_eq!(updated.bio, "writes about go");
    assert_eq!(updated.email, ann.email);

    let stored = users.current(&ctx(), Some(ann.id)).unwrap();
    assert_eq!(stored.bio, "writes about go");

    let taken = users
        .update(
            &ctx(),
            Some(ann.id),
            UserChanges {
                username: Some("bob".to_string()),
                ..UserChanges::default()
            },
        )
        .unwrap_err();
    assert_eq!(taken.kind(), ErrorKind::Validation);
    assert_eq!(users.current(&ctx(), Some(ann.id)).unwrap().username, "ann");
}

fn self_follow_is_rejected<R: Repository>(repo: R) {
    let service = service(repo);
    let ann = register(&service, "ann");

    let err = service
        .users()
        .follow(&ctx(), Some(ann.id), "ann")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let follows = service
        .repository()
        .user()
        .filter_follows(&ctx(), &FollowFilter::default())
        .unwrap();
    assert!(follows.is_empty());
}

fn follow_is_idempotent<R: Repository>(repo: R) {
    let service = service(repo);
    let ann = register(&service, "ann");
    register(&service, "bob");
    let users = service.users();

    assert!(users.follow(&ctx(), Some(ann.id), "bob").unwrap().is_followed);
    assert!(users.follow(&ctx(), Some(ann.id), "bob").unwrap().is_followed);
    let follows = service
        .repository()
        .user()
        .filter_follows(&ctx(), &FollowFilter::default())
        .unwrap();
    assert_eq!(follows.len(), 1);

    assert!(users.profile(&ctx(), Some(ann.id), "bob").unwrap().is_followed);
    assert!(!users.profile(&ctx(), None, "bob").unwrap().is_followed);

    assert!(!users.unfollow(&ctx(), Some(ann.id), "bob").unwrap().is_followed);
    assert!(!users.unfollow(&ctx(), Some(ann.id), "bob").unwrap().is_followed);
    assert!(!users.profile(&ctx(), Some(ann.id), "bob").unwrap().is_followed);

    let missing = users.follow(&ctx(), Some(ann.id), "nobody").unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
}

fn decoration_is_viewer_relative<R: Repository>(repo: R) {
    let service = service(repo);
    let ann = register(&service, "ann");
    let bob = register(&service, "bob");
    let carol = register(&service, "carol");
    let slug = publish(&service, &ann, "Hello World", &["go"]).article.slug;
    service.users().follow(&ctx(), Some(bob.id), "ann").unwrap();
    service
        .articles()
        .favorite(&ctx(), Some(bob.id), &slug)
        .unwrap();
    let articles = service.articles();

    let for_bob = articles.get(&ctx(), Some(bob.id), &slug).unwrap();
    assert!(for_bob.author.is_followed);
    assert!(for_bob.is_favorite);

    let for_carol = articles.get(&ctx(), Some(carol.id), &slug).unwrap();
    assert!(!for_carol.author.is_followed);
    assert!(!for_carol.is_favorite);

    let anonymous = articles.get(&ctx(), None, &slug).unwrap();
    assert!(!anonymous.author.is_followed);
    assert!(!anonymous.is_favorite);

    for view in [&for_bob, &for_carol, &anonymous] {
        assert_eq!(view.favorites_count, 1);
        assert_eq!(view.tag_list, vec!["go".to_string()]);
        assert_eq!(view.author.username, "ann");
    }
}

backend_tests!(
    registration_validates_and_enforces_uniqueness,
    current_requires_viewer,
    update_changes_only_supplied_fields,
    self_follow_is_rejected,
    follow_is_idempotent,
    decoration_is_viewer_relative,
);
