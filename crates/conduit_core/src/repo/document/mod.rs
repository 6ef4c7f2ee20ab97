//! Embedded document-store repository backend.
//!
//! # Responsibility
//! - Implement the repository contracts on `docstore::DocumentDb`.
//! - Declare the unique indexes and references that stand in for relational
//!   constraints.
//! - Map the atomic boundary onto a docstore session.
//!
//! # Invariants
//! - Outside `atomic`, each write runs in its own implicit session, so a
//!   multi-document write (article delete) still applies all-or-nothing.
//! - Inside `atomic`, every read sees the scope's own uncommitted writes and
//!   nested calls reuse the same session.
//! - Session commit failures (`DuplicateKey`, `WriteConflict`,
//!   `DanglingReference`) surface as `Validation` and leave committed data
//!   untouched.
//! - References mirror the relational foreign keys: join rows and comments
//!   follow their article, follows and favorites follow their user.

mod article;
mod error;
mod model;
mod user;

use crate::context::Context;
use crate::docstore::{DocumentDb, Filter, FindOptions, IndexSpec, ReferenceSpec, Session};
use crate::error::{AppError, AppResult};
use crate::logging::OpTimer;
use crate::model::id::Id;
use crate::repo::{ArticleRepository, AtomicFn, Repository, UserRepository};
use log::info;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::cell::RefCell;

use self::article::DocArticleRepository;
use self::user::DocUserRepository;

pub(crate) const USERS: &str = "users";
pub(crate) const USER_FOLLOWS: &str = "user_follows";
pub(crate) const ARTICLES: &str = "articles";
pub(crate) const TAGS: &str = "tags";
pub(crate) const ARTICLE_TAGS: &str = "article_tags";
pub(crate) const ARTICLE_FAVORITES: &str = "article_favorites";
pub(crate) const COMMENTS: &str = "comments";

/// Top-level document-store handle. Clones share the same database.
#[derive(Debug, Clone)]
pub struct DocumentRepository {
    db: DocumentDb,
}

impl DocumentRepository {
    /// Wraps `db`, declaring every collection and unique index.
    pub fn new(db: DocumentDb) -> AppResult<Self> {
        bootstrap(&db)?;
        Ok(Self { db })
    }

    /// Fresh empty database.
    pub fn open() -> AppResult<Self> {
        Self::new(DocumentDb::new())
    }

    pub fn database(&self) -> &DocumentDb {
        &self.db
    }
}

fn bootstrap(db: &DocumentDb) -> AppResult<()> {
    let collections: [(&str, Vec<IndexSpec>); 7] = [
        (
            USERS,
            vec![
                IndexSpec::unique("id", &["id"]),
                IndexSpec::unique("email", &["email"]),
                IndexSpec::unique("username", &["username"]),
            ],
        ),
        (
            USER_FOLLOWS,
            vec![IndexSpec::unique(
                "user_follows",
                &["follower_id", "followee_id"],
            )],
        ),
        (
            TAGS,
            vec![
                IndexSpec::unique("id", &["id"]),
                IndexSpec::unique("name", &["name"]),
            ],
        ),
        (
            ARTICLES,
            vec![
                IndexSpec::unique("id", &["id"]),
                IndexSpec::unique("slug", &["slug"]),
            ],
        ),
        (
            ARTICLE_TAGS,
            vec![IndexSpec::unique("article_tags", &["article_id", "tag_id"])],
        ),
        (
            ARTICLE_FAVORITES,
            vec![IndexSpec::unique(
                "article_favorites",
                &["article_id", "user_id"],
            )],
        ),
        (COMMENTS, vec![IndexSpec::unique("id", &["id"])]),
    ];
    for (name, indexes) in &collections {
        db.create_collection(name, indexes)?;
    }

    let references = [
        (USER_FOLLOWS, ReferenceSpec::new("follower_id", USERS, "id").on_delete_cascade()),
        (USER_FOLLOWS, ReferenceSpec::new("followee_id", USERS, "id").on_delete_cascade()),
        (ARTICLES, ReferenceSpec::new("author_id", USERS, "id")),
        (ARTICLE_TAGS, ReferenceSpec::new("article_id", ARTICLES, "id").on_delete_cascade()),
        (ARTICLE_TAGS, ReferenceSpec::new("tag_id", TAGS, "id")),
        (ARTICLE_FAVORITES, ReferenceSpec::new("article_id", ARTICLES, "id").on_delete_cascade()),
        (ARTICLE_FAVORITES, ReferenceSpec::new("user_id", USERS, "id").on_delete_cascade()),
        (COMMENTS, ReferenceSpec::new("article_id", ARTICLES, "id").on_delete_cascade()),
        (COMMENTS, ReferenceSpec::new("author_id", USERS, "id")),
    ];
    for (name, reference) in references {
        db.add_reference(name, reference)?;
    }
    info!(
        "event=docstore_bootstrap module=repo.document status=ok collections={}",
        collections.len()
    );
    Ok(())
}

impl Repository for DocumentRepository {
    fn atomic(&self, ctx: &Context, f: &mut AtomicFn<'_>) -> AppResult<()> {
        ctx.check()?;
        let timer = OpTimer::start("atomic", "repo.document");
        timer.finish(run_in_session(&self.db, ctx, f))
    }

    fn user(&self) -> Box<dyn UserRepository + '_> {
        Box::new(DocUserRepository::new(DocHandle::Db(&self.db)))
    }

    fn article(&self) -> Box<dyn ArticleRepository + '_> {
        Box::new(DocArticleRepository::new(DocHandle::Db(&self.db)))
    }
}

fn run_in_session(db: &DocumentDb, ctx: &Context, f: &mut AtomicFn<'_>) -> AppResult<()> {
    let scope = DocumentScope {
        session: RefCell::new(db.start_session()),
    };
    let outcome = f(&scope).and_then(|()| ctx.check());
    let session = scope.session.into_inner();
    match outcome {
        Ok(()) => Ok(session.commit()?),
        Err(err) => {
            session.abort();
            Err(err)
        }
    }
}

/// Handle bound to an open session.
struct DocumentScope {
    session: RefCell<Session>,
}

impl Repository for DocumentScope {
    fn atomic(&self, ctx: &Context, f: &mut AtomicFn<'_>) -> AppResult<()> {
        ctx.check()?;
        f(self)
    }

    fn user(&self) -> Box<dyn UserRepository + '_> {
        Box::new(DocUserRepository::new(DocHandle::Session(&self.session)))
    }

    fn article(&self) -> Box<dyn ArticleRepository + '_> {
        Box::new(DocArticleRepository::new(DocHandle::Session(&self.session)))
    }
}

/// Where sub-repositories send their reads and writes.
#[derive(Clone, Copy)]
pub(super) enum DocHandle<'a> {
    Db(&'a DocumentDb),
    Session(&'a RefCell<Session>),
}

impl DocHandle<'_> {
    /// Runs `f` against a session view of the store.
    fn read<T>(&self, f: impl FnOnce(&Session) -> AppResult<T>) -> AppResult<T> {
        match self {
            Self::Db(db) => f(&db.start_session()),
            Self::Session(session) => f(&session.borrow()),
        }
    }

    /// Runs `f` against a writable session. Standalone handles commit a
    /// fresh session when `f` succeeds.
    fn write<T>(&self, f: impl FnOnce(&mut Session) -> AppResult<T>) -> AppResult<T> {
        match self {
            Self::Db(db) => {
                let mut session = db.start_session();
                match f(&mut session) {
                    Ok(out) => {
                        session.commit()?;
                        Ok(out)
                    }
                    Err(err) => {
                        session.abort();
                        Err(err)
                    }
                }
            }
            Self::Session(session) => f(&mut session.borrow_mut()),
        }
    }

    fn find<T: DeserializeOwned>(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> AppResult<Vec<T>> {
        let docs = self.read(|session| Ok(session.find(collection, filter, options)?))?;
        docs.into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(AppError::from))
            .collect()
    }

    fn insert<T: Serialize>(&self, collection: &str, docs: &[T]) -> AppResult<()> {
        let values = docs
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()?;
        self.write(|session| Ok(session.insert_many(collection, values)?))
    }
}

/// Restricts `field` to `values`; `None` leaves the filter unchanged.
pub(super) fn restrict<T: ToString>(filter: Filter, field: &str, values: Option<&[T]>) -> Filter {
    match values {
        Some(values) => filter.any_of(field, values.iter().map(ToString::to_string)),
        None => filter,
    }
}

pub(super) fn by_id(id: Id) -> Filter {
    Filter::all().eq("id", id.to_string())
}

/// `$set` document from a JSON object literal.
pub(super) fn set_fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(fields) => fields,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::DocumentRepository;
    use crate::context::Context;
    use crate::error::{AppError, ErrorKind};
    use crate::model::user::{NewUser, User};
    use crate::repo::{Repository, RepositoryExt, UserFilter};

    fn user(name: &str) -> User {
        User::new(NewUser {
            email: format!("{name}@example.com"),
            username: name.to_string(),
            password_hash: "hash".to_string(),
            ..NewUser::default()
        })
        .unwrap()
    }

    #[test]
    fn scope_sees_own_writes_and_rolls_back_on_error() {
        let repo = DocumentRepository::open().unwrap();
        let ctx = Context::background();
        let err = repo
            .run_atomic(&ctx, |scope| {
                scope.user().create_user(&ctx, &user("ann"))?;
                let seen = scope
                    .user()
                    .filter_users(&ctx, &UserFilter::by_username("ann"))?;
                assert_eq!(seen.len(), 1);
                Err::<(), _>(AppError::validation("stop"))
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let stored = repo
            .user()
            .filter_users(&ctx, &UserFilter::default())
            .unwrap();
        assert!(stored.is_empty());
    }

    #[test]
    fn bootstrap_is_repeatable_on_a_shared_database() {
        let repo = DocumentRepository::open().unwrap();
        let again = DocumentRepository::new(repo.database().clone()).unwrap();
        assert_eq!(again.database().collection_names().unwrap().len(), 7);
    }
}
