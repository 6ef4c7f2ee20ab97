//! User use cases: registration, profile updates and follows.
//!
//! # Invariants
//! - Credentials are opaque hashes; this service never hashes or compares
//!   them.
//! - Follow and unfollow are idempotent; self-follow is rejected before
//!   any storage access.

use crate::context::Context;
use crate::error::AppResult;
use crate::logging::OpTimer;
use crate::model::id::Id;
use crate::model::user::{NewUser, User, UserChanges, UserFollow};
use crate::model::view::Profile;
use crate::repo::{FollowFilter, Repository, RepositoryExt, UserFilter};
use crate::service::{is_duplicate_pair, load_viewer};

const MODULE: &str = "service.user";
const FOLLOW_PAIR: &str = "user_follows";

pub struct UserService<'a> {
    repo: &'a dyn Repository,
}

impl<'a> UserService<'a> {
    pub fn new(repo: &'a dyn Repository) -> Self {
        Self { repo }
    }

    /// Validates and stores a new user. Taken email or username is a
    /// validation failure.
    pub fn register(&self, ctx: &Context, input: NewUser) -> AppResult<User> {
        OpTimer::run("user_register", MODULE, || {
            let user = User::new(input)?;
            self.repo.user().create_user(ctx, &user)?;
            Ok(user)
        })
    }

    /// Credential lookup for the auth subsystem.
    pub fn find_by_email(&self, ctx: &Context, email: &str) -> AppResult<User> {
        self.repo.user().find_user(ctx, &UserFilter::by_email(email))
    }

    pub fn current(&self, ctx: &Context, viewer: Option<Id>) -> AppResult<User> {
        load_viewer(self.repo, ctx, viewer)
    }

    /// Applies a partial update; only changed fields are written.
    pub fn update(
        &self,
        ctx: &Context,
        viewer: Option<Id>,
        changes: UserChanges,
    ) -> AppResult<User> {
        OpTimer::run("user_update", MODULE, || {
            let mut user = load_viewer(self.repo, ctx, viewer)?;
            if user.apply(changes)? {
                self.repo.user().update_user(ctx, &user)?;
            }
            Ok(user)
        })
    }

    pub fn profile(&self, ctx: &Context, viewer: Option<Id>, username: &str) -> AppResult<Profile> {
        let user = self
            .repo
            .user()
            .find_user(ctx, &UserFilter::by_username(username))?;
        let is_followed = match viewer {
            Some(viewer) => self.is_following(ctx, viewer, user.id)?,
            None => false,
        };
        Ok(Profile::of(&user, is_followed))
    }

    pub fn follow(&self, ctx: &Context, viewer: Option<Id>, username: &str) -> AppResult<Profile> {
        OpTimer::run("user_follow", MODULE, || {
            let follower = load_viewer(self.repo, ctx, viewer)?;
            let followee = self
                .repo
                .user()
                .find_user(ctx, &UserFilter::by_username(username))?;
            let follow = UserFollow::new(follower.id, followee.id)?;
            let added = self.repo.run_atomic(ctx, |scope| {
                let existing = scope.user().filter_follows(ctx, &follow_filter(&follow))?;
                if existing.is_empty() {
                    scope.user().follow(ctx, &follow)?;
                }
                Ok(())
            });
            if let Err(err) = added {
                // Losing the insert race to the same follow is still a follow.
                let raced = is_duplicate_pair(&err, FOLLOW_PAIR)
                    && self.is_following(ctx, follow.follower_id, follow.followee_id)?;
                if !raced {
                    return Err(err);
                }
            }
            Ok(Profile::of(&followee, true))
        })
    }

    pub fn unfollow(
        &self,
        ctx: &Context,
        viewer: Option<Id>,
        username: &str,
    ) -> AppResult<Profile> {
        OpTimer::run("user_unfollow", MODULE, || {
            let follower = load_viewer(self.repo, ctx, viewer)?;
            let followee = self
                .repo
                .user()
                .find_user(ctx, &UserFilter::by_username(username))?;
            let follow = UserFollow::new(follower.id, followee.id)?;
            self.repo.user().unfollow(ctx, &follow)?;
            Ok(Profile::of(&followee, false))
        })
    }

    fn is_following(&self, ctx: &Context, follower_id: Id, followee_id: Id) -> AppResult<bool> {
        let follows = self.repo.user().filter_follows(
            ctx,
            &FollowFilter {
                follower_ids: Some(vec![follower_id]),
                followee_ids: Some(vec![followee_id]),
            },
        )?;
        Ok(!follows.is_empty())
    }
}

fn follow_filter(follow: &UserFollow) -> FollowFilter {
    FollowFilter {
        follower_ids: Some(vec![follow.follower_id]),
        followee_ids: Some(vec![follow.followee_id]),
    }
}
