//! Document-store user and follow repository.

use super::model::UserDoc;
use super::{by_id, restrict, set_fields, DocHandle, USERS, USER_FOLLOWS};
use crate::context::Context;
use crate::docstore::{Filter, FindOptions, SortOrder};
use crate::error::{AppError, AppResult};
use crate::model::user::{User, UserFollow};
use crate::repo::{FollowFilter, UserFilter, UserRepository};
use serde_json::json;

pub(super) struct DocUserRepository<'a> {
    handle: DocHandle<'a>,
}

impl<'a> DocUserRepository<'a> {
    pub(super) fn new(handle: DocHandle<'a>) -> Self {
        Self { handle }
    }
}

fn follow_filter(follow: &UserFollow) -> Filter {
    Filter::all()
        .eq("follower_id", follow.follower_id.to_string())
        .eq("followee_id", follow.followee_id.to_string())
}

impl UserRepository for DocUserRepository<'_> {
    fn create_user(&self, ctx: &Context, user: &User) -> AppResult<()> {
        ctx.check()?;
        self.handle.insert(USERS, &[UserDoc::from(user)])
    }

    fn update_user(&self, ctx: &Context, user: &User) -> AppResult<()> {
        ctx.check()?;
        let set = set_fields(json!({
            "email": user.email,
            "username": user.username,
            "password_hash": user.password_hash,
            "bio": user.bio,
            "image": user.image,
            "updated_at": user.updated_at.timestamp_micros(),
        }));
        let updated = self
            .handle
            .write(|session| Ok(session.update_one(USERS, &by_id(user.id), set)?))?;
        if !updated {
            return Err(AppError::not_found("user not found"));
        }
        Ok(())
    }

    fn filter_users(&self, ctx: &Context, filter: &UserFilter) -> AppResult<Vec<User>> {
        ctx.check()?;
        let query = restrict(Filter::all(), "id", filter.ids.as_deref());
        let query = restrict(query, "email", filter.emails.as_deref());
        let query = restrict(query, "username", filter.usernames.as_deref());
        let options = FindOptions::new()
            .sort("created_at", SortOrder::Asc)
            .sort("id", SortOrder::Asc);
        self.handle
            .find::<UserDoc>(USERS, &query, &options)?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    fn follow(&self, ctx: &Context, follow: &UserFollow) -> AppResult<()> {
        ctx.check()?;
        UserFollow::new(follow.follower_id, follow.followee_id)?;
        self.handle.insert(USER_FOLLOWS, &[*follow])
    }

    fn unfollow(&self, ctx: &Context, follow: &UserFollow) -> AppResult<()> {
        ctx.check()?;
        let filter = follow_filter(follow);
        self.handle
            .write(|session| Ok(session.delete_many(USER_FOLLOWS, &filter)?))?;
        Ok(())
    }

    fn filter_follows(&self, ctx: &Context, filter: &FollowFilter) -> AppResult<Vec<UserFollow>> {
        ctx.check()?;
        let query = restrict(Filter::all(), "follower_id", filter.follower_ids.as_deref());
        let query = restrict(query, "followee_id", filter.followee_ids.as_deref());
        let options = FindOptions::new()
            .sort("follower_id", SortOrder::Asc)
            .sort("followee_id", SortOrder::Asc);
        self.handle.find(USER_FOLLOWS, &query, &options)
    }
}
