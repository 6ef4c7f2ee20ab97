//! SQLite user and follow repository.

use super::query::{timestamp, to_micros, Conditions};
use crate::context::Context;
use crate::error::{AppError, AppResult};
use crate::model::user::{User, UserFollow};
use crate::repo::{FollowFilter, UserFilter, UserRepository};
use rusqlite::{params, params_from_iter, Connection, Row};

const USER_COLUMNS: &str =
    "id, email, username, password_hash, bio, image, created_at, updated_at";

pub(super) struct SqlUserRepository<'c> {
    conn: &'c Connection,
}

impl<'c> SqlUserRepository<'c> {
    pub(super) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl UserRepository for SqlUserRepository<'_> {
    fn create_user(&self, ctx: &Context, user: &User) -> AppResult<()> {
        ctx.check()?;
        self.conn.execute(
            "INSERT INTO users (id, email, username, password_hash, bio, image, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                user.id,
                user.email,
                user.username,
                user.password_hash,
                user.bio,
                user.image,
                to_micros(&user.created_at),
                to_micros(&user.updated_at),
            ],
        )?;
        Ok(())
    }

    fn update_user(&self, ctx: &Context, user: &User) -> AppResult<()> {
        ctx.check()?;
        let changed = self.conn.execute(
            "UPDATE users
             SET email = ?2,
                 username = ?3,
                 password_hash = ?4,
                 bio = ?5,
                 image = ?6,
                 updated_at = ?7
             WHERE id = ?1;",
            params![
                user.id,
                user.email,
                user.username,
                user.password_hash,
                user.bio,
                user.image,
                to_micros(&user.updated_at),
            ],
        )?;
        if changed == 0 {
            return Err(AppError::not_found("user not found"));
        }
        Ok(())
    }

    fn filter_users(&self, ctx: &Context, filter: &UserFilter) -> AppResult<Vec<User>> {
        ctx.check()?;
        let mut conditions = Conditions::new();
        conditions
            .any_of("id", filter.ids.as_deref())
            .any_of("email", filter.emails.as_deref())
            .any_of("username", filter.usernames.as_deref());
        if conditions.is_unsatisfiable() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users{} ORDER BY created_at ASC, id ASC;",
            conditions.where_sql()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let users = stmt
            .query_map(params_from_iter(conditions.into_params()), user_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    fn follow(&self, ctx: &Context, follow: &UserFollow) -> AppResult<()> {
        ctx.check()?;
        UserFollow::new(follow.follower_id, follow.followee_id)?;
        self.conn.execute(
            "INSERT INTO user_follows (follower_id, followee_id) VALUES (?1, ?2);",
            params![follow.follower_id, follow.followee_id],
        )?;
        Ok(())
    }

    fn unfollow(&self, ctx: &Context, follow: &UserFollow) -> AppResult<()> {
        ctx.check()?;
        self.conn.execute(
            "DELETE FROM user_follows WHERE follower_id = ?1 AND followee_id = ?2;",
            params![follow.follower_id, follow.followee_id],
        )?;
        Ok(())
    }

    fn filter_follows(&self, ctx: &Context, filter: &FollowFilter) -> AppResult<Vec<UserFollow>> {
        ctx.check()?;
        let mut conditions = Conditions::new();
        conditions
            .any_of("follower_id", filter.follower_ids.as_deref())
            .any_of("followee_id", filter.followee_ids.as_deref());
        if conditions.is_unsatisfiable() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT follower_id, followee_id FROM user_follows{} ORDER BY follower_id, followee_id;",
            conditions.where_sql()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let follows = stmt
            .query_map(params_from_iter(conditions.into_params()), |row| {
                Ok(UserFollow {
                    follower_id: row.get("follower_id")?,
                    followee_id: row.get("followee_id")?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(follows)
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        email: row.get("email")?,
        username: row.get("username")?,
        password_hash: row.get("password_hash")?,
        bio: row.get("bio")?,
        image: row.get("image")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}
