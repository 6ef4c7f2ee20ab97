//! User and follow domain model.
//!
//! # Responsibility
//! - Define the persisted user record and the follower relation.
//! - Validate user-supplied profile fields before they reach storage.
//!
//! # Invariants
//! - `email` and `username` are unique across users (enforced by storage).
//! - `password_hash` is an opaque credential produced outside core; it is
//!   never interpreted, compared or logged here.
//! - A user never follows themself.

use crate::error::{AppError, AppResult, Violations};
use crate::model::id::Id;
use crate::model::now;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// Avatar assigned when a user registers without an image.
pub const USER_DEFAULT_IMAGE: &str = "https://api.realworld.io/images/demo-avatar.png";

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_]+$").expect("valid username regex"));
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@<>()\[\],;:]+@[^\s@<>()\[\],;:]+\.[^\s@<>()\[\],;:]+$")
        .expect("valid email regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub bio: String,
    pub image: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registration input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    /// Credential hash computed by the auth subsystem.
    pub password_hash: String,
    pub bio: Option<String>,
    pub image: Option<String>,
}

/// Partial profile update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserChanges {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password_hash: Option<String>,
    pub bio: Option<String>,
    pub image: Option<String>,
}

impl User {
    /// Validates registration input and builds a new user record.
    pub fn new(input: NewUser) -> AppResult<Self> {
        let mut violations = Violations::new();
        violations.check("email", validate_email(&input.email));
        violations.check("username", validate_username(&input.username));
        let image = match input.image.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => USER_DEFAULT_IMAGE.to_string(),
        };
        violations.check("image", validate_url(&image));
        violations.check("password", validate_credential(&input.password_hash));
        violations.into_result()?;

        let created_at = now();
        Ok(Self {
            id: Id::new(),
            email: input.email,
            username: input.username,
            password_hash: input.password_hash,
            bio: input.bio.unwrap_or_default(),
            image,
            created_at,
            updated_at: created_at,
        })
    }

    /// Applies a partial update in place.
    ///
    /// Returns whether any field actually changed. Values equal to the current
    /// ones are skipped so unique indexes are not re-asserted needlessly.
    pub fn apply(&mut self, changes: UserChanges) -> AppResult<bool> {
        let mut violations = Violations::new();
        let email = changes
            .email
            .filter(|value| *value != self.email)
            .and_then(|value| violations.check("email", validate_email(&value)).map(|_| value));
        let username = changes
            .username
            .filter(|value| *value != self.username)
            .and_then(|value| {
                violations
                    .check("username", validate_username(&value))
                    .map(|_| value)
            });
        let image = changes
            .image
            .filter(|value| *value != self.image)
            .and_then(|value| violations.check("image", validate_url(&value)).map(|_| value));
        let password_hash = changes
            .password_hash
            .filter(|value| *value != self.password_hash)
            .and_then(|value| {
                violations
                    .check("password", validate_credential(&value))
                    .map(|_| value)
            });
        let bio = changes.bio.filter(|value| *value != self.bio);
        violations.into_result()?;

        let mut changed = false;
        if let Some(value) = email {
            self.email = value;
            changed = true;
        }
        if let Some(value) = username {
            self.username = value;
            changed = true;
        }
        if let Some(value) = image {
            self.image = value;
            changed = true;
        }
        if let Some(value) = password_hash {
            self.password_hash = value;
            changed = true;
        }
        if let Some(value) = bio {
            self.bio = value;
            changed = true;
        }
        if changed {
            self.updated_at = now();
        }
        Ok(changed)
    }
}

/// Directed follow relation: `follower_id` follows `followee_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserFollow {
    pub follower_id: Id,
    pub followee_id: Id,
}

impl UserFollow {
    /// Builds a follow relation, rejecting self-follow.
    pub fn new(follower_id: Id, followee_id: Id) -> AppResult<Self> {
        if follower_id == followee_id {
            return Err(AppError::invalid_field("follow", "cannot follow yourself"));
        }
        Ok(Self {
            follower_id,
            followee_id,
        })
    }
}

fn validate_length(value: &str, min: usize, max: usize) -> Result<(), String> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(format!("must contain from {min}-{max} characters"));
    }
    Ok(())
}

pub fn validate_username(value: &str) -> Result<(), String> {
    validate_length(value, 3, 100)?;
    if !USERNAME_RE.is_match(value) {
        return Err("must contain only lowercase letters, digits or underscores".to_string());
    }
    Ok(())
}

pub fn validate_email(value: &str) -> Result<(), String> {
    validate_length(value, 3, 100)?;
    if !EMAIL_RE.is_match(value) {
        return Err("is not a valid email address".to_string());
    }
    Ok(())
}

pub fn validate_url(value: &str) -> Result<(), String> {
    match Url::parse(value) {
        Ok(url) if url.has_host() => Ok(()),
        Ok(_) => Err("must be an absolute url with a host".to_string()),
        Err(err) => Err(format!("is not a valid url: {err}")),
    }
}

fn validate_credential(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err("credential hash is required".to_string());
    }
    Ok(())
}
