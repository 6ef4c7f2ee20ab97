//! Domain model for users, articles and their associations.
//!
//! # Responsibility
//! - Define canonical records persisted by every storage backend.
//! - Own domain-level validation and derived fields (slug, normalized tags).
//! - Define the viewer-relative view types produced by aggregation.
//!
//! # Invariants
//! - Every entity is identified by a time-sortable `Id`.
//! - Timestamps are UTC truncated to microseconds so they survive a storage
//!   round trip unchanged.

pub mod article;
pub mod id;
pub mod user;
pub mod view;

use chrono::{DateTime, SubsecRound, Utc};

/// Current UTC time at storage precision.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
