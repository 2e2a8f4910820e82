//! The persistence seam for profile rows

use async_trait::async_trait;
use thiserror::Error;

use crate::profile::{NewProfile, Profile, ProfilePatch};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The lookup matched no row.
    #[error("no matching row")]
    NotFound,

    #[error("persistence service unreachable: {0}")]
    Unreachable(String),

    /// The service answered with an error (permissions, constraint, ...).
    #[error("persistence service rejected the request: {0}")]
    Rejected(String),

    #[error("unexpected row format: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

/// Profile persistence used by the resolver, demo sign-in and sign-up
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// The profile whose `user_id` equals `identity_id`.
    async fn find_by_identity(&self, identity_id: &str) -> Result<Profile, StoreError>;

    /// The pre-seeded demo profile with the given email and `is_demo = true`.
    async fn find_demo(&self, email: &str) -> Result<Profile, StoreError>;

    async fn insert(&self, profile: &NewProfile) -> Result<Profile, StoreError>;

    /// Patch the profile owned by `identity_id` and return the stored result.
    async fn update(&self, identity_id: &str, patch: &ProfilePatch) -> Result<Profile, StoreError>;
}
