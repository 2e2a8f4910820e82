//! Identity to profile resolution

use std::sync::Arc;

use tracing::{debug, error};

use crate::identity::Identity;
use crate::profile::{Profile, Role};
use crate::store::{ProfileStore, StoreError};

const FALLBACK_NAME: &str = "Demo User";

/// Outcome of [`ProfileResolver::resolve`]
#[derive(Debug)]
pub enum Resolution {
    /// The identity has a row in the profiles table.
    Found(Profile),
    /// No row exists; this in-memory profile stands in and is never written back.
    Fallback(Profile),
    /// The lookup itself failed.
    Failed(StoreError),
}

pub struct ProfileResolver {
    store: Arc<dyn ProfileStore>,
    fallback_email: String,
}

impl ProfileResolver {
    pub fn new(store: Arc<dyn ProfileStore>, fallback_email: impl Into<String>) -> Self {
        Self {
            store,
            fallback_email: fallback_email.into(),
        }
    }

    pub async fn resolve(&self, identity: &Identity) -> Resolution {
        match self.store.find_by_identity(&identity.id).await {
            Ok(profile) => {
                debug!(identity = %identity.id, role = %profile.role, "profile found");
                Resolution::Found(profile)
            }
            Err(StoreError::NotFound) => {
                debug!(identity = %identity.id, "no profile row, using fallback profile");
                Resolution::Fallback(self.fallback_for(identity))
            }
            Err(e) => {
                error!(identity = %identity.id, error = %e, "profile lookup failed");
                Resolution::Failed(e)
            }
        }
    }

    /// The stand-in profile for an identity without a row.
    ///
    /// Every field derives from the identity, so repeated calls produce the
    /// same profile.
    pub fn fallback_for(&self, identity: &Identity) -> Profile {
        let stamp = identity.created_at.unwrap_or_default();
        Profile {
            id: format!("fallback-{}", identity.id),
            user_id: identity.id.clone(),
            email: identity
                .email
                .clone()
                .unwrap_or_else(|| self.fallback_email.clone()),
            full_name: FALLBACK_NAME.to_string(),
            role: Role::Administrator,
            phone: None,
            organization: None,
            is_demo: true,
            created_at: stamp,
            updated_at: stamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoStore;

    #[async_trait::async_trait]
    impl ProfileStore for NoStore {
        async fn find_by_identity(&self, _: &str) -> Result<Profile, StoreError> {
            Err(StoreError::NotFound)
        }
        async fn find_demo(&self, _: &str) -> Result<Profile, StoreError> {
            Err(StoreError::NotFound)
        }
        async fn insert(&self, _: &crate::profile::NewProfile) -> Result<Profile, StoreError> {
            Err(StoreError::Rejected("read only".into()))
        }
        async fn update(
            &self,
            _: &str,
            _: &crate::profile::ProfilePatch,
        ) -> Result<Profile, StoreError> {
            Err(StoreError::Rejected("read only".into()))
        }
    }

    struct OneRow(Profile);

    #[async_trait::async_trait]
    impl ProfileStore for OneRow {
        async fn find_by_identity(&self, id: &str) -> Result<Profile, StoreError> {
            if id == self.0.user_id {
                Ok(self.0.clone())
            } else {
                Err(StoreError::NotFound)
            }
        }
        async fn find_demo(&self, _: &str) -> Result<Profile, StoreError> {
            Err(StoreError::NotFound)
        }
        async fn insert(&self, _: &crate::profile::NewProfile) -> Result<Profile, StoreError> {
            Err(StoreError::Rejected("read only".into()))
        }
        async fn update(
            &self,
            _: &str,
            _: &crate::profile::ProfilePatch,
        ) -> Result<Profile, StoreError> {
            Err(StoreError::Rejected("read only".into()))
        }
    }

    #[test]
    fn resolving_twice_gives_same_profile() {
        tokio_test::block_on(async {
            let row = Profile {
                id: "p7".into(),
                user_id: "u7".into(),
                email: "u7@lapas.id".into(),
                full_name: "Petugas Registrasi".into(),
                role: Role::Partner,
                phone: Some("0812".into()),
                organization: None,
                is_demo: false,
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            };
            let resolver = ProfileResolver::new(Arc::new(OneRow(row.clone())), "demo@test.com");
            let identity = Identity::new("u7", None);

            let (first, second) = match (
                resolver.resolve(&identity).await,
                resolver.resolve(&identity).await,
            ) {
                (Resolution::Found(a), Resolution::Found(b)) => (a, b),
                other => panic!("unexpected resolutions: {other:?}"),
            };
            assert_eq!(first, second);
            assert_eq!(first, row);

            let missing = Identity::new("u8", None);
            match (
                resolver.resolve(&missing).await,
                resolver.resolve(&missing).await,
            ) {
                (Resolution::Fallback(a), Resolution::Fallback(b)) => assert_eq!(a, b),
                other => panic!("unexpected resolutions: {other:?}"),
            }
        });
    }

    #[test]
    fn fallback_is_deterministic_admin_demo() {
        let resolver = ProfileResolver::new(Arc::new(NoStore), "demo@test.com");
        let identity = Identity::new("u1", None);

        let first = resolver.fallback_for(&identity);
        let second = resolver.fallback_for(&identity);

        assert_eq!(first, second);
        assert_eq!(first.role, Role::Administrator);
        assert!(first.is_demo);
        assert_eq!(first.full_name, "Demo User");
        assert_eq!(first.email, "demo@test.com");
        assert_eq!(first.user_id, "u1");
    }

    #[test]
    fn resolve_falls_back_on_not_found() {
        tokio_test::block_on(async {
            let resolver = ProfileResolver::new(Arc::new(NoStore), "demo@test.com");
            let identity = Identity::new("u2", Some("u2@lapas.id".into()));

            match resolver.resolve(&identity).await {
                Resolution::Fallback(profile) => assert_eq!(profile.email, "u2@lapas.id"),
                other => panic!("unexpected resolution: {other:?}"),
            }
        });
    }
}
