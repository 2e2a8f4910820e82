//! Demo sign-in identities
//!
//! Demo identities never pass through the identity provider. They are
//! tagged [`IdentitySource::Demo`] so sign-out knows not to contact it.

use chrono::Utc;
use uuid::Uuid;

use crate::config::DemoOptions;
use crate::identity::{Identity, IdentitySource};
use crate::profile::{Profile, Role};

fn display_name(role: Role) -> &'static str {
    match role {
        Role::Administrator => "Admin Lapas Demo",
        Role::Partner => "Mitra Demo",
    }
}

/// Fabricate an identity and profile for `role` with fresh identifiers.
pub(crate) fn synthesize(role: Role, options: &DemoOptions) -> (Identity, Profile) {
    let now = Utc::now();
    let identity_id = format!("demo-{}-{}", role, Uuid::new_v4());

    let profile = Profile {
        id: format!("profile-{identity_id}"),
        user_id: identity_id,
        email: options.email_for(role).to_string(),
        full_name: display_name(role).to_string(),
        role,
        phone: None,
        organization: None,
        is_demo: true,
        created_at: now,
        updated_at: now,
    };

    (identity_for(&profile), profile)
}

/// The local identity standing behind a demo profile.
pub(crate) fn identity_for(profile: &Profile) -> Identity {
    let now = Utc::now();
    Identity {
        id: profile.user_id.clone(),
        email: Some(profile.email.clone()),
        created_at: Some(now),
        last_sign_in_at: Some(now),
        provider: None,
        app_metadata: serde_json::Value::Null,
        source: IdentitySource::Demo,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_partner_is_demo() {
        let (identity, profile) = synthesize(Role::Partner, &DemoOptions::default());

        assert!(identity.is_demo());
        assert!(identity.id.starts_with("demo-mitra-"));
        assert_eq!(profile.user_id, identity.id);
        assert_eq!(profile.role, Role::Partner);
        assert_eq!(profile.email, "mitra@company.demo");
        assert_eq!(profile.full_name, "Mitra Demo");
        assert!(profile.is_demo);
    }

    #[test]
    fn synthesized_identities_are_unique() {
        let options = DemoOptions::default();
        let (a, _) = synthesize(Role::Administrator, &options);
        let (b, _) = synthesize(Role::Administrator, &options);
        assert_ne!(a.id, b.id);
    }
}
