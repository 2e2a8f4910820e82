//! Application-level profile records

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role gating which routes and actions a profile may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Prison administrator
    #[serde(rename = "admin_lapas")]
    Administrator,
    /// Partner organization
    #[serde(rename = "mitra")]
    Partner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "admin_lapas",
            Role::Partner => "mitra",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin_lapas" => Ok(Role::Administrator),
            "mitra" => Ok(Role::Partner),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// A row of the `profiles` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    /// Identity this profile belongs to. Unique across the table.
    pub user_id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default)]
    pub is_demo: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Apply a patch in memory, bumping `updated_at`.
    pub fn apply(&mut self, patch: &ProfilePatch) {
        if let Some(email) = &patch.email {
            self.email = email.clone();
        }
        if let Some(full_name) = &patch.full_name {
            self.full_name = full_name.clone();
        }
        if let Some(phone) = &patch.phone {
            self.phone = Some(phone.clone());
        }
        if let Some(organization) = &patch.organization {
            self.organization = Some(organization.clone());
        }
        self.updated_at = Utc::now();
    }
}

/// Fields supplied by the user at sign-up
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileFields {
    pub full_name: String,
    pub role: Role,
    pub phone: Option<String>,
    pub organization: Option<String>,
}

/// Insert payload for a new profile row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewProfile {
    pub user_id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    pub is_demo: bool,
}

impl NewProfile {
    pub fn from_fields(user_id: &str, email: &str, fields: ProfileFields) -> Self {
        Self {
            user_id: user_id.to_string(),
            email: email.to_string(),
            full_name: fields.full_name,
            role: fields.role,
            phone: fields.phone,
            organization: fields.organization,
            is_demo: false,
        }
    }
}

/// Partial update of a profile. `None` fields are left untouched.
///
/// Role and demo flag cannot be patched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.full_name.is_none()
            && self.phone.is_none()
            && self.organization.is_none()
    }
}

/// Where the profile currently held by the session came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSource {
    /// Read from the profiles table.
    Stored,
    /// Synthesized because the table had no row for the identity.
    Fallback,
    /// Pre-seeded demo row read from the profiles table.
    SeededDemo,
    /// Demo profile fabricated in memory.
    SyntheticDemo,
}

impl ProfileSource {
    /// True if the profile corresponds to a row in the table.
    pub fn is_persisted(&self) -> bool {
        matches!(self, ProfileSource::Stored | ProfileSource::SeededDemo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_uses_wire_names() {
        assert_eq!(serde_json::to_value(Role::Administrator).unwrap(), json!("admin_lapas"));
        assert_eq!("mitra".parse::<Role>().unwrap(), Role::Partner);
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn profile_row_without_demo_flag_defaults_to_false() {
        let profile: Profile = serde_json::from_value(json!({
            "id": "p1",
            "user_id": "u1",
            "email": "mitra@company.id",
            "full_name": "PT Karya",
            "role": "mitra",
            "organization": "PT Karya",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-02T00:00:00+00:00"
        }))
        .unwrap();

        assert_eq!(profile.role, Role::Partner);
        assert!(!profile.is_demo);
        assert_eq!(profile.phone, None);
    }

    #[test]
    fn patch_serializes_only_present_fields() {
        let patch = ProfilePatch {
            phone: Some("0812".into()),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({ "phone": "0812" }));
        assert!(!patch.is_empty());
        assert!(ProfilePatch::default().is_empty());
    }
}
