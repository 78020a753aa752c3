use serde::{Deserialize, Serialize};

/// Caller-chosen organization identifier, unique across the registry.
pub type OrganizationId = u64;

/// An issuing organization.
///
/// Records are written once on registration and never modified; they are
/// only removed by clearing the whole registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
}

impl Organization {
    pub fn new(id: OrganizationId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}
