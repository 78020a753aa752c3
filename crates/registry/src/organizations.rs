//! Organization registry
//!
//! A single global table of issuing organizations keyed by caller-chosen id.

use crate::errors::*;
use certify_storage::Storage;
use certify_types::{Organization, OrganizationId};
use std::sync::Arc;
use tracing::info;

pub struct OrganizationRegistry<S: ?Sized> {
    storage: Arc<S>,
}

impl<S: ?Sized> Clone for OrganizationRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<S: Storage + ?Sized> OrganizationRegistry<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Register a new organization. Ids are never reused while present.
    pub fn register(&self, id: OrganizationId, name: impl Into<String>) -> Result<()> {
        if self.storage.get_organization(id)?.is_some() {
            return Err(RegistryError::AlreadyExists {
                key: RecordKey::Organization(id),
            });
        }

        let organization = Organization::new(id, name);
        self.storage.put_organization(&organization)?;
        info!(organization_id = id, name = %organization.name, "Registered organization");
        Ok(())
    }

    /// Remove every organization. Certificates are not touched.
    pub fn clear(&self) -> Result<usize> {
        let removed = self.storage.clear_organizations()?;
        info!(removed, "Cleared organizations");
        Ok(removed)
    }

    pub fn exists(&self, id: OrganizationId) -> Result<bool> {
        Ok(self.storage.get_organization(id)?.is_some())
    }

    pub fn get(&self, id: OrganizationId) -> Result<Organization> {
        self.storage
            .get_organization(id)?
            .ok_or(RegistryError::OrganizationNotFound {
                organization_id: id,
            })
    }

    pub fn list(&self) -> Result<Vec<Organization>> {
        Ok(self.storage.list_organizations()?)
    }
}
