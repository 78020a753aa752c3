use crate::{Result, Storage};
use certify_types::{Certificate, CertificateId, Organization, OrganizationId};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Net effect of a group of writes, ready to be committed in one step.
///
/// A clear drops every pending change for the cleared table or scope, so
/// the set never holds more than one entry per key.
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    pub(crate) organizations_cleared: bool,
    pub(crate) organizations: BTreeMap<OrganizationId, Option<Organization>>,
    pub(crate) cleared_scopes: BTreeSet<OrganizationId>,
    pub(crate) certificates: BTreeMap<(OrganizationId, CertificateId), Option<Certificate>>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        !self.organizations_cleared
            && self.organizations.is_empty()
            && self.cleared_scopes.is_empty()
            && self.certificates.is_empty()
    }

    fn scope_changes(
        &self,
        scope: OrganizationId,
    ) -> impl Iterator<Item = (&CertificateId, &Option<Certificate>)> {
        self.certificates
            .range((scope, CertificateId::MIN)..=(scope, CertificateId::MAX))
            .map(|((_, id), certificate)| (id, certificate))
    }
}

/// Buffers writes over a base store without touching it.
///
/// Reads see the base with the pending changes laid on top. Dropping the
/// stage discards everything; [`StagedStorage::take_changes`] hands the
/// changes over for [`Storage::commit`].
pub struct StagedStorage<S: ?Sized> {
    base: Arc<S>,
    changes: RwLock<ChangeSet>,
}

impl<S: Storage + ?Sized> StagedStorage<S> {
    pub fn new(base: Arc<S>) -> Self {
        Self {
            base,
            changes: RwLock::new(ChangeSet::default()),
        }
    }

    /// Drain the pending changes, leaving the stage empty.
    pub fn take_changes(&self) -> ChangeSet {
        std::mem::take(&mut *self.changes.write())
    }
}

impl<S: Storage + ?Sized> Storage for StagedStorage<S> {
    fn get_organization(&self, id: OrganizationId) -> Result<Option<Organization>> {
        let changes = self.changes.read();
        match changes.organizations.get(&id) {
            Some(pending) => Ok(pending.clone()),
            None if changes.organizations_cleared => Ok(None),
            None => self.base.get_organization(id),
        }
    }

    fn put_organization(&self, organization: &Organization) -> Result<()> {
        self.changes
            .write()
            .organizations
            .insert(organization.id, Some(organization.clone()));
        Ok(())
    }

    fn list_organizations(&self) -> Result<Vec<Organization>> {
        let changes = self.changes.read();
        let mut visible = BTreeMap::new();
        if !changes.organizations_cleared {
            visible.extend(
                self.base
                    .list_organizations()?
                    .into_iter()
                    .map(|org| (org.id, org)),
            );
        }
        for (id, pending) in &changes.organizations {
            match pending {
                Some(org) => visible.insert(*id, org.clone()),
                None => visible.remove(id),
            };
        }
        Ok(visible.into_values().collect())
    }

    fn clear_organizations(&self) -> Result<usize> {
        let removed = self.list_organizations()?.len();
        let mut changes = self.changes.write();
        changes.organizations_cleared = true;
        changes.organizations.clear();
        Ok(removed)
    }

    fn get_certificate(
        &self,
        scope: OrganizationId,
        id: CertificateId,
    ) -> Result<Option<Certificate>> {
        let changes = self.changes.read();
        match changes.certificates.get(&(scope, id)) {
            Some(pending) => Ok(pending.clone()),
            None if changes.cleared_scopes.contains(&scope) => Ok(None),
            None => self.base.get_certificate(scope, id),
        }
    }

    fn put_certificate(&self, scope: OrganizationId, certificate: &Certificate) -> Result<()> {
        self.changes
            .write()
            .certificates
            .insert((scope, certificate.id), Some(certificate.clone()));
        Ok(())
    }

    fn remove_certificate(&self, scope: OrganizationId, id: CertificateId) -> Result<bool> {
        let existed = self.get_certificate(scope, id)?.is_some();
        if existed {
            self.changes.write().certificates.insert((scope, id), None);
        }
        Ok(existed)
    }

    fn list_certificates(&self, scope: OrganizationId) -> Result<Vec<Certificate>> {
        let changes = self.changes.read();
        let mut visible = BTreeMap::new();
        if !changes.cleared_scopes.contains(&scope) {
            visible.extend(
                self.base
                    .list_certificates(scope)?
                    .into_iter()
                    .map(|cert| (cert.id, cert)),
            );
        }
        for (id, pending) in changes.scope_changes(scope) {
            match pending {
                Some(cert) => visible.insert(*id, cert.clone()),
                None => visible.remove(id),
            };
        }
        Ok(visible.into_values().collect())
    }

    fn clear_certificates(&self, scope: OrganizationId) -> Result<usize> {
        let removed = self.list_certificates(scope)?.len();
        let mut changes = self.changes.write();
        changes.cleared_scopes.insert(scope);
        changes.certificates.retain(|(s, _), _| *s != scope);
        Ok(removed)
    }

    fn commit(&self, changes: ChangeSet) -> Result<()> {
        let mut pending = self.changes.write();
        if changes.organizations_cleared {
            pending.organizations_cleared = true;
            pending.organizations.clear();
        }
        pending.organizations.extend(changes.organizations);
        for scope in changes.cleared_scopes {
            pending.cleared_scopes.insert(scope);
            pending.certificates.retain(|(s, _), _| *s != scope);
        }
        pending.certificates.extend(changes.certificates);
        Ok(())
    }
}
