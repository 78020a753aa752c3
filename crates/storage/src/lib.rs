use certify_types::{Certificate, CertificateId, Organization, OrganizationId};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Batch, Db, IVec, Tree};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::path::Path;

mod staged;

pub use staged::{ChangeSet, StagedStorage};

/// Storage errors
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Corrupt record key of {len} bytes")]
    CorruptKey { len: usize },
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Keyed tables backing the registry.
///
/// Organizations live in one global table. Certificates are partitioned by
/// scope (the owning organization id); every certificate method names its
/// scope and never observes records from another one.
pub trait Storage: Send + Sync {
    fn get_organization(&self, id: OrganizationId) -> Result<Option<Organization>>;
    fn put_organization(&self, organization: &Organization) -> Result<()>;
    /// All organizations in ascending id order.
    fn list_organizations(&self) -> Result<Vec<Organization>>;
    /// Remove every organization, returning how many were removed.
    fn clear_organizations(&self) -> Result<usize>;

    fn get_certificate(
        &self,
        scope: OrganizationId,
        id: CertificateId,
    ) -> Result<Option<Certificate>>;
    /// Insert a certificate or replace the one with the same id in place.
    fn put_certificate(&self, scope: OrganizationId, certificate: &Certificate) -> Result<()>;
    /// Returns `false` if there was nothing to remove.
    fn remove_certificate(&self, scope: OrganizationId, id: CertificateId) -> Result<bool>;
    /// Certificates of one scope in ascending id order.
    fn list_certificates(&self, scope: OrganizationId) -> Result<Vec<Certificate>>;
    /// Remove every certificate of one scope, returning how many were removed.
    fn clear_certificates(&self, scope: OrganizationId) -> Result<usize>;

    /// Apply a staged change set as one unit: readers see all of it or none.
    fn commit(&self, changes: ChangeSet) -> Result<()>;

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

fn certificate_key(scope: OrganizationId, id: CertificateId) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&scope.to_be_bytes());
    key[8..].copy_from_slice(&id.to_be_bytes());
    key
}

fn decode<T: DeserializeOwned>(value: &IVec) -> Result<T> {
    Ok(serde_json::from_slice(value)?)
}

fn encode_changes<K, T: Serialize>(
    changes: &BTreeMap<K, Option<T>>,
    key: impl Fn(&K) -> Vec<u8>,
) -> Result<Vec<(Vec<u8>, Option<Vec<u8>>)>> {
    changes
        .iter()
        .map(|(k, record)| -> Result<_> {
            let value = match record {
                Some(record) => Some(serde_json::to_vec(record)?),
                None => None,
            };
            Ok((key(k), value))
        })
        .collect()
}

fn check_key(key: &IVec, expected: usize) -> Result<()> {
    if key.len() != expected {
        return Err(StorageError::CorruptKey { len: key.len() });
    }
    Ok(())
}

/// Sled-backed implementation
pub struct SledStorage {
    db: Db,
    organizations: Tree,
    certificates: Tree,
}

impl SledStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        let organizations = db.open_tree("organizations")?;
        let certificates = db.open_tree("certificates")?;
        Ok(Self {
            db,
            organizations,
            certificates,
        })
    }

    /// Remove every key yielded by `keys` from `tree` in one atomic batch.
    fn clear_keys(tree: &Tree, keys: impl Iterator<Item = sled::Result<IVec>>) -> Result<usize> {
        let mut batch = Batch::default();
        let mut removed = 0;
        for key in keys {
            batch.remove(key?);
            removed += 1;
        }
        tree.apply_batch(batch)?;
        Ok(removed)
    }
}

impl Storage for SledStorage {
    fn get_organization(&self, id: OrganizationId) -> Result<Option<Organization>> {
        self.organizations
            .get(id.to_be_bytes())?
            .map(|v| decode(&v))
            .transpose()
    }

    fn put_organization(&self, organization: &Organization) -> Result<()> {
        self.organizations.insert(
            organization.id.to_be_bytes(),
            serde_json::to_vec(organization)?,
        )?;
        Ok(())
    }

    fn list_organizations(&self) -> Result<Vec<Organization>> {
        self.organizations
            .iter()
            .map(|r| {
                let (k, v) = r?;
                check_key(&k, 8)?;
                decode(&v)
            })
            .collect()
    }

    fn clear_organizations(&self) -> Result<usize> {
        let removed = Self::clear_keys(&self.organizations, self.organizations.iter().keys())?;
        tracing::debug!(removed, "Cleared organization table");
        Ok(removed)
    }

    fn get_certificate(
        &self,
        scope: OrganizationId,
        id: CertificateId,
    ) -> Result<Option<Certificate>> {
        self.certificates
            .get(certificate_key(scope, id))?
            .map(|v| decode(&v))
            .transpose()
    }

    fn put_certificate(&self, scope: OrganizationId, certificate: &Certificate) -> Result<()> {
        self.certificates.insert(
            certificate_key(scope, certificate.id),
            serde_json::to_vec(certificate)?,
        )?;
        Ok(())
    }

    fn remove_certificate(&self, scope: OrganizationId, id: CertificateId) -> Result<bool> {
        Ok(self.certificates.remove(certificate_key(scope, id))?.is_some())
    }

    fn list_certificates(&self, scope: OrganizationId) -> Result<Vec<Certificate>> {
        self.certificates
            .scan_prefix(scope.to_be_bytes())
            .map(|r| {
                let (k, v) = r?;
                check_key(&k, 16)?;
                decode(&v)
            })
            .collect()
    }

    fn clear_certificates(&self, scope: OrganizationId) -> Result<usize> {
        let removed = Self::clear_keys(
            &self.certificates,
            self.certificates.scan_prefix(scope.to_be_bytes()).keys(),
        )?;
        tracing::debug!(scope, removed, "Cleared certificate scope");
        Ok(removed)
    }

    fn commit(&self, changes: ChangeSet) -> Result<()> {
        // Keys to drop for cleared tables are read up front; transactional
        // trees cannot be iterated.
        let organization_removals: Vec<IVec> = if changes.organizations_cleared {
            self.organizations
                .iter()
                .keys()
                .collect::<sled::Result<_>>()?
        } else {
            Vec::new()
        };
        let mut certificate_removals = Vec::new();
        for scope in &changes.cleared_scopes {
            for key in self.certificates.scan_prefix(scope.to_be_bytes()).keys() {
                certificate_removals.push(key?);
            }
        }
        let organization_writes =
            encode_changes(&changes.organizations, |id| id.to_be_bytes().to_vec())?;
        let certificate_writes = encode_changes(&changes.certificates, |(scope, id)| {
            certificate_key(*scope, *id).to_vec()
        })?;

        let outcome = (&self.organizations, &self.certificates).transaction(
            |(organizations, certificates)| {
                for key in &organization_removals {
                    organizations.remove(key.clone())?;
                }
                for key in &certificate_removals {
                    certificates.remove(key.clone())?;
                }
                for (key, value) in &organization_writes {
                    match value {
                        Some(value) => organizations.insert(key.as_slice(), value.as_slice())?,
                        None => organizations.remove(key.as_slice())?,
                    };
                }
                for (key, value) in &certificate_writes {
                    match value {
                        Some(value) => certificates.insert(key.as_slice(), value.as_slice())?,
                        None => certificates.remove(key.as_slice())?,
                    };
                }
                Ok::<_, ConflictableTransactionError<Infallible>>(())
            },
        );

        match outcome {
            Ok(()) => {}
            Err(TransactionError::Storage(err)) => return Err(err.into()),
            Err(TransactionError::Abort(never)) => match never {},
        }
        tracing::debug!(
            organizations = organization_writes.len(),
            certificates = certificate_writes.len(),
            "Committed change set"
        );
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// In-memory backend
#[derive(Default)]
pub struct MemoryStorage {
    organizations: RwLock<BTreeMap<OrganizationId, Organization>>,
    certificates: RwLock<BTreeMap<OrganizationId, BTreeMap<CertificateId, Certificate>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get_organization(&self, id: OrganizationId) -> Result<Option<Organization>> {
        Ok(self.organizations.read().get(&id).cloned())
    }

    fn put_organization(&self, organization: &Organization) -> Result<()> {
        self.organizations
            .write()
            .insert(organization.id, organization.clone());
        Ok(())
    }

    fn list_organizations(&self) -> Result<Vec<Organization>> {
        Ok(self.organizations.read().values().cloned().collect())
    }

    fn clear_organizations(&self) -> Result<usize> {
        let mut organizations = self.organizations.write();
        let removed = organizations.len();
        organizations.clear();
        tracing::debug!(removed, "Cleared organization table");
        Ok(removed)
    }

    fn get_certificate(
        &self,
        scope: OrganizationId,
        id: CertificateId,
    ) -> Result<Option<Certificate>> {
        Ok(self
            .certificates
            .read()
            .get(&scope)
            .and_then(|certs| certs.get(&id))
            .cloned())
    }

    fn put_certificate(&self, scope: OrganizationId, certificate: &Certificate) -> Result<()> {
        self.certificates
            .write()
            .entry(scope)
            .or_default()
            .insert(certificate.id, certificate.clone());
        Ok(())
    }

    fn remove_certificate(&self, scope: OrganizationId, id: CertificateId) -> Result<bool> {
        Ok(self
            .certificates
            .write()
            .get_mut(&scope)
            .and_then(|certs| certs.remove(&id))
            .is_some())
    }

    fn list_certificates(&self, scope: OrganizationId) -> Result<Vec<Certificate>> {
        Ok(self
            .certificates
            .read()
            .get(&scope)
            .map(|certs| certs.values().cloned().collect())
            .unwrap_or_default())
    }

    fn clear_certificates(&self, scope: OrganizationId) -> Result<usize> {
        let removed = self
            .certificates
            .write()
            .remove(&scope)
            .map(|certs| certs.len())
            .unwrap_or(0);
        tracing::debug!(scope, removed, "Cleared certificate scope");
        Ok(removed)
    }

    fn commit(&self, changes: ChangeSet) -> Result<()> {
        let mut organizations = self.organizations.write();
        let mut certificates = self.certificates.write();

        if changes.organizations_cleared {
            organizations.clear();
        }
        for (id, record) in changes.organizations {
            match record {
                Some(org) => organizations.insert(id, org),
                None => organizations.remove(&id),
            };
        }
        for scope in &changes.cleared_scopes {
            certificates.remove(scope);
        }
        for ((scope, id), record) in changes.certificates {
            match record {
                Some(cert) => {
                    certificates.entry(scope).or_default().insert(id, cert);
                }
                None => {
                    if let Some(scoped) = certificates.get_mut(&scope) {
                        scoped.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }
}
