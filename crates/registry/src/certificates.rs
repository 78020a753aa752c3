//! Certificate registry
//!
//! Certificates are stored per organization scope, so the same certificate
//! id may exist once in every organization. The parent organization is only
//! checked when a certificate is created or deleted; clearing organizations
//! later leaves their certificates in place.

use crate::errors::*;
use crate::organizations::OrganizationRegistry;
use certify_storage::Storage;
use certify_types::{
    AccountName, Certificate, CertificateId, OrganizationId, SignOutcome, Signer,
};
use std::sync::Arc;
use tracing::{debug, info};

pub struct CertificateRegistry<S: ?Sized> {
    storage: Arc<S>,
    organizations: OrganizationRegistry<S>,
}

impl<S: Storage + ?Sized> CertificateRegistry<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            organizations: OrganizationRegistry::new(Arc::clone(&storage)),
            storage,
        }
    }

    fn ensure_organization(&self, organization_id: OrganizationId) -> Result<()> {
        if self.organizations.exists(organization_id)? {
            Ok(())
        } else {
            Err(RegistryError::OrganizationNotFound { organization_id })
        }
    }

    fn load(&self, organization_id: OrganizationId, id: CertificateId) -> Result<Certificate> {
        self.storage
            .get_certificate(organization_id, id)?
            .ok_or(RegistryError::NotFound {
                key: RecordKey::Certificate {
                    organization_id,
                    certificate_id: id,
                },
            })
    }

    /// Create a certificate with an empty signer list.
    pub fn create(
        &self,
        id: CertificateId,
        organization_id: OrganizationId,
        content: impl Into<String>,
        participants: Vec<AccountName>,
    ) -> Result<()> {
        self.ensure_organization(organization_id)?;

        if self.storage.get_certificate(organization_id, id)?.is_some() {
            return Err(RegistryError::AlreadyExists {
                key: RecordKey::Certificate {
                    organization_id,
                    certificate_id: id,
                },
            });
        }

        let certificate = Certificate::new(id, content, participants);
        self.storage.put_certificate(organization_id, &certificate)?;
        info!(
            certificate_id = id,
            organization_id,
            participants = certificate.participants.len(),
            "Created certificate"
        );
        Ok(())
    }

    pub fn delete(&self, id: CertificateId, organization_id: OrganizationId) -> Result<()> {
        self.ensure_organization(organization_id)?;

        if !self.storage.remove_certificate(organization_id, id)? {
            return Err(RegistryError::NotFound {
                key: RecordKey::Certificate {
                    organization_id,
                    certificate_id: id,
                },
            });
        }

        info!(certificate_id = id, organization_id, "Deleted certificate");
        Ok(())
    }

    /// Append signers after the existing ones. Duplicates are kept as-is.
    pub fn add_signers(
        &self,
        id: CertificateId,
        organization_id: OrganizationId,
        signers: Vec<Signer>,
    ) -> Result<()> {
        let mut certificate = self.load(organization_id, id)?;
        let added = signers.len();
        certificate.append_signers(signers);
        self.storage.put_certificate(organization_id, &certificate)?;

        info!(
            certificate_id = id,
            organization_id,
            added,
            total = certificate.signers.len(),
            "Added signers"
        );
        Ok(())
    }

    /// Record `signer`'s signature on the first matching signer entry.
    ///
    /// An account that is not a signer of the certificate, or whose first
    /// entry is already signed, is silently ignored and nothing is written.
    /// Returns whether the certificate changed.
    pub fn sign(
        &self,
        id: CertificateId,
        organization_id: OrganizationId,
        signer: &AccountName,
    ) -> Result<bool> {
        let mut certificate = self.load(organization_id, id)?;

        let outcome = certificate.sign(signer);
        if !outcome.changed() {
            debug!(
                certificate_id = id,
                organization_id,
                signer = %signer,
                ?outcome,
                "Nothing to sign"
            );
            return Ok(false);
        }

        self.storage.put_certificate(organization_id, &certificate)?;
        info!(
            certificate_id = id,
            organization_id,
            signer = %signer,
            status = ?certificate.status(),
            "Certificate signed"
        );
        Ok(true)
    }

    /// Remove every certificate in one organization's scope.
    pub fn clear_scope(&self, organization_id: OrganizationId) -> Result<usize> {
        let removed = self.storage.clear_certificates(organization_id)?;
        info!(organization_id, removed, "Cleared certificates");
        Ok(removed)
    }

    pub fn get(&self, id: CertificateId, organization_id: OrganizationId) -> Result<Certificate> {
        self.load(organization_id, id)
    }

    pub fn list(&self, organization_id: OrganizationId) -> Result<Vec<Certificate>> {
        Ok(self.storage.list_certificates(organization_id)?)
    }

    /// Whether `account` is listed as a participant of the certificate.
    pub fn has_participant(
        &self,
        id: CertificateId,
        organization_id: OrganizationId,
        account: &AccountName,
    ) -> Result<bool> {
        Ok(self.load(organization_id, id)?.has_participant(account))
    }
}
