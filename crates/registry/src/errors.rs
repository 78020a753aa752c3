//! Error types for the certificate registry

use certify_storage::StorageError;
use certify_types::{AccountName, CertificateId, OrganizationId};
use std::fmt;
use thiserror::Error;

/// Identifies the record an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKey {
    Organization(OrganizationId),
    Certificate {
        organization_id: OrganizationId,
        certificate_id: CertificateId,
    },
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Organization(id) => write!(f, "organization {id}"),
            RecordKey::Certificate {
                organization_id,
                certificate_id,
            } => write!(
                f,
                "certificate {certificate_id} of organization {organization_id}"
            ),
        }
    }
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Record already exists: {key}")]
    AlreadyExists { key: RecordKey },

    #[error("Organization not found: {organization_id}")]
    OrganizationNotFound { organization_id: OrganizationId },

    #[error("Record not found: {key}")]
    NotFound { key: RecordKey },

    #[error("Unauthorized: missing authority of {required}")]
    Unauthorized { required: AccountName },

    #[error("Registry storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Why a batch was discarded. Nothing from a failed batch reaches the store.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Batch action #{index} failed; nothing was committed")]
    Action {
        index: usize,
        #[source]
        source: RegistryError,
    },

    #[error("Failed to commit batch")]
    Commit(#[from] StorageError),
}
