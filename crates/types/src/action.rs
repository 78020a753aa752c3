use crate::account::AccountName;
use crate::certificate::{CertificateId, Signer};
use crate::organization::OrganizationId;
use serde::{Deserialize, Serialize};

/// Principal whose authorization an action requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPolicy {
    /// The registry owner account.
    OwnerOnly,
    /// A specific account named by the action itself.
    MustBeIdentity(AccountName),
}

/// A registry operation as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    RegisterOrganization {
        id: OrganizationId,
        name: String,
    },
    ClearOrganizations,
    CreateCertificate {
        id: CertificateId,
        organization_id: OrganizationId,
        content: String,
        #[serde(default)]
        participants: Vec<AccountName>,
    },
    DeleteCertificate {
        id: CertificateId,
        organization_id: OrganizationId,
    },
    AddSigners {
        id: CertificateId,
        organization_id: OrganizationId,
        signers: Vec<Signer>,
    },
    SignCertificate {
        id: CertificateId,
        organization_id: OrganizationId,
        signer: AccountName,
    },
    ClearCertificates {
        organization_id: OrganizationId,
    },
}

impl Action {
    /// Operation name used in logs and receipts.
    pub fn name(&self) -> &'static str {
        match self {
            Action::RegisterOrganization { .. } => "register_organization",
            Action::ClearOrganizations => "clear_organizations",
            Action::CreateCertificate { .. } => "create_certificate",
            Action::DeleteCertificate { .. } => "delete_certificate",
            Action::AddSigners { .. } => "add_signers",
            Action::SignCertificate { .. } => "sign_certificate",
            Action::ClearCertificates { .. } => "clear_certificates",
        }
    }

    /// Who must have authorized this action.
    ///
    /// Signing is the signer's own act, so it is the only operation not
    /// authorized by the registry owner.
    pub fn policy(&self) -> AuthPolicy {
        match self {
            Action::SignCertificate { signer, .. } => AuthPolicy::MustBeIdentity(signer.clone()),
            _ => AuthPolicy::OwnerOnly,
        }
    }
}
