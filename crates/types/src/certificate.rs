use crate::account::AccountName;
use serde::{Deserialize, Serialize};

/// Caller-chosen certificate identifier, unique within one organization scope.
pub type CertificateId = u64;

/// A required signer and whether they have signed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub account: AccountName,
    #[serde(default)]
    pub signed: bool,
}

impl Signer {
    /// A signer entry that still awaits a signature.
    pub fn pending(account: AccountName) -> Self {
        Self {
            account,
            signed: false,
        }
    }
}

/// Where a certificate stands in its signing lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    /// No signers attached yet.
    Created,
    /// Signers attached, none of them signed.
    Pending,
    /// At least one signer signed, at least one still pending.
    PartiallySigned,
    /// Every attached signer signed.
    FullySigned,
}

/// What [`Certificate::sign`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutcome {
    /// The first entry for the account flipped to signed.
    Signed,
    /// The first entry for the account was already signed.
    AlreadySigned,
    /// The account is not in the signer list.
    NotListed,
}

impl SignOutcome {
    /// Whether the certificate changed.
    pub fn changed(self) -> bool {
        self == SignOutcome::Signed
    }
}

/// A certificate stored inside an organization's scope.
///
/// The owning organization is not a field: it is the storage partition the
/// record lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: CertificateId,
    pub content: String,
    /// Fixed at creation.
    pub participants: Vec<AccountName>,
    /// Append-only. Entries are never removed, only flipped to signed.
    #[serde(default)]
    pub signers: Vec<Signer>,
}

impl Certificate {
    /// A freshly created certificate with an empty signer list.
    pub fn new(
        id: CertificateId,
        content: impl Into<String>,
        participants: Vec<AccountName>,
    ) -> Self {
        Self {
            id,
            content: content.into(),
            participants,
            signers: Vec::new(),
        }
    }

    pub fn status(&self) -> CertificateStatus {
        let signed = self.signers.iter().filter(|s| s.signed).count();
        match (self.signers.len(), signed) {
            (0, _) => CertificateStatus::Created,
            (_, 0) => CertificateStatus::Pending,
            (total, signed) if signed == total => CertificateStatus::FullySigned,
            _ => CertificateStatus::PartiallySigned,
        }
    }

    /// Accounts whose signer entry is still unsigned, in signer order.
    /// An account listed twice with both entries unsigned appears twice.
    pub fn pending_signers(&self) -> Vec<&AccountName> {
        self.signers
            .iter()
            .filter(|s| !s.signed)
            .map(|s| &s.account)
            .collect()
    }

    pub fn has_participant(&self, account: &AccountName) -> bool {
        self.participants.iter().any(|p| p == account)
    }

    /// Append signer entries after the existing ones, keeping their flags.
    pub fn append_signers(&mut self, signers: impl IntoIterator<Item = Signer>) {
        self.signers.extend(signers);
    }

    /// Mark the first entry for `account` as signed.
    ///
    /// Later entries for the same account are left untouched, even when the
    /// first one is already signed.
    pub fn sign(&mut self, account: &AccountName) -> SignOutcome {
        match self.signers.iter_mut().find(|s| &s.account == account) {
            Some(entry) if entry.signed => SignOutcome::AlreadySigned,
            Some(entry) => {
                entry.signed = true;
                SignOutcome::Signed
            }
            None => SignOutcome::NotListed,
        }
    }
}
