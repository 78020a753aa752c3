//! Call authorization
//!
//! The host ledger authenticates the accounts that signed a transaction and
//! hands them to the registry as a [`CallContext`]. The registry only checks
//! that the principal an action requires is among them.

use crate::errors::*;
use certify_types::{AccountName, AuthPolicy};
use std::collections::BTreeSet;

/// Accounts that authorized the current call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    authorizers: BTreeSet<AccountName>,
}

impl CallContext {
    /// A call authorized by a single account.
    pub fn single(account: AccountName) -> Self {
        Self {
            authorizers: BTreeSet::from([account]),
        }
    }

    pub fn new(authorizers: impl IntoIterator<Item = AccountName>) -> Self {
        Self {
            authorizers: authorizers.into_iter().collect(),
        }
    }

    pub fn has_authority_of(&self, account: &AccountName) -> bool {
        self.authorizers.contains(account)
    }

    pub fn authorizers(&self) -> impl Iterator<Item = &AccountName> {
        self.authorizers.iter()
    }

    /// Fail with `Unauthorized` unless the principal named by `policy`
    /// authorized this call. `owner` resolves [`AuthPolicy::OwnerOnly`].
    pub fn require(&self, policy: &AuthPolicy, owner: &AccountName) -> Result<()> {
        let required = match policy {
            AuthPolicy::OwnerOnly => owner,
            AuthPolicy::MustBeIdentity(account) => account,
        };

        if self.has_authority_of(required) {
            Ok(())
        } else {
            Err(RegistryError::Unauthorized {
                required: required.clone(),
            })
        }
    }
}
