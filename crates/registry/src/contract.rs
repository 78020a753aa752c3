//! Action dispatch
//!
//! [`CertifyContract`] is the single entry point for mutations. Each call is
//! authorized against the action's policy before any record is read, then
//! runs one registry operation while holding the contract lock, so no two
//! calls interleave their read-modify-write.
//!
//! [`CertifyContract::execute_batch`] runs several actions as one
//! transaction: they are applied to a staged view of the store and
//! committed together only if every one of them succeeds.

use crate::auth::CallContext;
use crate::certificates::CertificateRegistry;
use crate::errors::*;
use crate::organizations::OrganizationRegistry;
use certify_storage::{StagedStorage, Storage};
use certify_types::{
    AccountName, Action, Certificate, CertificateId, Organization, OrganizationId,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a committed action did to the tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "effect", content = "count", rename_all = "snake_case")]
pub enum Effect {
    Inserted,
    Updated,
    Removed(usize),
    /// The call succeeded without changing anything.
    Unchanged,
}

/// Result of a successful action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub action: &'static str,
    #[serde(flatten)]
    pub effect: Effect,
}

/// Both registries over one store.
struct Tables<S: ?Sized> {
    organizations: OrganizationRegistry<S>,
    certificates: CertificateRegistry<S>,
}

pub struct CertifyContract<S: ?Sized> {
    owner: AccountName,
    tables: Tables<S>,
    storage: Arc<S>,
    lock: Mutex<()>,
}

impl<S: Storage + ?Sized> Tables<S> {
    fn new(storage: Arc<S>) -> Self {
        Self {
            organizations: OrganizationRegistry::new(Arc::clone(&storage)),
            certificates: CertificateRegistry::new(storage),
        }
    }

    fn apply(&self, action: Action) -> Result<Effect> {
        match action {
            Action::RegisterOrganization { id, name } => {
                self.organizations.register(id, name)?;
                Ok(Effect::Inserted)
            }
            Action::ClearOrganizations => Ok(Effect::Removed(self.organizations.clear()?)),
            Action::CreateCertificate {
                id,
                organization_id,
                content,
                participants,
            } => {
                self.certificates
                    .create(id, organization_id, content, participants)?;
                Ok(Effect::Inserted)
            }
            Action::DeleteCertificate {
                id,
                organization_id,
            } => {
                self.certificates.delete(id, organization_id)?;
                Ok(Effect::Removed(1))
            }
            Action::AddSigners {
                id,
                organization_id,
                signers,
            } => {
                self.certificates.add_signers(id, organization_id, signers)?;
                Ok(Effect::Updated)
            }
            Action::SignCertificate {
                id,
                organization_id,
                signer,
            } => {
                if self.certificates.sign(id, organization_id, &signer)? {
                    Ok(Effect::Updated)
                } else {
                    Ok(Effect::Unchanged)
                }
            }
            Action::ClearCertificates { organization_id } => Ok(Effect::Removed(
                self.certificates.clear_scope(organization_id)?,
            )),
        }
    }
}

impl<S: Storage + ?Sized> CertifyContract<S> {
    /// Create a contract owned by `owner` over the given storage.
    pub fn new(owner: AccountName, storage: Arc<S>) -> Self {
        Self {
            owner,
            tables: Tables::new(Arc::clone(&storage)),
            storage,
            lock: Mutex::new(()),
        }
    }

    pub fn owner(&self) -> &AccountName {
        &self.owner
    }

    /// Authorize and apply one action.
    pub fn execute(&self, ctx: &CallContext, action: Action) -> Result<Receipt> {
        let _guard = self.lock.lock();
        self.authorize_and_apply(&self.tables, ctx, action)
    }

    /// Authorize and apply `actions` in order as one unit.
    ///
    /// Nothing reaches the store unless every action succeeds; the first
    /// failure is returned with its position and the batch is discarded.
    pub fn execute_batch(
        &self,
        ctx: &CallContext,
        actions: Vec<Action>,
    ) -> std::result::Result<Vec<Receipt>, BatchError> {
        let _guard = self.lock.lock();
        let staged = Arc::new(StagedStorage::new(Arc::clone(&self.storage)));
        let tables = Tables::new(Arc::clone(&staged));

        let total = actions.len();
        let mut receipts = Vec::with_capacity(total);
        for (index, action) in actions.into_iter().enumerate() {
            match self.authorize_and_apply(&tables, ctx, action) {
                Ok(receipt) => receipts.push(receipt),
                Err(source) => {
                    warn!(index, total, error = %source, "Batch rolled back");
                    return Err(BatchError::Action { index, source });
                }
            }
        }

        self.storage.commit(staged.take_changes())?;
        info!(actions = total, "Committed batch");
        Ok(receipts)
    }

    fn authorize_and_apply<T: Storage + ?Sized>(
        &self,
        tables: &Tables<T>,
        ctx: &CallContext,
        action: Action,
    ) -> Result<Receipt> {
        let name = action.name();

        if let Err(err) = ctx.require(&action.policy(), &self.owner) {
            warn!(action = name, error = %err, "Rejected unauthorized call");
            return Err(err);
        }

        match tables.apply(action) {
            Ok(effect) => Ok(Receipt {
                action: name,
                effect,
            }),
            Err(err) => {
                debug!(action = name, error = %err, "Action failed");
                Err(err)
            }
        }
    }

    pub fn organization(&self, id: OrganizationId) -> Result<Organization> {
        self.tables.organizations.get(id)
    }

    pub fn organizations(&self) -> Result<Vec<Organization>> {
        self.tables.organizations.list()
    }

    pub fn certificate(
        &self,
        id: CertificateId,
        organization_id: OrganizationId,
    ) -> Result<Certificate> {
        self.tables.certificates.get(id, organization_id)
    }

    pub fn certificates(&self, organization_id: OrganizationId) -> Result<Vec<Certificate>> {
        self.tables.certificates.list(organization_id)
    }

    pub fn has_participant(
        &self,
        id: CertificateId,
        organization_id: OrganizationId,
        account: &AccountName,
    ) -> Result<bool> {
        self.tables.certificates.has_participant(id, organization_id, account)
    }

    /// Flush the underlying storage.
    pub fn flush(&self) -> Result<()> {
        Ok(self.storage.flush()?)
    }
}
