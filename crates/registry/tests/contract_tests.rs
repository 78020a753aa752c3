//! End-to-end tests for the certify contract: authorization, scoping,
//! signer growth, signing and bulk clears over both storage backends.

use certify_registry::{
    BatchError, CallContext, CertifyContract, Effect, RecordKey, RegistryError,
};
use certify_storage::{MemoryStorage, SledStorage, Storage};
use certify_types::{AccountName, Action, CertificateStatus, Signer};
use std::sync::Arc;
use tempfile::TempDir;

fn acct(name: &str) -> AccountName {
    AccountName::new(name).unwrap()
}

fn owner() -> CallContext {
    CallContext::single(acct("certify"))
}

fn contract() -> CertifyContract<MemoryStorage> {
    CertifyContract::new(acct("certify"), Arc::new(MemoryStorage::new()))
}

fn register(id: u64, name: &str) -> Action {
    Action::RegisterOrganization {
        id,
        name: name.to_string(),
    }
}

fn create(id: u64, organization_id: u64, content: &str) -> Action {
    Action::CreateCertificate {
        id,
        organization_id,
        content: content.to_string(),
        participants: vec![acct("alice")],
    }
}

fn add_signers(id: u64, organization_id: u64, names: &[&str]) -> Action {
    Action::AddSigners {
        id,
        organization_id,
        signers: names.iter().map(|n| Signer::pending(acct(n))).collect(),
    }
}

fn sign(id: u64, organization_id: u64, signer: &str) -> Action {
    Action::SignCertificate {
        id,
        organization_id,
        signer: acct(signer),
    }
}

fn signer_flags<S: Storage + ?Sized>(
    contract: &CertifyContract<S>,
    id: u64,
    org: u64,
) -> Vec<(String, bool)> {
    contract
        .certificate(id, org)
        .unwrap()
        .signers
        .into_iter()
        .map(|s| (s.account.to_string(), s.signed))
        .collect()
}

#[test]
fn test_organization_uniqueness() {
    let contract = contract();
    contract.execute(&owner(), register(1, "Acme")).unwrap();
    contract.execute(&owner(), register(2, "Globex")).unwrap();
    contract.execute(&owner(), create(5, 2, "unrelated")).unwrap();

    let err = contract.execute(&owner(), register(1, "Acme again")).unwrap_err();
    assert!(matches!(
        err,
        RegistryError::AlreadyExists {
            key: RecordKey::Organization(1)
        }
    ));
}

#[test]
fn test_owner_actions_reject_other_callers() {
    let contract = contract();
    let mallory = CallContext::single(acct("mallory"));

    let err = contract.execute(&mallory, register(1, "Acme")).unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Unauthorized { ref required } if required == &acct("certify")
    ));
    assert!(contract.organizations().unwrap().is_empty());

    contract.execute(&owner(), register(1, "Acme")).unwrap();
    contract.execute(&owner(), create(5, 1, "diploma")).unwrap();
    for action in [
        Action::ClearOrganizations,
        create(6, 1, "forged"),
        Action::DeleteCertificate {
            id: 5,
            organization_id: 1,
        },
        add_signers(5, 1, &["mallory"]),
        Action::ClearCertificates { organization_id: 1 },
    ] {
        let name = action.name();
        assert!(
            matches!(
                contract.execute(&mallory, action),
                Err(RegistryError::Unauthorized { .. })
            ),
            "{name} must require the owner"
        );
    }
    assert!(contract.certificate(5, 1).unwrap().signers.is_empty());
}

#[test]
fn test_authorization_is_checked_before_lookup() {
    let contract = contract();
    // Nothing exists, but the unauthorized caller never learns that.
    let err = contract
        .execute(&CallContext::single(acct("mallory")), sign(5, 1, "dean"))
        .unwrap_err();
    assert!(matches!(err, RegistryError::Unauthorized { .. }));
}

#[test]
fn test_sign_requires_the_signer_not_the_owner() {
    let contract = contract();
    contract.execute(&owner(), register(1, "Acme")).unwrap();
    contract.execute(&owner(), create(5, 1, "diploma")).unwrap();
    contract
        .execute(&owner(), add_signers(5, 1, &["dean"]))
        .unwrap();

    let err = contract.execute(&owner(), sign(5, 1, "dean")).unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Unauthorized { ref required } if required == &acct("dean")
    ));

    let receipt = contract
        .execute(&CallContext::single(acct("dean")), sign(5, 1, "dean"))
        .unwrap();
    assert_eq!(receipt.effect, Effect::Updated);
    assert_eq!(
        contract.certificate(5, 1).unwrap().status(),
        CertificateStatus::FullySigned
    );

    // A transaction carrying both authorities also passes.
    let both = CallContext::new([acct("certify"), acct("dean")]);
    assert!(contract.execute(&both, sign(5, 1, "dean")).is_ok());
}

#[test]
fn test_scope_isolation() {
    let contract = contract();
    contract.execute(&owner(), register(1, "Acme")).unwrap();
    contract.execute(&owner(), register(2, "Globex")).unwrap();

    contract.execute(&owner(), create(5, 1, "acme diploma")).unwrap();
    contract.execute(&owner(), create(5, 2, "globex diploma")).unwrap();

    contract
        .execute(
            &owner(),
            Action::DeleteCertificate {
                id: 5,
                organization_id: 1,
            },
        )
        .unwrap();
    assert_eq!(contract.certificate(5, 2).unwrap().content, "globex diploma");

    contract.execute(&owner(), create(5, 1, "acme again")).unwrap();
    contract
        .execute(&owner(), Action::ClearCertificates { organization_id: 2 })
        .unwrap();
    assert_eq!(contract.certificate(5, 1).unwrap().content, "acme again");
    assert!(contract.certificates(2).unwrap().is_empty());
}

#[test]
fn test_referential_check_at_creation_only() {
    let contract = contract();
    let err = contract.execute(&owner(), create(5, 1, "orphan")).unwrap_err();
    assert!(matches!(
        err,
        RegistryError::OrganizationNotFound { organization_id: 1 }
    ));

    contract.execute(&owner(), register(1, "Acme")).unwrap();
    contract.execute(&owner(), create(5, 1, "diploma")).unwrap();
    contract.execute(&owner(), Action::ClearOrganizations).unwrap();

    // The certificate outlives its organization and can still be updated.
    assert_eq!(contract.certificate(5, 1).unwrap().content, "diploma");
    contract
        .execute(&owner(), add_signers(5, 1, &["dean"]))
        .unwrap();
    contract
        .execute(&CallContext::single(acct("dean")), sign(5, 1, "dean"))
        .unwrap();

    // Single deletes re-check the organization; the scope clear does not.
    assert!(matches!(
        contract.execute(
            &owner(),
            Action::DeleteCertificate {
                id: 5,
                organization_id: 1
            }
        ),
        Err(RegistryError::OrganizationNotFound { .. })
    ));
    let receipt = contract
        .execute(&owner(), Action::ClearCertificates { organization_id: 1 })
        .unwrap();
    assert_eq!(receipt.effect, Effect::Removed(1));
}

#[test]
fn test_append_only_signer_growth() {
    let contract = contract();
    contract.execute(&owner(), register(1, "Acme")).unwrap();
    contract.execute(&owner(), create(5, 1, "diploma")).unwrap();

    contract
        .execute(&owner(), add_signers(5, 1, &["a", "b"]))
        .unwrap();
    contract.execute(&owner(), add_signers(5, 1, &["c"])).unwrap();

    assert_eq!(
        signer_flags(&contract, 5, 1),
        vec![
            ("a".to_string(), false),
            ("b".to_string(), false),
            ("c".to_string(), false)
        ]
    );
}

#[test]
fn test_first_match_signing() {
    let contract = contract();
    contract.execute(&owner(), register(1, "Acme")).unwrap();
    contract.execute(&owner(), create(5, 1, "diploma")).unwrap();
    contract
        .execute(&owner(), add_signers(5, 1, &["x", "y", "x"]))
        .unwrap();

    let receipt = contract
        .execute(&CallContext::single(acct("x")), sign(5, 1, "x"))
        .unwrap();
    assert_eq!(receipt.effect, Effect::Updated);

    // The first entry is already signed, so signing again changes nothing.
    let receipt = contract
        .execute(&CallContext::single(acct("x")), sign(5, 1, "x"))
        .unwrap();
    assert_eq!(receipt.effect, Effect::Unchanged);

    assert_eq!(
        signer_flags(&contract, 5, 1),
        vec![
            ("x".to_string(), true),
            ("y".to_string(), false),
            ("x".to_string(), false)
        ]
    );
}

#[test]
fn test_unknown_signer_is_silent_noop() {
    let contract = contract();
    contract.execute(&owner(), register(1, "Acme")).unwrap();
    contract.execute(&owner(), create(5, 1, "diploma")).unwrap();
    contract
        .execute(&owner(), add_signers(5, 1, &["dean"]))
        .unwrap();
    let before = contract.certificate(5, 1).unwrap();

    let receipt = contract
        .execute(&CallContext::single(acct("zed")), sign(5, 1, "zed"))
        .unwrap();
    assert_eq!(receipt.effect, Effect::Unchanged);
    assert_eq!(contract.certificate(5, 1).unwrap(), before);
}

#[test]
fn test_fully_signed_certificate_reopens() {
    let contract = contract();
    contract.execute(&owner(), register(1, "Acme")).unwrap();
    contract.execute(&owner(), create(5, 1, "diploma")).unwrap();
    assert_eq!(
        contract.certificate(5, 1).unwrap().status(),
        CertificateStatus::Created
    );

    contract
        .execute(&owner(), add_signers(5, 1, &["dean"]))
        .unwrap();
    contract
        .execute(&CallContext::single(acct("dean")), sign(5, 1, "dean"))
        .unwrap();
    assert_eq!(
        contract.certificate(5, 1).unwrap().status(),
        CertificateStatus::FullySigned
    );

    contract
        .execute(&owner(), add_signers(5, 1, &["rector"]))
        .unwrap();
    assert_eq!(
        contract.certificate(5, 1).unwrap().status(),
        CertificateStatus::PartiallySigned
    );
}

#[test]
fn test_idempotent_clears() {
    let contract = contract();
    contract.execute(&owner(), register(1, "Acme")).unwrap();
    contract.execute(&owner(), create(5, 1, "a")).unwrap();
    contract.execute(&owner(), create(6, 1, "b")).unwrap();

    let first = contract
        .execute(&owner(), Action::ClearCertificates { organization_id: 1 })
        .unwrap();
    let second = contract
        .execute(&owner(), Action::ClearCertificates { organization_id: 1 })
        .unwrap();
    assert_eq!(first.effect, Effect::Removed(2));
    assert_eq!(second.effect, Effect::Removed(0));
    assert!(contract.certificates(1).unwrap().is_empty());

    contract.execute(&owner(), Action::ClearOrganizations).unwrap();
    let again = contract
        .execute(&owner(), Action::ClearOrganizations)
        .unwrap();
    assert_eq!(again.effect, Effect::Removed(0));
}

#[test]
fn test_failed_create_writes_nothing() {
    let contract = contract();
    contract.execute(&owner(), register(1, "Acme")).unwrap();
    contract.execute(&owner(), create(5, 1, "original")).unwrap();

    assert!(contract.execute(&owner(), create(5, 1, "dup")).is_err());
    assert!(contract.execute(&owner(), create(6, 9, "no org")).is_err());

    let certs = contract.certificates(1).unwrap();
    assert_eq!(certs.len(), 1);
    assert_eq!(certs[0].content, "original");
    assert!(contract.certificates(9).unwrap().is_empty());
}

#[test]
fn test_receipt_serialization() {
    let contract = contract();
    let receipt = contract.execute(&owner(), register(1, "Acme")).unwrap();
    assert_eq!(
        serde_json::to_value(&receipt).unwrap(),
        serde_json::json!({"action": "register_organization", "effect": "inserted"})
    );

    let receipt = contract
        .execute(&owner(), Action::ClearOrganizations)
        .unwrap();
    assert_eq!(
        serde_json::to_value(&receipt).unwrap(),
        serde_json::json!({"action": "clear_organizations", "effect": "removed", "count": 1})
    );
}

#[test]
fn test_sled_backed_contract_persists() {
    let dir = TempDir::new().unwrap();

    {
        let storage = Arc::new(SledStorage::open(dir.path()).unwrap());
        let contract = CertifyContract::new(acct("certify"), storage);
        contract.execute(&owner(), register(1, "Acme")).unwrap();
        contract.execute(&owner(), create(5, 1, "diploma")).unwrap();
        contract
            .execute(&owner(), add_signers(5, 1, &["dean", "rector"]))
            .unwrap();
        contract
            .execute(&CallContext::single(acct("rector")), sign(5, 1, "rector"))
            .unwrap();
        contract.flush().unwrap();
    }

    let storage: Arc<dyn Storage> = Arc::new(SledStorage::open(dir.path()).unwrap());
    let contract = CertifyContract::new(acct("certify"), storage);
    assert_eq!(contract.organization(1).unwrap().name, "Acme");
    assert_eq!(
        signer_flags(&contract, 5, 1),
        vec![("dean".to_string(), false), ("rector".to_string(), true)]
    );
    assert!(contract.has_participant(5, 1, &acct("alice")).unwrap());
}

fn backends(dir: &TempDir) -> Vec<(&'static str, Arc<dyn Storage>)> {
    let memory: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let sled: Arc<dyn Storage> = Arc::new(SledStorage::open(dir.path()).unwrap());
    vec![("memory", memory), ("sled", sled)]
}

#[test]
fn test_batch_commits_all_actions_together() {
    let dir = TempDir::new().unwrap();
    for (name, storage) in backends(&dir) {
        let contract = CertifyContract::new(acct("certify"), storage);
        contract.execute(&owner(), register(2, "Globex")).unwrap();
        contract.execute(&owner(), create(9, 2, "old")).unwrap();

        let receipts = contract
            .execute_batch(
                &owner(),
                vec![
                    register(1, "Acme"),
                    create(5, 1, "diploma"),
                    add_signers(5, 1, &["dean"]),
                    Action::ClearCertificates { organization_id: 2 },
                    create(9, 2, "new"),
                ],
            )
            .unwrap();

        let effects: Vec<Effect> = receipts.iter().map(|r| r.effect).collect();
        assert_eq!(
            effects,
            vec![
                Effect::Inserted,
                Effect::Inserted,
                Effect::Updated,
                Effect::Removed(1),
                Effect::Inserted
            ],
            "{name}"
        );
        assert_eq!(signer_flags(&contract, 5, 1), vec![("dean".to_string(), false)]);
        let scope_two = contract.certificates(2).unwrap();
        assert_eq!(scope_two.len(), 1, "{name}");
        assert_eq!(scope_two[0].content, "new", "{name}");
    }
}

#[test]
fn test_failed_batch_leaves_nothing_behind() {
    let dir = TempDir::new().unwrap();
    for (name, storage) in backends(&dir) {
        let contract = CertifyContract::new(acct("certify"), storage);
        contract.execute(&owner(), register(2, "Globex")).unwrap();
        contract.execute(&owner(), create(9, 2, "kept")).unwrap();

        let err = contract
            .execute_batch(
                &owner(),
                vec![
                    register(1, "Acme"),
                    create(5, 1, "diploma"),
                    Action::ClearCertificates { organization_id: 2 },
                    add_signers(6, 1, &["dean"]),
                ],
            )
            .unwrap_err();
        assert!(
            matches!(
                err,
                BatchError::Action {
                    index: 3,
                    source: RegistryError::NotFound { .. }
                }
            ),
            "{name}: {err:?}"
        );

        let ids: Vec<u64> = contract.organizations().unwrap().iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![2], "{name}");
        assert!(contract.certificates(1).unwrap().is_empty(), "{name}");
        assert_eq!(contract.certificate(9, 2).unwrap().content, "kept", "{name}");
    }
}

#[test]
fn test_batch_authorizes_every_action() {
    let contract = contract();
    contract.execute(&owner(), register(1, "Acme")).unwrap();
    contract.execute(&owner(), create(5, 1, "diploma")).unwrap();

    // The owner may add signers but cannot sign on the dean's behalf.
    let err = contract
        .execute_batch(
            &owner(),
            vec![add_signers(5, 1, &["dean"]), sign(5, 1, "dean")],
        )
        .unwrap_err();
    assert!(matches!(
        err,
        BatchError::Action {
            index: 1,
            source: RegistryError::Unauthorized { .. }
        }
    ));
    assert!(contract.certificate(5, 1).unwrap().signers.is_empty());
}
