mod common;

use common::{FaultInjectingStore, Op, add_form, row, rows, tree};
use orgsync::{
    CascadeStep, Collection, CollaboratorInput, CompanyInput, EntityStore, FailureKind, Filter, InMemoryStore,
    Outcome, ReconcileConfig, ReconcileReport, Reconciler, RowId, StoreError, TransactionMode, UnitInput,
};

/// Company with 2 units, 5 collaborators and 3 forms.
async fn seed<S: EntityStore>(reconciler: &Reconciler<S>) -> ReconcileReport {
    let mut input = tree(CompanyInput::new("owner-1", "Acme").with_sector("Ops"));
    input.units = vec![
        UnitInput::new("u-1", "Plant A").with_sector("Ops"),
        UnitInput::new("u-2", "Plant B"),
    ];
    input.collaborators = vec![
        CollaboratorInput::new("c-1", "u-1", "Ana").in_sector("Ops"),
        CollaboratorInput::new("c-2", "u-1", "Bo"),
        CollaboratorInput::new("c-3", "u-1", "Cy"),
        CollaboratorInput::new("c-4", "u-2", "Di"),
        CollaboratorInput::new("c-5", "u-2", "Ed"),
    ];
    let report = reconciler.reconcile(&input).await.unwrap();
    assert!(report.failures.is_empty(), "{:?}", report.failures);

    add_form(reconciler.store(), &report.unit_ids["u-1"]).await;
    add_form(reconciler.store(), &report.unit_ids["u-1"]).await;
    add_form(reconciler.store(), &report.unit_ids["u-2"]).await;
    report
}

#[tokio::test]
async fn test_company_delete_runs_in_dependency_order() {
    let reconciler = Reconciler::new(InMemoryStore::new());
    let saved = seed(&reconciler).await;

    let report = reconciler.cascade_delete(saved.company_id.as_ref().unwrap()).await.unwrap();

    assert!(report.deleted);
    assert!(report.failures.is_empty());
    assert_eq!(report.outcome, Outcome::Committed);
    let steps: Vec<_> = report.steps.iter().map(|s| (s.step, s.affected)).collect();
    assert_eq!(
        steps,
        vec![
            (CascadeStep::ResolveUnits, 2),
            (CascadeStep::Forms, 3),
            (CascadeStep::Collaborators, 5),
            (CascadeStep::Units, 2),
            (CascadeStep::Company, 1),
        ]
    );

    let counts = reconciler.store().counts().await;
    for collection in [
        Collection::Companies,
        Collection::Units,
        Collection::Collaborators,
        Collection::Forms,
    ] {
        assert_eq!(counts.get(&collection).copied().unwrap_or(0), 0, "{}", collection);
    }
    // shared reference data survives
    assert_eq!(rows(reconciler.store(), Collection::Sectors).await.len(), 1);
}

#[tokio::test]
async fn test_reversed_order_is_rejected_by_foreign_keys() {
    let reconciler = Reconciler::new(InMemoryStore::new());
    let saved = seed(&reconciler).await;
    let store = reconciler.store();
    let unit_ids: Vec<RowId> = saved.unit_ids.values().cloned().collect();

    let company = store.delete(Collection::Companies, &Filter::by_id(saved.company_id.as_ref().unwrap())).await;
    assert!(matches!(company, Err(StoreError::ConstraintViolation(_))));

    let units = store
        .delete(Collection::Units, &Filter::new().is_in("id", unit_ids.iter().cloned()))
        .await;
    assert!(matches!(units, Err(StoreError::ConstraintViolation(_))));

    assert_eq!(store.count(Collection::Companies).await, 1);
    assert_eq!(store.count(Collection::Units).await, 2);
    assert_eq!(store.count(Collection::Collaborators).await, 5);
    assert_eq!(store.count(Collection::Forms).await, 3);
}

#[tokio::test]
async fn test_missing_company_fails_verification() {
    let reconciler = Reconciler::new(InMemoryStore::new());

    let report = reconciler.cascade_delete(&RowId::Seq(77)).await.unwrap();

    assert!(!report.deleted);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, FailureKind::CascadeVerification);
    assert!(report.failures[0].reason.contains("not found or not authorized"));
    assert_eq!(report.outcome, Outcome::RolledBack);
}

#[tokio::test]
async fn test_owner_scoping_on_delete() {
    let reconciler = Reconciler::new(InMemoryStore::new());
    let saved = seed(&reconciler).await;

    let refused = reconciler
        .cascade_delete_owned(saved.company_id.as_ref().unwrap(), "intruder")
        .await
        .unwrap();
    assert!(!refused.deleted);
    assert_eq!(refused.failures[0].kind, FailureKind::CascadeVerification);
    assert!(row(reconciler.store(), Collection::Companies, saved.company_id.as_ref().unwrap()).await.is_some());
    assert_eq!(reconciler.store().count(Collection::Forms).await, 3);

    let accepted = reconciler
        .cascade_delete_owned(saved.company_id.as_ref().unwrap(), "owner-1")
        .await
        .unwrap();
    assert!(accepted.deleted);
    assert!(row(reconciler.store(), Collection::Companies, saved.company_id.as_ref().unwrap()).await.is_none());
}

#[tokio::test]
async fn test_failed_form_step_leaves_partial_result_in_best_effort() {
    let store = FaultInjectingStore::new().fail(Op::Delete, Collection::Forms);
    let config = ReconcileConfig::new().transaction_mode(TransactionMode::BestEffort);
    let reconciler = Reconciler::with_config(store, config).unwrap();
    let saved = seed(&reconciler).await;

    let report = reconciler.cascade_delete(saved.company_id.as_ref().unwrap()).await.unwrap();

    assert!(!report.deleted);
    assert_eq!(report.outcome, Outcome::BestEffort);
    assert!(!report.step(CascadeStep::Forms).unwrap().succeeded());
    assert!(report.step(CascadeStep::Collaborators).unwrap().succeeded());
    assert!(!report.step(CascadeStep::Units).unwrap().succeeded());
    assert!(!report.step(CascadeStep::Company).unwrap().succeeded());

    let inner = reconciler.store().inner();
    assert_eq!(inner.count(Collection::Collaborators).await, 0);
    assert_eq!(inner.count(Collection::Units).await, 2);
    assert_eq!(inner.count(Collection::Companies).await, 1);
}

#[tokio::test]
async fn test_failed_form_step_rolls_back_in_atomic_mode() {
    let store = FaultInjectingStore::new().fail(Op::Delete, Collection::Forms);
    let config = ReconcileConfig::new().transaction_mode(TransactionMode::Atomic);
    let reconciler = Reconciler::with_config(store, config).unwrap();
    let saved = seed(&reconciler).await;

    let report = reconciler.cascade_delete(saved.company_id.as_ref().unwrap()).await.unwrap();

    assert!(!report.deleted);
    assert_eq!(report.outcome, Outcome::RolledBack);
    let inner = reconciler.store().inner();
    assert_eq!(inner.count(Collection::Collaborators).await, 5);
    assert_eq!(inner.count(Collection::Forms).await, 3);
    assert!(!inner.in_transaction().await);
}
