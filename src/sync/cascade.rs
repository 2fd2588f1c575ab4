//! FK-safe deletion: forms and collaborators before units, units before
//! the company row.

use tracing::{Level, event};

use crate::core::{Collection, Result, RowId};
use crate::report::{CascadeStep, EntityKind, Failure, RunLog, StepOutcome};
use crate::storage::{EntityStore, Filter};

pub struct CascadePlanner<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: EntityStore + ?Sized> CascadePlanner<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Delete one unit with its forms and collaborators.
    ///
    /// Dependent failures are recorded and do not stop the attempt on the
    /// unit row; if that row survives, `false` is returned.
    pub async fn delete_unit(&self, unit_id: &RowId, log: &mut RunLog) -> bool {
        let label = unit_id.to_string();
        let by_unit = Filter::new().eq("unit_id", unit_id);

        for (collection, entity) in [
            (Collection::Forms, EntityKind::Form),
            (Collection::Collaborators, EntityKind::Collaborator),
        ] {
            match self.store.delete(collection, &by_unit).await {
                Ok(count) => log.deleted(entity, count),
                Err(err) => log.fail(Failure::partial(
                    entity,
                    &label,
                    format!("deleting dependents of unit {} failed: {}", unit_id, err),
                )),
            }
        }

        match self.store.delete(Collection::Units, &Filter::by_id(unit_id)).await {
            Ok(0) => {
                log.fail(Failure::cascade(EntityKind::Unit, &label, "unit row was not found"));
                false
            }
            Ok(count) => {
                log.deleted(EntityKind::Unit, count);
                event!(Level::DEBUG, unit_id = %unit_id, "unit deleted");
                true
            }
            Err(err) => {
                log.fail(Failure::partial(EntityKind::Unit, &label, err));
                false
            }
        }
    }

    /// Delete a company and everything hanging off its `org_key`.
    ///
    /// With `owner` set, both the lookup and the final delete are scoped to
    /// that owner. Returns whether the company row is gone, plus per-step
    /// outcomes.
    pub async fn delete_company(
        &self,
        company_id: &RowId,
        owner: Option<&str>,
        log: &mut RunLog,
    ) -> (bool, Vec<StepOutcome>) {
        let label = company_id.to_string();
        let mut scope = Filter::by_id(company_id);
        if let Some(owner) = owner {
            scope = scope.eq("owner_id", owner);
        }

        let mut steps = Vec::new();

        let company = match self.store.find_one(Collection::Companies, &scope).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                log.fail(Failure::cascade(
                    EntityKind::Company,
                    &label,
                    "not found or not authorized",
                ));
                steps.push(outcome(CascadeStep::ResolveUnits, Ok(0)));
                return (false, steps);
            }
            Err(err) => {
                log.fail(Failure::partial(EntityKind::Company, &label, &err));
                steps.push(outcome(CascadeStep::ResolveUnits, Err(err)));
                return (false, steps);
            }
        };

        let unit_ids: Vec<RowId> = match company.text("org_key") {
            Some(org_key) => {
                let listed = self
                    .store
                    .find_many(Collection::Units, &Filter::new().eq("org_key", org_key))
                    .await;
                match listed {
                    Ok(units) => {
                        steps.push(outcome(CascadeStep::ResolveUnits, Ok(units.len() as u64)));
                        units.into_iter().map(|u| u.id).collect()
                    }
                    Err(err) => {
                        log.fail(Failure::partial(EntityKind::Unit, &label, &err));
                        steps.push(outcome(CascadeStep::ResolveUnits, Err(err)));
                        Vec::new()
                    }
                }
            }
            None => {
                steps.push(outcome(CascadeStep::ResolveUnits, Ok(0)));
                Vec::new()
            }
        };

        let dependents = [
            (CascadeStep::Forms, Collection::Forms, EntityKind::Form, "unit_id"),
            (CascadeStep::Collaborators, Collection::Collaborators, EntityKind::Collaborator, "unit_id"),
            (CascadeStep::Units, Collection::Units, EntityKind::Unit, "id"),
        ];
        for (step, collection, entity, column) in dependents {
            let filter = Filter::new().is_in(column, unit_ids.iter().cloned());
            let result = self.store.delete(collection, &filter).await;
            match &result {
                Ok(count) => log.deleted(entity, *count),
                Err(err) => log.fail(Failure::partial(entity, &label, err)),
            }
            steps.push(outcome(step, result));
        }

        let result = self.store.delete(Collection::Companies, &scope).await;
        let deleted = match &result {
            Ok(0) => {
                log.fail(Failure::cascade(
                    EntityKind::Company,
                    &label,
                    "not found or not authorized",
                ));
                false
            }
            Ok(count) => {
                log.deleted(EntityKind::Company, *count);
                true
            }
            Err(err) => {
                log.fail(Failure::partial(EntityKind::Company, &label, err));
                false
            }
        };
        steps.push(outcome(CascadeStep::Company, result));

        event!(Level::INFO, company_id = %company_id, deleted, units = unit_ids.len(), "company cascade finished");
        (deleted, steps)
    }
}

fn outcome(step: CascadeStep, result: Result<u64>) -> StepOutcome {
    match result {
        Ok(affected) => StepOutcome {
            step,
            affected,
            error: None,
        },
        Err(err) => StepOutcome {
            step,
            affected: 0,
            error: Some(err.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Fields, Value};
    use crate::storage::InMemoryStore;

    async fn seed_unit(store: &InMemoryStore) -> RowId {
        let mut company = Fields::new();
        company.insert("org_key".into(), Value::from("org-1"));
        store.insert(Collection::Companies, company).await.unwrap();

        let mut unit = Fields::new();
        unit.insert("org_key".into(), Value::from("org-1"));
        let unit = store.insert(Collection::Units, unit).await.unwrap();

        for _ in 0..2 {
            let mut dep = Fields::new();
            dep.insert("unit_id".into(), Value::from(&unit.id));
            store.insert(Collection::Forms, dep.clone()).await.unwrap();
            store.insert(Collection::Collaborators, dep).await.unwrap();
        }
        unit.id
    }

    #[tokio::test]
    async fn test_delete_unit_removes_dependents_first() {
        let store = InMemoryStore::new();
        let unit_id = seed_unit(&store).await;
        let mut log = RunLog::new();

        assert!(CascadePlanner::new(&store).delete_unit(&unit_id, &mut log).await);

        assert_eq!(store.count(Collection::Units).await, 0);
        assert_eq!(store.count(Collection::Forms).await, 0);
        assert_eq!(store.count(Collection::Collaborators).await, 0);
        assert_eq!(log.changes()[&EntityKind::Form].deleted, 2);
        assert!(log.failures().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_unit_is_a_verification_failure() {
        let store = InMemoryStore::new();
        let mut log = RunLog::new();

        assert!(!CascadePlanner::new(&store).delete_unit(&RowId::Seq(9), &mut log).await);
        assert_eq!(log.failures().len(), 1);
        assert_eq!(log.failures()[0].kind, crate::report::FailureKind::CascadeVerification);
    }
}
