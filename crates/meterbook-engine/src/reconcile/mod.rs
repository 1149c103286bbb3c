//! Category reconciliation with an external ERP
//!
//! Every stored category is offered to the reconciler, whether or not it
//! already has a target. Only categories whose target changed are written,
//! each in its own transaction, after the category list was read in a
//! separate one. A reconciler error stops the loop; earlier updates stay.

use std::future::Future;

use async_trait::async_trait;
use meterbook_common::{MeterbookError, Result};
use meterbook_store::dimension::{list_categories, update_category_target};
use meterbook_store::{Category, Store};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Category identifiers exchanged with the ERP
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CategoryMapping {
    /// `zone:namespace`
    pub source: String,
    /// ERP identifier, empty when unknown
    pub target: String,
}

/// ERP side of the category sync
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CategoryReconciler: Send + Sync {
    /// Ensure the category exists in the ERP and return its current mapping
    async fn reconcile(&self, category: CategoryMapping) -> anyhow::Result<CategoryMapping>;
}

/// Outcome of a reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileSummary {
    pub total: usize,
    pub updated: usize,
}

/// Reconcile all stored categories
#[instrument(skip(store, reconciler))]
pub async fn reconcile_categories(
    store: &Store,
    reconciler: &dyn CategoryReconciler,
) -> Result<ReconcileSummary> {
    let categories = {
        let mut tx = store.begin_read_only().await?;
        let categories = list_categories(&mut *tx).await?;
        tx.commit().await?;
        categories
    };
    info!(count = categories.len(), "Reconciling categories");

    let summary = reconcile_each(categories, reconciler, |id, target| async move {
        let mut tx = store.begin().await?;
        update_category_target(&mut *tx, id, target.as_deref()).await?;
        tx.commit().await?;
        Ok(())
    })
    .await?;

    info!(total = summary.total, updated = summary.updated, "Done reconciling categories");
    Ok(summary)
}

async fn reconcile_each<F, Fut>(
    categories: Vec<Category>,
    reconciler: &dyn CategoryReconciler,
    mut persist: F,
) -> Result<ReconcileSummary>
where
    F: FnMut(Uuid, Option<String>) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut summary = ReconcileSummary {
        total: categories.len(),
        updated: 0,
    };

    for category in categories {
        let current = CategoryMapping {
            source: category.source.clone(),
            target: category.target.clone().unwrap_or_default(),
        };
        let reconciled = reconciler.reconcile(current).await.map_err(|e| {
            MeterbookError::Reconciler(format!("category '{}': {e:#}", category.source))
        })?;

        match changed_target(&category, &reconciled) {
            Some(target) => {
                persist(category.id, target.clone()).await?;
                summary.updated += 1;
                info!(source = %category.source, ?target, "Updated category");
            }
            None => debug!(source = %category.source, "Category is up to date"),
        }
    }
    Ok(summary)
}

/// New target to store, if it differs from the stored one
fn changed_target(category: &Category, reconciled: &CategoryMapping) -> Option<Option<String>> {
    let target = Some(reconciled.target.clone()).filter(|t| !t.is_empty());
    (target != category.target).then_some(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn category(source: &str, target: Option<&str>) -> Category {
        Category {
            id: Uuid::new_v4(),
            source: source.to_string(),
            target: target.map(str::to_string),
        }
    }

    #[test]
    fn test_changed_target() {
        let unset = category("c:a", None);
        let set = category("c:b", Some("erp-1"));
        let mapping = |target: &str| CategoryMapping {
            source: String::new(),
            target: target.to_string(),
        };

        assert_eq!(changed_target(&unset, &mapping("")), None);
        assert_eq!(changed_target(&unset, &mapping("erp-9")), Some(Some("erp-9".into())));
        assert_eq!(changed_target(&set, &mapping("erp-1")), None);
        assert_eq!(changed_target(&set, &mapping("erp-2")), Some(Some("erp-2".into())));
        assert_eq!(changed_target(&set, &mapping("")), Some(None));
    }

    #[tokio::test]
    async fn test_only_changed_categories_are_written() {
        let categories = vec![
            category("c:a", None),
            category("c:b", Some("erp-b")),
            category("c:c", Some("stale")),
        ];
        let expected_writes = vec![
            (categories[0].id, Some("erp-a".to_string())),
            (categories[2].id, Some("erp-c".to_string())),
        ];

        let mut reconciler = MockCategoryReconciler::new();
        reconciler.expect_reconcile().times(3).returning(|c| {
            let target = match c.source.as_str() {
                "c:a" => "erp-a",
                "c:b" => "erp-b",
                _ => "erp-c",
            };
            Ok(CategoryMapping {
                source: c.source,
                target: target.to_string(),
            })
        });

        let writes = Mutex::new(Vec::new());
        let summary = reconcile_each(categories, &reconciler, |id, target| {
            writes.lock().unwrap().push((id, target));
            async { Ok(()) }
        })
        .await
        .unwrap();

        assert_eq!(summary, ReconcileSummary { total: 3, updated: 2 });
        assert_eq!(*writes.lock().unwrap(), expected_writes);
    }

    #[tokio::test]
    async fn test_reconciler_error_stops_remaining() {
        let categories = vec![category("c:a", None), category("c:b", None), category("c:c", None)];

        let mut reconciler = MockCategoryReconciler::new();
        reconciler.expect_reconcile().times(2).returning(|c| {
            if c.source == "c:b" {
                anyhow::bail!("ERP unavailable");
            }
            Ok(CategoryMapping {
                target: format!("erp-{}", c.source),
                source: c.source,
            })
        });

        let writes = Mutex::new(0);
        let err = reconcile_each(categories, &reconciler, |_, _| {
            *writes.lock().unwrap() += 1;
            async { Ok(()) }
        })
        .await
        .unwrap_err();

        assert!(matches!(&err, MeterbookError::Reconciler(msg) if msg.contains("ERP unavailable")));
        assert_eq!(*writes.lock().unwrap(), 1);
    }
}
