//! Metric samples returned by the metrics source

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Label holding the category (`zone:namespace`) of a sample
pub const CATEGORY_LABEL: &str = "category";
/// Label holding the tenant (organization) of a sample
pub const TENANT_LABEL: &str = "tenant";
/// Label holding the source key of a sample
pub const PRODUCT_LABEL: &str = "product";

/// One labelled sample of an instant vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

impl Sample {
    pub fn new(labels: BTreeMap<String, String>, value: f64) -> Self {
        Self { labels, value }
    }

    /// Build a sample carrying the three labels ingestion needs
    pub fn with_dimensions(category: &str, tenant: &str, product: &str, value: f64) -> Self {
        let labels = BTreeMap::from([
            (CATEGORY_LABEL.to_string(), category.to_string()),
            (TENANT_LABEL.to_string(), tenant.to_string()),
            (PRODUCT_LABEL.to_string(), product.to_string()),
        ]);
        Self { labels, value }
    }

    /// Value of a required label
    pub fn label(&self, name: &str) -> Result<&str, ValidationError> {
        self.labels
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| ValidationError::MissingLabel(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_lookup() {
        let sample = Sample::with_dimensions("c:ns", "acme", "q:c:acme:ns", 42.0);
        assert_eq!(sample.label(TENANT_LABEL).unwrap(), "acme");
        assert!(matches!(
            sample.label("missing"),
            Err(ValidationError::MissingLabel(name)) if name == "missing"
        ));
    }
}
