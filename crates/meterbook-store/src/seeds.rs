//! Built-in starter queries

use meterbook_common::{Result, Validity};
use sqlx::PgConnection;
use tracing::{info, instrument};

use crate::models::{create_query, NewQuery};

/// Definition of a built-in query
#[derive(Debug, Clone, Copy)]
pub struct DefaultQuery {
    pub name: &'static str,
    pub description: &'static str,
    pub query: &'static str,
    pub unit: &'static str,
}

pub const DEFAULT_QUERIES: [DefaultQuery; 3] = [
    DefaultQuery {
        name: "appuio_cloud_memory",
        description: "Memory usage (maximum of requested and used memory) aggregated by namespace",
        query: include_str!("../seeds/appuio_cloud_memory.promql"),
        unit: "MiB",
    },
    DefaultQuery {
        name: "appuio_cloud_loadbalancer",
        description: "Number of services of type load balancer",
        query: include_str!("../seeds/appuio_cloud_loadbalancer.promql"),
        unit: "",
    },
    DefaultQuery {
        name: "appuio_cloud_persistent_storage",
        description: "Persistent storage usage aggregated by namespace and storageclass",
        query: include_str!("../seeds/appuio_cloud_persistent_storage.promql"),
        unit: "GiB",
    },
];

/// Insert the default queries with unbounded validity, skipping any name that
/// already exists. Returns the names created.
#[instrument(skip(conn))]
pub async fn seed(conn: &mut PgConnection) -> Result<Vec<&'static str>> {
    let mut created = Vec::new();
    for q in DEFAULT_QUERIES {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM queries WHERE name = $1)")
                .bind(q.name)
                .fetch_one(&mut *conn)
                .await?;
        if exists {
            info!(name = q.name, "Query exists, skipping default");
            continue;
        }

        create_query(
            conn,
            &NewQuery {
                parent_id: None,
                name: q.name.to_string(),
                description: q.description.to_string(),
                query: q.query.to_string(),
                unit: q.unit.to_string(),
                during: Validity::unbounded(),
            },
        )
        .await?;
        created.push(q.name);
    }
    info!(created = created.len(), "Seeded default queries");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_queries_emit_required_labels() {
        for q in DEFAULT_QUERIES {
            assert!(!q.query.trim().is_empty(), "{} has no query text", q.name);
            for label in ["\"category\"", "\"tenant\"", "\"product\""] {
                assert!(q.query.contains(label), "{} lacks {label}", q.name);
            }
            assert!(q.query.contains(q.name));
        }
    }
}
