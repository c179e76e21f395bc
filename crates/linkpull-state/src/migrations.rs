//! SurrealDB schema initialization for the relation store

use crate::error::StateError;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize the `link_pull` table.
///
/// Safe to call on every connection (all definitions are `IF NOT EXISTS`).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing linkpull SurrealDB schema");
    init_link_pull_table(db).await?;
    info!("linkpull schema initialization complete");
    Ok(())
}

/// Initialize `link_pull` with both-side indexes.
///
/// Schema:
/// ```text
/// TABLE link_pull {
///   source_repo:    STRING
///   source_pr:      INT
///   source_key:     STRING (indexed, "repo#pr")
///   link_repo:      STRING
///   link_pr:        INT
///   link_key:       STRING (indexed, "repo#pr")
///   source_pr_tag:  STRING?
///   link_pr_tag:    STRING?
///   link_date:      DATETIME
/// }
/// ```
///
/// Constraints:
/// - `(source_key, link_key)` is unique; the reverse direction is caught by
///   the store's check-then-insert
/// - no self-links (enforced via app logic)
async fn init_link_pull_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing link_pull table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS link_pull SCHEMAFULL;

        DEFINE FIELD IF NOT EXISTS source_repo ON link_pull TYPE string;
        DEFINE FIELD IF NOT EXISTS source_pr ON link_pull TYPE int;
        DEFINE FIELD IF NOT EXISTS source_key ON link_pull TYPE string;
        DEFINE FIELD IF NOT EXISTS link_repo ON link_pull TYPE string;
        DEFINE FIELD IF NOT EXISTS link_pr ON link_pull TYPE int;
        DEFINE FIELD IF NOT EXISTS link_key ON link_pull TYPE string;
        DEFINE FIELD IF NOT EXISTS source_pr_tag ON link_pull TYPE option<string>;
        DEFINE FIELD IF NOT EXISTS link_pr_tag ON link_pull TYPE option<string>;
        DEFINE FIELD IF NOT EXISTS link_date ON link_pull TYPE datetime;

        DEFINE INDEX IF NOT EXISTS idx_link_pair ON TABLE link_pull COLUMNS source_key, link_key UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_link_source ON TABLE link_pull COLUMNS source_key;
        DEFINE INDEX IF NOT EXISTS idx_link_target ON TABLE link_pull COLUMNS link_key;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?
        .check()
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;

    debug!("link_pull table initialized");
    Ok(())
}
