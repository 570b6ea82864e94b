//! Label lookups for the two reference targets.

use std::collections::HashMap;

use galley_core::entity::ReferenceKind;
use galley_core::types::DbId;
use sqlx::PgConnection;

/// SQL expression producing a row's display label.
fn label_expr(kind: ReferenceKind) -> &'static str {
    match kind {
        ReferenceKind::Organization => "name",
        ReferenceKind::Contact => "first_name || ' ' || last_name",
    }
}

fn table(kind: ReferenceKind) -> &'static str {
    match kind {
        ReferenceKind::Organization => "organizations",
        ReferenceKind::Contact => "contacts",
    }
}

/// Resolves human-readable labels to ids and back.
pub struct ReferenceRepo;

impl ReferenceRepo {
    /// The row whose label equals `label`, ignoring case. Live rows are
    /// preferred; a soft-deleted row is returned only when no live one has
    /// the label.
    pub async fn find_by_label(
        conn: &mut PgConnection,
        kind: ReferenceKind,
        label: &str,
    ) -> Result<Option<DbId>, sqlx::Error> {
        let query = format!(
            "SELECT id FROM {} \
             WHERE LOWER({}) = LOWER($1) \
             ORDER BY (deleted_at IS NOT NULL), id LIMIT 1",
            table(kind),
            label_expr(kind)
        );
        sqlx::query_scalar::<_, DbId>(&query)
            .bind(label.trim())
            .fetch_optional(&mut *conn)
            .await
    }

    /// Labels for `ids`, soft-deleted rows included. Unknown ids are left out.
    pub async fn labels(
        conn: &mut PgConnection,
        kind: ReferenceKind,
        ids: &[DbId],
    ) -> Result<HashMap<DbId, String>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let query = format!(
            "SELECT id, {} AS label FROM {} WHERE id = ANY($1)",
            label_expr(kind),
            table(kind)
        );
        let rows = sqlx::query_as::<_, (DbId, String)>(&query)
            .bind(ids)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.into_iter().collect())
    }
}
