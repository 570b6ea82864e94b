//! Descriptor-driven access to the four importable tables.
//!
//! Column names are taken only from the entity descriptor's declared
//! fields and are safe to interpolate; every value is bound.

use chrono::{DateTime, Utc};
use galley_core::entity::{EntityKind, FieldDef, FieldKind};
use galley_core::export::{date_column, ExportFilters, ExportRow};
use galley_core::matcher::{Combinator, Comparison, ExistingEntity, MatchQuery};
use galley_core::record::{FieldMap, FieldValue};
use galley_core::types::{DbId, Timestamp};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Postgres, QueryBuilder, Row};

/// Generic CRUD over an entity family's table.
pub struct RecordRepo;

impl RecordRepo {
    /// The first row satisfying `query`, soft-deleted rows included. Live rows
    /// are preferred, then the lowest id.
    pub async fn find_match(
        conn: &mut PgConnection,
        kind: EntityKind,
        query: &MatchQuery,
    ) -> Result<Option<ExistingEntity>, sqlx::Error> {
        let mut qb = select(kind);
        qb.push(" WHERE (");
        let joiner = match query.combinator {
            Combinator::All => " AND ",
            Combinator::Any => " OR ",
        };
        for (i, clause) in query.clauses.iter().enumerate() {
            if i > 0 {
                qb.push(joiner);
            }
            let column = declared_column(kind, clause.field)?;
            match clause.comparison {
                Comparison::Exact => {
                    qb.push(column).push(" = ");
                    push_value(&mut qb, &clause.value);
                }
                Comparison::CaseInsensitive => {
                    qb.push("LOWER(").push(column).push(") = LOWER(");
                    push_value(&mut qb, &clause.value);
                    qb.push(")");
                }
                Comparison::SameDay => {
                    qb.push("(")
                        .push(column)
                        .push(" AT TIME ZONE 'UTC')::date = (");
                    push_value(&mut qb, &clause.value);
                    qb.push(" AT TIME ZONE 'UTC')::date");
                }
            }
        }
        // Live rows win over soft-deleted ones; only live rows are unique.
        if kind.descriptor().soft_deletes() {
            qb.push(") ORDER BY (deleted_at IS NOT NULL), id LIMIT 1");
        } else {
            qb.push(") ORDER BY id LIMIT 1");
        }

        let row = qb.build().fetch_optional(&mut *conn).await?;
        row.map(|row| {
            let stored = decode(kind, &row)?;
            Ok(ExistingEntity {
                id: stored.id,
                is_soft_deleted: stored.deleted_at.is_some(),
                fields: stored.fields,
            })
        })
        .transpose()
    }

    /// Insert a row, returning its id. Absent fields take column defaults.
    pub async fn insert(
        conn: &mut PgConnection,
        kind: EntityKind,
        fields: &FieldMap,
    ) -> Result<DbId, sqlx::Error> {
        let columns = declared_columns(kind, fields)?;

        let mut qb = QueryBuilder::<Postgres>::new("INSERT INTO ");
        qb.push(kind.plural()).push(" (");
        {
            let mut names = qb.separated(", ");
            for (column, _) in &columns {
                names.push(*column);
            }
        }
        qb.push(") VALUES (");
        for (i, (_, value)) in columns.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            push_value(&mut qb, value);
        }
        qb.push(") RETURNING id");

        qb.build_query_scalar::<DbId>().fetch_one(&mut *conn).await
    }

    /// Write `fields` over row `id` and bump `updated_at`.
    pub async fn update(
        conn: &mut PgConnection,
        kind: EntityKind,
        id: DbId,
        fields: &FieldMap,
    ) -> Result<(), sqlx::Error> {
        let columns = declared_columns(kind, fields)?;

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE ");
        qb.push(kind.plural()).push(" SET ");
        for (column, value) in &columns {
            qb.push(*column).push(" = ");
            push_value(&mut qb, value);
            qb.push(", ");
        }
        qb.push("updated_at = NOW() WHERE id = ").push_bind(id);

        let result = qb.build().execute(&mut *conn).await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }

    /// Mark a row deleted at `at`.
    pub async fn soft_delete(
        conn: &mut PgConnection,
        kind: EntityKind,
        id: DbId,
        at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        let query = format!(
            "UPDATE {} SET deleted_at = $2, updated_at = NOW() WHERE id = $1",
            soft_deletable_table(kind)?
        );
        sqlx::query(&query)
            .bind(id)
            .bind(at)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Clear a row's soft-delete marker.
    pub async fn restore(
        conn: &mut PgConnection,
        kind: EntityKind,
        id: DbId,
    ) -> Result<(), sqlx::Error> {
        let query = format!(
            "UPDATE {} SET deleted_at = NULL, updated_at = NOW() WHERE id = $1",
            soft_deletable_table(kind)?
        );
        sqlx::query(&query).bind(id).execute(&mut *conn).await?;
        Ok(())
    }

    /// Rows admitted by `filters`, ordered by id. Must agree with
    /// [`ExportFilters::admits`].
    pub async fn list(
        conn: &mut PgConnection,
        kind: EntityKind,
        filters: &ExportFilters,
    ) -> Result<Vec<ExportRow>, sqlx::Error> {
        let mut qb = select(kind);
        qb.push(" WHERE TRUE");

        if kind.descriptor().soft_deletes() && !filters.include_deleted {
            qb.push(" AND deleted_at IS NULL");
        }
        if let Some(org) = filters.organization_id {
            match kind {
                EntityKind::Organization => {
                    qb.push(" AND id = ").push_bind(org);
                }
                EntityKind::Contact | EntityKind::Interaction => {
                    qb.push(" AND organization_id = ").push_bind(org);
                }
                EntityKind::Setting => {}
            }
        }
        if let (EntityKind::Setting, Some(category)) = (kind, &filters.category) {
            qb.push(" AND category = ").push_bind(category.clone());
        }
        let date = date_column(kind);
        if let Some(from) = filters.from {
            qb.push(" AND ").push(date).push(" >= ").push_bind(from);
        }
        if let Some(to) = filters.to {
            qb.push(" AND ").push(date).push(" <= ").push_bind(to);
        }
        qb.push(" ORDER BY id");

        let rows = qb.build().fetch_all(&mut *conn).await?;
        rows.iter().map(|row| decode(kind, row)).collect()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `SELECT id, <fields>, created_at, deleted_at FROM <table>`.
fn select(kind: EntityKind) -> QueryBuilder<'static, Postgres> {
    let descriptor = kind.descriptor();
    let columns: Vec<&str> = descriptor.fields().iter().map(|f| f.name).collect();
    let deleted_at = if descriptor.soft_deletes() {
        "deleted_at"
    } else {
        "NULL::timestamptz AS deleted_at"
    };
    QueryBuilder::new(format!(
        "SELECT id, {}, created_at, {deleted_at} FROM {}",
        columns.join(", "),
        kind.plural()
    ))
}

fn declared_column(kind: EntityKind, name: &str) -> Result<&'static str, sqlx::Error> {
    kind.descriptor()
        .field(name)
        .map(|def| def.name)
        .ok_or_else(|| sqlx::Error::ColumnNotFound(format!("{}.{name}", kind.plural())))
}

fn declared_columns<'a>(
    kind: EntityKind,
    fields: &'a FieldMap,
) -> Result<Vec<(&'static str, &'a FieldValue)>, sqlx::Error> {
    fields
        .iter()
        .map(|(name, value)| Ok((declared_column(kind, name)?, value)))
        .collect()
}

fn soft_deletable_table(kind: EntityKind) -> Result<&'static str, sqlx::Error> {
    if kind.descriptor().soft_deletes() {
        Ok(kind.plural())
    } else {
        Err(sqlx::Error::ColumnNotFound(format!("{}.deleted_at", kind.plural())))
    }
}

fn push_value(qb: &mut QueryBuilder<'_, Postgres>, value: &FieldValue) {
    match value {
        FieldValue::Text(s) | FieldValue::Enum(s) => qb.push_bind(s.clone()),
        FieldValue::Integer(i) | FieldValue::Reference(i) => qb.push_bind(*i),
        FieldValue::Bool(b) => qb.push_bind(*b),
        FieldValue::Timestamp(ts) => qb.push_bind(*ts),
    };
}

/// A row with its fields decoded per the descriptor. NULL columns are left
/// out of the field map.
fn decode(kind: EntityKind, row: &PgRow) -> Result<ExportRow, sqlx::Error> {
    let mut fields = FieldMap::new();
    for def in kind.descriptor().fields() {
        if let Some(value) = decode_field(def, row)? {
            fields.insert(def.name, value);
        }
    }
    Ok(ExportRow {
        id: row.try_get("id")?,
        fields,
        created_at: row.try_get("created_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn decode_field(def: &FieldDef, row: &PgRow) -> Result<Option<FieldValue>, sqlx::Error> {
    let name = def.name;
    Ok(match def.kind {
        FieldKind::Text | FieldKind::Email | FieldKind::AllowList(_) => row
            .try_get::<Option<String>, _>(name)?
            .filter(|s| !s.trim().is_empty())
            .map(FieldValue::Text),
        FieldKind::Enum { .. } => row
            .try_get::<Option<String>, _>(name)?
            .filter(|s| !s.trim().is_empty())
            .map(FieldValue::Enum),
        FieldKind::Integer => row.try_get::<Option<i64>, _>(name)?.map(FieldValue::Integer),
        FieldKind::Boolean => row.try_get::<Option<bool>, _>(name)?.map(FieldValue::Bool),
        FieldKind::Timestamp => row
            .try_get::<Option<DateTime<Utc>>, _>(name)?
            .map(FieldValue::Timestamp),
        FieldKind::Reference(_) => row
            .try_get::<Option<DbId>, _>(name)?
            .map(FieldValue::Reference),
    })
}
