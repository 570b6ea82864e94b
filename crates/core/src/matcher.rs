//! Natural-key matching.
//!
//! The descriptor of each entity family turns a normalized record into a
//! [`MatchQuery`]; the storage layer executes it (including soft-deleted
//! rows for families that support them) and returns at most one
//! [`ExistingEntity`]. [`MatchQuery::matches`] defines the semantics every
//! store must reproduce.

use serde::Serialize;

use crate::entity::EntityKind;
use crate::record::{FieldMap, FieldValue, NormalizedRecord};
use crate::types::DbId;

/// How one clause compares the stored value with the incoming one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Exact,
    /// Text compared after lower-casing both sides.
    CaseInsensitive,
    /// Timestamps compared by UTC calendar date.
    SameDay,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchClause {
    pub field: &'static str,
    pub value: FieldValue,
    pub comparison: Comparison,
}

impl MatchClause {
    pub fn exact(field: &'static str, value: FieldValue) -> Self {
        Self {
            field,
            value,
            comparison: Comparison::Exact,
        }
    }

    pub fn case_insensitive(field: &'static str, value: FieldValue) -> Self {
        Self {
            field,
            value,
            comparison: Comparison::CaseInsensitive,
        }
    }

    pub fn same_day(field: &'static str, value: FieldValue) -> Self {
        Self {
            field,
            value,
            comparison: Comparison::SameDay,
        }
    }

    /// Evaluate this clause against a stored row.
    pub fn matches(&self, stored: &FieldMap) -> bool {
        let Some(existing) = stored.get(self.field) else {
            return false;
        };
        match self.comparison {
            Comparison::Exact => existing == &self.value,
            Comparison::CaseInsensitive => match (existing.as_str(), self.value.as_str()) {
                (Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
                _ => existing == &self.value,
            },
            Comparison::SameDay => match (existing.as_timestamp(), self.value.as_timestamp()) {
                (Some(a), Some(b)) => a.date_naive() == b.date_naive(),
                _ => false,
            },
        }
    }
}

/// Whether all clauses or any clause must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    All,
    Any,
}

/// A natural-key lookup. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchQuery {
    pub combinator: Combinator,
    pub clauses: Vec<MatchClause>,
}

impl MatchQuery {
    /// All clauses must hold. `None` when `clauses` is empty.
    pub fn all(clauses: Vec<MatchClause>) -> Option<Self> {
        Self::build(Combinator::All, clauses)
    }

    /// Any clause may hold. `None` when `clauses` is empty.
    pub fn any(clauses: Vec<MatchClause>) -> Option<Self> {
        Self::build(Combinator::Any, clauses)
    }

    fn build(combinator: Combinator, clauses: Vec<MatchClause>) -> Option<Self> {
        if clauses.is_empty() {
            None
        } else {
            Some(Self {
                combinator,
                clauses,
            })
        }
    }

    pub fn matches(&self, stored: &FieldMap) -> bool {
        match self.combinator {
            Combinator::All => self.clauses.iter().all(|c| c.matches(stored)),
            Combinator::Any => self.clauses.iter().any(|c| c.matches(stored)),
        }
    }
}

/// A stored row found by the matcher.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExistingEntity {
    pub id: DbId,
    pub is_soft_deleted: bool,
    /// Current stored values, used by merge to find empty fields.
    pub fields: FieldMap,
}

/// Outcome of a natural-key lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    NotFound,
    Found(ExistingEntity),
}

impl MatchResult {
    pub fn found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn existing(&self) -> Option<&ExistingEntity> {
        match self {
            Self::Found(e) => Some(e),
            Self::NotFound => None,
        }
    }
}

impl From<Option<ExistingEntity>> for MatchResult {
    fn from(value: Option<ExistingEntity>) -> Self {
        value.map_or(Self::NotFound, Self::Found)
    }
}

/// The natural-key query for `record` under `kind`'s strategy.
pub fn match_query(kind: EntityKind, record: &NormalizedRecord) -> Option<MatchQuery> {
    kind.descriptor().natural_key(record)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    fn stored(pairs: &[(&'static str, FieldValue)]) -> FieldMap {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn case_insensitive_clause_ignores_case() {
        let clause = MatchClause::case_insensitive("email", text("Jane@Acme.com"));
        assert!(clause.matches(&stored(&[("email", text("jane@acme.com"))])));
        assert!(!clause.matches(&stored(&[("email", text("john@acme.com"))])));
        assert!(!clause.matches(&stored(&[])));
    }

    #[test]
    fn same_day_clause_ignores_time_of_day() {
        let morning = chrono::Utc.with_ymd_and_hms(2026, 3, 4, 8, 0, 0).unwrap();
        let evening = chrono::Utc.with_ymd_and_hms(2026, 3, 4, 21, 30, 0).unwrap();
        let next_day = chrono::Utc.with_ymd_and_hms(2026, 3, 5, 0, 0, 1).unwrap();

        let clause = MatchClause::same_day("interaction_date", FieldValue::Timestamp(morning));
        assert!(clause.matches(&stored(&[("interaction_date", FieldValue::Timestamp(evening))])));
        assert!(!clause.matches(&stored(&[("interaction_date", FieldValue::Timestamp(next_day))])));
    }

    #[test]
    fn any_combinator_needs_one_clause() {
        let query = MatchQuery::any(vec![
            MatchClause::case_insensitive("name", text("Acme")),
            MatchClause::case_insensitive("email", text("info@acme.com")),
        ])
        .unwrap();

        assert!(query.matches(&stored(&[("name", text("Other")), ("email", text("INFO@acme.com"))])));
        assert!(!query.matches(&stored(&[("name", text("Other"))])));
    }

    #[test]
    fn all_combinator_needs_every_clause() {
        let query = MatchQuery::all(vec![
            MatchClause::exact("first_name", text("Jane")),
            MatchClause::exact("organization_id", FieldValue::Reference(4)),
        ])
        .unwrap();

        assert!(query.matches(&stored(&[
            ("first_name", text("Jane")),
            ("organization_id", FieldValue::Reference(4)),
        ])));
        assert!(!query.matches(&stored(&[
            ("first_name", text("Jane")),
            ("organization_id", FieldValue::Reference(5)),
        ])));
    }

    #[test]
    fn empty_clause_list_builds_no_query() {
        assert!(MatchQuery::all(vec![]).is_none());
        assert!(MatchQuery::any(vec![]).is_none());
    }
}
