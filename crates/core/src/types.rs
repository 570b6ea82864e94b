use serde::{Deserialize, Serialize};

/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// The identity an import or export runs on behalf of.
///
/// Resolved by the caller (session, header, or configured default) and
/// passed explicitly; nothing in the engine reads ambient auth state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Option<DbId>,
    pub name: String,
}

impl Actor {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }

    /// The fallback identity for unattended runs.
    pub fn system() -> Self {
        Self::named("system")
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.id {
            Some(id) => write!(f, "{} (#{id})", self.name),
            None => f.write_str(&self.name),
        }
    }
}
