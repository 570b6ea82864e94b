//! Pure import reconciliation logic: no I/O, no async.
//!
//! Payload bytes flow through [`format`] → [`normalize`] → [`matcher`] →
//! [`resolver`], with [`report`] summarizing the run and [`export`] doing
//! the reverse trip. Everything entity-specific lives behind
//! [`entity::EntityDescriptor`].

pub mod clock;
pub mod entity;
pub mod error;
pub mod export;
pub mod format;
pub mod matcher;
pub mod normalize;
pub mod policy;
pub mod record;
pub mod report;
pub mod resolver;
pub mod types;
