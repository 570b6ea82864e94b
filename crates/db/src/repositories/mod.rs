//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&mut PgConnection` as the first argument, so they run inside
//! whatever transaction the caller holds.

pub mod record_repo;
pub mod reference_repo;

pub use record_repo::RecordRepo;
pub use reference_repo::ReferenceRepo;
