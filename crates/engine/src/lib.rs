//! Import reconciliation engine: the async half.
//!
//! Wraps the pure pipeline in `galley-core` with a storage seam
//! ([`store`]), reference resolution, the batch transaction controller and
//! the [`ImportService`] entry point.

pub mod batch;
pub mod references;
pub mod service;
pub mod sinks;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use service::{
    ExportError, ExportFile, ImportError, ImportReport, ImportRequest, ImportService,
    DEFAULT_MAX_BYTES,
};
pub use sinks::{AuditSink, NotificationSink, TracingAuditSink, TracingNotifier};
pub use store::{ImportStore, ImportTransaction, StoreError, StoreResult};
