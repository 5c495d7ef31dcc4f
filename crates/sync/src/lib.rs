pub mod error;
pub mod reconciler;
pub mod store;

pub use error::SyncError;
pub use reconciler::{CycleOutcome, CycleStats, Reconciler, ReconcilerHandle, SyncConfig};
pub use store::{Completer, Completion, StoreFault, StoreResult, TsdbStore};
