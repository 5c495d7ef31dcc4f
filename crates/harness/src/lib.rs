pub mod fixtures;
pub mod store;

pub use fixtures::TestCatalog;
pub use store::{RecordingStore, StoreBehavior, StoreOp, StoreOpKind};
