use thiserror::Error;
use tsmeta_catalog::CatalogError;
use tsmeta_core::CoreError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] std::io::Error),
}
