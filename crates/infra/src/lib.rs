//! Infrastructure layer: REST clients, mapping persistence, config, and the
//! services that run reconciliation passes.

pub mod config;
pub mod executor;
pub mod external;
pub mod fetch;
pub mod mapping_store;
pub mod memory;
pub mod reconciler;
pub mod trash;

use woosync_core::DomainError;

use crate::external::RemoteError;
use crate::mapping_store::StoreError;

pub use config::{ConfigError, SyncConfig};
pub use executor::{CancelToken, ExecutorConfig, SyncExecutor};
pub use fetch::{CatalogSnapshot, ErpCatalog, Storefront};
pub use mapping_store::{InMemoryMappingStore, JsonFileMappingStore, MappingStore};
pub use reconciler::{PreviewReport, ReconciliationService};
pub use trash::{EmptyTrashReport, TrashReconciler};

/// Remote system a pass depends on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Upstream {
    Erp,
    WooCommerce,
}

impl core::fmt::Display for Upstream {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Erp => "ERPNext",
            Self::WooCommerce => "WooCommerce",
        })
    }
}

/// Failure of a whole pass. Per-item failures never surface here.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("{upstream} unavailable: {source}")]
    RemoteUnavailable {
        upstream: Upstream,
        #[source]
        source: RemoteError,
    },

    #[error(transparent)]
    Validation(#[from] DomainError),

    #[error(transparent)]
    Store(StoreError),

    #[error("another sync pass is in progress")]
    PassInProgress,
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Invalid(e) => Self::Validation(e),
            other => Self::Store(other),
        }
    }
}
