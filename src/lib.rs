// Branch Registry - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod config;
pub mod db;
pub mod debounce;
pub mod entities;
pub mod error;
pub mod gateway;
pub mod import;
pub mod logging;
pub mod notify;
pub mod registry;
pub mod storage;
pub mod toast;

#[cfg(feature = "server")]
pub mod api;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::RegistryConfig;
pub use db::{get_events_for_entity, insert_event, setup_database, Event, SqliteGateway};
pub use debounce::{Debouncer, DEFAULT_DEBOUNCE};
pub use entities::{Branch, BranchPatch, NewBranch, BRANCHES_TABLE, DEFAULT_COUNTRY};
pub use error::{GatewayError, RegistryError, StorageError};
pub use gateway::{Filter, Ordering, RemoteTableGateway, Row};
pub use import::{import_branches, load_csv, ImportReport};
pub use logging::init_tracing;
pub use notify::{BranchChanged, ChangeTracker, NotificationBus, SubscriptionId};
pub use registry::{BranchRegistry, RegistryState};
pub use storage::{FileSelectionStore, MemorySelectionStore, SelectionStore, SELECTED_BRANCH_KEY};
pub use toast::{CollectedToasts, ConsoleToasts, LogToasts, Toast, ToastKind, ToastSink};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
