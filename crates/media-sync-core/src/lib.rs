pub mod connectivity;
pub mod coordinator;
pub mod error;
pub mod filter;
pub mod history;
pub mod merge;
pub mod queue;
pub mod reconcile;
pub mod status;
pub mod store;
pub mod transfer;

pub use connectivity::{probe_once, spawn_probe, Connectivity};
pub use coordinator::{CoordinatorOptions, SyncCoordinator};
pub use error::{StoreError, StoreResult, SyncError, SyncResult};
pub use filter::{LibraryFilter, SortField};
pub use merge::{merge_records, MergeOutcome, Record};
pub use queue::MutationQueue;
pub use reconcile::{ReconcileReport, Reconciled};
pub use status::{StatusTracker, SyncingGuard};
pub use store::{LocalStore, MediaQuery};
