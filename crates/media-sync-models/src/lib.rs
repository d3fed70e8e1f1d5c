pub mod collection;
pub mod history;
pub mod media;
pub mod media_ids;
pub mod mutation;
pub mod patch;
pub mod status;
pub mod sync_status;
pub mod transfer;

mod serde_helpers;

pub use collection::{CollectionDraft, CollectionPatch, FilterCriteria, Range, SmartCollection};
pub use history::{HistoryAction, HistoryEvent};
pub use media::{normalize_title, MediaDraft, MediaItem, MediaType, PlatformKind, StreamingPlatform};
pub use media_ids::ExternalIds;
pub use mutation::{MutationMessage, MutationOp, RemoteTable};
pub use patch::MediaPatch;
pub use status::MediaStatus;
pub use sync_status::SyncStatus;
pub use transfer::{ExportDocument, EXPORT_VERSION};
