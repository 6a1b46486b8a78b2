pub mod detector;
pub mod digest;
pub mod engine;
pub mod filter;
pub mod source;
pub mod writer;

pub use detector::{ChangeDecision, ChangeDetector};
pub use digest::{calculate_md5, file_md5};
pub use engine::{InboundSynchronizer, LocalTarget, SyncConfig, SyncReport, SyncStatus};
pub use filter::{accept, FilterPolicy, LeafMatcher, NameFilter};
pub use source::InboundSyncSource;
pub use writer::{FileEvent, FileEventHandler, FileOperation, LocalFileWriter};
