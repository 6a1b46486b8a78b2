pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use config::{AppConfig, SourceConfig, StoreConfig, StoreType};
pub use core::{
    FileEvent, FileEventHandler, InboundSyncSource, InboundSynchronizer, LocalFileWriter, SyncConfig,
    SyncReport,
};
pub use error::SyncError;
pub use storage::{create_store, RemoteStore};
