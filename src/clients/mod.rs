pub mod storage;
pub mod webdav;

pub use storage::{DeleteOutcome, RemoteStore, StorageError};
pub use webdav::WebDavClient;
