pub mod record;

pub use record::{MediaEntry, RecordDescriptor};
