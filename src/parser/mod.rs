pub mod filename;
pub mod range;
