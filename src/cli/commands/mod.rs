mod init;
mod list;
mod sweep;

pub use init::cmd_init;
pub use list::cmd_list_records;
pub use sweep::cmd_sweep;
