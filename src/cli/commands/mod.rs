mod cleanup;
mod hash_password;
mod migrate;

pub use cleanup::cmd_cleanup;
pub use hash_password::cmd_hash_password;
pub use migrate::cmd_migrate;
