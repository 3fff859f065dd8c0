mod copy;
mod iam_auth;
mod pool;

pub use copy::{copy_csv_gz_into, header_from_csv_gz};
pub use pool::{Warehouse, connect};

pub mod migrations {
    /// Embedded SQL migrations, run to head at startup by the `migrate`
    /// CLI subcommand.
    pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
}
