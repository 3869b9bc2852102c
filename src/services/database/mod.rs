// Database abstraction layer: one driver per supported engine
pub mod driver;
pub mod postgresql;
pub mod sqlite;

pub use driver::{ConnectionTarget, DatabaseDriver};
pub use postgresql::PostgreSQLDriver;
pub use sqlite::SqliteDriver;

pub use crate::models::DriverKind;

/// Factory function to create the driver for an engine kind
pub fn create_driver(kind: DriverKind) -> Box<dyn DatabaseDriver> {
    match kind {
        DriverKind::Sqlite => Box::new(SqliteDriver::new()),
        DriverKind::Postgresql => Box::new(PostgreSQLDriver::new()),
    }
}
