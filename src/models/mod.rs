pub mod connection;
pub mod generation;
pub mod metadata;
pub mod query;

pub use connection::*;
pub use generation::*;
pub use metadata::*;
pub use query::*;
