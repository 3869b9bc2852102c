pub mod ai;
pub mod connection;
