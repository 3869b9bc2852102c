use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::api::middleware::AppError;

/// Engine-specific connection fields, as supplied by the caller.
pub type DriverConfig = Map<String, Value>;

/// Supported relational engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Sqlite,
    Postgresql,
}

impl DriverKind {
    pub const ALL: [DriverKind; 2] = [DriverKind::Sqlite, DriverKind::Postgresql];

    pub fn from_str(s: &str) -> Result<Self, AppError> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(DriverKind::Sqlite),
            "postgresql" | "postgres" => Ok(DriverKind::Postgresql),
            _ => Err(AppError::UnsupportedDriver(format!(
                "Driver '{}' is not supported. Supported drivers: sqlite, postgresql",
                s
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::Sqlite => "sqlite",
            DriverKind::Postgresql => "postgresql",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub driver_type: String,
    #[serde(default)]
    pub config: DriverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub success: bool,
    pub message: String,
    pub driver_type: Option<DriverKind>,
    pub tables: Vec<String>,
}

impl ConnectResponse {
    pub fn connected(kind: DriverKind, tables: Vec<String>) -> Self {
        Self {
            success: true,
            message: format!("Connected to {}", kind),
            driver_type: Some(kind),
            tables,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            driver_type: None,
            tables: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisconnectResponse {
    pub success: bool,
    pub message: String,
}

/// Live connection status. Tables are re-read from the engine on every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub driver_type: Option<DriverKind>,
    pub tables: Vec<String>,
    /// Config the connection was opened with, password removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<DriverConfig>,
}

impl ConnectionStatus {
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            driver_type: None,
            tables: Vec::new(),
            config: None,
        }
    }
}

/// Catalogue entry describing how to connect with a driver.
#[derive(Debug, Clone, Serialize)]
pub struct DriverDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub required_fields: Vec<&'static str>,
    pub fields: Vec<DriverField>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverField {
    pub name: &'static str,
    /// Form input hint: `file`, `text`, `number` or `password`.
    pub field_type: &'static str,
}
