use std::time::Instant;
use tokio::sync::RwLock;

use crate::api::middleware::AppError;
use crate::models::{
    ConnectResponse, ConnectionStatus, DisconnectResponse, DriverConfig, DriverDescriptor,
    DriverKind, OperationResponse, QueryExecution, TableInfoResponse,
};
use crate::services::database::{create_driver, DatabaseDriver};

struct ActiveConnection {
    kind: DriverKind,
    driver: Box<dyn DatabaseDriver>,
    config: DriverConfig,
}

/// Owns at most one live driver and exposes it through a uniform facade.
///
/// Every public operation returns a `{success, ...}` shaped value; driver
/// errors never escape this type.
pub struct ConnectionManager {
    active: RwLock<Option<ActiveConnection>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            active: RwLock::new(None),
        }
    }

    /// Catalogue of supported drivers and the fields each one needs.
    pub fn available_drivers() -> Vec<(DriverKind, DriverDescriptor)> {
        DriverKind::ALL
            .iter()
            .map(|kind| (*kind, create_driver(*kind).descriptor()))
            .collect()
    }

    /// Tears down any current connection, then connects with the requested driver.
    pub async fn connect(&self, driver_type: &str, config: DriverConfig) -> ConnectResponse {
        let mut active = self.active.write().await;

        if let Some(mut previous) = active.take() {
            tracing::info!("Disconnecting from {} before reconnecting", previous.kind);
            previous.driver.disconnect().await;
        }

        match Self::open(driver_type, &config).await {
            Ok((driver, tables)) => {
                let kind = driver.kind();
                tracing::info!("Connected to {} ({} tables)", kind, tables.len());
                *active = Some(ActiveConnection {
                    kind,
                    driver,
                    config,
                });
                ConnectResponse::connected(kind, tables)
            }
            Err(e) => {
                tracing::warn!("Connection attempt failed: {}", e);
                ConnectResponse::failed(e.to_string())
            }
        }
    }

    async fn open(
        driver_type: &str,
        config: &DriverConfig,
    ) -> Result<(Box<dyn DatabaseDriver>, Vec<String>), AppError> {
        let kind = DriverKind::from_str(driver_type)?;
        let mut driver = create_driver(kind);

        if let Err(e) = driver.connect(config).await {
            driver.disconnect().await;
            return Err(e);
        }

        match driver.list_tables().await {
            Ok(tables) => Ok((driver, tables)),
            Err(e) => {
                driver.disconnect().await;
                Err(e)
            }
        }
    }

    /// Always succeeds, including when nothing is connected.
    pub async fn disconnect(&self) -> DisconnectResponse {
        let mut active = self.active.write().await;
        if let Some(mut connection) = active.take() {
            connection.driver.disconnect().await;
            tracing::info!("Disconnected from {}", connection.kind);
        }
        DisconnectResponse {
            success: true,
            message: "Disconnected".to_string(),
        }
    }

    pub async fn status(&self) -> ConnectionStatus {
        let active = self.active.read().await;
        let Some(connection) = active.as_ref().filter(|c| c.driver.is_connected()) else {
            return ConnectionStatus::disconnected();
        };

        let tables = connection.driver.list_tables().await.unwrap_or_else(|e| {
            tracing::warn!("Failed to list tables: {}", e);
            Vec::new()
        });

        let mut config = connection.config.clone();
        config.remove("password");

        ConnectionStatus {
            connected: true,
            driver_type: Some(connection.kind),
            tables,
            config: Some(config),
        }
    }

    pub async fn active_kind(&self) -> Option<DriverKind> {
        self.active.read().await.as_ref().map(|c| c.kind)
    }

    pub async fn execute_query(&self, sql: &str) -> QueryExecution {
        let active = self.active.read().await;
        let Some(connection) = active.as_ref() else {
            return QueryExecution::failed(
                AppError::NotConnected("no active database connection".to_string()).to_string(),
            );
        };

        let started = Instant::now();
        match connection.driver.execute(sql).await {
            Ok(output) => {
                QueryExecution::completed(output, started.elapsed().as_millis() as u64)
            }
            Err(e) => {
                tracing::warn!("Query failed on {}: {}", connection.kind, e);
                QueryExecution::failed(e.to_string())
            }
        }
    }

    pub async fn table_info(&self, table: &str) -> TableInfoResponse {
        let active = self.active.read().await;
        let result = match active.as_ref() {
            Some(connection) => connection.driver.describe_table(table).await,
            None => Err(AppError::NotConnected(
                "no active database connection".to_string(),
            )),
        };

        match result {
            Ok(table_info) => TableInfoResponse {
                success: true,
                table_info,
                error: None,
            },
            Err(e) => TableInfoResponse {
                success: false,
                table_info: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }

    pub async fn seed_sample_data(&self) -> OperationResponse {
        let active = self.active.read().await;
        let result = match active.as_ref() {
            Some(connection) => connection.driver.seed_sample_data().await,
            None => Err(AppError::NotConnected(
                "no active database connection".to_string(),
            )),
        };

        match result {
            Ok(()) => OperationResponse::ok("Sample data created"),
            Err(e) => OperationResponse::failed(e.to_string()),
        }
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
