// PostgreSQL driver using connection pooling for the lifetime of one connection
use crate::api::middleware::AppError;
use crate::models::{ColumnInfo, DriverConfig, DriverDescriptor, DriverField, DriverKind, QueryOutput};
use crate::services::database::driver::{
    config_text, has_required_fields, not_connected, ConnectionTarget, DatabaseDriver,
    SAMPLE_ROWS_SQL,
};
use deadpool_postgres::{Config as DeadpoolConfig, ManagerConfig, Object, Pool, PoolConfig, RecyclingMethod};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tokio_postgres::types::Type;
use tokio_postgres::{NoTls, Row};
use url::Url;

const REQUIRED_FIELDS: [&str; 5] = ["host", "port", "database", "username", "password"];
const APPLICATION_NAME: &str = "db-ia-backend";
const MAX_POOL_SIZE: usize = 8;

pub struct PostgreSQLDriver {
    pool: Option<Pool>,
    target: Option<ConnectionTarget>,
    max_pool_size: usize,
}

impl PostgreSQLDriver {
    pub fn new() -> Self {
        Self {
            pool: None,
            target: None,
            max_pool_size: MAX_POOL_SIZE,
        }
    }

    async fn client(&self) -> Result<Object, AppError> {
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| not_connected(DriverKind::Postgresql))?;
        pool.get()
            .await
            .map_err(|e| AppError::Connection(format!("Failed to get connection from pool: {}", e)))
    }
}

impl Default for PostgreSQLDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Host names are limited to letters, digits, dots and hyphens.
fn is_valid_host(host: &str) -> bool {
    !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

fn parse_port(config: &DriverConfig) -> Option<u16> {
    let port: u32 = config_text(config, "port")?.parse().ok()?;
    if (1..=65535).contains(&port) {
        u16::try_from(port).ok()
    } else {
        None
    }
}

fn query_error(e: tokio_postgres::Error) -> AppError {
    let details = match e.as_db_error() {
        Some(db_error) => format!(
            "Code: {}, Message: {}",
            db_error.code().code(),
            db_error.message()
        ),
        None => e.to_string(),
    };
    AppError::QueryExecution(details)
}

#[async_trait::async_trait]
impl DatabaseDriver for PostgreSQLDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Postgresql
    }

    fn descriptor(&self) -> DriverDescriptor {
        DriverDescriptor {
            name: "PostgreSQL",
            description: "Networked PostgreSQL server",
            required_fields: REQUIRED_FIELDS.to_vec(),
            fields: vec![
                DriverField { name: "host", field_type: "text" },
                DriverField { name: "port", field_type: "number" },
                DriverField { name: "database", field_type: "text" },
                DriverField { name: "username", field_type: "text" },
                DriverField { name: "password", field_type: "password" },
            ],
        }
    }

    fn validate_config(&self, config: &DriverConfig) -> bool {
        if !has_required_fields(config, &REQUIRED_FIELDS) {
            return false;
        }
        if parse_port(config).is_none() {
            return false;
        }
        config_text(config, "host").is_some_and(|host| is_valid_host(&host))
    }

    fn build_target(&self, config: &DriverConfig) -> Result<ConnectionTarget, AppError> {
        let field = |name: &str| {
            config_text(config, name)
                .ok_or_else(|| AppError::ConfigValidation(format!("{} is required", name)))
        };
        let host = field("host")?;
        let database = field("database")?;
        let username = field("username")?;
        let password = field("password")?;
        let port = parse_port(config)
            .ok_or_else(|| AppError::ConfigValidation("port must be between 1 and 65535".to_string()))?;

        let invalid = |what: &str| AppError::ConfigValidation(format!("Invalid {}", what));
        let mut url = Url::parse(&format!("postgresql://{}", host)).map_err(|_| invalid("host"))?;
        url.set_port(Some(port)).map_err(|_| invalid("port"))?;
        url.set_path(&format!("/{}", database));
        // Userinfo setters percent-encode reserved characters
        url.set_username(&username).map_err(|_| invalid("username"))?;
        url.set_password(Some(&password)).map_err(|_| invalid("password"))?;
        url.query_pairs_mut()
            .append_pair("application_name", APPLICATION_NAME);

        Ok(ConnectionTarget::Url(url))
    }

    async fn connect(&mut self, config: &DriverConfig) -> Result<(), AppError> {
        self.disconnect().await;

        if !self.validate_config(config) {
            return Err(AppError::ConfigValidation(
                "PostgreSQL requires host, port (1-65535), database, username and password; host may only contain letters, digits, '.' and '-'".to_string(),
            ));
        }

        let target = self.build_target(config)?;
        let ConnectionTarget::Url(url) = &target else {
            return Err(AppError::Internal("PostgreSQL target must be a URL".to_string()));
        };

        tracing::info!(
            "Creating connection pool for: {} (max_size: {})",
            target.masked(),
            self.max_pool_size
        );

        let mut cfg = DeadpoolConfig::new();
        cfg.url = Some(url.to_string());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig::new(self.max_pool_size));

        let pool = cfg
            .create_pool(Some(deadpool_postgres::Runtime::Tokio1), NoTls)
            .map_err(|e| {
                tracing::error!("Failed to create connection pool: {}", e);
                AppError::Connection(format!("Failed to create connection pool: {}", e))
            })?;

        // Test the connection before exposing the pool
        let client = pool
            .get()
            .await
            .map_err(|e| AppError::Connection(format!("Failed to connect: {}", e)))?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| AppError::Connection(format!("Connection test failed: {}", e)))?;
        drop(client);

        tracing::info!("Connected to PostgreSQL at {}", target.masked());
        self.pool = Some(pool);
        self.target = Some(target);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.pool.is_some()
    }

    async fn execute(&self, sql: &str) -> Result<QueryOutput, AppError> {
        let client = self.client().await?;
        let statement = client.prepare(sql).await.map_err(query_error)?;

        if statement.columns().is_empty() {
            let affected = client.execute(&statement, &[]).await.map_err(query_error)?;
            return Ok(QueryOutput::Affected(affected));
        }

        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect();
        let rows = client.query(&statement, &[]).await.map_err(query_error)?;

        let rows = rows
            .iter()
            .map(|row| (0..columns.len()).map(|idx| cell_to_json(row, idx)).collect())
            .collect();

        Ok(QueryOutput::Rows { columns, rows })
    }

    async fn list_tables(&self) -> Result<Vec<String>, AppError> {
        let client = self.client().await?;
        let rows = client
            .query(
                r#"
                SELECT table_name
                FROM information_schema.tables
                WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
                ORDER BY table_name
                "#,
                &[],
            )
            .await
            .map_err(query_error)?;

        Ok(rows.iter().map(|row| row.get::<_, String>(0)).collect())
    }

    async fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>, AppError> {
        let client = self.client().await?;
        let rows = client
            .query(
                r#"
                SELECT
                    column_name,
                    data_type,
                    is_nullable,
                    column_default,
                    character_maximum_length
                FROM information_schema.columns
                WHERE table_name = $1
                AND table_schema = 'public'
                ORDER BY ordinal_position
                "#,
                &[&table],
            )
            .await
            .map_err(query_error)?;

        Ok(rows
            .iter()
            .map(|row| ColumnInfo {
                name: row.get(0),
                data_type: row.get(1),
                nullable: row.get::<_, String>(2) == "YES",
                primary_key: None,
                default: row.try_get::<_, Option<String>>(3).ok().flatten(),
                max_length: row.try_get::<_, Option<i32>>(4).ok().flatten(),
            })
            .collect())
    }

    async fn seed_sample_data(&self) -> Result<(), AppError> {
        let client = self.client().await?;
        client
            .batch_execute(
                r#"
                CREATE TABLE IF NOT EXISTS vendas (
                    id SERIAL PRIMARY KEY,
                    produto VARCHAR(255) NOT NULL,
                    quantidade INTEGER NOT NULL,
                    preco DECIMAL(10,2) NOT NULL,
                    data_venda DATE NOT NULL,
                    vendedor VARCHAR(255) NOT NULL,
                    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
                )
                "#,
            )
            .await
            .map_err(query_error)?;

        let count: i64 = client
            .query_one("SELECT COUNT(*) FROM vendas", &[])
            .await
            .map_err(query_error)?
            .get(0);

        if count == 0 {
            client.execute(SAMPLE_ROWS_SQL, &[]).await.map_err(query_error)?;
            tracing::info!("Inserted sample rows into vendas");
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close();
            if let Some(target) = &self.target {
                tracing::info!("Closed connection pool for: {}", target.masked());
            }
        }
        self.target = None;
    }
}

/// Converts one cell to JSON based on the column's wire type.
fn cell_to_json(row: &Row, idx: usize) -> Value {
    fn get<'a, T>(row: &'a Row, idx: usize) -> Option<Value>
    where
        T: tokio_postgres::types::FromSql<'a> + serde::Serialize,
    {
        match row.try_get::<_, Option<T>>(idx) {
            Ok(Some(v)) => Some(json!(v)),
            Ok(None) => Some(Value::Null),
            Err(_) => None,
        }
    }

    let column_type = row.columns()[idx].type_().clone();
    let value = match column_type {
        Type::BOOL => get::<bool>(row, idx),
        Type::INT2 => get::<i16>(row, idx),
        Type::INT4 => get::<i32>(row, idx),
        Type::INT8 => get::<i64>(row, idx),
        Type::OID => get::<u32>(row, idx),
        Type::FLOAT4 => get::<f32>(row, idx),
        Type::FLOAT8 => get::<f64>(row, idx),
        Type::NUMERIC => match row.try_get::<_, Option<Decimal>>(idx) {
            Ok(Some(d)) => Some(d.to_f64().map_or_else(|| json!(d.to_string()), |f| json!(f))),
            Ok(None) => Some(Value::Null),
            Err(_) => None,
        },
        Type::DATE => get::<chrono::NaiveDate>(row, idx),
        Type::TIMESTAMP => get::<chrono::NaiveDateTime>(row, idx),
        Type::TIMESTAMPTZ => get::<chrono::DateTime<chrono::Utc>>(row, idx),
        Type::JSON | Type::JSONB => get::<Value>(row, idx),
        _ => get::<String>(row, idx),
    };

    value.unwrap_or_else(|| json!(format!("<{}>", column_type.name())))
}
