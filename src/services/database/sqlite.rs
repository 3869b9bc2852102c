// Embedded file-backed engine driver
use crate::api::middleware::AppError;
use crate::models::{ColumnInfo, DriverConfig, DriverDescriptor, DriverField, DriverKind, QueryOutput};
use crate::services::database::driver::{
    config_text, has_required_fields, not_connected, ConnectionTarget, DatabaseDriver,
    SAMPLE_ROWS_SQL,
};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

const REQUIRED_FIELDS: [&str; 1] = ["database_path"];

/// SQLite driver. The connection is guarded by a tokio Mutex so it can be
/// shared by the async handlers.
#[derive(Default)]
pub struct SqliteDriver {
    conn: Option<Arc<Mutex<Connection>>>,
}

impl SqliteDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn connection(&self) -> Result<&Arc<Mutex<Connection>>, AppError> {
        self.conn.as_ref().ok_or_else(|| not_connected(DriverKind::Sqlite))
    }
}

#[async_trait::async_trait]
impl DatabaseDriver for SqliteDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Sqlite
    }

    fn descriptor(&self) -> DriverDescriptor {
        DriverDescriptor {
            name: "SQLite",
            description: "Local file-backed database",
            required_fields: REQUIRED_FIELDS.to_vec(),
            fields: vec![DriverField {
                name: "database_path",
                field_type: "file",
            }],
        }
    }

    fn validate_config(&self, config: &DriverConfig) -> bool {
        has_required_fields(config, &REQUIRED_FIELDS)
    }

    fn build_target(&self, config: &DriverConfig) -> Result<ConnectionTarget, AppError> {
        let raw = config_text(config, "database_path").ok_or_else(|| {
            AppError::ConfigValidation("database_path is required".to_string())
        })?;
        let path = PathBuf::from(raw);
        let absolute = if path.is_absolute() {
            path
        } else {
            std::env::current_dir()
                .map_err(|e| AppError::ConfigValidation(format!("Cannot resolve path: {}", e)))?
                .join(path)
        };
        Ok(ConnectionTarget::File(absolute))
    }

    async fn connect(&mut self, config: &DriverConfig) -> Result<(), AppError> {
        self.disconnect().await;

        if !self.validate_config(config) {
            return Err(AppError::ConfigValidation(
                "SQLite requires a non-empty database_path".to_string(),
            ));
        }

        let ConnectionTarget::File(path) = self.build_target(config)? else {
            return Err(AppError::Internal("SQLite target must be a file".to_string()));
        };

        if path.is_dir() {
            return Err(AppError::ConfigValidation(format!(
                "database_path {} is a directory, not a database file",
                path.display()
            )));
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::ConfigValidation(format!(
                        "Cannot create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        tracing::info!("Opening SQLite database at {}", path.display());
        let conn = Connection::open(&path)
            .map_err(|e| AppError::Connection(format!("Failed to open SQLite database: {}", e)))?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| AppError::Connection(format!("SQLite connection test failed: {}", e)))?;

        self.conn = Some(Arc::new(Mutex::new(conn)));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    async fn execute(&self, sql: &str) -> Result<QueryOutput, AppError> {
        let conn = self.connection()?.lock().await;

        let mut stmt = conn.prepare(sql)?;
        if stmt.column_count() == 0 {
            let affected = stmt.execute([])?;
            return Ok(QueryOutput::Affected(affected as u64));
        }

        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                values.push(value_to_json(row.get_ref(idx)?));
            }
            rows.push(values);
        }

        Ok(QueryOutput::Rows { columns, rows })
    }

    async fn list_tables(&self) -> Result<Vec<String>, AppError> {
        let conn = self.connection()?.lock().await;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let mut cursor = stmt.query([])?;
        let mut tables = Vec::new();
        while let Some(row) = cursor.next()? {
            tables.push(lossy_text(row.get_ref(0)?));
        }
        Ok(tables)
    }

    async fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>, AppError> {
        let conn = self.connection()?.lock().await;
        let mut stmt = conn.prepare(
            r#"SELECT name, type, "notnull", dflt_value, pk FROM pragma_table_info(?1)"#,
        )?;
        let mut cursor = stmt.query([table])?;
        let mut columns = Vec::new();
        while let Some(row) = cursor.next()? {
            let not_null: i64 = row.get(2)?;
            let pk: i64 = row.get(4)?;
            let default = match row.get_ref(3)? {
                ValueRef::Null => None,
                other => Some(lossy_text(other)),
            };
            columns.push(ColumnInfo {
                name: lossy_text(row.get_ref(0)?),
                data_type: lossy_text(row.get_ref(1)?),
                nullable: not_null == 0,
                primary_key: Some(pk > 0),
                default,
                max_length: None,
            });
        }
        Ok(columns)
    }

    async fn seed_sample_data(&self) -> Result<(), AppError> {
        let conn = self.connection()?.lock().await;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS vendas (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                produto TEXT NOT NULL,
                quantidade INTEGER NOT NULL,
                preco REAL NOT NULL,
                data_venda DATE NOT NULL,
                vendedor TEXT NOT NULL
            )
            "#,
        )?;

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM vendas", [], |row| row.get(0))?;
        if count == 0 {
            conn.execute(SAMPLE_ROWS_SQL, [])?;
            tracing::info!("Inserted sample rows into vendas");
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::info!("Closing SQLite database");
            drop(conn);
        }
    }
}

fn lossy_text(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => json!(i),
        ValueRef::Real(f) => json!(f),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => json!(format!("<blob {} bytes>", bytes.len())),
    }
}
