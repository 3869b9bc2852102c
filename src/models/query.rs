use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ColumnInfo;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

/// Raw driver output for one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// Row-returning statement; column order is preserved in every row.
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    /// DDL/DML statement.
    Affected(u64),
}

impl QueryOutput {
    pub fn columns(&self) -> Vec<String> {
        match self {
            QueryOutput::Rows { columns, .. } => columns.clone(),
            QueryOutput::Affected(_) => vec!["rows_affected".to_string()],
        }
    }

    /// Rows as JSON objects keyed by column name.
    ///
    /// Duplicate column names (`SELECT a.id, b.id`) collapse into one key
    /// holding the last value; `columns()` still lists every column.
    pub fn into_records(self) -> Vec<Value> {
        match self {
            QueryOutput::Rows { columns, rows } => rows
                .into_iter()
                .map(|row| {
                    let mut record = Map::with_capacity(columns.len());
                    for (column, value) in columns.iter().zip(row) {
                        record.insert(column.clone(), value);
                    }
                    Value::Object(record)
                })
                .collect(),
            QueryOutput::Affected(count) => {
                vec![serde_json::json!({ "rows_affected": count })]
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryExecution {
    pub success: bool,
    pub results: Vec<Value>,
    pub columns: Vec<String>,
    pub row_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryExecution {
    pub fn completed(output: QueryOutput, execution_time_ms: u64) -> Self {
        let columns = output.columns();
        let results = output.into_records();
        Self {
            success: true,
            row_count: results.len(),
            results,
            columns,
            execution_time_ms: Some(execution_time_ms),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            results: Vec::new(),
            columns: Vec::new(),
            row_count: 0,
            execution_time_ms: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TableInfoResponse {
    pub success: bool,
    pub table_info: Vec<ColumnInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}
