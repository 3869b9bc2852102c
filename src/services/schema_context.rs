use crate::config::SchemaContextConfig;
use crate::models::{DriverKind, SchemaSnapshot, TableSchema};
use crate::services::ConnectionManager;

pub const NOT_CONNECTED_CONTEXT: &str = "No database connected.";

const GENERAL_RULES: &str = r#"
General rules:
1. Answer ONLY with valid SQL, no comments
2. Use LIMIT to avoid large results (at most 50 rows)
3. For text searches use LIKE with wildcards: WHERE column LIKE '%value%'
4. For counts use COUNT(*)
5. For totals use SUM(column)
6. Always end the statement with a semicolon (;)
"#;

const POSTGRESQL_RULES: &str = r#"
PostgreSQL rules:
- Quote identifiers containing spaces with double quotes: "Column Name"
- Dates and times use DATE and TIMESTAMP literals: DATE '2024-01-15'
- Text columns are VARCHAR or TEXT
- Functions: LOWER(), UPPER(), SUBSTRING(), NOW(), CURRENT_DATE
"#;

const SQLITE_RULES: &str = r#"
SQLite rules:
- Keep the syntax simple; quote identifiers with double quotes if needed
- Dates are text: use DATE('2024-01-15') or datetime()
- Column types are loosely enforced
- Functions: lower(), upper(), substr()
"#;

const FEW_SHOT_EXAMPLES: &str = r#"
Examples:
- "all products": SELECT * FROM produtos LIMIT 50;
- "total sales": SELECT SUM(valor) FROM vendas;
- "products containing 'notebook'": SELECT * FROM produtos WHERE nome LIKE '%notebook%' LIMIT 20;
"#;

/// Renders the live schema of the active connection into a prompt fragment.
///
/// Table and column caps keep the prompt bounded. Tables are taken in the
/// order the driver lists them, with no ranking against the question.
#[derive(Debug, Clone)]
pub struct SchemaContextBuilder {
    max_tables: usize,
    max_columns: usize,
}

impl SchemaContextBuilder {
    pub fn new(config: &SchemaContextConfig) -> Self {
        Self::with_limits(config.max_tables, config.max_columns)
    }

    pub fn with_limits(max_tables: usize, max_columns: usize) -> Self {
        Self {
            max_tables,
            max_columns,
        }
    }

    /// Fetches a fresh, bounded snapshot. `None` when nothing is connected.
    pub async fn snapshot(&self, manager: &ConnectionManager) -> Option<(DriverKind, SchemaSnapshot)> {
        let status = manager.status().await;
        if !status.connected {
            return None;
        }
        let kind = status.driver_type?;

        let mut snapshot = SchemaSnapshot::default();
        for table in status.tables.into_iter().take(self.max_tables) {
            let info = manager.table_info(&table).await;
            if !info.success {
                tracing::warn!(
                    "Failed to describe table {}: {}",
                    table,
                    info.error.unwrap_or_default()
                );
            }
            let columns = info.table_info.into_iter().take(self.max_columns).collect();
            snapshot.tables.push(TableSchema {
                name: table,
                columns,
            });
        }

        Some((kind, snapshot))
    }

    pub async fn build(&self, manager: &ConnectionManager) -> String {
        match self.snapshot(manager).await {
            Some((kind, snapshot)) => self.render(kind, &snapshot),
            None => NOT_CONNECTED_CONTEXT.to_string(),
        }
    }

    /// Pure rendering of a snapshot plus the dialect rules for `kind`.
    pub fn render(&self, kind: DriverKind, snapshot: &SchemaSnapshot) -> String {
        let mut context = format!(
            "You are an assistant specialized in SQL for {kind}.\n\
             Generate valid, precise SQL queries based on the user's questions.\n\
             \n\
             Read the database information carefully and only query tables that exist in the schema.\n\
             \n\
             IMPORTANT: Answer ONLY with the SQL query, without additional explanations.\n\
             \n\
             Database: {kind}\n\
             Available tables:\n"
        );

        if snapshot.is_empty() {
            context.push_str("- No tables found\n");
        }

        for table in snapshot.tables.iter().take(self.max_tables) {
            context.push_str(&format!("- {}\n", prompt_safe(&table.name)));
            if table.columns.is_empty() {
                continue;
            }
            context.push_str("  Columns:\n");
            for column in table.columns.iter().take(self.max_columns) {
                context.push_str(&format!(
                    "    {} ({})\n",
                    prompt_safe(&column.name),
                    prompt_safe(&column.data_type)
                ));
            }
        }

        context.push_str(GENERAL_RULES);
        context.push_str(dialect_rules(kind));
        context.push_str(FEW_SHOT_EXAMPLES);
        context
    }
}

pub fn dialect_rules(kind: DriverKind) -> &'static str {
    match kind {
        DriverKind::Postgresql => POSTGRESQL_RULES,
        DriverKind::Sqlite => SQLITE_RULES,
    }
}

/// Replaces control characters so identifiers cannot break the prompt layout.
fn prompt_safe(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { '\u{FFFD}' } else { c })
        .collect()
}
