use sqlparser::dialect::{Dialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

use crate::models::DriverKind;

const STATEMENT_PREFIXES: [&str; 8] = [
    "SELECT", "INSERT", "UPDATE", "DELETE", "CREATE", "DROP", "ALTER", "WITH",
];

const STRUCTURAL_KEYWORDS: [&str; 4] = ["FROM", "WHERE", "SET", "VALUES"];

/// Lowercase markers that mean the model started explaining itself.
const EXPLANATION_MARKERS: [&str; 5] = [
    "this query",
    "the query above",
    "explanation",
    "esta query",
    "explicação",
];

/// Post-processing for raw model output.
pub struct SqlSanitizer;

impl SqlSanitizer {
    /// Isolates a single statement from generated text.
    ///
    /// Code fences are removed, then lines are kept until the first comment
    /// or explanation line. The kept lines are joined with single spaces and
    /// a trailing `;` is added when missing.
    pub fn clean(raw: &str) -> String {
        let unfenced = strip_fences(raw.trim());

        let mut kept = Vec::new();
        for line in unfenced.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with("--") || line.starts_with('#') {
                break;
            }
            let lowered = line.to_lowercase();
            if EXPLANATION_MARKERS.iter().any(|m| lowered.contains(m)) {
                break;
            }
            kept.push(line);
        }

        let mut statement = kept.join(" ");
        if !statement.is_empty() && !statement.ends_with(';') {
            statement.push(';');
        }
        statement
    }

    /// Prefix heuristic separating SQL from prose.
    ///
    /// `SELECT 1` passes without a structural keyword; prose that only
    /// mentions a verb does not.
    pub fn is_valid_sql(text: &str) -> bool {
        let text = text.trim();
        if text.chars().count() < 5 {
            return false;
        }

        let upper = text.to_uppercase();
        let starts_with_statement = STATEMENT_PREFIXES.iter().any(|k| upper.starts_with(k));
        let has_structure = STRUCTURAL_KEYWORDS.iter().any(|k| upper.contains(k));

        starts_with_statement && (has_structure || upper.starts_with("SELECT"))
    }

    /// Parses `sql` in the dialect of `kind`. `None` when it parses.
    pub fn syntax_error(sql: &str, kind: DriverKind) -> Option<String> {
        let dialect: Box<dyn Dialect> = match kind {
            DriverKind::Sqlite => Box::new(SQLiteDialect {}),
            DriverKind::Postgresql => Box::new(PostgreSqlDialect {}),
        };

        match Parser::parse_sql(dialect.as_ref(), sql) {
            Ok(statements) if statements.is_empty() => Some("Empty SQL query".to_string()),
            Ok(_) => None,
            Err(e) => Some(format!("SQL parsing error: {}", e)),
        }
    }
}

/// Drops every ``` marker together with an optional `sql` language tag.
fn strip_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find("```") {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + 3..];
        if rest.get(..3).is_some_and(|tag| tag.eq_ignore_ascii_case("sql")) {
            rest = &rest[3..];
        }
        rest = rest.trim_start_matches([' ', '\t']);
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_fenced_block_with_comment() {
        assert_eq!(
            SqlSanitizer::clean("```sql\nSELECT * FROM t\n-- comment\n```"),
            "SELECT * FROM t;"
        );
    }

    #[test]
    fn test_clean_joins_lines_and_keeps_semicolon() {
        let raw = "  SELECT nome,\n   SUM(preco)\n\nFROM vendas\nGROUP BY nome;  ";
        assert_eq!(
            SqlSanitizer::clean(raw),
            "SELECT nome, SUM(preco) FROM vendas GROUP BY nome;"
        );
    }

    #[test]
    fn test_clean_stops_at_explanation() {
        let raw = "SELECT COUNT(*) FROM vendas\nThis query counts every sale.\nSELECT 2";
        assert_eq!(SqlSanitizer::clean(raw), "SELECT COUNT(*) FROM vendas;");

        let raw = "SELECT 1\nExplanation: returns one";
        assert_eq!(SqlSanitizer::clean(raw), "SELECT 1;");

        let raw = "SELECT 1\n# trailing note";
        assert_eq!(SqlSanitizer::clean(raw), "SELECT 1;");
    }

    #[test]
    fn test_clean_uppercase_fence_tag() {
        assert_eq!(SqlSanitizer::clean("```SQL SELECT 1```"), "SELECT 1;");
    }

    #[test]
    fn test_clean_empty_input() {
        assert_eq!(SqlSanitizer::clean("   "), "");
        assert_eq!(SqlSanitizer::clean("```\n```"), "");
    }

    #[test]
    fn test_is_valid_sql() {
        assert!(SqlSanitizer::is_valid_sql("SELECT * FROM t"));
        assert!(SqlSanitizer::is_valid_sql("SELECT 1"));
        assert!(SqlSanitizer::is_valid_sql("select count(*) from vendas;"));
        assert!(SqlSanitizer::is_valid_sql("UPDATE t SET a = 1"));
        assert!(!SqlSanitizer::is_valid_sql("I think you should check the table"));
        assert!(!SqlSanitizer::is_valid_sql("SEL"));
        assert!(!SqlSanitizer::is_valid_sql("DROP everything"));
    }

    #[test]
    fn test_syntax_error_per_dialect() {
        assert!(SqlSanitizer::syntax_error("SELECT SUM(preco) FROM vendas;", DriverKind::Sqlite).is_none());
        assert!(SqlSanitizer::syntax_error("SELECT 1;", DriverKind::Postgresql).is_none());

        let error = SqlSanitizer::syntax_error("SELEC * FROM vendas;", DriverKind::Postgresql);
        assert!(error.unwrap().starts_with("SQL parsing error"));
        assert_eq!(
            SqlSanitizer::syntax_error("", DriverKind::Sqlite).as_deref(),
            Some("Empty SQL query")
        );
    }
}
