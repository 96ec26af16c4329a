use std::sync::LazyLock;

use regex::Regex;

use crate::domain::DateRange;
use crate::error::{Error, Result};

static TABLE_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_\-]*(\.[a-zA-Z_][a-zA-Z0-9_]*)*$")
        .expect("TABLE_NAME_REGEX pattern is valid")
});

static IDENTIFIER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("IDENTIFIER_REGEX pattern is valid")
});

static DATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-(0?[1-9]|1[012])-(0?[1-9]|[12][0-9]|3[01])$")
        .expect("DATE_REGEX pattern is valid")
});

/// Dotted table references, e.g. `project.dataset.table`. The leading
/// segment may carry dashes to allow GCP project ids.
pub fn validate_table_name(name: &str) -> Result<()> {
    if name.len() > 1024 || !TABLE_NAME_REGEX.is_match(name) {
        return Err(Error::Config(format!("Invalid table name: {}", name)));
    }
    Ok(())
}

pub fn validate_identifier(kind: &str, name: &str) -> Result<()> {
    if name.len() > 300 || !IDENTIFIER_REGEX.is_match(name) {
        return Err(Error::Config(format!("Invalid {}: {}", kind, name)));
    }
    Ok(())
}

/// BigQuery reserved keywords. None of them may be used as a bare alias.
const RESERVED_KEYWORDS: &[&str] = &[
    "ALL", "AND", "ANY", "ARRAY", "AS", "ASC", "ASSERT_ROWS_MODIFIED", "AT", "BETWEEN", "BY",
    "CASE", "CAST", "COLLATE", "CONTAINS", "CREATE", "CROSS", "CUBE", "CURRENT", "DEFAULT",
    "DEFINE", "DESC", "DISTINCT", "ELSE", "END", "ENUM", "ESCAPE", "EXCEPT", "EXCLUDE", "EXISTS",
    "EXTRACT", "FALSE", "FETCH", "FOLLOWING", "FOR", "FROM", "FULL", "GROUP", "GROUPING",
    "GROUPS", "HASH", "HAVING", "IF", "IGNORE", "IN", "INNER", "INTERSECT", "INTERVAL", "INTO",
    "IS", "JOIN", "LATERAL", "LEFT", "LIKE", "LIMIT", "LOOKUP", "MERGE", "NATURAL", "NEW", "NO",
    "NOT", "NULL", "NULLS", "OF", "ON", "OR", "ORDER", "OUTER", "OVER", "PARTITION", "PRECEDING",
    "PROTO", "QUALIFY", "RANGE", "RECURSIVE", "RESPECT", "RIGHT", "ROLLUP", "ROWS", "SELECT",
    "SET", "SOME", "STRUCT", "TABLESAMPLE", "THEN", "TO", "TREAT", "TRUE", "UNBOUNDED", "UNION",
    "UNNEST", "USING", "WHEN", "WHERE", "WINDOW", "WITH", "WITHIN",
];

pub fn is_reserved_keyword(name: &str) -> bool {
    RESERVED_KEYWORDS
        .iter()
        .any(|keyword| keyword.eq_ignore_ascii_case(name))
}

pub fn is_valid_date(value: &str) -> bool {
    DATE_REGEX.is_match(value)
}

pub fn validate_date_range(range: &DateRange) -> Result<()> {
    for value in [&range.min_date, &range.max_date] {
        if !is_valid_date(value) {
            return Err(Error::Config(format!(
                "Invalid yyyy-mm-dd date in date_range: {}",
                value
            )));
        }
    }
    Ok(())
}

/// Renders a single-quoted SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_table_name_simple() {
        assert!(validate_table_name("users").is_ok());
        assert!(validate_table_name("my_table").is_ok());
        assert!(validate_table_name("_private").is_ok());
    }

    #[test]
    fn test_validate_table_name_qualified() {
        assert!(validate_table_name("dataset.table").is_ok());
        assert!(validate_table_name("my-project.my_dataset.my_table").is_ok());
    }

    #[test]
    fn test_validate_table_name_invalid() {
        assert!(validate_table_name("123table").is_err());
        assert!(validate_table_name("table name").is_err());
        assert!(validate_table_name("t; DROP TABLE x").is_err());
        assert!(validate_table_name("").is_err());
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("entity_id", "team_id").is_ok());
        assert!(validate_identifier("entity_id", "team.id").is_err());
        let err = validate_identifier("entity_id", "1team").unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("entity_id")));
    }

    #[test]
    fn test_reserved_keywords_ignore_case() {
        assert!(is_reserved_keyword("order"));
        assert!(is_reserved_keyword("Group"));
        assert!(is_reserved_keyword("SELECT"));
        assert!(!is_reserved_keyword("team_wins"));
        assert!(!is_reserved_keyword("orders"));
    }

    #[test]
    fn test_date_pattern() {
        assert!(is_valid_date("2022-01-01"));
        assert!(is_valid_date("2022-1-5"));
        assert!(is_valid_date("2022-12-31"));
        assert!(!is_valid_date("2022-13-01"));
        assert!(!is_valid_date("2022-01-32"));
        assert!(!is_valid_date("01/01/2022"));
        assert!(!is_valid_date("2022-01-01 00:00:00"));
        assert!(!is_valid_date(""));
    }

    #[test]
    fn test_validate_date_range() {
        assert!(validate_date_range(&DateRange::new("2022-01-01", "2022-09-01")).is_ok());
        let err = validate_date_range(&DateRange::new("2022-01-01", "Sept 1")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("2022-01-01"), "'2022-01-01'");
        assert_eq!(quote_literal("it's"), "'it\\'s'");
    }
}
