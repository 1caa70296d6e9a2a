//! SQL result rendering
//!
//! Row sets become a table built with `tabled`; statements without rows get a
//! one-line summary picked by statement kind.

use std::collections::HashMap;
use std::sync::LazyLock;
use tabled::{Table, builder::Builder, settings::Style};

use crate::config::TableStyle;
use crate::parser::sql::StatementKind;

/// Rendered text for a NULL cell
pub const NULL_CELL: &str = "NULL";

/// Columns and text cells of a query result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    /// `None` is SQL NULL
    pub rows: Vec<Vec<Option<String>>>,
}

/// Counters reported for a statement without rows
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecSummary {
    pub kind: StatementKind,
    pub rows_affected: u64,
    /// Rows matched by an UPDATE, when the driver reports it apart from `rows_affected`
    pub matched_rows: Option<u64>,
    pub last_insert_id: u64,
}

/// Outcome of one SQL statement
#[derive(Debug, Clone, PartialEq)]
pub enum SqlOutput {
    Rows(RowSet),
    Summary(ExecSummary),
}

type SummaryFormatter = fn(&ExecSummary) -> String;

static SUMMARIES: LazyLock<HashMap<StatementKind, SummaryFormatter>> = LazyLock::new(|| {
    let mut table: HashMap<StatementKind, SummaryFormatter> = HashMap::new();
    table.insert(StatementKind::Update, |s| match s.matched_rows {
        Some(matched) => format!(
            "Updated {} row(s) (matched {} row(s))",
            s.rows_affected, matched
        ),
        None => format!("Updated {} row(s)", s.rows_affected),
    });
    table.insert(StatementKind::Insert, |s| {
        format!(
            "Inserted {} row(s), last insert ID: {}",
            s.rows_affected, s.last_insert_id
        )
    });
    table.insert(StatementKind::Delete, |s| format!("Deleted {} row(s)", s.rows_affected));
    table.insert(StatementKind::Use, |_| "Database changed".to_string());
    table
});

/// Render a SQL outcome
pub fn format_output(output: &SqlOutput, style: TableStyle) -> String {
    match output {
        SqlOutput::Rows(rows) => format_rows(rows, style),
        SqlOutput::Summary(summary) => format_summary(summary),
    }
}

/// Render a row set as a table, or `Empty result set`
pub fn format_rows(rows: &RowSet, style: TableStyle) -> String {
    if rows.rows.is_empty() {
        return "Empty result set".to_string();
    }

    let mut builder = Builder::default();
    builder.push_record(rows.columns.iter().cloned());
    for row in &rows.rows {
        builder.push_record(
            row.iter()
                .map(|cell| cell.clone().unwrap_or_else(|| NULL_CELL.to_string())),
        );
    }

    let mut table = builder.build();
    apply_style(&mut table, style);
    table.to_string()
}

/// One-line summary for a statement without rows
pub fn format_summary(summary: &ExecSummary) -> String {
    match SUMMARIES.get(&summary.kind) {
        Some(render) => render(summary),
        None => format!("Statement executed, affected rows: {}", summary.rows_affected),
    }
}

fn apply_style(table: &mut Table, style: TableStyle) {
    match style {
        TableStyle::Ascii => table.with(Style::ascii()),
        TableStyle::Psql => table.with(Style::psql()),
        TableStyle::Modern => table.with(Style::modern()),
        TableStyle::Rounded => table.with(Style::rounded()),
        TableStyle::Markdown => table.with(Style::markdown()),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(kind: StatementKind, affected: u64) -> ExecSummary {
        ExecSummary {
            kind,
            rows_affected: affected,
            matched_rows: None,
            last_insert_id: 0,
        }
    }

    #[test]
    fn test_empty_result_set() {
        let rows = RowSet {
            columns: vec!["id".into()],
            rows: vec![],
        };
        assert_eq!(format_rows(&rows, TableStyle::Ascii), "Empty result set");
    }

    #[test]
    fn test_table_has_headers_and_null() {
        let rows = RowSet {
            columns: vec!["id".into(), "name".into()],
            rows: vec![
                vec![Some("1".into()), Some("alice".into())],
                vec![Some("2".into()), None],
            ],
        };
        let text = format_rows(&rows, TableStyle::Ascii);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with('+'));
        assert!(lines[1].contains("id") && lines[1].contains("name"));
        assert!(text.contains("alice"));
        assert!(text.contains("NULL"));
    }

    #[test]
    fn test_update_summary() {
        let s = ExecSummary {
            kind: StatementKind::Update,
            rows_affected: 2,
            matched_rows: Some(3),
            last_insert_id: 0,
        };
        assert_eq!(format_summary(&s), "Updated 2 row(s) (matched 3 row(s))");

        // Without a separate matched count the clause is left out.
        assert_eq!(
            format_summary(&summary(StatementKind::Update, 2)),
            "Updated 2 row(s)"
        );
    }

    #[test]
    fn test_insert_summary() {
        let s = ExecSummary {
            kind: StatementKind::Insert,
            rows_affected: 1,
            matched_rows: None,
            last_insert_id: 42,
        };
        assert_eq!(format_summary(&s), "Inserted 1 row(s), last insert ID: 42");
    }

    #[test]
    fn test_delete_use_and_fallback() {
        assert_eq!(
            format_summary(&summary(StatementKind::Delete, 4)),
            "Deleted 4 row(s)"
        );
        assert_eq!(
            format_summary(&summary(StatementKind::Use, 0)),
            "Database changed"
        );
        assert_eq!(
            format_summary(&summary(StatementKind::Other, 0)),
            "Statement executed, affected rows: 0"
        );
    }
}
