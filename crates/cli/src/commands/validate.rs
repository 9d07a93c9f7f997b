// Local query validation

use anyhow::{bail, Result};
use ngsiem_core::{IssueSeverity, QueryValidator};

use crate::output::{print_table_header, print_table_row, OutputFormat};

pub fn run(output: OutputFormat, query: &str, strict: bool) -> Result<()> {
    let report = QueryValidator::new().validate(query, strict);

    if output.is_text() {
        if report.issues.is_empty() {
            println!("No issues found");
        } else {
            print_table_header(&[("SEVERITY", 8), ("POS", 5), ("MESSAGE", 48), ("SUGGESTION", 40)]);
            for issue in &report.issues {
                let severity = match issue.severity {
                    IssueSeverity::Error => "error",
                    IssueSeverity::Warning => "warning",
                    IssueSeverity::Info => "info",
                };
                let position = issue
                    .position
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".to_string());
                print_table_row(&[
                    (severity, 8),
                    (&position, 5),
                    (&issue.message, 48),
                    (issue.suggestion.as_deref().unwrap_or("-"), 40),
                ]);
            }
        }
        if let Some(sanitized) = &report.sanitized_query {
            println!();
            println!("Sanitized: {}", sanitized);
        }
    } else {
        output.print_value(&report)?;
    }

    if !report.valid {
        bail!("Query is not valid");
    }
    Ok(())
}
