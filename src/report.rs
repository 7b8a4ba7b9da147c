/*!
 * Reporting functionality for filenav
 *
 * Renders directory listings, search results and operation summaries as
 * tables using the tabled library.
 */

use tabled::{
    settings::{object::Columns, Alignment, Modify, Padding, Style},
    Table, Tabled,
};

use crate::operations::{OperationReport, OperationStatus};
use crate::state::SearchState;
use crate::types::{FileSystemObject, FsoKind};
use crate::utils::{format_file_size, format_mode, format_modified};

/// Format of the report output
pub enum ReportFormat {
    /// Console table output
    ConsoleTable,
    /// One path per line
    Plain,
}

/// Renders engine results for the terminal
pub struct Reporter {
    format: ReportFormat,
}

#[derive(Tabled)]
struct ListingRow {
    #[tabled(rename = "Mode")]
    mode: String,

    #[tabled(rename = "Size")]
    size: String,

    #[tabled(rename = "Modified")]
    modified: String,

    #[tabled(rename = "Name")]
    name: String,
}

impl Reporter {
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }

    fn listing_row(fso: &FileSystemObject) -> ListingRow {
        let name = match &fso.kind {
            FsoKind::Symlink {
                target: Some(target),
            } => format!("{} -> {}", fso.name, target.path),
            FsoKind::Symlink { target: None } => format!("{} -> ?", fso.name),
            FsoKind::RootDirectory { title } => format!("{} ({})", fso.path, title),
            _ if fso.is_directory() => format!("{}/", fso.name),
            _ => fso.name.clone(),
        };
        let size = if fso.is_directory() {
            "-".to_string()
        } else {
            format_file_size(fso.size)
        };
        ListingRow {
            mode: format_mode(fso),
            size,
            modified: format_modified(fso.last_modified),
            name,
        }
    }

    fn table<T: Tabled>(rows: Vec<T>) -> String {
        let mut table = Table::new(rows);
        table
            .with(Style::rounded())
            .with(Padding::new(1, 1, 0, 0))
            .with(Modify::new(Columns::new(..)).with(Alignment::left()));
        table.to_string()
    }

    /// Render a directory listing
    pub fn listing(&self, dir: &str, files: &[FileSystemObject]) -> String {
        match self.format {
            ReportFormat::Plain => files
                .iter()
                .filter(|f| !f.is_parent_marker())
                .map(|f| f.path.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            ReportFormat::ConsoleTable => {
                let rows = files.iter().map(Self::listing_row).collect();
                format!("📂  {}\n{}", dir, Self::table::<ListingRow>(rows))
            }
        }
    }

    /// Render search results
    pub fn search(&self, search: &SearchState) -> String {
        match self.format {
            ReportFormat::Plain => search
                .results
                .iter()
                .map(|f| f.path.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            ReportFormat::ConsoleTable => {
                let rows: Vec<ListingRow> = search
                    .results
                    .iter()
                    .map(|f| ListingRow {
                        name: f.path.clone(),
                        ..Self::listing_row(f)
                    })
                    .collect();
                format!(
                    "🔍  {} matches for {} under {}\n{}",
                    search.results.len(),
                    search.query,
                    search.directory,
                    Self::table(rows)
                )
            }
        }
    }

    /// Render an operation summary
    pub fn operation(&self, report: &OperationReport) -> String {
        #[derive(Tabled)]
        struct SummaryRow {
            #[tabled(rename = "Metric")]
            key: String,

            #[tabled(rename = "Value")]
            value: String,
        }

        #[derive(Tabled)]
        struct FailureRow {
            #[tabled(rename = "Path")]
            path: String,

            #[tabled(rename = "Error")]
            error: String,
        }

        let operation = report
            .kind
            .map_or_else(|| "delete".to_string(), |k| k.to_string());
        let status = match report.status {
            OperationStatus::Completed => "✅ completed",
            OperationStatus::PartiallyFailed => "⚠️ partially failed",
            OperationStatus::Cancelled => "⏹️ cancelled",
            OperationStatus::Declined => "🚫 declined",
        };

        if let ReportFormat::Plain = self.format {
            return format!(
                "{} {}: {} of {} items",
                operation,
                report.status,
                report.succeeded(),
                report.total
            );
        }

        let rows = vec![
            SummaryRow {
                key: "Operation".to_string(),
                value: operation,
            },
            SummaryRow {
                key: "Status".to_string(),
                value: status.to_string(),
            },
            SummaryRow {
                key: "Succeeded".to_string(),
                value: format!("{} of {}", report.succeeded(), report.total),
            },
            SummaryRow {
                key: "Duration".to_string(),
                value: format!("{:.4?}", report.duration),
            },
        ];
        let mut out = Self::table(rows);

        let failures: Vec<FailureRow> = report
            .items
            .iter()
            .filter_map(|item| {
                item.error.as_ref().map(|e| FailureRow {
                    path: item.source.clone(),
                    error: e.to_string(),
                })
            })
            .collect();
        if !failures.is_empty() {
            out.push_str("\n\n❌  FAILED ITEMS\n");
            out.push_str(&Self::table(failures));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NavError;
    use crate::operations::{ItemResult, OperationKind};
    use std::time::Duration;

    #[test]
    fn test_listing_marks_directories_and_links() {
        let files = vec![
            FileSystemObject::parent_marker("/"),
            FileSystemObject::directory("/sdcard/Music"),
            FileSystemObject::symlink(
                "/sdcard/latest",
                Some(FileSystemObject::file("/sdcard/Music/a.mp3", 3)),
            ),
        ];
        let out = Reporter::new(ReportFormat::ConsoleTable).listing("/sdcard", &files);
        assert!(out.contains("Music/"));
        assert!(out.contains("latest -> /sdcard/Music/a.mp3"));

        let plain = Reporter::new(ReportFormat::Plain).listing("/sdcard", &files);
        assert_eq!(plain, "/sdcard/Music\n/sdcard/latest");
    }

    #[test]
    fn test_operation_lists_failures() {
        let report = OperationReport {
            kind: Some(OperationKind::Copy),
            status: OperationStatus::PartiallyFailed,
            items: vec![
                ItemResult {
                    source: "/a".into(),
                    destination: "/b/a".into(),
                    error: None,
                },
                ItemResult {
                    source: "/c".into(),
                    destination: "/b/c".into(),
                    error: Some(NavError::InsufficientPermissions("/c".into())),
                },
            ],
            total: 2,
            duration: Duration::from_millis(3),
        };
        let out = Reporter::new(ReportFormat::ConsoleTable).operation(&report);
        assert!(out.contains("1 of 2"));
        assert!(out.contains("FAILED ITEMS"));
        assert!(out.contains("Insufficient permissions"));
    }
}
