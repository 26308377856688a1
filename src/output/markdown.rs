//! Markdown summary generation
//!
//! Renders a `CrawlSummary` as a human-readable report: run information,
//! totals, and a table of the pages that failed.

use crate::output::traits::{CrawlSummary, SinkResult};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes a markdown summary to `output_path`
///
/// # Arguments
///
/// * `summary` - The crawl summary data
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(SinkError)` - Failed to write summary
pub fn write_markdown_summary(summary: &CrawlSummary, output_path: &Path) -> SinkResult<()> {
    let markdown = format_markdown_summary(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a crawl summary as markdown
pub fn format_markdown_summary(summary: &CrawlSummary) -> String {
    let mut md = String::new();

    md.push_str("# Pagewalk Crawl Summary\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Started**: {}\n", summary.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", summary.finished_at.to_rfc3339()));
    md.push_str(&format!("- **Duration**: {} seconds\n", summary.duration_seconds()));
    md.push_str(&format!("- **Final Phase**: {}\n\n", summary.phase));

    md.push_str("## Totals\n\n");
    md.push_str(&format!("- **Pages Visited**: {}\n", summary.pages_visited));
    md.push_str(&format!("- **Pages Failed**: {}\n", summary.pages_failed));
    md.push_str(&format!("- **Records Extracted**: {}\n", summary.records_extracted));
    md.push_str(&format!("- **Extraction Warnings**: {}\n", summary.warnings));
    md.push_str(&format!("- **Success Rate**: {:.2}%\n\n", summary.success_rate()));

    if summary.cancelled {
        md.push_str("> The crawl was cancelled. Run again with `--resume` to continue.\n\n");
    }

    if !summary.failed.is_empty() {
        md.push_str("## Failed Pages\n\n");
        md.push_str("| Site | Page | URL | Status | Attempts |\n");
        md.push_str("|------|------|-----|--------|----------|\n");
        for failure in &summary.failed {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                failure.page.site_id(),
                failure.page.page_number(),
                failure.page.url(),
                failure.status,
                failure.attempts
            ));
        }
        md.push('\n');
    }

    md.push_str("---\n\n");
    md.push_str("*Generated by pagewalk*\n");

    md
}
