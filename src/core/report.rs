//! Report assembly and Markdown rendering.
//!
//! Sections appear in the order results are given, whatever their status.
//! Table cells never break the table: pipes are escaped and line breaks
//! collapse to spaces.

use super::types::{CategoryResult, CategoryStatus, Report, ReportHeader};
use std::fmt::Write;

const INTRO: &str = "This report provides an AI-generated summary and a curated list of core \
resource details for Azure resources, grouped by category, based on data retrieved via Azure \
Resource Graph.";

const EXECUTIVE_HEADING: &str = "Executive Summary";

/// Assemble a report. Section order is input order.
pub fn assemble(results: Vec<CategoryResult>, header: ReportHeader) -> Report {
    Report {
        header,
        sections: results,
    }
}

/// Render the full report as Markdown.
pub fn render_markdown(report: &Report) -> String {
    let mut out = String::new();
    let header = &report.header;

    let _ = writeln!(
        out,
        "# Azure Environment Summary for Subscription: {}\n",
        single_line(&header.subscription_id)
    );
    let _ = writeln!(
        out,
        "_Report generated on: {} UTC_\n",
        header.generated_at.format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(out, "{INTRO}\n");

    if let Some(summary) = &header.executive_summary {
        let _ = writeln!(out, "## {EXECUTIVE_HEADING}\n");
        let _ = writeln!(out, "{}\n", demote_headings(summary.trim()));
    }
    out.push_str("---\n\n");

    if report.sections.is_empty() {
        out.push_str("**No categories were processed.**\n");
        return out;
    }

    for section in &report.sections {
        render_section(&mut out, section);
        out.push_str("---\n\n");
    }
    out
}

fn render_section(out: &mut String, section: &CategoryResult) {
    let name = single_line(&section.name);
    let _ = writeln!(out, "## {name}\n");

    if section.status == CategoryStatus::Failure {
        let reason = section.reason.as_deref().unwrap_or("unknown error");
        let _ = writeln!(out, "> **Category failed:** {}\n", single_line(reason));
        return;
    }

    let narrative = section.narrative.as_deref().unwrap_or_default();
    let _ = writeln!(out, "**AI-Generated Analysis:**\n");
    let _ = writeln!(out, "{}\n", demote_headings(narrative.trim()));

    let _ = writeln!(out, "**Core Resource Details for {name}:**\n");
    if section.columns.is_empty() {
        out.push_str("_Could not determine table columns for this category._\n\n");
        return;
    }
    render_table(out, section);
}

fn render_table(out: &mut String, section: &CategoryResult) {
    let headers: Vec<String> = section.columns.iter().map(|c| escape_cell(c)).collect();
    let _ = writeln!(out, "| {} |", headers.join(" | "));
    let _ = writeln!(out, "|{}", " --- |".repeat(headers.len()));
    for row in &section.rows {
        let cells: Vec<String> = row
            .display_row(&section.columns)
            .iter()
            .map(|c| escape_cell(c))
            .collect();
        let _ = writeln!(out, "| {} |", cells.join(" | "));
    }
    out.push('\n');
}

/// Make a value safe for a single table cell.
pub fn escape_cell(value: &str) -> String {
    single_line(value).replace('|', "\\|")
}

fn single_line(value: &str) -> String {
    value
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Push narrative headings below section level so generated text never
/// introduces a top-level section.
fn demote_headings(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.trim_start().starts_with('#') {
                format!("##{}", line.trim_start())
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Category section headings of a rendered report, in document order.
pub fn section_headings(markdown: &str) -> Vec<String> {
    markdown
        .lines()
        .skip_while(|line| *line != "---")
        .filter_map(|line| line.strip_prefix("## "))
        .map(str::to_string)
        .collect()
}
