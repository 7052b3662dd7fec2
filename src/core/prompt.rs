//! Prompt construction for category narratives and the executive summary.

use super::types::{FieldValue, ProjectedRecord, ResourceRecord};

const UNNAMED: &str = "Unnamed Resource";
const UNKNOWN_TYPE: &str = "Unknown Type";

/// One prompt line per resource:
/// `- Name: <name>, Type: <type>, Details: (f: v, ...)`.
///
/// Name and type come from the raw record; details come from the projected
/// record and skip null or empty values.
pub fn resource_line(raw: &ResourceRecord, projected: &ProjectedRecord) -> String {
    let name = text_or(raw.get("name"), UNNAMED);
    let kind = text_or(raw.get("type"), UNKNOWN_TYPE);

    let details: Vec<String> = projected
        .fields()
        .filter_map(|field| {
            let value = projected.get(field);
            if value.is_empty() {
                None
            } else {
                Some(format!("{field}: {}", value.display()))
            }
        })
        .collect();

    if details.is_empty() {
        format!("- Name: {name}, Type: {kind} (no details for the configured fields)")
    } else {
        format!("- Name: {name}, Type: {kind}, Details: ({})", details.join(", "))
    }
}

fn text_or(value: Option<&FieldValue>, fallback: &str) -> String {
    match value {
        Some(v) if !v.is_empty() => v.display(),
        _ => fallback.to_string(),
    }
}

/// Resource listing for a category, one line per record in inventory order.
pub fn resource_listing(raw: &[ResourceRecord], projected: &[ProjectedRecord]) -> String {
    raw.iter()
        .zip(projected)
        .map(|(r, p)| resource_line(r, p))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Full narrative prompt for one category.
pub fn category_prompt(category: &str, raw: &[ResourceRecord], projected: &[ProjectedRecord]) -> String {
    format!(
        "You are a cloud solutions architect writing one section of a customer-facing \
environment report. Using ONLY the resources and properties listed below for the \
'{category}' category, write a 3-5 paragraph analysis.

Paragraph one: what is deployed in this category and how it is configured overall.
Paragraph two: notable properties and configuration choices (sizes, SKUs, redundancy, \
OS types, network exposure), plus patterns such as naming conventions or regional spread.
Paragraph three: security, compliance, and optimization observations grounded in the data.

Rules:
- Be specific and factual. Do not hedge (no \"it appears\", \"may be\", \"possibly\").
- Refer to \"the environment\" and \"the resources\", never \"your\".
- If the data is sparse, keep the analysis short.
- Do not mention the model or how the analysis was produced.

Resources in {category}:
{listing}

Analysis:",
        listing = resource_listing(raw, projected),
    )
}

/// Executive summary prompt from `(category, narrative)` pairs. Returns
/// `None` when there is nothing to summarize.
pub fn executive_prompt(summaries: &[(&str, &str)]) -> Option<String> {
    if summaries.is_empty() {
        return None;
    }
    let combined = summaries
        .iter()
        .map(|(name, text)| format!("## {name}\n{text}"))
        .collect::<Vec<_>>()
        .join("\n\n");
    Some(format!(
        "You are a cloud solutions architect writing the executive summary of an \
environment report for a non-technical audience. Using ONLY the category analyses \
below, write at most three short paragraphs covering the main services deployed, \
the most significant configurations, and any security or cost concerns. Be direct, \
do not invent facts, and do not mention that you are summarizing other text.

Category analyses:

{combined}

Executive summary:"
    ))
}
