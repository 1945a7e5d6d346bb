//! CLI presentation: text and JSON formatting of command results.

use crate::config::ValidationError;
use crate::error::{OrchestrationError, StorageError};
use crate::store::GeneratedProductRecord;
use comfy_table::Table;
use owo_colors::OwoColorize;

const SHORT_ID_LEN: usize = 12;

fn short_id(record_id: &str) -> &str {
    record_id.get(..SHORT_ID_LEN).unwrap_or(record_id)
}

fn to_json_error(e: serde_json::Error) -> OrchestrationError {
    OrchestrationError::Persistence(StorageError::InvalidData(e.to_string()))
}

pub fn format_record_list_text(records: &[GeneratedProductRecord]) -> String {
    if records.is_empty() {
        return "No stored products.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Record", "Generator", "Mode", "PIL", "Issued", "Events"]);
    for r in records {
        table.add_row(vec![
            short_id(&r.record_id).to_string(),
            r.generator_name.clone(),
            r.mode.as_str().to_string(),
            r.pil.clone(),
            r.issue_time.to_rfc3339(),
            r.event_ids.join(", "),
        ]);
    }
    format!("{}\n{} product(s)", table, records.len())
}

pub fn format_record_list_json(records: &[GeneratedProductRecord]) -> Result<String, OrchestrationError> {
    serde_json::to_string_pretty(records).map_err(to_json_error)
}

pub fn format_record_text(record: &GeneratedProductRecord) -> String {
    let mut lines = vec![
        format!("{}", record.pil.bold().underline()),
        format!("  Record:     {}", record.record_id),
        format!("  Generator:  {}", record.generator_name),
        format!("  Site:       {}", record.site_id),
        format!("  Mode:       {}", record.mode.as_str()),
        format!("  Issued:     {}", record.issue_time.to_rfc3339()),
        format!("  Events:     {}", record.event_ids.join(", ")),
    ];
    if let Some(ref key) = record.correction_key {
        lines.push(format!("  Correction: {}", key));
    }
    if !record.editable_entries.is_empty() {
        lines.push(format!("  Editable:   {} entr(ies)", record.editable_entries.len()));
    }
    lines.join("\n")
}

pub fn format_record_json(record: &GeneratedProductRecord) -> Result<String, OrchestrationError> {
    serde_json::to_string_pretty(record).map_err(to_json_error)
}

/// Ordered codes, one per line, then a warning per code absent from the
/// configured priority table.
pub fn format_order_text(ordered: &[String], missing: &[String]) -> String {
    let mut lines: Vec<String> = ordered
        .iter()
        .enumerate()
        .map(|(i, pil)| format!("{:>3}. {}", i + 1, pil))
        .collect();
    for pil in missing {
        lines.push(format!(
            "{} {} is not in the dissemination priority table",
            "warning:".yellow().bold(),
            pil
        ));
    }
    lines.join("\n")
}

pub fn format_validation_text(result: &Result<(), Vec<ValidationError>>) -> String {
    match result {
        Ok(()) => format!("{} configuration is valid", "ok:".green().bold()),
        Err(errors) => {
            let mut lines = vec![format!(
                "{} {} problem(s) found",
                "invalid:".red().bold(),
                errors.len()
            )];
            lines.extend(errors.iter().map(|e| format!("  - {}", e)));
            lines.join("\n")
        }
    }
}
