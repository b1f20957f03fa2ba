//! Vertical card display for stored observations.
//!
//! Renders a single-row RecordBatch as a grouped, human-readable card with
//! type-aware formatting for the column types the observations table uses.

use std::fmt::Write;

use arrow::array::{Array, BooleanArray, Float64Array, Int32Array, Int64Array, StringArray};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};

// ── Schema section groupings ──

const IDENTITY: &[&str] = &["observation_id", "source_uri", "license"];

const OBSERVER: &[&str] = &["observer_login", "observer_name"];

const WHEN_WHERE: &[&str] = &["observed_on", "location", "latitude", "longitude"];

const ASSET: &[&str] = &["image_url", "image_local_path"];

const QUALITY: &[&str] = &[
    "quality_grade",
    "num_identification_agreements",
    "num_identification_disagreements",
];

const TIMESTAMPS: &[&str] = &["created_at"];

// ── Public API ──

/// Print a single observation as a vertical card grouped by schema section.
pub fn print_observation_card(batch: &RecordBatch) {
    print!("{}", render_observation_card(batch));
}

pub fn render_observation_card(batch: &RecordBatch) -> String {
    let mut out = String::new();
    let id = cell(batch, "observation_id").unwrap_or_else(|| "?".into());
    let _ = writeln!(out, "=== Observation {id} ===");
    if let Some(place) = cell(batch, "location") {
        let _ = writeln!(out, "{place}");
    }
    out.push('\n');

    render_section(&mut out, batch, "Identity", IDENTITY);
    render_section(&mut out, batch, "Observer", OBSERVER);
    render_section(&mut out, batch, "When & Where", WHEN_WHERE);
    render_section(&mut out, batch, "Asset", ASSET);
    render_section(&mut out, batch, "Quality", QUALITY);
    render_section(&mut out, batch, "Timestamps", TIMESTAMPS);
    out
}

// ── Section rendering ──

fn render_section(out: &mut String, batch: &RecordBatch, header: &str, cols: &[&str]) {
    let rows: Vec<(&str, String)> = cols
        .iter()
        .filter_map(|&col| cell(batch, col).map(|v| (col, v)))
        .collect();
    if rows.is_empty() {
        return;
    }

    let _ = writeln!(out, "{header}");
    for (col_name, value) in rows {
        let _ = writeln!(out, "  {col_name:<34} {value}");
    }
    out.push('\n');
}

/// Formatted first-row value of a column, `None` when absent or null.
fn cell(batch: &RecordBatch, col_name: &str) -> Option<String> {
    let idx = batch.schema().index_of(col_name).ok()?;
    let col = batch.column(idx);
    if col.is_null(0) {
        return None;
    }

    let any = col.as_any();
    let value = match col.data_type() {
        DataType::Utf8 => any.downcast_ref::<StringArray>()?.value(0).to_string(),
        DataType::Int32 => any.downcast_ref::<Int32Array>()?.value(0).to_string(),
        DataType::Int64 => any.downcast_ref::<Int64Array>()?.value(0).to_string(),
        DataType::Float64 => format!("{:.6}", any.downcast_ref::<Float64Array>()?.value(0)),
        DataType::Boolean => {
            let yes = any.downcast_ref::<BooleanArray>()?.value(0);
            if yes { "yes" } else { "no" }.to_string()
        }
        // Dates, timestamps and anything else use Arrow's display formatting.
        _ => {
            let options = FormatOptions::default();
            ArrayFormatter::try_new(col.as_ref(), &options)
                .ok()?
                .value(0)
                .to_string()
        }
    };
    Some(value)
}
