//! Export formatter: result set to transport bytes

use super::record::LogRecord;
use crate::error::Result;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const CSV_HEADER: [&str; 7] = [
    "timestamp",
    "level",
    "message",
    "emitter",
    "actorId",
    "correlationId",
    "durationMs",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Pretty-printed JSON array of records
    #[default]
    Json,
    /// Seven fixed columns with a header row
    Csv,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(format!("unknown export format: {}", other)),
        }
    }
}

pub fn export(records: &[LogRecord], format: ExportFormat) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_vec_pretty(records)?),
        ExportFormat::Csv => Ok(to_csv(records).into_bytes()),
    }
}

fn to_csv(records: &[LogRecord]) -> String {
    let mut out = CSV_HEADER.join(",");
    out.push('\n');

    for record in records {
        let duration = record.duration_ms.map(|d| d.to_string()).unwrap_or_default();
        let row = [
            record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            record.level.as_str().to_string(),
            record.message.clone(),
            record.emitter.clone().unwrap_or_default(),
            record.actor_id.clone().unwrap_or_default(),
            record.correlation_id.clone().unwrap_or_default(),
            duration,
        ];
        let escaped: Vec<String> = row.iter().map(|field| escape_field(field)).collect();
        out.push_str(&escaped.join(","));
        out.push('\n');
    }

    out
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
