//! Segment line formats
//!
//! Two [`LineCodec`] implementations share one interface and are chosen once
//! from configuration:
//!
//! - [`JsonLineCodec`]: one JSON object per line, every record field kept
//! - [`LegacyLineCodec`]: `timestamp [LEVEL] [emitter] message`
//!
//! The read path does not depend on the configured format: [`decode_line`]
//! recognises both, so segments written under an older setting stay readable.

use super::record::{LogRecord, Severity};
use crate::error::Result;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const LOCALE_FORMAT: &str = "%d %b %Y %H:%M:%S%.3f UTC";

/// How timestamps are rendered on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampFormat {
    /// `2026-10-18T09:30:00.000Z`
    #[default]
    Iso,
    /// Unix milliseconds
    Epoch,
    /// `18 Oct 2026 09:30:00.000 UTC`
    Locale,
}

impl TimestampFormat {
    pub fn render(&self, ts: &DateTime<Utc>) -> Value {
        match self {
            TimestampFormat::Iso => Value::from(ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
            TimestampFormat::Epoch => Value::from(ts.timestamp_millis()),
            TimestampFormat::Locale => Value::from(ts.format(LOCALE_FORMAT).to_string()),
        }
    }

    fn render_text(&self, ts: &DateTime<Utc>) -> String {
        match self.render(ts) {
            Value::String(s) => s,
            other => other.to_string(),
        }
    }
}

/// Parse a timestamp written in any [`TimestampFormat`]
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, LOCALE_FORMAT) {
        return Some(naive.and_utc());
    }
    s.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis)
}

/// Line format written to the active segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineFormat {
    #[default]
    Structured,
    Legacy,
}

/// Serialization strategy for one segment line
pub trait LineCodec: Send + Sync {
    /// Encode a record as a single line, without the trailing newline
    fn encode(&self, record: &LogRecord) -> Result<String>;

    /// Decode one line written by this codec
    fn decode(&self, line: &str) -> Option<LogRecord>;
}

/// Build the codec selected by configuration
pub fn codec_for(format: LineFormat, timestamps: TimestampFormat) -> Box<dyn LineCodec> {
    match format {
        LineFormat::Structured => Box::new(JsonLineCodec { timestamps }),
        LineFormat::Legacy => Box::new(LegacyLineCodec { timestamps }),
    }
}

/// Decode a line in either format; `None` for malformed lines
pub fn decode_line(line: &str) -> Option<LogRecord> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('{') {
        decode_json(trimmed)
    } else {
        decode_legacy(trimmed)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct JsonLineCodec {
    pub timestamps: TimestampFormat,
}

impl LineCodec for JsonLineCodec {
    fn encode(&self, record: &LogRecord) -> Result<String> {
        let mut value = serde_json::to_value(record)?;
        if let Value::Object(ref mut map) = value {
            map.insert("timestamp".to_string(), self.timestamps.render(&record.timestamp));
        }
        Ok(serde_json::to_string(&value)?)
    }

    fn decode(&self, line: &str) -> Option<LogRecord> {
        decode_json(line)
    }
}

fn decode_json(line: &str) -> Option<LogRecord> {
    let mut value: Value = serde_json::from_str(line).ok()?;
    let map = value.as_object_mut()?;
    let ts = parse_timestamp(map.get("timestamp")?)?;
    map.insert(
        "timestamp".to_string(),
        Value::from(ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    serde_json::from_value(value).ok()
}

#[derive(Debug, Clone, Copy)]
pub struct LegacyLineCodec {
    pub timestamps: TimestampFormat,
}

impl LineCodec for LegacyLineCodec {
    fn encode(&self, record: &LogRecord) -> Result<String> {
        Ok(format!(
            "{} [{}] [{}] {}",
            self.timestamps.render_text(&record.timestamp),
            record.level.as_str().to_uppercase(),
            record.emitter.as_deref().unwrap_or(""),
            record.message.replace(['\r', '\n'], " ")
        ))
    }

    fn decode(&self, line: &str) -> Option<LogRecord> {
        decode_legacy(line)
    }
}

fn decode_legacy(line: &str) -> Option<LogRecord> {
    // The timestamp may itself contain spaces (locale form), so look for the
    // first bracket pair holding a known severity.
    let mut search_from = 0;
    let (ts_end, level, rest_start) = loop {
        let open = search_from + line[search_from..].find(" [")?;
        let close = open + 2 + line[open + 2..].find(']')?;
        if let Ok(level) = line[open + 2..close].parse::<Severity>() {
            break (open, level, close + 1);
        }
        search_from = open + 2;
    };

    let timestamp = parse_timestamp_str(&line[..ts_end])?;
    let rest = line[rest_start..].trim_start();

    let (emitter, message) = match rest.strip_prefix('[') {
        Some(after) => {
            let close = after.find(']')?;
            let emitter = &after[..close];
            let message = after[close + 1..].strip_prefix(' ').unwrap_or(&after[close + 1..]);
            ((!emitter.is_empty()).then(|| emitter.to_string()), message)
        }
        None => (None, rest),
    };

    Some(LogRecord {
        timestamp,
        level,
        message: message.to_string(),
        metadata: None,
        emitter,
        correlation_id: None,
        actor_id: None,
        duration_ms: None,
        stack_trace: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::record::LogContext;
    use serde_json::json;

    fn sample() -> LogRecord {
        let ts = DateTime::parse_from_rfc3339("2026-10-18T09:30:00.250Z")
            .unwrap()
            .with_timezone(&Utc);
        let ctx = LogContext::new().emitter("decks").actor("u-3").duration(812.0);
        LogRecord::from_context(Severity::Warn, "Slide deck build slow", ctx).with_timestamp(ts)
    }

    #[test]
    fn test_json_codec_all_timestamp_forms() {
        for timestamps in [TimestampFormat::Iso, TimestampFormat::Epoch, TimestampFormat::Locale] {
            let codec = JsonLineCodec { timestamps };
            let line = codec.encode(&sample()).unwrap();
            assert!(!line.contains('\n'));
            assert_eq!(decode_line(&line), Some(sample()), "format {:?}", timestamps);
        }
    }

    #[test]
    fn test_epoch_rendered_as_number() {
        let codec = JsonLineCodec { timestamps: TimestampFormat::Epoch };
        let line = codec.encode(&sample()).unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert!(value["timestamp"].is_i64());
    }

    #[test]
    fn test_json_omits_absent_fields() {
        let record = LogRecord::new(Severity::Info, "plain");
        let line = JsonLineCodec { timestamps: TimestampFormat::Iso }.encode(&record).unwrap();
        assert!(!line.contains("emitter"));
        assert!(!line.contains("durationMs"));
    }

    #[test]
    fn test_legacy_line_layout() {
        let codec = LegacyLineCodec { timestamps: TimestampFormat::Iso };
        let line = codec.encode(&sample()).unwrap();
        assert_eq!(line, "2026-10-18T09:30:00.250Z [WARN] [decks] Slide deck build slow");
    }

    #[test]
    fn test_legacy_decode_keeps_core_fields() {
        for timestamps in [TimestampFormat::Iso, TimestampFormat::Epoch, TimestampFormat::Locale] {
            let codec = LegacyLineCodec { timestamps };
            let decoded = decode_line(&codec.encode(&sample()).unwrap()).unwrap();
            assert_eq!(decoded.timestamp, sample().timestamp);
            assert_eq!(decoded.level, Severity::Warn);
            assert_eq!(decoded.emitter.as_deref(), Some("decks"));
            assert_eq!(decoded.message, "Slide deck build slow");
            assert!(decoded.actor_id.is_none());
        }
    }

    #[test]
    fn test_legacy_without_emitter() {
        let decoded = decode_line("2026-10-18T09:30:00.000Z [ERROR] [] upload [failed]").unwrap();
        assert_eq!(decoded.level, Severity::Error);
        assert!(decoded.emitter.is_none());
        assert_eq!(decoded.message, "upload [failed]");
    }

    #[test]
    fn test_malformed_lines() {
        assert!(decode_line("").is_none());
        assert!(decode_line("{\"timestamp\": \"yesterday\"").is_none());
        assert!(decode_line("{\"level\":\"info\",\"message\":\"no time\"}").is_none());
        assert!(decode_line("just some text").is_none());
        assert!(decode_line("not-a-time [INFO] [x] hi").is_none());
    }

    #[test]
    fn test_parse_timestamp_values() {
        let expected = DateTime::from_timestamp_millis(1_760_000_000_000).unwrap();
        assert_eq!(parse_timestamp(&json!(1_760_000_000_000i64)), Some(expected));
        assert_eq!(parse_timestamp(&json!("1760000000000")), Some(expected));
        assert!(parse_timestamp(&json!(true)).is_none());
    }
}
