use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Turns a `json!({...})` object into an event payload; anything else is
/// an empty payload.
pub fn event_payload(value: Value) -> EventPayload {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Session event log, one compact JSON object per line in `events.jsonl`.
///
/// Every event carries `type`, `session_id`, `seq` and `ts`. `seq` counts
/// from 1 per writer so readers can order events that share a timestamp.
/// Payload keys other than `seq` are merged last and may override defaults.
#[derive(Debug)]
pub struct EventWriter {
    path: PathBuf,
    session_id: String,
    next_seq: Mutex<u64>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            session_id: session_id.into(),
            next_seq: Mutex::new(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut next_seq = self
            .next_seq
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;

        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "session_id".to_string(),
            Value::String(self.session_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            if key != "seq" {
                event.insert(key, value);
            }
        }
        event.insert("seq".to_string(), Value::from(*next_seq));

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .with_context(|| format!("failed to append to {}", self.path.display()))?;

        *next_seq += 1;
        Ok(Value::Object(event))
    }
}

/// Reads an event log back in `seq` order. Lines that are not JSON objects
/// are skipped.
pub fn read_events(path: &Path) -> anyhow::Result<Vec<EventPayload>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mut events: Vec<EventPayload> = content
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter_map(|value| match value {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect();
    events.sort_by_key(|event| event.get("seq").and_then(Value::as_u64).unwrap_or(0));
    Ok(events)
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use serde_json::json;

    use super::*;

    #[test]
    fn emit_writes_defaults_and_payload() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("chat_1").join("events.jsonl");
        let writer = EventWriter::new(&path, "chat_1");

        let emitted = writer.emit(
            "turn_started",
            event_payload(json!({ "instruction": "make it red" })),
        )?;
        assert_eq!(emitted["seq"], json!(1));

        let events = read_events(&path)?;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], json!("turn_started"));
        assert_eq!(events[0]["session_id"], json!("chat_1"));
        assert_eq!(events[0]["instruction"], json!("make it red"));
        let ts = events[0]["ts"].as_str().unwrap_or_default();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
        Ok(())
    }

    #[test]
    fn payload_overrides_defaults_but_not_seq() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "chat_1");

        let emitted = writer.emit(
            "turn_started",
            event_payload(json!({ "type": "override", "session_id": "other", "seq": 99 })),
        )?;
        assert_eq!(emitted["type"], json!("override"));
        assert_eq!(emitted["session_id"], json!("other"));
        assert_eq!(emitted["seq"], json!(1));
        Ok(())
    }

    #[test]
    fn read_events_orders_by_seq() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "chat_1");
        writer.emit("one", EventPayload::new())?;
        writer.emit("two", EventPayload::new())?;
        fs::OpenOptions::new()
            .append(true)
            .open(&path)?
            .write_all(b"not json\n")?;

        let types: Vec<String> = read_events(&path)?
            .iter()
            .filter_map(|event| event.get("type").and_then(Value::as_str).map(str::to_string))
            .collect();
        assert_eq!(types, vec!["one", "two"]);
        Ok(())
    }

    #[test]
    fn non_object_payloads_are_empty() {
        assert!(event_payload(json!([1, 2])).is_empty());
    }
}
