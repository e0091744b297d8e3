use std::io::Write;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

/// Sentinel prefix the host shell greps stdout for.
const EVENT_PREFIX: &str = "EVENT_NOTIFY_JSON:";

/// Out-of-band progress/error events for the host shell, written as
/// newline-delimited JSON to a stdout handle captured at startup — the
/// logger owns stderr and the log file, so stdout stays clean for events.
/// Delivery is best-effort: a failed write is logged and dropped, never
/// propagated into pipeline state.
#[derive(Clone)]
pub struct EventBus {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    source: String,
}

impl EventBus {
    pub fn to_stdout() -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(std::io::stdout()))),
            source: "kfocus".to_string(),
        }
    }

    /// Events go nowhere; used by tests and tools that embed the pipelines.
    pub fn disabled() -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(std::io::sink()))),
            source: "kfocus".to_string(),
        }
    }

    /// Capture events into a shared buffer (test helper).
    pub fn to_buffer() -> (Self, Arc<Mutex<Vec<u8>>>) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let bus = Self {
            writer: Arc::new(Mutex::new(Box::new(SharedBuffer(buffer.clone())))),
            source: "kfocus".to_string(),
        };
        (bus, buffer)
    }

    pub fn send(&self, event: &str, payload: Value) {
        let enriched = self.enrich(payload);
        let record = json!({ "event": event, "payload": enriched });

        let line = format!("{EVENT_PREFIX}{record}\n");
        let mut writer = match self.writer.lock() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(error) = writer.write_all(line.as_bytes()).and_then(|_| writer.flush()) {
            tracing::debug!(event, error = %error, "Dropped bridge event");
        }
    }

    fn enrich(&self, payload: Value) -> Value {
        let mut map = match payload {
            Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                if !other.is_null() {
                    map.insert("data".to_string(), other);
                }
                map
            }
        };
        map.entry("timestamp".to_string())
            .or_insert(json!(chrono::Utc::now().timestamp()));
        map.entry("source".to_string())
            .or_insert(json!(self.source));
        Value::Object(map)
    }

    // Convenience emitters for the known event set.

    pub fn tags_updated(&self) {
        self.send("tags-updated", json!({ "description": "tag data changed" }));
    }

    pub fn task_completed(&self, task_id: i64, success: bool, result: Value) {
        self.send(
            "task-completed",
            json!({ "task_id": task_id, "success": success, "result": result }),
        );
    }

    pub fn file_processed(&self, file_path: &str, detail: Value) {
        let mut payload = json!({ "file_path": file_path });
        if let (Value::Object(map), Value::Object(extra)) = (&mut payload, detail) {
            map.extend(extra);
        }
        self.send("file-processed", payload);
    }

    pub fn progress(&self, kind: &str, current: u64, total: u64, message: &str) {
        let percentage = if total > 0 {
            (current as f64 / total as f64 * 10000.0).round() / 100.0
        } else {
            0.0
        };
        self.send(
            &format!("{kind}-progress"),
            json!({
                "current": current,
                "total": total,
                "percentage": percentage,
                "message": message,
            }),
        );
    }

    pub fn error_occurred(&self, error_type: &str, message: &str, details: Value) {
        self.send(
            "error-occurred",
            json!({ "error_type": error_type, "message": message, "details": details }),
        );
    }

    pub fn system_status(&self, status: &str, message: &str) {
        self.send(
            "system-status",
            json!({ "status": status, "message": message }),
        );
    }

    pub fn model_validation_failed(&self, capability: &str, model_id: &str, error_message: &str) {
        self.send(
            "model-validation-failed",
            json!({
                "capability": capability,
                "model_id": model_id,
                "error_message": error_message,
            }),
        );
    }

    pub fn rag_retrieval_result(&self, query: &str, sources: Value) {
        self.send(
            "rag-retrieval-result",
            json!({
                "query": query.chars().take(200).collect::<String>(),
                "sources": sources,
            }),
        );
    }
}

struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut inner = self.0.lock().map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::Other, "event buffer poisoned")
        })?;
        inner.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn captured_lines(buffer: &Arc<Mutex<Vec<u8>>>) -> Vec<String> {
        String::from_utf8(buffer.lock().unwrap().clone())
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    #[test]
    fn events_carry_prefix_and_envelope() {
        let (bus, buffer) = EventBus::to_buffer();
        bus.tags_updated();

        let lines = captured_lines(&buffer);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with(EVENT_PREFIX));

        let record: Value =
            serde_json::from_str(lines[0].strip_prefix(EVENT_PREFIX).unwrap()).unwrap();
        assert_eq!(record["event"], "tags-updated");
        assert_eq!(record["payload"]["source"], "kfocus");
        assert!(record["payload"]["timestamp"].is_i64());
    }

    #[test]
    fn progress_percentage_is_bounded() {
        let (bus, buffer) = EventBus::to_buffer();
        bus.progress("multivector", 85, 100, "vectorizing");

        let lines = captured_lines(&buffer);
        let record: Value =
            serde_json::from_str(lines[0].strip_prefix(EVENT_PREFIX).unwrap()).unwrap();
        assert_eq!(record["event"], "multivector-progress");
        assert_eq!(record["payload"]["percentage"], 85.0);
    }

    #[test]
    fn zero_total_progress_is_zero_percent() {
        let (bus, buffer) = EventBus::to_buffer();
        bus.progress("screening", 3, 0, "");
        let lines = captured_lines(&buffer);
        let record: Value =
            serde_json::from_str(lines[0].strip_prefix(EVENT_PREFIX).unwrap()).unwrap();
        assert_eq!(record["payload"]["percentage"], 0.0);
    }

    #[test]
    fn disabled_bus_swallows_events() {
        let bus = EventBus::disabled();
        bus.error_occurred("parse_error", "boom", json!({}));
    }
}
