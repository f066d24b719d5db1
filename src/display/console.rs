use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::reconcile::Renderer;
use crate::state::OperationalState;

pub const NO_DATA_PLACEHOLDER: &str = "No data being published at the moment.";
pub const UPDATED_MESSAGE: &str = "Operational data updated successfully";
pub const DEFAULT_NOTIFICATION_TTL: Duration = Duration::from_secs(3);

const UPDATE_DATE_FIELD: &str = "update_date";

/// Display unit for a field, if it has one.
pub fn unit_for(field: &str) -> Option<&'static str> {
    match field {
        "vibration" => Some("mm/s"),
        "current" | "energy_consumption" => Some("A"),
        "temperature" => Some("°C"),
        "battery_level" | "load_level" => Some("%"),
        _ => None,
    }
}

/// Formats one field value with its unit; `None` for values with nothing to show.
pub fn format_value(field: &str, value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) if s.trim().is_empty() => return None,
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    Some(match unit_for(field) {
        Some(unit) => format!("{} {}", text, unit),
        None => text,
    })
}

struct Notification {
    until: Option<Instant>,
}

/// Line-oriented renderer for terminals and log files.
pub struct ConsoleRenderer<W: Write + Send> {
    out: Mutex<W>,
    notification: Mutex<Notification>,
    notification_ttl: Duration,
}

impl ConsoleRenderer<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            notification: Mutex::new(Notification { until: None }),
            notification_ttl: DEFAULT_NOTIFICATION_TTL,
        }
    }

    pub fn with_notification_ttl(mut self, ttl: Duration) -> Self {
        self.notification_ttl = ttl;
        self
    }

    /// Whether the "updated" indicator is still showing at `now`.
    pub fn notification_visible(&self, now: Instant) -> bool {
        let notification = self.notification.lock().unwrap_or_else(|e| e.into_inner());
        notification.until.is_some_and(|until| now < until)
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }

    fn write_lines(&self, lines: &[String]) {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        let result = lines
            .iter()
            .try_for_each(|line| writeln!(out, "{}", line))
            .and_then(|_| out.flush());
        if let Err(e) = result {
            warn!(error = %e, "Failed to write to console");
        }
    }
}

/// Render lines for a state: one per field, then the render timestamp.
fn render_lines(state: &OperationalState) -> Vec<String> {
    let mut lines = Vec::with_capacity(state.len() + 1);
    let mut any_value = false;

    for (field, value) in state.iter() {
        if field == UPDATE_DATE_FIELD {
            continue;
        }
        match format_value(field, value) {
            Some(text) => {
                any_value = true;
                lines.push(format!("{}: {}", field, text));
            }
            None => lines.push(format!("{}: {}", field, NO_DATA_PLACEHOLDER)),
        }
    }

    if !any_value {
        return vec![NO_DATA_PLACEHOLDER.to_string()];
    }

    lines.push(format!(
        "{}: {}",
        UPDATE_DATE_FIELD,
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    lines
}

impl<W: Write + Send> Renderer for ConsoleRenderer<W> {
    fn render(&self, state: OperationalState) {
        self.write_lines(&render_lines(&state));
    }

    fn notify(&self) {
        {
            let mut notification = self.notification.lock().unwrap_or_else(|e| e.into_inner());
            notification.until = Some(Instant::now() + self.notification_ttl);
        }
        self.write_lines(&[format!("✔ {}", UPDATED_MESSAGE)]);
    }
}
