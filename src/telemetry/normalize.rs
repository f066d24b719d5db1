use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

use crate::state::PartialState;

/// Legacy names some producers still publish, mapped onto canonical fields.
const DEFAULT_ALIASES: &[(&str, &str)] = &[("status", "motor_status")];

/// Maps producer field names onto one canonical snake_case spelling.
///
/// Runs once at the parse boundary; everything downstream only ever sees
/// canonical names.
#[derive(Clone, Debug)]
pub struct FieldNormalizer {
    aliases: HashMap<String, String>,
}

impl Default for FieldNormalizer {
    fn default() -> Self {
        Self {
            aliases: DEFAULT_ALIASES
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        }
    }
}

impl FieldNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extra alias. Both sides are normalized first.
    pub fn with_alias(mut self, from: &str, to: &str) -> Self {
        self.aliases.insert(to_snake_case(from), to_snake_case(to));
        self
    }

    /// Canonical name for a single producer field name.
    pub fn canonical_name(&self, field: &str) -> String {
        let snake = to_snake_case(field);
        match self.aliases.get(&snake) {
            Some(target) => target.clone(),
            None => snake,
        }
    }

    /// Normalize the top-level keys of a payload object.
    ///
    /// When two keys land on the same canonical name, the one that was
    /// already spelled canonically wins.
    pub fn normalize(&self, object: Map<String, Value>) -> PartialState {
        let mut fields: HashMap<String, (bool, Value)> = HashMap::with_capacity(object.len());

        for (raw, value) in object {
            let canonical = self.canonical_name(&raw);
            let exact = canonical == raw;

            match fields.get(&canonical) {
                Some((true, _)) if !exact => {
                    debug!(field = %raw, canonical = %canonical, "Dropping variant shadowed by canonical key");
                }
                _ => {
                    fields.insert(canonical, (exact, value));
                }
            }
        }

        fields.into_iter().map(|(k, (_, v))| (k, v)).collect()
    }
}

/// `conveyorCount` -> `conveyor_count`, `motorRPM` -> `motor_rpm`,
/// `input-sensor status` -> `input_sensor_status`.
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.trim().chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c == '-' || c == ' ' || c == '_' {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }

        if c.is_uppercase() {
            let prev = if i > 0 { chars.get(i - 1) } else { None };
            let next = chars.get(i + 1);
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if boundary && !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out.trim_end_matches('_').to_string()
}
