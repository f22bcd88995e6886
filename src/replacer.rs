//! Inline marker substitution for promoted file content.
//!
//! A marker is a trailing comment on a `key: value` line naming the field
//! whose value should replace `value`:
//!
//! ```yaml
//! image: ghcr.io/podtato-head/left-arm:0.2.5  # {"keptn.git-promotion.replacewith":"data.image.tag"}
//! ```
//!
//! Lines without a marker, or whose marker names a field absent from the
//! [`FieldMap`], are left untouched. Malformed markers are never an error.

use regex::Regex;
use tracing::{debug, warn};

use crate::event::FieldMap;

/// Marker namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "keptn.git-promotion";

/// Rewrites marked values in text content.
#[derive(Debug, Clone)]
pub struct ContentReplacer {
    namespace: String,
}

impl Default for ContentReplacer {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl ContentReplacer {
    /// Creates a replacer for markers of the form `{"<namespace>.replacewith":"<field>"}`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Returns the marker namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the exact marker annotation for a field name.
    pub fn annotation(&self, field: &str) -> String {
        format!(r#"{{"{}.replacewith":"{}"}}"#, self.namespace, field)
    }

    /// Substitutes every marked value whose field is present in `fields`.
    pub fn replace(&self, content: &str, fields: &FieldMap) -> String {
        let mut replaced = content.to_string();
        for (field, value) in fields.iter() {
            let annotation = self.annotation(field);
            // Cheap pre-check before splitting and running the regex
            if replaced.contains(&annotation) {
                replaced = replace_value(&replaced, &annotation, value);
            }
        }
        replaced
    }
}

/// Rewrites the value on every line ending in `annotation`.
///
/// The value is inserted trimmed; surrounding whitespace would otherwise
/// shift into the key or marker group on the next pass.
fn replace_value(content: &str, annotation: &str, value: &str) -> String {
    let value = value.trim();
    let pattern = format!(
        r"^(?P<key>.*?:\s+)(?P<value>.*?)(?P<marker>\s+#\s*{})(?P<eol>\s*)$",
        regex::escape(annotation)
    );
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => {
            warn!(annotation, error = %e, "Could not build marker pattern, leaving content untouched");
            return content.to_string();
        }
    };

    let mut lines: Vec<String> = Vec::new();
    for line in content.split('\n') {
        if !line.contains(annotation) {
            lines.push(line.to_string());
            continue;
        }
        match re.captures(line) {
            Some(caps) => {
                let rewritten = format!(
                    "{}{}{}{}",
                    &caps["key"], value, &caps["marker"], &caps["eol"]
                );
                if rewritten != line {
                    debug!(from = %line, to = %rewritten, "Replaced marked value");
                }
                lines.push(rewritten);
            }
            None => {
                debug!(line, "Marker found on a line without a key/value pair, skipping");
                lines.push(line.to_string());
            }
        }
    }
    lines.join("\n")
}
