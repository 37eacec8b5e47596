//! JSON rendering of runtime values.
//!
//! Used by expression `Display` for constants and by callers that want to print
//! execution results. All output is deterministic (object keys are sorted).
//!
//! # Examples
//!
//! ```
//! use chainql::Value;
//! use chainql::output::{to_json, to_json_pretty};
//!
//! let value = Value::Integer(42);
//!
//! assert_eq!(to_json(&value), "42");
//! assert_eq!(to_json_pretty(&value), "42");
//! ```

use std::collections::HashMap;

use crate::value::Value;

pub struct JsonPrinter {
    pretty: bool,
}

impl JsonPrinter {
    pub fn new(pretty: bool) -> Self {
        JsonPrinter { pretty }
    }

    pub fn print(&self, value: &Value) -> String {
        let mut out = String::new();
        self.write_value(&mut out, value, 0);
        out
    }

    fn write_value(&self, out: &mut String, value: &Value, indent: usize) {
        match value {
            Value::Null => out.push_str("null"),
            Value::Boolean(b) => out.push_str(&b.to_string()),
            Value::Integer(n) => out.push_str(&n.to_string()),
            Value::Float(n) => out.push_str(&n.to_string()),
            Value::String(s) => self.write_string(out, s),
            Value::Array(items) => {
                let refs: Vec<&Value> = items.iter().collect();
                self.write_array(out, &refs, indent);
            }
            Value::Object(map) => self.write_object(out, sorted_entries(map), indent),
            Value::Group { key, elements } => {
                let elements = Value::Array(elements.clone());
                let entries = vec![("elements", &elements), ("key", key.as_ref())];
                self.write_object(out, entries, indent);
            }
        }
    }

    fn write_array(&self, out: &mut String, items: &[&Value], indent: usize) {
        if items.is_empty() {
            out.push_str("[]");
            return;
        }

        out.push('[');
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            if self.pretty {
                out.push('\n');
                self.write_indent(out, indent + 1);
            }
            self.write_value(out, item, indent + 1);
        }
        if self.pretty {
            out.push('\n');
            self.write_indent(out, indent);
        }
        out.push(']');
    }

    fn write_object(&self, out: &mut String, entries: Vec<(&str, &Value)>, indent: usize) {
        if entries.is_empty() {
            out.push_str("{}");
            return;
        }

        out.push('{');
        for (i, (key, value)) in entries.into_iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            if self.pretty {
                out.push('\n');
                self.write_indent(out, indent + 1);
            }
            self.write_string(out, key);
            out.push(':');
            if self.pretty {
                out.push(' ');
            }
            self.write_value(out, value, indent + 1);
        }
        if self.pretty {
            out.push('\n');
            self.write_indent(out, indent);
        }
        out.push('}');
    }

    fn write_indent(&self, out: &mut String, level: usize) {
        out.push_str(&"  ".repeat(level));
    }

    fn write_string(&self, out: &mut String, s: &str) {
        out.push('"');
        for c in s.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
                c => out.push(c),
            }
        }
        out.push('"');
    }
}

fn sorted_entries(map: &HashMap<String, Value>) -> Vec<(&str, &Value)> {
    let mut entries: Vec<(&str, &Value)> = map.iter().map(|(k, v)| (k.as_str(), v)).collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

/// Converts a Value to compact JSON.
///
/// ```
/// use chainql::Value;
/// use chainql::output::to_json;
///
/// let value = Value::Array(vec![Value::Integer(1), Value::String("a".into())]);
/// assert_eq!(to_json(&value), r#"[1,"a"]"#);
/// ```
pub fn to_json(value: &Value) -> String {
    JsonPrinter::new(false).print(value)
}

/// Converts a Value to JSON with 2-space indentation.
pub fn to_json_pretty(value: &Value) -> String {
    JsonPrinter::new(true).print(value)
}
