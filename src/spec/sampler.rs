//! Schema-driven value synthesis for parameters and request bodies

use serde_json::{Map, Value, json};

use super::refs::deref;

const SAMPLE_UUID: &str = "00000000-0000-4000-8000-000000000000";
const SAMPLE_EMAIL: &str = "user@example.com";
const SAMPLE_DATE: &str = "2024-01-02";
const SAMPLE_DATETIME: &str = "2024-01-02T03:04:05Z";
const SAMPLE_URL: &str = "https://example.com";

/// Array length used when the schema gives no `maxItems`.
const DEFAULT_ARRAY_CAP: u64 = 3;

/// Synthesizes concrete values from JSON-Schema-like fragments.
///
/// Holds the enclosing document so `$ref` nodes inside schemas resolve
/// before inspection.
pub struct Sampler<'a> {
    doc: &'a Value,
}

impl<'a> Sampler<'a> {
    pub fn new(doc: &'a Value) -> Self {
        Self { doc }
    }

    /// Sample a value for a schema fragment (request bodies, object
    /// properties). Priority: enum, allOf, oneOf, anyOf, declared type,
    /// string fallback.
    pub fn sample_schema(&self, schema: &Value, name_hint: Option<&str>) -> Value {
        let schema = deref(self.doc, schema);

        if let Some(v) = pick_enum(schema) {
            return v;
        }

        if let Some(all_of) = schema.get("allOf").and_then(Value::as_array) {
            if !all_of.is_empty() {
                return self.sample_schema(&self.merge_all_of(all_of), name_hint);
            }
        }

        if let Some(one_of) = schema.get("oneOf").and_then(Value::as_array) {
            if !one_of.is_empty() {
                // first branch yielding a non-null sample
                for branch in one_of {
                    let sampled = self.sample_schema(branch, name_hint);
                    if !sampled.is_null() {
                        return sampled;
                    }
                }
                return Value::Null;
            }
        }

        if let Some(any_of) = schema.get("anyOf").and_then(Value::as_array) {
            if let Some(first) = any_of.first() {
                return self.sample_schema(first, name_hint);
            }
        }

        match schema.get("type").and_then(Value::as_str).unwrap_or("") {
            "object" => self.sample_object(schema),
            "array" => self.sample_array(schema, name_hint),
            "integer" => coerce_number(schema, true),
            "number" => coerce_number(schema, false),
            "boolean" => Value::Bool(coerce_boolean(schema)),
            "null" => Value::Null,
            // "string" and untyped schemas share the string rule
            _ => Value::String(coerce_string(schema, name_hint)),
        }
    }

    /// Scalar sample for a parameter object (`{name, in, schema, ...}`),
    /// rendered as the string that goes into the URL.
    pub fn sample_param_value(&self, param: &Value) -> String {
        let name = param.get("name").and_then(Value::as_str);
        let empty = json!({});
        let schema = deref(self.doc, param.get("schema").unwrap_or(&empty));

        self.scalar_sample(schema, name)
    }

    fn scalar_sample(&self, schema: &Value, name_hint: Option<&str>) -> String {
        if let Some(v) = pick_enum(schema) {
            return scalar_to_string(&v);
        }

        match schema.get("type").and_then(Value::as_str).unwrap_or("") {
            "integer" => scalar_to_string(&coerce_number(schema, true)),
            "number" => scalar_to_string(&coerce_number(schema, false)),
            "boolean" => coerce_boolean(schema).to_string(),
            _ => {
                for key in ["oneOf", "anyOf"] {
                    if let Some(first) = schema
                        .get(key)
                        .and_then(Value::as_array)
                        .and_then(|a| a.first())
                    {
                        let first = deref(self.doc, first);
                        if first.get("type").is_some() {
                            return self.scalar_sample(first, name_hint);
                        }
                    }
                }
                coerce_string(schema, name_hint)
            }
        }
    }

    /// Merge `allOf` member property sets into one object schema.
    fn merge_all_of(&self, members: &[Value]) -> Value {
        let mut properties = Map::new();
        let mut required: Vec<Value> = Vec::new();
        let mut extra_keys = Map::new();

        for member in members {
            let member = deref(self.doc, member);
            if let Some(props) = member.get("properties").and_then(Value::as_object) {
                for (k, v) in props {
                    properties.insert(k.clone(), v.clone());
                }
            }
            if let Some(req) = member.get("required").and_then(Value::as_array) {
                for r in req {
                    if !required.contains(r) {
                        required.push(r.clone());
                    }
                }
            }
            for key in ["minProperties", "additionalProperties"] {
                if let Some(v) = member.get(key) {
                    extra_keys.insert(key.to_string(), v.clone());
                }
            }
        }

        let mut merged = Map::new();
        merged.insert("type".to_string(), json!("object"));
        merged.insert("properties".to_string(), Value::Object(properties));
        merged.insert("required".to_string(), Value::Array(required));
        merged.extend(extra_keys);
        Value::Object(merged)
    }

    fn sample_object(&self, schema: &Value) -> Value {
        let empty_map = Map::new();
        let properties = schema
            .get("properties")
            .and_then(Value::as_object)
            .unwrap_or(&empty_map);
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let min_properties = schema
            .get("minProperties")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;

        let mut out = Map::new();
        for (key, prop) in properties {
            if required.contains(&key.as_str()) {
                out.insert(key.clone(), self.sample_schema(prop, Some(key)));
            }
        }
        // required keys may not all be declared; give them a string each
        for key in &required {
            if !out.contains_key(*key) {
                out.insert(
                    key.to_string(),
                    Value::String(coerce_string(&json!({}), Some(key))),
                );
            }
        }

        if out.len() < min_properties {
            for (key, prop) in properties {
                if out.len() >= min_properties {
                    break;
                }
                if !out.contains_key(key) {
                    out.insert(key.clone(), self.sample_schema(prop, Some(key)));
                }
            }
        }

        match schema.get("additionalProperties") {
            Some(Value::Bool(true)) => {
                let mut n = 0usize;
                loop {
                    n += 1;
                    let key = if n == 1 {
                        "extra".to_string()
                    } else {
                        format!("extra{}", n)
                    };
                    out.insert(key, json!("1"));
                    if n >= 1 && out.len() >= min_properties {
                        break;
                    }
                }
            }
            Some(extra_schema) if extra_schema.is_object() => {
                out.insert(
                    "extra".to_string(),
                    self.sample_schema(extra_schema, Some("extra")),
                );
            }
            _ => {}
        }

        Value::Object(out)
    }

    fn sample_array(&self, schema: &Value, name_hint: Option<&str>) -> Value {
        let empty = json!({});
        let items = schema.get("items").unwrap_or(&empty);
        let min_items = schema.get("minItems").and_then(Value::as_u64).unwrap_or(0);
        let cap = schema
            .get("maxItems")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_ARRAY_CAP);

        let count = min_items.max(1).min(cap.max(1));
        let sample = self.sample_schema(items, name_hint);
        Value::Array(std::iter::repeat_n(sample, count as usize).collect())
    }
}

/// First scalar-typed, non-empty enum entry, if any.
fn pick_enum(schema: &Value) -> Option<Value> {
    let entries = schema.get("enum").and_then(Value::as_array)?;
    if entries.is_empty() {
        return None;
    }
    for entry in entries {
        match entry {
            Value::String(s) if !s.is_empty() => return Some(entry.clone()),
            Value::Number(_) | Value::Bool(_) => return Some(entry.clone()),
            _ => {}
        }
    }
    Some(entries[0].clone())
}

fn coerce_number(schema: &Value, integer: bool) -> Value {
    for key in ["example", "default"] {
        if let Some(v) = schema.get(key) {
            if v.is_number() {
                return v.clone();
            }
        }
    }

    let minimum = schema.get("minimum").and_then(Value::as_f64);
    let maximum = schema.get("maximum").and_then(Value::as_f64);
    let picked = match (minimum, maximum) {
        (Some(lo), Some(hi)) => (lo + hi) / 2.0,
        (Some(lo), None) => lo,
        (None, Some(hi)) => hi,
        (None, None) => 1.0,
    };

    if integer {
        json!(picked.floor() as i64)
    } else {
        json!(picked)
    }
}

fn coerce_boolean(schema: &Value) -> bool {
    for key in ["example", "default"] {
        if let Some(b) = schema.get(key).and_then(Value::as_bool) {
            return b;
        }
    }
    true
}

fn coerce_string(schema: &Value, name_hint: Option<&str>) -> String {
    let raw = raw_string_sample(schema, name_hint);
    clamp_string(raw, schema)
}

fn raw_string_sample(schema: &Value, name_hint: Option<&str>) -> String {
    if let Some(example) = schema.get("example").and_then(Value::as_str) {
        if !example.is_empty() {
            return example.to_string();
        }
    }
    if let Some(v) = pick_enum(schema) {
        return scalar_to_string(&v);
    }

    let format = schema
        .get("format")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_lowercase();
    match format.as_str() {
        "uuid" => return SAMPLE_UUID.to_string(),
        "date" => return SAMPLE_DATE.to_string(),
        "date-time" | "datetime" | "rfc3339" => return SAMPLE_DATETIME.to_string(),
        "email" => return SAMPLE_EMAIL.to_string(),
        "uri" | "url" => return SAMPLE_URL.to_string(),
        _ => {}
    }

    if let Some(hint) = name_hint {
        let n = hint.to_lowercase();
        if matches!(n.as_str(), "id" | "user_id" | "uid") {
            return "1".to_string();
        }
        if matches!(n.as_str(), "page" | "p") {
            return "1".to_string();
        }
        if n.contains("name") {
            return "alice".to_string();
        }
        if n.contains("query") || matches!(n.as_str(), "q" | "search") {
            return "test".to_string();
        }
    }
    "1".to_string()
}

/// Repeat to satisfy `minLength`, truncate to `maxLength`.
fn clamp_string(mut s: String, schema: &Value) -> String {
    let min_len = schema.get("minLength").and_then(Value::as_u64).unwrap_or(0) as usize;
    let max_len = schema.get("maxLength").and_then(Value::as_u64);

    if min_len > 0 && !s.is_empty() {
        let unit = s.clone();
        while s.chars().count() < min_len {
            s.push_str(&unit);
        }
    }
    if let Some(max) = max_len {
        let max = max as usize;
        if s.chars().count() > max {
            s = s.chars().take(max).collect();
        }
    }
    s
}

fn scalar_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Expand a single OpenAPI server object's `{variable}` templates using
/// the variable's first enum value, else its default, else empty string.
pub fn fill_server_variables(server: &Value) -> Option<String> {
    let url = server.get("url").and_then(Value::as_str)?;
    if url.is_empty() {
        return None;
    }
    let mut out = url.to_string();
    if let Some(vars) = server.get("variables").and_then(Value::as_object) {
        for (name, spec) in vars {
            let replacement = spec
                .get("enum")
                .and_then(Value::as_array)
                .and_then(|a| a.first())
                .map(scalar_to_string)
                .or_else(|| spec.get("default").map(scalar_to_string))
                .unwrap_or_default();
            out = out.replace(&format!("{{{}}}", name), &replacement);
        }
    }
    Some(out)
}

// ---------------------------------------------------------------------------
// Best-effort body validation (diagnostic only, never a gate)
// ---------------------------------------------------------------------------

/// Result of checking a synthesized body against its schema.
#[derive(Debug, Clone)]
pub struct BodyCheck {
    pub ok: bool,
    pub message: Option<String>,
}

impl<'a> Sampler<'a> {
    /// Best-effort structural check of `value` against `schema`. This is
    /// not full JSON-Schema validation; failures are reported for
    /// diagnostics and never block request synthesis.
    pub fn validate(&self, schema: &Value, value: &Value) -> BodyCheck {
        match self.check(schema, value, "$") {
            Ok(()) => BodyCheck {
                ok: true,
                message: None,
            },
            Err(message) => BodyCheck {
                ok: false,
                message: Some(message),
            },
        }
    }

    fn check(&self, schema: &Value, value: &Value, path: &str) -> Result<(), String> {
        let schema = deref(self.doc, schema);

        if let Some(entries) = schema.get("enum").and_then(Value::as_array) {
            if !entries.is_empty() && !entries.contains(value) {
                return Err(format!("{}: value not in enum", path));
            }
        }

        let declared = schema.get("type").and_then(Value::as_str);
        if let Some(t) = declared {
            let matches = match t {
                "object" => value.is_object(),
                "array" => value.is_array(),
                "string" => value.is_string(),
                "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                "null" => value.is_null(),
                _ => true,
            };
            if !matches {
                return Err(format!("{}: expected type {}", path, t));
            }
        }

        match declared {
            Some("object") => {
                let obj = value.as_object().expect("checked above");
                if let Some(required) = schema.get("required").and_then(Value::as_array) {
                    for key in required.iter().filter_map(Value::as_str) {
                        if !obj.contains_key(key) {
                            return Err(format!("{}: missing required key '{}'", path, key));
                        }
                    }
                }
                let empty_map = Map::new();
                let properties = schema
                    .get("properties")
                    .and_then(Value::as_object)
                    .unwrap_or(&empty_map);
                if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
                    for key in obj.keys() {
                        if !properties.contains_key(key) {
                            return Err(format!(
                                "{}: additional property '{}' not allowed",
                                path, key
                            ));
                        }
                    }
                }
                for (key, prop_schema) in properties {
                    if let Some(v) = obj.get(key) {
                        self.check(prop_schema, v, &format!("{}.{}", path, key))?;
                    }
                }
            }
            Some("array") => {
                let arr = value.as_array().expect("checked above");
                if let Some(min) = schema.get("minItems").and_then(Value::as_u64) {
                    if (arr.len() as u64) < min {
                        return Err(format!("{}: fewer than {} items", path, min));
                    }
                }
                if let Some(max) = schema.get("maxItems").and_then(Value::as_u64) {
                    if (arr.len() as u64) > max {
                        return Err(format!("{}: more than {} items", path, max));
                    }
                }
                if let Some(items) = schema.get("items") {
                    for (i, item) in arr.iter().enumerate() {
                        self.check(items, item, &format!("{}[{}]", path, i))?;
                    }
                }
            }
            Some("string") => {
                let s = value.as_str().expect("checked above");
                let len = s.chars().count() as u64;
                if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
                    if len < min {
                        return Err(format!("{}: shorter than minLength {}", path, min));
                    }
                }
                if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
                    if len > max {
                        return Err(format!("{}: longer than maxLength {}", path, max));
                    }
                }
            }
            Some("integer") | Some("number") => {
                let n = value.as_f64().unwrap_or(0.0);
                if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
                    if n < min {
                        return Err(format!("{}: below minimum {}", path, min));
                    }
                }
                if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
                    if n > max {
                        return Err(format!("{}: above maximum {}", path, max));
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}
