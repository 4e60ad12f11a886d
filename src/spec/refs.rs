//! Local `$ref` (JSON pointer) resolution

use serde_json::Value;

/// Maximum `$ref` chain length followed before giving up; guards against
/// reference cycles in hostile documents.
const MAX_REF_DEPTH: usize = 16;

/// Outcome of resolving a single `$ref` string.
///
/// External references and dangling pointers are non-fatal: callers get an
/// explicit `Unresolved` instead of an ambiguous pass-through value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolved<'a> {
    Value(&'a Value),
    Unresolved(&'a str),
}

/// Resolve a local JSON pointer like `#/components/schemas/User`.
///
/// Only `#/` fragments are supported; anything else (URLs, file refs) is
/// `Unresolved`, as is any pointer with a missing segment.
pub fn resolve_pointer<'a>(doc: &'a Value, reference: &'a str) -> Resolved<'a> {
    let Some(pointer) = reference.strip_prefix("#/") else {
        return Resolved::Unresolved(reference);
    };

    let mut current = doc;
    for segment in pointer.split('/') {
        // JSON pointer escapes: ~1 = '/', ~0 = '~'
        let segment = segment.replace("~1", "/").replace("~0", "~");
        match current {
            Value::Object(map) => match map.get(&segment) {
                Some(next) => current = next,
                None => return Resolved::Unresolved(reference),
            },
            _ => return Resolved::Unresolved(reference),
        }
    }
    Resolved::Value(current)
}

/// Follow `$ref` chains in `node` until a non-reference value is reached.
///
/// Unresolvable references return the node unchanged, so downstream code
/// sees the literal `{"$ref": ...}` object rather than failing.
pub fn deref<'a>(doc: &'a Value, node: &'a Value) -> &'a Value {
    let mut current = node;
    for _ in 0..MAX_REF_DEPTH {
        let Some(reference) = current.get("$ref").and_then(Value::as_str) else {
            return current;
        };
        match resolve_pointer(doc, reference) {
            Resolved::Value(next) => current = next,
            Resolved::Unresolved(_) => return current,
        }
    }
    current
}
