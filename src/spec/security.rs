//! Security-requirement inheritance

use serde_json::Value;

/// Whether an operation declares auth, walking operation → path item →
/// document root and stopping at the first node with a `security` key.
///
/// An empty array means explicitly unauthenticated (`Some(false)`); a
/// non-empty array means auth is declared (`Some(true)`); silence at every
/// level is `None`.
pub fn operation_requires_auth(
    doc: &Value,
    path_item: &Value,
    operation: &Value,
) -> Option<bool> {
    for node in [operation, path_item, doc] {
        if let Some(decision) = declared_security(node) {
            return Some(decision);
        }
    }
    None
}

fn declared_security(node: &Value) -> Option<bool> {
    let map = node.as_object()?;
    let security = map.get("security")?;
    match security.as_array() {
        Some(arr) => Some(!arr.is_empty()),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_empty_overrides_root() {
        let doc = json!({"security": [{"bearerAuth": []}]});
        let path_item = json!({});
        let op = json!({"security": []});
        assert_eq!(operation_requires_auth(&doc, &path_item, &op), Some(false));
    }

    #[test]
    fn test_operation_nonempty_wins() {
        let doc = json!({});
        let path_item = json!({"security": []});
        let op = json!({"security": [{"apiKey": []}]});
        assert_eq!(operation_requires_auth(&doc, &path_item, &op), Some(true));
    }

    #[test]
    fn test_path_item_inherited() {
        let doc = json!({});
        let path_item = json!({"security": [{"apiKey": []}]});
        let op = json!({});
        assert_eq!(operation_requires_auth(&doc, &path_item, &op), Some(true));
    }

    #[test]
    fn test_root_inherited() {
        let doc = json!({"security": [{"bearerAuth": []}]});
        let path_item = json!({});
        let op = json!({});
        assert_eq!(operation_requires_auth(&doc, &path_item, &op), Some(true));
    }

    #[test]
    fn test_absent_everywhere_is_unknown() {
        let doc = json!({"info": {}});
        let path_item = json!({});
        let op = json!({"responses": {}});
        assert_eq!(operation_requires_auth(&doc, &path_item, &op), None);
    }

    #[test]
    fn test_non_array_security_ignored() {
        let doc = json!({"security": [{"bearerAuth": []}]});
        let path_item = json!({});
        let op = json!({"security": "oops"});
        // malformed declaration falls through to the root
        assert_eq!(operation_requires_auth(&doc, &path_item, &op), Some(true));
    }
}
