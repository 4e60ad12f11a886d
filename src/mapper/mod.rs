//! OpenAPI → EndpointSet mapping

use std::collections::HashSet;

use log::{debug, warn};
use serde_json::Value;

use crate::config::{ScopeConfig, choose_base_urls, url_in_scope, url_path_allowed};
use crate::error::Result;
use crate::models::{Endpoint, EndpointExtra, EndpointSet, Method};
use crate::spec::{
    Sampler, deref, fill_server_variables, load_spec, operation_requires_auth,
};

/// Body content types tried in order of preference.
const CONTENT_TYPE_PREFERENCE: [&str; 6] = [
    "application/json",
    "application/x-www-form-urlencoded",
    "multipart/form-data",
    "text/plain",
    "text/xml",
    "application/xml",
];

/// Load an OpenAPI document and map it into a deduplicated, in-scope
/// [`EndpointSet`].
pub async fn load_and_map(openapi_src: &str, scope: &ScopeConfig) -> Result<EndpointSet> {
    let doc = load_spec(openapi_src).await?;
    map_document(&doc, scope)
}

/// Pure mapping over an already-loaded document.
pub fn map_document(doc: &Value, scope: &ScopeConfig) -> Result<EndpointSet> {
    let sampler = Sampler::new(doc);

    let doc_servers = server_urls(doc.get("servers"));
    let base_urls = choose_base_urls(scope, &doc_servers)?;

    let methods = allowed_methods(scope);
    let mut seen: HashSet<(Method, String)> = HashSet::new();
    let mut endpoints: Vec<Endpoint> = Vec::new();

    let paths = doc.get("paths").and_then(Value::as_object);
    let Some(paths) = paths else {
        return Ok(EndpointSet::new(endpoints));
    };

    for (raw_path, path_item) in paths {
        let Some(path_item_map) = path_item.as_object() else {
            continue;
        };

        // path-level servers override document-level ones
        let path_servers = server_urls(path_item_map.get("servers"));
        let base_for_path: &[String] = if path_servers.is_empty() {
            &base_urls
        } else {
            &path_servers
        };

        for &method in &methods {
            let key = method.as_str().to_lowercase();
            let Some(operation) = path_item_map.get(&key) else {
                continue;
            };
            if !operation.is_object() {
                continue;
            }

            let requires_auth = operation_requires_auth(doc, path_item, operation);
            let params = collect_params(doc, path_item, operation);

            let concrete_path = apply_path_template(raw_path, &params, &sampler);
            let query = build_query(&params, &sampler, doc);
            let extra = synthesize_body(doc, operation, &sampler, raw_path);

            let tags = operation
                .get("tags")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect::<Vec<String>>()
                })
                .unwrap_or_default();
            let operation_id = operation
                .get("operationId")
                .and_then(Value::as_str)
                .map(str::to_string);

            for base in base_for_path {
                let url = format!(
                    "{}/{}{}",
                    base.trim_end_matches('/'),
                    concrete_path.trim_start_matches('/'),
                    query
                );

                if !url_in_scope(&url, scope) || !url_path_allowed(&url, scope) {
                    debug!("Dropping out-of-scope URL {}", url);
                    continue;
                }

                if !seen.insert((method, url.clone())) {
                    continue;
                }
                endpoints.push(Endpoint {
                    method,
                    url,
                    requires_auth,
                    template: Some(raw_path.clone()),
                    tags: tags.clone(),
                    operation_id: operation_id.clone(),
                    extra: extra.clone(),
                });
            }
        }
    }

    Ok(EndpointSet::new(endpoints))
}

/// GET/HEAD always; the policy's non-safe list only when permitted.
fn allowed_methods(scope: &ScopeConfig) -> Vec<Method> {
    let mut methods = vec![Method::Get, Method::Head];
    if !scope.request_policy.safe_methods_only {
        for name in &scope.request_policy.non_safe_methods {
            if let Some(m) = Method::parse(name) {
                if !m.is_safe() && !methods.contains(&m) {
                    methods.push(m);
                }
            }
        }
    }
    methods
}

fn server_urls(servers: Option<&Value>) -> Vec<String> {
    let Some(arr) = servers.and_then(Value::as_array) else {
        return Vec::new();
    };
    arr.iter()
        .filter(|s| s.is_object())
        .filter_map(fill_server_variables)
        .map(|u| u.trim_end_matches('/').to_string())
        .collect()
}

/// Merge path-level and operation-level parameters, dereferencing `$ref`s.
fn collect_params(doc: &Value, path_item: &Value, operation: &Value) -> Vec<Value> {
    let mut params = Vec::new();
    for node in [path_item, operation] {
        if let Some(list) = node.get("parameters").and_then(Value::as_array) {
            for p in list {
                let p = deref(doc, p);
                if p.is_object() {
                    params.push(p.clone());
                }
            }
        }
    }
    params
}

/// Substitute required path parameters with sampled values.
fn apply_path_template(path_template: &str, params: &[Value], sampler: &Sampler) -> String {
    let mut out = path_template.to_string();
    for p in params {
        if p.get("in").and_then(Value::as_str) != Some("path") {
            continue;
        }
        // path parameters default to required
        if !p.get("required").and_then(Value::as_bool).unwrap_or(true) {
            continue;
        }
        if let Some(name) = p.get("name").and_then(Value::as_str) {
            let value = sampler.sample_param_value(p);
            out = out.replace(&format!("{{{}}}", name), &value);
        }
    }
    out
}

/// Query string for required or defaulted query parameters.
fn build_query(params: &[Value], sampler: &Sampler, doc: &Value) -> String {
    let mut items: Vec<String> = Vec::new();
    for p in params {
        if p.get("in").and_then(Value::as_str) != Some("query") {
            continue;
        }
        let schema = p.get("schema").map(|s| deref(doc, s));
        let has_default = schema.map(|s| s.get("default").is_some()).unwrap_or(false);
        let required = p.get("required").and_then(Value::as_bool).unwrap_or(false);
        if !(required || has_default) {
            continue;
        }
        let name = p.get("name").and_then(Value::as_str).unwrap_or("q");
        items.push(format!("{}={}", name, sampler.sample_param_value(p)));
    }
    if items.is_empty() {
        String::new()
    } else {
        format!("?{}", items.join("&"))
    }
}

/// Synthesize a request body when the operation requires one.
fn synthesize_body(
    doc: &Value,
    operation: &Value,
    sampler: &Sampler,
    raw_path: &str,
) -> EndpointExtra {
    let Some(request_body) = operation.get("requestBody").map(|b| deref(doc, b)) else {
        return EndpointExtra::default();
    };
    if !request_body
        .get("required")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        return EndpointExtra::default();
    }
    let Some(content) = request_body.get("content").and_then(Value::as_object) else {
        return EndpointExtra::default();
    };

    let content_type = CONTENT_TYPE_PREFERENCE
        .iter()
        .find(|ct| content.contains_key(**ct))
        .map(|ct| ct.to_string())
        .or_else(|| content.keys().next().cloned());
    let Some(content_type) = content_type else {
        return EndpointExtra::default();
    };

    let empty = Value::Object(Default::default());
    let schema = content
        .get(&content_type)
        .and_then(|m| m.get("schema"))
        .unwrap_or(&empty);
    let body = sampler.sample_schema(schema, None);

    let check = sampler.validate(schema, &body);
    if !check.ok {
        warn!(
            "Synthesized body for {} does not validate: {}",
            raw_path,
            check.message.unwrap_or_default()
        );
    }

    EndpointExtra {
        body: Some(body),
        content_type: Some(content_type),
    }
}
