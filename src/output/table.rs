//! Table previews for endpoints and probe results

use tabled::{
    Table, Tabled,
    builder::Builder,
    settings::{Alignment, Modify, Style, object::Rows},
};

use crate::models::{EndpointSet, Summary};

/// Identity columns shown in the matrix preview before truncating.
const MAX_IDENTITY_COLUMNS: usize = 4;

/// Format data as a table
pub fn format_table<T: Tabled>(data: &[T]) -> String {
    if data.is_empty() {
        return "No results found.".to_string();
    }

    let mut table = Table::new(data);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    table.to_string()
}

fn styled(mut table: Table) -> String {
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));
    table.to_string()
}

fn auth_declared(v: Option<bool>) -> &'static str {
    match v {
        Some(true) => "yes",
        Some(false) => "no",
        None => "unknown",
    }
}

#[derive(Tabled)]
struct EndpointDisplay {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "METHOD")]
    method: String,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "AUTH DECLARED")]
    requires_auth: &'static str,
    #[tabled(rename = "TAGS")]
    tags: String,
}

/// Preview of mapped endpoints, capped at `limit` rows.
pub fn endpoint_preview(set: &EndpointSet, limit: usize) -> String {
    let rows: Vec<EndpointDisplay> = set
        .endpoints
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, ep)| EndpointDisplay {
            index: i + 1,
            method: ep.method.to_string(),
            url: ep.url.clone(),
            requires_auth: auth_declared(ep.requires_auth),
            tags: if ep.tags.is_empty() {
                "-".to_string()
            } else {
                ep.tags.join(", ")
            },
        })
        .collect();
    format_table(&rows)
}

#[derive(Tabled)]
struct ProbeRowDisplay {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "METHOD")]
    method: String,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "REQ. AUTH?")]
    requires_auth: &'static str,
    #[tabled(rename = "NO-AUTH")]
    noauth: String,
    #[tabled(rename = "AUTH (FIRST)")]
    auth: String,
    #[tabled(rename = "Δ SIZE")]
    delta_size: String,
}

/// Legacy per-endpoint preview: no-auth vs. first identity.
pub fn probe_preview(summary: &Summary, limit: usize) -> String {
    let rows: Vec<ProbeRowDisplay> = summary
        .rows
        .iter()
        .take(limit)
        .map(|r| {
            let delta = match (r.noauth_status, r.auth_status) {
                (Some(_), Some(_)) => {
                    (r.auth_size.unwrap_or(0) as i64 - r.noauth_size.unwrap_or(0) as i64)
                        .to_string()
                }
                _ => "0".to_string(),
            };
            ProbeRowDisplay {
                index: r.index,
                method: r.method.to_string(),
                url: r.url.clone(),
                requires_auth: auth_declared(r.requires_auth),
                noauth: r
                    .noauth_status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                auth: match (&r.auth_name, r.auth_status) {
                    (Some(name), Some(status)) => format!("{}:{}", name, status),
                    _ => "-".to_string(),
                },
                delta_size: delta,
            }
        })
        .collect();
    format_table(&rows)
}

/// RBAC matrix preview: one status column per identity, capped so the
/// table stays readable in a terminal.
pub fn matrix_preview(summary: &Summary, limit: usize) -> String {
    if summary.matrix.is_empty() || summary.auth_used.is_empty() {
        return String::new();
    }

    let identities: Vec<&String> = summary
        .auth_used
        .iter()
        .take(MAX_IDENTITY_COLUMNS)
        .collect();
    let hidden = summary.auth_used.len().saturating_sub(identities.len());

    let mut builder = Builder::default();
    let mut header = vec![
        "#".to_string(),
        "METHOD".to_string(),
        "URL".to_string(),
        "noauth".to_string(),
    ];
    header.extend(identities.iter().map(|s| s.to_string()));
    builder.push_record(header);

    for row in summary.matrix.iter().take(limit) {
        let cell = |name: &str| -> String {
            row.variants
                .get(name)
                .and_then(|v| v.status)
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string())
        };
        let mut record = vec![
            row.index.to_string(),
            row.method.to_string(),
            row.url.clone(),
            cell("noauth"),
        ];
        record.extend(identities.iter().map(|name| cell(name)));
        builder.push_record(record);
    }

    let table = styled(builder.build());
    if hidden > 0 {
        format!("{}\n(+{} more identities not shown)", table, hidden)
    } else {
        table
    }
}
