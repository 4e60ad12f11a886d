//! Probe orchestration: no-auth + per-identity requests per endpoint,
//! refresh-on-401, snapshot persistence, and deterministic summary rows.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, warn};

use crate::auth::{EffectiveIdentity, ResolvedIdentity};
use crate::client::{ClientOptions, HttpClient};
use crate::config::{AuthConfig, ScopeConfig, assert_urls_in_scope};
use crate::error::Result;
use crate::evidence::{safe_stem, write_snapshot, write_summary};
use crate::models::{
    Endpoint, EndpointSet, MatrixRow, ProbeErrorKind, RequestSnapshot, SnapshotError,
    SnapshotRequest, Summary, SummaryRow, Timings, VariantResult,
};

pub mod progress;

pub use progress::{NullSink, ProgressSink};

/// Batch size multiplier: endpoints are processed in batches of
/// `concurrency × 6` to bound peak in-flight snapshot writes.
const BATCH_FACTOR: usize = 6;

/// Reserved variant key for the unauthenticated request.
const NOAUTH_KEY: &str = "noauth";

#[derive(Debug, Clone, Default)]
pub struct ProbeOptions {
    /// Plan request counts without any network I/O.
    pub dry_run: bool,
    /// Probe every identity (RBAC matrix) instead of just the first.
    pub use_all_identities: bool,
}

/// Where a finished (or planned) run left its artifacts.
#[derive(Debug, Clone)]
pub struct RunMeta {
    pub summary_path: PathBuf,
    pub requests_dir: PathBuf,
    pub endpoints: usize,
    pub auth_used: Vec<String>,
    pub dry_run: bool,
    pub planned_requests: Option<usize>,
}

/// Run probes for every endpoint: one no-auth request plus one request
/// per selected identity, wrapped by refresh-on-401. Snapshots land under
/// `out_dir/requests`, the summary at `out_dir/summary.json`.
pub async fn run_probes(
    endpoints: &EndpointSet,
    scope: &ScopeConfig,
    auth: &AuthConfig,
    out_dir: &Path,
    options: &ProbeOptions,
    sink: &dyn ProgressSink,
) -> Result<RunMeta> {
    let urls: Vec<&str> = endpoints.endpoints.iter().map(|e| e.url.as_str()).collect();
    assert_urls_in_scope(&urls, scope)?;

    let requests_dir = out_dir.join("requests");
    std::fs::create_dir_all(&requests_dir)?;
    let summary_path = out_dir.join("summary.json");

    let mut schemes: Vec<_> = auth.auth_schemes.iter().collect();
    if !options.use_all_identities && schemes.len() > 1 {
        schemes.truncate(1);
    }
    let auth_used: Vec<String> = schemes.iter().map(|s| s.name.clone()).collect();

    let planned_requests = endpoints.len() * (1 + schemes.len().max(1));

    if options.dry_run {
        let summary = Summary {
            version: env!("CARGO_PKG_VERSION").to_string(),
            endpoints: endpoints.len(),
            auth_used: auth_used.clone(),
            rows: Vec::new(),
            matrix: Vec::new(),
            dry_run: true,
            planned_requests: Some(planned_requests),
        };
        write_summary(&summary, &summary_path)?;
        return Ok(RunMeta {
            summary_path,
            requests_dir,
            endpoints: endpoints.len(),
            auth_used,
            dry_run: true,
            planned_requests: Some(planned_requests),
        });
    }

    let client = HttpClient::new(ClientOptions::from_scope(scope))?;

    // resolve every identity once up front; failures stay local
    let mut identities: Vec<ResolvedIdentity> = Vec::new();
    for scheme in &schemes {
        let resolved = match EffectiveIdentity::resolve(scheme).await {
            Ok(identity) => ResolvedIdentity::Ready(Arc::new(identity)),
            Err(err) => {
                warn!("Failed to resolve identity '{}': {}", scheme.name, err);
                ResolvedIdentity::Failed {
                    name: scheme.name.clone(),
                    message: err.to_string(),
                }
            }
        };
        sink.identity_resolved(
            resolved.name(),
            matches!(resolved, ResolvedIdentity::Ready(_)),
        );
        identities.push(resolved);
    }

    let total = endpoints.len();
    sink.run_started(total);

    let batch_size = scope.request_policy.concurrency.max(1) * BATCH_FACTOR;
    let mut legacy_rows: Vec<SummaryRow> = Vec::with_capacity(total);
    let mut matrix_rows: Vec<MatrixRow> = Vec::with_capacity(total);

    for (batch_index, batch) in endpoints.endpoints.chunks(batch_size).enumerate() {
        let offset = batch_index * batch_size;
        let mut tasks: FuturesUnordered<_> = batch
            .iter()
            .enumerate()
            .map(|(i, endpoint)| {
                probe_one(&client, offset + i, endpoint, &identities, &requests_dir)
            })
            .collect();

        while let Some(result) = tasks.next().await {
            let (legacy, matrix) = result?;
            sink.endpoint_finished(legacy.index);
            legacy_rows.push(legacy);
            matrix_rows.push(matrix);
        }
    }

    // completion order is arbitrary; the artifact order is not
    legacy_rows.sort_by_key(|r| r.index);
    matrix_rows.sort_by_key(|r| r.index);

    let summary = Summary {
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: total,
        auth_used: auth_used.clone(),
        rows: legacy_rows,
        matrix: matrix_rows,
        dry_run: false,
        planned_requests: None,
    };
    write_summary(&summary, &summary_path)?;
    sink.run_finished();

    Ok(RunMeta {
        summary_path,
        requests_dir,
        endpoints: total,
        auth_used,
        dry_run: false,
        planned_requests: None,
    })
}

/// Probe one endpoint across all variants and persist each snapshot.
async fn probe_one(
    client: &HttpClient,
    index: usize,
    endpoint: &Endpoint,
    identities: &[ResolvedIdentity],
    requests_dir: &Path,
) -> Result<(SummaryRow, MatrixRow)> {
    let stem_source = endpoint.template.as_deref().unwrap_or(&endpoint.url);
    let base_name = format!(
        "{:05}_{}_{}",
        index,
        endpoint.method,
        safe_stem(stem_source)
    );
    let body = endpoint.extra.body.as_ref();
    let content_type = endpoint.extra.content_type.as_deref();

    let noauth_snap = client
        .request(endpoint.method, &endpoint.url, None, body, content_type)
        .await;
    write_snapshot(
        &noauth_snap,
        &requests_dir.join(format!("{}__noauth.json", base_name)),
    )?;
    debug!(
        "{} {} noauth -> {:?}",
        endpoint.method,
        endpoint.url,
        noauth_snap.status()
    );

    let mut variants: BTreeMap<String, VariantResult> = BTreeMap::new();
    variants.insert(
        NOAUTH_KEY.to_string(),
        VariantResult::from_snapshot(&noauth_snap),
    );

    let mut legacy_auth_name = None;
    let mut legacy_auth_status = None;
    let mut legacy_auth_size = None;

    for (j, identity) in identities.iter().enumerate() {
        let snap = match identity {
            ResolvedIdentity::Ready(identity) => {
                authed_request_with_refresh(client, endpoint, identity).await
            }
            ResolvedIdentity::Failed { message, .. } => auth_flow_snapshot(
                endpoint,
                format!("identity resolution failed: {}", message),
            ),
        };

        write_snapshot(
            &snap,
            &requests_dir.join(format!(
                "{}__auth_{}.json",
                base_name,
                safe_stem(identity.name())
            )),
        )?;

        let result = VariantResult::from_snapshot(&snap);
        if j == 0 {
            legacy_auth_name = Some(identity.name().to_string());
            legacy_auth_status = result.status;
            legacy_auth_size = result.size;
        }
        variants.insert(identity.name().to_string(), result);
    }

    let legacy = SummaryRow {
        index,
        method: endpoint.method,
        url: endpoint.url.clone(),
        requires_auth: endpoint.requires_auth,
        noauth_status: noauth_snap.status(),
        auth_name: legacy_auth_name,
        auth_status: legacy_auth_status,
        noauth_size: Some(noauth_snap.body_size().unwrap_or(0)),
        auth_size: legacy_auth_size,
        notes: None,
    };
    let matrix = MatrixRow {
        index,
        method: endpoint.method,
        url: endpoint.url.clone(),
        requires_auth: endpoint.requires_auth,
        variants,
    };
    Ok((legacy, matrix))
}

/// Authenticated request wrapped by refresh-on-401: one refresh attempt,
/// one retry, and the retried outcome is what gets persisted.
async fn authed_request_with_refresh(
    client: &HttpClient,
    endpoint: &Endpoint,
    identity: &Arc<EffectiveIdentity>,
) -> RequestSnapshot {
    let body = endpoint.extra.body.as_ref();
    let content_type = endpoint.extra.content_type.as_deref();

    let (credential, generation) = identity.credential().await;
    let snap = client
        .request(
            endpoint.method,
            &endpoint.url,
            Some(&credential),
            body,
            content_type,
        )
        .await;

    if snap.status() != Some(401) || !identity.is_refreshable() {
        return snap;
    }

    match identity.refresh_after_unauthorized(generation).await {
        Ok(credential) => {
            client
                .request(
                    endpoint.method,
                    &endpoint.url,
                    Some(&credential),
                    body,
                    content_type,
                )
                .await
        }
        Err(err) => auth_flow_snapshot(
            endpoint,
            format!("credential refresh after 401 failed: {}", err),
        ),
    }
}

fn auth_flow_snapshot(endpoint: &Endpoint, message: String) -> RequestSnapshot {
    RequestSnapshot {
        request: SnapshotRequest {
            method: endpoint.method,
            url: endpoint.url.clone(),
            headers: BTreeMap::new(),
            body: None,
        },
        response: None,
        error: Some(SnapshotError {
            kind: ProbeErrorKind::AuthFlow,
            message,
        }),
        timings: Timings {
            elapsed_ms: 0.0,
            attempts: 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthScheme, AuthType, GrantType, RequestPolicy};
    use crate::models::{EndpointExtra, Method};
    use std::collections::BTreeMap as Map;

    fn test_scope(host: &str) -> ScopeConfig {
        ScopeConfig {
            allowed: vec![host.to_string()],
            request_policy: RequestPolicy {
                max_rps: 0,
                global_jitter_ms: 0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn bearer_auth(name: &str, token: &str) -> AuthConfig {
        AuthConfig {
            auth_schemes: vec![AuthScheme {
                name: name.to_string(),
                auth_type: AuthType::Bearer,
                token: Some(token.to_string()),
                cookie: None,
                header: None,
                username: None,
                password: None,
                token_url: None,
                grant_type: None,
                client_id: None,
                client_secret: None,
                audience: None,
                scope: None,
                login_url: None,
                login_method: None,
                username_field: None,
                password_field: None,
                extra_fields: Map::new(),
            }],
        }
    }

    fn endpoint(method: Method, url: &str, template: &str) -> Endpoint {
        Endpoint {
            method,
            url: url.to_string(),
            requires_auth: Some(true),
            template: Some(template.to_string()),
            tags: vec![],
            operation_id: None,
            extra: EndpointExtra::default(),
        }
    }

    #[tokio::test]
    async fn test_end_to_end_two_endpoints_one_identity() {
        let mut server = mockito::Server::new_async().await;
        let _a = server
            .mock("GET", "/a")
            .with_status(200)
            .with_body("aa")
            .expect(2)
            .create_async()
            .await;
        let _b = server
            .mock("GET", "/b")
            .with_status(401)
            .expect(2)
            .create_async()
            .await;

        let host = server.host_with_port();
        let host_only = host.split(':').next().unwrap().to_string();
        let endpoints = EndpointSet::new(vec![
            endpoint(Method::Get, &format!("{}/a", server.url()), "/a"),
            endpoint(Method::Get, &format!("{}/b", server.url()), "/b"),
        ]);

        let dir = tempfile::tempdir().unwrap();
        let meta = run_probes(
            &endpoints,
            &test_scope(&host_only),
            &bearer_auth("user", "tok"),
            dir.path(),
            &ProbeOptions {
                dry_run: false,
                use_all_identities: false,
            },
            &NullSink,
        )
        .await
        .unwrap();

        assert_eq!(meta.endpoints, 2);
        assert_eq!(meta.auth_used, vec!["user"]);

        // 4 snapshots: (noauth + 1 identity) x 2 endpoints
        let files: Vec<_> = std::fs::read_dir(&meta.requests_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(files.len(), 4);
        assert!(files.iter().any(|f| f == "00000_GET_a__noauth.json"));
        assert!(files.iter().any(|f| f == "00000_GET_a__auth_user.json"));
        assert!(files.iter().any(|f| f == "00001_GET_b__noauth.json"));
        assert!(files.iter().any(|f| f == "00001_GET_b__auth_user.json"));

        let summary: Summary =
            serde_json::from_str(&std::fs::read_to_string(&meta.summary_path).unwrap()).unwrap();
        assert!(!summary.dry_run);
        assert_eq!(summary.rows.len(), 2);
        assert_eq!(summary.rows[0].index, 0);
        assert_eq!(summary.rows[1].index, 1);
        assert_eq!(summary.rows[0].noauth_status, Some(200));
        assert_eq!(summary.rows[0].auth_status, Some(200));
        assert_eq!(summary.rows[1].noauth_status, Some(401));

        assert_eq!(summary.matrix.len(), 2);
        let keys: Vec<&String> = summary.matrix[0].variants.keys().collect();
        assert_eq!(keys, vec!["noauth", "user"]);
    }

    #[tokio::test]
    async fn test_dry_run_sends_no_traffic() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", "/a")
            .expect(0)
            .create_async()
            .await;

        let host_only = server.host_with_port().split(':').next().unwrap().to_string();
        let endpoints = EndpointSet::new(vec![
            endpoint(Method::Get, &format!("{}/a", server.url()), "/a"),
            endpoint(Method::Head, &format!("{}/h", server.url()), "/h"),
        ]);

        let dir = tempfile::tempdir().unwrap();
        let meta = run_probes(
            &endpoints,
            &test_scope(&host_only),
            &bearer_auth("user", "tok"),
            dir.path(),
            &ProbeOptions {
                dry_run: true,
                use_all_identities: true,
            },
            &NullSink,
        )
        .await
        .unwrap();

        m.assert_async().await;
        assert!(meta.dry_run);
        assert_eq!(meta.planned_requests, Some(4));
        // no snapshots written
        assert_eq!(std::fs::read_dir(&meta.requests_dir).unwrap().count(), 0);

        let summary: Summary =
            serde_json::from_str(&std::fs::read_to_string(&meta.summary_path).unwrap()).unwrap();
        assert!(summary.dry_run);
        assert_eq!(summary.planned_requests, Some(4));
        assert!(summary.rows.is_empty());
    }

    #[tokio::test]
    async fn test_scope_violation_aborts_before_traffic() {
        let endpoints = EndpointSet::new(vec![endpoint(
            Method::Get,
            "https://outside.test/a",
            "/a",
        )]);
        let dir = tempfile::tempdir().unwrap();
        let err = run_probes(
            &endpoints,
            &test_scope("allowed.example.com"),
            &bearer_auth("user", "tok"),
            dir.path(),
            &ProbeOptions::default(),
            &NullSink,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("HOST scope"));
    }

    #[tokio::test]
    async fn test_refresh_on_401_persists_retried_outcome() {
        let mut server = mockito::Server::new_async().await;

        // token endpoint: initial grant, then exactly one refresh grant
        let _grant = server
            .mock("POST", "/token")
            .match_body(mockito::Matcher::UrlEncoded(
                "grant_type".into(),
                "client_credentials".into(),
            ))
            .with_status(200)
            .with_body(r#"{"access_token": "old", "refresh_token": "ref"}"#)
            .expect(1)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/token")
            .match_body(mockito::Matcher::UrlEncoded(
                "grant_type".into(),
                "refresh_token".into(),
            ))
            .with_status(200)
            .with_body(r#"{"access_token": "new"}"#)
            .expect(1)
            .create_async()
            .await;

        // endpoint: 401 for the stale token, 200 for the refreshed one
        let _stale = server
            .mock("GET", "/me")
            .match_header("authorization", "Bearer old")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        let _fresh = server
            .mock("GET", "/me")
            .match_header("authorization", "Bearer new")
            .with_status(200)
            .with_body("profile")
            .expect(1)
            .create_async()
            .await;
        // noauth variant carries no authorization header at all
        let _noauth = server
            .mock("GET", "/me")
            .match_header("authorization", mockito::Matcher::Missing)
            .with_status(401)
            .create_async()
            .await;

        let auth = AuthConfig {
            auth_schemes: vec![AuthScheme {
                name: "svc".to_string(),
                auth_type: AuthType::Oauth2,
                token: None,
                cookie: None,
                header: None,
                username: None,
                password: None,
                token_url: Some(format!("{}/token", server.url())),
                grant_type: Some(GrantType::ClientCredentials),
                client_id: Some("cid".to_string()),
                client_secret: Some("sec".to_string()),
                audience: None,
                scope: None,
                login_url: None,
                login_method: None,
                username_field: None,
                password_field: None,
                extra_fields: Map::new(),
            }],
        };

        let host_only = server.host_with_port().split(':').next().unwrap().to_string();
        let endpoints = EndpointSet::new(vec![endpoint(
            Method::Get,
            &format!("{}/me", server.url()),
            "/me",
        )]);

        let dir = tempfile::tempdir().unwrap();
        let meta = run_probes(
            &endpoints,
            &test_scope(&host_only),
            &auth,
            dir.path(),
            &ProbeOptions {
                dry_run: false,
                use_all_identities: true,
            },
            &NullSink,
        )
        .await
        .unwrap();

        refresh.assert_async().await;

        // the persisted auth snapshot holds the retried 200, not the 401
        let snap_path = meta.requests_dir.join("00000_GET_me__auth_svc.json");
        let snap: RequestSnapshot =
            serde_json::from_str(&std::fs::read_to_string(&snap_path).unwrap()).unwrap();
        assert_eq!(snap.status(), Some(200));

        let summary: Summary =
            serde_json::from_str(&std::fs::read_to_string(&meta.summary_path).unwrap()).unwrap();
        assert_eq!(summary.matrix[0].variants["svc"].status, Some(200));
    }

    #[tokio::test]
    async fn test_failed_identity_resolution_is_local() {
        let mut server = mockito::Server::new_async().await;
        let _token = server
            .mock("POST", "/token")
            .with_status(500)
            .create_async()
            .await;
        let _a = server
            .mock("GET", "/a")
            .with_status(200)
            .create_async()
            .await;

        let auth = AuthConfig {
            auth_schemes: vec![AuthScheme {
                name: "broken".to_string(),
                auth_type: AuthType::Oauth2,
                token: None,
                cookie: None,
                header: None,
                username: None,
                password: None,
                token_url: Some(format!("{}/token", server.url())),
                grant_type: Some(GrantType::ClientCredentials),
                client_id: Some("cid".to_string()),
                client_secret: Some("sec".to_string()),
                audience: None,
                scope: None,
                login_url: None,
                login_method: None,
                username_field: None,
                password_field: None,
                extra_fields: Map::new(),
            }],
        };

        let host_only = server.host_with_port().split(':').next().unwrap().to_string();
        let endpoints = EndpointSet::new(vec![endpoint(
            Method::Get,
            &format!("{}/a", server.url()),
            "/a",
        )]);

        let dir = tempfile::tempdir().unwrap();
        let meta = run_probes(
            &endpoints,
            &test_scope(&host_only),
            &auth,
            dir.path(),
            &ProbeOptions {
                dry_run: false,
                use_all_identities: true,
            },
            &NullSink,
        )
        .await
        .unwrap();

        let summary: Summary =
            serde_json::from_str(&std::fs::read_to_string(&meta.summary_path).unwrap()).unwrap();
        // the run completed; the noauth variant succeeded
        assert_eq!(summary.matrix[0].variants["noauth"].status, Some(200));
        // the broken identity recorded an auth_flow error
        let broken = &summary.matrix[0].variants["broken"];
        assert!(broken.status.is_none());
        assert!(broken.error.as_ref().unwrap().contains("auth_flow"));

        // and its snapshot file exists
        assert!(meta
            .requests_dir
            .join("00000_GET_a__auth_broken.json")
            .exists());
    }

    #[tokio::test]
    async fn test_budget_limits_network_requests() {
        let mut server = mockito::Server::new_async().await;
        let hits = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let host_only = server.host_with_port().split(':').next().unwrap().to_string();
        let mut scope = test_scope(&host_only);
        scope.request_policy.hard_request_budget = 1;
        // serial execution keeps the budget outcome deterministic
        scope.request_policy.concurrency = 1;

        let endpoints = EndpointSet::new(vec![
            endpoint(Method::Get, &format!("{}/a", server.url()), "/a"),
            endpoint(Method::Get, &format!("{}/b", server.url()), "/b"),
        ]);

        let dir = tempfile::tempdir().unwrap();
        let meta = run_probes(
            &endpoints,
            &scope,
            &AuthConfig::default(),
            dir.path(),
            &ProbeOptions {
                dry_run: false,
                use_all_identities: true,
            },
            &NullSink,
        )
        .await
        .unwrap();

        // exactly one request reached the network
        hits.assert_async().await;

        let summary: Summary =
            serde_json::from_str(&std::fs::read_to_string(&meta.summary_path).unwrap()).unwrap();
        let statuses: Vec<Option<u16>> = summary
            .matrix
            .iter()
            .map(|r| r.variants["noauth"].status)
            .collect();
        assert_eq!(statuses.iter().filter(|s| s.is_some()).count(), 1);

        let errors: Vec<&MatrixRow> = summary
            .matrix
            .iter()
            .filter(|r| {
                r.variants["noauth"]
                    .error
                    .as_deref()
                    .is_some_and(|e| e.contains("budget_exceeded"))
            })
            .collect();
        assert_eq!(errors.len(), 1);
    }
}
