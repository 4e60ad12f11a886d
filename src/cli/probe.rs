//! `amac probe` — run no-auth + identity probes for endpoints.json

use std::path::PathBuf;

use clap::Args;
use colored::Colorize;

use crate::config::{load_auth_config, load_scope_config};
use crate::error::Result;
use crate::output::{ProgressBarSink, matrix_preview, probe_preview};
use crate::probe::{NullSink, ProbeOptions, run_probes};

use super::{IdentitySelection, read_endpoints};

const PREVIEW_LIMIT: usize = 12;

#[derive(Args)]
pub struct ProbeArgs {
    /// Path to endpoints.json produced by `amac map`
    #[arg(long)]
    pub endpoints: PathBuf,

    /// Path to scope.yml (rate limits, timeouts, scope/path gates)
    #[arg(long)]
    pub scope: PathBuf,

    /// Path to auth.yml (can include multiple identities)
    #[arg(long)]
    pub auth: PathBuf,

    /// Which identities to use from auth.yml
    #[arg(long, value_enum, default_value = "all")]
    pub identities: IdentitySelection,

    /// Directory for snapshots and summary.json
    /// (default: out/run_YYYY-MM-DD_HH-MM-SS)
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Plan requests only; don't send network traffic
    #[arg(long)]
    pub dry_run: bool,

    /// Do not show a table preview of probe results
    #[arg(long)]
    pub no_preview: bool,
}

pub async fn run(args: ProbeArgs) -> Result<()> {
    let scope = load_scope_config(&args.scope)?;
    let auth = load_auth_config(&args.auth)?;
    let endpoint_set = read_endpoints(&args.endpoints)?;

    let out_dir = args.out_dir.clone().unwrap_or_else(|| {
        let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
        PathBuf::from("out").join(format!("run_{}", stamp))
    });

    let options = ProbeOptions {
        dry_run: args.dry_run,
        use_all_identities: args.identities == IdentitySelection::All,
    };

    let meta = if args.dry_run {
        run_probes(&endpoint_set, &scope, &auth, &out_dir, &options, &NullSink).await?
    } else {
        let sink = ProgressBarSink::new();
        run_probes(&endpoint_set, &scope, &auth, &out_dir, &options, &sink).await?
    };

    let verdict = if meta.dry_run {
        "Dry-run planned."
    } else {
        "Probes complete."
    };
    println!("{}", verdict.green());
    println!("Summary -> {}", meta.summary_path.display());
    println!("Requests -> {}", meta.requests_dir.display());

    if meta.dry_run {
        println!(
            "Planned requests: {}",
            meta.planned_requests.unwrap_or_default()
        );
        return Ok(());
    }

    if !args.no_preview {
        let text = std::fs::read_to_string(&meta.summary_path)?;
        let summary = serde_json::from_str(&text)?;
        println!("{}", probe_preview(&summary, PREVIEW_LIMIT));
        let matrix = matrix_preview(&summary, PREVIEW_LIMIT);
        if !matrix.is_empty() {
            println!("{}", matrix);
        }
    }
    Ok(())
}
