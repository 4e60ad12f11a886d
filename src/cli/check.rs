//! `amac check` — validate configs and endpoints.json

use std::path::PathBuf;

use clap::Args;
use colored::Colorize;

use crate::config::{assert_urls_in_scope, load_auth_config, load_scope_config};
use crate::error::Result;
use crate::output::endpoint_preview;

use super::read_endpoints;

const PREVIEW_LIMIT: usize = 12;

#[derive(Args)]
pub struct CheckArgs {
    /// Path to endpoints.json produced by `amac map`
    #[arg(long)]
    pub endpoints: PathBuf,

    /// Path to scope.yml (used to re-assert in-scope URLs)
    #[arg(long)]
    pub scope: PathBuf,

    /// Path to auth.yml (validate auth schemes for later probes)
    #[arg(long)]
    pub auth: PathBuf,

    /// Do not show a table preview of endpoints
    #[arg(long)]
    pub no_preview: bool,
}

pub async fn run(args: CheckArgs) -> Result<()> {
    let scope = load_scope_config(&args.scope)?;
    let auth = load_auth_config(&args.auth)?;
    let endpoint_set = read_endpoints(&args.endpoints)?;

    let urls: Vec<&str> = endpoint_set
        .endpoints
        .iter()
        .map(|e| e.url.as_str())
        .collect();
    assert_urls_in_scope(&urls, &scope)?;

    let identities: Vec<&str> = auth.auth_schemes.iter().map(|s| s.name.as_str()).collect();
    println!("{}", "Configs validated successfully.".green());
    println!("Endpoints: {}", endpoint_set.len());
    println!("Auth schemes: {}", identities.join(", "));

    if !args.no_preview && !endpoint_set.is_empty() {
        println!("{}", endpoint_preview(&endpoint_set, PREVIEW_LIMIT));
    }
    Ok(())
}
