//! `amac map` — OpenAPI to endpoints.json

use std::path::PathBuf;

use clap::Args;
use colored::Colorize;

use crate::config::load_scope_config;
use crate::error::Result;
use crate::mapper;
use crate::output::endpoint_preview;

use super::write_endpoints;

/// Rows shown in console previews.
const PREVIEW_LIMIT: usize = 12;

#[derive(Args)]
pub struct MapArgs {
    /// Path or URL to OpenAPI/Swagger (JSON or YAML)
    #[arg(long)]
    pub openapi: String,

    /// Path to scope.yml (allowed/denied/base_urls, rate limits)
    #[arg(long)]
    pub scope: PathBuf,

    /// Where to write the resulting endpoints.json
    #[arg(long, default_value = "endpoints.json")]
    pub out: PathBuf,

    /// Do not print a table preview of mapped endpoints
    #[arg(long)]
    pub no_preview: bool,
}

pub async fn run(args: MapArgs) -> Result<()> {
    let scope = load_scope_config(&args.scope)?;
    let endpoint_set = mapper::load_and_map(&args.openapi, &scope).await?;

    write_endpoints(&endpoint_set, &args.out)?;
    println!(
        "{} {} endpoints -> {}",
        "Wrote".green(),
        endpoint_set.len(),
        args.out.display()
    );

    if !args.no_preview && !endpoint_set.is_empty() {
        println!("{}", endpoint_preview(&endpoint_set, PREVIEW_LIMIT));
    }
    Ok(())
}
