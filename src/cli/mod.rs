//! Command-line interface for AMAC

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};

use crate::error::{Error, Result};
use crate::models::EndpointSet;

pub mod check;
pub mod map;
pub mod probe;

/// AMAC — API Mapper + Auth Checker
#[derive(Parser)]
#[command(name = "amac", version, about = "Maps OpenAPI endpoints and probes them for broken authorization")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Map endpoints from an OpenAPI/Swagger file or URL
    Map(map::MapArgs),

    /// Validate configs and an endpoints.json file
    Check(check::CheckArgs),

    /// Run probes (no-auth plus identities) for endpoints.json
    Probe(probe::ProbeArgs),

    /// Show AMAC version
    Version,
}

/// Which identities from auth.yml take part in a probe run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IdentitySelection {
    /// Only the first declared identity
    First,
    /// Every declared identity (RBAC matrix)
    All,
}

pub(crate) fn read_endpoints(path: &Path) -> Result<EndpointSet> {
    if !path.exists() {
        return Err(Error::Other(format!(
            "endpoints file not found: {}",
            path.display()
        )));
    }
    let text = std::fs::read_to_string(path)?;
    let set: EndpointSet = serde_json::from_str(&text)
        .map_err(|e| Error::Other(format!("invalid endpoints file {}: {}", path.display(), e)))?;
    Ok(set)
}

pub(crate) fn write_endpoints(set: &EndpointSet, path: &PathBuf) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_vec_pretty(set)?)?;
    Ok(())
}
