//! Command implementations.

mod info;
mod purge;
mod run;
mod validate;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use contracts::SdkBlueprint;

use crate::error::CliError;

pub use info::run_info;
pub use purge::run_purge;
pub use run::run_session;
pub use validate::run_validate;

/// Load the blueprint at `path`, applying a store path override
pub(crate) fn load_blueprint(path: &Path, store: Option<&PathBuf>) -> Result<SdkBlueprint> {
    if !path.exists() {
        return Err(CliError::config_not_found(path).into());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    if let Some(store) = store {
        tracing::info!(store = %store.display(), "Overriding store path from CLI");
        blueprint.store.path = store.clone();
    }

    Ok(blueprint)
}
