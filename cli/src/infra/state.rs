//! Infrastructure implementation of the `ModuleStore` port.
//!
//! `JsonModuleStore` keeps tracked modules per server URL in one JSON file,
//! loaded and saved on the blocking pool with an atomic write (temp file +
//! rename) so an interrupted save never corrupts the file.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::application::ports::ModuleStore;
use crate::domain::ModuleRecord;

type ModulesByServer = BTreeMap<String, Vec<ModuleRecord>>;

/// Module file manager — implements `ModuleStore` for the infra layer.
pub struct JsonModuleStore {
    path: PathBuf,
}

impl JsonModuleStore {
    /// Create a store using the default path (`~/.stratus/modules.json`).
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self> {
        let home =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
        Ok(Self::with_path(home.join(".stratus").join("modules.json")))
    }

    /// Create a store with an explicit path (used in tests).
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_all(&self) -> Result<ModulesByServer> {
        if !self.path.exists() {
            return Ok(ModulesByServer::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading module file {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing module file {}", self.path.display()))
    }

    fn write_all(&self, all: &ModulesByServer) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(all).context("serializing modules")?;

        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, &content)
            .with_context(|| format!("writing temp file {}", temp_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("setting permissions on {}", temp_path.display()))?;
        }

        std::fs::rename(&temp_path, &self.path)
            .with_context(|| format!("finalizing module file {}", self.path.display()))?;
        Ok(())
    }

    fn load_sync(&self, server_url: &str) -> Result<Vec<ModuleRecord>> {
        Ok(self.read_all()?.remove(server_url).unwrap_or_default())
    }

    fn save_sync(&self, server_url: &str, records: Vec<ModuleRecord>) -> Result<()> {
        let mut all = self.read_all()?;
        if records.is_empty() {
            all.remove(server_url);
        } else {
            all.insert(server_url.to_string(), records);
        }
        self.write_all(&all)
    }
}

impl ModuleStore for JsonModuleStore {
    async fn load_modules(&self, server_url: &str) -> Result<Vec<ModuleRecord>> {
        let path = self.path.clone();
        let url = server_url.to_string();
        tokio::task::spawn_blocking(move || JsonModuleStore::with_path(path).load_sync(&url))
            .await
            .context("module load task panicked")?
    }

    async fn save_modules(&self, server_url: &str, records: &[ModuleRecord]) -> Result<()> {
        let path = self.path.clone();
        let url = server_url.to_string();
        let records = records.to_vec();
        tokio::task::spawn_blocking(move || {
            JsonModuleStore::with_path(path).save_sync(&url, records)
        })
        .await
        .context("module save task panicked")?
    }
}
