//! Infrastructure implementation of the `ArchiveProvider` port.
//!
//! Modules are directories on disk. A module whose project path points at a
//! file (war, jar, zip or tar.gz) is pushed as that file. Directories are
//! packed to gzipped tar. A per-module manifest of content hashes from the
//! last archive lets the next push send only what changed.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::application::ports::ArchiveProvider;
use crate::domain::{ApplicationArchive, ApplicationModule, ArchiveEntry, CachingArchive};

/// Directory names never packed.
const SKIPPED_DIRS: &[&str] = &[".git", ".svn", ".hg", ".stratus"];

type Manifest = BTreeMap<String, String>;

/// Lowercase hex SHA-256 of `data`.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Pack entries into a gzipped tar in path order.
///
/// # Errors
///
/// Returns an error if an entry cannot be appended.
pub fn pack_entries(entries: &[ArchiveEntry]) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for entry in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(entry.contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, &entry.path, entry.contents.as_slice())
            .with_context(|| format!("adding {} to archive", entry.path))?;
    }
    let mut encoder = builder.into_inner().context("finishing tar stream")?;
    encoder.flush().context("flushing archive")?;
    encoder.finish().context("finishing gzip stream")
}

/// Read every file under `root` as an archive entry, sorted by path.
fn collect_entries(root: &Path) -> Result<Vec<ArchiveEntry>> {
    let mut entries = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let listing =
            std::fs::read_dir(&dir).with_context(|| format!("listing {}", dir.display()))?;
        for item in listing {
            let item = item.with_context(|| format!("listing {}", dir.display()))?;
            let path = item.path();
            let file_type = item
                .file_type()
                .with_context(|| format!("inspecting {}", path.display()))?;
            if file_type.is_dir() {
                let skipped = item
                    .file_name()
                    .to_str()
                    .is_some_and(|n| SKIPPED_DIRS.contains(&n));
                if !skipped {
                    pending.push(path);
                }
            } else if file_type.is_file() {
                let contents =
                    std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
                entries.push(ArchiveEntry {
                    path: relative_path(root, &path)?,
                    sha256: sha256_hex(&contents),
                    contents,
                });
            }
        }
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

fn relative_path(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

/// Packs module directories and tracks what was last archived.
pub struct DirectoryArchiver {
    manifest_dir: PathBuf,
}

impl DirectoryArchiver {
    /// Archiver keeping manifests under `~/.stratus/manifests`.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self> {
        let home =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
        Ok(Self::with_manifest_dir(home.join(".stratus").join("manifests")))
    }

    #[must_use]
    pub fn with_manifest_dir(manifest_dir: PathBuf) -> Self {
        Self { manifest_dir }
    }

    fn manifest_path(&self, module: &ApplicationModule) -> PathBuf {
        self.manifest_dir
            .join(format!("{}.json", module.module_id().replace(['/', '\\'], "_")))
    }

    fn read_manifest(&self, module: &ApplicationModule) -> Result<Option<Manifest>> {
        let path = self.manifest_path(module);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading manifest {}", path.display()))?;
        let manifest = serde_json::from_str(&content)
            .with_context(|| format!("parsing manifest {}", path.display()))?;
        Ok(Some(manifest))
    }

    fn write_manifest(&self, module: &ApplicationModule, entries: &[ArchiveEntry]) -> Result<()> {
        std::fs::create_dir_all(&self.manifest_dir)
            .with_context(|| format!("creating {}", self.manifest_dir.display()))?;
        let manifest: Manifest = entries
            .iter()
            .map(|e| (e.path.clone(), e.sha256.clone()))
            .collect();
        let path = self.manifest_path(module);
        let content = serde_json::to_string_pretty(&manifest).context("serializing manifest")?;
        std::fs::write(&path, content)
            .with_context(|| format!("writing manifest {}", path.display()))
    }
}

fn project_dir(module: &ApplicationModule) -> Result<PathBuf> {
    module
        .project_path()
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow::anyhow!("module '{}' has no project path", module.module_id()))
}

async fn entries_of(root: PathBuf) -> Result<Vec<ArchiveEntry>> {
    tokio::task::spawn_blocking(move || collect_entries(&root))
        .await
        .context("archive task panicked")?
}

impl ArchiveProvider for DirectoryArchiver {
    async fn delegate_archive(
        &self,
        module: &ApplicationModule,
    ) -> Result<Option<ApplicationArchive>> {
        let Some(path) = module.project_path() else {
            return Ok(None);
        };
        if path.is_file() {
            debug!(path = %path.display(), "using packaged archive");
            return Ok(Some(ApplicationArchive::File(path.to_path_buf())));
        }
        Ok(None)
    }

    async fn changed_files(&self, module: &ApplicationModule) -> Result<Option<Vec<String>>> {
        let Some(previous) = self.read_manifest(module)? else {
            return Ok(None);
        };
        let entries = entries_of(project_dir(module)?).await?;
        let changed = entries
            .into_iter()
            .filter(|e| previous.get(&e.path) != Some(&e.sha256))
            .map(|e| e.path)
            .collect();
        Ok(Some(changed))
    }

    async fn incremental_archive(
        &self,
        module: &ApplicationModule,
        changed: &[String],
    ) -> Result<Option<CachingArchive>> {
        let entries = entries_of(project_dir(module)?).await?;
        debug!(
            module = module.module_id(),
            files = entries.len(),
            changed = changed.len(),
            "building incremental archive"
        );
        self.write_manifest(module, &entries)?;
        Ok(Some(CachingArchive::new(entries)))
    }

    async fn full_archive(&self, module: &ApplicationModule) -> Result<ApplicationArchive> {
        let entries = entries_of(project_dir(module)?).await?;
        if entries.is_empty() {
            anyhow::bail!("module '{}' has no files to push", module.module_id());
        }
        self.write_manifest(module, &entries)?;
        let bytes = tokio::task::spawn_blocking(move || pack_entries(&entries))
            .await
            .context("archive task panicked")??;
        Ok(ApplicationArchive::Bytes(bytes))
    }
}
