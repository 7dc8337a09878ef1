//! Deployable archive values produced by the packaging step.

use std::collections::HashSet;
use std::path::PathBuf;

use stratus_common::ResourceFingerprint;

/// One file of an incremental archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path relative to the application root, `/` separated.
    pub path: String,
    /// Lowercase hex SHA-256 of `contents`.
    pub sha256: String,
    pub contents: Vec<u8>,
}

impl ArchiveEntry {
    #[must_use]
    pub fn fingerprint(&self) -> ResourceFingerprint {
        ResourceFingerprint {
            path: self.path.clone(),
            sha256: self.sha256.clone(),
            size: self.contents.len() as u64,
        }
    }
}

/// Archive whose upload payload is produced only once the server has said
/// which resources it already caches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachingArchive {
    entries: Vec<ArchiveEntry>,
}

impl CachingArchive {
    #[must_use]
    pub fn new(entries: Vec<ArchiveEntry>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn fingerprints(&self) -> Vec<ResourceFingerprint> {
        self.entries.iter().map(ArchiveEntry::fingerprint).collect()
    }

    /// Entries the server does not already hold.
    #[must_use]
    pub fn unmatched(&self, matched: &[ResourceFingerprint]) -> Vec<ArchiveEntry> {
        let matched: HashSet<(&str, &str)> = matched
            .iter()
            .map(|f| (f.path.as_str(), f.sha256.as_str()))
            .collect();
        self.entries
            .iter()
            .filter(|e| !matched.contains(&(e.path.as_str(), e.sha256.as_str())))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Content to push for one application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationArchive {
    /// A packaged archive on disk (zip, war, tar.gz).
    File(PathBuf),
    /// Packaged archive bytes (tar.gz).
    Bytes(Vec<u8>),
    Incremental(CachingArchive),
}

/// Bits handed to the control-plane client for one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadPayload {
    File(PathBuf),
    Bytes(Vec<u8>),
    /// Only the entries the server lacks; the client packs them.
    Entries(Vec<ArchiveEntry>),
}

/// A complete upload request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub payload: UploadPayload,
    /// Resources the server already holds and should reuse.
    pub resources: Vec<ResourceFingerprint>,
}

impl Upload {
    #[must_use]
    pub fn full(payload: UploadPayload) -> Self {
        Self {
            payload,
            resources: Vec::new(),
        }
    }
}
