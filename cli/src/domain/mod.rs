//! Domain layer — pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod archive;
pub mod config;
pub mod deployment;
pub mod error;
pub mod module;
pub mod server;
pub mod url_lookup;

pub use archive::{ApplicationArchive, ArchiveEntry, CachingArchive, Upload, UploadPayload};
pub use config::{StratusConfig, TimeoutConfig, validate_config_key, validate_config_value};
pub use deployment::{DeploymentInfo, DeploymentWorkingCopy, LaunchMode};
pub use error::{CloudError, ConfigError, DeployError, ModuleError, TransientSignature, UrlError};
pub use module::{
    ApplicationModule, ModuleRecord, ModuleStatus, PublishState, ReconcileReport, RemoteSnapshot,
    TrackedModuleSet,
};
pub use server::{Credentials, DebugSupport, ServerState, ServerStatus};
pub use url_lookup::{ApplicationUrl, ApplicationUrlLookup};
