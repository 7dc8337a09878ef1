//! Application services — use-case orchestration.
//!
//! Each service module implements a single use-case by composing domain logic
//! with port trait calls. Services import only from `crate::domain` and
//! `crate::application::ports` — never from `crate::infra`, `crate::commands`,
//! or `crate::output`.

pub mod app_ops;
pub mod deploy;
pub mod executor;
pub mod publish;
pub mod readiness;
pub mod reconcile;
pub mod retry;
pub mod session;
