//! # swarmstack core
//!
//! Installation state and dependency model for the swarmstack installer.
//!
//! This crate has no knowledge of shells, terminals or container engines.
//! `swarmstack-cli` drives the host; this crate decides what may be
//! installed, in what order, and remembers what was.
//!
//! ## Architecture
//!
//! ```text
//! menu ──► orchestrator ──┬──► Registry ──► StateStore ──► state.json
//!                         └──► Driver (cli crate) ──► Metadata ──┘
//! ```
//!
//! ## Core Components
//!
//! - [`StateStore`]: persistent, write-through record of installed components
//! - [`Registry`]: declared components, dependency guard, install/removal order
//! - [`Lifecycle`]: per-component state machine
//! - [`CredentialReport`]: plain-text credential summary
//! - [`secrets`], [`validators`], [`template`]: helpers used by the drivers

pub mod credentials;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod secrets;
pub mod state;
pub mod template;
pub mod validators;

pub use credentials::CredentialReport;
pub use error::{LifecycleError, RegistryError, StateError};
pub use lifecycle::{Lifecycle, TransitionPhase};
pub use registry::{ComponentSpec, DependencyCheck, Registry};
pub use state::{ComponentRecord, Metadata, StateStore, StatusSummary};
pub use template::TemplateVars;
