//! Per-component lifecycle state machine.
//!
//! ```text
//! NotInstalled ──► Installing ──► Installed ──► Uninstalling ──► NotInstalled
//!                      ▲   │          │              │
//!                      │   └──► NotInstalled         └──► Installed (declined)
//!                      │              │
//!                      └── Reinstalling ◄──┘
//! ```
//!
//! Reinstall is uninstall-then-install. The `Reinstalling` phase is recorded
//! in the state document before the uninstall step so an interrupted
//! reinstall can be told apart from "never installed".

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;
use crate::state::StateStore;

/// Lifecycle state of a single component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    NotInstalled,
    Installing,
    Installed,
    Uninstalling,
    Reinstalling,
}

/// An in-flight transition, as persisted in the state document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionPhase {
    Installing,
    Uninstalling,
    Reinstalling,
}

impl Lifecycle {
    /// Whether `self -> to` is a legal transition.
    pub fn can_transition(self, to: Lifecycle) -> bool {
        use Lifecycle::*;
        matches!(
            (self, to),
            (NotInstalled, Installing)
                | (Installing, Installed)
                | (Installing, NotInstalled)
                | (Installed, Uninstalling)
                | (Installed, Reinstalling)
                | (Uninstalling, NotInstalled)
                | (Uninstalling, Installed)
                | (Reinstalling, Installing)
                | (Reinstalling, Installed)
        )
    }

    /// Move to `to`, or report the illegal transition.
    pub fn transition(self, to: Lifecycle) -> Result<Lifecycle, LifecycleError> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(LifecycleError { from: self, to })
        }
    }

    /// Derive the current state of `name` from the store.
    ///
    /// A recorded pending phase wins over the installed flag.
    pub fn observe(store: &StateStore, name: &str) -> Lifecycle {
        match store.pending(name) {
            Some(op) => op.phase.into(),
            None if store.is_installed(name) => Lifecycle::Installed,
            None => Lifecycle::NotInstalled,
        }
    }

    /// States that describe work in progress.
    pub fn is_transitional(self) -> bool {
        matches!(
            self,
            Lifecycle::Installing | Lifecycle::Uninstalling | Lifecycle::Reinstalling
        )
    }
}

impl From<TransitionPhase> for Lifecycle {
    fn from(phase: TransitionPhase) -> Self {
        match phase {
            TransitionPhase::Installing => Lifecycle::Installing,
            TransitionPhase::Uninstalling => Lifecycle::Uninstalling,
            TransitionPhase::Reinstalling => Lifecycle::Reinstalling,
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Lifecycle::NotInstalled => "not installed",
            Lifecycle::Installing => "installing",
            Lifecycle::Installed => "installed",
            Lifecycle::Uninstalling => "uninstalling",
            Lifecycle::Reinstalling => "reinstalling",
        };
        f.write_str(label)
    }
}

impl fmt::Display for TransitionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Lifecycle::from(*self).fmt(f)
    }
}
