//! Worker version lifecycle.
//!
//! A registration holds at most one installing, one waiting and one active
//! version. A new version installs alongside the active one, waits, and
//! replaces it on activation; the replaced version becomes redundant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use harbor_common::{Error, Result};

/// State of one worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerState {
    /// Install handler is running.
    Installing,
    /// Installed, waiting for activation.
    Installed,
    /// Activate handler is running.
    Activating,
    /// Controlling clients.
    Activated,
    /// Replaced, or failed to install.
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// A worker version and its current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerVersion {
    pub version: String,
    pub state: WorkerState,
    pub changed_at: DateTime<Utc>,
}

impl WorkerVersion {
    fn new(version: impl Into<String>, state: WorkerState) -> Self {
        Self {
            version: version.into(),
            state,
            changed_at: Utc::now(),
        }
    }

    fn set_state(&mut self, state: WorkerState) {
        debug!("Worker {} -> {}", self.version, state);
        self.state = state;
        self.changed_at = Utc::now();
    }
}

/// Lifecycle state of a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub scope: String,
    pub installing: Option<WorkerVersion>,
    pub waiting: Option<WorkerVersion>,
    pub active: Option<WorkerVersion>,
    /// Versions retired by this registration, oldest first.
    #[serde(default)]
    pub redundant: Vec<WorkerVersion>,
}

impl Registration {
    /// Fresh registration with no versions.
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            installing: None,
            waiting: None,
            active: None,
            redundant: Vec::new(),
        }
    }

    pub fn installing_version(&self) -> Option<&str> {
        self.installing.as_ref().map(|w| w.version.as_str())
    }

    pub fn waiting_version(&self) -> Option<&str> {
        self.waiting.as_ref().map(|w| w.version.as_str())
    }

    pub fn active_version(&self) -> Option<&str> {
        self.active.as_ref().map(|w| w.version.as_str())
    }

    /// Start installing `version`. An install already in progress is abandoned.
    pub fn begin_install(&mut self, version: impl Into<String>) {
        if let Some(previous) = self.installing.take() {
            self.retire(previous);
        }
        self.installing = Some(WorkerVersion::new(version, WorkerState::Installing));
    }

    /// Move the installing version to waiting.
    ///
    /// A version that was already waiting is replaced and becomes redundant.
    ///
    /// # Errors
    /// - Nothing is installing
    pub fn complete_install(&mut self) -> Result<()> {
        let mut worker = self
            .installing
            .take()
            .ok_or_else(|| Error::InvalidInput("No worker version is installing".to_string()))?;
        worker.set_state(WorkerState::Installed);

        if let Some(previous) = self.waiting.replace(worker) {
            self.retire(previous);
        }
        Ok(())
    }

    /// Drop the installing version.
    pub fn fail_install(&mut self) {
        if let Some(worker) = self.installing.take() {
            self.retire(worker);
        }
    }

    /// Mark the waiting version as activating and return its version.
    ///
    /// # Errors
    /// - Nothing is waiting
    pub fn begin_activate(&mut self) -> Result<String> {
        let worker = self
            .waiting
            .as_mut()
            .ok_or_else(|| Error::InvalidInput("No worker version is waiting".to_string()))?;
        worker.set_state(WorkerState::Activating);
        Ok(worker.version.clone())
    }

    /// Promote the activating version. The previous active one becomes redundant.
    ///
    /// # Errors
    /// - No waiting version is activating
    pub fn complete_activate(&mut self) -> Result<()> {
        match &self.waiting {
            Some(worker) if worker.state == WorkerState::Activating => {}
            _ => {
                return Err(Error::InvalidInput(
                    "No worker version is activating".to_string(),
                ))
            }
        }

        if let Some(mut worker) = self.waiting.take() {
            worker.set_state(WorkerState::Activated);
            if let Some(previous) = self.active.replace(worker) {
                self.retire(previous);
            }
        }

        info!(
            "Worker {} activated for {}",
            self.active_version().unwrap_or_default(),
            self.scope
        );
        Ok(())
    }

    /// Activation failed: the version goes back to waiting.
    pub fn fail_activate(&mut self) {
        if let Some(worker) = self.waiting.as_mut() {
            worker.set_state(WorkerState::Installed);
        }
    }

    /// Whether activation may run now.
    ///
    /// A waiting version normally activates only once no client is
    /// controlled by the old one. With `skip_waiting` it activates anyway.
    pub fn may_activate(&self, clients: usize, skip_waiting: bool) -> bool {
        match &self.waiting {
            Some(worker) if worker.state == WorkerState::Installed => skip_waiting || clients == 0,
            _ => false,
        }
    }

    fn retire(&mut self, mut worker: WorkerVersion) {
        worker.set_state(WorkerState::Redundant);
        self.redundant.push(worker);
    }
}
