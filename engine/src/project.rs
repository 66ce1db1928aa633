//! Project roots and the per-project analyzer selection policy.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// A project the analyzers run against. Only its root directory matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Project {
    root: PathBuf,
}

impl Project {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a tool-reported path against the project root. Absolute paths
    /// are kept as they are.
    #[must_use]
    pub fn resolve(&self, reported: &Path) -> PathBuf {
        if reported.is_absolute() {
            reported.to_path_buf()
        } else {
            self.root.join(reported)
        }
    }
}

/// Supplies the current set of projects. Enumeration belongs to the host.
pub trait ProjectSource: Send + Sync {
    fn projects(&self) -> Vec<Project>;
}

/// A project list that can be replaced at runtime.
#[derive(Debug, Default)]
pub struct StaticProjects {
    projects: RwLock<Vec<Project>>,
}

impl StaticProjects {
    #[must_use]
    pub fn new(projects: Vec<Project>) -> Self {
        Self {
            projects: RwLock::new(projects),
        }
    }

    #[must_use]
    pub fn shared(projects: Vec<Project>) -> Arc<Self> {
        Arc::new(Self::new(projects))
    }

    pub fn replace(&self, projects: Vec<Project>) {
        *self
            .projects
            .write()
            .unwrap_or_else(PoisonError::into_inner) = projects;
    }
}

impl ProjectSource for StaticProjects {
    fn projects(&self) -> Vec<Project> {
        self.projects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Decides which analyzers run on which project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryPolicy {
    /// Run an analyzer only where one of its marker config files exists in
    /// the project root. Off: every analyzer runs on every project.
    pub require_config_file: bool,
}

impl DiscoveryPolicy {
    #[must_use]
    pub fn applies(&self, config_files: &[String], project: &Project) -> bool {
        if !self.require_config_file {
            return true;
        }
        config_files
            .iter()
            .any(|name| project.root().join(name).is_file())
    }
}
