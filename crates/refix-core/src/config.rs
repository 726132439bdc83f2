//! Rewrite configuration supplied by the build script.
//!
//! Mirrors what a host exposes to users: an optional config-file override,
//! include/exclude source filters, and the semanticdb toggle.

use std::path::{Path, PathBuf};

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::host::HostProject;

/// File name probed for when no explicit config file is set.
pub const DEFAULT_CONFIG_FILE: &str = ".scalafix.conf";

/// User-facing configuration of the rewrite tasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RewriteConfig {
    /// Explicit config file. Wins over every probed location and is used
    /// as given, even if the file does not exist yet.
    pub config_file: Option<PathBuf>,

    /// Glob patterns a source file must match to be processed.
    /// `None` means every file is eligible.
    pub includes: Option<Vec<String>>,

    /// Glob patterns that remove files after the includes are applied.
    pub excludes: Option<Vec<String>>,

    /// Whether compile steps are configured to emit semanticdb metadata
    /// and engine tasks depend on them.
    pub semanticdb: bool,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            config_file: None,
            includes: None,
            excludes: None,
            semanticdb: true,
        }
    }
}

impl RewriteConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    pub fn with_includes(mut self, patterns: Vec<String>) -> Self {
        self.includes = Some(patterns);
        self
    }

    pub fn with_excludes(mut self, patterns: Vec<String>) -> Self {
        self.excludes = Some(patterns);
        self
    }

    pub fn with_semanticdb(mut self, enabled: bool) -> Self {
        self.semanticdb = enabled;
        self
    }

    /// Resolve the effective config file: explicit override, then the
    /// project's `.scalafix.conf`, then the root project's, then none.
    pub fn resolve_config_file(&self, project: &dyn HostProject) -> Option<PathBuf> {
        if let Some(explicit) = &self.config_file {
            return Some(explicit.clone());
        }
        locate_config_file(project.project_dir())
            .or_else(|| project.root_dir().and_then(locate_config_file))
    }

    /// Apply the include/exclude filters, preserving input order.
    ///
    /// Patterns match against the full path; prefix user patterns with
    /// `**/` to match files at any depth.
    pub fn filter_sources(&self, files: &[PathBuf]) -> ConfigResult<Vec<PathBuf>> {
        let includes = compile_patterns(self.includes.as_deref())?;
        let excludes = compile_patterns(self.excludes.as_deref())?;

        Ok(files
            .iter()
            .filter(|file| {
                let included = match &includes {
                    Some(patterns) => patterns.iter().any(|p| p.matches_path(file)),
                    None => true,
                };
                let excluded = match &excludes {
                    Some(patterns) => patterns.iter().any(|p| p.matches_path(file)),
                    None => false,
                };
                included && !excluded
            })
            .cloned()
            .collect())
    }
}

fn locate_config_file(dir: &Path) -> Option<PathBuf> {
    let candidate = dir.join(DEFAULT_CONFIG_FILE);
    candidate.is_file().then_some(candidate)
}

fn compile_patterns(patterns: Option<&[String]>) -> ConfigResult<Option<Vec<Pattern>>> {
    patterns
        .map(|patterns| {
            patterns
                .iter()
                .map(|pattern| {
                    Pattern::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                        pattern: pattern.clone(),
                        source,
                    })
                })
                .collect()
        })
        .transpose()
}
