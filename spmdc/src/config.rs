//! Per-target link configuration.
//!
//! A [`LinkContext`] is built once for each compilation target and passed by
//! reference to the link pipeline. It can be assembled in code or read from
//! a TOML file.
//!
//! # Example
//!
//! ```toml
//! [target]
//! isa = "avx2-i32x8"
//! os = "linux"
//! arch = "x86-64"
//!
//! [link]
//! include-stdlib = true
//! multi-target = false
//! debug-stages = [1, 3]
//! disabled-stages = []
//! dump-dir = "ir-dumps"
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::target::{Arch, Target, TargetError, TargetIsa, TargetOs};

/// Errors that can occur when loading a link configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read link configuration: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse link configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("invalid target: {0}")]
    Target(#[from] TargetError),
}

/// Everything the link pipeline reads about the current compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkContext {
    pub target: Target,
    /// Link the standard library before the builtins.
    pub include_stdlib: bool,
    /// Code for several ISAs ends up in one object.
    pub multi_target: bool,
    /// Checkpoint indices whose IR is dumped.
    pub debug_stages: BTreeSet<u32>,
    /// Checkpoint indices never dumped, even if listed in `debug_stages`.
    pub disabled_stages: BTreeSet<u32>,
    /// Where dumps go; standard output if unset.
    pub dump_dir: Option<PathBuf>,
}

impl LinkContext {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            include_stdlib: true,
            multi_target: false,
            debug_stages: BTreeSet::new(),
            disabled_stages: BTreeSet::new(),
            dump_dir: None,
        }
    }

    pub fn with_stdlib(mut self, include: bool) -> Self {
        self.include_stdlib = include;
        self
    }

    pub fn with_multi_target(mut self, multi_target: bool) -> Self {
        self.multi_target = multi_target;
        self
    }

    pub fn with_debug_stages(mut self, stages: impl IntoIterator<Item = u32>) -> Self {
        self.debug_stages.extend(stages);
        self
    }

    pub fn with_disabled_stages(mut self, stages: impl IntoIterator<Item = u32>) -> Self {
        self.disabled_stages.extend(stages);
        self
    }

    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }

    /// Whether checkpoint `index` should be dumped.
    pub fn dumps_stage(&self, index: u32) -> bool {
        self.debug_stages.contains(&index) && !self.disabled_stages.contains(&index)
    }

    /// Parse a configuration from TOML text.
    #[allow(clippy::should_implement_trait)] // Uses ConfigError, not compatible with FromStr trait
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;
        raw.into_context()
    }

    /// Load a configuration file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Serialize back to TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(&RawConfig::from(self))
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    target: RawTarget,
    #[serde(default)]
    link: RawLink,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTarget {
    isa: TargetIsa,
    os: TargetOs,
    arch: Arch,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct RawLink {
    #[serde(default = "default_true")]
    include_stdlib: bool,
    #[serde(default)]
    multi_target: bool,
    #[serde(default)]
    debug_stages: BTreeSet<u32>,
    #[serde(default)]
    disabled_stages: BTreeSet<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dump_dir: Option<PathBuf>,
}

impl Default for RawLink {
    fn default() -> Self {
        Self {
            include_stdlib: true,
            multi_target: false,
            debug_stages: BTreeSet::new(),
            disabled_stages: BTreeSet::new(),
            dump_dir: None,
        }
    }
}

fn default_true() -> bool {
    true
}

impl RawConfig {
    fn into_context(self) -> Result<LinkContext, ConfigError> {
        let target = Target::new(self.target.isa, self.target.os, self.target.arch)?;
        Ok(LinkContext {
            target,
            include_stdlib: self.link.include_stdlib,
            multi_target: self.link.multi_target,
            debug_stages: self.link.debug_stages,
            disabled_stages: self.link.disabled_stages,
            dump_dir: self.link.dump_dir,
        })
    }
}

impl From<&LinkContext> for RawConfig {
    fn from(ctx: &LinkContext) -> Self {
        Self {
            target: RawTarget {
                isa: ctx.target.isa(),
                os: ctx.target.os(),
                arch: ctx.target.arch(),
            },
            link: RawLink {
                include_stdlib: ctx.include_stdlib,
                multi_target: ctx.multi_target,
                debug_stages: ctx.debug_stages.clone(),
                disabled_stages: ctx.disabled_stages.clone(),
                dump_dir: ctx.dump_dir.clone(),
            },
        }
    }
}
