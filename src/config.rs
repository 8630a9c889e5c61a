//! Site configuration module.
//!
//! Handles loading and validating `config.toml` at the site root. Every key is
//! optional; a missing file means the stock defaults.
//!
//! ## Site Layout
//!
//! ```text
//! my-site/
//! ├── config.toml              # Site config (optional)
//! ├── content/                 # Markdown content (content_dir)
//! │   ├── about.md
//! │   └── posts/
//! │       └── hello.md
//! ├── layouts/                 # Site views, override theme views (layout_dir)
//! ├── static/                  # Site assets, override theme assets (static_dir)
//! ├── themes/
//! │   └── default/             # theme
//! │       ├── layouts/
//! │       │   ├── base.html
//! │       │   ├── single.html
//! │       │   └── list.html
//! │       └── static/
//! └── public/                  # Build output (output_dir)
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! title = "Scribe"
//! description = ""
//! language = "en"
//! author = ""
//! base_url = "http://example.com/"
//! theme = "default"
//! trailing_slash = true     # Page URLs end with '/'
//!
//! content_dir = "content"
//! layout_dir = "layouts"
//! static_dir = "static"
//! output_dir = "public"
//!
//! [build]
//! max_workers = 4           # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::executor;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the site configuration, relative to the site root.
pub const CONFIG_FILE: &str = "config.toml";

/// Directory holding installed themes, relative to the site root.
pub const THEMES_DIR: &str = "themes";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Site title, used by the home page and the base layout.
    pub title: String,
    pub description: String,
    pub language: String,
    pub author: String,
    /// Absolute URL the site is served from; prefixes every permalink.
    pub base_url: String,
    /// Name of the theme directory under `themes/`.
    pub theme: String,
    /// Whether page URLs end with a `/`.
    pub trailing_slash: bool,
    pub content_dir: String,
    pub layout_dir: String,
    pub static_dir: String,
    pub output_dir: String,
    /// Parallel build settings.
    pub build: BuildConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "Scribe".to_string(),
            description: String::new(),
            language: "en".to_string(),
            author: String::new(),
            base_url: "http://example.com/".to_string(),
            theme: "default".to_string(),
            trailing_slash: true,
            content_dir: "content".to_string(),
            layout_dir: "layouts".to_string(),
            static_dir: "static".to_string(),
            output_dir: "public".to_string(),
            build: BuildConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Validate config values are usable as paths.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("content_dir", &self.content_dir),
            ("layout_dir", &self.layout_dir),
            ("static_dir", &self.static_dir),
            ("output_dir", &self.output_dir),
            ("theme", &self.theme),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }
        if self.theme.contains(['/', '\\']) || self.theme == ".." {
            return Err(ConfigError::Validation(
                "theme must be a directory name, not a path".into(),
            ));
        }
        if self.build.max_workers == Some(0) {
            return Err(ConfigError::Validation(
                "build.max_workers must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Resolved directories for a site rooted at `site_root`.
    pub fn paths(&self, site_root: &Path) -> SitePaths {
        let theme_root = site_root.join(THEMES_DIR).join(&self.theme);
        SitePaths {
            root: site_root.to_path_buf(),
            content: site_root.join(&self.content_dir),
            layouts: site_root.join(&self.layout_dir),
            static_files: site_root.join(&self.static_dir),
            output: site_root.join(&self.output_dir),
            theme_layouts: theme_root.join("layouts"),
            theme_static: theme_root.join("static"),
            themes: site_root.join(THEMES_DIR),
            config_file: site_root.join(CONFIG_FILE),
        }
    }
}

/// Absolute locations derived from a [`SiteConfig`] and a site root.
#[derive(Debug, Clone, PartialEq)]
pub struct SitePaths {
    pub root: PathBuf,
    pub content: PathBuf,
    pub layouts: PathBuf,
    pub static_files: PathBuf,
    pub output: PathBuf,
    pub theme_layouts: PathBuf,
    pub theme_static: PathBuf,
    pub themes: PathBuf,
    pub config_file: PathBuf,
}

/// Parallel build settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Maximum number of parallel build workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_workers: Option<usize>,
}

/// Resolve the effective worker count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_workers(config: &BuildConfig) -> usize {
    let cores = executor::available_parallelism();
    config.max_workers.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Load `config.toml` from the site root, falling back to defaults.
pub fn load_config(site_root: &Path) -> Result<SiteConfig, ConfigError> {
    let config_path = site_root.join(CONFIG_FILE);
    if !config_path.exists() {
        return Ok(SiteConfig::default());
    }
    let content = fs::read_to_string(&config_path)?;
    let config: SiteConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// A documented `config.toml` with every option at its default value.
pub fn stock_config_toml() -> &'static str {
    r#"# Scribe site configuration
# All options are optional. Values shown are the defaults.

# Site title, shown on the home page and in the base layout.
title = "Scribe"
description = ""
language = "en"
author = ""

# Absolute URL the site is served from. Every permalink starts with it.
base_url = "http://example.com/"

# Theme directory under themes/.
theme = "default"

# Page URLs end with '/' (posts/hello/ instead of posts/hello).
trailing_slash = true

# Site directories, relative to the site root.
content_dir = "content"
layout_dir = "layouts"
static_dir = "static"
output_dir = "public"

[build]
# Maximum number of parallel build workers. Omit to use every CPU core.
# Values above the core count are clamped down.
# max_workers = 4
"#
}
