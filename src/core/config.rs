//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{GlError, Result};

/// Full engine configuration: data roots, scan settings, sources, exclusions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub roots: RootsConfig,
    pub settings: Settings,
    pub sources: Vec<Source>,
    pub exclusions: Vec<Exclusion>,
}

/// Filesystem roots the engine reads from / writes into.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RootsConfig {
    pub data_root: PathBuf,
    pub output_root: PathBuf,
    pub config_root: PathBuf,
    pub duplicates_root: PathBuf,
    pub tmp_root: PathBuf,
    /// Optional secondary temp location, used when `tmp_root` can't host a temp file.
    pub temp_dir: Option<PathBuf>,
    /// Absolute paths that external browse calls may enumerate.
    pub allowed_browse_roots: Vec<PathBuf>,
}

impl Default for RootsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[GL-CONFIG] WARNING: HOME not set, falling back to /var/lib/gallery-sync for data paths"
                );
                PathBuf::from("/var/lib/gallery-sync")
            },
            PathBuf::from,
        );
        let data_dir = if home_dir == Path::new("/var/lib/gallery-sync") {
            home_dir
        } else {
            home_dir.join(".local").join("share").join("gallery-sync")
        };
        Self {
            data_root: data_dir.join("library"),
            output_root: data_dir.join("output"),
            config_root: data_dir.join("config"),
            duplicates_root: data_dir.join("duplicates"),
            tmp_root: data_dir.join("tmp"),
            temp_dir: None,
            allowed_browse_roots: Vec::new(),
        }
    }
}

/// Which output containers a scan should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    #[default]
    Zip,
    Foldercopy,
    #[serde(rename = "zip+foldercopy")]
    ZipAndFoldercopy,
}

impl OutputMode {
    #[must_use]
    pub const fn wants_zip(self) -> bool {
        matches!(self, Self::Zip | Self::ZipAndFoldercopy)
    }

    #[must_use]
    pub const fn wants_foldercopy(self) -> bool {
        matches!(self, Self::Foldercopy | Self::ZipAndFoldercopy)
    }
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Zip => f.write_str("zip"),
            Self::Foldercopy => f.write_str("foldercopy"),
            Self::ZipAndFoldercopy => f.write_str("zip+foldercopy"),
        }
    }
}

impl std::str::FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "zip" => Ok(Self::Zip),
            "foldercopy" => Ok(Self::Foldercopy),
            "zip+foldercopy" => Ok(Self::ZipAndFoldercopy),
            other => Err(format!(
                "invalid output_mode {other:?}: expected \"zip\", \"foldercopy\", or \"zip+foldercopy\""
            )),
        }
    }
}

/// Archive container extension used for gallery zips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveExtension {
    #[default]
    Zip,
    Cbz,
}

impl ArchiveExtension {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Cbz => "cbz",
        }
    }
}

impl std::fmt::Display for ArchiveExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only per-scan settings snapshot (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub zip_galleries: bool,
    pub update_gallery_zips: bool,
    pub replicate_nesting: bool,
    pub leaf_only: bool,
    pub consider_images_in_subfolders: bool,
    pub output_mode: OutputMode,
    pub copy_sidecars: bool,
    pub lanraragi_flatten: bool,
    pub archive_extension_for_galleries: ArchiveExtension,
    pub duplicates_enabled: bool,
    pub min_images_to_be_gallery: usize,
    pub archive_extensions: BTreeSet<String>,
    pub image_extensions: BTreeSet<String>,
    pub auto_scan_enabled: bool,
    pub auto_scan_interval_minutes: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            zip_galleries: true,
            update_gallery_zips: true,
            replicate_nesting: true,
            leaf_only: true,
            consider_images_in_subfolders: false,
            output_mode: OutputMode::Zip,
            copy_sidecars: true,
            lanraragi_flatten: false,
            archive_extension_for_galleries: ArchiveExtension::Zip,
            duplicates_enabled: true,
            min_images_to_be_gallery: 1,
            archive_extensions: normalize_extensions(["zip", "cbz", "rar", "cbr"]),
            image_extensions: normalize_extensions([
                "jpg", "jpeg", "png", "gif", "webp", "bmp", "avif",
            ]),
            auto_scan_enabled: false,
            auto_scan_interval_minutes: 60,
        }
    }
}

/// Partial update applied to `Settings`; mirrors the API layer's PATCH payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SettingsUpdate {
    pub zip_galleries: Option<bool>,
    pub update_gallery_zips: Option<bool>,
    pub replicate_nesting: Option<bool>,
    pub leaf_only: Option<bool>,
    pub consider_images_in_subfolders: Option<bool>,
    pub output_mode: Option<OutputMode>,
    pub copy_sidecars: Option<bool>,
    pub lanraragi_flatten: Option<bool>,
    pub archive_extension_for_galleries: Option<ArchiveExtension>,
    pub duplicates_enabled: Option<bool>,
    pub min_images_to_be_gallery: Option<usize>,
    pub archive_extensions: Option<BTreeSet<String>>,
    pub image_extensions: Option<BTreeSet<String>>,
    pub auto_scan_enabled: Option<bool>,
    pub auto_scan_interval_minutes: Option<u64>,
}

impl Settings {
    /// Apply a partial update, field by field, normalizing any extension sets.
    pub fn merge_update(&mut self, update: SettingsUpdate) {
        if let Some(v) = update.zip_galleries {
            self.zip_galleries = v;
        }
        if let Some(v) = update.update_gallery_zips {
            self.update_gallery_zips = v;
        }
        if let Some(v) = update.replicate_nesting {
            self.replicate_nesting = v;
        }
        if let Some(v) = update.leaf_only {
            self.leaf_only = v;
        }
        if let Some(v) = update.consider_images_in_subfolders {
            self.consider_images_in_subfolders = v;
        }
        if let Some(v) = update.output_mode {
            self.output_mode = v;
        }
        if let Some(v) = update.copy_sidecars {
            self.copy_sidecars = v;
        }
        if let Some(v) = update.lanraragi_flatten {
            self.lanraragi_flatten = v;
        }
        if let Some(v) = update.archive_extension_for_galleries {
            self.archive_extension_for_galleries = v;
        }
        if let Some(v) = update.duplicates_enabled {
            self.duplicates_enabled = v;
        }
        if let Some(v) = update.min_images_to_be_gallery {
            self.min_images_to_be_gallery = v;
        }
        if let Some(v) = update.archive_extensions {
            self.archive_extensions = normalize_extensions(v);
        }
        if let Some(v) = update.image_extensions {
            self.image_extensions = normalize_extensions(v);
        }
        if let Some(v) = update.auto_scan_enabled {
            self.auto_scan_enabled = v;
        }
        if let Some(v) = update.auto_scan_interval_minutes {
            self.auto_scan_interval_minutes = v;
        }
    }
}

/// Lower-case, strip leading `.`, dedupe while preserving insertion via `BTreeSet`.
fn normalize_extensions<I, S>(raw: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .map(|ext| {
            let ext = ext.as_ref().trim();
            ext.strip_prefix('.').unwrap_or(ext).to_ascii_lowercase()
        })
        .filter(|ext| !ext.is_empty())
        .collect()
}

/// How a source participates in a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    #[default]
    Both,
    ArchivesOnly,
    FoldersOnly,
}

/// A configured source directory under `data_root`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    pub id: String,
    pub name: String,
    /// Relative to `data_root`; must never contain `..` components.
    pub path: PathBuf,
    pub enabled: bool,
    pub scan_mode: ScanMode,
}

impl Source {
    /// Reject paths that escape `data_root` via `..` components.
    pub fn validate(&self) -> Result<()> {
        if self
            .path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(GlError::InvalidConfig {
                details: format!(
                    "source {:?} has path {:?} containing '..' components",
                    self.id, self.path
                ),
            });
        }
        Ok(())
    }
}

/// A source-root-relative path; any descendant is skipped during planning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Exclusion(pub PathBuf);

impl Exclusion {
    /// Whether `candidate` equals this exclusion or descends from it.
    #[must_use]
    pub fn matches(&self, candidate: &Path) -> bool {
        candidate == self.0 || candidate.starts_with(&self.0)
    }
}

impl EngineConfig {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        RootsConfig::default().config_root.join("config.toml")
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Resolution order for config file path:
    /// 1. Explicit `path` argument (from `--config` CLI flag)
    /// 2. `GL_CONFIG` environment variable
    /// 3. Default path (`{config_root}/config.toml`)
    ///
    /// Missing config file is not an error when loading from the default path;
    /// defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_config = if path.is_none() {
            env::var_os("GL_CONFIG").map(PathBuf::from)
        } else {
            None
        };

        let path_buf = path.map_or_else(
            || env_config.clone().unwrap_or_else(Self::default_path),
            Path::to_path_buf,
        );
        let is_explicit_path = path.is_some() || env_config.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| GlError::Io {
                path: path_buf.clone(),
                source,
            })?;
            toml::from_str(&raw)?
        } else if is_explicit_path {
            return Err(GlError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.roots.config_root = path_buf
            .parent()
            .map_or_else(|| cfg.roots.config_root.clone(), Path::to_path_buf);
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    #[allow(clippy::too_many_lines)]
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(raw) = env_var("GL_DATA_ROOT") {
            self.roots.data_root = PathBuf::from(raw);
        }
        if let Some(raw) = env_var("GL_OUTPUT_ROOT") {
            self.roots.output_root = PathBuf::from(raw);
        }
        if let Some(raw) = env_var("GL_DUPLICATES_ROOT") {
            self.roots.duplicates_root = PathBuf::from(raw);
        }
        if let Some(raw) = env_var("GL_TMP_ROOT") {
            self.roots.tmp_root = PathBuf::from(raw);
        }
        if let Some(raw) = env_var("GL_TEMP_DIR") {
            self.roots.temp_dir = Some(PathBuf::from(raw));
        }

        set_env_bool("GL_SETTINGS_ZIP_GALLERIES", &mut self.settings.zip_galleries)?;
        set_env_bool(
            "GL_SETTINGS_UPDATE_GALLERY_ZIPS",
            &mut self.settings.update_gallery_zips,
        )?;
        set_env_bool(
            "GL_SETTINGS_REPLICATE_NESTING",
            &mut self.settings.replicate_nesting,
        )?;
        set_env_bool("GL_SETTINGS_LEAF_ONLY", &mut self.settings.leaf_only)?;
        set_env_bool(
            "GL_SETTINGS_CONSIDER_IMAGES_IN_SUBFOLDERS",
            &mut self.settings.consider_images_in_subfolders,
        )?;
        if let Some(raw) = env_var("GL_SETTINGS_OUTPUT_MODE") {
            self.settings.output_mode = raw.parse().map_err(|details| GlError::ConfigParse {
                context: "env",
                details: format!("GL_SETTINGS_OUTPUT_MODE={raw:?}: {details}"),
            })?;
        }
        set_env_bool("GL_SETTINGS_COPY_SIDECARS", &mut self.settings.copy_sidecars)?;
        set_env_bool(
            "GL_SETTINGS_LANRARAGI_FLATTEN",
            &mut self.settings.lanraragi_flatten,
        )?;
        set_env_bool(
            "GL_SETTINGS_DUPLICATES_ENABLED",
            &mut self.settings.duplicates_enabled,
        )?;
        set_env_usize(
            "GL_SETTINGS_MIN_IMAGES_TO_BE_GALLERY",
            &mut self.settings.min_images_to_be_gallery,
        )?;
        set_env_bool(
            "GL_SETTINGS_AUTO_SCAN_ENABLED",
            &mut self.settings.auto_scan_enabled,
        )?;
        set_env_u64(
            "GL_SETTINGS_AUTO_SCAN_INTERVAL_MINUTES",
            &mut self.settings.auto_scan_interval_minutes,
        )?;

        Ok(())
    }

    #[allow(clippy::too_many_lines)]
    fn validate(&self) -> Result<()> {
        if self.settings.min_images_to_be_gallery == 0 {
            return Err(GlError::InvalidConfig {
                details: "settings.min_images_to_be_gallery must be >= 1".to_string(),
            });
        }
        if self.settings.auto_scan_interval_minutes == 0 {
            return Err(GlError::InvalidConfig {
                details: "settings.auto_scan_interval_minutes must be >= 1".to_string(),
            });
        }
        if self.settings.image_extensions.is_empty() {
            return Err(GlError::InvalidConfig {
                details: "settings.image_extensions must not be empty".to_string(),
            });
        }

        for source in &self.sources {
            source.validate()?;
        }

        let mut seen_ids = BTreeSet::new();
        for source in &self.sources {
            if !seen_ids.insert(source.id.clone()) {
                return Err(GlError::InvalidConfig {
                    details: format!("duplicate source id {:?}", source.id),
                });
            }
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_env_bool(name: &str, slot: &mut bool) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<bool>().map_err(|error| GlError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_u64(name: &str, slot: &mut u64) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<u64>().map_err(|error| GlError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_usize(name: &str, slot: &mut usize) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw
            .parse::<usize>()
            .map_err(|error| GlError::ConfigParse {
                context: "env",
                details: format!("{name}={raw:?}: {error}"),
            })?;
    }
    Ok(())
}
