use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use ovr_core::{DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_TAG_PREFIX, MANIFEST_FILE_NAME};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const OVR_DIR_NAME: &str = ".ovr";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const UPSTREAM_REPO_ENV: &str = "OVR_UPSTREAM_REPO";
pub const DEFAULT_PACKAGE_JSON: &str = "node_modules/react-native/package.json";
pub const DEFAULT_PLATFORM_SUFFIXES: [&str; 3] = ["windows", "win32", "windesktop"];
pub const DEFAULT_DERIVATION_SUFFIXES: [&str; 2] = ["android", "ios"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OvrConfig {
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub classify: ClassifyConfig,
    #[serde(default)]
    pub manifest: ManifestConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Git checkout of the upstream project. Relative paths are resolved
    /// against the override directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_path: Option<String>,
    #[serde(default = "default_tag_prefix")]
    pub tag_prefix: String,
    /// Pinned upstream version; wins over `package_json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default = "default_package_json")]
    pub package_json: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            repo_path: None,
            tag_prefix: default_tag_prefix(),
            version: None,
            package_json: default_package_json(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifyConfig {
    #[serde(default = "default_platform_suffixes")]
    pub platform_suffixes: Vec<String>,
    #[serde(default = "default_derivation_suffixes")]
    pub derivation_suffixes: Vec<String>,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Worker threads for classification. `0` means one per available core.
    #[serde(default)]
    pub concurrency: usize,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            platform_suffixes: default_platform_suffixes(),
            derivation_suffixes: default_derivation_suffixes(),
            similarity_threshold: default_similarity_threshold(),
            concurrency: 0,
        }
    }
}

impl ClassifyConfig {
    pub fn effective_concurrency(&self) -> usize {
        if self.concurrency > 0 {
            return self.concurrency;
        }

        std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestConfig {
    #[serde(default = "default_manifest_file_name")]
    pub file_name: String,
    /// Extra relative files or directories that are never overrides.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            file_name: default_manifest_file_name(),
            exclude: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigWarning {
    pub code: &'static str,
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSource {
    Cli,
    Config,
    PackageJson,
}

impl VersionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Config => "config",
            Self::PackageJson => "package_json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    pub version: String,
    pub source: VersionSource,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to parse {path}: {source}")]
    PackageJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(
        "could not determine the upstream version: pass --version, set [upstream].version, or install a package with a version at {searched}"
    )]
    VersionNotFound { searched: String },
    #[error(
        "no upstream repository configured: pass --upstream-repo, set OVR_UPSTREAM_REPO, or set [upstream].repo_path"
    )]
    UpstreamNotConfigured,
}

#[derive(Debug, Deserialize)]
struct PackageManifest {
    #[serde(default)]
    version: Option<String>,
}

pub fn ovr_dir(override_root: impl AsRef<Path>) -> PathBuf {
    override_root.as_ref().join(OVR_DIR_NAME)
}

pub fn config_path(override_root: impl AsRef<Path>) -> PathBuf {
    ovr_dir(override_root).join(CONFIG_FILE_NAME)
}

pub fn load_override_config(override_root: impl AsRef<Path>) -> Result<OvrConfig, ConfigError> {
    load_override_config_with_warnings(override_root).map(|(config, _)| config)
}

/// Normalized config plus the warnings for what the file asked for, from a
/// single read of the file.
pub fn load_override_config_with_warnings(
    override_root: impl AsRef<Path>,
) -> Result<(OvrConfig, Vec<ConfigWarning>), ConfigError> {
    let path = config_path(override_root);
    if !path.exists() {
        return Ok((OvrConfig::default(), Vec::new()));
    }

    let raw = fs::read_to_string(path)?;
    let parsed: OvrConfig = toml::from_str(&raw)?;
    let warnings = config_warnings(&parsed);
    Ok((normalize_config(parsed), warnings))
}

/// Non-fatal problems with a loaded config. Offending values have already
/// been replaced by defaults during normalization; this reports what the
/// file asked for so the user can fix it.
pub fn validate_config(override_root: impl AsRef<Path>) -> Result<Vec<ConfigWarning>, ConfigError> {
    load_override_config_with_warnings(override_root).map(|(_, warnings)| warnings)
}

pub fn config_warnings(config: &OvrConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();

    let threshold = config.classify.similarity_threshold;
    if !is_valid_threshold(threshold) {
        warnings.push(ConfigWarning {
            code: "similarity_threshold_out_of_range",
            field: "classify.similarity_threshold",
            message: format!(
                "similarity_threshold {threshold} is outside (0, 1]; using {DEFAULT_SIMILARITY_THRESHOLD}"
            ),
        });
    }

    if normalize_suffixes(&config.classify.platform_suffixes).is_empty() {
        warnings.push(ConfigWarning {
            code: "platform_suffixes_empty",
            field: "classify.platform_suffixes",
            message: format!(
                "no platform suffixes configured; using {}",
                DEFAULT_PLATFORM_SUFFIXES.join(", ")
            ),
        });
    }

    if config.manifest.file_name.trim().is_empty() {
        warnings.push(ConfigWarning {
            code: "manifest_file_name_empty",
            field: "manifest.file_name",
            message: format!("manifest file name is empty; using {MANIFEST_FILE_NAME}"),
        });
    }

    if config.upstream.tag_prefix.chars().any(char::is_whitespace) {
        warnings.push(ConfigWarning {
            code: "tag_prefix_whitespace",
            field: "upstream.tag_prefix",
            message: "tag_prefix contains whitespace, which git refs cannot hold".to_owned(),
        });
    }

    warnings
}

/// Upstream version precedence: explicit flag, config pin, then the
/// `version` of the nearest matching package.json above the override root.
pub fn resolve_upstream_version(
    override_root: &Path,
    cli_version: Option<&str>,
    config: &OvrConfig,
) -> Result<ResolvedVersion, ConfigError> {
    if let Some(version) = normalize_optional(cli_version.map(str::to_owned)) {
        return Ok(ResolvedVersion {
            version,
            source: VersionSource::Cli,
        });
    }

    if let Some(version) = config.upstream.version.clone() {
        return Ok(ResolvedVersion {
            version,
            source: VersionSource::Config,
        });
    }

    let relative = Path::new(&config.upstream.package_json);
    let start = override_root
        .canonicalize()
        .unwrap_or_else(|_| override_root.to_path_buf());
    for ancestor in start.ancestors() {
        let candidate = ancestor.join(relative);
        if !candidate.is_file() {
            continue;
        }

        let raw = fs::read_to_string(&candidate)?;
        let parsed: PackageManifest =
            serde_json::from_str(&raw).map_err(|source| ConfigError::PackageJson {
                path: candidate.clone(),
                source,
            })?;
        if let Some(version) = normalize_optional(parsed.version) {
            tracing::debug!(path = %candidate.display(), %version, "read upstream version from package.json");
            return Ok(ResolvedVersion {
                version,
                source: VersionSource::PackageJson,
            });
        }
    }

    Err(ConfigError::VersionNotFound {
        searched: config.upstream.package_json.clone(),
    })
}

/// Upstream repository precedence: explicit flag, `OVR_UPSTREAM_REPO`, then
/// `[upstream].repo_path`.
pub fn resolve_upstream_repo(
    override_root: &Path,
    cli_repo: Option<&Path>,
    config: &OvrConfig,
) -> Result<PathBuf, ConfigError> {
    let from_env = std::env::var(UPSTREAM_REPO_ENV).ok();
    resolve_upstream_repo_from(override_root, cli_repo, from_env, config)
}

pub fn resolve_upstream_repo_from(
    override_root: &Path,
    cli_repo: Option<&Path>,
    env_value: Option<String>,
    config: &OvrConfig,
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = cli_repo {
        return Ok(path.to_path_buf());
    }

    if let Some(value) = normalize_optional(env_value) {
        return Ok(PathBuf::from(value));
    }

    match config.upstream.repo_path.as_deref() {
        Some(path) if Path::new(path).is_absolute() => Ok(PathBuf::from(path)),
        Some(path) => Ok(override_root.join(path)),
        None => Err(ConfigError::UpstreamNotConfigured),
    }
}

fn default_tag_prefix() -> String {
    DEFAULT_TAG_PREFIX.to_owned()
}

fn default_package_json() -> String {
    DEFAULT_PACKAGE_JSON.to_owned()
}

fn default_platform_suffixes() -> Vec<String> {
    DEFAULT_PLATFORM_SUFFIXES
        .iter()
        .map(|suffix| (*suffix).to_owned())
        .collect()
}

fn default_derivation_suffixes() -> Vec<String> {
    DEFAULT_DERIVATION_SUFFIXES
        .iter()
        .map(|suffix| (*suffix).to_owned())
        .collect()
}

fn default_similarity_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

fn default_manifest_file_name() -> String {
    MANIFEST_FILE_NAME.to_owned()
}

fn is_valid_threshold(value: f64) -> bool {
    value.is_finite() && value > 0.0 && value <= 1.0
}

fn normalize_optional(input: Option<String>) -> Option<String> {
    input
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn normalize_suffixes(input: &[String]) -> Vec<String> {
    let mut suffixes = Vec::with_capacity(input.len());
    for suffix in input {
        let suffix = suffix.trim().trim_start_matches('.').to_owned();
        if !suffix.is_empty() && !suffixes.contains(&suffix) {
            suffixes.push(suffix);
        }
    }
    suffixes
}

fn normalize_config(mut config: OvrConfig) -> OvrConfig {
    config.upstream.repo_path = normalize_optional(config.upstream.repo_path.take());
    config.upstream.version = normalize_optional(config.upstream.version.take());
    config.upstream.tag_prefix = config.upstream.tag_prefix.trim().to_owned();

    let package_json = config.upstream.package_json.trim();
    if package_json.is_empty() {
        config.upstream.package_json = default_package_json();
    } else {
        config.upstream.package_json = package_json.to_owned();
    }

    config.classify.platform_suffixes = normalize_suffixes(&config.classify.platform_suffixes);
    if config.classify.platform_suffixes.is_empty() {
        config.classify.platform_suffixes = default_platform_suffixes();
    }
    config.classify.derivation_suffixes =
        normalize_suffixes(&config.classify.derivation_suffixes);
    if !is_valid_threshold(config.classify.similarity_threshold) {
        config.classify.similarity_threshold = default_similarity_threshold();
    }

    let file_name = config.manifest.file_name.trim();
    if file_name.is_empty() {
        config.manifest.file_name = default_manifest_file_name();
    } else {
        config.manifest.file_name = file_name.to_owned();
    }
    config.manifest.exclude = config
        .manifest
        .exclude
        .iter()
        .map(|path| path.trim().replace('\\', "/"))
        .filter(|path| !path.is_empty())
        .collect();

    config
}
