use std::collections::BTreeSet;
use std::fmt;

use ovr_core::{
    Issue, Manifest, OverrideEntry, OverrideRepository, OverrideType, UpstreamRepository,
    content_hash, is_exact_copy, normalize_path,
};
use serde::{Deserialize, Serialize};

use crate::AnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DriftKind {
    OutOfDate,
    BaseNotFound,
}

/// An entry whose recorded base no longer matches upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    pub file: String,
    pub base_file: String,
    pub base_version: String,
    pub kind: DriftKind,
    pub stored_hash: String,
    pub current_hash: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationKind {
    MissingFromManifest,
    OverrideNotFound,
    BaseNotFound,
    OutOfDate,
    OverrideDifferentFromBase,
    OverrideSameAsBase,
    Unclassified,
}

impl ValidationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingFromManifest => "missingFromManifest",
            Self::OverrideNotFound => "overrideNotFound",
            Self::BaseNotFound => "baseNotFound",
            Self::OutOfDate => "outOfDate",
            Self::OverrideDifferentFromBase => "overrideDifferentFromBase",
            Self::OverrideSameAsBase => "overrideSameAsBase",
            Self::Unclassified => "unclassified",
        }
    }

    /// Advisory findings are printed but do not fail validation.
    pub fn is_advisory(self) -> bool {
        matches!(self, Self::Unclassified)
    }

    pub fn hint(self) -> &'static str {
        match self {
            Self::MissingFromManifest => {
                "Found override files that aren't listed in the manifest. Rerun `ovr generate` or add them by hand."
            }
            Self::OverrideNotFound => {
                "Found manifest entries without an override file. Run `ovr remove` for each one."
            }
            Self::BaseNotFound => {
                "Found overrides whose base file no longer exists upstream. Re-point or remove them."
            }
            Self::OutOfDate => {
                "Found overrides whose base changed upstream. Merge the upstream changes, then run `ovr refresh`."
            }
            Self::OverrideDifferentFromBase => {
                "Found copy overrides that no longer match upstream. Reclassify them as patches or restore the copy."
            }
            Self::OverrideSameAsBase => {
                "Found patch overrides identical to their base. Reclassify them as copies or delete them."
            }
            Self::Unclassified => {
                "Found overrides with no known base. Fill in baseFile and an issue number."
            }
        }
    }
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<DriftKind> for ValidationKind {
    fn from(kind: DriftKind) -> Self {
        match kind {
            DriftKind::OutOfDate => Self::OutOfDate,
            DriftKind::BaseNotFound => Self::BaseNotFound,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub kind: ValidationKind,
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_file: Option<String>,
}

impl ValidationReport {
    fn new(kind: ValidationKind, file: &str, base_file: Option<&str>) -> Self {
        Self {
            kind,
            file: file.to_owned(),
            base_file: base_file.map(str::to_owned),
        }
    }
}

/// Re-hash every recorded base at the upstream's bound version.
pub fn detect_drift<U>(manifest: &Manifest, upstream: &U) -> Result<Vec<DriftReport>, AnalysisError>
where
    U: UpstreamRepository + ?Sized,
{
    let mut reports = Vec::new();
    for entry in manifest.entries().iter().filter(|entry| entry.has_base()) {
        let current_hash = upstream
            .read_file(&entry.base_file)?
            .map(|content| content_hash(&content));
        let kind = match current_hash.as_deref() {
            None => DriftKind::BaseNotFound,
            Some(hash) if hash != entry.base_hash => DriftKind::OutOfDate,
            Some(_) => continue,
        };

        tracing::debug!(file = %entry.file, base_file = %entry.base_file, ?kind, "override drifted");
        reports.push(DriftReport {
            file: entry.file.clone(),
            base_file: entry.base_file.clone(),
            base_version: entry.base_version.clone(),
            kind,
            stored_hash: entry.base_hash.clone(),
            current_hash,
        });
    }

    reports.sort_by(|left, right| left.file.cmp(&right.file));
    Ok(reports)
}

/// Drift plus consistency between the manifest, the override files, and
/// upstream. Reports come back sorted by file, then kind.
pub fn validate_manifest<O, U>(
    manifest: &Manifest,
    overrides: &O,
    upstream: &U,
) -> Result<Vec<ValidationReport>, AnalysisError>
where
    O: OverrideRepository + ?Sized,
    U: UpstreamRepository + ?Sized,
{
    let mut reports = Vec::new();

    let listed = manifest
        .entries()
        .iter()
        .map(|entry| entry.file.as_str())
        .collect::<BTreeSet<_>>();
    for file in overrides.list_files()? {
        if !listed.contains(file.as_str()) {
            reports.push(ValidationReport::new(
                ValidationKind::MissingFromManifest,
                &file,
                None,
            ));
        }
    }

    let mut missing_overrides = BTreeSet::new();
    for entry in manifest.entries() {
        if !overrides.file_exists(&entry.file)? {
            missing_overrides.insert(entry.file.as_str());
            reports.push(ValidationReport::new(
                ValidationKind::OverrideNotFound,
                &entry.file,
                entry.has_base().then_some(entry.base_file.as_str()),
            ));
        }
    }

    for drift in detect_drift(manifest, upstream)? {
        reports.push(ValidationReport::new(
            drift.kind.into(),
            &drift.file,
            Some(drift.base_file.as_str()),
        ));
    }

    for entry in manifest.entries() {
        if entry.override_type == OverrideType::Unknown {
            reports.push(ValidationReport::new(
                ValidationKind::Unclassified,
                &entry.file,
                None,
            ));
            continue;
        }
        if missing_overrides.contains(entry.file.as_str()) {
            continue;
        }
        if let Some(kind) = content_mismatch(entry, overrides, upstream)? {
            reports.push(ValidationReport::new(
                kind,
                &entry.file,
                Some(entry.base_file.as_str()),
            ));
        }
    }

    reports.sort_by(|left, right| {
        left.file
            .cmp(&right.file)
            .then_with(|| left.kind.cmp(&right.kind))
    });
    Ok(reports)
}

// Copies must still match their base; patches must still differ from it.
fn content_mismatch<O, U>(
    entry: &OverrideEntry,
    overrides: &O,
    upstream: &U,
) -> Result<Option<ValidationKind>, AnalysisError>
where
    O: OverrideRepository + ?Sized,
    U: UpstreamRepository + ?Sized,
{
    if !matches!(entry.override_type, OverrideType::Copy | OverrideType::Patch) {
        return Ok(None);
    }
    let Some(base) = upstream.read_file(&entry.base_file)? else {
        return Ok(None);
    };
    let content = match overrides.read_file(&entry.file) {
        Ok(content) => content,
        Err(err) if !err.is_fatal() => {
            tracing::warn!(file = %entry.file, error = %err, "skipping content check");
            return Ok(None);
        }
        Err(err) => return Err(err.into()),
    };
    let same = is_exact_copy(&content, &base);

    Ok(match entry.override_type {
        OverrideType::Copy if !same => Some(ValidationKind::OverrideDifferentFromBase),
        OverrideType::Patch if same => Some(ValidationKind::OverrideSameAsBase),
        _ => None,
    })
}

/// Re-baseline one entry to the upstream's bound version. Returns the
/// updated entry; the manifest is modified in place.
pub fn refresh_entry<U>(
    manifest: &mut Manifest,
    file: &str,
    upstream: &U,
) -> Result<OverrideEntry, AnalysisError>
where
    U: UpstreamRepository + ?Sized,
{
    let file = normalize_path(file);
    let entry = manifest
        .find_override(&file)
        .ok_or_else(|| AnalysisError::OverrideNotFound(file.clone()))?;
    if !entry.has_base() {
        return Err(AnalysisError::Unclassified(file));
    }

    let base = upstream
        .read_file(&entry.base_file)?
        .ok_or_else(|| AnalysisError::BaseNotFound {
            file: file.clone(),
            base_file: entry.base_file.clone(),
            version: upstream.version().to_owned(),
        })?;

    let mut refreshed = entry.clone();
    refreshed.base_hash = content_hash(&base);
    refreshed.base_version = upstream.version().to_owned();
    manifest.insert(refreshed.clone())?;

    tracing::info!(file = %file, version = upstream.version(), "refreshed override base");
    Ok(refreshed)
}

/// A hand-classified override to record in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub override_type: OverrideType,
    pub file: String,
    /// Defaults to `file` for copies. Required for patches and derived files.
    pub base_file: Option<String>,
    /// Required for patches. Derived files default to `LEGACY_FIXME`.
    pub issue: Option<Issue>,
}

/// Record one override by hand, hashing its base at the upstream's bound
/// version. An existing entry for the same file is replaced.
pub fn add_entry<O, U>(
    manifest: &mut Manifest,
    request: &NewEntry,
    overrides: &O,
    upstream: &U,
) -> Result<OverrideEntry, AnalysisError>
where
    O: OverrideRepository + ?Sized,
    U: UpstreamRepository + ?Sized,
{
    let file = normalize_path(request.file.trim());
    let invalid = |reason: &str| AnalysisError::InvalidEntry {
        file: normalize_path(request.file.trim()),
        reason: reason.to_owned(),
    };
    if file.is_empty() {
        return Err(invalid("override path must not be empty"));
    }
    if !overrides.file_exists(&file)? {
        return Err(AnalysisError::OverrideFileMissing(file));
    }

    let version = upstream.version();
    let base_file = request
        .base_file
        .as_deref()
        .map(|base| normalize_path(base.trim()));

    let mut entry = match request.override_type {
        OverrideType::Unknown => {
            if base_file.is_some() {
                return Err(invalid("unclassified overrides cannot name a base file"));
            }
            OverrideEntry::unknown(&file, version)
        }
        kind => {
            let base_file = match (kind, base_file) {
                (_, Some(base_file)) => base_file,
                (OverrideType::Copy, None) => file.clone(),
                (_, None) => return Err(invalid("patch and derived overrides need a base file")),
            };
            if kind == OverrideType::Patch && request.issue.is_none() {
                return Err(invalid("patch overrides need an issue"));
            }

            let base = upstream.read_file(&base_file)?.ok_or_else(|| {
                AnalysisError::BaseNotFound {
                    file: file.clone(),
                    base_file: base_file.clone(),
                    version: version.to_owned(),
                }
            })?;
            let base_hash = content_hash(&base);
            match kind {
                OverrideType::Copy if base_file != file => {
                    return Err(invalid("copy overrides must use their own path as the base file"));
                }
                OverrideType::Copy => OverrideEntry::copy(&file, version, base_hash),
                OverrideType::Patch => OverrideEntry::patch(&file, &base_file, version, base_hash),
                _ => OverrideEntry::derived(&file, &base_file, version, base_hash),
            }
        }
    };
    if let Some(issue) = request.issue {
        entry.issue = issue;
    }

    if let Some(previous) = manifest.insert(entry.clone())? {
        tracing::warn!(
            file = %entry.file,
            previous_type = %previous.override_type,
            "replacing existing manifest entry"
        );
    }
    manifest.sort();
    tracing::info!(file = %entry.file, kind = %entry.override_type, "added override to manifest");
    Ok(entry)
}

pub fn remove_entry(manifest: &mut Manifest, file: &str) -> Result<OverrideEntry, AnalysisError> {
    manifest
        .remove_override(file)
        .ok_or_else(|| AnalysisError::OverrideNotFound(normalize_path(file)))
}
