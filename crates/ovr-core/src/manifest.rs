use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ManifestError;
use crate::normalize_path;

pub const MANIFEST_FILE_NAME: &str = "overrides.json";

/// Placeholder for a base file or hash that could not be resolved.
pub const UNKNOWN_SENTINEL: &str = "???";

const LEGACY_FIXME: &str = "LEGACY_FIXME";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
pub enum OverrideType {
    #[serde(rename = "copy")]
    Copy,
    #[serde(rename = "patch")]
    Patch,
    #[serde(rename = "derived")]
    Derived,
    #[serde(rename = "???", alias = "unknown")]
    Unknown,
}

impl OverrideType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Patch => "patch",
            Self::Derived => "derived",
            Self::Unknown => UNKNOWN_SENTINEL,
        }
    }
}

impl std::str::FromStr for OverrideType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "copy" => Ok(Self::Copy),
            "patch" => Ok(Self::Patch),
            "derived" => Ok(Self::Derived),
            "unknown" | UNKNOWN_SENTINEL => Ok(Self::Unknown),
            other => Err(format!(
                "invalid override type '{other}', expected one of: copy, patch, derived, unknown"
            )),
        }
    }
}

impl fmt::Display for OverrideType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracking reference for an override: a ticket number, `0` for exact
/// copies, or the `LEGACY_FIXME` marker for entries nobody has triaged yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Issue {
    Number(u64),
    NeedsTriage,
}

impl Issue {
    pub const NONE: Issue = Issue::Number(0);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(number) => write!(f, "{number}"),
            Self::NeedsTriage => f.write_str(LEGACY_FIXME),
        }
    }
}

impl std::str::FromStr for Issue {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value == LEGACY_FIXME {
            return Ok(Self::NeedsTriage);
        }
        value
            .parse::<u64>()
            .map(Self::Number)
            .map_err(|_| format!("invalid issue '{value}', expected a number or {LEGACY_FIXME}"))
    }
}

impl Serialize for Issue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Number(number) => serializer.serialize_u64(*number),
            Self::NeedsTriage => serializer.serialize_str(LEGACY_FIXME),
        }
    }
}

impl<'de> Deserialize<'de> for Issue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(number) => Ok(Self::Number(number)),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideEntry {
    #[serde(rename = "type")]
    pub override_type: OverrideType,
    pub file: String,
    pub base_file: String,
    pub base_version: String,
    pub base_hash: String,
    pub issue: Issue,
}

impl OverrideEntry {
    pub fn copy(file: &str, base_version: &str, base_hash: String) -> Self {
        let file = normalize_path(file);
        Self {
            override_type: OverrideType::Copy,
            base_file: file.clone(),
            file,
            base_version: base_version.to_owned(),
            base_hash,
            issue: Issue::NONE,
        }
    }

    pub fn patch(file: &str, base_file: &str, base_version: &str, base_hash: String) -> Self {
        Self::with_base(OverrideType::Patch, file, base_file, base_version, base_hash)
    }

    pub fn derived(file: &str, base_file: &str, base_version: &str, base_hash: String) -> Self {
        Self::with_base(OverrideType::Derived, file, base_file, base_version, base_hash)
    }

    pub fn unknown(file: &str, base_version: &str) -> Self {
        Self {
            override_type: OverrideType::Unknown,
            file: normalize_path(file),
            base_file: UNKNOWN_SENTINEL.to_owned(),
            base_version: base_version.to_owned(),
            base_hash: UNKNOWN_SENTINEL.to_owned(),
            issue: Issue::NeedsTriage,
        }
    }

    fn with_base(
        override_type: OverrideType,
        file: &str,
        base_file: &str,
        base_version: &str,
        base_hash: String,
    ) -> Self {
        Self {
            override_type,
            file: normalize_path(file),
            base_file: normalize_path(base_file),
            base_version: base_version.to_owned(),
            base_hash,
            issue: Issue::NeedsTriage,
        }
    }

    /// Whether the entry points at a real upstream file.
    pub fn has_base(&self) -> bool {
        self.override_type != OverrideType::Unknown && self.base_file != UNKNOWN_SENTINEL
    }

    pub fn check(&self) -> Result<(), ManifestError> {
        let invalid = |reason: &str| ManifestError::InvalidEntry {
            file: self.file.clone(),
            reason: reason.to_owned(),
        };

        if self.file.trim().is_empty() {
            return Err(invalid("file must not be empty"));
        }

        match self.override_type {
            OverrideType::Copy => {
                if self.base_file != self.file {
                    return Err(invalid("copy overrides must use the override path as baseFile"));
                }
                if !self.issue.is_none() {
                    return Err(invalid("copy overrides must use issue 0"));
                }
            }
            OverrideType::Patch | OverrideType::Derived => {
                if self.issue.is_none() {
                    return Err(invalid(
                        "patch and derived overrides need an issue number or LEGACY_FIXME",
                    ));
                }
                if self.base_file == UNKNOWN_SENTINEL || self.base_file.trim().is_empty() {
                    return Err(invalid("patch and derived overrides need a baseFile"));
                }
            }
            OverrideType::Unknown => {
                if self.base_file != UNKNOWN_SENTINEL || self.base_hash != UNKNOWN_SENTINEL {
                    return Err(invalid("unclassified overrides must not name a base"));
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Manifest {
    overrides: Vec<OverrideEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(mut entries: Vec<OverrideEntry>) -> Result<Self, ManifestError> {
        for entry in &mut entries {
            entry.file = normalize_path(&entry.file);
            entry.base_file = normalize_path(&entry.base_file);
        }

        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            entry.check()?;
            if !seen.insert(entry.file.as_str()) {
                return Err(ManifestError::DuplicateOverride(entry.file.clone()));
            }
        }

        Ok(Self { overrides: entries })
    }

    pub fn entries(&self) -> &[OverrideEntry] {
        &self.overrides
    }

    pub fn into_entries(self) -> Vec<OverrideEntry> {
        self.overrides
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }

    pub fn has_override(&self, file: &str) -> bool {
        self.find_override(file).is_some()
    }

    pub fn find_override(&self, file: &str) -> Option<&OverrideEntry> {
        let file = normalize_path(file);
        self.overrides.iter().find(|entry| entry.file == file)
    }

    /// Insert an entry, replacing any existing entry for the same file.
    pub fn insert(
        &mut self,
        mut entry: OverrideEntry,
    ) -> Result<Option<OverrideEntry>, ManifestError> {
        entry.file = normalize_path(&entry.file);
        entry.base_file = normalize_path(&entry.base_file);
        entry.check()?;
        match self
            .overrides
            .iter_mut()
            .find(|existing| existing.file == entry.file)
        {
            Some(existing) => Ok(Some(std::mem::replace(existing, entry))),
            None => {
                self.overrides.push(entry);
                Ok(None)
            }
        }
    }

    pub fn remove_override(&mut self, file: &str) -> Option<OverrideEntry> {
        let file = normalize_path(file);
        let index = self.overrides.iter().position(|entry| entry.file == file)?;
        Some(self.overrides.remove(index))
    }

    pub fn sort(&mut self) {
        self.overrides.sort_by(|left, right| left.file.cmp(&right.file));
    }

    pub fn from_json(raw: &str) -> Result<Self, ManifestError> {
        let parsed: Manifest = serde_json::from_str(raw)?;
        Self::from_entries(parsed.overrides)
    }

    pub fn to_json(&self) -> Result<String, ManifestError> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        Ok(text)
    }

    pub fn read_from_file(path: &Path) -> Result<Self, ManifestError> {
        let raw = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Write through a temp file in the same directory and rename it into
    /// place, so readers never observe a half-written manifest.
    pub fn write_to_file(&self, path: &Path) -> Result<(), ManifestError> {
        let text = self.to_json()?;
        let io_err = |source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        temp.write_all(text.as_bytes()).map_err(io_err)?;
        temp.as_file().sync_all().map_err(io_err)?;
        temp.persist(path).map_err(|err| io_err(err.error))?;
        Ok(())
    }
}
