use std::sync::atomic::{AtomicBool, Ordering};

use ovr_config::ClassifyConfig;
use ovr_core::{
    DEFAULT_SIMILARITY_THRESHOLD, Manifest, OverrideEntry, OverrideRepository, RepoError,
    UpstreamRepository, compute_similarity_with_threshold, content_hash, is_exact_copy,
};
use serde::{Deserialize, Serialize};

use crate::AnalysisError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorOptions {
    /// Filename segments that mark a platform-specific fork, e.g. `windows`
    /// in `Text.windows.js`. Only the first match is stripped.
    pub platform_suffixes: Vec<String>,
    /// Sibling platforms an override may have been derived from, in
    /// tie-break order.
    pub derivation_suffixes: Vec<String>,
    pub similarity_threshold: f64,
    /// Worker threads. `1` classifies inline on the calling thread.
    pub concurrency: usize,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        let classify = ClassifyConfig::default();
        Self {
            platform_suffixes: classify.platform_suffixes,
            derivation_suffixes: classify.derivation_suffixes,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            concurrency: 1,
        }
    }
}

impl GeneratorOptions {
    pub fn from_config(config: &ClassifyConfig) -> Self {
        Self {
            platform_suffixes: config.platform_suffixes.clone(),
            derivation_suffixes: config.derivation_suffixes.clone(),
            similarity_threshold: config.similarity_threshold,
            concurrency: config.effective_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ManifestGenerator {
    options: GeneratorOptions,
}

impl ManifestGenerator {
    pub fn new(options: GeneratorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &GeneratorOptions {
        &self.options
    }

    /// Classify every override file against one upstream snapshot.
    ///
    /// Ambiguous files become `???` entries. Fatal repository errors abort
    /// the run, so a returned manifest always covers every listed file.
    pub fn generate<O, U>(&self, overrides: &O, upstream: &U) -> Result<Manifest, AnalysisError>
    where
        O: OverrideRepository + ?Sized,
        U: UpstreamRepository + ?Sized,
    {
        let files = overrides.list_files()?;
        let workers = self.options.concurrency.clamp(1, files.len().max(1));
        tracing::info!(
            files = files.len(),
            workers,
            version = upstream.version(),
            "generating override manifest"
        );

        let mut entries = if workers == 1 {
            let failed = AtomicBool::new(false);
            self.classify_batch(&files, overrides, upstream, &failed)?
        } else {
            self.classify_parallel(&files, workers, overrides, upstream)?
        };

        entries.sort_by(|left, right| left.file.cmp(&right.file));
        let manifest = Manifest::from_entries(entries)?;
        Ok(manifest)
    }

    fn classify_parallel<O, U>(
        &self,
        files: &[String],
        workers: usize,
        overrides: &O,
        upstream: &U,
    ) -> Result<Vec<OverrideEntry>, AnalysisError>
    where
        O: OverrideRepository + ?Sized,
        U: UpstreamRepository + ?Sized,
    {
        let chunk_size = files.len().div_ceil(workers);
        let failed = AtomicBool::new(false);

        std::thread::scope(|scope| {
            let handles = files
                .chunks(chunk_size)
                .map(|chunk| {
                    let failed = &failed;
                    scope.spawn(move || self.classify_batch(chunk, overrides, upstream, failed))
                })
                .collect::<Vec<_>>();

            let mut entries = Vec::with_capacity(files.len());
            let mut first_error = None;
            for handle in handles {
                let outcome = handle.join().map_err(|_| {
                    AnalysisError::Message("classification thread panicked".to_owned())
                })?;
                match outcome {
                    Ok(batch) => entries.extend(batch),
                    Err(err) => {
                        first_error.get_or_insert(err);
                    }
                }
            }

            match first_error {
                Some(err) => Err(err),
                None => Ok(entries),
            }
        })
    }

    fn classify_batch<O, U>(
        &self,
        files: &[String],
        overrides: &O,
        upstream: &U,
        failed: &AtomicBool,
    ) -> Result<Vec<OverrideEntry>, AnalysisError>
    where
        O: OverrideRepository + ?Sized,
        U: UpstreamRepository + ?Sized,
    {
        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            if failed.load(Ordering::Relaxed) {
                break;
            }

            let content = match overrides.read_file(file) {
                Ok(content) => content,
                Err(source) => {
                    failed.store(true, Ordering::Relaxed);
                    return Err(AnalysisError::OverrideRead {
                        file: file.clone(),
                        source,
                    });
                }
            };

            match self.classify_file(file, &content, upstream) {
                Ok(entry) => entries.push(entry),
                Err(err) if !err.is_fatal() => {
                    tracing::warn!(file = %file, error = %err, "could not classify override");
                    entries.push(OverrideEntry::unknown(file, upstream.version()));
                }
                Err(err) => {
                    failed.store(true, Ordering::Relaxed);
                    return Err(err.into());
                }
            }
        }
        Ok(entries)
    }

    /// Classify one override given its content. Strategies run in priority
    /// order and the first one that finds an upstream file decides the
    /// outcome. Errors here come from upstream lookups only.
    pub fn classify_file<U>(
        &self,
        file: &str,
        content: &str,
        upstream: &U,
    ) -> Result<OverrideEntry, RepoError>
    where
        U: UpstreamRepository + ?Sized,
    {
        let version = upstream.version();

        let same_path = upstream.read_file(file)?;
        if let Some(base) = same_path.as_deref()
            && is_exact_copy(content, base)
        {
            tracing::debug!(file, "exact copy of upstream");
            return Ok(OverrideEntry::copy(file, version, content_hash(base)));
        }

        let base_file = strip_platform_suffix(file, &self.options.platform_suffixes);
        let base = if base_file == file {
            same_path
        } else {
            upstream.read_file(&base_file)?
        };
        if let Some(base) = base {
            let similarity =
                compute_similarity_with_threshold(content, &base, self.options.similarity_threshold);
            if similarity.similar {
                tracing::debug!(file, base_file = %base_file, ratio = similarity.ratio, "patch of upstream");
                return Ok(OverrideEntry::patch(
                    file,
                    &base_file,
                    version,
                    content_hash(&base),
                ));
            }

            tracing::debug!(file, base_file = %base_file, ratio = similarity.ratio, "same-name base is too different");
            return Ok(OverrideEntry::unknown(file, version));
        }

        let mut best: Option<(String, String, usize)> = None;
        for candidate in derivation_candidates(
            file,
            &self.options.platform_suffixes,
            &self.options.derivation_suffixes,
        ) {
            let Some(base) = upstream.read_file(&candidate)? else {
                continue;
            };

            let similarity =
                compute_similarity_with_threshold(content, &base, self.options.similarity_threshold);
            let improves = best
                .as_ref()
                .is_none_or(|(_, _, distance)| similarity.edit_distance < *distance);
            if similarity.similar && improves {
                best = Some((candidate, content_hash(&base), similarity.edit_distance));
            }
        }

        if let Some((base_file, base_hash, distance)) = best {
            tracing::debug!(file, base_file = %base_file, distance, "derived from another platform");
            return Ok(OverrideEntry::derived(file, &base_file, version, base_hash));
        }

        Ok(OverrideEntry::unknown(file, version))
    }
}

/// Remove the first platform segment from the filename:
/// `a/b.windows.js` becomes `a/b.js`. Names without one come back unchanged.
pub fn strip_platform_suffix(file: &str, platform_suffixes: &[String]) -> String {
    let (dir, name) = split_file_name(file);
    let mut segments = name.split('.').collect::<Vec<_>>();
    if let Some(index) = platform_segment(&segments, platform_suffixes) {
        segments.remove(index);
    }
    format!("{dir}{}", segments.join("."))
}

/// Same file for each sibling platform, in configured order. The platform
/// segment is swapped when present, otherwise the suffix goes in front of
/// the extension.
pub fn derivation_candidates(
    file: &str,
    platform_suffixes: &[String],
    derivation_suffixes: &[String],
) -> Vec<String> {
    let (dir, name) = split_file_name(file);
    let segments = name.split('.').collect::<Vec<_>>();
    let slot = platform_segment(&segments, platform_suffixes);

    derivation_suffixes
        .iter()
        .map(|suffix| {
            let mut candidate = segments.clone();
            match slot {
                Some(index) => candidate[index] = suffix.as_str(),
                None if candidate.len() > 1 => candidate.insert(candidate.len() - 1, suffix),
                None => candidate.push(suffix),
            }
            format!("{dir}{}", candidate.join("."))
        })
        .filter(|candidate| candidate != file)
        .collect()
}

// Directory part keeps its trailing slash.
fn split_file_name(file: &str) -> (&str, &str) {
    match file.rfind('/') {
        Some(index) => file.split_at(index + 1),
        None => ("", file),
    }
}

// The stem itself never counts as a platform marker.
fn platform_segment(segments: &[&str], platform_suffixes: &[String]) -> Option<usize> {
    segments
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, segment)| platform_suffixes.iter().any(|suffix| suffix == *segment))
        .map(|(index, _)| index)
}
