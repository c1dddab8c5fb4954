use std::io::Write;

use anyhow::{Context, Result};
use ovr_analysis::{GeneratorOptions, ManifestGenerator};
use ovr_config::ClassifyConfig;
use ovr_core::{Manifest, OverrideType, UpstreamRepository};

use crate::cli::GenerateArgs;
use crate::session::OverrideWorkspace;

pub fn run_generate(args: &GenerateArgs, out: &mut dyn Write) -> Result<i32> {
    let workspace = OverrideWorkspace::open(&args.override_dir)?;
    let upstream = workspace.upstream(&args.upstream)?;

    let options = generator_options(&workspace.config().classify, args.concurrency);
    let manifest = ManifestGenerator::new(options)
        .generate(&workspace.override_repo(), &upstream)
        .context("failed to generate override manifest")?;
    workspace.write_manifest(&manifest)?;

    write_generate_summary(&manifest, upstream.version(), out)
        .context("failed to write generate summary")?;
    Ok(0)
}

/// `--concurrency` overrides `[classify].concurrency`; `0` means one worker
/// per available core either way.
pub fn generator_options(classify: &ClassifyConfig, concurrency: Option<usize>) -> GeneratorOptions {
    let mut classify = classify.clone();
    if let Some(concurrency) = concurrency {
        classify.concurrency = concurrency;
    }
    GeneratorOptions::from_config(&classify)
}

pub fn write_generate_summary(
    manifest: &Manifest,
    version: &str,
    out: &mut dyn Write,
) -> std::io::Result<()> {
    let kinds = [
        OverrideType::Copy,
        OverrideType::Patch,
        OverrideType::Derived,
        OverrideType::Unknown,
    ];
    let counts = kinds.map(|kind| {
        let count = manifest
            .entries()
            .iter()
            .filter(|entry| entry.override_type == kind)
            .count();
        (kind, count)
    });

    writeln!(
        out,
        "Classified {} overrides against upstream {version}",
        manifest.len()
    )?;
    for (kind, count) in counts {
        writeln!(out, "  {:<8}{count}", kind.as_str())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use ovr_core::{OverrideEntry, content_hash};

    use super::*;

    #[test]
    fn concurrency_flag_overrides_config() {
        let classify = ClassifyConfig {
            concurrency: 2,
            ..ClassifyConfig::default()
        };

        assert_eq!(generator_options(&classify, None).concurrency, 2);
        assert_eq!(generator_options(&classify, Some(5)).concurrency, 5);
    }

    #[test]
    fn zero_concurrency_uses_available_parallelism() {
        let cores = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1);
        let classify = ClassifyConfig {
            concurrency: 7,
            ..ClassifyConfig::default()
        };

        assert_eq!(generator_options(&classify, Some(0)).concurrency, cores);
    }

    #[test]
    fn summary_counts_every_type() {
        let manifest = Manifest::from_entries(vec![
            OverrideEntry::copy("a.js", "0.62.0", content_hash("a")),
            OverrideEntry::patch("b.windows.js", "b.js", "0.62.0", content_hash("b")),
            OverrideEntry::unknown("c.windows.js", "0.62.0"),
            OverrideEntry::unknown("d.windows.js", "0.62.0"),
        ])
        .expect("manifest");

        let mut out = Vec::new();
        write_generate_summary(&manifest, "0.62.0", &mut out).expect("write summary");
        let rendered = String::from_utf8(out).expect("utf8 output");
        let lines = rendered.lines().collect::<Vec<_>>();

        assert_eq!(lines[0], "Classified 4 overrides against upstream 0.62.0");
        assert!(lines.contains(&"  copy    1"));
        assert!(lines.contains(&"  patch   1"));
        assert!(lines.contains(&"  derived 0"));
        assert!(lines.contains(&"  ???     2"));
    }
}
