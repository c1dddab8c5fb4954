use std::collections::BTreeMap;
use std::io::Write;

use anyhow::{Context, Result};
use ovr_analysis::{ValidationKind, ValidationReport, validate_manifest};

use crate::cli::{OutputFormat, ValidateArgs};
use crate::session::OverrideWorkspace;

pub fn run_validate(args: &ValidateArgs, out: &mut dyn Write) -> Result<i32> {
    let workspace = OverrideWorkspace::open(&args.override_dir)?;
    let upstream = workspace.upstream(&args.upstream)?;
    let manifest = workspace.read_manifest()?;

    let reports = validate_manifest(&manifest, &workspace.override_repo(), &upstream)
        .context("failed to validate override manifest")?;
    tracing::info!(
        overrides = manifest.len(),
        reports = reports.len(),
        "validated override manifest"
    );

    let written = match args.output {
        OutputFormat::Table => write_validation_table(&reports, out),
        OutputFormat::Json => write_validation_json(&reports, out),
    };
    written.context("failed to write validation report")?;

    let failing = reports.iter().any(|report| !report.kind.is_advisory());
    Ok(i32::from(failing))
}

/// Findings grouped by kind, each group led by its remediation hint.
pub fn write_validation_table(
    reports: &[ValidationReport],
    out: &mut dyn Write,
) -> std::io::Result<()> {
    if reports.is_empty() {
        writeln!(out, "No problems found.")?;
        return Ok(());
    }

    let mut grouped = BTreeMap::<ValidationKind, Vec<&ValidationReport>>::new();
    for report in reports {
        grouped.entry(report.kind).or_default().push(report);
    }

    for (index, (kind, group)) in grouped.iter().enumerate() {
        if index > 0 {
            writeln!(out)?;
        }
        writeln!(out, "[{kind}] {}", kind.hint())?;
        for report in group {
            match report.base_file.as_deref() {
                Some(base_file) => writeln!(out, "  - {} (base: {base_file})", report.file)?,
                None => writeln!(out, "  - {}", report.file)?,
            }
        }
    }
    Ok(())
}

pub fn write_validation_json(
    reports: &[ValidationReport],
    out: &mut dyn Write,
) -> std::io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, reports)?;
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(kind: ValidationKind, file: &str, base_file: Option<&str>) -> ValidationReport {
        ValidationReport {
            kind,
            file: file.to_owned(),
            base_file: base_file.map(str::to_owned),
        }
    }

    #[test]
    fn table_groups_by_kind_with_hints() {
        let reports = vec![
            report(ValidationKind::OutOfDate, "a/b.windows.js", Some("a/b.js")),
            report(ValidationKind::MissingFromManifest, "a/new.windows.js", None),
            report(ValidationKind::OutOfDate, "c/d.windows.js", Some("c/d.js")),
        ];

        let mut out = Vec::new();
        write_validation_table(&reports, &mut out).expect("write table");
        let rendered = String::from_utf8(out).expect("utf8 output");
        let lines = rendered.lines().collect::<Vec<_>>();

        assert!(lines[0].starts_with("[missingFromManifest] "));
        assert_eq!(lines[1], "  - a/new.windows.js");
        assert_eq!(lines[2], "");
        assert!(lines[3].starts_with("[outOfDate] "));
        assert_eq!(lines[4], "  - a/b.windows.js (base: a/b.js)");
        assert_eq!(lines[5], "  - c/d.windows.js (base: c/d.js)");
    }

    #[test]
    fn empty_table_says_so() {
        let mut out = Vec::new();
        write_validation_table(&[], &mut out).expect("write table");
        assert_eq!(String::from_utf8(out).expect("utf8"), "No problems found.\n");
    }

    #[test]
    fn json_uses_camel_case_kinds() {
        let reports = vec![report(ValidationKind::BaseNotFound, "x.win32.js", Some("x.js"))];
        let mut out = Vec::new();
        write_validation_json(&reports, &mut out).expect("write json");

        let parsed: serde_json::Value =
            serde_json::from_slice(&out).expect("valid json output");
        assert_eq!(parsed[0]["kind"], "baseNotFound");
        assert_eq!(parsed[0]["file"], "x.win32.js");
        assert_eq!(parsed[0]["baseFile"], "x.js");
    }
}
