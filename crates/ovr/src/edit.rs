use std::io::Write;

use anyhow::{Context, Result};
use ovr_core::Manifest;
use ovr_analysis::{NewEntry, add_entry, refresh_entry, remove_entry};

use crate::cli::{AddArgs, RefreshArgs, RemoveArgs};
use crate::session::OverrideWorkspace;

pub fn run_refresh(args: &RefreshArgs, out: &mut dyn Write) -> Result<i32> {
    let workspace = OverrideWorkspace::open(&args.override_dir)?;
    let upstream = workspace.upstream(&args.upstream)?;
    let mut manifest = workspace.read_manifest()?;

    let refreshed = refresh_entry(&mut manifest, &args.file, &upstream)
        .with_context(|| format!("failed to refresh {}", args.file))?;
    workspace.write_manifest(&manifest)?;

    writeln!(
        out,
        "Refreshed {} against {} at {}",
        refreshed.file, refreshed.base_file, refreshed.base_version
    )?;
    Ok(0)
}

pub fn run_add(args: &AddArgs, out: &mut dyn Write) -> Result<i32> {
    let workspace = OverrideWorkspace::open(&args.override_dir)?;
    let upstream = workspace.upstream(&args.upstream)?;
    let manifest_path = workspace.manifest_path();
    let mut manifest = if manifest_path.exists() {
        workspace.read_manifest()?
    } else {
        Manifest::new()
    };

    let request = NewEntry {
        override_type: args.override_type,
        file: args.file.clone(),
        base_file: args.base_file.clone(),
        issue: args.issue,
    };
    let added = add_entry(
        &mut manifest,
        &request,
        &workspace.override_repo(),
        &upstream,
    )
    .with_context(|| format!("failed to add {}", args.file))?;
    workspace.write_manifest(&manifest)?;

    writeln!(
        out,
        "Added {} as {} (base: {}, issue: {})",
        added.file, added.override_type, added.base_file, added.issue
    )?;
    Ok(0)
}

pub fn run_remove(args: &RemoveArgs, out: &mut dyn Write) -> Result<i32> {
    let workspace = OverrideWorkspace::open(&args.override_dir)?;
    let mut manifest = workspace.read_manifest()?;

    let removed = remove_entry(&mut manifest, &args.file)
        .with_context(|| format!("failed to remove {}", args.file))?;
    workspace.write_manifest(&manifest)?;
    tracing::info!(file = %removed.file, "removed override from manifest");

    writeln!(out, "Removed {} from the manifest", removed.file)?;
    Ok(0)
}
