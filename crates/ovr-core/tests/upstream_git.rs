use std::error::Error;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::thread;

use ovr_core::{
    GitUpstreamRepository, RepoError, UpstreamRepository, VersionedUpstreamRepository,
    bind_version,
};
use tempfile::tempdir;

#[test]
fn reads_files_at_tagged_versions() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;

    write_file(workspace, "Libraries/Text/Text.js", "export const v = 1;\n")?;
    commit_all(workspace, "first release")?;
    run_git(workspace, &["tag", "v0.61.5"])?;

    write_file(workspace, "Libraries/Text/Text.js", "export const v = 2;\n")?;
    write_file(workspace, "Libraries/Image/Image.js", "image\n")?;
    commit_all(workspace, "second release")?;
    run_git(workspace, &["tag", "-a", "v0.62.0", "-m", "annotated release"])?;

    let upstream = GitUpstreamRepository::open(workspace)?;

    assert_eq!(
        upstream.read_file_at("Libraries/Text/Text.js", "0.61.5")?,
        Some("export const v = 1;\n".to_owned())
    );
    assert_eq!(
        upstream.read_file_at("Libraries\\Text\\Text.js", "0.62.0")?,
        Some("export const v = 2;\n".to_owned())
    );
    assert_eq!(upstream.read_file_at("Libraries/Image/Image.js", "0.61.5")?, None);
    assert_eq!(
        upstream.read_file_at("Libraries/Image/Image.js", "0.62.0")?,
        Some("image\n".to_owned())
    );
    Ok(())
}

#[test]
fn missing_paths_and_directories_are_absent() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;
    write_file(workspace, "Libraries/Text/Text.js", "text\n")?;
    commit_all(workspace, "initial")?;
    run_git(workspace, &["tag", "v1.0.0"])?;

    let upstream = bind_version(GitUpstreamRepository::open(workspace)?, "1.0.0");
    assert_eq!(upstream.version(), "1.0.0");
    assert_eq!(upstream.read_file("Libraries/Text/Nope.js")?, None);
    assert_eq!(upstream.read_file("Libraries/Text")?, None);
    assert_eq!(upstream.read_file("Nope/Text.js")?, None);
    Ok(())
}

#[test]
fn falls_back_to_unprefixed_revision() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;
    write_file(workspace, "index.js", "bare\n")?;
    commit_all(workspace, "initial")?;
    run_git(workspace, &["tag", "0.60.0"])?;

    let upstream = GitUpstreamRepository::open(workspace)?;
    assert!(upstream.has_version("0.60.0"));
    assert_eq!(
        upstream.read_file_at("index.js", "0.60.0")?,
        Some("bare\n".to_owned())
    );

    let custom = GitUpstreamRepository::open(workspace)?.with_tag_prefix("release-");
    run_git(workspace, &["tag", "release-0.59.0"])?;
    assert_eq!(custom.tag_prefix(), "release-");
    assert_eq!(
        custom.read_file_at("index.js", "0.59.0")?,
        Some("bare\n".to_owned())
    );
    Ok(())
}

#[test]
fn unknown_version_is_fatal() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;
    write_file(workspace, "index.js", "content\n")?;
    commit_all(workspace, "initial")?;

    let upstream = GitUpstreamRepository::open(workspace)?;
    assert!(!upstream.has_version("9.9.9"));
    let err = upstream
        .read_file_at("index.js", "9.9.9")
        .expect_err("version does not exist");
    assert!(matches!(err, RepoError::UnknownVersion { ref version, .. } if version == "9.9.9"));
    assert!(err.is_fatal());
    Ok(())
}

#[test]
fn non_utf8_blob_is_reported_per_file() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;
    fs::write(workspace.join("logo.png"), [0x89, 0x50, 0xff, 0x00])?;
    commit_all(workspace, "binary")?;
    run_git(workspace, &["tag", "v1.0.0"])?;

    let upstream = GitUpstreamRepository::open(workspace)?;
    let err = upstream
        .read_file_at("logo.png", "1.0.0")
        .expect_err("binary blob");
    assert!(matches!(err, RepoError::NotUtf8 { .. }));
    assert!(!err.is_fatal());
    Ok(())
}

#[test]
fn concurrent_reads_share_one_handle() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;
    for index in 0..8 {
        write_file(workspace, &format!("src/file{index}.js"), &format!("file {index}\n"))?;
    }
    commit_all(workspace, "initial")?;
    run_git(workspace, &["tag", "v2.0.0"])?;

    let upstream = bind_version(GitUpstreamRepository::open(workspace)?, "2.0.0");
    let results = thread::scope(|scope| {
        let handles = (0..8)
            .map(|index| {
                let upstream = &upstream;
                scope.spawn(move || upstream.read_file(&format!("src/file{index}.js")))
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("reader thread panicked"))
            .collect::<Vec<_>>()
    });

    for (index, result) in results.into_iter().enumerate() {
        assert_eq!(result?, Some(format!("file {index}\n")));
    }
    Ok(())
}

#[test]
fn non_git_directory_fails_to_open() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let err = match GitUpstreamRepository::open(temp.path()) {
        Ok(_) => return Err("expected open to fail outside a git repository".into()),
        Err(err) => err,
    };
    assert!(matches!(err, RepoError::Git(_)));
    Ok(())
}

fn write_file(workspace: &Path, relative: &str, content: &str) -> Result<(), Box<dyn Error>> {
    let path = workspace.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

fn run_git(workspace: &Path, args: &[&str]) -> Result<String, Box<dyn Error>> {
    let output = Command::new("git")
        .args(args)
        .current_dir(workspace)
        .output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("git {:?} failed: {}", args, stderr.trim()).into());
    }

    Ok(String::from_utf8(output.stdout)?.trim().to_owned())
}

fn init_git_repo(workspace: &Path) -> Result<(), Box<dyn Error>> {
    run_git(workspace, &["init"])?;
    run_git(workspace, &["config", "user.name", "Ovr Test"])?;
    run_git(workspace, &["config", "user.email", "ovr-test@example.com"])?;
    run_git(workspace, &["config", "commit.gpgsign", "false"])?;
    run_git(workspace, &["config", "tag.gpgsign", "false"])?;
    Ok(())
}

fn commit_all(workspace: &Path, message: &str) -> Result<String, Box<dyn Error>> {
    run_git(workspace, &["add", "."])?;
    run_git(workspace, &["commit", "-m", message])?;
    run_git(workspace, &["rev-parse", "--verify", "HEAD"])
}
