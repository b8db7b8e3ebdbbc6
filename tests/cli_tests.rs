use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Get path to the slick binary built by `cargo build`.
fn slick_bin() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("target");
    path.push("debug");
    path.push("slick");
    path
}

/// A package repository in a temp directory for driving the binary.
struct TestRepo {
    dir: tempfile::TempDir,
}

impl TestRepo {
    fn new() -> Self {
        TestRepo {
            dir: tempfile::TempDir::new().unwrap(),
        }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn write_package(&self, name: &str, manifest: &str) {
        let dir = self.dir.path().join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("package.toml"), manifest).unwrap();
    }

    /// Run slick against this repository.
    fn run(&self, args: &[&str]) -> std::process::Output {
        Command::new(slick_bin())
            .arg("--repo")
            .arg(self.dir.path())
            .args(args)
            .output()
            .expect("failed to run slick")
    }

    fn stdout(&self, args: &[&str]) -> String {
        let output = self.run(args);
        String::from_utf8_lossy(&output.stdout).to_string()
    }
}

fn basic_repo() -> TestRepo {
    let repo = TestRepo::new();
    repo.write_package(
        "zlib",
        r#"
[package]
name = "zlib"
description = "A free, general-purpose, legally unencumbered lossless data-compression library"
url = "https://zlib.net/zlib-1.3.1.tar.gz"

[[versions]]
version = "1.3.1"

[[versions]]
version = "1.2.13"

[variants.shared]
default = true
description = "Build shared libraries"
"#,
    );
    repo.write_package(
        "libiconv",
        r#"
[package]
name = "libiconv"

[[provides]]
virtual = "iconv"
"#,
    );
    repo
}

#[test]
fn test_parse_text_output() {
    let repo = basic_repo();
    let out = repo.stdout(&["parse", "zlib@1.2:1.3 +shared %gcc@12"]);
    assert!(out.contains("zlib"));
    assert!(out.contains("1.2:1.3"));
    assert!(out.contains("gcc@12"));
    assert!(out.contains("+shared"));
}

#[test]
fn test_parse_json_output() {
    let repo = basic_repo();
    let out = repo.stdout(&["parse", "zlib@1.3.1", "--format", "json"]);
    let json: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(json["name"], "zlib");
}

#[test]
fn test_parse_rejects_garbage() {
    let repo = basic_repo();
    let output = repo.run(&["parse", "zlib +debug +debug"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("repeated variant"), "stderr: {}", stderr);
}

#[test]
fn test_list_and_info() {
    let repo = basic_repo();
    assert_eq!(repo.stdout(&["list"]).trim(), "libiconv\nzlib");

    let info = repo.stdout(&["info", "zlib"]);
    assert!(info.contains("zlib -- A free, general-purpose"));
    assert!(info.contains("shared"));
}

#[test]
fn test_url_command() {
    let repo = basic_repo();
    let out = repo.stdout(&["url", "zlib", "--version", "1.2.13"]);
    assert_eq!(out.trim(), "https://zlib.net/zlib-1.2.13.tar.gz");
}

#[test]
fn test_providers_command() {
    let repo = basic_repo();
    assert_eq!(repo.stdout(&["providers", "iconv"]).trim(), "libiconv");
}

#[test]
fn test_audit_exit_code() {
    let repo = basic_repo();
    assert!(repo.run(&["audit"]).status.success());

    repo.write_package("bad", "[package]\nname = \"mismatch\"\n");
    let output = repo.run(&["audit"]);
    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("bad"), "stdout: {}", stdout);
}

#[test]
fn test_repo_from_environment() {
    let repo = basic_repo();
    let output = Command::new(slick_bin())
        .env("SLICK_REPO", repo.path())
        .arg("list")
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("zlib"));
}

#[test]
fn test_bootstrap_requires_virtualenv() {
    let output = Command::new(slick_bin())
        .env_remove("VIRTUAL_ENV")
        .arg("bootstrap")
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("virtual environment"),
        "stderr: {}",
        stderr
    );
}

#[test]
fn test_bootstrap_rejects_bogus_prefix() {
    let empty = tempfile::TempDir::new().unwrap();
    let output = Command::new(slick_bin())
        .env("VIRTUAL_ENV", empty.path())
        .arg("bootstrap")
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing"), "stderr: {}", stderr);
}

#[test]
fn test_bootstrap_dry_run_prints_plan() {
    let venv = tempfile::TempDir::new().unwrap();
    fs::create_dir_all(venv.path().join("bin")).unwrap();
    fs::write(venv.path().join("bin/python"), "#!/bin/sh\n").unwrap();

    let output = Command::new(slick_bin())
        .env("VIRTUAL_ENV", venv.path())
        .args(["bootstrap", "--dry-run"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("download"));
    assert!(stdout.contains("install prefix"));
    // Dry run must not touch the network or the environment.
    assert!(stdout.contains("curl"));
}
