//! End-to-end tests for the `depforest` binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn run_git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Test User")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_NAME", "Test User")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .output()
        .expect("failed to run git");
    if !output.status.success() {
        panic!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

/// app -> lib, with output folders and an isolated config home.
struct Workspace {
    dir: TempDir,
    app: String,
    lib: String,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let remote = |name: &str, manifest: Option<String>| -> String {
            let path = dir.path().join("remotes").join(name);
            fs::create_dir_all(&path).unwrap();
            run_git(&path, &["init", "-q"]);
            run_git(&path, &["symbolic-ref", "HEAD", "refs/heads/main"]);
            fs::write(path.join("README.md"), format!("# {name}\n")).unwrap();
            if let Some(body) = manifest {
                fs::create_dir_all(path.join("eng")).unwrap();
                fs::write(path.join("eng/Version.Details.xml"), body).unwrap();
            }
            run_git(&path, &["add", "."]);
            run_git(&path, &["commit", "-q", "-m", "initial"]);
            path.display().to_string()
        };
        let lib = remote("lib", None);
        let app = remote(
            "app",
            Some(format!(
                "<Dependencies><ProductDependencies><Dependency Name=\"Lib\">\
                 <Uri>{lib}</Uri><Sha>main</Sha></Dependency></ProductDependencies></Dependencies>\n"
            )),
        );
        fs::create_dir_all(dir.path().join("home")).unwrap();
        Self { dir, app, lib }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = cargo_bin_cmd!("depforest");
        cmd.env_remove("DEPFOREST_CONFIG")
            .env_remove("RUST_LOG")
            .env("HOME", self.path("home"))
            .env("XDG_CONFIG_HOME", self.path("home"));
        cmd
    }

    fn clone_args(&self, root: &str) -> Vec<String> {
        vec![
            "clone".into(),
            "--repo".into(),
            root.into(),
            "--version".into(),
            "main".into(),
            "--git-dir-folder".into(),
            self.path("gitdirs").display().to_string(),
            "--repos-folder".into(),
            self.path("repos").display().to_string(),
        ]
    }

    fn folders(&self) -> [String; 4] {
        [
            "--repos-folder".into(),
            self.path("repos").display().to_string(),
            "--git-dir-folder".into(),
            self.path("gitdirs").display().to_string(),
        ]
    }
}

fn parse_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("stdout is JSON")
}

#[test]
fn help_lists_commands() {
    cargo_bin_cmd!("depforest")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("clone"))
        .stdout(predicate::str::contains("verify"))
        .stdout(predicate::str::contains("snapshot"));
}

mod clone {
    use super::*;

    #[test]
    fn json_report_lists_trees() {
        let ws = Workspace::new();
        let mut args = ws.clone_args(&ws.app);
        args.push("--json".into());

        let assert = ws.cmd().args(&args).assert().success();

        let report = parse_json(&assert.get_output().stdout);
        assert_eq!(report["trees"].as_array().unwrap().len(), 4);
        assert_eq!(report["failures"].as_array().unwrap().len(), 0);
        assert_eq!(report["root"]["kind"], "versioned");
        assert!(ws.path("repos/lib.main/README.md").is_file());
    }

    #[test]
    fn depth_flag_limits_traversal() {
        let ws = Workspace::new();
        let mut args = ws.clone_args(&ws.app);
        args.extend(["--depth".into(), "0".into()]);

        ws.cmd()
            .args(&args)
            .assert()
            .success()
            .stdout(predicate::str::contains("Skipped 1 edges"));
        assert!(!ws.path("repos/lib").exists());
    }

    #[test]
    fn ignore_flag_skips_repository() {
        let ws = Workspace::new();
        let mut args = ws.clone_args(&ws.app);
        args.extend(["--ignore-repos".into(), format!("{};other/repo", ws.lib)]);

        ws.cmd().args(&args).assert().success();
        assert!(ws.path("repos/app.main").is_dir());
        assert!(!ws.path("repos/lib.main").exists());
    }

    #[test]
    fn config_file_sets_defaults_and_flags_override() {
        let ws = Workspace::new();
        let config = ws.path("depforest.toml");
        fs::write(&config, "[clone]\ndepth = 0\nworkers = 2\n").unwrap();

        let mut args = ws.clone_args(&ws.app);
        args.extend(["--config".into(), config.display().to_string()]);
        ws.cmd().args(&args).assert().success();
        assert!(!ws.path("repos/lib").exists());

        args.extend(["--depth".into(), "1".into()]);
        ws.cmd().args(&args).assert().success();
        assert!(ws.path("repos/lib").is_dir());
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let ws = Workspace::new();
        let mut args = ws.clone_args(&ws.app);
        args.extend(["--config".into(), ws.path("nope.toml").display().to_string()]);

        ws.cmd()
            .args(&args)
            .assert()
            .failure()
            .stderr(predicate::str::contains("configuration"));
    }

    #[test]
    fn root_failure_exits_nonzero() {
        let ws = Workspace::new();
        let gone = ws.path("remotes/gone").display().to_string();

        ws.cmd()
            .args(ws.clone_args(&gone))
            .assert()
            .failure()
            .stderr(predicate::str::contains("root repository"));
        assert!(!ws.path("repos").exists());
    }

    #[test]
    fn invalid_revision_is_rejected() {
        let ws = Workspace::new();
        let mut args = ws.clone_args(&ws.app);
        args[4] = "two words".into();

        ws.cmd()
            .args(&args)
            .assert()
            .failure()
            .stderr(predicate::str::contains("--version"));
    }
}

mod verify {
    use super::*;

    #[test]
    fn snapshot_then_verify_round_trip() {
        let ws = Workspace::new();
        ws.cmd().args(ws.clone_args(&ws.app)).assert().success();

        let expected = ws.path("expected.json");
        let assert = ws
            .cmd()
            .arg("snapshot")
            .args(ws.folders())
            .args(["--format", "json"])
            .assert()
            .success();
        let layout = parse_json(&assert.get_output().stdout);
        assert_eq!(layout["git_dirs"], serde_json::json!(["app.git", "lib.git"]));
        fs::write(&expected, &assert.get_output().stdout).unwrap();

        ws.cmd()
            .arg("verify")
            .args(ws.folders())
            .arg("--expected")
            .arg(&expected)
            .assert()
            .success()
            .stdout(predicate::str::contains("Layout matches"));

        fs::remove_dir_all(ws.path("repos/lib.main")).unwrap();

        let assert = ws
            .cmd()
            .arg("verify")
            .args(ws.folders())
            .arg("--expected")
            .arg(&expected)
            .arg("--json")
            .assert()
            .failure();
        let found = parse_json(&assert.get_output().stdout);
        assert_eq!(found.as_array().unwrap().len(), 1);
        assert_eq!(found[0]["kind"], "missing_repo");
        assert_eq!(found[0]["name"], "lib.main");
    }

    #[test]
    fn toml_snapshot_is_accepted() {
        let ws = Workspace::new();
        ws.cmd().args(ws.clone_args(&ws.app)).assert().success();

        let assert = ws
            .cmd()
            .arg("snapshot")
            .args(ws.folders())
            .assert()
            .success()
            .stdout(predicate::str::contains("master_repos"));
        let expected = ws.path("expected.toml");
        fs::write(&expected, &assert.get_output().stdout).unwrap();

        fs::create_dir(ws.path("repos/stray")).unwrap();
        ws.cmd()
            .arg("verify")
            .args(ws.folders())
            .arg("--expected")
            .arg(&expected)
            .assert()
            .failure()
            .stdout(predicate::str::contains("unexpected repo folder"));
    }

    #[test]
    fn unreadable_expected_file_is_an_error() {
        let ws = Workspace::new();
        ws.cmd()
            .arg("verify")
            .args(ws.folders())
            .arg("--expected")
            .arg(ws.path("missing.toml"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("expected layout"));
    }
}
