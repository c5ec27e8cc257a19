//! Architecture enforcement tests.
//!
//! The crate is layered: `git` is the only module that talks to libgit2,
//! the CLI reaches the store only through the engine and verifier, and no
//! library code shells out or panics on errors. These tests keep it that
//! way.

use std::fs;
use std::path::{Path, PathBuf};

/// All `.rs` files under `dir`, recursively.
fn rust_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).expect("Failed to read directory") {
            let path = entry.expect("Failed to read entry").path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|e| e == "rs") {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

/// Non-comment lines before the first `#[cfg(test)]`.
fn production_lines(path: &Path) -> Vec<(usize, String)> {
    let content =
        fs::read_to_string(path).unwrap_or_else(|_| panic!("Failed to read {}", path.display()));
    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| !line.trim_start().starts_with("#[cfg(test)]"))
        .filter(|(_, line)| !line.trim_start().starts_with("//"))
        .map(|(i, line)| (i + 1, line.to_string()))
        .collect()
}

/// Every production line in `root` containing one of `needles`.
fn find(root: &str, needles: &[&str], skip: impl Fn(&Path) -> bool) -> Vec<String> {
    let mut violations = Vec::new();
    for path in rust_files(Path::new(root)) {
        if skip(&path) {
            continue;
        }
        for (line_no, line) in production_lines(&path) {
            if needles.iter().any(|n| line.contains(n)) {
                violations.push(format!("{}:{}: {}", path.display(), line_no, line.trim()));
            }
        }
    }
    violations
}

// =============================================================================
// Layering
// =============================================================================

#[test]
fn only_git_module_uses_git2() {
    let violations = find("src", &["git2::", "use git2"], |p| p.starts_with("src/git"));
    assert!(
        violations.is_empty(),
        "git2 used outside src/git:\n{}",
        violations.join("\n")
    );
}

#[test]
fn cli_does_not_touch_git_or_store() {
    let violations = find("src/cli", &["crate::git", "crate::store"], |_| false);
    assert!(
        violations.is_empty(),
        "CLI bypasses the engine:\n{}",
        violations.join("\n")
    );
}

#[test]
fn core_does_not_depend_on_engine() {
    let violations = find("src/core", &["crate::engine", "crate::cli"], |_| false);
    assert!(
        violations.is_empty(),
        "core depends on an outer layer:\n{}",
        violations.join("\n")
    );
}

// =============================================================================
// Library hygiene
// =============================================================================

#[test]
fn library_never_shells_out() {
    let violations = find("src", &["process::Command"], |_| false);
    assert!(
        violations.is_empty(),
        "subprocess spawned from library code:\n{}",
        violations.join("\n")
    );
}

#[test]
fn library_propagates_errors() {
    let violations = find("src", &[".unwrap()", ".expect("], |p| p.ends_with("main.rs"));
    assert!(
        violations.is_empty(),
        "unwrap/expect outside tests:\n{}",
        violations.join("\n")
    );
}

#[test]
fn logging_goes_through_tracing() {
    let violations = find("src", &["println!", "eprintln!"], |p| {
        p.starts_with("src/cli") || p.ends_with("main.rs")
    });
    assert!(
        violations.is_empty(),
        "direct printing outside the CLI:\n{}",
        violations.join("\n")
    );
}
