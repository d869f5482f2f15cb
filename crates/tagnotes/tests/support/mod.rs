//! Throwaway git repositories for CLI tests.

#![allow(dead_code)]

use std::cell::Cell;
use std::path::Path;
use std::process::Command as StdCommand;

use assert_cmd::Command;
use tempfile::TempDir;

/// Returns a Command configured to run our binary, isolated from the user's
/// config and log locations.
#[allow(deprecated)]
pub fn cmd(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap();
    cmd.env("XDG_CONFIG_HOME", home.join("config"))
        .env("TAGNOTES_LOG_DIR", home.join("logs"))
        .env_remove("TAGNOTES_LOG_PATH")
        .env_remove("RUST_LOG");
    cmd
}

pub fn git_available() -> bool {
    StdCommand::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

/// A repository with deterministic commit and tag dates.
///
/// Every commit or tag is one minute newer than the previous one, so
/// creation order never depends on wall-clock resolution.
pub struct Repo {
    pub dir: TempDir,
    clock: Cell<u64>,
}

impl Repo {
    /// `None` when git is not installed.
    pub fn new() -> Option<Self> {
        if !git_available() {
            eprintln!("git not available; skipping");
            return None;
        }
        let repo = Self {
            dir: TempDir::new().unwrap(),
            clock: Cell::new(1_700_000_000),
        };
        repo.git(&["init", "-q"]);
        Some(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn path_str(&self) -> &str {
        self.dir.path().to_str().unwrap()
    }

    /// Run the binary with `-C <repo>`.
    pub fn tagnotes(&self) -> Command {
        let mut cmd = cmd(&self.path().join(".home"));
        cmd.args(["-C", self.path_str()]);
        cmd
    }

    pub fn git(&self, args: &[&str]) -> String {
        let now = self.clock.get() + 60;
        self.clock.set(now);
        let date = format!("{now} +0000");

        let output = StdCommand::new("git")
            .args([
                "-c",
                "user.name=Release Bot",
                "-c",
                "user.email=release@example.com",
                "-c",
                "commit.gpgsign=false",
                "-c",
                "tag.gpgsign=false",
            ])
            .args(args)
            .current_dir(self.path())
            .env("GIT_AUTHOR_DATE", &date)
            .env("GIT_COMMITTER_DATE", &date)
            .env("GIT_CONFIG_NOSYSTEM", "1")
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    /// Empty commit; returns its sha.
    pub fn commit(&self, subject: &str) -> String {
        self.git(&["commit", "-q", "--allow-empty", "-m", subject]);
        self.git(&["rev-parse", "HEAD"])
    }

    /// Annotated tag on `HEAD`.
    pub fn tag(&self, name: &str) {
        let message = format!("Build {name}");
        self.git(&["tag", "-a", name, "-m", &message]);
    }

    pub fn write(&self, name: &str, contents: &str) {
        let path = self.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }
}
