//! Command implementations

pub mod changelog;

pub mod snapshot;

pub mod tags;

use anyhow::{Context, bail};
use camino::Utf8Path;
use tagnotes_core::SystemGit;

/// Open the repository containing `cwd`.
///
/// Shared by every command that queries tags or commits.
pub fn open_repo(cwd: &Utf8Path) -> anyhow::Result<SystemGit> {
    let git = SystemGit::new(cwd).context("cannot query build tags")?;
    if !git.is_inside_repo()? {
        bail!("{cwd} is not inside a git repository");
    }
    Ok(git)
}

/// Write `contents` to `path`, or print to stdout when `path` is `None`.
pub fn emit(contents: &str, path: Option<&Utf8Path>) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            if let Some(dir) = path.parent()
                && !dir.as_str().is_empty()
            {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create {dir}"))?;
            }
            std::fs::write(path, contents).with_context(|| format!("failed to write {path}"))
        }
        None => {
            println!("{contents}");
            Ok(())
        }
    }
}
