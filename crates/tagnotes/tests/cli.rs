//! End-to-end CLI integration tests
//!
//! These tests invoke the compiled binary as a subprocess against throwaway
//! git repositories.

mod support;

use predicates::prelude::*;
use serde_json::Value;
use support::Repo;
use tempfile::TempDir;

fn json_stdout(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be valid JSON")
}

/// `app/12` on the first commit, three changes, `app/13` on the last.
fn released_repo() -> Option<Repo> {
    let repo = Repo::new()?;
    repo.commit("initial");
    repo.tag("app/12");
    repo.commit("CHANGELOG: PROJ-1 add login");
    repo.commit("Refactor internals");
    repo.commit("CHANGELOG: PROJ-2 fix <crash> on start");
    repo.tag("app/13");
    Some(repo)
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_lists_commands() {
    let home = TempDir::new().unwrap();
    support::cmd(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("tags"))
        .stdout(predicate::str::contains("snapshot"))
        .stdout(predicate::str::contains("changelog"));
}

#[test]
fn long_help_documents_environment() {
    let home = TempDir::new().unwrap();
    support::cmd(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("TAGNOTES_LOG_DIR"));
}

#[test]
fn version_flag_shows_version() {
    let home = TempDir::new().unwrap();
    support::cmd(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn no_subcommand_shows_help() {
    let home = TempDir::new().unwrap();
    support::cmd(home.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn invalid_format_is_rejected() {
    let home = TempDir::new().unwrap();
    support::cmd(home.path())
        .args(["changelog", "--format", "yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn chdir_nonexistent_fails() {
    let home = TempDir::new().unwrap();
    support::cmd(home.path())
        .args(["-C", "/nonexistent/path/that/does/not/exist", "tags"])
        .assert()
        .failure();
}

#[test]
fn outside_a_repository_fails() {
    if !support::git_available() {
        return;
    }
    let tmp = TempDir::new().unwrap();
    support::cmd(tmp.path())
        .args(["-C", tmp.path().to_str().unwrap(), "tags"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not inside a git repository"));
}

// =============================================================================
// Tags Command
// =============================================================================

#[test]
fn tags_reports_current_and_previous() {
    let Some(repo) = released_repo() else { return };
    let output = repo
        .tagnotes()
        .args(["--json", "tags", "--variant", "app"])
        .assert()
        .success();

    let json = json_stdout(output.get_output());
    assert_eq!(json["current"]["name"], "app/13");
    assert_eq!(json["current"]["buildNumber"], 13);
    assert_eq!(json["previous"]["name"], "app/12");
    assert_eq!(json["range"]["fromSha"], json["previous"]["commitSha"]);
    assert_eq!(json["range"]["toSha"], json["current"]["commitSha"]);
}

#[test]
fn tags_follow_creation_order_not_lexical_order() {
    let Some(repo) = Repo::new() else { return };
    repo.commit("nine");
    repo.tag("app/9");
    repo.commit("ten");
    repo.tag("app/10");

    let output = repo
        .tagnotes()
        .args(["--json", "tags", "--variant", "app"])
        .assert()
        .success();
    let json = json_stdout(output.get_output());
    assert_eq!(json["current"]["name"], "app/10");
    assert_eq!(json["previous"]["name"], "app/9");
}

#[test]
fn tags_keep_variants_apart() {
    let Some(repo) = released_repo() else { return };
    repo.commit("beta work");
    repo.tag("beta/1");

    let output = repo
        .tagnotes()
        .args(["--json", "tags", "--variant", "app"])
        .assert()
        .success();
    assert_eq!(json_stdout(output.get_output())["current"]["name"], "app/13");
}

#[test]
fn tags_without_variant_uses_most_recent_tag() {
    let Some(repo) = released_repo() else { return };
    repo.commit("beta work");
    repo.tag("beta/1");

    let output = repo.tagnotes().args(["--json", "tags"]).assert().success();
    let json = json_stdout(output.get_output());
    assert_eq!(json["current"]["name"], "beta/1");
    assert!(json["previous"].is_null());
}

#[test]
fn tags_without_any_tag_is_not_an_error() {
    let Some(repo) = Repo::new() else { return };
    repo.commit("initial");

    repo.tagnotes()
        .args(["--color", "never", "tags", "--variant", "app"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No build tags"))
        .stdout(predicate::str::contains("full history"));
}

#[test]
fn malformed_tag_fails_loudly() {
    let Some(repo) = released_repo() else { return };
    repo.commit("oops");
    repo.tag("app/latest");

    repo.tagnotes()
        .args(["tags", "--variant", "app"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("app/latest"));
}

#[test]
fn global_flags_are_accepted() {
    let Some(repo) = released_repo() else { return };
    for flags in [
        &["-q"][..],
        &["--quiet"],
        &["-v"],
        &["-vv"],
        &["--color", "always"],
        &["--color", "never"],
    ] {
        repo.tagnotes()
            .args(flags)
            .args(["tags", "--variant", "app"])
            .assert()
            .success();
    }
}

// =============================================================================
// Snapshot Command
// =============================================================================

#[test]
fn snapshot_writes_default_path() {
    let Some(repo) = released_repo() else { return };
    repo.tagnotes()
        .args(["snapshot", "--variant", "app"])
        .assert()
        .success();

    let path = repo.path().join("build").join("tag-snapshot.json");
    let json: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(json["name"], "app/13");
    assert_eq!(json["buildVariant"], "app");
    assert_eq!(json["buildNumber"], 13);
    assert_eq!(json["message"], "Build app/13");
}

#[test]
fn snapshot_respects_output_flag() {
    let Some(repo) = released_repo() else { return };
    let output = repo
        .tagnotes()
        .args(["--json", "snapshot", "--variant", "app", "-o", "out/pinned.json"])
        .assert()
        .success();

    assert!(repo.path().join("out").join("pinned.json").is_file());
    assert_eq!(json_stdout(output.get_output())["tag"]["name"], "app/13");
}

#[test]
fn snapshot_without_tags_fails() {
    let Some(repo) = Repo::new() else { return };
    repo.commit("initial");

    repo.tagnotes()
        .args(["snapshot", "--variant", "app"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no build tags"));
}

// =============================================================================
// Changelog Command
// =============================================================================

#[test]
fn changelog_plain_lists_range_newest_first() {
    let Some(repo) = released_repo() else { return };
    repo.tagnotes()
        .args(["changelog", "--variant", "app"])
        .assert()
        .success()
        .stdout(
            "CHANGELOG: PROJ-2 fix <crash> on start\n\
             Refactor internals\n\
             CHANGELOG: PROJ-1 add login\n",
        );
}

#[test]
fn changelog_first_release_covers_full_history() {
    let Some(repo) = Repo::new() else { return };
    repo.commit("initial");
    repo.commit("second");

    repo.tagnotes()
        .args(["changelog", "--variant", "app"])
        .assert()
        .success()
        .stdout("second\ninitial\n");
}

#[test]
fn changelog_skips_merges_and_reverts() {
    let Some(repo) = Repo::new() else { return };
    repo.commit("initial");
    repo.tag("app/1");
    repo.commit("add feature");
    repo.commit("Revert \"add feature\"");
    repo.git(&["checkout", "-q", "-b", "side"]);
    repo.commit("side work");
    repo.git(&["checkout", "-q", "-"]);
    repo.git(&["merge", "-q", "--no-ff", "-m", "Merge branch 'side'", "side"]);
    repo.tag("app/2");

    repo.tagnotes()
        .args(["changelog", "--variant", "app"])
        .assert()
        .success()
        .stdout("side work\nadd feature\n");
}

#[test]
fn changelog_from_snapshot_ignores_newer_tags() {
    let Some(repo) = released_repo() else { return };
    repo.tagnotes()
        .args(["snapshot", "--variant", "app"])
        .assert()
        .success();

    repo.commit("after the build started");
    repo.tag("app/14");

    repo.tagnotes()
        .args(["changelog", "--snapshot", "build/tag-snapshot.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PROJ-1 add login"))
        .stdout(predicate::str::contains("after the build started").not());
}

#[test]
fn changelog_with_broken_snapshot_names_field() {
    let Some(repo) = released_repo() else { return };
    repo.write("snap.json", r#"{"name":"app/13","buildVariant":"app","buildNumber":13}"#);

    repo.tagnotes()
        .args(["changelog", "--snapshot", "snap.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("commitSha"));
}

#[test]
fn changelog_json_distinguishes_unconfigured_references() {
    let Some(repo) = released_repo() else { return };
    let output = repo
        .tagnotes()
        .args(["--json", "changelog", "--variant", "app"])
        .assert()
        .success();

    let json = json_stdout(output.get_output());
    assert!(json["references"].is_null());
    assert_eq!(json["entries"].as_array().unwrap().len(), 3);
    assert_eq!(json["range"]["fromSha"], json["previous"]["commitSha"]);
}

#[test]
fn changelog_markup_escapes_for_telegram() {
    let Some(repo) = released_repo() else { return };
    repo.tagnotes()
        .args(["changelog", "--variant", "app", "--format", "markup"])
        .assert()
        .success()
        .stdout(predicate::str::contains("• CHANGELOG: PROJ\\-2 fix <crash\\> on start"));
}

#[test]
fn changelog_chat_payload_has_header_and_sections() {
    let Some(repo) = released_repo() else { return };
    let output = repo
        .tagnotes()
        .args(["changelog", "--variant", "app", "--format", "chat"])
        .assert()
        .success();

    let json = json_stdout(output.get_output());
    let blocks = json["blocks"].as_array().unwrap();
    assert_eq!(blocks[0]["type"], "header");
    assert_eq!(blocks[0]["text"]["text"], "app/13");
    assert_eq!(blocks[1]["text"]["text"], "CHANGELOG: PROJ-2 fix &lt;crash&gt; on start");
    assert_eq!(blocks.len(), 4);
}

#[test]
fn changelog_output_file() {
    let Some(repo) = released_repo() else { return };
    repo.tagnotes()
        .args(["changelog", "--variant", "app", "-o", "notes/app.txt"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let written = std::fs::read_to_string(repo.path().join("notes").join("app.txt")).unwrap();
    assert!(written.starts_with("CHANGELOG: PROJ-2"));
}

#[test]
fn logs_are_written_as_json_lines() {
    let Some(repo) = released_repo() else { return };
    repo.tagnotes()
        .args(["-v", "tags", "--variant", "app"])
        .assert()
        .success();

    let logs = repo.path().join(".home").join("logs");
    let contents: String = std::fs::read_dir(&logs)
        .unwrap()
        .filter_map(Result::ok)
        .map(|entry| std::fs::read_to_string(entry.path()).unwrap_or_default())
        .collect();
    let first = contents.lines().next().expect("at least one log record");
    let record: Value = serde_json::from_str(first).unwrap();
    assert_eq!(record["service"], "tagnotes");
    assert!(record["level"].is_string());
}
