use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

fn script(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{json}").unwrap();
    file
}

const CREATE_AND_JOIN: &str = r#"[
    {"kind": "project", "object": "new", "actor": "PHID-USER-alice",
     "transactions": [
        {"type": "project.name", "value": "Apollo"},
        {"type": "core.edge:project.member", "value": {"+": ["PHID-USER-alice"]}}
     ]},
    {"kind": "project", "object": "@0", "actor": "PHID-USER-bob",
     "transactions": [
        {"type": "core.edge:project.member", "value": {"+": ["PHID-USER-bob"]}}
     ]},
    {"kind": "project", "object": "@0", "actor": "PHID-USER-alice",
     "transactions": [{"type": "project.color", "value": "plaid"}]}
]"#;

#[test]
fn test_cli_run_prints_results_and_timeline() {
    let file = script(CREATE_AND_JOIN);
    let mut cmd = Command::new(cargo_bin!("apptx"));
    cmd.arg("run").arg(file.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("0: ok PHID-PROJ-"))
        .stdout(predicate::str::contains("1: ok PHID-PROJ-"))
        .stdout(predicate::str::contains("2: error: validation failed"))
        .stdout(predicate::str::contains(
            "sequence,transaction,author,type,old_value,new_value,comment,hidden,title",
        ))
        .stdout(predicate::str::contains("PHID-USER-alice created this project."))
        .stdout(predicate::str::contains("PHID-USER-bob joined this project."));
}

#[test]
fn test_cli_strict_rejects_no_effect() {
    let json = r#"[
        {"kind": "project", "object": "new", "actor": "PHID-USER-alice",
         "transactions": [{"type": "project.name", "value": "Apollo"}]},
        {"kind": "project", "object": "@0", "actor": "PHID-USER-alice",
         "transactions": [{"type": "project.name", "value": "Apollo"}]}
    ]"#;
    let file = script(json);

    Command::new(cargo_bin!("apptx"))
        .arg("run")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("1: no-op PHID-PROJ-"));

    Command::new(cargo_bin!("apptx"))
        .arg("run")
        .arg(file.path())
        .arg("--strict")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "1: error: 1 transaction(s) would have no effect",
        ));
}

#[test]
fn test_cli_post_draft_then_publish() {
    let json = r#"[
        {"kind": "post", "object": "new", "actor": "PHID-USER-blogger",
         "transactions": [{"type": "post.title", "value": "Launch Day"}]},
        {"kind": "post", "object": "@0", "actor": "PHID-USER-blogger",
         "transactions": [{"type": "post.visibility", "value": "published"}]},
        {"kind": "post", "object": "@0", "actor": "PHID-USER-mallory",
         "transactions": [{"type": "post.title", "value": "Mine"}]}
    ]"#;
    let file = script(json);

    Command::new(cargo_bin!("apptx"))
        .arg("run")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("0: ok PHID-POST-"))
        .stdout(predicate::str::contains("PHID-USER-blogger published this post."))
        .stdout(predicate::str::contains(
            "2: error: PHID-USER-mallory does not have the \"edit\" capability",
        ));
}

#[test]
fn test_cli_malformed_script_fails() {
    let file = script(r#"[{"kind": "project", "object": "nowhere"}]"#);
    Command::new(cargo_bin!("apptx"))
        .arg("run")
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid edit script"));
}

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let file = script(CREATE_AND_JOIN);
    let mut cmd = Command::new(cargo_bin!("apptx"));
    cmd.arg("run").arg(file.path()).arg("--db-path").arg("some_db");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."));
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_persists_between_runs() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test_db");
    let file = script(CREATE_AND_JOIN);

    let output = Command::new(cargo_bin!("apptx"))
        .arg("run")
        .arg(file.path())
        .arg("--db-path")
        .arg(&db_path)
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let phid = stdout
        .lines()
        .find_map(|line| line.strip_prefix("0: ok "))
        .expect("created project")
        .to_string();

    Command::new(cargo_bin!("apptx"))
        .args(["timeline", phid.as_str(), "--kind", "project", "--db-path"])
        .arg(&db_path)
        .assert()
        .success()
        .stderr(predicate::str::contains("WARNING").not())
        .stdout(predicate::str::contains("PHID-USER-bob joined this project."));

    // A second run sees the name taken.
    let again = script(
        r#"[{"kind": "project", "object": "new", "actor": "PHID-USER-carol",
             "transactions": [{"type": "project.name", "value": "apollo"}]}]"#,
    );
    Command::new(cargo_bin!("apptx"))
        .arg("run")
        .arg(again.path())
        .arg("--db-path")
        .arg(&db_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("0: error: validation failed"));

    Command::new(cargo_bin!("apptx"))
        .args(["destroy", phid.as_str(), "--db-path"])
        .arg(&db_path)
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("destroyed {phid}")));

    Command::new(cargo_bin!("apptx"))
        .args(["destroy", phid.as_str(), "--db-path"])
        .arg(&db_path)
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("no object {phid}")));
}
