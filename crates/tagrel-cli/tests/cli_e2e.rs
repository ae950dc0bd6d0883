use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

fn tagrel_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_tagrel"))
}

struct Workspace {
    _dir: TempDir,
    corpus: PathBuf,
    relations: PathBuf,
}

fn workspace() -> Workspace {
    let dir = TempDir::new().expect("temp dir");
    let corpus = dir.path().join("corpus.jsonl");
    let mut lines = String::new();
    for _ in 0..15 {
        lines.push_str("[\"kitten\", \"cat\", \"pet\"]\n");
    }
    for _ in 0..5 {
        lines.push_str("[\"cat\", \"pet\"]\n");
    }
    for _ in 0..20 {
        lines.push_str("[\"sofa\", \"couch\", \"room\"]\n");
    }
    fs::write(&corpus, lines).expect("write corpus");
    let relations = dir.path().join("relations.json");
    Workspace {
        _dir: dir,
        corpus,
        relations,
    }
}

fn run(ws: &Workspace, args: &[&str]) -> Value {
    let out = Command::new(tagrel_bin())
        .arg("--corpus")
        .arg(&ws.corpus)
        .arg("--relations")
        .arg(&ws.relations)
        .arg("--json")
        .args(args)
        .output()
        .expect("run tagrel");
    assert!(
        out.status.success(),
        "tagrel {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    serde_json::from_slice(&out.stdout).expect("json output")
}

fn run_fails(relations: &Path, args: &[&str]) -> String {
    let out = Command::new(tagrel_bin())
        .arg("--relations")
        .arg(relations)
        .args(args)
        .output()
        .expect("run tagrel");
    assert!(!out.status.success());
    String::from_utf8_lossy(&out.stderr).into_owned()
}

#[test]
fn review_loop_round_trip() {
    let ws = workspace();

    let queue = run(&ws, &["relations", "suggest", "--limit", "20", "--type", "synonym"]);
    let queue = queue.as_array().expect("array");
    assert!(queue
        .iter()
        .any(|s| s["tag1"] == "kitten" && s["tag2"] == "cat"));

    let confirmed = run(
        &ws,
        &["relations", "confirm", "cat", "kitten", "--type", "synonym", "--one-way"],
    );
    let id = confirmed["id"].as_u64().expect("id");

    let listed = run(&ws, &["relations", "list"]);
    let row = &listed["relations"][0];
    assert_eq!(row["id"].as_u64(), Some(id));
    assert_eq!(row["tag1"], "kitten");
    assert_eq!(row["tag1_count"].as_u64(), Some(15));
    assert_eq!(row["tag2_count"].as_u64(), Some(20));
    assert_eq!(row["cooccurrence"].as_u64(), Some(15));

    let queue = run(&ws, &["relations", "suggest", "--limit", "20", "--type", "synonym"]);
    assert!(!queue
        .as_array()
        .expect("array")
        .iter()
        .any(|s| s["tag1"] == "kitten" && s["tag2"] == "cat"));

    let chart = run(&ws, &["relations", "chart", &id.to_string()]);
    assert_eq!(chart["overlap_percentage"].as_f64(), Some(100.0));
    assert_eq!(chart["tag2_only"].as_u64(), Some(5));
}

#[test]
fn suggest_and_counts() {
    let ws = workspace();
    let result = run(&ws, &["suggest", "kitten", "--top", "3"]);
    assert_eq!(result["matched_documents"].as_u64(), Some(40));
    let first = &result["suggestions"][0]["tag"];
    assert!(first == "cat" || first == "pet");

    let counts = run(&ws, &["counts", "cat", "sofa couch"]);
    assert_eq!(counts["cat"].as_u64(), Some(20));
    assert_eq!(counts["sofa couch"].as_u64(), Some(40));
}

#[test]
fn boundary_errors_are_reported() {
    let ws = workspace();
    let stderr = run_fails(
        &ws.relations,
        &["--corpus", ws.corpus.to_str().unwrap(), "relations", "suggest", "--limit", "-1"],
    );
    assert!(stderr.contains("limit"));

    let stderr = run_fails(&ws.relations, &["counts", "cat"]);
    assert!(stderr.contains("--corpus"));

    let stderr = run_fails(&ws.relations, &["relations", "set-type", "1", "hypernym"]);
    assert!(stderr.contains("hypernym"));
}
