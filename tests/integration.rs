use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn kb_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("kb");
    path
}

const FILLER: &str = "\n\nThese notes were collected while building several small sample apps and are kept here for later reference. They are intentionally brief.\n";

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    // Knowledge repository (patterns)
    let repo = root.join("repo");
    write(
        &repo.join("tca/reducer-basics.md"),
        &format!(
            "---\ntitle: Reducer basics\ncategory: tca\ntags: [tca, reducer]\n---\n# Reducer basics\n\n## Problem\nFeature logic is scattered across views.\n\n## Solution\nMove state mutations into a reducer.\n- Keep effects explicit\n{}",
            FILLER
        ),
    );
    write(
        &repo.join("swiftui/navigation-stack.md"),
        &format!(
            "# Navigation stack\n\nUse a path binding for programmatic navigation. See [[Reducer basics]] for state handling.{}",
            FILLER
        ),
    );
    write(&repo.join("tiny.md"), "# Tiny\n\ntoo small");

    // Library documentation (reference)
    let docs = root.join("docs");
    write(
        &docs.join("Articles/ObservingChanges.md"),
        "# Observing changes\n\nYou should observe shared state with the publisher approach for derived values.\nAvoid mutating shared state from background tasks without coordination.\nWarning: the default in-memory key does not persist across launches.\n",
    );
    write(
        &docs.join("Extensions/AppStorageKey.md"),
        "# AppStorageKey\n\nPersist values in user defaults.\n\n```swift\n@Shared(.appStorage(\"count\")) var count = 0\n```\n",
    );
    write(
        &docs.join("GettingStarted.md"),
        "# Getting started\n\nInstall the package with SwiftPM and import Sharing in your target files.\n",
    );

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_content = format!(
        r#"[db]
path = "{}/data/kb.sqlite"

[search]
pattern_limit = 3
reference_limit = 5
"#,
        root.display()
    );
    let config_path = config_dir.join("kb.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_kb(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = kb_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run kb binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn root_of(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().to_path_buf()
}

fn path_arg(config_path: &Path, dir: &str) -> String {
    root_of(config_path).join(dir).to_str().unwrap().to_string()
}

fn search_json(config_path: &Path, query: &str) -> serde_json::Value {
    let (stdout, stderr, success) = run_kb(config_path, &["search", query, "--json"]);
    assert!(success, "search failed: stdout={}, stderr={}", stdout, stderr);
    serde_json::from_str(&stdout).unwrap()
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_kb(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(root_of(&config_path).join("data/kb.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_kb(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_kb(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_import_repo_skips_small_files() {
    let (_tmp, config_path) = setup_test_env();
    let repo = path_arg(&config_path, "repo");

    let (stdout, stderr, success) = run_kb(&config_path, &["import-repo", &repo]);
    assert!(success, "import-repo failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("upserted documents: 2"));
    assert!(stdout.contains("skipped (too small): 1"));
    assert!(stdout.contains("relations: 1"));
    assert!(stdout.contains("status: success"));
}

#[test]
fn test_import_repo_json_progress() {
    let (_tmp, config_path) = setup_test_env();
    let repo = path_arg(&config_path, "repo");

    let (stdout, stderr, success) =
        run_kb(&config_path, &["--progress", "json", "import-repo", &repo]);
    assert!(success, "import-repo failed: stdout={}, stderr={}", stdout, stderr);

    let events: Vec<serde_json::Value> = stderr
        .lines()
        .filter(|line| line.starts_with('{'))
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(events[0]["phase"], "discovering");
    let last = events.last().unwrap();
    assert_eq!(last["phase"], "importing");
    assert_eq!(last["n"], 2);
    assert_eq!(last["total"], 2);
    // Progress stays off stdout.
    assert!(!stdout.contains("\"phase\""));
}

#[test]
fn test_get_pattern_with_relation() {
    let (_tmp, config_path) = setup_test_env();
    let repo = path_arg(&config_path, "repo");
    run_kb(&config_path, &["import-repo", &repo]);

    let (stdout, stderr, success) = run_kb(&config_path, &["get", "swiftui/navigation-stack"]);
    assert!(success, "get failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("title:        Navigation stack"));
    assert!(stdout.contains("wiki_link -> tca/reducer-basics"));
}

#[test]
fn test_get_missing_record_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);

    let (_, stderr, success) = run_kb(&config_path, &["get", "does/not-exist"]);
    assert!(!success);
    assert!(stderr.contains("record not found"));
}

#[test]
fn test_library_import_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();
    let docs = path_arg(&config_path, "docs");

    let (stdout, stderr, success) =
        run_kb(&config_path, &["import", &docs, "--library", "SwiftSharing"]);
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("upserted documents: 3"));

    let (stdout, stderr, success) =
        run_kb(&config_path, &["import", &docs, "--library", "SwiftSharing", "--yes"]);
    assert!(success, "reimport failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("upserted documents: 3"));

    let (stdout, _, success) = run_kb(&config_path, &["report", "SwiftSharing"]);
    assert!(success);
    assert!(stdout.contains("Reference:   3"), "report: {}", stdout);
}

#[test]
fn test_redundant_import_needs_confirmation() {
    let (_tmp, config_path) = setup_test_env();
    let docs = path_arg(&config_path, "docs");
    run_kb(&config_path, &["import", &docs, "--library", "SwiftSharing"]);

    let (stdout, stderr, success) =
        run_kb(&config_path, &["import", &docs, "--library", "SwiftSharing"]);
    assert!(!success, "redundant import should need confirmation: {}", stdout);
    assert!(stderr.contains("--yes"));
    assert!(stdout.contains("uniqueness: 0 / 3 files (0.0%)"));
}

#[test]
fn test_import_missing_path_fails() {
    let (_tmp, config_path) = setup_test_env();
    let missing = path_arg(&config_path, "nope");

    let (_, stderr, success) = run_kb(&config_path, &["import", &missing, "--library", "X"]);
    assert!(!success);
    assert!(stderr.contains("path not found"));
}

#[test]
fn test_check_duplicates_three_file_scenario() {
    let (_tmp, config_path) = setup_test_env();
    let root = root_of(&config_path);
    let batch = root.join("batch");
    write(&batch.join("a.md"), "# Same\n\nIdentical body text.\n\nSecond line.\n");
    write(&batch.join("b.md"), "# Same\n\n\nIdentical body text.   \n\n\nSecond line.\n\n");
    write(&batch.join("c.md"), "# Storage\n\nUsing sqlite for local storage of records.\n");

    let (stdout, stderr, success) = run_kb(
        &config_path,
        &["check-duplicates", batch.to_str().unwrap(), "--library", "Batch"],
    );
    assert!(success, "check failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("exact duplicates: 1"));
    assert!(stdout.contains("b.md == a.md (same batch)"));
    assert!(stdout.contains("uniqueness: 2 / 3 files (66.7%)"));
}

#[test]
fn test_check_duplicates_json() {
    let (_tmp, config_path) = setup_test_env();
    let docs = path_arg(&config_path, "docs");

    let (stdout, _, success) = run_kb(
        &config_path,
        &["check-duplicates", &docs, "--library", "SwiftSharing", "--json"],
    );
    assert!(success);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["status"], "analyzed");
    assert_eq!(value["uniqueness"]["uniqueness_percentage"], 100.0);
}

#[test]
fn test_search_empty_store_no_knowledge() {
    let (_tmp, config_path) = setup_test_env();

    let value = search_json(&config_path, "anything at all");
    assert_eq!(value["results"][0]["status"], "no_knowledge_found");
}

#[test]
fn test_search_query_with_operator_characters() {
    let (_tmp, config_path) = setup_test_env();
    let docs = path_arg(&config_path, "docs");
    run_kb(&config_path, &["import", &docs, "--library", "SwiftSharing"]);

    let value = search_json(&config_path, r"@Dependency(\.client)");
    let status = value["results"][0]["status"].as_str().unwrap().to_string();
    assert!(
        ["reference_found", "no_knowledge_found"].contains(&status.as_str()),
        "unexpected status {}",
        status
    );
}

#[test]
fn test_synthesize_then_patterns_take_precedence() {
    let (_tmp, config_path) = setup_test_env();
    let docs = path_arg(&config_path, "docs");
    run_kb(&config_path, &["import", &docs, "--library", "SwiftSharing"]);

    let before = search_json(&config_path, "publisher");
    assert_eq!(before["results"][0]["status"], "reference_found");

    let (stdout, stderr, success) = run_kb(&config_path, &["synthesize", "SwiftSharing"]);
    assert!(success, "synthesize failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("patterns created: 3"), "synthesize: {}", stdout);

    let after = search_json(&config_path, "publisher");
    assert_eq!(after["results"][0]["status"], "pattern_found");
}

#[test]
fn test_synthesize_empty_library() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_kb(&config_path, &["synthesize", "Nothing"]);
    assert!(success, "synthesize failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("documents scanned: 0"));
    assert!(stdout.contains("patterns created: 0"));

    let (stdout, _, _) = run_kb(&config_path, &["report"]);
    assert!(stdout.contains("Patterns:    0"));
}

#[test]
fn test_search_session_cache_and_stats() {
    let (_tmp, config_path) = setup_test_env();
    let repo = path_arg(&config_path, "repo");
    run_kb(&config_path, &["import-repo", &repo]);

    let (stdout, stderr, success) = run_kb(
        &config_path,
        &["search", "reducer", "Reducer  ", "--stats", "--detail", "summary"],
    );
    assert!(success, "search failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("status: pattern_found (cached)"));
    assert!(stdout.contains("cache hits:     1"));
    assert!(stdout.contains("pattern hits:   1"));
}

#[test]
fn test_expand_key_points() {
    let (_tmp, config_path) = setup_test_env();
    let repo = path_arg(&config_path, "repo");
    run_kb(&config_path, &["import-repo", &repo]);

    let (stdout, _, success) = run_kb(
        &config_path,
        &["expand", "tca/reducer-basics", "--section", "key-points"],
    );
    assert!(success);
    assert!(stdout.contains("- Keep effects explicit"));
}

#[test]
fn test_health_after_import() {
    let (_tmp, config_path) = setup_test_env();
    let repo = path_arg(&config_path, "repo");
    run_kb(&config_path, &["import-repo", &repo]);

    let (stdout, stderr, success) = run_kb(&config_path, &["health"]);
    assert!(success, "health failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("integrity_check: ok"));
    assert!(stdout.contains("status: healthy"));
}

#[test]
fn test_validate_reports_scores() {
    let (_tmp, config_path) = setup_test_env();
    let docs = path_arg(&config_path, "docs");
    run_kb(
        &config_path,
        &["import", &docs, "--library", "SwiftSharing", "--synthesize"],
    );

    let (stdout, _, _) = run_kb(&config_path, &["validate", "SwiftSharing", "--json"]);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["library"], "SwiftSharing");
    assert_eq!(value["documents"], 3);
    assert_eq!(value["scores"]["scripts"], 1.0);
    assert!(value["average"].as_f64().unwrap() <= 1.0);
}
