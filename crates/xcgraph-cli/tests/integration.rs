//! Integration tests for the xcgraph CLI
//!
//! Each test runs the binary on a copy of the `shop` fixture workspace, with
//! `HOME` pointed at a scratch directory so no global config is picked up.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Get a Command for the xcgraph binary
#[allow(deprecated)]
fn xcgraph() -> Command {
    Command::cargo_bin("xcgraph").expect("Failed to find xcgraph binary")
}

/// Path to xcgraph-core's fixture workspaces
fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .join("xcgraph-core/tests/fixtures")
        .join(name)
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let path = entry.path();
        let dest_path = dst.join(entry.file_name());

        if path.is_dir() {
            std::fs::create_dir_all(&dest_path)?;
            copy_dir_recursive(&path, &dest_path)?;
        } else {
            std::fs::copy(&path, &dest_path)?;
        }
    }
    Ok(())
}

/// A copy of the shop workspace plus scratch home and cache directories.
struct Shop {
    temp: TempDir,
}

impl Shop {
    fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let root = temp.path().join("shop");
        std::fs::create_dir_all(&root).unwrap();
        copy_dir_recursive(&fixture_path("shop"), &root).expect("Failed to copy fixture");
        std::fs::create_dir_all(temp.path().join("home")).unwrap();
        Self { temp }
    }

    fn root(&self) -> PathBuf {
        self.temp.path().join("shop")
    }

    fn cache_dir(&self) -> PathBuf {
        self.temp.path().join("cache")
    }

    fn command(&self) -> Command {
        self.command_at(&self.root())
    }

    fn command_at(&self, path: &Path) -> Command {
        let mut cmd = xcgraph();
        cmd.env("HOME", self.temp.path().join("home"))
            .env_remove("XCGRAPH_CONFIG")
            .env_remove("XCGRAPH_PATH")
            .env("XCGRAPH_CACHE_DIR", self.cache_dir())
            .arg("--quiet")
            .arg("--path")
            .arg(path);
        cmd
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self.command().args(args).output().unwrap();
        assert!(
            output.status.success(),
            "command failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
    }
}

fn names(values: &Value) -> Vec<String> {
    values
        .as_array()
        .unwrap()
        .iter()
        .map(|value| value["name"].as_str().unwrap().to_string())
        .collect()
}

fn target_platforms(document: &Value, name: &str) -> Vec<String> {
    document["graph"]["projects"]
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|project| project["targets"].as_array().unwrap().iter())
        .find(|target| target["name"] == name)
        .unwrap_or_else(|| panic!("missing target {name}"))["platforms"]
        .as_array()
        .unwrap()
        .iter()
        .map(|platform| platform.as_str().unwrap().to_string())
        .collect()
}

// ============================================================================
// Graph Command
// ============================================================================

#[test]
fn test_graph_json_dry_run() {
    let shop = Shop::new();

    let document = shop.json(&["graph", "--json", "--dry-run"]);

    assert_eq!(document["graph"]["name"], "Shop");
    assert_eq!(target_platforms(&document, "Analytics"), vec!["ios"]);
    assert_eq!(target_platforms(&document, "Networking"), vec!["ios", "macos"]);
    let side_effects = document["side_effects"].as_array().unwrap();
    assert_eq!(side_effects.len(), 1);
    assert_eq!(side_effects[0]["kind"], "directory");
    assert!(!shop.root().join(".build").exists());
}

#[test]
fn test_graph_applies_side_effects() {
    let shop = Shop::new();

    shop.command()
        .arg("graph")
        .assert()
        .success()
        .stdout(predicate::str::contains("Shop"))
        .stdout(predicate::str::contains("Networking [external]"));

    assert!(shop.root().join(".build/derived/Networking/Derived").is_dir());
}

#[test]
fn test_graph_without_narrowing() {
    let shop = Shop::new();

    let document = shop.json(&["--no-narrowing", "graph", "--json", "--dry-run"]);

    assert_eq!(
        target_platforms(&document, "Analytics"),
        vec!["ios", "macos", "tvos"]
    );
}

#[test]
fn test_graph_fails_without_manifest() {
    let shop = Shop::new();
    let empty = shop.temp.path().join("home");

    shop.command_at(&empty)
        .arg("graph")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load graph"));
}

// ============================================================================
// Query Command
// ============================================================================

#[test]
fn test_query_external_targets() {
    let shop = Shop::new();

    let targets = names(&shop.json(&["query", "targets", "--external", "--json"]));

    assert!(targets.contains(&"Networking".to_string()));
    assert!(targets.contains(&"Benchmarks".to_string()));
    assert!(!targets.contains(&"App".to_string()));
}

#[test]
fn test_query_direct_dependencies() {
    let shop = Shop::new();

    let deps = names(&shop.json(&["query", "deps", "App", "--json"]));

    assert_eq!(deps.len(), 2);
    assert!(deps.contains(&"Networking".to_string()));
    assert!(deps.contains(&"Analytics".to_string()));
}

#[test]
fn test_query_transitive_dependencies() {
    let shop = Shop::new();

    let deps = names(&shop.json(&["query", "deps", "App", "--transitive", "--json"]));

    assert!(deps.contains(&"Logging".to_string()));
}

#[test]
fn test_query_linkable_after_mapping() {
    let shop = Shop::new();

    shop.command()
        .args(["query", "--mapped", "linkable", "App"])
        .assert()
        .success()
        .stdout(predicate::str::contains("UIKit.framework"))
        .stdout(predicate::str::contains("Networking"))
        .stdout(predicate::str::contains("Logging").not());
}

#[test]
fn test_query_orphans() {
    let shop = Shop::new();

    let orphans = names(&shop.json(&["query", "orphans", "--json"]));

    assert_eq!(orphans, vec!["Benchmarks"]);
}

#[test]
fn test_query_platforms() {
    let shop = Shop::new();

    let report = shop.json(&["query", "platforms", "--json"]);

    let analytics = report["targets"]
        .as_array()
        .unwrap()
        .iter()
        .find(|summary| summary["target"]["name"] == "Analytics")
        .unwrap();
    assert_eq!(analytics["needed"], serde_json::json!(["ios"]));
    assert!(report["incompatible"].as_array().unwrap().is_empty());
}

#[test]
fn test_query_unknown_target() {
    let shop = Shop::new();

    shop.command()
        .args(["query", "deps", "Ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Target 'Ghost' not found"));
}

// ============================================================================
// Cache Command
// ============================================================================

#[test]
fn test_cache_hashes() {
    let shop = Shop::new();

    let hashes = shop.json(&["cache", "hashes", "--json"]);

    assert_eq!(hashes.as_array().unwrap().len(), 7);
}

#[test]
fn test_cache_store_then_status() {
    let shop = Shop::new();
    let built = shop.temp.path().join("build/Analytics.framework");
    std::fs::create_dir_all(&built).unwrap();
    std::fs::write(built.join("Analytics"), "binary").unwrap();

    let statuses = shop.json(&["cache", "status", "--json"]);
    assert!(statuses
        .as_array()
        .unwrap()
        .iter()
        .all(|status| status["artifact"].is_null()));

    shop.command()
        .args(["cache", "store", "Analytics"])
        .arg(&built)
        .assert()
        .success()
        .stdout(predicate::str::contains("Stored Analytics"));

    let statuses = shop.json(&["cache", "status", "--json"]);
    let analytics = statuses
        .as_array()
        .unwrap()
        .iter()
        .find(|status| status["target"]["name"] == "Analytics")
        .unwrap();
    assert!(analytics["artifact"]
        .as_str()
        .unwrap()
        .ends_with("Analytics.framework"));
    assert!(shop.cache_dir().join("Analytics").is_dir());
}

// ============================================================================
// Config Command
// ============================================================================

#[test]
fn test_config_show_defaults() {
    let shop = Shop::new();

    let config = shop.json(&["config", "show", "--json"]);

    assert_eq!(config["narrowing"]["on_incompatible"], "error");
    assert_eq!(
        config["cache"]["directory"],
        shop.cache_dir().display().to_string()
    );
}

#[test]
fn test_config_init_local() {
    let shop = Shop::new();

    shop.command()
        .args(["config", "init"])
        .assert()
        .success();

    assert!(shop.root().join(".xcgraph/config.toml").exists());
}

#[test]
fn test_explicit_config_file() {
    let shop = Shop::new();
    let file = shop.temp.path().join("ci.toml");
    std::fs::write(&file, "[narrowing]\non_incompatible = \"warn\"\n").unwrap();

    let config = shop.json(&["--config", file.to_str().unwrap(), "config", "show", "--json"]);

    assert_eq!(config["narrowing"]["on_incompatible"], "warn");
}
