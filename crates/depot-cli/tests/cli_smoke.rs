//! Runs the `depot` binary against a sandboxed home directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use depot_core::manifest::digest_tree;
use depot_schema::{ManifestFormat, Selections};
use tempfile::TempDir;

struct Sandbox {
    home: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            home: tempfile::tempdir().unwrap(),
        }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.home.path().join(rel)
    }

    fn depot(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_depot"))
            .args(args)
            .env("DEPOT_HOME", self.home.path())
            .env_remove("DEPOT_STORE")
            .env_remove("RUST_LOG")
            .output()
            .unwrap()
    }

    fn ok(&self, args: &[&str]) -> String {
        let output = self.depot(args);
        assert!(
            output.status.success(),
            "depot {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8(output.stdout).unwrap()
    }
}

fn sample_tree(root: &Path) -> PathBuf {
    let dir = root.join("tree");
    fs::create_dir_all(dir.join("bin")).unwrap();
    fs::write(dir.join("bin/tool"), b"#!/bin/sh\necho tool\n").unwrap();
    fs::write(dir.join("README"), b"tool readme\n").unwrap();
    dir
}

fn write_feed(sandbox: &Sandbox, body: &str) -> String {
    let path = sandbox.path("tool.toml");
    fs::write(&path, format!("uri = \"https://example.org/tool\"\nname = \"tool\"\n{body}")).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn store_lifecycle() {
    let sandbox = Sandbox::new();
    let tree = sample_tree(sandbox.home.path());
    let digest = digest_tree(&tree, &[ManifestFormat::Sha256New]).unwrap();
    let id = digest.best_id().unwrap();
    let tree_arg = tree.to_str().unwrap();

    assert_eq!(sandbox.ok(&["store", "digest", tree_arg]).trim(), id);
    let manifest = sandbox.ok(&["store", "manifest", tree_arg]);
    assert!(manifest.contains("D /bin"), "{manifest}");

    let added = sandbox.ok(&["store", "add", &id, tree_arg]);
    assert!(added.trim().ends_with(&id));
    assert!(sandbox.ok(&["store", "list"]).lines().any(|l| l == id));
    assert_eq!(sandbox.ok(&["store", "path", &id]).trim(), added.trim());
    sandbox.ok(&["store", "verify", &id]);
    sandbox.ok(&["store", "audit"]);

    // Adding twice is refused.
    assert!(!sandbox.depot(&["store", "add", &id, tree_arg]).status.success());

    sandbox.ok(&["store", "remove", &id]);
    assert!(!sandbox.depot(&["store", "path", &id]).status.success());
}

#[test]
fn wrong_digest_is_refused() {
    let sandbox = Sandbox::new();
    let tree = sample_tree(sandbox.home.path());
    let wrong = "sha256new=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

    let output = sandbox.depot(&["store", "add", wrong, tree.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("mismatch"));
    assert!(sandbox.ok(&["store", "list"]).trim().is_empty());
}

#[test]
fn select_honours_version_bounds() {
    let sandbox = Sandbox::new();
    let feed = write_feed(
        &sandbox,
        r#"
[[implementation]]
id = "old"
version = "1.0"
digest = { sha256new = "OLD" }

[[implementation]]
id = "new"
version = "2.0"
digest = { sha256new = "NEW" }
"#,
    );

    let latest = Selections::from_json(&sandbox.ok(&["select", &feed, "--json"])).unwrap();
    assert_eq!(latest.root().unwrap().id, "new");

    let bounded =
        Selections::from_json(&sandbox.ok(&["select", &feed, "--before", "2.0", "--json"])).unwrap();
    assert_eq!(bounded.root().unwrap().id, "old");

    let human = sandbox.ok(&["select", &feed]);
    assert!(human.contains("(not in store)"), "{human}");
}

#[test]
fn unsatisfiable_selection_fails() {
    let sandbox = Sandbox::new();
    let feed = write_feed(
        &sandbox,
        r#"
[[implementation]]
version = "1.0"
digest = { sha256new = "ONLY" }
"#,
    );

    let output = sandbox.depot(&["select", &feed, "--not-before", "5"]);
    assert!(!output.status.success());
    assert!(!String::from_utf8_lossy(&output.stderr).is_empty());

    let missing = sandbox.depot(&["select", "https://example.org/unknown"]);
    assert!(!missing.status.success());
}

#[test]
fn download_fetches_local_archive() {
    let sandbox = Sandbox::new();
    let tree = sample_tree(sandbox.home.path());
    let digest = digest_tree(&tree, &[ManifestFormat::Sha256New]).unwrap();

    let mut builder = tar::Builder::new(Vec::new());
    builder.append_dir_all(".", &tree).unwrap();
    let bytes = builder.into_inner().unwrap();
    let tarball = sandbox.path("tool-1.0.tar");
    fs::write(&tarball, &bytes).unwrap();

    let feed = write_feed(
        &sandbox,
        &format!(
            r#"
[[implementation]]
version = "1.0"
digest = {{ sha256new = "{}" }}

[[implementation.retrieval]]
kind = "archive"
href = "{}"
size = {}
"#,
            digest.sha256new.as_deref().unwrap(),
            tarball.display(),
            bytes.len()
        ),
    );

    let selections = Selections::from_json(&sandbox.ok(&["download", &feed, "--json"])).unwrap();
    assert_eq!(selections.root().unwrap().digest, digest);

    let id = digest.best_id().unwrap();
    let stored = PathBuf::from(sandbox.ok(&["store", "path", &id]).trim());
    assert!(stored.join("bin/tool").is_file());
    assert!(stored.starts_with(sandbox.path("implementations")));
}
