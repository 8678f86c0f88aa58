use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const CONFIG: &str = r#"
inputs = ["index", "ui/index", "utils/index"]

[project]
name = "fixture"

[[bundle_types]]
format = "cjs"
presets = ["es2015-rollup", "react-app"]

[[bundle_types.plugins]]
name = "resolve"
extensions = [".js", ".jsx"]

[[bundle_types.plugins]]
name = "commonjs"
"#;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    write(root, "distpack.toml", CONFIG);
    write(
        root,
        "src/index.js",
        "export { Table } from './ui';\nexport { clamp } from './utils';\n",
    );
    write(
        root,
        "src/ui/index.js",
        "import React from 'react';\nimport { clamp } from '../utils';\n\nexport const Table = ({ rows }) => (\n  <table>{clamp(rows)}</table>\n);\n",
    );
    write(
        root,
        "src/utils/index.js",
        "export function clamp(n) {\n  return Math.max(0, n);\n}\n",
    );

    dir
}

fn distpack(dir: &TempDir, node_env: &str) -> Command {
    let mut cmd = Command::cargo_bin("distpack").unwrap();
    cmd.current_dir(dir.path())
        .env("NODE_ENV", node_env)
        .env_remove("RUST_LOG")
        .arg("build");
    cmd
}

#[test]
fn build_writes_one_file_per_input() {
    let dir = fixture();

    distpack(&dir, "production").assert().success();

    let dist = dir.path().join("dist");
    for name in ["index.js", "ui/index.js", "utils/index.js"] {
        assert!(dist.join(name).is_file(), "missing {}", name);
    }

    let ui = fs::read_to_string(dist.join("ui/index.js")).unwrap();
    assert!(ui.contains("React.createElement(\"table\", null, clamp(rows))"));
    assert!(ui.contains("require(\"react\")"));
}

#[test]
fn production_build_has_no_maps_or_report() {
    let dir = fixture();

    distpack(&dir, "production")
        .assert()
        .success()
        .stdout(predicate::str::contains("Bundle Analysis").not());

    assert!(!dir.path().join("dist/index.js.map").exists());
    let code = fs::read_to_string(dir.path().join("dist/index.js")).unwrap();
    assert!(!code.contains("sourceMappingURL"));
}

#[test]
fn development_build_has_maps_and_report() {
    let dir = fixture();

    distpack(&dir, "development")
        .assert()
        .success()
        .stdout(predicate::str::contains("Bundle Analysis"))
        .stdout(predicate::str::contains("src/utils/index.js"));

    for name in ["index.js.map", "ui/index.js.map", "utils/index.js.map"] {
        assert!(dir.path().join("dist").join(name).is_file(), "missing {}", name);
    }

    let code = fs::read_to_string(dir.path().join("dist/ui/index.js")).unwrap();
    assert!(code.ends_with("//# sourceMappingURL=index.js.map\n"));
}

#[test]
fn empty_node_env_is_production() {
    let dir = fixture();

    distpack(&dir, "")
        .assert()
        .success()
        .stdout(predicate::str::contains("Bundle Analysis").not());

    assert!(!dir.path().join("dist/index.js.map").exists());
}

#[test]
fn quotes_in_regex_literals_build() {
    let dir = fixture();
    write(
        dir.path(),
        "src/utils/index.js",
        "export function clamp(n) {\n  return Math.max(0, n);\n}\nexport const esc = s => s.replace(/\"/g, '&quot;');\n",
    );

    distpack(&dir, "production").assert().success();

    let utils = fs::read_to_string(dir.path().join("dist/utils/index.js")).unwrap();
    assert!(utils.contains(r#"s.replace(/"/g, '&quot;')"#));
}

#[test]
fn missing_input_aborts_remaining_jobs() {
    let dir = fixture();
    write(dir.path(), "src/index.js", "export const version = 1;\n");
    fs::remove_file(dir.path().join("src/ui/index.js")).unwrap();

    distpack(&dir, "production")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("input 'ui/index' does not exist"));

    let dist = dir.path().join("dist");
    assert!(dist.join("index.js").is_file());
    assert!(!dist.join("ui/index.js").exists());
    assert!(!dist.join("utils/index.js").exists());
}

#[test]
fn build_cleans_output_directory() {
    let dir = fixture();
    write(dir.path(), "dist/old/stale.js", "stale");

    distpack(&dir, "production").assert().success();

    assert!(!dir.path().join("dist/old").exists());
}

#[test]
fn unknown_export_fails_the_build() {
    let dir = fixture();
    write(dir.path(), "src/index.js", "export { Missing } from './utils';\n");

    distpack(&dir, "production")
        .assert()
        .failure()
        .stderr(predicate::str::contains("'Missing' is not exported by src/utils/index.js"));
}

#[test]
fn init_writes_default_config() {
    let dir = TempDir::new().unwrap();

    Command::cargo_bin("distpack")
        .unwrap()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();

    let config = fs::read_to_string(dir.path().join("distpack.toml")).unwrap();
    assert!(config.contains("ui/Render/index"));

    Command::cargo_bin("distpack")
        .unwrap()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}
