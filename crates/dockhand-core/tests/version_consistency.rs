//! Every workspace member inherits the workspace version, and the internal
//! crate pins in `[workspace.dependencies]` agree with it.

use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .unwrap()
        .to_path_buf()
}

fn read_toml(path: &Path) -> toml::Value {
    std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("read {}: {e}", path.display()))
        .parse()
        .unwrap_or_else(|e| panic!("parse {}: {e}", path.display()))
}

fn root_manifest() -> toml::Value {
    read_toml(&workspace_root().join("Cargo.toml"))
}

fn workspace_version() -> String {
    root_manifest()["workspace"]["package"]["version"]
        .as_str()
        .unwrap()
        .to_string()
}

#[test]
fn members_inherit_workspace_version() {
    let root = workspace_root();
    let manifest = root_manifest();
    let members = manifest["workspace"]["members"].as_array().unwrap();
    assert!(!members.is_empty());

    for member in members {
        let member = member.as_str().unwrap();
        let doc = read_toml(&root.join(member).join("Cargo.toml"));
        let inherited = doc["package"]
            .get("version")
            .and_then(|v| v.get("workspace"))
            .and_then(|v| v.as_bool());
        assert_eq!(
            inherited,
            Some(true),
            "{member} should use version.workspace = true"
        );
    }
}

#[test]
fn internal_dependency_pins_match() {
    let version = workspace_version();
    let manifest = root_manifest();
    let deps = manifest["workspace"]["dependencies"].as_table().unwrap();

    let internal: Vec<_> = deps
        .iter()
        .filter(|(_, spec)| spec.get("path").is_some())
        .collect();
    assert!(!internal.is_empty());

    for (name, spec) in internal {
        assert_eq!(
            spec.get("version").and_then(|v| v.as_str()),
            Some(version.as_str()),
            "{name} is pinned to a different version than the workspace"
        );
    }
}

#[test]
fn crate_version_matches_workspace() {
    assert_eq!(workspace_version(), dockhand_core::VERSION);
}
