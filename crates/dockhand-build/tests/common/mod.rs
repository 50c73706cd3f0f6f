//! Shell-script stand-in for the external builder.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use dockhand_core::{BuildStep, OutputMode, Provider, RegistryTarget, RetentionPolicy};

/// Progress output of a successful two-layer build.
pub const BUILD_OK: &str = r#"
case "$1" in
  buildx|build)
    cat >&2 <<'PROGRESS'
#1 [internal] load build definition from Dockerfile
#1 transferring dockerfile: 120B done
#1 DONE 0.0s
#2 [build 1/2] FROM docker.io/library/alpine:3.19@sha256:c5b1261d
#2 DONE 0.3s
#3 [build 2/2] RUN make release
#3 0.211 make: Entering directory '/src'
#3 DONE 1.5s
PROGRESS
    for a in "$@"; do
      case "$a" in
        type=local,dest=*)
          d="${a#type=local,dest=}"
          mkdir -p "$d/app"
          echo built > "$d/app/out.txt"
          ;;
      esac
    done
    ;;
  save)
    echo image > "$3"
    ;;
esac
exit 0
"#;

/// Fails part-way through the second layer.
pub const BUILD_FAILS: &str = r#"
cat >&2 <<'PROGRESS'
#2 [build 1/2] FROM docker.io/library/alpine:3.19
#2 DONE 0.3s
#3 [build 2/2] RUN make release
#3 0.402 make: *** [release] Error 2
#3 ERROR: process "/bin/sh -c make release" did not complete successfully: exit code: 2
PROGRESS
exit 1
"#;

/// Every layer is a cache hit.
pub const BUILD_CACHED: &str = r#"
cat >&2 <<'PROGRESS'
#2 [1/2] FROM docker.io/library/alpine:3.19
#2 CACHED
#3 [2/2] RUN make release
#3 CACHED
PROGRESS
exit 0
"#;

pub const BUILD_HANGS: &str = "sleep 30\n";

pub struct FakeBuilder {
    pub dir: tempfile::TempDir,
    pub program: PathBuf,
    pub log: PathBuf,
}

impl FakeBuilder {
    /// Script that appends its arguments to `log`, then runs `body`.
    pub fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("fake-builder");
        let log = dir.path().join("invocations.log");
        let script = format!("#!/bin/sh\necho \"$*\" >> '{}'\n{}", log.display(), body);
        std::fs::write(&program, script).unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir, program, log }
    }

    pub fn program(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// One entry per invocation, arguments space-joined.
    pub fn invocations(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log)
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

pub fn step(id: &str, context: &Path) -> BuildStep {
    BuildStep {
        id: id.to_string(),
        build_file: context.join("Dockerfile"),
        context: context.to_path_buf(),
        target: None,
        platforms: vec!["linux/amd64".to_string()],
        args: BTreeMap::from([("VERSION".to_string(), "1.0.0".to_string())]),
        tags: vec!["app:1.0.0".to_string()],
        output: OutputMode::Image,
        extract: Vec::new(),
        registries: Vec::new(),
        load: true,
        push: false,
        save: None,
    }
}

pub fn registry(url: &str, path: &str, tags: &[&str], credentials: Option<&str>) -> RegistryTarget {
    RegistryTarget {
        url: url.to_string(),
        path: path.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        tag_patterns: vec!["{version}".to_string()],
        credentials: credentials.map(str::to_string),
        provider: Provider::detect(url),
        retention: None,
    }
}

pub fn with_retention(mut target: RegistryTarget) -> RegistryTarget {
    target.retention = Some(RetentionPolicy {
        keep_last: Some(10),
        max_age_days: None,
    });
    target
}
