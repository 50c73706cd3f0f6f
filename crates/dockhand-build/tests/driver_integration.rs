//! Builder driver against a shell-script stand-in for the builder.

#![cfg(unix)]

mod common;

use std::time::{Duration, Instant};

use common::{FakeBuilder, BUILD_CACHED, BUILD_FAILS, BUILD_HANGS, BUILD_OK};
use dockhand_build::{BuildEngine, BuilderDriver};
use dockhand_core::{DockhandError, ExtractRule, OutputMode, Phase, StepStatus};
use tokio_util::sync::CancellationToken;

fn driver(fake: &FakeBuilder) -> BuilderDriver {
    BuilderDriver::new(BuildEngine::Buildx).with_program(fake.program())
}

#[tokio::test]
async fn successful_build_reports_layers_in_order() {
    let fake = FakeBuilder::new(BUILD_OK);
    let step = common::step("api", fake.dir.path());

    let result = driver(&fake)
        .run_step(&step, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, StepStatus::Success);
    assert!(result.error.is_none());
    let ids: Vec<u32> = result.layers.iter().map(|l| l.id).collect();
    assert_eq!(ids, vec![2, 3]);
    assert_eq!(result.layers[0].image.as_deref(), Some("docker.io/library/alpine:3.19"));
    assert_eq!(result.layers[1].duration, Duration::from_millis(1500));

    let invocations = fake.invocations();
    assert_eq!(invocations.len(), 1);
    let context = fake.dir.path().display().to_string();
    assert_eq!(
        invocations[0],
        format!(
            "buildx build --file {context}/Dockerfile --platform linux/amd64 \
             --build-arg VERSION=1.0.0 --tag app:1.0.0 --load {context}"
        )
    );
}

#[tokio::test]
async fn failed_build_keeps_partial_layers() {
    let fake = FakeBuilder::new(BUILD_FAILS);
    let step = common::step("api", fake.dir.path());

    let result = driver(&fake)
        .run_step(&step, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, StepStatus::Failed);
    let error = result.error.unwrap();
    assert_eq!(error.phase, Phase::Build);
    assert!(error.message.contains("exited with code 1"), "{}", error.message);
    assert!(error.message.contains("did not complete successfully"));
    assert_eq!(result.layers.len(), 1);
    assert_eq!(result.layers[0].id, 2);
}

#[tokio::test]
async fn all_cached_layers_mark_the_step_cached() {
    let fake = FakeBuilder::new(BUILD_CACHED);
    let step = common::step("api", fake.dir.path());

    let result = driver(&fake)
        .run_step(&step, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, StepStatus::Cached);
    assert!(result.layers.iter().all(|l| l.duration == Duration::ZERO));
}

#[tokio::test]
async fn streaming_build_forwards_every_line() {
    let fake = FakeBuilder::new(BUILD_OK);
    let step = common::step("api", fake.dir.path());
    let mut lines = Vec::new();

    let result = driver(&fake)
        .run_step_streaming(&step, &CancellationToken::new(), |line| {
            lines.push(line.to_string())
        })
        .await
        .unwrap();

    assert_eq!(lines.len(), 8);
    assert_eq!(lines[0], "#1 [internal] load build definition from Dockerfile");
    assert_eq!(result.layers.len(), 2);
    assert!(fake.invocations()[0].starts_with("buildx build --progress=plain --file"));
}

#[tokio::test]
async fn streaming_build_survives_invalid_utf8() {
    let fake = FakeBuilder::new(
        r#"
printf '#2 [1/2] FROM docker.io/library/alpine:3.19\n#2 DONE 0.3s\n' >&2
printf '#3 [2/2] RUN cat menu.txt\n#3 0.1 caf\351\n#3 DONE 0.2s\n' >&2
exit 0
"#,
    );
    let step = common::step("api", fake.dir.path());
    let mut lines = Vec::new();

    let result = driver(&fake)
        .run_step_streaming(&step, &CancellationToken::new(), |line| {
            lines.push(line.to_string())
        })
        .await
        .unwrap();

    assert_eq!(result.status, StepStatus::Success);
    assert_eq!(result.layers.len(), 2);
    assert!(lines.contains(&"#3 0.1 caf\u{FFFD}".to_string()), "{lines:?}");
}

#[tokio::test]
async fn local_output_is_extracted() {
    let fake = FakeBuilder::new(BUILD_OK);
    let mut step = common::step("site", fake.dir.path());
    let dest = fake.path("export");
    let target = fake.path("dist/out.txt");
    step.load = false;
    step.output = OutputMode::Local { dest: dest.clone() };
    step.extract = vec![ExtractRule {
        from: "app/out.txt".to_string(),
        to: target.to_string_lossy().into_owned(),
    }];

    let result = driver(&fake)
        .run_step(&step, &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.passed(), "{:?}", result.error);
    assert_eq!(result.artifacts, vec![target.clone()]);
    assert_eq!(std::fs::read_to_string(target).unwrap().trim(), "built");
}

#[tokio::test]
async fn missing_extract_source_fails_in_extract_phase() {
    let fake = FakeBuilder::new(BUILD_OK);
    let mut step = common::step("site", fake.dir.path());
    step.load = false;
    step.output = OutputMode::Local {
        dest: fake.path("export"),
    };
    step.extract = vec![ExtractRule {
        from: "app/missing".to_string(),
        to: fake.path("dist/missing").to_string_lossy().into_owned(),
    }];

    let result = driver(&fake)
        .run_step(&step, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.error.unwrap().phase, Phase::Extract);
    assert_eq!(result.layers.len(), 2);
}

#[tokio::test]
async fn cancellation_stops_the_builder() {
    let fake = FakeBuilder::new(BUILD_HANGS);
    let step = common::step("api", fake.dir.path());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = driver(&fake).run_step(&step, &cancel).await.unwrap_err();
    assert!(matches!(err, DockhandError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn missing_builder_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let step = common::step("api", dir.path());
    let err = BuilderDriver::new(BuildEngine::Buildx)
        .with_program(dir.path().join("no-such-builder").to_string_lossy().into_owned())
        .run_step(&step, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DockhandError::Io(_)));
}

#[tokio::test]
async fn save_writes_the_archive() {
    let fake = FakeBuilder::new(BUILD_OK);
    let archive = fake.path("images/app.tar");

    driver(&fake)
        .save(&archive, "app:1.0.0", &CancellationToken::new())
        .await
        .unwrap();

    assert!(archive.exists());
    assert_eq!(
        fake.invocations(),
        vec![format!("save -o {} app:1.0.0", archive.display())]
    );
}

#[tokio::test]
async fn failed_save_is_process_failed() {
    let fake = FakeBuilder::new("echo 'no such image: app:1.0.0' >&2\nexit 1\n");
    let err = driver(&fake)
        .save(&fake.path("app.tar"), "app:1.0.0", &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        DockhandError::ProcessFailed { code, stderr, .. } => {
            assert_eq!(code, 1);
            assert_eq!(stderr, "no such image: app:1.0.0");
        }
        other => panic!("unexpected: {other}"),
    }
}
