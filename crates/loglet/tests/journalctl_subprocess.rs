mod support;

use loglet::{CursorFile, DiscardSink, FollowError, JournalctlSource, Pipeline, PipelineError};
use tempfile::TempDir;

#[tokio::test]
async fn missing_binary_fails_to_spawn() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::builder(
        JournalctlSource::new(dir.path().join("no-such-journalctl")),
        DiscardSink,
        CursorFile::new(dir.path().join("loglet.cursor")),
    )
    .build();

    let err = pipeline.run(std::future::pending()).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Follow(FollowError::Spawn { .. })
    ));
}

#[cfg(unix)]
mod unix {
    use std::{
        fs,
        path::{Path, PathBuf},
        time::Duration,
    };

    use loglet::{
        CursorFile, CursorStore, ExportSource, FollowError, JournalctlSource, Pipeline,
        PipelineError,
    };
    use tempfile::TempDir;
    use tokio::{io::AsyncReadExt, sync::oneshot};

    use super::support::{write_executable, RecordingSink};

    const TWO_RECORDS: &str = r#"printf '__CURSOR=j1\n__REALTIME_TIMESTAMP=1500000000000000\nMESSAGE=first\n\n'
printf '__CURSOR=j2\n__REALTIME_TIMESTAMP=1500000001000000\nMESSAGE=second\n\n'"#;

    /// A journalctl stand-in that records its arguments and pid, prints two records and then
    /// runs `tail` until killed.
    fn write_fake_journalctl(dir: &Path, tail: &str) -> PathBuf {
        let script = format!(
            r#"#!/bin/sh
set -eu
printf '%s\n' "$@" > "{args}"
echo $$ > "{pid}"
{TWO_RECORDS}
{tail}
"#,
            args = dir.join("args").display(),
            pid = dir.join("pid").display(),
        );
        write_executable(dir, "journalctl", &script)
    }

    fn recorded_args(dir: &Path) -> Vec<String> {
        fs::read_to_string(dir.join("args"))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn process_alive(pid: &str) -> bool {
        std::process::Command::new("kill")
            .args(["-0", pid])
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn follows_journalctl_and_kills_it_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let binary = write_fake_journalctl(dir.path(), "exec sleep 30");
        let cursor_path = dir.path().join("loglet.cursor");
        let (sink, mut accepted) = RecordingSink::new();

        let pipeline = Pipeline::builder(
            JournalctlSource::new(&binary),
            sink.clone(),
            CursorFile::new(&cursor_path),
        )
        .build();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let run = tokio::spawn(pipeline.run(async {
            let _ = stop_rx.await;
        }));

        accepted.recv().await.unwrap();
        accepted.recv().await.unwrap();
        stop_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(10), run)
            .await
            .expect("pipeline stops journalctl on shutdown")
            .unwrap()
            .unwrap();

        assert_eq!(sink.delivered_cursors(), ["j1", "j2"]);
        assert_eq!(
            recorded_args(dir.path()),
            ["--output", "export", "--follow", "--lines=0"]
        );
        let pid = fs::read_to_string(dir.path().join("pid")).unwrap();
        assert!(!process_alive(pid.trim()), "journalctl should be killed");
        assert_eq!(
            CursorFile::new(&cursor_path).load().unwrap().unwrap().as_str(),
            "j2"
        );
    }

    #[tokio::test]
    async fn resumes_after_the_saved_cursor() {
        let dir = TempDir::new().unwrap();
        let binary = write_fake_journalctl(dir.path(), "exec sleep 30");
        let cursor_path = dir.path().join("loglet.cursor");
        fs::write(&cursor_path, "j0").unwrap();
        let (sink, mut accepted) = RecordingSink::new();

        let pipeline = Pipeline::builder(
            JournalctlSource::new(&binary),
            sink,
            CursorFile::new(&cursor_path),
        )
        .build();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let run = tokio::spawn(pipeline.run(async {
            let _ = stop_rx.await;
        }));

        accepted.recv().await.unwrap();
        stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(10), run)
            .await
            .expect("pipeline stops journalctl on shutdown")
            .unwrap()
            .unwrap();

        assert_eq!(
            recorded_args(dir.path()),
            [
                "--output",
                "export",
                "--follow",
                "--no-tail",
                "--after-cursor",
                "j0"
            ]
        );
    }

    #[tokio::test]
    async fn journalctl_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let binary = write_fake_journalctl(dir.path(), "exit 3");
        let (sink, _accepted) = RecordingSink::new();

        let pipeline = Pipeline::builder(
            JournalctlSource::new(&binary),
            sink.clone(),
            CursorFile::new(dir.path().join("loglet.cursor")),
        )
        .build();

        let err = tokio::time::timeout(Duration::from_secs(10), pipeline.run(std::future::pending()))
            .await
            .expect("pipeline ends when journalctl exits")
            .unwrap_err();
        assert!(
            matches!(
                err,
                PipelineError::Follow(FollowError::JournalctlExited { status }) if status.code() == Some(3)
            ),
            "{err}"
        );
    }

    #[tokio::test]
    async fn clean_journalctl_exit_ends_the_pipeline() {
        let dir = TempDir::new().unwrap();
        let binary = write_fake_journalctl(dir.path(), "exit 0");
        let cursor_path = dir.path().join("loglet.cursor");
        let (sink, _accepted) = RecordingSink::new();

        let pipeline = Pipeline::builder(
            JournalctlSource::new(&binary),
            sink.clone(),
            CursorFile::new(&cursor_path),
        )
        .build();

        tokio::time::timeout(Duration::from_secs(10), pipeline.run(std::future::pending()))
            .await
            .expect("pipeline ends when journalctl exits")
            .unwrap();

        assert_eq!(sink.delivered_cursors(), ["j1", "j2"]);
        assert_eq!(fs::read_to_string(&cursor_path).unwrap(), "j2");
    }

    #[tokio::test]
    async fn stop_is_idempotent_on_a_running_journalctl() {
        let dir = TempDir::new().unwrap();
        let binary = write_fake_journalctl(dir.path(), "exec sleep 30");
        let mut source = JournalctlSource::new(&binary);

        let mut stdout = source.start(None).unwrap();
        let mut first = [0u8; 1];
        stdout.read_exact(&mut first).await.unwrap();

        tokio::time::timeout(Duration::from_secs(10), async {
            source.stop().await.unwrap();
            source.stop().await.unwrap();
        })
        .await
        .expect("stop does not hang");

        let pid = fs::read_to_string(dir.path().join("pid")).unwrap();
        assert!(!process_alive(pid.trim()), "journalctl should be killed");
    }

    #[tokio::test]
    async fn stop_succeeds_after_journalctl_exited() {
        let dir = TempDir::new().unwrap();
        let binary = write_fake_journalctl(dir.path(), "exit 0");
        let mut source = JournalctlSource::new(&binary);

        let mut stdout = source.start(None).unwrap();
        let mut output = Vec::new();
        stdout.read_to_end(&mut output).await.unwrap();
        assert!(!output.is_empty());
        // give the shell time to exit after closing its stdout
        tokio::time::sleep(Duration::from_millis(100)).await;

        tokio::time::timeout(Duration::from_secs(10), async {
            source.stop().await.unwrap();
            source.stop().await.unwrap();
        })
        .await
        .expect("stop does not hang");
    }

    #[tokio::test]
    async fn shutdown_does_not_wait_for_journalctl_after_end_of_output() {
        let dir = TempDir::new().unwrap();
        // closes stdout but keeps running
        let binary = write_fake_journalctl(dir.path(), "exec sleep 30 >&-");
        let cursor_path = dir.path().join("loglet.cursor");
        let (sink, mut accepted) = RecordingSink::new();

        let pipeline = Pipeline::builder(
            JournalctlSource::new(&binary),
            sink.clone(),
            CursorFile::new(&cursor_path),
        )
        .build();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let run = tokio::spawn(pipeline.run(async {
            let _ = stop_rx.await;
        }));

        accepted.recv().await.unwrap();
        accepted.recv().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        stop_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(10), run)
            .await
            .expect("pipeline stops a journalctl that outlives its output")
            .unwrap()
            .unwrap();

        assert_eq!(sink.delivered_cursors(), ["j1", "j2"]);
        let pid = fs::read_to_string(dir.path().join("pid")).unwrap();
        assert!(!process_alive(pid.trim()), "journalctl should be killed");
        assert_eq!(fs::read_to_string(&cursor_path).unwrap(), "j2");
    }
}
