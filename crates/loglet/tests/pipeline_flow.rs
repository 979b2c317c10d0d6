mod support;

use std::{collections::BTreeMap, time::Duration};

use loglet::{
    AttachedSource, CursorFile, CursorStore, DiscardSink, EntryFilter, LogletConfig, Pipeline,
    PipelineError, Transformer,
};
use serde_json::Value;
use support::{alternating_records, export_record, PanickingSink, RecordingSink};
use tempfile::TempDir;
use tokio::{io::AsyncWriteExt, sync::oneshot};

fn keep_filter() -> EntryFilter {
    EntryFilter::new(&["KEEP=yes".to_string()], &[]).unwrap()
}

#[tokio::test]
async fn delivers_filtered_entries_in_order_and_commits_the_last_one() {
    let dir = TempDir::new().unwrap();
    let cursor_path = dir.path().join("loglet.cursor");
    let (sink, mut accepted) = RecordingSink::new();

    // the writer stays open so only the shutdown signal ends the run
    let (mut writer, reader) = tokio::io::duplex(64 * 1024);
    writer.write_all(&alternating_records(10)).await.unwrap();

    let pipeline = Pipeline::builder(
        AttachedSource::new(reader),
        sink.clone(),
        CursorFile::new(&cursor_path),
    )
    .filter(keep_filter())
    .transformer(Transformer::new().default_fields(BTreeMap::from([(
        "env".to_string(),
        "test".to_string(),
    )])))
    .commit_interval(Duration::from_secs(3600))
    .build();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let run = tokio::spawn(pipeline.run(async {
        let _ = stop_rx.await;
    }));

    for _ in 0..5 {
        accepted.recv().await.unwrap();
    }
    stop_tx.send(()).unwrap();

    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("pipeline drains after shutdown")
        .unwrap()
        .unwrap();

    assert_eq!(sink.delivered_cursors(), ["c0", "c2", "c4", "c6", "c8"]);
    let messages: Vec<String> = sink
        .delivered()
        .iter()
        .map(|message| {
            let payload: BTreeMap<String, Value> = serde_json::from_slice(&message.payload).unwrap();
            assert_eq!(payload["env"], "test");
            payload["message"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(
        messages,
        ["message 0", "message 2", "message 4", "message 6", "message 8"]
    );

    let stored = CursorFile::new(&cursor_path).load().unwrap();
    assert_eq!(stored.unwrap().as_str(), "c8");
    drop(writer);
}

#[tokio::test]
async fn end_of_input_finishes_cleanly_and_commits() {
    let dir = TempDir::new().unwrap();
    let cursor_path = dir.path().join("loglet.cursor");
    let (sink, _accepted) = RecordingSink::new();

    let source = AttachedSource::new(std::io::Cursor::new(alternating_records(6)));
    let pipeline = Pipeline::builder(source, sink.clone(), CursorFile::new(&cursor_path))
        .filter(keep_filter())
        .build();

    tokio::time::timeout(Duration::from_secs(5), pipeline.run(std::future::pending()))
        .await
        .expect("pipeline ends with its input")
        .unwrap();

    assert_eq!(sink.delivered_cursors(), ["c0", "c2", "c4"]);
    assert_eq!(std::fs::read_to_string(&cursor_path).unwrap(), "c4");
}

#[tokio::test]
async fn cancellation_mid_stream_stops_every_stage() {
    let dir = TempDir::new().unwrap();
    let (sink, mut accepted) = RecordingSink::new();

    let (mut writer, reader) = tokio::io::duplex(64 * 1024);
    let pipeline = Pipeline::builder(
        AttachedSource::new(reader),
        sink.clone(),
        CursorFile::new(dir.path().join("loglet.cursor")),
    )
    .build();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let run = tokio::spawn(pipeline.run(async {
        let _ = stop_rx.await;
    }));

    let feeder = tokio::spawn(async move {
        for i in 0u64.. {
            let record = export_record(&format!("c{i}"), i, &[("MESSAGE", "tick")]);
            if writer.write_all(&record).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    });

    for _ in 0..3 {
        accepted.recv().await.unwrap();
    }
    stop_tx.send(()).unwrap();

    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("pipeline drains after shutdown")
        .unwrap()
        .unwrap();

    let delivered = sink.delivered_cursors();
    assert!(delivered.len() >= 3);
    let expected: Vec<String> = (0..delivered.len()).map(|i| format!("c{i}")).collect();
    assert_eq!(delivered, expected);

    let stored = CursorFile::new(dir.path().join("loglet.cursor")).load().unwrap();
    assert_eq!(stored.unwrap().as_str(), delivered.last().unwrap());

    // the follower dropped its end of the pipe
    tokio::time::timeout(Duration::from_secs(5), feeder)
        .await
        .expect("feeder observes the closed pipe")
        .unwrap();
}

#[tokio::test]
async fn resumes_with_the_saved_cursor_untouched_when_nothing_arrives() {
    let dir = TempDir::new().unwrap();
    let cursor_path = dir.path().join("loglet.cursor");
    std::fs::write(&cursor_path, "s=saved;i=9\n").unwrap();

    let pipeline = Pipeline::builder(
        AttachedSource::new(std::io::Cursor::new(Vec::new())),
        DiscardSink,
        CursorFile::new(&cursor_path),
    )
    .build();
    pipeline.run(std::future::pending()).await.unwrap();

    assert_eq!(std::fs::read_to_string(&cursor_path).unwrap(), "s=saved;i=9\n");
}

#[tokio::test]
async fn first_stage_error_is_returned() {
    let dir = TempDir::new().unwrap();
    let (sink, _accepted) = RecordingSink::new();

    let mut data = export_record("c0", 0, &[("MESSAGE", "fine")]);
    data.extend_from_slice(b"__CURSOR=c1\nMESSAGE=no timestamp\n\n");
    data.extend(export_record("c2", 2, &[("MESSAGE", "never sent")]));

    let pipeline = Pipeline::builder(
        AttachedSource::new(std::io::Cursor::new(data)),
        sink.clone(),
        CursorFile::new(dir.path().join("loglet.cursor")),
    )
    .build();

    let err = tokio::time::timeout(Duration::from_secs(5), pipeline.run(std::future::pending()))
        .await
        .expect("pipeline stops after a stage failure")
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Transform(loglet::TransformError::MissingTimestamp { .. })
    ));
    let delivered = sink.delivered_cursors();
    assert!(delivered.len() <= 1 && !delivered.contains(&"c2".to_string()));
}

#[tokio::test]
async fn decode_errors_fail_the_pipeline() {
    let dir = TempDir::new().unwrap();
    let mut data = export_record("c0", 0, &[]);
    data.extend_from_slice(b"MESSAGE=cursorless\n\n");

    let pipeline = Pipeline::builder(
        AttachedSource::new(std::io::Cursor::new(data)),
        DiscardSink,
        CursorFile::new(dir.path().join("loglet.cursor")),
    )
    .build();

    let err = pipeline.run(std::future::pending()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Follow(_)), "{err}");
}

#[tokio::test]
async fn stage_panics_are_reported_by_name() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::builder(
        AttachedSource::new(std::io::Cursor::new(alternating_records(2))),
        PanickingSink,
        CursorFile::new(dir.path().join("loglet.cursor")),
    )
    .build();

    let err = tokio::time::timeout(Duration::from_secs(5), pipeline.run(std::future::pending()))
        .await
        .expect("pipeline stops after a panic")
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::StagePanicked { stage: "publisher" }
    ));
}

#[tokio::test]
async fn unreadable_cursor_file_fails_before_starting() {
    let dir = TempDir::new().unwrap();
    let (sink, _accepted) = RecordingSink::new();
    let pipeline = Pipeline::builder(
        AttachedSource::new(std::io::Cursor::new(alternating_records(2))),
        sink.clone(),
        CursorFile::new(dir.path()),
    )
    .build();

    let err = pipeline.run(std::future::pending()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Cursor(_)));
    assert!(sink.delivered().is_empty());
}

#[test]
fn malformed_filters_fail_construction() {
    let config = LogletConfig {
        include: vec!["KEEP".to_string()],
        sink: loglet::SinkKind::Discard,
        input: loglet::InputMode::Stdin,
        ..LogletConfig::default()
    };
    assert!(matches!(
        Pipeline::from_config(&config),
        Err(PipelineError::Filter(_))
    ));
}

#[test]
fn invalid_config_fails_construction() {
    let config = LogletConfig {
        commit_interval_secs: 0,
        ..LogletConfig::default()
    };
    assert!(matches!(
        Pipeline::from_config(&config),
        Err(PipelineError::Config(_))
    ));
}

#[tokio::test]
async fn zero_commit_interval_does_not_break_the_committer() {
    let dir = TempDir::new().unwrap();
    let cursor_path = dir.path().join("loglet.cursor");
    let (sink, _accepted) = RecordingSink::new();

    let pipeline = Pipeline::builder(
        AttachedSource::new(std::io::Cursor::new(alternating_records(4))),
        sink.clone(),
        CursorFile::new(&cursor_path),
    )
    .commit_interval(Duration::ZERO)
    .build();

    tokio::time::timeout(Duration::from_secs(5), pipeline.run(std::future::pending()))
        .await
        .expect("pipeline ends with its input")
        .unwrap();

    assert_eq!(sink.delivered_cursors(), ["c0", "c1", "c2", "c3"]);
    assert_eq!(std::fs::read_to_string(&cursor_path).unwrap(), "c3");
}
