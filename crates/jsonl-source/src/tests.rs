use super::*;
use futures::TryStreamExt;
use serde_json::json;
use std::io::Write;
use sync_core::{ChangeEvent, EventKind};

fn line(value: serde_json::Value) -> String {
    format!("{value}\n")
}

fn write_log(dir: &tempfile::TempDir, lines: &[String]) -> JsonlConfig {
    let path = dir.path().join("changes.jsonl");
    std::fs::write(&path, lines.concat()).unwrap();
    let mut config = JsonlConfig::new(path);
    config.follow = false;
    config
}

async fn collect(source: JsonlSource) -> Vec<ChangeEvent> {
    let mut stream = Box::new(source).changes().await.unwrap();
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event.unwrap());
    }
    events
}

#[tokio::test]
async fn test_reads_changes_with_offsets() {
    let dir = tempfile::tempdir().unwrap();
    let first = line(json!({"table": "users", "kind": "create", "data": {"id": 1}}));
    let second = line(json!({"table": "users", "kind": "delete", "data": {"id": 1}}));
    let config = write_log(&dir, &[first.clone(), second.clone()]);

    let source = JsonlSource::new(config, None, vec!["users".to_string()]).unwrap();
    let events = collect(source).await;

    assert_eq!(events.len(), 2);
    let ChangeEvent::Data(create) = &events[0] else {
        panic!("expected data event");
    };
    assert_eq!(create.kind, EventKind::Create);
    assert_eq!(create.table, "users");
    assert_eq!(create.data["id"], json!(1));
    assert_eq!(offset_of(&create.progress).unwrap(), first.len() as u64);
    assert_eq!(
        offset_of(events[1].progress()).unwrap(),
        (first.len() + second.len()) as u64
    );
}

#[tokio::test]
async fn test_resumes_after_marker() {
    let dir = tempfile::tempdir().unwrap();
    let first = line(json!({"table": "users", "kind": "create", "data": {"id": 1}}));
    let second = line(json!({"table": "users", "kind": "update", "data": {"id": 1, "n": 2}}));
    let config = write_log(&dir, &[first.clone(), second]);

    let marker = marker_at(first.len() as u64);
    let source = JsonlSource::new(config, Some(&marker), vec!["users".to_string()]).unwrap();
    let events = collect(source).await;

    assert_eq!(events.len(), 1);
    let ChangeEvent::Data(update) = &events[0] else {
        panic!("expected data event");
    };
    assert_eq!(update.kind, EventKind::Update);
}

#[tokio::test]
async fn test_other_tables_become_progress() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_log(
        &dir,
        &[
            line(json!({"table": "orders", "kind": "create", "data": {"id": 7}})),
            "\n".to_string(),
            line(json!({"kind": "progress"})),
        ],
    );

    let source = JsonlSource::new(config, None, vec!["users".to_string()]).unwrap();
    let events = collect(source).await;

    assert_eq!(events.len(), 2);
    assert!(events
        .iter()
        .all(|event| matches!(event, ChangeEvent::Progress(_))));
}

#[tokio::test]
async fn test_invalid_line_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_log(&dir, &["not json\n".to_string()]);

    let source = JsonlSource::new(config, None, Vec::<String>::new()).unwrap();
    let mut stream = Box::new(source).changes().await.unwrap();
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(format!("{err:#}").contains("Invalid change record"));
}

#[tokio::test]
async fn test_offset_past_end_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_log(&dir, &[line(json!({"kind": "progress"}))]);

    let marker = marker_at(10_000);
    let source = JsonlSource::new(config, Some(&marker), Vec::<String>::new()).unwrap();
    let err = Box::new(source).changes().await.err().unwrap();
    assert!(err.to_string().contains("shorter than stored offset"));
}

#[tokio::test]
async fn test_follow_waits_for_complete_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("changes.jsonl");
    let record = line(json!({"table": "users", "kind": "create", "data": {"id": 3}}));
    let (head, tail) = record.split_at(10);
    std::fs::write(&path, head).unwrap();

    let mut config = JsonlConfig::new(&path);
    config.poll_interval_ms = 10;
    let source = JsonlSource::new(config, None, vec!["users".to_string()]).unwrap();
    let mut stream = Box::new(source).changes().await.unwrap();

    let writer = tokio::spawn({
        let path = path.clone();
        let tail = tail.to_string();
        async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
            file.write_all(tail.as_bytes()).unwrap();
        }
    });

    let event = stream.next().await.unwrap().unwrap();
    writer.await.unwrap();
    assert_eq!(offset_of(event.progress()).unwrap(), record.len() as u64);
}

#[tokio::test]
async fn test_full_data_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let snapshots = dir.path().join("snapshots");
    std::fs::create_dir(&snapshots).unwrap();
    let docs: String = (1..=5).map(|i| line(json!({"id": i}))).collect();
    std::fs::write(snapshots.join("users.jsonl"), docs).unwrap();

    let mut config = JsonlConfig::new(dir.path().join("changes.jsonl"));
    config.snapshot_dir = Some(snapshots);
    let source = JsonlSource::new(config, None, vec!["users".to_string()]).unwrap();

    let chunks: Vec<_> = source.full_data("users", 2).try_collect().await.unwrap();
    let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 2, 1]);

    let missing: Vec<_> = source.full_data("orders", 2).try_collect().await.unwrap();
    assert!(missing.is_empty());
}

#[tokio::test]
async fn test_full_data_without_snapshot_dir() {
    let config = JsonlConfig::new("/nonexistent/changes.jsonl");
    let source = JsonlSource::new(config, None, Vec::<String>::new()).unwrap();
    let result: anyhow::Result<Vec<_>> = source.full_data("users", 10).try_collect().await;
    assert!(result.unwrap_err().to_string().contains("snapshot_dir"));
}

#[test]
fn test_offset_of_rejects_foreign_marker() {
    let marker = checkpoint::ProgressMarker::new(json!({"lsn": "0/16B3748"}));
    assert!(offset_of(&marker).is_err());
}
