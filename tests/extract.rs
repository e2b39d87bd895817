//! End-to-end extractor behaviour against in-memory storage.

use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use s3untar::s3::MemoryStorage;
use s3untar::{ArchiveRef, ExtractError, Extractor, S3Event};

const BUCKET: &str = "uploads";

fn build_tar(files: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, path, content.as_slice())
            .unwrap();
    }
    builder.into_inner().unwrap()
}

fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

fn sample_files(count: usize) -> Vec<(String, Vec<u8>)> {
    (0..count)
        .map(|i| {
            let name = if i % 3 == 0 {
                format!("nested/dir{i}/file{i}.bin")
            } else {
                format!("file{i}.txt")
            };
            (name, format!("content of entry {i}\n").repeat(i + 1).into_bytes())
        })
        .collect()
}

fn names(files: &[(String, Vec<u8>)]) -> HashSet<String> {
    files.iter().map(|(n, _)| n.clone()).collect()
}

fn setup(key: &str, archive: Vec<u8>) -> MemoryStorage {
    let storage = MemoryStorage::new();
    storage.put(BUCKET, key, archive);
    storage
}

#[tokio::test]
async fn test_every_entry_lands_once() {
    let files = sample_files(25);
    let storage = setup("drops/batch.tar", build_tar(&files));

    let report = Extractor::new(Arc::new(storage.clone()))
        .run(&ArchiveRef::new(BUCKET, "drops/batch.tar"))
        .await
        .unwrap();

    assert!(report.fail.is_empty());
    assert_eq!(report.total(), files.len());
    let reported: HashSet<String> = report.success.iter().cloned().collect();
    assert_eq!(reported.len(), report.success.len(), "duplicate names reported");
    assert_eq!(reported, names(&files));
}

#[tokio::test]
async fn test_uploaded_bytes_match_archive() {
    let files = sample_files(10);
    let storage = setup("drops/batch.tar.gz", gzip(&build_tar(&files)));

    Extractor::new(Arc::new(storage.clone()))
        .run(&ArchiveRef::new(BUCKET, "drops/batch.tar.gz"))
        .await
        .unwrap();

    for (name, content) in &files {
        let uploaded = storage
            .get(BUCKET, &format!("drops/{name}"))
            .unwrap_or_else(|| panic!("missing drops/{name}"));
        assert_eq!(uploaded, Bytes::from(content.clone()));
    }
}

#[tokio::test]
async fn test_source_is_deleted() {
    let storage = setup("drops/batch.tar", build_tar(&sample_files(3)));

    let report = Extractor::new(Arc::new(storage.clone()))
        .run(&ArchiveRef::new(BUCKET, "drops/batch.tar"))
        .await
        .unwrap();

    assert!(report.source_deleted);
    assert!(!storage.contains(BUCKET, "drops/batch.tar"));
    assert_eq!(
        storage.delete_attempts(),
        vec![(BUCKET.to_string(), "drops/batch.tar".to_string())]
    );
}

#[tokio::test]
async fn test_empty_archive() {
    let storage = setup("empty.tar", build_tar(&[]));

    let report = Extractor::new(Arc::new(storage.clone()))
        .run(&ArchiveRef::new(BUCKET, "empty.tar"))
        .await
        .unwrap();

    assert!(report.success.is_empty());
    assert!(report.fail.is_empty());
    assert_eq!(
        serde_json::to_value(&report).unwrap(),
        serde_json::json!({ "success": [], "fail": [] })
    );
    assert!(!storage.contains(BUCKET, "empty.tar"));
}

#[tokio::test]
async fn test_one_failed_upload_is_isolated() {
    let files = sample_files(8);
    let storage = setup("in/batch.tar", build_tar(&files));
    storage.fail_upload(BUCKET, "in/file4.txt");

    let report = Extractor::new(Arc::new(storage.clone()))
        .run(&ArchiveRef::new(BUCKET, "in/batch.tar"))
        .await
        .unwrap();

    assert_eq!(report.fail, vec!["file4.txt"]);
    assert_eq!(report.success.len(), files.len() - 1);
    assert!(!report.success.contains(&"file4.txt".to_string()));
    assert!(report.source_deleted);
    assert!(!storage.contains(BUCKET, "in/batch.tar"));
}

#[tokio::test]
async fn test_missing_source_is_fatal() {
    let storage = MemoryStorage::new();

    let result = Extractor::new(Arc::new(storage.clone()))
        .run(&ArchiveRef::new(BUCKET, "nowhere.tar"))
        .await;

    assert!(matches!(result, Err(ExtractError::SourceMissing { .. })));
    assert!(storage.delete_attempts().is_empty());
    assert!(storage.keys(BUCKET).is_empty());
}

#[tokio::test]
async fn test_invalid_archive_is_fatal_and_keeps_source() {
    let storage = setup("junk.tar", vec![0x5a; 4096]);

    let result = Extractor::new(Arc::new(storage.clone()))
        .run(&ArchiveRef::new(BUCKET, "junk.tar"))
        .await;

    assert!(matches!(result, Err(ExtractError::InvalidArchive(_))));
    assert!(storage.contains(BUCKET, "junk.tar"));
    assert!(storage.delete_attempts().is_empty());
}

#[tokio::test]
async fn test_delete_failure_does_not_change_report() {
    let files = sample_files(4);
    let storage = setup("keep/batch.tar", build_tar(&files));
    storage.fail_delete(BUCKET, "keep/batch.tar");

    let report = Extractor::new(Arc::new(storage.clone()))
        .run(&ArchiveRef::new(BUCKET, "keep/batch.tar"))
        .await
        .unwrap();

    assert_eq!(report.success.len(), files.len());
    assert!(report.fail.is_empty());
    assert!(!report.source_deleted);
    assert!(storage.contains(BUCKET, "keep/batch.tar"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_size_does_not_change_outcome() {
    let files = sample_files(40);
    let expected = names(&files);

    for workers in [1, 3, 4, 16, 64] {
        let storage = setup("pool/batch.tar", build_tar(&files));
        storage.set_upload_delay(Duration::from_millis(2));
        storage.fail_upload(BUCKET, "pool/file1.txt");

        let report = Extractor::new(Arc::new(storage.clone()))
            .with_workers(workers)
            .run(&ArchiveRef::new(BUCKET, "pool/batch.tar"))
            .await
            .unwrap();

        let mut all: Vec<String> = report.success.iter().chain(&report.fail).cloned().collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), files.len(), "workers={workers}");
        assert_eq!(all.into_iter().collect::<HashSet<_>>(), expected);
        assert_eq!(report.fail, vec!["file1.txt"], "workers={workers}");
    }
}

#[tokio::test]
async fn test_archive_at_bucket_root() {
    let files = vec![("top.txt".to_string(), b"top".to_vec())];
    let storage = setup("root.tar", build_tar(&files));

    Extractor::new(Arc::new(storage.clone()))
        .run(&ArchiveRef::new(BUCKET, "root.tar"))
        .await
        .unwrap();

    assert_eq!(storage.keys(BUCKET), vec!["top.txt".to_string()]);
}

#[tokio::test]
async fn test_from_notification_payload() {
    let files = sample_files(2);
    let storage = setup("my drops/batch.tar", build_tar(&files));
    let payload = serde_json::json!({
        "Records": [{
            "eventSource": "aws:s3",
            "s3": {
                "bucket": { "name": BUCKET },
                "object": { "key": "my+drops/batch.tar" }
            }
        }]
    });

    let archive = S3Event::from_value(payload).unwrap().archive_ref().unwrap();
    let report = Extractor::new(Arc::new(storage.clone()))
        .run(&archive)
        .await
        .unwrap();

    assert_eq!(report.success.len(), 2);
    assert!(storage.contains(BUCKET, "my drops/file1.txt"));
}

#[tokio::test]
async fn test_links_are_reported() {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(5);
    header.set_mode(0o644);
    builder.append_data(&mut header, "data/orig.txt", &b"hello"[..]).unwrap();

    for (kind, path, target) in [
        (tar::EntryType::Link, "data/copy.txt", "data/orig.txt"),
        (tar::EntryType::Symlink, "data/alias.txt", "orig.txt"),
        (tar::EntryType::Symlink, "latest/orig.txt", "../data/orig.txt"),
        (tar::EntryType::Symlink, "data/dangling.txt", "gone.txt"),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(kind);
        header.set_size(0);
        header.set_mode(0o777);
        builder.append_link(&mut header, path, target).unwrap();
    }
    let storage = setup("links/batch.tar", builder.into_inner().unwrap());

    let report = Extractor::new(Arc::new(storage.clone()))
        .run(&ArchiveRef::new(BUCKET, "links/batch.tar"))
        .await
        .unwrap();

    let mut success = report.success.clone();
    success.sort();
    assert_eq!(
        success,
        vec!["data/alias.txt", "data/copy.txt", "data/orig.txt", "latest/orig.txt"]
    );
    assert_eq!(report.fail, vec!["data/dangling.txt"]);
    assert_eq!(report.total(), 5);

    for key in [
        "links/data/orig.txt",
        "links/data/copy.txt",
        "links/data/alias.txt",
        "links/latest/orig.txt",
    ] {
        assert_eq!(storage.get(BUCKET, key).unwrap().as_ref(), b"hello", "{key}");
    }
    assert!(!storage.contains(BUCKET, "links/data/dangling.txt"));
    assert!(report.source_deleted);
}
