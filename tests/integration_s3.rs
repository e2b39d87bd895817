//! Round trip against LocalStack.
//!
//! Run with: cargo test --test integration_s3 -- --ignored --test-threads=1
//! LocalStack is expected on AWS_ENDPOINT_URL (default http://localhost:4566).

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::sync::Arc;

use s3untar::config::StorageConfig;
use s3untar::s3::S3Client;
use s3untar::{ArchiveRef, ExtractError, Extractor};

/// Test bucket name
const TEST_BUCKET: &str = "s3untar-test";

fn endpoint_url() -> String {
    std::env::var("AWS_ENDPOINT_URL").unwrap_or_else(|_| "http://localhost:4566".to_string())
}

/// Helper function to create a raw SDK client pointing to localstack
async fn create_localstack_client() -> Client {
    let config = aws_config::defaults(BehaviorVersion::latest())
        .region("us-east-1")
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&config)
        .endpoint_url(endpoint_url())
        .force_path_style(true) // Required for LocalStack
        .build();

    Client::from_conf(s3_config)
}

async fn create_extractor() -> Extractor {
    let storage = S3Client::new(&StorageConfig {
        endpoint_url: Some(endpoint_url()),
        force_path_style: true,
        region: Some("us-east-1".to_string()),
    })
    .await;
    Extractor::new(Arc::new(storage))
}

async fn ensure_bucket(client: &Client) {
    let resp = client.list_buckets().send().await;
    assert!(
        resp.is_ok(),
        "Failed to connect to Localstack S3. Is it running on localhost:4566?"
    );
    // Already-exists errors are fine
    let _ = client.create_bucket().bucket(TEST_BUCKET).send().await;
}

/// Create a tar.gz archive with a root file and a nested one
fn create_test_targz() -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tar::Builder;

    let mut archive_data = Vec::new();
    {
        let encoder = GzEncoder::new(&mut archive_data, Compression::default());
        let mut tar = Builder::new(encoder);

        let file_content = b"Content inside archive\n";
        let mut header = tar::Header::new_gnu();
        header.set_path("archive_file.txt").unwrap();
        header.set_size(file_content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        tar.append(&header, &file_content[..]).unwrap();

        let nested_content = b"Nested file content\n";
        let mut nested_header = tar::Header::new_gnu();
        nested_header.set_path("app/nested.txt").unwrap();
        nested_header.set_size(nested_content.len() as u64);
        nested_header.set_mode(0o644);
        nested_header.set_cksum();
        tar.append(&nested_header, &nested_content[..]).unwrap();

        tar.into_inner().unwrap().finish().unwrap();
    }

    archive_data
}

async fn read_object(client: &Client, key: &str) -> Vec<u8> {
    client
        .get_object()
        .bucket(TEST_BUCKET)
        .key(key)
        .send()
        .await
        .unwrap_or_else(|e| panic!("missing {key}: {e}"))
        .body
        .collect()
        .await
        .unwrap()
        .into_bytes()
        .to_vec()
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored --test-threads=1
async fn test_extract_targz_round_trip() {
    let client = create_localstack_client().await;
    ensure_bucket(&client).await;

    client
        .put_object()
        .bucket(TEST_BUCKET)
        .key("incoming/bundle.tar.gz")
        .body(Bytes::from(create_test_targz()).into())
        .send()
        .await
        .expect("Failed to upload bundle.tar.gz");

    let report = create_extractor()
        .await
        .run(&ArchiveRef::new(TEST_BUCKET, "incoming/bundle.tar.gz"))
        .await
        .expect("extraction failed");

    assert!(report.fail.is_empty());
    assert_eq!(report.success.len(), 2);
    assert!(report.source_deleted);

    assert_eq!(
        read_object(&client, "incoming/archive_file.txt").await,
        b"Content inside archive\n"
    );
    assert_eq!(
        read_object(&client, "incoming/app/nested.txt").await,
        b"Nested file content\n"
    );

    let source = client
        .head_object()
        .bucket(TEST_BUCKET)
        .key("incoming/bundle.tar.gz")
        .send()
        .await;
    assert!(source.is_err(), "source archive should be deleted");
}

#[tokio::test]
#[ignore]
async fn test_missing_source_is_fatal() {
    let client = create_localstack_client().await;
    ensure_bucket(&client).await;

    let result = create_extractor()
        .await
        .run(&ArchiveRef::new(TEST_BUCKET, "incoming/does-not-exist.tar"))
        .await;

    assert!(matches!(result, Err(ExtractError::SourceMissing { .. })));
}
