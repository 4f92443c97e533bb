//! Upload, validate and relocate against a real directory

use bytes::Bytes;
use hyper::StatusCode;
use std::sync::Arc;
use tempfile::TempDir;
use upload_storage::upload::UploadResponse;
use upload_storage::{
    AttachmentBinding, AttributeValue, Config, ExistenceValidator, HttpServer, LocalStorage,
    Storage, UploadRecord,
};

const BOUNDARY: &str = "e2e-boundary";

struct Post {
    cover: Option<String>,
}

impl UploadRecord for Post {
    fn attribute_value(&self, attribute: &str) -> AttributeValue {
        match attribute {
            "cover" => self.cover.clone().into(),
            _ => AttributeValue::Empty,
        }
    }
}

fn png_form(filename: &str) -> Bytes {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: image/png\r\n\r\n",
            filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"\x89PNG\r\n\x1a\n");
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    Bytes::from(body)
}

async fn upload(server: &HttpServer<LocalStorage>, filename: &str) -> String {
    let (status, response) = server
        .process_upload(
            Some(&format!("multipart/form-data; boundary={}", BOUNDARY)),
            png_form(filename),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    match response {
        UploadResponse::Success { name, .. } => name,
        UploadResponse::Failure { error } => panic!("upload failed: {}", error),
    }
}

#[tokio::test]
async fn test_upload_then_record_lifecycle() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        storage_dir: dir.path().to_path_buf(),
        ..Config::default()
    };
    let storage = Arc::new(LocalStorage::new(&config.storage_dir).await.unwrap());
    let server =
        HttpServer::from_config(Arc::clone(&storage), &config, "127.0.0.1:0".parse().unwrap())
            .unwrap();

    let first = upload(&server, "cover.png").await;
    assert!(dir.path().join("temp").join(&first).is_file());

    let validator = ExistenceValidator::new(
        Arc::clone(&storage),
        vec![config.temp_dir.as_str().into(), config.upload_dir.as_str().into()],
    );
    let issues = validator
        .validate("cover", &serde_json::json!(first))
        .await
        .unwrap();
    assert!(issues.is_empty());

    let binding = AttachmentBinding::new(Arc::clone(&storage), "cover", "/temp")
        .unwrap()
        .with_upload_dir("/upload")
        .unwrap();

    // insert
    let created = Post {
        cover: Some(first.clone()),
    };
    let report = binding.after_insert(&created).await.unwrap();
    assert!(report.is_complete());
    assert!(!dir.path().join("temp").join(&first).exists());
    assert!(dir.path().join("upload").join(&first).is_file());

    // update to a new upload
    let second = upload(&server, "cover-2.png").await;
    let updated = Post {
        cover: Some(second.clone()),
    };
    let report = binding.after_update(&created, &updated).await.unwrap();
    assert!(report.is_complete());
    assert!(!dir.path().join("upload").join(&first).exists());
    assert!(dir.path().join("upload").join(&second).is_file());

    // delete twice
    binding.before_delete(&updated).await.unwrap();
    let again = binding.before_delete(&updated).await.unwrap();
    assert!(again.is_complete());
    assert!(!storage.exists(&format!("/upload/{}", second)).await.unwrap());
}
