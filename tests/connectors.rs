//! Connector validation and construction without network access

use vfs_adapter::config::ConnectionConfig;
use vfs_adapter::connector::ConnectionFactory;
use vfs_adapter::VfsError;

fn missing_setting(err: VfsError) -> String {
    match err {
        VfsError::MissingRequiredSetting { setting, .. } => setting,
        other => panic!("expected MissingRequiredSetting, got {:?}", other),
    }
}

#[tokio::test]
async fn required_settings_are_named() {
    let factory = ConnectionFactory::with_builtin();
    let cases = [
        (ConnectionConfig::new("zip"), "zip", "path"),
        (ConnectionConfig::new("s3"), "s3", "bucket"),
        (ConnectionConfig::new("gcs"), "gcs", "project_id"),
        (
            ConnectionConfig::new("gcs").with_setting("project_id", "proj"),
            "gcs",
            "bucket",
        ),
        (ConnectionConfig::new("webdav"), "webdav", "base_uri"),
    ];

    for (block, technology, expected) in cases {
        let err = factory.resolve(technology, &block).await.err().unwrap();
        assert_eq!(missing_setting(err), expected, "technology {}", technology);
    }
}

#[tokio::test]
async fn missing_gcs_key_file_is_not_leaked_as_adapter() {
    let factory = ConnectionFactory::with_builtin();
    let block = ConnectionConfig::new("gcs")
        .with_setting("projectId", "proj")
        .with_setting("bucket", "media")
        .with_setting("keyFile", "/nonexistent/hmac.json");

    let err = factory.resolve("gcs", &block).await.err().unwrap();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn s3_builds_without_network() {
    let factory = ConnectionFactory::with_builtin();
    let block = ConnectionConfig::new("s3")
        .with_setting("bucket", "media")
        .with_setting("region", "eu-west-1")
        .with_setting("endpoint", "http://127.0.0.1:9")
        .with_setting("force_path_style", true)
        .with_setting("key", "test")
        .with_setting("secret", "test")
        .with_setting("prefix", "uploads");

    let adapter = factory.resolve("s3", &block).await.unwrap();
    assert_eq!(adapter.name(), "s3");
}

#[tokio::test]
async fn gcs_builds_from_hmac_key_file() {
    let dir = tempfile::tempdir().unwrap();
    let key = dir.path().join("hmac.json");
    std::fs::write(&key, r#"{"access_id":"GOOG1ID","secret":"s3cr3t"}"#).unwrap();

    let factory = ConnectionFactory::with_builtin();
    let block = ConnectionConfig::new("gcs")
        .with_setting("project_id", "proj")
        .with_setting("bucket", "media")
        .with_setting("key_file", key.to_str().unwrap())
        .with_setting("api_uri", "http://127.0.0.1:9");

    let adapter = factory.resolve("gcs", &block).await.unwrap();
    assert_eq!(adapter.name(), "gcs");
}

#[tokio::test]
async fn webdav_builds_without_network() {
    let factory = ConnectionFactory::with_builtin();
    let block = ConnectionConfig::new("webdav")
        .with_setting("baseUri", "http://127.0.0.1:9/dav/")
        .with_setting("userName", "alice")
        .with_setting("password", "secret")
        .with_setting("timeout", 5)
        .with_setting("prefix", "team");

    let adapter = factory.resolve("webdav", &block).await.unwrap();
    assert_eq!(adapter.name(), "webdav");
}

#[tokio::test]
async fn zip_corrupt_archive_is_backend_failure() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("broken.zip");
    std::fs::write(&archive, b"PK but not really").unwrap();

    let factory = ConnectionFactory::with_builtin();
    let block = ConnectionConfig::new("zip").with_setting("path", archive.to_str().unwrap());
    assert!(matches!(
        factory.resolve("zip", &block).await,
        Err(VfsError::Backend(_))
    ));
}

#[tokio::test]
async fn local_root_is_optional() {
    let factory = ConnectionFactory::with_builtin();
    let adapter = factory
        .resolve("local", &ConnectionConfig::new("local"))
        .await
        .unwrap();
    assert_eq!(adapter.name(), "local");
}

#[tokio::test]
async fn gcs_service_account_key_file_is_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let key = dir.path().join("service-account.json");
    std::fs::write(
        &key,
        r#"{"type":"service_account","project_id":"proj","client_email":"svc@proj.iam.gserviceaccount.com"}"#,
    )
    .unwrap();

    let factory = ConnectionFactory::with_builtin();
    let block = ConnectionConfig::new("gcs")
        .with_setting("project_id", "proj")
        .with_setting("bucket", "media")
        .with_setting("keyFile", key.to_str().unwrap());

    assert!(matches!(
        factory.resolve("gcs", &block).await,
        Err(VfsError::UnsupportedOperation { ref adapter, .. }) if adapter == "gcs"
    ));
}
