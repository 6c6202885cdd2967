//! End-to-end chain runs with in-memory collaborators.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use exifpipe_core::metadata::{MapExtractor, RawTags, RawValue};
use exifpipe_core::output::SharedBuffer;
use exifpipe_core::stages::{DbStoreStage, InputStage, OutputStage};
use exifpipe_core::store::MemoryStore;
use exifpipe_core::{Chain, Config, ExifPipeError, PipelineError, Registry};
use serde_json::json;

fn tags(pairs: &[(&str, &str)]) -> RawTags {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), RawValue::from(*value)))
        .collect()
}

fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"not really a jpeg").unwrap();
    path
}

fn registry(extractor: MapExtractor, buffer: &SharedBuffer, store: &Arc<MemoryStore>) -> Registry {
    let mut registry = Registry::builtin();
    let factory = extractor.into_factory();
    registry.register("input", move || {
        Box::new(InputStage::with_extractor(Arc::clone(&factory)))
    });
    let buffer = buffer.clone();
    registry.register("output", move || Box::new(OutputStage::with_sink(buffer.clone())));
    let store = Arc::clone(store);
    registry.register("dbstore", move || {
        Box::new(DbStoreStage::with_store(store.clone()))
    });
    registry
}

fn config(root: &Path, edit: impl FnOnce(&mut Config)) -> Arc<Config> {
    let mut config = Config::default();
    config.input.roots = vec![root.to_path_buf()];
    config.input.timezone = "UTC".to_string();
    edit(&mut config);
    Arc::new(config)
}

fn chain(stages: &[&str]) -> Vec<String> {
    stages.iter().map(|s| s.to_string()).collect()
}

/// Canon a.jpg plus an untagged b.jpg.
fn two_photos(dir: &Path) -> MapExtractor {
    let a = touch(dir, "a.jpg");
    let b = touch(dir, "b.jpg");
    MapExtractor::new()
        .with_file(
            a,
            tags(&[
                ("Make", "Canon"),
                ("Model", "5D"),
                ("DateTimeOriginal", "2020:01:01 10:00:00"),
            ]),
        )
        .with_file(b, RawTags::new())
}

#[tokio::test]
async fn csv_output_has_one_row_per_file() {
    let dir = tempfile::tempdir().unwrap();
    let buffer = SharedBuffer::new();
    let store = Arc::new(MemoryStore::new());
    let registry = registry(two_photos(dir.path()), &buffer, &store);
    let config = config(dir.path(), |c| c.output.cols = vec!["Make".into(), "Model".into()]);

    let report = Chain::assemble("default", &chain(&["input", "output"]), &registry, config)
        .unwrap()
        .run()
        .await
        .unwrap();

    let output = buffer.contents();
    let mut lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.remove(0), "Make,Model");
    lines.sort();
    assert_eq!(lines, vec![",", "Canon,5D"]);

    let stats = report.stats.unwrap();
    assert_eq!(stats.files_seen, 2);
    assert_eq!(stats.succeeded + stats.failed, stats.files_seen);
}

#[tokio::test]
async fn filter_passes_exactly_one_record() {
    let dir = tempfile::tempdir().unwrap();
    let buffer = SharedBuffer::new();
    let store = Arc::new(MemoryStore::new());
    let registry = registry(two_photos(dir.path()), &buffer, &store);
    let config = config(dir.path(), |c| {
        c.filter.expr = r#"@Make == "Canon""#.into();
        c.output.cols = vec!["Make".into(), "%[Model] ([Lens])".into()];
        c.output.missing_tag = "placeholder".into();
    });

    Chain::assemble(
        "scan",
        &chain(&["input", "filter", "output"]),
        &registry,
        config,
    )
    .unwrap()
    .run()
    .await
    .unwrap();

    assert_eq!(buffer.contents(), "Make,%[Model] ([Lens])\nCanon,5D ([Lens])\n");
}

#[tokio::test]
async fn same_dedup_key_upserts_one_document() {
    let dir = tempfile::tempdir().unwrap();
    let identity = [
        ("ImageUniqueID", "0123456789abcdef"),
        ("FileName", "IMG_0001.JPG"),
        ("SerialNumber", "4711"),
        ("DateTimeOriginal", "2020:01:01 10:00:00"),
    ];
    let mut first = tags(&identity);
    first.insert("Make".into(), RawValue::from("Canon"));
    let mut second = tags(&identity);
    second.insert("Make".into(), RawValue::from("Nikon"));
    let extractor = MapExtractor::new()
        .with_file(touch(dir.path(), "a.jpg"), first)
        .with_file(touch(dir.path(), "b.jpg"), second);

    let buffer = SharedBuffer::new();
    let store = Arc::new(MemoryStore::new());
    let registry = registry(extractor, &buffer, &store);
    let config = config(dir.path(), |c| c.throttle.max_workers = 1);

    Chain::assemble("store", &chain(&["input", "dbstore"]), &registry, config)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(store.len(), 1);
    let docs = exifpipe_core::DocumentStore::find(store.as_ref(), &[]).unwrap();
    assert_eq!(docs[0]["Make"], json!("Nikon"));
}

#[tokio::test]
async fn stored_documents_can_be_queried_back() {
    let dir = tempfile::tempdir().unwrap();
    let photos = dir.path().join("photos");
    std::fs::create_dir(&photos).unwrap();
    let extractor = two_photos(&photos);
    let store_dir = dir.path().join("store");

    let mut registry = Registry::builtin();
    let factory = extractor.into_factory();
    registry.register("input", move || {
        Box::new(InputStage::with_extractor(Arc::clone(&factory)))
    });
    let buffer = SharedBuffer::new();
    let sink = buffer.clone();
    registry.register("output", move || Box::new(OutputStage::with_sink(sink.clone())));

    let config = config(&photos, |c| {
        c.store.path = store_dir.clone();
        c.output.cols = vec!["Make".into()];
        c.output.sort = Some("Make".into());
    });

    Chain::from_config("store", &registry, Arc::clone(&config))
        .unwrap()
        .run()
        .await
        .unwrap();
    Chain::from_config("query", &registry, config)
        .unwrap()
        .run()
        .await
        .unwrap();

    let output = buffer.contents();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(&lines[..2], &["Make", "Canon"]);
}

#[tokio::test]
async fn exit_on_error_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "broken.jpg");
    let buffer = SharedBuffer::new();
    let store = Arc::new(MemoryStore::new());
    let registry = registry(MapExtractor::new(), &buffer, &store);
    let config = config(dir.path(), |c| c.input.exit_on_error = true);

    let err = Chain::assemble("default", &chain(&["input", "output"]), &registry, config)
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ExifPipeError::Pipeline(PipelineError::Aborted(_))
    ));
    assert_eq!(buffer.contents(), "FileName\n");
}
