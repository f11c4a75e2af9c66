use serial_test::serial;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

use tree_ingest::hacker_news::StoryList;
use tree_ingest::load_config::{load_config, SourceSection, StoreSection};
use tree_ingest_core::config::ChangeDetection;

fn config_file(yaml: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), yaml).expect("write config");
    file
}

fn clear_env() {
    env::remove_var("MAX_CONCURRENCY");
    env::remove_var("ROOT_LIMIT");
}

#[test]
#[serial]
fn test_load_config_full_file() {
    clear_env();
    let file = config_file(
        r#"
source:
  type: hacker_news
  base_url: "http://localhost:8080/v0/"
  list: best
store:
  type: json_dir
  path: ./tmp/hn
  collection: best-of
pipeline:
  concurrency: 8
  root_limit: 30
  change_detection: structure
"#,
    );

    let config = load_config(file.path()).expect("Config should load");

    let SourceSection::HackerNews(hn) = &config.source;
    assert_eq!(hn.list, StoryList::Best);
    assert_eq!(hn.base_url.as_deref(), Some("http://localhost:8080/v0/"));
    assert!(matches!(config.store, StoreSection::JsonDir(_)));
    assert_eq!(
        config.collection_dir(),
        Some(PathBuf::from("./tmp/hn/best-of"))
    );
    assert_eq!(config.pipeline.concurrency, 8);
    assert_eq!(config.pipeline.root_limit, 30);
    assert_eq!(config.pipeline.change_detection, ChangeDetection::Structure);
}

#[test]
#[serial]
fn test_load_config_applies_defaults() {
    clear_env();
    let file = config_file(
        r#"
source:
  type: hacker_news
store:
  type: json_dir
  path: ./data
"#,
    );

    let config = load_config(file.path()).expect("Config should load");

    let SourceSection::HackerNews(hn) = &config.source;
    assert_eq!(hn.list, StoryList::Top);
    assert!(hn.base_url.is_none());
    assert_eq!(config.collection_dir(), Some(PathBuf::from("./data/top")));
    assert_eq!(config.pipeline.concurrency, 5);
    assert_eq!(config.pipeline.root_limit, 100);
    assert_eq!(
        config.pipeline.change_detection,
        ChangeDetection::DescendantCount
    );
}

#[test]
#[serial]
fn test_load_config_memory_store_has_no_directory() {
    clear_env();
    let file = config_file("source:\n  type: hacker_news\n  list: ask\nstore:\n  type: memory\n");

    let config = load_config(file.path()).expect("Config should load");

    assert!(matches!(config.store, StoreSection::Memory));
    assert!(config.collection_dir().is_none());
}

#[test]
#[serial]
fn test_env_overrides_pipeline_section() {
    clear_env();
    let file = config_file(
        "source:\n  type: hacker_news\nstore:\n  type: memory\npipeline:\n  concurrency: 2\n",
    );
    env::set_var("MAX_CONCURRENCY", "12");
    env::set_var("ROOT_LIMIT", "40");

    let config = load_config(file.path()).expect("Config should load");
    clear_env();

    assert_eq!(config.pipeline.concurrency, 12);
    assert_eq!(config.pipeline.root_limit, 40);
}

#[test]
#[serial]
fn test_invalid_env_override_is_an_error() {
    clear_env();
    let file = config_file("source:\n  type: hacker_news\nstore:\n  type: memory\n");
    env::set_var("MAX_CONCURRENCY", "lots");

    let err = load_config(file.path()).unwrap_err();
    clear_env();

    assert!(
        format!("{err:#}").contains("MAX_CONCURRENCY"),
        "error should name the variable, got: {err:#}"
    );
}

#[test]
#[serial]
fn test_zero_concurrency_is_rejected() {
    clear_env();
    let file = config_file(
        "source:\n  type: hacker_news\nstore:\n  type: memory\npipeline:\n  concurrency: 0\n",
    );

    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("concurrency"), "got: {err}");
}

#[test]
#[serial]
fn test_load_config_errors_for_invalid_file() {
    clear_env();
    let file = config_file("not-yaml: [:::");

    let err = load_config(file.path()).unwrap_err();
    let msg = err.to_string();
    assert!(
        msg.contains("parse") || msg.contains("YAML"),
        "Parse error expected, got: {msg}"
    );
}

#[test]
#[serial]
fn test_load_config_errors_for_unknown_source_type() {
    clear_env();
    let file = config_file("source:\n  type: reddit\nstore:\n  type: memory\n");

    assert!(load_config(file.path()).is_err());
}

#[test]
#[serial]
fn test_load_config_errors_for_missing_file() {
    clear_env();
    let err = load_config("/definitely/not/here.yaml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
