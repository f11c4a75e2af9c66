use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::write;
use tempfile::NamedTempFile;

/// Config pointing at an upstream nothing listens on, with a throwaway store.
fn create_unreachable_config() -> NamedTempFile {
    let config = NamedTempFile::new().expect("Creating temp config file failed");
    write(
        config.path(),
        b"source:\n  type: hacker_news\n  base_url: \"http://127.0.0.1:9/v0\"\nstore:\n  type: memory\npipeline:\n  concurrency: 2\n  root_limit: 3\n",
    )
    .expect("Writing temp config failed");
    config
}

#[test]
fn help_lists_ingest_subcommand() {
    let mut cmd = Command::cargo_bin("tree-ingest").expect("Binary exists");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ingest"));
}

#[test]
fn ingest_fails_for_missing_config() {
    let mut cmd = Command::cargo_bin("tree-ingest").expect("Binary exists");
    cmd.arg("ingest")
        .arg("--config")
        .arg("/definitely/not/here.yaml")
        .env_remove("MAX_CONCURRENCY")
        .env_remove("ROOT_LIMIT")
        .assert()
        .failure();
}

#[test]
fn ingest_fails_when_root_set_cannot_be_fetched() {
    let config = create_unreachable_config();
    let mut cmd = Command::cargo_bin("tree-ingest").expect("Binary exists");

    cmd.arg("ingest")
        .arg("--config")
        .arg(config.path())
        .env_remove("MAX_CONCURRENCY")
        .env_remove("ROOT_LIMIT")
        .assert()
        .failure()
        .stderr(predicate::str::contains("root set"));
}

#[test]
fn ingest_rejects_zero_concurrency_flag() {
    let config = create_unreachable_config();
    let mut cmd = Command::cargo_bin("tree-ingest").expect("Binary exists");

    cmd.arg("ingest")
        .arg("--config")
        .arg(config.path())
        .arg("--concurrency")
        .arg("0")
        .env_remove("MAX_CONCURRENCY")
        .env_remove("ROOT_LIMIT")
        .assert()
        .failure();
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut msg = String::new();
        use std::fmt::Write as FmtWrite;
        let _ = write!(&mut msg, "{:?}", event);
        self.events.lock().unwrap().push(msg);
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use tree_ingest::cli::{run, Cli, Commands};

    // A dummy path is enough: the event fires before the config is read.
    let cli = Cli {
        command: Commands::Ingest {
            config: std::path::PathBuf::from("dummy.yaml"),
            concurrency: None,
            limit: None,
        },
    };

    let result = run(cli).await;
    assert!(result.is_err(), "dummy config must not load");

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
