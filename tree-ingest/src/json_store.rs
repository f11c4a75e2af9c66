//! Document store backed by a directory of JSON files, one file per record.
//!
//! Layout: `{dir}/{id}.json`, pretty-printed. Writes go to a temp file in the same
//! directory and are renamed into place, so a reader never sees half a document.
//! Partial updates rewrite `descendants` and `children` on the raw JSON object and
//! leave every other key exactly as found, including keys this tool never wrote.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use tree_ingest_core::contract::{ItemId, Record, RecordUpdate, Store, Tree};
use tree_ingest_core::error::StoreError;

pub struct JsonDirStore {
    dir: PathBuf,
    closed: AtomicBool,
}

impl JsonDirStore {
    /// Open (creating if needed) the collection directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        let meta = fs::metadata(&dir).await?;
        if !meta.is_dir() {
            return Err(StoreError::Other(format!(
                "{} exists and is not a directory",
                dir.display()
            )));
        }
        info!(path = %dir.display(), "Opened JSON document store");
        Ok(Self {
            dir,
            closed: AtomicBool::new(false),
        })
    }

    pub fn record_path(&self, id: ItemId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    async fn read_document(&self, id: ItemId) -> Result<Option<Map<String, Value>>, StoreError> {
        match fs::read(self.record_path(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_document(&self, id: ItemId, body: Vec<u8>) -> Result<(), StoreError> {
        let tmp = self.dir.join(format!(".{id}.{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, body).await?;
        if let Err(e) = fs::rename(&tmp, self.record_path(id)).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl Store for JsonDirStore {
    async fn find_by_key(&self, id: ItemId) -> Result<Option<Record>, StoreError> {
        self.ensure_open()?;
        match self.read_document(id).await? {
            Some(doc) => Ok(Some(serde_json::from_value(Value::Object(doc))?)),
            None => Ok(None),
        }
    }

    async fn insert_record(&self, tree: &Tree) -> Result<(), StoreError> {
        self.ensure_open()?;
        let id = tree.id();
        if fs::try_exists(self.record_path(id)).await? {
            return Err(StoreError::Other(format!("record {id} already exists")));
        }
        self.write_document(id, serde_json::to_vec_pretty(tree)?)
            .await?;
        debug!(id = %id, path = %self.record_path(id).display(), "Inserted document");
        Ok(())
    }

    async fn update_partial(&self, id: ItemId, update: RecordUpdate) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut doc = self
            .read_document(id)
            .await?
            .ok_or(StoreError::NotFound { id })?;
        doc.insert(
            "descendants".to_string(),
            Value::from(update.descendant_count),
        );
        doc.insert(
            "children".to_string(),
            serde_json::to_value(&update.children)?,
        );
        self.write_document(id, serde_json::to_vec_pretty(&doc)?)
            .await?;
        debug!(id = %id, "Updated descendants and children");
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::SeqCst);
        debug!(path = %self.dir.display(), "Closed JSON document store");
        Ok(())
    }
}
