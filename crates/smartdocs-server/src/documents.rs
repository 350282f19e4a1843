//! Document store
//!
//! Documents are kept in memory and, when a data directory is configured,
//! mirrored to `documents.json` after every change. Each document has one
//! owner; lookups by any other user behave exactly like a missing id.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{Error, Result};
use crate::storage::JsonFile;

pub const DEFAULT_TITLE: &str = "Untitled document";
pub const DEFAULT_PAGE_SIZE: &str = "letter";

/// Page margins in inches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            top: 1.0,
            right: 1.0,
            bottom: 1.0,
            left: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub title: String,
    /// Document HTML, possibly carrying review markers.
    pub content: String,
    pub page_size: String,
    pub margins: Margins,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub owner_id: String,
}

/// Create request; every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NewDocument {
    pub title: Option<String>,
    pub content: Option<String>,
    pub page_size: Option<String>,
    pub margins: Option<Margins>,
}

/// Update request; only the fields present are changed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DocumentUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub page_size: Option<String>,
    pub margins: Option<Margins>,
}

impl DocumentUpdate {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: RwLock<BTreeMap<String, Document>>,
    file: Option<JsonFile>,
}

impl DocumentStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the store persisted under `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let file = JsonFile::in_dir(data_dir, "documents.json")?;
        let documents: BTreeMap<String, Document> = file
            .load::<Vec<Document>>()?
            .unwrap_or_default()
            .into_iter()
            .map(|doc| (doc.id.clone(), doc))
            .collect();
        info!(
            count = documents.len(),
            path = %file.path().display(),
            "Loaded documents"
        );
        Ok(Self {
            documents: RwLock::new(documents),
            file: Some(file),
        })
    }

    /// The owner's documents, most recently updated first.
    pub async fn list(&self, owner_id: &str) -> Vec<Document> {
        let documents = self.documents.read().await;
        let mut owned: Vec<Document> = documents
            .values()
            .filter(|doc| doc.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        owned
    }

    pub async fn get(&self, owner_id: &str, id: &str) -> Result<Document> {
        let documents = self.documents.read().await;
        documents
            .get(id)
            .filter(|doc| doc.owner_id == owner_id)
            .cloned()
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))
    }

    pub async fn create(&self, owner_id: &str, new: NewDocument) -> Result<Document> {
        let now = Utc::now();
        let document = Document {
            id: uuid::Uuid::new_v4().to_string(),
            title: new
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            content: new.content.unwrap_or_default(),
            page_size: new
                .page_size
                .unwrap_or_else(|| DEFAULT_PAGE_SIZE.to_string()),
            margins: new.margins.unwrap_or_default(),
            created_at: now,
            updated_at: now,
            owner_id: owner_id.to_string(),
        };

        let mut documents = self.documents.write().await;
        documents.insert(document.id.clone(), document.clone());
        self.persist(&documents)?;
        info!(id = %document.id, owner = %owner_id, "Created document");
        Ok(document)
    }

    pub async fn update(&self, owner_id: &str, id: &str, update: DocumentUpdate) -> Result<Document> {
        let mut documents = self.documents.write().await;
        let document = documents
            .get_mut(id)
            .filter(|doc| doc.owner_id == owner_id)
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;

        if let Some(title) = update.title {
            document.title = title;
        }
        if let Some(content) = update.content {
            document.content = content;
        }
        if let Some(page_size) = update.page_size {
            document.page_size = page_size;
        }
        if let Some(margins) = update.margins {
            document.margins = margins;
        }
        document.updated_at = Utc::now();

        let updated = document.clone();
        self.persist(&documents)?;
        Ok(updated)
    }

    pub async fn delete(&self, owner_id: &str, id: &str) -> Result<()> {
        let mut documents = self.documents.write().await;
        if !documents.get(id).is_some_and(|doc| doc.owner_id == owner_id) {
            return Err(Error::DocumentNotFound(id.to_string()));
        }
        documents.remove(id);
        self.persist(&documents)?;
        info!(id = %id, "Deleted document");
        Ok(())
    }

    fn persist(&self, documents: &BTreeMap<String, Document>) -> Result<()> {
        match &self.file {
            Some(file) => file.save(&documents.values().collect::<Vec<_>>()),
            None => Ok(()),
        }
    }
}
