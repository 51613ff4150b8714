//! Category registry: an ordered, append-only set of category names
//!
//! Categories are permanent once added. Names are compared case-sensitively
//! and exactly, after trimming surrounding whitespace.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Result, TrainerError};
use crate::storage;

/// Category set used when no categories file exists yet
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "Complaint - Product/Service",
    "Sales Opportunity - New Business",
    "Action Required - Urgent Response",
    "Legal Escalation - Threat/Litigation",
    "Good News - Customer Success",
    "Technical Support - Bug Report",
    "General Inquiry",
];

/// Repository interface for the category registry
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// All categories in insertion order
    async fn list(&self) -> Result<Vec<String>>;

    /// Append a new category. Fails with `DuplicateCategory` if present.
    async fn add(&self, name: &str) -> Result<()>;
}

fn normalize_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(TrainerError::InvalidCategory(
            "category name cannot be empty".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

fn dedup_preserving_order(names: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    names
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// In-memory registry for tests and ephemeral runs
#[derive(Debug, Default)]
pub struct InMemoryCategories {
    names: Mutex<Vec<String>>,
}

impl InMemoryCategories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_categories<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = names.into_iter().map(Into::into).collect();
        Self {
            names: Mutex::new(dedup_preserving_order(names)),
        }
    }

    pub fn with_defaults() -> Self {
        Self::with_categories(DEFAULT_CATEGORIES.iter().copied())
    }
}

#[async_trait]
impl CategoryRepository for InMemoryCategories {
    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.names.lock().await.clone())
    }

    async fn add(&self, name: &str) -> Result<()> {
        let name = normalize_name(name)?;
        let mut names = self.names.lock().await;
        if names.contains(&name) {
            return Err(TrainerError::DuplicateCategory(name));
        }
        names.push(name);
        Ok(())
    }
}

/// Registry persisted as a flat JSON array of unique names
#[derive(Debug)]
pub struct JsonCategoryStore {
    path: PathBuf,
    names: Mutex<Vec<String>>,
}

impl JsonCategoryStore {
    /// Open the store, seeding it with [`DEFAULT_CATEGORIES`] when the file is absent
    pub async fn open(path: &Path) -> Result<Self> {
        let names = match storage::load_json::<Vec<String>>(path).await? {
            Some(names) => {
                let count = names.len();
                let names = dedup_preserving_order(names);
                if names.len() != count {
                    debug!(
                        "Dropped {} duplicate categories while loading {:?}",
                        count - names.len(),
                        path
                    );
                }
                info!("Loaded {} categories from {:?}", names.len(), path);
                names
            }
            None => {
                info!("No categories file at {:?}, using default categories", path);
                DEFAULT_CATEGORIES.iter().map(|s| s.to_string()).collect()
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            names: Mutex::new(names),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CategoryRepository for JsonCategoryStore {
    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.names.lock().await.clone())
    }

    async fn add(&self, name: &str) -> Result<()> {
        let name = normalize_name(name)?;
        let mut names = self.names.lock().await;
        if names.contains(&name) {
            return Err(TrainerError::DuplicateCategory(name));
        }

        names.push(name.clone());
        if let Err(e) = storage::write_json_durable(&self.path, &*names).await {
            names.pop();
            return Err(e);
        }

        info!("Added category '{}'", name);
        Ok(())
    }
}
