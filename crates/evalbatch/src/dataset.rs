// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Dataset-collaborator capability.

use crate::error::{Error, Result};
use crate::model::DatasetItem;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Fetches the items of a named dataset. Items are immutable once fetched
/// for a given run.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// All items of `dataset`, in dataset order.
    async fn fetch_items(&self, dataset: &str) -> Result<Vec<DatasetItem>>;
}

/// In-memory [`DatasetSource`] for tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryDatasetSource {
    datasets: RwLock<HashMap<String, Vec<DatasetItem>>>,
}

impl InMemoryDatasetSource {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dataset under `name`.
    pub async fn insert(&self, name: impl Into<String>, items: Vec<DatasetItem>) {
        self.datasets.write().await.insert(name.into(), items);
    }
}

#[async_trait]
impl DatasetSource for InMemoryDatasetSource {
    async fn fetch_items(&self, dataset: &str) -> Result<Vec<DatasetItem>> {
        let datasets = self.datasets.read().await;
        match datasets.get(dataset) {
            Some(items) if !items.is_empty() => Ok(items.clone()),
            _ => Err(Error::EmptyDataset {
                dataset: dataset.to_string(),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_registered_dataset() {
        let source = InMemoryDatasetSource::new();
        source
            .insert("qa", vec![DatasetItem::new("1", "q", "a")])
            .await;
        let items = source.fetch_items("qa").await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_or_empty_dataset_is_error() {
        let source = InMemoryDatasetSource::new();
        assert!(matches!(
            source.fetch_items("nope").await.unwrap_err(),
            Error::EmptyDataset { .. }
        ));
        source.insert("empty", vec![]).await;
        assert!(source.fetch_items("empty").await.is_err());
    }
}
