//! Diff-based reconciliation of key/value tags.

use crate::error::{ApiError, Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// A single key/value tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    /// Tag key
    pub key: String,
    /// Tag value
    pub value: String,
}

impl Tag {
    /// Create a tag.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Tags to remove and tags to add, each sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDiff {
    /// Pairs present in the old set but not the new one
    pub to_delete: Vec<Tag>,
    /// Pairs present in the new set but not the old one
    pub to_create: Vec<Tag>,
}

impl TagDiff {
    /// Returns true if nothing needs to change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_create.is_empty()
    }
}

/// Compare two tag maps by key and value.
///
/// A key whose value changed shows up in both lists: the old pair is deleted and
/// the new pair created.
#[must_use]
pub fn diff_tags(old: &HashMap<String, String>, new: &HashMap<String, String>) -> TagDiff {
    let mut to_delete = missing_from(old, new);
    let mut to_create = missing_from(new, old);
    to_delete.sort();
    to_create.sort();

    TagDiff {
        to_delete,
        to_create,
    }
}

fn missing_from(source: &HashMap<String, String>, other: &HashMap<String, String>) -> Vec<Tag> {
    source
        .iter()
        .filter(|(key, value)| other.get(*key) != Some(*value))
        .map(|(key, value)| Tag::new(key.clone(), value.clone()))
        .collect()
}

/// Remote tag operations on one resource.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TagStore: Send + Sync {
    /// Attach tags to the resource.
    async fn create_tags(&self, tags: &[Tag]) -> std::result::Result<(), ApiError>;

    /// Detach tags from the resource.
    async fn delete_tags(&self, tags: &[Tag]) -> std::result::Result<(), ApiError>;
}

/// Bring a resource's tags from `old` to `new`.
///
/// Deletions are issued before creations, and each call is skipped when its list
/// is empty, so reconciling a map against itself makes no remote call.
///
/// # Errors
///
/// Returns [`Error::Remote`] if either remote call fails. A failed delete skips
/// the create.
pub async fn reconcile_tags<T>(
    store: &T,
    old: &HashMap<String, String>,
    new: &HashMap<String, String>,
) -> Result<TagDiff>
where
    T: TagStore + ?Sized,
{
    let diff = diff_tags(old, new);

    if !diff.to_delete.is_empty() {
        debug!(count = diff.to_delete.len(), "deleting tags");
        store
            .delete_tags(&diff.to_delete)
            .await
            .map_err(Error::Remote)?;
    }

    if !diff.to_create.is_empty() {
        debug!(count = diff.to_create.len(), "creating tags");
        store
            .create_tags(&diff.to_create)
            .await
            .map_err(Error::Remote)?;
    }

    Ok(diff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;

    fn tags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn diff_splits_by_key_and_value() {
        let old = tags(&[("env", "dev"), ("team", "core"), ("owner", "ops")]);
        let new = tags(&[("env", "prod"), ("team", "core"), ("cost", "42")]);

        let diff = diff_tags(&old, &new);
        assert_eq!(
            diff.to_delete,
            vec![Tag::new("env", "dev"), Tag::new("owner", "ops")]
        );
        assert_eq!(
            diff.to_create,
            vec![Tag::new("cost", "42"), Tag::new("env", "prod")]
        );
    }

    #[tokio::test]
    async fn identical_maps_make_no_calls() {
        let mut store = MockTagStore::new();
        store.expect_create_tags().never();
        store.expect_delete_tags().never();

        let old = tags(&[("env", "dev"), ("team", "core")]);
        let diff = reconcile_tags(&store, &old, &old.clone()).await.unwrap();
        assert!(diff.is_empty());
    }

    #[tokio::test]
    async fn deletes_before_creating() {
        let mut store = MockTagStore::new();
        let mut seq = Sequence::new();
        store
            .expect_delete_tags()
            .withf(|tags| tags == [Tag::new("env", "dev")])
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        store
            .expect_create_tags()
            .withf(|tags| tags == [Tag::new("env", "prod")])
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let diff = reconcile_tags(&store, &tags(&[("env", "dev")]), &tags(&[("env", "prod")]))
            .await
            .unwrap();
        assert_eq!(diff.to_create.len(), 1);
    }

    #[tokio::test]
    async fn create_only_skips_delete() {
        let mut store = MockTagStore::new();
        store.expect_delete_tags().never();
        store.expect_create_tags().times(1).returning(|_| Ok(()));

        reconcile_tags(&store, &HashMap::new(), &tags(&[("a", "1")]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_delete_skips_create() {
        let mut store = MockTagStore::new();
        store
            .expect_delete_tags()
            .times(1)
            .returning(|_| Err(ApiError::Forbidden("read only".into())));
        store.expect_create_tags().never();

        let err = reconcile_tags(&store, &tags(&[("a", "1")]), &tags(&[("a", "2")]))
            .await
            .unwrap_err();
        assert_eq!(err, Error::Remote(ApiError::Forbidden("read only".into())));
    }
}
