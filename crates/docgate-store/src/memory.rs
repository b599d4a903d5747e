//! In-memory document store.

use crate::documents::{DocumentRef, Documents, FindOptions, OperationResult, SortKey, WriteMode, WriteRequest};
use crate::error::{StoreError, StoreResult};
use crate::etag::{Etag, ETAG_FIELD};
use crate::filter::Filter;
use crate::update::{apply_update, get_path, has_update_operators, unflatten};
use dashmap::DashMap;
use docgate_core::BoxFuture;
use http::StatusCode;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use uuid::Uuid;

const MISSING_ETAG: &str = "The document's ETag must be provided using the 'If-Match' header.";
const WRONG_ETAG: &str = "The document's ETag does not match the one provided with the 'If-Match' header.";

type Collection = BTreeMap<String, Value>;

/// A [`Documents`] implementation holding everything in memory.
///
/// Each collection is guarded by its map entry, so the ETag check and the
/// write it protects happen atomically.
#[derive(Debug, Default)]
pub struct InMemoryDocuments {
    collections: DashMap<String, Collection>,
}

fn collection_key(db: &str, collection: &str) -> String {
    format!("{db}/{collection}")
}

impl InMemoryDocuments {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.collections.iter().map(|entry| entry.value().len()).sum()
    }

    /// Returns true if no document is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write(&self, request: WriteRequest) -> StoreResult<OperationResult> {
        let WriteRequest {
            db,
            collection,
            id,
            mut content,
            mode,
            if_match,
            check_etag,
        } = request;

        content.remove(ETAG_FIELD);
        let body_id = match content.get("_id") {
            None => None,
            Some(Value::String(id)) => Some(id.clone()),
            Some(other) => Some(other.to_string()),
        };
        let id = match (id, body_id, mode) {
            (Some(id), Some(body_id), WriteMode::Replace | WriteMode::Insert) if id != body_id => {
                return Err(StoreError::invalid_document(format!(
                    "_id in content body ({body_id}) is different from the document id ({id})"
                )))
            }
            (Some(id), _, _) => id,
            (None, Some(body_id), WriteMode::Insert) => body_id,
            (None, None, WriteMode::Insert) => Uuid::now_v7().to_string(),
            (None, _, _) => return Err(StoreError::invalid_document("the document id is required")),
        };
        let target = DocumentRef::new(&db, &collection, &id);

        let mut documents = self.collections.entry(collection_key(&db, &collection)).or_default();
        let old = documents.get(&id).cloned();

        if let Some(failure) = check_precondition(old.as_ref(), if_match.as_ref(), check_etag, &target) {
            return Ok(failure);
        }

        let mut document = match mode {
            WriteMode::Replace | WriteMode::Insert => {
                if has_update_operators(&content) {
                    return Err(StoreError::invalid_document(
                        "update operators are not allowed when replacing a document",
                    ));
                }
                unflatten(content)?
            }
            WriteMode::Update => {
                let mut document = match &old {
                    Some(Value::Object(old)) => old.clone(),
                    _ => Map::new(),
                };
                apply_update(&mut document, &content)?;
                document
            }
        };

        let etag = Etag::generate();
        document.insert("_id".to_string(), Value::String(id.clone()));
        document.insert(ETAG_FIELD.to_string(), Value::String(etag.as_str().to_string()));
        let document = Value::Object(document);
        documents.insert(id, document.clone());

        let http_code = if old.is_some() { StatusCode::OK } else { StatusCode::CREATED };
        debug!(document = %target, status = http_code.as_u16(), "document written");

        Ok(OperationResult {
            http_code,
            etag: Some(etag),
            old_data: old,
            new_data: Some(document),
            cause: None,
            target,
        })
    }

    fn delete(&self, target: &DocumentRef, if_match: Option<&Etag>, check_etag: bool) -> OperationResult {
        let Some(mut documents) = self
            .collections
            .get_mut(&collection_key(&target.db, &target.collection))
        else {
            return OperationResult::failed(StatusCode::NOT_FOUND, "document does not exist", target.clone());
        };
        let Some(old) = documents.get(&target.id).cloned() else {
            return OperationResult::failed(StatusCode::NOT_FOUND, "document does not exist", target.clone());
        };

        if let Some(failure) = check_precondition(Some(&old), if_match, check_etag, target) {
            return failure;
        }

        documents.remove(&target.id);
        debug!(document = %target, "document deleted");

        OperationResult {
            http_code: StatusCode::NO_CONTENT,
            etag: None,
            old_data: Some(old),
            new_data: None,
            cause: None,
            target: target.clone(),
        }
    }

    fn revert(&self, result: &OperationResult) -> bool {
        if !result.is_success() {
            return false;
        }
        let target = &result.target;
        let Some(mut documents) = self
            .collections
            .get_mut(&collection_key(&target.db, &target.collection))
        else {
            return false;
        };

        let current = documents.get(&target.id).map(Etag::of_document);
        let reverted = match (&result.new_data, current) {
            // A write is reverted only while the document still carries its tag.
            (Some(_), Some(current)) if current == result.etag => {
                match &result.old_data {
                    Some(old) => {
                        documents.insert(target.id.clone(), old.clone());
                    }
                    None => {
                        documents.remove(&target.id);
                    }
                }
                true
            }
            (None, None) => match &result.old_data {
                Some(old) => {
                    documents.insert(target.id.clone(), old.clone());
                    true
                }
                None => false,
            },
            _ => false,
        };

        if reverted {
            debug!(document = %target, "write rolled back");
        }
        reverted
    }

    fn select(&self, db: &str, collection: &str, filter: &Filter, options: &FindOptions) -> Vec<Value> {
        let Some(documents) = self.collections.get(&collection_key(db, collection)) else {
            return Vec::new();
        };

        let mut matched: Vec<Value> = documents
            .values()
            .filter(|document| filter.matches(document))
            .cloned()
            .collect();
        drop(documents);

        if !options.sort.is_empty() {
            matched.sort_by(|a, b| compare_documents(a, b, &options.sort));
        }

        matched
            .into_iter()
            .skip(options.skip)
            .take(options.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// Returns the failed result for an unmet ETag precondition, if any.
fn check_precondition(
    old: Option<&Value>,
    if_match: Option<&Etag>,
    check_etag: bool,
    target: &DocumentRef,
) -> Option<OperationResult> {
    if !check_etag {
        return None;
    }
    let stored = Etag::of_document(old?)?;
    match if_match {
        None => Some(OperationResult::failed(StatusCode::CONFLICT, MISSING_ETAG, target.clone())),
        Some(if_match) if *if_match != stored => Some(OperationResult::failed(
            StatusCode::PRECONDITION_FAILED,
            WRONG_ETAG,
            target.clone(),
        )),
        Some(_) => None,
    }
}

fn compare_documents(a: &Value, b: &Value, keys: &[SortKey]) -> Ordering {
    keys.iter()
        .map(|key| {
            let ordering = compare_values(get_path(a, &key.path), get_path(b, &key.path));
            if key.descending {
                ordering.reverse()
            } else {
                ordering
            }
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Orders missing < null < numbers < strings < booleans < others.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::Bool(_)) => 4,
            Some(_) => 5,
        }
    }

    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        _ => rank(a).cmp(&rank(b)),
    }
}

impl Documents for InMemoryDocuments {
    fn databases(&self) -> BoxFuture<'_, StoreResult<Vec<String>>> {
        Box::pin(async move {
            let names: BTreeSet<String> = self
                .collections
                .iter()
                .filter_map(|entry| entry.key().split_once('/').map(|(db, _)| db.to_string()))
                .collect();
            Ok(names.into_iter().collect())
        })
    }

    fn collections<'a>(&'a self, db: &'a str) -> BoxFuture<'a, StoreResult<Vec<String>>> {
        Box::pin(async move {
            let names: BTreeSet<String> = self
                .collections
                .iter()
                .filter_map(|entry| match entry.key().split_once('/') {
                    Some((name, collection)) if name == db => Some(collection.to_string()),
                    _ => None,
                })
                .collect();
            Ok(names.into_iter().collect())
        })
    }

    fn get_document<'a>(&'a self, target: &'a DocumentRef) -> BoxFuture<'a, StoreResult<Option<Value>>> {
        Box::pin(async move {
            Ok(self
                .collections
                .get(&collection_key(&target.db, &target.collection))
                .and_then(|documents| documents.get(&target.id).cloned()))
        })
    }

    fn find<'a>(
        &'a self,
        db: &'a str,
        collection: &'a str,
        filter: &'a Filter,
        options: &'a FindOptions,
    ) -> BoxFuture<'a, StoreResult<Vec<Value>>> {
        Box::pin(async move { Ok(self.select(db, collection, filter, options)) })
    }

    fn write_document(&self, request: WriteRequest) -> BoxFuture<'_, StoreResult<OperationResult>> {
        Box::pin(async move { self.write(request) })
    }

    fn delete_document<'a>(
        &'a self,
        target: &'a DocumentRef,
        if_match: Option<&'a Etag>,
        check_etag: bool,
    ) -> BoxFuture<'a, StoreResult<OperationResult>> {
        Box::pin(async move { Ok(self.delete(target, if_match, check_etag)) })
    }

    fn rollback<'a>(&'a self, result: &'a OperationResult) -> BoxFuture<'a, StoreResult<bool>> {
        Box::pin(async move { Ok(self.revert(result)) })
    }
}
