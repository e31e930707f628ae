//! Persistence collaborator.
//!
//! Routes reach patient records only through [`PatientStore`]. The schema and
//! its validation rules belong to the backing document store; here a record
//! is an id plus an open JSON object.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use telecare_core::{StorageError, TelecareResult};
use tokio::sync::RwLock;
use uuid::Uuid;

const COLLECTION: &str = "patients";

/// A stored patient document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Narrow persistence interface. Reads are idempotent; there is no
/// cross-call transaction.
#[async_trait]
pub trait PatientStore: Send + Sync {
    /// Fetch one record.
    async fn get_by_id(&self, id: &str) -> TelecareResult<Option<PatientRecord>>;

    /// Insert a new record and return it with its assigned id.
    async fn create(&self, fields: Map<String, Value>) -> TelecareResult<PatientRecord>;

    /// Shallow-merge `patch` into an existing record.
    async fn update(&self, id: &str, patch: Map<String, Value>) -> TelecareResult<PatientRecord>;

    /// Delete a record. Returns whether it existed.
    async fn delete(&self, id: &str) -> TelecareResult<bool>;

    /// All records whose top-level `field` equals `value`.
    async fn find_by_field(&self, field: &str, value: &Value) -> TelecareResult<Vec<PatientRecord>>;

    /// Every stored record.
    async fn export_all(&self) -> TelecareResult<Vec<PatientRecord>>;

    /// Cheap reachability check used by the health probe.
    async fn ping(&self) -> TelecareResult<()>;
}

/// In-memory [`PatientStore`] for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryPatientStore {
    records: RwLock<HashMap<String, PatientRecord>>,
}

impl InMemoryPatientStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PatientStore for InMemoryPatientStore {
    async fn get_by_id(&self, id: &str) -> TelecareResult<Option<PatientRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn create(&self, mut fields: Map<String, Value>) -> TelecareResult<PatientRecord> {
        let id = match fields.remove("id") {
            Some(Value::String(id)) if !id.is_empty() => id,
            _ => Uuid::now_v7().to_string(),
        };

        let mut records = self.records.write().await;
        if records.contains_key(&id) {
            return Err(StorageError::InsertFailed {
                collection: COLLECTION.to_string(),
                reason: format!("id {} already exists", id),
            }
            .into());
        }

        let now = Utc::now();
        let record = PatientRecord {
            id: id.clone(),
            fields,
            created_at: now,
            updated_at: now,
        };
        records.insert(id, record.clone());
        Ok(record)
    }

    async fn update(&self, id: &str, patch: Map<String, Value>) -> TelecareResult<PatientRecord> {
        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or_else(|| StorageError::NotFound {
            collection: COLLECTION.to_string(),
            id: id.to_string(),
        })?;

        for (key, value) in patch {
            // Identity and bookkeeping fields are not patchable.
            if matches!(key.as_str(), "id" | "createdAt" | "updatedAt") {
                continue;
            }
            record.fields.insert(key, value);
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn delete(&self, id: &str) -> TelecareResult<bool> {
        Ok(self.records.write().await.remove(id).is_some())
    }

    async fn find_by_field(
        &self,
        field: &str,
        value: &Value,
    ) -> TelecareResult<Vec<PatientRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.fields.get(field) == Some(value))
            .cloned()
            .collect())
    }

    async fn export_all(&self) -> TelecareResult<Vec<PatientRecord>> {
        let mut all: Vec<PatientRecord> = self.records.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn ping(&self) -> TelecareResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryPatientStore::new();
        let created = store
            .create(fields(json!({"name": "Ana", "bloodType": "O+"})))
            .await
            .unwrap();
        let fetched = store.get_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.fields["name"], "Ana");
    }

    #[tokio::test]
    async fn test_create_with_explicit_id_rejects_duplicate() {
        let store = InMemoryPatientStore::new();
        store.create(fields(json!({"id": "p1"}))).await.unwrap();
        let err = store.create(fields(json!({"id": "p1"}))).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_update_merges_and_protects_id() {
        let store = InMemoryPatientStore::new();
        store
            .create(fields(json!({"id": "p1", "name": "Ana", "age": 40})))
            .await
            .unwrap();
        let updated = store
            .update("p1", fields(json!({"age": 41, "id": "other"})))
            .await
            .unwrap();
        assert_eq!(updated.id, "p1");
        assert_eq!(updated.fields["age"], 41);
        assert_eq!(updated.fields["name"], "Ana");
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = InMemoryPatientStore::new();
        let err = store.update("nope", Map::new()).await.unwrap_err();
        assert!(err.to_string().contains("Record not found"));
    }

    #[tokio::test]
    async fn test_find_by_field_and_delete() {
        let store = InMemoryPatientStore::new();
        store.create(fields(json!({"id": "a", "city": "Lagos"}))).await.unwrap();
        store.create(fields(json!({"id": "b", "city": "Accra"}))).await.unwrap();

        let found = store.find_by_field("city", &json!("Lagos")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert_eq!(store.export_all().await.unwrap().len(), 1);
    }

    #[test]
    fn test_record_serializes_flat() {
        let record = PatientRecord {
            id: "p1".to_string(),
            fields: fields(json!({"name": "Ana"})),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "p1");
        assert_eq!(json["name"], "Ana");
        assert!(json.get("createdAt").is_some());
    }
}
