use std::collections::HashMap;
use std::sync::RwLock;

use ledgerdesk_core::{AggregateId, ExpectedVersion, TenantId};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<StreamKey, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        // All events must target the same tenant + aggregate stream.
        let tenant_id = events[0].tenant_id;
        let aggregate_id = events[0].aggregate_id;
        let aggregate_type = events[0].aggregate_type.clone();

        for (idx, e) in events.iter().enumerate() {
            if e.tenant_id != tenant_id {
                return Err(EventStoreError::TenantIsolation(format!(
                    "batch contains multiple tenant_ids (index {idx})"
                )));
            }
            if e.aggregate_id != aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if e.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }

        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };

        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        let stream = streams.entry(key).or_default();
        let current = Self::current_version(stream);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        // Enforce aggregate type stability across the stream.
        if let Some(existing) = stream.first() {
            if existing.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, aggregate_type
                )));
            }
        }

        // Assign sequence numbers and append (append-only).
        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            let stored = StoredEvent {
                event_id: e.event_id,
                tenant_id: e.tenant_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            next += 1;
            stream.push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };

        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        Ok(streams.get(&key).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn uncommitted(tenant_id: TenantId, aggregate_id: AggregateId, n: u32) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            tenant_id,
            aggregate_id,
            aggregate_type: "crm.customer".to_string(),
            event_type: "crm.customer.registered".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({ "n": n }),
        }
    }

    #[test]
    fn append_assigns_contiguous_sequence_numbers() {
        let store = InMemoryEventStore::new();
        let tenant_id = TenantId::new();
        let aggregate_id = AggregateId::new();

        let first = store
            .append(
                vec![uncommitted(tenant_id, aggregate_id, 1)],
                ExpectedVersion::Exact(0),
            )
            .unwrap();
        assert_eq!(first[0].sequence_number, 1);

        let batch = store
            .append(
                vec![
                    uncommitted(tenant_id, aggregate_id, 2),
                    uncommitted(tenant_id, aggregate_id, 3),
                ],
                ExpectedVersion::Exact(1),
            )
            .unwrap();
        assert_eq!(batch[0].sequence_number, 2);
        assert_eq!(batch[1].sequence_number, 3);

        let loaded = store.load_stream(tenant_id, aggregate_id).unwrap();
        assert_eq!(loaded.len(), 3);
    }

    #[test]
    fn stale_expected_version_is_a_concurrency_error() {
        let store = InMemoryEventStore::new();
        let tenant_id = TenantId::new();
        let aggregate_id = AggregateId::new();

        store
            .append(
                vec![uncommitted(tenant_id, aggregate_id, 1)],
                ExpectedVersion::Any,
            )
            .unwrap();

        let err = store
            .append(
                vec![uncommitted(tenant_id, aggregate_id, 2)],
                ExpectedVersion::Exact(0),
            )
            .unwrap_err();
        match err {
            EventStoreError::Concurrency(_) => {}
            e => panic!("Expected Concurrency, got: {e:?}"),
        }
    }

    #[test]
    fn streams_are_tenant_scoped() {
        let store = InMemoryEventStore::new();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();
        let aggregate_id = AggregateId::new();

        store
            .append(
                vec![uncommitted(tenant_a, aggregate_id, 1)],
                ExpectedVersion::Any,
            )
            .unwrap();

        assert!(store.load_stream(tenant_b, aggregate_id).unwrap().is_empty());
    }

    #[test]
    fn mixed_tenant_batch_is_rejected() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();

        let err = store
            .append(
                vec![
                    uncommitted(TenantId::new(), aggregate_id, 1),
                    uncommitted(TenantId::new(), aggregate_id, 2),
                ],
                ExpectedVersion::Any,
            )
            .unwrap_err();
        match err {
            EventStoreError::TenantIsolation(_) => {}
            e => panic!("Expected TenantIsolation, got: {e:?}"),
        }
    }
}
