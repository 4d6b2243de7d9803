use serde_json::Value as JsonValue;

use ledgerdesk_core::TenantId;
use ledgerdesk_crm::address::{AddressEvent, AddressId, PostalAddress, VerificationStatus};
use ledgerdesk_crm::customer::CustomerId;
use ledgerdesk_events::EventEnvelope;

use crate::projections::{CursorGate, ProjectionError, StreamCursors, sorted_for_replay};
use crate::read_model::TenantStore;

/// Read model: one entry per live address. Removed addresses are deleted
/// outright; unlike customers they have no archived listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressReadModel {
    pub address_id: AddressId,
    pub customer_id: CustomerId,
    pub fields: PostalAddress,
    pub verification: VerificationStatus,
    pub rejection_reason: Option<String>,
}

/// Projection: address events → address book entries per tenant.
#[derive(Debug)]
pub struct AddressBookProjection<S>
where
    S: TenantStore<AddressId, AddressReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> AddressBookProjection<S>
where
    S: TenantStore<AddressId, AddressReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, address_id: AddressId) -> Option<AddressReadModel> {
        self.store.get(tenant_id, &address_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<AddressReadModel> {
        self.store.list(tenant_id)
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != "crm.address" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        match self.cursors.check(tenant_id, aggregate_id, seq)? {
            CursorGate::Duplicate => return Ok(()),
            CursorGate::Apply => {}
        }

        let ev: AddressEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let event_tenant = match &ev {
            AddressEvent::AddressAdded(e) => e.tenant_id,
            AddressEvent::AddressUpdated(e) => e.tenant_id,
            AddressEvent::AddressVerified(e) => e.tenant_id,
            AddressEvent::AddressRejected(e) => e.tenant_id,
            AddressEvent::AddressRemoved(e) => e.tenant_id,
        };
        if event_tenant != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }

        match ev {
            AddressEvent::AddressAdded(e) => {
                self.store.upsert(
                    tenant_id,
                    e.address_id,
                    AddressReadModel {
                        address_id: e.address_id,
                        customer_id: e.customer_id,
                        fields: e.fields,
                        verification: VerificationStatus::Pending,
                        rejection_reason: None,
                    },
                );
            }
            AddressEvent::AddressUpdated(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.address_id) {
                    rm.fields = e.fields;
                    // Edits invalidate any earlier verification decision.
                    rm.verification = VerificationStatus::Pending;
                    rm.rejection_reason = None;
                    self.store.upsert(tenant_id, e.address_id, rm);
                }
            }
            AddressEvent::AddressVerified(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.address_id) {
                    rm.verification = VerificationStatus::Verified;
                    rm.rejection_reason = None;
                    self.store.upsert(tenant_id, e.address_id, rm);
                }
            }
            AddressEvent::AddressRejected(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.address_id) {
                    rm.verification = VerificationStatus::Rejected;
                    rm.rejection_reason = Some(e.reason);
                    self.store.upsert(tenant_id, e.address_id, rm);
                }
            }
            AddressEvent::AddressRemoved(e) => {
                self.store.remove(tenant_id, &e.address_id);
            }
        }

        self.cursors.advance(tenant_id, aggregate_id, seq);
        Ok(())
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        let (tenants, envs) = sorted_for_replay(envelopes);
        for t in tenants {
            self.store.clear_tenant(t);
            self.cursors.clear_tenant(t);
        }
        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use ledgerdesk_core::AggregateId;
    use ledgerdesk_crm::address::{AddressAdded, AddressRemoved, AddressUpdated, AddressVerified};
    use uuid::Uuid;

    use super::*;
    use crate::read_model::InMemoryTenantStore;

    fn fields() -> PostalAddress {
        PostalAddress {
            line1: "12 Harbor Street".to_string(),
            line2: None,
            city: "Karachi".to_string(),
            region: None,
            postal_code: Some("74000".to_string()),
            country: "PK".to_string(),
        }
    }

    fn envelope(
        tenant_id: TenantId,
        address_id: AddressId,
        seq: u64,
        ev: &AddressEvent,
    ) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            address_id.0,
            "crm.address",
            seq,
            serde_json::to_value(ev).unwrap(),
        )
    }

    #[test]
    fn update_resets_verification_to_pending() {
        let projection = AddressBookProjection::new(InMemoryTenantStore::new());
        let tenant = TenantId::new();
        let address_id = AddressId(AggregateId::new());
        let customer_id = CustomerId(AggregateId::new());

        let added = AddressEvent::AddressAdded(AddressAdded {
            tenant_id: tenant,
            address_id,
            customer_id,
            fields: fields(),
            occurred_at: Utc::now(),
        });
        projection
            .apply_envelope(&envelope(tenant, address_id, 1, &added))
            .unwrap();

        let verified = AddressEvent::AddressVerified(AddressVerified {
            tenant_id: tenant,
            address_id,
            occurred_at: Utc::now(),
        });
        projection
            .apply_envelope(&envelope(tenant, address_id, 2, &verified))
            .unwrap();
        assert_eq!(
            projection.get(tenant, address_id).unwrap().verification,
            VerificationStatus::Verified
        );

        let mut new_fields = fields();
        new_fields.line1 = "14 Harbor Street".to_string();
        let updated = AddressEvent::AddressUpdated(AddressUpdated {
            tenant_id: tenant,
            address_id,
            fields: new_fields,
            occurred_at: Utc::now(),
        });
        projection
            .apply_envelope(&envelope(tenant, address_id, 3, &updated))
            .unwrap();

        let rm = projection.get(tenant, address_id).unwrap();
        assert_eq!(rm.verification, VerificationStatus::Pending);
        assert_eq!(rm.fields.line1, "14 Harbor Street");
    }

    #[test]
    fn removed_address_disappears_from_the_store() {
        let projection = AddressBookProjection::new(InMemoryTenantStore::new());
        let tenant = TenantId::new();
        let address_id = AddressId(AggregateId::new());
        let customer_id = CustomerId(AggregateId::new());

        let added = AddressEvent::AddressAdded(AddressAdded {
            tenant_id: tenant,
            address_id,
            customer_id,
            fields: fields(),
            occurred_at: Utc::now(),
        });
        projection
            .apply_envelope(&envelope(tenant, address_id, 1, &added))
            .unwrap();

        let removed = AddressEvent::AddressRemoved(AddressRemoved {
            tenant_id: tenant,
            address_id,
            occurred_at: Utc::now(),
        });
        projection
            .apply_envelope(&envelope(tenant, address_id, 2, &removed))
            .unwrap();

        assert!(projection.get(tenant, address_id).is_none());
        assert!(projection.list(tenant).is_empty());
    }
}
