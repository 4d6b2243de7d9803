use serde_json::Value as JsonValue;

use ledgerdesk_core::TenantId;
use ledgerdesk_crm::customer::{
    ContactInfo, CustomerEvent, CustomerId, CustomerStatus, FamilyRelation, Signature,
};
use ledgerdesk_events::EventEnvelope;

use crate::projections::{CursorGate, ProjectionError, StreamCursors, sorted_for_replay};
use crate::read_model::TenantStore;

/// Read model: one directory entry per customer, relations and signatures
/// included. Archived customers stay in the store (the HTTP layer filters
/// default listings) so lookups by id keep working.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerReadModel {
    pub customer_id: CustomerId,
    pub full_name: String,
    pub national_id: Option<String>,
    pub contact: ContactInfo,
    pub status: CustomerStatus,
    pub relations: Vec<FamilyRelation>,
    pub signatures: Vec<Signature>,
}

/// Projection: customer events → directory entries per tenant.
#[derive(Debug)]
pub struct CustomerDirectoryProjection<S>
where
    S: TenantStore<CustomerId, CustomerReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> CustomerDirectoryProjection<S>
where
    S: TenantStore<CustomerId, CustomerReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, customer_id: CustomerId) -> Option<CustomerReadModel> {
        self.store.get(tenant_id, &customer_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<CustomerReadModel> {
        self.store.list(tenant_id)
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != "crm.customer" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        match self.cursors.check(tenant_id, aggregate_id, seq)? {
            CursorGate::Duplicate => return Ok(()),
            CursorGate::Apply => {}
        }

        let ev: CustomerEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let event_tenant = match &ev {
            CustomerEvent::CustomerRegistered(e) => e.tenant_id,
            CustomerEvent::CustomerUpdated(e) => e.tenant_id,
            CustomerEvent::CustomerArchived(e) => e.tenant_id,
            CustomerEvent::FamilyRelationAdded(e) => e.tenant_id,
            CustomerEvent::FamilyRelationRemoved(e) => e.tenant_id,
            CustomerEvent::SignatureAttached(e) => e.tenant_id,
            CustomerEvent::SignatureRevoked(e) => e.tenant_id,
        };
        if event_tenant != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }

        match ev {
            CustomerEvent::CustomerRegistered(e) => {
                self.store.upsert(
                    tenant_id,
                    e.customer_id,
                    CustomerReadModel {
                        customer_id: e.customer_id,
                        full_name: e.full_name,
                        national_id: e.national_id,
                        contact: e.contact,
                        status: CustomerStatus::Active,
                        relations: Vec::new(),
                        signatures: Vec::new(),
                    },
                );
            }
            CustomerEvent::CustomerUpdated(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.customer_id) {
                    rm.full_name = e.full_name;
                    rm.national_id = e.national_id;
                    rm.contact = e.contact;
                    self.store.upsert(tenant_id, e.customer_id, rm);
                }
            }
            CustomerEvent::CustomerArchived(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.customer_id) {
                    rm.status = CustomerStatus::Archived;
                    self.store.upsert(tenant_id, e.customer_id, rm);
                }
            }
            CustomerEvent::FamilyRelationAdded(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.customer_id) {
                    rm.relations.push(e.relation);
                    self.store.upsert(tenant_id, e.customer_id, rm);
                }
            }
            CustomerEvent::FamilyRelationRemoved(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.customer_id) {
                    rm.relations.retain(|r| r.relation_id != e.relation_id);
                    self.store.upsert(tenant_id, e.customer_id, rm);
                }
            }
            CustomerEvent::SignatureAttached(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.customer_id) {
                    rm.signatures.push(Signature {
                        signature_id: e.signature_id,
                        title: e.title,
                        media: e.media,
                        revoked: false,
                    });
                    self.store.upsert(tenant_id, e.customer_id, rm);
                }
            }
            CustomerEvent::SignatureRevoked(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.customer_id) {
                    if let Some(sig) = rm
                        .signatures
                        .iter_mut()
                        .find(|s| s.signature_id == e.signature_id)
                    {
                        sig.revoked = true;
                    }
                    self.store.upsert(tenant_id, e.customer_id, rm);
                }
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
