use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ledgerdesk_core::entity::{find_by_id, position_by_id};
use ledgerdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Entity, TenantId};
use ledgerdesk_events::Event;

/// Customer identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub AggregateId);

impl CustomerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Customer status lifecycle. Archiving is terminal and hides the customer
/// from default listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomerStatus {
    Active,
    Archived,
}

impl CustomerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CustomerStatus::Active => "active",
            CustomerStatus::Archived => "archived",
        }
    }
}

/// Kind of a family relation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Parent,
    Spouse,
    Child,
    Sibling,
    Guardian,
    Other,
}

/// Contact information for a customer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// A family relation attached to a customer.
///
/// `related_customer_id` links to another customer in the same tenant when
/// the relative is also on file; free-text otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyRelation {
    pub relation_id: Uuid,
    pub kind: RelationKind,
    pub full_name: String,
    pub related_customer_id: Option<CustomerId>,
    pub note: Option<String>,
}

impl Entity for FamilyRelation {
    type Id = Uuid;

    fn id(&self) -> &Uuid {
        &self.relation_id
    }
}

/// Reference to an uploaded media object (metadata only; the binary lives in
/// whatever object store the deployment uses).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub media_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub byte_size: u64,
}

/// A signature specimen attached to a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub signature_id: Uuid,
    pub title: String,
    pub media: MediaRef,
    pub revoked: bool,
}

impl Entity for Signature {
    type Id = Uuid;

    fn id(&self) -> &Uuid {
        &self.signature_id
    }
}

/// Aggregate root: Customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    id: CustomerId,
    tenant_id: Option<TenantId>,
    full_name: String,
    national_id: Option<String>,
    contact: ContactInfo,
    status: CustomerStatus,
    relations: Vec<FamilyRelation>,
    signatures: Vec<Signature>,
    version: u64,
    created: bool,
}

impl Customer {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: CustomerId) -> Self {
        Self {
            id,
            tenant_id: None,
            full_name: String::new(),
            national_id: None,
            contact: ContactInfo::default(),
            status: CustomerStatus::Active,
            relations: Vec::new(),
            signatures: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CustomerId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn national_id(&self) -> Option<&str> {
        self.national_id.as_deref()
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn status(&self) -> CustomerStatus {
        self.status
    }

    pub fn relations(&self) -> &[FamilyRelation] {
        &self.relations
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// Invariant helper: archived customers accept no further changes.
    pub fn is_active(&self) -> bool {
        self.status == CustomerStatus::Active
    }
}

impl AggregateRoot for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterCustomer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterCustomer {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub full_name: String,
    pub national_id: Option<String>,
    pub contact: Option<ContactInfo>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateCustomer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCustomer {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    /// Optional new name (if None, keep existing).
    pub full_name: Option<String>,
    /// Optional new national id (if None, keep existing).
    pub national_id: Option<String>,
    /// Optional new contact info (if None, keep existing).
    pub contact: Option<ContactInfo>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ArchiveCustomer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveCustomer {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    /// Optional human-readable reason.
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddFamilyRelation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddFamilyRelation {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub relation_id: Uuid,
    pub kind: RelationKind,
    pub full_name: String,
    pub related_customer_id: Option<CustomerId>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveFamilyRelation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveFamilyRelation {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub relation_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AttachSignature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachSignature {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub signature_id: Uuid,
    pub title: String,
    pub media: MediaRef,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RevokeSignature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeSignature {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub signature_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerCommand {
    RegisterCustomer(RegisterCustomer),
    UpdateCustomer(UpdateCustomer),
    ArchiveCustomer(ArchiveCustomer),
    AddFamilyRelation(AddFamilyRelation),
    RemoveFamilyRelation(RemoveFamilyRelation),
    AttachSignature(AttachSignature),
    RevokeSignature(RevokeSignature),
}

/// Event: CustomerRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRegistered {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub full_name: String,
    pub national_id: Option<String>,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CustomerUpdated. Carries the resolved (post-update) field values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerUpdated {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub full_name: String,
    pub national_id: Option<String>,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CustomerArchived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerArchived {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: FamilyRelationAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyRelationAdded {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub relation: FamilyRelation,
    pub occurred_at: DateTime<Utc>,
}

/// Event: FamilyRelationRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyRelationRemoved {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub relation_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SignatureAttached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureAttached {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub signature_id: Uuid,
    pub title: String,
    pub media: MediaRef,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SignatureRevoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRevoked {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub signature_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerEvent {
    CustomerRegistered(CustomerRegistered),
    CustomerUpdated(CustomerUpdated),
    CustomerArchived(CustomerArchived),
    FamilyRelationAdded(FamilyRelationAdded),
    FamilyRelationRemoved(FamilyRelationRemoved),
    SignatureAttached(SignatureAttached),
    SignatureRevoked(SignatureRevoked),
}

impl Event for CustomerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CustomerEvent::CustomerRegistered(_) => "crm.customer.registered",
            CustomerEvent::CustomerUpdated(_) => "crm.customer.updated",
            CustomerEvent::CustomerArchived(_) => "crm.customer.archived",
            CustomerEvent::FamilyRelationAdded(_) => "crm.customer.relation_added",
            CustomerEvent::FamilyRelationRemoved(_) => "crm.customer.relation_removed",
            CustomerEvent::SignatureAttached(_) => "crm.customer.signature_attached",
            CustomerEvent::SignatureRevoked(_) => "crm.customer.signature_revoked",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CustomerEvent::CustomerRegistered(e) => e.occurred_at,
            CustomerEvent::CustomerUpdated(e) => e.occurred_at,
            CustomerEvent::CustomerArchived(e) => e.occurred_at,
            CustomerEvent::FamilyRelationAdded(e) => e.occurred_at,
            CustomerEvent::FamilyRelationRemoved(e) => e.occurred_at,
            CustomerEvent::SignatureAttached(e) => e.occurred_at,
            CustomerEvent::SignatureRevoked(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Customer {
    type Command = CustomerCommand;
    type Event = CustomerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CustomerEvent::CustomerRegistered(e) => {
                self.id = e.customer_id;
                self.tenant_id = Some(e.tenant_id);
                self.full_name = e.full_name.clone();
                self.national_id = e.national_id.clone();
                self.contact = e.contact.clone();
                self.status = CustomerStatus::Active;
                self.created = true;
            }
            CustomerEvent::CustomerUpdated(e) => {
                self.full_name = e.full_name.clone();
                self.national_id = e.national_id.clone();
                self.contact = e.contact.clone();
            }
            CustomerEvent::CustomerArchived(_) => {
                self.status = CustomerStatus::Archived;
            }
            CustomerEvent::FamilyRelationAdded(e) => {
                self.relations.push(e.relation.clone());
            }
            CustomerEvent::FamilyRelationRemoved(e) => {
                if let Some(idx) = position_by_id(&self.relations, &e.relation_id) {
                    self.relations.remove(idx);
                }
            }
            CustomerEvent::SignatureAttached(e) => {
                self.signatures.push(Signature {
                    signature_id: e.signature_id,
                    title: e.title.clone(),
                    media: e.media.clone(),
                    revoked: false,
                });
            }
            CustomerEvent::SignatureRevoked(e) => {
                if let Some(sig) = self
                    .signatures
                    .iter_mut()
                    .find(|s| s.signature_id == e.signature_id)
                {
                    sig.revoked = true;
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CustomerCommand::RegisterCustomer(cmd) => self.handle_register(cmd),
            CustomerCommand::UpdateCustomer(cmd) => self.handle_update(cmd),
            CustomerCommand::ArchiveCustomer(cmd) => self.handle_archive(cmd),
            CustomerCommand::AddFamilyRelation(cmd) => self.handle_add_relation(cmd),
            CustomerCommand::RemoveFamilyRelation(cmd) => self.handle_remove_relation(cmd),
            CustomerCommand::AttachSignature(cmd) => self.handle_attach_signature(cmd),
            CustomerCommand::RevokeSignature(cmd) => self.handle_revoke_signature(cmd),
        }
    }
}

impl Customer {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_customer_id(&self, customer_id: CustomerId) -> Result<(), DomainError> {
        if self.id != customer_id {
            return Err(DomainError::invariant("customer_id mismatch"));
        }
        Ok(())
    }

    /// Guard shared by every post-registration command.
    fn ensure_mutable(&self, tenant_id: TenantId, customer_id: CustomerId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(tenant_id)?;
        self.ensure_customer_id(customer_id)?;
        if self.status == CustomerStatus::Archived {
            return Err(DomainError::conflict("customer is archived"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterCustomer) -> Result<Vec<CustomerEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("customer already exists"));
        }

        if cmd.full_name.trim().is_empty() {
            return Err(DomainError::validation("full_name", "cannot be empty"));
        }

        let contact = cmd.contact.clone().unwrap_or_default();

        Ok(vec![CustomerEvent::CustomerRegistered(CustomerRegistered {
            tenant_id: cmd.tenant_id,
            customer_id: cmd.customer_id,
            full_name: cmd.full_name.clone(),
            national_id: cmd.national_id.clone(),
            contact,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateCustomer) -> Result<Vec<CustomerEvent>, DomainError> {
        self.ensure_mutable(cmd.tenant_id, cmd.customer_id)?;

        let new_name = cmd.full_name.clone().unwrap_or_else(|| self.full_name.clone());
        if new_name.trim().is_empty() {
            return Err(DomainError::validation("full_name", "cannot be empty"));
        }

        let new_national_id = cmd.national_id.clone().or_else(|| self.national_id.clone());
        let new_contact = cmd.contact.clone().unwrap_or_else(|| self.contact.clone());

        Ok(vec![CustomerEvent::CustomerUpdated(CustomerUpdated {
            tenant_id: cmd.tenant_id,
            customer_id: cmd.customer_id,
            full_name: new_name,
            national_id: new_national_id,
            contact: new_contact,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_archive(&self, cmd: &ArchiveCustomer) -> Result<Vec<CustomerEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_customer_id(cmd.customer_id)?;

        if self.status == CustomerStatus::Archived {
            return Err(DomainError::conflict("customer is already archived"));
        }

        Ok(vec![CustomerEvent::CustomerArchived(CustomerArchived {
            tenant_id: cmd.tenant_id,
            customer_id: cmd.customer_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_relation(&self, cmd: &AddFamilyRelation) -> Result<Vec<CustomerEvent>, DomainError> {
        self.ensure_mutable(cmd.tenant_id, cmd.customer_id)?;

        if cmd.full_name.trim().is_empty() {
            return Err(DomainError::validation("full_name", "cannot be empty"));
        }

        Ok(vec![CustomerEvent::FamilyRelationAdded(FamilyRelationAdded {
            tenant_id: cmd.tenant_id,
            customer_id: cmd.customer_id,
            relation: FamilyRelation {
                relation_id: cmd.relation_id,
                kind: cmd.kind,
                full_name: cmd.full_name.clone(),
                related_customer_id: cmd.related_customer_id,
                note: cmd.note.clone(),
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_relation(
        &self,
        cmd: &RemoveFamilyRelation,
    ) -> Result<Vec<CustomerEvent>, DomainError> {
        self.ensure_mutable(cmd.tenant_id, cmd.customer_id)?;

        if find_by_id(&self.relations, &cmd.relation_id).is_none() {
            return Err(DomainError::not_found());
        }

        Ok(vec![CustomerEvent::FamilyRelationRemoved(FamilyRelationRemoved {
            tenant_id: cmd.tenant_id,
            customer_id: cmd.customer_id,
            relation_id: cmd.relation_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_attach_signature(
        &self,
        cmd: &AttachSignature,
    ) -> Result<Vec<CustomerEvent>, DomainError> {
        self.ensure_mutable(cmd.tenant_id, cmd.customer_id)?;

        if cmd.title.trim().is_empty() {
            return Err(DomainError::validation("title", "cannot be empty"));
        }
        if cmd.media.file_name.trim().is_empty() {
            return Err(DomainError::validation("file_name", "cannot be empty"));
        }

        Ok(vec![CustomerEvent::SignatureAttached(SignatureAttached {
            tenant_id: cmd.tenant_id,
            customer_id: cmd.customer_id,
            signature_id: cmd.signature_id,
            title: cmd.title.clone(),
            media: cmd.media.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revoke_signature(
        &self,
        cmd: &RevokeSignature,
    ) -> Result<Vec<CustomerEvent>, DomainError> {
        self.ensure_mutable(cmd.tenant_id, cmd.customer_id)?;

        let Some(sig) = find_by_id(&self.signatures, &cmd.signature_id) else {
            return Err(DomainError::not_found());
        };
        if sig.revoked {
            return Err(DomainError::conflict("signature is already revoked"));
        }

        Ok(vec![CustomerEvent::SignatureRevoked(SignatureRevoked {
            tenant_id: cmd.tenant_id,
            customer_id: cmd.customer_id,
            signature_id: cmd.signature_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerdesk_core::AggregateId;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_customer_id() -> CustomerId {
        CustomerId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn registered_customer(tenant_id: TenantId, customer_id: CustomerId) -> Customer {
        let mut customer = Customer::empty(customer_id);
        let cmd = RegisterCustomer {
            tenant_id,
            customer_id,
            full_name: "Amina Rahimi".to_string(),
            national_id: Some("1402-0099".to_string()),
            contact: None,
            occurred_at: test_time(),
        };
        let events = customer
            .handle(&CustomerCommand::RegisterCustomer(cmd))
            .unwrap();
        customer.apply(&events[0]);
        customer
    }

    fn test_media() -> MediaRef {
        MediaRef {
            media_id: Uuid::now_v7(),
            file_name: "signature.png".to_string(),
            content_type: "image/png".to_string(),
            byte_size: 2048,
        }
    }

    #[test]
    fn register_customer_emits_registered_event() {
        let customer = Customer::empty(test_customer_id());
        let tenant_id = test_tenant_id();
        let customer_id = test_customer_id();
        let contact = ContactInfo {
            email: Some("amina@example.com".to_string()),
            phone: Some("+93700000001".to_string()),
        };
        let cmd = RegisterCustomer {
            tenant_id,
            customer_id,
            full_name: "Amina Rahimi".to_string(),
            national_id: None,
            contact: Some(contact.clone()),
            occurred_at: test_time(),
        };

        let events = customer
            .handle(&CustomerCommand::RegisterCustomer(cmd))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            CustomerEvent::CustomerRegistered(e) => {
                assert_eq!(e.tenant_id, tenant_id);
                assert_eq!(e.customer_id, customer_id);
                assert_eq!(e.full_name, "Amina Rahimi");
                assert_eq!(e.contact, contact);
            }
            _ => panic!("Expected CustomerRegistered event"),
        }
    }

    #[test]
    fn register_customer_rejects_blank_name() {
        let customer = Customer::empty(test_customer_id());
        let cmd = RegisterCustomer {
            tenant_id: test_tenant_id(),
            customer_id: test_customer_id(),
            full_name: "   ".to_string(),
            national_id: None,
            contact: None,
            occurred_at: test_time(),
        };

        let err = customer
            .handle(&CustomerCommand::RegisterCustomer(cmd))
            .unwrap_err();
        match err {
            DomainError::Validation { field, .. } => assert_eq!(field, "full_name"),
            _ => panic!("Expected Validation error for blank name"),
        }
    }

    #[test]
    fn register_customer_rejects_duplicate_creation() {
        let tenant_id = test_tenant_id();
        let customer_id = test_customer_id();
        let customer = registered_customer(tenant_id, customer_id);

        let cmd = RegisterCustomer {
            tenant_id,
            customer_id,
            full_name: "Amina Rahimi".to_string(),
            national_id: None,
            contact: None,
            occurred_at: test_time(),
        };
        let err = customer
            .handle(&CustomerCommand::RegisterCustomer(cmd))
            .unwrap_err();
        match err {
            DomainError::Conflict(_) => {}
            _ => panic!("Expected Conflict error for duplicate creation"),
        }
    }

    #[test]
    fn update_customer_keeps_unspecified_fields() {
        let tenant_id = test_tenant_id();
        let customer_id = test_customer_id();
        let mut customer = registered_customer(tenant_id, customer_id);

        let cmd = UpdateCustomer {
            tenant_id,
            customer_id,
            full_name: Some("Amina R. Safi".to_string()),
            national_id: None,
            contact: None,
            occurred_at: test_time(),
        };
        let events = customer
            .handle(&CustomerCommand::UpdateCustomer(cmd))
            .unwrap();

        match &events[0] {
            CustomerEvent::CustomerUpdated(e) => {
                assert_eq!(e.full_name, "Amina R. Safi");
                // Untouched fields carried over from current state.
                assert_eq!(e.national_id.as_deref(), Some("1402-0099"));
            }
            _ => panic!("Expected CustomerUpdated event"),
        }

        customer.apply(&events[0]);
        assert_eq!(customer.full_name(), "Amina R. Safi");
    }

    #[test]
    fn update_rejects_unregistered_customer() {
        let customer = Customer::empty(test_customer_id());
        let cmd = UpdateCustomer {
            tenant_id: test_tenant_id(),
            customer_id: test_customer_id(),
            full_name: Some("Anyone".to_string()),
            national_id: None,
            contact: None,
            occurred_at: test_time(),
        };

        let err = customer
            .handle(&CustomerCommand::UpdateCustomer(cmd))
            .unwrap_err();
        match err {
            DomainError::NotFound => {}
            _ => panic!("Expected NotFound for update before registration"),
        }
    }

    #[test]
    fn archive_is_terminal() {
        let tenant_id = test_tenant_id();
        let customer_id = test_customer_id();
        let mut customer = registered_customer(tenant_id, customer_id);

        let archive = ArchiveCustomer {
            tenant_id,
            customer_id,
            reason: Some("Moved abroad".to_string()),
            occurred_at: test_time(),
        };
        let events = customer
            .handle(&CustomerCommand::ArchiveCustomer(archive.clone()))
            .unwrap();
        customer.apply(&events[0]);
        assert_eq!(customer.status(), CustomerStatus::Archived);
        assert!(!customer.is_active());

        // Second archive conflicts.
        let err = customer
            .handle(&CustomerCommand::ArchiveCustomer(archive))
            .unwrap_err();
        match err {
            DomainError::Conflict(_) => {}
            _ => panic!("Expected Conflict for double archive"),
        }

        // So does any further mutation.
        let update = UpdateCustomer {
            tenant_id,
            customer_id,
            full_name: Some("New Name".to_string()),
            national_id: None,
            contact: None,
            occurred_at: test_time(),
        };
        let err = customer
            .handle(&CustomerCommand::UpdateCustomer(update))
            .unwrap_err();
        match err {
            DomainError::Conflict(_) => {}
            _ => panic!("Expected Conflict for update after archive"),
        }
    }

    #[test]
    fn add_and_remove_family_relation() {
        let tenant_id = test_tenant_id();
        let customer_id = test_customer_id();
        let mut customer = registered_customer(tenant_id, customer_id);
        let relation_id = Uuid::now_v7();

        let add = AddFamilyRelation {
            tenant_id,
            customer_id,
            relation_id,
            kind: RelationKind::Spouse,
            full_name: "Farid Rahimi".to_string(),
            related_customer_id: None,
            note: None,
            occurred_at: test_time(),
        };
        let events = customer
            .handle(&CustomerCommand::AddFamilyRelation(add))
            .unwrap();
        customer.apply(&events[0]);
        assert_eq!(customer.relations().len(), 1);
        assert_eq!(customer.relations()[0].full_name, "Farid Rahimi");

        let remove = RemoveFamilyRelation {
            tenant_id,
            customer_id,
            relation_id,
            occurred_at: test_time(),
        };
        let events = customer
            .handle(&CustomerCommand::RemoveFamilyRelation(remove))
            .unwrap();
        customer.apply(&events[0]);
        assert!(customer.relations().is_empty());
    }

    #[test]
    fn remove_unknown_relation_is_not_found() {
        let tenant_id = test_tenant_id();
        let customer_id = test_customer_id();
        let customer = registered_customer(tenant_id, customer_id);

        let remove = RemoveFamilyRelation {
            tenant_id,
            customer_id,
            relation_id: Uuid::now_v7(),
            occurred_at: test_time(),
        };
        let err = customer
            .handle(&CustomerCommand::RemoveFamilyRelation(remove))
            .unwrap_err();
        match err {
            DomainError::NotFound => {}
            _ => panic!("Expected NotFound for unknown relation"),
        }
    }

    #[test]
    fn attach_relation_rejects_blank_name() {
        let tenant_id = test_tenant_id();
        let customer_id = test_customer_id();
        let customer = registered_customer(tenant_id, customer_id);

        let add = AddFamilyRelation {
            tenant_id,
            customer_id,
            relation_id: Uuid::now_v7(),
            kind: RelationKind::Child,
            full_name: "".to_string(),
            related_customer_id: None,
            note: None,
            occurred_at: test_time(),
        };
        let err = customer
            .handle(&CustomerCommand::AddFamilyRelation(add))
            .unwrap_err();
        match err {
            DomainError::Validation { field, .. } => assert_eq!(field, "full_name"),
            _ => panic!("Expected Validation error"),
        }
    }

    #[test]
    fn attach_and_revoke_signature() {
        let tenant_id = test_tenant_id();
        let customer_id = test_customer_id();
        let mut customer = registered_customer(tenant_id, customer_id);
        let signature_id = Uuid::now_v7();

        let attach = AttachSignature {
            tenant_id,
            customer_id,
            signature_id,
            title: "Primary specimen".to_string(),
            media: test_media(),
            occurred_at: test_time(),
        };
        let events = customer
            .handle(&CustomerCommand::AttachSignature(attach))
            .unwrap();
        customer.apply(&events[0]);
        assert_eq!(customer.signatures().len(), 1);
        assert!(!customer.signatures()[0].revoked);

        let revoke = RevokeSignature {
            tenant_id,
            customer_id,
            signature_id,
            occurred_at: test_time(),
        };
        let events = customer
            .handle(&CustomerCommand::RevokeSignature(revoke.clone()))
            .unwrap();
        customer.apply(&events[0]);
        assert!(customer.signatures()[0].revoked);

        // Revoking again conflicts.
        let err = customer
            .handle(&CustomerCommand::RevokeSignature(revoke))
            .unwrap_err();
        match err {
            DomainError::Conflict(_) => {}
            _ => panic!("Expected Conflict for double revoke"),
        }
    }

    #[test]
    fn version_increments_on_apply() {
        let tenant_id = test_tenant_id();
        let customer_id = test_customer_id();
        let mut customer = Customer::empty(customer_id);
        assert_eq!(customer.version(), 0);

        let cmd = RegisterCustomer {
            tenant_id,
            customer_id,
            full_name: "Amina Rahimi".to_string(),
            national_id: None,
            contact: None,
            occurred_at: test_time(),
        };
        let events = customer
            .handle(&CustomerCommand::RegisterCustomer(cmd))
            .unwrap();
        customer.apply(&events[0]);
        assert_eq!(customer.version(), 1);

        let add = AddFamilyRelation {
            tenant_id,
            customer_id,
            relation_id: Uuid::now_v7(),
            kind: RelationKind::Parent,
            full_name: "Sami Rahimi".to_string(),
            related_customer_id: None,
            note: None,
            occurred_at: test_time(),
        };
        let events = customer
            .handle(&CustomerCommand::AddFamilyRelation(add))
            .unwrap();
        customer.apply(&events[0]);
        assert_eq!(customer.version(), 2);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let tenant_id = test_tenant_id();
        let customer_id = test_customer_id();
        let customer = registered_customer(tenant_id, customer_id);
        let version_before = customer.version();

        let archive = ArchiveCustomer {
            tenant_id,
            customer_id,
            reason: None,
            occurred_at: test_time(),
        };
        let events1 = customer
            .handle(&CustomerCommand::ArchiveCustomer(archive.clone()))
            .unwrap();
        let events2 = customer
            .handle(&CustomerCommand::ArchiveCustomer(archive))
            .unwrap();

        assert_eq!(customer.version(), version_before);
        assert_eq!(customer.status(), CustomerStatus::Active);
        assert_eq!(events1, events2);
    }
}
