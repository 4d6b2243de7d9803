use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledgerdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use ledgerdesk_events::Event;

use crate::customer::CustomerId;

/// Address identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressId(pub AggregateId);

impl AddressId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for AddressId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Verification lifecycle of an address.
///
/// New and freshly edited addresses are `pending`; back-office staff move
/// them to `verified` or `rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Rejected => "rejected",
        }
    }
}

/// Postal fields of an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: String,
}

impl PostalAddress {
    /// Field-keyed validation shared by add and update.
    fn validate(&self) -> Result<(), DomainError> {
        if self.line1.trim().is_empty() {
            return Err(DomainError::validation("line1", "cannot be empty"));
        }
        if self.city.trim().is_empty() {
            return Err(DomainError::validation("city", "cannot be empty"));
        }
        if self.country.trim().is_empty() {
            return Err(DomainError::validation("country", "cannot be empty"));
        }
        Ok(())
    }
}

/// Aggregate root: Address (belongs to a customer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    id: AddressId,
    tenant_id: Option<TenantId>,
    customer_id: Option<CustomerId>,
    fields: Option<PostalAddress>,
    verification: VerificationStatus,
    rejection_reason: Option<String>,
    removed: bool,
    version: u64,
    created: bool,
}

impl Address {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: AddressId) -> Self {
        Self {
            id,
            tenant_id: None,
            customer_id: None,
            fields: None,
            verification: VerificationStatus::Pending,
            rejection_reason: None,
            removed: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> AddressId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn fields(&self) -> Option<&PostalAddress> {
        self.fields.as_ref()
    }

    pub fn verification(&self) -> VerificationStatus {
        self.verification
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }
}

impl AggregateRoot for Address {
    type Id = AddressId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: AddAddress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddAddress {
    pub tenant_id: TenantId,
    pub address_id: AddressId,
    pub customer_id: CustomerId,
    pub fields: PostalAddress,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateAddress. Replaces the postal fields wholesale (form
/// semantics) and resets verification to pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAddress {
    pub tenant_id: TenantId,
    pub address_id: AddressId,
    pub fields: PostalAddress,
    pub occurred_at: DateTime<Utc>,
}

/// Command: VerifyAddress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyAddress {
    pub tenant_id: TenantId,
    pub address_id: AddressId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectAddress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectAddress {
    pub tenant_id: TenantId,
    pub address_id: AddressId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveAddress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveAddress {
    pub tenant_id: TenantId,
    pub address_id: AddressId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressCommand {
    AddAddress(AddAddress),
    UpdateAddress(UpdateAddress),
    VerifyAddress(VerifyAddress),
    RejectAddress(RejectAddress),
    RemoveAddress(RemoveAddress),
}

/// Event: AddressAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressAdded {
    pub tenant_id: TenantId,
    pub address_id: AddressId,
    pub customer_id: CustomerId,
    pub fields: PostalAddress,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AddressUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressUpdated {
    pub tenant_id: TenantId,
    pub address_id: AddressId,
    pub fields: PostalAddress,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AddressVerified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressVerified {
    pub tenant_id: TenantId,
    pub address_id: AddressId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AddressRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRejected {
    pub tenant_id: TenantId,
    pub address_id: AddressId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AddressRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRemoved {
    pub tenant_id: TenantId,
    pub address_id: AddressId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressEvent {
    AddressAdded(AddressAdded),
    AddressUpdated(AddressUpdated),
    AddressVerified(AddressVerified),
    AddressRejected(AddressRejected),
    AddressRemoved(AddressRemoved),
}

impl Event for AddressEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AddressEvent::AddressAdded(_) => "crm.address.added",
            AddressEvent::AddressUpdated(_) => "crm.address.updated",
            AddressEvent::AddressVerified(_) => "crm.address.verified",
            AddressEvent::AddressRejected(_) => "crm.address.rejected",
            AddressEvent::AddressRemoved(_) => "crm.address.removed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AddressEvent::AddressAdded(e) => e.occurred_at,
            AddressEvent::AddressUpdated(e) => e.occurred_at,
            AddressEvent::AddressVerified(e) => e.occurred_at,
            AddressEvent::AddressRejected(e) => e.occurred_at,
            AddressEvent::AddressRemoved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Address {
    type Command = AddressCommand;
    type Event = AddressEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AddressEvent::AddressAdded(e) => {
                self.id = e.address_id;
                self.tenant_id = Some(e.tenant_id);
                self.customer_id = Some(e.customer_id);
                self.fields = Some(e.fields.clone());
                self.verification = VerificationStatus::Pending;
                self.rejection_reason = None;
                self.created = true;
            }
            AddressEvent::AddressUpdated(e) => {
                self.fields = Some(e.fields.clone());
                // Editing invalidates any previous verification outcome.
                self.verification = VerificationStatus::Pending;
                self.rejection_reason = None;
            }
            AddressEvent::AddressVerified(_) => {
                self.verification = VerificationStatus::Verified;
                self.rejection_reason = None;
            }
            AddressEvent::AddressRejected(e) => {
                self.verification = VerificationStatus::Rejected;
                self.rejection_reason = Some(e.reason.clone());
            }
            AddressEvent::AddressRemoved(_) => {
                self.removed = true;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AddressCommand::AddAddress(cmd) => self.handle_add(cmd),
            AddressCommand::UpdateAddress(cmd) => self.handle_update(cmd),
            AddressCommand::VerifyAddress(cmd) => self.handle_verify(cmd),
            AddressCommand::RejectAddress(cmd) => self.handle_reject(cmd),
            AddressCommand::RemoveAddress(cmd) => self.handle_remove(cmd),
        }
    }
}

impl Address {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_address_id(&self, address_id: AddressId) -> Result<(), DomainError> {
        if self.id != address_id {
            return Err(DomainError::invariant("address_id mismatch"));
        }
        Ok(())
    }

    /// Guard shared by every post-creation command. Removed addresses behave
    /// as if they no longer exist.
    fn ensure_live(&self, tenant_id: TenantId, address_id: AddressId) -> Result<(), DomainError> {
        if !self.created || self.removed {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(tenant_id)?;
        self.ensure_address_id(address_id)?;
        Ok(())
    }

    fn handle_add(&self, cmd: &AddAddress) -> Result<Vec<AddressEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("address already exists"));
        }
        cmd.fields.validate()?;

        Ok(vec![AddressEvent::AddressAdded(AddressAdded {
            tenant_id: cmd.tenant_id,
            address_id: cmd.address_id,
            customer_id: cmd.customer_id,
            fields: cmd.fields.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateAddress) -> Result<Vec<AddressEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.address_id)?;
        cmd.fields.validate()?;

        Ok(vec![AddressEvent::AddressUpdated(AddressUpdated {
            tenant_id: cmd.tenant_id,
            address_id: cmd.address_id,
            fields: cmd.fields.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_verify(&self, cmd: &VerifyAddress) -> Result<Vec<AddressEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.address_id)?;

        if self.verification != VerificationStatus::Pending {
            return Err(DomainError::conflict(
                "only pending addresses can be verified",
            ));
        }

        Ok(vec![AddressEvent::AddressVerified(AddressVerified {
            tenant_id: cmd.tenant_id,
            address_id: cmd.address_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectAddress) -> Result<Vec<AddressEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.address_id)?;

        if self.verification != VerificationStatus::Pending {
            return Err(DomainError::conflict(
                "only pending addresses can be rejected",
            ));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("reason", "cannot be empty"));
        }

        Ok(vec![AddressEvent::AddressRejected(AddressRejected {
            tenant_id: cmd.tenant_id,
            address_id: cmd.address_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove(&self, cmd: &RemoveAddress) -> Result<Vec<AddressEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.address_id)?;

        Ok(vec![AddressEvent::AddressRemoved(AddressRemoved {
            tenant_id: cmd.tenant_id,
            address_id: cmd.address_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
