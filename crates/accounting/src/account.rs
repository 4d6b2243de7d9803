use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledgerdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use ledgerdesk_events::Event;

/// High-level account kind (determines normal balance side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountKind {
    /// Debit-normal kinds grow on the debit side; the rest grow on credit.
    pub fn is_debit_normal(self) -> bool {
        matches!(self, AccountKind::Asset | AccountKind::Expense)
    }
}

/// Chart account status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Archived,
}

impl AccountStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Archived => "archived",
        }
    }
}

/// Chart account identifier (aggregate id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub AggregateId);

impl AccountId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for AccountId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: ChartAccount (one entry in the chart of accounts).
///
/// `code` and `kind` are fixed at opening; posted history would become
/// unreadable if either could drift. Balances live in projections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartAccount {
    id: AccountId,
    tenant_id: Option<TenantId>,
    code: String,
    name: String,
    kind: AccountKind,
    is_cash: bool,
    status: AccountStatus,
    version: u64,
    created: bool,
}

impl ChartAccount {
    /// Empty aggregate for rehydration.
    pub fn empty(id: AccountId) -> Self {
        Self {
            id,
            tenant_id: None,
            code: String::new(),
            name: String::new(),
            kind: AccountKind::Asset,
            is_cash: false,
            status: AccountStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> AccountId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AccountKind {
        self.kind
    }

    pub fn is_cash(&self) -> bool {
        self.is_cash
    }

    pub fn status(&self) -> AccountStatus {
        self.status
    }

    /// Invariant helper: archived accounts cannot appear on new lines.
    pub fn is_postable(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

impl AggregateRoot for ChartAccount {
    type Id = AccountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenAccount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAccount {
    pub tenant_id: TenantId,
    pub account_id: AccountId,
    pub code: String,
    pub name: String,
    pub kind: AccountKind,
    pub is_cash: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateAccount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAccount {
    pub tenant_id: TenantId,
    pub account_id: AccountId,
    /// Optional new display name (if None, keep existing).
    pub name: Option<String>,
    /// Optional new cash flag (if None, keep existing).
    pub is_cash: Option<bool>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ArchiveAccount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveAccount {
    pub tenant_id: TenantId,
    pub account_id: AccountId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountCommand {
    OpenAccount(OpenAccount),
    UpdateAccount(UpdateAccount),
    ArchiveAccount(ArchiveAccount),
}

/// Event: AccountOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountOpened {
    pub tenant_id: TenantId,
    pub account_id: AccountId,
    pub code: String,
    pub name: String,
    pub kind: AccountKind,
    pub is_cash: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AccountUpdated. Carries resolved (post-update) values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdated {
    pub tenant_id: TenantId,
    pub account_id: AccountId,
    pub code: String,
    pub name: String,
    pub is_cash: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AccountArchived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountArchived {
    pub tenant_id: TenantId,
    pub account_id: AccountId,
    pub code: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountEvent {
    AccountOpened(AccountOpened),
    AccountUpdated(AccountUpdated),
    AccountArchived(AccountArchived),
}

impl Event for AccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AccountEvent::AccountOpened(_) => "accounting.account.opened",
            AccountEvent::AccountUpdated(_) => "accounting.account.updated",
            AccountEvent::AccountArchived(_) => "accounting.account.archived",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AccountEvent::AccountOpened(e) => e.occurred_at,
            AccountEvent::AccountUpdated(e) => e.occurred_at,
            AccountEvent::AccountArchived(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ChartAccount {
    type Command = AccountCommand;
    type Event = AccountEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AccountEvent::AccountOpened(e) => {
                self.id = e.account_id;
                self.tenant_id = Some(e.tenant_id);
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.kind = e.kind;
                self.is_cash = e.is_cash;
                self.status = AccountStatus::Active;
                self.created = true;
            }
            AccountEvent::AccountUpdated(e) => {
                self.name = e.name.clone();
                self.is_cash = e.is_cash;
            }
            AccountEvent::AccountArchived(_) => {
                self.status = AccountStatus::Archived;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AccountCommand::OpenAccount(cmd) => self.handle_open(cmd),
            AccountCommand::UpdateAccount(cmd) => self.handle_update(cmd),
            AccountCommand::ArchiveAccount(cmd) => self.handle_archive(cmd),
        }
    }
}

impl ChartAccount {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_account_id(&self, account_id: AccountId) -> Result<(), DomainError> {
        if self.id != account_id {
            return Err(DomainError::invariant("account_id mismatch"));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenAccount) -> Result<Vec<AccountEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("account already exists"));
        }
        if cmd.code.trim().is_empty() {
            return Err(DomainError::validation("code", "cannot be empty"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name", "cannot be empty"));
        }

        Ok(vec![AccountEvent::AccountOpened(AccountOpened {
            tenant_id: cmd.tenant_id,
            account_id: cmd.account_id,
            code: cmd.code.trim().to_string(),
            name: cmd.name.clone(),
            kind: cmd.kind,
            is_cash: cmd.is_cash,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateAccount) -> Result<Vec<AccountEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_account_id(cmd.account_id)?;
        if self.status == AccountStatus::Archived {
            return Err(DomainError::conflict("account is archived"));
        }

        let new_name = cmd.name.clone().unwrap_or_else(|| self.name.clone());
        if new_name.trim().is_empty() {
            return Err(DomainError::validation("name", "cannot be empty"));
        }
        let new_is_cash = cmd.is_cash.unwrap_or(self.is_cash);

        Ok(vec![AccountEvent::AccountUpdated(AccountUpdated {
            tenant_id: cmd.tenant_id,
            account_id: cmd.account_id,
            code: self.code.clone(),
            name: new_name,
            is_cash: new_is_cash,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_archive(&self, cmd: &ArchiveAccount) -> Result<Vec<AccountEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_account_id(cmd.account_id)?;

        if self.status == AccountStatus::Archived {
            return Err(DomainError::conflict("account is already archived"));
        }

        Ok(vec![AccountEvent::AccountArchived(AccountArchived {
            tenant_id: cmd.tenant_id,
            account_id: cmd.account_id,
            code: self.code.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
