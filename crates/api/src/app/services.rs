use std::sync::Arc;

use serde_json::Value as JsonValue;

use ledgerdesk_accounting::account::AccountId;
use ledgerdesk_accounting::fiscal::FiscalYearId;
use ledgerdesk_accounting::voucher::VoucherId;
use ledgerdesk_core::{AggregateId, Aggregate, DomainError, TenantId};
use ledgerdesk_crm::address::AddressId;
use ledgerdesk_crm::customer::CustomerId;
use ledgerdesk_events::{EventBus, EventEnvelope, InMemoryEventBus};
use ledgerdesk_infra::{
    command_dispatcher::{CommandDispatcher, DispatchError},
    event_store::{EventStore, EventStoreError, InMemoryEventStore, PostgresEventStore, StoredEvent},
    projections::{
        AccountReadModel, AddressBookProjection, AddressReadModel, BalanceKey,
        ChartOfAccountsProjection, CustomerDirectoryProjection, CustomerReadModel,
        FiscalCalendarProjection, FiscalYearReadModel, PeriodBalance, PeriodBalancesProjection,
        VoucherReadModel, VoucherRegisterProjection,
    },
    read_model::InMemoryTenantStore,
};
use sqlx::PgPool;

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type Dispatcher = CommandDispatcher<Arc<dyn EventStore>, Bus>;
type Store<K, V> = Arc<InMemoryTenantStore<K, V>>;

/// Everything the handlers need: the dispatcher for the write side and the
/// projections for the read side.
///
/// The event store behind the dispatcher is chosen at startup
/// (`USE_PERSISTENT_STORES` + `DATABASE_URL` select Postgres, otherwise
/// in-memory); read models stay in-memory and are rebuilt from the stream on
/// restart.
pub struct AppServices {
    dispatcher: Arc<Dispatcher>,
    customers: Arc<CustomerDirectoryProjection<Store<CustomerId, CustomerReadModel>>>,
    addresses: Arc<AddressBookProjection<Store<AddressId, AddressReadModel>>>,
    chart: Arc<ChartOfAccountsProjection<Store<String, AccountReadModel>>>,
    fiscal: Arc<FiscalCalendarProjection<Store<FiscalYearId, FiscalYearReadModel>>>,
    vouchers: Arc<VoucherRegisterProjection<Store<VoucherId, VoucherReadModel>>>,
    balances: Arc<PeriodBalancesProjection<Store<BalanceKey, PeriodBalance>, Store<String, AccountReadModel>>>,
}

pub async fn build_services() -> AppServices {
    let use_persistent = std::env::var("USE_PERSISTENT_STORES")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    let store: Arc<dyn EventStore> = if use_persistent {
        let database_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");
        let pool = PgPool::connect(&database_url)
            .await
            .expect("failed to connect to Postgres");
        Arc::new(PostgresEventStore::new(pool))
    } else {
        Arc::new(InMemoryEventStore::new())
    };

    build_with_store(store)
}

fn build_with_store(store: Arc<dyn EventStore>) -> AppServices {
    let bus: Bus = Arc::new(InMemoryEventBus::new());

    let customers = Arc::new(CustomerDirectoryProjection::new(
        Arc::new(InMemoryTenantStore::new()),
    ));
    let addresses = Arc::new(AddressBookProjection::new(
        Arc::new(InMemoryTenantStore::new()),
    ));
    let chart_store: Store<String, AccountReadModel> = Arc::new(InMemoryTenantStore::new());
    let chart = Arc::new(ChartOfAccountsProjection::new(chart_store.clone()));
    let fiscal = Arc::new(FiscalCalendarProjection::new(
        Arc::new(InMemoryTenantStore::new()),
    ));
    let vouchers = Arc::new(VoucherRegisterProjection::new(
        Arc::new(InMemoryTenantStore::new()),
    ));
    // The balance projection snapshots kind/is_cash from the same store the
    // chart projection writes into.
    let balances = Arc::new(PeriodBalancesProjection::new(
        Arc::new(InMemoryTenantStore::new()),
        chart_store,
    ));

    // Background subscriber: bus -> projections, routed by aggregate type.
    {
        let sub = bus.subscribe();
        let customers = customers.clone();
        let addresses = addresses.clone();
        let chart = chart.clone();
        let fiscal = fiscal.clone();
        let vouchers = vouchers.clone();
        let balances = balances.clone();
        tokio::task::spawn_blocking(move || loop {
            match sub.recv() {
                Ok(env) => {
                    let at = env.aggregate_type();

                    let apply_ok = match at {
                        "crm.customer" => customers.apply_envelope(&env).map_err(|e| e.to_string()),
                        "crm.address" => addresses.apply_envelope(&env).map_err(|e| e.to_string()),
                        "accounting.account" => chart.apply_envelope(&env).map_err(|e| e.to_string()),
                        "accounting.fiscal_year" => fiscal.apply_envelope(&env).map_err(|e| e.to_string()),
                        "accounting.voucher" => {
                            if let Err(e) = vouchers.apply_envelope(&env) {
                                Err(e.to_string())
                            } else if let Err(e) = balances.apply_envelope(&env) {
                                Err(e.to_string())
                            } else {
                                Ok(())
                            }
                        }
                        _ => Ok(()),
                    };

                    if let Err(e) = apply_ok {
                        tracing::warn!("projection apply failed: {e}");
                    }
                }
                Err(_) => break,
            }
        });
    }

    let dispatcher = Arc::new(CommandDispatcher::new(store, bus));
    AppServices {
        dispatcher,
        customers,
        addresses,
        chart,
        fiscal,
        vouchers,
        balances,
    }
}

impl AppServices {
    /// Dispatch a command off the async runtime.
    ///
    /// The store trait is synchronous (the Postgres backend blocks on its
    /// own runtime handle), so the whole pipeline runs on the blocking pool.
    pub async fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &'static str,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A + Send + 'static,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError> + 'static,
        A::Command: Send + 'static,
        A::Event: ledgerdesk_events::Event + serde::Serialize + serde::de::DeserializeOwned,
    {
        let dispatcher = self.dispatcher.clone();
        tokio::task::spawn_blocking(move || {
            dispatcher.dispatch::<A>(tenant_id, aggregate_id, aggregate_type, command, make_aggregate)
        })
        .await
        .map_err(|e| {
            DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "dispatch task failed: {e}"
            )))
        })?
    }

    pub fn customers_get(&self, tenant_id: TenantId, id: CustomerId) -> Option<CustomerReadModel> {
        self.customers.get(tenant_id, id)
    }

    pub fn customers_list(&self, tenant_id: TenantId) -> Vec<CustomerReadModel> {
        self.customers.list(tenant_id)
    }

    pub fn addresses_get(&self, tenant_id: TenantId, id: AddressId) -> Option<AddressReadModel> {
        self.addresses.get(tenant_id, id)
    }

    pub fn addresses_list(&self, tenant_id: TenantId) -> Vec<AddressReadModel> {
        self.addresses.list(tenant_id)
    }

    pub fn accounts_get(&self, tenant_id: TenantId, code: &str) -> Option<AccountReadModel> {
        self.chart.get(tenant_id, code)
    }

    pub fn accounts_list(&self, tenant_id: TenantId) -> Vec<AccountReadModel> {
        self.chart.list(tenant_id)
    }

    pub fn fiscal_years_get(
        &self,
        tenant_id: TenantId,
        id: FiscalYearId,
    ) -> Option<FiscalYearReadModel> {
        self.fiscal.get(tenant_id, id)
    }

    pub fn fiscal_years_list(&self, tenant_id: TenantId) -> Vec<FiscalYearReadModel> {
        self.fiscal.list(tenant_id)
    }

    pub fn vouchers_get(&self, tenant_id: TenantId, id: VoucherId) -> Option<VoucherReadModel> {
        self.vouchers.get(tenant_id, id)
    }

    pub fn vouchers_list(&self, tenant_id: TenantId) -> Vec<VoucherReadModel> {
        self.vouchers.list(tenant_id)
    }

    pub fn balances_for_year(
        &self,
        tenant_id: TenantId,
        fiscal_year_id: FiscalYearId,
    ) -> Vec<PeriodBalance> {
        self.balances.list_for_year(tenant_id, fiscal_year_id)
    }
}
