use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use chrono::Utc;
use ledgerdesk_accounting::fiscal::{FiscalPeriodId, FiscalYearId};
use ledgerdesk_accounting::voucher::{
    ApproveVoucher, DraftVoucher, PostVoucher, Voucher, VoucherCommand, VoucherEvent, VoucherId,
    VoucherLine, VoucherPosted,
};
use ledgerdesk_core::{AggregateId, ExpectedVersion, TenantId};
use ledgerdesk_events::{EventEnvelope, InMemoryEventBus};
use ledgerdesk_infra::command_dispatcher::CommandDispatcher;
use ledgerdesk_infra::event_store::{EventStore, InMemoryEventStore, UncommittedEvent};
use ledgerdesk_infra::projections::{BalanceKey, PeriodBalance, PeriodBalancesProjection};
use ledgerdesk_infra::read_model::InMemoryTenantStore;
use ledgerdesk_infra::projections::chart_of_accounts::AccountReadModel;

type Bus = Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>;

fn setup_dispatcher() -> (CommandDispatcher<InMemoryEventStore, Bus>, TenantId) {
    let store = InMemoryEventStore::new();
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    (CommandDispatcher::new(store, bus), TenantId::new())
}

fn line(code: &str, debit: i64, credit: i64) -> VoucherLine {
    VoucherLine {
        account_code: code.to_string(),
        account_name: format!("account {code}"),
        debit,
        credit,
        description: None,
    }
}

fn draft(tenant_id: TenantId, voucher_id: VoucherId) -> VoucherCommand {
    VoucherCommand::DraftVoucher(DraftVoucher {
        tenant_id,
        voucher_id,
        voucher_no: "JV-1".to_string(),
        fiscal_year_id: FiscalYearId(AggregateId::new()),
        fiscal_period_id: FiscalPeriodId(uuid::Uuid::now_v7()),
        narration: None,
        lines: vec![line("1000", 500, 0), line("4000", 0, 500)],
        occurred_at: Utc::now(),
    })
}

fn bench_command_execution_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_execution_latency");
    group.sample_size(1000);

    group.bench_function("draft_voucher_fresh", |b| {
        let (dispatcher, tenant_id) = setup_dispatcher();
        b.iter(|| {
            let voucher_id = VoucherId(AggregateId::new());
            dispatcher
                .dispatch::<Voucher>(
                    tenant_id,
                    voucher_id.0,
                    "accounting.voucher",
                    black_box(draft(tenant_id, voucher_id)),
                    |_, id| Voucher::empty(VoucherId(id)),
                )
                .unwrap();
        });
    });

    group.bench_function("post_voucher_with_history", |b| {
        let (dispatcher, tenant_id) = setup_dispatcher();

        b.iter(|| {
            let voucher_id = VoucherId(AggregateId::new());
            dispatcher
                .dispatch::<Voucher>(
                    tenant_id,
                    voucher_id.0,
                    "accounting.voucher",
                    draft(tenant_id, voucher_id),
                    |_, id| Voucher::empty(VoucherId(id)),
                )
                .unwrap();
            dispatcher
                .dispatch::<Voucher>(
                    tenant_id,
                    voucher_id.0,
                    "accounting.voucher",
                    VoucherCommand::ApproveVoucher(ApproveVoucher {
                        tenant_id,
                        voucher_id,
                        occurred_at: Utc::now(),
                    }),
                    |_, id| Voucher::empty(VoucherId(id)),
                )
                .unwrap();
            dispatcher
                .dispatch::<Voucher>(
                    tenant_id,
                    voucher_id.0,
                    "accounting.voucher",
                    VoucherCommand::PostVoucher(PostVoucher {
                        tenant_id,
                        voucher_id,
                        posted_at: Utc::now(),
                        occurred_at: Utc::now(),
                    }),
                    |_, id| Voucher::empty(VoucherId(id)),
                )
                .unwrap();
        });
    });

    group.finish();
}

fn bench_event_append_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_append_throughput");

    for batch_size in [1, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::new("batch_append", batch_size),
            batch_size,
            |b, &size| {
                let store = InMemoryEventStore::new();
                let tenant_id = TenantId::new();
                let voucher_id = VoucherId(AggregateId::new());

                b.iter(|| {
                    let events: Vec<UncommittedEvent> = (0..size)
                        .map(|_| {
                            let event = VoucherEvent::VoucherPosted(VoucherPosted {
                                tenant_id,
                                voucher_id,
                                voucher_no: "JV-1".to_string(),
                                fiscal_year_id: FiscalYearId(AggregateId::new()),
                                fiscal_period_id: FiscalPeriodId(uuid::Uuid::now_v7()),
                                lines: vec![line("1000", 500, 0), line("4000", 0, 500)],
                                posted_at: Utc::now(),
                                occurred_at: Utc::now(),
                            });
                            UncommittedEvent::from_typed(
                                tenant_id,
                                voucher_id.0,
                                "accounting.voucher",
                                uuid::Uuid::now_v7(),
                                &event,
                            )
                            .unwrap()
                        })
                        .collect();

                    black_box(store.append(events, ExpectedVersion::Any).unwrap());
                });
            },
        );
    }

    group.finish();
}

fn bench_projection_rebuild_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("projection_rebuild_speed");

    for event_count in [10, 100, 1000, 10000].iter() {
        group.bench_with_input(
            BenchmarkId::new("rebuild_period_balances", event_count),
            event_count,
            |b, &count| {
                let tenant_id = TenantId::new();
                let fiscal_year_id = FiscalYearId(AggregateId::new());
                let fiscal_period_id = FiscalPeriodId(uuid::Uuid::now_v7());

                // One posted voucher per stream keeps every envelope at
                // sequence 1, which is all the rebuild path needs.
                let envelopes: Vec<EventEnvelope<serde_json::Value>> = (0..count)
                    .map(|i| {
                        let voucher_id = VoucherId(AggregateId::new());
                        let event = VoucherEvent::VoucherPosted(VoucherPosted {
                            tenant_id,
                            voucher_id,
                            voucher_no: format!("JV-{i}"),
                            fiscal_year_id,
                            fiscal_period_id,
                            lines: vec![line("1000", 500, 0), line("4000", 0, 500)],
                            posted_at: Utc::now(),
                            occurred_at: Utc::now(),
                        });
                        EventEnvelope::new(
                            uuid::Uuid::now_v7(),
                            tenant_id,
                            voucher_id.0,
                            "accounting.voucher",
                            1,
                            serde_json::to_value(&event).unwrap(),
                        )
                    })
                    .collect();

                let balances: Arc<InMemoryTenantStore<BalanceKey, PeriodBalance>> =
                    Arc::new(InMemoryTenantStore::new());
                let chart: Arc<InMemoryTenantStore<String, AccountReadModel>> =
                    Arc::new(InMemoryTenantStore::new());
                let projection = PeriodBalancesProjection::new(balances, chart);

                b.iter(|| {
                    projection
                        .rebuild_from_scratch(black_box(envelopes.clone()))
                        .unwrap();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_command_execution_latency,
    bench_event_append_throughput,
    bench_projection_rebuild_speed
);
criterion_main!(benches);
