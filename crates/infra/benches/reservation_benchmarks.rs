//! Benchmarks for the reservation engine's hot paths.
//!
//! Run with: cargo bench -p dropshop-infra

use std::sync::Arc;

use criterion::{
    BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main,
};

use dropshop_core::HolderId;
use dropshop_events::{DropEvent, InMemoryEventBus};
use dropshop_infra::manager::{ReservationConfig, ReservationManager};
use dropshop_infra::reclaimer::ExpiryReclaimer;
use dropshop_infra::store::{InMemoryReservationStore, ReservationStore};
use dropshop_inventory::Item;

type Bus = Arc<InMemoryEventBus<DropEvent>>;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Runtime::new().unwrap()
}

fn engine(
    lease: chrono::Duration,
) -> (
    InMemoryReservationStore,
    Bus,
    ReservationManager<InMemoryReservationStore, Bus>,
) {
    let store = InMemoryReservationStore::new();
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let manager = ReservationManager::new(
        store.clone(),
        bus.clone(),
        ReservationConfig::default().with_lease_duration(lease),
    );
    (store, bus, manager)
}

fn seed_item(rt: &tokio::runtime::Runtime, store: &InMemoryReservationStore, total: u32) -> Item {
    let item = Item::new("bench drop", 1_000, total, None, None).unwrap();
    rt.block_on(store.insert_item(&item)).unwrap();
    item
}

/// Latency of a single uncontended reserve, including the commit and the
/// post-commit publications.
fn bench_reserve_latency(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("reserve_latency");
    group.sample_size(1000);

    group.bench_function("uncontended_reserve", |b| {
        b.iter_batched(
            || {
                let (store, _bus, manager) = engine(chrono::Duration::seconds(60));
                let item = seed_item(&rt, &store, u32::MAX);
                (manager, item.id)
            },
            |(manager, item_id)| {
                let receipt = rt
                    .block_on(manager.reserve(black_box(HolderId::new()), item_id))
                    .unwrap();
                black_box(receipt);
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

/// Throughput of concurrent reserves racing for the same item. All tasks
/// serialize on the item's section, so this measures the cost of the lock
/// queue rather than parallel speedup.
fn bench_contended_reserves(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("contended_reserves");

    for tasks in [2usize, 4, 8].iter() {
        group.throughput(Throughput::Elements(*tasks as u64));
        group.bench_with_input(
            BenchmarkId::new("same_item", tasks),
            tasks,
            |b, &tasks| {
                b.iter_batched(
                    || {
                        let (store, _bus, manager) = engine(chrono::Duration::seconds(60));
                        let item = seed_item(&rt, &store, u32::MAX);
                        (Arc::new(manager), item.id)
                    },
                    |(manager, item_id)| {
                        rt.block_on(async {
                            let mut handles = Vec::with_capacity(tasks);
                            for _ in 0..tasks {
                                let manager = manager.clone();
                                handles.push(tokio::spawn(async move {
                                    manager.reserve(HolderId::new(), item_id).await
                                }));
                            }
                            for handle in handles {
                                handle.await.unwrap().unwrap();
                            }
                        });
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

/// Cost of one full sweep over a batch of timed-out leases.
fn bench_sweep_throughput(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("sweep_throughput");
    group.sample_size(20);

    for count in [10usize, 100].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(
            BenchmarkId::new("expired_leases", count),
            count,
            |b, &count| {
                b.iter_batched(
                    || {
                        rt.block_on(async {
                            let (store, bus, manager) = engine(chrono::Duration::zero());
                            let item = Item::new("bench drop", 1_000, count as u32, None, None)
                                .unwrap();
                            store.insert_item(&item).await.unwrap();
                            for _ in 0..count {
                                manager.reserve(HolderId::new(), item.id).await.unwrap();
                            }
                            ExpiryReclaimer::new(store, bus)
                        })
                    },
                    |reclaimer| {
                        let now = chrono::Utc::now() + chrono::Duration::seconds(1);
                        let stats = rt.block_on(reclaimer.sweep_once(now));
                        black_box(stats);
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_reserve_latency,
    bench_contended_reserves,
    bench_sweep_throughput
);
criterion_main!(benches);
