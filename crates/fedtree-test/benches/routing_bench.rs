//! Benchmarks for topic worker publication handling

use std::sync::Arc;

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use fedtree_core::{BrokerId, PubId};
use fedtree_runtime::{FederatorContext, TopicWorker};
use fedtree_transport::MemoryTransport;
use fedtree_wire::{
    CoreAnnouncement, Message, MembershipAnnouncement, Publication, RoutedPublication,
};

use fedtree_test::{OverlaySimulator, Topology};

/// Worker at broker 1 with parent 2 and children 3..=6
fn routed_worker() -> (TopicWorker, Vec<MemoryTransport>) {
    let mut links = Vec::new();
    let mut ctx = FederatorContext::new(BrokerId(1), 2, 10_000, Arc::new(MemoryTransport::new()));
    for id in 2..=6 {
        let link = MemoryTransport::new();
        ctx = ctx.with_neighbor(BrokerId(id), Arc::new(link.clone()));
        links.push(link);
    }

    let mut worker = TopicWorker::new("bench", Arc::new(ctx));
    worker.handle(CoreAnnouncement::new(BrokerId(9), 0, BrokerId(2)).into());
    for child in 3..=6 {
        worker.handle(MembershipAnnouncement::new(BrokerId(9), BrokerId(child)).into());
    }
    (worker, links)
}

fn bench_routed_publication(c: &mut Criterion) {
    let (mut worker, links) = routed_worker();
    let payload = Bytes::from(vec![0u8; 256]);
    let mut seq = 0u64;

    c.bench_function("worker_routed_fresh", |b| {
        b.iter(|| {
            seq += 1;
            let routed = RoutedPublication::new(PubId::new(BrokerId(9), seq), BrokerId(2), payload.clone());
            worker.handle(black_box(Message::from(routed)));
            for link in &links {
                link.drain();
            }
        })
    });

    let duplicate = Message::from(RoutedPublication::new(
        PubId::new(BrokerId(9), 0),
        BrokerId(2),
        payload.clone(),
    ));
    worker.handle(duplicate.clone());
    c.bench_function("worker_routed_duplicate", |b| {
        b.iter(|| worker.handle(black_box(duplicate.clone())))
    });
}

fn bench_local_publication(c: &mut Criterion) {
    let (mut worker, links) = routed_worker();
    let payload = Bytes::from(vec![0u8; 256]);

    c.bench_function("worker_publication", |b| {
        b.iter(|| {
            worker.handle(black_box(Message::Publication(Publication::new(payload.clone()))));
            for link in &links {
                link.drain();
            }
        })
    });
}

fn bench_grid_convergence(c: &mut Criterion) {
    c.bench_function("grid_5x5_tree_build", |b| {
        b.iter(|| {
            let mut sim = OverlaySimulator::new(Topology::grid(5, 5), 2, 100, 7);
            sim.subscribe(BrokerId(13), "bench");
            black_box(sim.run_until_quiet(1_000))
        })
    });
}

criterion_group!(
    benches,
    bench_routed_publication,
    bench_local_publication,
    bench_grid_convergence
);
criterion_main!(benches);
