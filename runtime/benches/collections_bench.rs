use braid_runtime::{Atom, PersistentMap, PersistentVector};
use codspeed_criterion_compat::{Criterion, black_box, criterion_group, criterion_main};
use std::time::Duration;

// ============================================================================
// Vector Benchmarks
// ============================================================================

fn bench_vector_conj(c: &mut Criterion) {
    c.bench_function("vector conj 1000", |b| {
        b.iter(|| {
            let v = (0..1000).fold(PersistentVector::new(), |v, i| v.conj(i));
            black_box(v)
        })
    });
}

fn bench_vector_update(c: &mut Criterion) {
    let v: PersistentVector<i64> = (0..10_000).collect();
    c.bench_function("vector update in 10k", |b| {
        b.iter(|| black_box(v.update(black_box(5_000), -1)))
    });
}

// ============================================================================
// Map Benchmarks
// ============================================================================

fn bench_map_assoc(c: &mut Criterion) {
    c.bench_function("map assoc 1000", |b| {
        b.iter(|| {
            let m = (0..1000).fold(PersistentMap::new(), |m, i| m.assoc(i, i));
            black_box(m)
        })
    });
}

fn bench_map_get(c: &mut Criterion) {
    let m: PersistentMap<i64, i64> = (0..10_000).map(|i| (i, i)).collect();
    c.bench_function("map get in 10k", |b| b.iter(|| black_box(m.get(&black_box(7_777)))));
}

// ============================================================================
// Atom Benchmarks
// ============================================================================

fn bench_atom_swap(c: &mut Criterion) {
    let atom = Atom::new(0i64);
    c.bench_function("atom swap uncontended", |b| {
        b.iter(|| black_box(atom.swap(|n| n + 1)))
    });
}

criterion_group! {
    name = collection_benches;
    config = Criterion::default()
        .sample_size(100)
        .measurement_time(Duration::from_secs(5));
    targets =
        bench_vector_conj,
        bench_vector_update,
        bench_map_assoc,
        bench_map_get,
        bench_atom_swap
}

criterion_main!(collection_benches);
