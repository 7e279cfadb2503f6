//! Benchmarks for rivulet-incremental views.
//!
//! Each benchmark measures one source edit propagating through a view that
//! is already built over `size` items.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rivulet_core::ReadList;
use rivulet_incremental::{CompositeList, FilteredList, GroupedList, SortedList};
use rivulet_reactive::ObservableVec;

const SIZES: [usize; 3] = [10, 100, 1000];

fn numbers(size: usize) -> Vec<i64> {
    (0..size as i64).map(|i| (i * 7919) % 1000).collect()
}

fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter");

    for size in SIZES {
        let source = ObservableVec::new(numbers(size));
        let even = FilteredList::new(source.as_list(), |x: &i64| x % 2 == 0);
        let middle = size / 2;

        group.bench_with_input(BenchmarkId::new("set_middle", size), &middle, |b, &i| {
            let mut next = 0i64;
            b.iter(|| {
                next += 1;
                source.set(i, black_box(next)).unwrap();
            })
        });
        group.bench_with_input(BenchmarkId::new("insert_remove_front", size), &size, |b, _| {
            b.iter(|| {
                source.insert(0, black_box(2)).unwrap();
                source.remove_at(0).unwrap();
            })
        });
        black_box(even.len());
    }

    group.finish();
}

fn bench_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort");

    for size in SIZES {
        let source = ObservableVec::new(numbers(size));
        let sorted = SortedList::by_key(source.as_list(), |x: &i64| *x);
        let middle = size / 2;

        group.bench_with_input(BenchmarkId::new("set_middle", size), &middle, |b, &i| {
            let mut next = 0i64;
            b.iter(|| {
                next = (next + 389) % 1000;
                source.set(i, black_box(next)).unwrap();
            })
        });
        group.bench_with_input(BenchmarkId::new("move_first_to_last", size), &size, |b, &n| {
            b.iter(|| source.move_item(0, black_box(n - 1)).unwrap())
        });
        black_box(sorted.len());
    }

    group.finish();
}

fn bench_group(c: &mut Criterion) {
    let mut group = c.benchmark_group("group");

    for size in SIZES {
        let source = ObservableVec::new(numbers(size));
        let grouped = GroupedList::new(source.as_list(), |x: &i64| x % 10);
        let middle = size / 2;

        group.bench_with_input(BenchmarkId::new("set_middle", size), &middle, |b, &i| {
            let mut next = 0i64;
            b.iter(|| {
                next += 1;
                source.set(i, black_box(next)).unwrap();
            })
        });
        black_box(grouped.len());
    }

    group.finish();
}

fn bench_composite(c: &mut Criterion) {
    let mut group = c.benchmark_group("composite");

    for size in SIZES {
        let parts: Vec<_> = (0..10).map(|_| ObservableVec::new(numbers(size / 10))).collect();
        let flat = CompositeList::from_parts(parts.iter().map(|p| p.as_list()).collect());

        group.bench_with_input(BenchmarkId::new("push_first_part", size), &size, |b, _| {
            b.iter(|| {
                parts[0].push(black_box(1));
                parts[0].remove_at(0).unwrap();
            })
        });
        black_box(flat.len());
    }

    group.finish();
}

criterion_group!(benches, bench_filter, bench_sort, bench_group, bench_composite);
criterion_main!(benches);
