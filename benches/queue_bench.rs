use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::thread;

use crossbeam_channel::bounded;
use std::sync::mpsc::sync_channel;

const MESSAGES: usize = 100_000;
const BUFFER_SIZE: usize = 1024;

fn bench_1p_1c(c: &mut Criterion) {
    let mut group = c.benchmark_group("1p_1c");
    group.throughput(Throughput::Elements(MESSAGES as u64));

    group.bench_function("handoff", |b| {
        b.iter(|| {
            let (tx, rx) = handoff::channel::<usize, BUFFER_SIZE>();

            let producer = thread::spawn(move || {
                for i in 0..MESSAGES {
                    tx.force_push(black_box(i));
                }
            });

            let consumer = thread::spawn(move || {
                for _ in 0..MESSAGES {
                    let _ = rx.force_pop();
                }
            });

            producer.join().unwrap();
            consumer.join().unwrap();
        });
    });

    group.bench_function("crossbeam_channel", |b| {
        b.iter(|| {
            let (tx, rx) = bounded::<usize>(BUFFER_SIZE);

            let producer = thread::spawn(move || {
                for i in 0..MESSAGES {
                    tx.send(black_box(i)).unwrap();
                }
            });

            let consumer = thread::spawn(move || {
                for _ in 0..MESSAGES {
                    rx.recv().unwrap();
                }
            });

            producer.join().unwrap();
            consumer.join().unwrap();
        });
    });

    group.bench_function("std_mpsc", |b| {
        b.iter(|| {
            let (tx, rx) = sync_channel::<usize>(BUFFER_SIZE);

            let producer = thread::spawn(move || {
                for i in 0..MESSAGES {
                    tx.send(black_box(i)).unwrap();
                }
            });

            let consumer = thread::spawn(move || {
                for _ in 0..MESSAGES {
                    rx.recv().unwrap();
                }
            });

            producer.join().unwrap();
            consumer.join().unwrap();
        });
    });

    group.finish();
}

fn bench_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("uncontended");
    group.throughput(Throughput::Elements(BUFFER_SIZE as u64 - 1));

    // Fill-then-drain on one thread: measures the raw push/pop paths with no
    // cache-line ping-pong from a peer.
    group.bench_function("handoff_fill_drain", |b| {
        let (tx, rx) = handoff::channel::<usize, BUFFER_SIZE>();
        b.iter(|| {
            for i in 0..BUFFER_SIZE - 1 {
                tx.push(black_box(i)).unwrap();
            }
            let drained = rx.consume_all(|v| {
                black_box(v);
            });
            assert_eq!(drained, BUFFER_SIZE - 1);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_1p_1c, bench_uncontended);
criterion_main!(benches);
