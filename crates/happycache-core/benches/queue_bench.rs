use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use happycache_core::queue::Queue;

fn bench_push_pop_single_thread(c: &mut Criterion) {
    c.bench_function("queue_push_pop_single_thread", |b| {
        let q: Queue<u64> = Queue::new();
        b.iter(|| {
            q.push_tail(black_box(1));
            q.pop_head()
        })
    });
}

fn bench_contended_push_pop(c: &mut Criterion) {
    c.bench_function("queue_contended_4p_4c", |b| {
        b.iter(|| {
            let q = Arc::new(Queue::<u64>::new());
            let producers: Vec<_> = (0..4)
                .map(|_| {
                    let q = q.clone();
                    thread::spawn(move || {
                        for i in 0..250u64 {
                            q.push_tail(black_box(i));
                        }
                    })
                })
                .collect();
            for p in producers {
                p.join().unwrap();
            }
            q.close();

            let consumers: Vec<_> = (0..4)
                .map(|_| {
                    let q = q.clone();
                    thread::spawn(move || while q.pop_head().is_some() {})
                })
                .collect();
            for c in consumers {
                c.join().unwrap();
            }
        })
    });
}

criterion_group!(benches, bench_push_pop_single_thread, bench_contended_push_pop);
criterion_main!(benches);
