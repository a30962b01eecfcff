//! Handle registry benchmarks
//!
//! Measures register/unregister churn and resolve hits.

use criterion::{criterion_group, criterion_main, Criterion};
use corelib::RegistryConfig;
use handles::{Handle, HandleRegistry, Handled, OwnerTag};
use std::hint::black_box;
use std::sync::Arc;

struct Obj {
    handle: Handle,
}

impl Handled for Obj {
    fn handle(&self) -> &Handle {
        &self.handle
    }
}

fn bench_register_unregister(c: &mut Criterion) {
    let registry = HandleRegistry::new(&RegistryConfig::default()).unwrap();
    let tag = OwnerTag::new("bench");

    c.bench_function("register_unregister", |b| {
        b.iter(|| {
            let obj = Arc::new(Obj {
                handle: Handle::new(),
            });
            black_box(registry.register(&obj, tag).unwrap());
            registry.unregister(obj.handle());
        })
    });
}

fn bench_resolve(c: &mut Criterion) {
    let registry = HandleRegistry::new(&RegistryConfig::default()).unwrap();
    let tag = OwnerTag::new("bench");
    let objects: Vec<_> = (0..10_000)
        .map(|_| {
            Arc::new(Obj {
                handle: Handle::new(),
            })
        })
        .collect();
    let cookies: Vec<_> = objects
        .iter()
        .map(|o| registry.register(o, tag).unwrap())
        .collect();

    c.bench_function("resolve_hit", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % cookies.len();
            black_box(registry.resolve_as::<Obj>(cookies[i], tag).unwrap());
        })
    });
}

criterion_group!(benches, bench_register_unregister, bench_resolve);
criterion_main!(benches);
