//! Access resolution benchmarks
//!
//! `reachable` is measured cold (fresh build, memo empty) and warm; `decide`
//! is measured against a warm memo, which is the steady state in production.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rolevote_authz::{
    Attribute, CachingRoleStore, HierarchyResolver, HierarchyRuleSource, RegistryRoleSource, RoleRegistry,
    RoleRule, RoleSource, Voter,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn known_roles(count: usize) -> BTreeSet<String> {
    (0..count).map(|i| format!("EAB_Resource{}_view", i)).collect()
}

fn rules(count: usize) -> Vec<HierarchyRuleSource> {
    let mut rules = vec![HierarchyRuleSource::pattern("ROLE_ADMIN", "/^EAB_/")];
    for i in 0..count / 10 {
        rules.push(HierarchyRuleSource::list(
            format!("ROLE_TEAM{}", i),
            (i * 10..i * 10 + 10).map(|n| format!("EAB_Resource{}_view", n)),
        ));
    }
    rules.push(HierarchyRuleSource::list(
        "ROLE_LEAD",
        (0..count / 10).map(|i| format!("ROLE_TEAM{}", i)),
    ));
    rules
}

fn bench_reachable(c: &mut Criterion) {
    let mut group = c.benchmark_group("reachable");

    for role_count in [100, 1000, 10000].iter() {
        let known = known_roles(*role_count);
        let rules = rules(*role_count);

        group.bench_with_input(BenchmarkId::new("cold", role_count), role_count, |b, _| {
            b.iter(|| {
                let resolver = HierarchyResolver::new();
                resolver.build(&rules, &known).unwrap();
                black_box(resolver.reachable(black_box(["ROLE_LEAD"])).unwrap());
            });
        });

        let resolver = HierarchyResolver::new();
        resolver.build(&rules, &known).unwrap();
        resolver.reachable(["ROLE_LEAD"]).unwrap();

        group.bench_with_input(BenchmarkId::new("warm", role_count), role_count, |b, _| {
            b.iter(|| black_box(resolver.reachable(black_box(["ROLE_LEAD"])).unwrap()));
        });
    }

    group.finish();
}

fn bench_decide(c: &mut Criterion) {
    let mut group = c.benchmark_group("decide");

    let resolver = Arc::new(HierarchyResolver::new());
    resolver.build(&rules(1000), &known_roles(1000)).unwrap();
    let voter = Voter::new(resolver);

    let granted = [Attribute::from("EAB_Resource999_view")];
    let denied = [Attribute::from("EAB_Missing"), Attribute::from("EAB_Other")];
    let abstained = [Attribute::from("ROLE_USER")];

    group.bench_function("grant", |b| {
        b.iter(|| black_box(voter.decide(black_box(&["ROLE_LEAD"]), &granted, "EAB_")));
    });
    group.bench_function("deny", |b| {
        b.iter(|| black_box(voter.decide(black_box(&["ROLE_LEAD"]), &denied, "EAB_")));
    });
    group.bench_function("abstain", |b| {
        b.iter(|| black_box(voter.decide(black_box(&["ROLE_LEAD"]), &abstained, "EAB_")));
    });

    group.finish();
}

fn bench_cached_roles(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let store = rt.block_on(async {
        let mut registry = RoleRegistry::new();
        for i in 0..1000 {
            registry.register(RoleRule::new(format!("Resource{}", i), "Resource")).unwrap();
        }
        let source = RegistryRoleSource::new(Arc::new(registry), Vec::new());
        let store = CachingRoleStore::new(Arc::new(source));
        store.roles().await.unwrap();
        store
    });

    c.bench_function("cached_roles", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(store.roles().await.unwrap());
        });
    });
}

criterion_group!(benches, bench_reachable, bench_decide, bench_cached_roles);
criterion_main!(benches);
