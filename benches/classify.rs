//! Benchmark for the hierarchy classification pass

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use serde_json::json;
use tracker_dash::hierarchy::{build_forest, LevelRules, ProjectTree};
use tracker_dash::models::ProjectRecord;

const CUSTOMERS: i64 = 9;
const SITES_PER_CUSTOMER: i64 = 6;
const BUILDINGS_PER_SITE: i64 = 4;
const LEAVES_PER_BUILDING: i64 = 12;

fn record(id: i64, name: String, parent: Option<i64>) -> ProjectRecord {
    let mut raw = json!({"id": id, "name": &name});
    if let Some(parent) = parent {
        raw["parent"] = json!({"id": parent});
    }
    ProjectRecord {
        redmine_id: id,
        name,
        parent_id: parent,
        raw_data: raw,
    }
}

/// A customer > site > building > leaf tree of roughly 2,500 projects
fn snapshot() -> (Vec<ProjectRecord>, Vec<i64>) {
    let mut records = Vec::new();
    let mut customers = Vec::new();
    let mut next_id = 1;
    let mut id = || {
        next_id += 1;
        next_id
    };

    for c in 0..CUSTOMERS {
        let customer = id();
        customers.push(customer);
        records.push(record(customer, format!("{:02}. Customer {}", c + 1, c), None));
        for s in 0..SITES_PER_CUSTOMER {
            let site = id();
            records.push(record(site, format!("Fab {}", s), Some(customer)));
            for b in 0..BUILDINGS_PER_SITE {
                let building = id();
                records.push(record(building, format!("Bldg {}", b), Some(site)));
                for l in 0..LEAVES_PER_BUILDING {
                    let leaf = id();
                    records.push(record(leaf, format!("Tool {} #{:02}", l % 4, l), Some(building)));
                }
            }
        }
    }
    // upstream order is not id order
    records.reverse();
    (records, customers)
}

fn bench_build_forest(c: &mut Criterion) {
    let (records, customers) = snapshot();
    let rules = LevelRules::new(customers);

    let mut group = c.benchmark_group("classify");
    group.throughput(Throughput::Elements(records.len() as u64));

    group.bench_function("build_forest", |b| {
        b.iter_batched(
            || records.clone(),
            |records| black_box(build_forest(records, &rules)),
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let (records, customers) = snapshot();
    let rules = LevelRules::new(customers.clone());
    let tree = ProjectTree::new(build_forest(records, &rules).nodes, customers);
    let all = vec!["ALL".to_string()];
    let tool = vec!["Tool 1".to_string()];

    let mut group = c.benchmark_group("resolve");

    group.bench_function("resolve_all_sites", |b| {
        let sites: Vec<usize> = (0..CUSTOMERS as usize).collect();
        b.iter(|| black_box(tree.resolve_all(&sites, &all, &all)));
    });

    group.bench_function("resolve_one_product", |b| {
        b.iter(|| black_box(tree.resolve_all(&[0], &all, &tool)));
    });

    group.finish();
}

criterion_group!(benches, bench_build_forest, bench_resolve);
criterion_main!(benches);
