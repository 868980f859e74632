use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use jobsync_core::{Job, JobId, JobPage, JobPatch, JobQuery, JobStatus, JobType, Origin, ResourceId, ResourceRef};
use jobsync_store::{JobMap, JobStateStore, merge};

fn running_job(i: usize) -> Job {
    let mut job = Job::new(
        JobId::new(format!("job-{i}")),
        JobType::EnvironmentSync,
        ResourceRef::Environment(ResourceId::new(format!("env-{}", i % 16))),
        Utc::now(),
    );
    job.status = JobStatus::Running;
    job.progress.current = Some(1);
    job.progress.total = Some(100);
    job
}

fn populated_map(size: usize) -> JobMap {
    let store = JobStateStore::new();
    let patches: Vec<JobPatch> = (0..size)
        .map(|i| JobPatch::from_job(&running_job(i), Utc::now()))
        .collect();
    store.apply_all(&patches, Origin::BulkPoll, store.next_sequence());
    (0..size)
        .filter_map(|i| {
            let id = JobId::new(format!("job-{i}"));
            store.snapshot().tracked(&id).cloned().map(|tracked| (id, tracked))
        })
        .collect()
}

fn bench_single_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_progress_event");
    group.throughput(Throughput::Elements(1));

    for size in [10usize, 100, 1000] {
        let map = populated_map(size);
        let patch = JobPatch::new(JobId::new("job-0"), Utc::now()).with_counters(50, 100);
        group.bench_with_input(BenchmarkId::from_parameter(size), &map, |b, map| {
            b.iter(|| black_box(merge(map, &patch, Origin::Stream, 10)));
        });
    }

    group.finish();
}

fn bench_page_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_bulk_page");

    for page_size in [20usize, 100] {
        let page = JobPage {
            items: (0..page_size).map(running_job).collect(),
            total: page_size as u64,
            total_pages: 1,
        };
        let query = JobQuery::page(1, page_size as u32);
        group.throughput(Throughput::Elements(page_size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(page_size), &page, |b, page| {
            let store = JobStateStore::new();
            b.iter(|| {
                let seq = store.next_sequence();
                black_box(store.apply_page(&query, page, seq, Utc::now()))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_single_merge, bench_page_apply);
criterion_main!(benches);
