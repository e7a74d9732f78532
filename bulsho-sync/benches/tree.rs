use bulsho_shared::types::Answer;
use bulsho_sync::build_forest;
use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use uuid::Uuid;

/// Creates a thread where each answer replies to one of the earlier ones.
fn make_answers(count: usize) -> Vec<Answer> {
    let question_id = Uuid::new_v4();
    let ids: Vec<Uuid> = (0..count).map(|_| Uuid::new_v4()).collect();
    (0..count)
        .map(|i| Answer {
            id: ids[i],
            question_id,
            // Every fifth answer is top level, the rest reply to a recent answer.
            parent_id: if i % 5 == 0 { None } else { Some(ids[i - 1 - (i % 3).min(i - 1)]) },
            author_id: Uuid::new_v4(),
            content: format!("jawaab {}", i),
            created_at: Utc::now(),
        })
        .collect()
}

/// Creates a single reply chain, the deepest possible thread.
fn make_chain(count: usize) -> Vec<Answer> {
    let question_id = Uuid::new_v4();
    let mut parent = None;
    (0..count)
        .map(|_| {
            let id = Uuid::new_v4();
            let answer = Answer {
                id,
                question_id,
                parent_id: parent,
                author_id: Uuid::new_v4(),
                content: String::new(),
                created_at: Utc::now(),
            };
            parent = Some(id);
            answer
        })
        .collect()
}

fn threaded_answers(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_forest");

    for size in [10, 100, 1000, 10_000].iter() {
        group.bench_with_input(format!("answers_{}", size), size, |b, &size| {
            b.iter_batched(
                || make_answers(size),
                |answers| build_forest(black_box(answers)),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn reply_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_forest_chain");
    group.sample_size(10);

    for size in [1000, 10_000].iter() {
        group.bench_with_input(format!("depth_{}", size), size, |b, &size| {
            b.iter_batched(
                || make_chain(size),
                |answers| build_forest(black_box(answers)),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, threaded_answers, reply_chain);
criterion_main!(benches);
