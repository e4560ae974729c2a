//! # Derivation Benchmarks
//!
//! Performance benchmarks for sheet derivation and graph walks.
//!
//! Run with: `cargo bench -p valor-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::json;
use std::collections::BTreeMap;
use std::hint::black_box;
use valor_core::derive::skill::{Difficulty, Skill, SkillDefault, SkillEntry, SkillResolver};
use valor_core::{
    CharacterSnapshot, CreateRequest, CrudOptions, EmbedRequest, Identity, MutationEngine,
    Session,
};

/// A character with `size` skills, each defaulting to the one before it.
fn skill_chain(size: usize) -> Vec<SkillEntry> {
    (0..size)
        .map(|i| {
            let mut skill = Skill::new(&format!("Skill {i}"), "DX", Difficulty::Average, 0.0);
            if i > 0 {
                skill = skill.with_default(SkillDefault::skill(&format!("Skill {}", i - 1), -1.0));
            } else {
                skill.points = 4.0;
            }
            skill.into()
        })
        .collect()
}

/// A session holding one character with `size` skills and `size` items.
fn populated_sheet(size: usize) -> (Session, Identity) {
    let mut session = Session::for_sheets();
    let pc = MutationEngine::create(
        &mut session,
        [CreateRequest::new("character", json!({"pointTotal": 250})).container()],
        CrudOptions::default(),
    )
    .applied()
    .into_iter()
    .next()
    .expect("character");

    let skills = (0..size).map(|i| {
        EmbedRequest::new(&pc, "skill", json!({"name": format!("Skill {i}"), "points": 2}))
    });
    MutationEngine::embed(&mut session, skills, CrudOptions::default());
    let items = (0..size).map(|i| {
        EmbedRequest::new(
            &pc,
            "equipment",
            json!({"description": format!("Item {i}"), "value": 10, "weight": 0.5}),
        )
    });
    MutationEngine::embed(&mut session, items, CrudOptions::default());
    (session, pc)
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_skill_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("skill_resolution");
    let attributes = BTreeMap::from([("DX".to_string(), 12.0)]);

    for size in [10, 100, 500].iter() {
        let entries = skill_chain(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(SkillResolver::new(&entries, &attributes).levels()));
        });
    }

    group.finish();
}

fn bench_snapshot_derive(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_derive");

    for size in [10, 100, 1000].iter() {
        let (session, pc) = populated_sheet(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let snapshot = CharacterSnapshot::from_session(&session, &pc.id).expect("snapshot");
                black_box(snapshot.derive())
            });
        });
    }

    group.finish();
}

fn bench_descendants(c: &mut Criterion) {
    let mut group = c.benchmark_group("descendants_of");

    for size in [100, 1000].iter() {
        let (session, pc) = populated_sheet(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(session.descendants_of(&pc.id, None)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_skill_resolution,
    bench_snapshot_derive,
    bench_descendants,
);

criterion_main!(benches);
