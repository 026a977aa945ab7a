//! Benchmark suite for parsing and completion
//!
//! This benchmark measures:
//! - Parsing state files of growing size
//! - Node lookup at a cursor (find_node_at_position)
//! - Intent classification plus schema completion at a `module.` anchor

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use salt_language_server::ir::Position;
use salt_language_server::lsp::features::completion::{complete, determine_intent};
use salt_language_server::lsp::features::node_finder::find_node_at_position;
use salt_language_server::parsers::{LineIndex, parse};
use salt_language_server::state_schema::StateSchema;

/// Generate a state file with `states` states, each calling a function with
/// a few parameters and a requisite list. The last state ends in `file.`.
fn generate_states(states: usize) -> String {
    let mut text = String::from("include:\n  - common\n  - .users\n\n");
    for i in 0..states {
        text.push_str(&format!(
            "/srv/app/config{i}.yml:\n  file.managed:\n    - source: salt://app/config{i}.yml\n    - user: root\n    - mode: '0644'\n    - require:\n      - pkg: app\n      - /srv/app/config{prev}.yml\n\n",
            prev = i.saturating_sub(1)
        ));
    }
    text.push_str("anchor:\n  file.\n");
    text
}

fn last_line(text: &str) -> u32 {
    LineIndex::new(text).line_count() as u32 - 2
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    for states in &[10, 100, 1000] {
        let text = generate_states(*states);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::new("states", states), &text, |b, text| {
            b.iter(|| parse(black_box(text)));
        });
    }

    group.finish();
}

fn bench_node_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("node_lookup");

    for states in &[10, 100, 1000] {
        let text = generate_states(*states);
        let tree = parse(&text);
        let position = Position::new(last_line(&text), 7);
        group.bench_with_input(BenchmarkId::new("last_state", states), &(text, tree), |b, (text, tree)| {
            let index = LineIndex::new(text);
            b.iter(|| find_node_at_position(tree, &index, black_box(position)));
        });
    }

    group.finish();
}

fn bench_completion(c: &mut Criterion) {
    let mut group = c.benchmark_group("completion");
    let schema = StateSchema::bundled();

    for states in &[10, 100, 1000] {
        let text = generate_states(*states);
        let tree = parse(&text);
        let position = Position::new(last_line(&text), 7);
        group.bench_with_input(BenchmarkId::new("file_functions", states), &(text, tree), |b, (text, tree)| {
            b.iter(|| {
                let intent = determine_intent(tree, text, black_box(position), Some("."));
                intent.map(|intent| complete(&schema, &intent))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse, bench_node_lookup, bench_completion);

criterion_main!(benches);
