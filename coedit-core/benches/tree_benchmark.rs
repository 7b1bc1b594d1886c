use coedit_core::{FileNode, FileTree};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

/// 10 folders × 50 files, nested two levels deep.
fn build_tree() -> FileTree {
    let mut tree = FileTree::new();
    for d in 0..10 {
        let folder = format!("d{d}");
        tree.create(FileNode::folder(&folder, format!("dir{d}")), None);
        let inner = format!("d{d}-inner");
        tree.create(FileNode::folder(&inner, "inner"), Some(&folder));
        for f in 0..50 {
            tree.create(FileNode::file(format!("f{d}-{f}"), format!("file{f}.rs")), Some(&inner));
        }
    }
    tree
}

fn bench_locate_deep(c: &mut Criterion) {
    let tree = build_tree();
    c.bench_function("locate_last_of_520", |b| {
        b.iter(|| black_box(tree.locate(black_box("f9-49"))))
    });
}

fn bench_create(c: &mut Criterion) {
    let tree = build_tree();
    c.bench_function("create_in_folder", |b| {
        b.iter(|| {
            let mut t = tree.clone();
            black_box(t.create(FileNode::file("new", "new.rs"), Some("d5-inner")));
        })
    });
}

fn bench_move(c: &mut Criterion) {
    let tree = build_tree();
    c.bench_function("move_folder_to_folder", |b| {
        b.iter(|| {
            let mut t = tree.clone();
            black_box(t.move_node("d3-inner", Some("d7")));
        })
    });
}

fn bench_update_content(c: &mut Criterion) {
    let mut tree = build_tree();
    let content = "fn main() {}\n".repeat(200);
    c.bench_function("update_content_2_6kb", |b| {
        b.iter(|| black_box(tree.update_content("f4-25", &content)))
    });
}

fn bench_serialize(c: &mut Criterion) {
    let tree = build_tree();
    c.bench_function("serialize_520_nodes", |b| {
        b.iter(|| black_box(serde_json::to_string(&tree).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_locate_deep,
    bench_create,
    bench_move,
    bench_update_content,
    bench_serialize,
);
criterion_main!(benches);
