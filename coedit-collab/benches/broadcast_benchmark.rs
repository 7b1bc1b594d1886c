use std::hint::black_box;
use std::sync::Arc;

use coedit_collab::broadcast::{Audience, Dispatcher};
use coedit_collab::protocol::{ClientMessage, ConnectionId, ServerMessage};
use coedit_core::FileNode;
use criterion::{criterion_group, criterion_main, Criterion};
use tokio::sync::mpsc;

fn sample_forest() -> Vec<FileNode> {
    (0..20)
        .map(|d| {
            (0..10).fold(FileNode::folder(format!("d{d}"), format!("dir{d}")), |folder, f| {
                folder.with_child(FileNode::file(format!("f{d}-{f}"), format!("file{f}.rs")).with_content("fn main() {}\n"))
            })
        })
        .collect()
}

fn bench_files_update_encode(c: &mut Criterion) {
    let files = sample_forest();
    c.bench_function("files_update_encode_220_nodes", |b| {
        b.iter(|| black_box(ServerMessage::files_update("R1", black_box(&files)).encode().unwrap()))
    });
}

fn bench_client_decode(c: &mut Criterion) {
    let frame = r#"{"event":"code-change","data":{"roomId":"R1","fileId":"f1","code":"fn main() { println!(\"hi\"); }"}}"#;
    c.bench_function("code_change_decode", |b| {
        b.iter(|| black_box(ClientMessage::decode(black_box(frame)).unwrap()))
    });
}

fn bench_fanout_100_subscribers(c: &mut Criterion) {
    let dispatcher = Dispatcher::new();
    let mut receivers = Vec::new();
    for _ in 0..100 {
        let (tx, rx) = mpsc::unbounded_channel();
        dispatcher.subscribe("R1", ConnectionId::new(), tx);
        receivers.push(rx);
    }
    let frame: Arc<str> = Arc::from(ServerMessage::code_change("R1", "f1", "x = 1").encode().unwrap());

    c.bench_function("fanout_1000_msgs_100_subscribers", |b| {
        b.iter(|| {
            for _ in 0..1000 {
                black_box(dispatcher.emit_raw("R1", &frame, Audience::Everyone));
            }
            for rx in receivers.iter_mut() {
                while rx.try_recv().is_ok() {}
            }
        })
    });
}

criterion_group!(
    benches,
    bench_files_update_encode,
    bench_client_decode,
    bench_fanout_100_subscribers
);
criterion_main!(benches);
