use std::hint::black_box;
use std::io::Read;
use std::thread;
use std::time::Duration;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use spark_pipe::{BoundedCopy, pipe};

const PAYLOAD: usize = 1 << 20;

fn cross_thread_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipe");
    group.throughput(Throughput::Bytes(PAYLOAD as u64));

    for chunk in [64usize, 4096] {
        group.bench_function(format!("stream_{chunk}b_chunks"), |b| {
            let data = vec![0xA5u8; PAYLOAD];
            b.iter(|| {
                let (sink, mut source) = pipe();
                let data = data.clone();
                let writer = thread::spawn(move || {
                    for piece in data.chunks(chunk) {
                        sink.write(piece).expect("write");
                    }
                });
                let mut received = Vec::with_capacity(PAYLOAD);
                source.read_to_end(&mut received).expect("read");
                writer.join().expect("writer");
                black_box(received.len())
            });
        });
    }
    group.finish();
}

fn bounded_copy(c: &mut Criterion) {
    c.bench_function("bounded_copy_64k", |b| {
        let data = vec![1u8; 64 * 1024];
        b.iter(|| {
            let (sink, source) = pipe();
            sink.write(&data).expect("write");
            sink.close();
            let mut out = Vec::with_capacity(data.len());
            let outcome = BoundedCopy::new(Duration::from_secs(5))
                .run(&source, &mut out)
                .expect("copy");
            black_box(outcome)
        });
    });
}

criterion_group!(benches, cross_thread_stream, bounded_copy);
criterion_main!(benches);
