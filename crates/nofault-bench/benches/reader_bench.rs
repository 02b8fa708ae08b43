//! Reader back-end benchmarks.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use nofault_bench::{LENGTHS, StringFixture};
use nofault_core::copy_string_nofault_with;
use nofault_membrane::{PipeReader, ProcessVmReader, UntrustedReader};

fn bench_backend<R: UntrustedReader>(c: &mut Criterion, reader: R) {
    let mut group = c.benchmark_group(format!("reader_{}", reader.name()));

    for &len in LENGTHS {
        let fixture = StringFixture::new(len).expect("map fixture");
        let limit = fixture.size();
        group.bench_with_input(BenchmarkId::from_parameter(len), &limit, |b, &limit| {
            let mut dst = vec![0_u8; limit];
            b.iter(|| {
                let got =
                    copy_string_nofault_with(&reader, &mut dst, fixture.src(), limit as isize);
                criterion::black_box(got)
            });
        });
    }
    group.finish();
}

fn bench_readers(c: &mut Criterion) {
    bench_backend(c, PipeReader);
    bench_backend(c, ProcessVmReader);
}

criterion_group!(benches, bench_readers);
criterion_main!(benches);
