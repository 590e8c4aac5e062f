use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput::Bytes};
use halcyon::simd::{longest_valid_run, CharClass};

const TARGETS: [&[u8]; 4] = [
    b"/",
    b"/api/v1.0/weather/forecast/days/16",
    b"/wp-content/uploads/2010/03/hello-kitty-darth-vader-pink.jpg",
    b"/nvidia_web_services/controller.gfeclientcontent.php/com.nvidia.services.GFEClientContent.getShieldReady",
];

fn benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("target");
    for target in TARGETS {
        group.throughput(Bytes(target.len() as u64));

        group.bench_with_input(BenchmarkId::new("simd_table", target.len()), black_box(&target), |b, i| {
            b.iter(|| {
                let mut pos = 0;
                while pos < i.len() {
                    let run = longest_valid_run(&i[pos..], CharClass::UrlPath);
                    if run == 0 {
                        break;
                    }
                    pos += run;
                }
            })
        });

        group.bench_with_input(BenchmarkId::new("scalar_loop", target.len()), black_box(&target), |b, i| {
            b.iter(|| {
                let mut pos = 0;
                for &byte in i.iter() {
                    if !halcyon::simd::is_valid(CharClass::UrlPath, byte) {
                        break;
                    }
                    pos += 1;
                }
                black_box(pos);
            })
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
