use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use thyrse::keccak_p;
use thyrse::kt128::Kt128;
use thyrse::protocol::Protocol;
use thyrse::treewrap;
use thyrse::turboshake::TurboShake128;

const INPUT: usize = 100 * 1024;

fn permutation_benchmarks(c: &mut Criterion) {
    let mut g = c.benchmark_group("permutation");
    g.sample_size(1_000);
    g.throughput(Throughput::Bytes(200));
    g.bench_function("Keccak-p[1600,12]", |b| {
        let mut state = keccak_p::new_state();
        b.iter(|| keccak_p::p1600(&mut state))
    });
    g.bench_function("Keccak-p[1600,12]x2", |b| {
        let mut s0 = keccak_p::new_state();
        let mut s1 = keccak_p::new_state();
        b.iter(|| keccak_p::p1600x2(&mut s0, &mut s1))
    });
    g.finish();
}

fn hash_benchmarks(c: &mut Criterion) {
    let mut g = c.benchmark_group("hash");
    g.sample_size(1_000);
    g.throughput(Throughput::Bytes(INPUT as u64));

    g.bench_with_input("TurboSHAKE128", &[0u8; INPUT], |b, block| {
        b.iter(|| {
            let mut st = TurboShake128::new(0x1f);
            st.write(block);
            st.squeeze(32)
        })
    });
    g.bench_with_input("KT128", &[0u8; INPUT], |b, block| {
        b.iter(|| {
            let mut st = Kt128::new(b"");
            st.write(block);
            st.sum(32)
        })
    });
    g.finish();
}

fn aead_benchmarks(c: &mut Criterion) {
    let mut g = c.benchmark_group("aead");
    g.sample_size(1_000);
    g.throughput(Throughput::Bytes(INPUT as u64));
    let key = [0u8; treewrap::KEY_LEN];

    g.bench_with_input("TreeWrap seal", &vec![0u8; INPUT], |b, block| {
        b.iter(|| treewrap::seal(&key, block))
    });
    g.finish();
}

fn protocol_benchmarks(c: &mut Criterion) {
    let mut g = c.benchmark_group("protocol");
    g.sample_size(1_000);
    g.throughput(Throughput::Bytes(INPUT as u64));

    g.bench_with_input("Mix + Derive", &vec![0u8; INPUT], |b, block| {
        b.iter(|| {
            let mut p = Protocol::new(b"bench");
            p.mix(b"data", block);
            p.derive(b"out", 32)
        })
    });
    g.bench_with_input("Seal", &vec![0u8; INPUT], |b, block| {
        b.iter(|| {
            let mut p = Protocol::new(b"bench");
            p.mix(b"key", b"k");
            p.seal(b"data", block)
        })
    });
    g.finish();
}

criterion_group!(
    benches,
    permutation_benchmarks,
    hash_benchmarks,
    aead_benchmarks,
    protocol_benchmarks
);
criterion_main!(benches);
