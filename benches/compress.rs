use criterion::{criterion_group, criterion_main, Criterion};
use netc::compress::{compress, compress_bound};
use netc::config::Config;
use netc::context::Context;
use netc::decompress::decompress;
use netc::dictionary::Dictionary;
use std::sync::Arc;

fn criterion_benchmark(c: &mut Criterion) {
    let corpus_pkt: Vec<u8> = (0..512u32).map(|i| ((i * 37) % 251) as u8).collect();
    let dict = Arc::new(Dictionary::train(&[&corpus_pkt], 1, false).unwrap());

    let mut enc_ctx = Context::create(Some(dict.clone()), Config::default()).unwrap();
    let mut wire = vec![0u8; compress_bound(corpus_pkt.len())];
    c.bench_function("compress 512B packet with dictionary", |b| {
        b.iter(|| compress(&mut enc_ctx, &corpus_pkt, &mut wire).unwrap())
    });

    let n = compress(&mut enc_ctx, &corpus_pkt, &mut wire).unwrap();
    let mut dec_ctx = Context::create(Some(dict), Config::default()).unwrap();
    let mut out = vec![0u8; corpus_pkt.len()];
    c.bench_function("decompress 512B packet with dictionary", |b| {
        b.iter(|| decompress(&mut dec_ctx, &wire[..n], &mut out).unwrap())
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
