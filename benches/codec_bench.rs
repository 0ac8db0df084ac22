//! Stream codec benchmarks.
//!
//! End-to-end throughput of the framing layer: plaintext through the
//! encryptor, ciphertext back through the decryptor, including the
//! MAX_PAYLOAD splitting and carry-buffer reassembly paths.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use shadowpipe::codec::{Decryptor, Encryptor};
use shadowpipe::crypto::{CipherKind, MasterKey};

const MESSAGE: usize = 64 * 1024;

fn bench_encrypt(c: &mut Criterion) {
    let plaintext = vec![0u8; MESSAGE];
    let mut group = c.benchmark_group("encryptor_64k");
    group.throughput(Throughput::Bytes(MESSAGE as u64));

    for kind in CipherKind::all() {
        let master = MasterKey::derive("bench", kind.key_len());
        group.bench_function(kind.to_string(), |b| {
            b.iter(|| {
                let mut enc = Encryptor::new(kind, &master).unwrap();
                black_box(enc.encrypt(black_box(&plaintext)).unwrap())
            })
        });
    }
    group.finish();
}

fn bench_roundtrip(c: &mut Criterion) {
    let plaintext = vec![0u8; MESSAGE];
    let mut group = c.benchmark_group("roundtrip_64k");
    group.throughput(Throughput::Bytes(MESSAGE as u64));

    for kind in CipherKind::all() {
        let master = MasterKey::derive("bench", kind.key_len());
        group.bench_function(kind.to_string(), |b| {
            b.iter(|| {
                let mut enc = Encryptor::new(kind, &master).unwrap();
                let wire = enc.encrypt(&plaintext).unwrap();
                let mut dec = Decryptor::new(kind, MasterKey::derive("bench", kind.key_len()));
                // feed in transport-sized chunks to exercise the carry buffer
                let mut out = Vec::with_capacity(MESSAGE);
                for chunk in wire.chunks(16 * 1024) {
                    out.extend(dec.feed(chunk).unwrap());
                }
                black_box(out)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encrypt, bench_roundtrip);
criterion_main!(benches);
