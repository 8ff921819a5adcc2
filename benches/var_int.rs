use std::hint::black_box;

use divan::Bencher;
use rand::Rng;
use strata::protocol::{Decode, Encode, VarInt};

/// Ids of a full hash map palette, spread over a registry of 20k states.
fn palette_ids() -> Vec<VarInt> {
    let mut rng = rand::thread_rng();
    (0..256).map(|_| VarInt(rng.gen_range(0..20_000))).collect()
}

#[divan::bench]
fn palette_ids_encode(bencher: Bencher) {
    let ids = palette_ids();
    let mut buf = Vec::with_capacity(1 + ids.len() * VarInt::MAX_SIZE);

    bencher.bench_local(|| {
        buf.clear();
        black_box(&ids).encode(&mut buf).unwrap();
        black_box(buf.len())
    });
}

#[divan::bench]
fn palette_ids_decode(bencher: Bencher) {
    let mut buf = vec![];
    palette_ids().encode(&mut buf).unwrap();

    bencher.bench_local(|| Vec::<VarInt>::decode(&mut black_box(buf.as_slice())).unwrap());
}
