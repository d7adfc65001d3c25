//! HD派生性能基准
//!
//! 地址分配路径上每次都会重新派生，关注单次派生耗时。

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use chipcore::domain::{chain::Blockchain, derivation::HdWallet};

const BENCH_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

fn bench_derivation(c: &mut Criterion) {
    let wallet = HdWallet::from_mnemonic(BENCH_MNEMONIC).unwrap();

    c.bench_function("solana_address", |b| {
        let mut index = 0u32;
        b.iter(|| {
            index = index.wrapping_add(1);
            black_box(wallet.address(Blockchain::Solana, black_box(index)).unwrap())
        })
    });

    c.bench_function("tron_address", |b| {
        let mut index = 0u32;
        b.iter(|| {
            index = index.wrapping_add(1);
            black_box(wallet.address(Blockchain::Tron, black_box(index)).unwrap())
        })
    });

    c.bench_function("mnemonic_to_seed", |b| {
        b.iter(|| black_box(HdWallet::from_mnemonic(black_box(BENCH_MNEMONIC)).unwrap()))
    });
}

criterion_group!(benches, bench_derivation);
criterion_main!(benches);
