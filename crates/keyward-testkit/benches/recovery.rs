use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use keyward_testkit::fixtures::{TestAccount, TestFixture};

fn bench_recover_through_chain(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("recover_content_key");

    for hops in 0..=3usize {
        let fixture = TestFixture::memory().unwrap();
        let (owner, reader) = (TestAccount::new(), TestAccount::new());
        let chain = rt
            .block_on(fixture.proxy_chain(&owner, &reader, hops))
            .unwrap();
        let target = chain[0].id;

        group.bench_with_input(BenchmarkId::from_parameter(hops), &hops, |b, _| {
            b.iter(|| {
                rt.block_on(fixture.vault.recover_content_key(
                    &fixture.org,
                    black_box(&target),
                    &reader.id,
                    &reader.key,
                ))
                .unwrap()
            })
        });
    }
    group.finish();
}

fn bench_write_and_read(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let fixture = TestFixture::memory().unwrap();
    let owner = TestAccount::new();
    let policy = rt.block_on(fixture.policy(&owner)).unwrap();
    let content = vec![0x42u8; 256 * 1024];

    c.bench_function("write_secret_256k", |b| {
        b.iter(|| {
            rt.block_on(fixture.vault.write_secret(
                &fixture.org,
                &owner.id,
                &owner.key,
                &policy.id,
                "/bench/blob",
                black_box(&content),
            ))
            .unwrap()
        })
    });

    c.bench_function("read_secret_256k", |b| {
        b.iter(|| {
            rt.block_on(fixture.vault.read_secret(&fixture.org, &owner.id, &owner.key, "/bench/blob"))
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_recover_through_chain, bench_write_and_read);
criterion_main!(benches);
