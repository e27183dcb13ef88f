use criterion::{criterion_group, criterion_main, Criterion};
use sequence_heap::loser_tree::LoserTree;
use sequence_heap::merge::{merge2, merge4};
use sequence_heap::Value;

fn sorted_run(len: usize, seed: u64) -> Vec<u64> {
    let mut v: Vec<u64> = (0..len as u64)
        .map(|i| i.wrapping_mul(seed) % 1_000_000)
        .collect();
    v.sort_unstable();
    v.push(u64::sentinel());
    v
}

fn merge_primitives(c: &mut Criterion) {
    let len = 10_000;

    c.bench_function("merge2", |b| {
        let s0 = sorted_run(len, 2_654_435_761);
        let s1 = sorted_run(len, 1_013_904_223);
        let mut out = vec![0u64; 2 * len];

        b.iter(|| {
            let (mut c0, mut c1) = (0, 0);
            merge2(&s0, &mut c0, &s1, &mut c1, &mut out);
            out[0]
        })
    });

    c.bench_function("merge4", |b| {
        let s0 = sorted_run(len, 2_654_435_761);
        let s1 = sorted_run(len, 1_013_904_223);
        let s2 = sorted_run(len, 805_306_457);
        let s3 = sorted_run(len, 4_294_967_291);
        let mut out = vec![0u64; 4 * len];

        b.iter(|| {
            let (mut c0, mut c1, mut c2, mut c3) = (0, 0, 0, 0);
            merge4(
                &s0, &mut c0, &s1, &mut c1, &s2, &mut c2, &s3, &mut c3, &mut out,
            );
            out[0]
        })
    });
}

fn loser_tree(c: &mut Criterion) {
    for num in [4, 16, 64] {
        c.bench_function(&format!("loser tree merge {num}"), |b| {
            b.iter_with_large_drop(|| {
                let mut tree = LoserTree::new(64);

                for i in 0..num {
                    let run = sorted_run(1_000, 2_654_435_761 + i);
                    let len = run.len() - 1;
                    tree.insert_segment(run.into_boxed_slice(), len);
                }

                let mut out = vec![0u64; num as usize * 1_000];
                tree.multi_merge(&mut out);
                out
            })
        });
    }
}

criterion_group!(benches, merge_primitives, loser_tree);
criterion_main!(benches);
