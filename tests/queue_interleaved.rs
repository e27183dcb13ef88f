use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use sequence_heap::{Config, PriorityQueue};
use test_log::test;

const N: u64 = 8;

fn config() -> Config {
    Config::new()
        .buffer1_size(4)
        .run_length(N as usize)
        .int_arity(4)
        .int_levels(2)
        .block_len(16)
        .ext_arity(2)
        .ext_levels(1)
}

#[test]
fn push_pop_push_keeps_the_right_multiset() -> sequence_heap::Result<()> {
    let mut queue = PriorityQueue::<u64>::open_temp(config())?;
    let mut rng = StdRng::seed_from_u64(42);

    // 10N distinct keys, shuffled
    let mut first: Vec<u64> = (0..10 * N).map(|i| i * 3).collect();
    first.shuffle(&mut rng);

    for &v in &first {
        queue.push(v)?;
    }

    // pop the 5N smallest
    let mut popped = Vec::new();
    for _ in 0..5 * N {
        popped.push(queue.pop()?.expect("queue should not be empty"));
    }

    let mut smallest: Vec<u64> = (0..10 * N).map(|i| i * 3).collect();
    smallest.truncate(5 * N as usize);
    assert_eq!(smallest, popped);

    // push 5N more, then drain
    let second: Vec<u64> = (0..5 * N).map(|i| i * 3 + 1).collect();
    for &v in &second {
        queue.push(v)?;
    }

    let mut drained = Vec::new();
    while let Some(v) = queue.pop()? {
        drained.push(v);
    }

    // the drain must return (first ∪ second) minus the 5N smallest
    let mut expected: Vec<u64> = (5 * N..10 * N).map(|i| i * 3).collect();
    expected.extend(&second);
    expected.sort_unstable();

    assert_eq!(expected, drained);
    Ok(())
}
