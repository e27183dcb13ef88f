use rand::{rngs::StdRng, Rng, SeedableRng};
use sequence_heap::{Config, PriorityQueue};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use test_log::test;

fn tiny_config() -> Config {
    Config::new()
        .buffer1_size(4)
        .run_length(8)
        .int_arity(2)
        .int_levels(2)
        .block_len(16)
        .ext_arity(2)
        .ext_levels(1)
}

/// Random operation mix checked against a reference heap.
#[test]
fn queue_agrees_with_reference_model() -> sequence_heap::Result<()> {
    for seed in 0..4u64 {
        let mut queue = PriorityQueue::<u32>::open_temp(tiny_config())?;
        let mut model: BinaryHeap<Reverse<u32>> = BinaryHeap::new();
        let mut rng = StdRng::seed_from_u64(seed);

        for _ in 0..3_000 {
            if model.is_empty() || rng.random_range(0..10) < 6 {
                let v = rng.random_range(0..u32::MAX);
                queue.push(v)?;
                model.push(Reverse(v));
            } else {
                let Reverse(expected) = model.pop().expect("model not empty");
                assert_eq!(Some(expected), queue.pop()?);
            }

            assert_eq!(model.len() as u64, queue.len());
        }

        // drain both
        while let Some(Reverse(expected)) = model.pop() {
            assert_eq!(Some(expected), queue.pop()?);
        }
        assert!(queue.is_empty());
    }

    Ok(())
}

/// The sentinel value terminates runs internally; it may never surface.
#[test]
fn sentinel_never_escapes() -> sequence_heap::Result<()> {
    let mut queue = PriorityQueue::<u32>::open_temp(tiny_config())?;
    let mut rng = StdRng::seed_from_u64(99);

    for _ in 0..500 {
        queue.push(rng.random_range(0..u32::MAX))?;
    }

    while let Some(v) = queue.pop()? {
        assert_ne!(u32::MAX, v);
    }

    Ok(())
}

/// Pop order is globally non-decreasing no matter how the pushes interleave.
#[test]
fn pop_order_is_non_decreasing() -> sequence_heap::Result<()> {
    let mut queue = PriorityQueue::<u64>::open_temp(tiny_config())?;
    let mut rng = StdRng::seed_from_u64(123);

    let mut pushed = 0u64;
    let mut floor = None;

    for _ in 0..2_000 {
        if pushed < 1 || rng.random_range(0..3) > 0 {
            // never push below what was already popped, so the global
            // pop sequence must stay sorted
            let base = floor.unwrap_or(0);
            queue.push(base + rng.random_range(0..1_000))?;
            pushed += 1;
        } else if let Some(v) = queue.pop()? {
            if let Some(f) = floor {
                assert!(f <= v, "{f} popped before {v}");
            }
            floor = Some(v);
        }
    }

    while let Some(v) = queue.pop()? {
        if let Some(f) = floor {
            assert!(f <= v);
        }
        floor = Some(v);
    }

    Ok(())
}
