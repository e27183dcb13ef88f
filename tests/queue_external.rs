use rand::{rngs::StdRng, Rng, SeedableRng};
use sequence_heap::{Block, BlockManager, Config, PrefetchPool, PriorityQueue, WritePool};
use std::sync::Arc;
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

#[test]
fn random_keys_spill_to_external_level() -> sequence_heap::Result<()> {
    let config = tiny_config();

    let manager = Arc::new(BlockManager::temporary(Block::<u32>::raw_size(
        config.block_len,
    ))?);
    let p_pool = Arc::new(PrefetchPool::new(
        Arc::clone(&manager),
        config.block_len,
        config.compression,
        config.prefetch_slots,
    )?);
    let w_pool = Arc::new(WritePool::new(
        Arc::clone(&manager),
        config.block_len,
        config.compression,
        config.write_buffers,
    )?);

    let mut queue = PriorityQueue::<u32>::new(config, p_pool, w_pool);
    let baseline = queue.memory_usage();

    let mut rng = StdRng::seed_from_u64(0xDECAF);
    let mut reference: Vec<u32> = (0..1_024)
        .map(|_| rng.random_range(0..u32::MAX))
        .collect();

    for &v in &reference {
        queue.push(v)?;
    }

    // with these parameters 1024 keys cannot stay in memory
    assert!(
        manager.live_blocks() > 0,
        "no promotion crossed into the external level"
    );
    assert!(queue.memory_usage() > baseline);

    let mut out = Vec::new();
    while let Some(v) = queue.pop()? {
        out.push(v);
    }

    reference.sort_unstable();
    assert_eq!(reference, out);

    // a drained queue holds no segments and has returned every block id
    assert_eq!(baseline, queue.memory_usage());
    assert_eq!(0, manager.live_blocks());

    Ok(())
}

#[test]
fn external_spill_with_interleaved_pops() -> sequence_heap::Result<()> {
    let mut queue = PriorityQueue::<u32>::open_temp(tiny_config())?;

    let mut rng = StdRng::seed_from_u64(7);
    let mut model: Vec<u32> = Vec::new();

    for round in 0..64 {
        for _ in 0..24 {
            let v = rng.random_range(0..1_000_000);
            queue.push(v)?;
            model.push(v);
        }

        model.sort_unstable();
        for _ in 0..(round % 16) {
            let expected = model.remove(0);
            assert_eq!(Some(expected), queue.pop()?);
        }
    }

    model.sort_unstable();
    for expected in model {
        assert_eq!(Some(expected), queue.pop()?);
    }
    assert!(queue.is_empty());

    Ok(())
}
