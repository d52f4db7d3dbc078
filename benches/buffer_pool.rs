use std::sync::Arc;
use std::thread;

use bufferpool::{
    benchmark_framework::{benchmark, parse_bench_args, print_header, should_run, BenchResult},
    test_utils::{generate_random_number, TestDir},
    BlockId, BlockStore, BufferPool, CountingLogSink, FileBlockStore,
};

fn setup_pool(num_buffers: usize) -> (BufferPool, TestDir) {
    let test_dir = TestDir::new(std::env::temp_dir().join(format!(
        "bufferpool-bench-{}",
        generate_random_number()
    )));
    let store = Arc::new(FileBlockStore::new(&test_dir).unwrap());
    let log = Arc::new(CountingLogSink::new());
    (BufferPool::new(num_buffers, store, log), test_dir)
}

fn precreate_blocks(pool: &BufferPool, file: &str, count: usize) {
    for _ in 0..count {
        pool.store().append(file).unwrap();
    }
}

fn sequential_scan(pool: &BufferPool, num_buffers: usize, iterations: usize) -> BenchResult {
    precreate_blocks(pool, "sequential", num_buffers);
    benchmark("sequential_scan/pin_unpin", iterations, 3, || {
        for block_num in 0..num_buffers {
            let frame = pool.pin(&BlockId::new("sequential", block_num)).unwrap().unwrap();
            pool.unpin(&frame);
        }
    })
}

fn random_access(pool: &BufferPool, working_set: usize, iterations: usize) -> BenchResult {
    precreate_blocks(pool, "random", working_set);
    let indices: Vec<usize> = (0..working_set * 4)
        .map(|_| generate_random_number() % working_set)
        .collect();
    benchmark("random_access/pin_unpin", iterations, 3, || {
        for &block_num in &indices {
            let frame = pool.pin(&BlockId::new("random", block_num)).unwrap().unwrap();
            pool.unpin(&frame);
        }
    })
}

fn contended_pin(pool: &Arc<BufferPool>, num_threads: usize, ops_per_thread: usize) -> BenchResult {
    pool.store().append("hot").unwrap();
    benchmark("contended/pin_same_block", 5, 1, || {
        let handles: Vec<_> = (0..num_threads)
            .map(|_| {
                let pool = Arc::clone(pool);
                thread::spawn(move || {
                    for _ in 0..ops_per_thread {
                        let frame = pool.pin(&BlockId::new("hot", 0)).unwrap().unwrap();
                        pool.unpin(&frame);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    })
}

fn main() {
    let (iterations, num_buffers, json_output, filter) = parse_bench_args();

    if !json_output {
        print_header();
    }

    let mut results = Vec::new();

    if should_run("sequential_scan", filter.as_deref()) {
        let (pool, _dir) = setup_pool(num_buffers);
        results.push(sequential_scan(&pool, num_buffers, iterations));
    }
    if should_run("random_access", filter.as_deref()) {
        let (pool, _dir) = setup_pool(num_buffers);
        results.push(random_access(&pool, num_buffers * 4, iterations));
    }
    if should_run("contended", filter.as_deref()) {
        let (pool, _dir) = setup_pool(num_buffers.max(2));
        let pool = Arc::new(pool);
        results.push(contended_pin(&pool, 4, 200));
    }

    for result in &results {
        if json_output {
            println!("{}", result.to_json());
        } else {
            println!("{result}");
        }
    }
}
