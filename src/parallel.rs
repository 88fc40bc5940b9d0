//! 并行批处理
//!
//! 把 `[0, N)` 划分为连续的批次，每个线程处理一个批次，调用方阻塞直到全部完成。
//! 批次在一个 `num_threads` 大小的 rayon 线程池里执行。

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

/// 少于该数量时在调用线程上串行处理（除非强制并行）
pub const SERIAL_THRESHOLD: usize = 64;

/// 硬件线程数（rayon 全局线程池的大小）
pub fn num_hardware_threads() -> usize {
    rayon::current_num_threads()
}

/// 线程安全的进度计数
#[derive(Debug)]
pub struct ProgressCounter {
    processed: AtomicUsize,
    total: usize,
}

impl ProgressCounter {
    pub fn new(total: usize) -> Self {
        Self {
            processed: AtomicUsize::new(0),
            total,
        }
    }

    /// 增加 `n` 并返回新的已处理数量
    #[inline]
    pub fn add(&self, n: usize) -> usize {
        self.processed.fetch_add(n, Ordering::Relaxed) + n
    }

    #[inline]
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.processed() as f64 / self.total as f64
        }
    }
}

/// 每个批次的长度：`num_items` 均分到 `num_threads` 个批次后向上取整
pub fn batch_size(num_items: usize, num_threads: usize) -> usize {
    assert!(num_threads > 0, "num_threads must be positive");
    num_items.div_ceil(num_threads).max(1)
}

fn run_serially(num_items: usize, always_parallelize: bool, num_threads: usize) -> bool {
    num_threads == 1 || (!always_parallelize && num_items < SERIAL_THRESHOLD)
}

fn build_pool(num_threads: usize) -> Option<rayon::ThreadPool> {
    match rayon::ThreadPoolBuilder::new().num_threads(num_threads).build() {
        Ok(pool) => Some(pool),
        Err(e) => {
            log::warn!("failed to build thread pool ({}), processing serially", e);
            None
        }
    }
}

/// 并行处理 `[0, num_items)`，每个批次以索引切片的形式交给 `work`
pub fn parallel_process<F>(num_items: usize, work: F, always_parallelize: bool, num_threads: usize)
where
    F: Fn(&[usize]) + Sync,
{
    assert!(num_threads > 0, "num_threads must be positive");
    if num_items == 0 {
        return;
    }
    let indices: Vec<usize> = (0..num_items).collect();
    let pool = if run_serially(num_items, always_parallelize, num_threads) {
        None
    } else {
        build_pool(num_threads)
    };
    let Some(pool) = pool else {
        work(&indices);
        return;
    };

    let progress = ProgressCounter::new(num_items);
    let chunk_len = batch_size(num_items, num_threads);
    log::debug!(
        "processing {} items in batches of {}",
        num_items,
        chunk_len
    );
    pool.install(|| {
        indices.par_chunks(chunk_len).for_each(|batch| {
            work(batch);
            let done = progress.add(batch.len());
            log::debug!("progress {}/{}", done, progress.total());
        });
    });
}

/// 并行地对每个元素调用 `work(index, &mut item)`，各线程持有互不相交的连续切片
pub fn parallel_process_mut<T, F>(
    items: &mut [T],
    work: F,
    always_parallelize: bool,
    num_threads: usize,
) where
    T: Send,
    F: Fn(usize, &mut T) + Sync,
{
    assert!(num_threads > 0, "num_threads must be positive");
    let num_items = items.len();
    if num_items == 0 {
        return;
    }
    let pool = if run_serially(num_items, always_parallelize, num_threads) {
        None
    } else {
        build_pool(num_threads)
    };
    let Some(pool) = pool else {
        for (index, item) in items.iter_mut().enumerate() {
            work(index, item);
        }
        return;
    };

    let progress = ProgressCounter::new(num_items);
    let chunk_len = batch_size(num_items, num_threads);
    pool.install(|| {
        items
            .par_chunks_mut(chunk_len)
            .enumerate()
            .for_each(|(batch_index, chunk)| {
                let start = batch_index * chunk_len;
                for (offset, item) in chunk.iter_mut().enumerate() {
                    work(start + offset, item);
                }
                let done = progress.add(chunk.len());
                log::debug!("progress {}/{}", done, progress.total());
            });
    });
}
