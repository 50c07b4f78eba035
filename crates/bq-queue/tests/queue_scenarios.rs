//! End-to-end behavior of `BlockQueue` across threads.

#![cfg(not(loom))]

use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bq_queue::{BlockQueue, QueueConfig, QueueError, TimedPopPolicy};

#[test]
fn test_capacity_two_walkthrough() {
    let queue = BlockQueue::new(2);

    queue.push("A").unwrap();
    assert_eq!(queue.len().unwrap(), 1);
    queue.push("B").unwrap();
    assert_eq!(queue.len().unwrap(), 2);

    let err = queue.push("C").unwrap_err();
    assert_eq!(err.kind(), QueueError::Full);
    assert_eq!(queue.len().unwrap(), 2);

    assert_eq!(queue.pop().unwrap(), "A");
    assert_eq!(queue.len().unwrap(), 1);
    assert_eq!(queue.pop().unwrap(), "B");
    assert_eq!(queue.len().unwrap(), 0);

    assert_eq!(queue.pop_timeout_ms(10), Err(QueueError::Timeout));
}

#[test]
fn test_single_thread_fifo_with_rejections() {
    let queue = BlockQueue::new(5);
    let mut accepted = Vec::new();
    let mut popped = Vec::new();

    for i in 0..200u32 {
        if i % 3 == 2 {
            if let Ok(item) = queue.try_pop() {
                popped.push(item);
            }
        } else {
            let len_before = queue.len().unwrap();
            match queue.push(i) {
                Ok(()) => accepted.push(i),
                Err(e) => {
                    assert!(e.is_full());
                    assert_eq!(queue.len().unwrap(), len_before);
                }
            }
        }
    }
    while let Ok(item) = queue.try_pop() {
        popped.push(item);
    }

    assert_eq!(popped, accepted);
}

#[test]
fn test_timed_pop_on_empty_queue_times_out_promptly() {
    let queue: BlockQueue<u64> = BlockQueue::new(5);
    let start = Instant::now();
    assert_eq!(queue.pop_timeout_ms(50), Err(QueueError::Timeout));
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(45), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1000), "{:?}", elapsed);
}

#[test]
fn test_blocking_pop_returns_concurrent_push() {
    let queue = Arc::new(BlockQueue::new(3));
    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.pop())
    };
    thread::sleep(Duration::from_millis(30));
    queue.push(String::from("late record")).unwrap();
    assert_eq!(consumer.join().unwrap().unwrap(), "late record");
}

#[test]
fn test_clear_then_pop_blocks_like_fresh_queue() {
    let queue = Arc::new(BlockQueue::new(4));
    for i in 0..4 {
        queue.push(i).unwrap();
    }
    queue.clear().unwrap();
    assert_eq!(queue.len().unwrap(), 0);
    assert_eq!(queue.pop_timeout_ms(20), Err(QueueError::Timeout));

    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.pop())
    };
    thread::sleep(Duration::from_millis(20));
    queue.push(99).unwrap();
    assert_eq!(consumer.join().unwrap(), Ok(99));
}

#[test]
fn test_many_producers_one_consumer_no_loss_no_duplicates() {
    const PRODUCERS: u64 = 4;
    const ITEMS: u64 = 1000;

    let queue = Arc::new(BlockQueue::new(16));
    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for n in 0..ITEMS {
                    let mut item = (p, n);
                    while let Err(e) = queue.push(item) {
                        item = e.into_inner();
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            (0..PRODUCERS * ITEMS)
                .map(|_| queue.pop().unwrap())
                .collect::<Vec<_>>()
        })
    };

    for producer in producers {
        producer.join().unwrap();
    }
    let received = consumer.join().unwrap();

    assert_eq!(received.len() as u64, PRODUCERS * ITEMS);
    let unique: HashSet<_> = received.iter().copied().collect();
    assert_eq!(unique.len(), received.len());

    // Each producer's items arrive in the order it pushed them.
    let mut next = vec![0u64; PRODUCERS as usize];
    for (p, n) in received {
        assert_eq!(n, next[p as usize], "producer {} out of order", p);
        next[p as usize] += 1;
    }
    assert!(queue.is_empty().unwrap());
}

#[test]
fn test_queue_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "capacity = 3").unwrap();
    writeln!(file, "timed_pop = \"single_attempt\"").unwrap();

    let config = QueueConfig::from_file(file.path()).unwrap();
    let queue: BlockQueue<u8> = BlockQueue::with_config(&config).unwrap();
    assert_eq!(queue.capacity(), 3);
    assert_eq!(queue.timed_pop_policy(), TimedPopPolicy::SingleAttempt);

    for i in 0..3 {
        queue.push(i).unwrap();
    }
    assert!(queue.push(3).unwrap_err().is_full());
    assert_eq!(queue.pop_timeout_ms(5), Ok(0));
}

#[test]
fn test_single_attempt_policy_times_out() {
    let queue: BlockQueue<u8> = BlockQueue::with_config(&QueueConfig::legacy()).unwrap();
    assert_eq!(queue.pop_timeout_ms(20), Err(QueueError::Timeout));
}
