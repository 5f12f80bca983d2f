use relay_log_forwarder::buffer::{
    CostAssigner, CostBoundedQueue, EvictingBuffer, RecordCostAssigner,
};
use relay_log_forwarder::record::LogRecord;
use std::sync::Arc;
use std::thread;

/// Fixed per-record cost for predictable capacity arithmetic.
struct FixedCost(u64);

impl CostAssigner for FixedCost {
    fn cost(&self, _record: &LogRecord) -> u64 {
        self.0
    }
}

fn record(message: &str) -> LogRecord {
    LogRecord::new(message, "app", "stream", "muleLog")
}

#[test]
fn capacity_invariant_holds_under_concurrent_producers() {
    let buffer = Arc::new(EvictingBuffer::new(5_000, Arc::new(FixedCost(100))).unwrap());

    let mut handles = Vec::new();
    for producer in 0..8 {
        let buffer = buffer.clone();
        handles.push(thread::spawn(move || {
            for i in 0..500 {
                buffer.add(record(&format!("p{producer}-m{i}")));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // Quiescent point: cost accounting must be exact and within capacity.
    assert!(buffer.cost() <= 5_000);
    assert_eq!(buffer.cost(), buffer.len() as u64 * 100);
    assert_eq!(buffer.len(), 50);
}

#[test]
fn capacity_invariant_holds_with_concurrent_drains() {
    let buffer = Arc::new(EvictingBuffer::new(2_000, Arc::new(FixedCost(50))).unwrap());

    let producer = {
        let buffer = buffer.clone();
        thread::spawn(move || {
            for i in 0..2_000 {
                buffer.add(record(&format!("m{i}")));
            }
        })
    };
    let drainer = {
        let buffer = buffer.clone();
        thread::spawn(move || {
            let mut total = 0usize;
            for _ in 0..200 {
                total += buffer.drain_to(10).len();
                std::hint::spin_loop();
            }
            total
        })
    };

    producer.join().unwrap();
    let drained = drainer.join().unwrap();

    let snapshot = buffer.metrics();
    assert!(buffer.cost() <= 2_000);
    assert_eq!(buffer.cost(), buffer.len() as u64 * 50);
    // Every produced record is accounted for exactly once.
    assert_eq!(
        drained + buffer.len() + snapshot.evicted as usize + snapshot.dropped as usize,
        2_000
    );
}

#[test]
fn fifo_under_eviction_keeps_newest_records() {
    // Capacity 1000, records of cost 300: R1..R5 leaves R3, R4, R5.
    let buffer = EvictingBuffer::new(1_000, Arc::new(FixedCost(300))).unwrap();
    for m in ["R1", "R2", "R3", "R4", "R5"] {
        assert!(buffer.add(record(m)));
    }

    assert_eq!(buffer.len(), 3);
    assert_eq!(buffer.cost(), 900);
    assert_eq!(buffer.metrics().evicted, 2);

    let drained = buffer.drain_to(2);
    let messages: Vec<_> = drained.iter().map(|r| r.message.as_str()).collect();
    assert_eq!(messages, ["R3", "R4"]);

    assert_eq!(buffer.len(), 1);
    assert_eq!(buffer.cost(), 300);
    assert_eq!(buffer.drain_to(10)[0].message, "R5");
}

#[test]
fn record_larger_than_capacity_fails_cleanly() {
    let buffer = EvictingBuffer::new(100, Arc::new(RecordCostAssigner)).unwrap();
    assert!(buffer.add(record("fits")));
    let before_len = buffer.len();
    let before_cost = buffer.cost();

    assert!(!buffer.add(record(&"oversized ".repeat(50))));

    assert_eq!(buffer.len(), before_len);
    assert_eq!(buffer.cost(), before_cost);
    assert_eq!(buffer.metrics().dropped, 1);
    assert_eq!(buffer.metrics().evicted, 0);
}

#[test]
fn queue_rejects_overshoot_from_concurrent_offers() {
    // 10 threads race to fill a queue that only fits 10 records total.
    let queue = Arc::new(CostBoundedQueue::new(1_000, Arc::new(FixedCost(100))).unwrap());

    let mut handles = Vec::new();
    for _ in 0..10 {
        let queue = queue.clone();
        handles.push(thread::spawn(move || {
            let mut admitted = 0usize;
            for i in 0..10 {
                if queue.offer(record(&format!("m{i}"))).is_ok() {
                    admitted += 1;
                }
            }
            admitted
        }));
    }

    let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(admitted, 10);
    assert_eq!(queue.cost(), 1_000);
}
