//! Bounded tail of diagnostics shown under the node table.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::sync::lock;

pub const DEFAULT_MESSAGE_CAP: usize = 10_000;

#[derive(Debug)]
struct TailState {
    lines: VecDeque<String>,
    // Sequence number of `lines[0]`.
    first_seq: u64,
}

/// Append-only buffer of recent messages, trimmed oldest-first at `cap` entries.
///
/// Every appended entry gets a sequence number so readers can ask for what
/// arrived since their last read, even after older entries were evicted.
#[derive(Debug)]
pub struct MessageTail {
    state: Mutex<TailState>,
    cap: usize,
}

impl Default for MessageTail {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_CAP)
    }
}

impl MessageTail {
    pub fn new(cap: usize) -> Self {
        Self {
            state: Mutex::new(TailState {
                lines: VecDeque::new(),
                first_seq: 0,
            }),
            cap,
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn append(&self, message: impl Into<String>) {
        if self.cap == 0 {
            return;
        }
        let mut s = lock(&self.state);
        while s.lines.len() >= self.cap {
            s.lines.pop_front();
            s.first_seq += 1;
        }
        s.lines.push_back(message.into());
    }

    /// The most recent `n` entries, oldest first.
    pub fn last_n(&self, n: usize) -> Vec<String> {
        let s = lock(&self.state);
        let skip = s.lines.len().saturating_sub(n);
        s.lines.iter().skip(skip).cloned().collect()
    }

    /// Entries with sequence number `>= seq` that are still buffered, plus the
    /// sequence number to pass on the next call.
    pub fn since(&self, seq: u64) -> (Vec<String>, u64) {
        let s = lock(&self.state);
        let next = s.first_seq + s.lines.len() as u64;
        let skip = seq.saturating_sub(s.first_seq) as usize;
        (s.lines.iter().skip(skip).cloned().collect(), next)
    }

    pub fn total_appended(&self) -> u64 {
        let s = lock(&self.state);
        s.first_seq + s.lines.len() as u64
    }

    pub fn len(&self) -> usize {
        lock(&self.state).lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_n_returns_most_recent_in_arrival_order() {
        let tail = MessageTail::new(100);
        for i in 0..10 {
            tail.append(format!("m{i}"));
        }
        assert_eq!(tail.last_n(3), vec!["m7", "m8", "m9"]);
    }

    #[test]
    fn last_n_larger_than_buffer_returns_everything() {
        let tail = MessageTail::new(100);
        tail.append("a");
        tail.append("b");
        assert_eq!(tail.last_n(50), vec!["a", "b"]);
        assert!(MessageTail::new(4).last_n(3).is_empty());
    }

    #[test]
    fn overflow_evicts_oldest_first() {
        let tail = MessageTail::new(3);
        for i in 0..5 {
            tail.append(format!("m{i}"));
        }
        assert_eq!(tail.len(), 3);
        assert_eq!(tail.last_n(10), vec!["m2", "m3", "m4"]);
        assert_eq!(tail.total_appended(), 5);
    }

    #[test]
    fn zero_cap_keeps_nothing() {
        let tail = MessageTail::new(0);
        tail.append("dropped");
        assert!(tail.is_empty());
    }

    #[test]
    fn since_resumes_after_eviction() {
        let tail = MessageTail::new(2);
        tail.append("a");
        let (first, seq) = tail.since(0);
        assert_eq!(first, vec!["a"]);
        assert_eq!(seq, 1);

        tail.append("b");
        tail.append("c");
        tail.append("d");
        // "b" was evicted before we looked again.
        let (next, seq) = tail.since(seq);
        assert_eq!(next, vec!["c", "d"]);
        assert_eq!(seq, 4);

        let (none, seq) = tail.since(seq);
        assert!(none.is_empty());
        assert_eq!(seq, 4);
    }

    #[test]
    fn concurrent_appends_are_all_counted() {
        let tail = std::sync::Arc::new(MessageTail::new(50));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let tail = std::sync::Arc::clone(&tail);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        tail.append(format!("{t}:{i}"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(tail.total_appended(), 400);
        assert_eq!(tail.len(), 50);
    }
}
