//! Abandoned operations kept for manual inspection

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::operation::OperationId;

/// An operation the queue gave up on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: OperationId,
    pub queue: String,
    pub attempts: u32,
    pub last_error: String,
    pub enqueued_at: DateTime<Utc>,
    pub abandoned_at: DateTime<Utc>,
}

/// Bounded FIFO of dead letters; the oldest entry is evicted when full.
#[derive(Debug)]
pub(crate) struct DeadLetterBox {
    entries: VecDeque<DeadLetter>,
    capacity: usize,
}

impl DeadLetterBox {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, letter: DeadLetter) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(letter);
    }

    pub fn snapshot(&self) -> Vec<DeadLetter> {
        self.entries.iter().cloned().collect()
    }

    pub fn take(&mut self) -> Vec<DeadLetter> {
        self.entries.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn letter(n: u32) -> DeadLetter {
        DeadLetter {
            id: Uuid::new_v4(),
            queue: "test".to_string(),
            attempts: n,
            last_error: format!("error {}", n),
            enqueued_at: Utc::now(),
            abandoned_at: Utc::now(),
        }
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let mut letters = DeadLetterBox::new(2);
        letters.push(letter(1));
        letters.push(letter(2));
        letters.push(letter(3));

        let attempts: Vec<u32> = letters.snapshot().iter().map(|l| l.attempts).collect();
        assert_eq!(attempts, vec![2, 3]);
    }

    #[test]
    fn test_take_empties_box() {
        let mut letters = DeadLetterBox::new(4);
        letters.push(letter(1));
        assert_eq!(letters.take().len(), 1);
        assert!(letters.snapshot().is_empty());
    }

    #[test]
    fn test_zero_capacity_discards() {
        let mut letters = DeadLetterBox::new(0);
        letters.push(letter(1));
        assert!(letters.snapshot().is_empty());
    }
}
