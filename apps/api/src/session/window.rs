//! Conversation Window — bounded FIFO of the most recent question/answer pairs.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Default number of turns a session remembers.
pub const DEFAULT_WINDOW_CAPACITY: usize = 2;

/// One completed exchange between the user and the assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

impl Turn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Capacity is fixed at construction. Oldest turns are evicted first.
#[derive(Debug, Clone)]
pub struct ConversationWindow {
    capacity: usize,
    turns: VecDeque<Turn>,
}

impl ConversationWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            turns: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends a turn, dropping the oldest ones until the window fits its capacity.
    /// Returns the number of evicted turns.
    pub fn push(&mut self, question: impl Into<String>, answer: impl Into<String>) -> usize {
        self.turns.push_back(Turn::new(question, answer));
        let mut evicted = 0;
        while self.turns.len() > self.capacity {
            self.turns.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Ordered copy of the retained turns, oldest first.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }
}
