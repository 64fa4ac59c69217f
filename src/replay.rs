//! Bounded experience replay.
//!
//! A strict FIFO ring: once full, every push evicts the oldest experience.
//! Sampling is uniform without replacement and never pads a short buffer.

use std::collections::VecDeque;

use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::error::{FdsError, Result};

/// One transition. Immutable once pushed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub state: Vec<f64>,
    pub action: Action,
    pub reward: f64,
    pub next_state: Vec<f64>,
    pub terminal: bool,
}

impl Experience {
    /// Single-step episode: the next state is the state itself and the
    /// transition is always terminal.
    pub fn terminal(state: Vec<f64>, action: Action, reward: f64) -> Self {
        Self {
            next_state: state.clone(),
            state,
            action,
            reward,
            terminal: true,
        }
    }
}

/// Column-oriented minibatch handed to the estimator.
#[derive(Clone, Debug, Default)]
pub struct SampledBatch {
    pub states: Vec<Vec<f64>>,
    pub actions: Vec<Action>,
    pub rewards: Vec<f64>,
    pub next_states: Vec<Vec<f64>>,
    pub terminals: Vec<bool>,
}

impl SampledBatch {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl<'a> FromIterator<&'a Experience> for SampledBatch {
    fn from_iter<I: IntoIterator<Item = &'a Experience>>(iter: I) -> Self {
        let mut batch = SampledBatch::default();
        for exp in iter {
            batch.states.push(exp.state.clone());
            batch.actions.push(exp.action);
            batch.rewards.push(exp.reward);
            batch.next_states.push(exp.next_state.clone());
            batch.terminals.push(exp.terminal);
        }
        batch
    }
}

#[derive(Clone, Debug)]
pub struct ReplayBuffer {
    capacity: usize,
    entries: VecDeque<Experience>,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(1 << 16)),
        }
    }

    /// Rebuilds a buffer from stored experiences, oldest first. If there are
    /// more than `capacity`, only the most recent survive.
    pub fn from_experiences(capacity: usize, experiences: Vec<Experience>) -> Self {
        let mut buffer = Self::new(capacity);
        for exp in experiences {
            buffer.push(exp);
        }
        buffer
    }

    pub fn push(&mut self, experience: Experience) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(experience);
    }

    /// `batch_size` distinct experiences drawn uniformly at random.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<Vec<&Experience>> {
        if self.entries.len() < batch_size {
            return Err(FdsError::InsufficientExperience {
                available: self.entries.len(),
                requested: batch_size,
            });
        }
        Ok(index::sample(rng, self.entries.len(), batch_size)
            .into_iter()
            .map(|i| &self.entries[i])
            .collect())
    }

    pub fn sample_batch<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<SampledBatch> {
        Ok(self.sample(batch_size, rng)?.into_iter().collect())
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Experience> {
        self.entries.iter()
    }

    /// The `max` most recent experiences, oldest first.
    pub fn most_recent(&self, max: usize) -> Vec<Experience> {
        let skip = self.entries.len().saturating_sub(max);
        self.entries.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn exp(tag: f64) -> Experience {
        Experience::terminal(vec![tag], Action::Approve, tag)
    }

    #[test]
    fn fifo_eviction_drops_oldest() {
        let mut buffer = ReplayBuffer::new(3);
        for i in 0..5 {
            buffer.push(exp(i as f64));
        }
        assert_eq!(buffer.size(), 3);
        let rewards: Vec<f64> = buffer.iter().map(|e| e.reward).collect();
        assert_eq!(rewards, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn sample_fails_when_short() {
        let mut buffer = ReplayBuffer::new(10);
        buffer.push(exp(1.0));
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        match buffer.sample(2, &mut rng) {
            Err(FdsError::InsufficientExperience { available, requested }) => {
                assert_eq!((available, requested), (1, 2));
            }
            other => panic!("expected InsufficientExperience, got {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn sample_returns_distinct_items() {
        let buffer = ReplayBuffer::from_experiences(100, (0..50).map(|i| exp(i as f64)).collect());
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let batch = buffer.sample(50, &mut rng).unwrap();
        let mut tags: Vec<i64> = batch.iter().map(|e| e.reward as i64).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), 50);
    }

    #[test]
    fn terminal_experience_reuses_state() {
        let e = Experience::terminal(vec![0.5, 1.5], Action::Block, -30.0);
        assert_eq!(e.state, e.next_state);
        assert!(e.terminal);
    }

    #[test]
    fn most_recent_keeps_tail() {
        let buffer = ReplayBuffer::from_experiences(10, (0..6).map(|i| exp(i as f64)).collect());
        let tail: Vec<f64> = buffer.most_recent(2).iter().map(|e| e.reward).collect();
        assert_eq!(tail, vec![4.0, 5.0]);
        assert_eq!(buffer.most_recent(100).len(), 6);
    }

    #[test]
    fn batch_columns_align() {
        let buffer = ReplayBuffer::from_experiences(8, (0..8).map(|i| exp(i as f64)).collect());
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let batch = buffer.sample_batch(4, &mut rng).unwrap();
        assert_eq!(batch.len(), 4);
        for i in 0..4 {
            assert_eq!(batch.states[i][0], batch.rewards[i]);
        }
    }
}
