//! Replay Buffer
//!
//! Circular experience store for off-policy learning. Transition `i` lives in
//! slot `i % capacity`; sampling draws uniformly with replacement from the
//! valid slots.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{Action, Observation, ObservationBatch, ACTION_DIM, UTILITY_FEATURES};
use crate::error::{Result, RlError};

/// A single transition in the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Observation before the action
    pub state: Observation,
    /// Action applied to the environment
    pub action: Action,
    /// Reward received
    pub reward: f64,
    /// Observation after the action
    pub next_state: Observation,
    /// Whether the episode ended with this step
    pub done: bool,
}

impl Transition {
    pub fn new(
        state: Observation,
        action: Action,
        reward: f64,
        next_state: Observation,
        done: bool,
    ) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            done,
        }
    }
}

/// Stacked minibatch aligned by index
#[derive(Debug, Clone)]
pub struct Batch {
    pub states: ObservationBatch,
    /// One-hot actions, `[len x ACTION_DIM]`
    pub actions: Vec<f32>,
    pub rewards: Vec<f32>,
    pub next_states: ObservationBatch,
    /// `1.0` for terminal transitions
    pub dones: Vec<f32>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }
}

/// Raw buffer contents sufficient to resume training exactly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaySnapshot {
    pub capacity: usize,
    /// Total transitions ever added
    pub counter: usize,
    /// Slot contents in slot order
    pub slots: Vec<Transition>,
}

/// Replay buffer for experience storage
#[derive(Debug)]
pub struct ReplayBuffer {
    slots: Vec<Transition>,
    capacity: usize,
    counter: usize,
}

impl ReplayBuffer {
    /// Create a new replay buffer with given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity.min(1 << 16)),
            capacity,
            counter: 0,
        }
    }

    /// Store a transition, overwriting the oldest once full
    pub fn add(&mut self, transition: Transition) {
        if self.capacity == 0 {
            return;
        }
        let slot = self.counter % self.capacity;
        if slot < self.slots.len() {
            self.slots[slot] = transition;
        } else {
            self.slots.push(transition);
        }
        self.counter += 1;
    }

    /// Draw `batch_size` transitions uniformly with replacement
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<Batch> {
        let valid = self.len();
        if valid == 0 {
            return Err(RlError::InsufficientData { available: 0 });
        }

        let series_len = self.slots[0].state.series.len();
        let mut batch = Batch {
            states: ObservationBatch::with_capacity(batch_size, series_len),
            actions: Vec::with_capacity(batch_size * ACTION_DIM),
            rewards: Vec::with_capacity(batch_size),
            next_states: ObservationBatch::with_capacity(batch_size, series_len),
            dones: Vec::with_capacity(batch_size),
        };

        for _ in 0..batch_size {
            let transition = &self.slots[rng.gen_range(0..valid)];
            batch.states.push(&transition.state);
            batch.actions.extend_from_slice(&transition.action.one_hot());
            batch.rewards.push(transition.reward as f32);
            batch.next_states.push(&transition.next_state);
            batch.dones.push(if transition.done { 1.0 } else { 0.0 });
        }

        Ok(batch)
    }

    /// Number of valid slots
    pub fn len(&self) -> usize {
        self.counter.min(self.capacity)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total transitions ever added
    pub fn total_added(&self) -> usize {
        self.counter
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Check if buffer has enough samples for training
    pub fn has_enough_samples(&self, min_samples: usize) -> bool {
        self.len() >= min_samples
    }

    /// Transitions in insertion order, oldest first
    pub fn iter_chronological(&self) -> impl Iterator<Item = &Transition> {
        let split = if self.counter > self.capacity {
            self.counter % self.capacity
        } else {
            0
        };
        self.slots[split..].iter().chain(self.slots[..split].iter())
    }

    pub fn snapshot(&self) -> ReplaySnapshot {
        ReplaySnapshot {
            capacity: self.capacity,
            counter: self.counter,
            slots: self.slots.clone(),
        }
    }

    /// Replace the contents with a snapshot taken from a buffer of the same
    /// capacity
    pub fn restore(&mut self, snapshot: ReplaySnapshot) -> Result<()> {
        if snapshot.capacity != self.capacity {
            return Err(RlError::Configuration(format!(
                "replay snapshot capacity {} does not match buffer capacity {}",
                snapshot.capacity, self.capacity
            )));
        }
        let expected = snapshot.counter.min(snapshot.capacity);
        if snapshot.slots.len() != expected {
            return Err(RlError::ShapeMismatch {
                expected,
                actual: snapshot.slots.len(),
            });
        }
        if let Some(first) = snapshot.slots.first() {
            let series_len = first.state.series.len();
            for transition in &snapshot.slots {
                for obs in [&transition.state, &transition.next_state] {
                    if obs.series.len() != series_len {
                        return Err(RlError::ShapeMismatch {
                            expected: series_len,
                            actual: obs.series.len(),
                        });
                    }
                    if obs.utility.len() != UTILITY_FEATURES {
                        return Err(RlError::ShapeMismatch {
                            expected: UTILITY_FEATURES,
                            actual: obs.utility.len(),
                        });
                    }
                }
            }
        }

        debug!(
            counter = snapshot.counter,
            slots = snapshot.slots.len(),
            "Restored replay buffer"
        );
        self.counter = snapshot.counter;
        self.slots = snapshot.slots;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn obs(tag: f32) -> Observation {
        Observation {
            series: vec![tag; 3],
            utility: vec![0.0; UTILITY_FEATURES],
        }
    }

    fn transition(tag: f32) -> Transition {
        Transition::new(obs(tag), Action::Buy, tag as f64, obs(tag + 0.5), false)
    }

    #[test]
    fn test_replay_buffer_basic() {
        let mut buffer = ReplayBuffer::new(10);
        assert!(buffer.is_empty());

        for i in 0..5 {
            buffer.add(transition(i as f32));
        }

        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.total_added(), 5);
        assert!(buffer.has_enough_samples(5));
        assert!(!buffer.has_enough_samples(6));
    }

    #[test]
    fn test_replay_buffer_overflow_keeps_most_recent() {
        let mut buffer = ReplayBuffer::new(3);

        for i in 0..8 {
            buffer.add(transition(i as f32));
        }

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.total_added(), 8);
        let rewards: Vec<f64> = buffer.iter_chronological().map(|t| t.reward).collect();
        assert_eq!(rewards, vec![5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_sample_empty_is_insufficient_data() {
        let buffer = ReplayBuffer::new(4);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            buffer.sample(2, &mut rng),
            Err(RlError::InsufficientData { available: 0 })
        ));
    }

    #[test]
    fn test_sample_only_valid_slots_with_replacement() {
        let mut buffer = ReplayBuffer::new(100);
        buffer.add(transition(1.0));
        buffer.add(transition(2.0));
        let mut rng = StdRng::seed_from_u64(5);

        let batch = buffer.sample(64, &mut rng).unwrap();
        assert_eq!(batch.len(), 64);
        assert!(batch.rewards.iter().all(|&r| r == 1.0 || r == 2.0));
        assert_eq!(batch.states.series.len(), 64 * 3);
        assert_eq!(batch.states.utility.len(), 64 * UTILITY_FEATURES);
        assert_eq!(batch.actions.len(), 64 * ACTION_DIM);
        assert_eq!(&batch.actions[..2], &[0.0, 1.0]);
        assert!(batch.dones.iter().all(|&d| d == 0.0));
    }

    #[test]
    fn test_sample_after_wraparound_never_sees_overwritten() {
        let mut buffer = ReplayBuffer::new(4);
        for i in 0..10 {
            buffer.add(transition(i as f32));
        }
        let mut rng = StdRng::seed_from_u64(9);
        let batch = buffer.sample(200, &mut rng).unwrap();
        assert!(batch.rewards.iter().all(|&r| (6.0..=9.0).contains(&r)));
    }

    #[test]
    fn test_snapshot_restore_resumes_exactly() {
        let mut buffer = ReplayBuffer::new(3);
        for i in 0..5 {
            buffer.add(transition(i as f32));
        }

        let mut restored = ReplayBuffer::new(3);
        restored.restore(buffer.snapshot()).unwrap();
        assert_eq!(restored.total_added(), 5);

        buffer.add(transition(9.0));
        restored.add(transition(9.0));
        let a: Vec<_> = buffer.iter_chronological().cloned().collect();
        let b: Vec<_> = restored.iter_chronological().cloned().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_restore_rejects_mismatched_capacity() {
        let mut buffer = ReplayBuffer::new(3);
        buffer.add(transition(0.0));
        let mut other = ReplayBuffer::new(4);
        assert!(other.restore(buffer.snapshot()).is_err());
    }

    #[test]
    fn test_restore_rejects_bad_shapes() {
        let mut buffer = ReplayBuffer::new(3);
        buffer.add(transition(0.0));
        let mut snapshot = buffer.snapshot();
        snapshot.slots[0].next_state.utility.pop();
        assert!(matches!(
            ReplayBuffer::new(3).restore(snapshot),
            Err(RlError::ShapeMismatch { .. })
        ));
    }
}
