use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::seq::index;

/// One recorded agent-environment interaction. Immutable once stored.
#[derive(Clone, Debug)]
pub struct Transition<S, A> {
    pub state: S,
    pub action: A,
    pub reward: f32,
    pub next_state: S,
    pub done: bool,
}

/// Capacity-bounded experience memory.
///
/// Insertion evicts the oldest entry once the capacity is reached (strict
/// FIFO). The memory is never cleared; it only changes through [Self::add].
pub struct ReplayMemory<S, A> {
    capacity: usize,
    buffer: VecDeque<Transition<S, A>>,
}

impl<S, A> ReplayMemory<S, A> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            capacity,
            buffer: VecDeque::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn add(&mut self, transition: Transition<S, A>) {
        if (self.buffer.len() + 1) > self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(transition);
    }

    pub fn get(&self, index: usize) -> &Transition<S, A> {
        &self.buffer[index]
    }

    /// `n` distinct indices drawn uniformly without replacement.
    pub fn sample_indices(&self, rng: &mut StdRng, n: usize) -> Vec<usize> {
        debug_assert!(n <= self.buffer.len());
        index::sample(rng, self.buffer.len(), n).into_vec()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rstest::rstest;

    use super::*;

    fn transition(reward: f32) -> Transition<f32, u8> {
        Transition {
            state: 0.0,
            action: 0,
            reward,
            next_state: 0.0,
            done: false,
        }
    }

    #[rstest]
    #[case(1)]
    #[case(5)]
    #[case(100)]
    fn len_never_exceeds_capacity(#[case] capacity: usize) {
        let mut memory = ReplayMemory::new(capacity);
        for i in 0..capacity * 2 {
            memory.add(transition(i as f32));
            assert!(memory.len() <= capacity);
        }
        assert_eq!(memory.len(), capacity);
    }

    #[test]
    fn add_evicts_oldest_first() {
        let mut memory = ReplayMemory::new(3);
        for i in 0..4 {
            memory.add(transition(i as f32));
        }

        // transition 0 is gone, 1..=3 remain in insertion order
        assert_eq!(memory.len(), 3);
        assert_eq!(memory.get(0).reward, 1.0);
        assert_eq!(memory.get(1).reward, 2.0);
        assert_eq!(memory.get(2).reward, 3.0);
    }

    #[test]
    fn sample_indices_are_distinct_and_in_range() {
        let mut memory = ReplayMemory::new(50);
        for i in 0..50 {
            memory.add(transition(i as f32));
        }

        let mut rng = StdRng::seed_from_u64(0);
        let mut indices = memory.sample_indices(&mut rng, 32);
        indices.sort_unstable();
        indices.dedup();
        assert_eq!(indices.len(), 32);
        assert!(indices.iter().all(|&i| i < 50));
    }
}
