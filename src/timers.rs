use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::task::JoinHandle;

struct Scheduled {
    generation: u64,
    task: JoinHandle<()>,
}

/// Delayed callbacks keyed by purpose.
///
/// Scheduling a key that is already pending aborts the earlier timer, and
/// each timer carries a generation so the owner can discard a firing that
/// raced with a reschedule or cancellation.
pub(crate) struct TimerArena<K> {
    timers: HashMap<K, Scheduled>,
    next_generation: u64,
}

impl<K: Copy + Eq + Hash> Default for TimerArena<K> {
    fn default() -> Self {
        Self {
            timers: HashMap::new(),
            next_generation: 0,
        }
    }
}

impl<K: Copy + Eq + Hash> TimerArena<K> {
    /// Runs `fire` with the timer's generation once `delay` has elapsed.
    pub(crate) fn schedule<F>(&mut self, key: K, delay: Duration, fire: F) -> u64
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel(key);
        self.next_generation += 1;
        let generation = self.next_generation;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire(generation);
        });
        self.timers.insert(key, Scheduled { generation, task });
        generation
    }

    /// Claims a firing. Returns false for generations that were superseded.
    pub(crate) fn complete(&mut self, key: K, generation: u64) -> bool {
        match self.timers.get(&key) {
            Some(scheduled) if scheduled.generation == generation => {
                self.timers.remove(&key);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn cancel(&mut self, key: K) -> bool {
        match self.timers.remove(&key) {
            Some(scheduled) => {
                scheduled.task.abort();
                true
            }
            None => false,
        }
    }

    pub(crate) fn cancel_all(&mut self) {
        for (_, scheduled) in self.timers.drain() {
            scheduled.task.abort();
        }
    }

    #[cfg(test)]
    pub(crate) fn is_scheduled(&self, key: K) -> bool {
        self.timers.contains_key(&key)
    }
}

impl<K> Drop for TimerArena<K> {
    fn drop(&mut self) {
        for scheduled in self.timers.values() {
            scheduled.task.abort();
        }
    }
}
