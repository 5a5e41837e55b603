//! Wake primitive for the interpreter thread.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A generation counter paired with a condition variable.
///
/// Waiters read [`Signal::generation`] before checking their conditions and
/// pass it to [`Signal::wait`], so a notification posted in between is never
/// lost.
#[derive(Debug, Default)]
pub struct Signal {
    generation: Mutex<u64>,
    cond: Condvar,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    /// Wake every waiter.
    pub fn notify(&self) {
        let mut generation = self.generation.lock();
        *generation = generation.wrapping_add(1);
        self.cond.notify_all();
    }

    /// Block until the generation moves past `seen` or `timeout` elapses.
    ///
    /// Returns true if woken by a notification.
    pub fn wait(&self, seen: u64, timeout: Duration) -> bool {
        let mut generation = self.generation.lock();
        if *generation != seen {
            return true;
        }
        self.cond.wait_for(&mut generation, timeout);
        *generation != seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_wait_times_out() {
        let signal = Signal::new();
        let seen = signal.generation();
        let start = Instant::now();
        assert!(!signal.wait(seen, Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_notify_before_wait_is_not_lost() {
        let signal = Signal::new();
        let seen = signal.generation();
        signal.notify();
        assert!(signal.wait(seen, Duration::from_secs(10)));
    }

    #[test]
    fn test_notify_from_other_thread() {
        let signal = Arc::new(Signal::new());
        let seen = signal.generation();
        let notifier = {
            let signal = Arc::clone(&signal);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                signal.notify();
            })
        };
        assert!(signal.wait(seen, Duration::from_secs(10)));
        notifier.join().unwrap();
    }
}
