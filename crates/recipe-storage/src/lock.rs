//! Bounded waits on mutexes.

use std::sync::{Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::{Result, StorageError};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Lock `lock`, giving up with [`StorageError::LockTimeout`] after `timeout`.
///
/// `what` names the protected resource in the error. A poisoned lock is
/// recovered, since the guarded state is only ever a cache.
pub fn acquire_with_timeout<'a, T>(
    lock: &'a Mutex<T>,
    what: &str,
    timeout: Duration,
) -> Result<MutexGuard<'a, T>> {
    let deadline = Instant::now() + timeout;
    loop {
        match lock.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(poisoned)) => {
                warn!(what, "recovering poisoned lock");
                return Ok(poisoned.into_inner());
            }
            Err(TryLockError::WouldBlock) => {
                if Instant::now() >= deadline {
                    return Err(StorageError::lock_timeout(what, timeout.as_secs()));
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn acquires_free_lock() {
        let lock = Mutex::new(3);
        let guard = acquire_with_timeout(&lock, "test", Duration::from_millis(10)).unwrap();
        assert_eq!(*guard, 3);
    }

    #[test]
    fn times_out_on_held_lock() {
        let lock = Arc::new(Mutex::new(()));
        let (held_tx, held_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let holder = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let _guard = lock.lock().unwrap();
                held_tx.send(()).unwrap();
                done_rx.recv().unwrap();
            })
        };
        held_rx.recv().unwrap();

        let err = acquire_with_timeout(&lock, "reflection", Duration::from_millis(30)).unwrap_err();
        assert!(matches!(err, StorageError::LockTimeout { .. }));

        done_tx.send(()).unwrap();
        holder.join().unwrap();
        assert!(acquire_with_timeout(&lock, "reflection", Duration::from_millis(30)).is_ok());
    }
}
