//! Per-ticket mutual exclusion for read-modify-write body edits.
//!
//! The tracker has no conditional update, so two concurrent edits of the same
//! body would silently lose one of them. Every body rewrite goes through
//! [`UpdateSerializer::run`], which orders calls for the same ticket number and
//! lets different numbers proceed in parallel.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Mutex as AsyncMutex;

type TicketLock = Arc<AsyncMutex<()>>;

/// Lazily created lock per ticket number.
///
/// Entries are removed again as soon as nobody holds or waits on them, so the
/// map only grows with the number of tickets being edited right now.
#[derive(Debug, Default)]
pub struct UpdateSerializer {
    locks: Mutex<HashMap<u64, TicketLock>>,
}

impl UpdateSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` while holding the lock for `number`.
    ///
    /// Calls for the same number never overlap and run in the order they
    /// acquired the lock. Nothing is rolled back if `op` fails halfway.
    pub async fn run<F, Fut, T>(&self, number: u64, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let slot = self.slot(number);
        let _held = slot.lock.lock().await;
        op().await
    }

    /// Number of ticket locks currently held or waited on.
    pub fn tracked(&self) -> usize {
        self.map().len()
    }

    fn slot(&self, number: u64) -> Slot<'_> {
        let lock = self.map().entry(number).or_default().clone();
        Slot {
            serializer: self,
            number,
            lock,
        }
    }

    fn map(&self) -> MutexGuard<'_, HashMap<u64, TicketLock>> {
        // The map is only touched for insert/remove, a panic cannot leave it
        // half-updated.
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A registered interest in one ticket's lock; cleans up the entry on drop.
struct Slot<'a> {
    serializer: &'a UpdateSerializer,
    number: u64,
    lock: TicketLock,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        let mut locks = self.serializer.map();
        // Only the map and this slot still refer to the lock.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.number);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_same_number_does_not_interleave() {
        let serializer = Arc::new(UpdateSerializer::new());
        let events = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..4 {
            let serializer = serializer.clone();
            let events = events.clone();
            handles.push(tokio::spawn(async move {
                serializer
                    .run(7, move || async move {
                        events.lock().unwrap().push(format!("start-{}", i));
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        events.lock().unwrap().push(format!("end-{}", i));
                    })
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 8);
        for pair in events.chunks(2) {
            let start = pair[0].strip_prefix("start-").unwrap();
            let end = pair[1].strip_prefix("end-").unwrap();
            assert_eq!(start, end, "edits interleaved: {:?}", *events);
        }
    }

    #[tokio::test]
    async fn test_different_numbers_run_concurrently() {
        let serializer = Arc::new(UpdateSerializer::new());
        let (tx, rx) = oneshot::channel::<()>();

        let waiting = {
            let serializer = serializer.clone();
            tokio::spawn(async move { serializer.run(1, move || async move { rx.await.is_ok() }).await })
        };
        tokio::task::yield_now().await;

        // Would deadlock if ticket 1's lock also covered ticket 2.
        serializer
            .run(2, move || async move {
                tx.send(()).unwrap();
            })
            .await;

        let received = tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .expect("ticket 1 edit never finished")
            .unwrap();
        assert!(received);
    }

    #[tokio::test]
    async fn test_returns_operation_result() {
        let serializer = UpdateSerializer::new();
        let value = serializer.run(3, || async { 41 + 1 }).await;
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_idle_locks_are_removed() {
        let serializer = Arc::new(UpdateSerializer::new());

        let mut handles = Vec::new();
        for number in [1, 1, 2, 3] {
            let serializer = serializer.clone();
            handles.push(tokio::spawn(async move {
                serializer
                    .run(number, || async {
                        tokio::time::sleep(Duration::from_millis(2)).await;
                    })
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(serializer.tracked(), 0);
    }

    #[tokio::test]
    async fn test_lock_tracked_while_held() {
        let serializer = UpdateSerializer::new();
        let observer = &serializer;
        serializer
            .run(5, move || async move {
                assert_eq!(observer.tracked(), 1);
            })
            .await;
        assert_eq!(serializer.tracked(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_cleans_up() {
        let serializer = Arc::new(UpdateSerializer::new());
        let (tx, rx) = oneshot::channel::<()>();

        let holder = {
            let serializer = serializer.clone();
            tokio::spawn(async move {
                serializer
                    .run(9, move || async move {
                        let _ = rx.await;
                    })
                    .await;
            })
        };
        tokio::task::yield_now().await;

        let waiter = tokio::time::timeout(
            Duration::from_millis(10),
            serializer.run(9, || async {}),
        )
        .await;
        assert!(waiter.is_err());

        tx.send(()).unwrap();
        holder.await.unwrap();
        assert_eq!(serializer.tracked(), 0);
    }
}
