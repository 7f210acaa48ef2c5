// Command gate
//
// The device protocol carries no request id, so a reply can only be matched to
// its request by keeping a single command in flight. Every sender goes through
// this gate; waiters are admitted in FIFO order.

use crate::protocol::{DebugResult, DebuggerError};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

#[derive(Debug, Clone)]
pub struct Gate {
    permits: Arc<Semaphore>,
}

/// Exclusive use of the channel; released when dropped
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl GatePermit {
    pub fn release(self) {}
}

impl Gate {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Gate admitting one holder at a time
    pub fn exclusive() -> Self {
        Self::new(1)
    }

    /// Wait for a permit. Fails once the gate is closed.
    pub async fn acquire(&self) -> DebugResult<GatePermit> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DebuggerError::ConnectionClosed)?;
        Ok(GatePermit { _permit: permit })
    }

    /// Take a permit only if one is free right now
    pub fn try_acquire(&self) -> Option<GatePermit> {
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => Some(GatePermit { _permit: permit }),
            Err(TryAcquireError::NoPermits) | Err(TryAcquireError::Closed) => None,
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wake every waiter with an error; later acquires fail immediately
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[tokio::test]
    async fn test_single_holder() {
        let gate = Gate::exclusive();
        let permit = gate.acquire().await.unwrap();

        assert_eq!(gate.available(), 0);
        assert!(gate.try_acquire().is_none());

        permit.release();
        assert_eq!(gate.available(), 1);
        assert!(gate.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_waiters_admitted_in_order() {
        let gate = Gate::exclusive();
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = gate.acquire().await.unwrap();

        let mut tasks = Vec::new();
        for id in 0..4 {
            let gate = gate.clone();
            let order = order.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = gate.acquire().await.unwrap();
                order.lock().await.push(id);
                tokio::time::sleep(Duration::from_millis(2)).await;
            }));
            // let each waiter enqueue before spawning the next
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        first.release();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(*order.lock().await, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_close_fails_waiters() {
        let gate = Gate::exclusive();
        let held = gate.acquire().await.unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.acquire().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        gate.close();

        assert!(matches!(
            waiter.await.unwrap(),
            Err(DebuggerError::ConnectionClosed)
        ));
        assert!(gate.is_closed());
        drop(held);
        assert!(gate.try_acquire().is_none());
    }
}
