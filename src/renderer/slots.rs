use std::{sync::Arc, time::Duration};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::Error;

/// Caps how many typst processes run at once.
#[derive(Debug, Clone)]
pub struct SlotPool {
    /// `None` when unlimited.
    semaphore: Option<Arc<Semaphore>>,
    acquire_timeout: Duration,
}

/// Held for the duration of one compile. Dropping it frees the slot.
#[derive(Debug)]
pub struct Slot {
    _permit: Option<OwnedSemaphorePermit>,
}

impl SlotPool {
    pub fn new(capacity: usize, acquire_timeout: Duration) -> Self {
        Self {
            semaphore: (capacity > 0).then(|| Arc::new(Semaphore::new(capacity))),
            acquire_timeout,
        }
    }

    /// Free slots, `None` when unlimited.
    pub fn available(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|s| s.available_permits())
    }

    /// Waits for a free slot. Gives up with [`Error::RendererBusy`] after the acquire
    /// timeout and with [`Error::Cancelled`] as soon as `cancel` fires.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Slot, Error> {
        let Some(semaphore) = &self.semaphore else {
            return Ok(Slot { _permit: None });
        };
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            acquired = tokio::time::timeout(self.acquire_timeout, semaphore.clone().acquire_owned()) => {
                match acquired {
                    Ok(Ok(permit)) => Ok(Slot { _permit: Some(permit) }),
                    // The semaphore is never closed; treat it like a full pool.
                    Ok(Err(_)) | Err(_) => {
                        debug!(waited = ?self.acquire_timeout, "no render slot available");
                        Err(Error::RendererBusy {
                            waited: self.acquire_timeout,
                        })
                    }
                }
            }
        }
    }
}
