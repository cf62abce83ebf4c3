//! Single running batch per server, cancellable from another request.

use crate::error::{AppError, Result};
use std::sync::{Mutex, PoisonError};
use stockpile_engine::CancellationToken;

#[derive(Debug, Default)]
pub struct BatchSlot {
    running: Mutex<Option<CancellationToken>>,
}

impl BatchSlot {
    /// Reserve the slot for a new batch.
    pub fn start(&self) -> Result<BatchTicket<'_>> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return Err(AppError::BatchInProgress);
        }
        let token = CancellationToken::new();
        *running = Some(token.clone());
        Ok(BatchTicket { slot: self, token })
    }

    /// Cancel the running batch, if any.
    pub fn cancel(&self) -> bool {
        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        match running.as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Frees the slot when dropped.
pub struct BatchTicket<'a> {
    slot: &'a BatchSlot,
    token: CancellationToken,
}

impl BatchTicket<'_> {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for BatchTicket<'_> {
    fn drop(&mut self) {
        *self
            .slot
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}
