//! Sender identities and round-robin selection.
use anyhow::{anyhow, Result};

/// An authorized (email, account) pair used as the "from" identity for an
/// enrollment. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Sender {
    pub(crate) email: String,
    pub(crate) user_id: String,
}

/// Ordered pool of senders with a private circular cursor.
///
/// The rotation index lives inside the instance so independent runs (and
/// tests) can each carry their own pool without shared state.
#[derive(Debug)]
pub(crate) struct SenderPool {
    senders: Vec<Sender>,
    index: usize,
}

impl SenderPool {
    pub(crate) fn new(senders: Vec<Sender>) -> Result<Self> {
        if senders.is_empty() {
            return Err(anyhow!("sender pool is empty"));
        }
        Ok(Self { senders, index: 0 })
    }

    pub(crate) fn current(&self) -> &Sender {
        &self.senders[self.index]
    }

    /// Advance to the next sender circularly and return the new selection.
    pub(crate) fn rotate(&mut self) -> &Sender {
        self.index = (self.index + 1) % self.senders.len();
        &self.senders[self.index]
    }

    pub(crate) fn len(&self) -> usize {
        self.senders.len()
    }
}
