/*!
 * Mailboxes
 * Fixed-capacity, non-blocking per-slot byte channels
 */

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// IPC operation result
pub type IpcResult<T> = Result<T, IpcError>;

/// Mailbox errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IpcError {
    #[error("mailbox slot {0} out of range")]
    UnknownSlot(usize),

    #[error("mailbox slot {0} disconnected")]
    Disconnected(usize),
}

/// Per-slot mailbox statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MailboxStats {
    pub slot: usize,
    pub queued: usize,
    pub capacity: usize,
}

/// Fixed set of bounded byte channels used for inter-process signaling
///
/// Senders drop on full and receivers no-op on empty; no process ever
/// suspends waiting on a mailbox.
pub struct Mailboxes {
    capacity: usize,
    slots: Vec<(flume::Sender<u8>, flume::Receiver<u8>)>,
}

impl Mailboxes {
    pub fn new(count: usize, capacity: usize) -> Self {
        info!("mailboxes initialized: {} slots, capacity {}", count, capacity);
        Self {
            capacity,
            slots: (0..count).map(|_| flume::bounded(capacity)).collect(),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Best-effort send: returns Ok(true) when delivered, Ok(false) when
    /// the slot was full and the byte was dropped
    pub fn send(&self, slot: usize, byte: u8) -> IpcResult<bool> {
        let (tx, _) = self.slots.get(slot).ok_or(IpcError::UnknownSlot(slot))?;
        match tx.try_send(byte) {
            Ok(()) => Ok(true),
            Err(flume::TrySendError::Full(_)) => Ok(false),
            Err(flume::TrySendError::Disconnected(_)) => Err(IpcError::Disconnected(slot)),
        }
    }

    /// Non-blocking receive: Ok(None) when the slot is empty
    pub fn recv(&self, slot: usize) -> IpcResult<Option<u8>> {
        let (_, rx) = self.slots.get(slot).ok_or(IpcError::UnknownSlot(slot))?;
        match rx.try_recv() {
            Ok(byte) => Ok(Some(byte)),
            Err(flume::TryRecvError::Empty) => Ok(None),
            Err(flume::TryRecvError::Disconnected) => Err(IpcError::Disconnected(slot)),
        }
    }

    /// Snapshot of one slot, for the display side
    pub fn stats(&self, slot: usize) -> IpcResult<MailboxStats> {
        let (_, rx) = self.slots.get(slot).ok_or(IpcError::UnknownSlot(slot))?;
        Ok(MailboxStats {
            slot,
            queued: rx.len(),
            capacity: self.capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_drops_on_full() {
        let mail = Mailboxes::new(1, 2);
        assert_eq!(mail.send(0, 1), Ok(true));
        assert_eq!(mail.send(0, 2), Ok(true));
        assert_eq!(mail.send(0, 3), Ok(false));
        assert_eq!(mail.stats(0).unwrap().queued, 2);
    }

    #[test]
    fn recv_is_noop_on_empty() {
        let mail = Mailboxes::new(1, 4);
        assert_eq!(mail.recv(0), Ok(None));

        mail.send(0, 42).unwrap();
        assert_eq!(mail.recv(0), Ok(Some(42)));
        assert_eq!(mail.recv(0), Ok(None));
    }

    #[test]
    fn unknown_slot_is_an_error() {
        let mail = Mailboxes::new(2, 4);
        assert_eq!(mail.send(5, 0), Err(IpcError::UnknownSlot(5)));
        assert_eq!(mail.recv(5), Err(IpcError::UnknownSlot(5)));
    }
}
