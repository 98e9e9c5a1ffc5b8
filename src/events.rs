//! Events the synchronizer emits while scanning.

use crate::types::Hash;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    /// A block has been scanned and the wallet is now at this height.
    BlockProcessed { height: u64 },
    /// A transaction paying one of our sub wallets was found.
    TransactionFound { hash: Hash, amount: i64, block_height: u64 },
    /// The daemon has no more blocks for us.
    SyncCaughtUp { height: u64 },
    /// Blocks at and above this height were replaced by the daemon.
    ChainForked { fork_height: u64 },
}

/// Fan-out channel shared between the wallet and its synchronizer. Not
/// persisted; a fresh one is made every time a wallet is loaded.
#[derive(Clone)]
pub struct EventHandler {
    sender: broadcast::Sender<WalletEvent>,
}

impl EventHandler {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.sender.subscribe()
    }

    /// Events nobody listens to are dropped.
    pub fn emit(&self, event: WalletEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers() {
        let events = EventHandler::new(4);
        events.emit(WalletEvent::BlockProcessed { height: 1 });
    }

    #[test]
    fn test_subscribers_receive_events() {
        let events = EventHandler::new(4);
        let mut rx = events.subscribe();

        events.emit(WalletEvent::BlockProcessed { height: 7 });
        events.emit(WalletEvent::SyncCaughtUp { height: 7 });

        assert_eq!(rx.try_recv().unwrap(), WalletEvent::BlockProcessed { height: 7 });
        assert_eq!(rx.try_recv().unwrap(), WalletEvent::SyncCaughtUp { height: 7 });
        assert!(rx.try_recv().is_err());
    }
}
