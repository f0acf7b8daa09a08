use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

/// Single stale-tree notification channel. Each `fire` bumps a generation
/// counter; displays compare generations to know they must re-query.
#[derive(Clone, Debug)]
pub struct RefreshSignal {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for RefreshSignal {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }
}

impl RefreshSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self) {
        self.tx.send_modify(|generation| *generation = generation.wrapping_add(1));
        debug!("tree refresh requested (generation {})", self.generation());
    }

    pub fn generation(&self) -> u64 {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_observe_each_fire() {
        let signal = RefreshSignal::new();
        let mut rx = signal.subscribe();
        assert!(!rx.has_changed().unwrap());

        signal.clone().fire();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);
        assert_eq!(signal.generation(), 1);
    }

    #[test]
    fn fire_without_subscribers_still_advances() {
        let signal = RefreshSignal::new();
        signal.fire();
        signal.fire();
        assert_eq!(signal.generation(), 2);
    }
}
