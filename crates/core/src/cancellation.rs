// Cancellation Token
// Used both to abort a blocking dequeue and to stop consumer loops.

use std::sync::OnceLock;
use tokio::sync::watch;

static NEVER: OnceLock<watch::Sender<bool>> = OnceLock::new();

/// Cancellation signal observed by dequeue calls and consumer loops
#[derive(Clone, Debug)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
}

impl CancellationToken {
    /// A token that is never cancelled
    pub fn never() -> Self {
        // Shared sender that is never signalled and never dropped
        let tx = NEVER.get_or_init(|| watch::channel(false).0);
        Self { rx: tx.subscribe() }
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested.
    ///
    /// Pends forever if the source is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let source_dropped = rx.wait_for(|cancelled| *cancelled).await.is_err();
        if source_dropped {
            std::future::pending::<()>().await;
        }
    }
}

/// Owner side of a cancellation channel
#[derive(Debug)]
pub struct CancellationSource {
    tx: watch::Sender<bool>,
}

impl CancellationSource {
    /// Signal cancellation to every token cloned from this channel
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Hand out another token observing this source
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Create a cancellation channel
pub fn cancellation_channel() -> (CancellationSource, CancellationToken) {
    let (tx, rx) = watch::channel(false);
    (CancellationSource { tx }, CancellationToken { rx })
}
