//! Cooperative interrupt token shared between a driver and its environment.
//!
//! Ctrl-C is routed into the token by [`Interrupt::watch_ctrl_c`]; blocking
//! bridge reads race against [`Interrupt::triggered`] so a driver stuck
//! waiting on the simulator still gets control back and can close the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    flag: AtomicBool,
    notify: Notify,
}

#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    inner: Arc<Inner>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolves once the token has been triggered.
    pub async fn triggered(&self) {
        // Registered before the flag check so a concurrent trigger is not lost.
        let notified = self.inner.notify.notified();
        if self.is_triggered() {
            return;
        }
        notified.await;
    }

    /// Spawns a task on `handle` that triggers the token on the first Ctrl-C.
    pub fn watch_ctrl_c(&self, handle: &Handle) {
        let token = self.clone();
        handle.spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::warn!("Ctrl-C received, interrupting session");
                    token.trigger();
                }
                Err(e) => tracing::error!("unable to listen for Ctrl-C: {}", e),
            }
        });
    }
}
