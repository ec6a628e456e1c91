//! Link state shared between a transport and its reader task

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use zkclock_core::TransportKind;

type ErrorHook = Arc<dyn Fn(&io::Error) + Send + Sync>;
type CloseHook = Arc<dyn Fn(TransportKind) + Send + Sync>;

/// Socket lifecycle hooks
///
/// `on_error` fires on connect/bind failures and read errors,
/// `on_close` fires once when the link goes down.
#[derive(Clone, Default)]
pub struct SocketCallbacks {
    on_error: Option<ErrorHook>,
    on_close: Option<CloseHook>,
}

impl SocketCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the error hook
    pub fn with_on_error(mut self, hook: impl Fn(&io::Error) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Set the close hook
    pub fn with_on_close(mut self, hook: impl Fn(TransportKind) + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(hook));
        self
    }

    pub(crate) fn error(&self, err: &io::Error) {
        if let Some(hook) = &self.on_error {
            hook(err);
        }
    }

    pub(crate) fn close(&self, kind: TransportKind) {
        if let Some(hook) = &self.on_close {
            hook(kind);
        }
    }
}

impl fmt::Debug for SocketCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketCallbacks")
            .field("on_error", &self.on_error.is_some())
            .field("on_close", &self.on_close.is_some())
            .finish()
    }
}

/// Open flag plus the hooks to run when it flips
#[derive(Debug)]
pub(crate) struct Link {
    kind: TransportKind,
    open: AtomicBool,
    callbacks: Mutex<SocketCallbacks>,
}

impl Link {
    pub(crate) fn new(kind: TransportKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            open: AtomicBool::new(false),
            callbacks: Mutex::new(SocketCallbacks::default()),
        })
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub(crate) fn set_callbacks(&self, callbacks: SocketCallbacks) {
        *self.callbacks.lock() = callbacks;
    }

    pub(crate) fn mark_open(&self) {
        self.open.store(true, Ordering::Release);
    }

    pub(crate) fn report_error(&self, err: &io::Error) {
        let callbacks = self.callbacks.lock().clone();
        callbacks.error(err);
    }

    /// Flip to closed; the close hook runs only on the first call
    pub(crate) fn mark_closed(&self) -> bool {
        let was_open = self.open.swap(false, Ordering::AcqRel);
        if was_open {
            debug!(transport = %self.kind, "Link closed");
            let callbacks = self.callbacks.lock().clone();
            callbacks.close(self.kind);
        }
        was_open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_close_hook_fires_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();

        let link = Link::new(TransportKind::Udp);
        link.set_callbacks(SocketCallbacks::new().with_on_close(move |kind| {
            assert_eq!(kind, TransportKind::Udp);
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        link.mark_open();

        assert!(link.mark_closed());
        assert!(!link.mark_closed());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_error_hook() {
        let hit = Arc::new(AtomicBool::new(false));
        let seen = hit.clone();

        let link = Link::new(TransportKind::Tcp);
        link.set_callbacks(SocketCallbacks::new().with_on_error(move |err| {
            assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
            seen.store(true, Ordering::SeqCst);
        }));
        link.report_error(&io::Error::from(io::ErrorKind::ConnectionReset));

        assert!(hit.load(Ordering::SeqCst));
    }
}
