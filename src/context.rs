//! Call-chain context threaded through every transaction entry point.
//!
//! A `Context` carries the transaction-open marker used to reject nested
//! transactions, plus an optional cancellation token and deadline. It is a
//! plain value: deriving a child context never affects the parent, so two
//! independent call chains can hold transactions at the same time while one
//! chain can never nest two.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::Error;

#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Set once a `view`/`update` has been entered on this chain
    txn_open: bool,
    /// Cancellation shared with the `CancelToken` that created it
    cancel: Option<CancelToken>,
    /// Point in time after which new transactions are refused
    deadline: Option<Instant>,
}

/// Handle that cancels every context derived from `Context::with_cancel`
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Context {
    /// Empty root context
    pub fn background() -> Self {
        Context::default()
    }

    /// Derive a cancellable context
    pub fn with_cancel(&self) -> (Context, CancelToken) {
        let token = CancelToken::default();
        let ctx = Context {
            cancel: Some(token.clone()),
            ..self.clone()
        };
        (ctx, token)
    }

    /// Derive a context that expires at `deadline`. An earlier existing
    /// deadline is kept.
    pub fn with_deadline(&self, deadline: Instant) -> Context {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Context {
            deadline: Some(deadline),
            ..self.clone()
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Context {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true if a transaction is already active on this call chain
    pub fn is_transaction_open(&self) -> bool {
        self.txn_open
    }

    /// Mark the context as carrying an open transaction
    pub(crate) fn with_open_transaction(&self) -> Context {
        Context {
            txn_open: true,
            ..self.clone()
        }
    }

    /// Why this context is done, if it is
    pub fn err(&self) -> Option<Error> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Some(Error::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Error::DeadlineExceeded),
            _ => None,
        }
    }
}
