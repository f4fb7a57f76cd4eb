use std::collections::VecDeque;

use tracing::{error, trace, warn};

use crate::att::Handle;
use crate::conn::Link;
use crate::stack::{Stack, Status};
use crate::{Error, Result};

use super::{Attr, CharBinding, IoReq, NotifyReq, Registry, Val};

/// Failed notification record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxFailure {
    /// Failure sequence number, starting at 0.
    pub seq: u32,
    /// Characteristic value handle.
    pub hdl: Handle,
    /// Status returned by the callback.
    pub status: Status,
    /// Last value the callback attempted to send.
    pub val: Val,
}

/// Bounded log of the most recent transmit failures. The failure count is
/// cumulative and is not reduced by eviction.
#[derive(Clone, Debug)]
pub struct TxLog {
    recs: VecDeque<TxFailure>,
    cap: usize,
    total: u32,
}

impl TxLog {
    /// Creates an empty log holding at most `cap` records.
    #[inline]
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            recs: VecDeque::with_capacity(cap),
            cap,
            total: 0,
        }
    }

    /// Appends a failure, evicting the oldest record if the log is full.
    pub fn push(&mut self, hdl: Handle, status: Status, val: Val) -> &TxFailure {
        if self.recs.len() >= self.cap {
            self.recs.pop_front();
        }
        let seq = self.total;
        self.total = self.total.saturating_add(1);
        self.recs.push_back(TxFailure {
            seq,
            hdl,
            status,
            val,
        });
        // Non-empty after push_back
        &self.recs[self.recs.len() - 1]
    }

    /// Returns the number of failures recorded so far.
    #[inline(always)]
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.total
    }

    /// Returns the most recent failure.
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&TxFailure> {
        self.recs.back()
    }

    /// Returns an iterator over the retained failures, oldest first.
    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &TxFailure> + '_ {
        self.recs.iter()
    }

    /// Returns the number of retained failures.
    #[inline(always)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.recs.len()
    }

    /// Returns whether no failures are retained.
    #[inline(always)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recs.is_empty()
    }
}

/// Notification scheduler. Converts producer value changes into notify
/// callback invocations once per change while the client is subscribed.
#[derive(Clone, Debug)]
pub struct Scheduler {
    log: TxLog,
    limit: u32,
    exhausted: bool,
}

impl Scheduler {
    /// Creates a scheduler that declares the link exhausted after `limit`
    /// transmit failures and keeps the last `log_cap` failure records.
    #[inline]
    #[must_use]
    pub fn new(limit: u32, log_cap: usize) -> Self {
        Self {
            log: TxLog::new(log_cap),
            limit,
            exhausted: false,
        }
    }

    /// Marks the characteristic value as changed. Returns `false` if the
    /// characteristic has no producer-owned change flag.
    pub fn mark_pending(c: &CharBinding) -> bool {
        c.pending().map_or(false, |p| {
            p.mark();
            true
        })
    }

    /// Invokes the notify callback of each subscribed characteristic with a
    /// pending value in registration order. The pending flag is cleared before
    /// the callback runs and stays cleared even if the callback fails. Nothing
    /// is flushed while disconnected. Returns the number of successful notifications
    /// or [`Error::LinkExhausted`] once the failure limit is reached. The
    /// exhausted state is permanent.
    pub fn flush<S: Stack>(&mut self, reg: &Registry, stack: &mut S, link: &Link) -> Result<usize> {
        self.check()?;
        let mut n = 0;
        for (svc, c) in reg.chars() {
            let (Some(io), Some(p)) = (c.notify.as_ref(), c.pending()) else {
                continue;
            };
            if !c.notification_enabled() || !p.is_set() {
                continue;
            }
            let Some(cn) = link.conn_handle() else {
                trace!("Deferring {} until connected", c.value_handle());
                continue;
            };
            if !p.take() {
                continue;
            }
            let mut sent = Val::new();
            let at = Attr::new(svc.service_handle(), c.handles(), Some(cn), &mut *stack);
            let r = io.call(IoReq::Notify(NotifyReq(at.recording(&mut sent))));
            let Err(status) = r else {
                trace!("Notified {} ({} bytes)", c.value_handle(), sent.len());
                n += 1;
                continue;
            };
            let f = self.log.push(c.value_handle(), status, sent);
            warn!(
                "Notification #{} for {} failed: {status} {:02X?}",
                f.seq,
                f.hdl,
                f.val.as_slice()
            );
            if self.log.total() >= self.limit {
                self.exhausted = true;
                error!("Link exhausted after {} transmit failures", self.log.total());
                return Err(self.exhausted_err());
            }
        }
        Ok(n)
    }

    /// Returns [`Error::LinkExhausted`] if the failure limit was reached.
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.exhausted {
            return Err(self.exhausted_err());
        }
        Ok(())
    }

    /// Returns the failure log.
    #[inline(always)]
    #[must_use]
    pub const fn log(&self) -> &TxLog {
        &self.log
    }

    /// Returns the failure limit.
    #[inline(always)]
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    /// Returns whether the failure limit was reached.
    #[inline(always)]
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    #[inline]
    fn exhausted_err(&self) -> Error {
        Error::LinkExhausted {
            failures: self.log.total(),
        }
    }
}

impl Default for Scheduler {
    #[inline]
    fn default() -> Self {
        let cfg = crate::Config::default();
        Self::new(cfg.tx_failure_limit, cfg.tx_log_capacity)
    }
}
