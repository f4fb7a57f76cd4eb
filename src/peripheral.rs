use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{trace, warn};

use crate::att::Handle;
use crate::conn::Link;
use crate::gatt::{Dispatch, Registry, Scheduler, ServiceDef};
use crate::le::{ConnHandle, RawAddr};
use crate::stack::{Stack, Status};
use crate::{Config, Error, Result};

/// Peripheral dispatch context. Owns the stack interface, the attribute
/// registry, the link state, and the notification scheduler. All event
/// handlers and [`Self::poll_tick`] must run in one execution context (see
/// [`SharedPeripheral`] for stacks that deliver events from another thread).
#[derive(Debug)]
pub struct Peripheral<S> {
    stack: S,
    reg: Registry,
    link: Link,
    sched: Scheduler,
    cfg: Config,
}

impl<S: Stack> Peripheral<S> {
    /// Creates a disconnected peripheral.
    pub fn new(stack: S, cfg: Config) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            stack,
            reg: Registry::new(cfg.max_services),
            link: Link::new(),
            sched: Scheduler::new(cfg.tx_failure_limit, cfg.tx_log_capacity),
            cfg,
        })
    }

    /// Registers a service with the stack. Initialization should be aborted on
    /// error.
    #[inline]
    pub fn register(&mut self, def: ServiceDef) -> Result<Handle> {
        self.reg.register(&mut self.stack, def)
    }

    /// Handles a connection complete event.
    #[inline]
    pub fn on_connected(&mut self, peer: impl Into<RawAddr>, cn: ConnHandle) {
        self.link.on_connect(peer.into(), cn);
    }

    /// Handles a disconnection complete event.
    #[inline]
    pub fn on_disconnected(&mut self) {
        self.link.on_disconnect(&mut self.reg);
    }

    /// Handles a read request for attribute `hdl` held by the stack.
    #[inline]
    pub fn on_read_request(&mut self, hdl: u16) -> Dispatch {
        (self.reg).dispatch_read(&mut self.stack, &self.link, hdl)
    }

    /// Handles a modification of attribute `hdl` by the client.
    #[inline]
    pub fn on_attribute_modified(&mut self, hdl: u16, val: &[u8]) -> Dispatch {
        (self.reg).dispatch_attribute_modified(&mut self.stack, &self.link, hdl, val)
    }

    /// Performs one iteration of the poll loop: requests advertising while
    /// connectable and flushes pending notifications. Returns the number of
    /// notifications sent.
    ///
    /// An [`Error::Advertise`] error skips the flush and is retried on the next
    /// tick. [`Error::LinkExhausted`] is returned by this and all later calls.
    pub fn poll_tick(&mut self) -> Result<usize> {
        self.sched.check()?;
        if self.link.is_connectable() {
            match self.stack.set_discoverable() {
                Ok(()) => {}
                Err(Status::CommandDisallowed) => trace!("Advertising already enabled"),
                Err(e) => {
                    warn!("Failed to enable advertising: {e}");
                    return Err(Error::Advertise(e));
                }
            }
        }
        (self.sched).flush(&self.reg, &mut self.stack, &self.link)
    }

    /// Marks the value of the characteristic with value handle `hdl` as
    /// changed. Returns `false` if there is no such characteristic or it has no
    /// change flag.
    pub fn mark_pending(&self, hdl: Handle) -> bool {
        (self.reg.find_by_value_handle(hdl))
            .and_then(|i| self.reg.get(i))
            .map_or(false, |(_, c)| Scheduler::mark_pending(c))
    }

    /// Returns whether a central is connected.
    #[inline(always)]
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Returns the attribute registry.
    #[inline(always)]
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.reg
    }

    /// Returns the link state.
    #[inline(always)]
    #[must_use]
    pub const fn link(&self) -> &Link {
        &self.link
    }

    /// Returns the notification scheduler.
    #[inline(always)]
    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler {
        &self.sched
    }

    /// Returns the configuration.
    #[inline(always)]
    pub const fn config(&self) -> &Config {
        &self.cfg
    }

    /// Returns the stack interface.
    #[inline(always)]
    #[must_use]
    pub const fn stack(&self) -> &S {
        &self.stack
    }

    /// Returns the stack interface.
    #[inline(always)]
    #[must_use]
    pub fn stack_mut(&mut self) -> &mut S {
        &mut self.stack
    }

    /// Moves the peripheral behind a mutex.
    #[inline]
    #[must_use]
    pub fn into_shared(self) -> SharedPeripheral<S> {
        SharedPeripheral(Arc::new(Mutex::new(self)))
    }
}

/// Peripheral shared between the stack event thread and the poll loop. Every
/// event handler and poll tick runs under one lock.
#[derive(Debug)]
#[repr(transparent)]
pub struct SharedPeripheral<S>(Arc<Mutex<Peripheral<S>>>);

impl<S: Stack> SharedPeripheral<S> {
    /// Locks the peripheral.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, Peripheral<S>> {
        self.0.lock()
    }

    /// Handles a connection complete event.
    #[inline]
    pub fn on_connected(&self, peer: impl Into<RawAddr>, cn: ConnHandle) {
        self.lock().on_connected(peer, cn);
    }

    /// Handles a disconnection complete event.
    #[inline]
    pub fn on_disconnected(&self) {
        self.lock().on_disconnected();
    }

    /// Handles a read request for attribute `hdl` held by the stack.
    #[inline]
    pub fn on_read_request(&self, hdl: u16) -> Dispatch {
        self.lock().on_read_request(hdl)
    }

    /// Handles a modification of attribute `hdl` by the client.
    #[inline]
    pub fn on_attribute_modified(&self, hdl: u16, val: &[u8]) -> Dispatch {
        self.lock().on_attribute_modified(hdl, val)
    }

    /// Performs one iteration of the poll loop.
    #[inline]
    pub fn poll_tick(&self) -> Result<usize> {
        self.lock().poll_tick()
    }
}

impl<S> Clone for SharedPeripheral<S> {
    #[inline]
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}
