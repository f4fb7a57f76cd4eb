//! Connection lifecycle tracking.

use tracing::{info, warn};

use crate::gatt::Registry;
use crate::le::{ConnHandle, RawAddr};

/// Link state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connected {
        peer: RawAddr,
        cn: ConnHandle,
    },
}

/// Connection state of a peripheral that serves one central at a time.
/// Starts disconnected and connectable.
#[derive(Clone, Debug)]
pub struct Link {
    state: LinkState,
    connectable: bool,
    count: u32,
}

impl Link {
    /// Creates a disconnected link.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: LinkState::Disconnected,
            connectable: true,
            count: 0,
        }
    }

    /// Records a new connection. The device stops being connectable.
    pub fn on_connect(&mut self, peer: RawAddr, cn: ConnHandle) {
        if let LinkState::Connected { cn: old, .. } = self.state {
            warn!("Connection {cn} replaces {old} without a disconnect");
        }
        self.state = LinkState::Connected { peer, cn };
        self.connectable = false;
        self.count = self.count.wrapping_add(1);
        info!("Connected to {peer} ({cn})");
    }

    /// Records a disconnect and returns the previous connection handle. All
    /// notification subscriptions are dropped and the device becomes
    /// connectable again.
    pub fn on_disconnect(&mut self, reg: &mut Registry) -> Option<ConnHandle> {
        let prev = self.conn_handle();
        self.state = LinkState::Disconnected;
        reg.reset_notifications();
        self.connectable = true;
        match prev {
            Some(cn) => info!("Disconnected ({cn})"),
            None => info!("Disconnected"),
        }
        prev
    }

    /// Returns the current state.
    #[inline(always)]
    #[must_use]
    pub const fn state(&self) -> LinkState {
        self.state
    }

    /// Returns whether a central is connected.
    #[inline(always)]
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self.state, LinkState::Connected { .. })
    }

    /// Returns the active connection handle.
    #[inline]
    #[must_use]
    pub const fn conn_handle(&self) -> Option<ConnHandle> {
        match self.state {
            LinkState::Connected { cn, .. } => Some(cn),
            LinkState::Disconnected => None,
        }
    }

    /// Returns the connected peer address.
    #[inline]
    #[must_use]
    pub const fn peer(&self) -> Option<RawAddr> {
        match self.state {
            LinkState::Connected { peer, .. } => Some(peer),
            LinkState::Disconnected => None,
        }
    }

    /// Returns whether the device should advertise.
    #[inline(always)]
    #[must_use]
    pub const fn is_connectable(&self) -> bool {
        self.connectable
    }

    /// Returns the number of connections established so far.
    #[inline(always)]
    #[must_use]
    pub const fn connections(&self) -> u32 {
        self.count
    }
}

impl Default for Link {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
