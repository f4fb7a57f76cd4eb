use tracing::{debug, trace, warn};

use crate::att::Handle;
use crate::conn::Link;
use crate::stack::Stack;

use super::{Attr, CharIdx, IoReq, ReadReq, Registry, WriteReq};

/// Attribute event dispatch outcome.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Dispatch {
    /// The handle does not belong to any registered characteristic value or
    /// CCCD. The stack manages such attributes itself.
    Miss,
    /// Value read. The read callback, if any, was invoked.
    Read(CharIdx),
    /// Value write. The write callback, if any, was invoked.
    Write(CharIdx),
    /// CCCD write that enabled or disabled notifications.
    Subscribe { idx: CharIdx, enabled: bool },
}

impl Dispatch {
    /// Returns the matched characteristic.
    #[inline]
    #[must_use]
    pub const fn target(self) -> Option<CharIdx> {
        match self {
            Self::Miss => None,
            Self::Read(i) | Self::Write(i) | Self::Subscribe { idx: i, .. } => Some(i),
        }
    }
}

impl Registry {
    /// Routes a read request for handle `hdl` to the read callback of the
    /// characteristic whose value access handle matches. A held read is
    /// released while connected whether or not anything matched.
    pub fn dispatch_read<S: Stack>(&self, stack: &mut S, link: &Link, hdl: u16) -> Dispatch {
        let idx = Handle::new(hdl).and_then(|h| self.find_by_access_handle(h));
        let r = match idx.and_then(|i| Some((i, self.get(i)?))) {
            Some((i, (svc, c))) => {
                if let Some(io) = c.read.as_ref() {
                    let cn = link.conn_handle();
                    let at = Attr::new(svc.service_handle(), c.handles(), cn, &mut *stack);
                    match io.call(IoReq::Read(ReadReq(at))) {
                        Ok(()) => debug!("Read {} at {}", c.uuid(), c.value_handle()),
                        Err(e) => warn!("Read callback for {} failed: {e}", c.value_handle()),
                    }
                }
                Dispatch::Read(i)
            }
            None => {
                trace!("Read of unbound handle {hdl:#06X}");
                Dispatch::Miss
            }
        };
        if let Some(cn) = link.conn_handle() {
            if let Err(e) = stack.allow_pending_read(cn) {
                warn!("Failed to release read on {cn}: {e}");
            }
        }
        r
    }

    /// Routes an attribute modification. A CCCD match anywhere in the registry
    /// takes precedence over a value write match. A first payload byte of
    /// `0x01` enables notifications and anything else, including an empty
    /// payload, disables them. Write payloads are passed through unvalidated.
    pub fn dispatch_attribute_modified<S: Stack>(
        &mut self,
        stack: &mut S,
        link: &Link,
        hdl: u16,
        val: &[u8],
    ) -> Dispatch {
        let Some(h) = Handle::new(hdl) else {
            trace!("Modification of invalid handle {hdl:#06X}");
            return Dispatch::Miss;
        };
        if let Some(idx) = self.find_by_cccd_handle(h) {
            let enabled = val.first() == Some(&0x01);
            if let Some(c) = self.get_mut(idx) {
                c.set_notification_enabled(enabled);
                debug!("Notifications for {} enabled: {enabled}", c.value_handle());
            }
            return Dispatch::Subscribe { idx, enabled };
        }
        let idx = self.find_by_access_handle(h);
        let Some((idx, (svc, c))) = idx.and_then(|i| Some((i, self.get(i)?))) else {
            trace!("Modification of unbound handle {h}");
            return Dispatch::Miss;
        };
        if let Some(io) = c.write.as_ref() {
            let cn = link.conn_handle();
            let attr = Attr::new(svc.service_handle(), c.handles(), cn, &mut *stack);
            match io.call(IoReq::Write(WriteReq { attr, val })) {
                Ok(()) => debug!("Write {} bytes to {}", val.len(), c.value_handle()),
                Err(e) => warn!("Write callback for {} failed: {e}", c.value_handle()),
            }
        }
        Dispatch::Write(idx)
    }
}
