//! Recording stack double.

use std::collections::{BTreeSet, VecDeque};

use super::*;

/// Command issued to [`MockStack`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Call {
    RegisterService(Uuid),
    RegisterCharacteristic(Handle, Uuid),
    RegisterDescriptor(Handle, Uuid),
    Update {
        svc: Handle,
        chr: Handle,
        val: Vec<u8>,
    },
    AllowRead(ConnHandle),
    SetDiscoverable,
}

/// In-memory stack that allocates handles like a real controller, records
/// every command, and fails on request.
///
/// A characteristic occupies its registration handle, the value attribute,
/// and a CCCD when it is notifiable or indicatable. Services and descriptors
/// occupy one handle each.
#[derive(Debug)]
pub struct MockStack {
    next: u16,
    calls: Vec<Call>,
    used: BTreeSet<u16>,
    svc_room: Vec<(Handle, u8)>,
    char_hdls: VecDeque<u16>,
    reg_fail: Option<(usize, Status)>,
    update_fail: VecDeque<Status>,
    adv_fail: VecDeque<Status>,
    dup: usize,
}

impl MockStack {
    /// Creates a stack that allocates handles starting at `0x0001`.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(0x0001)
    }

    /// Creates a stack that allocates handles starting at `first`.
    #[must_use]
    pub fn starting_at(first: u16) -> Self {
        Self {
            next: first.max(1),
            calls: Vec::new(),
            used: BTreeSet::new(),
            svc_room: Vec::new(),
            char_hdls: VecDeque::new(),
            reg_fail: None,
            update_fail: VecDeque::new(),
            adv_fail: VecDeque::new(),
            dup: 0,
        }
    }

    /// Assigns explicit registration handles to the next characteristics.
    /// Allocation continues after the last explicit handle.
    #[must_use]
    pub fn with_char_handles(mut self, hdls: impl IntoIterator<Item = u16>) -> Self {
        self.char_hdls.extend(hdls);
        self
    }

    /// Fails the `n`th registration command (0-based, counting services,
    /// characteristics, and descriptors) with `status`.
    #[must_use]
    pub fn fail_registration(mut self, n: usize, status: Status) -> Self {
        self.reg_fail = Some((n, status));
        self
    }

    /// Fails the next `n` value updates with `status`.
    pub fn fail_updates(&mut self, n: usize, status: Status) {
        self.update_fail.extend(std::iter::repeat(status).take(n));
    }

    /// Fails the next advertising request with `status`.
    pub fn fail_discoverable(&mut self, status: Status) {
        self.adv_fail.push_back(status);
    }

    /// Returns all recorded commands.
    #[inline]
    #[must_use]
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    /// Removes and returns all recorded commands.
    #[inline]
    pub fn take_calls(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }

    /// Returns the values pushed to the stack in order.
    #[must_use]
    pub fn updates(&self) -> Vec<(Handle, Vec<u8>)> {
        (self.calls.iter())
            .filter_map(|c| match c {
                Call::Update { chr, val, .. } => Some((*chr, val.clone())),
                _ => None,
            })
            .collect()
    }

    /// Returns the number of times a handle was assigned twice. A correct
    /// registry never accepts such an assignment.
    #[inline]
    #[must_use]
    pub const fn duplicate_assignments(&self) -> usize {
        self.dup
    }

    fn registration(&mut self) -> Result<()> {
        let n = (self.calls.iter())
            .filter(|c| {
                matches!(
                    c,
                    Call::RegisterService(_)
                        | Call::RegisterCharacteristic(..)
                        | Call::RegisterDescriptor(..)
                )
            })
            .count();
        match self.reg_fail {
            Some((i, st)) if i + 1 == n => Err(st),
            _ => Ok(()),
        }
    }

    fn alloc(&mut self, svc: Option<Handle>, first: Option<u16>, n: u16) -> Result<Handle> {
        if let Some(svc) = svc {
            let Some((_, room)) = self.svc_room.iter_mut().find(|(h, _)| *h == svc) else {
                return Err(Status::InvalidParameters);
            };
            let n8 = u8::try_from(n).map_err(|_| Status::OutOfMemory)?;
            *room = room.checked_sub(n8).ok_or(Status::OutOfMemory)?;
        }
        let start = first.unwrap_or(self.next);
        let last = start.checked_add(n - 1).ok_or(Status::OutOfMemory)?;
        for h in start..=last {
            if !self.used.insert(h) {
                self.dup += 1;
            }
        }
        self.next = self.next.max(last.saturating_add(1));
        Handle::new(start).ok_or(Status::InvalidParameters)
    }
}

impl Default for MockStack {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Stack for MockStack {
    fn register_service(&mut self, uuid: Uuid, _: ServiceType, max_attrs: u8) -> Result<Handle> {
        self.calls.push(Call::RegisterService(uuid));
        self.registration()?;
        if max_attrs == 0 {
            return Err(Status::InvalidParameters);
        }
        let h = self.alloc(None, None, 1)?;
        self.svc_room.push((h, max_attrs - 1));
        Ok(h)
    }

    fn register_characteristic(&mut self, svc: Handle, decl: &CharDecl) -> Result<Handle> {
        self.calls.push(Call::RegisterCharacteristic(svc, decl.uuid));
        self.registration()?;
        let n = if decl.has_cccd() { 3 } else { 2 };
        let first = self.char_hdls.pop_front();
        self.alloc(Some(svc), first, n)
    }

    fn register_descriptor(&mut self, svc: Handle, chr: Handle, decl: &DescDecl) -> Result<Handle> {
        self.calls.push(Call::RegisterDescriptor(chr, decl.uuid));
        self.registration()?;
        self.alloc(Some(svc), None, 1)
    }

    fn update_characteristic_value(
        &mut self,
        svc: Handle,
        chr: Handle,
        _: u8,
        val: &[u8],
    ) -> Result<()> {
        self.calls.push(Call::Update {
            svc,
            chr,
            val: val.to_vec(),
        });
        self.update_fail.pop_front().map_or(Ok(()), Err)
    }

    fn allow_pending_read(&mut self, cn: ConnHandle) -> Result<()> {
        self.calls.push(Call::AllowRead(cn));
        Ok(())
    }

    fn set_discoverable(&mut self) -> Result<()> {
        self.calls.push(Call::SetDiscoverable);
        self.adv_fail.pop_front().map_or(Ok(()), Err)
    }
}
