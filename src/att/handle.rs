use std::fmt::{Debug, Display, Formatter};
use std::num::NonZeroU16;

use crate::util::name_of;

/// Stack-assigned attribute handle.
#[derive(
    Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Handle(NonZeroU16);

impl Handle {
    /// Smallest valid handle.
    pub const MIN: Self = Self(match NonZeroU16::new(0x0001) {
        Some(nz) => nz,
        None => unreachable!(),
    });
    /// Largest valid handle.
    pub const MAX: Self = Self(match NonZeroU16::new(0xFFFF) {
        Some(nz) => nz,
        None => unreachable!(),
    });

    /// Wraps a raw handle. Returns `None` if the handle is invalid.
    #[inline]
    #[must_use]
    pub const fn new(h: u16) -> Option<Self> {
        match NonZeroU16::new(h) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Returns the handle `n` positions after this one or `None` if it does
    /// not fit in 16 bits.
    #[inline]
    #[must_use]
    pub const fn offset(self, n: u16) -> Option<Self> {
        match self.0.get().checked_add(n) {
            Some(h) => Self::new(h),
            None => None,
        }
    }

    /// Returns the next handle or `None` if the maximum handle was reached.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        self.offset(1)
    }
}

impl Debug for Handle {
    #[allow(clippy::use_self)]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({:#06X})", name_of!(Handle), self.0.get())
    }
}

impl Display for Handle {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl From<Handle> for u16 {
    #[inline]
    fn from(h: Handle) -> Self {
        h.0.get()
    }
}

impl From<Handle> for usize {
    #[inline]
    fn from(h: Handle) -> Self {
        Self::from(h.0.get())
    }
}

impl TryFrom<u16> for Handle {
    type Error = ();

    #[inline]
    fn try_from(h: u16) -> Result<Self, Self::Error> {
        Self::new(h).ok_or(())
    }
}

/// Handles of a single characteristic. The layout is fixed by how the stack
/// declares a characteristic: the registration handle `H` is followed by the
/// value access attribute at `H + 1` and the CCCD at `H + 2`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct CharHandles {
    value: Handle,
    access: Handle,
    cccd: Handle,
}

impl CharHandles {
    /// Offset of the value access attribute.
    pub const ACCESS_OFF: u16 = 1;
    /// Offset of the client characteristic configuration descriptor.
    pub const CCCD_OFF: u16 = 2;

    /// Computes the handle layout for a characteristic registered at `value`.
    /// Returns `None` if the CCCD handle would overflow.
    #[inline]
    #[must_use]
    pub const fn new(value: Handle) -> Option<Self> {
        match (value.offset(Self::ACCESS_OFF), value.offset(Self::CCCD_OFF)) {
            (Some(access), Some(cccd)) => Some(Self {
                value,
                access,
                cccd,
            }),
            _ => None,
        }
    }

    /// Returns the handle assigned by the stack at registration.
    #[inline(always)]
    #[must_use]
    pub const fn value_handle(&self) -> Handle {
        self.value
    }

    /// Returns the handle used for read and write access to the value.
    #[inline(always)]
    #[must_use]
    pub const fn access_handle(&self) -> Handle {
        self.access
    }

    /// Returns the client characteristic configuration handle.
    #[inline(always)]
    #[must_use]
    pub const fn cccd_handle(&self) -> Handle {
        self.cccd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_size() {
        assert_eq!(std::mem::size_of::<Handle>(), 2);
        assert_eq!(std::mem::size_of::<Option<Handle>>(), 2);
    }

    #[test]
    fn handle_offset() {
        let h = Handle::new(10).unwrap();
        assert_eq!(u16::from(h.offset(2).unwrap()), 12);
        assert_eq!(h.next(), Handle::new(11));
        assert!(Handle::MAX.next().is_none());
        assert!(Handle::new(0).is_none());
        assert_eq!(format!("{h}"), "Handle(0x000A)");
    }

    #[test]
    fn char_handles() {
        let c = CharHandles::new(Handle::new(0x0010).unwrap()).unwrap();
        assert_eq!(u16::from(c.value_handle()), 0x0010);
        assert_eq!(u16::from(c.access_handle()), 0x0011);
        assert_eq!(u16::from(c.cccd_handle()), 0x0012);

        assert!(CharHandles::new(Handle::new(0xFFFE).unwrap()).is_none());
        assert!(CharHandles::new(Handle::new(0xFFFD).unwrap()).is_some());
    }
}
