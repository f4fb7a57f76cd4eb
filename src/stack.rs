//! External radio stack interface.
//!
//! The stack owns the attribute database, the link layer, and advertising. The
//! dispatch core only registers attributes, pushes characteristic values, and
//! releases stalled reads through this interface.

use smallvec::SmallVec;

pub use consts::*;

use crate::att::Handle;
use crate::le::ConnHandle;
use crate::uuid::Uuid;

mod consts;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

/// Stack operation result type.
pub type Result<T> = std::result::Result<T, Status>;

/// Commands consumed from the radio stack.
pub trait Stack {
    /// Adds a service declaration with room for `max_attrs` attribute records
    /// (including the declaration itself) and returns its handle.
    fn register_service(&mut self, uuid: Uuid, typ: ServiceType, max_attrs: u8) -> Result<Handle>;

    /// Adds a characteristic to service `svc` and returns its registration
    /// handle. The value access attribute and CCCD follow at fixed offsets
    /// (see [`crate::att::CharHandles`]).
    fn register_characteristic(&mut self, svc: Handle, decl: &CharDecl) -> Result<Handle>;

    /// Adds a descriptor to characteristic `chr` of service `svc`.
    fn register_descriptor(&mut self, svc: Handle, chr: Handle, decl: &DescDecl) -> Result<Handle>;

    /// Updates the value of characteristic `chr`, which either answers a
    /// pending read or transmits a notification to subscribed clients.
    fn update_characteristic_value(
        &mut self,
        svc: Handle,
        chr: Handle,
        off: u8,
        val: &[u8],
    ) -> Result<()>;

    /// Releases a read request that the stack is holding for the application.
    fn allow_pending_read(&mut self, cn: ConnHandle) -> Result<()>;

    /// Makes the device discoverable and connectable.
    fn set_discoverable(&mut self) -> Result<()>;
}

/// Characteristic declaration parameters.
#[derive(Clone, Debug, Eq, PartialEq)]
#[must_use]
pub struct CharDecl {
    pub uuid: Uuid,
    pub max_len: u16,
    pub props: Prop,
    pub perms: Perm,
    pub evt: EvtMask,
    pub key_size: u8,
    pub var_len: bool,
}

impl CharDecl {
    /// Default encryption key size.
    pub const KEY_SIZE: u8 = 16;

    /// Creates a variable-length declaration with no security requirements.
    #[inline]
    pub const fn new(uuid: Uuid, max_len: u16, props: Prop) -> Self {
        Self {
            uuid,
            max_len,
            props,
            perms: Perm::NONE,
            evt: EvtMask::empty(),
            key_size: Self::KEY_SIZE,
            var_len: true,
        }
    }

    /// Returns whether the stack allocates a CCCD for this characteristic.
    #[inline]
    #[must_use]
    pub const fn has_cccd(&self) -> bool {
        self.props.intersects(Prop::NOTIFY.union(Prop::INDICATE))
    }
}

/// Descriptor declaration parameters.
#[derive(Clone, Debug, Eq, PartialEq)]
#[must_use]
pub struct DescDecl {
    pub uuid: Uuid,
    pub max_len: u8,
    pub val: SmallVec<[u8; 16]>,
    pub perms: Perm,
}

impl DescDecl {
    /// Creates a read-only descriptor with a fixed value.
    #[inline]
    pub fn new(uuid: Uuid, val: impl AsRef<[u8]>) -> Self {
        let val = SmallVec::from_slice(val.as_ref());
        Self {
            uuid,
            max_len: u8::try_from(val.len()).unwrap_or(u8::MAX),
            val,
            perms: Perm::NONE,
        }
    }
}
