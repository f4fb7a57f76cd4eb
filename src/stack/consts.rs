#![allow(clippy::use_self)]

use bitflags::bitflags;

/// Stack command status codes.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, num_enum::FromPrimitive, strum::Display, thiserror::Error,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum Status {
    Success = 0x00,
    UnknownConnectionIdentifier = 0x02,
    CommandDisallowed = 0x0C,
    InvalidCommandParameters = 0x12,
    OutOfMemory = 0x1F,
    #[num_enum(default)]
    Failed = 0x41,
    InvalidParameters = 0x42,
    Busy = 0x43,
    NotAllowed = 0x46,
    StackError = 0x47,
    InsufficientResources = 0x64,
    Timeout = 0xFF,
}

impl Status {
    /// Returns whether status is `Success`.
    #[inline]
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Status::Success)
    }

    /// Converts the status into a result.
    #[inline]
    pub const fn ok(self) -> Result<(), Self> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl Default for Status {
    #[inline]
    fn default() -> Self {
        Self::Success
    }
}

impl From<Status> for u8 {
    #[inline]
    fn from(s: Status) -> Self {
        s as _
    }
}

/// Service declaration type.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, num_enum::IntoPrimitive, strum::Display)]
#[repr(u8)]
pub enum ServiceType {
    #[default]
    Primary = 0x01,
    Secondary = 0x02,
}

bitflags! {
    /// Characteristic properties.
    #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct Prop: u8 {
        /// Permits broadcasts of the value.
        const BROADCAST = 0x01;
        /// Permits reads of the value.
        const READ = 0x02;
        /// Permits writes of the value without response.
        const WRITE_CMD = 0x04;
        /// Permits writes of the value with response.
        const WRITE = 0x08;
        /// Permits notifications of the value. Requires a CCCD.
        const NOTIFY = 0x10;
        /// Permits indications of the value. Requires a CCCD.
        const INDICATE = 0x20;
        /// Permits signed writes.
        const SIGNED_WRITE = 0x40;
        /// Extended properties are present.
        const EXT_PROPS = 0x80;
    }
}

bitflags! {
    /// Attribute security permissions.
    #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct Perm: u8 {
        const NONE = 0x00;
        const AUTHN_READ = 0x01;
        const AUTHZ_READ = 0x02;
        const ENCRYPT_READ = 0x04;
        const AUTHN_WRITE = 0x08;
        const AUTHZ_WRITE = 0x10;
        const ENCRYPT_WRITE = 0x20;
    }
}

bitflags! {
    /// Attribute events reported by the stack to the application.
    #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct EvtMask: u8 {
        /// Report attribute modifications.
        const ATTRIBUTE_WRITE = 0x01;
        /// Hold write requests until the application responds.
        const WRITE_REQ_WAIT = 0x02;
        /// Hold read requests until the application releases them.
        const READ_REQ_WAIT = 0x04;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status() {
        assert_eq!(Status::from(0x00), Status::Success);
        assert_eq!(Status::from(0x1F), Status::OutOfMemory);
        assert_eq!(Status::from(0xAB), Status::Failed);
        assert_eq!(u8::from(Status::CommandDisallowed), 0x0C);
        assert!(Status::Success.ok().is_ok());
        assert_eq!(Status::Busy.ok(), Err(Status::Busy));
        assert_eq!(Status::Timeout.to_string(), "Timeout");
    }

    #[test]
    fn prop() {
        let p = Prop::NOTIFY | Prop::READ;
        assert_eq!(p.bits(), 0x12);
        assert!(p.intersects(Prop::NOTIFY | Prop::INDICATE));
        assert_eq!(u8::from(ServiceType::Secondary), 2);
    }
}
