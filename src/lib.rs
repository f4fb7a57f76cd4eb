//! GATT dispatch core for Bluetooth LE peripherals.
//!
//! Binds service and characteristic definitions to the attribute handles
//! assigned by an external radio stack, routes incoming attribute events to
//! characteristic callbacks, and schedules outbound notifications from a
//! cooperative poll loop.
//!
//! The stack itself (link layer, advertising, attribute database storage) is
//! an external component reached through the [`stack::Stack`] trait.

pub use {config::*, peripheral::*};

pub mod att;
pub mod conn;
pub mod gatt;
pub mod le;
pub mod stack;
pub mod uuid;

mod config;
mod peripheral;
mod util;

/// Error type returned by the dispatch core.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("stack rejected registration of {uuid} with {status}")]
    Registration { uuid: uuid::Uuid, status: stack::Status },
    #[error("service capacity ({0}) exceeded")]
    ServicesFull(usize),
    #[error("characteristic capacity ({0}) exceeded")]
    CharacteristicsFull(usize),
    #[error("descriptor capacity ({0}) exceeded")]
    DescriptorsFull(usize),
    #[error("stack assigned duplicate value {0}")]
    DuplicateHandle(att::Handle),
    #[error("CCCD handle of {0} is out of range")]
    HandleOverflow(att::Handle),
    #[error("failed to enable advertising: {0}")]
    Advertise(stack::Status),
    #[error("link exhausted after {failures} transmit failures")]
    LinkExhausted { failures: u32 },
    #[error("invalid configuration: {0}")]
    Config(&'static str),
    #[cfg(feature = "fs")]
    #[error("failed to load configuration: {0}")]
    ConfigLoad(String),
}

impl Error {
    /// Returns whether the error is terminal. A supervisor should reset the
    /// device instead of continuing to poll.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::LinkExhausted { .. })
    }
}

/// Common result type.
pub type Result<T> = std::result::Result<T, Error>;
