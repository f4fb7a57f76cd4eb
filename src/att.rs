//! Attribute handles.
//!
//! The stack allocates the attributes of one characteristic contiguously: the
//! handle returned at registration, followed by the value access attribute
//! and, for notifiable characteristics, the client characteristic
//! configuration descriptor (CCCD).

pub use handle::*;

mod handle;
