//! GATT characteristic bindings, event dispatch, and notification scheduling.

pub use {dispatch::*, io::*, notify::*, registry::*, value::*};

mod dispatch;
mod io;
mod notify;
mod registry;
mod value;
#[cfg(test)]
mod tests;
