use std::fmt::{Debug, Formatter};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use smallvec::SmallVec;
use structbuf::{Pack, Packer, StructBuf};

use crate::att::{CharHandles, Handle};
use crate::le::ConnHandle;
use crate::stack::{Stack, Status};
use crate::util::name_of;

/// I/O callback result type. An error from a notify callback is recorded as a
/// transmit failure.
pub type IoResult = std::result::Result<(), Status>;

/// Characteristic value bytes. Inline storage covers a default ATT payload.
pub type Val = SmallVec<[u8; 20]>;

/// Characteristic read, write, or notify callback.
#[derive(Clone)]
#[repr(transparent)]
pub struct Io(Arc<dyn for<'a> Fn(IoReq<'a>) -> IoResult + Send + Sync>);

impl Io {
    /// Returns an I/O callback for `f`.
    #[inline(always)]
    pub fn new(f: impl Fn(IoReq) -> IoResult + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Returns an I/O callback for a method of `T`.
    #[inline(always)]
    pub fn with<T: Send + Sync + 'static>(
        this: &Arc<T>,
        f: impl Fn(&T, IoReq) -> IoResult + Send + Sync + 'static,
    ) -> Self {
        let this = Arc::clone(this);
        Self(Arc::new(move |req: IoReq| f(&this, req)))
    }

    /// Invokes the callback.
    #[inline(always)]
    pub(crate) fn call(&self, req: IoReq) -> IoResult {
        (self.0)(req)
    }
}

impl Debug for Io {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        (f.debug_tuple(name_of!(Io)).field(&Arc::as_ptr(&self.0))).finish()
    }
}

impl<T: Fn(IoReq) -> IoResult + Send + Sync + 'static> From<T> for Io {
    #[inline(always)]
    fn from(f: T) -> Self {
        Self(Arc::new(f))
    }
}

/// Characteristic I/O request.
#[derive(Debug)]
pub enum IoReq<'a> {
    Read(ReadReq<'a>),
    Write(WriteReq<'a>),
    Notify(NotifyReq<'a>),
}

impl<'a> IoReq<'a> {
    /// Returns the characteristic context shared by all request types.
    #[inline]
    #[must_use]
    pub fn attr(&self) -> &Attr<'a> {
        match self {
            IoReq::Read(r) => &r.0,
            IoReq::Write(w) => &w.attr,
            IoReq::Notify(n) => &n.0,
        }
    }
}

/// Characteristic context passed to every callback: the owning service, the
/// characteristic handles, the connection, and access to the stack.
pub struct Attr<'a> {
    svc: Handle,
    hdls: CharHandles,
    cn: Option<ConnHandle>,
    stack: &'a mut dyn Stack,
    sent: Option<&'a mut Val>,
}

impl<'a> Attr<'a> {
    #[inline]
    pub(crate) fn new(
        svc: Handle,
        hdls: CharHandles,
        cn: Option<ConnHandle>,
        stack: &'a mut dyn Stack,
    ) -> Self {
        Self {
            svc,
            hdls,
            cn,
            stack,
            sent: None,
        }
    }

    /// Records every value passed to [`Self::update`] in `sent`.
    #[inline]
    pub(crate) fn recording(mut self, sent: &'a mut Val) -> Self {
        self.sent = Some(sent);
        self
    }

    /// Returns the owning service handle.
    #[inline(always)]
    #[must_use]
    pub const fn service_handle(&self) -> Handle {
        self.svc
    }

    /// Returns the characteristic handles.
    #[inline(always)]
    #[must_use]
    pub const fn handles(&self) -> CharHandles {
        self.hdls
    }

    /// Returns whether a central is connected.
    #[inline(always)]
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.cn.is_some()
    }

    /// Returns the active connection handle.
    #[inline(always)]
    #[must_use]
    pub const fn conn_handle(&self) -> Option<ConnHandle> {
        self.cn
    }

    /// Pushes a new characteristic value to the stack.
    pub fn update(&mut self, v: impl AsRef<[u8]>) -> IoResult {
        let v = v.as_ref();
        if let Some(sent) = self.sent.as_deref_mut() {
            sent.clear();
            sent.extend_from_slice(v);
        }
        (self.stack).update_characteristic_value(self.svc, self.hdls.value_handle(), 0, v)
    }

    /// Calls `f` to encode a value of at most `lim` bytes and pushes it to the
    /// stack.
    pub fn update_with(&mut self, lim: usize, f: impl FnOnce(&mut Packer)) -> IoResult {
        let mut buf = StructBuf::new(lim);
        f(&mut buf.append());
        self.update(buf.as_ref())
    }
}

impl Debug for Attr<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        (f.debug_struct("Attr"))
            .field("svc", &self.svc)
            .field("hdls", &self.hdls)
            .field("cn", &self.cn)
            .finish_non_exhaustive()
    }
}

/// Read request. The callback provides the current value with
/// [`Attr::update`] before the stack releases the read.
#[derive(Debug)]
#[repr(transparent)]
pub struct ReadReq<'a>(pub(crate) Attr<'a>);

/// Write request carrying the unvalidated value written by the client.
#[derive(Debug)]
pub struct WriteReq<'a> {
    pub(crate) attr: Attr<'a>,
    pub(crate) val: &'a [u8],
}

impl<'a> WriteReq<'a> {
    /// Returns the written value, which may be empty.
    #[inline(always)]
    #[must_use]
    pub const fn value(&self) -> &'a [u8] {
        self.val
    }

    /// Returns the written value length.
    #[inline(always)]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.val.len()
    }

    /// Returns whether the written value is empty.
    #[inline(always)]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.val.is_empty()
    }
}

/// Notification request issued by the scheduler for a pending value.
#[derive(Debug)]
#[repr(transparent)]
pub struct NotifyReq<'a>(pub(crate) Attr<'a>);

macro_rules! deref_attr {
    ($($t:ident.$f:tt)*) => {$(
        impl<'a> Deref for $t<'a> {
            type Target = Attr<'a>;

            #[inline(always)]
            fn deref(&self) -> &Self::Target {
                &self.$f
            }
        }

        impl<'a> DerefMut for $t<'a> {
            #[inline(always)]
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.$f
            }
        }
    )*};
}
deref_attr! { ReadReq.0 WriteReq.attr NotifyReq.0 }

#[cfg(test)]
mod tests {
    use crate::stack::mock::{Call, MockStack};

    use super::*;

    fn attr(stack: &mut MockStack) -> Attr<'_> {
        let h = Handle::new(0x10).unwrap();
        let cn = ConnHandle::new(1);
        Attr::new(Handle::MIN, CharHandles::new(h).unwrap(), cn, stack)
    }

    #[test]
    fn update() {
        let mut s = MockStack::new();
        let mut a = attr(&mut s);
        assert!(a.is_connected());
        a.update([1, 2]).unwrap();
        a.update_with(4, |p| {
            p.u32(0x0403_0201_u32);
        })
        .unwrap();
        assert_eq!(
            s.calls(),
            &[
                Call::Update {
                    svc: Handle::MIN,
                    chr: Handle::new(0x10).unwrap(),
                    val: vec![1, 2],
                },
                Call::Update {
                    svc: Handle::MIN,
                    chr: Handle::new(0x10).unwrap(),
                    val: vec![1, 2, 3, 4],
                },
            ]
        );
    }

    #[test]
    fn debug() {
        let mut s = MockStack::new();
        let a = format!("{:?}", attr(&mut s));
        assert!(a.starts_with("Attr { svc: Handle(0x0001), hdls: CharHandles {"));
        assert!(a.ends_with("cn: Some(ConnHandle(0x001)), .. }"));
    }

    #[test]
    fn recording() {
        let mut s = MockStack::new();
        s.fail_updates(1, Status::Busy);
        let mut sent = Val::new();
        let mut n = NotifyReq(attr(&mut s).recording(&mut sent));
        assert_eq!(n.update([7, 8, 9]), Err(Status::Busy));
        drop(n);
        assert_eq!(sent.as_slice(), &[7, 8, 9]);
    }

    #[test]
    fn callback() {
        let io = Io::new(|req| match req {
            IoReq::Write(w) if w.is_empty() => Err(Status::InvalidParameters),
            IoReq::Write(mut w) => {
                let v = w.value();
                w.update(v)
            }
            _ => Ok(()),
        });
        let mut s = MockStack::new();
        let w = WriteReq {
            attr: attr(&mut s),
            val: &[],
        };
        assert_eq!(io.call(IoReq::Write(w)), Err(Status::InvalidParameters));
        let w = WriteReq {
            attr: attr(&mut s),
            val: &[5],
        };
        assert_eq!(io.call(IoReq::Write(w)), Ok(()));
        assert_eq!(s.updates(), vec![(Handle::new(0x10).unwrap(), vec![5])]);
    }
}
