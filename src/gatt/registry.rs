use smallvec::SmallVec;
use tracing::{debug, info};

use crate::att::{CharHandles, Handle};
use crate::stack::{CharDecl, DescDecl, EvtMask, Perm, Prop, ServiceType, Stack};
use crate::uuid::Uuid;
use crate::{Error, Result};

use super::{Io, Pending, Value};

/// Maximum number of characteristics in one service.
pub const MAX_CHARS: usize = 6;

/// Maximum number of description handles of one characteristic.
pub const MAX_DESCS: usize = 6;

/// Characteristic location in the registry: service index and characteristic
/// index within that service.
pub type CharIdx = (usize, usize);

/// Service definition used to populate the registry.
#[derive(Clone, Debug)]
#[must_use]
pub struct ServiceDef {
    uuid: Uuid,
    typ: ServiceType,
    max_attrs: Option<u8>,
    chars: Vec<CharDef>,
}

impl ServiceDef {
    /// Creates a primary service definition.
    #[inline]
    pub const fn primary(uuid: Uuid) -> Self {
        Self::new(uuid, ServiceType::Primary)
    }

    /// Creates a secondary service definition.
    #[inline]
    pub const fn secondary(uuid: Uuid) -> Self {
        Self::new(uuid, ServiceType::Secondary)
    }

    #[inline]
    const fn new(uuid: Uuid, typ: ServiceType) -> Self {
        Self {
            uuid,
            typ,
            max_attrs: None,
            chars: Vec::new(),
        }
    }

    /// Overrides the number of attribute records reserved in the stack. By
    /// default, the number is derived from the characteristic definitions.
    #[inline]
    pub const fn with_max_attrs(mut self, n: u8) -> Self {
        self.max_attrs = Some(n);
        self
    }

    /// Appends a characteristic definition.
    #[inline]
    pub fn with_char(mut self, c: CharDef) -> Self {
        self.chars.push(c);
        self
    }

    /// Returns the service UUID.
    #[inline(always)]
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Returns the number of attribute records the service occupies.
    #[must_use]
    pub fn max_attrs(&self) -> u8 {
        self.max_attrs.unwrap_or_else(|| {
            let n = 1 + self.chars.iter().map(CharDef::attrs).sum::<usize>();
            u8::try_from(n).unwrap_or(u8::MAX)
        })
    }
}

/// Characteristic definition.
#[derive(Clone, Debug)]
#[must_use]
pub struct CharDef {
    decl: CharDecl,
    descs: Vec<DescDef>,
    read: Option<Io>,
    write: Option<Io>,
    notify: Option<Io>,
    pending: Option<Pending>,
}

impl CharDef {
    /// Creates a characteristic definition with a value of at most `max_len`
    /// bytes.
    #[inline]
    pub const fn new(uuid: Uuid, max_len: u16, props: Prop) -> Self {
        Self {
            decl: CharDecl::new(uuid, max_len, props),
            descs: Vec::new(),
            read: None,
            write: None,
            notify: None,
            pending: None,
        }
    }

    /// Sets the security permissions.
    #[inline]
    pub const fn with_perms(mut self, p: Perm) -> Self {
        self.decl.perms = p;
        self
    }

    /// Sets the events reported by the stack. Read requests are held for the
    /// application whenever a read callback is bound.
    #[inline]
    pub const fn with_events(mut self, e: EvtMask) -> Self {
        self.decl.evt = e;
        self
    }

    /// Declares the value as fixed-length.
    #[inline]
    pub const fn fixed_len(mut self) -> Self {
        self.decl.var_len = false;
        self
    }

    /// Appends a descriptor definition.
    #[inline]
    pub fn with_desc(mut self, d: DescDef) -> Self {
        self.descs.push(d);
        self
    }

    /// Binds a read callback.
    #[inline]
    pub fn on_read(mut self, io: impl Into<Io>) -> Self {
        self.read = Some(io.into());
        self
    }

    /// Binds a write callback.
    #[inline]
    pub fn on_write(mut self, io: impl Into<Io>) -> Self {
        self.write = Some(io.into());
        self
    }

    /// Binds a notify callback.
    #[inline]
    pub fn on_notify(mut self, io: impl Into<Io>) -> Self {
        self.notify = Some(io.into());
        self
    }

    /// Binds the producer-owned change flag.
    #[inline]
    pub fn with_pending(mut self, p: &Pending) -> Self {
        self.pending = Some(p.clone());
        self
    }

    /// Binds a shared value, serving reads and notifications from it as the
    /// characteristic properties permit.
    pub fn with_value(mut self, v: &Value) -> Self {
        let io = v.io();
        if self.decl.props.contains(Prop::READ) {
            self.read = Some(io.clone());
        }
        if self.decl.has_cccd() {
            self.notify = Some(io);
        }
        self.with_pending(v.pending())
    }

    /// Returns the stack declaration parameters.
    #[inline(always)]
    pub const fn decl(&self) -> &CharDecl {
        &self.decl
    }

    /// Returns the number of attribute records the characteristic occupies.
    #[inline]
    fn attrs(&self) -> usize {
        2 + usize::from(self.decl.has_cccd()) + self.descs.len()
    }

    /// Returns the declaration with the event mask implied by the bound
    /// callbacks.
    fn stack_decl(&self) -> CharDecl {
        let mut d = self.decl.clone();
        if self.read.is_some() {
            d.evt |= EvtMask::READ_REQ_WAIT;
        }
        if self.write.is_some() || d.has_cccd() {
            d.evt |= EvtMask::ATTRIBUTE_WRITE;
        }
        d
    }
}

/// Descriptor definition.
#[derive(Clone, Debug)]
#[must_use]
#[repr(transparent)]
pub struct DescDef(DescDecl);

impl DescDef {
    /// Characteristic User Description descriptor type.
    pub const USER_DESCRIPTION: Uuid = crate::uuid::sig(0x2901);
    /// Characteristic Presentation Format descriptor type.
    pub const PRESENTATION_FORMAT: Uuid = crate::uuid::sig(0x2904);

    /// Creates a read-only descriptor with a fixed value.
    #[inline]
    pub fn new(uuid: Uuid, val: impl AsRef<[u8]>) -> Self {
        Self(DescDecl::new(uuid, val))
    }

    /// Creates a user description descriptor.
    #[inline]
    pub fn user_description(s: &str) -> Self {
        Self::new(Self::USER_DESCRIPTION, s)
    }

    /// Creates a presentation format descriptor ([Vol 3] Part G, Section
    /// 3.3.3.5) with the Bluetooth SIG namespace and an unknown description.
    pub fn presentation_format(fmt: u8, exp: i8, unit: u16) -> Self {
        let [u0, u1] = unit.to_le_bytes();
        let [e] = exp.to_le_bytes();
        Self::new(Self::PRESENTATION_FORMAT, [fmt, e, u0, u1, 0x01, 0x00, 0x00])
    }

    /// Sets the security permissions.
    #[inline]
    pub fn with_perms(mut self, p: Perm) -> Self {
        self.0.perms = p;
        self
    }
}

/// Registered characteristic.
#[derive(Clone, Debug)]
pub struct CharBinding {
    uuid: Uuid,
    props: Prop,
    hdls: CharHandles,
    descs: SmallVec<[Handle; MAX_DESCS]>,
    pub(super) read: Option<Io>,
    pub(super) write: Option<Io>,
    pub(super) notify: Option<Io>,
    pending: Option<Pending>,
    enabled: bool,
}

impl CharBinding {
    /// Returns the characteristic UUID.
    #[inline(always)]
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Returns the characteristic properties.
    #[inline(always)]
    #[must_use]
    pub const fn props(&self) -> Prop {
        self.props
    }

    /// Returns the characteristic handles.
    #[inline(always)]
    #[must_use]
    pub const fn handles(&self) -> CharHandles {
        self.hdls
    }

    /// Returns the handle assigned by the stack at registration.
    #[inline(always)]
    #[must_use]
    pub const fn value_handle(&self) -> Handle {
        self.hdls.value_handle()
    }

    /// Returns the descriptor handles in definition order.
    #[inline(always)]
    #[must_use]
    pub fn description_handles(&self) -> &[Handle] {
        &self.descs
    }

    /// Returns whether the client enabled notifications.
    #[inline(always)]
    #[must_use]
    pub const fn notification_enabled(&self) -> bool {
        self.enabled
    }

    #[inline(always)]
    pub(crate) fn set_notification_enabled(&mut self, v: bool) {
        self.enabled = v;
    }

    /// Returns the producer-owned change flag, if bound.
    #[inline(always)]
    #[must_use]
    pub const fn pending(&self) -> Option<&Pending> {
        self.pending.as_ref()
    }

    /// Returns whether the producer marked the value as changed.
    #[inline]
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().map_or(false, Pending::is_set)
    }

    /// Returns whether read, write, and notify callbacks are bound.
    #[inline]
    #[must_use]
    pub const fn callbacks(&self) -> [bool; 3] {
        [
            self.read.is_some(),
            self.write.is_some(),
            self.notify.is_some(),
        ]
    }
}

/// Registered service.
#[derive(Clone, Debug)]
pub struct ServiceBinding {
    uuid: Uuid,
    hdl: Handle,
    chars: SmallVec<[CharBinding; MAX_CHARS]>,
}

impl ServiceBinding {
    /// Returns the service UUID.
    #[inline(always)]
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Returns the handle assigned by the stack at registration.
    #[inline(always)]
    #[must_use]
    pub const fn service_handle(&self) -> Handle {
        self.hdl
    }

    /// Returns the characteristics in registration order.
    #[inline(always)]
    #[must_use]
    pub fn characteristics(&self) -> &[CharBinding] {
        &self.chars
    }
}

/// Attribute registry mapping service and characteristic definitions to
/// stack-assigned handles. Structure is append-only; only the notification
/// enabled flags change after initialization.
#[derive(Clone, Debug)]
pub struct Registry {
    svcs: Vec<ServiceBinding>,
    max_svcs: usize,
}

impl Registry {
    /// Creates an empty registry with room for `max_svcs` services.
    #[inline]
    #[must_use]
    pub fn new(max_svcs: usize) -> Self {
        Self {
            svcs: Vec::with_capacity(max_svcs),
            max_svcs,
        }
    }

    /// Registers a service and its characteristics with the stack and returns
    /// the service handle. Registration stops at the first failure. Anything
    /// the stack already accepted is not rolled back and the registry is left
    /// unchanged.
    pub fn register<S: Stack + ?Sized>(&mut self, stack: &mut S, def: ServiceDef) -> Result<Handle> {
        if self.svcs.len() >= self.max_svcs {
            return Err(Error::ServicesFull(self.max_svcs));
        }
        if def.chars.len() > MAX_CHARS {
            return Err(Error::CharacteristicsFull(MAX_CHARS));
        }
        if def.chars.iter().any(|c| c.descs.len() > MAX_DESCS) {
            return Err(Error::DescriptorsFull(MAX_DESCS));
        }
        let reject = |uuid| move |status| Error::Registration { uuid, status };
        let hdl = (stack.register_service(def.uuid, def.typ, def.max_attrs()))
            .map_err(reject(def.uuid))?;
        let mut svc = ServiceBinding {
            uuid: def.uuid,
            hdl,
            chars: SmallVec::new(),
        };
        for c in def.chars {
            let decl = c.stack_decl();
            let h = (stack.register_characteristic(hdl, &decl)).map_err(reject(decl.uuid))?;
            let hdls = CharHandles::new(h).ok_or(Error::HandleOverflow(h))?;
            if self.contains(h) || svc.chars.iter().any(|c| c.value_handle() == h) {
                return Err(Error::DuplicateHandle(h));
            }
            let mut descs = SmallVec::new();
            for d in &c.descs {
                descs.push(stack.register_descriptor(hdl, h, &d.0).map_err(reject(d.0.uuid))?);
            }
            debug!("Characteristic {} at {h}", decl.uuid);
            svc.chars.push(CharBinding {
                uuid: decl.uuid,
                props: decl.props,
                hdls,
                descs,
                read: c.read,
                write: c.write,
                notify: c.notify,
                pending: c.pending,
                enabled: false,
            });
        }
        info!(
            "Registered service {} at {hdl} with {} characteristic(s)",
            svc.uuid,
            svc.chars.len()
        );
        self.svcs.push(svc);
        Ok(hdl)
    }

    /// Returns the registered services.
    #[inline(always)]
    #[must_use]
    pub fn services(&self) -> &[ServiceBinding] {
        &self.svcs
    }

    /// Returns the number of registered services.
    #[inline(always)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.svcs.len()
    }

    /// Returns whether no services are registered.
    #[inline(always)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.svcs.is_empty()
    }

    /// Returns the characteristic at `idx`.
    #[inline]
    #[must_use]
    pub fn get(&self, (s, c): CharIdx) -> Option<(&ServiceBinding, &CharBinding)> {
        let svc = self.svcs.get(s)?;
        Some((svc, svc.chars.get(c)?))
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, (s, c): CharIdx) -> Option<&mut CharBinding> {
        self.svcs.get_mut(s)?.chars.get_mut(c)
    }

    /// Finds the characteristic with value handle `h`.
    #[inline]
    #[must_use]
    pub fn find_by_value_handle(&self, h: Handle) -> Option<CharIdx> {
        self.position(|c| c.hdls.value_handle() == h)
    }

    /// Finds the characteristic whose value access handle is `h`.
    #[inline]
    #[must_use]
    pub fn find_by_access_handle(&self, h: Handle) -> Option<CharIdx> {
        self.position(|c| c.hdls.access_handle() == h)
    }

    /// Finds the characteristic whose CCCD handle is `h`.
    #[inline]
    #[must_use]
    pub fn find_by_cccd_handle(&self, h: Handle) -> Option<CharIdx> {
        self.position(|c| c.hdls.cccd_handle() == h)
    }

    /// Calls `f` for each characteristic in registration order.
    pub fn for_each_characteristic(&self, mut f: impl FnMut(&ServiceBinding, &CharBinding)) {
        for (s, c) in self.chars() {
            f(s, c);
        }
    }

    /// Returns an iterator over all characteristics in registration order.
    pub fn chars(&self) -> impl Iterator<Item = (&ServiceBinding, &CharBinding)> + '_ {
        (self.svcs.iter()).flat_map(|s| s.chars.iter().map(move |c| (s, c)))
    }

    /// Disables notifications for all characteristics.
    pub fn reset_notifications(&mut self) {
        for c in self.svcs.iter_mut().flat_map(|s| s.chars.iter_mut()) {
            c.enabled = false;
        }
    }

    /// Logs registry contents.
    pub fn dump(&self) {
        info!("GATT registry:");
        for s in &self.svcs {
            info!("[{:#06X}] Service <{}>", u16::from(s.hdl), s.uuid);
            for c in &s.chars {
                let [r, w, n] = c.callbacks().map(|b| if b { '+' } else { '-' });
                info!(
                    "[{:#06X}] |__ Characteristic <{}> {:?} [r{r} w{w} n{n}]",
                    u16::from(c.value_handle()),
                    c.uuid,
                    c.props,
                );
                for &d in &c.descs {
                    info!("[{:#06X}]     |__ Descriptor", u16::from(d));
                }
            }
        }
    }

    #[inline]
    fn contains(&self, h: Handle) -> bool {
        self.find_by_value_handle(h).is_some()
    }

    fn position(&self, mut f: impl FnMut(&CharBinding) -> bool) -> Option<CharIdx> {
        (self.svcs.iter().enumerate())
            .find_map(|(i, s)| s.chars.iter().position(&mut f).map(|j| (i, j)))
    }
}

impl Default for Registry {
    #[inline]
    fn default() -> Self {
        Self::new(crate::Config::default().max_services)
    }
}
