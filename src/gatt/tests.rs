use std::sync::Arc;
use std::thread;

use matches::assert_matches;
use parking_lot::Mutex;

use crate::att::Handle;
use crate::le::{ConnHandle, RawAddr};
use crate::stack::mock::{Call, MockStack};
use crate::stack::{Prop, Status};
use crate::uuid::Uuid;
use crate::{Config, Error, Peripheral};

use super::*;

const PEER: [u8; 6] = [0x55, 0x44, 0x33, 0x22, 0x11, 0x00];

fn uuid(v: u16) -> Uuid {
    Uuid::new16(v).unwrap()
}

fn hdl(v: u16) -> Handle {
    Handle::new(v).unwrap()
}

fn cn() -> ConnHandle {
    ConnHandle::new(0x40).unwrap()
}

/// Records notify callback invocations and the values sent.
#[derive(Debug, Default)]
struct Sink(Mutex<Vec<(u16, Vec<u8>)>>);

impl Sink {
    fn io(self: &Arc<Self>, v: &Value) -> Io {
        let v = v.clone();
        Io::with(self, move |this, req| match req {
            IoReq::Notify(mut n) => {
                let val = v.get();
                let h = u16::from(n.handles().value_handle());
                this.0.lock().push((h, val.to_vec()));
                if n.is_connected() {
                    n.update(val)
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        })
    }

    fn take(&self) -> Vec<(u16, Vec<u8>)> {
        std::mem::take(&mut *self.0.lock())
    }
}

/// One service with two notifiable characteristics registered at handles 10
/// and 20.
fn two_chars(stack: MockStack) -> (Peripheral<MockStack>, [Value; 2], Arc<Sink>) {
    let sink = Arc::new(Sink::default());
    let vals = [Value::new(20), Value::new(4)];
    let def = ServiceDef::primary(uuid(0x180F)).with_max_attrs(16);
    let def = (vals.iter().zip([0x2A19, 0x2A1A])).fold(def, |def, (v, u)| {
        def.with_char(
            CharDef::new(uuid(u), 20, Prop::READ | Prop::NOTIFY)
                .with_value(v)
                .on_notify(sink.io(v)),
        )
    });
    let mut p = Peripheral::new(stack.with_char_handles([10, 20]), Config::default()).unwrap();
    p.register(def).unwrap();
    p.stack_mut().take_calls();
    (p, vals, sink)
}

fn enabled(p: &Peripheral<MockStack>) -> Vec<bool> {
    (p.registry().chars()).map(|(_, c)| c.notification_enabled()).collect()
}

#[test]
fn unique_value_handles() {
    let (p, ..) = two_chars(MockStack::new());
    let mut hdls: Vec<_> = p.registry().chars().map(|(_, c)| c.value_handle()).collect();
    assert_eq!(hdls, [hdl(10), hdl(20)]);
    hdls.dedup();
    assert_eq!(hdls.len(), 2);
    assert_eq!(p.stack().duplicate_assignments(), 0);
}

#[test]
fn dispatch_determinism() {
    let reads = Arc::new(Mutex::new(Vec::new()));
    let io = |tag: char| {
        let reads = Arc::clone(&reads);
        Io::new(move |_| {
            reads.lock().push(tag);
            Ok(())
        })
    };
    let def = (ServiceDef::primary(uuid(0x180F)).with_max_attrs(16))
        .with_char(CharDef::new(uuid(0x2A19), 1, Prop::READ | Prop::NOTIFY).on_read(io('a')))
        .with_char(CharDef::new(uuid(0x2A1A), 1, Prop::READ | Prop::NOTIFY).on_read(io('b')));
    let stack = MockStack::new().with_char_handles([10, 20]);
    let mut p = Peripheral::new(stack, Config::default()).unwrap();
    p.register(def).unwrap();

    assert_eq!(p.on_read_request(21), Dispatch::Read((0, 1)));
    assert_eq!(*reads.lock(), ['b']);
    assert_eq!(p.on_read_request(11), Dispatch::Read((0, 0)));
    assert_eq!(*reads.lock(), ['b', 'a']);

    assert_eq!(
        p.on_attribute_modified(22, &[0x01]),
        Dispatch::Subscribe {
            idx: (0, 1),
            enabled: true
        }
    );
    assert_eq!(enabled(&p), [false, true]);
}

#[test]
fn notify_scenario() {
    let (mut p, [v, _], sink) = two_chars(MockStack::new());
    p.on_connected(PEER, cn());
    p.on_attribute_modified(12, &[0x01]);
    assert_eq!(enabled(&p), [true, false]);

    assert!(v.set([1, 2, 3, 4]));
    assert!(v.pending().is_set());
    assert_eq!(p.poll_tick().unwrap(), 1);
    assert_eq!(sink.take(), [(10, vec![1, 2, 3, 4])]);
    assert!(!v.pending().is_set());
    assert_eq!(p.stack().updates(), [(hdl(10), vec![1, 2, 3, 4])]);

    // Nothing changed
    assert_eq!(p.poll_tick().unwrap(), 0);
    assert!(sink.take().is_empty());
}

#[test]
fn idempotent_mark() {
    let (mut p, [v, _], sink) = two_chars(MockStack::new());
    p.on_connected(PEER, cn());
    p.on_attribute_modified(12, &[0x01]);
    assert!(v.set([7]));
    assert!(!v.set([7]));
    assert!(p.mark_pending(hdl(10)));
    assert!(!p.mark_pending(hdl(11)));
    assert_eq!(p.poll_tick().unwrap(), 1);
    assert_eq!(p.poll_tick().unwrap(), 0);
    assert_eq!(sink.take().len(), 1);
}

#[test]
fn disabled_suppression() {
    let (mut p, [a, b], sink) = two_chars(MockStack::new());
    p.on_connected(PEER, cn());
    p.on_attribute_modified(22, &[0x01]);
    a.set([1]);
    b.set([2]);
    assert_eq!(p.poll_tick().unwrap(), 1);
    assert_eq!(sink.take(), [(20, vec![2])]);
    assert!(a.pending().is_set());

    p.on_attribute_modified(22, &[0x00]);
    b.set([3]);
    assert_eq!(p.poll_tick().unwrap(), 0);
    assert!(sink.take().is_empty());
}

#[test]
fn disconnect_resets_subscriptions() {
    let (mut p, [a, _], sink) = two_chars(MockStack::new());
    p.on_connected(PEER, cn());
    assert!(p.is_connected());
    assert_eq!(p.link().peer(), Some(RawAddr::from(PEER)));
    p.on_attribute_modified(12, &[0x01]);
    p.on_attribute_modified(22, &[0x01]);
    assert_eq!(enabled(&p), [true, true]);

    p.on_disconnected();
    assert!(!p.is_connected());
    assert_eq!(enabled(&p), [false, false]);

    // The value stays pending across the reconnect until the client
    // subscribes again.
    a.set([5]);
    p.on_connected(PEER, cn());
    assert_eq!(p.poll_tick().unwrap(), 0);
    p.on_attribute_modified(12, &[0x01]);
    assert_eq!(p.poll_tick().unwrap(), 1);
    assert_eq!(sink.take(), [(10, vec![5])]);
}

#[test]
fn read_release() {
    let (mut p, [a, _], _) = two_chars(MockStack::new());
    a.set([9, 9]);
    // Disconnected: the value callback stays silent and nothing is released
    assert_eq!(p.on_read_request(11), Dispatch::Read((0, 0)));
    assert!(p.stack().calls().is_empty());

    p.on_connected(PEER, cn());
    assert_eq!(p.on_read_request(11), Dispatch::Read((0, 0)));
    assert_eq!(p.on_read_request(0x0003), Dispatch::Miss);
    assert_eq!(
        p.stack_mut().take_calls(),
        [
            Call::Update {
                svc: hdl(1),
                chr: hdl(10),
                val: vec![9, 9],
            },
            Call::AllowRead(cn()),
            Call::AllowRead(cn()),
        ]
    );
}

#[test]
fn advertising() {
    let (mut p, ..) = two_chars(MockStack::new());
    assert!(p.link().is_connectable());
    assert_eq!(p.poll_tick().unwrap(), 0);
    p.stack_mut().fail_discoverable(Status::CommandDisallowed);
    assert_eq!(p.poll_tick().unwrap(), 0);
    p.stack_mut().fail_discoverable(Status::Timeout);
    assert_matches!(p.poll_tick(), Err(Error::Advertise(Status::Timeout)));
    assert_eq!(p.stack().calls(), vec![Call::SetDiscoverable; 3]);

    p.stack_mut().take_calls();
    p.on_connected(PEER, cn());
    assert_eq!(p.poll_tick().unwrap(), 0);
    assert!(p.stack().calls().is_empty());

    p.on_disconnected();
    assert_eq!(p.poll_tick().unwrap(), 0);
    assert_eq!(p.stack().calls(), [Call::SetDiscoverable]);
}

#[test]
fn advertise_failure_skips_flush() {
    let (mut p, [a, _], sink) = two_chars(MockStack::new());
    p.on_attribute_modified(12, &[0x01]);
    a.set([1]);
    p.stack_mut().fail_discoverable(Status::StackError);
    assert_matches!(p.poll_tick(), Err(Error::Advertise(Status::StackError)));
    assert!(a.pending().is_set());
    assert!(sink.take().is_empty());
    // Notifications wait for a central
    assert_eq!(p.poll_tick().unwrap(), 0);
    assert!(a.pending().is_set());
    assert!(sink.take().is_empty());
    assert!(p.stack().updates().is_empty());

    p.on_connected(PEER, cn());
    assert_eq!(p.poll_tick().unwrap(), 1);
    assert!(!a.pending().is_set());
    assert_eq!(sink.take(), [(10, vec![1])]);
    assert_eq!(p.stack().updates(), [(hdl(10), vec![1])]);
}

#[test]
fn link_exhausted() {
    let mut stack = MockStack::new();
    stack.fail_updates(100, Status::InsufficientResources);
    let (mut p, [a, b], _) = two_chars(stack);
    p.on_connected(PEER, cn());
    p.on_attribute_modified(12, &[0x01]);
    p.on_attribute_modified(22, &[0x01]);
    for i in 0..99_u8 {
        a.set([i, 1]);
        assert_eq!(p.poll_tick().unwrap(), 0, "tick {i}");
    }
    assert_eq!(p.scheduler().log().total(), 99);
    assert!(!p.scheduler().is_exhausted());

    a.set([0xFF]);
    b.set([0xFF]);
    let e = p.poll_tick().unwrap_err();
    assert_matches!(e, Error::LinkExhausted { failures: 100 });
    assert!(e.is_fatal());
    // Second characteristic was never notified
    assert!(b.pending().is_set());
    assert_eq!(p.stack().updates().len(), 100);
    assert_eq!(p.scheduler().log().len(), 100);
    let last = p.scheduler().log().last().unwrap();
    assert_eq!((last.seq, last.hdl, last.val.as_slice()), (99, hdl(10), &[0xFF][..]));

    // Sticky
    for _ in 0..3 {
        assert_matches!(p.poll_tick(), Err(Error::LinkExhausted { failures: 100 }));
    }
    assert_eq!(p.stack().updates().len(), 100);
}

#[test]
fn failures_are_cumulative() {
    let cfg = Config::default().with_tx_failure_limit(3).with_tx_log_capacity(2);
    let stack = MockStack::new().with_char_handles([10]);
    let v = Value::new(4);
    let def = ServiceDef::primary(uuid(0x180F))
        .with_char(CharDef::new(uuid(0x2A19), 4, Prop::NOTIFY).with_value(&v));
    let mut p = Peripheral::new(stack, cfg).unwrap();
    p.register(def).unwrap();
    p.on_connected(PEER, cn());
    p.on_attribute_modified(12, &[0x01]);

    // Successful notifications in between do not reset the count
    for i in 0..2_u8 {
        p.stack_mut().fail_updates(1, Status::Busy);
        v.set([i]);
        assert_eq!(p.poll_tick().unwrap(), 0);
        v.set([i, i]);
        assert_eq!(p.poll_tick().unwrap(), 1);
    }
    assert_eq!(p.scheduler().log().total(), 2);
    p.stack_mut().fail_updates(1, Status::Busy);
    v.set([0xAA]);
    assert_matches!(p.poll_tick(), Err(Error::LinkExhausted { failures: 3 }));
    let seqs: Vec<_> = p.scheduler().log().iter().map(|f| f.seq).collect();
    assert_eq!(seqs, [1, 2]);
}

#[test]
fn registration_failure() {
    let stack = MockStack::new().fail_registration(2, Status::OutOfMemory);
    let (v, w) = (Value::new(1), Value::new(1));
    let def = ServiceDef::primary(uuid(0x180F))
        .with_char(CharDef::new(uuid(0x2A19), 1, Prop::NOTIFY).with_value(&v))
        .with_char(CharDef::new(uuid(0x2A1A), 1, Prop::NOTIFY).with_value(&w));
    let mut p = Peripheral::new(stack, Config::default()).unwrap();
    assert_matches!(
        p.register(def),
        Err(Error::Registration {
            status: Status::OutOfMemory,
            ..
        })
    );
    assert!(p.registry().is_empty());
}

#[test]
fn invalid_config() {
    let cfg = Config::default().with_max_services(0);
    assert_matches!(Peripheral::new(MockStack::new(), cfg), Err(Error::Config(_)));
}

#[test]
fn shared() {
    let (p, [a, _], sink) = two_chars(MockStack::new());
    let p = p.into_shared();
    let events = p.clone();
    thread::spawn(move || {
        events.on_connected(PEER, cn());
        events.on_attribute_modified(12, &[0x01]);
    })
    .join()
    .unwrap();
    a.set([3, 2, 1]);
    assert_eq!(p.poll_tick().unwrap(), 1);
    assert_eq!(sink.take(), [(10, vec![3, 2, 1])]);
    p.on_disconnected();
    assert!(!p.lock().is_connected());
    assert_eq!(p.on_read_request(0x0003), Dispatch::Miss);
}
