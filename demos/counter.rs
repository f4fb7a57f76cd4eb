#![allow(unused_crate_dependencies)]

//! Counter service driven against the recording stack. A simulated central
//! connects, subscribes to both counters, and optionally disconnects while the
//! poll loop publishes new counter values.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info, warn};

use periph::gatt::{CharDef, DescDef, ServiceDef, Value};
use periph::le::ConnHandle;
use periph::stack::mock::MockStack;
use periph::stack::{Prop, Status};
use periph::uuid::Uuid;
use periph::{Config, Peripheral};

const PEER: [u8; 6] = [0x01, 0xEF, 0xCD, 0xAB, 0x89, 0x67];

#[derive(Clone, Debug, clap::Parser)]
struct Args {
    /// Number of poll loop iterations.
    #[arg(short, long, default_value_t = 50)]
    ticks: u32,

    /// Poll interval in milliseconds.
    #[arg(short, long, default_value_t = 10)]
    interval: u64,

    /// Tick at which the central connects.
    #[arg(long, default_value_t = 3)]
    connect_at: u32,

    /// Tick at which the central disconnects.
    #[arg(long)]
    disconnect_at: Option<u32>,

    /// Fail one notification every N ticks.
    #[arg(short, long)]
    fail_every: Option<u32>,

    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Two counters published through notifications and reads.
#[derive(Clone, Debug)]
struct CounterService {
    wide: Value,
    narrow: Value,
}

impl CounterService {
    const SERVICE: [u8; 16] = [
        0x7A, 0xE5, 0x0C, 0x3D, 0xA2, 0x0A, 0xA8, 0x9A, 0x12, 0x41, 0x62, 0x55, 0x01, 0x40, 0x4A,
        0xAD,
    ];
    const COUNTER_1: [u8; 16] = [
        0x7A, 0xE5, 0x0C, 0x3D, 0xA2, 0x0A, 0xA8, 0x9A, 0x12, 0x41, 0x62, 0x55, 0x41, 0x40, 0x4A,
        0xAD,
    ];
    const COUNTER_2: [u8; 16] = [
        0x25, 0x33, 0x10, 0x72, 0xA1, 0x43, 0x11, 0xEB, 0xBC, 0xBC, 0x02, 0x42, 0xAC, 0x13, 0x00,
        0x02,
    ];
    const WIDE_LEN: usize = 20;

    fn new() -> Self {
        Self {
            wide: Value::with_initial(Self::WIDE_LEN, [0; Self::WIDE_LEN]),
            narrow: Value::with_initial(4, [0; 4]),
        }
    }

    fn define(&self) -> Result<ServiceDef> {
        let uuid = |b| Uuid::from_le_bytes(b).context("zero UUID");
        let props = Prop::READ | Prop::NOTIFY;
        Ok(ServiceDef::primary(uuid(Self::SERVICE)?)
            .with_char(
                CharDef::new(uuid(Self::COUNTER_1)?, 20, props)
                    .fixed_len()
                    .with_value(&self.wide),
            )
            .with_char(
                CharDef::new(uuid(Self::COUNTER_2)?, 4, props)
                    .fixed_len()
                    .with_value(&self.narrow)
                    .with_desc(DescDef::user_description("Counter 2")),
            ))
    }

    fn set_counter_1(&self, v: u32) {
        let mut b = [0; Self::WIDE_LEN];
        b[..4].copy_from_slice(&v.to_le_bytes());
        self.wide.set(b);
    }

    fn set_counter_2(&self, v: u32) {
        self.narrow.set(v.to_le_bytes());
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let cfg = match args.config {
        Some(ref path) => Config::load(path)?,
        None => Config::default(),
    };
    let svc = CounterService::new();
    let mut p = Peripheral::new(MockStack::new(), cfg)?;
    p.register(svc.define()?)?;
    p.registry().dump();

    let cn = ConnHandle::new(0x0001).context("invalid connection handle")?;
    let cccds: Vec<u16> = (p.registry().chars())
        .map(|(_, c)| u16::from(c.handles().cccd_handle()))
        .collect();
    let mut sent = 0;
    let mut tick = tokio::time::interval(Duration::from_millis(args.interval));
    for n in 0..args.ticks {
        tokio::select! {
            _ = tick.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }
        if n == args.connect_at {
            p.on_connected(PEER, cn);
            for &h in &cccds {
                p.on_attribute_modified(h, &[0x01]);
            }
        }
        if args.disconnect_at == Some(n) {
            p.on_disconnected();
        }
        if args.fail_every.map_or(false, |k| k > 0 && n % k == 0) {
            p.stack_mut().fail_updates(1, Status::InsufficientResources);
        }
        svc.set_counter_1(n);
        svc.set_counter_2(n / 2);
        match p.poll_tick() {
            Ok(k) => {
                debug!("Tick {n}: {k} notification(s)");
                sent += k;
            }
            Err(e) if e.is_fatal() => {
                error!("Tick {n}: {e}");
                return Err(e.into());
            }
            Err(e) => warn!("Tick {n}: {e}"),
        }
    }
    let log = p.scheduler().log();
    info!("Sent {sent} notification(s), {} failure(s)", log.total());
    for f in log.iter() {
        info!("#{} {} {} {:02X?}", f.seq, f.hdl, f.status, f.val.as_slice());
    }
    Ok(())
}
