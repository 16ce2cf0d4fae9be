//! Per-interface host driver state machine and the device that owns it.
//!
//! User operations run on the caller's task and take the interface's driver
//! lock for the whole dispatch, so their transition is atomic with respect
//! to queued work. Firmware events and timer expiries only ever submit a
//! [`task::Task`]; the device worker runs those one at a time.

mod connect;
mod keys;
mod listen;
mod ops;
mod scan;
mod station;
pub(crate) mod task;

#[cfg(test)]
mod tests;

use crate::config::HifConfig;
use crate::dispatch::Dispatcher;
use crate::events::RcvdNetInfo;
use crate::queue::WorkQueue;
use crate::registry::SnapshotList;
use crate::timer::HifTimer;
use crate::traits::{ExternalAuthRequest, StackNotifier, Transport};
use crate::wid::Wid;
use crate::wid::records::{ETH_ALEN, ZERO_ADDR};
use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, Weak};
use task::{Task, TaskBody, TaskReply};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

pub use connect::ConnectParams;
pub use ops::{CfgParams, OpMode, RfInfo};
pub use scan::{ScanRequest, ScanSource, ScanType};
pub use task::BufferedEap;

/// Host-interface state of one virtual interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HifState {
    Idle = 0,
    Scanning = 1,
    WaitingConnResp = 2,
    ExternalAuth = 3,
    Connected = 4,
    P2pListen = 5,
}

impl HifState {
    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => HifState::Idle,
            1 => HifState::Scanning,
            2 => HifState::WaitingConnResp,
            3 => HifState::ExternalAuth,
            4 => HifState::Connected,
            5 => HifState::P2pListen,
            _ => return None,
        })
    }

    /// Holds the shared radio (scan, join or listen in progress).
    pub fn holds_radio(self) -> bool {
        !matches!(self, HifState::Idle | HifState::Connected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEvent {
    NetworkFound,
    Done,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnEvent {
    ConnResp,
    DisconnNotif,
}

/// MAC status byte carried by general async info frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacStatus {
    Disconnected,
    Connected,
    Other(u8),
}

impl From<u8> for MacStatus {
    fn from(v: u8) -> Self {
        match v {
            0 => MacStatus::Disconnected,
            1 => MacStatus::Connected,
            other => MacStatus::Other(other),
        }
    }
}

/// 802.11 authentication algorithm as the firmware numbers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum AuthType {
    #[default]
    OpenSystem = 1,
    SharedKey = 2,
    Any = 3,
    Ieee8021x = 5,
    Sae = 7,
}

/// What a connect-result callback gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct ConnectResult<'a> {
    pub bssid: [u8; ETH_ALEN],
    pub status: u16,
    pub req_ies: &'a [u8],
    pub resp_ies: &'a [u8],
}

// Callbacks run on the worker or the calling task with the interface's
// driver lock held; they must not call back into the same interface.
pub type ScanResultFn = Box<dyn FnMut(ScanEvent, Option<&RcvdNetInfo>) + Send + Sync>;
pub type ConnResultFn = Box<dyn FnMut(ConnEvent, MacStatus, &ConnectResult<'_>) + Send + Sync>;
pub type RocExpiredFn = Box<dyn FnOnce(u64) + Send + Sync>;

const NO_DRIVER: u8 = u8::MAX;

/// Lock-free view of driver state for cross-interface checks and decoders.
pub(crate) struct StateMirror {
    state: AtomicU8,
    scan_pending: AtomicBool,
    conn_result: AtomicBool,
}

impl StateMirror {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(NO_DRIVER),
            scan_pending: AtomicBool::new(false),
            conn_result: AtomicBool::new(false),
        }
    }

    pub(crate) fn state(&self) -> Option<HifState> {
        HifState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn has_driver(&self) -> bool {
        self.state().is_some()
    }

    pub(crate) fn scan_pending(&self) -> bool {
        self.scan_pending.load(Ordering::Acquire)
    }

    pub(crate) fn has_conn_result(&self) -> bool {
        self.conn_result.load(Ordering::Acquire)
    }

    fn clear(&self) {
        self.state.store(NO_DRIVER, Ordering::Release);
        self.scan_pending.store(false, Ordering::Release);
        self.conn_result.store(false, Ordering::Release);
    }
}

#[derive(Default)]
pub(crate) struct ConnInfo {
    pub(crate) bssid: [u8; ETH_ALEN],
    pub(crate) security: u8,
    pub(crate) auth_type: AuthType,
    pub(crate) mfp_type: u8,
    pub(crate) status: u16,
    pub(crate) req_ies: Option<Vec<u8>>,
    pub(crate) resp_ies: Option<Vec<u8>>,
    pub(crate) external_auth: ExternalAuthRequest,
    conn_result: Option<ConnResultFn>,
}

impl ConnInfo {
    /// Runs the connect-result callback. Returns `false` when none is registered.
    pub(crate) fn notify(&mut self, event: ConnEvent, mac: MacStatus) -> bool {
        let Some(cb) = self.conn_result.as_mut() else {
            return false;
        };
        let result = ConnectResult {
            bssid: self.bssid,
            status: self.status,
            req_ies: self.req_ies.as_deref().unwrap_or_default(),
            resp_ies: self.resp_ies.as_deref().unwrap_or_default(),
        };
        cb(event, mac, &result);
        true
    }
}

#[derive(Default)]
pub(crate) struct RemainOnChannel {
    pub(crate) expired: Option<RocExpiredFn>,
    pub(crate) ch: u8,
    pub(crate) cookie: u64,
}

/// Driver state that exists between `init` and `deinit`.
pub(crate) struct HostIfDrv {
    state: HifState,
    mirror: Arc<StateMirror>,
    pub(crate) assoc_bssid: [u8; ETH_ALEN],
    scan_result: Option<ScanResultFn>,
    /// Networks reported during the current scan.
    pub(crate) scan_found: usize,
    pub(crate) conn: ConnInfo,
    pub(crate) roc: RemainOnChannel,
    pub(crate) scan_timer: HifTimer,
    pub(crate) connect_timer: HifTimer,
    pub(crate) listen_timer: HifTimer,
}

impl HostIfDrv {
    fn new(mirror: Arc<StateMirror>) -> Self {
        let mut drv = Self {
            state: HifState::Idle,
            mirror,
            assoc_bssid: ZERO_ADDR,
            scan_result: None,
            scan_found: 0,
            conn: ConnInfo::default(),
            roc: RemainOnChannel::default(),
            scan_timer: HifTimer::new("scan"),
            connect_timer: HifTimer::new("connect"),
            listen_timer: HifTimer::new("listen"),
        };
        drv.set_state(HifState::Idle);
        drv
    }

    pub(crate) fn state(&self) -> HifState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: HifState) {
        if self.state != state {
            tracing::debug!(from = ?self.state, to = ?state, "hif state change");
        }
        self.state = state;
        self.mirror.state.store(state as u8, Ordering::Release);
    }

    /// Idle or connected, depending on whether a BSS is associated.
    pub(crate) fn restore_state(&mut self) {
        let next = if self.assoc_bssid == ZERO_ADDR {
            HifState::Idle
        } else {
            HifState::Connected
        };
        self.set_state(next);
    }

    pub(crate) fn scan_pending(&self) -> bool {
        self.scan_result.is_some()
    }

    pub(crate) fn set_scan_result(&mut self, cb: Option<ScanResultFn>) {
        self.mirror.scan_pending.store(cb.is_some(), Ordering::Release);
        self.scan_result = cb;
    }

    pub(crate) fn take_scan_result(&mut self) -> Option<ScanResultFn> {
        self.mirror.scan_pending.store(false, Ordering::Release);
        self.scan_result.take()
    }

    pub(crate) fn scan_result_mut(&mut self) -> Option<&mut ScanResultFn> {
        self.scan_result.as_mut()
    }

    pub(crate) fn has_conn_result(&self) -> bool {
        self.conn.conn_result.is_some()
    }

    pub(crate) fn set_conn_result(&mut self, cb: Option<ConnResultFn>) {
        self.mirror.conn_result.store(cb.is_some(), Ordering::Release);
        self.conn.conn_result = cb;
    }

    fn cancel_timers(&self) {
        self.scan_timer.cancel();
        self.connect_timer.cancel();
        self.listen_timer.cancel();
    }
}

/// One virtual network interface (station, AP or P2P role).
pub struct Vif {
    idx: u8,
    name: String,
    me: Weak<Vif>,
    device: Weak<Device>,
    dispatcher: Dispatcher,
    queue: WorkQueue<Task>,
    notifier: Arc<dyn StackNotifier>,
    config: Arc<HifConfig>,
    drv: Mutex<Option<HostIfDrv>>,
    mirror: Arc<StateMirror>,
    connecting: AtomicBool,
    stats_timer: HifTimer,
    periodic_stat: std::sync::Mutex<RfInfo>,
}

impl Vif {
    /// Slot number, 0-based.
    pub fn idx(&self) -> u8 {
        self.idx
    }

    /// Index the firmware uses; slot + 1, 0 is reserved.
    pub fn wire_idx(&self) -> u8 {
        self.idx + 1
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `None` once the driver state has been torn down.
    pub fn state(&self) -> Option<HifState> {
        self.mirror.state()
    }

    pub fn is_connecting(&self) -> bool {
        self.connecting.load(Ordering::Acquire)
    }

    pub async fn assoc_bssid(&self) -> Option<[u8; ETH_ALEN]> {
        let slot = self.drv.lock().await;
        slot.as_ref()
            .map(|d| d.assoc_bssid)
            .filter(|b| *b != ZERO_ADDR)
    }

    /// Last sample taken by the periodic statistics timer.
    pub fn periodic_stats(&self) -> RfInfo {
        *self.periodic_stat.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn mirror(&self) -> &StateMirror {
        &self.mirror
    }

    fn device(&self) -> Result<Arc<Device>> {
        self.device.upgrade().ok_or(Error::NoDevice)
    }

    pub(crate) fn set_connecting(&self, on: bool) {
        self.connecting.store(on, Ordering::Release);
    }

    pub(crate) fn submit(&self, body: TaskBody) -> Result<()> {
        self.queue.submit(Task::new(self.me.clone(), body, None))
    }

    /// Submits and waits until the worker has run the task.
    pub(crate) async fn submit_sync(&self, body: TaskBody) -> Result<TaskReply> {
        let (tx, rx) = oneshot::channel();
        self.queue.submit(Task::new(self.me.clone(), body, Some(tx)))?;
        rx.await.map_err(|_| Error::TaskDropped)?
    }

    /// Closure for a timer that submits `make()` to this interface.
    pub(crate) fn timer_submit(
        &self,
        make: impl FnOnce() -> TaskBody + Send + 'static,
    ) -> impl FnOnce() + Send + 'static {
        let me = self.me.clone();
        move || {
            if let Some(vif) = me.upgrade() {
                if let Err(e) = vif.submit(make()) {
                    tracing::warn!(vif = vif.idx, "timer could not queue its task: {}", e);
                }
            }
        }
    }

    pub(crate) async fn set_wids(&self, wids: &mut [Wid]) -> Result<()> {
        self.dispatcher.set(self.wire_idx(), wids).await
    }

    pub(crate) async fn get_wids(&self, wids: &mut [Wid]) -> Result<()> {
        self.dispatcher.get(self.wire_idx(), wids).await
    }

    /// Creates driver state and starts periodic statistics polling.
    pub async fn init(&self) -> Result<()> {
        let mut slot = self.drv.lock().await;
        if slot.is_some() {
            tracing::debug!(vif = self.idx, "driver already initialised");
            return Ok(());
        }
        *slot = Some(HostIfDrv::new(Arc::clone(&self.mirror)));
        drop(slot);

        let me = self.me.clone();
        self.stats_timer
            .arm_periodic(self.config.stats_period, move || match me.upgrade() {
                Some(vif) => {
                    if vif.state() == Some(HifState::Connected) {
                        if let Err(e) = vif.submit(TaskBody::GetStatistics) {
                            tracing::debug!(vif = vif.idx, "statistics poll not queued: {}", e);
                        }
                    }
                    true
                }
                None => false,
            });
        tracing::info!(vif = self.idx, name = %self.name, "host interface initialised");
        Ok(())
    }

    /// Tears down driver state. Any pending scan is reported as aborted.
    ///
    /// Only the scan callback hears about the teardown. A pending connect
    /// callback and a remain-on-channel `expired` callback are dropped
    /// uncalled, so a listen cookie may never come back.
    pub async fn deinit(&self) -> Result<()> {
        let device = self.device.upgrade();
        let _guard = match &device {
            Some(dev) => Some(dev.deinit_lock.lock().await),
            None => None,
        };

        let mut slot = self.drv.lock().await;
        let Some(mut drv) = slot.take() else {
            tracing::error!(vif = self.idx, "deinit without driver state");
            return Err(Error::NoDriver(self.idx));
        };
        drv.cancel_timers();
        self.stats_timer.cancel();

        if let Some(mut cb) = drv.take_scan_result() {
            cb(ScanEvent::Aborted, None);
        }
        drv.set_state(HifState::Idle);
        drop(drv);
        self.mirror.clear();
        self.set_connecting(false);
        tracing::info!(vif = self.idx, name = %self.name, "host interface deinitialised");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn timers_pending(&self) -> (bool, bool, bool) {
        let slot = self.drv.lock().await;
        slot.as_ref().map_or((false, false, false), |d| {
            (
                d.scan_timer.is_pending(),
                d.connect_timer.is_pending(),
                d.listen_timer.is_pending(),
            )
        })
    }
}

pub(crate) struct Device {
    vifs: SnapshotList<Vif>,
    /// Serialises admission to scan/join/listen across interfaces.
    radio: Mutex<()>,
    deinit_lock: Mutex<()>,
    queue: WorkQueue<Task>,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
    dispatcher: Dispatcher,
    notifier: Arc<dyn StackNotifier>,
    config: Arc<HifConfig>,
}

impl Device {
    /// First interface, other than `except`, holding the radio.
    fn radio_holder(&self, except: Option<u8>) -> Option<(u8, HifState)> {
        self.vifs.snapshot().iter().find_map(|vif| {
            let state = vif.state()?;
            (Some(vif.idx) != except && state.holds_radio()).then_some((vif.idx, state))
        })
    }

    fn check_radio_free(&self) -> Result<()> {
        match self.radio_holder(None) {
            Some((idx, state)) => {
                tracing::debug!(holder = idx, ?state, "radio busy");
                Err(Error::Busy(format!("interface {idx} is {state:?}")))
            }
            None => Ok(()),
        }
    }
}

/// One chip: its interfaces and the worker that serialises their tasks.
#[derive(Clone)]
pub struct Wilc {
    dev: Arc<Device>,
}

impl Wilc {
    /// Starts the device worker. Must be called inside a Tokio runtime.
    pub fn new(
        transport: Arc<dyn Transport>,
        notifier: Arc<dyn StackNotifier>,
        config: HifConfig,
    ) -> Self {
        let (queue, worker) = WorkQueue::start("wilc-hif", |task: Task| task.run());
        let dev = Device {
            vifs: SnapshotList::default(),
            radio: Mutex::new(()),
            deinit_lock: Mutex::new(()),
            queue,
            worker: std::sync::Mutex::new(Some(worker)),
            dispatcher: Dispatcher::new(transport),
            notifier,
            config: Arc::new(config),
        };
        Self { dev: Arc::new(dev) }
    }

    pub fn config(&self) -> &HifConfig {
        &self.dev.config
    }

    /// Registers an interface in the lowest free slot and initialises it.
    pub async fn add_interface(&self, name: &str) -> Result<Arc<Vif>> {
        let taken: Vec<u8> = self.dev.vifs.snapshot().iter().map(|v| v.idx).collect();
        let idx = (0..self.dev.config.max_interfaces)
            .find(|i| !taken.contains(i))
            .ok_or_else(|| Error::InvalidArgument("no free interface slot".into()))?;

        let vif = Arc::new_cyclic(|me| Vif {
            idx,
            name: name.to_string(),
            me: me.clone(),
            device: Arc::downgrade(&self.dev),
            dispatcher: self.dev.dispatcher.clone(),
            queue: self.dev.queue.clone(),
            notifier: Arc::clone(&self.dev.notifier),
            config: Arc::clone(&self.dev.config),
            drv: Mutex::new(None),
            mirror: Arc::new(StateMirror::new()),
            connecting: AtomicBool::new(false),
            stats_timer: HifTimer::new("stats"),
            periodic_stat: std::sync::Mutex::new(RfInfo::default()),
        });
        self.dev.vifs.push(Arc::clone(&vif));
        vif.init().await?;
        Ok(vif)
    }

    /// Deinitialises and unregisters the interface in slot `idx`.
    pub async fn remove_interface(&self, idx: u8) -> Result<()> {
        let vif = self
            .dev
            .vifs
            .find(|v| v.idx == idx)
            .ok_or_else(|| Error::InvalidArgument(format!("no interface in slot {idx}")))?;
        if vif.state().is_some() {
            vif.deinit().await?;
        }
        self.dev.vifs.remove_by(|v| v.idx == idx);
        Ok(())
    }

    pub fn interfaces(&self) -> Vec<Arc<Vif>> {
        self.dev.vifs.snapshot().iter().cloned().collect()
    }

    /// Resolves a firmware interface index (1-based).
    pub fn vif_from_wire_idx(&self, wire_idx: u32) -> Option<Arc<Vif>> {
        let slot = wire_idx.checked_sub(1)?;
        if slot >= u32::from(self.dev.config.max_interfaces) {
            return None;
        }
        self.dev.vifs.find(|v| u32::from(v.idx) == slot)
    }

    /// Waits until every task submitted before this call has run.
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.dev
            .queue
            .submit(Task::new(Weak::new(), TaskBody::Barrier, Some(tx)))?;
        rx.await.map_err(|_| Error::TaskDropped)?.map(|_| ())
    }

    /// Tears down every interface, drains the queue and joins the worker.
    pub async fn shutdown(&self) -> Result<()> {
        for vif in self.interfaces() {
            if vif.state().is_some() {
                vif.deinit().await?;
            }
            self.dev.vifs.remove_by(|v| v.idx == vif.idx);
        }
        self.dev.queue.close();
        let worker = self
            .dev
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::error!("hif worker ended abnormally: {}", e);
            }
        }
        tracing::info!("wilc host interface shut down");
        Ok(())
    }

    /// Held while an event is routed so no interface is torn down under it.
    pub(crate) async fn lock_deinit(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.dev.deinit_lock.lock().await
    }
}
