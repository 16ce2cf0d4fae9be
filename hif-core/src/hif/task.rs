//! Task records consumed by the device worker.

use super::Vif;
use crate::Result;
use crate::events::RcvdNetInfo;
use crate::wid::records::{ETH_ALEN, StationParams};
use std::fmt;
use std::sync::Weak;
use tokio::sync::oneshot;

/// An EAP frame held back until the stack is ready for it.
///
/// `release` runs when the record is dropped, whether or not the frame was
/// ever delivered.
pub struct BufferedEap {
    frame: Vec<u8>,
    pkt_offset: u32,
    deliver: Option<Box<dyn FnOnce(&[u8], u32) + Send>>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl BufferedEap {
    pub fn new(
        frame: Vec<u8>,
        pkt_offset: u32,
        deliver: impl FnOnce(&[u8], u32) + Send + 'static,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            frame,
            pkt_offset,
            deliver: Some(Box::new(deliver)),
            release: Some(Box::new(release)),
        }
    }

    pub fn len(&self) -> usize {
        self.frame.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.is_empty()
    }

    pub(crate) fn deliver(&mut self) {
        if let Some(deliver) = self.deliver.take() {
            deliver(&self.frame, self.pkt_offset);
        }
    }
}

impl Drop for BufferedEap {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for BufferedEap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedEap")
            .field("len", &self.frame.len())
            .field("pkt_offset", &self.pkt_offset)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub(crate) enum TaskBody {
    NetworkInfo(RcvdNetInfo),
    MacStatus(u8),
    ScanComplete,
    ScanTimeout,
    ConnectTimeout,
    ListenExpired { cookie: u64 },
    MulticastFilter { enabled: bool, list: Vec<[u8; ETH_ALEN]> },
    GetStatistics,
    WowlanTrigger(bool),
    BufferedEap(BufferedEap),
    PowerMgmt(bool),
    AddStation(StationParams),
    EditStation(StationParams),
    GetTxPower,
    /// Completes once everything queued ahead of it has run.
    Barrier,
}

impl TaskBody {
    fn name(&self) -> &'static str {
        match self {
            TaskBody::NetworkInfo(_) => "network_info",
            TaskBody::MacStatus(_) => "mac_status",
            TaskBody::ScanComplete => "scan_complete",
            TaskBody::ScanTimeout => "scan_timeout",
            TaskBody::ConnectTimeout => "connect_timeout",
            TaskBody::ListenExpired { .. } => "listen_expired",
            TaskBody::MulticastFilter { .. } => "multicast_filter",
            TaskBody::GetStatistics => "get_statistics",
            TaskBody::WowlanTrigger(_) => "wowlan_trigger",
            TaskBody::BufferedEap(_) => "buffered_eap",
            TaskBody::PowerMgmt(_) => "power_mgmt",
            TaskBody::AddStation(_) => "add_station",
            TaskBody::EditStation(_) => "edit_station",
            TaskBody::GetTxPower => "get_tx_power",
            TaskBody::Barrier => "barrier",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskReply {
    Done,
    TxPower(u8),
}

pub(crate) struct Task {
    vif: Weak<Vif>,
    body: TaskBody,
    done: Option<oneshot::Sender<Result<TaskReply>>>,
}

impl Task {
    pub(crate) fn new(
        vif: Weak<Vif>,
        body: TaskBody,
        done: Option<oneshot::Sender<Result<TaskReply>>>,
    ) -> Self {
        Self { vif, body, done }
    }

    pub(crate) async fn run(self) {
        let Task { vif, body, done } = self;
        let name = body.name();
        let res = if let TaskBody::Barrier = body {
            Ok(TaskReply::Done)
        } else {
            let Some(vif) = vif.upgrade() else {
                // Dropping `done` wakes any waiter with TaskDropped.
                tracing::debug!(task = name, "interface gone, task dropped");
                return;
            };
            tracing::trace!(vif = vif.idx(), task = name, "running task");
            vif.handle(body).await
        };

        match done {
            Some(done) => {
                let _ = done.send(res);
            }
            None => {
                if let Err(e) = res {
                    tracing::warn!(task = name, "task failed: {}", e);
                }
            }
        }
    }
}

impl Vif {
    /// The worker's single dispatch point.
    pub(crate) async fn handle(&self, body: TaskBody) -> Result<TaskReply> {
        let res = match body {
            TaskBody::NetworkInfo(info) => self.handle_rcvd_ntwrk_info(info).await,
            TaskBody::MacStatus(status) => self.handle_rcvd_gnrl_async_info(status).await,
            TaskBody::ScanComplete => self.handle_scan_complete().await,
            TaskBody::ScanTimeout => self.handle_scan_timer().await,
            TaskBody::ConnectTimeout => self.handle_connect_timeout().await,
            TaskBody::ListenExpired { cookie } => self.handle_listen_expired(cookie).await,
            TaskBody::MulticastFilter { enabled, list } => {
                self.handle_set_mcast_filter(enabled, &list).await
            }
            TaskBody::GetStatistics => self.handle_periodic_stats().await,
            TaskBody::WowlanTrigger(enabled) => self.handle_wowlan_trigger(enabled).await,
            TaskBody::BufferedEap(eap) => {
                self.handle_send_buffered_eap(eap);
                Ok(())
            }
            TaskBody::PowerMgmt(enabled) => self.handle_power_management(enabled).await,
            TaskBody::AddStation(params) => self.handle_add_station(&params).await,
            TaskBody::EditStation(params) => self.handle_edit_station(&params).await,
            TaskBody::GetTxPower => return self.handle_get_tx_power().await.map(TaskReply::TxPower),
            TaskBody::Barrier => Ok(()),
        };
        res.map(|()| TaskReply::Done)
    }
}
