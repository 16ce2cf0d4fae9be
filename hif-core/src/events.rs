//! Decoders for asynchronous firmware frames.
//!
//! Each decoder reads the interface index from the last four bytes, resolves
//! the interface and submits a task. Frames that are short, name no live
//! interface, or arrive with nobody waiting are dropped with a log line.

use crate::hif::task::TaskBody;
use crate::hif::{Vif, Wilc};
use crate::ie::{BEACON_IES_OFFSET, FCTL_STYPE_MASK, STYPE_BEACON, STYPE_PROBE_RESP};
use crate::wid::frame::{KIND_INFO, KIND_NETWORK_INFO, KIND_SCAN_COMPLETE};
use std::sync::Arc;

const IDX_LEN: usize = 4;
const NET_INFO_FRAME_LEN_AT: usize = 6;
const NET_INFO_RSSI_AT: usize = 8;
const NET_INFO_MGMT_AT: usize = 9;
const ASYNC_STATUS_AT: usize = 7;
const ASYNC_MIN_LEN: usize = 10 + IDX_LEN;

/// A beacon or probe response reported during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcvdNetInfo {
    pub rssi: i8,
    /// Filled from the DS parameter set when the worker handles it.
    pub ch: u8,
    pub mgmt: Vec<u8>,
}

impl RcvdNetInfo {
    pub fn frame_control(&self) -> Option<u16> {
        let fc = self.mgmt.get(..2)?;
        Some(u16::from_le_bytes([fc[0], fc[1]]))
    }

    /// The IEs of a beacon or probe response. `None` for any other frame.
    pub fn ies(&self) -> Option<&[u8]> {
        let stype = self.frame_control()? & FCTL_STYPE_MASK;
        if stype != STYPE_BEACON && stype != STYPE_PROBE_RESP {
            return None;
        }
        self.mgmt.get(BEACON_IES_OFFSET..)
    }

    pub fn bssid(&self) -> Option<[u8; 6]> {
        self.mgmt.get(16..22)?.try_into().ok()
    }
}

fn trailing_idx(buffer: &[u8]) -> Option<u32> {
    let at = buffer.len().checked_sub(IDX_LEN)?;
    let idx: [u8; IDX_LEN] = buffer[at..].try_into().ok()?;
    Some(u32::from_le_bytes(idx))
}

impl Wilc {
    fn vif_for_event(&self, buffer: &[u8], what: &'static str) -> Option<Arc<Vif>> {
        let Some(idx) = trailing_idx(buffer) else {
            tracing::debug!(event = what, len = buffer.len(), "frame too short for an index");
            return None;
        };
        let Some(vif) = self.vif_from_wire_idx(idx) else {
            tracing::debug!(event = what, idx, "no interface for index");
            return None;
        };
        if !vif.mirror().has_driver() {
            tracing::warn!(event = what, vif = vif.idx(), "driver not initialised");
            return None;
        }
        Some(vif)
    }

    /// Network-info frame: `hdr[4] | ? [2] | frame_len+1 LE16 | rssi | mgmt | idx LE32`.
    pub fn network_info_received(&self, buffer: &[u8]) {
        if buffer.len() < NET_INFO_MGMT_AT + IDX_LEN {
            tracing::debug!(len = buffer.len(), "short network info dropped");
            return;
        }
        let Some(vif) = self.vif_for_event(buffer, "network_info") else {
            return;
        };

        let raw_len = u16::from_le_bytes([
            buffer[NET_INFO_FRAME_LEN_AT],
            buffer[NET_INFO_FRAME_LEN_AT + 1],
        ]);
        let payload_end = buffer.len() - IDX_LEN;
        let Some(mgmt) = (raw_len as usize)
            .checked_sub(1)
            .map(|len| NET_INFO_MGMT_AT + len)
            .filter(|&end| end <= payload_end)
            .map(|end| buffer[NET_INFO_MGMT_AT..end].to_vec())
        else {
            tracing::debug!(vif = vif.idx(), raw_len, "network info length out of range");
            return;
        };

        let info = RcvdNetInfo {
            rssi: buffer[NET_INFO_RSSI_AT] as i8,
            ch: 0,
            mgmt,
        };
        if let Err(e) = vif.submit(TaskBody::NetworkInfo(info)) {
            tracing::error!(vif = vif.idx(), "network info not queued: {}", e);
        }
    }

    /// General async info: MAC status at byte 7, then reason and info.
    pub async fn gnrl_async_info_received(&self, buffer: &[u8]) {
        let _deinit = self.lock_deinit().await;
        if buffer.len() < ASYNC_MIN_LEN {
            tracing::debug!(len = buffer.len(), "short async info dropped");
            return;
        }
        let Some(vif) = self.vif_for_event(buffer, "async_info") else {
            return;
        };
        if !vif.mirror().has_conn_result() {
            tracing::warn!(vif = vif.idx(), "async info with no connect request pending");
            return;
        }

        let status = buffer[ASYNC_STATUS_AT];
        tracing::debug!(
            vif = vif.idx(),
            status,
            reason = buffer[ASYNC_STATUS_AT + 1],
            info = buffer[ASYNC_STATUS_AT + 2],
            "async info received"
        );
        if let Err(e) = vif.submit(TaskBody::MacStatus(status)) {
            tracing::error!(vif = vif.idx(), "async info not queued: {}", e);
        }
    }

    pub fn scan_complete_received(&self, buffer: &[u8]) {
        let Some(vif) = self.vif_for_event(buffer, "scan_complete") else {
            return;
        };
        if !vif.mirror().scan_pending() {
            tracing::debug!(vif = vif.idx(), "scan complete with no scan pending");
            return;
        }
        if let Err(e) = vif.submit(TaskBody::ScanComplete) {
            tracing::error!(vif = vif.idx(), "scan complete not queued: {}", e);
        }
    }

    /// Routes an inbound frame by its type byte. Returns `false` for non-events.
    pub async fn frame_received(&self, buffer: &[u8]) -> bool {
        match buffer.first().copied() {
            Some(KIND_NETWORK_INFO) => self.network_info_received(buffer),
            Some(KIND_INFO) => self.gnrl_async_info_received(buffer).await,
            Some(KIND_SCAN_COMPLETE) => self.scan_complete_received(buffer),
            other => {
                tracing::trace!(kind = ?other, "not an event frame");
                return false;
            }
        }
        true
    }
}
