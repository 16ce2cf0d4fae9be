//! In-memory firmware for tests and the demo daemon.
//!
//! Every request goes through the real frame encoder and is decoded again,
//! so what gets recorded is exactly what the chip would have seen.

use crate::traits::{ExternalAuthRequest, StackNotifier, Transport};
use crate::wid::frame::{self, CfgOp};
use crate::wid::{Wid, WidId};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::sleep;

/// One config exchange as decoded on the firmware side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub vif_idx: u8,
    pub op: CfgOp,
    pub wids: Vec<(WidId, Vec<u8>)>,
}

#[derive(Default)]
struct Firmware {
    seq: u8,
    exchanges: Vec<Exchange>,
    responses: HashMap<WidId, Vec<u8>>,
    failing: HashSet<WidId>,
    withheld: HashSet<WidId>,
    latency: Option<Duration>,
}

/// A transport that answers from a table instead of a chip.
#[derive(Default)]
pub struct MockTransport {
    fw: Mutex<Firmware>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn fw(&self) -> MutexGuard<'_, Firmware> {
        self.fw.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Value returned for every later GET of `id`. Unset ids answer empty.
    pub fn set_response(&self, id: WidId, value: Vec<u8>) {
        self.fw().responses.insert(id, value);
    }

    /// Fails every exchange that carries `id`.
    pub fn fail_on(&self, id: WidId) {
        self.fw().failing.insert(id);
    }

    /// Leaves `id` out of every later GET response, as firmware that has
    /// nothing to report does.
    pub fn withhold(&self, id: WidId) {
        self.fw().withheld.insert(id);
    }

    pub fn clear_failures(&self) {
        self.fw().failing.clear();
    }

    /// Holds each exchange open this long, like a slow bus.
    pub fn set_latency(&self, latency: Duration) {
        self.fw().latency = Some(latency);
    }

    pub fn exchanges(&self) -> Vec<Exchange> {
        self.fw().exchanges.clone()
    }

    /// Every attribute SET so far, in order.
    pub fn sent_wids(&self) -> Vec<(WidId, Vec<u8>)> {
        self.fw()
            .exchanges
            .iter()
            .filter(|x| x.op == CfgOp::Set)
            .flat_map(|x| x.wids.iter().cloned())
            .collect()
    }

    /// Ids of every attribute SET so far, in order.
    pub fn sent_ids(&self) -> Vec<WidId> {
        self.sent_wids().into_iter().map(|(id, _)| id).collect()
    }

    /// Number of times `id` was SET.
    pub fn count(&self, id: WidId) -> usize {
        self.sent_wids().iter().filter(|(w, _)| *w == id).count()
    }

    /// Most recent SET value of `id`.
    pub fn last_value(&self, id: WidId) -> Option<Vec<u8>> {
        self.sent_wids()
            .into_iter()
            .rev()
            .find_map(|(w, v)| (w == id).then_some(v))
    }

    pub fn clear(&self) {
        self.fw().exchanges.clear();
    }

    /// Highest number of exchanges that were ever open at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_config_packet(&self, vif_idx: u8, op: CfgOp, wids: &mut [Wid]) -> Result<()> {
        let open = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_in_flight.fetch_max(open, Ordering::AcqRel);

        let latency = self.fw().latency;
        if let Some(latency) = latency {
            sleep(latency).await;
        }
        let res = self.exchange(vif_idx, op, wids);
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        res
    }
}

impl MockTransport {
    fn exchange(&self, vif_idx: u8, op: CfgOp, wids: &mut [Wid]) -> Result<()> {
        let mut fw = self.fw();
        let seq = fw.seq;
        fw.seq = fw.seq.wrapping_add(1);

        let request = match op {
            CfgOp::Set => frame::encode_set(seq, wids)?,
            CfgOp::Get => frame::encode_query(seq, wids)?,
        };
        let decoded = frame::decode_request(&request)?;
        fw.exchanges.push(Exchange { vif_idx, op, wids: decoded.wids.clone() });

        if let Some((id, _)) = decoded.wids.iter().find(|(id, _)| fw.failing.contains(id)) {
            return Err(Error::Transport(format!("injected failure on {id:?}")));
        }
        if op == CfgOp::Set {
            return Ok(());
        }

        let answers: Vec<(WidId, Vec<u8>)> = decoded
            .wids
            .iter()
            .filter(|(id, _)| !fw.withheld.contains(id))
            .map(|(id, _)| (*id, fw.responses.get(id).cloned().unwrap_or_default()))
            .collect();
        drop(fw);
        let response = frame::encode_response(seq, &answers)?;
        frame::parse_response(&response, wids)
    }
}

/// Notifier that remembers what it was told.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    auth_requests: Mutex<Vec<(u8, ExternalAuthRequest)>>,
    tcp_ack: Mutex<Vec<(u8, bool)>>,
}

impl RecordingNotifier {
    pub fn auth_requests(&self) -> Vec<(u8, ExternalAuthRequest)> {
        self.auth_requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn tcp_ack_toggles(&self) -> Vec<(u8, bool)> {
        self.tcp_ack.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl StackNotifier for RecordingNotifier {
    async fn external_auth_request(&self, vif_idx: u8, req: &ExternalAuthRequest) -> Result<()> {
        tracing::debug!(vif = vif_idx, bssid = ?req.bssid, "external auth requested");
        self.auth_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((vif_idx, req.clone()));
        Ok(())
    }

    async fn enable_tcp_ack_filter(&self, vif_idx: u8, enabled: bool) {
        self.tcp_ack
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((vif_idx, enabled));
    }
}

// --- 固件事件帧构造 ---

/// A beacon from `bssid` advertising `ssid` on `ch`.
pub fn beacon_frame(bssid: [u8; 6], ssid: &[u8], ch: u8) -> Vec<u8> {
    let mut f = vec![0x80, 0x00, 0x00, 0x00];
    f.extend_from_slice(&[0xFF; 6]);
    f.extend_from_slice(&bssid);
    f.extend_from_slice(&bssid);
    f.extend_from_slice(&[0, 0]);
    f.extend_from_slice(&[0; 8]);
    f.extend_from_slice(&100u16.to_le_bytes());
    f.extend_from_slice(&0x0411u16.to_le_bytes());
    f.push(crate::ie::WLAN_EID_SSID);
    f.push(ssid.len() as u8);
    f.extend_from_slice(ssid);
    f.extend_from_slice(&[crate::ie::WLAN_EID_SUPP_RATES, 4, 0x82, 0x84, 0x8B, 0x96]);
    f.extend_from_slice(&[crate::ie::WLAN_EID_DS_PARAMS, 1, ch]);
    f
}

fn with_header(kind: u8, mut body: Vec<u8>, wire_idx: u8) -> Vec<u8> {
    body.extend_from_slice(&u32::from(wire_idx).to_le_bytes());
    let len = (frame::HEADER_LEN + body.len()) as u16;
    let mut f = vec![kind, 0];
    f.extend_from_slice(&len.to_le_bytes());
    f.extend_from_slice(&body);
    f
}

/// `'N'` frame carrying `mgmt` as received with `rssi`.
pub fn network_info_frame(wire_idx: u8, rssi: i8, mgmt: &[u8]) -> Vec<u8> {
    let mut body = vec![0, 0];
    body.extend_from_slice(&((mgmt.len() + 1) as u16).to_le_bytes());
    body.push(rssi as u8);
    body.extend_from_slice(mgmt);
    with_header(frame::KIND_NETWORK_INFO, body, wire_idx)
}

/// `'I'` frame reporting MAC `status`.
pub fn async_info_frame(wire_idx: u8, status: u8) -> Vec<u8> {
    with_header(frame::KIND_INFO, vec![0, 0, 0, status, 0, 0], wire_idx)
}

pub fn scan_complete_frame(wire_idx: u8) -> Vec<u8> {
    with_header(frame::KIND_SCAN_COMPLETE, Vec::new(), wire_idx)
}

/// Body of a successful association response: capability, status, AID, IEs.
pub fn assoc_resp_info(status: u16, ies: &[u8]) -> Vec<u8> {
    let mut f = Vec::with_capacity(6 + ies.len());
    f.extend_from_slice(&0x0411u16.to_le_bytes());
    f.extend_from_slice(&status.to_le_bytes());
    f.extend_from_slice(&(1u16 | 0xC000).to_le_bytes());
    f.extend_from_slice(ies);
    f
}
