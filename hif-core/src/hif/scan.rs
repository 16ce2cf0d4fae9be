use super::task::TaskBody;
use super::{HifState, HostIfDrv, ScanEvent, ScanResultFn, Vif};
use crate::events::RcvdNetInfo;
use crate::ie::{WLAN_EID_DS_PARAMS, find_ie};
use crate::wid::records::encode_ssid_list;
use crate::wid::{Wid, WidId};
use crate::{Error, Result};
use std::time::Duration;

const PASSIVE_SCAN_SLACK_MS: u64 = 500;

/// Who asked for the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ScanSource {
    #[default]
    User = 0x01,
    ObssPeriodic = 0x02,
    ObssOneTime = 0x04,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ScanType {
    Passive = 0,
    #[default]
    Active = 1,
}

/// Scan parameters as handed down by the wireless configuration layer.
#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    pub source: ScanSource,
    pub scan_type: ScanType,
    /// 1-based channel numbers.
    pub channels: Vec<u8>,
    /// SSIDs to probe for; empty means a wildcard scan.
    pub ssids: Vec<Vec<u8>>,
    /// Extra IEs appended to probe requests.
    pub ies: Vec<u8>,
    /// Per-channel dwell time in ms for passive scans, 0 for the firmware default.
    pub duration: u16,
}

impl Vif {
    /// Starts a scan. Results arrive through `on_result` from the worker.
    pub async fn scan(&self, req: ScanRequest, on_result: ScanResultFn) -> Result<()> {
        let device = self.device()?;
        let _radio = device.radio.lock().await;
        device.check_radio_free()?;
        if self.is_connecting() {
            tracing::debug!(vif = self.idx, "scan refused while connecting");
            return Err(Error::Busy("connect in progress".into()));
        }

        let mut slot = self.drv.lock().await;
        let drv = slot.as_mut().ok_or(Error::NoDriver(self.idx))?;
        drv.scan_found = 0;

        let mut wids = Vec::with_capacity(6);
        if !req.ssids.is_empty() {
            wids.push(Wid::string(WidId::SSID_PROBE_REQ, encode_ssid_list(&req.ssids)?));
        }
        wids.push(Wid::bin_data(WidId::INFO_ELEMENT_PROBE, req.ies));
        wids.push(Wid::char(WidId::SCAN_TYPE, req.scan_type as u8));

        let timeout = if req.scan_type == ScanType::Passive && req.duration > 0 {
            wids.push(Wid::short(WidId::PASSIVE_SCAN_TIME, req.duration));
            let dwell = u64::from(req.duration) * req.channels.len() as u64;
            Duration::from_millis(dwell + PASSIVE_SCAN_SLACK_MS)
        } else {
            self.config.scan_timeout
        };

        // Firmware counts channels from 0.
        let channels: Vec<u8> = req.channels.iter().map(|&c| c.saturating_sub(1)).collect();
        wids.push(Wid::bin_data(WidId::SCAN_CHANNEL_LIST, channels));
        wids.push(Wid::char(WidId::START_SCAN_REQ, req.source as u8));

        drv.set_scan_result(Some(on_result));
        if let Err(e) = self.set_wids(&mut wids).await {
            tracing::error!(vif = self.idx, "failed to send scan parameters: {}", e);
            drv.set_scan_result(None);
            return Err(e);
        }

        drv.set_state(HifState::Scanning);
        tracing::debug!(vif = self.idx, timeout_ms = timeout.as_millis() as u64, "scan started");
        drv.scan_timer
            .arm(timeout, self.timer_submit(|| TaskBody::ScanTimeout));
        Ok(())
    }

    /// Ends the current scan with `evt`. An abort is also pushed to firmware.
    pub(crate) async fn scan_done(&self, drv: &mut HostIfDrv, evt: ScanEvent) -> Result<()> {
        let mut res = Ok(());
        if evt == ScanEvent::Aborted {
            tracing::debug!(vif = self.idx, "aborting running scan");
            res = self
                .set_wids(&mut [Wid::char(WidId::ABORT_RUNNING_SCAN, 1)])
                .await;
        }
        drv.scan_timer.cancel();
        if drv.state() == HifState::Scanning {
            drv.restore_state();
        }
        if let Some(mut cb) = drv.take_scan_result() {
            cb(evt, None);
        }
        res
    }

    pub(super) async fn handle_scan_timer(&self) -> Result<()> {
        let mut slot = self.drv.lock().await;
        let Some(drv) = slot.as_mut() else {
            tracing::debug!(vif = self.idx, "scan timeout without driver");
            return Ok(());
        };
        if !drv.scan_pending() {
            tracing::debug!(vif = self.idx, "stale scan timeout ignored");
            return Ok(());
        }
        tracing::info!(vif = self.idx, "scan timed out");
        self.scan_done(drv, ScanEvent::Aborted).await
    }

    pub(super) async fn handle_scan_complete(&self) -> Result<()> {
        let mut slot = self.drv.lock().await;
        let Some(drv) = slot.as_mut() else {
            return Ok(());
        };
        drv.scan_timer.cancel();
        if !drv.scan_pending() {
            tracing::debug!(vif = self.idx, "scan complete with no scan pending");
            return Ok(());
        }
        tracing::debug!(vif = self.idx, "scan completed");
        self.scan_done(drv, ScanEvent::Done).await
    }

    pub(super) async fn handle_rcvd_ntwrk_info(&self, mut info: RcvdNetInfo) -> Result<()> {
        let mut slot = self.drv.lock().await;
        let Some(drv) = slot.as_mut() else {
            return Ok(());
        };
        let Some(ies) = info.ies().filter(|ies| !ies.is_empty()) else {
            tracing::trace!(vif = self.idx, "network info is not a beacon or probe response");
            return Ok(());
        };
        if let Some(&ch) = find_ie(WLAN_EID_DS_PARAMS, ies).and_then(|ds| ds.first()) {
            info.ch = ch;
        }
        if !drv.scan_pending() {
            tracing::debug!(vif = self.idx, "network info without scan callback");
            return Ok(());
        }
        drv.scan_found += 1;
        tracing::trace!(vif = self.idx, ch = info.ch, rssi = info.rssi, "network found");
        if let Some(cb) = drv.scan_result_mut() {
            cb(ScanEvent::NetworkFound, Some(&info));
        }
        Ok(())
    }
}
