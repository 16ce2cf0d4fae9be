//! Join, association response and disconnect handling.

use super::task::TaskBody;
use super::{AuthType, ConnEvent, ConnResultFn, HifState, HostIfDrv, MacStatus, ScanEvent, Vif};
use crate::traits::ExternalAuthRequest;
use crate::wid::records::{
    AssocResp, ETH_ALEN, JoinBssParam, MAX_ASSOC_RESP_FRAME_SIZE, WLAN_STATUS_SUCCESS,
    WLAN_STATUS_UNSPECIFIED_FAILURE, ZERO_ADDR,
};
use crate::wid::{Wid, WidId, WidType};
use crate::{Error, Result};

/// Everything the firmware needs to start a join.
#[derive(Debug, Clone, Default)]
pub struct ConnectParams {
    pub bssid: [u8; ETH_ALEN],
    /// IEs for the association request.
    pub req_ies: Vec<u8>,
    /// 802.11i mode bits.
    pub security: u8,
    pub auth_type: AuthType,
    pub mfp_type: u8,
    pub join: JoinBssParam,
    /// Handed to the stack when `auth_type` is SAE.
    pub external_auth: Option<ExternalAuthRequest>,
}

impl Vif {
    /// Sends the join request and arms the connect timer.
    pub async fn set_join_req(&self, params: ConnectParams, on_result: ConnResultFn) -> Result<()> {
        let device = self.device()?;
        let _radio = device.radio.lock().await;
        device.check_radio_free()?;

        let mut slot = self.drv.lock().await;
        let drv = slot.as_mut().ok_or(Error::NoDriver(self.idx))?;

        let ConnectParams {
            bssid,
            req_ies,
            security,
            auth_type,
            mfp_type,
            join,
            external_auth,
        } = params;

        drv.conn.bssid = bssid;
        drv.conn.security = security;
        drv.conn.auth_type = auth_type;
        drv.conn.mfp_type = mfp_type;
        drv.conn.status = WLAN_STATUS_SUCCESS;
        drv.conn.resp_ies = None;
        drv.conn.req_ies = Some(req_ies.clone());
        drv.conn.external_auth = external_auth.unwrap_or_default();
        drv.set_conn_result(Some(on_result));
        self.set_connecting(true);

        tracing::debug!(
            vif = self.idx,
            ch = join.ch,
            security,
            ?auth_type,
            mfp = mfp_type,
            "sending join request"
        );
        let mut wids = [
            Wid::char(WidId::SET_MFP, mfp_type),
            Wid::bin_data(WidId::INFO_ELEMENT_ASSOCIATE, req_ies),
            Wid::char(WidId::MODE_11I, security),
            Wid::char(WidId::AUTH_TYPE, auth_type as u8),
            Wid::string(WidId::JOIN_REQ_EXTENDED, join.to_bytes().to_vec()),
        ];
        if let Err(e) = self.set_wids(&mut wids).await {
            tracing::error!(vif = self.idx, "failed to send join request: {}", e);
            drv.conn.req_ies = None;
            drv.set_conn_result(None);
            self.set_connecting(false);
            return Err(e);
        }

        let next = if auth_type == AuthType::Sae {
            HifState::ExternalAuth
        } else {
            HifState::WaitingConnResp
        };
        drv.set_state(next);
        drv.connect_timer
            .arm(self.config.connect_timeout, self.timer_submit(|| TaskBody::ConnectTimeout));
        Ok(())
    }

    /// Drops the association, or abandons a join or scan in progress.
    ///
    /// Every pending callback gets its terminal event even if the firmware
    /// never sees the disconnect; the dispatch error is still returned.
    pub async fn disconnect(&self) -> Result<()> {
        let device = self.device()?;
        for vif in device.vifs.snapshot().iter() {
            if vif.state() != Some(HifState::Scanning) {
                continue;
            }
            let mut slot = vif.drv.lock().await;
            if let Some(drv) = slot.as_mut().filter(|d| d.state() == HifState::Scanning) {
                tracing::debug!(vif = vif.idx, "aborting scan for disconnect");
                if let Err(e) = vif.scan_done(drv, ScanEvent::Aborted).await {
                    tracing::warn!(vif = vif.idx, "scan abort failed: {}", e);
                }
            }
        }

        let mut slot = self.drv.lock().await;
        let drv = slot.as_mut().ok_or(Error::NoDriver(self.idx))?;

        if drv.state() == HifState::P2pListen {
            drv.listen_timer.cancel();
            let cookie = drv.roc.cookie;
            if let Err(e) = self.roc_expired(drv, cookie).await {
                tracing::warn!(vif = self.idx, "leaving listen state failed: {}", e);
            }
        }

        tracing::info!(vif = self.idx, state = ?drv.state(), "sending disconnect request");
        let res = self
            .set_wids(&mut [Wid::char(WidId::DISCONNECT, 0)])
            .await;

        if let Some(mut cb) = drv.take_scan_result() {
            drv.scan_timer.cancel();
            cb(ScanEvent::Aborted, None);
        }

        let notified = match drv.state() {
            HifState::WaitingConnResp | HifState::ExternalAuth => {
                drv.connect_timer.cancel();
                drv.conn.notify(ConnEvent::ConnResp, MacStatus::Disconnected)
            }
            HifState::Connected => drv.conn.notify(ConnEvent::DisconnNotif, MacStatus::Disconnected),
            _ => true,
        };
        if !notified {
            tracing::warn!(vif = self.idx, "disconnect without connect callback");
        }

        drv.set_state(HifState::Idle);
        drv.assoc_bssid = ZERO_ADDR;
        drv.conn.req_ies = None;
        drv.conn.resp_ies = None;
        drv.set_conn_result(None);
        self.set_connecting(false);
        res
    }

    pub(super) async fn handle_rcvd_gnrl_async_info(&self, status: u8) -> Result<()> {
        let mut slot = self.drv.lock().await;
        let Some(drv) = slot.as_mut() else {
            tracing::debug!(vif = self.idx, "mac status without driver");
            return Ok(());
        };
        let mac = MacStatus::from(status);
        tracing::debug!(vif = self.idx, state = ?drv.state(), ?mac, "mac status received");
        if !drv.has_conn_result() {
            tracing::warn!(vif = self.idx, "mac status without connect callback");
            return Ok(());
        }

        match drv.state() {
            HifState::ExternalAuth => {
                let req = drv.conn.external_auth.clone();
                if let Err(e) = self.notifier.external_auth_request(self.wire_idx(), &req).await {
                    tracing::warn!(vif = self.idx, "external auth request failed: {}", e);
                }
                // Advances without waiting for SAE to finish. A connect
                // response overtaking the supplicant is not detected here.
                drv.set_state(HifState::WaitingConnResp);
                Ok(())
            }
            HifState::WaitingConnResp => {
                self.parse_assoc_resp_info(drv, mac).await;
                Ok(())
            }
            HifState::Connected if mac == MacStatus::Disconnected => {
                self.handle_disconnect(drv).await;
                Ok(())
            }
            _ if mac == MacStatus::Disconnected && drv.scan_pending() => {
                tracing::warn!(vif = self.idx, "firmware disconnected, aborting running scan");
                self.scan_done(drv, ScanEvent::Aborted).await
            }
            _ => Ok(()),
        }
    }

    async fn parse_assoc_resp_info(&self, drv: &mut HostIfDrv, mac: MacStatus) {
        drv.conn.status = WLAN_STATUS_UNSPECIFIED_FAILURE;
        drv.conn.resp_ies = None;

        if mac == MacStatus::Connected {
            let mut wid = [Wid::query(WidId::ASSOC_RES_INFO, WidType::Str, MAX_ASSOC_RESP_FRAME_SIZE)];
            match self.get_wids(&mut wid).await {
                Ok(()) => match AssocResp::parse(&wid[0].val) {
                    Some(resp) => {
                        tracing::debug!(vif = self.idx, status = resp.status, aid = resp.aid, "association response");
                        drv.conn.status = resp.status;
                        if resp.status == WLAN_STATUS_SUCCESS {
                            drv.conn.resp_ies = Some(resp.ies.to_vec());
                        }
                    }
                    None => tracing::warn!(vif = self.idx, len = wid[0].size(), "short association response"),
                },
                Err(e) => tracing::error!(vif = self.idx, "failed to read association response: {}", e),
            }
        }

        drv.connect_timer.cancel();
        drv.conn.notify(ConnEvent::ConnResp, mac);

        if mac == MacStatus::Connected && drv.conn.status == WLAN_STATUS_SUCCESS {
            tracing::info!(vif = self.idx, bssid = ?drv.conn.bssid, "connected");
            drv.assoc_bssid = drv.conn.bssid;
            drv.set_state(HifState::Connected);
        } else {
            tracing::info!(vif = self.idx, ?mac, status = drv.conn.status, "join failed");
            drv.assoc_bssid = ZERO_ADDR;
            drv.set_state(HifState::Idle);
        }
        drv.conn.resp_ies = None;
        drv.conn.req_ies = None;
        self.set_connecting(false);
    }

    async fn handle_disconnect(&self, drv: &mut HostIfDrv) {
        tracing::info!(vif = self.idx, "firmware reported disconnection");
        if drv.scan_pending() {
            if let Err(e) = self.scan_done(drv, ScanEvent::Aborted).await {
                tracing::warn!(vif = self.idx, "scan abort failed: {}", e);
            }
        }
        drv.conn.notify(ConnEvent::DisconnNotif, MacStatus::Disconnected);
        drv.assoc_bssid = ZERO_ADDR;
        drv.conn.req_ies = None;
        drv.set_state(HifState::Idle);
        self.set_connecting(false);
    }

    pub(super) async fn handle_connect_timeout(&self) -> Result<()> {
        let mut slot = self.drv.lock().await;
        let Some(drv) = slot.as_mut() else {
            tracing::debug!(vif = self.idx, "connect timeout without driver");
            return Ok(());
        };
        if !matches!(drv.state(), HifState::WaitingConnResp | HifState::ExternalAuth) {
            tracing::debug!(vif = self.idx, state = ?drv.state(), "stale connect timeout ignored");
            return Ok(());
        }

        tracing::info!(vif = self.idx, "connect timed out");
        drv.set_state(HifState::Idle);
        drv.conn.status = WLAN_STATUS_UNSPECIFIED_FAILURE;
        if !drv.conn.notify(ConnEvent::ConnResp, MacStatus::Disconnected) {
            tracing::warn!(vif = self.idx, "connect timeout without connect callback");
        }
        let res = self
            .set_wids(&mut [Wid::char(WidId::DISCONNECT, 0)])
            .await;
        drv.conn.req_ies = None;
        self.set_connecting(false);
        res
    }
}
