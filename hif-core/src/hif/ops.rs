//! Single-dispatch configuration and query operations.

use super::task::{BufferedEap, TaskBody, TaskReply};
use super::Vif;
use crate::config::AntennaSwitchMode;
use crate::ie::{STYPE_ACTION, STYPE_AUTH, STYPE_PROBE_REQ};
use crate::wid::records::{
    ETH_ALEN, ExternalAuthParams, encode_antenna, encode_drv_handler, encode_multicast,
    encode_reg_frame,
};
use crate::wid::{Wid, WidId, WidType};
use crate::{Error, Result};
use std::sync::PoisonError;

const TCP_ACK_FILTER_LINK_SPEED_THRESH: u8 = 54;
// Reported before the rate adapts; says nothing about the link.
const DEFAULT_LINK_SPEED: u8 = 72;

const FW_NO_POWERSAVE: u8 = 0;
const FW_MIN_FAST_PS: u8 = 1;

const FW_ACTION_FRM_IDX: u8 = 0;
const FW_PROBE_REQ_IDX: u8 = 1;
const FW_AUTH_REQ_IDX: u8 = 2;

/// Operating role programmed into the firmware's driver handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum OpMode {
    #[default]
    Station = 0x01,
    Ap = 0x02,
    Go = 0x03,
    Client = 0x04,
    Monitor = 0x05,
}

impl OpMode {
    pub fn is_ap(self) -> bool {
        matches!(self, OpMode::Ap | OpMode::Go)
    }
}

/// Link statistics as the firmware reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RfInfo {
    pub link_speed: u8,
    pub rssi: i8,
    pub tx_cnt: u32,
    pub rx_cnt: u32,
    pub tx_fail_cnt: u32,
}

/// MAC tunables; only the fields that are set are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CfgParams {
    pub short_retry_limit: Option<u16>,
    pub long_retry_limit: Option<u16>,
    pub frag_threshold: Option<u16>,
    pub rts_threshold: Option<u16>,
}

fn short_reply(what: &str) -> Error {
    Error::Transport(format!("short {what} response"))
}

impl Vif {
    pub async fn get_mac_address(&self) -> Result<[u8; ETH_ALEN]> {
        let mut wid = [Wid::query(WidId::MAC_ADDR, WidType::Str, ETH_ALEN)];
        self.get_wids(&mut wid)
            .await
            .inspect_err(|e| tracing::error!(vif = self.idx, "failed to get mac address: {}", e))?;
        wid[0].val.as_slice().try_into().map_err(|_| short_reply("mac address"))
    }

    pub async fn set_mac_address(&self, mac: &[u8; ETH_ALEN]) -> Result<()> {
        self.set_wids(&mut [Wid::string(WidId::MAC_ADDR, mac.to_vec())])
            .await
            .inspect_err(|e| tracing::error!(vif = self.idx, "failed to set mac address: {}", e))
    }

    pub async fn set_mac_chnl_num(&self, channel: u8) -> Result<()> {
        self.set_wids(&mut [Wid::char(WidId::CURRENT_CHANNEL, channel)])
            .await
            .inspect_err(|e| tracing::error!(vif = self.idx, channel, "failed to set channel: {}", e))
    }

    pub async fn set_operation_mode(&self, index: u32, mode: OpMode, ifc_id: u8) -> Result<()> {
        let record = encode_drv_handler(index, mode as u8, ifc_id);
        self.set_wids(&mut [Wid::string(WidId::SET_DRV_HANDLER, record)])
            .await
            .inspect_err(|e| tracing::error!(vif = self.idx, ?mode, "failed to set driver handler: {}", e))
    }

    /// Milliseconds since `mac` was last heard from.
    pub async fn get_inactive_time(&self, mac: &[u8; ETH_ALEN]) -> Result<u32> {
        self.set_wids(&mut [Wid::string(WidId::SET_STA_MAC_INACTIVE_TIME, mac.to_vec())])
            .await
            .inspect_err(|e| tracing::error!(vif = self.idx, "failed to set inactive mac: {}", e))?;

        let mut wid = [Wid::query(WidId::GET_INACTIVE_TIME, WidType::Int, 4)];
        self.get_wids(&mut wid).await?;
        let time = wid[0].as_u32().ok_or_else(|| short_reply("inactive time"))?;
        tracing::debug!(vif = self.idx, time, "inactive time");
        Ok(time)
    }

    pub async fn get_rssi(&self) -> Result<i8> {
        let mut wid = [Wid::query(WidId::RSSI, WidType::Char, 1)];
        self.get_wids(&mut wid)
            .await
            .inspect_err(|e| tracing::error!(vif = self.idx, "failed to get rssi: {}", e))?;
        wid[0].as_i8().ok_or_else(|| short_reply("rssi"))
    }

    /// Reads link statistics and retunes the TCP-ACK filter from the link speed.
    pub async fn get_statistics(&self) -> Result<RfInfo> {
        let mut wids = [
            Wid::query(WidId::LINKSPEED, WidType::Char, 1),
            Wid::query(WidId::RSSI, WidType::Char, 1),
            Wid::query(WidId::SUCCESS_FRAME_COUNT, WidType::Int, 4),
            Wid::query(WidId::RECEIVED_FRAGMENT_COUNT, WidType::Int, 4),
            Wid::query(WidId::FAILED_COUNT, WidType::Int, 4),
        ];
        self.get_wids(&mut wids)
            .await
            .inspect_err(|e| tracing::error!(vif = self.idx, "failed to get statistics: {}", e))?;

        let stats = RfInfo {
            link_speed: wids[0].as_u8().unwrap_or_default(),
            rssi: wids[1].as_i8().unwrap_or_default(),
            tx_cnt: wids[2].as_u32().unwrap_or_default(),
            rx_cnt: wids[3].as_u32().unwrap_or_default(),
            tx_fail_cnt: wids[4].as_u32().unwrap_or_default(),
        };

        if stats.link_speed > TCP_ACK_FILTER_LINK_SPEED_THRESH
            && stats.link_speed != DEFAULT_LINK_SPEED
        {
            tracing::debug!(vif = self.idx, link_speed = stats.link_speed, "enable tcp ack filter");
            self.notifier.enable_tcp_ack_filter(self.wire_idx(), true).await;
        } else if stats.link_speed != DEFAULT_LINK_SPEED {
            tracing::debug!(vif = self.idx, link_speed = stats.link_speed, "disable tcp ack filter");
            self.notifier.enable_tcp_ack_filter(self.wire_idx(), false).await;
        }
        Ok(stats)
    }

    pub(super) async fn handle_periodic_stats(&self) -> Result<()> {
        let stats = self.get_statistics().await?;
        *self.periodic_stat.lock().unwrap_or_else(PoisonError::into_inner) = stats;
        Ok(())
    }

    pub async fn hif_set_cfg(&self, params: &CfgParams) -> Result<()> {
        let fields = [
            (WidId::SHORT_RETRY_LIMIT, params.short_retry_limit),
            (WidId::LONG_RETRY_LIMIT, params.long_retry_limit),
            (WidId::FRAG_THRESHOLD, params.frag_threshold),
            (WidId::RTS_THRESHOLD, params.rts_threshold),
        ];
        let mut wids: Vec<Wid> = fields
            .into_iter()
            .filter_map(|(id, v)| v.map(|v| Wid::short(id, v)))
            .collect();
        self.set_wids(&mut wids).await
    }

    /// (Un)registers interest in one management frame subtype.
    pub async fn frame_register(&self, frame_type: u16, reg: bool) -> Result<()> {
        let reg_id = match frame_type {
            STYPE_ACTION => FW_ACTION_FRM_IDX,
            STYPE_PROBE_REQ => FW_PROBE_REQ_IDX,
            STYPE_AUTH => FW_AUTH_REQ_IDX,
            other => {
                tracing::debug!(vif = self.idx, frame_type = other, "not a registrable frame type");
                0
            }
        };
        let record = encode_reg_frame(reg, reg_id, frame_type);
        self.set_wids(&mut [Wid::string(WidId::REGISTER_FRAME, record)])
            .await
            .inspect_err(|e| tracing::error!(vif = self.idx, "failed to register frame: {}", e))
    }

    pub async fn set_tx_power(&self, tx_power: u8) -> Result<()> {
        self.set_wids(&mut [Wid::char(WidId::TX_POWER, tx_power)]).await
    }

    /// Reads TX power through the worker, after everything already queued.
    pub async fn get_tx_power(&self) -> Result<u8> {
        match self.submit_sync(TaskBody::GetTxPower).await? {
            TaskReply::TxPower(power) => Ok(power),
            TaskReply::Done => Err(short_reply("tx power")),
        }
    }

    pub(super) async fn handle_get_tx_power(&self) -> Result<u8> {
        let mut wid = [Wid::query(WidId::TX_POWER, WidType::Char, 1)];
        self.get_wids(&mut wid)
            .await
            .inspect_err(|e| tracing::error!(vif = self.idx, "failed to get tx power: {}", e))?;
        wid[0].as_u8().ok_or_else(|| short_reply("tx power"))
    }

    pub fn set_power_mgmt(&self, enabled: bool) -> Result<()> {
        self.submit(TaskBody::PowerMgmt(enabled))
    }

    pub(super) async fn handle_power_management(&self, enabled: bool) -> Result<()> {
        let mode = if enabled { FW_MIN_FAST_PS } else { FW_NO_POWERSAVE };
        tracing::debug!(vif = self.idx, mode, "power management");
        self.set_wids(&mut [Wid::char(WidId::POWER_MANAGEMENT, mode)])
            .await
    }

    pub fn setup_multicast_filter(&self, enabled: bool, list: Vec<[u8; ETH_ALEN]>) -> Result<()> {
        self.submit(TaskBody::MulticastFilter { enabled, list })
    }

    pub(super) async fn handle_set_mcast_filter(
        &self,
        enabled: bool,
        list: &[[u8; ETH_ALEN]],
    ) -> Result<()> {
        let record = encode_multicast(enabled, list)?;
        self.set_wids(&mut [Wid::bin(WidId::SETUP_MULTICAST_FILTER, record)])
            .await
            .inspect_err(|e| tracing::error!(vif = self.idx, "failed to set multicast filter: {}", e))
    }

    pub fn set_wowlan_trigger(&self, enabled: bool) -> Result<()> {
        self.submit(TaskBody::WowlanTrigger(enabled))
    }

    pub(super) async fn handle_wowlan_trigger(&self, enabled: bool) -> Result<()> {
        self.set_wids(&mut [Wid::char(WidId::WOWLAN_TRIGGER, u8::from(enabled))])
            .await
    }

    /// Selects antenna `mode` through the GPIOs configured for this device.
    pub async fn set_antenna(&self, mode: u8) -> Result<()> {
        let ant = self.config.antenna;
        let chip = self.config.chip;
        if ant.mode == AntennaSwitchMode::Invalid {
            return Err(Error::InvalidArgument("antenna switch mode is not configured".into()));
        }
        if !chip.is_valid_gpio(ant.gpio1) {
            return Err(Error::InvalidArgument(format!("invalid gpio {} for {chip:?}", ant.gpio1)));
        }
        let gpio2 = if ant.mode == AntennaSwitchMode::Dual {
            if ant.gpio2 == ant.gpio1 || !chip.is_valid_gpio(ant.gpio2) {
                return Err(Error::InvalidArgument(format!("invalid gpio {} for {chip:?}", ant.gpio2)));
            }
            ant.gpio2
        } else {
            0
        };

        tracing::info!(vif = self.idx, mode, gpio1 = ant.gpio1, gpio2, "set antenna");
        let record = encode_antenna(mode, ant.gpio1, gpio2, ant.mode.wire_value());
        self.set_wids(&mut [Wid::bin(WidId::ANTENNA_SELECTION, record)])
            .await
            .inspect_err(|e| tracing::error!(vif = self.idx, "failed to set antenna mode: {}", e))
    }

    pub async fn set_external_auth_param(&self, params: &ExternalAuthParams) -> Result<()> {
        self.set_wids(&mut [Wid::bin_data(WidId::EXTERNAL_AUTH_PARAM, params.encode())])
            .await
            .inspect_err(|e| tracing::error!(vif = self.idx, "failed to set external auth param: {}", e))
    }

    /// Queues a held-back EAP frame for delivery to the stack.
    pub fn send_buffered_eap(&self, eap: BufferedEap) -> Result<()> {
        self.submit(TaskBody::BufferedEap(eap))
    }

    pub(super) fn handle_send_buffered_eap(&self, mut eap: BufferedEap) {
        if eap.is_empty() {
            tracing::debug!(vif = self.idx, "empty buffered eap frame");
        } else {
            tracing::debug!(vif = self.idx, len = eap.len(), "delivering buffered eap");
            eap.deliver();
        }
    }
}
