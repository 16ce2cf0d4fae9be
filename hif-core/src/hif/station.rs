//! AP-side beacon and associated-station management.

use super::Vif;
use super::task::TaskBody;
use crate::Result;
use crate::wid::records::{BROADCAST_ADDR, ETH_ALEN, StationParams, encode_beacon, encode_del_all_sta};
use crate::wid::{Wid, WidId};

impl Vif {
    pub async fn add_beacon(&self, interval: u32, dtim_period: u32, head: &[u8], tail: &[u8]) -> Result<()> {
        let record = encode_beacon(interval, dtim_period, head, tail)?;
        tracing::debug!(vif = self.idx, interval, dtim_period, "adding beacon");
        self.set_wids(&mut [Wid::bin(WidId::ADD_BEACON, record)])
            .await
            .inspect_err(|e| tracing::error!(vif = self.idx, "failed to add beacon: {}", e))
    }

    pub async fn del_beacon(&self) -> Result<()> {
        self.set_wids(&mut [Wid::char(WidId::DEL_BEACON, 0)])
            .await
            .inspect_err(|e| tracing::error!(vif = self.idx, "failed to delete beacon: {}", e))
    }

    pub fn add_station(&self, params: StationParams) -> Result<()> {
        self.submit(TaskBody::AddStation(params))
    }

    pub fn edit_station(&self, params: StationParams) -> Result<()> {
        self.submit(TaskBody::EditStation(params))
    }

    pub(super) async fn handle_add_station(&self, params: &StationParams) -> Result<()> {
        let record = params.encode()?;
        self.set_wids(&mut [Wid::bin(WidId::ADD_STA, record)])
            .await
            .inspect_err(|e| tracing::error!(vif = self.idx, "failed to add station: {}", e))
    }

    pub(super) async fn handle_edit_station(&self, params: &StationParams) -> Result<()> {
        let record = params.encode()?;
        self.set_wids(&mut [Wid::bin(WidId::EDIT_STA, record)])
            .await
            .inspect_err(|e| tracing::error!(vif = self.idx, "failed to edit station: {}", e))
    }

    /// Kicks one station, or every station when `mac` is `None`.
    pub async fn del_station(&self, mac: Option<&[u8; ETH_ALEN]>) -> Result<()> {
        let mac = mac.copied().unwrap_or(BROADCAST_ADDR);
        self.set_wids(&mut [Wid::bin(WidId::REMOVE_STA, mac.to_vec())])
            .await
            .inspect_err(|e| tracing::error!(vif = self.idx, "failed to delete station: {}", e))
    }

    /// Deauthenticates the listed stations. Zero entries are skipped.
    pub async fn del_allstation(&self, macs: &[[u8; ETH_ALEN]]) -> Result<()> {
        let Some(record) = encode_del_all_sta(macs) else {
            tracing::debug!(vif = self.idx, "no associated stations to delete");
            return Ok(());
        };
        self.set_wids(&mut [Wid::string(WidId::DEL_ALL_STA, record)])
            .await
            .inspect_err(|e| tracing::error!(vif = self.idx, "failed to delete all stations: {}", e))
    }
}
