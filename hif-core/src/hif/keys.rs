use super::{HifState, OpMode, Vif};
use crate::Result;
use crate::wid::records::{
    ETH_ALEN, KeyMaterial, Pmkid, ZERO_ADDR, encode_ap_ptk, encode_gtk, encode_igtk,
    encode_pmkid_list, encode_sta_ptk,
};
use crate::wid::{Wid, WidId};

impl Vif {
    /// Installs a pairwise key. In AP roles the cipher mode goes along with it.
    pub async fn add_ptk(
        &self,
        key: &KeyMaterial<'_>,
        mac: &[u8; ETH_ALEN],
        mode: OpMode,
        cipher_mode: u8,
        index: u8,
    ) -> Result<()> {
        let res = if mode.is_ap() {
            let record = encode_ap_ptk(mac, index, key)?;
            self.set_wids(&mut [
                Wid::char(WidId::MODE_11I, cipher_mode),
                Wid::string(WidId::ADD_PTK, record),
            ])
            .await
        } else {
            let record = encode_sta_ptk(mac, key)?;
            self.set_wids(&mut [Wid::string(WidId::ADD_PTK, record)]).await
        };
        res.inspect_err(|e| tracing::error!(vif = self.idx, ?mode, "failed to add ptk: {}", e))
    }

    pub async fn add_igtk(&self, igtk: &[u8], pn: &[u8], index: u8) -> Result<()> {
        let record = encode_igtk(index, pn, igtk)?;
        self.set_wids(&mut [Wid::string(WidId::ADD_IGTK, record)])
            .await
            .inspect_err(|e| tracing::error!(vif = self.idx, "failed to add igtk: {}", e))
    }

    /// Installs a group key. A connected station keys it to its BSS.
    pub async fn add_rx_gtk(
        &self,
        key: &KeyMaterial<'_>,
        index: u8,
        rsc: Option<&[u8]>,
        mode: OpMode,
        cipher_mode: u8,
    ) -> Result<()> {
        let mac = if mode.is_ap() {
            ZERO_ADDR
        } else {
            let slot = self.drv.lock().await;
            slot.as_ref()
                .filter(|d| d.state() == HifState::Connected)
                .map_or(ZERO_ADDR, |d| d.assoc_bssid)
        };
        let record = encode_gtk(&mac, rsc, index, key)?;

        let res = if mode.is_ap() {
            self.set_wids(&mut [
                Wid::char(WidId::MODE_11I, cipher_mode),
                Wid::string(WidId::ADD_RX_GTK, record),
            ])
            .await
        } else {
            self.set_wids(&mut [Wid::string(WidId::ADD_RX_GTK, record)]).await
        };
        res.inspect_err(|e| tracing::error!(vif = self.idx, ?mode, "failed to add rx gtk: {}", e))
    }

    pub async fn set_pmkid_info(&self, pmkids: &[Pmkid]) -> Result<()> {
        let record = encode_pmkid_list(pmkids)?;
        self.set_wids(&mut [Wid::string(WidId::PMKID_INFO, record)]).await
    }
}
