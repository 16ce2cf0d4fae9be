//! Builds the join-request record from a scanned BSS.

use crate::ie::{self, find_ie, find_p2p_attr, find_vendor_ie};
use crate::wid::records::{ETH_ALEN, JoinBssParam, MAX_RATES_SUPPORTED, MAX_SSID_LEN, NoaSchedule};

pub const BSS_TYPE_INFRA: u8 = 0;

const OPPPS_ENABLE_BIT: u8 = 0x80;
const WMM_QOS_UAPSD: u8 = 0x80;

/// What the configuration layer knows about the target BSS.
#[derive(Debug, Clone, Default)]
pub struct BssInfo<'a> {
    pub bssid: [u8; ETH_ALEN],
    pub center_freq: u32,
    pub beacon_interval: u16,
    pub capability: u16,
    pub tsf: u64,
    pub ies: &'a [u8],
}

/// Cipher/AKM selection for the join. Suite selectors keep only their low byte on the wire.
#[derive(Debug, Clone, Default)]
pub struct CryptoSettings {
    pub cipher_group: u32,
    pub ciphers_pairwise: Vec<u32>,
    pub akm_suites: Vec<u32>,
}

pub fn parse_join_bss_param(bss: &BssInfo<'_>, crypto: &CryptoSettings) -> JoinBssParam {
    let ies = bss.ies;
    let mut param = JoinBssParam {
        bss_type: BSS_TYPE_INFRA,
        ch: ie::frequency_to_channel(bss.center_freq).unwrap_or_default(),
        cap_info: bss.capability,
        bssid: bss.bssid,
        beacon_period: bss.beacon_interval,
        p_suites: [0xFF; 3],
        akm_suites: [0xFF; 3],
        ..Default::default()
    };

    if let Some(ssid) = find_ie(ie::WLAN_EID_SSID, ies) {
        if ssid.len() <= MAX_SSID_LEN {
            param.ssid = ssid.to_vec();
        }
    }

    if let Some(tim) = find_ie(ie::WLAN_EID_TIM, ies) {
        if tim.len() >= 2 {
            param.dtim_period = tim[1];
        }
    }

    let mut rates = Vec::with_capacity(MAX_RATES_SUPPORTED);
    for eid in [ie::WLAN_EID_SUPP_RATES, ie::WLAN_EID_EXT_SUPP_RATES] {
        if let Some(body) = find_ie(eid, ies) {
            let room = MAX_RATES_SUPPORTED - rates.len();
            rates.extend_from_slice(&body[..body.len().min(room)]);
        }
    }
    param.supp_rates = rates;

    param.ht_capable = find_ie(ie::WLAN_EID_HT_CAPABILITY, ies).is_some();

    if let Some(noa) = find_p2p_attr(ies, ie::P2P_ATTR_NOA).as_deref().and_then(parse_noa) {
        param.tsf_lo = bss.tsf as u32;
        param.noa = Some(noa);
    }

    if let Some(wmm) = find_vendor_ie(ie::OUI_MICROSOFT, ie::OUI_TYPE_MICROSOFT_WMM, ies) {
        // subtype, version, qos_info
        if wmm.len() >= 3 && wmm[0] <= 1 && wmm[1] == 1 {
            param.wmm_cap = true;
            param.uapsd_cap = wmm[2] & WMM_QOS_UAPSD != 0;
        }
    }

    if find_vendor_ie(ie::OUI_MICROSOFT, ie::OUI_TYPE_MICROSOFT_WPA, ies).is_some() {
        param.mode_802_11i = 1;
        param.rsn_found = true;
    }

    if let Some(rsn) = find_ie(ie::WLAN_EID_RSN, ies) {
        param.mode_802_11i = 2;
        param.rsn_found = true;
        if let Some(cap) = rsn_capabilities(rsn) {
            param.rsn_cap = cap;
        }
    }

    if param.rsn_found {
        param.rsn_grp_policy = crypto.cipher_group as u8;
        for (slot, suite) in param.p_suites.iter_mut().zip(&crypto.ciphers_pairwise) {
            *slot = *suite as u8;
        }
        for (slot, suite) in param.akm_suites.iter_mut().zip(&crypto.akm_suites) {
            *slot = *suite as u8;
        }
    }

    param
}

/// Skips version, group cipher and the two counted suite lists.
fn rsn_capabilities(rsn: &[u8]) -> Option<[u8; 2]> {
    let mut offset = 6;
    for _ in 0..2 {
        let count = *rsn.get(offset)? as usize;
        offset += count * 4 + 2;
    }
    let cap = rsn.get(offset..offset + 2)?;
    Some([cap[0], cap[1]])
}

/// `index | oppps_ctwindow | (count, duration, interval, start)*`, first descriptor only.
fn parse_noa(attr: &[u8]) -> Option<NoaSchedule> {
    if attr.len() < 2 + 13 {
        return None;
    }
    let le32 = |at: usize| u32::from_le_bytes([attr[at], attr[at + 1], attr[at + 2], attr[at + 3]]);
    let ctwindow = attr[1];
    Some(NoaSchedule {
        index: attr[0],
        ct_window: (ctwindow & OPPPS_ENABLE_BIT != 0).then_some(ctwindow),
        count: attr[2],
        duration: le32(3),
        interval: le32(7),
        start_time: le32(11),
    })
}
