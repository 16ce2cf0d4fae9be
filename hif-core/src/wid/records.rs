//! Fixed binary records carried inside string/binary WIDs.
//!
//! Field order, padding and truncation here are what the firmware parses;
//! every multi-byte field is little-endian.

use crate::{Error, Result, try_buffer};

pub const ETH_ALEN: usize = 6;
pub const BROADCAST_ADDR: [u8; ETH_ALEN] = [0xFF; ETH_ALEN];
pub const ZERO_ADDR: [u8; ETH_ALEN] = [0; ETH_ALEN];

pub const MAX_SSID_LEN: usize = 32;
pub const MAX_NUM_PROBED_SSID: usize = 10;
pub const MAX_RATES_SUPPORTED: usize = 12;
pub const HT_CAP_LEN: usize = 26;
/// Station record size without its rate list.
pub const ADD_STA_LENGTH: usize = 40;
pub const MAX_NUM_PMKIDS: usize = 16;
pub const PMKID_LEN: usize = 16;
pub const MAX_NUM_STA: usize = 9;
pub const MAX_ASSOC_RESP_FRAME_SIZE: usize = 256;
pub const MIC_KEY_LEN: usize = 8;
pub const MAX_KEY_LEN: usize = 32;
pub const PN_LEN: usize = 6;
pub const RSC_LEN: usize = 8;
/// Parking channel the firmware is sent to when a listen period ends.
pub const FALSE_FRMWR_CHANNEL: u8 = 100;
pub const JOIN_BSS_PARAM_LEN: usize = 100;

pub const WLAN_STATUS_SUCCESS: u16 = 0;
pub const WLAN_STATUS_UNSPECIFIED_FAILURE: u16 = 1;

/// SSID list for `SSID_PROBE_REQ`: `[count, (len, bytes)*]`.
pub fn encode_ssid_list(ssids: &[Vec<u8>]) -> Result<Vec<u8>> {
    let ssids = &ssids[..ssids.len().min(MAX_NUM_PROBED_SSID)];
    let size = 1 + ssids
        .iter()
        .map(|s| s.len().min(MAX_SSID_LEN) + 1)
        .sum::<usize>();
    let mut buf = try_buffer(size, "ssid list")?;
    buf.push(ssids.len() as u8);
    for ssid in ssids {
        let ssid = &ssid[..ssid.len().min(MAX_SSID_LEN)];
        buf.push(ssid.len() as u8);
        buf.extend_from_slice(ssid);
    }
    Ok(buf)
}

/// Parameters for `ADD_STA` / `EDIT_STA`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StationParams {
    pub bssid: [u8; ETH_ALEN],
    pub aid: u16,
    /// Truncated to [`MAX_RATES_SUPPORTED`] when encoded.
    pub supported_rates: Vec<u8>,
    pub ht_capa: Option<[u8; HT_CAP_LEN]>,
    pub flags_mask: u16,
    pub flags_set: u16,
}

impl StationParams {
    /// `bssid | aid | n_rates | rates | ht_supported | ht_capa[26] | mask | set`
    pub fn encode(&self) -> Result<Vec<u8>> {
        let rates = &self.supported_rates[..self.supported_rates.len().min(MAX_RATES_SUPPORTED)];
        let mut buf = try_buffer(ADD_STA_LENGTH + rates.len(), "station record")?;
        buf.extend_from_slice(&self.bssid);
        buf.extend_from_slice(&self.aid.to_le_bytes());
        buf.push(rates.len() as u8);
        buf.extend_from_slice(rates);
        match &self.ht_capa {
            Some(capa) => {
                buf.push(1);
                buf.extend_from_slice(capa);
            }
            None => {
                buf.push(0);
                buf.extend_from_slice(&[0; HT_CAP_LEN]);
            }
        }
        buf.extend_from_slice(&self.flags_mask.to_le_bytes());
        buf.extend_from_slice(&self.flags_set.to_le_bytes());
        Ok(buf)
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let short = || Error::InvalidArgument(format!("station record of {} bytes", buf.len()));
        if buf.len() < ADD_STA_LENGTH {
            return Err(short());
        }
        let n_rates = buf[8] as usize;
        if buf.len() < ADD_STA_LENGTH + n_rates {
            return Err(short());
        }
        let mut bssid = [0; ETH_ALEN];
        bssid.copy_from_slice(&buf[..ETH_ALEN]);
        let rates_end = 9 + n_rates;
        let ht_supported = buf[rates_end] != 0;
        let mut capa = [0; HT_CAP_LEN];
        capa.copy_from_slice(&buf[rates_end + 1..rates_end + 1 + HT_CAP_LEN]);
        let flags = rates_end + 1 + HT_CAP_LEN;
        Ok(Self {
            bssid,
            aid: u16::from_le_bytes([buf[6], buf[7]]),
            supported_rates: buf[9..rates_end].to_vec(),
            ht_capa: ht_supported.then_some(capa),
            flags_mask: u16::from_le_bytes([buf[flags], buf[flags + 1]]),
            flags_set: u16::from_le_bytes([buf[flags + 2], buf[flags + 3]]),
        })
    }
}

/// Temporal key plus optional Michael MIC halves.
#[derive(Debug, Clone, Copy)]
pub struct KeyMaterial<'a> {
    pub key: &'a [u8],
    pub rx_mic: Option<&'a [u8; MIC_KEY_LEN]>,
    pub tx_mic: Option<&'a [u8; MIC_KEY_LEN]>,
}

impl<'a> KeyMaterial<'a> {
    pub fn new(key: &'a [u8]) -> Self {
        Self { key, rx_mic: None, tx_mic: None }
    }

    fn check(&self) -> Result<()> {
        if self.key.len() > MAX_KEY_LEN {
            return Err(Error::InvalidArgument(format!(
                "key of {} bytes exceeds {MAX_KEY_LEN}",
                self.key.len()
            )));
        }
        Ok(())
    }

    /// `key_len, key, rx_mic[8], tx_mic[8]`; absent MIC halves are zero.
    fn put_with_mic(&self, buf: &mut Vec<u8>) {
        buf.push((self.key.len() + 2 * MIC_KEY_LEN) as u8);
        buf.extend_from_slice(self.key);
        buf.extend_from_slice(self.rx_mic.map_or(&[0; MIC_KEY_LEN], |m| m));
        buf.extend_from_slice(self.tx_mic.map_or(&[0; MIC_KEY_LEN], |m| m));
    }

    fn wire_len(&self) -> usize {
        1 + self.key.len() + 2 * MIC_KEY_LEN
    }
}

/// Station-mode pairwise key: `mac | key_len | key`.
pub fn encode_sta_ptk(mac: &[u8; ETH_ALEN], key: &KeyMaterial<'_>) -> Result<Vec<u8>> {
    key.check()?;
    let mut buf = try_buffer(ETH_ALEN + key.wire_len(), "ptk record")?;
    buf.extend_from_slice(mac);
    key.put_with_mic(&mut buf);
    Ok(buf)
}

/// AP-mode pairwise key: `mac | index | key_len | key`.
pub fn encode_ap_ptk(mac: &[u8; ETH_ALEN], index: u8, key: &KeyMaterial<'_>) -> Result<Vec<u8>> {
    key.check()?;
    let mut buf = try_buffer(ETH_ALEN + 1 + key.wire_len(), "ptk record")?;
    buf.extend_from_slice(mac);
    buf.push(index);
    key.put_with_mic(&mut buf);
    Ok(buf)
}

/// Group key: `mac | rsc[8] | index | key_len | key`.
pub fn encode_gtk(
    mac: &[u8; ETH_ALEN],
    rsc: Option<&[u8]>,
    index: u8,
    key: &KeyMaterial<'_>,
) -> Result<Vec<u8>> {
    key.check()?;
    let mut buf = try_buffer(ETH_ALEN + RSC_LEN + 1 + key.wire_len(), "gtk record")?;
    buf.extend_from_slice(mac);
    let mut seq = [0u8; RSC_LEN];
    if let Some(rsc) = rsc {
        let n = rsc.len().min(RSC_LEN);
        seq[..n].copy_from_slice(&rsc[..n]);
    }
    buf.extend_from_slice(&seq);
    buf.push(index);
    key.put_with_mic(&mut buf);
    Ok(buf)
}

/// Management group key: `index | pn_len | pn[6] | key_len | key`.
pub fn encode_igtk(index: u8, pn: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    KeyMaterial::new(key).check()?;
    let pn = &pn[..pn.len().min(PN_LEN)];
    let mut buf = try_buffer(2 + PN_LEN + 1 + key.len(), "igtk record")?;
    buf.push(index);
    buf.push(pn.len() as u8);
    let mut padded = [0u8; PN_LEN];
    padded[..pn.len()].copy_from_slice(pn);
    buf.extend_from_slice(&padded);
    buf.push(key.len() as u8);
    buf.extend_from_slice(key);
    Ok(buf)
}

/// One cached PMKSA entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pmkid {
    pub bssid: [u8; ETH_ALEN],
    pub pmkid: [u8; PMKID_LEN],
}

/// `count | (bssid, pmkid)*`, at most [`MAX_NUM_PMKIDS`] entries.
pub fn encode_pmkid_list(list: &[Pmkid]) -> Result<Vec<u8>> {
    let list = &list[..list.len().min(MAX_NUM_PMKIDS)];
    let mut buf = try_buffer(1 + list.len() * (ETH_ALEN + PMKID_LEN), "pmkid list")?;
    buf.push(list.len() as u8);
    for entry in list {
        buf.extend_from_slice(&entry.bssid);
        buf.extend_from_slice(&entry.pmkid);
    }
    Ok(buf)
}

/// `interval | dtim | head_len | head | tail_len | tail`, lengths as LE32.
pub fn encode_beacon(interval: u32, dtim_period: u32, head: &[u8], tail: &[u8]) -> Result<Vec<u8>> {
    let mut buf = try_buffer(16 + head.len() + tail.len(), "beacon")?;
    buf.extend_from_slice(&interval.to_le_bytes());
    buf.extend_from_slice(&dtim_period.to_le_bytes());
    buf.extend_from_slice(&(head.len() as u32).to_le_bytes());
    buf.extend_from_slice(head);
    buf.extend_from_slice(&(tail.len() as u32).to_le_bytes());
    buf.extend_from_slice(tail);
    Ok(buf)
}

/// `enabled LE32 | count LE32 | macs`.
pub fn encode_multicast(enabled: bool, list: &[[u8; ETH_ALEN]]) -> Result<Vec<u8>> {
    let mut buf = try_buffer(8 + list.len() * ETH_ALEN, "multicast list")?;
    buf.extend_from_slice(&u32::from(enabled).to_le_bytes());
    buf.extend_from_slice(&(list.len() as u32).to_le_bytes());
    for mac in list {
        buf.extend_from_slice(mac);
    }
    Ok(buf)
}

/// `[count, macs]` with the zero entries skipped. `None` when nothing is left.
pub fn encode_del_all_sta(macs: &[[u8; ETH_ALEN]]) -> Option<Vec<u8>> {
    let live: Vec<&[u8; ETH_ALEN]> = macs
        .iter()
        .take(MAX_NUM_STA)
        .filter(|m| **m != ZERO_ADDR)
        .collect();
    if live.is_empty() {
        return None;
    }
    let mut buf = Vec::with_capacity(1 + live.len() * ETH_ALEN);
    buf.push(live.len() as u8);
    for mac in live {
        buf.extend_from_slice(mac);
    }
    Some(buf)
}

/// Remain-on-channel toggle: `[enable, channel]`.
pub fn encode_remain_on_channel(enable: bool, channel: u8) -> Vec<u8> {
    vec![u8::from(enable), channel]
}

/// Driver handler: `index LE32 | ifc_id | mode << 1`.
pub fn encode_drv_handler(index: u32, mode: u8, ifc_id: u8) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5);
    buf.extend_from_slice(&index.to_le_bytes());
    buf.push(ifc_id | (mode << 1));
    buf
}

/// Management-frame registration: `reg | reg_id | frame_type LE16`.
pub fn encode_reg_frame(reg: bool, reg_id: u8, frame_type: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4);
    buf.push(u8::from(reg));
    buf.push(reg_id);
    buf.extend_from_slice(&frame_type.to_le_bytes());
    buf
}

/// External-auth parameters handed to firmware once SAE finishes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExternalAuthParams {
    pub action: u8,
    pub bssid: [u8; ETH_ALEN],
    pub ssid: Vec<u8>,
    pub key_mgmt_suite: u32,
    pub status: u16,
}

impl ExternalAuthParams {
    /// `action | bssid | ssid[32] | ssid_len | key_mgmt LE32 | status LE16`
    pub fn encode(&self) -> Vec<u8> {
        let ssid = &self.ssid[..self.ssid.len().min(MAX_SSID_LEN)];
        let mut buf = Vec::with_capacity(1 + ETH_ALEN + MAX_SSID_LEN + 1 + 6);
        buf.push(self.action);
        buf.extend_from_slice(&self.bssid);
        let mut padded = [0u8; MAX_SSID_LEN];
        padded[..ssid.len()].copy_from_slice(ssid);
        buf.extend_from_slice(&padded);
        buf.push(ssid.len() as u8);
        buf.extend_from_slice(&self.key_mgmt_suite.to_le_bytes());
        buf.extend_from_slice(&self.status.to_le_bytes());
        buf
    }
}

/// Antenna selection: `mode | ant1 | ant2 | gpio_mode`.
pub fn encode_antenna(mode: u8, antenna1: u8, antenna2: u8, gpio_mode: u8) -> Vec<u8> {
    vec![mode, antenna1, antenna2, gpio_mode]
}

/// Parsed head of the association response: `capab LE16 | status LE16 | aid LE16 | ies`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssocResp<'a> {
    pub capability: u16,
    pub status: u16,
    pub aid: u16,
    pub ies: &'a [u8],
}

impl<'a> AssocResp<'a> {
    pub fn parse(buf: &'a [u8]) -> Option<Self> {
        if buf.len() < 6 {
            return None;
        }
        Some(Self {
            capability: u16::from_le_bytes([buf[0], buf[1]]),
            status: u16::from_le_bytes([buf[2], buf[3]]),
            aid: u16::from_le_bytes([buf[4], buf[5]]),
            ies: &buf[6..],
        })
    }
}

/// Notice-of-absence schedule copied from a P2P GO's beacon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NoaSchedule {
    pub index: u8,
    /// CT window when opportunistic power save is on.
    pub ct_window: Option<u8>,
    pub count: u8,
    pub duration: u32,
    pub interval: u32,
    pub start_time: u32,
}

/// The join-request-extended record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JoinBssParam {
    pub ssid: Vec<u8>,
    pub bss_type: u8,
    pub ch: u8,
    pub cap_info: u16,
    pub bssid: [u8; ETH_ALEN],
    pub beacon_period: u16,
    pub dtim_period: u8,
    /// Truncated to [`MAX_RATES_SUPPORTED`].
    pub supp_rates: Vec<u8>,
    pub wmm_cap: bool,
    pub uapsd_cap: bool,
    pub ht_capable: bool,
    pub rsn_found: bool,
    pub rsn_grp_policy: u8,
    pub mode_802_11i: u8,
    pub p_suites: [u8; 3],
    pub akm_suites: [u8; 3],
    pub rsn_cap: [u8; 2],
    pub tsf_lo: u32,
    pub noa: Option<NoaSchedule>,
}

impl JoinBssParam {
    pub fn to_bytes(&self) -> [u8; JOIN_BSS_PARAM_LEN] {
        let mut out = [0u8; JOIN_BSS_PARAM_LEN];
        let ssid = &self.ssid[..self.ssid.len().min(MAX_SSID_LEN)];
        out[..ssid.len()].copy_from_slice(ssid);
        // out[32] is the ssid terminator
        out[33] = self.bss_type;
        out[34] = self.ch;
        out[35..37].copy_from_slice(&self.cap_info.to_le_bytes());
        // out[37..43] is the unused source address
        out[43..49].copy_from_slice(&self.bssid);
        out[49..51].copy_from_slice(&self.beacon_period.to_le_bytes());
        out[51] = self.dtim_period;
        let rates = &self.supp_rates[..self.supp_rates.len().min(MAX_RATES_SUPPORTED)];
        out[52] = rates.len() as u8;
        out[53..53 + rates.len()].copy_from_slice(rates);
        out[65] = u8::from(self.wmm_cap);
        out[66] = u8::from(self.uapsd_cap);
        out[67] = u8::from(self.ht_capable);
        out[68] = u8::from(self.rsn_found);
        out[69] = self.rsn_grp_policy;
        out[70] = self.mode_802_11i;
        out[71..74].copy_from_slice(&self.p_suites);
        out[74..77].copy_from_slice(&self.akm_suites);
        out[77..79].copy_from_slice(&self.rsn_cap);
        if let Some(noa) = &self.noa {
            out[79] = 1;
            out[80..84].copy_from_slice(&self.tsf_lo.to_le_bytes());
            out[84] = noa.index;
            let mut at = 86;
            if let Some(ct_window) = noa.ct_window {
                out[85] = 1;
                out[at] = ct_window;
                at += 1;
            }
            out[at] = noa.count;
            out[at + 1..at + 5].copy_from_slice(&noa.duration.to_le_bytes());
            out[at + 5..at + 9].copy_from_slice(&noa.interval.to_le_bytes());
            out[at + 9..at + 13].copy_from_slice(&noa.start_time.to_le_bytes());
        }
        out
    }
}
