//! 802.11 information-element walking.
//! 解析 beacon / probe response 中的信息元素 (IE)。

pub const WLAN_EID_SSID: u8 = 0;
pub const WLAN_EID_SUPP_RATES: u8 = 1;
pub const WLAN_EID_DS_PARAMS: u8 = 3;
pub const WLAN_EID_TIM: u8 = 5;
pub const WLAN_EID_HT_CAPABILITY: u8 = 45;
pub const WLAN_EID_RSN: u8 = 48;
pub const WLAN_EID_EXT_SUPP_RATES: u8 = 50;
pub const WLAN_EID_VENDOR_SPECIFIC: u8 = 221;

pub const OUI_MICROSOFT: u32 = 0x0050F2;
pub const OUI_TYPE_MICROSOFT_WPA: u8 = 1;
pub const OUI_TYPE_MICROSOFT_WMM: u8 = 2;
pub const OUI_WFA: u32 = 0x506F9A;
pub const OUI_TYPE_WFA_P2P: u8 = 9;

pub const P2P_ATTR_NOA: u8 = 12;

/// 802.11 frame-control subtypes the scan path accepts.
pub const FCTL_STYPE_MASK: u16 = 0x00FC;
pub const STYPE_PROBE_RESP: u16 = 0x0050;
pub const STYPE_BEACON: u16 = 0x0080;
pub const STYPE_AUTH: u16 = 0x00B0;
pub const STYPE_ACTION: u16 = 0x00D0;
pub const STYPE_PROBE_REQ: u16 = 0x0040;

/// Header plus timestamp, beacon interval and capability.
pub const BEACON_IES_OFFSET: usize = 24 + 8 + 2 + 2;

/// Iterator over `(id, body)` pairs; stops at the first truncated element.
pub struct Elements<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Elements<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.len() < 2 {
            return None;
        }
        let id = self.rest[0];
        let len = self.rest[1] as usize;
        if self.rest.len() < 2 + len {
            self.rest = &[];
            return None;
        }
        let body = &self.rest[2..2 + len];
        self.rest = &self.rest[2 + len..];
        Some((id, body))
    }
}

pub fn elements(ies: &[u8]) -> Elements<'_> {
    Elements { rest: ies }
}

/// Body of the first element with the given id.
pub fn find_ie(eid: u8, ies: &[u8]) -> Option<&[u8]> {
    elements(ies).find(|(id, _)| *id == eid).map(|(_, body)| body)
}

/// Body (after OUI and type) of the first matching vendor element.
pub fn find_vendor_ie(oui: u32, oui_type: u8, ies: &[u8]) -> Option<&[u8]> {
    let want = [(oui >> 16) as u8, (oui >> 8) as u8, oui as u8, oui_type];
    elements(ies)
        .filter(|(id, _)| *id == WLAN_EID_VENDOR_SPECIFIC)
        .find(|(_, body)| body.len() >= 4 && body[..4] == want)
        .map(|(_, body)| &body[4..])
}

/// Looks up a P2P attribute across every P2P vendor element, which may be
/// split over several elements.
pub fn find_p2p_attr(ies: &[u8], attr_id: u8) -> Option<Vec<u8>> {
    let want = [(OUI_WFA >> 16) as u8, (OUI_WFA >> 8) as u8, OUI_WFA as u8, OUI_TYPE_WFA_P2P];
    let stream: Vec<u8> = elements(ies)
        .filter(|(id, body)| {
            *id == WLAN_EID_VENDOR_SPECIFIC && body.len() >= 4 && body[..4] == want
        })
        .flat_map(|(_, body)| body[4..].iter().copied())
        .collect();

    let mut rest = stream.as_slice();
    while rest.len() >= 3 {
        let id = rest[0];
        let len = u16::from_le_bytes([rest[1], rest[2]]) as usize;
        if rest.len() < 3 + len {
            return None;
        }
        if id == attr_id {
            return Some(rest[3..3 + len].to_vec());
        }
        rest = &rest[3 + len..];
    }
    None
}

/// 2.4/5 GHz centre frequency to channel number.
pub fn frequency_to_channel(freq_mhz: u32) -> Option<u8> {
    match freq_mhz {
        2484 => Some(14),
        2412..=2472 => Some(((freq_mhz - 2407) / 5) as u8),
        5000..=5895 => Some(((freq_mhz - 5000) / 5) as u8),
        _ => None,
    }
}
