//! WID (Wireless ID) attributes: the typed key/value vocabulary of the
//! host-to-firmware configuration protocol.

pub mod frame;
pub mod records;

use std::fmt;

/// Numeric attribute code. The high nibble encodes the wire class.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WidId(pub u16);

impl WidId {
    // char WIDs
    pub const CURRENT_CHANNEL: WidId = WidId(0x0002);
    pub const SCAN_TYPE: WidId = WidId(0x0007);
    pub const POWER_MANAGEMENT: WidId = WidId(0x000B);
    pub const MODE_11I: WidId = WidId(0x000C);
    pub const AUTH_TYPE: WidId = WidId(0x000D);
    pub const DISCONNECT: WidId = WidId(0x0016);
    pub const START_SCAN_REQ: WidId = WidId(0x001E);
    pub const RSSI: WidId = WidId(0x001F);
    pub const LINKSPEED: WidId = WidId(0x0026);
    pub const ABORT_RUNNING_SCAN: WidId = WidId(0x003E);
    pub const TX_POWER: WidId = WidId(0x003F);
    pub const WOWLAN_TRIGGER: WidId = WidId(0x00C0);
    pub const SET_MFP: WidId = WidId(0x00D0);
    pub const DEL_BEACON: WidId = WidId(0x00E0);

    // short WIDs
    pub const RTS_THRESHOLD: WidId = WidId(0x1000);
    pub const FRAG_THRESHOLD: WidId = WidId(0x1001);
    pub const SHORT_RETRY_LIMIT: WidId = WidId(0x1002);
    pub const LONG_RETRY_LIMIT: WidId = WidId(0x1003);
    pub const PASSIVE_SCAN_TIME: WidId = WidId(0x100D);

    // int WIDs
    pub const FAILED_COUNT: WidId = WidId(0x2000);
    pub const RECEIVED_FRAGMENT_COUNT: WidId = WidId(0x2005);
    pub const SUCCESS_FRAME_COUNT: WidId = WidId(0x2008);
    pub const GET_INACTIVE_TIME: WidId = WidId(0x2084);

    // string WIDs
    pub const MAC_ADDR: WidId = WidId(0x300C);
    pub const SET_STA_MAC_INACTIVE_TIME: WidId = WidId(0x3017);
    pub const ADD_PTK: WidId = WidId(0x301B);
    pub const ADD_RX_GTK: WidId = WidId(0x301C);
    pub const ASSOC_RES_INFO: WidId = WidId(0x3020);
    pub const ADD_IGTK: WidId = WidId(0x3022);
    pub const PMKID_INFO: WidId = WidId(0x3082);
    pub const REGISTER_FRAME: WidId = WidId(0x3084);
    pub const DEL_ALL_STA: WidId = WidId(0x3085);
    pub const SET_DRV_HANDLER: WidId = WidId(0x3086);
    pub const REMAIN_ON_CHAN: WidId = WidId(0x3996);
    pub const SSID_PROBE_REQ: WidId = WidId(0x3997);
    pub const JOIN_REQ_EXTENDED: WidId = WidId(0x3998);

    // binary WIDs
    pub const SCAN_CHANNEL_LIST: WidId = WidId(0x4084);
    pub const INFO_ELEMENT_PROBE: WidId = WidId(0x4085);
    pub const INFO_ELEMENT_ASSOCIATE: WidId = WidId(0x4086);
    pub const ADD_STA: WidId = WidId(0x4087);
    pub const REMOVE_STA: WidId = WidId(0x4088);
    pub const EDIT_STA: WidId = WidId(0x4089);
    pub const ADD_BEACON: WidId = WidId(0x408A);
    pub const SETUP_MULTICAST_FILTER: WidId = WidId(0x408B);
    pub const ANTENNA_SELECTION: WidId = WidId(0x408C);
    pub const EXTERNAL_AUTH_PARAM: WidId = WidId(0x408D);

    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Wire class taken from the id's high nibble.
    pub fn class(self) -> Option<WidClass> {
        match self.0 >> 12 {
            0 => Some(WidClass::Char),
            1 => Some(WidClass::Short),
            2 => Some(WidClass::Int),
            3 => Some(WidClass::Str),
            4 => Some(WidClass::Bin),
            _ => None,
        }
    }
}

impl fmt::Debug for WidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WID({:#06x})", self.0)
    }
}

/// How an attribute is laid out inside a config frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidClass {
    Char,
    Short,
    Int,
    Str,
    Bin,
}

/// Declared value type of a WID descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidType {
    Char,
    Short,
    Int,
    Str,
    BinData,
    Bin,
}

/// One attribute in a dispatch list.
///
/// For SET the value holds the encoded payload. For GET it is pre-sized to the
/// largest acceptable response and the transport shrinks it to the returned length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wid {
    pub id: WidId,
    pub ty: WidType,
    pub val: Vec<u8>,
}

impl Wid {
    pub fn char(id: WidId, v: u8) -> Self {
        Self { id, ty: WidType::Char, val: vec![v] }
    }

    pub fn short(id: WidId, v: u16) -> Self {
        Self { id, ty: WidType::Short, val: v.to_le_bytes().to_vec() }
    }

    pub fn int(id: WidId, v: u32) -> Self {
        Self { id, ty: WidType::Int, val: v.to_le_bytes().to_vec() }
    }

    pub fn string(id: WidId, val: Vec<u8>) -> Self {
        Self { id, ty: WidType::Str, val }
    }

    pub fn bin(id: WidId, val: Vec<u8>) -> Self {
        Self { id, ty: WidType::Bin, val }
    }

    pub fn bin_data(id: WidId, val: Vec<u8>) -> Self {
        Self { id, ty: WidType::BinData, val }
    }

    /// GET descriptor with room for `capacity` response bytes.
    pub fn query(id: WidId, ty: WidType, capacity: usize) -> Self {
        Self { id, ty, val: vec![0; capacity] }
    }

    pub fn size(&self) -> usize {
        self.val.len()
    }

    /// Copies a GET response in, truncated to the descriptor's capacity.
    pub fn fill(&mut self, data: &[u8]) {
        let n = data.len().min(self.val.len());
        self.val.clear();
        self.val.extend_from_slice(&data[..n]);
    }

    pub fn as_u8(&self) -> Option<u8> {
        self.val.first().copied()
    }

    pub fn as_i8(&self) -> Option<i8> {
        self.as_u8().map(|v| v as i8)
    }

    pub fn as_u16(&self) -> Option<u16> {
        let bytes: [u8; 2] = self.val.get(..2)?.try_into().ok()?;
        Some(u16::from_le_bytes(bytes))
    }

    pub fn as_u32(&self) -> Option<u32> {
        let bytes: [u8; 4] = self.val.get(..4)?.try_into().ok()?;
        Some(u32::from_le_bytes(bytes))
    }
}
