use serde::Deserialize;
use std::time::Duration;

/// Chip variant; decides which GPIOs may drive the antenna switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chip {
    #[default]
    Wilc1000,
    Wilc3000,
}

impl Chip {
    pub fn is_valid_gpio(self, gpio: u8) -> bool {
        match self {
            Chip::Wilc1000 => matches!(gpio, 0 | 1 | 4 | 6),
            Chip::Wilc3000 => matches!(gpio, 0 | 3 | 4 | 17..=20),
        }
    }
}

/// 天线切换模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AntennaSwitchMode {
    #[default]
    Invalid,
    Single,
    Dual,
}

impl AntennaSwitchMode {
    pub fn wire_value(self) -> u8 {
        match self {
            AntennaSwitchMode::Invalid => 0,
            AntennaSwitchMode::Single => 1,
            AntennaSwitchMode::Dual => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AntennaConfig {
    pub mode: AntennaSwitchMode,
    pub gpio1: u8,
    pub gpio2: u8,
}

/// Runtime settings of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HifConfig {
    pub scan_timeout: Duration,
    pub connect_timeout: Duration,
    pub stats_period: Duration,
    pub max_interfaces: u8,
    pub chip: Chip,
    pub antenna: AntennaConfig,
}

impl Default for HifConfig {
    fn default() -> Self {
        Self {
            scan_timeout: Duration::from_millis(5000),
            connect_timeout: Duration::from_millis(9500),
            stats_period: Duration::from_millis(5000),
            max_interfaces: 2,
            chip: Chip::Wilc1000,
            antenna: AntennaConfig::default(),
        }
    }
}

#[derive(Deserialize, Default)]
struct AntennaConfigFile {
    mode: Option<AntennaSwitchMode>,
    gpio1: Option<u8>,
    gpio2: Option<u8>,
}

#[derive(Deserialize, Default)]
struct HifConfigFile {
    scan_timeout_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    stats_period_ms: Option<u64>,
    max_interfaces: Option<u8>,
    chip: Option<Chip>,
    #[serde(default)]
    antenna: AntennaConfigFile,
}

impl From<HifConfigFile> for HifConfig {
    fn from(t: HifConfigFile) -> Self {
        let base = HifConfig::default();
        HifConfig {
            scan_timeout: t.scan_timeout_ms.map_or(base.scan_timeout, Duration::from_millis),
            connect_timeout: t
                .connect_timeout_ms
                .map_or(base.connect_timeout, Duration::from_millis),
            stats_period: t.stats_period_ms.map_or(base.stats_period, Duration::from_millis),
            max_interfaces: t.max_interfaces.unwrap_or(base.max_interfaces).max(1),
            chip: t.chip.unwrap_or(base.chip),
            antenna: AntennaConfig {
                mode: t.antenna.mode.unwrap_or_default(),
                gpio1: t.antenna.gpio1.unwrap_or_default(),
                gpio2: t.antenna.gpio2.unwrap_or_default(),
            },
        }
    }
}

pub fn load_config_from_toml_str(s: &str) -> crate::Result<HifConfig> {
    let parsed: HifConfigFile = toml::from_str(s)?;
    Ok(HifConfig::from(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(load_config_from_toml_str("").unwrap(), HifConfig::default());
    }

    #[test]
    fn reads_every_key() {
        let cfg = load_config_from_toml_str(
            r#"
            scan_timeout_ms = 3000
            connect_timeout_ms = 8000
            stats_period_ms = 1000
            max_interfaces = 3
            chip = "wilc3000"

            [antenna]
            mode = "dual"
            gpio1 = 17
            gpio2 = 18
            "#,
        )
        .unwrap();
        assert_eq!(cfg.scan_timeout, Duration::from_secs(3));
        assert_eq!(cfg.connect_timeout, Duration::from_secs(8));
        assert_eq!(cfg.stats_period, Duration::from_secs(1));
        assert_eq!(cfg.max_interfaces, 3);
        assert_eq!(cfg.chip, Chip::Wilc3000);
        assert_eq!(cfg.antenna.mode, AntennaSwitchMode::Dual);
        assert_eq!((cfg.antenna.gpio1, cfg.antenna.gpio2), (17, 18));
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        assert!(matches!(
            load_config_from_toml_str("chip = \"wilc9000\""),
            Err(crate::Error::Config(_))
        ));
    }

    #[test]
    fn gpio_rules_per_chip() {
        assert!(Chip::Wilc1000.is_valid_gpio(6));
        assert!(!Chip::Wilc1000.is_valid_gpio(3));
        assert!(Chip::Wilc3000.is_valid_gpio(19));
        assert!(!Chip::Wilc3000.is_valid_gpio(1));
    }
}
