use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::LauncherError;
use crate::request::{LaunchRequest, Role};

/// Every tunable of the launcher. Defaults match a stock Raspberry Pi EVK.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub debug: DebugConfig,
    pub spi: SpiConfig,
    pub rf: RfConfig,
    pub mac: MacConfig,
    pub power: PowerConfig,
    pub network: NetworkConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    pub model: u32,
    /// Run the clock script that pins the Pi at its maximum CPU clock.
    pub max_cpuclock: bool,
    pub fw_download: bool,
    pub fw_name: String,
    /// Board data file; empty selects `nrc<model>_bd.dat`.
    pub bd_name: String,
    pub use_eeprom_config: bool,
    pub use_sudo: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            model: 7394,
            max_cpuclock: true,
            fw_download: true,
            fw_name: "uni_s1g.bin".to_string(),
            bd_name: String::new(),
            use_eeprom_config: false,
            use_sudo: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    pub driver: bool,
    pub flow_control: bool,
    pub supplicant: bool,
    pub hostapd: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpiConfig {
    pub clock: u32,
    pub bus_num: u8,
    pub cs_num: u8,
    pub gpio_irq: i32,
    pub polling_interval: i32,
    /// 0 disables the FT232H USB-SPI bridge, 1 uses it with GPIO interrupts,
    /// any other value uses it in polling mode.
    pub ft232h_usb_spi: u8,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            clock: 20_000_000,
            bus_num: 0,
            cs_num: 0,
            gpio_irq: 5,
            polling_interval: 0,
            ft232h_usb_spi: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GuardInterval {
    Auto,
    Long,
    Short,
}

impl fmt::Display for GuardInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GuardInterval::Auto => "auto",
            GuardInterval::Long => "long",
            GuardInterval::Short => "short",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RfConfig {
    /// dBm
    pub max_txpwr: u32,
    pub guard_interval: GuardInterval,
    pub cca_threshold: i32,
    pub duty_cycle_enable: bool,
    pub duty_cycle_window: u32,
    pub duty_cycle_duration: u32,
}

impl Default for RfConfig {
    fn default() -> Self {
        Self {
            max_txpwr: 24,
            guard_interval: GuardInterval::Auto,
            cca_threshold: -75,
            duty_cycle_enable: false,
            duty_cycle_window: 0,
            duty_cycle_duration: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AmpduMode {
    Off,
    Manual,
    Auto,
}

impl AmpduMode {
    pub fn driver_value(self) -> u8 {
        match self {
            AmpduMode::Off => 0,
            AmpduMode::Manual => 1,
            AmpduMode::Auto => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AmpduMode::Off => "OFF",
            AmpduMode::Manual => "MANUAL",
            AmpduMode::Auto => "AUTO",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthControlConfig {
    pub enable: bool,
    pub slot: u32,
    pub scale: u32,
    pub ti_min: u32,
    pub ti_max: u32,
}

impl Default for AuthControlConfig {
    fn default() -> Self {
        Self {
            enable: false,
            slot: 100,
            scale: 10,
            ti_min: 8,
            ti_max: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MacConfig {
    pub short_bcn_enable: bool,
    pub legacy_ack_enable: bool,
    pub beacon_bypass_enable: bool,
    pub ampdu: AmpduMode,
    pub ndp_ack_1m: bool,
    pub ndp_preq: bool,
    pub cqm_enable: bool,
    pub sw_enc: u8,
    pub discard_deauth: bool,
    pub bitmap_encoding: bool,
    pub reverse_scrambler: bool,
    /// STA only; off restricts the station to 1/2 MHz channels.
    pub support_ch_width: bool,
    pub auth_control: AuthControlConfig,
}

impl Default for MacConfig {
    fn default() -> Self {
        Self {
            short_bcn_enable: false,
            legacy_ack_enable: false,
            beacon_bypass_enable: false,
            ampdu: AmpduMode::Auto,
            ndp_ack_1m: false,
            ndp_preq: false,
            cqm_enable: true,
            sw_enc: 0,
            discard_deauth: false,
            bitmap_encoding: true,
            reverse_scrambler: true,
            support_ch_width: true,
            auth_control: AuthControlConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PowerSave {
    AlwaysOn,
    /// Deep sleep, woken by the TIM.
    Tim,
    /// Deep sleep for a fixed duration, ignoring the TIM.
    NonTim,
}

impl PowerSave {
    pub fn driver_value(self) -> u8 {
        match self {
            PowerSave::AlwaysOn => 0,
            PowerSave::Tim => 2,
            PowerSave::NonTim => 3,
        }
    }

    pub fn is_enabled(self) -> bool {
        self != PowerSave::AlwaysOn
    }

    pub fn name(self) -> &'static str {
        match self {
            PowerSave::AlwaysOn => "Always On",
            PowerSave::Tim => "Deep Sleep (TIM)",
            PowerSave::NonTim => "Deep Sleep (nonTIM)",
        }
    }
}

/// A sleep period such as `3s` or `10m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepDuration {
    pub value: u32,
    pub minutes: bool,
}

impl SleepDuration {
    pub fn parse(s: &str) -> Result<Self, LauncherError> {
        let invalid = || {
            LauncherError::InvalidSetting(format!(
                "sleep_duration '{}' must look like '3s' or '10m'",
                s
            ))
        };
        let s = s.trim();
        let (digits, minutes) = if let Some(d) = s.strip_suffix('m') {
            (d, true)
        } else if let Some(d) = s.strip_suffix('s') {
            (d, false)
        } else {
            return Err(invalid());
        };
        let value = digits.parse().map_err(|_| invalid())?;
        Ok(SleepDuration { value, minutes })
    }

    /// `<value>,<unit>` where the driver encodes minutes as 0 and seconds as 1.
    pub fn driver_value(&self) -> String {
        format!("{},{}", self.value, if self.minutes { 0 } else { 1 })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TwtConfig {
    pub interval: u32,
    pub num: u32,
    pub sp: u32,
    pub force_sleep: u32,
    pub num_in_group: u32,
    pub algo: u32,
}

impl Default for TwtConfig {
    fn default() -> Self {
        Self {
            interval: 0,
            num: 0,
            sp: 0,
            force_sleep: 0,
            num_in_group: 1,
            algo: 0,
        }
    }
}

impl TwtConfig {
    pub fn is_enabled(&self) -> bool {
        self.num > 0 || self.sp > 0 || self.interval > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PowerConfig {
    pub power_save: PowerSave,
    /// Handed to `iwconfig <iface> power timeout`.
    pub ps_timeout: String,
    pub sleep_duration: String,
    pub listen_interval: u32,
    pub idle_mode: bool,
    pub bss_max_idle_enable: bool,
    pub bss_max_idle: u32,
    pub pretend: bool,
    pub twt: TwtConfig,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            power_save: PowerSave::AlwaysOn,
            ps_timeout: "3s".to_string(),
            sleep_duration: "3s".to_string(),
            listen_interval: 1000,
            idle_mode: false,
            bss_max_idle_enable: true,
            bss_max_idle: 1800,
            pretend: false,
            twt: TwtConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// 0: station on wlan0, AP on wlan1. 1: station on wlan1, AP on wlan0.
    pub relay_type: u8,
    pub relay_nat: bool,
    /// 0 disables bridging, N bridges the HaLow interface with eth(N-1).
    pub use_bridge_setup: u8,
    /// 1 requests an address for br0 over DHCP.
    pub bridge_ip_mode: u8,
    pub batman: bool,
    pub self_config: bool,
    pub prefer_bw: u8,
    /// Per-channel CCA dwell time in ms used by self configuration.
    pub dwell_time: u32,
    /// 0 waits for an address forever.
    pub dhcp_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            relay_type: 1,
            relay_nat: true,
            use_bridge_setup: 0,
            bridge_ip_mode: 1,
            batman: false,
            self_config: false,
            prefer_bw: 0,
            dwell_time: 100,
            dhcp_timeout_secs: 0,
        }
    }
}

impl NetworkConfig {
    pub fn bridged(&self) -> bool {
        self.use_bridge_setup > 0
    }

    /// The wired interface bridged with HaLow, e.g. `eth0`.
    pub fn bridge_eth(&self) -> Option<String> {
        self.bridged()
            .then(|| format!("eth{}", self.use_bridge_setup - 1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    pub script_dir: PathBuf,
    pub driver: PathBuf,
    pub firmware_copy: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            script_dir: PathBuf::from("/home/pi/nrc_pkg/script"),
            driver: PathBuf::from("/home/pi/nrc_pkg/sw/driver/nrc.ko"),
            firmware_copy: PathBuf::from("/home/pi/nrc_pkg/sw/firmware/copy.sh"),
        }
    }
}

impl PathsConfig {
    pub fn conf_dir(&self) -> PathBuf {
        self.script_dir.join("conf")
    }

    pub fn cli_app(&self) -> PathBuf {
        self.script_dir.join("cli_app")
    }

    pub fn ip_config(&self) -> PathBuf {
        self.conf_dir().join("etc/ip_config.sh")
    }

    pub fn ip_config_bridge(&self) -> PathBuf {
        self.conf_dir().join("etc/ip_config_bridge.sh")
    }

    pub fn clock_config(&self) -> PathBuf {
        self.conf_dir().join("etc/clock_config.sh")
    }

    pub fn temp_self_config(&self) -> PathBuf {
        self.conf_dir().join("temp_self_config.conf")
    }

    pub fn temp_hostapd(&self) -> PathBuf {
        self.conf_dir().join("temp_hostapd_config.conf")
    }

    pub fn temp_sta(&self) -> PathBuf {
        self.conf_dir().join("temp_sta_config.conf")
    }

    pub fn temp_mesh(&self) -> PathBuf {
        self.conf_dir().join("temp_mesh_config.conf")
    }

    /// Template under `conf/<country dir>/`, e.g. `conf/US/ap_halow_sae.conf`.
    pub fn template(&self, country_dir: &str, file: &str) -> PathBuf {
        self.conf_dir().join(country_dir).join(file)
    }
}

impl Config {
    /// Loads the settings file. Without an explicit path a missing default
    /// file yields the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let p = config_path()?;
                if !p.exists() {
                    return Ok(Config::default());
                }
                p
            }
        };

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn bd_name(&self) -> String {
        if self.general.bd_name.is_empty() {
            format!("nrc{}_bd.dat", self.general.model)
        } else {
            self.general.bd_name.clone()
        }
    }

    /// Models whose EVK wires the power-save wake-up GPIOs.
    pub fn has_ps_gpio(&self) -> bool {
        matches!(self.general.model, 7393 | 7394)
    }

    pub fn validate(&self, request: &LaunchRequest) -> Result<(), LauncherError> {
        if request.role.is_sta()
            && self.power.power_save.is_enabled()
            && self.power.listen_interval > 65535
        {
            return Err(LauncherError::InvalidSetting(
                "Max listen_interval is 65535!".to_string(),
            ));
        }
        SleepDuration::parse(&self.power.sleep_duration)?;
        if self.network.relay_type > 1 {
            return Err(LauncherError::InvalidSetting(format!(
                "relay_type must be 0 or 1, got {}",
                self.network.relay_type
            )));
        }
        Ok(())
    }

    /// Settings actually used for `request`, with the per-role overrides applied.
    pub fn for_role(&self, request: &LaunchRequest) -> Config {
        let mut cfg = self.clone();

        if cfg.spi.ft232h_usb_spi > 0 {
            cfg.apply_ft232h();
        }

        match request.role {
            Role::Ap { .. } => {
                cfg.mac.ndp_preq = true;
            }
            Role::Relay { .. } => {
                cfg.power.power_save = PowerSave::AlwaysOn;
                cfg.mac.ndp_ack_1m = false;
                cfg.mac.ndp_preq = false;
                cfg.network.self_config = false;
            }
            Role::Sniffer { .. } => {
                cfg.mac.sw_enc = 0;
                cfg.mac.ampdu = AmpduMode::Off;
                cfg.power.bss_max_idle_enable = false;
                cfg.power.power_save = PowerSave::AlwaysOn;
                cfg.mac.ndp_ack_1m = false;
                cfg.power.listen_interval = 0;
            }
            Role::Mesh { .. } => {
                cfg.mac.short_bcn_enable = false;
            }
            Role::Sta => {}
        }

        cfg
    }

    fn apply_ft232h(&mut self) {
        let spi = &mut self.spi;
        spi.bus_num = 3;
        spi.gpio_irq = 500;
        spi.clock = spi.clock.min(15_000_000);
        spi.cs_num = 0;
        if spi.polling_interval <= 0 {
            spi.polling_interval = 50;
        }
        if spi.ft232h_usb_spi != 1 {
            spi.gpio_irq = -1;
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(config_dir.join("halow-launcher").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn request(sta_type: &str, extras: &[&str]) -> LaunchRequest {
        let extras: Vec<String> = extras.iter().map(|s| s.to_string()).collect();
        LaunchRequest::from_args(sta_type, "0", "US", &extras).unwrap()
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [general]
            model = 7292

            [power]
            power_save = "non_tim"
            sleep_duration = "10m"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.general.model, 7292);
        assert_eq!(cfg.general.fw_name, "uni_s1g.bin");
        assert_eq!(cfg.power.power_save, PowerSave::NonTim);
        assert_eq!(cfg.power.listen_interval, 1000);
        assert_eq!(cfg.bd_name(), "nrc7292_bd.dat");
        assert_eq!(cfg.rf.guard_interval, GuardInterval::Auto);
    }

    #[test]
    fn save_then_load_from_explicit_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.network.use_bridge_setup = 1;
        cfg.general.bd_name = "custom_bd.dat".to_string();
        cfg.save(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.bd_name(), "custom_bd.dat");
        assert_eq!(loaded.network.bridge_eth().as_deref(), Some("eth0"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn listen_interval_limit_applies_to_power_saving_sta() {
        let mut cfg = Config::default();
        cfg.power.listen_interval = 70000;
        assert!(cfg.validate(&request("0", &[])).is_ok());

        cfg.power.power_save = PowerSave::Tim;
        assert!(cfg.validate(&request("0", &[])).is_err());
        assert!(cfg.validate(&request("1", &[])).is_ok());
    }

    #[test]
    fn sleep_duration_parsing() {
        assert_eq!(SleepDuration::parse("3s").unwrap().driver_value(), "3,1");
        assert_eq!(SleepDuration::parse("15m").unwrap().driver_value(), "15,0");
        assert!(SleepDuration::parse("15h").is_err());
        assert!(SleepDuration::parse("s").is_err());
    }

    #[test]
    fn role_overrides() {
        let cfg = Config::default();

        let ap = cfg.for_role(&request("1", &[]));
        assert!(ap.mac.ndp_preq);

        let sniffer = cfg.for_role(&request("2", &["40", "0"]));
        assert_eq!(sniffer.mac.ampdu, AmpduMode::Off);
        assert!(!sniffer.power.bss_max_idle_enable);
        assert_eq!(sniffer.power.listen_interval, 0);

        let mut relay_cfg = Config::default();
        relay_cfg.network.self_config = true;
        relay_cfg.power.power_save = PowerSave::Tim;
        let relay = relay_cfg.for_role(&request("3", &[]));
        assert!(!relay.network.self_config);
        assert_eq!(relay.power.power_save, PowerSave::AlwaysOn);
    }

    #[test]
    fn ft232h_overrides_spi() {
        let mut cfg = Config::default();
        cfg.spi.ft232h_usb_spi = 1;
        let eff = cfg.for_role(&request("0", &[]));
        assert_eq!(eff.spi.bus_num, 3);
        assert_eq!(eff.spi.gpio_irq, 500);
        assert_eq!(eff.spi.clock, 15_000_000);
        assert_eq!(eff.spi.polling_interval, 50);

        cfg.spi.ft232h_usb_spi = 2;
        cfg.spi.clock = 10_000_000;
        let eff = cfg.for_role(&request("0", &[]));
        assert_eq!(eff.spi.gpio_irq, -1);
        assert_eq!(eff.spi.clock, 10_000_000);
    }

    #[test]
    fn derived_paths() {
        let paths = PathsConfig::default();
        assert_eq!(
            paths.template("EU", "ap_halow_sae.conf"),
            PathBuf::from("/home/pi/nrc_pkg/script/conf/EU/ap_halow_sae.conf")
        );
        assert_eq!(
            paths.ip_config(),
            PathBuf::from("/home/pi/nrc_pkg/script/conf/etc/ip_config.sh")
        );
    }
}
