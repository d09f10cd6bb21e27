//! Pre-launch banner describing what is about to be configured.

use serde::Serialize;

use crate::config::Config;
use crate::request::{LaunchRequest, Role};

#[derive(Debug, Serialize)]
pub struct Summary {
    pub model: u32,
    pub sta_type: &'static str,
    pub country: String,
    pub security: &'static str,
    pub bd_name: String,
    pub ampdu: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cqm: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sniffer_channel: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sniffer_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware: Option<String>,
    pub max_tx_power_dbm: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bss_max_idle: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_save: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ps_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sleep_duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen_interval: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mesh_mode: Option<&'static str>,
    pub config_location: &'static str,
}

fn on_off(flag: bool) -> &'static str {
    if flag { "ON" } else { "OFF" }
}

impl Summary {
    /// `config` should be the effective configuration for `request`.
    pub fn new(request: &LaunchRequest, config: &Config) -> Self {
        let role = &request.role;
        let power = &config.power;
        let is_sta = role.is_sta();

        let (sniffer_channel, sniffer_mode) = match role {
            Role::Sniffer { channel, mode } => (Some(*channel), Some(mode.name())),
            _ => (None, None),
        };
        let mesh_mode = match role {
            Role::Mesh { mode, .. } => Some(mode.name()),
            _ => None,
        };
        let bss_idle_role = matches!(role, Role::Ap { .. } | Role::Relay { .. } | Role::Sta);

        Summary {
            model: config.general.model,
            sta_type: role.name(),
            country: request.country.to_string(),
            security: request.security.name(),
            bd_name: config.bd_name(),
            ampdu: config.mac.ampdu.name(),
            cqm: is_sta.then(|| on_off(config.mac.cqm_enable)),
            sniffer_channel,
            sniffer_mode,
            firmware: config
                .general
                .fw_download
                .then(|| config.general.fw_name.clone()),
            max_tx_power_dbm: config.rf.max_txpwr,
            bss_max_idle: (power.bss_max_idle_enable && bss_idle_role).then_some(power.bss_max_idle),
            power_save: is_sta.then(|| power.power_save.name()),
            ps_timeout: (is_sta && power.power_save.is_enabled()).then(|| power.ps_timeout.clone()),
            sleep_duration: (is_sta && power.power_save == crate::config::PowerSave::NonTim)
                .then(|| power.sleep_duration.clone()),
            listen_interval: (is_sta && power.listen_interval > 0).then_some(power.listen_interval),
            mesh_mode,
            config_location: if config.general.use_eeprom_config {
                "EEPROM"
            } else {
                "FLASH"
            },
        }
    }

    /// Label/value rows in display order.
    pub fn rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![
            ("Model", self.model.to_string()),
            ("STA Type", self.sta_type.to_string()),
            ("Country", self.country.clone()),
            ("Security Mode", self.security.to_string()),
            ("BD Name", self.bd_name.clone()),
            ("AMPDU", self.ampdu.to_string()),
        ];
        if let Some(cqm) = self.cqm {
            rows.push(("CQM", cqm.to_string()));
        }
        if let (Some(channel), Some(mode)) = (self.sniffer_channel, self.sniffer_mode) {
            rows.push(("Channel Selected", channel.to_string()));
            rows.push(("Sniffer Mode", mode.to_string()));
        }
        if let Some(fw) = &self.firmware {
            rows.push(("Download FW", fw.clone()));
        }
        rows.push(("MAX TX Power", format!("{} dBm", self.max_tx_power_dbm)));
        if let Some(idle) = self.bss_max_idle {
            rows.push(("BSS MAX IDLE", idle.to_string()));
        }
        if let Some(ps) = self.power_save {
            rows.push(("Power Save Type", ps.to_string()));
        }
        if let Some(timeout) = &self.ps_timeout {
            rows.push(("PS Timeout", timeout.clone()));
        }
        if let Some(sleep) = &self.sleep_duration {
            rows.push(("Sleep Duration", sleep.clone()));
        }
        if let Some(interval) = self.listen_interval {
            rows.push(("Listen Interval", interval.to_string()));
        }
        if let Some(mesh) = self.mesh_mode {
            rows.push(("Mesh Mode", mesh.to_string()));
        }
        rows.push(("CONFIG_LOCATION", self.config_location.to_string()));
        rows
    }
}

pub fn display_summary(summary: &Summary) {
    println!("{}", "-".repeat(30));
    for (label, value) in summary.rows() {
        println!("{:<17}: {}", label, value);
    }
    println!("{}", "-".repeat(30));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PowerSave;

    fn request(sta_type: &str, extras: &[&str]) -> LaunchRequest {
        let extras: Vec<String> = extras.iter().map(|s| s.to_string()).collect();
        LaunchRequest::from_args(sta_type, "1", "US", &extras).unwrap()
    }

    #[test]
    fn sta_rows_include_power_settings() {
        let mut cfg = Config::default();
        cfg.power.power_save = PowerSave::NonTim;
        let req = request("0", &[]);
        let summary = Summary::new(&req, &cfg.for_role(&req));
        let labels: Vec<&str> = summary.rows().iter().map(|(l, _)| *l).collect();
        assert_eq!(
            labels,
            vec![
                "Model",
                "STA Type",
                "Country",
                "Security Mode",
                "BD Name",
                "AMPDU",
                "CQM",
                "Download FW",
                "MAX TX Power",
                "BSS MAX IDLE",
                "Power Save Type",
                "PS Timeout",
                "Sleep Duration",
                "Listen Interval",
                "CONFIG_LOCATION",
            ]
        );
        assert_eq!(summary.power_save, Some("Deep Sleep (nonTIM)"));
    }

    #[test]
    fn sniffer_json_omits_station_fields() {
        let req = request("2", &["40", "0"]);
        let summary = Summary::new(&req, &Config::default().for_role(&req));
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["sta_type"], "SNIFFER");
        assert_eq!(json["sniffer_channel"], 40);
        assert_eq!(json["sniffer_mode"], "LOCAL");
        assert_eq!(json["ampdu"], "OFF");
        assert!(json.get("cqm").is_none());
        assert!(json.get("bss_max_idle").is_none());
    }
}
