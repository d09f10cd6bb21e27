//! Typed form of the positional command line.
//!
//! The launcher keeps the positional layout of the HaLow EVK start script
//! (`<sta_type> <security> <country> [extra...]`); this module turns those
//! loose strings into a [`LaunchRequest`] or a usage error.

use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::country::Country;
use crate::error::LauncherError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Security {
    Open,
    Wpa2Psk,
    Wpa3Owe,
    Wpa3Sae,
    WpsPbc,
}

impl Security {
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Security::Open),
            1 => Some(Security::Wpa2Psk),
            2 => Some(Security::Wpa3Owe),
            3 => Some(Security::Wpa3Sae),
            4 => Some(Security::WpsPbc),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Security::Open => "OPEN",
            Security::Wpa2Psk => "WPA2-PSK",
            Security::Wpa3Owe => "WPA3-OWE",
            Security::Wpa3Sae => "WPA3-SAE",
            Security::WpsPbc => "WPA-PBC",
        }
    }

    /// Suffix of the conf templates, e.g. `ap_halow_<suffix>.conf`.
    pub fn conf_suffix(self) -> &'static str {
        match self {
            Security::Open => "open",
            Security::Wpa2Psk => "wpa2",
            Security::Wpa3Owe => "owe",
            Security::Wpa3Sae => "sae",
            Security::WpsPbc => "pbc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SnifferMode {
    Local,
    Remote,
}

impl SnifferMode {
    pub fn name(self) -> &'static str {
        match self {
            SnifferMode::Local => "LOCAL",
            SnifferMode::Remote => "REMOTE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MeshMode {
    /// Mesh portal, bridges the mesh to the wired network.
    Portal,
    /// Plain mesh point.
    Point,
    /// Mesh point that also serves an access point.
    AccessPoint,
}

impl MeshMode {
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(MeshMode::Portal),
            1 => Some(MeshMode::Point),
            2 => Some(MeshMode::AccessPoint),
            _ => None,
        }
    }

    pub fn index(self) -> u8 {
        match self {
            MeshMode::Portal => 0,
            MeshMode::Point => 1,
            MeshMode::AccessPoint => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MeshMode::Portal => "Mesh Portal",
            MeshMode::Point => "Mesh Point",
            MeshMode::AccessPoint => "Mesh AP",
        }
    }
}

/// A colon separated 48-bit MAC address, kept in its textual form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MacAddr(String);

impl MacAddr {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for MacAddr {
    type Err = LauncherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets: Vec<&str> = s.split(':').collect();
        let valid = s.len() == 17
            && octets.len() == 6
            && octets
                .iter()
                .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
        if valid {
            Ok(MacAddr(s.to_ascii_lowercase()))
        } else {
            Err(LauncherError::usage(format!("'{}' is not a MAC address", s)))
        }
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a mesh node gets its IPv4 address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum MeshAddressing {
    #[default]
    Dhcp,
    Static(Ipv4Addr),
    NoDhcp,
}

impl MeshAddressing {
    fn parse(arg: &str) -> Option<Self> {
        if arg == "nodhcp" {
            return Some(MeshAddressing::NoDhcp);
        }
        arg.parse().ok().map(MeshAddressing::Static)
    }

    /// Value handed to `ip_config.sh`: `0` for DHCP, the address, or `nodhcp`.
    pub fn script_arg(&self) -> String {
        match self {
            MeshAddressing::Dhcp => "0".to_string(),
            MeshAddressing::Static(ip) => ip.to_string(),
            MeshAddressing::NoDhcp => "nodhcp".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Role {
    Sta,
    Ap {
        channel: Option<u16>,
    },
    Sniffer {
        channel: u16,
        mode: SnifferMode,
    },
    Relay {
        channel: Option<u16>,
    },
    Mesh {
        mode: MeshMode,
        peer: Option<MacAddr>,
        addressing: MeshAddressing,
    },
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Sta => "STA",
            Role::Ap { .. } => "AP",
            Role::Sniffer { .. } => "SNIFFER",
            Role::Relay { .. } => "RELAY",
            Role::Mesh { .. } => "MESH",
        }
    }

    pub fn is_sta(&self) -> bool {
        matches!(self, Role::Sta)
    }

    pub fn is_relay(&self) -> bool {
        matches!(self, Role::Relay { .. })
    }

    /// Channel requested on the command line for the hostapd side, if any.
    pub fn ap_channel(&self) -> Option<u16> {
        match self {
            Role::Ap { channel } | Role::Relay { channel } => *channel,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchRequest {
    pub role: Role,
    pub security: Security,
    pub country: Country,
}

impl LaunchRequest {
    /// Validates the positional arguments.
    ///
    /// `extras` are the arguments after the country, whose meaning depends on
    /// the station type.
    pub fn from_args(
        sta_type: &str,
        security: &str,
        country: &str,
        extras: &[String],
    ) -> Result<Self, LauncherError> {
        let sta_type: u8 = parse_index(sta_type, "sta_type")?;
        let security = parse_index(security, "security_mode")
            .ok()
            .and_then(Security::from_index)
            .ok_or_else(|| LauncherError::usage(format!("Invalid security_mode '{}'", security)))?;

        let role = match sta_type {
            0 => Role::Sta,
            1 => Role::Ap {
                channel: optional_channel(extras)?,
            },
            2 => {
                if extras.len() < 2 {
                    return Err(LauncherError::usage(
                        "SNIFFER requires a channel and a sniffer_mode",
                    ));
                }
                let channel = parse_channel(&extras[0])?;
                let mode = match extras[1].as_str() {
                    "0" => SnifferMode::Local,
                    "1" => SnifferMode::Remote,
                    other => {
                        return Err(LauncherError::usage(format!(
                            "Invalid sniffer_mode '{}'",
                            other
                        )));
                    }
                };
                Role::Sniffer { channel, mode }
            }
            3 => Role::Relay {
                channel: optional_channel(extras)?,
            },
            4 => mesh_role(security, extras)?,
            other => {
                return Err(LauncherError::usage(format!("Invalid sta_type '{}'", other)));
            }
        };

        let country = Country::parse(country)?;

        Ok(LaunchRequest {
            role,
            security,
            country,
        })
    }
}

fn parse_index(arg: &str, what: &str) -> Result<u8, LauncherError> {
    arg.trim()
        .parse()
        .map_err(|_| LauncherError::usage(format!("{} must be a number, got '{}'", what, arg)))
}

fn parse_channel(arg: &str) -> Result<u16, LauncherError> {
    arg.trim()
        .parse()
        .map_err(|_| LauncherError::usage(format!("Invalid S1G channel '{}'", arg)))
}

fn optional_channel(extras: &[String]) -> Result<Option<u16>, LauncherError> {
    extras.first().map(|c| parse_channel(c)).transpose()
}

fn mesh_role(security: Security, extras: &[String]) -> Result<Role, LauncherError> {
    let mode = extras
        .first()
        .ok_or_else(|| LauncherError::usage("MESH requires a mesh_mode"))
        .and_then(|m| parse_index(m, "mesh_mode"))?;
    let mode = MeshMode::from_index(mode)
        .ok_or_else(|| LauncherError::usage(format!("Invalid mesh_mode '{}'", mode)))?;

    if mode != MeshMode::AccessPoint && !matches!(security, Security::Open | Security::Wpa3Sae) {
        return Err(LauncherError::usage(
            "MPP, MP mode support only Open, WPA3-SAE security mode",
        ));
    }

    let mut peer = None;
    let mut addressing = MeshAddressing::Dhcp;
    match &extras[1..] {
        [] => {}
        [single] => {
            if let Ok(mac) = single.parse::<MacAddr>() {
                peer = Some(mac);
            } else if let Some(a) = MeshAddressing::parse(single) {
                addressing = a;
            } else {
                return Err(LauncherError::usage(format!(
                    "'{}' is neither a peer MAC address nor an IP address",
                    single
                )));
            }
        }
        [mac, ip] => {
            peer = Some(mac.parse()?);
            addressing = MeshAddressing::parse(ip).ok_or_else(|| {
                LauncherError::usage(format!("'{}' is not an IP address or 'nodhcp'", ip))
            })?;
        }
        _ => return Err(LauncherError::usage("Too many arguments for MESH")),
    }

    Ok(Role::Mesh {
        mode,
        peer,
        addressing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extras(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_open_sta() {
        let req = LaunchRequest::from_args("0", "0", "US", &[]).unwrap();
        assert_eq!(req.role, Role::Sta);
        assert_eq!(req.security, Security::Open);
        assert_eq!(req.country.code(), "US");
    }

    #[test]
    fn ap_takes_optional_channel() {
        let req = LaunchRequest::from_args("1", "1", "US", &extras(&["40"])).unwrap();
        assert_eq!(req.role, Role::Ap { channel: Some(40) });
        assert_eq!(req.role.ap_channel(), Some(40));

        let req = LaunchRequest::from_args("3", "3", "JP", &[]).unwrap();
        assert_eq!(req.role, Role::Relay { channel: None });
    }

    #[test]
    fn sniffer_needs_channel_and_mode() {
        let req = LaunchRequest::from_args("2", "0", "JP", &extras(&["40", "1"])).unwrap();
        assert_eq!(
            req.role,
            Role::Sniffer {
                channel: 40,
                mode: SnifferMode::Remote
            }
        );

        let err = LaunchRequest::from_args("2", "0", "JP", &extras(&["40"])).unwrap_err();
        assert!(matches!(err, LauncherError::Usage(_)));
    }

    #[test]
    fn rejects_non_numeric_type_and_bad_security() {
        assert!(matches!(
            LaunchRequest::from_args("x", "0", "US", &[]),
            Err(LauncherError::Usage(_))
        ));
        assert!(matches!(
            LaunchRequest::from_args("0", "7", "US", &[]),
            Err(LauncherError::Usage(_))
        ));
        assert!(matches!(
            LaunchRequest::from_args("5", "0", "US", &[]),
            Err(LauncherError::Usage(_))
        ));
    }

    #[test]
    fn rejects_unknown_country() {
        assert!(matches!(
            LaunchRequest::from_args("0", "0", "XX", &[]),
            Err(LauncherError::UnsupportedCountry(_))
        ));
    }

    #[test]
    fn mesh_with_peer_and_static_ip() {
        let req = LaunchRequest::from_args(
            "4",
            "3",
            "US",
            &extras(&["1", "8c:0f:fa:00:29:46", "192.168.222.1"]),
        )
        .unwrap();
        assert_eq!(
            req.role,
            Role::Mesh {
                mode: MeshMode::Point,
                peer: Some("8c:0f:fa:00:29:46".parse().unwrap()),
                addressing: MeshAddressing::Static(Ipv4Addr::new(192, 168, 222, 1)),
            }
        );
    }

    #[test]
    fn mesh_single_extra_is_peer_ip_or_nodhcp() {
        let req = LaunchRequest::from_args("4", "0", "US", &extras(&["0", "nodhcp"])).unwrap();
        assert!(matches!(
            req.role,
            Role::Mesh {
                addressing: MeshAddressing::NoDhcp,
                peer: None,
                ..
            }
        ));

        let req =
            LaunchRequest::from_args("4", "0", "US", &extras(&["1", "8C:0F:FA:00:29:46"])).unwrap();
        match req.role {
            Role::Mesh { peer, .. } => assert_eq!(peer.unwrap().as_str(), "8c:0f:fa:00:29:46"),
            other => panic!("unexpected role {:?}", other),
        }

        assert!(LaunchRequest::from_args("4", "0", "US", &extras(&["1", "garbage"])).is_err());
    }

    #[test]
    fn mesh_point_restricts_security() {
        assert!(LaunchRequest::from_args("4", "1", "US", &extras(&["1"])).is_err());
        assert!(LaunchRequest::from_args("4", "1", "US", &extras(&["2"])).is_ok());
        assert!(LaunchRequest::from_args("4", "3", "US", &[]).is_err());
    }

    #[test]
    fn mesh_addressing_script_arg() {
        assert_eq!(MeshAddressing::Dhcp.script_arg(), "0");
        assert_eq!(MeshAddressing::NoDhcp.script_arg(), "nodhcp");
        assert_eq!(
            MeshAddressing::Static(Ipv4Addr::new(10, 0, 0, 2)).script_arg(),
            "10.0.0.2"
        );
    }
}
