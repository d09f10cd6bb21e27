//! Host networking around the HaLow interface: NAT, DHCP/DNS services,
//! bridges and address acquisition.

use anyhow::Result;
use std::net::Ipv4Addr;
use std::time::Instant;

use crate::config::Config;
use crate::error::LauncherError;
use crate::request::Role;
use crate::runner::{Cmd, Runner};

const IP_POLL_SECS: u64 = 5;

fn iptables() -> Cmd {
    Cmd::sudo("iptables")
}

fn set_ip_forward(enabled: bool) -> Cmd {
    Cmd::sudo("sh").args([
        "-c".to_string(),
        format!(
            "echo {} > /proc/sys/net/ipv4/ip_forward",
            if enabled { 1 } else { 0 }
        ),
    ])
}

async fn masquerade(runner: &Runner, lan: &str, wan: &str) -> Result<()> {
    runner
        .run(&iptables().args(["-t", "nat", "-A", "POSTROUTING", "-o", wan, "-j", "MASQUERADE"]))
        .await?;
    runner
        .run(&iptables().args([
            "-A", "FORWARD", "-i", wan, "-o", lan, "-m", "state", "--state",
            "RELATED,ESTABLISHED", "-j", "ACCEPT",
        ]))
        .await?;
    runner
        .run(&iptables().args(["-A", "FORWARD", "-i", lan, "-o", wan, "-j", "ACCEPT"]))
        .await?;
    Ok(())
}

/// Enables forwarding and masquerades HaLow clients behind the uplink.
///
/// An AP shares `eth0`; a relay shares whichever interface its station side
/// runs on.
pub async fn start_nat(runner: &Runner, role: &Role, cfg: &Config) -> Result<()> {
    runner.run(&set_ip_forward(true)).await?;
    match role {
        Role::Ap { .. } => masquerade(runner, "wlan0", "eth0").await,
        Role::Relay { .. } if cfg.network.relay_nat => match cfg.network.relay_type {
            1 => masquerade(runner, "wlan0", "wlan1").await,
            _ => masquerade(runner, "wlan1", "wlan0").await,
        },
        _ => {
            println!("fail to start NAT");
            tracing::warn!(role = role.name(), "NAT not configured for this role");
            Ok(())
        }
    }
}

pub async fn stop_nat(runner: &Runner) -> Result<()> {
    runner.run(&set_ip_forward(false)).await?;
    runner.run(&iptables().args(["-t", "nat", "--flush"])).await?;
    runner.run(&iptables().arg("--flush")).await?;
    Ok(())
}

fn systemctl(action: &str, unit: &str) -> Cmd {
    Cmd::sudo("systemctl").args([action, unit])
}

pub async fn start_services(runner: &Runner) -> Result<()> {
    runner.run(&systemctl("start", "dhcpcd")).await?;
    runner.run(&systemctl("start", "dnsmasq")).await?;
    Ok(())
}

pub async fn stop_services(runner: &Runner) -> Result<()> {
    runner.run(&systemctl("stop", "dhcpcd")).await?;
    runner.run(&systemctl("stop", "dnsmasq")).await?;
    Ok(())
}

pub fn ifconfig<I, S>(args: I) -> Cmd
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Cmd::sudo("ifconfig").args(args)
}

fn brctl<I, S>(args: I) -> Cmd
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Cmd::sudo("brctl").args(args)
}

/// Creates `wlan1` on top of the HaLow phy for concurrent STA + AP operation.
pub async fn add_wlan1(runner: &Runner) -> Result<()> {
    println!("[*] Create wlan1 for concurrent mode");
    runner
        .run(&Cmd::sudo("iw").args(["dev", "wlan0", "interface", "add", "wlan1", "type", "managed"]))
        .await?;
    runner.run(&ifconfig(["wlan1", "up"])).await?;
    runner.sleep(3).await;
    Ok(())
}

/// Builds `br0` around the station interface before wpa_supplicant starts.
///
/// A relay puts its station side on the bridge alone (the AP side joins once
/// hostapd is up); otherwise the wired interface joins as well.
pub async fn bridge_station(runner: &Runner, role: &Role, cfg: &Config, iface: &str) -> Result<()> {
    println!("[*] STA bridge configuration");
    runner.run(&brctl(["addbr", "br0"])).await?;
    if role.is_relay() {
        runner.run(&ifconfig(["wlan1", "up"])).await?;
        runner.run(&ifconfig(["wlan1", "0.0.0.0"])).await?;
        runner.run(&ifconfig(["wlan0", "0.0.0.0"])).await?;
        runner.run(&Cmd::sudo("iw").args([iface, "set", "4addr", "on"])).await?;
        runner.run(&brctl(["addif", "br0", iface])).await?;
        runner.run(&ifconfig(["br0", "up"])).await?;
    } else if let Some(eth) = cfg.network.bridge_eth() {
        runner.run(&ifconfig([eth.as_str(), "up"])).await?;
        runner.run(&ifconfig([iface, "0.0.0.0"])).await?;
        runner.run(&ifconfig([eth.as_str(), "0.0.0.0"])).await?;
        runner.run(&Cmd::sudo("iw").args([iface, "set", "4addr", "on"])).await?;
        runner.run(&brctl(["addif", "br0", iface])).await?;
        runner.run(&brctl(["addif", "br0", eth.as_str()])).await?;
        runner.run(&ifconfig(["br0", "up"])).await?;
        runner.run(&brctl(["show"])).await?;
    }
    Ok(())
}

/// Joins the AP side to `br0` once hostapd is running.
pub async fn bridge_access_point(runner: &Runner, role: &Role, cfg: &Config, iface: &str) -> Result<()> {
    println!("[*] AP bridge configuration");
    if role.is_relay() {
        runner.run(&brctl(["addif", "br0", iface])).await?;
    } else if let Some(eth) = cfg.network.bridge_eth() {
        runner.run(&ifconfig([eth.as_str(), "up"])).await?;
        runner.run(&ifconfig([iface, "0.0.0.0"])).await?;
        runner.run(&ifconfig([eth.as_str(), "0.0.0.0"])).await?;
        runner.run(&brctl(["addif", "br0", eth.as_str()])).await?;
        runner.run(&ifconfig(["br0", "up"])).await?;
    }
    runner.run(&brctl(["show"])).await?;
    runner.sleep(3).await;
    Ok(())
}

/// First usable IPv4 address in `ifconfig` output, skipping loopback and
/// link-local addresses.
pub fn find_ipv4(ifconfig_output: &str) -> Option<Ipv4Addr> {
    ifconfig_output.lines().find_map(|line| {
        let mut words = line.split_whitespace();
        while let Some(word) = words.next() {
            if word == "inet" {
                let addr = words.next()?.trim_start_matches("addr:");
                let ip: Ipv4Addr = addr.parse().ok()?;
                if !ip.is_loopback() && !ip.is_link_local() && !ip.is_unspecified() {
                    return Some(ip);
                }
                return None;
            }
        }
        None
    })
}

/// Waits until `iface` holds an IPv4 address, polling `ifconfig`.
pub async fn wait_for_ip(runner: &Runner, cfg: &Config, iface: &str) -> Result<Option<Ipv4Addr>> {
    if cfg.network.bridged() && cfg.network.bridge_ip_mode == 1 {
        runner.run(&Cmd::sudo("dhclient").args([iface, "-nw", "-v"])).await?;
    }

    let query = Cmd::new("ifconfig").arg(iface);
    if runner.dry_run() {
        runner.capture(&query).await?;
        println!("dry-run: simulated IP assignment");
        return Ok(None);
    }

    let started = Instant::now();
    let limit = cfg.network.dhcp_timeout_secs;
    loop {
        let output = runner.capture(&query).await?;
        if let Some(ip) = find_ipv4(&output) {
            println!("{}: inet {}", iface, ip);
            return Ok(Some(ip));
        }
        if limit > 0 && started.elapsed().as_secs() >= limit {
            return Err(LauncherError::IpTimeout(iface.to_string(), limit).into());
        }
        println!("Waiting for IP");
        runner.sleep(IP_POLL_SECS).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::LaunchRequest;
    use crate::runner::testing::write_script;
    use tempfile::tempdir;

    fn role(sta_type: &str) -> Role {
        LaunchRequest::from_args(sta_type, "0", "US", &[]).unwrap().role
    }

    #[test]
    fn finds_address_in_net_tools_output() {
        let output = "\
wlan0: flags=4163<UP,BROADCAST,RUNNING,MULTICAST>  mtu 1500
        inet 192.168.200.13  netmask 255.255.255.0  broadcast 192.168.200.255
        inet6 fe80::1  prefixlen 64  scopeid 0x20<link>
";
        assert_eq!(find_ipv4(output), Some(Ipv4Addr::new(192, 168, 200, 13)));
    }

    #[test]
    fn finds_address_in_legacy_output() {
        let output = "wlan0 Link encap:Ethernet\n  inet addr:10.0.0.7  Bcast:10.0.0.255\n";
        assert_eq!(find_ipv4(output), Some(Ipv4Addr::new(10, 0, 0, 7)));
    }

    #[test]
    fn ignores_link_local_and_missing_addresses() {
        assert_eq!(find_ipv4("        inet 169.254.3.4  netmask 255.255.0.0\n"), None);
        assert_eq!(find_ipv4("wlan0: flags=4099<UP,BROADCAST,MULTICAST>\n"), None);
    }

    #[tokio::test]
    async fn ap_nat_rules() {
        let runner = Runner::new(true, true);
        start_nat(&runner, &role("1"), &Config::default()).await.unwrap();
        let history = runner.history();
        assert_eq!(
            history[0],
            "sudo sh -c \"echo 1 > /proc/sys/net/ipv4/ip_forward\""
        );
        assert_eq!(
            history[1],
            "sudo iptables -t nat -A POSTROUTING -o eth0 -j MASQUERADE"
        );
        assert_eq!(history[3], "sudo iptables -A FORWARD -i wlan0 -o eth0 -j ACCEPT");
    }

    #[tokio::test]
    async fn relay_nat_follows_layout() {
        let runner = Runner::new(true, true);
        let mut cfg = Config::default();
        cfg.network.relay_type = 0;
        start_nat(&runner, &role("3"), &cfg).await.unwrap();
        assert_eq!(
            runner.history()[1],
            "sudo iptables -t nat -A POSTROUTING -o wlan0 -j MASQUERADE"
        );

        let runner = Runner::new(true, true);
        cfg.network.relay_nat = false;
        start_nat(&runner, &role("3"), &cfg).await.unwrap();
        assert_eq!(runner.history().len(), 1);
    }

    #[tokio::test]
    async fn eth_bridge_for_station() {
        let runner = Runner::new(true, false);
        let mut cfg = Config::default();
        cfg.network.use_bridge_setup = 2;
        bridge_station(&runner, &role("0"), &cfg, "wlan0").await.unwrap();
        let history = runner.history();
        assert!(history.contains(&"brctl addif br0 eth1".to_string()));
        assert!(history.contains(&"iw wlan0 set 4addr on".to_string()));
        assert_eq!(history.last().map(String::as_str), Some("brctl show"));
    }

    #[tokio::test]
    async fn dry_run_wait_for_ip_does_not_poll() {
        let runner = Runner::new(true, true);
        let mut cfg = Config::default();
        cfg.network.use_bridge_setup = 1;
        let ip = wait_for_ip(&runner, &cfg, "br0").await.unwrap();
        assert!(ip.is_none());
        assert_eq!(
            runner.history(),
            vec!["sudo dhclient br0 -nw -v".to_string(), "ifconfig br0".to_string()]
        );
    }

    #[tokio::test]
    async fn wait_for_ip_returns_assigned_address() {
        let dir = tempdir().unwrap();
        write_script(
            dir.path(),
            "ifconfig",
            "echo 'wlan0: flags=4163<UP,BROADCAST,RUNNING,MULTICAST>  mtu 1500'\n\
             echo '        inet 192.168.200.13  netmask 255.255.255.0'",
        );
        let runner = Runner::new(false, false).with_search_path(dir.path());
        let ip = wait_for_ip(&runner, &Config::default(), "wlan0").await.unwrap();
        assert_eq!(ip, Some(Ipv4Addr::new(192, 168, 200, 13)));
    }

    #[tokio::test]
    async fn wait_for_ip_gives_up_after_dhcp_timeout() {
        let dir = tempdir().unwrap();
        write_script(dir.path(), "ifconfig", "echo 'wlan0: flags=4099<UP,BROADCAST,MULTICAST>'");
        let runner = Runner::new(false, false).with_search_path(dir.path());
        let mut cfg = Config::default();
        cfg.network.dhcp_timeout_secs = 1;

        let err = wait_for_ip(&runner, &cfg, "wlan0").await.unwrap_err();
        match err.downcast_ref::<LauncherError>() {
            Some(LauncherError::IpTimeout(iface, secs)) => {
                assert_eq!(iface, "wlan0");
                assert_eq!(*secs, 1);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(runner.history(), vec!["ifconfig wlan0".to_string(); 2]);
    }
}
