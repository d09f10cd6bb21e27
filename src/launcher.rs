//! The launch sequence shared by every role, and dispatch to the role
//! specific bring-up.
//!
//! # Sequence
//!
//! 1. `[0] Clear`: stop daemons left from a previous run, unload the driver
//!    and reset NAT and the DHCP/DNS services.
//! 2. `[1]` Copy firmware and IP configuration, assemble module parameters.
//! 3. `[2]` Set the initial regulatory domain.
//! 4. `[3]` Load the kernel module and bring `wlan0` up.
//! 5. `[4]`/`[5]` Apply TX power and guard interval through `cli_app`.
//! 6. Start dhcpcd and dnsmasq, then hand over to the role.

use anyhow::Result;

use crate::config::Config;
use crate::error::LauncherError;
use crate::module_params::{module_params, ModuleParams};
use crate::network;
use crate::request::{LaunchRequest, MeshMode, Role};
use crate::runner::{Cmd, Runner};

const IFUP_NO_DEVICE: i32 = 255;

pub(crate) const RULE: &str =
    "--------------------------------------------------------------------";

pub struct Launcher<'a> {
    pub(crate) runner: &'a Runner,
    pub(crate) request: &'a LaunchRequest,
    /// Settings with the role overrides applied.
    pub(crate) config: Config,
}

impl<'a> Launcher<'a> {
    pub fn new(runner: &'a Runner, config: &Config, request: &'a LaunchRequest) -> Self {
        Launcher {
            runner,
            request,
            config: config.for_role(request),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn module_params(&self) -> Result<ModuleParams> {
        Ok(module_params(&self.config, self.request)?)
    }

    pub(crate) fn path_arg(path: &std::path::Path) -> String {
        path.display().to_string()
    }

    pub(crate) fn cli_app(&self) -> Cmd {
        Cmd::new(Self::path_arg(&self.config.paths.cli_app()))
    }

    /// Runs the whole bring-up for the request.
    pub async fn launch(&self) -> Result<()> {
        println!("NRC {} setting for HaLow...", self.request.role.name());
        tracing::info!(role = self.request.role.name(), country = %self.request.country, "launch");

        self.prepare().await?;

        match &self.request.role {
            Role::Sta => self.station("wlan0").await?,
            Role::Ap { .. } => self.access_point("wlan0").await?,
            Role::Sniffer { channel, mode } => self.sniffer(*channel, *mode).await?,
            Role::Relay { .. } => self.relay().await?,
            Role::Mesh {
                mode,
                peer,
                addressing,
            } => self.mesh(*mode, peer.as_ref(), *addressing).await?,
        }

        println!("Done.");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let runner = self.runner;
        let paths = &self.config.paths;

        println!("[0] Clear");
        runner.run_quiet(&Cmd::sudo("hostapd_cli").arg("disable")).await;
        runner.run_quiet(&Cmd::sudo("wpa_cli").args(["disable", "wlan0"])).await;
        runner.run_quiet(&Cmd::sudo("wpa_cli").args(["disable", "wlan1"])).await;
        for daemon in ["wpa_supplicant", "hostapd", "wireshark"] {
            runner.run_quiet(&Cmd::sudo("killall").args(["-9", daemon])).await;
        }
        runner.run_quiet(&Cmd::sudo("rmmod").arg("nrc")).await;
        for temp in [
            paths.temp_self_config(),
            paths.temp_hostapd(),
            paths.temp_sta(),
            paths.temp_mesh(),
        ] {
            runner
                .run_quiet(&Cmd::sudo("rm").args(["-f".to_string(), Self::path_arg(&temp)]))
                .await;
        }
        runner
            .run_quiet(&Cmd::sudo("sh").args([
                "-c",
                "[ -e /proc/sys/kernel/sysrq ] && echo 0 > /proc/sys/kernel/sysrq",
            ]))
            .await;

        network::stop_nat(runner).await?;
        network::stop_services(runner).await?;
        runner.sleep(1).await;
        Ok(())
    }

    /// Second argument of `ip_config.sh`: the relay layout, or the mesh mode.
    fn ip_config_mode(&self) -> u8 {
        match &self.request.role {
            Role::Mesh { mode, .. } => mode.index(),
            _ => self.config.network.relay_type,
        }
    }

    fn ip_config_address(&self) -> String {
        match &self.request.role {
            Role::Mesh { addressing, .. } => addressing.script_arg(),
            _ => "0".to_string(),
        }
    }

    async fn copy_conf(&self) -> Result<()> {
        let runner = self.runner;
        let cfg = &self.config;
        let role = self.request.role.name();

        runner
            .run(&Cmd::sudo(Self::path_arg(&cfg.paths.firmware_copy)).args([
                cfg.general.model.to_string(),
                cfg.bd_name(),
                u8::from(cfg.general.use_eeprom_config).to_string(),
            ]))
            .await?;
        runner
            .run(&Cmd::new(Self::path_arg(&cfg.paths.ip_config())).args([
                role.to_string(),
                self.ip_config_mode().to_string(),
                self.ip_config_address(),
                u8::from(cfg.network.batman).to_string(),
            ]))
            .await?;
        if cfg.network.bridged() {
            runner
                .run(&Cmd::sudo(Self::path_arg(&cfg.paths.ip_config_bridge())).args([
                    role.to_string(),
                    (cfg.network.use_bridge_setup - 1).to_string(),
                    cfg.network.bridge_ip_mode.to_string(),
                ]))
                .await?;
        }
        Ok(())
    }

    /// `ifconfig` exits with 255 when the driver never registered `wlan0`;
    /// the module is unloaded again in that case.
    async fn bring_up_wlan0(&self) -> Result<()> {
        let runner = self.runner;
        let code = runner.run(&network::ifconfig(["wlan0", "up"])).await?;
        if code == IFUP_NO_DEVICE {
            tracing::error!(code, "wlan0 did not come up, unloading driver");
            runner.run(&Cmd::sudo("rmmod").arg("nrc.ko")).await?;
            return Err(LauncherError::ModuleLoad.into());
        }
        if code != 0 {
            tracing::warn!(code, "ifconfig wlan0 up returned non-zero");
        }
        Ok(())
    }

    /// Everything up to a running `wlan0` with DHCP/DNS services started.
    pub async fn prepare(&self) -> Result<()> {
        let runner = self.runner;
        let cfg = &self.config;
        let role = &self.request.role;

        if cfg.general.max_cpuclock {
            println!("[*] Set Max CPU Clock on RPi");
            runner
                .run(&Cmd::sudo(Self::path_arg(&cfg.paths.clock_config())))
                .await?;
        }

        self.clear().await?;

        println!("[1] Copy and Set Module Parameters");
        self.copy_conf().await?;
        let params = self.module_params()?;

        let reg = self.request.country.regulatory_code();
        println!("[2] Set Initial Country");
        runner.run(&Cmd::sudo("iw").args(["reg", "set", reg])).await?;

        println!("[3] Loading module");
        tracing::info!(params = %params, "loading module");
        let insmod = Cmd::sudo("insmod")
            .arg(Self::path_arg(&cfg.paths.driver))
            .args(params.as_slice().iter().cloned());
        let code = runner.run(&insmod).await?;
        if code != 0 {
            tracing::warn!(code, "insmod returned non-zero");
        }
        runner
            .sleep(if cfg.spi.polling_interval > 0 { 10 } else { 5 })
            .await;

        match role {
            Role::Relay { .. } if cfg.network.relay_type == 0 => {
                network::add_wlan1(runner).await?;
            }
            Role::Mesh {
                mode: MeshMode::AccessPoint,
                ..
            } => {
                runner
                    .run(&Cmd::sudo("iw").args([
                        "dev", "wlan0", "interface", "add", "mesh0", "type", "mp",
                    ]))
                    .await?;
                runner.run(&network::ifconfig(["mesh0", "up"])).await?;
            }
            _ => {}
        }

        self.bring_up_wlan0().await?;

        println!("[4] Set Maximum TX Power");
        runner
            .run(&self.cli_app().args([
                "set".to_string(),
                "txpwr".to_string(),
                "limit".to_string(),
                cfg.rf.max_txpwr.to_string(),
            ]))
            .await?;
        if !matches!(role, Role::Sniffer { .. }) {
            println!("[*] Transmission Power Control(TPC) is activated");
            runner
                .run(&Cmd::sudo("iw").args([
                    "phy".to_string(),
                    "nrc80211".to_string(),
                    "set".to_string(),
                    "txpower".to_string(),
                    "limit".to_string(),
                    (cfg.rf.max_txpwr * 100).to_string(),
                ]))
                .await?;
        }

        println!("[5] Set guard interval: {}", cfg.rf.guard_interval);
        runner
            .run(&self.cli_app().args([
                "set".to_string(),
                "gi".to_string(),
                cfg.rf.guard_interval.to_string(),
            ]))
            .await?;

        println!("[*] Start DHCPCD and DNSMASQ");
        network::start_services(runner).await?;
        Ok(())
    }

    /// Station and AP on separate interfaces of the same radio, brought up
    /// concurrently.
    async fn relay(&self) -> Result<()> {
        let (sta_iface, ap_iface) = if self.config.network.relay_type == 0 {
            ("wlan0", "wlan1")
        } else {
            network::add_wlan1(self.runner).await?;
            ("wlan1", "wlan0")
        };

        let (sta, ap) = tokio::join!(self.station(sta_iface), self.access_point(ap_iface));
        sta?;
        ap?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::write_script;
    use std::fs;
    use tempfile::tempdir;

    fn request(sta_type: &str, security: &str, country: &str, extras: &[&str]) -> LaunchRequest {
        let extras: Vec<String> = extras.iter().map(|s| s.to_string()).collect();
        LaunchRequest::from_args(sta_type, security, country, &extras).unwrap()
    }

    fn position(history: &[String], needle: &str) -> usize {
        history
            .iter()
            .position(|l| l.starts_with(needle))
            .unwrap_or_else(|| panic!("`{}` not run; history: {:#?}", needle, history))
    }

    #[tokio::test]
    async fn prepare_sequence_for_sta() {
        let runner = Runner::new(true, true);
        let req = request("0", "1", "K1", &[]);
        let launcher = Launcher::new(&runner, &Config::default(), &req);
        launcher.prepare().await.unwrap();

        let history = runner.history();
        assert_eq!(history[0], "sudo /home/pi/nrc_pkg/script/conf/etc/clock_config.sh");
        let rmmod = position(&history, "sudo rmmod nrc");
        let copy = position(&history, "sudo /home/pi/nrc_pkg/sw/firmware/copy.sh 7394 nrc7394_bd.dat 0");
        let ip_config = position(
            &history,
            "/home/pi/nrc_pkg/script/conf/etc/ip_config.sh STA 1 0 0",
        );
        let reg = position(&history, "sudo iw reg set KR");
        let insmod = position(&history, "sudo insmod /home/pi/nrc_pkg/sw/driver/nrc.ko hifspeed=");
        let up = position(&history, "sudo ifconfig wlan0 up");
        let tpc = position(&history, "sudo iw phy nrc80211 set txpower limit 2400");
        let gi = position(&history, "/home/pi/nrc_pkg/script/cli_app set gi auto");
        let dnsmasq = position(&history, "sudo systemctl start dnsmasq");

        assert!(rmmod < copy && copy < ip_config && ip_config < reg);
        assert!(reg < insmod && insmod < up && up < tpc && tpc < gi && gi < dnsmasq);
        assert!(history[insmod].contains("kr_band=1"));
    }

    #[tokio::test]
    async fn sniffer_skips_tpc_and_bridge_script_runs_when_bridged() {
        let runner = Runner::new(true, true);
        let mut cfg = Config::default();
        cfg.network.use_bridge_setup = 1;
        cfg.general.max_cpuclock = false;
        let req = request("2", "0", "JP", &["40", "0"]);
        Launcher::new(&runner, &cfg, &req).prepare().await.unwrap();

        let history = runner.history();
        assert!(!history.iter().any(|l| l.contains("nrc80211")));
        assert!(!history.iter().any(|l| l.contains("clock_config")));
        position(
            &history,
            "sudo /home/pi/nrc_pkg/script/conf/etc/ip_config_bridge.sh SNIFFER 0 1",
        );
    }

    #[tokio::test]
    async fn mesh_ap_creates_mesh_interface() {
        let runner = Runner::new(true, true);
        let req = request("4", "3", "US", &["2", "192.168.222.1"]);
        Launcher::new(&runner, &Config::default(), &req)
            .prepare()
            .await
            .unwrap();

        let history = runner.history();
        position(
            &history,
            "/home/pi/nrc_pkg/script/conf/etc/ip_config.sh MESH 2 192.168.222.1 0",
        );
        let mesh0 = position(&history, "sudo iw dev wlan0 interface add mesh0 type mp");
        assert!(mesh0 < position(&history, "sudo ifconfig wlan0 up"));
    }

    #[tokio::test]
    async fn relay_layout_zero_adds_wlan1_during_prepare() {
        let runner = Runner::new(true, true);
        let mut cfg = Config::default();
        cfg.network.relay_type = 0;
        let req = request("3", "1", "US", &[]);
        Launcher::new(&runner, &cfg, &req).prepare().await.unwrap();
        position(
            &runner.history(),
            "sudo iw dev wlan0 interface add wlan1 type managed",
        );
    }

    #[tokio::test]
    async fn wlan0_exit_255_unloads_driver() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("rmmod.log");
        write_script(dir.path(), "ifconfig", "exit 255");
        write_script(dir.path(), "rmmod", &format!("echo \"$@\" >> {}", log.display()));
        let runner = Runner::new(false, false).with_search_path(dir.path());
        let req = request("0", "0", "US", &[]);

        let err = Launcher::new(&runner, &Config::default(), &req)
            .bring_up_wlan0()
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LauncherError>(),
            Some(LauncherError::ModuleLoad)
        ));
        assert_eq!(fs::read_to_string(&log).unwrap(), "nrc.ko\n");
        assert_eq!(
            runner.history(),
            vec!["ifconfig wlan0 up".to_string(), "rmmod nrc.ko".to_string()]
        );
    }

    #[tokio::test]
    async fn other_wlan0_failures_keep_driver_loaded() {
        let dir = tempdir().unwrap();
        write_script(dir.path(), "ifconfig", "exit 1");
        write_script(dir.path(), "rmmod", "exit 0");
        let runner = Runner::new(false, false).with_search_path(dir.path());
        let req = request("0", "0", "US", &[]);

        Launcher::new(&runner, &Config::default(), &req)
            .bring_up_wlan0()
            .await
            .unwrap();
        assert_eq!(runner.history(), vec!["ifconfig wlan0 up".to_string()]);
    }
}
