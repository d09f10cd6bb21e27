use anyhow::Result;

use crate::conf;
use crate::launcher::{Launcher, RULE};
use crate::network;
use crate::request::Security;
use crate::runner::Cmd;

impl Launcher<'_> {
    /// Starts wpa_supplicant on `iface` and waits for an address.
    pub async fn station(&self, iface: &str) -> Result<()> {
        let runner = self.runner;
        let cfg = &self.config;
        let request = self.request;

        runner
            .run_quiet(&Cmd::sudo("killall").args(["-9", "wpa_supplicant"]))
            .await;

        if cfg.network.bridged() {
            network::bridge_station(runner, &request.role, cfg, iface).await?;
        }

        if cfg.power.power_save.is_enabled() {
            println!("[*] Set default power save timeout for {}", iface);
            runner
                .run(&Cmd::sudo("iwconfig").args([iface, "power", "timeout", cfg.power.ps_timeout.as_str()]))
                .await?;
        }

        println!("[6] Start wpa_supplicant on {}", iface);
        let template = cfg.paths.template(
            request.country.conf_dir_name(),
            &format!("sta_halow_{}.conf", request.security.conf_suffix()),
        );
        let conf_path = cfg.paths.temp_sta();
        runner.render_conf(&template, &conf_path, |t| {
            conf::supplicant_conf(t, &request.country)
        })?;

        let mut supplicant = Cmd::sudo("wpa_supplicant").args([
            format!("-i{}", iface),
            "-c".to_string(),
            Self::path_arg(&conf_path),
        ]);
        if cfg.network.bridged() {
            supplicant = supplicant.args(["-b", "br0"]);
        }
        if cfg.debug.supplicant {
            supplicant = supplicant.arg("-dddd");
        }
        runner.spawn(&supplicant)?;

        if request.security == Security::WpsPbc {
            runner.sleep(1).await;
            runner.run(&Cmd::sudo("wpa_cli").arg("wps_pbc")).await?;
        }
        runner.sleep(3).await;

        println!("[7] Connect and DHCP");
        let ip_iface = if cfg.network.bridged() { "br0" } else { iface };
        network::wait_for_ip(runner, cfg, ip_iface).await?;

        println!("IP assigned. HaLow STA ready");
        println!("{}", RULE);
        Ok(())
    }
}
