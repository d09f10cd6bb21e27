use anyhow::Result;

use crate::conf;
use crate::launcher::{Launcher, RULE};
use crate::network;
use crate::request::Security;
use crate::runner::Cmd;
use crate::self_config::{self, SelfConfig};

impl Launcher<'_> {
    fn ap_template(&self) -> std::path::PathBuf {
        self.config.paths.template(
            self.request.country.conf_dir_name(),
            &format!("ap_halow_{}.conf", self.request.security.conf_suffix()),
        )
    }

    fn hostapd_cmd(&self, conf_path: &std::path::Path) -> Cmd {
        let cmd = Cmd::sudo("hostapd").arg(Self::path_arg(conf_path));
        if self.config.debug.hostapd {
            cmd.arg("-dddd")
        } else {
            cmd
        }
    }

    /// Renders the AP conf for `iface` and starts hostapd in the background.
    ///
    /// A channel picked by self configuration takes precedence over the one
    /// from the command line.
    pub(crate) async fn start_hostapd(&self, iface: &str, scanned: Option<u16>) -> Result<()> {
        let runner = self.runner;
        let cfg = &self.config;
        let country = &self.request.country;
        let bridged = cfg.network.bridged();
        let template = self.ap_template();

        let conf_path = match scanned {
            Some(channel) => {
                println!("Start with channel: {}", channel);
                let path = cfg.paths.temp_self_config();
                runner.render_conf(&template, &path, |t| {
                    conf::self_config_conf(t, iface, country, channel, bridged)
                })?;
                path
            }
            None => {
                println!("[*] configure file copied from: {}", template.display());
                let path = cfg.paths.temp_hostapd();
                let channel = self.request.role.ap_channel();
                runner.render_conf(&template, &path, |t| {
                    conf::hostapd_conf(t, iface, country, channel, bridged)
                })?;
                path
            }
        };

        runner.spawn(&self.hostapd_cmd(&conf_path))?;

        if self.request.security == Security::WpsPbc {
            runner.sleep(1).await;
            runner.run(&Cmd::sudo("hostapd_cli").arg("wps_pbc")).await?;
        }
        Ok(())
    }

    /// Starts hostapd on `iface`, bridges it if configured and enables NAT.
    pub async fn access_point(&self, iface: &str) -> Result<()> {
        let runner = self.runner;
        let cfg = &self.config;
        let role = &self.request.role;

        if role.is_relay() {
            println!("[*] Selfconfig is not used in RELAY mode.");
        }

        let scanned = if cfg.network.self_config {
            println!("[*] Self configuration start!");
            match self_config::run_scan(runner, cfg, &self.request.country).await? {
                SelfConfig::Channel(ch) => Some(ch),
                SelfConfig::Unsupported => None,
            }
        } else {
            println!("[*] Self configuration off");
            None
        };

        println!("[6] Start hostapd on {}", iface);
        self.start_hostapd(iface, scanned).await?;
        runner.sleep(3).await;

        if cfg.network.bridged() {
            network::bridge_access_point(runner, role, cfg, iface).await?;
        }

        println!("[7] Start NAT");
        network::start_nat(runner, role, cfg).await?;
        runner.sleep(3).await;

        println!("[8] ifconfig");
        runner.run(&Cmd::sudo("ifconfig")).await?;
        println!("HaLow AP ready");
        println!("{}", RULE);
        Ok(())
    }
}
