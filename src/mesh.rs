//! 802.11s mesh bring-up.
//!
//! The mesh link is run by wpa_supplicant from an `mp_halow_<open|sae>.conf`
//! template. A portal bridges the mesh with `eth0`, a mesh AP additionally
//! serves a regular AP on `wlan0` (the mesh then runs on `mesh0`). With
//! batman-adv enabled, routing happens on `bat0` and that is the interface
//! bridged and addressed.

use anyhow::Result;

use crate::conf;
use crate::launcher::{Launcher, RULE};
use crate::network::ifconfig;
use crate::request::{MacAddr, MeshAddressing, MeshMode, Security};
use crate::runner::Cmd;

impl Launcher<'_> {
    fn mesh_conf_suffix(&self) -> &'static str {
        match self.request.security {
            Security::Open => "open",
            _ => "sae",
        }
    }

    async fn bridge_mesh(&self, link: &str, members: &[&str]) -> Result<()> {
        let runner = self.runner;
        runner.run_quiet(&Cmd::sudo("brctl").args(["addbr", "br0"])).await;
        runner.run(&ifconfig([link, "0.0.0.0"])).await?;
        for &member in members {
            runner.run(&ifconfig([member, "0.0.0.0"])).await?;
            runner.run_quiet(&Cmd::sudo("brctl").args(["addif", "br0", member])).await;
        }
        runner.run(&Cmd::sudo("brctl").args(["addif", "br0", link])).await?;
        runner.run(&ifconfig(["br0", "up"])).await?;
        runner.run(&Cmd::sudo("brctl").arg("show")).await?;
        Ok(())
    }

    async fn address_mesh(&self, iface: &str, addressing: MeshAddressing) -> Result<()> {
        let runner = self.runner;
        match addressing {
            MeshAddressing::Static(ip) => {
                println!("[*] Static IP {} on {}", ip, iface);
                runner
                    .run(&ifconfig([
                        iface.to_string(),
                        ip.to_string(),
                        "netmask".to_string(),
                        "255.255.255.0".to_string(),
                        "up".to_string(),
                    ]))
                    .await?;
            }
            MeshAddressing::Dhcp => {
                runner.run(&Cmd::sudo("dhclient").args([iface, "-nw"])).await?;
            }
            MeshAddressing::NoDhcp => {
                println!("[*] No DHCP on {}", iface);
            }
        }
        Ok(())
    }

    /// Joins the mesh as portal, point or mesh AP.
    pub async fn mesh(
        &self,
        mode: MeshMode,
        peer: Option<&MacAddr>,
        addressing: MeshAddressing,
    ) -> Result<()> {
        let runner = self.runner;
        let cfg = &self.config;
        let request = self.request;
        let mesh_iface = if mode == MeshMode::AccessPoint { "mesh0" } else { "wlan0" };

        println!("[*] {} on {}", mode.name(), mesh_iface);
        runner
            .run_quiet(&Cmd::sudo("killall").args(["-9", "wpa_supplicant"]))
            .await;

        println!("[6] Start wpa_supplicant on {}", mesh_iface);
        let template = cfg.paths.template(
            request.country.conf_dir_name(),
            &format!("mp_halow_{}.conf", self.mesh_conf_suffix()),
        );
        let conf_path = cfg.paths.temp_mesh();
        runner.render_conf(&template, &conf_path, |t| {
            conf::supplicant_conf(t, &request.country)
        })?;

        let mut supplicant = Cmd::sudo("wpa_supplicant").args([
            format!("-i{}", mesh_iface),
            "-c".to_string(),
            Self::path_arg(&conf_path),
        ]);
        if cfg.debug.supplicant {
            supplicant = supplicant.arg("-dddd");
        }
        runner.spawn(&supplicant)?;
        runner.sleep(3).await;

        if let Some(peer) = peer {
            println!("[*] Add mesh peer {}", peer);
            runner
                .run(&Cmd::sudo("wpa_cli").args(["-i", mesh_iface, "mesh_peer_add", peer.as_str()]))
                .await?;
        }

        let link = if cfg.network.batman {
            println!("[*] Enable batman-adv on {}", mesh_iface);
            runner.check(&Cmd::sudo("modprobe").arg("batman-adv")).await?;
            runner
                .run(&Cmd::sudo("batctl").args(["if", "add", mesh_iface]))
                .await?;
            runner.run(&ifconfig(["bat0", "up"])).await?;
            "bat0"
        } else {
            mesh_iface
        };

        let address_iface = match mode {
            MeshMode::Portal => {
                println!("[*] Bridge {} with eth0", link);
                self.bridge_mesh(link, &["eth0"]).await?;
                "br0"
            }
            MeshMode::Point => link,
            MeshMode::AccessPoint => {
                println!("[*] Start hostapd on wlan0");
                self.start_hostapd("wlan0", None).await?;
                runner.sleep(3).await;
                self.bridge_mesh(link, &["wlan0"]).await?;
                "br0"
            }
        };

        println!("[7] Set IP address");
        self.address_mesh(address_iface, addressing).await?;

        println!("HaLow MESH ready");
        println!("{}", RULE);
        Ok(())
    }
}
