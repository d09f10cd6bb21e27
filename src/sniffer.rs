use anyhow::Result;

use crate::launcher::{Launcher, RULE};
use crate::network::ifconfig;
use crate::request::SnifferMode;
use crate::runner::Cmd;

const WIRESHARK_ARGS: [&str; 5] = ["-i", "wlan0", "-k", "-S", "-l"];

impl Launcher<'_> {
    /// Puts `wlan0` in monitor mode on `channel` and opens wireshark on it.
    ///
    /// A remote sniffer is run from a desktop session on the Pi, so wireshark
    /// is elevated through `lxqt-sudo` instead of `sudo`.
    pub async fn sniffer(&self, channel: u16, mode: SnifferMode) -> Result<()> {
        let runner = self.runner;
        let reg = self.request.country.regulatory_code();

        println!("[6] Setting Monitor Mode");
        runner.sleep(3).await;
        runner.run(&ifconfig(["wlan0", "down"])).await?;
        runner
            .run(&Cmd::sudo("iw").args(["dev", "wlan0", "set", "type", "monitor"]))
            .await?;
        runner.run(&ifconfig(["wlan0", "up"])).await?;

        println!("[7] Setting Country: {}", reg);
        runner.run(&Cmd::sudo("iw").args(["reg", "set", reg])).await?;
        runner.sleep(3).await;

        println!("[8] Setting Channel: {}", channel);
        runner
            .run(&Cmd::sudo("iw").args([
                "dev".to_string(),
                "wlan0".to_string(),
                "set".to_string(),
                "channel".to_string(),
                channel.to_string(),
            ]))
            .await?;
        runner.sleep(3).await;

        println!("[9] Start Sniffer");
        let wireshark = match mode {
            SnifferMode::Local => Cmd::sudo("wireshark").args(WIRESHARK_ARGS),
            SnifferMode::Remote => Cmd::new("lxqt-sudo")
                .arg("wireshark")
                .args(WIRESHARK_ARGS),
        };
        runner.spawn(&wireshark)?;

        println!("HaLow SNIFFER ready");
        println!("{}", RULE);
        Ok(())
    }
}
