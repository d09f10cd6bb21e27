//! Line-oriented editing of hostapd / wpa_supplicant conf templates.
//!
//! Templates ship per country under `conf/<country>/`. They are never edited
//! in place: the launcher renders an edited copy into `conf/temp_*.conf` and
//! points the daemon at the copy.

use crate::country::Country;

/// hostapd templates keep `interface=` on this line.
const INTERFACE_LINE: usize = 4;

fn edit_lines<F>(text: &str, f: F) -> String
where
    F: FnOnce(Vec<String>) -> Vec<String>,
{
    let lines = text.lines().map(str::to_string).collect();
    let mut out = f(lines).join("\n");
    if text.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Replaces line `n` (1-based). Text shorter than `n` lines is left alone.
pub fn set_line(text: &str, n: usize, line: &str) -> String {
    edit_lines(text, |mut lines| {
        if let Some(l) = n.checked_sub(1).and_then(|i| lines.get_mut(i)) {
            *l = line.to_string();
        }
        lines
    })
}

/// Rewrites every `key=...` line to `key=value`.
pub fn replace_key(text: &str, key: &str, value: &str) -> String {
    let prefix = format!("{}=", key);
    edit_lines(text, |lines| {
        lines
            .into_iter()
            .map(|l| {
                if l.starts_with(&prefix) {
                    format!("{}{}", prefix, value)
                } else {
                    l
                }
            })
            .collect()
    })
}

/// Drops every line containing `needle`.
pub fn delete_matching(text: &str, needle: &str) -> String {
    edit_lines(text, |lines| {
        lines.into_iter().filter(|l| !l.contains(needle)).collect()
    })
}

/// Inserts `line` after the first `key=...` line.
pub fn insert_after_key(text: &str, key: &str, line: &str) -> String {
    let prefix = format!("{}=", key);
    edit_lines(text, |mut lines| {
        if let Some(i) = lines.iter().position(|l| l.starts_with(&prefix)) {
            lines.insert(i + 1, line.to_string());
        }
        lines
    })
}

/// Comments or uncomments the WDS/bridge block of an AP template.
///
/// The block spans from a line mentioning `wds_sta` to the next line
/// mentioning `bridge`. Enabling strips the first run of `#` from each line;
/// disabling leaves each line with exactly one leading `#`.
pub fn toggle_wds_block(text: &str, enabled: bool) -> String {
    edit_lines(text, |lines| {
        let mut in_block = false;
        lines
            .into_iter()
            .map(|l| {
                let starts = !in_block && l.contains("wds_sta");
                if !in_block && !starts {
                    return l;
                }
                in_block = !(!starts && l.contains("bridge"));
                if enabled {
                    strip_first_hash_run(&l)
                } else {
                    format!("#{}", l.trim_start_matches('#'))
                }
            })
            .collect()
    })
}

fn strip_first_hash_run(line: &str) -> String {
    match line.find('#') {
        Some(start) => {
            let end = line[start..]
                .find(|c| c != '#')
                .map_or(line.len(), |off| start + off);
            format!("{}{}", &line[..start], &line[end..])
        }
        None => line.to_string(),
    }
}

/// hostapd conf for a regular (non self-configured) AP start.
pub fn hostapd_conf(
    template: &str,
    interface: &str,
    country: &Country,
    channel: Option<u16>,
    bridged: bool,
) -> String {
    let mut conf = toggle_wds_block(template, bridged);
    conf = set_line(&conf, INTERFACE_LINE, &format!("interface={}", interface));
    if country.is_eu() {
        conf = replace_key(&conf, "country_code", country.code());
    }
    if let Some(ch) = channel {
        conf = replace_key(&conf, "channel", &ch.to_string());
        if country.code() == "US" && (1..=13).contains(&ch) {
            conf = replace_key(&conf, "hw_mode", "g");
        }
    }
    conf
}

/// hostapd conf pinned to the channel picked by the self-configuration scan.
///
/// S1G channels below 36 map onto 2.4 GHz (`hw_mode=g`), the rest onto
/// 5 GHz (`hw_mode=a`).
pub fn self_config_conf(
    template: &str,
    interface: &str,
    country: &Country,
    best_channel: u16,
    bridged: bool,
) -> String {
    let mut conf = toggle_wds_block(template, bridged);
    conf = set_line(&conf, INTERFACE_LINE, &format!("interface={}", interface));
    for needle in ["channel=", "hw_mode=", "#ssid="] {
        conf = delete_matching(&conf, needle);
    }
    let hw_mode = if best_channel < 36 { "hw_mode=g" } else { "hw_mode=a" };
    conf = insert_after_key(&conf, "ssid", hw_mode);
    conf = insert_after_key(&conf, "hw_mode", &format!("channel={}", best_channel));
    replace_key(&conf, "country_code", country.regulatory_code())
}

/// wpa_supplicant conf (STA and mesh). EU templates carry a placeholder
/// country that is replaced by the requested one.
pub fn supplicant_conf(template: &str, country: &Country) -> String {
    if country.is_eu() {
        replace_key(template, "country", country.code())
    } else {
        template.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AP_TEMPLATE: &str = "\
ctrl_interface=/var/run/hostapd
#country_code=US
country_code=US
interface=wlan0
#ssid=old_name
ssid=halow_demo
hw_mode=a
channel=153
ieee80211n=1
#wds_sta=1
#bridge=br0
wpa=2
";

    fn country(code: &str) -> Country {
        Country::parse(code).unwrap()
    }

    #[test]
    fn set_line_replaces_only_existing_line() {
        assert_eq!(set_line("a\nb\nc\n", 2, "x"), "a\nx\nc\n");
        assert_eq!(set_line("a\nb", 5, "x"), "a\nb");
        assert_eq!(set_line("a\nb", 0, "x"), "a\nb");
    }

    #[test]
    fn wds_block_toggle() {
        let on = toggle_wds_block(AP_TEMPLATE, true);
        assert!(on.contains("\nwds_sta=1\nbridge=br0\n"));
        assert!(on.contains("#ssid=old_name"));

        let off = toggle_wds_block(&on, false);
        assert!(off.contains("\n#wds_sta=1\n#bridge=br0\n"));

        let double = toggle_wds_block("##wds_sta=1\nbridge=br0\nwpa=2", false);
        assert_eq!(double, "#wds_sta=1\n#bridge=br0\nwpa=2");
    }

    #[test]
    fn wds_block_stops_at_bridge_line() {
        let text = "wds_sta=1\nwds_bridge=\nbridge=br0\nssid=x\n";
        let off = toggle_wds_block(text, false);
        assert_eq!(off, "#wds_sta=1\n#wds_bridge=\nbridge=br0\nssid=x\n");
    }

    #[test]
    fn hostapd_conf_for_eu_with_channel() {
        let conf = hostapd_conf(AP_TEMPLATE, "wlan1", &country("DE"), Some(28), false);
        assert!(conf.contains("\ninterface=wlan1\n"));
        assert!(conf.contains("\ncountry_code=DE\n"));
        assert!(conf.contains("\nchannel=28\n"));
        assert!(conf.contains("\nhw_mode=a\n"));
        assert!(conf.contains("#country_code=US"));
    }

    #[test]
    fn hostapd_conf_us_low_channel_forces_hw_mode_g() {
        let conf = hostapd_conf(AP_TEMPLATE, "wlan0", &country("US"), Some(6), true);
        assert!(conf.contains("\nhw_mode=g\n"));
        assert!(conf.contains("\nchannel=6\n"));
        assert!(conf.contains("\nwds_sta=1\n"));

        let conf = hostapd_conf(AP_TEMPLATE, "wlan0", &country("US"), None, false);
        assert!(conf.contains("\nchannel=153\n"));
    }

    #[test]
    fn self_config_conf_pins_channel() {
        let conf = self_config_conf(AP_TEMPLATE, "wlan0", &country("K1"), 40, false);
        let lines: Vec<&str> = conf.lines().collect();
        let ssid = lines.iter().position(|l| *l == "ssid=halow_demo").unwrap();
        assert_eq!(lines[ssid + 1], "hw_mode=a");
        assert_eq!(lines[ssid + 2], "channel=40");
        assert!(!conf.contains("#ssid="));
        assert!(!conf.contains("channel=153"));
        assert!(conf.contains("\ncountry_code=KR\n"));
        assert!(conf.contains("\ninterface=wlan0\n"));

        let conf = self_config_conf(AP_TEMPLATE, "wlan0", &country("US"), 3, false);
        assert!(conf.contains("ssid=halow_demo\nhw_mode=g\nchannel=3\n"));
    }

    #[test]
    fn supplicant_conf_only_patches_eu() {
        let template = "ctrl_interface=/var/run/wpa_supplicant\ncountry=DE\nnetwork={\n}\n";
        assert!(supplicant_conf(template, &country("FR")).contains("\ncountry=FR\n"));
        assert_eq!(supplicant_conf(template, &country("US")), template);
    }
}
