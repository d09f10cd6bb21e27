//! Assembly of the `insmod nrc.ko` parameter list.

use std::fmt;

use crate::config::{AmpduMode, Config, SleepDuration};
use crate::error::LauncherError;
use crate::request::{LaunchRequest, Role};

/// Ordered `key=value` tokens handed to `insmod`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleParams(Vec<String>);

impl ModuleParams {
    fn push(&mut self, param: impl Into<String>) {
        self.0.push(param.into());
    }

    fn push_if(&mut self, cond: bool, param: impl Into<String>) {
        if cond {
            self.push(param);
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, param: &str) -> bool {
        self.0.iter().any(|p| p == param)
    }
}

impl fmt::Display for ModuleParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

/// Builds the driver parameters from the effective settings
/// (see [`Config::for_role`]).
pub fn module_params(cfg: &Config, request: &LaunchRequest) -> Result<ModuleParams, LauncherError> {
    let mut params = ModuleParams::default();
    let role = &request.role;
    let is_sta = role.is_sta();
    let power = &cfg.power;
    let mac = &cfg.mac;

    params.push(format!("hifspeed={}", cfg.spi.clock));
    params.push(format!("spi_bus_num={}", cfg.spi.bus_num));
    params.push(format!("spi_cs_num={}", cfg.spi.cs_num));
    params.push(format!("spi_gpio_irq={}", cfg.spi.gpio_irq));
    params.push(format!("spi_polling_interval={}", cfg.spi.polling_interval));

    params.push_if(
        cfg.general.fw_download,
        format!("fw_name={}", cfg.general.fw_name),
    );

    let sta_power_save = is_sta && power.power_save.is_enabled();
    if sta_power_save {
        params.push(format!("power_save={}", power.power_save.driver_value()));
        if power.power_save == crate::config::PowerSave::NonTim {
            let sleep = SleepDuration::parse(&power.sleep_duration)?;
            params.push(format!("sleep_duration={}", sleep.driver_value()));
        }
    }
    params.push_if(is_sta && power.idle_mode, "idle_mode=1");

    let bss_idle_role = matches!(role, Role::Ap { .. } | Role::Relay { .. } | Role::Sta);
    params.push_if(
        power.bss_max_idle_enable && bss_idle_role,
        format!("bss_max_idle={}", power.bss_max_idle),
    );

    params.push_if(mac.ndp_preq, "ndp_preq=1");
    params.push_if(mac.ndp_ack_1m, "ndp_ack_1m=1");
    params.push_if(
        mac.ampdu != AmpduMode::Auto,
        format!("ampdu_mode={}", mac.ampdu.driver_value()),
    );
    params.push_if(mac.sw_enc > 0, format!("sw_enc={}", mac.sw_enc));
    params.push_if(!mac.cqm_enable, "disable_cqm=1");
    params.push_if(
        power.listen_interval > 0,
        format!("listen_interval={}", power.listen_interval),
    );
    params.push_if(cfg.debug.driver, "debug_level_all=1");
    params.push_if(!mac.short_bcn_enable, "enable_short_bi=0");
    params.push_if(mac.discard_deauth, "discard_deauth=1");
    if cfg.debug.flow_control {
        params.push("debug_level_all=1");
        params.push("dbg_flow_control=1");
    }

    let band = request.country.band_param();
    params.push_if(
        band.is_some_and(|b| b.starts_with("kr_band")),
        band.unwrap_or_default(),
    );

    params.push_if(mac.legacy_ack_enable, "enable_legacy_ack=1");
    params.push_if(!mac.bitmap_encoding, "bitmap_encoding=0");
    params.push_if(!mac.reverse_scrambler, "reverse_scrambler=0");
    params.push_if(mac.beacon_bypass_enable, "enable_beacon_bypass=1");
    params.push_if(
        is_sta && (power.power_save.is_enabled() || power.idle_mode) && cfg.has_ps_gpio(),
        "power_save_gpio=17,14,1",
    );
    params.push(format!("bd_name={}", cfg.bd_name()));
    params.push_if(is_sta && !mac.support_ch_width, "support_ch_width=0");
    params.push_if(power.pretend, "ps_pretend=1");
    params.push_if(
        band.is_some_and(|b| b.starts_with("sg_band")),
        band.unwrap_or_default(),
    );
    params.push_if(
        cfg.rf.duty_cycle_enable,
        format!(
            "set_duty_cycle=1,{},{}",
            cfg.rf.duty_cycle_window, cfg.rf.duty_cycle_duration
        ),
    );
    params.push(format!("set_cca_threshold={}", cfg.rf.cca_threshold));

    let twt = &power.twt;
    if twt.is_enabled() {
        params.push(format!("twt_num={}", twt.num));
        params.push(format!("twt_sp={}", twt.sp));
        params.push(format!("twt_int={}", twt.interval));
        params.push(format!("twt_force_sleep={}", twt.force_sleep));
        params.push(format!("twt_num_in_group={}", twt.num_in_group));
        params.push(format!("twt_algo={}", twt.algo));
    }

    let auth = &mac.auth_control;
    params.push_if(
        auth.enable && matches!(role, Role::Ap { .. }),
        format!(
            "set_auth_control=1,{},{},{},{}",
            auth.slot, auth.ti_min, auth.ti_max, auth.scale
        ),
    );
    params.push_if(
        band.is_some_and(|b| b.starts_with("tw_band")),
        band.unwrap_or_default(),
    );

    Ok(params)
}
