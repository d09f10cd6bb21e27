use thiserror::Error;

#[derive(Error, Debug)]
pub enum LauncherError {
    #[error("{0}")]
    Usage(String),

    #[error("Country '{0}' has no S1G or EU channel plan")]
    UnsupportedCountry(String),

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Command `{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Failed to bring up wlan0 after loading the module")]
    ModuleLoad,

    #[error("[self_configuration] No return best channel within {0} seconds")]
    SelfConfigTimeout(f64),

    #[error("No IP address assigned to {0} within {1} seconds")]
    IpTimeout(String, u64),

    #[error("Failed to read conf template: {0}")]
    Template(String),
}

impl LauncherError {
    pub fn usage(message: impl Into<String>) -> Self {
        LauncherError::Usage(message.into())
    }
}
