//! HaLow Launcher Library
//!
//! This library brings up a Newracom Wi-Fi HaLow (IEEE 802.11ah) module on a
//! Raspberry Pi host. It loads the `nrc` kernel module with the right RF and
//! regulatory parameters and starts the userspace daemons for the selected
//! role: wpa_supplicant for a station, hostapd for an access point, wireshark
//! for a sniffer, both for a relay, and an 802.11s mesh node.
//!
//! # Modules
//!
//! - [`config`] - TOML settings with the EVK defaults and per-role overrides
//! - [`country`] - Country codes, channel plans and regulatory domains
//! - [`request`] - Typed form of the positional command line
//! - [`module_params`] - Kernel module parameter assembly
//! - [`runner`] - External command execution with dry-run support
//! - [`conf`] - hostapd / wpa_supplicant conf template editing
//! - [`self_config`] - CCA scan based channel selection
//! - [`network`] - NAT, DHCP/DNS services, bridges and address acquisition
//! - [`launcher`] - The launch sequence and per-role bring-up
//! - [`summary`] - Pre-launch banner
//! - [`error`] - Custom error types for the library
//!
//! # Example Usage
//!
//! ```no_run
//! use halow_launcher::{Config, LaunchRequest, Launcher, Runner};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! // Open WPA2 access point for the US channel plan
//! let request = LaunchRequest::from_args("1", "1", "US", &[])?;
//! let config = Config::load(None)?;
//! config.validate(&request)?;
//!
//! // Print the commands instead of running them
//! let runner = Runner::new(true, config.general.use_sudo);
//! Launcher::new(&runner, &config, &request).launch().await?;
//! # Ok(())
//! # }
//! ```

/// Configuration module for the launcher settings file.
/// Loads and saves TOML settings with the EVK defaults and applies per-role overrides.
pub mod config;

/// Country module for channel plans and regulatory domains.
/// Validates country codes and maps them to conf directories, `iw reg` codes and band parameters.
pub mod country;

/// Request module holding the typed form of the positional command line.
/// Turns `sta_type`, security mode, country and extras into a [`LaunchRequest`].
pub mod request;

/// Kernel module parameters.
/// Builds the ordered `key=value` list passed to `insmod nrc.ko`.
pub mod module_params;

/// Command execution module.
/// Runs, captures and spawns external programs, or only prints them in dry-run mode.
pub mod runner;

/// Conf module for hostapd and wpa_supplicant templates.
/// Line edits applied when rendering a template into its temp copy.
pub mod conf;

/// Self configuration module driving the firmware CCA scan.
/// Picks the least busy channel before hostapd starts.
pub mod self_config;

/// Network module for NAT, DHCP/DNS services and bridges.
/// Also waits for an IPv4 address once a station is associated.
pub mod network;

/// Launcher module running the shared bring-up sequence.
/// Loads the driver, then hands over to the STA, AP, sniffer, relay or mesh role.
pub mod launcher;

mod access_point;
mod mesh;
mod sniffer;
mod station;

/// Summary module for the pre-launch banner.
/// Renders the effective settings as a table or as JSON.
pub mod summary;

/// Error module defining custom error types for the library.
/// Uses `thiserror` for the launcher failure cases.
pub mod error;

// Re-export the settings type and its default location
pub use config::{config_path, Config};

// Re-export the main error type for library users
pub use error::LauncherError;

// Re-export the launch entry point
pub use launcher::Launcher;

// Re-export module parameter assembly for `--print-params`
pub use module_params::{module_params, ModuleParams};

// Re-export request types for building a launch from parsed arguments
pub use request::{LaunchRequest, MeshAddressing, MeshMode, Role, Security, SnifferMode};

// Re-export command execution items
pub use runner::{Cmd, Runner};

// Re-export the summary for printing before launch
pub use summary::{display_summary, Summary};
