use anyhow::Result;
use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use halow_launcher::{
    display_summary, Config, LaunchRequest, Launcher, LauncherError, Runner, Summary,
};

const EXAMPLES: &str = "\
Examples:
  OPEN mode STA for US                 : halow-launcher 0 0 US
  Security mode AP for US              : halow-launcher 1 1 US
  Local Sniffer mode on CH 40 for Japan: halow-launcher 2 0 JP 40 0
  SAE mode Mesh AP for US              : halow-launcher 4 3 US 2
  Mesh Point with static ip            : halow-launcher 4 3 US 1 192.168.222.1
  Mesh Point with manual peering       : halow-launcher 4 3 US 1 8c:0f:fa:00:29:46
  Mesh Point with manual peering & ip  : halow-launcher 4 3 US 1 8c:0f:fa:00:29:46 192.168.222.1

Note:
  sniffer_mode should be set as '1' when running sniffer on remote terminal
  MPP, MP mode support only Open, WPA3-SAE security mode";

#[derive(Parser)]
#[command(name = "halow-launcher")]
#[command(about = "Bring up a Wi-Fi HaLow module as STA, AP, sniffer, relay or mesh node")]
#[command(version)]
#[command(after_help = EXAMPLES)]
struct Cli {
    /// Station type [0:STA | 1:AP | 2:SNIFFER | 3:RELAY | 4:MESH]
    sta_type: String,

    /// Security mode [0:Open | 1:WPA2-PSK | 2:WPA3-OWE | 3:WPA3-SAE | 4:WPS-PBC]
    security_mode: String,

    /// Country [US JP AU NZ CN K1 K2 S8 S9 T8 T9, or an EU channel plan country (EU, GB, SA)]
    country: String,

    /// AP/RELAY: [channel]. SNIFFER: <channel> <sniffer_mode 0:Local|1:Remote>.
    /// MESH: <mesh_mode 0:MPP|1:MP|2:MAP> [peer_mac] [ip|nodhcp]
    extra: Vec<String>,

    /// Print the commands instead of executing them
    #[arg(long)]
    dry_run: bool,

    /// Settings file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Debug logging and command echo
    #[arg(short, long)]
    verbose: bool,

    /// Print the launch summary as JSON
    #[arg(long)]
    json: bool,

    /// Print the kernel module parameters and exit
    #[arg(long)]
    print_params: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<LauncherError>() {
            Some(LauncherError::Usage(_) | LauncherError::UnsupportedCountry(_)) => {
                eprintln!("error: {}", e);
                eprintln!();
                eprintln!("{}", Cli::command().render_help());
                ExitCode::from(2)
            }
            _ => {
                eprintln!("Error: {:#}", e);
                ExitCode::FAILURE
            }
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    if cli.dry_run {
        println!("[dry-run] Enabled: commands will be printed but not executed");
    }

    let request =
        LaunchRequest::from_args(&cli.sta_type, &cli.security_mode, &cli.country, &cli.extra)?;

    let config = Config::load(cli.config.as_deref())?;
    config.validate(&request)?;

    let runner = Runner::new(cli.dry_run, config.general.use_sudo).with_echo(cli.verbose);
    let launcher = Launcher::new(&runner, &config, &request);

    if cli.print_params {
        println!("{}", launcher.module_params()?);
        return Ok(());
    }

    let summary = Summary::new(&request, launcher.config());
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        display_summary(&summary);
    }

    launcher.launch().await
}
