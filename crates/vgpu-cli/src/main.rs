use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use vgpu_core::config::{default_config_path, VgpuConfig};
use vgpu_ipc_client::IpcClient;
use vgpu_protocol::Handle;
use vgpu_server::VgpuDaemon;

#[derive(Parser)]
#[command(name = "vgpu")]
#[command(about = "vgpu - Vulkan calls forwarded from a guest to the host driver")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the host daemon (replays guest calls against the native driver)
    Daemon {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<String>,

        /// Socket path to listen on
        #[arg(short, long)]
        socket: Option<String>,

        /// Native Vulkan library to load
        #[arg(short, long)]
        driver: Option<String>,

        /// Write PID to this file (for service managers)
        #[arg(long)]
        pid_file: Option<String>,
    },

    /// Send one PING to a running daemon
    Ping {
        /// Daemon socket path
        #[arg(short, long)]
        socket: Option<String>,
    },

    /// Create an instance and a device through a running daemon and print
    /// the handles it issues
    Probe {
        /// Daemon socket path
        #[arg(short, long)]
        socket: Option<String>,
    },
}

fn load_config(path: Option<String>) -> anyhow::Result<VgpuConfig> {
    let path = path.unwrap_or_else(default_config_path);
    VgpuConfig::load_or_default(&path).with_context(|| format!("reading {}", path))
}

fn guest_client(socket: Option<String>) -> anyhow::Result<IpcClient> {
    let config = load_config(None)?;
    Ok(match socket {
        Some(path) => IpcClient::new(path)
            .with_policy(config.guest.reconnect)
            .with_read_timeout(config.guest.read_timeout_ms.map(std::time::Duration::from_millis)),
        None => IpcClient::from_config(&config.guest),
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    vgpu_common::init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon {
            config,
            socket,
            driver,
            pid_file,
        } => {
            let mut daemon_config = load_config(config)?.daemon;
            if let Some(socket) = socket {
                daemon_config.socket_path = socket;
            }
            if let Some(driver) = driver {
                daemon_config.driver_library = driver;
            }

            info!(
                socket = %daemon_config.socket_path,
                driver = %daemon_config.driver_library,
                release_on_disconnect = daemon_config.release_on_disconnect,
                "starting vgpu daemon"
            );

            // The driver is loaded before anything touches the filesystem.
            let daemon = VgpuDaemon::load(daemon_config)?;

            if let Some(ref path) = pid_file {
                std::fs::write(path, std::process::id().to_string())?;
            }

            let result = daemon.run().await;

            if let Some(ref path) = pid_file {
                let _ = std::fs::remove_file(path);
            }

            result?;
        }

        Commands::Ping { socket } => {
            let client = guest_client(socket)?;
            client
                .ping()
                .with_context(|| format!("no answer from {}", client.path()))?;
            println!("daemon at {} is alive", client.path());
        }

        Commands::Probe { socket } => {
            let client = guest_client(socket)?;

            let instance = client.create_instance().context("CREATE_INSTANCE")?;
            println!("instance:         {}", instance);

            let count = client
                .enumerate_physical_devices(instance)
                .context("ENUM_PHYSICAL_DEVICES")?;
            println!("physical devices: {}", count);

            let device = client
                .create_device(Handle::NULL)
                .context("CREATE_DEVICE")?;
            println!("device:           {}", device);
        }
    }

    Ok(())
}
