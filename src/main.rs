use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use wgtund::cli::{commands, Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level().to_string().to_lowercase()));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Up {
            config,
            interface,
            port,
        } => commands::cmd_up(config, interface, port).await,
        Commands::Down { interface } => commands::cmd_down(interface).await,
        Commands::Status { interface } => commands::cmd_status(interface).await,
        Commands::Genkey => {
            commands::cmd_genkey();
            Ok(())
        }
        Commands::Pubkey => commands::cmd_pubkey(),
        Commands::ShowConfig => {
            commands::cmd_show_config();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
