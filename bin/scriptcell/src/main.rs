mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "scriptcell")]
#[command(about = "Sandboxed page-automation script engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize scriptcell configuration and an example script
    Onboard {
        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Show current configuration status
    Status,

    /// List scripts matching a page locator
    Scripts {
        /// Page locator to match against
        #[arg(short, long)]
        url: String,

        /// Scripts directory (defaults to the configured one)
        #[arg(long)]
        dir: Option<String>,
    },

    /// Load a page and run every matching script
    Run {
        /// HTML file standing in for the live page
        #[arg(short, long)]
        page: String,

        /// Page locator the page lives at
        #[arg(short, long)]
        url: String,

        /// Scripts directory (defaults to the configured one)
        #[arg(long)]
        dir: Option<String>,

        /// Additional locators to replay as navigations, in order
        #[arg(long)]
        navigate: Vec<String>,
    },

    /// Invoke one handler of a loaded script
    Invoke {
        /// HTML file standing in for the live page
        #[arg(short, long)]
        page: String,

        /// Page locator the page lives at
        #[arg(short, long)]
        url: String,

        /// Script id
        #[arg(short, long)]
        script: String,

        /// Handler name
        #[arg(long)]
        handler: String,

        /// Scripts directory (defaults to the configured one)
        #[arg(long)]
        dir: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    match cli.command {
        Commands::Onboard { force } => commands::onboard(force),
        Commands::Status => commands::status(),
        Commands::Scripts { url, dir } => commands::scripts_list(&url, dir).await,
        Commands::Run { page, url, dir, navigate } => {
            commands::run(&page, &url, dir, &navigate).await
        }
        Commands::Invoke { page, url, script, handler, dir } => {
            commands::invoke(&page, &url, dir, &script, &handler).await
        }
    }
}
