use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

mod config;
mod dashboard;
mod error;
mod server;
mod sheets;
mod store;
mod types;

use config::Config;

#[derive(Parser, Debug)]
#[command(name = "segreteria")]
#[command(about = "CRM backend for a children's activity studio")]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the API server (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Print the dashboard counts and exit
    Stats,
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level))
        .add_directive("hyper=warn".parse().unwrap())
        .add_directive("tower_http=warn".parse().unwrap())
        .add_directive("reqwest=warn".parse().unwrap());

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_max_level(Level::TRACE)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(&args.log_level);

    let config = Config::from_env()?;

    match args.command {
        // Default to serve if no command specified
        None => {
            server::serve(8080, config).await?;
        }
        Some(Commands::Serve { port }) => {
            server::serve(port, config).await?;
        }
        Some(Commands::Stats) => {
            let state = server::app_state(&config)?;
            let leads = state.leads.all().await?;
            let students = state.students.all().await?;
            let today = chrono::Local::now().date_naive();

            let stats = dashboard::stats(&leads, &students, today);
            info!(
                total_leads = stats.total_leads,
                hot_leads = stats.hot_leads,
                today_followups = stats.today_followups,
                active_students = stats.active_students,
                "Dashboard"
            );
        }
    }

    Ok(())
}
