use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "slot-watcher")]
#[command(about = "Watches an appointment portal and alerts contacts when slots open")]
pub struct CliConfig {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "slot-watcher.toml")]
    pub config: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit JSON log lines instead of the compact format
    #[arg(long)]
    pub json_logs: bool,

    /// Wait for GET /start on the HTTP trigger instead of starting immediately
    #[arg(long)]
    pub serve: bool,

    /// Override the server port from config
    #[arg(long)]
    pub port: Option<u16>,

    /// Log process CPU/memory with every liveness ping
    #[arg(long)]
    pub monitor: bool,

    /// Dry run - show queries and pending introductions without contacting anyone
    #[arg(long)]
    pub dry_run: bool,
}
