use clap::Parser;
use log::{error, info, warn};
use server::config::ServerConfig;
use server::network::Server;
use shared::{
    GridSize, DEFAULT_PORT, DEFAULT_TICK_RATE, GRID_HEIGHT, GRID_WIDTH, MAX_CONNECTIONS_PER_ORIGIN,
};
use std::time::Duration;
use tokio::time::timeout;

#[derive(Parser, Debug)]
#[command(author, version, about = "Authoritative host for the snake arena", long_about = None)]
struct Args {
    /// IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Grid width in cells
    #[arg(long, default_value_t = GRID_WIDTH)]
    width: i32,

    /// Grid height in cells
    #[arg(long, default_value_t = GRID_HEIGHT)]
    height: i32,

    /// Simulation ticks per second
    #[arg(short, long, default_value_t = DEFAULT_TICK_RATE)]
    tick_rate: u32,

    /// Maximum simultaneous connections from one address
    #[arg(long, default_value_t = MAX_CONNECTIONS_PER_ORIGIN)]
    max_per_origin: usize,

    /// Maximum connected sessions
    #[arg(long, default_value = "8")]
    max_players: usize,

    /// Players required before the lobby countdown starts
    #[arg(long, default_value = "1")]
    min_players: usize,

    /// Lobby countdown in milliseconds
    #[arg(long, default_value = "3000")]
    lobby_wait_ms: u64,

    /// Per-write timeout towards a client in milliseconds
    #[arg(long, default_value = "200")]
    write_timeout_ms: u64,

    /// Seed for spawn placement
    #[arg(long, default_value = "24301")]
    seed: u64,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            listen_addr: format!("{}:{}", self.host, self.port),
            grid: GridSize::new(self.width, self.height),
            tick_rate: self.tick_rate,
            max_connections_per_origin: self.max_per_origin,
            max_players: self.max_players,
            min_players: self.min_players,
            lobby_wait: Duration::from_millis(self.lobby_wait_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            spawn_seed: self.seed,
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = Args::parse().into_config();
    info!(
        "Starting host: {}x{} grid at {} Hz",
        config.grid.width, config.grid.height, config.tick_rate
    );

    let server = Server::bind(config).await?;
    let shutdown = server.shutdown_handle();
    let mut run = tokio::spawn(server.run());

    tokio::select! {
        result = &mut run => {
            let summary = result??;
            info!(
                "Round finished after {} ticks with {} player(s)",
                summary.ticks,
                summary.players.len()
            );
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            shutdown.trigger();
            match timeout(Duration::from_secs(2), run).await {
                Ok(Ok(Ok(_))) => {}
                Ok(Ok(Err(e))) => error!("Server error during shutdown: {}", e),
                Ok(Err(e)) => error!("Server task panicked: {}", e),
                Err(_) => warn!("Shutdown timed out, exiting anyway"),
            }
        }
    }

    Ok(())
}
