use clap::Parser;
use client::input::{parse_key, LocalInput};
use client::network::{Client, ClientSettings};
use client::rendering::LogRenderer;
use log::{info, warn};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:65432")]
    server: String,

    /// Render frames per second
    #[arg(long, default_value = "60")]
    render_fps: u32,

    /// Direction sends per second
    #[arg(long, default_value = "10")]
    send_rate: u32,
}

/// Reads keys from stdin, one line at a time.
async fn read_keys(input: Arc<LocalInput>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                for command in line.chars().filter_map(parse_key) {
                    input.apply(command);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read input: {}", e);
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Controls: W/A/S/D then Enter to steer, Q to quit");

    let settings = ClientSettings::from_rates(args.render_fps, args.send_rate)?;
    let client = Client::connect(&args.server).await?;
    let input = Arc::new(LocalInput::new());
    let keys = tokio::spawn(read_keys(Arc::clone(&input)));

    let mut renderer = LogRenderer::new();
    let result = client.run(&mut renderer, &input, settings).await;

    keys.abort();
    info!("Rendered {} frames", renderer.frames());
    result?;
    Ok(())
}
