use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use serde_json::Value;
use tokio_tungstenite::connect_async;

#[derive(Parser)]
#[command(name = "counter-cli")]
#[command(about = "Inspect a running connection counter", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3001")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check instance liveness and lifecycle state
    Health,
    /// Show the last count this instance has seen
    Count,
    /// Attach as a client and print count updates
    Watch {
        /// Stop after this many updates
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Health => {
            let res = client.get(format!("{}/healthcheck", cli.url)).send().await?;
            print_response(res).await?;
        }
        Commands::Count => {
            let res = client.get(format!("{}/count", cli.url)).send().await?;
            print_response(res).await?;
        }
        Commands::Watch { limit } => watch(&cli.url, limit).await?,
    }

    Ok(())
}

async fn watch(base: &str, limit: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let mut url = url::Url::parse(base)?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme).map_err(|_| "cannot derive websocket url")?;
    url.set_path("/ws");

    let (mut socket, _) = connect_async(url.as_str()).await?;
    eprintln!("Connected to {}", url);

    let mut seen = 0;
    while let Some(message) = socket.next().await {
        let message = message?;
        if !message.is_text() {
            continue;
        }
        let frame: Value = serde_json::from_str(message.to_text()?)?;
        println!("{}", frame["data"]["count"]);

        seen += 1;
        if limit.is_some_and(|limit| seen >= limit) {
            break;
        }
    }

    let _ = socket.close(None).await;
    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
