//! agglo-client — send one request to a solver server's API channel and
//! print the reply parts.

use anyhow::Context;
use clap::Parser;
use zeromq::prelude::*;
use zeromq::{ReqSocket, ZmqMessage};

use agglo_server::api::{self, ApiPart, RETURN_OK};

/// Query the API channel of a running agglo-server.
#[derive(Parser, Debug)]
#[command(name = "agglo-client", version, about)]
struct Cli {
    /// API endpoint path to request, e.g. /help or /api/n5/all.
    endpoint: String,

    /// Address of the server's API channel.
    #[arg(long, env = "AGGLO_ADDRESS", default_value = "ipc:///tmp/agglo/solver")]
    address: String,

    /// Log level filter when RUST_LOG is unset.
    #[arg(long, env = "AGGLO_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_level.clone())),
        )
        .init();

    let mut socket = ReqSocket::new();
    socket
        .connect(&cli.address)
        .await
        .with_context(|| format!("failed to connect to {}", cli.address))?;

    socket
        .send(ZmqMessage::from(cli.endpoint.as_str()))
        .await
        .context("failed to send the request")?;
    let reply = socket.recv().await.context("failed to receive the reply")?;

    let Some(reply) = api::parse_reply(&reply).context("malformed reply")? else {
        println!("pong");
        return Ok(());
    };

    for part in &reply.parts {
        match part {
            ApiPart::Str(text) => println!("{}", text),
            ApiPart::Int(value) => println!("{}", value),
            ApiPart::Bytes(bytes) => println!("<{} bytes>", bytes.len()),
        }
    }

    if reply.return_code != RETURN_OK {
        eprintln!("return code {}", reply.return_code);
        std::process::exit(reply.return_code as i32);
    }
    Ok(())
}
