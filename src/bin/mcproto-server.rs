//! Standalone server with a minimal chat game on top.
//!
//! Run with: `cargo run --bin mcproto-server -- [config.toml]`
//!
//! Without a path the configuration comes from `MCPROTO_*` environment
//! variables and defaults.

use mcproto::config::NetworkConfig;
use mcproto::error::Result;
use mcproto::protocol::clientbound::{self, ChatPosition};
use mcproto::protocol::{Event, EventKind};
use mcproto::transport::Server;
use mcproto::utils::logging::init_logging;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Server failed");
        eprintln!("mcproto-server: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => NetworkConfig::from_file(path)?,
        None => NetworkConfig::from_env()?,
    };
    init_logging(&config.logging)?;

    let server = Server::new(config)?;
    register_chat(&server);

    let handle = server.handle();
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received CTRL+C signal, shutting down");
            handle.shutdown();
        }
    });

    server.run().await
}

fn register_chat(server: &Server) {
    let dispatcher = server.dispatcher();

    dispatcher.on(EventKind::LoginComplete, |ctx, event| {
        if let Event::LoginComplete(login) = event {
            let joined = format!("{} joined the game", login.name);
            ctx.send(clientbound::chat_message(
                "Welcome to mcproto",
                ChatPosition::System,
            )?)?;
            ctx.broadcast(&clientbound::chat_message(&joined, ChatPosition::System)?);
        }
        Ok(())
    });

    dispatcher.on(EventKind::ChatMessage, |ctx, event| {
        if let Event::ChatMessage(chat) = event {
            let name = ctx.record().name.clone().unwrap_or_default();
            let line = format!("<{name}> {}", chat.message);
            info!(conn_id = ctx.id(), "{line}");
            ctx.broadcast(&clientbound::chat_message(&line, ChatPosition::Chat)?);
        }
        Ok(())
    });
}
