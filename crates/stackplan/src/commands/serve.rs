use tokio::net::TcpListener;

use crate::error::{CommandError, Result};
use crate::gateway;
use crate::prelude::*;
use crate::state_store::StateStore;
use crate::Global;

/// Serve the stack's routes locally.
#[derive(Debug, clap::Parser)]
#[command(long_about = "Serve the stack's route tree with a local gateway emulator.

OPTIONS requests answer with the stack's preflight response. Requests bound to
a function answer with a JSON description of the function that would run.")]
pub struct ServeCommand {
    /// Host address to bind the server to
    #[arg(long, short = 'H', default_value = "127.0.0.1", env = "HOST")]
    pub host: String,

    /// Port to listen on
    #[arg(long, short, default_value = "3000", env = "PORT")]
    pub port: u16,
}

pub async fn run(cmd: ServeCommand, global: &Global) -> Result<()> {
    let stack = super::load_stack(&global.config).await?;
    let state = StateStore::new(&global.state).load(stack.name()).await?;
    let app = gateway::create_gateway(&stack, &state)?;

    let addr = format!("{}:{}", cmd.host, cmd.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(CommandError::Server)?;

    if !global.is_silent() {
        aprintln!("{} http://{}", p_b("Serving"), addr);
    }

    gateway::serve(app, listener)
        .await
        .map_err(CommandError::Server)
}
