mod cli;
mod client;
mod command;
mod device;
mod error;
mod server;
mod service;
mod session;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::run().await
}
