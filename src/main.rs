use std::path::Path;

use anyhow::Context;
use burn::backend::ndarray::NdArrayDevice;
use burn::backend::NdArray;
use log::info;

use scrawl::preprocessing::ChannelPolicy;
use scrawl::recognizer::{Recognizer, DEFAULT_CHECKPOINT};
use scrawl::server::WsServer;

type Backend = NdArray<f32>;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let host = std::env::var("SCRAWL_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
    let port = match std::env::var("SCRAWL_PORT") {
        Ok(port) => port
            .parse::<u16>()
            .with_context(|| format!("Invalid SCRAWL_PORT value {port:?}"))?,
        Err(_) => DEFAULT_PORT,
    };

    // The checkpoint must load cleanly before we bind the listener; a
    // missing or mismatched checkpoint is fatal here, not at request time.
    info!("Loading checkpoint {DEFAULT_CHECKPOINT}");
    let recognizer = Recognizer::<Backend>::from_checkpoint(
        Path::new(DEFAULT_CHECKPOINT),
        NdArrayDevice::default(),
        ChannelPolicy::AlphaAsInk,
    )
    .context("Failed to load the model checkpoint")?;

    WsServer::new(recognizer).serve(&host, port).await
}
