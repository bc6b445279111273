//! HTTP service command: `brodesk serve`.

use anyhow::Result;
use brodesk::config::DeskConfig;
use brodesk::desk::server::{ServerConfig, start_server};

use super::open_db;

pub async fn cmd_serve(
    config: &DeskConfig,
    port: Option<u16>,
    host: Option<String>,
    dev: bool,
) -> Result<()> {
    // Require an initialized data directory.
    drop(open_db(config)?);

    let mut server = ServerConfig::from_config(config);
    if let Some(port) = port {
        server.port = port;
    }
    if let Some(host) = host {
        server.host = host;
    }
    server.dev_mode |= dev;

    start_server(server).await
}
