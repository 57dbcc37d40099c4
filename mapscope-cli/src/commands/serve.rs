use std::{net::IpAddr, path::Path};

use anyhow::Context;
use log::info;
use mapscope::{
    network::{ArtifactChecksum, ServerConfig, SyncServer},
    BidirectionalMapper,
};
use serde::Serialize;

use crate::{app::GlobalOptions, output::print_output};

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub address: String,
    pub checksum: String,
    pub mappings: usize,
}

pub fn run(
    jar: &Path,
    bind: IpAddr,
    port: u16,
    password: Option<&str>,
    opts: &GlobalOptions,
) -> anyhow::Result<()> {
    let checksum = ArtifactChecksum::from_file(jar)
        .with_context(|| format!("failed to hash artifact: {}", jar.display()))?;

    let mut config = ServerConfig::default()
        .with_bind(bind)
        .with_port(port)
        .with_checksum(checksum);
    if let Some(password) = password {
        config = config.with_password(password);
    }

    let (stop, stopped) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = stop.try_send(());
    })
    .context("failed to set Ctrl+C handler")?;

    let server = SyncServer::start(config, BidirectionalMapper::default())
        .with_context(|| format!("failed to listen on {bind}:{port}"))?;
    let address = server.local_addr();
    info!("Serving {} ({checksum}), press Ctrl+C to stop", jar.display());

    stopped
        .recv()
        .context("Ctrl+C handler disconnected")?;

    let mapper = server.stop().context("server did not shut down cleanly")?;
    let summary = SessionSummary {
        address: address.to_string(),
        checksum: checksum.to_string(),
        mappings: mapper.obf_to_deobf().len(),
    };
    print_output(&summary, opts, |summary| {
        println!(
            "Session on {} ended with {} mappings",
            summary.address, summary.mappings
        );
    })
}
