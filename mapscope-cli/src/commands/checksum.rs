use std::path::Path;

use anyhow::Context;
use mapscope::network::ArtifactChecksum;
use serde::Serialize;

use crate::{app::GlobalOptions, output::print_output};

#[derive(Debug, Serialize)]
pub struct ChecksumInfo {
    pub path: String,
    pub sha1: String,
}

pub fn run(path: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let checksum = ArtifactChecksum::from_file(path)
        .with_context(|| format!("failed to hash artifact: {}", path.display()))?;

    let info = ChecksumInfo {
        path: path.display().to_string(),
        sha1: checksum.to_string(),
    };
    print_output(&info, opts, |info| println!("{}  {}", info.sha1, info.path))
}
