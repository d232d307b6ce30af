use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::Context;

use crate::SyncOutcome;

/// Write the run's matches, plans and totals as pretty JSON.
pub fn write_report(outcome: &SyncOutcome, path: &Path) -> anyhow::Result<()> {
    let file = File::create(path)
        .with_context(|| format!("cannot create report {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), outcome)?;
    Ok(())
}
