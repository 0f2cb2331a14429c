use anyhow::Result;
use memfit_core::{ReportConfig, calculate_report};

use crate::commands::{load_analysis, read_json};

pub fn report(config: &str, image: &str, report: &str, json: bool) -> Result<()> {
    let analysis = load_analysis(config, image)?;
    let report_config: ReportConfig = read_json(report)?;
    let entries = calculate_report(&analysis, &report_config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for (id, entry) in &entries {
        println!(
            "{id}: {} of {} bytes used, {} free",
            entry.adjusted_used_bytes, entry.capacity_bytes, entry.free_bytes
        );
        for (bucket, bytes) in &entry.buckets {
            println!("  {bucket}: {bytes} bytes");
        }
    }
    Ok(())
}
