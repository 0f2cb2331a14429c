use anyhow::Result;
use memfit_core::generate_summaries;
use memfit_core::summary::{BankSummary, LayoutSpan, WindowSummary};

use crate::commands::load_analysis;

pub fn summary(config: &str, image: &str, json: bool) -> Result<()> {
    let analysis = load_analysis(config, image)?;
    let summaries = generate_summaries(&analysis);
    for warning in &summaries.warnings {
        log::warn!("{warning}");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    println!("total: {} bytes", summaries.total_bytes);
    for (category, bytes) in &summaries.category_totals {
        println!("  {category}: {bytes} bytes");
    }
    for window in summaries.windows.values() {
        print_window(window);
    }
    for bank in summaries.banks.values() {
        print_bank(bank);
    }
    Ok(())
}

fn print_window(window: &WindowSummary) {
    println!();
    println!("window {}: {} bytes", window.id, window.total_bytes);
    println!(
        "  exec {} / load {} / runtime {} bytes",
        window.kind_totals.exec, window.kind_totals.load, window.kind_totals.runtime
    );
    if let (Some(start), Some(end)) = (window.span_start, window.span_end) {
        println!(
            "  span {start:#010x}..{end:#010x}, padding {} bytes, largest gap {} bytes",
            window.padding_bytes, window.largest_gap
        );
    }
    for (block, bytes) in &window.block_totals {
        println!("  block {block}: {bytes} bytes");
    }
}

fn print_bank(bank: &BankSummary) {
    println!();
    println!(
        "bank {}: {} of {} bytes used ({} raw), {} reserved, {} free",
        bank.id,
        bank.adjusted_used_bytes,
        bank.capacity_bytes,
        bank.raw_used_bytes,
        bank.reserved_bytes,
        bank.free_bytes
    );
    for detail in &bank.rounding {
        println!(
            "  rounding [{}] granule {:#x} ({:?}): {:#x} -> {:#x} (delta {})",
            detail.blocks.join(", "),
            detail.granule_bytes,
            detail.mode,
            detail.raw_bytes,
            detail.adjusted_bytes,
            detail.delta_bytes
        );
    }
    println!("  layout:");
    for span in &bank.block_layout {
        print_span(span);
    }
}

fn print_span(span: &LayoutSpan) {
    print!(
        "    +{:06x} {:<8} {:<20} {:>8} bytes",
        span.offset, span.kind, span.label, span.size
    );
    if let Some(address) = span.address {
        print!("  @ {address:#010x}");
    }
    println!();
}
