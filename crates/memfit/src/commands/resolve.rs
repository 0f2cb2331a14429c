use anyhow::Result;
use memfit_core::{AddressKind, AddressResolver};

use crate::commands::load_analysis;

pub fn resolve(
    config: &str,
    image: &str,
    address: u64,
    kind: Option<AddressKind>,
    json: bool,
) -> Result<()> {
    let analysis = load_analysis(config, image)?;
    let resolver = AddressResolver::new(&analysis);

    let Some(lookup) = resolver.resolve(address, kind) else {
        println!("{address:#010x}: nothing found");
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&lookup)?);
        return Ok(());
    }

    println!("{:#010x}:", lookup.address);
    if let Some(region) = &lookup.region {
        println!(
            "  region  {} / {} ({}) +{:#x}",
            region.window, region.block, region.kind, region.offset
        );
        if let Some(from_base) = region.offset_from_window_base {
            println!("          {from_base:#x} past the window base");
        }
    }
    if let Some(section) = &lookup.section {
        println!(
            "  section {} ({}) +{:#x}",
            section.name, section.kind, section.offset
        );
    }
    if let Some(symbol) = &lookup.symbol {
        println!(
            "  symbol  {} ({}) +{:#x} ({} bytes)",
            symbol.name, symbol.kind, symbol.offset, symbol.size
        );
    }
    Ok(())
}
