//! Reverse lookup from an address to whatever owns it.
//!
//! The resolver is built once from a completed analysis and precomputes
//! sorted interval lists per address kind, so a lookup is a couple of
//! bounded scans plus one binary search over the symbols.

use serde::Serialize;

use crate::Analysis;
use crate::config::AddressKind;
use crate::section::SectionId;
use crate::symbol::{SymbolId, SymbolKind};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionHit {
    pub window: String,
    pub block: String,
    pub kind: AddressKind,
    pub start: u64,
    pub size: u64,
    pub offset: u64,
    /// Offset from the window's configured base, when it has one below the
    /// queried address.
    pub offset_from_window_base: Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionHit {
    pub section: SectionId,
    pub name: String,
    pub kind: AddressKind,
    pub start: u64,
    pub size: u64,
    pub offset: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolHit {
    pub symbol: SymbolId,
    pub name: String,
    pub kind: SymbolKind,
    pub address: u64,
    pub size: u64,
    pub offset: u64,
}

/// Everything found at one address. `region`, `section` and `symbol` are
/// looked up independently; at least one of them is set.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressLookup {
    pub address: u64,
    pub region: Option<RegionHit>,
    pub section: Option<SectionHit>,
    pub symbol: Option<SymbolHit>,
}

#[derive(Clone, Debug)]
struct RegionInterval {
    start: u64,
    size: u64,
    window: String,
    block: String,
    kind: AddressKind,
    window_base: Option<u64>,
}

#[derive(Clone, Debug)]
struct SectionInterval {
    start: u64,
    size: u64,
    id: SectionId,
    name: String,
}

#[derive(Clone, Debug)]
struct SymbolInterval {
    address: u64,
    size: u64,
    id: SymbolId,
    name: String,
    kind: SymbolKind,
}

#[derive(Default)]
struct ByKind<T> {
    exec: T,
    load: T,
    runtime: T,
}

impl<T> ByKind<T> {
    fn get(&self, kind: AddressKind) -> &T {
        match kind {
            AddressKind::Exec => &self.exec,
            AddressKind::Load => &self.load,
            AddressKind::Runtime => &self.runtime,
        }
    }

    fn get_mut(&mut self, kind: AddressKind) -> &mut T {
        match kind {
            AddressKind::Exec => &mut self.exec,
            AddressKind::Load => &mut self.load,
            AddressKind::Runtime => &mut self.runtime,
        }
    }
}

pub struct AddressResolver {
    regions: ByKind<Vec<RegionInterval>>,
    sections: ByKind<Vec<SectionInterval>>,
    symbols: Vec<SymbolInterval>,
}

impl AddressResolver {
    pub fn new(analysis: &Analysis) -> AddressResolver {
        let config = &analysis.config;
        let mut regions: ByKind<Vec<RegionInterval>> = ByKind::default();
        let mut sections: ByKind<Vec<SectionInterval>> = ByKind::default();

        for section in &analysis.sections {
            for assignment in &section.assignments {
                let window_base = config
                    .window(&assignment.window)
                    .and_then(|w| w.base_address);
                regions.get_mut(assignment.kind).push(RegionInterval {
                    start: assignment.address,
                    size: assignment.size,
                    window: assignment.window.clone(),
                    block: assignment.block.clone(),
                    kind: assignment.kind,
                    window_base,
                });
            }

            if let Some(vma) = section.vma {
                let interval = SectionInterval {
                    start: vma,
                    size: section.size,
                    id: section.id,
                    name: section.name.clone(),
                };
                if section.flags.exec {
                    sections.get_mut(AddressKind::Exec).push(interval.clone());
                }
                sections.get_mut(AddressKind::Runtime).push(interval);
            }
            if let Some(lma) = section.lma.filter(|&lma| lma != 0) {
                sections.get_mut(AddressKind::Load).push(SectionInterval {
                    start: lma,
                    size: section.size,
                    id: section.id,
                    name: section.name.clone(),
                });
            }
        }

        for kind in AddressKind::DEFAULT_ORDER {
            regions.get_mut(kind).sort_by_key(|r| (r.start, r.size));
            sections.get_mut(kind).sort_by_key(|s| (s.start, s.size));
        }

        let mut symbols: Vec<SymbolInterval> = analysis
            .symbols
            .iter()
            .map(|symbol| SymbolInterval {
                address: symbol.address,
                size: symbol.size,
                id: symbol.id,
                name: symbol.name.clone(),
                kind: symbol.kind,
            })
            .collect();
        symbols.sort_by_key(|s| (s.address, s.size));

        AddressResolver {
            regions,
            sections,
            symbols,
        }
    }

    /// Look `address` up in the region, section and symbol indexes. The
    /// preferred kind is tried first; `None` means nothing owns the address.
    pub fn resolve(&self, address: u64, kind: Option<AddressKind>) -> Option<AddressLookup> {
        let order = preference_order(kind);

        let region = order
            .iter()
            .find_map(|&kind| first_containing(self.regions.get(kind), address))
            .map(|interval| RegionHit {
                window: interval.window.clone(),
                block: interval.block.clone(),
                kind: interval.kind,
                start: interval.start,
                size: interval.size,
                offset: address - interval.start,
                offset_from_window_base: interval
                    .window_base
                    .and_then(|base| address.checked_sub(base)),
            });

        let section = order
            .iter()
            .find_map(|&kind| {
                first_containing_by(self.sections.get(kind), address, |s| (s.start, s.size))
                    .map(|interval| (kind, interval))
            })
            .map(|(kind, interval)| SectionHit {
                section: interval.id,
                name: interval.name.clone(),
                kind,
                start: interval.start,
                size: interval.size,
                offset: address - interval.start,
            });

        let symbol = self.find_symbol(address).map(|interval| SymbolHit {
            symbol: interval.id,
            name: interval.name.clone(),
            kind: interval.kind,
            address: interval.address,
            size: interval.size,
            offset: address - interval.address,
        });

        if region.is_none() && section.is_none() && symbol.is_none() {
            return None;
        }
        Some(AddressLookup {
            address,
            region,
            section,
            symbol,
        })
    }

    /// Greatest symbol whose address is at or below the query, checked for
    /// containment. Zero-size symbols only match at their exact address.
    fn find_symbol(&self, address: u64) -> Option<&SymbolInterval> {
        let upper = self.symbols.partition_point(|s| s.address <= address);
        let greatest = self.symbols[..upper].last()?.address;
        self.symbols[..upper]
            .iter()
            .rev()
            .take_while(|s| s.address == greatest)
            .find(|s| {
                if s.size == 0 {
                    s.address == address
                } else {
                    address < s.address + s.size
                }
            })
    }
}

fn preference_order(kind: Option<AddressKind>) -> [AddressKind; 3] {
    match kind {
        None | Some(AddressKind::Runtime) => AddressKind::DEFAULT_ORDER,
        Some(AddressKind::Exec) => [AddressKind::Exec, AddressKind::Runtime, AddressKind::Load],
        Some(AddressKind::Load) => [AddressKind::Load, AddressKind::Runtime, AddressKind::Exec],
    }
}

fn first_containing(intervals: &[RegionInterval], address: u64) -> Option<&RegionInterval> {
    first_containing_by(intervals, address, |r| (r.start, r.size))
}

fn first_containing_by<T>(
    intervals: &[T],
    address: u64,
    bounds: impl Fn(&T) -> (u64, u64),
) -> Option<&T> {
    for interval in intervals {
        let (start, size) = bounds(interval);
        if start > address {
            break;
        }
        if address < start + size {
            return Some(interval);
        }
    }
    None
}
