//! Symbol ownership and deduplication.
//!
//! Symbols arrive as flat nm-style records. Each one is attached to the
//! section whose virtual address interval contains it, then projected onto
//! every block assignment of that section, so a symbol in a section that
//! lives in both flash and RAM gets a location in each. Weak/strong alias
//! pairs emitted as separate records are merged afterwards.

use std::collections::HashMap;
use std::fmt;

use log::warn;
use serde::Serialize;

use crate::AnalysisWarning;
use crate::config::AddressKind;
use crate::record::{RawSymbol, SourceLocation};
use crate::section::{Section, SectionId};

/// Stable arena id of a symbol, assigned after deduplication.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct SymbolId(pub u32);

/// Broad symbol class derived from the nm type code.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Text,
    Data,
    Bss,
    #[serde(rename = "rodata")]
    ReadOnly,
    Absolute,
    Other,
}

impl SymbolKind {
    pub fn from_code(code: char) -> SymbolKind {
        match code.to_ascii_uppercase() {
            'T' => SymbolKind::Text,
            'D' | 'G' => SymbolKind::Data,
            // 'C' is a common symbol, uninitialized like bss.
            'B' | 'S' | 'C' => SymbolKind::Bss,
            'R' => SymbolKind::ReadOnly,
            'A' => SymbolKind::Absolute,
            _ => SymbolKind::Other,
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SymbolKind::Text => "text",
            SymbolKind::Data => "data",
            SymbolKind::Bss => "bss",
            SymbolKind::ReadOnly => "rodata",
            SymbolKind::Absolute => "absolute",
            SymbolKind::Other => "other",
        };
        write!(f, "{text}")
    }
}

/// The symbol projected onto one block assignment of its owning section.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolLocation {
    pub window: String,
    pub block: String,
    pub kind: AddressKind,
    pub address: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    /// Mangled name as the symbol tool printed it; empty when the tool
    /// already demangled.
    pub raw_name: String,
    pub address: u64,
    pub size: u64,
    pub kind: SymbolKind,
    pub weak: bool,
    pub local: bool,
    pub tls: bool,
    pub section: Option<SectionId>,
    /// Alternate mangled names folded in by deduplication.
    pub aliases: Vec<String>,
    pub locations: Vec<SymbolLocation>,
    /// Index into `locations` of the one matching the section's primary
    /// assignment.
    pub primary: Option<usize>,
    pub source: Option<SourceLocation>,
}

impl Symbol {
    pub fn primary_location(&self) -> Option<&SymbolLocation> {
        self.primary.and_then(|index| self.locations.get(index))
    }
}

/// Attach every raw symbol to its owning section, project it onto the
/// section's block assignments, then merge alias records. Symbols outside
/// every section are kept, with a warning, so callers still see them.
pub fn assign_symbols(
    sections: &[Section],
    raw_symbols: &[RawSymbol],
    warnings: &mut Vec<AnalysisWarning>,
) -> Vec<Symbol> {
    let mut symbols = Vec::with_capacity(raw_symbols.len());

    for raw in raw_symbols {
        let owner = sections
            .iter()
            .find(|section| section.contains_vma(raw.address))
            .and_then(|section| section.vma.map(|vma| (section, raw.address - vma)));

        let (section, tls, locations, primary) = match owner {
            Some((section, offset)) => {
                let locations: Vec<SymbolLocation> = section
                    .assignments
                    .iter()
                    .filter(|a| offset < a.size)
                    .map(|a| SymbolLocation {
                        window: a.window.clone(),
                        block: a.block.clone(),
                        kind: a.kind,
                        address: a.address + offset,
                    })
                    .collect();
                let primary = primary_location_index(section, &locations);
                (Some(section.id), section.flags.tls, locations, primary)
            }
            None => {
                warn!(
                    "symbol {} at {:#010x} is outside every section",
                    raw.name, raw.address
                );
                warnings.push(AnalysisWarning::OrphanSymbol {
                    name: raw.name.clone(),
                    address: raw.address,
                });
                (None, false, Vec::new(), None)
            }
        };

        symbols.push(Symbol {
            id: SymbolId(0),
            name: raw.name.clone(),
            raw_name: raw.raw_name.clone(),
            address: raw.address,
            size: raw.size,
            kind: SymbolKind::from_code(raw.type_code),
            weak: matches!(raw.type_code, 'w' | 'W' | 'v' | 'V'),
            local: raw.type_code.is_ascii_lowercase(),
            tls,
            section,
            aliases: Vec::new(),
            locations,
            primary,
            source: raw.source.clone(),
        });
    }

    dedup_symbols(symbols)
}

fn primary_location_index(section: &Section, locations: &[SymbolLocation]) -> Option<usize> {
    let wanted = section.primary_assignment()?;
    locations
        .iter()
        .position(|l| l.block == wanted.block && l.window == wanted.window && l.kind == wanted.kind)
        .or(if locations.is_empty() { None } else { Some(0) })
}

/// Merge symbols that share (address, size, name) into one logical symbol.
/// Flags union (true wins), alternate mangled names become aliases, and
/// locations union by their full key. Running this twice is a no-op, and ids
/// are reassigned in the surviving order.
pub fn dedup_symbols(symbols: Vec<Symbol>) -> Vec<Symbol> {
    let mut index: HashMap<(u64, u64, String), usize> = HashMap::with_capacity(symbols.len());
    let mut out: Vec<Symbol> = Vec::with_capacity(symbols.len());

    for symbol in symbols {
        let key = (symbol.address, symbol.size, symbol.name.clone());
        match index.get(&key) {
            Some(&at) => merge_into(&mut out[at], symbol),
            None => {
                index.insert(key, out.len());
                out.push(symbol);
            }
        }
    }

    for (position, symbol) in out.iter_mut().enumerate() {
        symbol.id = SymbolId(position as u32);
    }
    out
}

fn merge_into(kept: &mut Symbol, dup: Symbol) {
    kept.weak |= dup.weak;
    kept.local |= dup.local;
    kept.tls |= dup.tls;
    // Weak alias records carry no section class of their own.
    if kept.kind == SymbolKind::Other && dup.kind != SymbolKind::Other {
        kept.kind = dup.kind;
    }
    if kept.section.is_none() {
        kept.section = dup.section;
        kept.primary = dup.primary;
    }
    if kept.source.is_none() {
        kept.source = dup.source;
    }
    for alias in std::iter::once(dup.raw_name).chain(dup.aliases) {
        if !alias.is_empty() && alias != kept.raw_name && !kept.aliases.contains(&alias) {
            kept.aliases.push(alias);
        }
    }
    for location in dup.locations {
        if !kept.locations.contains(&location) {
            kept.locations.push(location);
        }
    }
}
