//! Flat input records.
//!
//! These are the raw section and symbol records a toolchain adapter extracts
//! from an image (readelf/objdump section tables, nm symbol listings) before
//! the analyzer ever sees them. They carry no ids; the analyzer allocates
//! stable arena ids itself while building the derived model.

use serde::{Deserialize, Serialize};

/// Allocation and permission flags of a raw linker section.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SectionFlags {
    /// Section occupies memory in the running image.
    pub alloc: bool,
    pub exec: bool,
    pub write: bool,
    pub tls: bool,
}

/// One linker section as reported by the section-table dump.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSection {
    pub name: String,
    /// Execution (virtual) address. Absent for sections the linker never
    /// places, e.g. pure debug info.
    #[serde(rename = "vmaStart", default)]
    pub vma: Option<u64>,
    /// Distinct load address, present when the section loads somewhere else
    /// than it runs (initialized data staged in flash).
    #[serde(rename = "lmaStart", default)]
    pub lma: Option<u64>,
    pub size: u64,
    #[serde(default)]
    pub flags: SectionFlags,
}

/// Where a symbol was defined, when the adapter ran addr2line.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

/// One symbol as reported by the symbol-table dump.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSymbol {
    pub address: u64,
    #[serde(default)]
    pub size: u64,
    /// Single-letter nm-style type code (`T`, `d`, `B`, `w`, ...).
    pub type_code: char,
    /// Display (demangled) name.
    pub name: String,
    /// Mangled name as it appears in the symbol table. Empty means the
    /// display name is already the raw name.
    #[serde(default)]
    pub raw_name: String,
    #[serde(default)]
    pub source: Option<SourceLocation>,
}

/// Everything the adapter extracted from one firmware image.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSnapshot {
    #[serde(default)]
    pub sections: Vec<RawSection>,
    #[serde(default)]
    pub symbols: Vec<RawSymbol>,
}
