//! Memory-usage analysis for embedded firmware images.
//!
//! The analyzer takes flat section and symbol records extracted from a
//! compiled image, plus a target configuration describing the device's
//! memory layout, and builds a structured model of which bytes of flash and
//! RAM are consumed by what. The pipeline runs once per invocation:
//! sections are classified into categories, projected into logical blocks
//! at concrete addresses, symbols are attached to the sections containing
//! them, and the result can be aggregated into window/bank summaries,
//! resolved address by address, or folded into a named-bucket report.

use log::debug;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub mod config;
pub mod record;
pub mod report;
pub mod resolve;
pub mod section;
pub mod summary;
pub mod symbol;

pub use config::{AddressKind, ReportConfig, TargetConfig};
pub use record::{ImageSnapshot, RawSection, RawSymbol};
pub use report::{ReportEntry, ReportError, calculate_report};
pub use resolve::{AddressLookup, AddressResolver};
pub use section::{AssignError, BlockAssignment, ClassifyError, Section, SectionId};
pub use summary::{Summaries, generate_summaries};
pub use symbol::{Symbol, SymbolId, SymbolKind};

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Failed to classify sections")]
    Classify(#[from] ClassifyError),
    #[error("Failed to assign sections to logical blocks")]
    Assign(#[from] AssignError),
}

/// A recoverable finding surfaced alongside normal results, never thrown.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AnalysisWarning {
    /// A symbol's address fell outside every known section.
    OrphanSymbol { name: String, address: u64 },
    /// A reservation overlapped already laid-out bytes and was moved
    /// forward in the bank layout.
    ReservationOverlap {
        bank: String,
        reservation: String,
        configured_offset: u64,
        placed_offset: u64,
    },
}

impl fmt::Display for AnalysisWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisWarning::OrphanSymbol { name, address } => {
                write!(f, "symbol {name} at {address:#010x} is outside every section")
            }
            AnalysisWarning::ReservationOverlap {
                bank,
                reservation,
                configured_offset,
                placed_offset,
            } => write!(
                f,
                "bank {bank}: reservation {reservation} moved from {configured_offset:#x} to {placed_offset:#x}"
            ),
        }
    }
}

/// The full derived model of one firmware image. Owns its configuration so
/// every downstream operation is a function of the analysis alone.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub config: TargetConfig,
    pub sections: Vec<Section>,
    pub symbols: Vec<Symbol>,
    pub warnings: Vec<AnalysisWarning>,
}

/// Build the derived model from flat image records. Classifies every alloc
/// section, assigns each one to the logical blocks of its category, and
/// attaches symbols to the sections containing them. Configuration
/// inconsistencies abort with a typed error; data-quality findings land in
/// [`Analysis::warnings`].
///
/// # Examples
///
/// ```
/// use memfit_core::{ImageSnapshot, TargetConfig, analyze, generate_summaries};
///
/// let config: TargetConfig = serde_json::from_str(
///     r#"{
///         "categories": [{ "id": "code" }],
///         "rules": [{ "match": { "prefix": ".text" }, "category": "code" }],
///         "blocks": [{ "id": "flash_code", "category": "code", "window": "flash_win", "role": "exec" }],
///         "windows": [{ "id": "flash_win", "baseAddress": 134217728 }],
///         "banks": [{ "id": "flash", "capacityBytes": 65536, "windows": ["flash_win"] }]
///     }"#,
/// )
/// .unwrap();
/// let image: ImageSnapshot = serde_json::from_str(
///     r#"{
///         "sections": [{
///             "name": ".text",
///             "vmaStart": 134217728,
///             "size": 4096,
///             "flags": { "alloc": true, "exec": true }
///         }]
///     }"#,
/// )
/// .unwrap();
///
/// let analysis = analyze(config, &image.sections, &image.symbols).unwrap();
/// let summaries = generate_summaries(&analysis);
/// assert_eq!(summaries.banks["flash"].raw_used_bytes, 4096);
/// assert_eq!(summaries.banks["flash"].free_bytes, 61440);
/// ```
pub fn analyze(
    config: TargetConfig,
    raw_sections: &[RawSection],
    raw_symbols: &[RawSymbol],
) -> Result<Analysis, AnalysisError> {
    let categorized = section::classify_sections(&config, raw_sections)?;
    let sections = section::assign_blocks(&config, &categorized)?;
    debug!(
        "retained {} of {} sections",
        sections.len(),
        raw_sections.len()
    );

    let mut warnings = Vec::new();
    let symbols = symbol::assign_symbols(&sections, raw_symbols, &mut warnings);
    debug!(
        "{} symbols after merging, {} warnings",
        symbols.len(),
        warnings.len()
    );

    Ok(Analysis {
        config,
        sections,
        symbols,
        warnings,
    })
}
