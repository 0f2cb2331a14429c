//! Target-description entities.
//!
//! A target configuration tells the analyzer how the device's memory is put
//! together: which hardware banks exist, which address windows they are made
//! of, which logical blocks live in those windows, and how raw linker
//! sections map onto block categories. The configuration is loaded from JSON
//! by the caller and stays immutable for the whole run.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The address a logical block selects from a section, and equally the role
/// the block plays inside its window.
///
/// This is a closed set: a configuration naming any other role fails to
/// deserialize instead of being silently defaulted.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    /// The section's execution (virtual) address.
    Exec,
    /// The section's load address, falling back to the virtual address when
    /// the image has no distinct load placement.
    Load,
    /// The synthetic runtime address; behaves like `Exec` for address math
    /// but marks blocks that only exist once the image is running.
    #[default]
    Runtime,
}

impl AddressKind {
    /// Lookup preference used by the address resolver when the caller did
    /// not ask for a specific kind.
    pub const DEFAULT_ORDER: [AddressKind; 3] =
        [AddressKind::Runtime, AddressKind::Exec, AddressKind::Load];
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressKind::Exec => write!(f, "exec"),
            AddressKind::Load => write!(f, "load"),
            AddressKind::Runtime => write!(f, "runtime"),
        }
    }
}

/// A semantic grouping of sections, e.g. `code` or `zero_init`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionCategory {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// How a [`SectionRule`] matches a section name.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionMatch {
    Equals(String),
    Prefix(String),
    Suffix(String),
    Regex(String),
}

/// One ordered classification rule; the first rule whose matcher hits a
/// section's name decides that section's category.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionRule {
    #[serde(rename = "match")]
    pub matcher: SectionMatch,
    pub category: String,
}

/// A named partition of an address window, owning one section category at
/// one address kind.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalBlock {
    pub id: String,
    pub category: String,
    pub window: String,
    #[serde(default)]
    pub role: AddressKind,
    #[serde(default)]
    pub report_tags: Vec<String>,
}

/// Bytes set aside inside a window, e.g. a bootloader slot or an NVM area
/// the application must not touch.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    pub size_bytes: u64,
    pub start_offset: u64,
}

impl Reservation {
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }
}

/// A contiguous addressable range, independent of the physical media behind
/// it. Base address and capacity are optional because some toolchains only
/// learn them from the image itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressWindow {
    pub id: String,
    #[serde(default)]
    pub base_address: Option<u64>,
    #[serde(default)]
    pub capacity: Option<u64>,
    #[serde(default)]
    pub reservations: Vec<Reservation>,
}

/// Direction in which a [`RoundingRule`] snaps block usage to a granule
/// boundary.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundingMode {
    Ceil,
    Floor,
    Nearest,
}

/// A bank-level policy inflating (or deflating) the effective usage of the
/// named blocks to a multiple of `granule_bytes`, typically the bank's
/// erase-sector size. A granule of zero is a no-op.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundingRule {
    pub blocks: Vec<String>,
    pub granule_bytes: u64,
    pub mode: RoundingMode,
}

/// A physical memory bank (a flash chip, a RAM block) made of one or more
/// address windows in declaration order.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareBank {
    pub id: String,
    pub capacity_bytes: u64,
    pub windows: Vec<String>,
    #[serde(default)]
    pub rounding: Vec<RoundingRule>,
}

/// The whole target description for one analysis run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    #[serde(default)]
    pub categories: Vec<SectionCategory>,
    #[serde(default)]
    pub rules: Vec<SectionRule>,
    #[serde(default)]
    pub blocks: Vec<LogicalBlock>,
    #[serde(default)]
    pub windows: Vec<AddressWindow>,
    #[serde(default)]
    pub banks: Vec<HardwareBank>,
}

impl TargetConfig {
    pub fn window(&self, id: &str) -> Option<&AddressWindow> {
        self.windows.iter().find(|w| w.id == id)
    }

    pub fn block(&self, id: &str) -> Option<&LogicalBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn bank(&self, id: &str) -> Option<&HardwareBank> {
        self.banks.iter().find(|b| b.id == id)
    }

    pub fn category(&self, id: &str) -> Option<&SectionCategory> {
        self.categories.iter().find(|c| c.id == id)
    }
}

/// One bucket of a report entry: assignment bytes are counted when their
/// block id is listed here or their report tags intersect `tags`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportBucketConfig {
    pub id: String,
    #[serde(default)]
    pub blocks: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One named report entry over a single hardware bank.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntryConfig {
    pub id: String,
    pub bank: String,
    #[serde(default)]
    pub buckets: Vec<ReportBucketConfig>,
}

/// Configuration for the fixed named-bucket report.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportConfig {
    #[serde(default)]
    pub entries: Vec<ReportEntryConfig>,
}
