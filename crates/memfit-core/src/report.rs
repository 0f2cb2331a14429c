//! Fixed named-bucket reports.
//!
//! A report projects bank totals into a caller-defined set of buckets, e.g.
//! "flash free-for-files". It is a thin layer over the summaries: the only
//! logic of its own is bucket membership, which accepts an assignment either
//! by block id or by report-tag intersection.

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use crate::Analysis;
use crate::config::ReportConfig;
use crate::section::BlockAssignment;
use crate::summary::generate_summaries;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Report entry refers to unknown bank `{0}`")]
    UnknownBank(String),
    #[error("Report entry `{entry}` refers to unknown block `{block}`")]
    UnknownBlock { entry: String, block: String },
}

/// Totals of one report entry, keyed by the bucket ids of its config.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub capacity_bytes: u64,
    pub raw_used_bytes: u64,
    pub adjusted_used_bytes: u64,
    pub free_bytes: u64,
    pub buckets: IndexMap<String, u64>,
}

/// Project the analysis into the configured report entries, in declaration
/// order. Unknown bank or block ids are configuration errors.
pub fn calculate_report(
    analysis: &Analysis,
    report: &ReportConfig,
) -> Result<IndexMap<String, ReportEntry>, ReportError> {
    let config = &analysis.config;
    let summaries = generate_summaries(analysis);
    let mut entries = IndexMap::with_capacity(report.entries.len());

    for entry in &report.entries {
        let (Some(bank), Some(summary)) = (
            config.bank(&entry.bank),
            summaries.banks.get(entry.bank.as_str()),
        ) else {
            return Err(ReportError::UnknownBank(entry.bank.clone()));
        };

        let assignments: Vec<&BlockAssignment> = analysis
            .sections
            .iter()
            .flat_map(|section| &section.assignments)
            .filter(|assignment| bank.windows.contains(&assignment.window))
            .collect();

        let mut buckets = IndexMap::with_capacity(entry.buckets.len());
        for bucket in &entry.buckets {
            for block in &bucket.blocks {
                if config.block(block).is_none() {
                    return Err(ReportError::UnknownBlock {
                        entry: entry.id.clone(),
                        block: block.clone(),
                    });
                }
            }
            let total: u64 = assignments
                .iter()
                .filter(|assignment| {
                    bucket.blocks.contains(&assignment.block)
                        || assignment
                            .report_tags
                            .iter()
                            .any(|tag| bucket.tags.contains(tag))
                })
                .map(|assignment| assignment.size)
                .sum();
            buckets.insert(bucket.id.clone(), total);
        }

        entries.insert(
            entry.id.clone(),
            ReportEntry {
                capacity_bytes: summary.capacity_bytes,
                raw_used_bytes: summary.raw_used_bytes,
                adjusted_used_bytes: summary.adjusted_used_bytes,
                free_bytes: summary.free_bytes,
                buckets,
            },
        );
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze;
    use crate::config::{
        AddressWindow, HardwareBank, LogicalBlock, ReportBucketConfig, ReportEntryConfig,
        RoundingMode, RoundingRule, SectionCategory, SectionMatch, SectionRule, TargetConfig,
    };
    use crate::record::{RawSection, SectionFlags};
    use crate::AddressKind;

    fn config() -> TargetConfig {
        TargetConfig {
            categories: vec![
                SectionCategory {
                    id: "code".into(),
                    label: None,
                },
                SectionCategory {
                    id: "data".into(),
                    label: None,
                },
            ],
            rules: vec![
                SectionRule {
                    matcher: SectionMatch::Prefix(".text".into()),
                    category: "code".into(),
                },
                SectionRule {
                    matcher: SectionMatch::Prefix(".data".into()),
                    category: "data".into(),
                },
            ],
            blocks: vec![
                LogicalBlock {
                    id: "flash_code".into(),
                    category: "code".into(),
                    window: "flash_win".into(),
                    role: AddressKind::Exec,
                    report_tags: vec!["code".into()],
                },
                LogicalBlock {
                    id: "flash_data".into(),
                    category: "data".into(),
                    window: "flash_win".into(),
                    role: AddressKind::Load,
                    report_tags: vec!["file".into()],
                },
            ],
            windows: vec![AddressWindow {
                id: "flash_win".into(),
                base_address: Some(0x0800_0000),
                capacity: None,
                reservations: Vec::new(),
            }],
            banks: vec![HardwareBank {
                id: "flash".into(),
                capacity_bytes: 0x10000,
                windows: vec!["flash_win".into()],
                rounding: vec![RoundingRule {
                    blocks: vec!["flash_code".into(), "flash_data".into()],
                    granule_bytes: 0x1000,
                    mode: RoundingMode::Ceil,
                }],
            }],
        }
    }

    fn sections() -> Vec<RawSection> {
        vec![
            RawSection {
                name: ".text".into(),
                vma: Some(0x0800_0000),
                lma: None,
                size: 0x2100,
                flags: SectionFlags {
                    alloc: true,
                    exec: true,
                    ..Default::default()
                },
            },
            RawSection {
                name: ".data".into(),
                vma: Some(0x0800_2100),
                lma: None,
                size: 0x300,
                flags: SectionFlags {
                    alloc: true,
                    write: true,
                    ..Default::default()
                },
            },
        ]
    }

    fn report_config() -> ReportConfig {
        ReportConfig {
            entries: vec![ReportEntryConfig {
                id: "flash".into(),
                bank: "flash".into(),
                buckets: vec![
                    ReportBucketConfig {
                        id: "code".into(),
                        blocks: vec!["flash_code".into()],
                        tags: Vec::new(),
                    },
                    ReportBucketConfig {
                        id: "files".into(),
                        blocks: Vec::new(),
                        tags: vec!["file".into()],
                    },
                    ReportBucketConfig {
                        id: "everything".into(),
                        blocks: vec!["flash_code".into()],
                        tags: vec!["file".into()],
                    },
                ],
            }],
        }
    }

    #[test]
    fn buckets_sum_by_block_id_and_by_tag() {
        let analysis = analyze(config(), &sections(), &[]).unwrap();
        let entries = calculate_report(&analysis, &report_config()).unwrap();

        let flash = &entries["flash"];
        assert_eq!(flash.buckets["code"], 0x2100);
        assert_eq!(flash.buckets["files"], 0x300);
        // Matching both the block list and a tag still counts bytes once.
        assert_eq!(flash.buckets["everything"], 0x2400);
    }

    #[test]
    fn entries_expose_the_bank_totals() {
        let analysis = analyze(config(), &sections(), &[]).unwrap();
        let entries = calculate_report(&analysis, &report_config()).unwrap();

        let flash = &entries["flash"];
        assert_eq!(flash.capacity_bytes, 0x10000);
        assert_eq!(flash.raw_used_bytes, 0x2400);
        // 0x2400 rounds up to the next 0x1000 boundary.
        assert_eq!(flash.adjusted_used_bytes, 0x3000);
        assert_eq!(flash.free_bytes, 0x10000 - 0x3000);
    }

    #[test]
    fn unknown_bank_is_a_configuration_error() {
        let analysis = analyze(config(), &sections(), &[]).unwrap();
        let report = ReportConfig {
            entries: vec![ReportEntryConfig {
                id: "sdram".into(),
                bank: "sdram".into(),
                buckets: Vec::new(),
            }],
        };
        assert!(matches!(
            calculate_report(&analysis, &report),
            Err(ReportError::UnknownBank(bank)) if bank == "sdram"
        ));
    }

    #[test]
    fn unknown_block_is_a_configuration_error() {
        let analysis = analyze(config(), &sections(), &[]).unwrap();
        let report = ReportConfig {
            entries: vec![ReportEntryConfig {
                id: "flash".into(),
                bank: "flash".into(),
                buckets: vec![ReportBucketConfig {
                    id: "ghost".into(),
                    blocks: vec!["flash_ghost".into()],
                    tags: Vec::new(),
                }],
            }],
        };
        assert!(matches!(
            calculate_report(&analysis, &report),
            Err(ReportError::UnknownBlock { block, .. }) if block == "flash_ghost"
        ));
    }
}
