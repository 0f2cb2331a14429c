//! Section classification and block assignment.
//!
//! The first two pipeline stages. Classification walks the configured rules
//! in order and gives every alloc, non-empty section exactly one category;
//! assignment then projects each categorized section into every logical
//! block of that category, at the address the block's role selects.

use std::collections::HashMap;

use log::debug;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::config::{AddressKind, LogicalBlock, SectionMatch, TargetConfig};
use crate::record::{RawSection, SectionFlags};

/// Stable arena id of a section within one analysis run.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct SectionId(pub u32);

/// The concrete (address, size) at which a section contributes to one
/// logical block.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockAssignment {
    pub block: String,
    pub window: String,
    pub kind: AddressKind,
    pub address: u64,
    pub size: u64,
    pub report_tags: Vec<String>,
}

impl BlockAssignment {
    pub fn end(&self) -> u64 {
        self.address + self.size
    }

    pub fn contains(&self, address: u64) -> bool {
        self.address <= address && address < self.end()
    }
}

/// A categorized section with its block assignments.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: SectionId,
    pub name: String,
    #[serde(rename = "vmaStart")]
    pub vma: Option<u64>,
    #[serde(rename = "lmaStart")]
    pub lma: Option<u64>,
    pub size: u64,
    pub flags: SectionFlags,
    pub category: String,
    pub assignments: Vec<BlockAssignment>,
}

impl Section {
    /// The assignment that owns this section wherever only a single value
    /// can be shown: the first non-load assignment, or the first one if all
    /// of them are load.
    pub fn primary_assignment(&self) -> Option<&BlockAssignment> {
        self.assignments
            .iter()
            .find(|a| a.kind != AddressKind::Load)
            .or_else(|| self.assignments.first())
    }

    /// Whether `address` falls inside the section's execution placement.
    pub fn contains_vma(&self, address: u64) -> bool {
        self.vma
            .is_some_and(|vma| vma <= address && address < vma + self.size)
    }
}

#[derive(Error, Debug)]
pub enum ClassifyError {
    /// An alloc, non-empty section matched no rule. Aborting beats letting
    /// the section silently vanish from every total.
    #[error("Section `{name}` ({size} bytes) matched no classification rule")]
    Unclassified { name: String, size: u64 },
    #[error("Classification rule refers to unknown category `{0}`")]
    UnknownCategory(String),
    #[error("Invalid regex `{pattern}` in classification rule")]
    BadPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Error, Debug)]
pub enum AssignError {
    #[error("Category `{0}` has no logical blocks")]
    CategoryWithoutBlocks(String),
    #[error("Section `{section}` has no virtual address but block `{block}` needs one")]
    MissingAddress { section: String, block: String },
    #[error("Logical block `{block}` refers to unknown window `{window}`")]
    UnknownWindow { block: String, window: String },
}

enum CompiledMatch<'a> {
    Equals(&'a str),
    Prefix(&'a str),
    Suffix(&'a str),
    Regex(Regex),
}

impl CompiledMatch<'_> {
    fn hits(&self, name: &str) -> bool {
        match self {
            CompiledMatch::Equals(text) => name == *text,
            CompiledMatch::Prefix(text) => name.starts_with(text),
            CompiledMatch::Suffix(text) => name.ends_with(text),
            CompiledMatch::Regex(regex) => regex.is_match(name),
        }
    }
}

struct CompiledRule<'a> {
    matcher: CompiledMatch<'a>,
    category: &'a str,
}

fn compile_rules(config: &TargetConfig) -> Result<Vec<CompiledRule<'_>>, ClassifyError> {
    let mut compiled = Vec::with_capacity(config.rules.len());
    for rule in &config.rules {
        if config.category(&rule.category).is_none() {
            return Err(ClassifyError::UnknownCategory(rule.category.clone()));
        }
        let matcher = match &rule.matcher {
            SectionMatch::Equals(text) => CompiledMatch::Equals(text),
            SectionMatch::Prefix(text) => CompiledMatch::Prefix(text),
            SectionMatch::Suffix(text) => CompiledMatch::Suffix(text),
            SectionMatch::Regex(pattern) => {
                let regex = Regex::new(pattern).map_err(|source| ClassifyError::BadPattern {
                    pattern: pattern.clone(),
                    source,
                })?;
                CompiledMatch::Regex(regex)
            }
        };
        compiled.push(CompiledRule {
            matcher,
            category: &rule.category,
        });
    }
    Ok(compiled)
}

/// A raw section paired with the category its first matching rule assigned.
#[derive(Clone, Debug)]
pub struct CategorizedSection<'a> {
    pub raw: &'a RawSection,
    pub category: &'a str,
}

/// Classify every alloc section with size > 0. Non-alloc and empty sections
/// are skipped and take no part in any later stage.
pub fn classify_sections<'a>(
    config: &'a TargetConfig,
    sections: &'a [RawSection],
) -> Result<Vec<CategorizedSection<'a>>, ClassifyError> {
    let rules = compile_rules(config)?;
    let mut categorized = Vec::new();

    for section in sections {
        if !section.flags.alloc || section.size == 0 {
            debug!("skipping {} (non-alloc or empty)", section.name);
            continue;
        }
        let category = rules
            .iter()
            .find(|rule| rule.matcher.hits(&section.name))
            .map(|rule| rule.category);
        match category {
            Some(category) => {
                debug!("{} -> {}", section.name, category);
                categorized.push(CategorizedSection {
                    raw: section,
                    category,
                });
            }
            None => {
                return Err(ClassifyError::Unclassified {
                    name: section.name.clone(),
                    size: section.size,
                });
            }
        }
    }

    Ok(categorized)
}

/// Project each categorized section into every logical block of its
/// category. The section id is its arena position in the categorized list.
pub fn assign_blocks(
    config: &TargetConfig,
    categorized: &[CategorizedSection<'_>],
) -> Result<Vec<Section>, AssignError> {
    let mut blocks_by_category: HashMap<&str, Vec<&LogicalBlock>> = HashMap::new();
    for block in &config.blocks {
        blocks_by_category
            .entry(block.category.as_str())
            .or_default()
            .push(block);
    }

    let mut sections = Vec::with_capacity(categorized.len());
    for (index, entry) in categorized.iter().enumerate() {
        let Some(blocks) = blocks_by_category.get(entry.category) else {
            return Err(AssignError::CategoryWithoutBlocks(
                entry.category.to_string(),
            ));
        };

        let mut assignments = Vec::with_capacity(blocks.len());
        for block in blocks {
            if config.window(&block.window).is_none() {
                return Err(AssignError::UnknownWindow {
                    block: block.id.clone(),
                    window: block.window.clone(),
                });
            }
            let address = assignment_address(entry.raw, block)?;
            debug!(
                "{} -> block {} ({}) at {:#010x}",
                entry.raw.name, block.id, block.role, address
            );
            assignments.push(BlockAssignment {
                block: block.id.clone(),
                window: block.window.clone(),
                kind: block.role,
                address,
                size: entry.raw.size,
                report_tags: block.report_tags.clone(),
            });
        }

        sections.push(Section {
            id: SectionId(index as u32),
            name: entry.raw.name.clone(),
            vma: entry.raw.vma,
            lma: entry.raw.lma,
            size: entry.raw.size,
            flags: entry.raw.flags,
            category: entry.category.to_string(),
            assignments,
        });
    }

    Ok(sections)
}

fn assignment_address(section: &RawSection, block: &LogicalBlock) -> Result<u64, AssignError> {
    let vma = || {
        section.vma.ok_or_else(|| AssignError::MissingAddress {
            section: section.name.clone(),
            block: block.id.clone(),
        })
    };
    match block.role {
        AddressKind::Load => match section.lma {
            Some(lma) if lma != 0 => Ok(lma),
            _ => vma(),
        },
        AddressKind::Exec | AddressKind::Runtime => vma(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AddressWindow, SectionCategory, SectionRule};

    fn raw(name: &str, vma: u64, size: u64) -> RawSection {
        RawSection {
            name: name.to_string(),
            vma: Some(vma),
            lma: None,
            size,
            flags: SectionFlags {
                alloc: true,
                ..Default::default()
            },
        }
    }

    fn config_with_rules(rules: Vec<(SectionMatch, &str)>) -> TargetConfig {
        let mut categories: Vec<String> = rules.iter().map(|(_, c)| c.to_string()).collect();
        categories.sort();
        categories.dedup();
        TargetConfig {
            categories: categories
                .into_iter()
                .map(|id| SectionCategory { id, label: None })
                .collect(),
            rules: rules
                .into_iter()
                .map(|(matcher, category)| SectionRule {
                    matcher,
                    category: category.to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn first_matching_rule_wins() {
        let config = config_with_rules(vec![
            (SectionMatch::Prefix(".text".into()), "code"),
            (SectionMatch::Equals(".text.boot".into()), "boot"),
        ]);
        let sections = [raw(".text.boot", 0x0800_0000, 64)];
        let categorized = classify_sections(&config, &sections).unwrap();
        assert_eq!(categorized.len(), 1);
        assert_eq!(categorized[0].category, "code");
    }

    #[test]
    fn regex_rules_match() {
        let config = config_with_rules(vec![(SectionMatch::Regex(r"^\.tls\..+$".into()), "tls")]);
        let sections = [raw(".tls.data", 0x2000_0000, 16)];
        let categorized = classify_sections(&config, &sections).unwrap();
        assert_eq!(categorized[0].category, "tls");
    }

    #[test]
    fn suffix_rules_match_the_name_tail() {
        let config = config_with_rules(vec![(SectionMatch::Suffix(".boot".into()), "boot")]);
        let sections = [raw(".text.boot", 0x0800_0000, 64)];
        let categorized = classify_sections(&config, &sections).unwrap();
        assert_eq!(categorized[0].category, "boot");
    }

    #[test]
    fn bad_regex_is_a_config_error() {
        let config = config_with_rules(vec![(SectionMatch::Regex("(".into()), "code")]);
        let sections = [raw(".text", 0, 1)];
        assert!(matches!(
            classify_sections(&config, &sections),
            Err(ClassifyError::BadPattern { .. })
        ));
    }

    #[test]
    fn rule_with_unknown_category_is_a_config_error() {
        let mut config = config_with_rules(vec![(SectionMatch::Equals(".text".into()), "code")]);
        config.categories.clear();
        let sections = [raw(".text", 0, 16)];
        assert!(matches!(
            classify_sections(&config, &sections),
            Err(ClassifyError::UnknownCategory(category)) if category == "code"
        ));
    }

    #[test]
    fn unclassified_alloc_section_aborts_the_run() {
        let config = config_with_rules(vec![(SectionMatch::Equals(".text".into()), "code")]);
        let sections = [raw(".mystery", 0x1000, 32)];
        let err = classify_sections(&config, &sections).unwrap_err();
        assert!(matches!(err, ClassifyError::Unclassified { name, size }
            if name == ".mystery" && size == 32));
    }

    #[test]
    fn non_alloc_and_empty_sections_are_skipped() {
        let config = config_with_rules(vec![(SectionMatch::Prefix(".".into()), "code")]);
        let mut debug_section = raw(".debug_info", 0, 128);
        debug_section.flags.alloc = false;
        let empty = raw(".text.empty", 0x100, 0);
        let sections = [debug_section, empty];
        let categorized = classify_sections(&config, &sections).unwrap();
        assert!(categorized.is_empty());
    }

    fn assign_config() -> TargetConfig {
        let mut config = config_with_rules(vec![(SectionMatch::Prefix(".data".into()), "data")]);
        config.windows = vec![
            AddressWindow {
                id: "flash_win".into(),
                base_address: Some(0x0800_0000),
                capacity: Some(0x10000),
                reservations: Vec::new(),
            },
            AddressWindow {
                id: "ram_win".into(),
                base_address: Some(0x2000_0000),
                capacity: Some(0x8000),
                reservations: Vec::new(),
            },
        ];
        config.blocks = vec![
            LogicalBlock {
                id: "ram_data".into(),
                category: "data".into(),
                window: "ram_win".into(),
                role: AddressKind::Runtime,
                report_tags: vec!["ram".into()],
            },
            LogicalBlock {
                id: "flash_data".into(),
                category: "data".into(),
                window: "flash_win".into(),
                role: AddressKind::Load,
                report_tags: vec!["flash".into()],
            },
        ];
        config
    }

    #[test]
    fn load_role_uses_lma_and_falls_back_to_vma() {
        let config = assign_config();
        let mut staged = raw(".data", 0x2000_0000, 256);
        staged.lma = Some(0x0800_4000);
        let categorized = classify_sections(&config, std::slice::from_ref(&staged)).unwrap();
        let sections = assign_blocks(&config, &categorized).unwrap();
        let by_block: Vec<_> = sections[0]
            .assignments
            .iter()
            .map(|a| (a.block.as_str(), a.kind, a.address))
            .collect();
        assert_eq!(
            by_block,
            vec![
                ("ram_data", AddressKind::Runtime, 0x2000_0000),
                ("flash_data", AddressKind::Load, 0x0800_4000),
            ]
        );

        // No distinct load address: load assignments fall back to the vma.
        let plain = raw(".data", 0x2000_0000, 256);
        let categorized = classify_sections(&config, std::slice::from_ref(&plain)).unwrap();
        let sections = assign_blocks(&config, &categorized).unwrap();
        assert_eq!(sections[0].assignments[1].address, 0x2000_0000);
    }

    #[test]
    fn primary_assignment_prefers_non_load() {
        let config = assign_config();
        let mut staged = raw(".data", 0x2000_0000, 256);
        staged.lma = Some(0x0800_4000);
        let categorized = classify_sections(&config, std::slice::from_ref(&staged)).unwrap();
        let sections = assign_blocks(&config, &categorized).unwrap();
        let primary = sections[0].primary_assignment().unwrap();
        assert_eq!(primary.block, "ram_data");
        assert_eq!(primary.kind, AddressKind::Runtime);
    }

    #[test]
    fn missing_vma_is_fatal_for_runtime_blocks() {
        let config = assign_config();
        let mut section = raw(".data", 0, 64);
        section.vma = None;
        let categorized = classify_sections(&config, std::slice::from_ref(&section)).unwrap();
        assert!(matches!(
            assign_blocks(&config, &categorized),
            Err(AssignError::MissingAddress { .. })
        ));
    }

    #[test]
    fn category_without_blocks_is_fatal() {
        let config = config_with_rules(vec![(SectionMatch::Prefix(".text".into()), "code")]);
        let sections = [raw(".text", 0x0800_0000, 32)];
        let categorized = classify_sections(&config, &sections).unwrap();
        assert!(matches!(
            assign_blocks(&config, &categorized),
            Err(AssignError::CategoryWithoutBlocks(category)) if category == "code"
        ));
    }

    #[test]
    fn unknown_window_is_fatal() {
        let mut config = assign_config();
        config.windows.retain(|w| w.id != "ram_win");
        let section = raw(".data", 0x2000_0000, 64);
        let categorized = classify_sections(&config, std::slice::from_ref(&section)).unwrap();
        assert!(matches!(
            assign_blocks(&config, &categorized),
            Err(AssignError::UnknownWindow { window, .. }) if window == "ram_win"
        ));
    }

    #[test]
    fn section_ids_follow_arena_order() {
        let config = assign_config();
        let sections = [raw(".data.a", 0x2000_0000, 16), raw(".data.b", 0x2000_0100, 16)];
        let categorized = classify_sections(&config, &sections).unwrap();
        let derived = assign_blocks(&config, &categorized).unwrap();
        assert_eq!(derived[0].id, SectionId(0));
        assert_eq!(derived[1].id, SectionId(1));
    }
}
