//! Window and bank summarization.
//!
//! Two passes. The first walks every block assignment and accumulates
//! per-window totals into builders keyed by window id; the second finalizes
//! those builders into read-only summaries and lays each hardware bank out
//! as two span lists (window granularity and block granularity), applying
//! rounding rules and reservations along the way. Nothing here can fail:
//! the classifier and assigner already rejected inconsistent configuration,
//! and anything softer is reported as a warning.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use log::warn;
use serde::Serialize;

use crate::Analysis;
use crate::AnalysisWarning;
use crate::config::{AddressKind, AddressWindow, HardwareBank, RoundingMode, TargetConfig};

/// One `{start, size}` placement inside a window, one per block assignment.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub start: u64,
    pub size: u64,
}

/// Bytes per assignment address kind.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindTotals {
    pub exec: u64,
    pub load: u64,
    pub runtime: u64,
}

impl KindTotals {
    fn add(&mut self, kind: AddressKind, bytes: u64) {
        match kind {
            AddressKind::Exec => self.exec += bytes,
            AddressKind::Load => self.load += bytes,
            AddressKind::Runtime => self.runtime += bytes,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSummary {
    pub id: String,
    pub total_bytes: u64,
    pub kind_totals: KindTotals,
    pub category_totals: IndexMap<String, u64>,
    pub block_totals: IndexMap<String, u64>,
    /// Sorted by (start, size).
    pub placements: Vec<Placement>,
    pub span_start: Option<u64>,
    pub span_end: Option<u64>,
    /// Alignment and gap bytes: span length minus the sum of placements.
    pub padding_bytes: u64,
    pub largest_gap: u64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    Occupied,
    Block,
    Padding,
    Free,
    Reserved,
}

impl fmt::Display for SpanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            SpanKind::Occupied => "occupied",
            SpanKind::Block => "block",
            SpanKind::Padding => "padding",
            SpanKind::Free => "free",
            SpanKind::Reserved => "reserved",
        })
    }
}

/// A contiguous byte range in a bank's visual layout. `offset` is relative
/// to the bank start; `address` is the best-effort absolute address
/// reconstructed from the nearest anchor, `None` when no anchor exists.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutSpan {
    pub kind: SpanKind,
    pub label: String,
    pub offset: u64,
    pub size: u64,
    pub address: Option<u64>,
}

impl LayoutSpan {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Outcome of one rounding rule inside one bank.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundingDetail {
    pub blocks: Vec<String>,
    pub granule_bytes: u64,
    pub mode: RoundingMode,
    pub raw_bytes: u64,
    pub adjusted_bytes: u64,
    pub delta_bytes: i64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BankSummary {
    pub id: String,
    pub capacity_bytes: u64,
    pub raw_used_bytes: u64,
    pub adjusted_used_bytes: u64,
    pub reserved_bytes: u64,
    pub free_bytes: u64,
    pub rounding: Vec<RoundingDetail>,
    /// One span per allocated window, then free/reserved tail spans.
    pub window_layout: Vec<LayoutSpan>,
    /// Same range at logical-block granularity, with synthetic padding.
    pub block_layout: Vec<LayoutSpan>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summaries {
    /// Each section counted once, through its primary assignment.
    pub total_bytes: u64,
    pub category_totals: IndexMap<String, u64>,
    pub windows: IndexMap<String, WindowSummary>,
    pub banks: IndexMap<String, BankSummary>,
    pub warnings: Vec<AnalysisWarning>,
}

/// Round `value` to a multiple of `granule`. A zero granule or zero value
/// is a no-op. `Nearest` rounds half up.
pub fn round_to_granule(value: u64, granule: u64, mode: RoundingMode) -> u64 {
    if granule == 0 || value == 0 {
        return value;
    }
    match mode {
        RoundingMode::Ceil => value.div_ceil(granule) * granule,
        RoundingMode::Floor => value / granule * granule,
        RoundingMode::Nearest => (value + granule / 2) / granule * granule,
    }
}

#[derive(Clone, Debug)]
struct AssignmentRecord {
    address: u64,
    size: u64,
    block: String,
}

#[derive(Default)]
struct WindowAccumulator {
    total: u64,
    kinds: KindTotals,
    categories: IndexMap<String, u64>,
    blocks: IndexMap<String, u64>,
    placements: Vec<Placement>,
    records: Vec<AssignmentRecord>,
}

/// Aggregate a completed analysis into per-window and per-bank summaries.
pub fn generate_summaries(analysis: &Analysis) -> Summaries {
    let config = &analysis.config;
    let mut warnings = Vec::new();

    // Pass 1: every configured window gets a builder, even if nothing lands
    // in it, so empty windows still show up with zero totals.
    let mut accumulators: IndexMap<&str, WindowAccumulator> = config
        .windows
        .iter()
        .map(|window| (window.id.as_str(), WindowAccumulator::default()))
        .collect();

    let mut total_bytes = 0u64;
    let mut category_totals: IndexMap<String, u64> = IndexMap::new();

    for section in &analysis.sections {
        if section.primary_assignment().is_some() {
            total_bytes += section.size;
            *category_totals.entry(section.category.clone()).or_default() += section.size;
        }
        for assignment in &section.assignments {
            let accumulator = accumulators
                .get_mut(assignment.window.as_str())
                .expect("Block assigner validated every window id");
            accumulator.total += assignment.size;
            accumulator.kinds.add(assignment.kind, assignment.size);
            *accumulator
                .categories
                .entry(section.category.clone())
                .or_default() += assignment.size;
            *accumulator
                .blocks
                .entry(assignment.block.clone())
                .or_default() += assignment.size;
            accumulator.placements.push(Placement {
                start: assignment.address,
                size: assignment.size,
            });
            accumulator.records.push(AssignmentRecord {
                address: assignment.address,
                size: assignment.size,
                block: assignment.block.clone(),
            });
        }
    }

    for accumulator in accumulators.values_mut() {
        accumulator.placements.sort_by_key(|p| (p.start, p.size));
        accumulator.records.sort_by_key(|r| (r.address, r.size));
    }

    // Pass 2: finalize into read-only records.
    let windows = accumulators
        .iter()
        .map(|(id, accumulator)| (id.to_string(), finalize_window(id, accumulator)))
        .collect();

    let banks = config
        .banks
        .iter()
        .map(|bank| {
            (
                bank.id.clone(),
                summarize_bank(config, bank, &accumulators, &mut warnings),
            )
        })
        .collect();

    Summaries {
        total_bytes,
        category_totals,
        windows,
        banks,
        warnings,
    }
}

fn finalize_window(id: &str, accumulator: &WindowAccumulator) -> WindowSummary {
    let span_start = accumulator.placements.first().map(|p| p.start);
    let span_end = accumulator.placements.iter().map(|p| p.start + p.size).max();
    let span_len = match (span_start, span_end) {
        (Some(start), Some(end)) => end - start,
        _ => 0,
    };

    // Gap sweep over the sorted placements: a placement starting inside the
    // covered interval extends it, one starting past it opens a gap.
    let mut largest_gap = 0u64;
    if let Some(first) = accumulator.placements.first() {
        let mut covered_end = first.start + first.size;
        for placement in &accumulator.placements[1..] {
            if placement.start > covered_end {
                largest_gap = largest_gap.max(placement.start - covered_end);
                covered_end = placement.start + placement.size;
            } else {
                covered_end = covered_end.max(placement.start + placement.size);
            }
        }
    }

    WindowSummary {
        id: id.to_string(),
        total_bytes: accumulator.total,
        kind_totals: accumulator.kinds,
        category_totals: accumulator.categories.clone(),
        block_totals: accumulator.blocks.clone(),
        placements: accumulator.placements.clone(),
        span_start,
        span_end,
        padding_bytes: span_len.saturating_sub(accumulator.total),
        largest_gap,
    }
}

fn summarize_bank(
    config: &TargetConfig,
    bank: &HardwareBank,
    accumulators: &IndexMap<&str, WindowAccumulator>,
    warnings: &mut Vec<AnalysisWarning>,
) -> BankSummary {
    let mut bank_windows: Vec<(&AddressWindow, &WindowAccumulator)> = Vec::new();
    for window_id in &bank.windows {
        match (config.window(window_id), accumulators.get(window_id.as_str())) {
            (Some(window), Some(accumulator)) => bank_windows.push((window, accumulator)),
            _ => warn!("bank {} references unknown window {}", bank.id, window_id),
        }
    }

    let raw_used: u64 = bank_windows.iter().map(|(_, a)| a.total).sum();

    // Rounding rules: each delta is split evenly over the windows that the
    // rule's blocks actually touch, remainder onto the first of them.
    let mut rounding = Vec::with_capacity(bank.rounding.len());
    let mut delta_shares: HashMap<&str, i64> = HashMap::new();
    let mut total_delta = 0i64;
    for rule in &bank.rounding {
        let raw: u64 = bank_windows
            .iter()
            .map(|(_, accumulator)| {
                rule.blocks
                    .iter()
                    .map(|block| accumulator.blocks.get(block).copied().unwrap_or(0))
                    .sum::<u64>()
            })
            .sum();
        let adjusted = round_to_granule(raw, rule.granule_bytes, rule.mode);
        let delta = adjusted as i64 - raw as i64;
        total_delta += delta;

        let touched: Vec<&str> = bank_windows
            .iter()
            .filter(|(_, accumulator)| {
                rule.blocks
                    .iter()
                    .any(|block| accumulator.blocks.get(block).copied().unwrap_or(0) > 0)
            })
            .map(|(window, _)| window.id.as_str())
            .collect();
        if delta != 0 && !touched.is_empty() {
            let share = delta / touched.len() as i64;
            let remainder = delta - share * touched.len() as i64;
            for (position, window_id) in touched.iter().copied().enumerate() {
                let part = if position == 0 { share + remainder } else { share };
                *delta_shares.entry(window_id).or_default() += part;
            }
        }

        rounding.push(RoundingDetail {
            blocks: rule.blocks.clone(),
            granule_bytes: rule.granule_bytes,
            mode: rule.mode,
            raw_bytes: raw,
            adjusted_bytes: adjusted,
            delta_bytes: delta,
        });
    }
    let adjusted_used = (raw_used as i64 + total_delta).max(0) as u64;

    let mut reservations: Vec<_> = bank_windows
        .iter()
        .flat_map(|(window, _)| window.reservations.iter())
        .collect();
    reservations.sort_by_key(|r| r.start_offset);
    let reserved_bytes: u64 = reservations.iter().map(|r| r.size_bytes).sum();

    // Layout walk: a byte cursor runs over the bank's windows in declaration
    // order. The anchor maps a bank offset back to an absolute address and
    // persists past the last window so tail spans still get addresses.
    let capacity = bank.capacity_bytes;
    let mut window_layout: Vec<LayoutSpan> = Vec::new();
    let mut block_layout: Vec<LayoutSpan> = Vec::new();
    let mut cursor = 0u64;
    let mut anchor: Option<(u64, u64)> = None;

    for (window, accumulator) in &bank_windows {
        let share = delta_shares.get(window.id.as_str()).copied().unwrap_or(0);
        let allocated = (accumulator.total as i64 + share).max(0) as u64;

        if let Some(base) = window.base_address {
            anchor = Some((base, cursor));
        } else if let Some(first) = accumulator.records.first() {
            anchor = Some((first.address, cursor));
        }
        if allocated == 0 {
            continue;
        }

        window_layout.push(span(SpanKind::Occupied, &window.id, cursor, allocated, anchor));

        // Consecutive records of the same block merge into one span; sizes
        // are summed, so spans track bytes used, not address extent.
        let mut local = 0u64;
        let mut run: Option<(&str, u64)> = None;
        for record in &accumulator.records {
            match &mut run {
                Some((block, size)) if *block == record.block => *size += record.size,
                _ => {
                    if let Some((block, size)) = run.take() {
                        local = push_block_span(
                            &mut block_layout,
                            block,
                            size,
                            cursor,
                            local,
                            allocated,
                            anchor,
                        );
                    }
                    run = Some((record.block.as_str(), record.size));
                }
            }
        }
        if let Some((block, size)) = run.take() {
            local = push_block_span(&mut block_layout, block, size, cursor, local, allocated, anchor);
        }
        if local < allocated {
            block_layout.push(span(
                SpanKind::Padding,
                &window.id,
                cursor + local,
                allocated - local,
                anchor,
            ));
        }

        cursor += allocated;
    }

    // Tail: free space up to the first reservation, then the reservations,
    // each clamped forward so spans never overlap.
    let mut watermark = cursor;
    let free_limit = reservations
        .first()
        .map_or(capacity, |r| r.start_offset.min(capacity));
    if free_limit > watermark {
        let free = span(SpanKind::Free, "free", watermark, free_limit - watermark, anchor);
        window_layout.push(free.clone());
        block_layout.push(free);
        watermark = free_limit;
    }
    for reservation in &reservations {
        let placed = reservation.start_offset.max(watermark);
        if placed != reservation.start_offset {
            warn!(
                "bank {}: reservation {} moved from {:#x} to {:#x}",
                bank.id, reservation.id, reservation.start_offset, placed
            );
            warnings.push(AnalysisWarning::ReservationOverlap {
                bank: bank.id.clone(),
                reservation: reservation.id.clone(),
                configured_offset: reservation.start_offset,
                placed_offset: placed,
            });
        }
        if placed >= capacity {
            continue;
        }
        let size = reservation.size_bytes.min(capacity - placed);
        if size == 0 {
            continue;
        }
        let reserved = span(
            SpanKind::Reserved,
            reservation.display_label(),
            placed,
            size,
            anchor,
        );
        watermark = reserved.end();
        window_layout.push(reserved.clone());
        block_layout.push(reserved);
    }

    window_layout.sort_by_key(|s| s.offset);
    block_layout.sort_by_key(|s| s.offset);

    BankSummary {
        id: bank.id.clone(),
        capacity_bytes: capacity,
        raw_used_bytes: raw_used,
        adjusted_used_bytes: adjusted_used,
        reserved_bytes,
        free_bytes: capacity
            .saturating_sub(adjusted_used)
            .saturating_sub(reserved_bytes),
        rounding,
        window_layout,
        block_layout,
    }
}

fn span(kind: SpanKind, label: &str, offset: u64, size: u64, anchor: Option<(u64, u64)>) -> LayoutSpan {
    LayoutSpan {
        kind,
        label: label.to_string(),
        offset,
        size,
        address: anchor.map(|(base, at)| base + (offset - at)),
    }
}

fn push_block_span(
    spans: &mut Vec<LayoutSpan>,
    block: &str,
    run: u64,
    cursor: u64,
    local: u64,
    allocated: u64,
    anchor: Option<(u64, u64)>,
) -> u64 {
    if local >= allocated || run == 0 {
        return local;
    }
    // Clip to the window's allocated length; a negative rounding delta can
    // make that shorter than the raw bytes.
    let size = run.min(allocated - local);
    spans.push(span(SpanKind::Block, block, cursor + local, size, anchor));
    local + size
}
