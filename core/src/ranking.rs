//! Quartile ranking of technicians by field repeat rate.
//!
//! Lower is better: "1st quartile" holds the technicians with the lowest
//! repeat rates, and ranked output is sorted by rate ascending.

use std::{cmp::Ordering, collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{aggregate::AggregateRow, config::RankingConfig, types::TechCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuartileLabel {
    First,
    Second,
    Third,
    Fourth,
    NotApplicable,
}

impl QuartileLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuartileLabel::First => "1st quartile",
            QuartileLabel::Second => "2nd quartile",
            QuartileLabel::Third => "3rd quartile",
            QuartileLabel::Fourth => "4th quartile",
            QuartileLabel::NotApplicable => "N/A",
        }
    }
}

impl fmt::Display for QuartileLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value at quantile `q` of an ascending, NaN-free slice, interpolating
/// linearly between the two closest ranks.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = (sorted.len() - 1) as f64 * q;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// 25th/50th/75th percentiles, or `None` when fewer than `min_population`
/// usable values exist. NaN values are ignored.
pub fn quartile_boundaries(values: &[f64], min_population: usize) -> Option<[f64; 3]> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() || sorted.len() < min_population {
        return None;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    Some([
        quantile(&sorted, 0.25),
        quantile(&sorted, 0.50),
        quantile(&sorted, 0.75),
    ])
}

/// Cuts are inclusive on the upper side.
pub fn classify_quartile(value: f64, boundaries: &[f64; 3]) -> QuartileLabel {
    if value.is_nan() {
        QuartileLabel::NotApplicable
    } else if value <= boundaries[0] {
        QuartileLabel::First
    } else if value <= boundaries[1] {
        QuartileLabel::Second
    } else if value <= boundaries[2] {
        QuartileLabel::Third
    } else {
        QuartileLabel::Fourth
    }
}

// ── Month-over-month ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Evolution {
    Improved,
    Unchanged,
    Worsened,
    NotApplicable,
}

impl Evolution {
    fn between(current: f64, previous: Option<f64>) -> Self {
        match previous.map(|p| current.partial_cmp(&p)) {
            Some(Some(Ordering::Less)) => Evolution::Improved,
            Some(Some(Ordering::Equal)) => Evolution::Unchanged,
            Some(Some(Ordering::Greater)) => Evolution::Worsened,
            _ => Evolution::NotApplicable,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Evolution::Improved => "improved",
            Evolution::Unchanged => "unchanged",
            Evolution::Worsened => "worsened",
            Evolution::NotApplicable => "N/A",
        }
    }
}

/// Which supervisor feedback a technician qualifies for against the
/// repeat-rate target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    /// Under target in both months.
    Commendation,
    /// At or over target in both months.
    Attention,
    /// Over target last month, under it now.
    Improvement,
    None,
}

impl FeedbackKind {
    fn against(current: f64, previous: Option<f64>, target: f64) -> Self {
        let Some(previous) = previous else {
            return FeedbackKind::None;
        };
        match (previous < target, current < target) {
            (true, true) => FeedbackKind::Commendation,
            (false, false) => FeedbackKind::Attention,
            (false, true) => FeedbackKind::Improvement,
            (true, false) => FeedbackKind::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedTechnician {
    pub code: TechCode,
    pub label: String,
    pub total_count: u32,
    pub repeat_count: u32,
    pub rate_percent: f64,
    pub previous_rate_percent: Option<f64>,
    pub quartile: QuartileLabel,
    pub evolution: Evolution,
    pub feedback: FeedbackKind,
}

/// Rank `current` technician rows, comparing each against its row in
/// `previous` (matched by code) when there is one.
pub fn rank_technicians(
    current: &[AggregateRow],
    previous: &[AggregateRow],
    config: &RankingConfig,
) -> Vec<RankedTechnician> {
    let previous_rates: HashMap<&str, f64> = previous
        .iter()
        .map(|row| (row.key.trim(), row.rate_percent))
        .collect();

    let rates: Vec<f64> = current.iter().map(|row| row.rate_percent).collect();
    let boundaries = quartile_boundaries(&rates, config.min_population);

    let mut ranked: Vec<RankedTechnician> = current
        .iter()
        .map(|row| {
            let previous_rate = previous_rates.get(row.key.trim()).copied();
            RankedTechnician {
                code: row.key.clone(),
                label: row.label.clone(),
                total_count: row.total_count,
                repeat_count: row.repeat_count,
                rate_percent: row.rate_percent,
                previous_rate_percent: previous_rate,
                quartile: boundaries
                    .as_ref()
                    .map(|b| classify_quartile(row.rate_percent, b))
                    .unwrap_or(QuartileLabel::NotApplicable),
                evolution: Evolution::between(row.rate_percent, previous_rate),
                feedback: FeedbackKind::against(
                    row.rate_percent,
                    previous_rate,
                    config.target_rate_percent,
                ),
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.rate_percent
            .partial_cmp(&b.rate_percent)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.code.cmp(&b.code))
    });

    if boundaries.is_none() && !ranked.is_empty() {
        log::info!(
            "ranking: population of {} is below the quartile floor of {}, labelling all N/A",
            ranked.len(),
            config.min_population
        );
    }
    ranked
}
