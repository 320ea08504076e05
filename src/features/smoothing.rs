//! Dynamic-window exponential smoothing.
//!
//! Each team's weekly EPA series is smoothed with an exponentially weighted
//! mean whose span widens once a season passes week 10. Because the span
//! changes from row to row, every row re-weights its whole prefix with its
//! own decay factor; the series are short enough that this stays cheap.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::features::epa::TeamWeekEpa;

/// Weeks up to and including this one share the same span.
pub const SPAN_FLOOR_WEEK: u32 = 10;

/// A team-week with its smoothed ("dynamic") EPA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothedEpa {
    pub team: String,
    pub season: u32,
    pub week: u32,
    pub epa: f64,
    pub ewma_dynamic: f64,
}

pub fn span_for_week(week: u32) -> u32 {
    week.max(SPAN_FLOOR_WEEK)
}

/// Smoothing factor for a span: `2 / (span + 1)`.
pub fn alpha_for_span(span: u32) -> f64 {
    2.0 / (f64::from(span) + 1.0)
}

/// Exponentially weighted mean of `values`, evaluated at the last element.
///
/// Observation `k` steps back gets weight `(1 - alpha)^k`, normalised by the
/// sum of weights, so a single observation returns itself.
pub fn ewma_last(values: &[f64], alpha: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let decay = 1.0 - alpha;
    let (weighted, weights) = values
        .iter()
        .fold((0.0, 0.0), |(num, den), &x| (num * decay + x, den * decay + 1.0));
    Some(weighted / weights)
}

/// Smooth one team's series, given as (week, epa) in ascending (season, week)
/// order. Row `i` averages rows `0..=i` with the span of row `i`'s week.
pub fn dynamic_window(series: &[(u32, f64)]) -> Vec<f64> {
    let values: Vec<f64> = series.iter().map(|&(_, epa)| epa).collect();

    series
        .iter()
        .enumerate()
        .filter_map(|(i, &(week, _))| {
            ewma_last(&values[..=i], alpha_for_span(span_for_week(week)))
        })
        .collect()
}

/// Smooth a whole aggregate table, each team independently.
///
/// Output is ordered by (team, season, week) whatever the input order.
pub fn smooth(table: &[TeamWeekEpa]) -> Vec<SmoothedEpa> {
    let mut by_team: BTreeMap<&str, Vec<&TeamWeekEpa>> = BTreeMap::new();
    for row in table {
        by_team.entry(row.team.as_str()).or_default().push(row);
    }

    let mut smoothed = Vec::with_capacity(table.len());
    for (team, mut rows) in by_team {
        rows.sort_by_key(|r| (r.season, r.week));
        let series: Vec<(u32, f64)> = rows.iter().map(|r| (r.week, r.epa)).collect();

        for (row, ewma_dynamic) in rows.iter().zip(dynamic_window(&series)) {
            smoothed.push(SmoothedEpa {
                team: team.to_string(),
                season: row.season,
                week: row.week,
                epa: row.epa,
                ewma_dynamic,
            });
        }
    }

    smoothed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(team: &str, season: u32, week: u32, epa: f64) -> TeamWeekEpa {
        TeamWeekEpa {
            team: team.to_string(),
            season,
            week,
            epa,
            plays: 1,
        }
    }

    #[test]
    fn test_span_threshold() {
        assert_eq!(span_for_week(1), 10);
        assert_eq!(span_for_week(10), 10);
        assert_eq!(span_for_week(11), 11);
        assert_eq!(span_for_week(17), 17);
    }

    #[test]
    fn test_single_observation_is_identity() {
        assert_eq!(ewma_last(&[0.123456789], alpha_for_span(10)), Some(0.123456789));
        assert_eq!(ewma_last(&[], 0.5), None);
    }

    #[test]
    fn test_ewma_matches_explicit_weights() {
        let values = [0.1, 0.3, -0.2];
        let alpha = alpha_for_span(10);
        let d = 1.0 - alpha;
        let expected = (0.1 * d * d + 0.3 * d - 0.2) / (d * d + d + 1.0);
        let got = ewma_last(&values, alpha).unwrap();
        assert!((got - expected).abs() < 1e-12);
    }

    #[test]
    fn test_first_row_equals_raw_value() {
        let smoothed = smooth(&[row("KC", 2020, 1, 0.1), row("KC", 2020, 2, 0.3)]);
        assert_eq!(smoothed[0].ewma_dynamic, 0.1);
    }

    #[test]
    fn test_each_step_moves_toward_current_value() {
        let values = [0.1, 0.3, -0.2, 0.5];
        let table: Vec<TeamWeekEpa> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| row("KC", 2020, i as u32 + 1, v))
            .collect();
        let smoothed = smooth(&table);

        assert_eq!(smoothed[0].ewma_dynamic, 0.1);
        for i in 1..smoothed.len() {
            let prev = smoothed[i - 1].ewma_dynamic;
            let raw = values[i];
            let cur = smoothed[i].ewma_dynamic;
            let (lo, hi) = if prev < raw { (prev, raw) } else { (raw, prev) };
            assert!(cur > lo && cur < hi, "week {} value {cur} outside ({lo}, {hi})", i + 1);
        }
    }

    #[test]
    fn test_week_eleven_widens_span() {
        let series: Vec<(u32, f64)> = (1..=11)
            .map(|week| (week, if week % 2 == 0 { 0.4 } else { -0.2 }))
            .collect();
        let values: Vec<f64> = series.iter().map(|&(_, v)| v).collect();

        let dynamic = dynamic_window(&series);
        let baseline = ewma_last(&values, alpha_for_span(10)).unwrap();
        let widened = ewma_last(&values, alpha_for_span(11)).unwrap();

        assert_eq!(dynamic[10], widened);
        assert!((dynamic[10] - baseline).abs() > 1e-6);
        // Week 10 still uses the floor span
        assert_eq!(dynamic[9], ewma_last(&values[..10], alpha_for_span(10)).unwrap());
    }

    #[test]
    fn test_prefix_spans_season_boundary() {
        let table = vec![row("BUF", 2019, 17, 1.0), row("BUF", 2020, 1, 0.0)];
        let smoothed = smooth(&table);
        let expected = ewma_last(&[1.0, 0.0], alpha_for_span(10)).unwrap();
        assert_eq!(smoothed[1].ewma_dynamic, expected);
        assert!(smoothed[1].ewma_dynamic > 0.0);
    }

    #[test]
    fn test_teams_are_independent_of_input_order() {
        let table = vec![
            row("KC", 2020, 2, 0.3),
            row("BUF", 2020, 1, -0.1),
            row("KC", 2020, 1, 0.1),
            row("BUF", 2020, 2, 0.2),
        ];
        let mut shuffled = table.clone();
        shuffled.reverse();

        let a = smooth(&table);
        let b = smooth(&shuffled);
        assert_eq!(a, b);
        assert_eq!(a[0].team, "BUF");
        assert_eq!(a[2].team, "KC");
        assert_eq!(a[2].ewma_dynamic, 0.1);
    }

    #[test]
    fn test_smoothing_is_deterministic() {
        let table: Vec<TeamWeekEpa> = (1..=18)
            .map(|w| row("DET", 2023, w, (w as f64 * 0.37).sin()))
            .collect();
        let first: Vec<u64> = smooth(&table).iter().map(|r| r.ewma_dynamic.to_bits()).collect();
        let second: Vec<u64> = smooth(&table).iter().map(|r| r.ewma_dynamic.to_bits()).collect();
        assert_eq!(first, second);
    }
}
