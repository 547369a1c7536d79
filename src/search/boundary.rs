use serde::{Deserialize, Serialize};

use super::matcher::WordMatch;

/// A clip window in seconds, `0 <= start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Anything with a start and an end on the media timeline.
pub trait Interval {
    fn start(&self) -> f64;
    fn end(&self) -> f64;
}

impl Interval for TimeRange {
    fn start(&self) -> f64 {
        self.start
    }
    fn end(&self) -> f64 {
        self.end
    }
}

impl Interval for WordMatch {
    fn start(&self) -> f64 {
        self.start
    }
    fn end(&self) -> f64 {
        self.end
    }
}

impl Interval for (f64, f64) {
    fn start(&self) -> f64 {
        self.0
    }
    fn end(&self) -> f64 {
        self.1
    }
}

/// Widens every interval by `padding` on both sides, clamps to
/// `[0, upper]`, drops empty results and merges the ones that touch or
/// overlap.
///
/// Without an `upper` bound only the lower clamp at zero applies. The
/// output is sorted, non-overlapping and every range has `end > start`.
pub fn merge_expanded<T: Interval>(items: &[T], padding: f64, upper: Option<f64>) -> Vec<TimeRange> {
    let padding = if padding.is_finite() && padding > 0.0 {
        padding
    } else {
        0.0
    };

    let mut candidates: Vec<TimeRange> = items
        .iter()
        .filter_map(|item| {
            let start = (item.start() - padding).max(0.0);
            let mut end = item.end() + padding;
            if let Some(limit) = upper {
                end = end.min(limit);
            }
            (start < end).then_some(TimeRange { start, end })
        })
        .collect();

    candidates.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut merged: Vec<TimeRange> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match merged.last_mut() {
            Some(open) if candidate.start <= open.end => {
                open.end = open.end.max(candidate.end);
            }
            _ => merged.push(candidate),
        }
    }
    merged
}

/// Turns search hits into independently trimmable clip windows.
///
/// A `media_duration` that is not a positive number is treated as unknown.
pub fn plan<T: Interval>(matches: &[T], padding: f64, media_duration: f64) -> Vec<TimeRange> {
    let upper = (media_duration.is_finite() && media_duration > 0.0).then_some(media_duration);
    merge_expanded(matches, padding, upper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn assert_ranges(actual: &[TimeRange], expected: &[(f64, f64)]) {
        assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
        for (got, (start, end)) in actual.iter().zip(expected) {
            assert_abs_diff_eq!(got.start, *start, epsilon = 1e-9);
            assert_abs_diff_eq!(got.end, *end, epsilon = 1e-9);
        }
    }

    fn hit(start: f64, end: f64) -> WordMatch {
        WordMatch {
            text: "x".into(),
            start,
            end,
            segment_index: 0,
            context_text: String::new(),
        }
    }

    #[test]
    fn single_word_gets_symmetric_context() {
        let ranges = plan(&[hit(15.2, 16.5)], 2.0, 120.0);
        assert_ranges(&ranges, &[(13.2, 18.5)]);
    }

    #[test]
    fn overlapping_candidates_merge() {
        let ranges = plan(&[hit(10.0, 10.5), hit(10.4, 11.0)], 0.3, 60.0);
        assert_ranges(&ranges, &[(9.7, 11.3)]);
    }

    #[test]
    fn both_bounds_clamp() {
        let ranges = plan(&[hit(0.1, 0.3)], 5.0, 2.0);
        assert_ranges(&ranges, &[(0.0, 2.0)]);
    }

    #[test]
    fn touching_candidates_merge_but_gaps_do_not() {
        let ranges = plan(&[(1.0, 2.0), (2.0, 3.0), (3.5, 4.0)], 0.0, 10.0);
        assert_ranges(&ranges, &[(1.0, 3.0), (3.5, 4.0)]);
    }

    #[test]
    fn unsorted_input_is_sorted_and_contained_ranges_absorbed() {
        let ranges = plan(&[(8.0, 9.0), (1.0, 6.0), (2.0, 3.0)], 0.5, 100.0);
        assert_ranges(&ranges, &[(0.5, 6.5), (7.5, 9.5)]);
    }

    #[test]
    fn collapsed_ranges_are_dropped() {
        // starts past the end of the media
        let ranges = plan(&[(12.0, 13.0), (1.0, 2.0)], 0.5, 10.0);
        assert_ranges(&ranges, &[(0.5, 2.5)]);
        assert!(plan(&[(3.0, 3.0)], 0.0, 10.0).is_empty());
    }

    #[test]
    fn unknown_duration_only_clamps_at_zero() {
        assert_ranges(&plan(&[(0.5, 1.0)], 1.0, 0.0), &[(0.0, 2.0)]);
        assert_ranges(&plan(&[(0.5, 1.0)], 1.0, f64::NAN), &[(0.0, 2.0)]);
        assert_ranges(&merge_expanded(&[(100.0, 101.0)], 1.0, None), &[(99.0, 102.0)]);
    }

    #[test]
    fn negative_padding_counts_as_zero() {
        assert_ranges(&plan(&[(1.0, 2.0)], -3.0, 10.0), &[(1.0, 2.0)]);
    }

    #[test]
    fn output_is_ordered_disjoint_and_bounded() {
        let mut spans = Vec::new();
        for i in 0..40 {
            let start = (i * 37 % 97) as f64 * 0.7;
            spans.push((start, start + 0.2 + (i % 5) as f64 * 0.3));
        }
        let duration = 50.0;
        let ranges = plan(&spans, 0.8, duration);

        assert!(!ranges.is_empty());
        for r in &ranges {
            assert!(r.start >= 0.0 && r.end <= duration && r.end > r.start, "{r:?}");
        }
        for w in ranges.windows(2) {
            assert!(w[0].end < w[1].start, "{:?}", w);
        }
    }

    #[test]
    fn planning_merged_output_again_is_identity() {
        let spans = [(1.0, 1.5), (1.6, 2.0), (5.0, 5.5), (9.8, 10.0)];
        let first = plan(&spans, 0.5, 10.0);
        let second = plan(&first, 0.0, 10.0);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_input_plans_nothing() {
        assert!(plan::<WordMatch>(&[], 2.0, 10.0).is_empty());
    }
}
