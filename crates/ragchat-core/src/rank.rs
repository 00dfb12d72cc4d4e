//! Hit ranking and context construction.
//!
//! Hits from every source are merged into one list, sorted by score
//! (descending, stable), and truncated to [`TOP_K`]. The survivors are
//! serialized into the prompt context and attributed.
//!
//! # Example
//!
//! ```rust
//! use ragchat_core::models::Hit;
//! use ragchat_core::rank::RankedContext;
//!
//! let ranked = RankedContext::from_hits(vec![
//!     Hit::new(0.2, "wiki", "low"),
//!     Hit::new(0.9, "docs", "high"),
//! ]);
//! assert_eq!(ranked.context, "docs: high\n\nwiki: low");
//! assert_eq!(ranked.sources, vec!["docs", "wiki"]);
//! ```

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::models::Hit;

/// Maximum number of hits that survive ranking.
pub const TOP_K: usize = 10;

/// Descending score order. NaN sorts last and `-0.0 == 0.0`, so the order
/// is total and equal scores compare `Equal`.
pub(crate) fn by_score_desc(a: &Hit, b: &Hit) -> Ordering {
    sort_key(b.score).total_cmp(&sort_key(a.score))
}

fn sort_key(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else if score == 0.0 {
        0.0
    } else {
        score
    }
}

/// Sort by score descending and keep the first [`TOP_K`].
///
/// The sort is stable: hits with equal scores keep their input order.
pub fn rank_hits(hits: Vec<Hit>) -> Vec<Hit> {
    rank_top(hits, TOP_K)
}

/// [`rank_hits`] with an explicit cutoff.
pub fn rank_top(mut hits: Vec<Hit>, k: usize) -> Vec<Hit> {
    hits.sort_by(by_score_desc);
    hits.truncate(k);
    hits
}

/// Serialize ranked hits as `"{source}: {data}"` blocks separated by a
/// blank line, in ranked order.
pub fn build_context(ranked: &[Hit]) -> String {
    ranked
        .iter()
        .map(|h| format!("{}: {}", h.payload.source, h.payload.data))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Distinct source labels among `ranked`, in order of first appearance.
///
/// Only the hits passed in are considered, so a source whose hits were all
/// cut by ranking is not attributed.
pub fn attributed_sources(ranked: &[Hit]) -> Vec<String> {
    let mut seen = HashSet::new();
    ranked
        .iter()
        .filter(|h| seen.insert(h.payload.source.as_str()))
        .map(|h| h.payload.source.clone())
        .collect()
}

/// The ranked hits of one turn plus everything derived from them.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedContext {
    pub hits: Vec<Hit>,
    pub context: String,
    pub sources: Vec<String>,
}

impl RankedContext {
    pub fn from_hits(hits: Vec<Hit>) -> Self {
        let hits = rank_hits(hits);
        let context = build_context(&hits);
        let sources = attributed_sources(&hits);
        Self {
            hits,
            context,
            sources,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(score: f32, source: &str, data: &str) -> Hit {
        Hit::new(score, source, data)
    }

    #[test]
    fn test_rank_sorts_descending_and_truncates() {
        let hits: Vec<Hit> = (0..25)
            .map(|i| hit((i % 7) as f32 / 7.0, "s", &i.to_string()))
            .collect();
        let ranked = rank_hits(hits);
        assert_eq!(ranked.len(), TOP_K);
        for pair in ranked.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_rank_is_stable_for_equal_scores() {
        let hits = vec![
            hit(0.5, "a", "first"),
            hit(0.9, "b", "top"),
            hit(0.5, "c", "second"),
            hit(0.5, "d", "third"),
        ];
        let ranked = rank_hits(hits);
        let data: Vec<&str> = ranked.iter().map(|h| h.payload.data.as_str()).collect();
        assert_eq!(data, vec!["top", "first", "second", "third"]);
    }

    #[test]
    fn test_rank_stability_across_truncation_boundary() {
        let hits: Vec<Hit> = (0..15).map(|i| hit(1.0, "s", &i.to_string())).collect();
        let ranked = rank_hits(hits);
        let data: Vec<String> = ranked.iter().map(|h| h.payload.data.clone()).collect();
        let expected: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        assert_eq!(data, expected);
    }

    #[test]
    fn test_rank_nan_sorts_last() {
        let ranked = rank_hits(vec![hit(f32::NAN, "n", "nan"), hit(0.1, "s", "real")]);
        assert_eq!(ranked[0].payload.data, "real");
        assert!(ranked[1].score.is_nan());
    }

    #[test]
    fn test_rank_negative_zero_ties_with_zero() {
        let ranked = rank_hits(vec![hit(-0.0, "a", "first"), hit(0.0, "b", "second")]);
        assert_eq!(ranked[0].payload.data, "first");
    }

    #[test]
    fn test_rank_empty() {
        assert!(rank_hits(Vec::new()).is_empty());
        assert_eq!(build_context(&[]), "");
        assert!(attributed_sources(&[]).is_empty());
    }

    #[test]
    fn test_build_context_format() {
        let ranked = vec![hit(0.9, "docs", "alpha"), hit(0.8, "wiki", "beta")];
        let ctx = build_context(&ranked);
        assert_eq!(ctx, "docs: alpha\n\nwiki: beta");
        assert_eq!(ctx, build_context(&ranked));
    }

    #[test]
    fn test_attribution_only_counts_surviving_hits() {
        // 15 hits over 4 sources; only "alpha" and "beta" make the top 10.
        let mut hits = Vec::new();
        for i in 0..6 {
            hits.push(hit(0.9 - i as f32 * 0.01, "alpha", "a"));
        }
        for i in 0..4 {
            hits.push(hit(0.8 - i as f32 * 0.01, "beta", "b"));
        }
        for i in 0..3 {
            hits.push(hit(0.3 - i as f32 * 0.01, "gamma", "g"));
        }
        for i in 0..2 {
            hits.push(hit(0.2 - i as f32 * 0.01, "delta", "d"));
        }
        assert_eq!(hits.len(), 15);

        let ranked = RankedContext::from_hits(hits);
        assert_eq!(ranked.hits.len(), 10);
        let mut sources = ranked.sources.clone();
        sources.sort();
        assert_eq!(sources, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_attribution_dedupes() {
        let ranked = vec![hit(0.9, "a", "1"), hit(0.8, "b", "2"), hit(0.7, "a", "3")];
        assert_eq!(attributed_sources(&ranked), vec!["a", "b"]);
    }
}
