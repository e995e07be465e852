use std::cmp::Ordering;

use crate::feature::{DescriptorMatch, Descriptors};

/// Pairs descriptor rows of two frames.
pub trait DescriptorMatcher {
    /// Matches from `query` rows to `train` rows, sorted by ascending distance.
    fn match_descriptors(&self, query: &Descriptors, train: &Descriptors) -> Vec<DescriptorMatch>;
}

/// Exhaustive nearest neighbour search, Hamming distance for binary descriptors
/// and euclidean distance for float descriptors.
#[derive(Debug, Clone)]
pub struct BruteForceMatcher {
    /// Only keep pairs that are mutual nearest neighbours
    pub cross_check: bool,
}

impl Default for BruteForceMatcher {
    fn default() -> Self {
        BruteForceMatcher { cross_check: true }
    }
}

impl BruteForceMatcher {
    fn nearest(from: &Descriptors, i: usize, to: &Descriptors) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for j in 0..to.len() {
            let d = from.distance(i, to, j)?;
            if best.map_or(true, |(_, b)| d < b) {
                best = Some((j, d));
            }
        }
        best
    }
}

impl DescriptorMatcher for BruteForceMatcher {
    fn match_descriptors(&self, query: &Descriptors, train: &Descriptors) -> Vec<DescriptorMatch> {
        let mut matches = vec![];
        for query_idx in 0..query.len() {
            let Some((train_idx, distance)) = Self::nearest(query, query_idx, train) else {
                continue;
            };
            if self.cross_check {
                match Self::nearest(train, train_idx, query) {
                    Some((back, _)) if back == query_idx => {}
                    _ => continue,
                }
            }
            matches.push(DescriptorMatch {
                query_idx,
                train_idx,
                distance,
            });
        }
        matches.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
        matches
    }
}
