//! Identifier sets and their intersection

use std::collections::BTreeSet;

use crate::engine::relational::SampleId;

/// Result of one resolver: either "this side does not filter" or a concrete,
/// ascending set of sample ids (possibly empty).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdSet {
    Unconstrained,
    Ids(BTreeSet<SampleId>),
}

impl IdSet {
    pub fn from_ids(ids: impl IntoIterator<Item = SampleId>) -> Self {
        IdSet::Ids(ids.into_iter().collect())
    }

    pub fn is_unconstrained(&self) -> bool {
        matches!(self, IdSet::Unconstrained)
    }

    /// Constrained and matched nothing
    pub fn is_empty(&self) -> bool {
        matches!(self, IdSet::Ids(ids) if ids.is_empty())
    }

    pub fn intersect(self, other: IdSet) -> IdSet {
        match (self, other) {
            (IdSet::Unconstrained, IdSet::Unconstrained) => IdSet::Unconstrained,
            (IdSet::Unconstrained, ids) | (ids, IdSet::Unconstrained) => ids,
            (IdSet::Ids(a), IdSet::Ids(b)) => {
                let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
                IdSet::Ids(small.into_iter().filter(|id| large.contains(id)).collect())
            }
        }
    }
}

/// Keep the `cap` smallest ids; the flag reports whether anything was cut
pub fn cap_ids(ids: impl IntoIterator<Item = SampleId>, cap: usize) -> (Vec<SampleId>, bool) {
    let mut iter = ids.into_iter();
    let kept: Vec<SampleId> = iter.by_ref().take(cap).collect();
    let truncated = iter.next().is_some();
    (kept, truncated)
}
