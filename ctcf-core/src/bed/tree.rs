use bio::data_structures::interval_tree::{IntervalTree, IntervalTreeIterator};
use std::collections::HashMap;

use super::{BEDLike, GenomicRange};

/// Per-chromosome interval trees carrying a payload for every interval.
pub struct BedTree<D>(HashMap<String, IntervalTree<u64, D>>);

impl<D> Default for BedTree<D> {
    fn default() -> Self {
        Self(HashMap::new())
    }
}

impl<D, B: BEDLike> FromIterator<(B, D)> for BedTree<D> {
    fn from_iter<I: IntoIterator<Item = (B, D)>>(iter: I) -> Self {
        let mut hmap: HashMap<String, IntervalTree<u64, D>> = HashMap::new();
        for (bed, data) in iter {
            hmap.entry(bed.chrom().to_string())
                .or_insert_with(IntervalTree::new)
                .insert(bed.start() .. bed.end(), data);
        }
        BedTree(hmap)
    }
}

/// Iterates over the entries overlapping a query, see [`BedTree::find`].
pub struct BedTreeIterator<'a, D> {
    chrom: &'a str,
    interval_tree_iterator: Option<IntervalTreeIterator<'a, u64, D>>,
}

impl<'a, D: 'a> Iterator for BedTreeIterator<'a, D> {
    type Item = (GenomicRange, &'a D);

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.interval_tree_iterator.as_mut()?.next()?;
        let bed = GenomicRange::new(self.chrom, item.interval().start, item.interval().end);
        Some((bed, item.data()))
    }
}

impl<D> BedTree<D> {
    /// All entries whose interval shares at least one base with `bed`.
    /// Empty queries never match.
    pub fn find<'a, B: BEDLike>(&'a self, bed: &'a B) -> BedTreeIterator<'a, D> {
        let chrom = bed.chrom();
        let iter = if bed.start() < bed.end() {
            self.0.get(chrom).map(|tree| tree.find(bed.start() .. bed.end()))
        } else {
            None
        };
        BedTreeIterator { chrom, interval_tree_iterator: iter }
    }
}
