//! Deterministic block partitioning and union/gather merge support shared
//! by the trial container types.

use std::ops::Range;

use crate::catalog::IdCatalog;

/// Positional bounds of block `part` (1-based) when `len` elements are
/// divided into `num_parts` contiguous near-equal blocks.
///
/// Boundaries are `floor(p * len / num_parts)`, so the blocks tile the full
/// range: every position belongs to exactly one block, and merging all
/// blocks recovers the original axis.
pub(crate) fn block_bounds(len: usize, part: usize, num_parts: usize) -> Range<usize> {
    assert!(num_parts > 0, "num_parts must be positive");
    assert!(
        (1..=num_parts).contains(&part),
        "part index {part} out of range 1..={num_parts}"
    );
    let start = (part - 1) * len / num_parts;
    let end = part * len / num_parts;
    start..end
}

/// Sorted identifier union over all input catalogs plus, per input, the
/// parallel `(positions in union, positions in input)` index arrays used to
/// scatter that input's cells into the union grid.
pub(crate) fn union_maps(catalogs: &[&IdCatalog]) -> (IdCatalog, Vec<(Vec<usize>, Vec<usize>)>) {
    let mut ids: Vec<String> = catalogs
        .iter()
        .flat_map(|c| c.ids().iter().cloned())
        .collect();
    ids.sort();
    ids.dedup();
    let union = IdCatalog::new(ids).expect("sorted deduplicated ids are unique");

    let maps = catalogs
        .iter()
        .map(|c| {
            let (_, in_union, in_input) = union.intersect(c);
            (in_union, in_input)
        })
        .collect();
    (union, maps)
}
