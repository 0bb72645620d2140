//! Micro-synteny search: colinear gene-family runs across all chromosomes.

use std::collections::{BTreeMap, HashSet};

use itertools::Itertools;
use serde::Serialize;

use crate::err::ServiceError;
use crate::store::schema::NO_FAMILY;
use crate::store::Store;

/// A run of genes matching the query on one chromosome.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Chromosome name.
    pub name: String,
    /// Genus of the chromosome's organism.
    pub genus: String,
    /// Species of the chromosome's organism.
    pub species: String,
    /// Names of the genes on the track, in chromosome order.
    pub genes: Vec<String>,
    /// Families of the genes on the track, parallel to `genes`.
    pub families: Vec<String>,
}

/// Validated micro-synteny thresholds.
///
/// `matched` and `intermediate` are positive; values ≥ 1 are absolute
/// counts, values in (0, 1) are fractions of the query length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Minimum number of matched genes per track.
    pub matched: f64,
    /// Maximum gap between successive matches along the target.
    pub intermediate: f64,
}

impl Thresholds {
    /// Validate raw threshold values.
    pub fn new(matched: f64, intermediate: f64) -> Result<Self, ServiceError> {
        if !matched.is_finite() || !intermediate.is_finite() {
            return Err(ServiceError::invalid(
                "matched and intermediate must be finite",
            ));
        }
        if matched <= 0.0 || intermediate <= 0.0 {
            return Err(ServiceError::invalid(
                "matched and intermediate must be positive",
            ));
        }
        Ok(Self {
            matched,
            intermediate,
        })
    }

    /// Whether two successive matches at `last` and `next` may share a block.
    fn gap_ok(&self, last: usize, next: usize, query_len: usize) -> bool {
        let gap = (next - last) as f64;
        if self.intermediate < 1.0 {
            gap / query_len as f64 <= self.intermediate
        } else {
            gap <= self.intermediate - 1.0
        }
    }

    /// Whether a block of `len` matches satisfies the `matched` threshold.
    fn size_ok(&self, len: usize, query_len: usize) -> bool {
        if self.matched < 1.0 {
            len as f64 / query_len as f64 >= self.matched
        } else {
            len as f64 >= self.matched
        }
    }
}

/// Greedily walk a chromosome's sorted match indices into qualifying blocks.
///
/// Returns the `(first, last)` index bounds of every block that satisfies
/// the thresholds, in ascending order.
pub fn gap_walk(indices: &[usize], query_len: usize, thresholds: &Thresholds) -> Vec<(usize, usize)> {
    let mut blocks = Vec::new();
    let Some(&first) = indices.first() else {
        return blocks;
    };
    let mut block_first = first;
    let mut block_last = first;
    let mut block_len = 1usize;
    for &i in &indices[1..] {
        if thresholds.gap_ok(block_last, i, query_len) {
            // Match is close enough to the previous match to extend the block.
            block_last = i;
            block_len += 1;
        } else {
            // Match is too far away; emit the block if it's big enough.
            if thresholds.size_ok(block_len, query_len) {
                blocks.push((block_first, block_last));
            }
            block_first = i;
            block_last = i;
            block_len = 1;
        }
    }
    if thresholds.size_ok(block_len, query_len) {
        blocks.push((block_first, block_last));
    }
    blocks
}

/// Bin the members of the query's families by chromosome, indices sorted.
///
/// The unassigned-family sentinel never matches. With `targets` given, only
/// those chromosomes are considered.
pub fn match_indices(
    store: &Store,
    query: &[String],
    targets: Option<&HashSet<String>>,
) -> Result<BTreeMap<String, Vec<usize>>, ServiceError> {
    let families = query
        .iter()
        .map(String::as_str)
        .filter(|f| *f != NO_FAMILY)
        .unique();
    let mut binned: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for family in families {
        for (chromosome, index) in store.family_members(family, targets)? {
            binned.entry(chromosome).or_default().push(index);
        }
    }
    for indices in binned.values_mut() {
        indices.sort_unstable();
    }
    Ok(binned)
}

/// Find colinear runs of the query's families across all chromosomes.
pub fn search(
    store: &Store,
    query: &[String],
    thresholds: &Thresholds,
) -> Result<Vec<Track>, ServiceError> {
    let mut tracks = Vec::new();
    for (chromosome, indices) in match_indices(store, query, None)? {
        let blocks = gap_walk(&indices, query.len(), thresholds);
        if blocks.is_empty() {
            continue;
        }
        let record = store
            .chromosome(&chromosome)?
            .ok_or_else(|| anyhow::anyhow!("chromosome {chromosome} is indexed but has no record"))?;
        let genes = store
            .chromosome_genes(&chromosome)?
            .ok_or_else(|| anyhow::anyhow!("chromosome {chromosome} has no gene sequence"))?;
        let families = store
            .chromosome_families(&chromosome)?
            .ok_or_else(|| anyhow::anyhow!("chromosome {chromosome} has no family sequence"))?;
        for (first, last) in blocks {
            tracks.push(Track {
                name: chromosome.clone(),
                genus: record.genus.clone(),
                species: record.species.clone(),
                genes: genes[first..=last].to_vec(),
                families: families[first..=last].to_vec(),
            });
        }
    }
    Ok(tracks)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{gap_walk, search, Thresholds};
    use crate::store::test_support::{populate, ChromosomeFixture};

    fn thresholds(matched: f64, intermediate: f64) -> Thresholds {
        Thresholds::new(matched, intermediate).unwrap()
    }

    #[test]
    fn thresholds_reject_nonpositive_values() {
        assert!(Thresholds::new(0.0, 1.0).is_err());
        assert!(Thresholds::new(1.0, -2.0).is_err());
        assert!(Thresholds::new(f64::NAN, 1.0).is_err());
        assert!(Thresholds::new(4.0, f64::INFINITY).is_err());
    }

    #[rstest::rstest]
    // Contiguous run, absolute thresholds.
    #[case(&[3, 4, 5, 6], 4, 2.0, 2.0, &[(3, 6)])]
    // A gap of 2 exceeds intermediate = 2 (max allowed gap is 1).
    #[case(&[3, 4, 7, 8], 4, 2.0, 2.0, &[(3, 4), (7, 8)])]
    // Same walk, but only the first block is big enough once split.
    #[case(&[3, 4, 5, 9], 4, 3.0, 2.0, &[(3, 5)])]
    // Fractional intermediate: gap 2 over query length 4 is 0.5.
    #[case(&[0, 2, 4], 4, 3.0, 0.5, &[(0, 4)])]
    #[case(&[0, 2, 4], 4, 3.0, 0.4, &[])]
    // Fractional matched: 2 of 4 is exactly half.
    #[case(&[0, 1], 4, 0.5, 2.0, &[(0, 1)])]
    #[case(&[0, 1], 4, 0.51, 2.0, &[])]
    // Empty input.
    #[case(&[], 4, 1.0, 1.0, &[])]
    fn gap_walk_cases(
        #[case] indices: &[usize],
        #[case] query_len: usize,
        #[case] matched: f64,
        #[case] intermediate: f64,
        #[case] expected: &[(usize, usize)],
    ) {
        let actual = gap_walk(indices, query_len, &thresholds(matched, intermediate));
        assert_eq!(expected.to_vec(), actual);
    }

    /// `intermediate = 1` means a maximum gap of 0, so nothing qualifies
    /// and the fractional `matched = 0.67` rejects the 2-of-3 run as well.
    #[test]
    fn fractional_matched_boundary() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = populate(
            tmp_dir.path(),
            &[ChromosomeFixture {
                name: "X",
                length: 10_000,
                genus: "Zea",
                species: "mays",
                genes: vec![
                    ("X.g1", 100, 200, 1, "A"),
                    ("X.g2", 300, 400, 1, "B"),
                    ("X.g3", 500, 600, 1, "Z"),
                    ("X.g4", 700, 800, 1, "C"),
                    ("X.g5", 900, 1_000, 1, "D"),
                ],
            }],
        );
        let query = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let tracks = search(&store, &query, &thresholds(0.67, 1.0)).unwrap();
        assert_eq!(Vec::<super::Track>::new(), tracks);
    }

    /// With a gap allowance the A..C run qualifies and spans the
    /// intermediate non-matching gene.
    #[test]
    fn track_spans_intermediate_genes() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = populate(
            tmp_dir.path(),
            &[ChromosomeFixture {
                name: "X",
                length: 10_000,
                genus: "Zea",
                species: "mays",
                genes: vec![
                    ("X.g1", 100, 200, 1, "A"),
                    ("X.g2", 300, 400, 1, "B"),
                    ("X.g3", 500, 600, 1, "Z"),
                    ("X.g4", 700, 800, 1, "C"),
                    ("X.g5", 900, 1_000, 1, "D"),
                ],
            }],
        );
        let query = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let tracks = search(&store, &query, &thresholds(3.0, 3.0)).unwrap();
        assert_eq!(1, tracks.len());
        let track = &tracks[0];
        assert_eq!("X", track.name);
        assert_eq!("Zea", track.genus);
        assert_eq!(vec!["X.g1", "X.g2", "X.g3", "X.g4"], track.genes);
        assert_eq!(vec!["A", "B", "Z", "C"], track.families);
    }

    /// The unassigned-family sentinel in the query is never eligible.
    #[test]
    fn empty_family_never_matches() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = populate(
            tmp_dir.path(),
            &[ChromosomeFixture {
                name: "X",
                length: 10_000,
                genus: "Zea",
                species: "mays",
                genes: vec![("X.g1", 100, 200, 1, ""), ("X.g2", 300, 400, 1, "")],
            }],
        );
        let query = vec!["".to_string(), "".to_string()];
        let tracks = search(&store, &query, &thresholds(1.0, 1.0)).unwrap();
        assert!(tracks.is_empty());
    }
}
