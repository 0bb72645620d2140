//! Region lookup: the center gene of a chromosome interval and how many
//! genes the interval overlaps.

use serde::Serialize;

use crate::err::ServiceError;
use crate::store::Store;

/// The middle overlapping gene of a region and the overlap count.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Region {
    /// Name of the middle overlapping gene.
    pub gene: String,
    /// Total number of genes the interval overlaps.
    pub neighbors: usize,
}

/// Locate the center gene of `[start, stop]` on a chromosome.
///
/// `i` is the first gene starting at or after `start` and `j` the first
/// gene ending past `stop` (half-open right), both by binary search over
/// the sorted coordinate sequences; the center gene sits halfway between.
pub fn get(store: &Store, chromosome: &str, start: u64, stop: u64) -> Result<Region, ServiceError> {
    if store.chromosome(chromosome)?.is_none() {
        return Err(ServiceError::NotFound);
    }
    let fmins = store
        .chromosome_fmins(chromosome)?
        .ok_or_else(|| anyhow::anyhow!("chromosome {chromosome} has no fmin sequence"))?;
    let fmaxs = store
        .chromosome_fmaxs(chromosome)?
        .ok_or_else(|| anyhow::anyhow!("chromosome {chromosome} has no fmax sequence"))?;

    let i = fmins.partition_point(|&fmin| fmin < start);
    let j = fmaxs.partition_point(|&fmax| fmax <= stop);
    let neighbors = j.saturating_sub(i);
    let center = (i + j) / 2;

    let genes = store
        .chromosome_genes(chromosome)?
        .ok_or_else(|| anyhow::anyhow!("chromosome {chromosome} has no gene sequence"))?;
    // The region can sit past every gene on the chromosome.
    let gene = genes.get(center).cloned().ok_or(ServiceError::NotFound)?;
    Ok(Region { gene, neighbors })
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::err::ServiceError;
    use crate::store::test_support::{populate, two_chromosome_fixtures};

    // glyma.Chr01 gene extents: (1000..2000), (3000..4000), (5000..6000),
    // (7000..8000), (9000..10000).

    #[test]
    fn center_gene_and_neighbor_count() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = populate(tmp_dir.path(), &two_chromosome_fixtures());
        let region = super::get(&store, "glyma.Chr01", 3_000, 8_000).unwrap();
        // Genes 1..=3 overlap; the center is gene 2.
        assert_eq!("glyma.Chr01.g3", region.gene);
        assert_eq!(3, region.neighbors);
    }

    #[test]
    fn single_gene_region() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = populate(tmp_dir.path(), &two_chromosome_fixtures());
        let region = super::get(&store, "glyma.Chr01", 4_500, 6_500).unwrap();
        assert_eq!("glyma.Chr01.g3", region.gene);
        assert_eq!(1, region.neighbors);
    }

    #[test]
    fn interval_between_genes_has_no_neighbors() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = populate(tmp_dir.path(), &two_chromosome_fixtures());
        let region = super::get(&store, "glyma.Chr01", 2_100, 2_200).unwrap();
        assert_eq!(0, region.neighbors);
        assert_eq!("glyma.Chr01.g2", region.gene);
    }

    #[test]
    fn missing_chromosome_is_not_found() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = populate(tmp_dir.path(), &two_chromosome_fixtures());
        assert!(matches!(
            super::get(&store, "glyma.Chr99", 0, 100),
            Err(ServiceError::NotFound)
        ));
    }

    #[test]
    fn region_past_every_gene_is_not_found() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = populate(tmp_dir.path(), &two_chromosome_fixtures());
        assert!(matches!(
            super::get(&store, "glyma.Chr01", 20_000, 30_000),
            Err(ServiceError::NotFound)
        ));
    }
}
