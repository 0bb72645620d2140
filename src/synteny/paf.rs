//! Macro-synteny blocks between two genomes rendered as PAF rows.
//!
//! Chromosome names are generated from each genome's naming scheme
//! (`<genome>.<prefix><number>` with zero-padded numbers), every chromosome
//! of the first genome is chained against the second genome's chromosomes,
//! and each resulting block becomes one row of the PAF format described at
//! <https://github.com/lh3/miniasm/blob/master/PAF.md>.

use std::sync::Arc;

use itertools::Itertools;
use tracing::warn;

use crate::err::ServiceError;
use crate::store::Store;
use crate::synteny::blocks;
use crate::synteny::pairwise::Params;

/// Naming scheme of one genome's chromosomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenomeSpec {
    /// Genome name, e.g. `glyma`.
    pub genome: String,
    /// Chromosome name prefix after the genome name, e.g. `Chr`.
    pub chr_prefix: String,
    /// Number of digits chromosome numbers are zero-padded to.
    pub chr_digits: usize,
    /// Number of chromosomes in the genome.
    pub n_chr: usize,
}

impl GenomeSpec {
    /// Validate a raw genome naming scheme.
    pub fn try_new(
        genome: &str,
        chr_prefix: &str,
        chr_digits: i64,
        n_chr: i64,
    ) -> Result<Self, ServiceError> {
        if genome.is_empty() {
            return Err(ServiceError::invalid("genome is required"));
        }
        if chr_digits <= 0 || n_chr <= 0 {
            return Err(ServiceError::invalid(
                "chromosome digits and chromosome count must be positive",
            ));
        }
        Ok(Self {
            genome: genome.to_string(),
            chr_prefix: chr_prefix.to_string(),
            chr_digits: chr_digits as usize,
            n_chr: n_chr as usize,
        })
    }

    /// Generate the genome's chromosome names.
    pub fn chromosome_names(&self) -> Vec<String> {
        (1..=self.n_chr)
            .map(|number| {
                format!(
                    "{}.{}{:0width$}",
                    self.genome,
                    self.chr_prefix,
                    number,
                    width = self.chr_digits
                )
            })
            .collect()
    }
}

// PAF columns the block model has no values for.
const NUM_RESIDUE_MATCHES: u64 = 1;
const ALIGNMENT_BLOCK_LENGTH: u64 = 1;
const MAPPING_QUALITY: u8 = 255;

/// Render one query chromosome's blocks as PAF rows.
fn paf_rows(
    store: &Store,
    query_name: &str,
    query_length: u64,
    query_genes: &[String],
    target_blocks: &[blocks::ChromosomeBlocks],
) -> Result<String, ServiceError> {
    let mut rows = String::new();
    for target in target_blocks {
        let Some(target_record) = store.chromosome(&target.chromosome)? else {
            continue;
        };
        for block in &target.blocks {
            // The block's physical extent on the query comes from its first
            // and last query genes.
            let (Some(first), Some(last)) = (query_genes.get(block.i), query_genes.get(block.j))
            else {
                continue;
            };
            let Some(first) = store.gene(first)? else {
                continue;
            };
            let Some(last) = store.gene(last)? else {
                continue;
            };
            rows.push_str(&format!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
                query_name,
                query_length,
                first.fmin,
                last.fmax,
                block.orientation,
                target.chromosome,
                target_record.length,
                block.fmin,
                block.fmax,
                NUM_RESIDUE_MATCHES,
                ALIGNMENT_BLOCK_LENGTH,
                MAPPING_QUALITY,
            ));
        }
    }
    Ok(rows)
}

/// Compute the PAF rows of one genome's blocks on another.
///
/// A first-genome chromosome that is not in the store is logged and
/// skipped; it does not fail the whole computation.
pub async fn compute(
    store: Arc<Store>,
    genome_1: &GenomeSpec,
    genome_2: &GenomeSpec,
    params: Params,
    concurrency: usize,
) -> Result<String, ServiceError> {
    let targets = genome_2.chromosome_names();
    let mut rows = Vec::new();
    for query_name in genome_1.chromosome_names() {
        let Some(record) = store.chromosome(&query_name)? else {
            warn!("chromosome {} is not in the store", query_name);
            continue;
        };
        let genes = store
            .chromosome_genes(&query_name)?
            .ok_or_else(|| anyhow::anyhow!("chromosome {query_name} has no gene sequence"))?;
        let families = store
            .chromosome_families(&query_name)?
            .ok_or_else(|| anyhow::anyhow!("chromosome {query_name} has no family sequence"))?;

        let target_blocks = blocks::compute(
            store.clone(),
            Arc::new(families),
            params.clone(),
            targets.clone(),
            concurrency,
        )
        .await?;
        rows.push(paf_rows(
            &store,
            &query_name,
            record.length,
            &genes,
            &target_blocks,
        )?);
    }
    Ok(rows.iter().join(""))
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::GenomeSpec;
    use crate::store::test_support::{populate, ChromosomeFixture};
    use crate::synteny::pairwise::Params;

    #[test]
    fn genome_spec_validation() {
        assert!(GenomeSpec::try_new("", "Chr", 2, 10).is_err());
        assert!(GenomeSpec::try_new("glyma", "Chr", 0, 10).is_err());
        assert!(GenomeSpec::try_new("glyma", "Chr", 2, -1).is_err());
    }

    #[test]
    fn chromosome_names_are_zero_padded() {
        let spec = GenomeSpec::try_new("glyma", "Chr", 2, 3).unwrap();
        assert_eq!(
            vec!["glyma.Chr01", "glyma.Chr02", "glyma.Chr03"],
            spec.chromosome_names()
        );
        let spec = GenomeSpec::try_new("phavu", "LG", 1, 2).unwrap();
        assert_eq!(vec!["phavu.LG1", "phavu.LG2"], spec.chromosome_names());
    }

    fn paf_fixture() -> Vec<ChromosomeFixture<'static>> {
        vec![
            ChromosomeFixture {
                name: "glyma.Chr01",
                length: 50_000,
                genus: "Glycine",
                species: "max",
                genes: vec![
                    ("glyma.Chr01.g1", 1_000, 1_900, 1, "A"),
                    ("glyma.Chr01.g2", 2_000, 2_900, 1, "B"),
                    ("glyma.Chr01.g3", 3_000, 3_900, 1, "C"),
                ],
            },
            ChromosomeFixture {
                name: "phavu.Chr01",
                length: 40_000,
                genus: "Phaseolus",
                species: "vulgaris",
                genes: vec![
                    ("phavu.Chr01.g1", 100, 900, 1, "A"),
                    ("phavu.Chr01.g2", 1_100, 1_900, 1, "B"),
                    ("phavu.Chr01.g3", 2_100, 2_900, 1, "C"),
                ],
            },
        ]
    }

    #[tokio::test]
    async fn paf_rows_for_one_block() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(populate(tmp_dir.path(), &paf_fixture()));
        let genome_1 = GenomeSpec::try_new("glyma", "Chr", 2, 1).unwrap();
        let genome_2 = GenomeSpec::try_new("phavu", "Chr", 2, 1).unwrap();
        let params = Params::try_new(3, 2, None, &[], None, None).unwrap();
        let paf = super::compute(store, &genome_1, &genome_2, params, 4)
            .await
            .unwrap();
        assert_eq!(
            "glyma.Chr01\t50000\t1000\t3900\t+\tphavu.Chr01\t40000\t100\t2900\t1\t1\t255\n",
            paf
        );
    }

    #[tokio::test]
    async fn missing_query_chromosomes_are_skipped() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(populate(tmp_dir.path(), &paf_fixture()));
        let genome_1 = GenomeSpec::try_new("medtr", "Chr", 2, 2).unwrap();
        let genome_2 = GenomeSpec::try_new("phavu", "Chr", 2, 1).unwrap();
        let params = Params::try_new(3, 2, None, &[], None, None).unwrap();
        let paf = super::compute(store, &genome_1, &genome_2, params, 4)
            .await
            .unwrap();
        assert_eq!("", paf);
    }
}
