//! Chromosome lookup: one chromosome with its gene and family sequences.

use serde::Serialize;

use crate::err::ServiceError;
use crate::store::Store;

/// A chromosome with its ordered gene and family lists.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Chromosome {
    /// Chromosome length in base pairs.
    pub length: u64,
    /// Genus of the chromosome's organism.
    pub genus: String,
    /// Species of the chromosome's organism.
    pub species: String,
    /// Gene names in chromosome order.
    pub genes: Vec<String>,
    /// Gene families, parallel to `genes`.
    pub families: Vec<String>,
}

/// Fetch a chromosome by name.
pub fn get(store: &Store, name: &str) -> Result<Chromosome, ServiceError> {
    let record = store.chromosome(name)?.ok_or(ServiceError::NotFound)?;
    let genes = store
        .chromosome_genes(name)?
        .ok_or_else(|| anyhow::anyhow!("chromosome {name} has no gene sequence"))?;
    let families = store
        .chromosome_families(name)?
        .ok_or_else(|| anyhow::anyhow!("chromosome {name} has no family sequence"))?;
    Ok(Chromosome {
        length: record.length,
        genus: record.genus,
        species: record.species,
        genes,
        families,
    })
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::err::ServiceError;
    use crate::store::test_support::{populate, two_chromosome_fixtures};

    #[test]
    fn get_returns_parallel_sequences() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = populate(tmp_dir.path(), &two_chromosome_fixtures());
        let chromosome = super::get(&store, "phavu.Chr02").unwrap();
        assert_eq!(49_703_480, chromosome.length);
        assert_eq!("Phaseolus", chromosome.genus);
        assert_eq!(chromosome.genes.len(), chromosome.families.len());
        assert_eq!(
            vec!["fam.D", "fam.C", "fam.B", "fam.A"],
            chromosome.families
        );
    }

    #[test]
    fn get_missing_is_not_found() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = populate(tmp_dir.path(), &two_chromosome_fixtures());
        assert!(matches!(
            super::get(&store, "phavu.Chr99"),
            Err(ServiceError::NotFound)
        ));
    }
}
