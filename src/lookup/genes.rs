//! Gene batch fetch: full records for a list of gene names.

use serde::Serialize;

use crate::err::ServiceError;
use crate::store::Store;

/// A gene record as returned to clients.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Gene {
    /// Gene name.
    pub name: String,
    /// Name of the chromosome the gene is located on.
    pub chromosome: String,
    /// Gene family identifier; empty when unassigned.
    pub family: String,
    /// Smallest coordinate of the gene.
    pub fmin: u64,
    /// Largest coordinate of the gene.
    pub fmax: u64,
    /// Strand the gene is on: -1, 0 or +1.
    pub strand: i8,
}

/// Fetch the records of the given genes; missing names are omitted.
pub fn get(store: &Store, names: &[String]) -> Result<Vec<Gene>, ServiceError> {
    let mut genes = Vec::with_capacity(names.len());
    for name in names {
        if let Some(record) = store.gene(name)? {
            genes.push(Gene {
                name: record.name,
                chromosome: record.chromosome,
                family: record.family,
                fmin: record.fmin,
                fmax: record.fmax,
                strand: record.strand,
            });
        }
    }
    Ok(genes)
}
