//! Store schema: column families, record types and key encodings.
//!
//! The store keeps one record column family per entity plus the four parallel
//! per-chromosome sequences and the secondary search indexes the loader
//! materializes. All keys are UTF-8 names except in the index column
//! families, which use `\0`-delimited compound keys.

use serde::{Deserialize, Serialize};

/// Version of the schema written by this crate's loader.
pub const SCHEMA_VERSION: &str = "2.0.0";

/// Schema versions this crate can serve from.
pub const COMPATIBLE_SCHEMA_VERSIONS: &[&str] = &["2.0.0"];

/// Meta key holding the schema version of the loaded data.
pub const KEY_SCHEMA_VERSION: &str = "GCV_SCHEMA_VERSION";

/// Meta key holding the set of wire-compatible schema versions.
pub const KEY_COMPATIBLE_SCHEMA_VERSIONS: &str = "GCV_COMPATIBLE_SCHEMA_VERSIONS";

/// Name of the column family with meta information.
pub const CF_META: &str = "meta";

/// Name of the column family with chromosome records.
pub const CF_CHROMOSOMES: &str = "chromosomes";

/// Name of the column family with per-chromosome gene name sequences.
pub const CF_CHROMOSOME_GENES: &str = "chromosome_genes";

/// Name of the column family with per-chromosome family sequences.
pub const CF_CHROMOSOME_FAMILIES: &str = "chromosome_families";

/// Name of the column family with per-chromosome `fmin` sequences.
pub const CF_CHROMOSOME_FMINS: &str = "chromosome_fmins";

/// Name of the column family with per-chromosome `fmax` sequences.
pub const CF_CHROMOSOME_FMAXS: &str = "chromosome_fmaxs";

/// Name of the column family with gene records.
pub const CF_GENES: &str = "genes";

/// Name of the column family indexing genes by family.
pub const CF_GENES_BY_FAMILY: &str = "genes_by_family";

/// Name of the column family indexing chromosome name tokens.
pub const CF_CHROMOSOME_NAME_TOKENS: &str = "chromosome_name_tokens";

/// Name of the column family indexing gene name tokens.
pub const CF_GENE_NAME_TOKENS: &str = "gene_name_tokens";

/// All column families, in creation order.
pub const ALL_CFS: &[&str] = &[
    CF_META,
    CF_CHROMOSOMES,
    CF_CHROMOSOME_GENES,
    CF_CHROMOSOME_FAMILIES,
    CF_CHROMOSOME_FMINS,
    CF_CHROMOSOME_FMAXS,
    CF_GENES,
    CF_GENES_BY_FAMILY,
    CF_CHROMOSOME_NAME_TOKENS,
    CF_GENE_NAME_TOKENS,
];

/// Column families holding loaded data, i.e. everything but `meta`.
pub const DATA_CFS: &[&str] = &[
    CF_CHROMOSOMES,
    CF_CHROMOSOME_GENES,
    CF_CHROMOSOME_FAMILIES,
    CF_CHROMOSOME_FMINS,
    CF_CHROMOSOME_FMAXS,
    CF_GENES,
    CF_GENES_BY_FAMILY,
    CF_CHROMOSOME_NAME_TOKENS,
    CF_GENE_NAME_TOKENS,
];

/// The family sentinel meaning "unassigned"; never eligible to match.
pub const NO_FAMILY: &str = "";

/// A chromosome record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChromosomeRecord {
    /// Chromosome name, also the record key.
    pub name: String,
    /// Chromosome length in base pairs.
    pub length: u64,
    /// Genus of the chromosome's organism.
    pub genus: String,
    /// Species of the chromosome's organism; may carry a strain after `:`.
    pub species: String,
}

/// A gene record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GeneRecord {
    /// Gene name, also the record key.
    pub name: String,
    /// Name of the chromosome the gene is located on.
    pub chromosome: String,
    /// Smallest coordinate of the gene on its chromosome.
    pub fmin: u64,
    /// Largest coordinate of the gene on its chromosome.
    pub fmax: u64,
    /// Strand the gene is on: -1, 0 or +1.
    pub strand: i8,
    /// Gene family identifier; empty when unassigned.
    pub family: String,
    /// 0-based position among the chromosome's genes ordered by `fmin`.
    pub index: usize,
}

/// Encode a `genes_by_family` index key.
///
/// Keys order by family, then chromosome, then ascending gene index, so one
/// prefix iteration yields a family's members grouped by chromosome with
/// indices pre-sorted.
pub fn family_index_key(family: &str, chromosome: &str, index: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(family.len() + chromosome.len() + 10);
    key.extend_from_slice(family.as_bytes());
    key.push(0);
    key.extend_from_slice(chromosome.as_bytes());
    key.push(0);
    key.extend_from_slice(&(index as u64).to_be_bytes());
    key
}

/// Prefix of all `genes_by_family` keys for one family.
pub fn family_index_prefix(family: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(family.len() + 1);
    prefix.extend_from_slice(family.as_bytes());
    prefix.push(0);
    prefix
}

/// Decode the `(chromosome, index)` part of a `genes_by_family` key.
///
/// Returns `None` for keys that do not parse, e.g. from a foreign schema.
pub fn decode_family_index_key<'k>(prefix_len: usize, key: &'k [u8]) -> Option<(&'k str, usize)> {
    let rest = key.get(prefix_len..)?;
    let sep = rest.iter().position(|&b| b == 0)?;
    let chromosome = std::str::from_utf8(&rest[..sep]).ok()?;
    let index_bytes: [u8; 8] = rest.get(sep + 1..)?.try_into().ok()?;
    Some((chromosome, u64::from_be_bytes(index_bytes) as usize))
}

/// Encode a name-token index key.
pub fn token_index_key(token: &str, name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(token.len() + name.len() + 1);
    key.extend_from_slice(token.as_bytes());
    key.push(0);
    key.extend_from_slice(name.as_bytes());
    key
}

/// Decode a name-token index key into `(token, name)`.
pub fn decode_token_index_key(key: &[u8]) -> Option<(&str, &str)> {
    let sep = key.iter().position(|&b| b == 0)?;
    let token = std::str::from_utf8(&key[..sep]).ok()?;
    let name = std::str::from_utf8(&key[sep + 1..]).ok()?;
    Some((token, name))
}
