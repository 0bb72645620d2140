//! Chromosome-name and gene-name search.

use crate::err::ServiceError;
use crate::store::schema::{CF_CHROMOSOME_NAME_TOKENS, CF_GENE_NAME_TOKENS};
use crate::store::{index, Store};

/// Fuzzy-match chromosome names against a free-text query.
pub fn chromosomes(store: &Store, query: &str) -> Result<Vec<String>, ServiceError> {
    index::search(store, CF_CHROMOSOME_NAME_TOKENS, query)
}

/// Fuzzy-match gene names against a free-text query.
pub fn genes(store: &Store, query: &str) -> Result<Vec<String>, ServiceError> {
    index::search(store, CF_GENE_NAME_TOKENS, query)
}
