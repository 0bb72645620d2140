//! Name search over the token index column families.
//!
//! The loader splits every chromosome and gene name into lowercased tokens
//! and writes one `<token>\0<name>` key per token. A query matches a name
//! when every query token is a prefix of at least one of the name's tokens.

use std::collections::HashSet;

use crate::common::tokenize;
use crate::err::ServiceError;
use crate::store::schema::token_index_key;
use crate::store::Store;

/// Produce the token index keys for a name.
pub fn token_keys(name: &str) -> Vec<Vec<u8>> {
    tokenize(name)
        .iter()
        .map(|token| token_index_key(token, name))
        .collect()
}

/// Collect the names that have a token starting with `token`.
fn names_with_token_prefix(
    store: &Store,
    cf_name: &str,
    token: &str,
) -> Result<HashSet<String>, ServiceError> {
    let cf = store.cf(cf_name)?;
    let prefix = token.as_bytes();
    let mut names = HashSet::new();
    let iter = store.db().iterator_cf(
        &cf,
        rocksdb::IteratorMode::From(prefix, rocksdb::Direction::Forward),
    );
    for entry in iter {
        let (key, _) = entry?;
        if !key.starts_with(prefix) {
            break;
        }
        if let Some((_, name)) = super::schema::decode_token_index_key(&key) {
            names.insert(name.to_string());
        }
    }
    Ok(names)
}

/// Search a token index for names matching a free-text query.
///
/// The query is split on whitespace and the fixed punctuation set; a name
/// must match every resulting token. The empty result is a valid response.
pub fn search(store: &Store, cf_name: &str, query: &str) -> Result<Vec<String>, ServiceError> {
    let tokens = tokenize(query);
    if tokens.is_empty() {
        return Ok(Vec::new());
    }
    let mut matched: Option<HashSet<String>> = None;
    for token in &tokens {
        let names = names_with_token_prefix(store, cf_name, token)?;
        matched = Some(match matched {
            Some(acc) => acc.intersection(&names).cloned().collect(),
            None => names,
        });
        if matched.as_ref().map_or(false, HashSet::is_empty) {
            return Ok(Vec::new());
        }
    }
    let mut names: Vec<String> = matched.unwrap_or_default().into_iter().collect();
    names.sort();
    Ok(names)
}
