//! Search federator: parse a free-form query and dispatch it to the
//! name-search and region-lookup services.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::lookup;
use crate::store::Store;

/// A chromosome interval parsed from a query.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Region {
    /// Chromosome name.
    pub chromosome: String,
    /// Interval start, in base pairs.
    pub start: u64,
    /// Interval stop, in base pairs.
    pub stop: u64,
}

/// Merged results of a federated search.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    /// Matching gene names.
    pub genes: Vec<String>,
    /// Matching regions.
    pub regions: Vec<Region>,
}

/// The two shapes a query can take.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ParsedQuery {
    /// `name:start-stop` or `name:start..stop`.
    Region(Region),
    /// Anything else; fanned out to the name searches.
    Token(String),
}

fn region_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9._-]+):([0-9]+)(?:-|\.\.)([0-9]+)$")
            .expect("region query pattern")
    })
}

/// Parse a free-form query into one of the typed dispatch shapes.
fn parse_query(query: &str) -> ParsedQuery {
    let query = query.trim();
    if let Some(captures) = region_regex().captures(query) {
        let chromosome = captures[1].to_string();
        let start = captures[2].parse::<u64>();
        let stop = captures[3].parse::<u64>();
        if let (Ok(start), Ok(stop)) = (start, stop) {
            if start <= stop {
                return ParsedQuery::Region(Region {
                    chromosome,
                    start,
                    stop,
                });
            }
        }
    }
    ParsedQuery::Token(query.to_string())
}

/// Resolve a free-form query into gene names and regions.
///
/// Each dispatched lookup is isolated: a failure is logged and contributes
/// an empty result list.
pub async fn search(store: Arc<Store>, query: String) -> SearchResult {
    match parse_query(&query) {
        ParsedQuery::Region(region) => {
            let store = store.clone();
            let lookup_region = region.clone();
            let found = tokio::task::spawn_blocking(move || {
                lookup::region::get(
                    &store,
                    &lookup_region.chromosome,
                    lookup_region.start,
                    lookup_region.stop,
                )
            })
            .await;
            match found {
                Ok(Ok(_)) => SearchResult {
                    genes: Vec::new(),
                    regions: vec![region],
                },
                Ok(Err(err)) => {
                    warn!("region lookup for query {:?} failed: {}", query, err);
                    SearchResult::default()
                }
                Err(err) => {
                    warn!("region lookup task for query {:?} died: {}", query, err);
                    SearchResult::default()
                }
            }
        }
        ParsedQuery::Token(token) => {
            let gene_store = store.clone();
            let gene_token = token.clone();
            let genes = tokio::task::spawn_blocking(move || {
                lookup::search::genes(&gene_store, &gene_token)
            });
            let chromosome_token = token.clone();
            // Matched chromosomes come back as whole-chromosome regions.
            let chromosomes = tokio::task::spawn_blocking(move || {
                let names = lookup::search::chromosomes(&store, &chromosome_token)?;
                let mut regions = Vec::with_capacity(names.len());
                for name in names {
                    if let Some(record) = store.chromosome(&name)? {
                        regions.push(Region {
                            chromosome: record.name,
                            start: 0,
                            stop: record.length,
                        });
                    }
                }
                Ok::<_, crate::err::ServiceError>(regions)
            });
            let (genes, chromosomes) = tokio::join!(genes, chromosomes);
            let genes = match genes {
                Ok(Ok(names)) => names,
                Ok(Err(err)) => {
                    warn!("gene search for query {:?} failed: {}", token, err);
                    Vec::new()
                }
                Err(err) => {
                    warn!("gene search task for query {:?} died: {}", token, err);
                    Vec::new()
                }
            };
            let regions = match chromosomes {
                Ok(Ok(regions)) => regions,
                Ok(Err(err)) => {
                    warn!("chromosome search for query {:?} failed: {}", token, err);
                    Vec::new()
                }
                Err(err) => {
                    warn!("chromosome search task for query {:?} died: {}", token, err);
                    Vec::new()
                }
            };
            SearchResult { genes, regions }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::{parse_query, search, ParsedQuery, Region};
    use crate::store::test_support::{populate, two_chromosome_fixtures};

    #[rstest::rstest]
    #[case("glyma.Chr01:100-200", Some(("glyma.Chr01", 100, 200)))]
    #[case("glyma.Chr01:100..200", Some(("glyma.Chr01", 100, 200)))]
    #[case("chr-1:0-0", Some(("chr-1", 0, 0)))]
    // start > stop is not a region.
    #[case("glyma.Chr01:200-100", None)]
    // Negative coordinates are not a region.
    #[case("glyma.Chr01:-100-200", None)]
    #[case("glyma.Chr01", None)]
    #[case("glyma.Chr01:100", None)]
    #[case("a query with spaces:1-2", None)]
    fn query_shapes(#[case] query: &str, #[case] expected: Option<(&str, u64, u64)>) {
        let actual = parse_query(query);
        match expected {
            Some((chromosome, start, stop)) => assert_eq!(
                ParsedQuery::Region(Region {
                    chromosome: chromosome.to_string(),
                    start,
                    stop,
                }),
                actual
            ),
            None => assert!(matches!(actual, ParsedQuery::Token(_))),
        }
    }

    #[tokio::test]
    async fn region_query_dispatches_to_region_lookup() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(populate(tmp_dir.path(), &two_chromosome_fixtures()));
        let result = search(store, "glyma.Chr01:3000-8000".to_string()).await;
        assert!(result.genes.is_empty());
        assert_eq!(
            vec![Region {
                chromosome: "glyma.Chr01".to_string(),
                start: 3_000,
                stop: 8_000,
            }],
            result.regions
        );
    }

    #[tokio::test]
    async fn region_query_on_missing_chromosome_is_empty() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(populate(tmp_dir.path(), &two_chromosome_fixtures()));
        let result = search(store, "glyma.Chr99:3000-8000".to_string()).await;
        assert_eq!(super::SearchResult::default(), result);
    }

    #[tokio::test]
    async fn token_query_fans_out_to_name_searches() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(populate(tmp_dir.path(), &two_chromosome_fixtures()));
        let result = search(store, "chr02".to_string()).await;
        assert_eq!(4, result.genes.len());
        assert_eq!(
            vec![Region {
                chromosome: "phavu.Chr02".to_string(),
                start: 0,
                stop: 49_703_480,
            }],
            result.regions
        );
    }
}
