//! Macro-synteny fan-out: candidate-target filtering plus concurrent
//! pairwise block computation and result assembly.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::err::ServiceError;
use crate::store::Store;
use crate::synteny::micro::{self, Thresholds};
use crate::synteny::pairwise::{self, Block, Params};

/// Blocks on one target chromosome, with its organism attached.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChromosomeBlocks {
    /// Target chromosome name.
    pub chromosome: String,
    /// Genus of the target's organism.
    pub genus: String,
    /// Species of the target's organism.
    pub species: String,
    /// The target's blocks, in traceback order.
    pub blocks: Vec<Block>,
}

/// Select the chromosomes worth running the pairwise computation against.
///
/// A chromosome qualifies when the greedy gap walk over its query-family
/// matches yields at least one block satisfying the thresholds. Chromosomes
/// with fewer total matches than `matched` are discarded without walking.
pub fn filter_targets(
    store: &Store,
    query: &[String],
    targets: &[String],
    matched: usize,
    intermediate: usize,
) -> Result<Vec<String>, ServiceError> {
    let target_set: Option<HashSet<String>> = if targets.is_empty() {
        None
    } else {
        Some(targets.iter().cloned().collect())
    };
    let thresholds = Thresholds::new(matched as f64, intermediate as f64)?;
    let mut filtered = Vec::new();
    for (chromosome, indices) in micro::match_indices(store, query, target_set.as_ref())? {
        if indices.len() < matched {
            continue;
        }
        if !micro::gap_walk(&indices, query.len(), &thresholds).is_empty() {
            filtered.push(chromosome);
        }
    }
    Ok(filtered)
}

/// Compute the blocks of one candidate target and attach its organism.
///
/// `None` when the target is gone or contributes no blocks.
fn compute_target(
    store: &Store,
    query: &[String],
    target: &str,
    params: &Params,
) -> Result<Option<ChromosomeBlocks>, ServiceError> {
    let blocks = match pairwise::compute(store, query, target, params)? {
        Some(blocks) if !blocks.is_empty() => blocks,
        _ => return Ok(None),
    };
    let Some(record) = store.chromosome(target)? else {
        return Ok(None);
    };
    Ok(Some(ChromosomeBlocks {
        chromosome: target.to_string(),
        genus: record.genus,
        species: record.species,
        blocks,
    }))
}

/// Compute macro-synteny blocks against every candidate target.
///
/// Pairwise computations run concurrently on the blocking thread pool,
/// bounded by `concurrency`. A failing target is logged and omitted; it
/// never fails the fan-out.
pub async fn compute(
    store: Arc<Store>,
    query: Arc<Vec<String>>,
    params: Params,
    targets: Vec<String>,
    concurrency: usize,
) -> Result<Vec<ChromosomeBlocks>, ServiceError> {
    let candidates = filter_targets(
        &store,
        &query,
        &targets,
        params.matched,
        params.intermediate,
    )?;

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let tasks = candidates.into_iter().map(|target| {
        let store = store.clone();
        let query = query.clone();
        let params = params.clone();
        let semaphore = semaphore.clone();
        async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                // The semaphore is never closed.
                Err(_) => return None,
            };
            let task_target = target.clone();
            let result = tokio::task::spawn_blocking(move || {
                compute_target(&store, &query, &task_target, &params)
            })
            .await;
            match result {
                Ok(Ok(blocks)) => blocks,
                Ok(Err(err)) => {
                    warn!("pairwise blocks for target {} failed: {}", target, err);
                    None
                }
                Err(err) => {
                    warn!("pairwise blocks task for target {} died: {}", target, err);
                    None
                }
            }
        }
    });
    let results = futures::future::join_all(tasks).await;
    Ok(results.into_iter().flatten().collect())
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::{compute, filter_targets};
    use crate::store::test_support::{populate, ChromosomeFixture};
    use crate::synteny::pairwise::{Orientation, Params};

    fn fan_out_fixture() -> Vec<ChromosomeFixture<'static>> {
        vec![
            ChromosomeFixture {
                name: "glyma.Chr13",
                length: 44_408_000,
                genus: "Glycine",
                species: "max",
                genes: vec![
                    ("glyma.Chr13.g1", 1_000, 1_900, 1, "A"),
                    ("glyma.Chr13.g2", 2_000, 2_900, 1, "B"),
                    ("glyma.Chr13.g3", 3_000, 3_900, 1, "C"),
                ],
            },
            ChromosomeFixture {
                name: "phavu.Chr08",
                length: 59_634_000,
                genus: "Phaseolus",
                species: "vulgaris",
                genes: vec![
                    ("phavu.Chr08.g1", 100, 900, 1, "C"),
                    ("phavu.Chr08.g2", 1_100, 1_900, -1, "B"),
                    ("phavu.Chr08.g3", 2_100, 2_900, 1, "A"),
                ],
            },
            // Only one match; never a candidate for matched >= 2.
            ChromosomeFixture {
                name: "medtr.Chr01",
                length: 52_991_000,
                genus: "Medicago",
                species: "truncatula",
                genes: vec![("medtr.Chr01.g1", 500, 900, 1, "A")],
            },
        ]
    }

    fn query() -> Vec<String> {
        vec!["A".to_string(), "B".to_string(), "C".to_string()]
    }

    #[test]
    fn candidates_require_a_qualifying_run() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = populate(tmp_dir.path(), &fan_out_fixture());
        let candidates = filter_targets(&store, &query(), &[], 3, 2).unwrap();
        assert_eq!(vec!["glyma.Chr13", "phavu.Chr08"], candidates);

        // An explicit target list restricts candidate selection.
        let candidates =
            filter_targets(&store, &query(), &["phavu.Chr08".to_string()], 3, 2).unwrap();
        assert_eq!(vec!["phavu.Chr08"], candidates);

        // Nothing qualifies when matched exceeds every chromosome's matches.
        let candidates = filter_targets(&store, &query(), &[], 4, 2).unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn fan_out_computes_and_enriches() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(populate(tmp_dir.path(), &fan_out_fixture()));
        let params = Params::try_new(3, 2, None, &[], None, None).unwrap();
        let results = compute(store, Arc::new(query()), params, Vec::new(), 4)
            .await
            .unwrap();
        assert_eq!(2, results.len());

        let glyma = results
            .iter()
            .find(|r| r.chromosome == "glyma.Chr13")
            .unwrap();
        assert_eq!("Glycine", glyma.genus);
        assert_eq!(1, glyma.blocks.len());
        assert_eq!(Orientation::Forward, glyma.blocks[0].orientation);

        let phavu = results
            .iter()
            .find(|r| r.chromosome == "phavu.Chr08")
            .unwrap();
        assert_eq!("vulgaris", phavu.species);
        assert_eq!(1, phavu.blocks.len());
        assert_eq!(Orientation::Reverse, phavu.blocks[0].orientation);
        assert_eq!((0, 2), (phavu.blocks[0].i, phavu.blocks[0].j));
    }

    #[tokio::test]
    async fn fan_out_drops_targets_without_blocks() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(populate(tmp_dir.path(), &fan_out_fixture()));
        // The gene floor removes every target after candidate selection.
        let params = Params::try_new(3, 2, None, &[], Some(10), None).unwrap();
        let results = compute(store, Arc::new(query()), params, Vec::new(), 4)
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
