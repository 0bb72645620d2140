//! Pairwise macro-synteny blocks: DAG chaining of two family strings.
//!
//! Given a query chromosome as an ordered list of family annotations and a
//! target chromosome name, computes the maximal forward and reverse
//! collinear blocks under gap (`intermediate`), length (`matched`) and
//! multiplicity (`mask`) constraints. The recurrence is akin to DAGchainer:
//! matching positions become nodes, and the longest chain ending at each
//! node is computed against preceding nodes within the gap bound.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::err::ServiceError;
use crate::store::schema::NO_FAMILY;
use crate::store::Store;
use crate::synteny::metrics::Metric;

/// A matched position: `(target index, query index)`.
pub type Pair = (usize, usize);

/// Validated parameters for a pairwise computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Params {
    /// Minimum number of matched pairs per block.
    pub matched: usize,
    /// Maximum gap between chained pairs, in genes, on both chromosomes.
    pub intermediate: usize,
    /// Per-chromosome family multiplicity cap; families above it contribute
    /// no pairs. `None` means unbounded.
    pub mask: Option<usize>,
    /// Metrics to compute per block, in request order.
    pub metrics: Vec<Metric>,
    /// Minimum number of genes the target must have; defaults to `matched`.
    pub chromosome_genes: Option<usize>,
    /// Minimum physical length (base pairs) the target must have.
    pub chromosome_length: Option<u64>,
}

impl Params {
    /// Validate raw parameter values.
    pub fn try_new(
        matched: i64,
        intermediate: i64,
        mask: Option<i64>,
        metrics: &[String],
        chromosome_genes: Option<i64>,
        chromosome_length: Option<i64>,
    ) -> Result<Self, ServiceError> {
        if matched <= 0 || intermediate <= 0 {
            return Err(ServiceError::invalid(
                "matched and intermediate must be positive",
            ));
        }
        if mask.map_or(false, |m| m <= 0) {
            return Err(ServiceError::invalid("mask must be positive"));
        }
        if chromosome_genes.map_or(false, |g| g <= 0)
            || chromosome_length.map_or(false, |l| l <= 0)
        {
            return Err(ServiceError::invalid(
                "chromosome genes and chromosome length must be positive",
            ));
        }
        let metrics = metrics
            .iter()
            .map(|spec| Metric::parse(spec))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            matched: matched as usize,
            intermediate: intermediate as usize,
            mask: mask.map(|m| m as usize),
            metrics,
            chromosome_genes: chromosome_genes.map(|g| g as usize),
            chromosome_length: chromosome_length.map(|l| l as u64),
        })
    }
}

/// Block orientation on the query.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Orientation {
    /// Query indices increase along the chain.
    #[serde(rename = "+")]
    #[strum(serialize = "+")]
    Forward,
    /// Query indices decrease along the chain.
    #[serde(rename = "-")]
    #[strum(serialize = "-")]
    Reverse,
}

/// A macro-synteny block on the target chromosome.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Block {
    /// First query gene index of the block.
    pub i: usize,
    /// Last query gene index of the block.
    pub j: usize,
    /// Smallest target coordinate of the block.
    pub fmin: u64,
    /// Largest target coordinate of the block.
    pub fmax: u64,
    /// Orientation of the block.
    pub orientation: Orientation,
    /// Requested metrics, in request order.
    #[serde(rename = "optionalMetrics", skip_serializing_if = "Vec::is_empty")]
    pub optional_metrics: Vec<f64>,
}

/// Emit a pair for every query-target position pair sharing an annotation.
///
/// Families over the mask on either chromosome contribute no pairs; the
/// query-side over-mask families are also returned so block assembly can
/// filter them out of metric inputs. Pairs come out ordered by target index
/// then query index.
pub fn index_pairs(
    query: &[String],
    target: &[String],
    mask: Option<usize>,
) -> (Vec<Pair>, HashSet<String>) {
    let mask = mask.unwrap_or(usize::MAX);

    // Map query families to their gene indices.
    let mut query_family_indices: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, family) in query.iter().enumerate() {
        if family != NO_FAMILY {
            query_family_indices
                .entry(family.as_str())
                .or_default()
                .push(i);
        }
    }
    // Remove families that have too many members.
    let mut masked_families = HashSet::new();
    query_family_indices.retain(|family, indices| {
        if indices.len() > mask {
            masked_families.insert(family.to_string());
            false
        } else {
            true
        }
    });

    // Count each family's number of occurrences on the target chromosome.
    let mut target_family_counts: HashMap<&str, usize> = HashMap::new();
    for family in target {
        *target_family_counts.entry(family.as_str()).or_insert(0) += 1;
    }

    let mut pairs = Vec::new();
    for (i, family) in target.iter().enumerate() {
        if target_family_counts[family.as_str()] <= mask {
            if let Some(indices) = query_family_indices.get(family.as_str()) {
                pairs.extend(indices.iter().map(|&n| (i, n)));
            }
        }
    }
    (pairs, masked_families)
}

/// One direction of the chaining recurrence.
struct ChainPass {
    /// Length of the longest chain ending at each pair.
    score: Vec<usize>,
    /// Predecessor links; consumed during traceback.
    pred: Vec<Option<usize>>,
    /// `(score, pair, pair index)` chain endpoints.
    ends: Vec<(usize, Pair, usize)>,
}

impl ChainPass {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            score: Vec::with_capacity(capacity),
            pred: Vec::with_capacity(capacity),
            ends: Vec::with_capacity(capacity),
        }
    }
}

/// Both directions of the chaining recurrence over one pair list.
struct Chains {
    forward: ChainPass,
    reverse: ChainPass,
}

/// Run the forward and reverse recurrences over the pair list.
///
/// Pairs must be in generation order (target index then query index); the
/// inner loop walks preceding pairs from closest to furthest and stops as
/// soon as the target gap exceeds `intermediate`.
fn chain_pairs(pairs: &[Pair], intermediate: usize) -> Chains {
    let mut forward = ChainPass::with_capacity(pairs.len());
    let mut reverse = ChainPass::with_capacity(pairs.len());
    for (k, &(n1, n2)) in pairs.iter().enumerate() {
        forward.score.push(1);
        forward.pred.push(None);
        reverse.score.push(1);
        reverse.pred.push(None);
        for j in (0..k).rev() {
            let (m1, m2) = pairs[j];
            // n1 >= m1 holds by construction.
            let d1 = n1 - m1;
            if m2 < n2 {
                // Forward: both coordinates increase along the chain.
                let d2 = n2 - m2;
                if d1 <= intermediate && d2 <= intermediate {
                    let s = forward.score[j] + 1;
                    // The diagonal tie-break keeps trivial blocks anchored at
                    // successive copies of the same family.
                    if s > forward.score[k] || (s == forward.score[k] && m1 == m2) {
                        forward.score[k] = s;
                        forward.pred[k] = Some(j);
                    }
                }
            } else if m2 > n2 {
                // Reverse: target increases while query decreases.
                let d2 = m2 - n2;
                if d1 <= intermediate && d2 <= intermediate {
                    let s = reverse.score[j] + 1;
                    if s > reverse.score[k] {
                        reverse.score[k] = s;
                        reverse.pred[k] = Some(j);
                    }
                }
            }
            // If this pair is too far away then all remaining pairs are too.
            if d1 > intermediate {
                break;
            }
        }
        forward.ends.push((forward.score[k], (n1, n2), k));
        reverse.ends.push((reverse.score[k], (n1, n2), k));
    }
    Chains { forward, reverse }
}

/// Greedily trace chains from their endpoints, highest score first.
///
/// Predecessor links are consumed as they are walked, so an endpoint whose
/// chain shares a suffix with an already-emitted longer block cannot
/// re-emit it. Returns `(begin, end)` pair-index tuples.
fn trace_blocks(mut pass: ChainPass, matched: usize) -> Vec<(usize, usize)> {
    // Highest score first; ties broken by pair, descending.
    pass.ends.sort_unstable_by(|a, b| b.cmp(a));
    let mut blocks = Vec::new();
    for &(_, _, end) in &pass.ends {
        // Singletons have no predecessor link.
        if pass.pred[end].is_some() {
            if pass.score[end] < matched {
                break;
            }
            let mut begin = end;
            while let Some(prev) = pass.pred[begin].take() {
                begin = prev;
            }
            let length = pass.score[end] - pass.score[begin] + 1;
            if length >= matched {
                blocks.push((begin, end));
            }
        }
    }
    blocks
}

/// Chain the pair list into forward then reverse blocks.
pub fn index_blocks(pairs: &[Pair], matched: usize, intermediate: usize) -> Vec<(Pair, Pair)> {
    let chains = chain_pairs(pairs, intermediate);
    trace_blocks(chains.forward, matched)
        .into_iter()
        .chain(trace_blocks(chains.reverse, matched))
        .map(|(begin, end)| (pairs[begin], pairs[end]))
        .collect()
}

/// Assemble an output block from a traced `(begin, end)` chain.
///
/// Metric inputs are the family substrings of the block on both
/// chromosomes, with over-mask families removed and the target slice
/// reversed for reverse blocks.
fn assemble_block(
    query: &[String],
    target: &[String],
    fmins: &[u64],
    fmaxs: &[u64],
    masked_families: &HashSet<String>,
    metrics: &[Metric],
    begin: Pair,
    end: Pair,
) -> Block {
    let (target_start, query_begin) = begin;
    let (target_stop, query_end) = end;
    let (i, j, orientation) = if query_begin < query_end {
        (query_begin, query_end, Orientation::Forward)
    } else {
        (query_end, query_begin, Orientation::Reverse)
    };
    let fmin = fmins[target_start].min(fmaxs[target_start]);
    let fmax = fmins[target_stop].max(fmaxs[target_stop]);

    let mut optional_metrics = Vec::with_capacity(metrics.len());
    if !metrics.is_empty() {
        let query_families: Vec<&str> = query[i..=j]
            .iter()
            .map(String::as_str)
            .filter(|f| !masked_families.contains(*f))
            .collect();
        let mut target_families: Vec<&str> = target[target_start..=target_stop]
            .iter()
            .map(String::as_str)
            .filter(|f| !masked_families.contains(*f))
            .collect();
        if orientation == Orientation::Reverse {
            target_families.reverse();
        }
        for metric in metrics {
            optional_metrics.push(metric.compute(&query_families, &target_families));
        }
    }

    Block {
        i,
        j,
        fmin,
        fmax,
        orientation,
        optional_metrics,
    }
}

/// Compute the macro-synteny blocks of a query against one target.
///
/// Returns `None` when the target chromosome does not exist; an empty block
/// list when a precondition (gene floor, length floor, pair count) rules
/// every block out.
pub fn compute(
    store: &Store,
    query: &[String],
    target: &str,
    params: &Params,
) -> Result<Option<Vec<Block>>, ServiceError> {
    let Some(record) = store.chromosome(target)? else {
        return Ok(None);
    };

    let target_families = store
        .chromosome_families(target)?
        .ok_or_else(|| anyhow::anyhow!("chromosome {target} has no family sequence"))?;

    // Not enough genes or physical length to construct a single block.
    let gene_floor = params.chromosome_genes.unwrap_or(params.matched);
    if target_families.len() < gene_floor {
        return Ok(Some(Vec::new()));
    }
    if record.length < params.chromosome_length.unwrap_or(1) {
        return Ok(Some(Vec::new()));
    }

    let (pairs, masked_families) = index_pairs(query, &target_families, params.mask);
    if pairs.len() < params.matched {
        return Ok(Some(Vec::new()));
    }

    let traced = index_blocks(&pairs, params.matched, params.intermediate);
    if traced.is_empty() {
        return Ok(Some(Vec::new()));
    }

    let fmins = store
        .chromosome_fmins(target)?
        .ok_or_else(|| anyhow::anyhow!("chromosome {target} has no fmin sequence"))?;
    let fmaxs = store
        .chromosome_fmaxs(target)?
        .ok_or_else(|| anyhow::anyhow!("chromosome {target} has no fmax sequence"))?;

    let blocks = traced
        .into_iter()
        .map(|(begin, end)| {
            assemble_block(
                query,
                &target_families,
                &fmins,
                &fmaxs,
                &masked_families,
                &params.metrics,
                begin,
                end,
            )
        })
        .collect();
    Ok(Some(blocks))
}
