//! Optional block metrics and their registry.
//!
//! Metrics are requested by name at query time, with positional arguments
//! appended after colons, e.g. `jaccard:2:true`. The registry is closed:
//! unknown names and malformed arguments are invalid-argument errors.

use std::collections::HashMap;

use crate::err::ServiceError;

/// A parsed metric request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Metric {
    /// Classical edit distance between the two family strings.
    Levenshtein,
    /// N-gram Jaccard distance between the two family strings.
    Jaccard {
        /// N-gram size.
        n: usize,
        /// Whether a gram and its reverse share an identity.
        reversals: bool,
        /// Whether to use counting (multiset) semantics.
        multiset: bool,
    },
}

impl Metric {
    /// Parse a `name[:arg...]` metric request.
    pub fn parse(spec: &str) -> Result<Self, ServiceError> {
        let mut parts = spec.split(':');
        let name = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();
        match name {
            "levenshtein" => {
                if !args.is_empty() {
                    return Err(ServiceError::invalid(format!(
                        "\"{spec}\" is not a valid metric: levenshtein takes no arguments"
                    )));
                }
                Ok(Metric::Levenshtein)
            }
            "jaccard" => {
                if args.len() > 3 {
                    return Err(ServiceError::invalid(format!(
                        "\"{spec}\" is not a valid metric: jaccard takes at most 3 arguments"
                    )));
                }
                let n = match args.first() {
                    Some(raw) => raw.parse::<usize>().map_err(|_| {
                        ServiceError::invalid(format!(
                            "\"{spec}\" is not a valid metric: bad n-gram size {raw:?}"
                        ))
                    })?,
                    None => 1,
                };
                let reversals = parse_bool(spec, args.get(1))?;
                let multiset = parse_bool(spec, args.get(2))?;
                Ok(Metric::Jaccard {
                    n,
                    reversals,
                    multiset,
                })
            }
            _ => Err(ServiceError::invalid(format!(
                "\"{spec}\" is not a valid metric"
            ))),
        }
    }

    /// Compute the metric on two family strings.
    pub fn compute(&self, a: &[&str], b: &[&str]) -> f64 {
        match self {
            Metric::Levenshtein => levenshtein(a, b) as f64,
            Metric::Jaccard {
                n,
                reversals,
                multiset,
            } => jaccard(a, b, *n, *reversals, *multiset),
        }
    }
}

fn parse_bool(spec: &str, arg: Option<&&str>) -> Result<bool, ServiceError> {
    match arg {
        Some(raw) => raw.parse::<bool>().map_err(|_| {
            ServiceError::invalid(format!(
                "\"{spec}\" is not a valid metric: bad boolean {raw:?}"
            ))
        }),
        None => Ok(false),
    }
}

/// Classical Levenshtein distance over annotation sequences, two-row DP.
pub fn levenshtein(a: &[&str], b: &[&str]) -> usize {
    if a == b {
        return 0;
    }
    let (a, b) = if b.len() > a.len() { (b, a) } else { (a, b) };
    if b.is_empty() {
        return a.len();
    }

    let mut cost: Vec<usize> = (0..=b.len()).collect();
    for (i, item_a) in a.iter().enumerate() {
        let mut last = cost[0];
        cost[0] = i + 1;
        for (j, item_b) in b.iter().enumerate() {
            let substitution = last + usize::from(item_a != item_b);
            last = cost[j + 1];
            cost[j + 1] = substitution.min(last + 1).min(cost[j] + 1);
        }
    }
    cost[b.len()]
}

/// N-gram Jaccard distance over annotation sequences.
///
/// With `reversals`, a gram and its reverse are identified. With `multiset`,
/// grams count with multiplicity (intersection takes the minimum count,
/// union the maximum); otherwise plain set semantics apply.
pub fn jaccard(a: &[&str], b: &[&str], n: usize, reversals: bool, multiset: bool) -> f64 {
    if n > a.len() || n > b.len() {
        return 1.0;
    }
    // `windows(0)` panics; a sequence of length l has l + 1 grams of length
    // 0, all identical, so the id sets coincide and only the multiset
    // counts can differ.
    if n == 0 {
        if !multiset {
            return 0.0;
        }
        let numerator = a.len().min(b.len()) + 1;
        let denominator = a.len().max(b.len()) + 1;
        return 1.0 - numerator as f64 / denominator as f64;
    }

    let grams_a: Vec<&[&str]> = a.windows(n).collect();
    let grams_b: Vec<&[&str]> = b.windows(n).collect();

    // Assign each distinct gram an id, identifying reversed grams on demand.
    let mut ids: HashMap<Vec<&str>, usize> = HashMap::new();
    let mut next_id = 0usize;
    for gram in grams_a.iter().chain(grams_b.iter()) {
        if ids.contains_key(*gram) {
            continue;
        }
        let mut reversed: Vec<&str> = gram.to_vec();
        reversed.reverse();
        let id = match ids.get(&reversed) {
            Some(id) if reversals => *id,
            _ => {
                let id = next_id;
                next_id += 1;
                id
            }
        };
        ids.insert(gram.to_vec(), id);
    }

    let count = |grams: &[&[&str]]| {
        let mut counts: HashMap<usize, usize> = HashMap::new();
        for gram in grams {
            let id = ids[*gram];
            if multiset {
                *counts.entry(id).or_insert(0) += 1;
            } else {
                counts.insert(id, 1);
            }
        }
        counts
    };
    let counts_a = count(&grams_a);
    let counts_b = count(&grams_b);

    let mut numerator = 0usize;
    let mut denominator = 0usize;
    for (id, count_a) in &counts_a {
        let count_b = counts_b.get(id).copied().unwrap_or(0);
        numerator += (*count_a).min(count_b);
        denominator += (*count_a).max(count_b);
    }
    for (id, count_b) in &counts_b {
        if !counts_a.contains_key(id) {
            denominator += count_b;
        }
    }
    if denominator == 0 {
        denominator = 1;
    }

    1.0 - numerator as f64 / denominator as f64
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{jaccard, levenshtein, Metric};

    #[rstest::rstest]
    #[case(&["a", "b", "c"], &["a", "b", "c"], 0)]
    #[case(&["a", "b", "c"], &["a", "x", "c"], 1)]
    #[case(&["a", "b"], &[], 2)]
    #[case(&[], &["a", "b", "c"], 3)]
    #[case(&["a", "b", "c"], &["c", "b", "a"], 2)]
    #[case(&["a", "b", "c", "d"], &["b", "c", "d", "e"], 2)]
    fn levenshtein_cases(#[case] a: &[&str], #[case] b: &[&str], #[case] expected: usize) {
        assert_eq!(expected, levenshtein(a, b));
    }

    #[rstest::rstest]
    // Identical unigram sets.
    #[case(&["a", "b"], &["b", "a"], 1, false, false, 0.0)]
    // Disjoint unigram sets.
    #[case(&["a", "b"], &["c", "d"], 1, false, false, 1.0)]
    // Half the union shared.
    #[case(&["a", "b"], &["a", "c"], 1, false, false, 1.0 - 1.0 / 3.0)]
    // Bigrams distinguish order...
    #[case(&["a", "b", "c"], &["c", "b", "a"], 2, false, false, 1.0)]
    // ...unless reversals share an id.
    #[case(&["a", "b", "c"], &["c", "b", "a"], 2, true, false, 0.0)]
    // Multiset counts multiplicity: counts 2 vs 1 intersect at 1, union 2.
    #[case(&["a", "a"], &["a"], 1, false, true, 0.5)]
    // N-gram size larger than either input.
    #[case(&["a"], &["a"], 2, false, false, 1.0)]
    // Zero-length grams are all identical, so the sets always coincide...
    #[case(&["a", "b"], &["c"], 0, false, false, 0.0)]
    // ...and only the multiset counts (length + 1 apiece) can differ.
    #[case(&["a", "b"], &["c"], 0, false, true, 1.0 - 2.0 / 3.0)]
    #[case(&["a"], &["b"], 0, false, true, 0.0)]
    fn jaccard_cases(
        #[case] a: &[&str],
        #[case] b: &[&str],
        #[case] n: usize,
        #[case] reversals: bool,
        #[case] multiset: bool,
        #[case] expected: f64,
    ) {
        let actual = jaccard(a, b, n, reversals, multiset);
        assert!(
            (actual - expected).abs() < 1e-9,
            "jaccard = {actual}, expected {expected}"
        );
    }

    #[test]
    fn parse_levenshtein() {
        assert_eq!(Metric::Levenshtein, Metric::parse("levenshtein").unwrap());
        assert!(Metric::parse("levenshtein:2").is_err());
    }

    #[test]
    fn parse_jaccard_with_arguments() {
        assert_eq!(
            Metric::Jaccard {
                n: 1,
                reversals: false,
                multiset: false
            },
            Metric::parse("jaccard").unwrap()
        );
        assert_eq!(
            Metric::Jaccard {
                n: 2,
                reversals: true,
                multiset: false
            },
            Metric::parse("jaccard:2:true").unwrap()
        );
        assert!(Metric::parse("jaccard:x").is_err());
        assert!(Metric::parse("jaccard:1:yes").is_err());
        assert!(Metric::parse("jaccard:1:true:false:extra").is_err());
    }

    #[test]
    fn registry_is_closed() {
        assert!(Metric::parse("cosine").is_err());
        assert!(Metric::parse("").is_err());
    }
}
