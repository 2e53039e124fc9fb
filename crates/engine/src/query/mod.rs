//! The query pipeline: filter, then sort, then paginate.

pub mod filter;
pub mod paginate;
pub mod sort;

pub use filter::Filter;
pub use paginate::paginate;
pub use sort::{select_algorithm, sort, estimate_cardinality, SortAlgorithm, SortDirection, SortKey};

use litestore_core::value::Value;

/// A fully-specified query: a filter, optional sort keys (with an algorithm
/// hint), and skip/limit pagination.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Sort keys, applied most-significant-first.
    pub sort: Vec<SortKey>,
    /// Explicit algorithm override; `SortAlgorithm::Default` defers to the
    /// size/cardinality heuristic.
    pub sort_algorithm: SortAlgorithm,
    /// Records to skip before collecting results.
    pub skip: usize,
    /// Maximum number of records to return after skipping.
    pub limit: Option<usize>,
}

/// Run the full pipeline over `records` given a parsed `filter` and
/// `options`. Filtering first narrows the working set, sort picks its
/// algorithm from the narrowed set's size, and pagination runs last.
pub fn run(records: Vec<Value>, filter: &Filter, options: &QueryOptions) -> Vec<Value> {
    let mut matched: Vec<Value> = records.into_iter().filter(|r| filter.matches(r)).collect();

    if !options.sort.is_empty() {
        let cardinality = if options.sort.len() == 1 {
            Some(estimate_cardinality(&matched, &options.sort[0].field))
        } else {
            None
        };
        let algorithm = select_algorithm(options.sort_algorithm, matched.len(), &options.sort, cardinality);
        sort(&mut matched, &options.sort, algorithm);
    }

    paginate(matched, options.skip, options.limit)
}
