//! Remote collaborators: the query store, the publisher, and CrossRef
//!
//! - **sparql**: [`QueryStore`] over a SPARQL endpoint and the Wikibase lookup dialect
//! - **wikibase**: [`Publisher`](crate::publish::Publisher) over the Wikibase action API
//! - **crossref**: reference metadata lookups by DOI

pub mod crossref;
pub mod sparql;
pub mod wikibase;

use async_trait::async_trait;
use lotus_common::Result;
use std::collections::HashMap;

/// One result row: variable name -> lexical value
pub type QuerySolution = HashMap<String, String>;

/// Read access to the remote graph
#[async_trait]
pub trait QueryStore: Send + Sync {
    /// Run a SELECT query and return every solution
    async fn select(&self, query: &str) -> Result<Vec<QuerySolution>>;

    /// Run an ASK query
    async fn ask(&self, query: &str) -> Result<bool>;
}

/// Run a SELECT query and fold `handler` over its solutions
pub async fn fold_select<T, F>(store: &dyn QueryStore, query: &str, init: T, mut handler: F) -> Result<T>
where
    F: FnMut(T, &QuerySolution) -> T,
{
    let solutions = store.select(query).await?;
    Ok(solutions.iter().fold(init, |acc, solution| handler(acc, solution)))
}
