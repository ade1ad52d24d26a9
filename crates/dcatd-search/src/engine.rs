//! Paging and facet tallying over backend result streams.
//!
//! With facets requested the backend is asked for the whole result set:
//! every row is tallied and counted, and only rows inside
//! `[offset, offset + limit)` are emitted. Without facets the paging is
//! pushed down to the backend and no total is known.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tracing::{debug, info};

use dcatd_core::{
    logging, DocId, Document, DocumentStream, FieldPath, HookRegistry, Result, SearchQuery,
};

use crate::facets::FacetTally;
use crate::params::SearchParams;

/// Totals reported once the result stream is exhausted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultInfo {
    /// Number of matching documents; known only when facets were tallied.
    pub total: Option<u64>,
    pub facets: FacetTally,
}

/// One element of a search result stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchItem {
    Hit(DocId, Document),
    /// Always the last item of a successful stream.
    Summary(ResultInfo),
}

pub type SearchStream = BoxStream<'static, Result<SearchItem>>;

/// A fully collected page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub hits: Vec<(DocId, Document)>,
    pub info: ResultInfo,
}

/// Runs listing and search requests through the registry's search hook.
#[derive(Clone)]
pub struct SearchEngine {
    hooks: Arc<HookRegistry>,
    default_sort: FieldPath,
}

impl SearchEngine {
    pub fn new(hooks: Arc<HookRegistry>, default_sort: FieldPath) -> Self {
        Self {
            hooks,
            default_sort,
        }
    }

    pub fn default_sort(&self) -> &FieldPath {
        &self.default_sort
    }

    /// Start a search. Backend errors that occur before the first row are
    /// returned here; later ones end the stream.
    pub async fn search(&self, params: &SearchParams) -> Result<SearchStream> {
        let start = Instant::now();
        let query = params.to_query(&self.default_sort);

        if params.facets.is_empty() {
            let rows = self.hooks.search_search(&query).await?;
            debug!(
                subsystem = logging::SUBSYSTEM_SEARCH,
                component = "engine",
                op = "search",
                query = %query.text,
                paged = true,
                duration_ms = start.elapsed().as_millis() as u64,
                "Search started"
            );
            let summary = stream::once(async { Ok(SearchItem::Summary(ResultInfo::default())) });
            return Ok(rows
                .map(|row| row.map(|(id, doc)| SearchItem::Hit(id, doc)))
                .chain(summary)
                .boxed());
        }

        let rows = self.hooks.search_search(&query.unpaged()).await?;
        info!(
            subsystem = logging::SUBSYSTEM_SEARCH,
            component = "engine",
            op = "search",
            query = %query.text,
            facet_count = params.facets.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Faceted search started"
        );
        Ok(tally_and_page(rows, params.facets.clone(), &query))
    }

    /// Run a search and collect the emitted page.
    pub async fn collect(&self, params: &SearchParams) -> Result<SearchPage> {
        let mut results = self.search(params).await?;
        let mut page = SearchPage::default();
        while let Some(item) = results.next().await {
            match item? {
                SearchItem::Hit(id, doc) => page.hits.push((id, doc)),
                SearchItem::Summary(info) => page.info = info,
            }
        }
        Ok(page)
    }
}

struct TallyState {
    rows: DocumentStream,
    facets: Vec<FieldPath>,
    tally: FacetTally,
    index: u64,
    start: u64,
    end: Option<u64>,
    finished: bool,
}

fn tally_and_page(rows: DocumentStream, facets: Vec<FieldPath>, query: &SearchQuery) -> SearchStream {
    let state = TallyState {
        rows,
        tally: FacetTally::new(&facets),
        facets,
        index: 0,
        start: query.offset,
        end: query.limit.map(|l| query.offset.saturating_add(l)),
        finished: false,
    };
    stream::unfold(state, |mut st| async move {
        if st.finished {
            return None;
        }
        loop {
            match st.rows.next().await {
                Some(Ok((id, doc))) => {
                    st.tally.add(&st.facets, &doc);
                    let index = st.index;
                    st.index += 1;
                    let in_page = index >= st.start && st.end.map_or(true, |end| index < end);
                    if in_page {
                        return Some((Ok(SearchItem::Hit(id, doc)), st));
                    }
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e), st));
                }
                None => {
                    st.finished = true;
                    let info = ResultInfo {
                        total: Some(st.index),
                        facets: std::mem::take(&mut st.tally),
                    };
                    debug!(
                        subsystem = logging::SUBSYSTEM_SEARCH,
                        component = "engine",
                        op = "tally",
                        total_count = st.index,
                        "Facets tallied"
                    );
                    return Some((Ok(SearchItem::Summary(info)), st));
                }
            }
        }
    })
    .boxed()
}
