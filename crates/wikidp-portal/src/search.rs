//! Text and PUID search.

use serde::Serialize;
use wikidp_sparql::PuidSearchResult;

use crate::detail::ItemDetail;
use crate::error::Result;
use crate::portal::Portal;
use crate::source::SEARCH_LIMIT;

/// A format found through its PUID, listed ahead of text search hits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PuidHit {
    pub qid: String,
    pub label: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SearchHit {
    Puid(PuidHit),
    Item(ItemDetail),
}

impl From<PuidSearchResult> for PuidHit {
    fn from(result: PuidSearchResult) -> Self {
        Self {
            qid: result.format,
            label: result.label,
            description: result.description,
        }
    }
}

impl Portal {
    /// Item previews (no claims) for the first hits of a text search.
    pub fn search_result_list(&self, text: &str) -> Result<Vec<ItemDetail>> {
        let qids = self
            .knowledge_base()
            .search(text, &self.languages().lang, SEARCH_LIMIT)?;
        tracing::debug!(%text, hits = qids.len(), "text search");

        let mut out = Vec::new();
        for qid in qids.iter().take(SEARCH_LIMIT) {
            if let Some(item) = self.item_detail(qid, false)? {
                out.push(item);
            }
        }
        Ok(out)
    }

    /// Text search results, preceded by PUID matches when the text names a PUID.
    pub fn search_result_context(&self, text: &str) -> Result<Vec<SearchHit>> {
        let mut context = Vec::new();
        if self.ids().mentions_puid(text) {
            let results = PuidSearchResult::search_puid(self.sparql(), text, self.wikibase_language())?;
            context.extend(results.into_iter().map(|r| SearchHit::Puid(r.into())));
        }
        context.extend(
            self.search_result_list(text)?
                .into_iter()
                .map(SearchHit::Item),
        );
        Ok(context)
    }

    /// PUIDs travel in URLs with `_` for `/`: `x-fmt_392` -> `x-fmt/392`.
    pub fn search_by_puid(&self, puid: &str) -> Result<(String, Vec<PuidSearchResult>)> {
        let puid = puid.replace('_', "/");
        tracing::debug!(%puid, "searching for PUID");
        let results = PuidSearchResult::search_puid(self.sparql(), &puid, self.wikibase_language())?;
        Ok((puid, results))
    }
}
