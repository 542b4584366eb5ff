//! HTTP client for the external text index.
//!
//! Speaks the Meilisearch-style REST surface: document upserts via
//! `POST /indexes/{collection}/documents`, removal via
//! `DELETE /indexes/{collection}/documents/{id}`, and queries via
//! `POST /indexes/{collection}/search`. Calls are blocking and short;
//! the synchronizer treats every failure as best-effort.

use serde::Deserialize;

use crate::search::{SearchError, SearchIndex};

pub struct HttpIndex {
    base_url: String,
    api_key: Option<String>,
}

impl HttpIndex {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        let req = ureq::request(method, url);
        match &self.api_key {
            Some(key) => req.set("Authorization", &format!("Bearer {key}")),
            None => req,
        }
    }
}

#[derive(Deserialize)]
struct QueryHit {
    id: i64,
}

#[derive(Deserialize)]
struct QueryResponse {
    hits: Vec<QueryHit>,
    #[serde(rename = "estimatedTotalHits")]
    estimated_total_hits: u64,
}

impl SearchIndex for HttpIndex {
    fn upsert(
        &self,
        collection: &str,
        id: i64,
        fields: &serde_json::Value,
    ) -> Result<(), SearchError> {
        let url = format!("{}/indexes/{}/documents", self.base_url, collection);
        let mut doc = fields.clone();
        if let Some(map) = doc.as_object_mut() {
            map.insert("id".to_string(), serde_json::json!(id));
        }
        self.request("POST", &url)
            .send_json(serde_json::json!([doc]))
            .map_err(|e| SearchError::Http(e.to_string()))?;
        Ok(())
    }

    fn remove(&self, collection: &str, id: i64) -> Result<(), SearchError> {
        let url = format!("{}/indexes/{}/documents/{}", self.base_url, collection, id);
        self.request("DELETE", &url)
            .call()
            .map_err(|e| SearchError::Http(e.to_string()))?;
        Ok(())
    }

    fn clear(&self, collection: &str) -> Result<(), SearchError> {
        let url = format!("{}/indexes/{}/documents", self.base_url, collection);
        self.request("DELETE", &url)
            .call()
            .map_err(|e| SearchError::Http(e.to_string()))?;
        Ok(())
    }

    fn query(
        &self,
        collection: &str,
        text: &str,
        page: u32,
        per_page: u32,
    ) -> Result<(Vec<i64>, u64), SearchError> {
        let url = format!("{}/indexes/{}/search", self.base_url, collection);
        let offset = (page.max(1) - 1) * per_page;
        let response = self
            .request("POST", &url)
            .send_json(serde_json::json!({
                "q": text,
                "offset": offset,
                "limit": per_page,
            }))
            .map_err(|e| SearchError::Http(e.to_string()))?;
        let parsed: QueryResponse = response
            .into_json()
            .map_err(|e| SearchError::Decode(e.to_string()))?;
        let ids = parsed.hits.into_iter().map(|h| h.id).collect();
        Ok((ids, parsed.estimated_total_hits))
    }
}
