//! Elasticsearch REST client.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::SearchEndpoint;
use crate::drivers::common::{HttpAuth, JsonHttp};
use crate::error::{RefreshError, Result};

use super::client::{IndexDefinition, ScrollPage, SearchClient, SearchHit};

const STORE: &str = "search";

/// Resolve an Elastic Cloud id (`name:base64(host$es_uuid$kibana_uuid)`) to
/// the Elasticsearch URL.
pub fn cloud_id_url(cloud_id: &str) -> Result<String> {
    let encoded = cloud_id.split_once(':').map(|(_, rest)| rest).unwrap_or(cloud_id);
    let decoded = STANDARD
        .decode(encoded)
        .map_err(|e| RefreshError::Config(format!("Invalid cloud_id: {}", e)))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|e| RefreshError::Config(format!("Invalid cloud_id: {}", e)))?;

    let mut parts = decoded.split('$');
    match (parts.next(), parts.next()) {
        (Some(host), Some(es_uuid)) if !host.is_empty() && !es_uuid.is_empty() => {
            Ok(format!("https://{}.{}", es_uuid, host))
        }
        _ => Err(RefreshError::Config(
            "Invalid cloud_id: expected host$uuid after decoding".into(),
        )),
    }
}

fn parse_page(body: &Value) -> ScrollPage {
    let hits = body.pointer("/hits/hits").and_then(Value::as_array);
    let total = match body.pointer("/hits/total") {
        Some(Value::Object(t)) => t.get("value").and_then(Value::as_u64).unwrap_or(0),
        Some(n) => n.as_u64().unwrap_or(0),
        None => 0,
    };
    ScrollPage {
        scroll_id: body
            .get("_scroll_id")
            .and_then(Value::as_str)
            .map(str::to_string),
        total,
        hits: hits
            .map(|hits| {
                hits.iter()
                    .filter_map(|h| {
                        let id = h.get("_id")?.as_str()?.to_string();
                        let source = h.get("_source").cloned().unwrap_or_else(|| json!({}));
                        Some(SearchHit { id, source })
                    })
                    .collect()
            })
            .unwrap_or_default(),
    }
}

pub struct ElasticClient {
    http: JsonHttp,
}

impl ElasticClient {
    pub async fn connect(endpoint: &SearchEndpoint) -> Result<Self> {
        let url = match (&endpoint.url, &endpoint.cloud_id) {
            (Some(url), _) => url.clone(),
            (None, Some(cloud_id)) => cloud_id_url(cloud_id)?,
            (None, None) => {
                return Err(RefreshError::Config(
                    "search endpoint needs url or cloud_id".into(),
                ))
            }
        };
        let auth = match &endpoint.api_key {
            Some(key) => HttpAuth::ApiKey(key.clone()),
            None => HttpAuth::basic(endpoint.username.as_ref(), endpoint.password.as_ref()),
        };

        let http = JsonHttp::new(STORE, &url, auth)?;
        let info = http
            .send_ok(Method::GET, http.url(&[]), None)
            .await
            .map_err(|e| RefreshError::connection(STORE, format!("{}: {}", url, e)))?;
        info!(
            "Connected to Elasticsearch {} ({})",
            http.base_url(),
            info.pointer("/version/number")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown version")
        );
        Ok(Self { http })
    }
}

#[async_trait]
impl SearchClient for ElasticClient {
    async fn get_index(&self, index: &str) -> Result<Option<IndexDefinition>> {
        let reply = self.http.send(Method::GET, self.http.url(&[index]), None).await?;
        if reply.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !reply.is_success() {
            return Err(RefreshError::store(STORE, format!("{}: {}", index, reply.error_text())));
        }
        // Keyed by the concrete index name, which differs when `index` is an alias.
        let entry = reply
            .body
            .get(index)
            .or_else(|| reply.body.as_object().and_then(|m| m.values().next()))
            .cloned()
            .unwrap_or(Value::Null);
        Ok(Some(IndexDefinition {
            settings: entry.get("settings").cloned().unwrap_or_else(|| json!({})),
            mappings: entry.get("mappings").cloned().unwrap_or_else(|| json!({})),
            aliases: entry.get("aliases").cloned().unwrap_or_else(|| json!({})),
        }))
    }

    async fn create_index(&self, index: &str, definition: &IndexDefinition) -> Result<()> {
        let body = json!({
            "settings": definition.settings,
            "mappings": definition.mappings,
            "aliases": definition.aliases,
        });
        let reply = self.http.send(Method::PUT, self.http.url(&[index]), Some(&body)).await?;
        if reply.is_success() {
            return Ok(());
        }
        if reply.body.pointer("/error/type").and_then(Value::as_str)
            == Some("resource_already_exists_exception")
        {
            return Err(RefreshError::schema_conflict(index, reply.error_text()));
        }
        Err(RefreshError::store(STORE, format!("{}: {}", index, reply.error_text())))
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        let reply = self.http.send(Method::DELETE, self.http.url(&[index]), None).await?;
        if reply.is_success() || reply.status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(RefreshError::store(STORE, format!("{}: {}", index, reply.error_text())))
    }

    async fn open_scroll(
        &self,
        index: &str,
        page_size: usize,
        keep_alive: &str,
    ) -> Result<ScrollPage> {
        let body = json!({
            "size": page_size,
            "track_total_hits": true,
            "sort": ["_doc"],
            "query": {"match_all": {}},
        });
        let mut url = self.http.url(&[index, "_search"]);
        url.query_pairs_mut().append_pair("scroll", keep_alive);
        let reply = self.http.send_ok(Method::POST, url, Some(&body)).await?;
        Ok(parse_page(&reply))
    }

    async fn scroll(&self, scroll_id: &str, keep_alive: &str) -> Result<ScrollPage> {
        let body = json!({"scroll": keep_alive, "scroll_id": scroll_id});
        let reply = self
            .http
            .send_ok(Method::POST, self.http.url(&["_search", "scroll"]), Some(&body))
            .await?;
        Ok(parse_page(&reply))
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<()> {
        let body = json!({"scroll_id": scroll_id});
        let reply = self
            .http
            .send(Method::DELETE, self.http.url(&["_search", "scroll"]), Some(&body))
            .await?;
        if !reply.is_success() && reply.status != StatusCode::NOT_FOUND {
            debug!("Releasing scroll failed: {}", reply.error_text());
        }
        Ok(())
    }

    async fn index_document(&self, index: &str, id: &str, source: &Value) -> Result<()> {
        let url = self.http.url(&[index, "_doc", id]);
        let reply = self.http.send(Method::PUT, url, Some(source)).await?;
        if reply.is_success() {
            return Ok(());
        }
        if reply.status == StatusCode::CONFLICT || reply.status == StatusCode::BAD_REQUEST {
            return Err(RefreshError::data_integrity(
                format!("{}/{}", index, id),
                reply.error_text(),
            ));
        }
        Err(RefreshError::store(STORE, format!("{}/{}: {}", index, id, reply.error_text())))
    }

    async fn refresh(&self, index: &str) -> Result<()> {
        self.http
            .send_ok(Method::POST, self.http.url(&[index, "_refresh"]), None)
            .await?;
        Ok(())
    }

    async fn count(&self, index: &str) -> Result<i64> {
        let reply = self
            .http
            .send(Method::GET, self.http.url(&[index, "_count"]), None)
            .await?;
        if reply.status == StatusCode::NOT_FOUND {
            return Ok(0);
        }
        if !reply.is_success() {
            return Err(RefreshError::store(STORE, format!("{}: {}", index, reply.error_text())));
        }
        Ok(reply.body.get("count").and_then(Value::as_i64).unwrap_or(0))
    }

    async fn close(&self) {
        debug!("Releasing Elasticsearch client for {}", self.http.base_url());
    }
}
