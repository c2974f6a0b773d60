//! The search-index backend: an `IndexBackend` trait so the pipeline, coordinator and
//! aggregator can be tested against an in-memory stub, and a real Elasticsearch
//! implementation behind it over `reqwest::blocking` (spec.md §6).

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;

use crate::config::ElasticConfig;

/// A fresh backing-index name for alias `name`: `{alias}-YYYYMMDDHHMMSSffffff`
/// (spec.md §6), matching `elastic.py::migrate()`'s timestamp format.
fn backing_index_name(alias: &str) -> String {
    format!("{alias}-{}", Utc::now().format("%Y%m%d%H%M%S%6f"))
}

/// Count and size rolled up for one bucket (spec.md §4.8).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RollupStat {
    pub size: u64,
    pub count: u64,
}

/// One row from the volume-lifecycle index, as needed by supersession (spec.md §4.7 step 7).
#[derive(Debug, Clone)]
pub struct ScanRow {
    pub scan_id: String,
    pub status: String,
    pub start_timestamp: String,
}

/// Everything the Coordinator, Sink, and Aggregator need from the search backend. A real
/// implementation talks to Elasticsearch; tests use an in-memory stub.
pub trait IndexBackend: Send + Sync {
    /// Ensure the data/volume/aggregate indices (and their templates/aliases) exist, creating
    /// them on first run. Idempotent.
    fn ensure_indices(&self) -> Result<()>;

    /// Bulk-insert documents into `index`. Each entry pairs a document id (if any — empty
    /// string lets the backend assign one) with its JSON body.
    fn bulk_index(&self, index: &str, docs: &[(String, Value)]) -> Result<()>;

    /// Create or overwrite a single document by id (used for the volume lifecycle document,
    /// which is repeatedly updated in place across the scan).
    fn put_document(&self, index: &str, id: &str, body: &Value) -> Result<()>;

    /// The field names currently present under `field.<name>.*` in `index`'s mapping — the
    /// dynamic bucket discovery step for `filetypes`/`users` (spec.md §7 "no pre-declare").
    fn discover_buckets(&self, index: &str, field: &str) -> Result<Vec<String>>;

    /// Sum `size`/`count` for each of `buckets` under `<category>.<bucket>.*`, filtered to
    /// `path`'s subtree and `scan_id`. Buckets that sum to zero are omitted from the result.
    fn rollup(
        &self,
        index: &str,
        path: &str,
        scan_id: &str,
        category: &str,
        buckets: &[String],
    ) -> Result<HashMap<String, RollupStat>>;

    /// Sum `size`/`count` across the whole subtree (spec.md §4.7 step 8).
    fn count_size(&self, index: &str, path: &str, scan_id: &str) -> Result<RollupStat>;

    /// Every scan of `path` present in the volume index, most recent complete first
    /// (spec.md Design Notes / §4.7 step 7).
    fn list_scans(&self, index: &str, path: &str) -> Result<Vec<ScanRow>>;

    /// Delete every data-index document tagged with `scan_id`, tolerating version conflicts.
    fn delete_by_scan_id(&self, index: &str, scan_id: &str) -> Result<()>;
}

/// `reqwest::blocking` client over Elasticsearch's REST API.
pub struct ElasticsearchBackend {
    client: reqwest::blocking::Client,
    base_url: String,
    config: ElasticConfig,
}

impl ElasticsearchBackend {
    pub fn new(config: ElasticConfig) -> Result<ElasticsearchBackend> {
        let base_url = config
            .hosts
            .first()
            .cloned()
            .context("elastic.hosts must contain at least one host")?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .context("building elasticsearch http client")?;
        Ok(ElasticsearchBackend {
            client,
            base_url,
            config,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::blocking::RequestBuilder {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let mut req = self.client.request(method, url);
        if let Some(key) = &self.config.api_key {
            req = req.header("Authorization", format!("ApiKey {key}"));
        }
        req
    }

    fn check(resp: reqwest::blocking::Response, what: &str) -> Result<Value> {
        let status = resp.status();
        let body: Value = resp.json().unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(anyhow!("{what} failed: {status} {body}"));
        }
        Ok(body)
    }

    fn template_body(index_name: &str, mapping: Value, settings: Value) -> Value {
        json!({
            "index_patterns": [format!("{index_name}-*")],
            "template": {
                "settings": settings,
                "mappings": mapping,
            },
        })
    }

    /// The backing index `alias` currently points at, if the alias already exists.
    fn current_backing_index(&self, alias: &str) -> Result<Option<String>> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/{alias}/_alias"))
            .send()
            .with_context(|| format!("resolving backing index for {alias}"))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = Self::check(resp, "resolve alias")?;
        Ok(body.as_object().and_then(|m| m.keys().next().cloned()))
    }

    /// Migrate `alias` onto a freshly created `{alias}-<timestamp>` backing index (spec.md
    /// §6: "create a new backing index, optionally reindex, then atomically swap the
    /// alias"). When `reindex` is set and `alias` already has a backing index, its documents
    /// are copied into the new one via `_reindex` before the swap. Returns the new backing
    /// index's name.
    pub fn migrate(
        &self,
        alias: &str,
        mapping: Value,
        settings: Value,
        reindex: bool,
    ) -> Result<String> {
        let template = Self::template_body(alias, mapping, settings);
        let resp = self
            .request(reqwest::Method::PUT, &format!("/_index_template/{alias}"))
            .json(&template)
            .send()
            .with_context(|| format!("creating index template {alias}"))?;
        Self::check(resp, "create index template")?;

        let previous = self.current_backing_index(alias)?;

        let next = backing_index_name(alias);
        let resp = self
            .request(reqwest::Method::PUT, &format!("/{next}"))
            .send()
            .with_context(|| format!("creating index {next}"))?;
        Self::check(resp, "create index")?;

        if reindex && let Some(prev) = &previous {
            let body = json!({"source": {"index": prev}, "dest": {"index": next}});
            let resp = self
                .request(reqwest::Method::POST, "/_reindex")
                .json(&body)
                .send()
                .with_context(|| format!("reindexing {prev} into {next}"))?;
            Self::check(resp, "reindex")?;
        }

        let mut actions = vec![json!({"add": {"index": next, "alias": alias}})];
        if let Some(prev) = &previous {
            actions.push(json!({"remove": {"index": prev, "alias": alias}}));
        }
        let resp = self
            .request(reqwest::Method::POST, "/_aliases")
            .json(&json!({"actions": actions}))
            .send()
            .context("swapping index alias")?;
        Self::check(resp, "swap alias")?;

        Ok(next)
    }
}

impl IndexBackend for ElasticsearchBackend {
    fn ensure_indices(&self) -> Result<()> {
        let data_mapping = json!({
            "properties": {
                "path": {
                    "type": "text",
                    "fields": {
                        "tree": {"type": "text", "analyzer": "path_hierarchy_analyzer"},
                        "reverse_tree": {"type": "text", "analyzer": "path_hierarchy_reverse_analyzer"},
                    },
                },
                "scan_id": {"type": "keyword"},
                "size": {"type": "long"},
                "count": {"type": "long"},
                "mean_heat": {"type": "double"},
                "filetypes": {"type": "object", "dynamic": true},
                "size_bins": {"type": "object", "dynamic": true},
                "heat_bins": {"type": "object", "dynamic": true},
                "users": {"type": "object", "dynamic": true},
            },
        });
        let data_settings = json!({"mapping.total_fields.limit": 10000});

        let volume_mapping = json!({
            "properties": {
                "path": {"type": "keyword"},
                "status": {"type": "keyword"},
                "start_timestamp": {"type": "date"},
                "end_timestamp": {"type": "date"},
            },
        });

        let aggregate_mapping = json!({
            "properties": {
                "path": {"type": "keyword"},
                "scan_id": {"type": "keyword"},
                "category": {"type": "keyword"},
                "identifier": {"type": "keyword"},
            },
        });

        for (name, mapping, settings) in [
            (&self.config.data_index_name, data_mapping, data_settings),
            (&self.config.volume_index_name, volume_mapping, json!({})),
            (
                &self.config.aggregate_index_name,
                aggregate_mapping,
                json!({}),
            ),
        ] {
            let template = Self::template_body(name, mapping, settings);
            let resp = self
                .request(reqwest::Method::PUT, &format!("/_index_template/{name}"))
                .json(&template)
                .send()
                .with_context(|| format!("creating index template {name}"))?;
            Self::check(resp, "create index template")?;

            let exists = self
                .request(reqwest::Method::HEAD, &format!("/{name}"))
                .send()
                .with_context(|| format!("checking index {name}"))?
                .status()
                .is_success();
            if !exists {
                let next = backing_index_name(name);
                let resp = self
                    .request(reqwest::Method::PUT, &format!("/{next}"))
                    .send()
                    .with_context(|| format!("creating index {next}"))?;
                Self::check(resp, "create index")?;

                let alias_body = json!({
                    "actions": [{"add": {"index": next, "alias": name}}],
                });
                let resp = self
                    .request(reqwest::Method::POST, "/_aliases")
                    .json(&alias_body)
                    .send()
                    .context("creating index alias")?;
                Self::check(resp, "create alias")?;
            }
        }
        Ok(())
    }

    fn bulk_index(&self, index: &str, docs: &[(String, Value)]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let mut body = String::new();
        for (id, doc) in docs {
            let action = if id.is_empty() {
                json!({"index": {"_index": index}})
            } else {
                json!({"index": {"_index": index, "_id": id}})
            };
            body.push_str(&action.to_string());
            body.push('\n');
            body.push_str(&doc.to_string());
            body.push('\n');
        }
        let resp = self
            .request(reqwest::Method::POST, "/_bulk")
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .context("bulk indexing")?;
        let result = Self::check(resp, "bulk index")?;
        if result.get("errors").and_then(Value::as_bool) == Some(true) {
            return Err(anyhow!("bulk index reported item-level errors: {result}"));
        }
        Ok(())
    }

    fn put_document(&self, index: &str, id: &str, body: &Value) -> Result<()> {
        let resp = self
            .request(reqwest::Method::PUT, &format!("/{index}/_doc/{id}"))
            .json(body)
            .send()
            .with_context(|| format!("writing document {id} to {index}"))?;
        Self::check(resp, "put document")?;
        Ok(())
    }

    fn discover_buckets(&self, index: &str, field: &str) -> Result<Vec<String>> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/{index}/_mapping"))
            .send()
            .with_context(|| format!("fetching mapping for {index}"))?;
        let body = Self::check(resp, "get mapping")?;
        let first = body
            .as_object()
            .and_then(|m| m.values().next())
            .context("empty mapping response")?;
        let props = first
            .pointer(&format!("/mappings/properties/{field}/properties"))
            .and_then(Value::as_object);
        Ok(props
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn rollup(
        &self,
        index: &str,
        path: &str,
        scan_id: &str,
        category: &str,
        buckets: &[String],
    ) -> Result<HashMap<String, RollupStat>> {
        if buckets.is_empty() {
            return Ok(HashMap::new());
        }
        let mut aggs = serde_json::Map::new();
        for bucket in buckets {
            aggs.insert(
                format!("{bucket}__size"),
                json!({"sum": {"field": format!("{category}.{bucket}.size")}}),
            );
            aggs.insert(
                format!("{bucket}__count"),
                json!({"sum": {"field": format!("{category}.{bucket}.count")}}),
            );
        }
        let query = json!({
            "size": 0,
            "query": {
                "bool": {
                    "must": [
                        {"term": {"path.tree": path.trim_end_matches('/')}},
                        {"term": {"scan_id": scan_id}},
                    ],
                },
            },
            "aggs": aggs,
        });
        let resp = self
            .request(reqwest::Method::POST, &format!("/{index}/_search"))
            .json(&query)
            .send()
            .with_context(|| format!("rolling up {category} for {path}"))?;
        let body = Self::check(resp, "rollup search")?;
        let aggs_out = body.get("aggregations").cloned().unwrap_or_default();

        let mut out = HashMap::new();
        for bucket in buckets {
            let size = aggs_out
                .pointer(&format!("/{bucket}__size/value"))
                .and_then(Value::as_f64)
                .unwrap_or(0.0) as u64;
            let count = aggs_out
                .pointer(&format!("/{bucket}__count/value"))
                .and_then(Value::as_f64)
                .unwrap_or(0.0) as u64;
            if size > 0 || count > 0 {
                out.insert(bucket.clone(), RollupStat { size, count });
            }
        }
        Ok(out)
    }

    fn count_size(&self, index: &str, path: &str, scan_id: &str) -> Result<RollupStat> {
        let query = json!({
            "size": 0,
            "query": {
                "bool": {
                    "must": [
                        {"term": {"path.tree": path.trim_end_matches('/')}},
                        {"term": {"scan_id": scan_id}},
                    ],
                },
            },
            "aggs": {
                "size": {"sum": {"field": "size"}},
                "count": {"sum": {"field": "count"}},
            },
        });
        let resp = self
            .request(reqwest::Method::POST, &format!("/{index}/_search"))
            .json(&query)
            .send()
            .with_context(|| format!("count_size for {path}"))?;
        let body = Self::check(resp, "count_size search")?;
        let size = body
            .pointer("/aggregations/size/value")
            .and_then(Value::as_f64)
            .unwrap_or(0.0) as u64;
        let count = body
            .pointer("/aggregations/count/value")
            .and_then(Value::as_f64)
            .unwrap_or(0.0) as u64;
        Ok(RollupStat { size, count })
    }

    fn list_scans(&self, index: &str, path: &str) -> Result<Vec<ScanRow>> {
        let query = json!({
            "size": 10000,
            "query": {"term": {"path": path}},
            "sort": [{"start_timestamp": "desc"}],
        });
        let resp = self
            .request(reqwest::Method::POST, &format!("/{index}/_search"))
            .json(&query)
            .send()
            .with_context(|| format!("listing scans for {path}"))?;
        let body = Self::check(resp, "list scans search")?;
        let hits = body
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                let id = hit.get("_id")?.as_str()?.to_string();
                let source = hit.get("_source")?;
                let status = source.get("status")?.as_str()?.to_string();
                let start_timestamp = source.get("start_timestamp")?.as_str()?.to_string();
                Some(ScanRow {
                    scan_id: id,
                    status,
                    start_timestamp,
                })
            })
            .collect())
    }

    fn delete_by_scan_id(&self, index: &str, scan_id: &str) -> Result<()> {
        let query = json!({
            "query": {"term": {"scan_id": scan_id}},
        });
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/{index}/_delete_by_query?conflicts=proceed"),
            )
            .json(&query)
            .send()
            .with_context(|| format!("deleting scan {scan_id} from {index}"))?;
        Self::check(resp, "delete by query")?;
        Ok(())
    }
}
