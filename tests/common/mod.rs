//! Shared fixtures for the scenario tests: an in-memory `IndexBackend` stub and default
//! settings, so each scenario test only has to state what's different about it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use serde_json::Value;

use gws_scanner::config::ElasticConfig;
use gws_scanner::coordinator::ScanSettings;
use gws_scanner::index_client::{IndexBackend, RollupStat, ScanRow};

/// An in-memory stand-in for Elasticsearch. Documents are stored per index, `put_document`
/// merges into any existing document by id (the real backend's `PUT .../_doc/<id>` replaces
/// wholesale, but the Coordinator's supersession step only ever sends partial `{"status":
/// ...}` updates, so a merge is what lets this stub observe the same end state a real index
/// would after a full read-modify-write round trip).
#[derive(Default)]
pub struct FakeBackend {
    bulk: Mutex<HashMap<String, Vec<Value>>>,
    docs: Mutex<HashMap<String, HashMap<String, Value>>>,
    pub fail_bulk: AtomicBool,
}

impl FakeBackend {
    pub fn new() -> FakeBackend {
        FakeBackend::default()
    }

    /// Every document ever bulk-indexed into `index`, in insertion order.
    pub fn bulk_docs(&self, index: &str) -> Vec<Value> {
        self.bulk
            .lock()
            .unwrap()
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    /// The current (merged) state of document `id` in `index`, if it has been written.
    pub fn doc(&self, index: &str, id: &str) -> Option<Value> {
        self.docs.lock().unwrap().get(index)?.get(id).cloned()
    }

    /// Every document currently stored (by id) in `index`.
    pub fn index_docs(&self, index: &str) -> HashMap<String, Value> {
        self.docs
            .lock()
            .unwrap()
            .get(index)
            .cloned()
            .unwrap_or_default()
    }
}

fn path_of(doc: &Value) -> &str {
    doc.get("path").and_then(Value::as_str).unwrap_or("")
}

fn under_tree(doc_path: &str, path: &str) -> bool {
    let path = path.trim_end_matches('/');
    doc_path == path || doc_path.starts_with(&format!("{path}/"))
}

impl IndexBackend for FakeBackend {
    fn ensure_indices(&self) -> Result<()> {
        Ok(())
    }

    fn bulk_index(&self, index: &str, docs: &[(String, Value)]) -> Result<()> {
        if self.fail_bulk.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("simulated backend write failure"));
        }
        let mut bulk = self.bulk.lock().unwrap();
        bulk.entry(index.to_string())
            .or_default()
            .extend(docs.iter().map(|(_, v)| v.clone()));
        Ok(())
    }

    fn put_document(&self, index: &str, id: &str, body: &Value) -> Result<()> {
        let mut docs = self.docs.lock().unwrap();
        let index_docs = docs.entry(index.to_string()).or_default();
        match index_docs.get_mut(id) {
            Some(existing) => {
                if let (Some(existing_obj), Some(body_obj)) =
                    (existing.as_object_mut(), body.as_object())
                {
                    for (k, v) in body_obj {
                        existing_obj.insert(k.clone(), v.clone());
                    }
                } else {
                    *existing = body.clone();
                }
            }
            None => {
                index_docs.insert(id.to_string(), body.clone());
            }
        }
        Ok(())
    }

    fn discover_buckets(&self, index: &str, field: &str) -> Result<Vec<String>> {
        let bulk = self.bulk.lock().unwrap();
        let mut keys: Vec<String> = bulk
            .get(index)
            .into_iter()
            .flatten()
            .filter_map(|doc| doc.get(field)?.as_object())
            .flat_map(|obj| obj.keys().cloned())
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    fn rollup(
        &self,
        index: &str,
        path: &str,
        scan_id: &str,
        category: &str,
        buckets: &[String],
    ) -> Result<HashMap<String, RollupStat>> {
        let bulk = self.bulk.lock().unwrap();
        let mut out: HashMap<String, RollupStat> = HashMap::new();
        for doc in bulk.get(index).into_iter().flatten() {
            if doc.get("scan_id").and_then(Value::as_str) != Some(scan_id) {
                continue;
            }
            if !under_tree(path_of(doc), path) {
                continue;
            }
            for bucket in buckets {
                let Some(stat) = doc.pointer(&format!("/{category}/{bucket}")) else {
                    continue;
                };
                let size = stat.get("size").and_then(Value::as_u64).unwrap_or(0);
                let count = stat.get("count").and_then(Value::as_u64).unwrap_or(0);
                let entry = out.entry(bucket.clone()).or_default();
                entry.size += size;
                entry.count += count;
            }
        }
        out.retain(|_, stat| stat.size > 0 || stat.count > 0);
        Ok(out)
    }

    fn count_size(&self, index: &str, path: &str, scan_id: &str) -> Result<RollupStat> {
        let bulk = self.bulk.lock().unwrap();
        let mut stat = RollupStat::default();
        for doc in bulk.get(index).into_iter().flatten() {
            if doc.get("scan_id").and_then(Value::as_str) != Some(scan_id) {
                continue;
            }
            if !under_tree(path_of(doc), path) {
                continue;
            }
            stat.size += doc.get("size").and_then(Value::as_u64).unwrap_or(0);
            stat.count += doc.get("count").and_then(Value::as_u64).unwrap_or(0);
        }
        Ok(stat)
    }

    fn list_scans(&self, index: &str, path: &str) -> Result<Vec<ScanRow>> {
        let docs = self.docs.lock().unwrap();
        Ok(docs
            .get(index)
            .into_iter()
            .flatten()
            .filter(|(_, doc)| path_of(doc) == path)
            .map(|(id, doc)| ScanRow {
                scan_id: id.clone(),
                status: doc
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                start_timestamp: doc
                    .get("start_timestamp")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect())
    }

    fn delete_by_scan_id(&self, index: &str, scan_id: &str) -> Result<()> {
        let mut bulk = self.bulk.lock().unwrap();
        if let Some(docs) = bulk.get_mut(index) {
            docs.retain(|doc| doc.get("scan_id").and_then(Value::as_str) != Some(scan_id));
        }
        Ok(())
    }
}

pub fn elastic_config() -> ElasticConfig {
    ElasticConfig {
        data_index_name: "data".to_string(),
        volume_index_name: "volumes".to_string(),
        aggregate_index_name: "aggregates".to_string(),
        hosts: vec![],
        use_ssl: false,
        ca_certs: None,
        timeout: 30,
        api_key: None,
    }
}

/// Single-threaded settings: deterministic ordering, nothing to race in assertions.
pub fn settings() -> ScanSettings {
    ScanSettings {
        scan_threads: 1,
        scan_max_threads_per_worker: 1,
        queue_length_scale_factor: 1,
        elastic: elastic_config(),
    }
}
