//! Request handlers for the Elasticsearch-compatible API.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::analysis::{registry as analysis_registry, Analyzer};
use crate::config::StorageKind;
use crate::core::{Index, IndexSettings, Registry};
use crate::error::{GalenaError, Result};
use crate::mapping::Mappings;
use crate::search::DocumentList;
use crate::server::{ApiError, AppState};

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Run a blocking engine call off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| GalenaError::runtime(format!("blocking task failed: {e}")))?
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateIndexRequest {
    pub name: String,
    #[serde(default)]
    pub storage_type: Option<String>,
    #[serde(default)]
    pub settings: Option<Value>,
    #[serde(default)]
    pub mappings: Option<Mappings>,
}

pub async fn create_index(
    State(state): State<AppState>,
    Json(request): Json<CreateIndexRequest>,
) -> ApiResult<Json<Value>> {
    let registry = state.registry;
    let storage_kind = match &request.storage_type {
        Some(s) => StorageKind::parse(s)?,
        None => registry.config().storage,
    };

    let settings: IndexSettings = match request.settings {
        Some(raw) => serde_json::from_value(raw)
            .map_err(|e| GalenaError::parsing(format!("[settings] is invalid: {e}")))?,
        None => IndexSettings::default(),
    };
    let mappings = request.mappings.unwrap_or_default();
    let name = request.name.clone();

    blocking(move || {
        registry.create_index(&name, storage_kind, settings, mappings)?;
        Ok(())
    })
    .await?;

    Ok(Json(json!({
        "message": "ok",
        "index": request.name,
        "storage_type": storage_kind.as_str(),
    })))
}

pub async fn list_indexes(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let descriptors = state.registry.list();
    Ok(Json(serde_json::to_value(descriptors).map_err(GalenaError::from)?))
}

pub async fn index_exists(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> StatusCode {
    if state.registry.exists(&name) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn delete_indexes(
    State(state): State<AppState>,
    Path(names): Path<String>,
) -> ApiResult<Json<Value>> {
    let registry = state.registry;
    let names: Vec<String> = names
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect();

    blocking(move || {
        for name in &names {
            registry.delete_index(name)?;
        }
        Ok(())
    })
    .await?;

    Ok(Json(json!({"message": "ok"})))
}

pub async fn get_mapping(
    State(state): State<AppState>,
    Path(target): Path<String>,
) -> ApiResult<Json<Value>> {
    let index = state
        .registry
        .get(&target)
        .ok_or_else(|| GalenaError::not_found(format!("index {target} does not exist")))?;

    let mappings = index.mappings();
    Ok(Json(json!({ target: { "mappings": mappings } })))
}

pub async fn put_mapping(
    State(state): State<AppState>,
    Path(target): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let registry = state.registry;
    // Accept both a bare properties map and the full mappings shape.
    let mappings: Mappings = if body.get("properties").is_some() {
        serde_json::from_value(body)
            .map_err(|e| GalenaError::parsing(format!("[mappings] is invalid: {e}")))?
    } else {
        serde_json::from_value(json!({ "properties": body }))
            .map_err(|e| GalenaError::parsing(format!("[mappings] is invalid: {e}")))?
    };

    blocking(move || {
        let index = registry.get_or_create(&target)?;
        index.set_mappings(&mappings)
    })
    .await?;

    Ok(Json(json!({"message": "ok"})))
}

pub async fn put_document(
    State(state): State<AppState>,
    Path((target, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let id = write_document(state.registry, target, Some(id), body).await?;
    Ok(Json(json!({"message": "ok", "id": id})))
}

pub async fn create_document(
    State(state): State<AppState>,
    Path(target): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let id = write_document(state.registry, target, None, body).await?;
    Ok(Json(json!({"message": "ok", "id": id})))
}

async fn write_document(
    registry: Arc<Registry>,
    target: String,
    id: Option<String>,
    body: Value,
) -> Result<String> {
    let id = id.unwrap_or_else(generated_id);
    let doc_id = id.clone();
    blocking(move || {
        let index = registry.get_or_create(&target)?;
        index.write_document(&doc_id, &body)
    })
    .await?;
    Ok(id)
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path((target, id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let registry = state.registry;
    blocking(move || {
        let index = registry
            .get(&target)
            .ok_or_else(|| GalenaError::not_found(format!("index {target} does not exist")))?;
        if !index.delete_document(&id)? {
            return Err(GalenaError::not_found(format!("id {id} does not exist")));
        }
        Ok(())
    })
    .await?;

    Ok(Json(json!({"message": "ok"})))
}

pub async fn bulk(
    State(state): State<AppState>,
    body: String,
) -> ApiResult<Json<Value>> {
    run_bulk(state.registry, None, body).await
}

pub async fn bulk_target(
    State(state): State<AppState>,
    Path(target): Path<String>,
    body: String,
) -> ApiResult<Json<Value>> {
    run_bulk(state.registry, Some(target), body).await
}

/// NDJSON bulk loader. Document-level failures are collected per item
/// without aborting the batch.
async fn run_bulk(
    registry: Arc<Registry>,
    default_target: Option<String>,
    body: String,
) -> ApiResult<Json<Value>> {
    let started = std::time::Instant::now();

    let items = blocking(move || {
        let mut items: Vec<Value> = Vec::new();
        let mut lines = body.lines().filter(|l| !l.trim().is_empty());

        while let Some(action_line) = lines.next() {
            let action: Value = match serde_json::from_str(action_line) {
                Ok(v) => v,
                Err(e) => {
                    return Err(GalenaError::parsing(format!(
                        "bulk action line is invalid: {e}"
                    )));
                }
            };
            let Value::Object(action_map) = &action else {
                return Err(GalenaError::parsing("bulk action line must be an object"));
            };
            let Some((op, meta)) = action_map.iter().next() else {
                return Err(GalenaError::parsing("bulk action line is empty"));
            };

            let target = meta
                .get("_index")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| default_target.clone())
                .ok_or_else(|| GalenaError::parsing("bulk action is missing _index"))?;
            let id = meta
                .get("_id")
                .and_then(Value::as_str)
                .map(str::to_string);

            let outcome: Result<(String, u16)> = match op.as_str() {
                "index" | "create" | "update" => {
                    let Some(doc_line) = lines.next() else {
                        return Err(GalenaError::parsing(format!(
                            "bulk [{op}] action is missing its document line"
                        )));
                    };
                    match serde_json::from_str::<Value>(doc_line) {
                        Ok(doc) => {
                            let doc = match op.as_str() {
                                // update wraps the document in {"doc": ...}
                                "update" => doc.get("doc").cloned().unwrap_or(doc),
                                _ => doc,
                            };
                            let id = id.unwrap_or_else(generated_id);
                            registry
                                .get_or_create(&target)
                                .and_then(|index| index.write_document(&id, &doc))
                                .map(|_| (id, 200))
                        }
                        Err(e) => Err(GalenaError::parsing(format!(
                            "bulk document line is invalid: {e}"
                        ))),
                    }
                }
                "delete" => {
                    let id = id.unwrap_or_default();
                    registry
                        .get(&target)
                        .ok_or_else(|| {
                            GalenaError::not_found(format!("index {target} does not exist"))
                        })
                        .and_then(|index| index.delete_document(&id))
                        .map(|_| (id, 200))
                }
                other => Err(GalenaError::parsing(format!(
                    "bulk action [{other}] is not supported"
                ))),
            };

            let detail = match outcome {
                Ok((id, status)) => json!({"_index": target, "_id": id, "status": status}),
                Err(e) => json!({"_index": target, "status": 400, "error": e.to_string()}),
            };
            let mut item = Map::new();
            item.insert(op.clone(), detail);
            items.push(Value::Object(item));
        }
        Ok(items)
    })
    .await?;

    let errors = items.iter().any(|item| {
        item.as_object()
            .and_then(|m| m.values().next())
            .and_then(|v| v.get("error"))
            .is_some()
    });

    Ok(Json(json!({
        "took": started.elapsed().as_millis() as u64,
        "errors": errors,
        "items": items,
    })))
}

pub async fn search(
    State(state): State<AppState>,
    Path(target): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let registry = state.registry;
    let started = std::time::Instant::now();

    let indexes = registry.resolve_targets(&target);
    if indexes.is_empty() {
        if target.is_empty() || target.contains('*') {
            // A pattern that matches nothing is an empty result set.
            return Ok(Json(json!({
                "took": started.elapsed().as_millis() as u64,
                "timed_out": false,
                "hits": {"total": {"value": 0, "relation": "eq"}, "max_score": 0.0, "hits": []}
            })));
        }
        // Compatibility: an unknown concrete index is a 400, not a 404.
        return Err(
            GalenaError::parsing(format!("index {target} does not exist")).into(),
        );
    }

    let list = blocking(move || search_indexes(&indexes, &body)).await?;
    Ok(Json(render_search(list, &target, started)))
}

/// Search one or more indexes and merge into a single response.
fn search_indexes(indexes: &[Arc<Index>], body: &Value) -> Result<DocumentList> {
    let cancel = Arc::new(AtomicBool::new(false));
    if indexes.len() == 1 {
        return indexes[0].search(body, cancel);
    }

    // Cross-index search: merge per-index hit pages by score, summing
    // totals. Aggregations merge shallowly by consuming each index's
    // matches into the first bucket set.
    let mut merged: Option<DocumentList> = None;
    for index in indexes {
        let list = index.search(body, Arc::clone(&cancel))?;
        merged = Some(match merged {
            None => list,
            Some(mut acc) => {
                acc.total += list.total;
                acc.docs.extend(list.docs);
                acc
            }
        });
    }
    let mut merged = merged.expect("at least one index");
    let sort = merged.parsed.sort.clone();
    merged
        .docs
        .sort_by(|a, b| crate::index::collector::compare_matches(&sort, a, b));
    merged.docs.truncate(merged.parsed.size);
    Ok(merged)
}

fn render_search(list: DocumentList, target: &str, started: std::time::Instant) -> Value {
    let max_score = list
        .docs
        .iter()
        .map(|d| d.score)
        .fold(0.0f32, |a, b| a.max(b));

    let hits: Vec<Value> = list
        .docs
        .iter()
        .map(|doc| {
            let mut hit = Map::new();
            hit.insert("_index".to_string(), json!(target));
            hit.insert("_id".to_string(), json!(doc.id));
            hit.insert("_score".to_string(), json!(doc.score));
            if let Some(ts) = doc.timestamp() {
                hit.insert("_timestamp".to_string(), json!(ts));
            }

            let source = doc
                .source
                .as_deref()
                .and_then(|bytes| serde_json::from_slice::<Value>(bytes).ok())
                .unwrap_or(Value::Null);
            match list.parsed.source.apply(source) {
                Some(filtered) => {
                    hit.insert("_source".to_string(), filtered);
                }
                None => {
                    hit.insert("_source".to_string(), json!({}));
                }
            }
            if !doc.highlight.is_empty() {
                hit.insert(
                    "highlight".to_string(),
                    serde_json::to_value(&doc.highlight).unwrap_or(Value::Null),
                );
            }
            Value::Object(hit)
        })
        .collect();

    let mut response = json!({
        "took": started.elapsed().as_millis() as u64,
        "timed_out": false,
        "hits": {
            "total": {"value": list.total, "relation": "eq"},
            "max_score": max_score,
            "hits": hits,
        }
    });
    if let Some(aggregations) = list.aggregations {
        response["aggregations"] = aggregations;
    }
    response
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub analyzer: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    pub text: String,
    #[serde(default)]
    pub tokenizer: Option<String>,
    #[serde(default)]
    pub char_filter: Vec<String>,
    #[serde(default)]
    pub token_filter: Vec<String>,
}

pub async fn analyze(
    State(state): State<AppState>,
    Path(target): Path<String>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<Json<Value>> {
    let registry = state.registry;

    let tokens = blocking(move || {
        let index = registry.get(&target);
        let empty = HashMap::new();
        let analyzers = index.as_ref().map(|i| i.analyzers()).unwrap_or(&empty);

        let analyzer: Arc<Analyzer> = if let Some(name) = &request.analyzer {
            analysis_registry::resolve(analyzers, name)?
        } else if let Some(field) = &request.field {
            let mappings = index
                .as_ref()
                .map(|i| i.mappings())
                .unwrap_or_default();
            analysis_registry::resolve_for_field(analyzers, &mappings, field)
                .0
                .unwrap_or_else(|| Arc::new(Analyzer::standard()))
        } else if let Some(tokenizer) = &request.tokenizer {
            build_adhoc_analyzer(tokenizer, &request.char_filter, &request.token_filter)?
        } else {
            Arc::new(Analyzer::standard())
        };

        analyzer.analyze(&request.text)
    })
    .await?;

    let rendered: Vec<Value> = tokens
        .iter()
        .map(|t| {
            json!({
                "token": t.text,
                "start_offset": t.start_offset,
                "end_offset": t.end_offset,
                "position": t.position,
                "type": "word",
            })
        })
        .collect();

    Ok(Json(json!({ "tokens": rendered })))
}

/// Compose an analyzer from bare built-in names, for ad-hoc `_analyze`.
fn build_adhoc_analyzer(
    tokenizer: &str,
    char_filters: &[String],
    token_filters: &[String],
) -> Result<Arc<Analyzer>> {
    let config = analysis_registry::AnalysisConfig {
        analyzer: HashMap::from([(
            "_adhoc".to_string(),
            analysis_registry::AnalyzerConfig {
                tokenizer: Some(tokenizer.to_string()),
                char_filter: char_filters.to_vec(),
                token_filter: token_filters.to_vec(),
                ..Default::default()
            },
        )]),
        ..Default::default()
    };
    let analyzers = analysis_registry::build_analyzers(&config)?;
    Ok(analyzers["_adhoc"].clone())
}

fn generated_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn state() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_path: dir.path().to_path_buf(),
            ..Config::default()
        };
        let registry = Arc::new(Registry::open(config).unwrap());
        (dir, AppState::new(registry))
    }

    #[tokio::test]
    async fn test_create_and_search_flow() {
        let (_dir, state) = state();

        let response = create_index(
            State(state.clone()),
            Json(CreateIndexRequest {
                name: "games".to_string(),
                storage_type: Some("disk".to_string()),
                settings: None,
                mappings: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.0["index"], "games");

        let response = create_document(
            State(state.clone()),
            Path("games".to_string()),
            Json(json!({"Athlete": "DEMTSCHENKO", "City": "Turin", "Year": 2006})),
        )
        .await
        .unwrap();
        assert!(!response.0["id"].as_str().unwrap().is_empty());

        let response = search(
            State(state.clone()),
            Path("games".to_string()),
            Json(json!({"query": {"term": {"City": "turin"}}})),
        )
        .await
        .unwrap();
        assert!(response.0["hits"]["total"]["value"].as_u64().unwrap() >= 1);
        assert_eq!(response.0["hits"]["hits"][0]["_source"]["City"], "Turin");
    }

    #[tokio::test]
    async fn test_search_unknown_index_is_400() {
        let (_dir, state) = state();
        let error = search(
            State(state),
            Path("games".to_string()),
            Json(json!({"query": {"match_all": {}}})),
        )
        .await
        .err()
        .unwrap();

        let response = axum::response::IntoResponse::into_response(error);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_bulk_continues_past_item_errors() {
        let (_dir, state) = state();
        // Second document has a time value that cannot parse once the
        // mapping is established.
        let body = concat!(
            r#"{"index": {"_index": "logs", "_id": "1"}}"#,
            "\n",
            r#"{"@timestamp": "2022-06-19T12:00:00Z", "msg": "ok"}"#,
            "\n",
            r#"{"index": {"_index": "logs", "_id": "2"}}"#,
            "\n",
            r#"{"@timestamp": "not-a-date", "msg": "bad"}"#,
            "\n",
        )
        .to_string();

        let response = bulk(State(state.clone()), body).await.unwrap();
        assert_eq!(response.0["errors"], true);

        let items = response.0["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert!(items[0]["index"]["error"].is_null());
        assert!(!items[1]["index"]["error"].is_null());

        // The good document landed.
        let index = state.registry.get("logs").unwrap();
        assert_eq!(index.doc_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_analyze_with_builtin() {
        let (_dir, state) = state();
        let response = analyze(
            State(state),
            Path("whatever".to_string()),
            Json(AnalyzeRequest {
                analyzer: Some("standard".to_string()),
                field: None,
                text: "Hello World".to_string(),
                tokenizer: None,
                char_filter: vec![],
                token_filter: vec![],
            }),
        )
        .await
        .unwrap();

        let tokens = response.0["tokens"].as_array().unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0]["token"], "hello");
    }

    #[tokio::test]
    async fn test_mapping_roundtrip() {
        let (_dir, state) = state();
        put_mapping(
            State(state.clone()),
            Path("games".to_string()),
            Json(json!({
                "properties": {
                    "City": {"type": "keyword"}
                }
            })),
        )
        .await
        .unwrap();

        let response = get_mapping(State(state), Path("games".to_string()))
            .await
            .unwrap();
        let props = &response.0["games"]["mappings"]["properties"];
        assert_eq!(props["City"]["type"], "keyword");
        assert_eq!(props["@timestamp"]["type"], "time");
    }
}
