//! Gremlin Server client over the HTTP endpoint.
//!
//! Every value is sent as a script binding; scripts only reference binding
//! names.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::config::GremlinEndpoint;
use crate::core::Fields;
use crate::drivers::common::{HttpAuth, JsonHttp};
use crate::error::{RefreshError, Result};

use super::client::{Edge, GremlinClient, Vertex};

const STORE: &str = "graph";

/// Strip GraphSON v2/v3 type wrappers. GraphSON v1 passes through unchanged.
pub fn strip_graphson(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("@type") && map.contains_key("@value") => {
            let kind = map
                .get("@type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let inner = map.remove("@value").unwrap_or(Value::Null);
            match (kind.as_str(), inner) {
                ("g:Map", Value::Array(flat)) => {
                    let mut out = Map::new();
                    let mut items = flat.into_iter();
                    while let (Some(k), Some(v)) = (items.next(), items.next()) {
                        let key = match strip_graphson(k) {
                            Value::String(s) => s,
                            other => other.to_string(),
                        };
                        out.insert(key, strip_graphson(v));
                    }
                    Value::Object(out)
                }
                (_, inner) => strip_graphson(inner),
            }
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, strip_graphson(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_graphson).collect()),
        other => other,
    }
}

/// Result items of a response body as a plain list.
fn result_items(body: Value) -> Vec<Value> {
    let data = body
        .get("result")
        .and_then(|r| r.get("data"))
        .cloned()
        .unwrap_or(Value::Null);
    match strip_graphson(data) {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn object(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Script adding one vertex, with its bindings.
pub fn add_vertex_script(vertex: &Vertex, id_property: Option<&str>) -> (String, Map<String, Value>) {
    let mut bindings = Map::new();
    bindings.insert("vlabel".into(), json!(vertex.label));
    bindings.insert("vid".into(), vertex.id.clone());

    let mut script = String::from("g.addV(vlabel)");
    match id_property {
        Some(prop) => {
            bindings.insert("idkey".into(), json!(prop));
            script.push_str(".property(idkey, vid)");
        }
        None => script.push_str(".property(T.id, vid)"),
    }

    for (i, (key, value)) in vertex.properties.iter().enumerate() {
        if Some(key.as_str()) == id_property {
            continue;
        }
        bindings.insert(format!("k{}", i), json!(key));
        for (j, v) in Vertex::values(value).into_iter().enumerate() {
            bindings.insert(format!("v{}_{}", i, j), v);
            script.push_str(&format!(".property(list, k{}, v{}_{})", i, i, j));
        }
    }
    (script, bindings)
}

/// Script adding one edge between existing vertices, with its bindings.
pub fn add_edge_script(edge: &Edge, id_property: Option<&str>) -> (String, Map<String, Value>) {
    let mut bindings = Map::new();
    bindings.insert("elabel".into(), json!(edge.label));
    bindings.insert("eid".into(), edge.id.clone());
    bindings.insert("outid".into(), edge.out_v.clone());
    bindings.insert("inid".into(), edge.in_v.clone());

    let mut script = match id_property {
        Some(prop) => {
            bindings.insert("idkey".into(), json!(prop));
            String::from(
                "g.V().has(idkey, outid).addE(elabel).to(__.V().has(idkey, inid)).property(idkey, eid)",
            )
        }
        None => String::from("g.V(outid).addE(elabel).to(__.V(inid)).property(T.id, eid)"),
    };

    for (i, (key, value)) in edge.properties.iter().enumerate() {
        if Some(key.as_str()) == id_property {
            continue;
        }
        bindings.insert(format!("k{}", i), json!(key));
        bindings.insert(format!("v{}", i), value.clone());
        script.push_str(&format!(".property(k{}, v{})", i, i));
    }
    (script, bindings)
}

pub struct GremlinHttpClient {
    http: JsonHttp,
    id_property: Option<String>,
}

impl GremlinHttpClient {
    pub async fn connect(endpoint: &GremlinEndpoint, id_property: Option<String>) -> Result<Self> {
        let auth = HttpAuth::basic(endpoint.username.as_ref(), endpoint.password.as_ref());
        let client = Self {
            http: JsonHttp::new(STORE, &endpoint.url, auth)?,
            id_property,
        };
        client.submit("g.inject(1)", Map::new()).await.map_err(|e| match e {
            RefreshError::Connection { .. } => e,
            other => RefreshError::connection(STORE, format!("{}: {}", endpoint.url, other)),
        })?;
        info!("Connected to Gremlin Server: {}", client.http.base_url());
        Ok(client)
    }

    async fn submit(&self, script: &str, bindings: Map<String, Value>) -> Result<Vec<Value>> {
        let body = json!({"gremlin": script, "bindings": bindings});
        let reply = self.http.send(Method::POST, self.http.url(&[]), Some(&body)).await?;
        if reply.status == StatusCode::UNAUTHORIZED
            || reply.status == StatusCode::PROXY_AUTHENTICATION_REQUIRED
        {
            return Err(RefreshError::connection(STORE, reply.error_text()));
        }
        if !reply.is_success() {
            return Err(RefreshError::store(STORE, reply.error_text()));
        }
        Ok(result_items(reply.body))
    }

    async fn count_of(&self, script: &str) -> Result<i64> {
        let items = self.submit(script, Map::new()).await?;
        Ok(items.first().and_then(Value::as_i64).unwrap_or(0))
    }

    fn range_bindings(offset: u64, limit: usize) -> Map<String, Value> {
        let mut bindings = Map::new();
        bindings.insert("lo".into(), json!(offset));
        bindings.insert("hi".into(), json!(offset + limit as u64));
        bindings
    }
}

#[async_trait]
impl GremlinClient for GremlinHttpClient {
    async fn vertices(&self, offset: u64, limit: usize) -> Result<Vec<Vertex>> {
        let items = self
            .submit(
                "g.V().range(lo, hi).project('id', 'label', 'properties')\
                 .by(T.id).by(T.label).by(valueMap())",
                Self::range_bindings(offset, limit),
            )
            .await?;
        Ok(items
            .into_iter()
            .map(|item| {
                let mut fields = object(item);
                Vertex {
                    id: fields.remove("id").unwrap_or(Value::Null),
                    label: text(fields.get("label")),
                    properties: object(fields.remove("properties").unwrap_or(Value::Null)),
                }
            })
            .collect())
    }

    async fn edges(&self, offset: u64, limit: usize) -> Result<Vec<Edge>> {
        let items = self
            .submit(
                "g.E().range(lo, hi).project('id', 'label', 'outV', 'inV', 'properties')\
                 .by(T.id).by(T.label).by(__.outV().id()).by(__.inV().id()).by(valueMap())",
                Self::range_bindings(offset, limit),
            )
            .await?;
        Ok(items
            .into_iter()
            .map(|item| {
                let mut fields = object(item);
                Edge {
                    id: fields.remove("id").unwrap_or(Value::Null),
                    label: text(fields.get("label")),
                    out_v: fields.remove("outV").unwrap_or(Value::Null),
                    in_v: fields.remove("inV").unwrap_or(Value::Null),
                    properties: object(fields.remove("properties").unwrap_or(Value::Null)),
                }
            })
            .collect())
    }

    async fn add_vertex(&self, vertex: &Vertex) -> Result<()> {
        let (script, bindings) = add_vertex_script(vertex, self.id_property.as_deref());
        self.submit(&script, bindings)
            .await
            .map_err(|e| match e {
                RefreshError::Store { message, .. } => {
                    RefreshError::data_integrity(format!("vertex {}", vertex.id), message)
                }
                other => other,
            })?;
        Ok(())
    }

    async fn add_edge(&self, edge: &Edge) -> Result<()> {
        let (script, bindings) = add_edge_script(edge, self.id_property.as_deref());
        let added = self.submit(&script, bindings).await.map_err(|e| match e {
            RefreshError::Store { message, .. } => {
                RefreshError::data_integrity(format!("edge {}", edge.id), message)
            }
            other => other,
        })?;
        // No endpoint vertex means the traversal added nothing.
        if added.is_empty() {
            return Err(RefreshError::data_integrity(
                format!("edge {}", edge.id),
                format!("endpoint {} or {} not found", edge.out_v, edge.in_v),
            ));
        }
        Ok(())
    }

    async fn drop_edges(&self) -> Result<()> {
        self.submit("g.E().drop()", Map::new()).await?;
        Ok(())
    }

    async fn drop_vertices(&self) -> Result<()> {
        self.submit("g.V().drop()", Map::new()).await?;
        Ok(())
    }

    async fn vertex_count(&self) -> Result<i64> {
        self.count_of("g.V().count()").await
    }

    async fn edge_count(&self) -> Result<i64> {
        self.count_of("g.E().count()").await
    }

    async fn close(&self) {
        debug!("Releasing Gremlin client for {}", self.http.base_url());
    }
}
