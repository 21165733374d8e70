//! Graph store driver contract.

use async_trait::async_trait;
use serde_json::Value;

use crate::core::Fields;
use crate::error::{RefreshError, Result};

/// Vertex with every property value. Properties map a key to the list of
/// its values (more than one for multi-valued properties).
#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    pub id: Value,
    pub label: String,
    pub properties: Fields,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: Value,
    pub label: String,
    pub out_v: Value,
    pub in_v: Value,
    pub properties: Fields,
}

fn field<'a>(fields: &'a Fields, name: &str) -> Result<&'a Value> {
    match fields.get(name) {
        Some(Value::Null) | None => Err(RefreshError::data_integrity(
            "graph",
            format!("element without {}", name),
        )),
        Some(v) => Ok(v),
    }
}

fn label(fields: &Fields) -> Result<String> {
    match field(fields, "label")? {
        Value::String(s) => Ok(s.clone()),
        other => Ok(other.to_string()),
    }
}

fn properties(fields: &Fields) -> Fields {
    match fields.get("properties") {
        Some(Value::Object(map)) => map.clone(),
        _ => Fields::new(),
    }
}

impl Vertex {
    pub fn into_fields(self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("id".into(), self.id);
        fields.insert("label".into(), Value::String(self.label));
        fields.insert("properties".into(), Value::Object(self.properties));
        fields
    }

    pub fn from_fields(fields: &Fields) -> Result<Self> {
        Ok(Self {
            id: field(fields, "id")?.clone(),
            label: label(fields)?,
            properties: properties(fields),
        })
    }

    /// Property values as a list, whatever shape the source used.
    pub fn values(value: &Value) -> Vec<Value> {
        match value {
            Value::Array(values) => values.clone(),
            other => vec![other.clone()],
        }
    }
}

impl Edge {
    pub fn into_fields(self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("id".into(), self.id);
        fields.insert("label".into(), Value::String(self.label));
        fields.insert("outV".into(), self.out_v);
        fields.insert("inV".into(), self.in_v);
        fields.insert("properties".into(), Value::Object(self.properties));
        fields
    }

    pub fn from_fields(fields: &Fields) -> Result<Self> {
        Ok(Self {
            id: field(fields, "id")?.clone(),
            label: label(fields)?,
            out_v: field(fields, "outV")?.clone(),
            in_v: field(fields, "inV")?.clone(),
            properties: properties(fields),
        })
    }
}

/// Connection to one graph.
#[async_trait]
pub trait GremlinClient: Send + Sync + 'static {
    /// Vertices `offset..offset + limit` of `g.V()`.
    async fn vertices(&self, offset: u64, limit: usize) -> Result<Vec<Vertex>>;

    /// Edges `offset..offset + limit` of `g.E()`.
    async fn edges(&self, offset: u64, limit: usize) -> Result<Vec<Edge>>;

    /// Add a vertex under its source id.
    async fn add_vertex(&self, vertex: &Vertex) -> Result<()>;

    /// Add an edge between two existing vertices, under its source id.
    async fn add_edge(&self, edge: &Edge) -> Result<()>;

    async fn drop_edges(&self) -> Result<()>;

    async fn drop_vertices(&self) -> Result<()>;

    async fn vertex_count(&self) -> Result<i64>;

    async fn edge_count(&self) -> Result<i64>;

    async fn close(&self);
}
