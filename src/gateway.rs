// 🔌 Remote Table Gateway - the registry's view of the backing store
//
// A black box that executes a query and returns rows or an error.
// Rows travel as JSON objects, for a hosted REST backend and the local
// SQLite store alike.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::GatewayError;

/// One table row, keyed by column name
pub type Row = Map<String, Value>;

/// Equality filter on a single column
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// Result ordering for `select`
#[derive(Debug, Clone, PartialEq)]
pub struct Ordering {
    pub column: String,
    pub ascending: bool,
}

impl Ordering {
    pub fn asc(column: impl Into<String>) -> Self {
        Ordering {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Ordering {
            column: column.into(),
            ascending: false,
        }
    }
}

/// Table operations the registry needs from the backing store
///
/// Implementations assign `id` and timestamps on insert and must report
/// constraint failures through the matching [`GatewayError`] variant so the
/// registry can tell a duplicate from a missing column.
#[async_trait]
pub trait RemoteTableGateway: Send + Sync {
    async fn select(
        &self,
        table: &str,
        filters: &[Filter],
        ordering: Option<&Ordering>,
    ) -> Result<Vec<Row>, GatewayError>;

    async fn insert(&self, table: &str, row: Row) -> Result<Row, GatewayError>;

    async fn update(&self, table: &str, id: &str, patch: Row) -> Result<Row, GatewayError>;

    async fn delete(&self, table: &str, id: &str) -> Result<(), GatewayError>;
}
