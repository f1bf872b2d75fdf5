//! Subgraph wire types
//!
//! Every field is optional: a single incomplete event must not fail a whole page.
//! The normalizer decides what is required.

use serde::{Deserialize, Deserializer, Serialize};

use crate::types::Direction;

/// BigInt/BigDecimal scalars arrive as strings, but some indexers emit numbers
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub block_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub gas_limit: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub gas_price: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPool {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawToken {
    #[serde(default)]
    pub symbol: Option<String>,
}

/// One mint or burn entity as returned by the subgraph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub transaction: Option<RawTransaction>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub pool: Option<RawPool>,
    #[serde(default)]
    pub token0: Option<RawToken>,
    #[serde(default)]
    pub token1: Option<RawToken>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub amount: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub amount0: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub amount1: Option<String>,
    #[serde(rename = "amountUSD", default, deserialize_with = "lenient_string")]
    pub amount_usd: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tick_lower: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tick_upper: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub log_index: Option<String>,
}

/// A raw event tagged with the direction it was fetched for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub direction: Direction,
    pub event: RawEvent,
}

/// GraphQL error entry
#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlError {
    pub message: String,
}

/// GraphQL response envelope; `data` maps entity name to rows
#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlResponse {
    #[serde(default)]
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub errors: Option<Vec<GraphqlError>>,
}
