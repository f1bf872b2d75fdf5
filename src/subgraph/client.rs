//! Subgraph GraphQL client
//!
//! Builds the mints/burns queries and maps HTTP outcomes onto [`FetchError`].

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client, StatusCode,
};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use super::types::{GraphqlResponse, RawEvent};
use super::{FetchError, PageRequest, SubgraphTransport};
use crate::types::Direction;

const EVENT_FIELDS: &str = r#"
    id
    transaction { id blockNumber timestamp gasLimit gasPrice }
    timestamp
    pool { id }
    token0 { symbol }
    token1 { symbol }
    owner
    origin
    amount
    amount0
    amount1
    amountUSD
    tickLower
    tickUpper
    logIndex"#;

#[derive(Debug, Serialize)]
struct GraphqlRequest<'a> {
    query: String,
    variables: &'a serde_json::Value,
}

/// GraphQL document for one page of `direction` events.
///
/// `amountUSD_gte` always applies; `timestamp_gte` only when a lower bound is known.
pub fn build_query(direction: Direction, with_since: bool) -> String {
    let entity = direction.entity();
    let (since_param, since_filter) = if with_since {
        (", $since: BigInt!", ", timestamp_gte: $since")
    } else {
        ("", "")
    };
    // Only mints carry a sender
    let extra_fields = match direction {
        Direction::Add => "\n    sender",
        Direction::Withdraw => "",
    };
    format!(
        "query large_{entity}($first: Int!, $skip: Int!, $minUsd: BigDecimal!{since_param}) {{\n  \
         {entity}(first: $first, skip: $skip, orderBy: timestamp, orderDirection: asc, \
         where: {{ amountUSD_gte: $minUsd{since_filter} }}) {{{EVENT_FIELDS}{extra_fields}\n  }}\n}}"
    )
}

/// Variables matching [`build_query`]
pub fn build_variables(request: &PageRequest) -> serde_json::Value {
    let mut variables = serde_json::json!({
        "first": request.first,
        "skip": request.skip,
        "minUsd": request.min_usd.to_string(),
    });
    if let Some(since) = request.since {
        variables["since"] = serde_json::Value::String(since.timestamp().to_string());
    }
    variables
}

/// reqwest-backed transport against a single subgraph endpoint
pub struct HttpSubgraphTransport {
    client: Client,
    url: String,
}

impl HttpSubgraphTransport {
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            url: url.trim().to_string(),
        })
    }

    /// Map a decoded response body onto the events for `direction`
    pub fn extract_events(
        direction: Direction,
        response: GraphqlResponse,
    ) -> Result<Vec<RawEvent>, FetchError> {
        if let Some(errors) = response.errors.filter(|e| !e.is_empty()) {
            let joined = errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(FetchError::Upstream(format!("GraphQL errors: {}", joined)));
        }

        let rows = response
            .data
            .and_then(|mut data| data.remove(direction.entity()))
            .ok_or_else(|| {
                FetchError::Upstream(format!("response has no `{}` field", direction.entity()))
            })?;

        serde_json::from_value::<Vec<RawEvent>>(rows).map_err(|e| {
            FetchError::Upstream(format!("unexpected `{}` shape: {}", direction.entity(), e))
        })
    }
}

#[async_trait]
impl SubgraphTransport for HttpSubgraphTransport {
    async fn query(&self, request: &PageRequest) -> Result<Vec<RawEvent>, FetchError> {
        let variables = build_variables(request);
        let body = GraphqlRequest {
            query: build_query(request.direction, request.since.is_some()),
            variables: &variables,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(FetchError::Upstream(format!(
                "HTTP {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            )));
        }

        let decoded: GraphqlResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Network(e.to_string())
            } else {
                FetchError::Upstream(format!("invalid response body: {}", e))
            }
        })?;

        let events = Self::extract_events(request.direction, decoded)?;
        debug!(
            direction = %request.direction,
            skip = request.skip,
            count = events.len(),
            "Fetched subgraph page"
        );
        Ok(events)
    }
}
