//! GraphQL HTTP transport.
//!
//! One shared client with the cookie store enabled, so session cookies set
//! by the endpoint accompany every subsequent request. Errors cross this
//! seam as display strings: they are carried through host messages, not
//! handled here.

use reqwest::Client;
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Produces the header list attached to every request.
///
/// Evaluated at effect-execution time so host-side credential changes take
/// effect without rebuilding the cache.
pub type HeaderProvider = Arc<dyn Fn() -> Vec<(String, String)> + Send + Sync>;

/// A provider that attaches no headers.
pub fn no_headers() -> HeaderProvider {
  Arc::new(Vec::new)
}

fn http_client() -> &'static Client {
  static CLIENT: OnceLock<Client> = OnceLock::new();
  CLIENT.get_or_init(|| {
    Client::builder()
      .cookie_store(true)
      .build()
      .expect("failed to build HTTP client")
  })
}

/// POST one GraphQL request and return the response body text.
///
/// Network failures, non-2xx statuses and empty bodies all surface as
/// `Err(message)`; recovery is the host's call.
pub async fn post_graphql(
  endpoint: &str,
  query: &str,
  variables: &Value,
  headers: &[(String, String)],
) -> Result<String, String> {
  let mut request = http_client()
    .post(endpoint)
    .json(&json!({ "query": query, "variables": variables }));
  for (name, value) in headers {
    request = request.header(name.as_str(), value.as_str());
  }

  debug!(endpoint, "sending GraphQL request");
  let response = match request.send().await {
    Ok(response) => response,
    Err(e) => {
      warn!(endpoint, error = %e, "GraphQL request failed");
      return Err(format!("Request failed: {}", e));
    }
  };

  let status = response.status();
  if !status.is_success() {
    warn!(endpoint, %status, "GraphQL endpoint returned an error status");
    return Err(format!("HTTP {}", status));
  }

  let body = response
    .text()
    .await
    .map_err(|e| format!("Failed to read response body: {}", e))?;
  if body.is_empty() {
    return Err("Empty response body".to_string());
  }
  Ok(body)
}
