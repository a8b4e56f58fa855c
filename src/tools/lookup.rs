//! External lookup tools: Tavily web search and Wikipedia summaries.
//!
//! Web search is only catalogued when `TAVILY_API_KEY` is present; the
//! Wikipedia tool needs no credentials. Network failures surface as
//! `ToolError::LookupFailed` so the reasoning loop can observe them and
//! try another approach instead of aborting the query.

use std::time::Duration;

use crate::config::ToolsConfig;
use crate::error::ToolError;

pub fn web_search_available() -> bool {
    std::env::var("TAVILY_API_KEY").is_ok_and(|k| !k.is_empty())
}

/// Search the web through the Tavily API and render the top results.
pub async fn web_search(config: &ToolsConfig, query: &str) -> Result<String, ToolError> {
    let api_key = std::env::var("TAVILY_API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            ToolError::ToolUnavailable("web search requires TAVILY_API_KEY".to_string())
        })?;

    let client = build_client(config.timeout_secs)?;
    let body = serde_json::json!({
        "api_key": api_key,
        "query": query,
        "max_results": config.web_search_results,
        "include_answer": true,
    });

    let response = client
        .post("https://api.tavily.com/search")
        .json(&body)
        .send()
        .await
        .map_err(|e| ToolError::LookupFailed(format!("web search request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ToolError::LookupFailed(format!(
            "web search returned HTTP {}",
            status
        )));
    }

    let json: serde_json::Value = response
        .json()
        .await
        .map_err(|e| ToolError::LookupFailed(format!("invalid web search response: {}", e)))?;

    Ok(render_search_results(&json))
}

fn render_search_results(json: &serde_json::Value) -> String {
    let mut out = String::new();

    if let Some(answer) = json.get("answer").and_then(|a| a.as_str()) {
        if !answer.is_empty() {
            out.push_str(answer);
            out.push('\n');
        }
    }

    if let Some(results) = json.get("results").and_then(|r| r.as_array()) {
        for result in results {
            let title = result.get("title").and_then(|t| t.as_str()).unwrap_or("");
            let content = result.get("content").and_then(|c| c.as_str()).unwrap_or("");
            let url = result.get("url").and_then(|u| u.as_str()).unwrap_or("");
            if !title.is_empty() || !content.is_empty() {
                out.push_str(&format!("- {}: {} ({})\n", title, content, url));
            }
        }
    }

    if out.trim().is_empty() {
        "The web search returned no results.".to_string()
    } else {
        out.trim_end().to_string()
    }
}

/// Fetch the lead summary of the best-matching Wikipedia article.
pub async fn wikipedia(config: &ToolsConfig, topic: &str) -> Result<String, ToolError> {
    let topic = topic.trim();
    if topic.is_empty() {
        return Err(ToolError::InvalidInput(
            "wikipedia lookup needs a topic".to_string(),
        ));
    }

    let client = build_client(config.timeout_secs)?;

    // Try the topic as a title first; on a miss, fall back to title search
    // and take the best match.
    match fetch_summary(&client, &topic.replace(' ', "_")).await? {
        Some(summary) => Ok(summary),
        None => {
            let Some(title) = search_title(&client, topic).await? else {
                return Ok(format!("No Wikipedia article found for '{}'.", topic));
            };
            match fetch_summary(&client, &title.replace(' ', "_")).await? {
                Some(summary) => Ok(summary),
                None => Ok(format!("No Wikipedia article found for '{}'.", topic)),
            }
        }
    }
}

/// Lead summary for an exact title; `None` when the article does not exist.
async fn fetch_summary(
    client: &reqwest::Client,
    title: &str,
) -> Result<Option<String>, ToolError> {
    let url = format!(
        "https://en.wikipedia.org/api/rest_v1/page/summary/{}",
        urlencode(title)
    );

    let response = client
        .get(&url)
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(|e| ToolError::LookupFailed(format!("wikipedia request failed: {}", e)))?;

    let status = response.status();
    if status.as_u16() == 404 {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(ToolError::LookupFailed(format!(
            "wikipedia returned HTTP {}",
            status
        )));
    }

    let json: serde_json::Value = response
        .json()
        .await
        .map_err(|e| ToolError::LookupFailed(format!("invalid wikipedia response: {}", e)))?;

    let page_title = json
        .get("title")
        .and_then(|t| t.as_str())
        .unwrap_or(title);
    let extract = json
        .get("extract")
        .and_then(|e| e.as_str())
        .unwrap_or_default();

    if extract.is_empty() {
        Ok(Some(format!(
            "The Wikipedia article '{}' has no summary.",
            page_title
        )))
    } else {
        Ok(Some(format!("{}: {}", page_title, extract)))
    }
}

/// Best-matching article title for a free-form query.
async fn search_title(
    client: &reqwest::Client,
    query: &str,
) -> Result<Option<String>, ToolError> {
    let url = format!(
        "https://en.wikipedia.org/w/rest.php/v1/search/title?q={}&limit=1",
        urlencode(query)
    );

    let response = client
        .get(&url)
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(|e| ToolError::LookupFailed(format!("wikipedia search failed: {}", e)))?;

    if !response.status().is_success() {
        return Ok(None);
    }

    let json: serde_json::Value = response
        .json()
        .await
        .map_err(|e| ToolError::LookupFailed(format!("invalid wikipedia response: {}", e)))?;

    Ok(json
        .get("pages")
        .and_then(|p| p.as_array())
        .and_then(|p| p.first())
        .and_then(|p| p.get("title"))
        .and_then(|t| t.as_str())
        .map(|t| t.to_string()))
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client, ToolError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ToolError::LookupFailed(format!("could not build HTTP client: {}", e)))
}

/// Percent-encode everything outside the unreserved set. Underscores from
/// the title normalization pass through.
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}
