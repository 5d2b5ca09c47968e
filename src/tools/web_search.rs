//! web_search：Tavily 兼容的搜索端点（需 TAVILY_API_KEY）
//!
//! POST 请求带超时；结果拼接后超过 max_result_chars 时截断并追加 ...[truncated]。

use async_trait::async_trait;
use reqwest::Client;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::WebSearchSection;
use crate::tools::{parse_args, schema_of, Tool, ToolError};

pub const WEB_SEARCH_TOOL: &str = "web_search";

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct WebSearchArgs {
    /// Search query
    pub query: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

pub struct WebSearchTool {
    client: Client,
    api_url: String,
    api_key: String,
    max_results: usize,
    max_result_chars: usize,
}

impl WebSearchTool {
    pub fn new(cfg: &WebSearchSection, api_key: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_url: cfg.api_url.clone(),
            api_key,
            max_results: cfg.max_results,
            max_result_chars: cfg.max_result_chars,
        }
    }

    /// 从环境变量 TAVILY_API_KEY 创建；未设置时返回 None
    pub fn from_env(cfg: &WebSearchSection) -> Option<Self> {
        std::env::var("TAVILY_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(|key| Self::new(cfg, key))
    }
}

fn truncate_chars(s: String, max: usize) -> String {
    if s.chars().count() > max {
        s.chars().take(max).collect::<String>() + "\n...[truncated]"
    } else {
        s
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        WEB_SEARCH_TOOL
    }

    fn description(&self) -> &str {
        "Search the web for food-related information that is not in the local documents. Returns titles, urls and snippets."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<WebSearchArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: WebSearchArgs = parse_args(args)?;
        let query = args.query.trim();
        if query.is_empty() {
            return Err(ToolError::Validation("query must not be empty".to_string()));
        }
        tracing::info!(query = %query, "web search");
        let resp = self
            .client
            .post(&self.api_url)
            .json(&json!({
                "api_key": self.api_key,
                "query": query,
                "max_results": self.max_results,
            }))
            .send()
            .await
            .map_err(|e| ToolError::Fault(format!("Request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(ToolError::Fault(format!("HTTP {}", resp.status())));
        }
        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| ToolError::Fault(format!("Read body: {e}")))?;

        let text = body
            .results
            .iter()
            .take(self.max_results)
            .map(|h| format!("{}\n{}\n{}", h.title, h.url, h.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(Value::String(truncate_chars(text, self.max_result_chars)))
    }
}
