//! retrieve_from_doc：在食品知识文档中检索

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::catalog::DocumentRetriever;
use crate::tools::{parse_args, schema_of, Tool, ToolError};

pub const RETRIEVE_DOC_TOOL: &str = "retrieve_from_doc";
pub const NO_RESULT: &str = "NO RESULT!";

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RetrieveDocArgs {
    /// A detailed, document-style query about a food-related topic, e.g. "storage conditions for olive oil".
    pub query: String,
}

pub struct RetrieveFromDocTool {
    retriever: Arc<DocumentRetriever>,
}

impl RetrieveFromDocTool {
    pub fn new(retriever: Arc<DocumentRetriever>) -> Self {
        Self { retriever }
    }
}

#[async_trait]
impl Tool for RetrieveFromDocTool {
    fn name(&self) -> &str {
        RETRIEVE_DOC_TOOL
    }

    fn description(&self) -> &str {
        "Search for food-related information (ingredients, preparation, storage, nutrition) inside the documents. \
         Returns the matching texts, or [\"NO RESULT!\"] if nothing relevant is found."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<RetrieveDocArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: RetrieveDocArgs = parse_args(args)?;
        let hits = self
            .retriever
            .search(&args.query)
            .await
            .map_err(|e| ToolError::Fault(e.to_string()))?;
        let texts: Vec<Value> = if hits.is_empty() {
            vec![Value::String(NO_RESULT.to_string())]
        } else {
            hits.into_iter().map(|h| Value::String(h.text)).collect()
        };
        Ok(Value::Array(texts))
    }
}
