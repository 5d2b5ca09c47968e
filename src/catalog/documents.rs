//! 文档检索：按关键词重叠打分（无向量库）
//!
//! 分数 = 查询词与文档词的交集大小 / 查询词数，取分数高于 min_score 的前 limit 条。

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::catalog::SqliteDb;
use crate::core::AgentError;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "what", "how", "are", "is", "of", "to", "in", "a", "an", "does", "can",
];

fn tokenize_lower(s: &str) -> HashSet<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 1 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<String>, AgentError>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryDocuments {
    docs: Vec<String>,
}

impl InMemoryDocuments {
    pub fn new(docs: Vec<String>) -> Self {
        Self { docs }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocuments {
    async fn fetch_all(&self) -> Result<Vec<String>, AgentError> {
        Ok(self.docs.clone())
    }
}

/// documents(id, text)
pub struct SqliteDocuments {
    db: Arc<SqliteDb>,
}

impl SqliteDocuments {
    pub fn new(db: Arc<SqliteDb>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DocumentStore for SqliteDocuments {
    async fn fetch_all(&self) -> Result<Vec<String>, AgentError> {
        self.db
            .with_conn(|conn| {
                let mut stmt = conn.prepare("SELECT text FROM documents ORDER BY id")?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDocument {
    pub text: String,
    pub score: f64,
}

pub struct DocumentRetriever {
    store: Arc<dyn DocumentStore>,
    min_score: f64,
    limit: usize,
}

impl DocumentRetriever {
    pub fn new(store: Arc<dyn DocumentStore>, min_score: f64, limit: usize) -> Self {
        Self {
            store,
            min_score,
            limit,
        }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<ScoredDocument>, AgentError> {
        let query_tokens = tokenize_lower(query);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }
        let docs = self.store.fetch_all().await?;
        let mut scored: Vec<ScoredDocument> = docs
            .into_iter()
            .map(|text| {
                let doc_tokens = tokenize_lower(&text);
                let overlap = query_tokens.intersection(&doc_tokens).count();
                ScoredDocument {
                    score: overlap as f64 / query_tokens.len() as f64,
                    text,
                }
            })
            .filter(|d| d.score > self.min_score)
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(self.limit);
        Ok(scored)
    }
}
