//! 模糊实体解析：按名称 / 来源近似匹配目录条目
//!
//! 三种代价方案下的加权编辑距离取最小值：
//! - 插入免费 (0,1,1)：查询是条目的子序列时距离为 0
//! - 删除免费 (1,0,1)：条目是查询的子序列时距离为 0
//! - 统一代价 (1,1,1)
//!
//! 匹配结果按距离升序排列，距离相同保持目录顺序；无匹配时返回空列表。

use std::sync::Arc;

use serde::Serialize;

use crate::catalog::{CatalogEntry, CatalogStore};
use crate::core::AgentError;

/// (insert, delete, substitute) 代价
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditWeights {
    pub insert: usize,
    pub delete: usize,
    pub substitute: usize,
}

impl EditWeights {
    pub const fn new(insert: usize, delete: usize, substitute: usize) -> Self {
        Self {
            insert,
            delete,
            substitute,
        }
    }
}

pub const WEIGHT_SCHEMES: [EditWeights; 3] = [
    EditWeights::new(0, 1, 1),
    EditWeights::new(1, 0, 1),
    EditWeights::new(1, 1, 1),
];

/// 将 source 变换为 target 的最小加权编辑代价（按字符）
pub fn weighted_distance(source: &str, target: &str, w: EditWeights) -> usize {
    let a: Vec<char> = source.chars().collect();
    let b: Vec<char> = target.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).map(|j| j * w.insert).collect();
    let mut cur = vec![0usize; b.len() + 1];
    for i in 1..=a.len() {
        cur[0] = i * w.delete;
        for j in 1..=b.len() {
            let sub = if a[i - 1] == b[j - 1] { 0 } else { w.substitute };
            cur[j] = (prev[j] + w.delete)
                .min(cur[j - 1] + w.insert)
                .min(prev[j - 1] + sub);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// 三种方案下的最小距离（均转小写）
pub fn fuzzy_distance(query: &str, field: &str) -> usize {
    let q = query.to_lowercase();
    let f = field.to_lowercase();
    WEIGHT_SCHEMES
        .iter()
        .map(|w| weighted_distance(&q, &f, *w))
        .min()
        .unwrap_or(usize::MAX)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedMatch {
    #[serde(flatten)]
    pub entry: CatalogEntry,
    pub edit_distance: usize,
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// 在给定条目上做匹配与排序（纯函数）
pub fn rank_matches(
    entries: Vec<CatalogEntry>,
    name_query: Option<&str>,
    group_query: Option<&str>,
    max_distance: usize,
) -> Result<Vec<ResolvedMatch>, AgentError> {
    let name_query = non_empty(name_query);
    let group_query = non_empty(group_query);
    if name_query.is_none() && group_query.is_none() {
        return Err(AgentError::InvalidInput(
            "at least one of food_name / restaurant_name is required".to_string(),
        ));
    }

    let mut matches: Vec<ResolvedMatch> = entries
        .into_iter()
        .filter_map(|entry| {
            let name_d = name_query.map(|q| fuzzy_distance(q, &entry.name));
            let group_d = group_query.map(|q| fuzzy_distance(q, &entry.source_name));
            let distance = match (name_d, group_d) {
                (Some(n), Some(g)) if n <= max_distance && g <= max_distance => n.min(g),
                (Some(n), None) if n <= max_distance => n,
                (None, Some(g)) if g <= max_distance => g,
                _ => return None,
            };
            Some(ResolvedMatch {
                entry,
                edit_distance: distance,
            })
        })
        .collect();
    // sort_by_key 是稳定排序：同距离保持目录顺序
    matches.sort_by_key(|m| m.edit_distance);
    Ok(matches)
}

/// 实体解析器：每次调用整表读取后在内存中匹配
pub struct EntityResolver {
    store: Arc<dyn CatalogStore>,
    max_distance: usize,
}

impl EntityResolver {
    pub fn new(store: Arc<dyn CatalogStore>, max_distance: usize) -> Self {
        Self { store, max_distance }
    }

    pub async fn resolve_ranked(
        &self,
        name_query: Option<&str>,
        group_query: Option<&str>,
    ) -> Result<Vec<ResolvedMatch>, AgentError> {
        if non_empty(name_query).is_none() && non_empty(group_query).is_none() {
            return rank_matches(Vec::new(), None, None, self.max_distance);
        }
        let entries = self.store.fetch_all().await?;
        let matches = rank_matches(entries, name_query, group_query, self.max_distance)?;
        tracing::debug!(
            name = ?name_query,
            group = ?group_query,
            hits = matches.len(),
            "entity resolve"
        );
        Ok(matches)
    }

    pub async fn resolve(
        &self,
        name_query: Option<&str>,
        group_query: Option<&str>,
    ) -> Result<Vec<CatalogEntry>, AgentError> {
        Ok(self
            .resolve_ranked(name_query, group_query)
            .await?
            .into_iter()
            .map(|m| m.entry)
            .collect())
    }
}
