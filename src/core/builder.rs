//! 引擎构建器：由 AppConfig 统一组装补全端口、数据存储、工具、助手与编排器

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::agents::AgentRegistry;
use crate::catalog::{
    seed, CatalogStore, DocumentRetriever, DocumentStore, EntityResolver, InMemoryCatalog, InMemoryDocuments,
    InMemoryOrderStore, OrderStore, SqliteCatalog, SqliteDb, SqliteDocuments, SqliteOrderStore,
};
use crate::config::AppConfig;
use crate::core::{AgentError, Orchestrator};
use crate::dialog::{DialogRouter, EngineEvent, RouterLimits};
use crate::llm::{CompletionPort, EchoPort, OpenAiPort, RetryConfig, RetryingPort};
use crate::memory::{Compactor, InMemoryCheckpoint, SessionCheckpoint, SqliteCheckpoint};
use crate::tools::{
    AvailableFoodSearchTool, CancelOrderTool, CheckOrderStatusTool, CommentOrderTool, RetrieveFromDocTool,
    ToolExecutor, ToolRegistry, WebSearchTool,
};

/// 根据配置与环境变量选择补全后端（OpenAI 兼容 / Echo），外层包重试
pub fn create_port_from_config(cfg: &AppConfig) -> Arc<dyn CompletionPort> {
    let provider = cfg.llm.provider.as_deref().unwrap_or("").to_lowercase();
    let has_key = std::env::var("OPENAI_API_KEY").map(|k| !k.is_empty()).unwrap_or(false);
    let use_openai = provider == "openai" || (provider.is_empty() && has_key);

    let inner: Arc<dyn CompletionPort> = if use_openai {
        tracing::info!("Using OpenAI-compatible completion port ({})", cfg.llm.model);
        Arc::new(OpenAiPort::new(cfg.llm.base_url.as_deref(), &cfg.llm.model, None))
    } else {
        tracing::warn!("No API key set or provider is mock, using Echo completion port");
        Arc::new(EchoPort)
    };
    Arc::new(RetryingPort::new(inner, RetryConfig::from_llm_section(&cfg.llm)))
}

pub struct EngineBuilder {
    config: AppConfig,
    port: Option<Arc<dyn CompletionPort>>,
    checkpoint: Option<Arc<dyn SessionCheckpoint>>,
    event_tx: Option<UnboundedSender<EngineEvent>>,
}

impl EngineBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            port: None,
            checkpoint: None,
            event_tx: None,
        }
    }

    /// 指定补全端口（原样使用，不再包重试）
    pub fn with_port(mut self, port: Arc<dyn CompletionPort>) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_checkpoint(mut self, checkpoint: Arc<dyn SessionCheckpoint>) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<EngineEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// 注册全部工具；catalog_db 未配置时使用内存示例数据
    pub fn build_tools(&self) -> Result<ToolRegistry, AgentError> {
        let cfg = &self.config;
        let (catalog, orders, documents): (Arc<dyn CatalogStore>, Arc<dyn OrderStore>, Arc<dyn DocumentStore>) =
            match &cfg.store.catalog_db {
                Some(path) => {
                    let db = Arc::new(SqliteDb::open(path)?);
                    tracing::info!("Catalog database: {}", path.display());
                    (
                        Arc::new(SqliteCatalog::new(db.clone())),
                        Arc::new(SqliteOrderStore::new(db.clone())),
                        Arc::new(SqliteDocuments::new(db)),
                    )
                }
                None => (
                    Arc::new(InMemoryCatalog::new(seed::foods())),
                    Arc::new(InMemoryOrderStore::new(seed::orders())),
                    Arc::new(InMemoryDocuments::new(seed::documents())),
                ),
            };

        let resolver = Arc::new(EntityResolver::new(catalog, cfg.resolver.max_distance));
        let retriever = Arc::new(DocumentRetriever::new(
            documents,
            cfg.resolver.doc_min_score,
            cfg.resolver.doc_limit,
        ));

        let mut tools = ToolRegistry::new();
        tools.register(AvailableFoodSearchTool::new(resolver));
        tools.register(CheckOrderStatusTool::new(orders.clone()));
        tools.register(CommentOrderTool::new(orders.clone()));
        tools.register(CancelOrderTool::new(orders));
        tools.register(RetrieveFromDocTool::new(retriever));
        if cfg.tools.web_search.enabled {
            match WebSearchTool::from_env(&cfg.tools.web_search) {
                Some(web) => tools.register(web),
                None => tracing::warn!("web_search enabled but TAVILY_API_KEY is not set; skipping"),
            }
        }
        tracing::info!(tools = ?tools.tool_names(), "tools registered");
        Ok(tools)
    }

    pub fn build(self) -> Result<Orchestrator, AgentError> {
        let tools = self.build_tools()?;
        let agents = Arc::new(AgentRegistry::standard(&tools)?);
        let cfg = &self.config;

        let port = self
            .port
            .clone()
            .unwrap_or_else(|| create_port_from_config(cfg));
        let executor = Arc::new(ToolExecutor::new(cfg.tools.tool_timeout_secs));
        let compactor = Compactor::new(
            port.clone(),
            cfg.engine.compaction_threshold,
            cfg.engine.compaction_keep,
        );

        let mut router = DialogRouter::new(agents, port, executor, compactor, RouterLimits::from(&cfg.engine));
        if let Some(tx) = self.event_tx.clone() {
            router = router.with_event_tx(tx);
        }

        let checkpoint: Arc<dyn SessionCheckpoint> = match (&self.checkpoint, &cfg.store.checkpoint_db) {
            (Some(cp), _) => cp.clone(),
            (None, Some(path)) => {
                tracing::info!("Session checkpoints: {}", path.display());
                Arc::new(SqliteCheckpoint::open(path)?)
            }
            (None, None) => Arc::new(InMemoryCheckpoint::new()),
        };

        Ok(Orchestrator::new(router, checkpoint))
    }
}
