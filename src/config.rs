//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CONCIERGE__*` 覆盖（双下划线表示嵌套，如 `CONCIERGE__ENGINE__COMPACTION_THRESHOLD=24`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub resolver: ResolverSection,
}

/// [app] 段：应用名、数据目录
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 数据目录（SQLite 文件默认放在此处）
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

/// [llm] 段：后端选择、超时与重试
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / mock；为空时有 OPENAI_API_KEY 则 openai，否则 mock
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 单次补全请求超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 超时 / 不可用时的最大重试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 首次重试等待（毫秒），之后按 2 倍递增
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: None,
            model: default_model(),
            base_url: None,
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_ms() -> u64 {
    500
}

/// [engine] 段：编排器的各类上限
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// 对话条数超过此值时做滚动摘要
    #[serde(default = "default_compaction_threshold")]
    pub compaction_threshold: usize,
    /// 摘要后原样保留的最近条数
    #[serde(default = "default_compaction_keep")]
    pub compaction_keep: usize,
    /// 反思修订的最大轮数
    #[serde(default = "default_max_reflection_iterations")]
    pub max_reflection_iterations: u32,
    /// 仅工具助手未给出工具调用时的纠正次数
    #[serde(default = "default_max_reprompts")]
    pub max_reprompts: usize,
    /// 单轮内工具参数 / 工具名校验失败的容忍次数
    #[serde(default = "default_max_validation_attempts")]
    pub max_validation_attempts: usize,
    /// 单轮内最多调用补全端口的次数，防止死循环
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            compaction_threshold: default_compaction_threshold(),
            compaction_keep: default_compaction_keep(),
            max_reflection_iterations: default_max_reflection_iterations(),
            max_reprompts: default_max_reprompts(),
            max_validation_attempts: default_max_validation_attempts(),
            max_steps: default_max_steps(),
        }
    }
}

fn default_compaction_threshold() -> usize {
    18
}

fn default_compaction_keep() -> usize {
    3
}

fn default_max_reflection_iterations() -> u32 {
    2
}

fn default_max_reprompts() -> usize {
    3
}

fn default_max_validation_attempts() -> usize {
    3
}

fn default_max_steps() -> usize {
    24
}

/// [tools] 段：工具超时与 Web 搜索
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub web_search: WebSearchSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            web_search: WebSearchSection::default(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// [tools.web_search] 段：Tavily 兼容的搜索端点（需 TAVILY_API_KEY）
#[derive(Debug, Clone, Deserialize)]
pub struct WebSearchSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_web_search_url")]
    pub api_url: String,
    #[serde(default = "default_web_max_results")]
    pub max_results: usize,
    #[serde(default = "default_web_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_web_max_result_chars")]
    pub max_result_chars: usize,
}

impl Default for WebSearchSection {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: default_web_search_url(),
            max_results: default_web_max_results(),
            timeout_secs: default_web_timeout_secs(),
            max_result_chars: default_web_max_result_chars(),
        }
    }
}

fn default_web_search_url() -> String {
    "https://api.tavily.com/search".to_string()
}

fn default_web_max_results() -> usize {
    3
}

fn default_web_timeout_secs() -> u64 {
    15
}

fn default_web_max_result_chars() -> usize {
    4000
}

/// [store] 段：SQLite 文件路径；未设置时使用内存实现（带示例数据）
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StoreSection {
    /// 目录 / 订单 / 文档共用的数据库
    pub catalog_db: Option<PathBuf>,
    /// 会话检查点数据库
    pub checkpoint_db: Option<PathBuf>,
}

/// [resolver] 段：模糊匹配与文档检索阈值
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverSection {
    #[serde(default = "default_max_distance")]
    pub max_distance: usize,
    #[serde(default = "default_doc_min_score")]
    pub doc_min_score: f64,
    #[serde(default = "default_doc_limit")]
    pub doc_limit: usize,
}

impl Default for ResolverSection {
    fn default() -> Self {
        Self {
            max_distance: default_max_distance(),
            doc_min_score: default_doc_min_score(),
            doc_limit: default_doc_limit(),
        }
    }
}

fn default_max_distance() -> usize {
    1
}

fn default_doc_min_score() -> f64 {
    0.6
}

fn default_doc_limit() -> usize {
    2
}

/// 从 config 目录加载配置，环境变量 CONCIERGE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CONCIERGE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        if std::path::Path::new(&format!("{}.toml", name)).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CONCIERGE")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
