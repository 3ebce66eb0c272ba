//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TENET__*` 覆盖（双下划线表示嵌套，如 `TENET__ENGINE__MAX_ENGINE_ITERATIONS=5`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub engine: EngineSection,
    pub tools: ToolsSection,
    pub listener: ListenerSection,
    pub agent: AgentSection,
}

/// [app] 段
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// openai / mock；未配置 API Key 时退回 mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次后端请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [engine] 段：准备迭代上限、任务回收间隔、回复修订上限
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_max_engine_iterations")]
    pub max_engine_iterations: usize,
    #[serde(default = "default_gc_interval_ms")]
    pub gc_interval_ms: u64,
    #[serde(default = "default_message_max_revisions")]
    pub message_max_revisions: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_engine_iterations: default_max_engine_iterations(),
            gc_interval_ms: default_gc_interval_ms(),
            message_max_revisions: default_message_max_revisions(),
        }
    }
}

fn default_max_engine_iterations() -> usize {
    3
}

fn default_gc_interval_ms() -> u64 {
    5000
}

fn default_message_max_revisions() -> usize {
    5
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// [listener] 段：轮询间隔与默认等待时长
#[derive(Debug, Clone, Deserialize)]
pub struct ListenerSection {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_wait_timeout_secs")]
    pub default_timeout_secs: u64,
}

impl Default for ListenerSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            default_timeout_secs: default_wait_timeout_secs(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_wait_timeout_secs() -> u64 {
    60
}

/// [agent] 段：REPL 使用的 agent 与 guideline 种子文件
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_agent_name")]
    pub name: String,
    pub description: Option<String>,
    /// JSON 种子文件（guidelines / connections / tool associations / terms）
    pub guidelines_path: Option<PathBuf>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            description: None,
            guidelines_path: None,
        }
    }
}

fn default_agent_name() -> String {
    "Tenet".to_string()
}

/// 从 config 目录加载配置，环境变量 TENET__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 TENET__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if std::path::Path::new(&format!("{}.toml", name)).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path.filter(|p| p.exists()) {
        builder = builder.add_source(config::File::from(path).required(false));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TENET")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.engine.max_engine_iterations, 3);
        assert_eq!(config.engine.message_max_revisions, 5);
        assert_eq!(config.tools.tool_timeout_secs, 30);
        assert_eq!(config.listener.poll_interval_ms, 250);
    }

    #[test]
    fn test_explicit_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[engine]\nmax_engine_iterations = 7\n\n[agent]\nname = \"Support\"\n\n[llm.timeouts]\nrequest = 9"
        )
        .unwrap();

        let config = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.engine.max_engine_iterations, 7);
        assert_eq!(config.engine.gc_interval_ms, 5000);
        assert_eq!(config.agent.name, "Support");
        assert_eq!(config.llm.timeouts.request, 9);
    }
}
