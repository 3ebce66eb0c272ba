//! Tenet - Rust 规则驱动对话引擎
//!
//! 模块划分：
//! - **agents**: Agent 定义与存储
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **context_variables**: 按终端用户存储的上下文变量
//! - **core**: 错误类型、后台任务服务（派发 / 取代 / 回收）、应用门面、优雅关闭
//! - **engine**: guideline 评估与连接推理、工具调用循环、回复生成
//! - **glossary**: 领域术语
//! - **guidelines**: guideline、连接图、工具关联
//! - **llm**: 后端抽象（OpenAI 兼容 / Mock）与结构化生成
//! - **observability**: 日志初始化
//! - **seed**: JSON 种子装载
//! - **sessions**: 会话、事件日志、inspection、监听
//! - **tools**: 工具服务、注册表与执行器

pub mod agents;
pub mod config;
pub mod context_variables;
pub mod core;
pub mod engine;
pub mod glossary;
pub mod guidelines;
pub mod llm;
pub mod observability;
pub mod seed;
pub mod sessions;
pub mod tools;
