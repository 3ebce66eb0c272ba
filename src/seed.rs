//! 从 JSON 种子文件装载 guideline、连接、工具关联与术语（供 REPL 使用）
//!
//! 文件内用 key 引用 guideline，连接与关联在装载时解析为真实 id。

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::engine::EngineStores;
use crate::guidelines::ConnectionKind;
use crate::tools::ToolId;

#[derive(Debug, Clone, Deserialize)]
pub struct GuidelineSeed {
    pub key: String,
    pub condition: String,
    pub action: String,
    /// "service:tool"
    #[serde(default)]
    pub tools: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionSeed {
    pub source: String,
    pub target: String,
    pub kind: ConnectionKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TermSeed {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub guidelines: Vec<GuidelineSeed>,
    #[serde(default)]
    pub connections: Vec<ConnectionSeed>,
    #[serde(default)]
    pub terms: Vec<TermSeed>,
}

/// 装载结果计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub guidelines: usize,
    pub connections: usize,
    pub tool_associations: usize,
    pub terms: usize,
}

pub fn read_seed_file(path: &Path) -> anyhow::Result<SeedFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid seed file {}", path.display()))
}

pub async fn apply_seed(
    stores: &EngineStores,
    agent_id: &str,
    seed: &SeedFile,
) -> anyhow::Result<SeedSummary> {
    let mut summary = SeedSummary::default();
    let mut ids: HashMap<&str, String> = HashMap::new();

    for g in &seed.guidelines {
        let guideline = stores
            .guidelines
            .create_guideline(agent_id, &g.condition, &g.action)
            .await?;
        summary.guidelines += 1;

        for tool in &g.tools {
            let tool_id = ToolId::parse(tool)
                .with_context(|| format!("Invalid tool id '{}' on guideline '{}'", tool, g.key))?;
            stores
                .tool_associations
                .create_association(&guideline.id, tool_id)
                .await?;
            summary.tool_associations += 1;
        }
        ids.insert(g.key.as_str(), guideline.id);
    }

    for c in &seed.connections {
        let source = ids
            .get(c.source.as_str())
            .with_context(|| format!("Unknown guideline key '{}'", c.source))?;
        let target = ids
            .get(c.target.as_str())
            .with_context(|| format!("Unknown guideline key '{}'", c.target))?;
        stores
            .connections
            .create_connection(source, target, c.kind)
            .await?;
        summary.connections += 1;
    }

    for t in &seed.terms {
        stores
            .glossary
            .create_term(agent_id, &t.name, &t.description, t.synonyms.clone())
            .await?;
        summary.terms += 1;
    }

    tracing::info!(
        guidelines = summary.guidelines,
        connections = summary.connections,
        tool_associations = summary.tool_associations,
        terms = summary.terms,
        "seed loaded"
    );
    Ok(summary)
}
