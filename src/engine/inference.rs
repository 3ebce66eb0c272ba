//! 连接图推理与工具关联划分
//!
//! 对每个激活的 proposition 沿一跳出边推出被连接的 guideline：Entails 沿用源分数，Suggests 取一半。
//! 已激活的目标跳过；同一目标被多个源推出时保留源分数更高者，分数相同时 Entails 优先，
//! 仍相同时保留最先遇到的。

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::core::EngineError;
use crate::engine::GuidelineProposition;
use crate::guidelines::{
    ConnectionKind, ConnectionQuery, Guideline, GuidelineConnection, GuidelineConnectionStore,
    GuidelineToolAssociation,
};
use crate::tools::ToolId;

/// 某个目标 guideline 当前胜出的推理来源
#[derive(Debug, Clone)]
struct Association<'a> {
    source: &'a GuidelineProposition,
    kind: ConnectionKind,
}

impl Association<'_> {
    fn beats(&self, other: &Association<'_>) -> bool {
        if self.source.score != other.source.score {
            return self.source.score > other.source.score;
        }
        self.kind == ConnectionKind::Entails && other.kind == ConnectionKind::Suggests
    }
}

/// 纯函数部分：edges 为 (源 proposition 下标, 出边)
pub fn resolve_connections(
    active: &[GuidelineProposition],
    edges: &[(usize, GuidelineConnection)],
    guidelines: &[Guideline],
) -> Vec<GuidelineProposition> {
    let active_ids: HashSet<&str> = active.iter().map(|p| p.guideline.id.as_str()).collect();
    let by_id: HashMap<&str, &Guideline> = guidelines.iter().map(|g| (g.id.as_str(), g)).collect();

    let mut order: Vec<&str> = Vec::new();
    let mut winners: HashMap<&str, Association<'_>> = HashMap::new();

    for (source_index, connection) in edges {
        let Some(source) = active.get(*source_index) else {
            continue;
        };
        let target = connection.target.as_str();
        if active_ids.contains(target) {
            continue;
        }
        let candidate = Association {
            source,
            kind: connection.kind,
        };
        let replace = match winners.get(target) {
            Some(current) => candidate.beats(current),
            None => {
                order.push(target);
                true
            }
        };
        if replace {
            winners.insert(target, candidate);
        }
    }

    order
        .into_iter()
        .filter_map(|target| {
            let association = winners.get(target)?;
            let Some(guideline) = by_id.get(target) else {
                tracing::warn!(guideline_id = %target, "connected guideline not in set; skipping");
                return None;
            };
            let kind = match association.kind {
                ConnectionKind::Entails => "entailed",
                ConnectionKind::Suggests => "suggested",
            };
            Some(GuidelineProposition {
                guideline: (*guideline).clone(),
                score: association.kind.inferred_score(association.source.score),
                rationale: format!(
                    "Automatically inferred from context: {} by \"When {}, then {}\"",
                    kind, association.source.guideline.condition, association.source.guideline.action
                ),
            })
        })
        .collect()
}

/// 读取一跳出边并解析冲突
pub async fn infer_connected_propositions(
    connections: &dyn GuidelineConnectionStore,
    guidelines: &[Guideline],
    active: &[GuidelineProposition],
) -> Result<Vec<GuidelineProposition>, EngineError> {
    let mut edges = Vec::new();
    for (i, proposition) in active.iter().enumerate() {
        let outgoing = connections
            .list_connections(ConnectionQuery::Source(proposition.guideline.id.clone()), false)
            .await?;
        edges.extend(outgoing.into_iter().map(|c| (i, c)));
    }
    Ok(resolve_connections(active, &edges, guidelines))
}

/// 按是否关联工具划分 proposition
#[derive(Debug, Clone, Default)]
pub struct PartitionedPropositions {
    pub ordinary: Vec<GuidelineProposition>,
    pub tool_enabled: Vec<(GuidelineProposition, Vec<ToolId>)>,
}

impl PartitionedPropositions {
    pub fn is_empty(&self) -> bool {
        self.ordinary.is_empty() && self.tool_enabled.is_empty()
    }

    pub fn all(&self) -> impl Iterator<Item = &GuidelineProposition> {
        self.ordinary
            .iter()
            .chain(self.tool_enabled.iter().map(|(p, _)| p))
    }

    /// 候选工具 -> 启用它的 proposition（按 ToolId 排序）
    pub fn candidate_tools(&self) -> BTreeMap<ToolId, Vec<&GuidelineProposition>> {
        let mut tools: BTreeMap<ToolId, Vec<&GuidelineProposition>> = BTreeMap::new();
        for (proposition, tool_ids) in &self.tool_enabled {
            for tool_id in tool_ids {
                tools.entry(tool_id.clone()).or_default().push(proposition);
            }
        }
        tools
    }
}

pub fn partition_by_tool_association(
    propositions: Vec<GuidelineProposition>,
    associations: &[GuidelineToolAssociation],
) -> PartitionedPropositions {
    let mut partitioned = PartitionedPropositions::default();
    for proposition in propositions {
        let tools: Vec<ToolId> = associations
            .iter()
            .filter(|a| a.guideline_id == proposition.guideline.id)
            .map(|a| a.tool_id.clone())
            .collect();
        if tools.is_empty() {
            partitioned.ordinary.push(proposition);
        } else {
            partitioned.tool_enabled.push((proposition, tools));
        }
    }
    partitioned
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn guideline(id: &str) -> Guideline {
        Guideline {
            id: id.to_string(),
            condition: format!("cond {}", id),
            action: format!("act {}", id),
            creation_utc: Utc::now(),
        }
    }

    fn proposition(id: &str, score: u8) -> GuidelineProposition {
        GuidelineProposition {
            guideline: guideline(id),
            score,
            rationale: String::new(),
        }
    }

    fn edge(source: &str, target: &str, kind: ConnectionKind) -> GuidelineConnection {
        GuidelineConnection {
            id: format!("{}->{}", source, target),
            source: source.to_string(),
            target: target.to_string(),
            kind,
            creation_utc: Utc::now(),
        }
    }

    #[test]
    fn test_higher_source_wins() {
        let active = vec![proposition("a", 9), proposition("b", 4)];
        let edges = vec![
            (1, edge("b", "g", ConnectionKind::Suggests)),
            (0, edge("a", "g", ConnectionKind::Entails)),
        ];
        let inferred = resolve_connections(&active, &edges, &[guideline("g")]);
        assert_eq!(inferred.len(), 1);
        assert_eq!(inferred[0].score, 9);
        assert!(inferred[0].rationale.contains("cond a"));
    }

    #[test]
    fn test_tie_prefers_entails() {
        let active = vec![proposition("a", 8), proposition("b", 8)];
        let edges = vec![
            (0, edge("a", "g", ConnectionKind::Suggests)),
            (1, edge("b", "g", ConnectionKind::Entails)),
        ];
        let inferred = resolve_connections(&active, &edges, &[guideline("g")]);
        assert_eq!(inferred[0].score, 8);
        assert!(inferred[0].rationale.contains("cond b"));
    }

    #[test]
    fn test_full_tie_keeps_first() {
        let active = vec![proposition("a", 8), proposition("b", 8)];
        let edges = vec![
            (0, edge("a", "g", ConnectionKind::Suggests)),
            (1, edge("b", "g", ConnectionKind::Suggests)),
        ];
        let inferred = resolve_connections(&active, &edges, &[guideline("g")]);
        assert_eq!(inferred[0].score, 4);
        assert!(inferred[0].rationale.contains("cond a"));
    }

    #[test]
    fn test_active_targets_skipped() {
        let active = vec![proposition("a", 9), proposition("g", 7)];
        let edges = vec![(0, edge("a", "g", ConnectionKind::Entails))];
        assert!(resolve_connections(&active, &edges, &[guideline("g")]).is_empty());
    }

    #[test]
    fn test_partition() {
        let association = GuidelineToolAssociation {
            id: "x".into(),
            guideline_id: "a".into(),
            tool_id: ToolId::new("local", "echo"),
            creation_utc: Utc::now(),
        };
        let partitioned = partition_by_tool_association(
            vec![proposition("a", 9), proposition("b", 8)],
            &[association],
        );
        assert_eq!(partitioned.ordinary.len(), 1);
        assert_eq!(partitioned.tool_enabled.len(), 1);
        assert_eq!(partitioned.candidate_tools().len(), 1);
        assert_eq!(partitioned.all().count(), 2);
    }
}
