//! Guideline 知识：规则、规则间连接、规则与工具的关联

pub mod connections;
pub mod store;
pub mod tool_associations;

pub use connections::{
    ConnectionKind, ConnectionQuery, GuidelineConnection, GuidelineConnectionStore,
    MemoryConnectionStore,
};
pub use store::{Guideline, GuidelineId, GuidelineStore, MemoryGuidelineStore};
pub use tool_associations::{
    GuidelineToolAssociation, GuidelineToolAssociationStore, MemoryToolAssociationStore,
};
