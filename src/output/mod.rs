//! Structured stage outputs

pub mod schema;

pub use schema::{
    AuditSections, ModuleInfo, Priority, ProjectMap, RefactorTarget, SafetyStatus,
    SecurityFindings, SentinelVerdict, StackSummary, TechnicalAudit, Validate,
};
