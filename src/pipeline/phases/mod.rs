// Model-backed pipeline stages
//
// Each stage is a free `execute` function with its own prompt builder. Stages never
// talk to a model directly; every call goes through the ModelCallExecutor so fallback,
// validation and attempt logging are uniform.

#[path = "01_sentinel.rs"]
pub mod sentinel;
#[path = "02_map.rs"]
pub mod map;
#[path = "03_analyze.rs"]
pub mod analyze;
#[path = "04_documents.rs"]
pub mod documents;
