//! File classification and context packing

pub mod budget;
pub mod classify;

pub use budget::{build_previews, pack, pack_context, PackedContext};
pub use classify::{classify, language_for, FileCategory};
