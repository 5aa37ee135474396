//! Incremental rich-text layout and editing engine for the JustWrite novel
//! editor.
//!
//! The document is a list of paragraph blocks tiling one char buffer; block
//! separators are virtual and only become `\n` at the serialization
//! boundary. Layout is lazy: edits adjust offsets and mark a per-block dirty
//! watermark, and [`engine::TextViewEngine::render`] re-wraps only what
//! changed. On top of the engine, [`context::VisualEditContext`] adds the
//! cursor/selection/viewport state a widget needs, [`editor::DocumentEditor`]
//! adds edit policy (history, input restriction, IME commit), and
//! [`shared::SharedEditContext`] shares a context across threads.

pub mod buffer;
pub mod context;
pub mod editor;
pub mod engine;
pub mod history;
pub mod metrics;
pub mod restrict;
pub mod shared;

pub use buffer::CharBuffer;
pub use context::{RenderData, Selection, TextLoc, VisualEditContext};
pub use editor::DocumentEditor;
pub use engine::{CursorPos, MoveHint, TextBlock, TextLine, TextViewEngine};
pub use history::{EditHistory, EditOp, EditRecord};
pub use metrics::{FontMetrics, LayoutConfig, MonospaceMetrics};
pub use restrict::{CjkSpacingRule, TextRestrictRule};
pub use shared::SharedEditContext;
