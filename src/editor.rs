//! Document editor: edit policy on top of the visual context.
//!
//! This layer decides what an edit *means* — selection replacement,
//! restriction rewriting, history capture, undo/redo replay, IME commit —
//! and drives the context, which only knows how to move chars around.

use crate::context::VisualEditContext;
use crate::history::{EditHistory, EditOp, EditRecord};
use crate::metrics::{FontMetrics, LayoutConfig};
use crate::restrict::TextRestrictRule;
use std::sync::Arc;

pub struct DocumentEditor {
    context: VisualEditContext,
    history: EditHistory,
    rule: Option<Box<dyn TextRestrictRule>>,
}

impl DocumentEditor {
    pub fn new(
        metrics: Arc<dyn FontMetrics>,
        config: LayoutConfig,
        viewport_width: f64,
        viewport_height: f64,
    ) -> Self {
        Self {
            context: VisualEditContext::new(metrics, config, viewport_width, viewport_height),
            history: EditHistory::new(),
            rule: None,
        }
    }

    /// Install an input restriction rule applied to non-batch insertions.
    pub fn with_restrict_rule(mut self, rule: Box<dyn TextRestrictRule>) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn context(&self) -> &VisualEditContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut VisualEditContext {
        &mut self.context
    }

    pub fn history(&self) -> &EditHistory {
        &self.history
    }

    // -- document ----------------------------------------------------------

    pub fn text(&self) -> String {
        self.context.text()
    }

    /// Replace the document and start a fresh history.
    pub fn reset(&mut self, text: &str) {
        self.context.reset(text);
        self.history.clear();
    }

    /// Take the document out, leaving an empty one with no history.
    pub fn take(&mut self) -> String {
        let out = self.context.take();
        self.history.clear();
        out
    }

    // -- editing -----------------------------------------------------------

    /// Insert `text` at the cursor, replacing the selection if one exists.
    ///
    /// Non-batch insertions (keystrokes, IME commits) run through the
    /// restriction rule with the surrounding block text as context. Batch
    /// insertions (paste, undo replay) skip the rule, may span paragraphs
    /// via `\n`, and land as a single history record.
    pub fn insert(&mut self, text: &str, batch: bool) {
        self.context.commit_preedit();
        self.drop_selection_into_history();

        let adjusted = match (&self.rule, batch) {
            (Some(rule), false) => {
                let (left, right) = self.restrict_context();
                rule.restrict(text, &left, &right)
            }
            _ => text.to_owned(),
        };
        if adjusted.is_empty() {
            return;
        }
        let Some(loc) = self.context.current_textloc() else {
            return;
        };
        self.raw_insert(&adjusted);
        self.history.push(EditRecord {
            op: EditOp::Insert,
            loc,
            text: adjusted,
        });
    }

    /// Start a new paragraph at the cursor, replacing the selection.
    pub fn split_paragraph(&mut self) {
        self.insert("\n", true);
    }

    /// Delete `|times|` units in the direction of the sign, or the
    /// selection if one exists.
    pub fn delete(&mut self, times: isize) {
        self.context.quit_preedit();
        let removed = if self.context.has_sel() {
            self.context.remove_sel_region()
        } else {
            self.context.del(times, false)
        };
        if removed.is_empty() {
            return;
        }
        let Some(loc) = self.context.current_textloc() else {
            return;
        };
        self.history.push(EditRecord {
            op: EditOp::Delete,
            loc,
            text: removed,
        });
    }

    pub fn undo(&mut self) {
        if let Some(record) = self.history.undo() {
            tracing::debug!(op = ?record.op, len = record.text.len(), "undo");
            self.apply(record);
        }
    }

    pub fn redo(&mut self) {
        if let Some(record) = self.history.redo() {
            tracing::debug!(op = ?record.op, len = record.text.len(), "redo");
            self.apply(record);
        }
    }

    /// Replay a history record against the document. Records are applied in
    /// stack order, so the block index and offset they carry are valid when
    /// they come up.
    fn apply(&mut self, record: EditRecord) {
        self.context.quit_preedit();
        self.context.unset_sel();
        self.context
            .set_cursor_to_block_pos(record.loc.block_index, record.loc.pos);
        match record.op {
            EditOp::Insert => self.raw_insert(&record.text),
            // each `\n` in the capture is one soft deletion unit
            EditOp::Delete => {
                self.context.del(record.text.chars().count() as isize, false);
            }
        }
    }

    // -- clipboard ---------------------------------------------------------

    pub fn copy(&self) -> String {
        self.context.selected_text()
    }

    pub fn cut(&mut self) -> String {
        if !self.context.has_sel() {
            return String::new();
        }
        let removed = self.context.remove_sel_region();
        if !removed.is_empty() {
            if let Some(loc) = self.context.current_textloc() {
                self.history.push(EditRecord {
                    op: EditOp::Delete,
                    loc,
                    text: removed.clone(),
                });
            }
        }
        removed
    }

    pub fn select_all(&mut self) {
        let blocks = self.context.engine().blocks();
        let Some(last) = blocks.last() else {
            return;
        };
        let end = last.text_pos() + last.len();
        self.context.select(0, end);
    }

    // -- movement ----------------------------------------------------------

    /// Word-granularity move: to the current block's start/end, or across
    /// the separator when already there.
    pub fn move_by_word(&mut self, forward: bool, extend_sel: bool) {
        if !self.context.engine().is_cursor_available() {
            return;
        }
        let pos = self.context.engine().cursor.pos;
        let len = self.context.engine().current_block().len();
        let offset = if forward {
            if pos == len {
                1
            } else {
                (len - pos) as isize
            }
        } else if pos == 0 {
            -1
        } else {
            -(pos as isize)
        };
        self.context.move_cursor(offset, extend_sel);
    }

    // -- IME ----------------------------------------------------------------

    /// Enter composition. An active selection is deleted first (recorded).
    pub fn begin_preedit(&mut self) {
        self.drop_selection_into_history();
        self.context.begin_preedit();
    }

    pub fn update_preedit(&mut self, text: &str) {
        self.context.update_preedit(text);
    }

    /// Commit the composition as `text`, routed through the normal insert
    /// path (restriction rule included).
    pub fn commit_preedit(&mut self, text: &str) {
        self.context.commit_preedit();
        self.insert(text, false);
    }

    pub fn quit_preedit(&mut self) {
        self.context.quit_preedit();
    }

    // -- internals ----------------------------------------------------------

    fn drop_selection_into_history(&mut self) {
        if !self.context.has_sel() {
            return;
        }
        let removed = self.context.remove_sel_region();
        if removed.is_empty() {
            return;
        }
        if let Some(loc) = self.context.current_textloc() {
            self.history.push(EditRecord {
                op: EditOp::Delete,
                loc,
                text: removed,
            });
        }
    }

    fn raw_insert(&mut self, text: &str) {
        for (i, para) in text.split('\n').enumerate() {
            if i > 0 {
                self.context.split_block();
            }
            self.context.insert(para);
        }
    }

    fn restrict_context(&self) -> (String, String) {
        let engine = self.context.engine();
        let Some(index) = engine.active_block_index() else {
            return (String::new(), String::new());
        };
        let text = engine.block_text(index);
        let pos = engine.cursor.pos;
        (text[..pos].iter().collect(), text[pos..].iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MonospaceMetrics;
    use crate::restrict::CjkSpacingRule;

    fn test_editor() -> DocumentEditor {
        let metrics = Arc::new(MonospaceMetrics::new(8.0, 18.0));
        DocumentEditor::new(metrics, LayoutConfig::default(), 800.0, 600.0)
    }

    fn cjk_editor() -> DocumentEditor {
        test_editor().with_restrict_rule(Box::new(CjkSpacingRule))
    }

    #[test]
    fn test_insert_undo_redo() {
        let mut editor = test_editor();
        editor.insert("hello", false);
        editor.insert(" world", false);
        assert_eq!(editor.text(), "hello world");
        editor.undo();
        assert_eq!(editor.text(), "hello");
        editor.undo();
        assert_eq!(editor.text(), "");
        editor.redo();
        editor.redo();
        assert_eq!(editor.text(), "hello world");
    }

    #[test]
    fn test_undo_restores_cursor_to_edit_site() {
        let mut editor = test_editor();
        editor.insert("abcdef", false);
        editor.context_mut().move_to(3, false);
        editor.insert("XY", false);
        assert_eq!(editor.text(), "abcXYdef");
        editor.undo();
        assert_eq!(editor.text(), "abcdef");
        assert_eq!(editor.context().edit_cursor_pos(), 3);
    }

    #[test]
    fn test_batch_insert_is_one_record() {
        let mut editor = test_editor();
        editor.insert("one\ntwo\nthree", true);
        assert_eq!(editor.context().engine().block_count(), 3);
        assert_eq!(editor.text(), "one\ntwo\nthree");
        editor.undo();
        assert_eq!(editor.text(), "");
        assert_eq!(editor.context().engine().block_count(), 1);
        editor.redo();
        assert_eq!(editor.text(), "one\ntwo\nthree");
    }

    #[test]
    fn test_delete_backward_undo_reinserts() {
        let mut editor = test_editor();
        editor.reset("hello");
        editor.context_mut().move_to(5, false);
        editor.delete(-3);
        assert_eq!(editor.text(), "he");
        editor.undo();
        assert_eq!(editor.text(), "hello");
        editor.redo();
        assert_eq!(editor.text(), "he");
    }

    #[test]
    fn test_backspace_join_blocks_undo_restores_structure() {
        let mut editor = test_editor();
        editor.reset("foo\nbar");
        editor.context_mut().move_to(3, false);
        // hop across the separator into block 1, then backspace joins
        editor.context_mut().move_cursor(1, false);
        editor.delete(-1);
        assert_eq!(editor.text(), "foobar");
        assert_eq!(editor.context().engine().block_count(), 1);
        editor.undo();
        assert_eq!(editor.text(), "foo\nbar");
        assert_eq!(editor.context().engine().block_count(), 2);
    }

    #[test]
    fn test_insert_over_selection_records_both_edits() {
        let mut editor = test_editor();
        editor.reset("hello world");
        editor.context_mut().select(5, 11);
        editor.insert("!", false);
        assert_eq!(editor.text(), "hello!");
        editor.undo(); // un-insert
        assert_eq!(editor.text(), "hello");
        editor.undo(); // un-delete the selection
        assert_eq!(editor.text(), "hello world");
    }

    #[test]
    fn test_split_paragraph_undo() {
        let mut editor = test_editor();
        editor.reset("abcdef");
        editor.context_mut().move_to(3, false);
        editor.split_paragraph();
        assert_eq!(editor.text(), "abc\ndef");
        editor.undo();
        assert_eq!(editor.text(), "abcdef");
    }

    #[test]
    fn test_restriction_applied_to_keystrokes_only() {
        let mut editor = cjk_editor();
        editor.insert("hello", false);
        editor.insert("你好", false);
        assert_eq!(editor.text(), "hello 你好");
        // paste path skips the rule
        editor.insert("world", true);
        assert_eq!(editor.text(), "hello 你好world");
    }

    #[test]
    fn test_restriction_survives_undo() {
        let mut editor = cjk_editor();
        editor.insert("abc", false);
        editor.insert("你", false);
        assert_eq!(editor.text(), "abc 你");
        editor.undo();
        assert_eq!(editor.text(), "abc");
        editor.redo();
        assert_eq!(editor.text(), "abc 你");
    }

    #[test]
    fn test_copy_and_cut() {
        let mut editor = test_editor();
        editor.reset("abc\ndef");
        editor.context_mut().select(1, 5);
        assert_eq!(editor.copy(), "bc\nde");
        let removed = editor.cut();
        assert_eq!(removed, "bc\nde");
        assert_eq!(editor.text(), "af");
        editor.undo();
        assert_eq!(editor.text(), "abc\ndef");
    }

    #[test]
    fn test_select_all() {
        let mut editor = test_editor();
        editor.reset("ab\ncd");
        editor.select_all();
        assert_eq!(editor.copy(), "ab\ncd");
    }

    #[test]
    fn test_move_by_word_falls_back_to_block_bounds() {
        let mut editor = test_editor();
        editor.reset("abc\ndef");
        editor.context_mut().move_to(1, false);
        editor.move_by_word(false, false);
        assert_eq!(editor.context().edit_cursor_pos(), 0);
        editor.move_by_word(true, false);
        assert_eq!(editor.context().edit_cursor_pos(), 3);
        // at the block end, the next word-move crosses the separator
        editor.move_by_word(true, false);
        assert_eq!(editor.context().edit_cursor_pos(), 3);
        assert_eq!(editor.context().engine().active_block_index(), Some(1));
    }

    #[test]
    fn test_ime_commit_goes_through_restriction() {
        let mut editor = cjk_editor();
        editor.insert("hi", false);
        editor.begin_preedit();
        editor.update_preedit("ni");
        editor.update_preedit("你");
        // the composition never touched the document
        assert_eq!(editor.context().engine().buffer().to_string(), "hi");
        editor.commit_preedit("你");
        assert_eq!(editor.text(), "hi 你");
        editor.undo();
        assert_eq!(editor.text(), "hi");
    }

    #[test]
    fn test_reset_clears_history() {
        let mut editor = test_editor();
        editor.insert("abc", false);
        editor.reset("xyz");
        editor.undo();
        assert_eq!(editor.text(), "xyz");
    }

    #[test]
    fn test_take_returns_text_and_empties() {
        let mut editor = test_editor();
        editor.insert("one", false);
        editor.split_paragraph();
        editor.insert("two", false);
        assert_eq!(editor.take(), "one\ntwo");
        assert_eq!(editor.text(), "");
        editor.undo();
        assert_eq!(editor.text(), "");
    }
}
