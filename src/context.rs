//! Visual edit context: the stateful layer between input handling and the
//! layout engine.
//!
//! The context owns the engine plus everything a widget needs that the
//! engine deliberately does not track: the absolute edit cursor, the
//! selection, the viewport scroll position, the sticky column for vertical
//! movement and the per-frame render cache. All coordinates handed in or out
//! of hit-testing methods are viewport-relative pixels.

use crate::engine::{CursorPos, MoveHint, TextViewEngine};
use crate::metrics::{FontMetrics, LayoutConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A resolved document location: block index plus the block-relative char
/// offset and the (row, col) it maps to under the current wrap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextLoc {
    pub block_index: usize,
    pub pos: usize,
    pub row: usize,
    pub col: usize,
}

/// Selection as absolute buffer offsets. `from` is the anchor; `to` follows
/// the cursor and may precede the anchor. Never empty: a collapsed
/// selection is represented by absence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub from: usize,
    pub to: usize,
}

impl Selection {
    /// Endpoints in buffer order.
    pub fn sorted(&self) -> (usize, usize) {
        (self.from.min(self.to), self.from.max(self.to))
    }

    pub fn len(&self) -> usize {
        self.from.abs_diff(self.to)
    }

    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }
}

/// Per-frame layout summary consumed by the paint path.
#[derive(Debug, Clone, Default)]
pub struct RenderData {
    /// Document-relative top y of every block.
    pub block_y_pos: BTreeMap<usize, f64>,
    /// Total document height including inter-block spacing.
    pub text_height: f64,
    /// Inclusive range of blocks intersecting the viewport.
    pub visible_blocks: Option<(usize, usize)>,
    pub active_block_visible: bool,
    /// Selection endpoints clamped to the visible block range, resolved to
    /// locations; `None` when no selection intersects the viewport.
    pub visible_sel: Option<(TextLoc, TextLoc)>,
}

pub struct VisualEditContext {
    engine: TextViewEngine,

    /// Absolute buffer offset of the edit cursor; kept in lockstep with the
    /// engine's block-relative cursor.
    edit_cursor_pos: usize,
    sel: Option<Selection>,

    /// Sticky target x for a run of vertical moves; refreshed whenever a
    /// non-vertical command moves the cursor.
    vertical_move_ref: Option<f64>,
    cursor_moved: bool,

    viewport_width: f64,
    viewport_height: f64,
    viewport_y_pos: f64,

    render_data: RenderData,
    layout_cache_stale: bool,
    /// Inputs the visible-range summary was last computed from; an idle
    /// prepare with the same key skips the block walk.
    visible_range_key: Option<(f64, f64, Option<usize>, Option<Selection>)>,
}

impl VisualEditContext {
    pub fn new(
        metrics: Arc<dyn FontMetrics>,
        config: LayoutConfig,
        viewport_width: f64,
        viewport_height: f64,
    ) -> Self {
        let mut engine = TextViewEngine::new(metrics, config, viewport_width);
        engine.insert_block(0);
        engine.set_active_block_index(Some(0));
        Self {
            engine,
            edit_cursor_pos: 0,
            sel: None,
            vertical_move_ref: None,
            cursor_moved: false,
            viewport_width,
            viewport_height,
            viewport_y_pos: 0.0,
            render_data: RenderData::default(),
            layout_cache_stale: true,
            visible_range_key: None,
        }
    }

    pub fn engine(&self) -> &TextViewEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut TextViewEngine {
        &mut self.engine
    }

    /// Absolute buffer offset of the edit cursor.
    pub fn edit_cursor_pos(&self) -> usize {
        self.edit_cursor_pos
    }

    pub fn viewport_y_pos(&self) -> f64 {
        self.viewport_y_pos
    }

    pub fn viewport_width(&self) -> f64 {
        self.viewport_width
    }

    pub fn viewport_height(&self) -> f64 {
        self.viewport_height
    }

    // -- viewport ---------------------------------------------------------

    /// Resize the viewport. A width change reflows the whole document; a
    /// height increase invalidates the layout cache (shrinking keeps a
    /// superset of the visible range, which is harmless).
    pub fn resize_viewport(&mut self, width: f64, height: f64) {
        if width != self.viewport_width {
            self.engine.reset_max_width(width);
            self.layout_cache_stale = true;
        }
        if height > self.viewport_height {
            self.layout_cache_stale = true;
        }
        self.viewport_width = width;
        self.viewport_height = height;
    }

    /// Scroll the viewport to document y `y_pos`. Block y positions stay
    /// cached; only the visible range is refreshed on the next prepare.
    pub fn scroll_to(&mut self, y_pos: f64) {
        self.viewport_y_pos = y_pos.max(0.0);
    }

    /// Total document height. Forces a layout pass if one is pending.
    pub fn text_height(&mut self) -> f64 {
        self.prepare_render_data();
        self.render_data.text_height
    }

    /// Bring the layout up to date and refresh the render summary. A call
    /// with no edits, scroll, cursor or selection change since the last one
    /// returns the cached summary untouched.
    pub fn prepare_render_data(&mut self) -> &RenderData {
        if self.engine.is_dirty() {
            self.engine.render();
            self.layout_cache_stale = true;
        }
        let mut refresh = false;
        if self.layout_cache_stale {
            self.rebuild_layout_cache();
            self.layout_cache_stale = false;
            refresh = true;
        }
        let key = (
            self.viewport_y_pos,
            self.viewport_height,
            self.engine.active_block_index(),
            self.sel,
        );
        if refresh || self.visible_range_key != Some(key) {
            self.refresh_visible_range();
            self.visible_range_key = Some(key);
        }
        &self.render_data
    }

    fn rebuild_layout_cache(&mut self) {
        let stride = self.engine.line_stride();
        let spacing = self.engine.block_spacing();
        self.render_data.block_y_pos.clear();
        let mut y = 0.0;
        for (index, block) in self.engine.blocks().iter().enumerate() {
            self.render_data.block_y_pos.insert(index, y);
            y += block.line_count() as f64 * stride + spacing;
        }
        self.render_data.text_height = if self.engine.is_empty() {
            0.0
        } else {
            y - spacing
        };
    }

    fn refresh_visible_range(&mut self) {
        let stride = self.engine.line_stride();
        let mut first = None;
        let mut last = None;
        for (&index, &y) in &self.render_data.block_y_pos {
            let height = self.engine.block(index).line_count() as f64 * stride;
            let top = y - self.viewport_y_pos;
            if top + height <= 0.0 {
                continue;
            }
            if top >= self.viewport_height {
                break;
            }
            if first.is_none() {
                first = Some(index);
            }
            last = Some(index);
        }
        self.render_data.visible_blocks = first.zip(last);
        self.render_data.active_block_visible = match (self.engine.active_block_index(), first.zip(last)) {
            (Some(active), Some((lo, hi))) => (lo..=hi).contains(&active),
            _ => false,
        };
        self.render_data.visible_sel = self.clamp_sel_to_visible();
    }

    fn clamp_sel_to_visible(&self) -> Option<(TextLoc, TextLoc)> {
        let sel = self.sel?;
        let (first, last) = self.render_data.visible_blocks?;
        let (lo, hi) = sel.sorted();
        let vis_lo = self.engine.block(first).text_pos();
        let vis_hi = {
            let block = self.engine.block(last);
            block.text_pos() + block.len()
        };
        if hi <= vis_lo || lo >= vis_hi {
            return None;
        }
        let from = self.get_textloc_at_pos(lo.max(vis_lo), MoveHint::Forward)?;
        let to = self.get_textloc_at_pos(hi.min(vis_hi), MoveHint::Backward)?;
        Some((from, to))
    }

    // -- locations and hit testing ----------------------------------------

    /// Location of the edit cursor.
    pub fn current_textloc(&self) -> Option<TextLoc> {
        let block_index = self.engine.active_block_index()?;
        let cursor = self.engine.cursor;
        Some(TextLoc {
            block_index,
            pos: cursor.pos,
            row: cursor.row,
            col: cursor.col,
        })
    }

    /// Resolve an absolute buffer offset to a location. On an exact block or
    /// line boundary `Forward` leans into the following block/line,
    /// `Backward` stays at the end of the preceding one. Requires a clean
    /// layout.
    pub fn get_textloc_at_pos(&self, pos: usize, hint: MoveHint) -> Option<TextLoc> {
        assert!(!self.engine.is_dirty());
        let blocks = self.engine.blocks();
        let last = blocks.last()?;
        if pos > last.text_pos() + last.len() {
            return None;
        }
        let block_index = match hint {
            MoveHint::Backward => blocks.partition_point(|b| b.text_pos() + b.len() < pos),
            MoveHint::Forward => blocks
                .partition_point(|b| b.text_pos() + b.len() <= pos)
                .min(blocks.len() - 1),
        };
        let block = &blocks[block_index];
        let off = pos - block.text_pos();
        let mut row = (0..block.line_count()).find(|&i| block.line(i).end_offset() >= off)?;
        let mut col = off - block.offset_of_line(row);
        if hint == MoveHint::Forward
            && col == block.len_of_line(row)
            && row + 1 < block.line_count()
        {
            row += 1;
            col = 0;
        }
        Some(TextLoc {
            block_index,
            pos: off,
            row,
            col,
        })
    }

    /// Place the edit cursor at a block-relative offset, re-resolving
    /// row/col against the current wrap. Block index and offset stay valid
    /// across reflows when row/col from an old record do not.
    pub fn set_cursor_to_block_pos(&mut self, block_index: usize, pos: usize) {
        self.engine.render();
        let block = self.engine.block(block_index);
        debug_assert!(pos <= block.len());
        let row = (0..block.line_count())
            .find(|&i| block.line(i).end_offset() >= pos)
            .unwrap_or(0);
        let col = pos - block.offset_of_line(row);
        self.set_cursor_to_textloc(TextLoc {
            block_index,
            pos,
            row,
            col,
        });
    }

    /// Place the edit cursor at `loc` without touching the selection.
    pub fn set_cursor_to_textloc(&mut self, loc: TextLoc) {
        let block = self.engine.block(loc.block_index);
        self.edit_cursor_pos = block.text_pos() + loc.pos;
        self.engine.set_active_block_index(Some(loc.block_index));
        self.engine.cursor = CursorPos {
            pos: loc.pos,
            row: loc.row,
            col: loc.col,
        };
        self.cursor_moved = true;
    }

    /// Column under viewport x `x` on the given line, by the midpoint rule:
    /// a hit left of a glyph's horizontal midpoint resolves before it.
    /// First lines account for the paragraph indent, wrapped lines for
    /// their justification spacing.
    pub fn column_at_x(&self, block_index: usize, row: usize, x: f64) -> usize {
        let block = self.engine.block(block_index);
        let spacing = block.char_spacing_of_line(row);
        let text = self.engine.text_of_line(block_index, row);
        let mut left = if row == 0 { self.engine.indent_width() } else { 0.0 };
        for (col, &c) in text.iter().enumerate() {
            let advance = self.engine.metrics().advance(c);
            if x < left + advance / 2.0 {
                return col;
            }
            left += advance + spacing;
        }
        text.len()
    }

    /// Resolve a viewport-relative point to a location. With `clip` the
    /// point is clamped into the nearest line; without it, points outside
    /// any block's vertical band miss.
    pub fn get_textloc_at_rel_vpos(&mut self, x: f64, y: f64, clip: bool) -> Option<TextLoc> {
        self.prepare_render_data();
        let stride = self.engine.line_stride();
        let doc_y = y + self.viewport_y_pos;

        let mut hit = None;
        for (&index, &top) in &self.render_data.block_y_pos {
            let height = self.engine.block(index).line_count() as f64 * stride;
            if doc_y < top {
                break;
            }
            if doc_y < top + height {
                hit = Some((index, top, false));
                break;
            }
            // remember the nearest block above for clipping into gaps
            hit = Some((index, top, true));
        }

        // above the first block: clamp to the document start
        let (block_index, top, clipped) = match hit {
            Some(hit) => hit,
            None if clip && !self.engine.is_empty() => {
                let top = self.render_data.block_y_pos.get(&0).copied().unwrap_or(0.0);
                (0, top, false)
            }
            None => return None,
        };
        if clipped && !clip {
            return None;
        }
        let block = self.engine.block(block_index);
        let row = if clipped {
            block.line_count() - 1
        } else {
            (((doc_y - top) / stride) as usize).min(block.line_count() - 1)
        };
        let col = self.column_at_x(block_index, row, x);
        Some(TextLoc {
            block_index,
            pos: block.offset_of_line(row) + col,
            row,
            col,
        })
    }

    /// Viewport x of the cursor, including indent and justification
    /// spacing. Requires a clean layout.
    fn cursor_x(&self) -> f64 {
        let Some(block_index) = self.engine.active_block_index() else {
            return 0.0;
        };
        let cursor = self.engine.cursor;
        let block = self.engine.block(block_index);
        let spacing = block.char_spacing_of_line(cursor.row);
        let text = self.engine.text_of_line(block_index, cursor.row);
        let mut x = if cursor.row == 0 { self.engine.indent_width() } else { 0.0 };
        for &c in &text[..cursor.col] {
            x += self.engine.metrics().advance(c) + spacing;
        }
        x
    }

    /// Viewport-relative (x, y) of the cursor's line top.
    pub fn cursor_vpos(&mut self) -> (f64, f64) {
        self.prepare_render_data();
        let Some(block_index) = self.engine.active_block_index() else {
            return (0.0, 0.0);
        };
        let top = self.render_data.block_y_pos.get(&block_index).copied().unwrap_or(0.0);
        let y = top + self.engine.cursor.row as f64 * self.engine.line_stride();
        (self.cursor_x(), y - self.viewport_y_pos)
    }

    // -- selection ---------------------------------------------------------

    pub fn has_sel(&self) -> bool {
        self.sel.is_some()
    }

    pub fn sel(&self) -> Option<Selection> {
        self.sel
    }

    /// Select the absolute range `[from, to]` and put the cursor at `to`.
    pub fn select(&mut self, from: usize, to: usize) {
        self.sel = (from != to).then_some(Selection { from, to });
        self.engine.render();
        if let Some(loc) = self.get_textloc_at_pos(to, MoveHint::Backward) {
            self.set_cursor_to_textloc(loc);
        }
    }

    pub fn unset_sel(&mut self) {
        self.sel = None;
    }

    /// Selected text with `\n` standing in for block separators.
    pub fn selected_text(&self) -> String {
        let Some(sel) = self.sel else {
            return String::new();
        };
        let (lo, hi) = sel.sorted();
        let mut out = String::new();
        for (index, block) in self.engine.blocks().iter().enumerate() {
            let start = block.text_pos();
            let end = start + block.len();
            if end < lo {
                continue;
            }
            if start > hi {
                break;
            }
            if start > lo {
                out.push('\n');
            }
            let from = lo.max(start) - start;
            let to = hi.min(end) - start;
            out.extend(self.engine.block_text(index)[from..to].iter());
        }
        out
    }

    /// Delete the selected range, returning the removed text (`\n`-joined
    /// across blocks) for history capture.
    pub fn remove_sel_region(&mut self) -> String {
        let Some(sel) = self.sel.take() else {
            return String::new();
        };
        let (lo, hi) = sel.sorted();
        self.engine.render();
        let Some(loc) = self.get_textloc_at_pos(lo, MoveHint::Forward) else {
            return String::new();
        };
        self.set_cursor_to_textloc(loc);
        self.del((hi - lo) as isize, true)
    }

    /// Collapse the cursor onto the selection edge in the given direction
    /// and drop the selection.
    pub fn move_within_sel_region(&mut self, hint: MoveHint) {
        let Some(sel) = self.sel.take() else {
            return;
        };
        let (lo, hi) = sel.sorted();
        let target = match hint {
            MoveHint::Backward => lo,
            MoveHint::Forward => hi,
        };
        self.engine.render();
        if let Some(loc) = self.get_textloc_at_pos(target, hint) {
            self.set_cursor_to_textloc(loc);
        }
    }

    // -- cursor movement ---------------------------------------------------

    /// Move the cursor by `offset` chars (soft: block boundaries cost one
    /// unit). With `extend_sel` the selection anchor holds and the head
    /// follows the cursor; without it an existing selection collapses to its
    /// edge in the move direction and consumes the move.
    ///
    /// Returns the applied shift in buffer chars.
    pub fn move_cursor(&mut self, offset: isize, extend_sel: bool) -> isize {
        if !self.engine.is_cursor_available() {
            return 0;
        }
        if !extend_sel && self.sel.is_some() {
            let before = self.edit_cursor_pos;
            let hint = if offset < 0 { MoveHint::Backward } else { MoveHint::Forward };
            self.move_within_sel_region(hint);
            return self.edit_cursor_pos as isize - before as isize;
        }
        if extend_sel && self.sel.is_none() {
            self.sel = Some(Selection {
                from: self.edit_cursor_pos,
                to: self.edit_cursor_pos,
            });
        }
        let (shift, moved) = self.engine.commit_movement(offset, false);
        if moved {
            self.edit_cursor_pos = (self.edit_cursor_pos as isize + shift) as usize;
            self.cursor_moved = true;
        }
        if extend_sel {
            if let Some(sel) = &mut self.sel {
                sel.to = self.edit_cursor_pos;
            }
            if self.sel.is_some_and(|sel| sel.is_empty()) {
                self.sel = None;
            }
        }
        shift
    }

    /// Hard-position the cursor at absolute offset `pos`, leaning backward
    /// on boundaries. Selection semantics match [`Self::move_cursor`].
    pub fn move_to(&mut self, pos: usize, extend_sel: bool) {
        if extend_sel && self.sel.is_none() {
            self.sel = Some(Selection {
                from: self.edit_cursor_pos,
                to: self.edit_cursor_pos,
            });
        }
        if !extend_sel {
            self.sel = None;
        }
        self.engine.render();
        if let Some(loc) = self.get_textloc_at_pos(pos, MoveHint::Backward) {
            self.set_cursor_to_textloc(loc);
        }
        if extend_sel {
            if let Some(sel) = &mut self.sel {
                sel.to = self.edit_cursor_pos;
            }
            if self.sel.is_some_and(|sel| sel.is_empty()) {
                self.sel = None;
            }
        }
    }

    /// Move one display line up or down, keeping the sticky target x from
    /// the start of the vertical run. At the document's first/last line the
    /// cursor clamps to the line start/end.
    pub fn vertical_move(&mut self, up: bool) {
        if !self.engine.is_cursor_available() {
            return;
        }
        self.engine.render();
        if self.cursor_moved || self.vertical_move_ref.is_none() {
            self.vertical_move_ref = Some(self.cursor_x());
        }
        let ref_x = self.vertical_move_ref.unwrap_or(0.0);

        let block_index = self.engine.active_block_index().unwrap_or(0);
        let row = self.engine.cursor.row;
        let target = if up {
            if row > 0 {
                Some((block_index, row - 1))
            } else if block_index > 0 {
                let prev = block_index - 1;
                Some((prev, self.engine.block(prev).line_count() - 1))
            } else {
                None
            }
        } else {
            let block = self.engine.block(block_index);
            if row + 1 < block.line_count() {
                Some((block_index, row + 1))
            } else if block_index + 1 < self.engine.block_count() {
                Some((block_index + 1, 0))
            } else {
                None
            }
        };

        let loc = match target {
            Some((index, row)) => {
                let col = self.column_at_x(index, row, ref_x);
                let block = self.engine.block(index);
                TextLoc {
                    block_index: index,
                    pos: block.offset_of_line(row) + col,
                    row,
                    col,
                }
            }
            // first/last display line: clamp to its start/end
            None => {
                let block = self.engine.block(block_index);
                if up {
                    TextLoc {
                        block_index,
                        pos: block.offset_of_line(row),
                        row,
                        col: 0,
                    }
                } else {
                    let col = block.len_of_line(row);
                    TextLoc {
                        block_index,
                        pos: block.line(row).end_offset(),
                        row,
                        col,
                    }
                }
            }
        };
        self.sel = None;
        self.set_cursor_to_textloc(loc);
        // the run's reference x survives until a non-vertical move
        self.cursor_moved = false;
    }

    // -- editing -----------------------------------------------------------

    /// Insert `text` (no `\n`) at the cursor. Line splitting lives a level
    /// up; see [`Self::split_block`].
    pub fn insert(&mut self, text: &str) {
        debug_assert!(!text.contains('\n'));
        if !self.engine.is_cursor_available() {
            return;
        }
        let len = text.chars().count();
        if len == 0 {
            return;
        }
        self.engine.render();
        self.engine.buffer_mut().insert(self.edit_cursor_pos, text);
        self.engine.commit_insertion(len);
        self.edit_cursor_pos += len;
        self.cursor_moved = true;
    }

    /// Split the active block at the cursor.
    pub fn split_block(&mut self) {
        self.engine.render();
        self.engine.break_block_at_cursor();
        self.cursor_moved = true;
    }

    /// Delete `|times|` units in the direction of the sign (soft: a block
    /// boundary costs one unit; hard: boundaries are transparent). Returns
    /// the removed text with `\n` standing in for crossed separators, which
    /// is exactly what re-inserting restores.
    pub fn del(&mut self, times: isize, hard: bool) -> String {
        if !self.engine.is_cursor_available() {
            return String::new();
        }
        self.engine.render();
        if times < 0 {
            let (shift, moved) = self.engine.commit_movement(times, hard);
            if !moved {
                return String::new();
            }
            self.edit_cursor_pos = (self.edit_cursor_pos as isize + shift) as usize;
        }
        let forward = times.unsigned_abs();
        let removed = self.capture_forward(forward, hard);
        let (shift, deleted) = self.engine.commit_deletion(forward as isize, hard);
        debug_assert_eq!(shift, 0);
        self.engine.buffer_mut().remove(self.edit_cursor_pos, deleted);
        self.cursor_moved = true;
        removed
    }

    /// Text covered by deleting `units` forward from the cursor, `\n` at
    /// each crossed block boundary. Mirrors the deletion unit accounting.
    fn capture_forward(&self, mut units: usize, hard: bool) -> String {
        let mut out = String::new();
        let Some(mut index) = self.engine.active_block_index() else {
            return out;
        };
        let mut off = self.engine.cursor.pos;
        let sep = usize::from(!hard);
        loop {
            let avail = self.engine.block(index).len() - off;
            let take = units.min(avail);
            out.extend(self.engine.block_text(index)[off..off + take].iter());
            units -= take;
            if units == 0 || index + 1 == self.engine.block_count() {
                break;
            }
            out.push('\n');
            units -= sep.min(units);
            index += 1;
            off = 0;
        }
        out
    }

    // -- preedit -----------------------------------------------------------

    pub fn begin_preedit(&mut self) {
        if self.engine.is_cursor_available() && !self.engine.is_preediting() {
            self.engine.render();
            self.engine.begin_preedit();
        }
    }

    /// Replace the live composition with `text` (no `\n`).
    pub fn update_preedit(&mut self, text: &str) {
        debug_assert!(!text.contains('\n'));
        let Some(start) = self.engine.preedit_start() else {
            return;
        };
        let prev_len = self.engine.cursor.pos - start;
        let buffer = self.engine.preedit_buffer_mut();
        buffer.remove(start, prev_len);
        buffer.insert(start, text);
        self.engine.update_preedit_text(text.chars().count());
    }

    /// Leave the composition session. The committed text goes through the
    /// normal insert path afterwards.
    pub fn commit_preedit(&mut self) {
        if self.engine.is_preediting() {
            self.engine.commit_preedit();
        }
    }

    /// Abandon the composition, restoring the pre-preedit state.
    pub fn quit_preedit(&mut self) {
        if self.engine.is_preediting() {
            self.update_preedit("");
            self.engine.commit_preedit();
        }
    }

    // -- document ----------------------------------------------------------

    /// Full document text, blocks joined with `\n`.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for index in 0..self.engine.block_count() {
            if index > 0 {
                out.push('\n');
            }
            out.extend(self.engine.block_text(index).iter());
        }
        out
    }

    /// Replace the document. Blank paragraphs are dropped; the cursor ends
    /// at the document start.
    pub fn reset(&mut self, text: &str) {
        tracing::debug!(chars = text.chars().count(), "reset document");
        self.quit_preedit();
        self.engine.clear_all();
        self.engine.buffer_mut().clear();
        self.sel = None;
        self.edit_cursor_pos = 0;
        self.vertical_move_ref = None;
        self.cursor_moved = true;
        self.viewport_y_pos = 0.0;
        self.render_data = RenderData::default();
        self.layout_cache_stale = true;
        self.visible_range_key = None;

        self.engine.insert_block(0);
        self.engine.set_active_block_index(Some(0));
        let mut first = true;
        for para in text.split('\n').filter(|p| !p.trim().is_empty()) {
            if !first {
                self.engine.break_block_at_cursor();
            }
            self.insert(para);
            first = false;
        }
        // ingestion leaves the cursor at the tail; a swapped-in document
        // starts at its beginning
        self.engine.set_active_block_index(Some(0));
        self.engine.cursor.reset();
        self.edit_cursor_pos = 0;
        self.engine.render();
    }

    /// Take the document text out, leaving one empty block behind.
    pub fn take(&mut self) -> String {
        self.quit_preedit();
        let out = self.text();
        self.reset("");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MonospaceMetrics;

    fn test_context(width: f64, height: f64) -> VisualEditContext {
        let metrics = Arc::new(MonospaceMetrics::new(8.0, 18.0));
        VisualEditContext::new(metrics, LayoutConfig::default(), width, height)
    }

    #[test]
    fn test_reset_and_text_round_trip() {
        let mut ctx = test_context(800.0, 600.0);
        ctx.reset("first paragraph\nsecond paragraph");
        assert_eq!(ctx.engine().block_count(), 2);
        assert_eq!(ctx.text(), "first paragraph\nsecond paragraph");
    }

    #[test]
    fn test_reset_puts_cursor_at_document_start() {
        let mut ctx = test_context(800.0, 600.0);
        ctx.reset("abc\ndef");
        assert_eq!(ctx.engine().active_block_index(), Some(0));
        assert_eq!(ctx.edit_cursor_pos(), 0);
        assert_eq!(ctx.engine().cursor.pos, 0);
        assert_eq!((ctx.engine().cursor.row, ctx.engine().cursor.col), (0, 0));
        // typing lands at the head of the first paragraph
        ctx.insert("x");
        assert_eq!(ctx.text(), "xabc\ndef");
    }

    #[test]
    fn test_reset_drops_blank_paragraphs() {
        let mut ctx = test_context(800.0, 600.0);
        ctx.reset("one\n\n  \ntwo\n");
        assert_eq!(ctx.text(), "one\ntwo");
    }

    #[test]
    fn test_take_leaves_empty_document() {
        let mut ctx = test_context(800.0, 600.0);
        ctx.reset("abc\ndef");
        assert_eq!(ctx.take(), "abc\ndef");
        assert_eq!(ctx.text(), "");
        assert_eq!(ctx.engine().block_count(), 1);
        assert_eq!(ctx.edit_cursor_pos(), 0);
    }

    #[test]
    fn test_insert_advances_edit_cursor() {
        let mut ctx = test_context(800.0, 600.0);
        ctx.insert("你好");
        ctx.insert("ab");
        assert_eq!(ctx.edit_cursor_pos(), 4);
        assert_eq!(ctx.text(), "你好ab");
    }

    #[test]
    fn test_del_backward_captures_text() {
        let mut ctx = test_context(800.0, 600.0);
        ctx.reset("hello");
        ctx.move_to(5, false);
        assert_eq!(ctx.del(-2, false), "lo");
        assert_eq!(ctx.text(), "hel");
        assert_eq!(ctx.edit_cursor_pos(), 3);
    }

    #[test]
    fn test_del_across_block_boundary_captures_separator() {
        let mut ctx = test_context(800.0, 600.0);
        ctx.reset("foo\nbar");
        ctx.move_to(3, false);
        // forward-delete the virtual separator: blocks join, "\n" captured
        assert_eq!(ctx.del(1, false), "\n");
        assert_eq!(ctx.text(), "foobar");
        assert_eq!(ctx.engine().block_count(), 1);
    }

    #[test]
    fn test_del_at_document_start_is_noop() {
        let mut ctx = test_context(800.0, 600.0);
        ctx.reset("abc");
        ctx.move_to(0, false);
        assert_eq!(ctx.del(-1, false), "");
        assert_eq!(ctx.text(), "abc");
    }

    #[test]
    fn test_selection_text_joins_blocks_with_newline() {
        let mut ctx = test_context(800.0, 600.0);
        ctx.reset("abc\ndef");
        ctx.select(1, 5);
        assert_eq!(ctx.selected_text(), "bc\nde");
    }

    #[test]
    fn test_remove_sel_region_across_blocks() {
        let mut ctx = test_context(800.0, 600.0);
        ctx.reset("abc\ndef");
        ctx.select(2, 4);
        let removed = ctx.remove_sel_region();
        assert_eq!(removed, "c\nd");
        assert_eq!(ctx.text(), "abef");
        assert!(!ctx.has_sel());
        assert_eq!(ctx.edit_cursor_pos(), 2);
    }

    #[test]
    fn test_move_cursor_extends_selection() {
        let mut ctx = test_context(800.0, 600.0);
        ctx.reset("hello");
        ctx.move_to(1, false);
        ctx.move_cursor(3, true);
        let sel = ctx.sel().unwrap();
        assert_eq!((sel.from, sel.to), (1, 4));
        assert_eq!(ctx.selected_text(), "ell");
    }

    #[test]
    fn test_move_without_extend_collapses_selection() {
        let mut ctx = test_context(800.0, 600.0);
        ctx.reset("hello");
        ctx.select(1, 4);
        ctx.move_cursor(-1, false);
        assert!(!ctx.has_sel());
        assert_eq!(ctx.edit_cursor_pos(), 1);
        ctx.select(1, 4);
        ctx.move_cursor(1, false);
        assert!(!ctx.has_sel());
        assert_eq!(ctx.edit_cursor_pos(), 4);
    }

    #[test]
    fn test_extend_back_to_anchor_unsets_selection() {
        let mut ctx = test_context(800.0, 600.0);
        ctx.reset("hello");
        ctx.move_to(2, false);
        ctx.move_cursor(1, true);
        assert!(ctx.has_sel());
        ctx.move_cursor(-1, true);
        assert!(!ctx.has_sel());
    }

    #[test]
    fn test_textloc_boundary_hints() {
        let mut ctx = test_context(800.0, 600.0);
        ctx.reset("ab\ncd");
        ctx.engine_mut().render();
        // offset 2 is both "end of block 0" and "start of block 1"
        let back = ctx.get_textloc_at_pos(2, MoveHint::Backward).unwrap();
        assert_eq!((back.block_index, back.pos), (0, 2));
        let fwd = ctx.get_textloc_at_pos(2, MoveHint::Forward).unwrap();
        assert_eq!((fwd.block_index, fwd.pos), (1, 0));
        // past the document end: miss
        assert!(ctx.get_textloc_at_pos(5, MoveHint::Backward).is_none());
    }

    #[test]
    fn test_column_at_x_midpoint_rule() {
        let mut ctx = test_context(800.0, 600.0);
        ctx.reset("abcd");
        ctx.engine_mut().render();
        let indent = ctx.engine().indent_width();
        // just left of the first glyph's midpoint
        assert_eq!(ctx.column_at_x(0, 0, indent + 3.9), 0);
        // just right of it
        assert_eq!(ctx.column_at_x(0, 0, indent + 4.1), 1);
        // far right clamps to line end
        assert_eq!(ctx.column_at_x(0, 0, indent + 1000.0), 4);
    }

    #[test]
    fn test_hit_test_clip_into_gap() {
        let mut ctx = test_context(800.0, 600.0);
        ctx.reset("aa\nbb");
        let stride = ctx.engine().line_stride();
        // a point in the inter-block gap misses without clip...
        let in_gap = stride + 1.0;
        assert!(ctx.get_textloc_at_rel_vpos(0.0, in_gap, false).is_none());
        // ...and clips to the last line of the block above with clip
        let loc = ctx.get_textloc_at_rel_vpos(0.0, in_gap, true).unwrap();
        assert_eq!(loc.block_index, 0);
    }

    #[test]
    fn test_vertical_move_keeps_sticky_column() {
        let mut ctx = test_context(800.0, 600.0);
        ctx.reset("abcdef\nx\nuvwxyz");
        ctx.move_to(4, false); // block 0, col 4
        ctx.vertical_move(false);
        // short middle line clamps to its end
        let loc = ctx.current_textloc().unwrap();
        assert_eq!((loc.block_index, loc.col), (1, 1));
        ctx.vertical_move(false);
        // sticky x restores the original column on the long line
        let loc = ctx.current_textloc().unwrap();
        assert_eq!((loc.block_index, loc.col), (2, 4));
    }

    #[test]
    fn test_vertical_move_clamps_at_document_edges() {
        let mut ctx = test_context(800.0, 600.0);
        ctx.reset("abc");
        ctx.move_to(2, false);
        ctx.vertical_move(true);
        assert_eq!(ctx.edit_cursor_pos(), 0);
        ctx.move_to(1, false);
        ctx.vertical_move(false);
        assert_eq!(ctx.edit_cursor_pos(), 3);
    }

    #[test]
    fn test_prepare_render_data_visible_range() {
        let mut ctx = test_context(800.0, 40.0);
        // each block is one line: stride 18 + spacing 6 per block
        ctx.reset("a\nb\nc\nd\ne");
        let data = ctx.prepare_render_data().clone();
        assert_eq!(data.visible_blocks, Some((0, 1)));
        assert!(data.block_y_pos.len() == 5);
        assert_eq!(data.text_height, 5.0 * 18.0 + 4.0 * 6.0);

        ctx.scroll_to(48.0);
        let data = ctx.prepare_render_data().clone();
        assert_eq!(data.visible_blocks, Some((2, 3)));
    }

    #[test]
    fn test_prepare_render_data_idle_frame_is_cached() {
        let mut ctx = test_context(800.0, 40.0);
        ctx.reset("a\nb\nc\nd\ne");
        ctx.prepare_render_data();
        // poison the summary; an idle prepare must hand it back untouched
        ctx.render_data.visible_blocks = Some((7, 7));
        ctx.prepare_render_data();
        assert_eq!(ctx.render_data.visible_blocks, Some((7, 7)));
        // a scroll is a real change and recomputes the range
        ctx.scroll_to(24.0);
        ctx.prepare_render_data();
        assert_eq!(ctx.render_data.visible_blocks, Some((1, 2)));
        // so is a selection change
        ctx.render_data.visible_sel = None;
        ctx.select(1, 4);
        ctx.prepare_render_data();
        assert!(ctx.render_data.visible_sel.is_some());
    }

    #[test]
    fn test_visible_sel_clamped_to_viewport() {
        let mut ctx = test_context(800.0, 40.0);
        ctx.reset("aa\nbb\ncc\ndd");
        ctx.select(0, 7); // through block 3
        let data = ctx.prepare_render_data().clone();
        let (from, to) = data.visible_sel.unwrap();
        assert_eq!(from.block_index, 0);
        // clamped to the last visible block's end
        assert!(to.block_index <= data.visible_blocks.unwrap().1);
    }

    #[test]
    fn test_resize_viewport_width_reflows() {
        let mut ctx = test_context(800.0, 600.0);
        ctx.reset("abcdefghijklmnop");
        ctx.prepare_render_data();
        assert_eq!(ctx.engine().block(0).line_count(), 1);
        ctx.resize_viewport(80.0, 600.0);
        ctx.prepare_render_data();
        assert!(ctx.engine().block(0).line_count() > 1);
    }

    #[test]
    fn test_preedit_does_not_touch_document() {
        let mut ctx = test_context(800.0, 600.0);
        ctx.reset("ab");
        ctx.move_to(2, false);
        ctx.begin_preedit();
        ctx.update_preedit("ㅎ");
        ctx.update_preedit("하");
        assert_eq!(ctx.engine().buffer().to_string(), "ab");
        ctx.quit_preedit();
        assert_eq!(ctx.text(), "ab");
        assert_eq!(ctx.edit_cursor_pos(), 2);
    }

    #[test]
    fn test_preedit_commit_inserts_via_normal_path() {
        let mut ctx = test_context(800.0, 600.0);
        ctx.reset("ab");
        ctx.move_to(2, false);
        ctx.begin_preedit();
        ctx.update_preedit("하");
        ctx.commit_preedit();
        ctx.insert("하");
        assert_eq!(ctx.text(), "ab하");
        assert_eq!(ctx.edit_cursor_pos(), 3);
    }
}
