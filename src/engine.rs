//! Block/line layout engine.
//!
//! The document is an ordered sequence of paragraph [`TextBlock`]s tiling a
//! single char buffer with no gaps: the inter-block separator is virtual and
//! only materializes as `\n` at the serialization boundary. Each block wraps
//! its span into [`TextLine`]s lazily, tracking a dirty watermark so an edit
//! re-wraps only the tail of one block instead of the whole document.
//!
//! Blocks and lines are arena-indexed: a location is `(block index, row)`
//! against the engine, never a reference, so inserting or removing blocks
//! cannot dangle.

use crate::buffer::CharBuffer;
use crate::metrics::{FontMetrics, LayoutConfig};
use std::sync::Arc;

/// Resolution of an offset that lands exactly on a line or block boundary.
///
/// `Forward` leans into the start of the next line/block when one exists;
/// `Backward` stays at the end of the current one. Movement commands derive
/// the hint from their direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveHint {
    Forward,
    Backward,
}

/// Cursor within the active block: char offset plus the (row, col) it maps
/// to under the block's current line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CursorPos {
    /// Char offset relative to the active block's start.
    pub pos: usize,
    /// Line index within the active block.
    pub row: usize,
    /// Char offset within that line.
    pub col: usize,
}

impl CursorPos {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One wrapped display line. Owns no text: the span is derived from the
/// predecessor's end offset (or 0) up to `end_offset`, both block-relative.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLine {
    end_offset: usize,
    tight_width: f64,
    /// Justification slack to spread across inter-char gaps; `None` means
    /// the line fits its max width exactly (no padding).
    extra_spacing: Option<f64>,
}

impl TextLine {
    /// End of the line's span, exclusive, relative to the block start.
    pub fn end_offset(&self) -> usize {
        self.end_offset
    }

    /// Width of the line's glyphs without justification padding.
    pub fn tight_width(&self) -> f64 {
        self.tight_width
    }
}

/// Longest prefix of `text` whose advances fit in `max_width`, greedy per
/// char. Returns `(char count, consumed width)`.
///
/// A non-empty slice always yields a count of at least 1 even when the first
/// char alone exceeds the width; placing the overwide char alone guarantees
/// reflow progress.
pub fn bounding_text_length(metrics: &dyn FontMetrics, text: &[char], max_width: f64) -> (usize, f64) {
    let mut width = 0.0;
    let mut count = 0;
    for &c in text {
        let advance = metrics.advance(c);
        if width + advance > max_width {
            break;
        }
        width += advance;
        count += 1;
    }
    if count == 0 && !text.is_empty() {
        count = 1;
        width = metrics.advance(text[0]);
    }
    (count, width)
}

/// A paragraph block: a span of the document buffer wrapped into lines.
#[derive(Debug, Clone, Default)]
pub struct TextBlock {
    /// Start offset of the block's span in the document buffer (0 while the
    /// block is re-pointed at the preedit buffer).
    text_pos: usize,
    lines: Vec<TextLine>,
    /// Lines `[0, k)` are correctly wrapped; `[k, ..]` must be joined and
    /// re-wrapped before being read. `None` means fully wrapped.
    dirty_line: Option<usize>,
}

impl TextBlock {
    fn new(text_pos: usize) -> Self {
        Self {
            text_pos,
            lines: vec![TextLine::default()],
            dirty_line: Some(0),
        }
    }

    /// Start offset of the block's span in the document buffer.
    pub fn text_pos(&self) -> usize {
        self.text_pos
    }

    /// Length of the block's text in chars.
    pub fn len(&self) -> usize {
        self.lines.last().map_or(0, |line| line.end_offset)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, row: usize) -> &TextLine {
        &self.lines[row]
    }

    /// Start offset of line `row`, relative to the block start.
    pub fn offset_of_line(&self, row: usize) -> usize {
        assert!(row < self.lines.len());
        if row == 0 {
            0
        } else {
            self.lines[row - 1].end_offset
        }
    }

    /// Char length of line `row`.
    pub fn len_of_line(&self, row: usize) -> usize {
        self.lines[row].end_offset - self.offset_of_line(row)
    }

    /// Per-gap justification spacing of line `row` in pixels.
    pub fn char_spacing_of_line(&self, row: usize) -> f64 {
        let len = self.len_of_line(row);
        match self.lines[row].extra_spacing {
            Some(extra) if len >= 2 => extra / (len - 1) as f64,
            _ => 0.0,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty_line.is_some()
    }

    /// Lower the dirty watermark to `row`; idempotent.
    pub fn mark_dirty(&mut self, row: usize) {
        assert!(row < self.lines.len());
        self.dirty_line = Some(match self.dirty_line {
            Some(current) => current.min(row),
            None => row,
        });
    }

    /// Collapse all lines from the watermark to the end into one line
    /// spanning their combined range, ready for re-wrap.
    pub fn join_dirty_lines(&mut self) {
        let dirty = self.dirty_line.expect("join_dirty_lines on a clean block");
        let last_end = self.lines.last().expect("block has no lines").end_offset;
        self.lines[dirty].end_offset = last_end;
        self.lines.truncate(dirty + 1);
    }

    /// Split `tail_len` chars off the last line into a fresh line.
    fn squeeze_and_extend_last_line(&mut self, tail_len: usize) {
        let last = self.lines.len() - 1;
        debug_assert!(tail_len > 0 && tail_len < self.len_of_line(last));
        let end = self.lines[last].end_offset;
        self.lines[last].end_offset = end - tail_len;
        self.lines.push(TextLine {
            end_offset: end,
            ..TextLine::default()
        });
    }

    /// Re-wrap from the dirty watermark down. `text` must be the block's
    /// full span. Terminates because `bounding_text_length` always consumes
    /// at least one char of a non-empty tail.
    pub(crate) fn reshape(
        &mut self,
        text: &[char],
        metrics: &dyn FontMetrics,
        max_width: f64,
        indent_width: f64,
    ) {
        assert!(self.is_dirty());
        debug_assert_eq!(text.len(), self.len());
        self.join_dirty_lines();
        loop {
            let last = self.lines.len() - 1;
            let start = self.offset_of_line(last);
            let line_text = &text[start..self.lines[last].end_offset];
            let line_max = max_width - if last == 0 { indent_width } else { 0.0 };
            let (count, tight_width) = bounding_text_length(metrics, line_text, line_max);
            let tail_len = line_text.len() - count;
            let line = &mut self.lines[last];
            line.tight_width = tight_width;
            line.extra_spacing = if tail_len == 0 {
                None
            } else {
                Some(line_max - tight_width)
            };
            if tail_len == 0 {
                break;
            }
            self.squeeze_and_extend_last_line(tail_len);
        }
        self.dirty_line = None;
    }
}

/// Preedit snapshot taken at `begin_preedit`, restored on commit/cancel.
#[derive(Debug, Clone, Copy)]
struct PreeditState {
    saved_cursor: CursorPos,
    saved_text_pos: usize,
    saved_text_len: usize,
}

/// The text view engine: owns the document buffer, the ordered block list,
/// the primary cursor and the preedit session.
pub struct TextViewEngine {
    metrics: Arc<dyn FontMetrics>,
    config: LayoutConfig,
    max_width: f64,

    text: CharBuffer,
    preedit_text: CharBuffer,
    blocks: Vec<TextBlock>,

    /// Block the cursor lives in; `None` means no cursor is available.
    active_block_index: Option<usize>,
    pub cursor: CursorPos,

    preedit: Option<PreeditState>,
    dirty: bool,
}

impl TextViewEngine {
    pub fn new(metrics: Arc<dyn FontMetrics>, config: LayoutConfig, max_width: f64) -> Self {
        Self {
            metrics,
            config,
            max_width,
            text: CharBuffer::new(),
            preedit_text: CharBuffer::new(),
            blocks: Vec::new(),
            active_block_index: None,
            cursor: CursorPos::default(),
            preedit: None,
            dirty: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_cursor_available(&self) -> bool {
        self.active_block_index.is_some()
    }

    pub fn is_preediting(&self) -> bool {
        self.preedit.is_some()
    }

    /// Block-relative offset where the live preedit text starts.
    pub fn preedit_start(&self) -> Option<usize> {
        self.preedit.map(|state| state.saved_cursor.pos)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, index: usize) -> &TextBlock {
        &self.blocks[index]
    }

    pub fn blocks(&self) -> &[TextBlock] {
        &self.blocks
    }

    pub fn active_block_index(&self) -> Option<usize> {
        self.active_block_index
    }

    pub(crate) fn set_active_block_index(&mut self, index: Option<usize>) {
        self.active_block_index = index;
    }

    pub fn current_block(&self) -> &TextBlock {
        let index = self.active_block_index.expect("no active block");
        &self.blocks[index]
    }

    /// Text span of block `index`, sourced from the preedit buffer while
    /// that block hosts an active preedit session.
    pub fn block_text(&self, index: usize) -> &[char] {
        let block = &self.blocks[index];
        let buffer = if self.preedit.is_some() && Some(index) == self.active_block_index {
            &self.preedit_text
        } else {
            &self.text
        };
        buffer.slice(block.text_pos..block.text_pos + block.len())
    }

    /// Text of line `row` of block `index`. The block must be clean.
    pub fn text_of_line(&self, index: usize, row: usize) -> &[char] {
        let block = &self.blocks[index];
        let start = block.offset_of_line(row);
        &self.block_text(index)[start..block.line(row).end_offset()]
    }

    pub fn buffer(&self) -> &CharBuffer {
        &self.text
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut CharBuffer {
        &mut self.text
    }

    pub(crate) fn preedit_buffer_mut(&mut self) -> &mut CharBuffer {
        &mut self.preedit_text
    }

    pub fn metrics(&self) -> &dyn FontMetrics {
        self.metrics.as_ref()
    }

    pub fn max_width(&self) -> f64 {
        self.max_width
    }

    pub fn block_spacing(&self) -> f64 {
        self.config.block_spacing
    }

    /// Vertical distance between consecutive line baselines.
    pub fn line_stride(&self) -> f64 {
        self.metrics.line_height() * self.config.line_spacing_ratio
    }

    /// First-line indent in pixels.
    pub fn indent_width(&self) -> f64 {
        self.metrics.standard_char_width() * f64::from(self.config.indent_chars)
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Replace the font metrics; all wrapping becomes stale.
    pub fn reset_font_metrics(&mut self, metrics: Arc<dyn FontMetrics>) {
        self.metrics = metrics;
        self.mark_all_blocks_dirty();
    }

    /// Change the wrap width; all wrapping becomes stale.
    pub fn reset_max_width(&mut self, width: f64) {
        self.max_width = width;
        self.mark_all_blocks_dirty();
    }

    fn mark_all_blocks_dirty(&mut self) {
        for block in &mut self.blocks {
            block.mark_dirty(0);
        }
        if !self.blocks.is_empty() {
            self.dirty = true;
        }
    }

    /// Drop all blocks and reset cursor/preedit state. The document buffer
    /// is left to the caller.
    pub fn clear_all(&mut self) {
        self.blocks.clear();
        self.active_block_index = None;
        self.cursor.reset();
        self.preedit = None;
        self.preedit_text.clear();
        self.dirty = false;
    }

    /// Recompute `(row, col)` from `cursor.pos` under the active block's
    /// current layout. On an exact line-end boundary, `Forward` lands at the
    /// start of the next line when one exists; `Backward` stays at the end
    /// of the current line.
    pub fn sync_cursor_row_col(&mut self, hint: MoveHint) {
        let block = self.current_block();
        let row = (0..block.line_count())
            .find(|&i| block.line(i).end_offset() >= self.cursor.pos)
            .expect("cursor offset outside block span");
        let col = self.cursor.pos - block.offset_of_line(row);
        if hint == MoveHint::Forward
            && col == block.len_of_line(row)
            && row + 1 < block.line_count()
        {
            self.cursor.row = row + 1;
            self.cursor.col = 0;
        } else {
            self.cursor.row = row;
            self.cursor.col = col;
        }
    }

    /// Re-wrap every dirty block and resync the cursor if its block moved
    /// under it. No-op when nothing is dirty.
    pub fn render(&mut self) {
        if !self.dirty {
            return;
        }
        let cursor_dirty = self
            .active_block_index
            .is_some_and(|i| self.blocks[i].is_dirty());
        for index in 0..self.blocks.len() {
            if self.blocks[index].is_dirty() {
                self.reshape_block(index);
            }
        }
        if cursor_dirty {
            self.sync_cursor_row_col(MoveHint::Backward);
        }
        self.dirty = false;
    }

    fn reshape_block(&mut self, index: usize) {
        let mut block = std::mem::take(&mut self.blocks[index]);
        let buffer = if self.preedit.is_some() && Some(index) == self.active_block_index {
            &self.preedit_text
        } else {
            &self.text
        };
        let text = buffer.slice(block.text_pos..block.text_pos + block.len());
        block.reshape(text, self.metrics.as_ref(), self.max_width, self.indent_width());
        self.blocks[index] = block;
    }

    /// Insert a fresh empty block at `index`, deriving its start offset from
    /// the left neighbor's end (or the right neighbor's start at index 0).
    pub fn insert_block(&mut self, index: usize) {
        assert!(index <= self.blocks.len());
        let pos = if self.blocks.is_empty() {
            0
        } else if index == 0 {
            self.blocks[0].text_pos
        } else {
            let prev = &self.blocks[index - 1];
            prev.text_pos + prev.len()
        };
        self.blocks.insert(index, TextBlock::new(pos));
        if let Some(active) = self.active_block_index {
            if index <= active {
                self.active_block_index = Some(active + 1);
            }
        }
        self.dirty = true;
    }

    /// Split the active block at the cursor. With the cursor at offset 0
    /// this degenerates to inserting an empty block in front (no text
    /// moves); otherwise the tail transfers to a new following block by
    /// start-offset adjustment only — both halves keep referencing the same
    /// underlying buffer.
    pub fn break_block_at_cursor(&mut self) {
        let Some(active) = self.active_block_index else {
            return;
        };
        assert!(self.preedit.is_none());
        if self.cursor.pos == 0 {
            self.insert_block(active);
            return;
        }
        tracing::trace!(block = active, pos = self.cursor.pos, "break block");
        self.insert_block(active + 1);

        let block_pos = self.blocks[active].text_pos;
        let block_len = self.blocks[active].len();
        let cursor = self.cursor;

        let next = &mut self.blocks[active + 1];
        next.text_pos = block_pos + cursor.pos;
        next.lines[0].end_offset = block_len - cursor.pos;
        next.mark_dirty(0);

        let block = &mut self.blocks[active];
        let mut row = cursor.row;
        if cursor.col > 0 {
            block.lines[row].end_offset = cursor.pos;
        } else {
            // cursor sat at the start of a wrapped line; the break lands at
            // the end of the previous one
            row -= 1;
        }
        block.mark_dirty(row);
        block.lines.truncate(row + 1);

        self.active_block_index = Some(active + 1);
        self.cursor.pos = 0;
        self.sync_cursor_row_col(MoveHint::Backward);
        self.dirty = true;
    }

    /// Account for `len` chars already spliced into the buffer at the
    /// cursor: extend line ends from the cursor's row, shift downstream
    /// block starts, advance the cursor.
    pub fn commit_insertion(&mut self, len: usize) {
        let active = self.active_block_index.expect("no active block");
        assert!(self.preedit.is_none());
        for block in &mut self.blocks[active + 1..] {
            block.text_pos += len;
        }
        let row = self.cursor.row;
        let block = &mut self.blocks[active];
        for line in &mut block.lines[row..] {
            line.end_offset += len;
        }
        block.mark_dirty(row);
        self.cursor.pos += len;
        self.cursor.col += len;
        self.dirty = true;
    }

    /// Delete `|times|` chars in the direction of `times`' sign. Negative
    /// counts first move the cursor backward (sharing one forward-deletion
    /// path with forward deletes). In soft mode a block boundary costs one
    /// deletion unit (the virtual separator); in hard mode boundaries are
    /// transparent. Clamps at the document end.
    ///
    /// Returns `(cursor shift in buffer chars, chars deleted)`; the caller
    /// owns splicing the chars out of the buffer.
    pub fn commit_deletion(&mut self, times: isize, hard: bool) -> (isize, usize) {
        assert!(self.is_cursor_available());
        assert!(self.preedit.is_none());

        let mut cursor_shift = 0;
        if times < 0 {
            let (shift, moved) = self.commit_movement(times, hard);
            if !moved {
                return (0, 0);
            }
            cursor_shift = shift;
        }
        let mut times = times.unsigned_abs();
        let mut total_shift = 0usize;
        let active = self.active_block_index.expect("no active block");
        let sep = usize::from(!hard);

        // stage 1: consume within the current block, cursor to block end
        let row = self.cursor.row;
        let block = &mut self.blocks[active];
        let avail = block.len() - self.cursor.pos;
        if times <= avail {
            block.mark_dirty(row);
            block.join_dirty_lines();
            let last = block.lines.last_mut().expect("block has no lines");
            last.end_offset -= times;
            total_shift += times;
            times = 0;
        } else {
            block.lines.truncate(row + 1);
            block.lines[row].end_offset = self.cursor.pos;
            total_shift += avail;
            times -= avail;
        }

        // stage 2: consume whole downstream blocks
        let mut tail = active;
        while let Some(next) = self.blocks.get(tail + 1) {
            let stride = next.len() + sep;
            if times < stride {
                break;
            }
            times -= stride;
            total_shift += next.len();
            tail += 1;
        }

        // stage 3: merge the next surviving block's head into this block
        if self.cursor.pos == self.blocks[active].len()
            && times > 0
            && tail + 1 < self.blocks.len()
        {
            tail += 1;
            let next_len = self.blocks[tail].len();
            let removed = times - sep;
            debug_assert!(removed <= next_len);
            let block = &mut self.blocks[active];
            let last = block.lines.last_mut().expect("block has no lines");
            last.end_offset += next_len - removed;
            total_shift += removed;
        }
        if tail > active {
            self.blocks.drain(active + 1..=tail);
        }

        // stage 4: shift trailing lines and downstream block starts (the
        // join above may have collapsed the cursor's row away)
        let block = &mut self.blocks[active];
        let row = row.min(block.lines.len() - 1);
        block.mark_dirty(row);
        for line in &mut block.lines[row + 1..] {
            line.end_offset -= total_shift;
        }
        for block in &mut self.blocks[active + 1..] {
            block.text_pos -= total_shift;
        }

        tracing::trace!(deleted = total_shift, shift = cursor_shift, "commit deletion");
        self.dirty = true;
        (cursor_shift, total_shift)
    }

    /// Move the cursor by `offset` chars, crossing block boundaries as it
    /// runs off the block's span. In soft mode a crossing consumes one extra
    /// unit of movement (the virtual separator); in hard mode it is free.
    /// Clamps at the document ends.
    ///
    /// Returns `(cursor shift in buffer chars, whether the cursor moved)`.
    pub fn commit_movement(&mut self, offset: isize, hard: bool) -> (isize, bool) {
        assert!(self.is_cursor_available());
        assert!(self.preedit.is_none());

        let mut active = self.active_block_index.expect("no active block");
        let start_active = active;
        let start_pos = self.cursor.pos;
        let sep: isize = if hard { 0 } else { 1 };

        let mut shift = offset;
        let mut pos = self.cursor.pos as isize + offset;
        loop {
            let len = self.blocks[active].len() as isize;
            if pos < 0 && active > 0 {
                active -= 1;
                pos += self.blocks[active].len() as isize + sep;
                shift += sep;
                continue;
            }
            if pos > len && active + 1 < self.blocks.len() {
                pos -= len + sep;
                active += 1;
                shift -= sep;
                continue;
            }
            let clamped = pos.clamp(0, len);
            shift += clamped - pos;
            pos = clamped;
            break;
        }

        self.cursor.pos = pos as usize;
        self.active_block_index = Some(active);
        let hint = if offset > 0 {
            MoveHint::Forward
        } else {
            MoveHint::Backward
        };
        self.sync_cursor_row_col(hint);

        let moved = active != start_active || self.cursor.pos != start_pos;
        (shift, moved)
    }

    /// Enter IME composition: snapshot the active block's true start
    /// offset, length and cursor, copy its text into the preedit buffer and
    /// re-point the block at it (start offset 0). Until commit, composition
    /// keystrokes touch only the preedit buffer, never the document.
    pub fn begin_preedit(&mut self) {
        assert!(self.preedit.is_none());
        let active = self.active_block_index.expect("no active block");
        let text: String = self.block_text(active).iter().collect();
        let block = &self.blocks[active];
        let state = PreeditState {
            saved_cursor: self.cursor,
            saved_text_pos: block.text_pos,
            saved_text_len: block.len(),
        };
        tracing::trace!(block = active, len = state.saved_text_len, "begin preedit");
        self.preedit_text.clear();
        self.preedit_text.insert(0, &text);
        self.blocks[active].text_pos = 0;
        self.preedit = Some(state);
    }

    /// Account for the preedit text now being `len` chars (the caller has
    /// already respliced the preedit buffer). Adjusts line ends by the delta
    /// against the previous preedit length and re-marks the composition row
    /// dirty.
    pub fn update_preedit_text(&mut self, len: usize) {
        let state = *self.preedit.as_ref().expect("not preediting");
        let active = self.active_block_index.expect("no active block");
        let block = &mut self.blocks[active];

        // collapse everything from the composition row down into one line,
        // then resize it; the reflow pass re-wraps the tail
        let row = (0..block.line_count())
            .find(|&i| block.line(i).end_offset() >= state.saved_cursor.pos)
            .expect("preedit start outside block span");
        block.mark_dirty(row);
        block.join_dirty_lines();
        let last = block.lines.last_mut().expect("block has no lines");
        let prev_len = self.cursor.pos - state.saved_cursor.pos;
        last.end_offset = last.end_offset + len - prev_len;

        self.cursor.pos = state.saved_cursor.pos + len;
        self.sync_cursor_row_col(MoveHint::Backward);
        self.dirty = true;
    }

    /// Leave IME composition: restore the true buffer reference, start
    /// offset and saved cursor, and collapse the block back to its
    /// pre-preedit committed length. The committed chars are expected to be
    /// spliced into the true buffer (and accounted via `commit_insertion`)
    /// by the caller afterwards.
    pub fn commit_preedit(&mut self) {
        let state = self.preedit.take().expect("not preediting");
        let active = self.active_block_index.expect("no active block");
        let block = &mut self.blocks[active];

        let row = (0..block.line_count())
            .find(|&i| block.line(i).end_offset() >= state.saved_cursor.pos)
            .expect("preedit start outside block span");
        block.mark_dirty(row);
        block.join_dirty_lines();
        block.lines.last_mut().expect("block has no lines").end_offset = state.saved_text_len;
        block.text_pos = state.saved_text_pos;

        self.cursor = state.saved_cursor;
        self.preedit_text.clear();
        self.dirty = true;
        tracing::trace!(block = active, "commit preedit");
    }
}
