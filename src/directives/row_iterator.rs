//! `row-iterator` with its `group` / `member` break control, and
//! `column-iterator`.
//!
//! Within a row, a group's content before `member` is its header, shown when
//! the group's key changed (or on the first row) and dropped otherwise.
//! Content inside `member` is always shown. Content after `member` is the
//! footer: recorded on header rows and written out once the key changes or
//! the rows run out, so it lands after the last member of the group.

use super::{BodyMode, ChildOutput, Directive, Element, ROW_CHILDREN, Registration};
use crate::context::{ExecutionContext, OutputTarget};
use crate::dispatcher::Dispatcher;
use crate::error::SqlXmlError;
use crate::events::EventBuffer;
use crate::types::value_text;
use log::debug;
use sqlxml_xpath1::XPathValue;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct GroupLevel {
    column: String,
    /// `None` until the level has seen a row; `Some(None)` is SQL NULL.
    last_value: Option<Option<String>>,
    footer: EventBuffer,
    shown: bool,
    /// Output stack depth outside the group.
    parent_depth: usize,
}

/// Break state of one running row iterator. Levels are group nesting depths.
#[derive(Debug, Default)]
pub struct GroupingState {
    row: usize,
    /// Outermost level whose key changed on the current row.
    first_changed: Option<usize>,
    open: usize,
    levels: Vec<GroupLevel>,
}

impl GroupingState {
    fn shows_header(&self, level: usize) -> bool {
        self.row == 1
            || self.first_changed.is_some_and(|changed| level >= changed)
            || self.levels.get(level).is_none_or(|l| l.last_value.is_none())
    }
}

fn grouping_mut<'c>(ctx: &'c mut ExecutionContext<'_>) -> Result<&'c mut GroupingState, SqlXmlError> {
    ctx.groupings
        .last_mut()
        .ok_or_else(|| SqlXmlError::Structure("group and member must appear inside a row-iterator".to_string()))
}

/// The text of `column` in the current row, `None` for NULL.
fn column_key(ctx: &ExecutionContext<'_>, column: &str) -> Result<Option<String>, SqlXmlError> {
    let cursor = ctx.cursor(0)?;
    let index = cursor
        .column_index(column)
        .ok_or_else(|| SqlXmlError::Resolution(format!("unknown group column '{}'", column)))?;
    let value = cursor.value(index).map_err(|e| ctx.session_error(e))?;
    Ok(value_text(value))
}

fn first_changed_level(ctx: &ExecutionContext<'_>) -> Result<Option<usize>, SqlXmlError> {
    let Some(state) = ctx.groupings.last() else {
        return Ok(None);
    };
    for (level, entry) in state.levels.iter().enumerate() {
        let current = column_key(ctx, &entry.column)?;
        if entry.last_value.as_ref() != Some(&current) {
            return Ok(Some(level));
        }
    }
    Ok(None)
}

/// Writes out the footers of `from` and every deeper level, innermost first.
fn flush_footers(ctx: &mut ExecutionContext<'_>, from: usize) -> Result<(), SqlXmlError> {
    let footers: Vec<EventBuffer> = match ctx.groupings.last_mut() {
        Some(state) if from < state.levels.len() => state.levels[from..]
            .iter_mut()
            .rev()
            .map(|level| std::mem::take(&mut level.footer))
            .collect(),
        _ => Vec::new(),
    };
    for footer in footers {
        footer.replay(ctx.output())?;
    }
    Ok(())
}

fn advance(ctx: &mut ExecutionContext<'_>) -> Result<bool, SqlXmlError> {
    let advanced = ctx.cursor_mut(0)?.advance();
    advanced.map_err(|e| ctx.session_error(e))
}

fn iterate_rows(ctx: &mut ExecutionContext<'_>, body: &EventBuffer) -> Result<(), SqlXmlError> {
    let mut row = 0;
    loop {
        row += 1;
        let changed = if row > 1 { first_changed_level(ctx)? } else { None };
        if let Some(level) = changed {
            debug!("Group key changed at level {} on row {}", level, row);
            flush_footers(ctx, level)?;
        }
        {
            let state = grouping_mut(ctx)?;
            state.row = row;
            state.first_changed = changed;
            state.open = 0;
        }
        {
            let mut scope = ctx.scope();
            let node = scope.current_node();
            scope.push_frame(node);
            let mut bindings = HashMap::new();
            bindings.insert("row-position".to_string(), XPathValue::Number(row as f64));
            scope.push_scope(bindings);
            Dispatcher::replay(body, &mut scope, ROW_CHILDREN)?;
        }
        if !advance(ctx)? {
            break;
        }
    }
    flush_footers(ctx, 0)
}

/// Replays its body once per row of the innermost cursor.
pub struct RowIterator;

impl Directive for RowIterator {
    fn start(&mut self, _ctx: &mut ExecutionContext<'_>, _element: &Element<'_>) -> Result<BodyMode, SqlXmlError> {
        Ok(BodyMode::Buffer)
    }

    fn end(
        self: Box<Self>,
        ctx: &mut ExecutionContext<'_>,
        body: Option<EventBuffer>,
    ) -> Result<Option<ChildOutput>, SqlXmlError> {
        let body = body.unwrap_or_default();
        // result-set leaves the cursor on its first row.
        if ctx.cursor(0)?.row_number() == 0 && !advance(ctx)? {
            return Ok(None);
        }
        ctx.groupings.push(GroupingState::default());
        let outcome = iterate_rows(ctx, &body);
        ctx.groupings.pop();
        outcome.map(|_| None)
    }
}

/// `group`: header control keyed on one column.
#[derive(Default)]
pub struct Group {
    level: usize,
    depth_before: usize,
}

impl Directive for Group {
    fn start(&mut self, ctx: &mut ExecutionContext<'_>, element: &Element<'_>) -> Result<BodyMode, SqlXmlError> {
        let column = element.required("column")?.to_string();
        let key = column_key(ctx, &column)?;
        let depth = ctx.output_depth();
        let state = grouping_mut(ctx)?;
        let level = state.open;
        state.open += 1;
        if state.levels.len() <= level {
            state.levels.push(GroupLevel::default());
        }
        let show = state.shows_header(level);
        let entry = &mut state.levels[level];
        entry.column = column;
        entry.shown = show;
        entry.parent_depth = depth;
        if show {
            entry.last_value = Some(key);
        }
        ctx.push_output(if show {
            OutputTarget::Inherit(depth)
        } else {
            OutputTarget::Discard
        });
        self.level = level;
        self.depth_before = depth;
        Ok(BodyMode::Forward)
    }

    fn end(
        self: Box<Self>,
        ctx: &mut ExecutionContext<'_>,
        _body: Option<EventBuffer>,
    ) -> Result<Option<ChildOutput>, SqlXmlError> {
        let mut footer = None;
        while ctx.output_depth() > self.depth_before {
            if let Some(OutputTarget::Buffer(buffer)) = ctx.pop_output() {
                footer = Some(buffer);
            }
        }
        let state = grouping_mut(ctx)?;
        state.open = state.open.saturating_sub(1);
        if let (Some(buffer), Some(entry)) = (footer, state.levels.get_mut(self.level)) {
            buffer.replay(&mut entry.footer)?;
        }
        Ok(None)
    }

    fn children(&self) -> &'static [Registration] {
        ROW_CHILDREN
    }
}

/// `member`: content shown on every row of a group.
#[derive(Default)]
pub struct Member {
    level: usize,
}

impl Directive for Member {
    fn start(&mut self, ctx: &mut ExecutionContext<'_>, _element: &Element<'_>) -> Result<BodyMode, SqlXmlError> {
        let state = grouping_mut(ctx)?;
        if state.open == 0 {
            return Err(SqlXmlError::Structure("member must appear inside a group".to_string()));
        }
        self.level = state.open - 1;
        let parent_depth = state.levels[self.level].parent_depth;
        ctx.push_output(OutputTarget::Inherit(parent_depth));
        Ok(BodyMode::Forward)
    }

    fn end(
        self: Box<Self>,
        ctx: &mut ExecutionContext<'_>,
        _body: Option<EventBuffer>,
    ) -> Result<Option<ChildOutput>, SqlXmlError> {
        let (shown, parent_depth) = {
            let state = grouping_mut(ctx)?;
            let entry = &state.levels[self.level];
            (entry.shown, entry.parent_depth)
        };
        // Swap the group's header output for its footer output.
        let mut footer = None;
        while ctx.output_depth() > parent_depth {
            if let Some(OutputTarget::Buffer(buffer)) = ctx.pop_output() {
                footer = Some(buffer);
            }
        }
        ctx.push_output(if shown {
            OutputTarget::Buffer(footer.unwrap_or_default())
        } else {
            OutputTarget::Discard
        });
        Ok(None)
    }

    fn children(&self) -> &'static [Registration] {
        ROW_CHILDREN
    }
}

/// Replays its body once per column of the current row, making that column
/// the one getters without a column name read.
pub struct ColumnIterator;

impl Directive for ColumnIterator {
    fn start(&mut self, _ctx: &mut ExecutionContext<'_>, _element: &Element<'_>) -> Result<BodyMode, SqlXmlError> {
        Ok(BodyMode::Buffer)
    }

    fn end(
        self: Box<Self>,
        ctx: &mut ExecutionContext<'_>,
        body: Option<EventBuffer>,
    ) -> Result<Option<ChildOutput>, SqlXmlError> {
        let body = body.unwrap_or_default();
        let count = ctx.cursor(0)?.columns().len();
        for index in 0..count {
            let mut scope = ctx.scope();
            scope.push_column_frame(index);
            let mut bindings = HashMap::new();
            bindings.insert("position".to_string(), XPathValue::Number((index + 1) as f64));
            scope.push_scope(bindings);
            Dispatcher::replay(&body, &mut scope, &[])?;
        }
        Ok(None)
    }
}
