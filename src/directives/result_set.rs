//! `result-set` and `no-results`.

use super::{BodyMode, ChildOutput, Directive, Element};
use crate::context::ExecutionContext;
use crate::dispatcher::Dispatcher;
use crate::error::SqlXmlError;
use crate::events::EventBuffer;
use log::debug;

/// Walks the results of the last statement, replaying its body once per
/// non-empty cursor. A cursor without rows replays nothing.
#[derive(Default)]
pub struct ResultSet {
    /// `None` means no limit.
    limit: Option<usize>,
}

fn parse_limit(text: &str) -> Result<Option<usize>, SqlXmlError> {
    if text.trim() == "unbounded" {
        return Ok(None);
    }
    match text.trim().parse::<usize>() {
        Ok(n) if n >= 1 => Ok(Some(n)),
        _ => Err(SqlXmlError::Structure(format!(
            "invalid result-sets value '{}': use a positive integer or 'unbounded'",
            text
        ))),
    }
}

impl Directive for ResultSet {
    fn start(&mut self, ctx: &mut ExecutionContext<'_>, element: &Element<'_>) -> Result<BodyMode, SqlXmlError> {
        self.limit = match element.attr("result-sets") {
            Some(text) => parse_limit(text)?,
            None => Some(ctx.config().max_result_sets.unwrap_or(1)),
        };
        Ok(BodyMode::Buffer)
    }

    fn end(
        self: Box<Self>,
        ctx: &mut ExecutionContext<'_>,
        body: Option<EventBuffer>,
    ) -> Result<Option<ChildOutput>, SqlXmlError> {
        let body = body.unwrap_or_default();
        let mut processed = 0;
        loop {
            if ctx.results_mut()?.has_cursor() {
                let advanced = match ctx.results_mut()?.cursor_mut() {
                    Some(cursor) => cursor.advance(),
                    None => Ok(false),
                };
                let non_empty = advanced.map_err(|e| ctx.session_error(e))?;
                if non_empty {
                    ctx.mark_rows_produced();
                    let mut scope = ctx.scope();
                    let node = scope.current_node();
                    scope.push_frame(node);
                    Dispatcher::replay(&body, &mut scope, &[])?;
                } else {
                    debug!("Skipping empty result set {}", processed + 1);
                }
                processed += 1;
                if self.limit.is_some_and(|limit| processed >= limit) {
                    break;
                }
            }
            // The update count is read after every step, cursor or not.
            let results = ctx.results_mut()?;
            let step = results
                .more_results()
                .and_then(|more| results.update_count().map(|count| (more, count)));
            let (more, count) = step.map_err(|e| ctx.session_error(e))?;
            if !more && count.is_none() {
                break;
            }
        }
        Ok(None)
    }
}

/// Replays its body only when the statement in scope produced no rows.
pub struct NoResults;

impl Directive for NoResults {
    fn start(&mut self, _ctx: &mut ExecutionContext<'_>, _element: &Element<'_>) -> Result<BodyMode, SqlXmlError> {
        Ok(BodyMode::Buffer)
    }

    fn end(
        self: Box<Self>,
        ctx: &mut ExecutionContext<'_>,
        body: Option<EventBuffer>,
    ) -> Result<Option<ChildOutput>, SqlXmlError> {
        if !ctx.produced_rows() {
            let body = body.unwrap_or_default();
            let mut scope = ctx.scope();
            Dispatcher::replay(&body, &mut scope, &[])?;
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_sets_attribute() {
        assert_eq!(parse_limit("unbounded").unwrap(), None);
        assert_eq!(parse_limit(" 3 ").unwrap(), Some(3));
        assert!(parse_limit("0").is_err());
        assert!(parse_limit("all").is_err());
    }
}
