//! Session and statement scoping: `config`, `connection`, `datasource` and
//! `execute`.

use super::{BodyMode, ChildOutput, Directive, Element};
use crate::context::ExecutionContext;
use crate::error::SqlXmlError;
use crate::events::EventBuffer;

/// `config`: the transparent root of a template.
pub struct Config;

impl Directive for Config {
    fn start(&mut self, _ctx: &mut ExecutionContext<'_>, _element: &Element<'_>) -> Result<BodyMode, SqlXmlError> {
        Ok(BodyMode::Forward)
    }

    fn end(
        self: Box<Self>,
        _ctx: &mut ExecutionContext<'_>,
        _body: Option<EventBuffer>,
    ) -> Result<Option<ChildOutput>, SqlXmlError> {
        Ok(None)
    }
}

/// `connection`: sessions bound inside it are released at its end.
#[derive(Default)]
pub struct Connection {
    depth: usize,
}

impl Directive for Connection {
    fn start(&mut self, ctx: &mut ExecutionContext<'_>, _element: &Element<'_>) -> Result<BodyMode, SqlXmlError> {
        self.depth = ctx.session_depth();
        Ok(BodyMode::Forward)
    }

    fn end(
        self: Box<Self>,
        ctx: &mut ExecutionContext<'_>,
        _body: Option<EventBuffer>,
    ) -> Result<Option<ChildOutput>, SqlXmlError> {
        ctx.release_sessions(self.depth);
        Ok(None)
    }
}

/// `datasource`: binds the session named by its text content.
#[derive(Default)]
pub struct Datasource {
    name: String,
}

impl Directive for Datasource {
    fn start(&mut self, _ctx: &mut ExecutionContext<'_>, _element: &Element<'_>) -> Result<BodyMode, SqlXmlError> {
        Ok(BodyMode::Consume)
    }

    fn characters(&mut self, _ctx: &mut ExecutionContext<'_>, text: &str) -> Result<(), SqlXmlError> {
        self.name.push_str(text);
        Ok(())
    }

    fn end(
        self: Box<Self>,
        ctx: &mut ExecutionContext<'_>,
        _body: Option<EventBuffer>,
    ) -> Result<Option<ChildOutput>, SqlXmlError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(SqlXmlError::Structure("missing datasource name".to_string()));
        }
        ctx.open_session(name)?;
        Ok(None)
    }
}

/// `execute`: statements inside it share one frame, closed at its end.
pub struct Execute;

impl Directive for Execute {
    fn start(&mut self, ctx: &mut ExecutionContext<'_>, _element: &Element<'_>) -> Result<BodyMode, SqlXmlError> {
        ctx.push_frame(ctx.current_node());
        Ok(BodyMode::Forward)
    }

    fn end(
        self: Box<Self>,
        ctx: &mut ExecutionContext<'_>,
        _body: Option<EventBuffer>,
    ) -> Result<Option<ChildOutput>, SqlXmlError> {
        ctx.pop_frame();
        Ok(None)
    }
}
