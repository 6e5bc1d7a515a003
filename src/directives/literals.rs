//! Directives that project path-expression results and literal text:
//! `value-of`, `copy-of`, `text`, `attribute` and `for-each`.

use super::{BodyMode, ChildOutput, Directive, Element};
use crate::context::ExecutionContext;
use crate::datasource::copy_nodes;
use crate::dispatcher::Dispatcher;
use crate::error::SqlXmlError;
use crate::events::EventBuffer;
use log::warn;
use sqlxml_xpath1::XPathValue;
use std::collections::HashMap;

#[derive(Default)]
pub struct ValueOf {
    select: String,
}

impl Directive for ValueOf {
    fn start(&mut self, _ctx: &mut ExecutionContext<'_>, element: &Element<'_>) -> Result<BodyMode, SqlXmlError> {
        self.select = element.required("select")?.to_string();
        Ok(BodyMode::Consume)
    }

    fn end(
        self: Box<Self>,
        ctx: &mut ExecutionContext<'_>,
        _body: Option<EventBuffer>,
    ) -> Result<Option<ChildOutput>, SqlXmlError> {
        let text = ctx.evaluate_string(&self.select)?;
        if !text.is_empty() {
            ctx.output().characters(&text)?;
        }
        Ok(None)
    }
}

#[derive(Default)]
pub struct CopyOf {
    select: String,
}

impl Directive for CopyOf {
    fn start(&mut self, _ctx: &mut ExecutionContext<'_>, element: &Element<'_>) -> Result<BodyMode, SqlXmlError> {
        self.select = element.required("select")?.to_string();
        Ok(BodyMode::Consume)
    }

    fn end(
        self: Box<Self>,
        ctx: &mut ExecutionContext<'_>,
        _body: Option<EventBuffer>,
    ) -> Result<Option<ChildOutput>, SqlXmlError> {
        match ctx.evaluate(&self.select)? {
            XPathValue::NodeSet(nodes) => copy_nodes(&nodes, ctx.output())?,
            other => {
                let text = other.to_string();
                if !text.is_empty() {
                    ctx.output().characters(&text)?;
                }
            }
        }
        Ok(None)
    }
}

/// Collects its character content and writes it out unchanged.
#[derive(Default)]
pub struct Text {
    text: String,
}

impl Directive for Text {
    fn start(&mut self, _ctx: &mut ExecutionContext<'_>, _element: &Element<'_>) -> Result<BodyMode, SqlXmlError> {
        Ok(BodyMode::Consume)
    }

    fn characters(&mut self, _ctx: &mut ExecutionContext<'_>, text: &str) -> Result<(), SqlXmlError> {
        self.text.push_str(text);
        Ok(())
    }

    fn end(
        self: Box<Self>,
        ctx: &mut ExecutionContext<'_>,
        _body: Option<EventBuffer>,
    ) -> Result<Option<ChildOutput>, SqlXmlError> {
        if !self.text.is_empty() {
            ctx.output().characters(&self.text)?;
        }
        Ok(None)
    }
}

/// Accepted for compatibility. The body is passed through and no attribute
/// is produced.
pub struct AttributeDirective;

impl Directive for AttributeDirective {
    fn start(&mut self, _ctx: &mut ExecutionContext<'_>, element: &Element<'_>) -> Result<BodyMode, SqlXmlError> {
        warn!(
            "<{}> at {} is not implemented; its content is passed through",
            element.name.qualified, element.location
        );
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

/// Replays its body once per selected node, with that node as context and
/// `current()` / `position()` bound.
#[derive(Default)]
pub struct ForEach {
    select: String,
}

impl Directive for ForEach {
    fn start(&mut self, _ctx: &mut ExecutionContext<'_>, element: &Element<'_>) -> Result<BodyMode, SqlXmlError> {
        self.select = element.required("select")?.to_string();
        Ok(BodyMode::Buffer)
    }

    fn end(
        self: Box<Self>,
        ctx: &mut ExecutionContext<'_>,
        body: Option<EventBuffer>,
    ) -> Result<Option<ChildOutput>, SqlXmlError> {
        let body = body.unwrap_or_default();
        let nodes = ctx.evaluate_nodes(&self.select)?;
        for (i, node) in nodes.into_iter().enumerate() {
            let mut scope = ctx.scope();
            scope.push_frame(node);
            let mut bindings = HashMap::new();
            bindings.insert("current".to_string(), XPathValue::NodeSet(vec![node]));
            bindings.insert("position".to_string(), XPathValue::Number((i + 1) as f64));
            scope.push_scope(bindings);
            Dispatcher::replay(&body, &mut scope, &[])?;
        }
        Ok(None)
    }
}
