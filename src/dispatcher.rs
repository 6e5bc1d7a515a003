//! Routes template events to directive handlers and literal content to the
//! current output.

use crate::context::{ContextMark, ExecutionContext};
use crate::directives::{self, BodyMode, ChildOutput, Directive, Element, GLOBAL, Registration};
use crate::error::{Location, SqlXmlError};
use crate::events::{Event, EventBuffer, XmlName};
use log::debug;

enum Frame {
    Directive {
        directive: Box<dyn Directive>,
        mode: BodyMode,
        location: Location,
        mark: ContextMark,
    },
    /// Recording a buffered body. `depth` counts open elements inside it.
    Capture { buffer: EventBuffer, depth: usize },
    Literal { name: XmlName },
}

/// A single-use event consumer. Buffered bodies are replayed through a new
/// dispatcher each time, so nested directives run afresh on every replay.
pub struct Dispatcher {
    frames: Vec<Frame>,
    seed: &'static [Registration],
}

impl Dispatcher {
    /// `seed` adds directives that are valid at the top of the replayed body,
    /// such as `group` inside a row iterator.
    pub fn new(seed: &'static [Registration]) -> Self {
        Dispatcher {
            frames: Vec::new(),
            seed,
        }
    }

    /// Replays `buffer` through a fresh dispatcher.
    pub fn replay(
        buffer: &EventBuffer,
        ctx: &mut ExecutionContext<'_>,
        seed: &'static [Registration],
    ) -> Result<(), SqlXmlError> {
        let mut dispatcher = Dispatcher::new(seed);
        for (event, location) in buffer.iter() {
            if let Err(e) = dispatcher.process(ctx, event, location) {
                dispatcher.unwind(ctx);
                return Err(e);
            }
        }
        dispatcher.finish(buffer.anchor())
    }

    fn finish(self, anchor: &Location) -> Result<(), SqlXmlError> {
        if self.frames.is_empty() {
            Ok(())
        } else {
            Err(SqlXmlError::Structure("unbalanced elements in template".to_string()).located(anchor))
        }
    }

    /// Drops every open directive and restores the context to the state it
    /// had before the outermost one started.
    fn unwind(&mut self, ctx: &mut ExecutionContext<'_>) {
        let outermost = self.frames.iter().find_map(|f| match f {
            Frame::Directive { mark, .. } => Some(*mark),
            _ => None,
        });
        self.frames.clear();
        if let Some(mark) = outermost {
            ctx.restore(&mark);
        }
    }

    fn consuming(&self) -> bool {
        matches!(
            self.frames.last(),
            Some(Frame::Directive {
                mode: BodyMode::Consume,
                ..
            })
        )
    }

    fn parent_directive(&self) -> Option<&dyn Directive> {
        self.frames.iter().rev().find_map(|f| match f {
            Frame::Directive { directive, .. } => Some(directive.as_ref()),
            _ => None,
        })
    }

    fn lookup(&self, local: &str) -> Option<&'static Registration> {
        if let Some(reg) = self
            .parent_directive()
            .and_then(|d| directives::find(d.children(), local))
        {
            return Some(reg);
        }
        if !self.frames.iter().any(|f| matches!(f, Frame::Directive { .. })) {
            if let Some(reg) = directives::find(self.seed, local) {
                return Some(reg);
            }
        }
        directives::find(GLOBAL, local)
    }

    pub fn process(
        &mut self,
        ctx: &mut ExecutionContext<'_>,
        event: &Event,
        location: &Location,
    ) -> Result<(), SqlXmlError> {
        if let Some(Frame::Capture { buffer, depth }) = self.frames.last_mut() {
            match event {
                Event::StartElement { .. } => *depth += 1,
                Event::EndElement { .. } if *depth == 0 => return self.end_capture(ctx, location),
                Event::EndElement { .. } => *depth -= 1,
                _ => {}
            }
            buffer.record(event.clone(), location.clone());
            return Ok(());
        }

        match event {
            Event::StartDocument => ctx.output().start_document().map_err(|e| e.located(location)),
            Event::EndDocument => ctx.output().end_document().map_err(|e| e.located(location)),
            Event::StartPrefixMapping { prefix, uri } => {
                ctx.push_namespace(prefix, uri);
                if self.consuming() {
                    Ok(())
                } else {
                    ctx.output()
                        .start_prefix_mapping(prefix, uri)
                        .map_err(|e| e.located(location))
                }
            }
            Event::EndPrefixMapping { prefix } => {
                ctx.pop_namespace(prefix);
                if self.consuming() {
                    Ok(())
                } else {
                    ctx.output()
                        .end_prefix_mapping(prefix)
                        .map_err(|e| e.located(location))
                }
            }
            Event::StartElement { name, attributes } => {
                if name.namespace.as_deref() == Some(directives::SQL_NAMESPACE_URI) {
                    self.start_directive(ctx, name, attributes, location)
                } else if self.consuming() {
                    Err(SqlXmlError::Structure(format!(
                        "element <{}> is not allowed inside a directive that reads its content",
                        name.qualified
                    ))
                    .located(location))
                } else {
                    self.frames.push(Frame::Literal { name: name.clone() });
                    ctx.output()
                        .start_element(name, attributes)
                        .map_err(|e| e.located(location))
                }
            }
            Event::EndElement { .. } => match self.frames.pop() {
                Some(Frame::Literal { name }) => ctx.output().end_element(&name).map_err(|e| e.located(location)),
                Some(Frame::Directive {
                    directive,
                    location: start,
                    mark,
                    ..
                }) => self.end_directive(ctx, directive, None, &start, &mark),
                _ => Err(SqlXmlError::Structure("unbalanced end tag".to_string()).located(location)),
            },
            Event::Characters(text) => match self.frames.last_mut() {
                Some(Frame::Directive {
                    directive,
                    mode: BodyMode::Consume,
                    location: start,
                    ..
                }) => directive.characters(ctx, text).map_err(|e| e.located(start)),
                _ => ctx.output().characters(text).map_err(|e| e.located(location)),
            },
            Event::ProcessingInstruction { target, data } => {
                if self.consuming() {
                    Ok(())
                } else {
                    ctx.output()
                        .processing_instruction(target, data)
                        .map_err(|e| e.located(location))
                }
            }
        }
    }

    fn start_directive(
        &mut self,
        ctx: &mut ExecutionContext<'_>,
        name: &XmlName,
        attributes: &[crate::events::Attribute],
        location: &Location,
    ) -> Result<(), SqlXmlError> {
        let local = name.local_name();
        let registration = self.lookup(local).ok_or_else(|| {
            SqlXmlError::Structure(format!("unknown directive <{}>", name.qualified)).located(location)
        })?;
        debug!("Starting directive <{}> at {}", name.qualified, location);

        let element = Element {
            name,
            attributes,
            location,
            consumed: self.consuming(),
        };
        let mark = ctx.mark();
        let mut directive = (registration.create)(local);
        let mode = match directive.start(ctx, &element) {
            Ok(mode) => mode,
            Err(e) => {
                ctx.restore(&mark);
                return Err(e.located(location));
            }
        };
        self.frames.push(Frame::Directive {
            directive,
            mode,
            location: location.clone(),
            mark,
        });
        if mode == BodyMode::Buffer {
            self.frames.push(Frame::Capture {
                buffer: EventBuffer::anchored(location.clone()),
                depth: 0,
            });
        }
        Ok(())
    }

    fn end_capture(&mut self, ctx: &mut ExecutionContext<'_>, location: &Location) -> Result<(), SqlXmlError> {
        let Some(Frame::Capture { buffer, .. }) = self.frames.pop() else {
            return Err(SqlXmlError::Structure("unbalanced end tag".to_string()).located(location));
        };
        match self.frames.pop() {
            Some(Frame::Directive {
                directive,
                location: start,
                mark,
                ..
            }) => self.end_directive(ctx, directive, Some(buffer), &start, &mark),
            _ => Err(SqlXmlError::Structure("unbalanced end tag".to_string()).located(location)),
        }
    }

    fn end_directive(
        &mut self,
        ctx: &mut ExecutionContext<'_>,
        directive: Box<dyn Directive>,
        body: Option<EventBuffer>,
        location: &Location,
        mark: &ContextMark,
    ) -> Result<(), SqlXmlError> {
        let output = match directive.end(ctx, body) {
            Ok(output) => output,
            Err(e) => {
                ctx.restore(mark);
                return Err(e.located(location));
            }
        };
        match output {
            None => Ok(()),
            Some(child) => self.deliver(ctx, child, location),
        }
    }

    /// Hands a child's result to the directive consuming it.
    fn deliver(
        &mut self,
        ctx: &mut ExecutionContext<'_>,
        child: ChildOutput,
        location: &Location,
    ) -> Result<(), SqlXmlError> {
        match self.frames.last_mut() {
            Some(Frame::Directive {
                directive,
                mode: BodyMode::Consume,
                ..
            }) => directive.accept(ctx, child).map_err(|e| e.located(location)),
            _ => Err(SqlXmlError::Structure(format!("a {} is not allowed here", child.kind())).located(location)),
        }
    }
}
