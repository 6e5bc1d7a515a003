use crate::config::InterpreterConfig;
use crate::context::ExecutionContext;
use crate::datasource::XmlDocument;
use crate::dispatcher::Dispatcher;
use crate::error::SqlXmlError;
use crate::events::{EventSink, XmlWriterSink};
use crate::session::SessionProvider;
use crate::template::Template;
use log::{debug, info};
use std::time::Instant;

/// Runs templates against an input document and a session provider.
#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    config: InterpreterConfig,
}

impl Interpreter {
    pub fn new(config: InterpreterConfig) -> Self {
        Interpreter { config }
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Parses template text, reporting locations under the configured
    /// system id.
    pub fn parse_template(&self, source: &str) -> Result<Template, SqlXmlError> {
        Template::parse(source, &self.config.system_id)
    }

    /// Interprets `template` with `document` as the source of path
    /// expressions, streaming the result to `sink`. On error, whatever was
    /// already written to `sink` stays written.
    pub fn execute(
        &self,
        template: &Template,
        document: &XmlDocument<'_>,
        provider: &mut dyn SessionProvider,
        sink: &mut dyn EventSink,
    ) -> Result<(), SqlXmlError> {
        let start = Instant::now();
        let mut ctx = ExecutionContext::new(document.root_node(), &self.config, provider, sink);
        Dispatcher::replay(template.events(), &mut ctx, &[])?;
        info!(
            "Executed template '{}' in {:.2?}",
            self.config.system_id,
            start.elapsed()
        );
        Ok(())
    }

    /// Parses both inputs, runs the template and returns the serialised
    /// output.
    pub fn run_to_string(
        &self,
        template: &str,
        data: &str,
        provider: &mut dyn SessionProvider,
    ) -> Result<String, SqlXmlError> {
        let template = self.parse_template(template)?;
        let document = XmlDocument::parse(data)?;
        let mut writer = XmlWriterSink::new(Vec::new());
        self.execute(&template, &document, provider, &mut writer)?;
        let bytes = writer.into_inner();
        debug!("Serialised {} bytes of output", bytes.len());
        String::from_utf8(bytes).map_err(|e| SqlXmlError::Output(format!("output is not UTF-8: {}", e)))
    }
}
