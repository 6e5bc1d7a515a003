use clap::Parser;
use sqlxml::{Interpreter, InterpreterConfig, SqlXmlError, SqliteProvider, XmlDocument, XmlWriterSink};
use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Runs an SQL template against SQLite databases and prints the resulting XML.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Template file
    #[arg(short, long)]
    template: PathBuf,

    /// Input document the template's path expressions read from
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Datasource backed by a SQLite file, as NAME=PATH. Repeatable.
    #[arg(long = "sqlite", value_name = "NAME=PATH")]
    sqlite: Vec<String>,

    /// JSON interpreter configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Datasource used when the template binds none
    #[arg(long)]
    datasource: Option<String>,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn read(path: &PathBuf) -> Result<String, SqlXmlError> {
    fs::read_to_string(path).map_err(|e| {
        SqlXmlError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read '{}': {}", path.display(), e),
        ))
    })
}

fn main() -> Result<(), SqlXmlError> {
    if env::var("RUST_LOG").is_err() {
        unsafe {
            env::set_var("RUST_LOG", "sqlxml=info");
        }
    }
    env_logger::init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => InterpreterConfig::from_path(path)?,
        None => InterpreterConfig::default(),
    };
    config = config.with_system_id(args.template.display().to_string());
    if let Some(name) = args.datasource {
        config = config.with_default_datasource(name);
    }

    let mut provider = SqliteProvider::new();
    for spec in &args.sqlite {
        let (name, path) = spec
            .split_once('=')
            .ok_or_else(|| SqlXmlError::Config(format!("expected NAME=PATH, got '{}'", spec)))?;
        provider = provider.open_path(name, path).map_err(|e| SqlXmlError::Execution {
            statement: format!("open '{}'", path),
            source: e,
        })?;
    }

    let interpreter = Interpreter::new(config);
    let template = interpreter.parse_template(&read(&args.template)?)?;
    let data = match &args.data {
        Some(path) => read(path)?,
        None => "<data/>".to_string(),
    };
    let document = XmlDocument::parse(&data)?;

    let mut sink = XmlWriterSink::new(Vec::new()).with_declaration();
    interpreter.execute(&template, &document, &mut provider, &mut sink)?;
    let bytes = sink.into_inner();

    match &args.output {
        Some(path) => fs::write(path, &bytes)?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}
