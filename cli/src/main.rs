#![allow(clippy::print_stderr, reason = "Reports go to the terminal")]
use crate::cli::{Args, Command, FederationArgs, QueryArgs};
use crate::sparql::{parse_select, SelectQuery};
use anyhow::{bail, Context};
use clap::Parser;
use fedfusion::common::ResultsIter;
use fedfusion::storage::MemSource;
use fedfusion::Federation;
use oxrdfio::RdfFormat;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{stdout, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod cli;
mod sparql;

pub fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let matches = Args::parse();
    match matches.command {
        Command::Query { federation, query } => {
            let federation = load_federation(&federation)?;
            let query = read_query(&query)?;
            let plan = federation.plan_with_optionals(&query.core, &query.optionals)?;
            let results = ResultsIter::new(federation.execute(&query.core, &plan)?);
            write_tsv(results, stdout().lock())
        }
        Command::Explain { federation, query } => {
            let federation = load_federation(&federation)?;
            let query = read_query(&query)?;
            let plan = federation.plan_with_optionals(&query.core, &query.optionals)?;
            let mut out = stdout().lock();
            writeln!(out, "{plan}")?;
            Ok(out.flush()?)
        }
    }
}

fn load_federation(args: &FederationArgs) -> anyhow::Result<Federation> {
    let mut federation = Federation::new(args.config())?;
    for argument in &args.sources {
        let (name, path) = match argument.split_once('=') {
            Some((name, path)) => (name.to_owned(), Path::new(path)),
            None => {
                let path = Path::new(argument.as_str());
                let name = path
                    .file_stem()
                    .and_then(OsStr::to_str)
                    .with_context(|| format!("Cannot derive a source name from {argument}"))?;
                (name.to_owned(), path)
            }
        };
        let format = rdf_format_from_path(path)?;
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let source = MemSource::from_reader(name, format, file)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        federation.register_source(Arc::new(source).into_source())?;
    }
    if !federation.init_all_sources(args.init_timeout())? {
        eprintln!("Some sources are still building their indexes, the answer may be incomplete");
    }
    Ok(federation)
}

fn read_query(args: &QueryArgs) -> anyhow::Result<SelectQuery> {
    let query = if let Some(query) = &args.query {
        query.clone()
    } else if let Some(file) = &args.query_file {
        fs::read_to_string(file)
            .with_context(|| format!("Failed to read the query file {}", file.display()))?
    } else {
        bail!("The --query or the --query-file option must be set")
    };
    parse_select(&query, args.query_base.as_deref())
}

/// Writes the solutions as SPARQL tab-separated values.
fn write_tsv(mut results: ResultsIter, writer: impl Write) -> anyhow::Result<()> {
    let mut writer = BufWriter::new(writer);
    let variables = results.var_names().to_vec();
    let header = variables
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    writeln!(writer, "{}", header.join("\t"))?;
    for solution in &mut results {
        let solution = solution?;
        let row = variables
            .iter()
            .map(|variable| {
                solution
                    .get(variable)
                    .map(ToString::to_string)
                    .unwrap_or_default()
            })
            .collect::<Vec<_>>();
        writeln!(writer, "{}", row.join("\t"))?;
    }
    results.close()?;
    Ok(writer.flush()?)
}

fn rdf_format_from_path(path: &Path) -> anyhow::Result<RdfFormat> {
    if let Some(ext) = path.extension().and_then(OsStr::to_str) {
        RdfFormat::from_extension(ext).with_context(|| {
            format!("Not able to guess the file format from file name extension '{ext}'")
        })
    } else {
        bail!(
            "The path {} has no extension to guess a file format from",
            path.display()
        )
    }
}
