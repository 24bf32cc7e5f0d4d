use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum, ValueHint};
use fedfusion::common::{
    AgglutinatorKind, CartesianMode, FederationConfig, JoinStrategy, MultiplexStrategy,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(about, version, name = "fedfusion", arg_required_else_help = true)]
/// FedFusion command line tool for federated SPARQL queries over RDF files
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Evaluate a SPARQL SELECT query over a federation of RDF files
    Query {
        #[command(flatten)]
        federation: FederationArgs,
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Print the plan of a SPARQL SELECT query without executing it
    Explain {
        #[command(flatten)]
        federation: FederationArgs,
        #[command(flatten)]
        query: QueryArgs,
    },
}

#[derive(ClapArgs)]
pub struct QueryArgs {
    /// The SPARQL query
    ///
    /// Only SELECT queries made of basic graph patterns, FILTER, OPTIONAL, DISTINCT and LIMIT are
    /// supported.
    #[arg(short, long, required_unless_present = "query_file")]
    pub query: Option<String>,
    /// File in which the query is stored
    #[arg(long, conflicts_with = "query", value_hint = ValueHint::FilePath)]
    pub query_file: Option<PathBuf>,
    /// Base IRI of the query
    #[arg(long, value_hint = ValueHint::Url)]
    pub query_base: Option<String>,
}

#[derive(ClapArgs)]
pub struct FederationArgs {
    /// RDF files to federate, each one becoming its own source
    ///
    /// A source is named after its file stem unless the argument has the form `name=path`. The
    /// format is guessed from the file extension.
    #[arg(short, long = "source", required = true, value_hint = ValueHint::FilePath)]
    pub sources: Vec<String>,
    /// How joins are executed
    #[arg(long, value_enum, default_value_t = JoinArg::Hash)]
    pub join: JoinArg,
    /// How the results of union children are combined
    #[arg(long, value_enum, default_value_t = MultiplexArg::Sequential)]
    pub multiplex: MultiplexArg,
    /// How the source verdicts are merged into plan leaves
    #[arg(long, value_enum, default_value_t = AgglutinatorArg::Standard)]
    pub agglutinator: AgglutinatorArg,
    /// Evaluate cartesian products as a union of their operands
    ///
    /// This is only correct if the operands are known to be alternatives.
    #[arg(long)]
    pub union_shortcut: bool,
    /// Do not let sources evaluate joins of their own fragments
    #[arg(long)]
    pub no_push_down: bool,
    /// Number of worker threads, 0 picking a default based on the number of CPUs
    #[arg(long, default_value_t = 0)]
    pub threads: usize,
    /// Milliseconds to wait for the sources to build their indexes
    #[arg(long, default_value_t = 10_000)]
    pub init_timeout: u64,
}

impl FederationArgs {
    pub fn config(&self) -> FederationConfig {
        let config = FederationConfig::new()
            .with_join_strategy(self.join.into())
            .with_multiplex_strategy(self.multiplex.into())
            .with_agglutinator(self.agglutinator.into())
            .with_push_down_sub_plans(!self.no_push_down)
            .with_cartesian_mode(if self.union_shortcut {
                CartesianMode::UnionShortcut
            } else {
                CartesianMode::Product
            });
        if self.threads == 0 {
            config
        } else {
            config.with_worker_threads(self.threads)
        }
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout)
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum JoinArg {
    Hash,
    Bind,
}

impl From<JoinArg> for JoinStrategy {
    fn from(value: JoinArg) -> Self {
        match value {
            JoinArg::Hash => JoinStrategy::Hash,
            JoinArg::Bind => JoinStrategy::Bind,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum MultiplexArg {
    Sequential,
    Buffered,
}

impl From<MultiplexArg> for MultiplexStrategy {
    fn from(value: MultiplexArg) -> Self {
        match value {
            MultiplexArg::Sequential => MultiplexStrategy::Sequential,
            MultiplexArg::Buffered => MultiplexStrategy::Buffered,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum AgglutinatorArg {
    Naive,
    Standard,
    Parallel,
}

impl From<AgglutinatorArg> for AgglutinatorKind {
    fn from(value: AgglutinatorArg) -> Self {
        match value {
            AgglutinatorArg::Naive => AgglutinatorKind::Naive,
            AgglutinatorArg::Standard => AgglutinatorKind::Standard,
            AgglutinatorArg::Parallel => AgglutinatorKind::Parallel,
        }
    }
}
