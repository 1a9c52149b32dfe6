use std::collections::BTreeMap;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use miette::IntoDiagnostic;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use encode_catalog::app::Catalog;
use encode_catalog::catalog::RELEASED;
use encode_catalog::config::ConfigLoader;
use encode_catalog::domain::SearchField;
use encode_catalog::download::FileSelection;
use encode_catalog::error::EncodeError;
use encode_catalog::model::FileRecord;
use encode_catalog::output::{JsonOutput, LogSink};
use encode_catalog::remote::EncodeHttpClient;
use encode_catalog::search::SearchFilters;

#[derive(Parser)]
#[command(name = "encode-cat")]
#[command(about = "Search, inspect and download ENCODE experiment metadata")]
#[command(version)]
struct Cli {
    /// JSON config file (defaults to ./encode-catalog.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Skip the on-disk caches entirely
    #[arg(long, global = true)]
    no_cache: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Search the experiment index")]
    Search(SearchArgs),
    #[command(about = "Show one experiment")]
    Experiment(ExperimentArgs),
    #[command(about = "Group an experiment's files")]
    Files(FilesArgs),
    #[command(about = "List file types, output categories and output types")]
    Facets(IdArgs),
    #[command(about = "Show one file of an experiment")]
    File(FileArgs),
    #[command(about = "Released files per type")]
    Summary(SummaryArgs),
    #[command(about = "Download released files of an experiment")]
    Download(DownloadArgs),
    #[command(about = "Page through the experiment index")]
    List(ListArgs),
    #[command(about = "Tabular projection of the index")]
    Table(TableArgs),
    #[command(about = "Inspect or invalidate the caches")]
    Cache(CacheArgs),
}

#[derive(Args)]
struct SearchArgs {
    #[command(subcommand)]
    command: SearchCommand,
}

#[derive(Subcommand)]
enum SearchCommand {
    Biosample(TermArgs),
    Target(TermArgs),
    Organism(OrganismArgs),
}

#[derive(Args)]
struct FilterArgs {
    #[arg(long)]
    organism: Option<String>,
    #[arg(long)]
    assay: Option<String>,
    #[arg(long)]
    target: Option<String>,
    #[arg(long)]
    include_revoked: bool,
}

impl FilterArgs {
    fn into_filters(self) -> SearchFilters {
        SearchFilters {
            organism: self.organism,
            assay_title: self.assay,
            target: self.target,
            exclude_revoked: !self.include_revoked,
        }
    }
}

#[derive(Args)]
struct TermArgs {
    term: String,
    #[command(flatten)]
    filters: FilterArgs,
}

#[derive(Args)]
struct OrganismArgs {
    organism: String,
    #[arg(long)]
    term: Option<String>,
    #[arg(long)]
    assay: Option<String>,
    #[arg(long)]
    target: Option<String>,
    #[arg(long)]
    include_revoked: bool,
}

#[derive(Args)]
struct IdArgs {
    id: String,
}

#[derive(Args)]
struct ExperimentArgs {
    id: String,
    /// Print the full catalog record instead of the summary
    #[arg(long)]
    raw: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum GroupBy {
    Type,
    Category,
    OutputType,
}

#[derive(Args)]
struct FilesArgs {
    id: String,
    /// Keep files released on or after this YYYY-MM-DD date
    #[arg(long)]
    after_date: Option<String>,
    /// File status to list (default: released); only used by the plain
    /// `--by type` file listing
    #[arg(long, conflicts_with_all = ["accessions", "only"])]
    status: Option<String>,
    #[arg(long, value_enum, default_value = "type")]
    by: GroupBy,
    /// Restrict groups to these keys (implies accession lists)
    #[arg(long)]
    only: Vec<String>,
    /// Print accessions instead of file records
    #[arg(long)]
    accessions: bool,
}

impl FilesArgs {
    fn status(&self) -> miette::Result<&str> {
        match (&self.status, self.by) {
            (Some(status), GroupBy::Type) => Ok(status.as_str()),
            (None, _) => Ok(RELEASED),
            (Some(_), _) => Err(miette::miette!(
                "--status only applies to the file listing of `--by type`"
            )),
        }
    }
}

#[derive(Args)]
struct FileArgs {
    id: String,
    file_id: String,
    #[arg(long)]
    url: bool,
}

#[derive(Args)]
struct SummaryArgs {
    id: String,
    #[arg(long)]
    max_per_type: Option<usize>,
}

#[derive(Args)]
struct DownloadArgs {
    id: String,
    #[arg(long = "file-type")]
    file_types: Vec<String>,
    #[arg(long = "accession")]
    accessions: Vec<String>,
    #[arg(long)]
    output_dir: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct ListArgs {
    #[arg(long, default_value_t = 0)]
    offset: usize,
    #[arg(long, default_value_t = 50)]
    limit: usize,
}

#[derive(Args)]
struct TableArgs {
    #[arg(long)]
    organism: Option<String>,
    #[arg(long = "assay")]
    assays: Vec<String>,
}

#[derive(Args)]
struct CacheArgs {
    #[command(subcommand)]
    command: CacheCommand,
}

#[derive(Subcommand)]
enum CacheCommand {
    #[command(about = "Show cache locations and sizes")]
    Stats,
    #[command(about = "Clear metadata for one experiment, all metadata, or the index snapshot")]
    Clear(ClearArgs),
    #[command(about = "Refetch one experiment, or the whole index")]
    Refresh(RefreshArgs),
}

#[derive(Args)]
struct ClearArgs {
    id: Option<String>,
    /// Clear every cached experiment instead of the index snapshot
    #[arg(long)]
    metadata: bool,
}

#[derive(Args)]
struct RefreshArgs {
    id: Option<String>,
}

#[derive(Serialize)]
struct FileUrl {
    accession: String,
    url: String,
}

#[derive(Serialize)]
struct Facets {
    file_types: Vec<String>,
    output_categories: Vec<String>,
    output_types: Vec<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<EncodeError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &EncodeError) -> u8 {
    if error.is_not_found() {
        2
    } else if error.is_remote() {
        3
    } else {
        1
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if cli.no_cache {
        config.use_cache = false;
    }
    let client = EncodeHttpClient::new(&config)?;
    let catalog = Catalog::new(config, client);

    match cli.command {
        Commands::Search(args) => run_search(&catalog, args.command),
        Commands::Experiment(args) => {
            let metadata = catalog.experiment(&args.id)?;
            if args.raw {
                JsonOutput::print(metadata.record()).into_diagnostic()
            } else {
                JsonOutput::print(metadata.summary()).into_diagnostic()
            }
        }
        Commands::Files(args) => run_files(&catalog, args),
        Commands::Facets(args) => {
            let metadata = catalog.experiment(&args.id)?;
            let files = catalog.file_catalog(&metadata);
            JsonOutput::print(&Facets {
                file_types: files.file_types(),
                output_categories: files.output_categories(),
                output_types: files.output_types(),
            })
            .into_diagnostic()
        }
        Commands::File(args) => {
            let metadata = catalog.experiment(&args.id)?;
            let files = catalog.file_catalog(&metadata);
            let missing = || EncodeError::NotFound(format!("{} in {}", args.file_id, args.id));
            if args.url {
                let url = files.file_url(&args.file_id).ok_or_else(missing)?;
                JsonOutput::print(&FileUrl {
                    accession: args.file_id.clone(),
                    url,
                })
                .into_diagnostic()
            } else {
                let file = files.file_metadata(&args.file_id).ok_or_else(missing)?;
                JsonOutput::print(file).into_diagnostic()
            }
        }
        Commands::Summary(args) => {
            let metadata = catalog.experiment(&args.id)?;
            let summary = catalog.file_catalog(&metadata).summary(args.max_per_type)?;
            JsonOutput::print(&summary).into_diagnostic()
        }
        Commands::Download(args) => {
            let selection = FileSelection {
                file_types: (!args.file_types.is_empty()).then_some(args.file_types),
                accessions: (!args.accessions.is_empty()).then_some(args.accessions),
            };
            let report =
                catalog.download(&args.id, args.output_dir.as_deref(), &selection, &LogSink)?;
            JsonOutput::print(&report).into_diagnostic()
        }
        Commands::List(args) => {
            let result = catalog.list_experiments(args.offset, args.limit)?;
            JsonOutput::print(&result).into_diagnostic()
        }
        Commands::Table(args) => {
            let assays = (!args.assays.is_empty()).then_some(args.assays.as_slice());
            let rows = catalog.samples_table(args.organism.as_deref(), assays)?;
            JsonOutput::print(&rows).into_diagnostic()
        }
        Commands::Cache(args) => run_cache(&catalog, args.command),
    }
}

fn run_search(catalog: &Catalog<EncodeHttpClient>, command: SearchCommand) -> miette::Result<()> {
    let results = match command {
        SearchCommand::Biosample(args) => {
            catalog.search(&args.term, SearchField::Biosample, &args.filters.into_filters())?
        }
        SearchCommand::Target(args) => {
            catalog.search(&args.term, SearchField::Target, &args.filters.into_filters())?
        }
        SearchCommand::Organism(args) => {
            let filters = SearchFilters {
                organism: None,
                assay_title: args.assay,
                target: args.target,
                exclude_revoked: !args.include_revoked,
            };
            catalog.search_by_organism(&args.organism, args.term.as_deref(), &filters)?
        }
    };
    tracing::info!(matches = results.len(), "search finished");
    JsonOutput::print(&results).into_diagnostic()
}

fn run_files(catalog: &Catalog<EncodeHttpClient>, args: FilesArgs) -> miette::Result<()> {
    let status = args.status()?;
    let metadata = catalog.experiment(&args.id)?;
    let files = catalog.file_catalog(&metadata);
    let only: Vec<&str> = args.only.iter().map(String::as_str).collect();
    let only = (!only.is_empty()).then_some(only.as_slice());

    match args.by {
        GroupBy::Type if args.accessions || only.is_some() => {
            let groups = files.accessions_by_type(args.after_date.as_deref(), only)?;
            JsonOutput::print(&groups).into_diagnostic()
        }
        GroupBy::Type => {
            let groups: BTreeMap<String, Vec<&FileRecord>> =
                files.files_by_type(args.after_date.as_deref(), status)?;
            JsonOutput::print(&groups).into_diagnostic()
        }
        GroupBy::Category => {
            JsonOutput::print(&files.accessions_by_output_category(only)).into_diagnostic()
        }
        GroupBy::OutputType => {
            JsonOutput::print(&files.accessions_by_output_type(only)).into_diagnostic()
        }
    }
}

fn run_cache(catalog: &Catalog<EncodeHttpClient>, command: CacheCommand) -> miette::Result<()> {
    match command {
        CacheCommand::Stats => JsonOutput::print(&catalog.cache_stats()?).into_diagnostic(),
        CacheCommand::Clear(args) => {
            let result = match (args.id, args.metadata) {
                (Some(id), _) => catalog.clear_one(&id)?,
                (None, true) => catalog.clear_all()?,
                (None, false) => catalog.clear_index()?,
            };
            JsonOutput::print(&result).into_diagnostic()
        }
        CacheCommand::Refresh(args) => match args.id {
            Some(id) => {
                let metadata = catalog.refresh_one(&id)?;
                JsonOutput::print(metadata.summary()).into_diagnostic()
            }
            None => JsonOutput::print(&catalog.refresh_index()?).into_diagnostic(),
        },
    }
}
