pub mod config;
pub mod error;
pub mod provider;
pub mod query;
pub mod queryable;
pub mod result;
pub mod schema;
pub mod transport;

pub use config::{ClientConfig, DuplicatePolicy, FieldDecl};
pub use error::ExpressError;
pub use provider::{Protocol, Provider, RenderedRequest};
pub use query::{Parameter, ParameterKind, ParameterValue};
pub use queryable::{QueryResult, Queryable};
pub use result::ResultBuilder;
pub use schema::{Document, FieldInfo, FieldSelector, Schema, ValueKind};

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use once_cell::sync::{Lazy, OnceCell};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use result::{FacetFieldResultBuilder, FacetQueryResultBuilder, FacetRangeResultBuilder};

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "solrx",
    version,
    about = "Build, render and run typed Solr queries"
)]
pub struct Cli {
    /// Config file (defaults to the platform config dir when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Base URL of the core or collection
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Request handler below the host
    #[arg(long, global = true)]
    pub handler: Option<String>,

    /// Protocol generation: classic or json-api
    #[arg(long, global = true)]
    pub protocol: Option<Protocol>,

    /// Fail on schema validation errors instead of warning
    #[arg(long, global = true, default_value_t = false)]
    pub fail_fast: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the rendered request without sending it
    Render(QueryArgs),
    /// Execute the query and print statistics, documents and facets as JSON
    Query(QueryArgs),
    /// Generate shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate man page to stdout
    Man,
}

/// Query parameters. Field values use `field:value`; ranges use `field:from..to`
/// with either bound optional.
#[derive(Args, Debug, Clone, Default)]
pub struct QueryArgs {
    /// Main query, passed through verbatim (defaults to *:*)
    #[arg(short = 'q', long = "query")]
    pub q: Option<String>,

    /// Filter query `field:value` (repeatable)
    #[arg(long = "filter")]
    pub filters: Vec<String>,

    /// Field to compute term counts for (repeatable)
    #[arg(long = "facet-field")]
    pub facet_fields: Vec<String>,

    /// Term count limit applied to every --facet-field
    #[arg(long)]
    pub facet_limit: Option<u32>,

    /// Named facet query `name=field:value` (repeatable)
    #[arg(long = "facet-query")]
    pub facet_queries: Vec<String>,

    /// Range facet `name=field,start,end,gap` (repeatable)
    #[arg(long = "facet-range")]
    pub facet_ranges: Vec<String>,

    /// Fields to return, comma separated
    #[arg(long, value_delimiter = ',')]
    pub fields: Vec<String>,

    /// Sort clause `field` or `field:desc` (repeatable)
    #[arg(long)]
    pub sort: Vec<String>,

    #[arg(long)]
    pub offset: Option<u64>,

    #[arg(long)]
    pub limit: Option<u64>,

    /// Query fields for the dismax/edismax parsers
    #[arg(long)]
    pub qf: Option<String>,
}

static CLI_SCHEMA: OnceCell<Schema> = OnceCell::new();
static EMPTY_SCHEMA: Lazy<Schema> = Lazy::new(Schema::default);

/// Untyped document projected through the schema assembled from config and arguments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CliDocument(pub Map<String, Value>);

impl Document for CliDocument {
    fn schema() -> &'static Schema {
        CLI_SCHEMA.get().unwrap_or(&EMPTY_SCHEMA)
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Render(args) => {
            let config = resolve_config(&cli)?;
            let queryable = build_queryable(&config, args)?;
            println!("{}", queryable.render());
            Ok(())
        }
        Commands::Query(args) => {
            let config = resolve_config(&cli)?;
            let queryable = build_queryable(&config, args)?;
            let output = run_query(&queryable, args)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "solrx", &mut std::io::stdout());
            Ok(())
        }
        Commands::Man => {
            let cmd = Cli::command();
            let man = clap_mangen::Man::new(cmd);
            let mut out = std::io::stdout();
            man.render(&mut out)?;
            Ok(())
        }
    }
}

/// Config file and environment, then command-line flags.
fn resolve_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config =
        ClientConfig::resolve(cli.config.as_deref()).context("loading configuration")?;
    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(handler) = &cli.handler {
        config.handler = handler.clone();
    }
    if let Some(protocol) = cli.protocol {
        config.protocol = protocol;
    }
    if cli.fail_fast {
        config.fail_fast = true;
    }
    Ok(config)
}

/// Declared `[[fields]]` plus stored, indexed text fields for any other name used.
pub fn cli_schema(config: &ClientConfig, names: &BTreeSet<String>) -> Result<Schema> {
    let declared: BTreeSet<&str> = config.fields.iter().map(|f| f.name.as_str()).collect();
    let mut builder = config.schema_builder();
    for name in names.iter().filter(|n| !declared.contains(n.as_str())) {
        builder = builder.simple(name, name, ValueKind::Text);
    }
    Ok(builder.build()?)
}

fn referenced_fields(args: &QueryArgs) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    for arg in &args.filters {
        names.insert(split_field(arg)?.0.to_string());
    }
    for arg in &args.facet_queries {
        let (_, value) = split_named(arg)?;
        names.insert(split_field(value)?.0.to_string());
    }
    for arg in &args.facet_ranges {
        let (_, rest) = split_named(arg)?;
        let field = rest.split(',').next().unwrap_or_default().trim();
        names.insert(field.to_string());
    }
    for arg in &args.sort {
        let field = arg.split_once(':').map_or(arg.as_str(), |(f, _)| f);
        names.insert(field.to_string());
    }
    names.extend(args.facet_fields.iter().cloned());
    names.extend(args.fields.iter().cloned());
    Ok(names)
}

fn build_queryable(config: &ClientConfig, args: &QueryArgs) -> Result<Queryable<CliDocument>> {
    let schema = cli_schema(config, &referenced_fields(args)?)?;
    CLI_SCHEMA
        .set(schema)
        .map_err(|_| anyhow!("document schema already initialised"))?;
    let schema = CliDocument::schema();

    let provider = Provider::from_config(config).context("building provider")?;
    let mut queryable = Queryable::new(provider, config);

    let main = match &args.q {
        Some(q) => ParameterValue::free(q.as_str())?,
        None => ParameterValue::all(),
    };
    queryable.parameter(Parameter::query(main))?;

    for arg in &args.filters {
        let value = field_value(schema, arg).with_context(|| format!("filter '{arg}'"))?;
        queryable.parameter(Parameter::filter(value))?;
    }
    for name in &args.facet_fields {
        queryable.parameter(Parameter::facet_field(schema.field(name)?, args.facet_limit))?;
    }
    for arg in &args.facet_queries {
        let (name, value) = split_named(arg)?;
        let value = field_value(schema, value).with_context(|| format!("facet query '{arg}'"))?;
        queryable.parameter(Parameter::facet_query(name, value)?)?;
    }
    for arg in &args.facet_ranges {
        let (name, rest) = split_named(arg)?;
        let parts: Vec<&str> = rest.split(',').map(str::trim).collect();
        let [field, start, end, gap] = parts.as_slice() else {
            bail!("facet range '{arg}' must be name=field,start,end,gap");
        };
        queryable.parameter(Parameter::facet_range(
            name,
            schema.field(field)?,
            *gap,
            *start,
            *end,
        )?)?;
    }
    if !args.fields.is_empty() {
        let selectors = args
            .fields
            .iter()
            .map(|name| schema.field(name))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        queryable.parameter(Parameter::fields(selectors)?)?;
    }
    for arg in &args.sort {
        let (name, ascending) = match arg.split_once(':') {
            Some((name, dir)) => (name, !dir.eq_ignore_ascii_case("desc")),
            None => (arg.as_str(), true),
        };
        queryable.parameter(Parameter::sort(schema.field(name)?, ascending))?;
    }
    if let Some(offset) = args.offset {
        queryable.parameter(Parameter::offset(offset))?;
    }
    if let Some(limit) = args.limit {
        queryable.parameter(Parameter::limit(limit))?;
    }
    if let Some(qf) = &args.qf {
        queryable.parameter(Parameter::query_field(qf.as_str())?)?;
    }
    Ok(queryable)
}

fn run_query(queryable: &Queryable<CliDocument>, args: &QueryArgs) -> Result<Value> {
    let result = queryable.execute().context("executing query")?;
    let stats = result.statistics()?;

    let mut output = Map::new();
    output.insert(
        "statistics".into(),
        json!({
            "document_count": stats.document_count,
            "is_empty": stats.is_empty,
            "elapsed_ms": stats.elapsed_time.as_millis() as u64,
        }),
    );
    if !args.fields.is_empty() {
        output.insert(
            "documents".into(),
            serde_json::to_value(result.documents()?)?,
        );
    }
    if !args.facet_fields.is_empty() {
        output.insert(
            "facet_fields".into(),
            serde_json::to_value(result.get(&FacetFieldResultBuilder)?)?,
        );
    }
    if !args.facet_queries.is_empty() {
        output.insert(
            "facet_queries".into(),
            serde_json::to_value(result.get(&FacetQueryResultBuilder)?)?,
        );
    }
    if !args.facet_ranges.is_empty() {
        output.insert(
            "facet_ranges".into(),
            serde_json::to_value(result.get(&FacetRangeResultBuilder)?)?,
        );
    }
    Ok(Value::Object(output))
}

fn split_field(arg: &str) -> Result<(&str, &str)> {
    arg.split_once(':')
        .filter(|(field, _)| !field.trim().is_empty())
        .ok_or_else(|| anyhow!("expected field:value, got '{arg}'"))
}

fn split_named(arg: &str) -> Result<(&str, &str)> {
    arg.split_once('=')
        .filter(|(name, _)| !name.trim().is_empty())
        .ok_or_else(|| anyhow!("expected name=..., got '{arg}'"))
}

/// `field:value`, `field:from..to`, `field:from..` or `field:..to`.
fn field_value(schema: &Schema, arg: &str) -> Result<ParameterValue> {
    let (name, value) = split_field(arg)?;
    let field = schema.field(name)?;
    let value = match value.split_once("..") {
        Some((from, to)) => {
            let bound = |s: &str| (!s.trim().is_empty()).then(|| s.trim().to_string());
            ParameterValue::range(field, bound(from), bound(to))?
        }
        None => ParameterValue::single(field, value)?,
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::builder()
            .simple("price", "Price", ValueKind::Float)
            .simple("name", "Name", ValueKind::Text)
            .build()
            .unwrap()
    }

    #[test]
    fn field_values_parse_ranges() {
        let schema = schema();
        assert_eq!(field_value(&schema, "name:ipod").unwrap().execute(), "Name:ipod");
        assert_eq!(
            field_value(&schema, "price:10..").unwrap().execute(),
            "Price:[10 TO *]"
        );
        assert_eq!(
            field_value(&schema, "price:..99.5").unwrap().execute(),
            "Price:[* TO 99.5]"
        );
        assert!(field_value(&schema, "price:..").is_err());
        assert!(field_value(&schema, "ipod").is_err());
        assert!(field_value(&schema, "color:red").is_err());
    }

    #[test]
    fn undeclared_names_fall_back_to_text_fields() {
        let config = ClientConfig {
            fields: vec![FieldDecl {
                name: "price".into(),
                wire_name: Some("Price".into()),
                kind: ValueKind::Float,
                stored: true,
                indexed: true,
            }],
            ..ClientConfig::default()
        };
        let names: BTreeSet<String> = ["price", "cat"].iter().map(|s| s.to_string()).collect();
        let schema = cli_schema(&config, &names).unwrap();
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.field("price").unwrap().wire_name(), "Price");
        let cat = schema.field("cat").unwrap();
        assert_eq!(cat.wire_name(), "cat");
        assert_eq!(cat.kind(), ValueKind::Text);
    }

    #[test]
    fn referenced_fields_cover_every_argument() {
        let args = QueryArgs {
            filters: vec!["inStock:true".into()],
            facet_fields: vec!["cat".into()],
            facet_queries: vec!["cheap=price:..10".into()],
            facet_ranges: vec!["p=popularity,0,10,5".into()],
            fields: vec!["id".into()],
            sort: vec!["score:desc".into()],
            ..QueryArgs::default()
        };
        let names: Vec<String> = referenced_fields(&args).unwrap().into_iter().collect();
        assert_eq!(
            names,
            vec!["cat", "id", "inStock", "popularity", "price", "score"]
        );
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
