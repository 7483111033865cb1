use anyhow::Result;
use clap::{Parser, Subcommand};

use metriclens::{
    ClientConfig, HttpTransport, MetricsClient, QueryRequest, SqlApiWarehouse, WarehouseConfig,
};

#[derive(Parser)]
#[command(name = "metriclens")]
#[command(about = "Explore a metrics catalog and compile aggregation queries")]
struct Args {
    /// Service base URL (or set LIGHTDASH_URL)
    #[arg(long)]
    url: Option<String>,

    /// Personal access token (or set LIGHTDASH_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// Project identifier (or set LIGHTDASH_PROJECT)
    #[arg(long)]
    project: Option<String>,

    /// Load metadata for at most this many catalogs
    #[arg(long)]
    catalog_limit: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List catalog names
    Catalogs,
    /// List all metrics
    Metrics {
        /// Attach each metric's eligible dimensions as a JSON column
        #[arg(long)]
        with_dimensions: bool,
    },
    /// Print every field row matching a name, as JSON
    Detail { name: String },
    /// List dimensions usable alongside a metric
    Dimensions { metric: String },
    /// Compile a query and print its SQL
    Compile {
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Compile a query and run it on the warehouse
    Run {
        #[command(flatten)]
        query: QueryArgs,
    },
}

#[derive(clap::Args)]
struct QueryArgs {
    /// Metric names, comma separated
    #[arg(long, value_delimiter = ',', required = true)]
    metrics: Vec<String>,

    /// Dimension names, comma separated
    #[arg(long, value_delimiter = ',')]
    dimensions: Vec<String>,

    /// Row limit passed to the compiler
    #[arg(long, default_value_t = 1)]
    limit: u32,
}

impl QueryArgs {
    fn into_request(self) -> QueryRequest {
        QueryRequest::for_metrics(self.metrics)
            .with_dimensions(self.dimensions)
            .with_limit(self.limit)
    }
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let url = require(args.url, "LIGHTDASH_URL", "--url")?;
    let token = require(args.token, "LIGHTDASH_TOKEN", "--token")?;
    let project = require(args.project, "LIGHTDASH_PROJECT", "--project")?;

    let mut config = ClientConfig::new(url, token, project);
    if let Some(limit) = args.catalog_limit {
        config = config.with_catalog_limit(limit);
    }

    let client = MetricsClient::connect(config, HttpTransport::new())?;

    match args.command {
        Command::Catalogs => {
            for name in client.catalogs() {
                println!("{}", name);
            }
        }
        Command::Metrics { with_dimensions } => {
            let frame = if with_dimensions {
                client.metrics_with_dimensions()?
            } else {
                client.all_metrics()?
            };
            println!("{}", frame);
        }
        Command::Detail { name } => {
            let records = client.metric_detail(&name)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::Dimensions { metric } => {
            println!("{}", client.dimensions_for_metric(&metric)?);
        }
        Command::Compile { query } => {
            let compiled = client.build_query(&query.into_request())?;
            println!("{}", compiled.query());
        }
        Command::Run { query } => {
            let compiled = client.build_query(&query.into_request())?;
            let warehouse_config = WarehouseConfig::from_env()?;
            let warehouse = SqlApiWarehouse::new(HttpTransport::new());
            let frame = compiled.execute_on(&warehouse, &warehouse_config)?;
            println!("{}", frame);
        }
    }

    Ok(())
}

fn require(value: Option<String>, var: &str, flag: &str) -> Result<String> {
    value
        .or_else(|| std::env::var(var).ok())
        .ok_or_else(|| anyhow::anyhow!("{} not given and {} is not set", flag, var))
}
