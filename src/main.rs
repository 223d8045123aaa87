use sql_guardian::metrics::{CagrRequest, MetricKind, MetricRequest};
use sql_guardian::pipeline::{PipelineRequest, SummaryNarrative};
use sql_guardian::{GuardianConfig, Pipeline};

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sql-guardian")]
#[command(about = "Schema-checked, retrying SQL execution with metric and narrative validation")]
#[command(version)]
struct Args {
    /// Database URL (or set DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Total execution attempts per statement
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Enable edit-distance table name correction
    #[arg(long, global = true)]
    fuzzy: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Re-read the schema catalog from the database
    RefreshCatalog,
    /// Correct and validate a statement without executing it
    Validate {
        #[arg(long)]
        sql: String,
    },
    /// Run a statement through the full pipeline
    Run {
        #[arg(long)]
        sql: String,

        /// Question the statement answers; drives metric detection
        #[arg(long)]
        question: Option<String>,

        /// Narrative to validate; a summary is generated when omitted
        #[arg(long)]
        narrative: Option<String>,

        /// Force a metric instead of detecting one (growth, ratio, share, aov, cagr)
        #[arg(long)]
        metric: Option<MetricKind>,
    },
    /// Compound annual growth rate computed inside the database
    Cagr {
        #[arg(long)]
        table: String,

        #[arg(long)]
        value_column: String,

        #[arg(long)]
        date_column: String,

        #[arg(long)]
        start: i32,

        #[arg(long)]
        end: i32,
    },
    /// Print the join clause between two tables
    Join {
        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // Join only reads the relationship list
    if let Commands::Join { from, to } = &args.command {
        let graph = GuardianConfig::relationship_graph_from_lookup(|key| std::env::var(key).ok())?;
        match graph.build_join_clause(from, to) {
            Some(clause) => println!("FROM {} {}", from, clause),
            None => println!("no relationship between {} and {}", from, to),
        }
        return Ok(());
    }

    if let Some(url) = &args.database_url {
        std::env::set_var("DATABASE_URL", url);
    }
    let mut config = GuardianConfig::from_env()?;
    if let Some(max_retries) = args.max_retries {
        config.max_retries = max_retries;
    }
    if args.fuzzy {
        config.fuzzy_table_names = true;
    }

    let pipeline = Pipeline::connect(&config).await?;

    match args.command {
        Commands::RefreshCatalog => {
            let snapshot = pipeline.executor().corrector().catalog().refresh().await?;
            info!("Catalog holds {} tables", snapshot.tables.len());
            print_json(&*snapshot)?;
        }
        Commands::Validate { sql } => match pipeline.executor().corrector().prepare(&sql).await {
            Ok(plan) => print_json(&plan)?,
            Err(rejection) => {
                print_json(&rejection.plan)?;
                anyhow::bail!(rejection.error);
            }
        },
        Commands::Run {
            sql,
            question,
            narrative,
            metric,
        } => {
            let mut request = PipelineRequest::new(sql);
            if let Some(question) = question {
                request = request.with_question(question);
            }
            if let Some(narrative) = narrative {
                request = request.with_narrative(narrative);
            }
            if let Some(kind) = metric {
                request = request.with_metric(MetricRequest::new(kind));
            }
            let outcome = pipeline.run(request, Some(&SummaryNarrative)).await;
            print_json(&*outcome)?;
        }
        Commands::Cagr {
            table,
            value_column,
            date_column,
            start,
            end,
        } => {
            let request = CagrRequest::new(table, value_column, date_column, start, end)?;
            let metric = pipeline.metrics().cagr(&request).await?;
            print_json(&metric)?;
        }
        Commands::Join { .. } => {}
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
