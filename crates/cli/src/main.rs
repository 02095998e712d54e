//! `vacal` -- terminal control panel for the VA calibration service.
//!
//! Submits calibration jobs, lists and clears the task history, watches a
//! task until it finishes, and shows or follows its log.
//!
//! # Environment variables
//!
//! | Variable                   | Required | Default                 | Description                    |
//! |----------------------------|----------|-------------------------|--------------------------------|
//! | `VACAL_API_URL`            | no       | `http://localhost:8000` | Task service base URL          |
//! | `STATUS_POLL_INTERVAL_MS`  | no       | `2000`                  | Period of the task status poll |
//! | `HISTORY_POLL_INTERVAL_MS` | no       | `3000`                  | Period of the history poll     |
//! | `RUST_LOG`                 | no       | `vacal_cli=info,...`    | Log filter (written to stderr) |

mod commands;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vacal_client::ClientConfig;
use vacal_core::request::{
    CalibrationRequest, DEFAULT_AGE_GROUP, DEFAULT_COUNTRY, DEFAULT_DATA_TYPE, DEFAULT_NSIM,
    MODE_FULL,
};

#[derive(Parser)]
#[command(name = "vacal", version, about = "VA calibration control panel")]
struct Cli {
    /// Task service base URL (overrides VACAL_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Submit a calibration job
    Submit {
        #[command(flatten)]
        request: SubmitArgs,
        /// Keep watching the new task until it finishes
        #[arg(long)]
        watch: bool,
    },
    /// List known tasks
    Tasks {
        /// Keep the list on screen and refresh it as it changes
        #[arg(long)]
        watch: bool,
    },
    /// Delete every task on the server
    Clear,
    /// Show one task's status and results
    Show {
        task_id: String,
        /// Print the rendered view as JSON
        #[arg(long)]
        json: bool,
    },
    /// Poll a task until it reaches a terminal state
    Watch {
        task_id: String,
        /// Stream the task log while watching
        #[arg(long)]
        follow_logs: bool,
    },
    /// Print a task's log
    Logs {
        task_id: String,
        /// Keep the connection open and print output as it is written
        #[arg(long)]
        follow: bool,
    },
    /// Check that the task service is up
    Health,
}

#[derive(Args)]
struct SubmitArgs {
    /// Execution mode: full, calibration_only or ensemble
    #[arg(long, default_value = MODE_FULL)]
    mode: String,
    /// Path to the VA dataset
    #[arg(long)]
    dataset: Option<String>,
    /// Path to pre-computed calibration data (calibration_only)
    #[arg(long)]
    calib_data: Option<String>,
    #[arg(long, default_value = DEFAULT_COUNTRY)]
    country: String,
    #[arg(long, default_value = DEFAULT_AGE_GROUP)]
    age_group: String,
    #[arg(long, default_value = DEFAULT_DATA_TYPE)]
    data_type: String,
    /// Number of InSilicoVA simulations
    #[arg(long, default_value_t = DEFAULT_NSIM)]
    nsim: u32,
    /// EAVA results (ensemble)
    #[arg(long)]
    eava: Option<String>,
    /// InSilicoVA results (ensemble)
    #[arg(long)]
    insilicova: Option<String>,
    /// InterVA results (ensemble)
    #[arg(long)]
    interva: Option<String>,
    #[arg(long)]
    mmat_type: Option<String>,
    #[arg(long)]
    n_mcmc: Option<u32>,
    #[arg(long)]
    n_burn: Option<u32>,
    #[arg(long)]
    n_thin: Option<u32>,
    #[arg(long)]
    seed: Option<u64>,
}

impl From<SubmitArgs> for CalibrationRequest {
    fn from(args: SubmitArgs) -> Self {
        Self {
            mode: args.mode,
            dataset_path: args.dataset,
            calib_data_path: args.calib_data,
            country: args.country,
            age_group: args.age_group,
            data_type: args.data_type,
            nsim: args.nsim,
            eava_path: args.eava,
            insilicova_path: args.insilicova,
            interva_path: args.interva,
            mmat_type: args.mmat_type,
            n_mcmc: args.n_mcmc,
            n_burn: args.n_burn,
            n_thin: args.n_thin,
            seed: args.seed,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vacal_cli=info,vacal_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env()?;
    if let Some(url) = cli.api_url {
        config.api_url = url.trim_end_matches('/').to_string();
    }
    tracing::debug!(api_url = %config.api_url, "Using task service");

    let ctx = commands::Context::new(config);

    match cli.cmd {
        Cmd::Submit { request, watch } => ctx.submit(request.into(), watch).await,
        Cmd::Tasks { watch } => ctx.tasks(watch).await,
        Cmd::Clear => ctx.clear().await,
        Cmd::Show { task_id, json } => ctx.show(task_id.into(), json).await,
        Cmd::Watch {
            task_id,
            follow_logs,
        } => ctx.watch(task_id.into(), follow_logs).await,
        Cmd::Logs { task_id, follow } => ctx.logs(task_id.into(), follow).await,
        Cmd::Health => ctx.health().await,
    }
}
