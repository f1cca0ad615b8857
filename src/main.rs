use clap::error::ErrorKind;
use clap::Parser;
use std::any::Any;
use std::process::ExitCode;
use tokio::task::JoinError;
use tracing::{error, info_span, Instrument};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use tsflow_runner::constants::{DEFAULT_PROBE_TIMEOUT, DEFAULT_SEARCH_LIMIT, DEFAULT_TIMEOUT};
use tsflow_runner::{AppError, Config, Envelope, Runner, SeeqClient};

/// Runs one bridge operation and prints its JSON envelope on stdout.
#[derive(Debug, Parser)]
#[command(name = "tsflow-runner", version, about)]
struct Cli {
    /// Operation name, e.g. `searchAndPullSensors`
    function: Option<String>,

    /// Positional arguments as a JSON array
    args: Option<String>,

    /// Anything after the arguments array is ignored
    #[arg(hide = true, trailing_var_arg = true, allow_hyphen_values = true)]
    extra: Vec<String>,

    /// Timeout for requests against the analytics server
    #[arg(long, env = "TSFLOW_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT.as_secs())]
    timeout_secs: u64,

    /// Timeout for reachability probes
    #[arg(long, env = "TSFLOW_PROBE_TIMEOUT_SECS", default_value_t = DEFAULT_PROBE_TIMEOUT.as_secs())]
    probe_timeout_secs: u64,

    /// Maximum items returned per sensor search
    #[arg(long, env = "TSFLOW_SEARCH_LIMIT", default_value_t = DEFAULT_SEARCH_LIMIT)]
    search_limit: usize,

    /// Log filter directive; logs go to stderr
    #[arg(long, env = "TSFLOW_LOG", default_value = "warn")]
    log_level: String,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            timeout_secs: self.timeout_secs,
            probe_timeout_secs: self.probe_timeout_secs,
            search_limit: self.search_limit,
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .init();
}

fn emit(envelope: &Envelope) {
    println!("{}", envelope.to_json_line());
}

fn execution_error(err: &AppError) -> Envelope {
    let message = format!("Execution error: {}", err);
    Envelope::fail(message.clone(), message)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Envelope for a command line clap could not accept.
fn rejected(err: &clap::Error) -> Envelope {
    let reason = err
        .to_string()
        .lines()
        .next()
        .unwrap_or_default()
        .trim_start_matches("error: ")
        .to_string();
    Envelope::usage().with("details", reason)
}

/// Envelope for an operation task that panicked or was cancelled.
fn aborted(join_error: JoinError) -> Envelope {
    let reason = if join_error.is_panic() {
        panic_message(join_error.into_panic().as_ref())
    } else {
        join_error.to_string()
    };
    error!(%reason, "operation task aborted");
    let message = format!("Execution error: {}", reason);
    let mut envelope = Envelope::fail(message.clone(), message);
    envelope.traceback = Some(format!("panicked: {}", reason));
    envelope
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            emit(&rejected(&e));
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&cli.log_level);

    let (Some(function), Some(args)) = (cli.function.clone(), cli.args.clone()) else {
        emit(&Envelope::usage());
        return ExitCode::FAILURE;
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            emit(&execution_error(&AppError::from(e)));
            return ExitCode::FAILURE;
        }
    };

    let config = cli.config();
    let span = info_span!("invocation", id = %Uuid::new_v4(), operation = %function);
    let outcome = runtime.block_on(async move {
        let mut runner = Runner::new(SeeqClient::new(config.clone()), &config);
        tokio::spawn(async move { runner.dispatch(&function, &args).await }.instrument(span)).await
    });

    match outcome {
        Ok(Ok(envelope)) => {
            emit(&envelope);
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            emit(&execution_error(&e));
            ExitCode::FAILURE
        }
        Err(join_error) => {
            emit(&aborted(join_error));
            ExitCode::FAILURE
        }
    }
}
