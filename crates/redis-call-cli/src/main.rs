use redis_call_cli::run_cli;
use tracing::error;

#[tokio::main]
async fn main() {
    // Run CLI and handle errors
    if let Err(e) = run_cli().await {
        error!("CLI error: {}", e);
        eprintln!("redis-queue: {}", e);

        // Exit with appropriate code based on error type
        let exit_code = match e {
            redis_call_cli::CliError::Configuration(_) => 1,
            redis_call_cli::CliError::Store(_) => 2,
            redis_call_cli::CliError::InvalidArgument { .. } => 4,
            redis_call_cli::CliError::Io(_) => 5,
            redis_call_cli::CliError::Logging { .. } => 6,
        };

        std::process::exit(exit_code);
    }
}
