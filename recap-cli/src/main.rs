use clap::Parser;

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "recap",
    version,
    about = "Generate AI progress reports from git commit history"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Classify an error into an exit code.
///
/// Exit codes:
///   0 — success
///   1 — general/unknown error
///   2 — configuration error
///   3 — job not found
///   4 — database error
///   5 — repository sync error (network, auth, corrupt mirror)
///   6 — generation error (provider outage, quota, bad response)
///   7 — job already generating
fn classify_exit_code(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}");
    let lower = msg.to_lowercase();

    if lower.contains("config") || lower.contains("api_key") {
        2 // config error
    } else if lower.contains("no report job with id") {
        3 // job not found
    } else if lower.contains("database") || lower.contains("sqlite") || lower.contains("store error")
    {
        4 // database error
    } else if lower.contains("sync error")
        || lower.contains("authentication error")
        || lower.contains("corrupt repository")
        || lower.contains("unknown checkpoint")
    {
        5 // sync error
    } else if lower.contains("provider unavailable")
        || lower.contains("quota exceeded")
        || lower.contains("invalid response")
    {
        6 // generation error
    } else if lower.contains("already generating") {
        7 // concurrent run
    } else {
        1 // general error
    }
}

fn main() {
    // The reqwest build carries no default rustls crypto provider;
    // install one before anything constructs an HTTP client.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, 0) => "warn",
        (_, 1) => "info",
        (_, 2) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: Failed to create runtime: {e}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(commands::run(cli.command)) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(classify_exit_code(&e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_config() {
        let err = anyhow::anyhow!("Cannot parse config: recap.toml");
        assert_eq!(classify_exit_code(&err), 2);
    }

    #[test]
    fn exit_code_missing_api_key() {
        let err = anyhow::anyhow!("RECAP_API_KEY is not set (required to call the provider)");
        assert_eq!(classify_exit_code(&err), 2);
    }

    #[test]
    fn exit_code_job_missing() {
        let err = anyhow::anyhow!("Not found: no report job with id 42");
        assert_eq!(classify_exit_code(&err), 3);
    }

    #[test]
    fn exit_code_database() {
        let err = anyhow::anyhow!("Cannot open database: .recap/recap.db");
        assert_eq!(classify_exit_code(&err), 4);
    }

    #[test]
    fn exit_code_sync() {
        let err = anyhow::anyhow!("Sync error: Network error: connection refused");
        assert_eq!(classify_exit_code(&err), 5);
    }

    #[test]
    fn exit_code_generation() {
        let err = anyhow::anyhow!("Generation error: Provider unavailable: HTTP 503");
        assert_eq!(classify_exit_code(&err), 6);
    }

    #[test]
    fn exit_code_already_generating() {
        let err = anyhow::anyhow!("job 3 is already generating");
        assert_eq!(classify_exit_code(&err), 7);
    }

    #[test]
    fn exit_code_general() {
        let err = anyhow::anyhow!("Something unexpected happened");
        assert_eq!(classify_exit_code(&err), 1);
    }
}
