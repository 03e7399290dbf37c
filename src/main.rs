use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use voucherdesk::cli::output::OutputMode;
use voucherdesk::cli::{self, Cli, Commands};
use voucherdesk::config::{AppConfig, LoggingConfig};
use voucherdesk::controller::AppController;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.api_base {
        Some(base) => AppConfig::default_config(base),
        None => AppConfig::load_from(&cli.config_dir)?,
    };

    let shell = matches!(cli.command, Commands::Shell);
    let _guard = init_logging(&config.logging, cli.verbose, shell);

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("Invalid configuration: {}", e);
        }
        anyhow::bail!("configuration has {} problem(s)", errors.len());
    }

    let controller = AppController::from_config(&config)?;
    controller.start().await?;
    info!(ledger = %config.api.ledger_url, "voucherdesk ready");

    cli::run(cli.command, &controller, OutputMode::from_json_flag(cli.json)).await
}

/// Console logging for one-shot commands, a rolling file for the shell.
///
/// The returned guard flushes the file writer and must live until exit.
fn init_logging(
    logging: &LoggingConfig,
    verbose: bool,
    shell: bool,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let default_directive = if verbose {
        format!("{},voucherdesk=debug", logging.level)
    } else {
        logging.level.clone()
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&default_directive));

    let log_dir = if shell {
        cli::shell::data_dir()
            .map(|d| d.join("logs"))
            .filter(|d| std::fs::create_dir_all(d).is_ok())
    } else {
        None
    };

    match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(&dir, "voucherdesk.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true);
            if logging.json {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer.json())
                    .init();
            } else {
                tracing_subscriber::registry().with(filter).with(layer).init();
            }
            Some(guard)
        }
        None => {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false);
            if logging.json {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer.json())
                    .init();
            } else {
                tracing_subscriber::registry().with(filter).with(layer).init();
            }
            None
        }
    }
}
