//! trendlab - command-line entry point

use clap::Parser;
use trendlab::cli::{cmd_evaluate, cmd_list, cmd_run, cmd_synthetic, Cli, Commands};
use trendlab::data::synthetic::SinusoidConfig;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trendlab=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List => cmd_list()?,
        Commands::Evaluate {
            data,
            classifier,
            params,
            target,
            indicators,
            remove,
            train_fraction,
            cv,
            seq_len,
            regression,
            output,
        } => cmd_evaluate(
            data,
            classifier,
            params,
            target,
            indicators,
            remove,
            train_fraction,
            cv,
            seq_len,
            regression,
            output,
        )?,
        Commands::Run { config } => cmd_run(config)?,
        Commands::Synthetic {
            output,
            length,
            amplitude,
            frequency,
            height,
            noise,
            seed,
        } => {
            let sinusoid = SinusoidConfig::default()
                .with_length(length)
                .with_amplitude(amplitude)
                .with_frequency(frequency)
                .with_height(height);
            cmd_synthetic(output, sinusoid, noise, seed)?
        }
    }

    Ok(())
}
