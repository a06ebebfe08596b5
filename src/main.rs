//! astroturf - command-line entry point

use astroturf_detect::cli::{cmd_env, cmd_import, cmd_merge, cmd_prepare, cmd_run, cmd_train, Cli, Commands};
use clap::Parser;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "astroturf_detect=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Import {
            store,
            collection,
            file,
            format,
            text_field,
            label_field,
            label,
        } => cmd_import(
            &store,
            &collection,
            &file,
            &format,
            &text_field,
            label_field.as_deref(),
            label,
        )?,
        Commands::Merge {
            store,
            target,
            first,
            second,
        } => cmd_merge(&store, &target, &first, &second)?,
        Commands::Prepare {
            store,
            collection,
            type_str,
            config,
            checkpoint_dir,
            state,
        } => cmd_prepare(
            &store,
            &collection,
            &type_str,
            config.as_deref(),
            &checkpoint_dir,
            &state,
        )?,
        Commands::Train {
            checkpoint_dir,
            type_str,
            config,
            models_prefix,
        } => cmd_train(&checkpoint_dir, &type_str, config.as_deref(), &models_prefix)?,
        Commands::Run { config } => cmd_run(&config)?,
        Commands::Env => cmd_env(),
    }

    Ok(())
}
