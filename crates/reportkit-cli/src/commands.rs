use super::args::{CacheCommand, Cli, Commands};
use super::handlers;
use crate::logging;
use anyhow::Result;
use reportkit_runtime::Runtime;

pub fn run(cli: Cli) -> Result<()> {
    logging::init(cli.log_level);

    let runtime = Runtime::load(cli.data_dir.as_deref())?;

    match cli.command {
        Commands::List => handlers::list::handle(&runtime),

        Commands::Render {
            report,
            format,
            filters,
            order_by,
            group_by,
            output,
        } => handlers::render::handle(
            &runtime,
            handlers::render::RenderRequest {
                report,
                format,
                filters,
                order_by,
                group_by,
                output,
            },
        ),

        Commands::Cache { command } => match command {
            CacheCommand::Flush => handlers::cache::flush(&runtime),
            CacheCommand::Reset { collection } => handlers::cache::reset(&runtime, &collection),
        },
    }
}
