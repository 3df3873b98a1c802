use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use warpgrid_plugin::{GraphManifest, PluginRunner};

mod memcached;

use memcached::MemcachedPlugin;

#[derive(Parser)]
#[command(
    name = "warpgrid-plugin-memcached",
    about = "WarpGrid agent plugin — memcached stats",
    version
)]
struct Cli {
    /// memcached host
    #[arg(long, default_value = "localhost")]
    host: String,
    /// memcached port
    #[arg(long, default_value_t = 11211)]
    port: u16,
    /// State file path (default: derived from the invocation)
    #[arg(long)]
    tempfile: Option<PathBuf>,
    /// Prefix for every reported metric key
    #[arg(long)]
    metric_key_prefix: Option<String>,
    /// TOML manifest replacing the built-in graph definitions
    #[arg(long)]
    graphs: Option<PathBuf>,
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("warpgrid_plugin=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut plugin = MemcachedPlugin::new(&cli.host, cli.port);
    plugin.prefix = cli.metric_key_prefix;
    if let Some(path) = &cli.graphs {
        let manifest = GraphManifest::from_file(path)?;
        if plugin.prefix.is_none() {
            plugin.prefix = manifest.prefix;
        }
        plugin.graphs = Some(manifest.graphs);
    }

    let mut runner = PluginRunner::new(plugin);
    if let Some(path) = cli.tempfile {
        runner = runner.with_tempfile(path);
    }

    match runner.run() {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            error!(error = %e, "plugin run failed");
            Ok(ExitCode::FAILURE)
        }
    }
}
