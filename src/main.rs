use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use cachesim::{
    config::Config,
    trace::{self, Trace},
};
use env_logger::Env;
use log::{info, warn};

fn main() -> Result<()> {
    let env = Env::default()
        .filter_or("CACHESIM_LOG", "info")
        .write_style_or("CACHESIM_LOG_STYLE", "auto");
    env_logger::init_from_env(env);

    let mut args = pico_args::Arguments::from_env();
    let heartbeat_int: u64 = args
        .opt_value_from_str("-h")
        .context("-h should be an integer")?
        .unwrap_or(0);

    let config = load_config(&mut args)?;

    let stats_path: Option<String> = args.opt_value_from_str("--json")?;
    let trace_path: PathBuf = args
        .opt_value_from_str::<_, String>("-t")?
        .unwrap_or_else(|| "traces.txt".to_owned())
        .into();
    let lines_per_block: usize = args
        .opt_value_from_str("--buffer-size")
        .context("--buffer-size must be an integer")?
        .unwrap_or(1024 * 16);
    let blocks_per_queue: usize = args
        .opt_value_from_str("--queue-size")
        .context("--queue-size must be an integer")?
        .unwrap_or(32);

    let unused = args.finish();
    if !unused.is_empty() {
        warn!("Ignoring unrecognized arguments: {unused:?}");
    }

    let mut hierarchy = config.build().context("Invalid cache configuration")?;

    let reader = Trace::open(&trace_path, lines_per_block, blocks_per_queue)
        .with_context(|| format!("Could not open trace {}", trace_path.display()))?;
    info!("Simulating {}", trace_path.display());

    let mut skipped = 0u64;
    let mut next_heartbeat = heartbeat_int;
    for block in reader.rec.iter() {
        skipped += trace::replay(&mut hierarchy, block)
            .with_context(|| format!("Could not finish {}", trace_path.display()))?;

        if heartbeat_int != 0 && hierarchy.accesses() >= next_heartbeat {
            println!("Accesses: {}", hierarchy.accesses());
            while next_heartbeat <= hierarchy.accesses() {
                next_heartbeat += heartbeat_int;
            }
        }
    }
    info!(
        "Ran {} accesses, skipped {} malformed line(s)",
        hierarchy.accesses(),
        skipped
    );

    let stats = hierarchy.stats();
    let report = stats
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n\n");
    println!("{report}");

    if let Some(stats_path) = stats_path {
        let stats_file = fs::File::create(&stats_path)
            .with_context(|| format!("Cannot open output file {stats_path}"))?;
        serde_json::to_writer_pretty(stats_file, &stats)
            .with_context(|| format!("Cannot write statistics to {stats_path}"))?;
    }

    Ok(())
}

/// `--config <json>` wins over `-p <path>`; without either the first-level
/// geometry comes from `-s`, `-b` and `-a`.
fn load_config(args: &mut pico_args::Arguments) -> Result<Config> {
    let config_str: Option<String> = args.opt_value_from_str("--config")?;
    let config_path: Option<String> = args.opt_value_from_str("-p")?;

    let config_str = match (config_str, config_path) {
        (Some(config_str), _) => config_str,
        (None, Some(config_path)) => fs::read_to_string(&config_path)
            .with_context(|| format!("Could not read config file {config_path}"))?,
        (None, None) => {
            let default = Config::default();
            let size: usize = args
                .opt_value_from_str("-s")
                .context("-s should be an integer")?
                .unwrap_or(default.dcache.size);
            let block_size: usize = args
                .opt_value_from_str("-b")
                .context("-b should be an integer")?
                .unwrap_or(default.dcache.block_size);
            let ways: usize = args
                .opt_value_from_str("-a")
                .context("-a should be an integer")?
                .unwrap_or(default.dcache.ways);
            return Ok(Config::with_l1(size, block_size, ways));
        }
    };

    serde_json::from_str(&config_str).context("Could not parse cache configuration")
}
