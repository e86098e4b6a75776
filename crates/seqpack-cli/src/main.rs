use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "seqpack",
    about = "Sequence packing: bin-packing, grouping, prefix merging, load balance",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack sequence lengths into bins.
    ///
    /// The job is read from a TOML config (capacity, strategy, grouping and
    /// parallel settings). Lengths are a JSON array of numbers. The packing
    /// is printed as JSON.
    Pack {
        /// Pack config file (TOML)
        #[arg(short, long)]
        config: PathBuf,
        /// Item lengths (JSON array)
        #[arg(short, long)]
        lengths: PathBuf,
        /// Override the strategy named in the config
        #[arg(short, long)]
        strategy: Option<String>,
        /// Treat lengths and capacities as floating point
        #[arg(long)]
        float: bool,
        /// Check the result before printing it
        #[arg(long)]
        verify: bool,
    },
    /// Split packed sequences across nodes with mirrored segments.
    Balance {
        /// Sequences (JSON array of arrays of lengths)
        #[arg(short, long)]
        lengths: PathBuf,
        /// Number of nodes
        #[arg(short, long)]
        nodes: usize,
    },
    /// Sort keyed groups by prefix, optionally merging shared prefixes.
    Radix {
        /// Groups (JSON array of arrays of [key, position] pairs)
        #[arg(short, long)]
        groups: PathBuf,
        #[arg(long, default_value_t = 0)]
        start_index: usize,
        #[arg(long, default_value_t = 64)]
        max_index: usize,
        #[arg(long, default_value_t = 65535)]
        max_value: u32,
        /// Merge sorted groups that share at least this many leading keys
        #[arg(long)]
        merge: Option<usize>,
        #[arg(long, default_value_t = 8192)]
        max_length: usize,
        #[arg(long, default_value_t = 16)]
        max_count: usize,
        /// Let a group join any open merged group, not only the previous one
        #[arg(long)]
        cross_group: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("seqpack_core=info".parse()?)
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Pack {
            config,
            lengths,
            strategy,
            float,
            verify,
        } => {
            let options = commands::pack::PackOptions {
                strategy: strategy.as_deref(),
                verify,
            };
            if float {
                commands::pack::pack::<f64>(&config, &lengths, &options)
            } else {
                commands::pack::pack::<u64>(&config, &lengths, &options)
            }
        }
        Commands::Balance { lengths, nodes } => commands::balance::balance(&lengths, nodes),
        Commands::Radix {
            groups,
            start_index,
            max_index,
            max_value,
            merge,
            max_length,
            max_count,
            cross_group,
        } => commands::radix::radix(
            &groups,
            &commands::radix::RadixOptions {
                start_index,
                max_index,
                max_value,
                merge,
                max_length,
                max_count,
                cross_group,
            },
        ),
    }
}
