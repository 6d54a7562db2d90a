#![warn(
    clippy::all,
    clippy::pedantic,
    anonymous_parameters,
    elided_lifetimes_in_paths,
    missing_copy_implementations,
    missing_debug_implementations,
    single_use_lifetimes,
    trivial_casts,
    unreachable_pub,
    unused_lifetimes
)]

use clap::Parser;
use peephole::{rewrites::PassKind, Program, Runner, RunnerConfig};
use std::{
    fs,
    io::{self, Read},
    path::PathBuf,
};

/// Simplifies a program with peephole rewrites and prints the result.
#[derive(Parser)]
#[clap(version, author, about)]
struct Opts {
    /// The program to rewrite. If no file is specified, reads from stdin.
    #[clap(parse(from_os_str))]
    file: Option<PathBuf>,

    /// A JSON file with runner settings.
    #[clap(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// The maximum number of iterations.
    #[clap(long)]
    iter_limit: Option<usize>,

    /// A pass to run. May be repeated; replaces the configured passes.
    #[clap(long = "pass")]
    passes: Vec<PassKind>,

    /// Prints the run report as JSON.
    #[clap(long)]
    json: bool,

    /// Enables pretty-printing of JSON output.
    #[clap(long)]
    pretty: bool,
}

fn main() {
    env_logger::init();
    let opts: Opts = Opts::parse();

    let mut config = opts.config.map_or_else(RunnerConfig::default, |path| {
        RunnerConfig::from_file(path).expect("Error reading config")
    });
    if let Some(iter_limit) = opts.iter_limit {
        config.iter_limit = iter_limit;
    }
    if !opts.passes.is_empty() {
        config.passes = opts.passes;
    }

    let input = opts
        .file
        .map_or_else(
            || {
                let mut buf = String::new();
                io::stdin().read_to_string(&mut buf).map(|_| buf)
            },
            fs::read_to_string,
        )
        .expect("Error reading input");
    let mut program: Program = input.parse().expect("Error parsing program");

    let report = Runner::new(&config).run(&mut program);

    for (graph, _) in program.graphs() {
        println!("{}", program.display_graph(graph));
    }

    if opts.json {
        if opts.pretty {
            serde_json::to_writer_pretty(io::stdout(), &report)
                .expect("Error pretty-printing JSON output");
        } else {
            serde_json::to_writer(io::stdout(), &report).expect("Error printing JSON output");
        }
        println!();
    } else {
        eprintln!(
            "{} rewrites in {} iterations ({:?})",
            report.total_rewrites(),
            report.iterations,
            report.stop_reason
        );
        for (pass, count) in &report.rewrites {
            eprintln!("  {}: {}", pass, count);
        }
    }
}
