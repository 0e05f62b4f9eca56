//! geobisect-gen: encode an IP range feed into `<prefix>.v4` / `<prefix>.v6`.
//!
//! Prints the number of skipped rows to stdout; everything else goes to the
//! log on stderr.

use clap::Parser;
use geobisect::encode_file;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "geobisect-gen")]
#[command(author = "Kaitu.io")]
#[command(version = "0.1.0")]
#[command(about = "Encode an IP-range-to-country feed into fixed-stride lookup tables", long_about = None)]
struct Cli {
    /// Range feed (`start,end,country` CSV, plain or gzip compressed)
    input: PathBuf,

    /// Output prefix; writes <prefix>.v4 and <prefix>.v6
    out_prefix: PathBuf,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match encode_file(&cli.input, &cli.out_prefix) {
        Ok(stats) => println!("{}", stats.skipped()),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
