//! geobisect: query, inspect and distribute encoded country tables.

use clap::{Parser, Subcommand};
use geobisect::{
    publish, AddressFamily, CountryDb, Encoder, EncoderConfig, RemoteCountryDb, Result, Version,
};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "geobisect")]
#[command(author = "Kaitu.io")]
#[command(version = "0.1.0")]
#[command(about = "Query, inspect and publish IP-to-country tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up the country of one or more addresses
    Lookup {
        /// Table prefix (<prefix>.v4 / <prefix>.v6)
        #[arg(short, long)]
        db: PathBuf,

        /// Also print the range each answer is valid for
        #[arg(short, long)]
        range: bool,

        /// Addresses to look up
        #[arg(required = true)]
        addrs: Vec<String>,
    },

    /// Encode a range feed with non-default settings
    Encode {
        /// Range feed (plain or gzip compressed CSV)
        #[arg(short, long)]
        input: PathBuf,

        /// Output prefix
        #[arg(short, long)]
        output: PathBuf,

        /// Accept any two ASCII bytes as a country code
        #[arg(long)]
        lenient: bool,

        /// Do not reject start addresses that go backwards
        #[arg(long)]
        no_order_check: bool,
    },

    /// Print record counts and the first records of each table
    Inspect {
        /// Table prefix
        #[arg(short, long)]
        db: PathBuf,

        /// Number of records to print per family
        #[arg(short = 'n', long, default_value_t = 0)]
        head: usize,
    },

    /// Publish tables into a versioned store directory
    Publish {
        /// Table prefix
        #[arg(short, long)]
        db: PathBuf,

        /// Store root
        #[arg(short, long)]
        store: PathBuf,

        /// Version stamp (`yyyy/epochMs` or bare epochMs); defaults to now
        #[arg(long)]
        stamp: Option<String>,
    },

    /// Initialize or update a local cache from a distribution endpoint
    Fetch {
        /// Endpoint base URL
        #[arg(short, long)]
        url: String,

        /// Cache directory
        #[arg(short, long)]
        cache_dir: PathBuf,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Lookup { db, range, addrs } => lookup(&db, range, &addrs),
        Commands::Encode {
            input,
            output,
            lenient,
            no_order_check,
        } => encode(&input, &output, lenient, no_order_check),
        Commands::Inspect { db, head } => inspect(&db, head),
        Commands::Publish { db, store, stamp } => publish_tables(&db, &store, stamp.as_deref()),
        Commands::Fetch { url, cache_dir } => fetch(&url, &cache_dir),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn lookup(prefix: &Path, range: bool, addrs: &[String]) -> Result<()> {
    let db = CountryDb::open(prefix)?;

    for input in addrs {
        let addr: IpAddr = input
            .trim()
            .parse()
            .map_err(|_| geobisect::Error::InvalidIpAddress(input.clone()))?;

        match db.lookup_entry(addr) {
            Some(entry) if range => {
                let end = entry
                    .next_start
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "end".to_string());
                println!("{}\t{}\t[{}, {})", addr, entry.country, entry.start, end);
            }
            Some(entry) => println!("{}\t{}", addr, entry.country),
            None => println!("{}\tunknown", addr),
        }
    }
    Ok(())
}

fn encode(input: &Path, output: &Path, lenient: bool, no_order_check: bool) -> Result<()> {
    let config = EncoderConfig::default()
        .with_strict_country(!lenient)
        .with_order_check(!no_order_check);
    let stats = Encoder::with_config(config).encode_file(input, output)?;

    println!("IPv4 records:     {}", stats.v4_records);
    println!("IPv6 records:     {}", stats.v6_records);
    println!("Skipped address:  {}", stats.skipped_address);
    println!("Skipped country:  {}", stats.skipped_country);
    println!("Gaps:             {}", stats.gaps);
    println!("Overlaps:         {}", stats.overlaps);
    Ok(())
}

fn inspect(prefix: &Path, head: usize) -> Result<()> {
    let db = CountryDb::open(prefix)?;

    for family in AddressFamily::ALL {
        match db.table(family) {
            Some(table) => {
                println!(
                    "{}: {} records ({} bytes, stride {})",
                    family,
                    table.len(),
                    table.as_bytes().len(),
                    family.stride()
                );
                for record in table.iter().take(head) {
                    println!("  {}\t{}", record.address, record.country);
                }
            }
            None => println!("{}: missing", family),
        }
    }
    Ok(())
}

fn publish_tables(prefix: &Path, store: &Path, stamp: Option<&str>) -> Result<()> {
    let version = match stamp {
        Some(v) => v.parse::<Version>()?,
        None => Version::now(),
    };
    let manifest = publish(prefix, store, &version)?;
    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(())
}

fn fetch(url: &str, cache_dir: &Path) -> Result<()> {
    let mut remote = RemoteCountryDb::new(url, cache_dir);
    remote.init()?;
    if remote.update()? {
        log::info!("Updated to a newer version");
    }

    match remote.version() {
        Some(v) => println!("{}", v),
        None => println!("unknown"),
    }
    Ok(())
}
