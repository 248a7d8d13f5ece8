//! padb CLI
//!
//! Command-line interface for inspecting and editing container files.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use padb::{Config, Container, FolderCatalog, Key, PadError, Record, SaveStrategy};
use tracing_subscriber::{fmt, EnvFilter};

/// padb CLI
#[derive(Parser, Debug)]
#[command(name = "padb")]
#[command(about = "Inspect and edit padb asset containers")]
#[command(version)]
struct Args {
    /// Write a temporary file and rename it into place on save
    #[arg(long, global = true)]
    atomic: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show header information and container metadata
    Info {
        /// Container file
        file: PathBuf,
    },

    /// List index entries
    List {
        /// Container file
        file: PathBuf,
    },

    /// Extract a record's payload
    Get {
        /// Container file
        file: PathBuf,

        /// Key as type:group:instance (hex)
        key: Key,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Store a file as a record
    Put {
        /// Container file (created if missing)
        file: PathBuf,

        /// Key as type:group:instance (hex)
        key: Key,

        /// File whose contents become the payload
        input: PathBuf,

        /// Record metadata as key=value (repeatable)
        #[arg(short, long = "meta")]
        meta: Vec<String>,

        /// Store a zero digest (disables integrity checking)
        #[arg(long)]
        no_digest: bool,
    },

    /// Remove a record
    Remove {
        /// Container file
        file: PathBuf,

        /// Key as type:group:instance (hex)
        key: Key,
    },

    /// Set container metadata
    Meta {
        /// Container file
        file: PathBuf,

        /// Tags as key=value
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// Merge touching holes in the hole index
    CompactHoles {
        /// Container file
        file: PathBuf,
    },

    /// Scan a folder of containers and print the merged catalog
    Scan {
        /// Root folder
        dir: PathBuf,

        /// Container file extension (repeatable)
        #[arg(short, long = "ext", default_value = "pad")]
        ext: Vec<String>,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,padb=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let strategy = if args.atomic {
        SaveStrategy::AtomicReplace
    } else {
        SaveStrategy::InPlace
    };
    let config = Config::builder().save_strategy(strategy).build();

    if let Err(e) = run(args.command, config) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(command: Commands, config: Config) -> padb::Result<()> {
    match command {
        Commands::Info { file } => {
            let container = Container::open(file, config)?;
            println!("version:        {}", container.version());
            println!("records:        {}", container.index().len());
            println!(
                "holes:          {} ({} bytes)",
                container.holes().len(),
                container.holes().total_size()
            );
            println!("metadata:       {}", container.metadata().len());
            for (k, v) in container.metadata().iter() {
                println!("  {} = {}", k, v);
            }
        }

        Commands::List { file } => {
            let container = Container::open(file, config)?;
            for entry in container.index() {
                println!(
                    "{}  offset=0x{:08X}  size={}",
                    entry.key(),
                    entry.offset(),
                    entry.size()
                );
            }
        }

        Commands::Get { file, key, output } => {
            let container = Container::open(file, config)?;
            let mut record = container.load_subfile(&key)?;
            let payload = record.payload()?;
            match output {
                Some(path) => fs::write(path, payload)?,
                None => io::stdout().write_all(payload)?,
            }
        }

        Commands::Put {
            file,
            key,
            input,
            meta,
            no_digest,
        } => {
            let mut container = Container::open(file, config)?;
            let mut record = Record::new();
            record.set_payload(fs::read(input)?, !no_digest)?;
            for tag in &meta {
                let (k, v) = split_tag(tag)?;
                record.metadata_mut().put(k, v)?;
            }
            container.put_record(key, record);
            container.save()?;
        }

        Commands::Remove { file, key } => {
            let mut container = Container::open(file, config)?;
            if container.remove(&key).is_none() {
                return Err(PadError::KeyNotFound(key));
            }
            container.save()?;
        }

        Commands::Meta { file, tags } => {
            let mut container = Container::open(file, config)?;
            for tag in &tags {
                let (k, v) = split_tag(tag)?;
                container.metadata_mut().put(k, v)?;
            }
            container.save()?;
        }

        Commands::CompactHoles { file } => {
            let mut container = Container::open(file, config)?;
            let before = container.holes().len();
            container.holes_mut().compact();
            println!("holes: {} -> {}", before, container.holes().len());
            container.save()?;
        }

        Commands::Scan { dir, ext } => {
            let config = Config::builder().container_extensions(ext).build();
            let catalog = FolderCatalog::new(dir, config)?;
            let report = catalog.scan()?;
            for (key, path) in catalog.entries() {
                println!("{}  {}", key, path.display());
            }
            println!(
                "{} keys from {} files ({} overridden)",
                catalog.len(),
                report.files_scanned,
                report.keys_overridden
            );
        }
    }

    Ok(())
}

fn split_tag(tag: &str) -> padb::Result<(&str, &str)> {
    tag.split_once('=')
        .ok_or_else(|| PadError::InvalidArgument(format!("Expected key=value, got {:?}", tag)))
}
