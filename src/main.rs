use clap::{Parser, Subcommand};
use std::path::PathBuf;

use binpickle::codec::CodecConfig;

#[derive(Parser)]
#[command(name = "bpck", version = "0.2.0", about = "The BinPickle container format CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack one or more files into a BinPickle container, one buffer per input
    Pack {
        #[arg(short, long)]
        output: PathBuf,
        /// Codec: none (default), zstd, lz4, brotli
        #[arg(short, long, default_value = "none")]
        codec: String,
        #[arg(short, long, default_value = "3")]
        level: i32,
        /// Page-align each buffer so it can later be opened in mapped mode
        #[arg(long)]
        align: bool,
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,
    },
    /// Show container metadata and the buffer index
    Inspect { input: PathBuf },
    /// Open and verify every buffer's digest against the index
    Verify { input: PathBuf },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Commands::Pack {
            output,
            input,
            codec,
            level,
            align,
            ..
        } => {
            let chain = if codec == "none" {
                vec![]
            } else {
                vec![CodecConfig::with_level(&codec, level)]
            };

            let mut writer = binpickle::create(&output)?;
            for path in &input {
                let data = std::fs::read(path)?;
                let len = data.len();
                writer.write_buffer(&data, &chain, None, align)?;
                println!("  packed  {} ({len} B)", path.display());
            }
            writer.finalize()?;
            writer.close()?;
            let size = std::fs::metadata(&output)?.len();
            println!("Created: {}  ({size} B on disk)", output.display());
        }

        Commands::Inspect { input } => {
            let reader = binpickle::open(&input, false)?;
            println!("── BinPickle container ──────────────────────────────");
            println!("  Path            {}", input.display());
            println!("  Format version  {}", reader.format_version());
            println!("  Buffers         {}", reader.entries().len());
            println!(
                "  {:<6} {:>12} {:>12}  {:<24} hash",
                "idx", "dec_len", "enc_len", "codecs"
            );
            for (i, entry) in reader.entries().iter().enumerate() {
                let codecs = if entry.codecs.is_empty() {
                    "-".to_string()
                } else {
                    entry
                        .codecs
                        .iter()
                        .map(|c| c.id.as_str())
                        .collect::<Vec<_>>()
                        .join("+")
                };
                println!(
                    "  {:<6} {:>12} {:>12}  {:<24} {}",
                    i,
                    entry.dec_length,
                    entry.enc_length,
                    codecs,
                    hex::encode(&entry.hash[..8]),
                );
            }
        }

        Commands::Verify { input } => {
            let reader = binpickle::open(&input, false)?;
            let total = reader.entries().len();
            let mut failures = 0usize;
            for i in 0..total {
                match reader.get_buffer(i) {
                    Ok(_) => println!("  [{i}] ok"),
                    Err(err) => {
                        failures += 1;
                        println!("  [{i}] FAILED: {err}");
                    }
                }
            }
            reader.close().map_err(|(_, err)| err)?;
            if failures > 0 {
                println!("{failures} buffer(s) failed verification");
                std::process::exit(1);
            }
            println!("all {total} buffer(s) verified");
        }
    }

    Ok(())
}
