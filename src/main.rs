#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::{error, info};
use structopt::StructOpt;

use inflate_trace::{format_trace, gunzip, inflate_to_vec};

const MIN_RAW_CAPACITY: usize = 64 * 1024;

#[derive(StructOpt, Debug)]
#[structopt(about = "Decompress gzip or raw DEFLATE data and report where every bit went")]
struct Opts {
    /// Input file, stdin if absent
    #[structopt(parse(from_os_str))]
    input: Option<PathBuf>,

    /// Output file, stdout if absent
    #[structopt(short, long, parse(from_os_str))]
    output: Option<PathBuf>,

    /// Input is a raw DEFLATE stream rather than gzip
    #[structopt(short, long)]
    raw: bool,

    /// Write the bit trace instead of the decompressed data
    #[structopt(short, long)]
    trace: bool,

    /// Destination capacity for raw streams
    #[structopt(short, long)]
    size: Option<usize>,

    /// Silence all logging
    #[structopt(short, long)]
    quiet: bool,

    /// Verbosity (-v, -vv, -vvv)
    #[structopt(short, parse(from_occurrences))]
    verbose: usize,
}

fn read_input(path: &Option<PathBuf>) -> Result<Vec<u8>> {
    let mut source = Vec::new();
    match path {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            BufReader::new(file).read_to_end(&mut source)?;
        }
        None => {
            io::stdin().lock().read_to_end(&mut source)?;
        }
    }
    Ok(source)
}

fn open_output(path: &Option<PathBuf>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    })
}

fn run(opts: &Opts) -> Result<()> {
    let source = read_input(&opts.input)?;
    let (data, trace) = if opts.raw {
        let capacity = opts
            .size
            .unwrap_or_else(|| (source.len() * 16).max(MIN_RAW_CAPACITY));
        inflate_to_vec(&source, capacity).context("inflating raw stream")?
    } else {
        gunzip(&source).context("decompressing gzip stream")?
    };
    info!(
        "{} bytes in, {} bytes out, {} trace records",
        source.len(),
        data.len(),
        trace.len()
    );

    let mut output = open_output(&opts.output)?;
    if opts.trace {
        output.write_all(format_trace(&trace).as_bytes())?;
    } else {
        output.write_all(&data)?;
    }
    output.flush()?;
    Ok(())
}

fn main() {
    let opts = Opts::from_args();

    stderrlog::new()
        .module(module_path!())
        .module("inflate_trace")
        .quiet(opts.quiet)
        .verbosity(opts.verbose)
        .timestamp(stderrlog::Timestamp::Off)
        .init()
        .expect("failed to initialize logging");

    if let Err(err) = run(&opts) {
        error!("{:#}", err);
        std::process::exit(1);
    }
}
