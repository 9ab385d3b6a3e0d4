use anyhow::{Context, Result};
use appendable::{Format, IndexFile};
use clap::{Parser, ValueEnum};
use memmap::Mmap;
use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};

/// Builds or updates the index of an append-only JSON-lines or CSV file.
#[derive(Parser, Debug)]
#[command(name = "appendable", version)]
struct Args {
    /// Read this index and write the updated index to stdout
    #[arg(short = 'i', value_name = "INDEX")]
    index: Option<PathBuf>,

    /// Update this index in place, creating it if absent
    #[arg(short = 'I', value_name = "INDEX", conflicts_with = "index")]
    index_in_place: Option<PathBuf>,

    /// Data file format; defaults from the file extension
    #[arg(short, long, value_enum)]
    format: Option<DataFormat>,

    /// The data file to index
    data: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DataFormat {
    Jsonl,
    Csv,
}

impl From<DataFormat> for Format {
    fn from(format: DataFormat) -> Format {
        match format {
            DataFormat::Jsonl => Format::Jsonl,
            DataFormat::Csv => Format::Csv,
        }
    }
}

fn format_of(args: &Args) -> Format {
    match args.format {
        Some(format) => format.into(),
        None if args.data.extension().map_or(false, |ext| ext == "csv") => Format::Csv,
        None => Format::Jsonl,
    }
}

// an empty file cannot be mapped, so it is left unmapped.
fn map_data(path: &Path) -> Result<Option<Mmap>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open data file: {}", path.display()))?;
    let len = file
        .metadata()
        .with_context(|| format!("Failed to stat data file: {}", path.display()))?
        .len();
    if len == 0 {
        return Ok(None);
    }
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("Failed to map data file: {}", path.display()))?;
    Ok(Some(mmap))
}

fn synchronize<T: Read + Write + Seek>(backing: T, format: Format, data: &[u8]) -> Result<T> {
    let mut index = IndexFile::new(backing, format).context("Failed to open index")?;
    index.synchronize(data).context("Failed to synchronize index")?;
    Ok(index.into_inner())
}

fn write_stdout(bytes: &[u8]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(bytes).context("Failed to write index to stdout")?;
    stdout.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let format = format_of(&args);
    let mmap = map_data(&args.data)?;
    let data: &[u8] = mmap.as_deref().unwrap_or(&[]);
    log::debug!("indexing {} bytes of {} data", data.len(), format);

    match (&args.index, &args.index_in_place) {
        (_, Some(path)) => {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)
                .with_context(|| format!("Failed to open index file: {}", path.display()))?;
            let mut file = synchronize(file, format, data)?;
            file.flush()?;
            file.sync_all()
                .with_context(|| format!("Failed to sync index file: {}", path.display()))?;
        }
        (Some(path), None) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read index file: {}", path.display()))?;
            let index = synchronize(Cursor::new(bytes), format, data)?;
            write_stdout(index.get_ref())?;
        }
        (None, None) => {
            let index = synchronize(Cursor::new(Vec::new()), format, data)?;
            write_stdout(index.get_ref())?;
        }
    }
    Ok(())
}
