use anyhow::{bail, Context};
use celestial_mask::{LoadOptions, Mask, QueryConfig, QueryEngine, Selection, WriteOptions};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Parser)]
#[command(name = "mask")]
#[command(about = "Inspect, query and convert spherical polygon masks")]
struct Cli {
    /// Log at debug level (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print mask header, polygon count, areas and columns
    Info {
        /// Mask file (.ply, .pol or .fits)
        mask: PathBuf,
        /// Load sibling column files of a text mask
        #[arg(long)]
        extra_columns: bool,
    },
    /// Classify points into polygons
    Polyid {
        /// Mask file (.ply, .pol or .fits)
        mask: PathBuf,
        /// Text file with one whitespace-separated `ra dec` pair per line
        points: PathBuf,
        /// Use the scalar kernel only
        #[arg(long)]
        scalar: bool,
        /// Print query timing
        #[arg(long)]
        timing: bool,
        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Convert between text and binary masks
    Convert {
        input: PathBuf,
        output: PathBuf,
        /// Keep source ids in an `ids` column and write them back out
        #[arg(long)]
        keep_ids: bool,
        /// Read and write sibling column files of text masks
        #[arg(long)]
        extra_columns: bool,
        /// Weighting scheme suffix stripped from sibling file names
        #[arg(long)]
        weight_column: Option<String>,
    },
    /// Write the polygons in `start..end` (every `step`-th) to a new mask
    Select {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        start: Option<isize>,
        #[arg(long)]
        end: Option<isize>,
        #[arg(long, default_value = "1")]
        step: isize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Info {
            mask,
            extra_columns,
        } => {
            let options = LoadOptions::default().read_extra_columns(extra_columns);
            let loaded = open(&mask, &options)?;
            print_info(&mask, &loaded);
        }
        Commands::Polyid {
            mask,
            points,
            scalar,
            timing,
            format,
        } => {
            let loaded = open(&mask, &LoadOptions::default())?;
            let (ra, dec) = read_points(&points)?;
            let engine = QueryEngine::with_config(&loaded, QueryConfig::with_fast_backend(!scalar));

            let start = timing.then(Instant::now);
            let positions = engine.classify_positions(&ra, &dec)?;
            if let Some(start) = start {
                eprintln!(
                    "Classified {} points against {} polygons in {:.2} ms",
                    ra.len(),
                    loaded.len(),
                    start.elapsed().as_secs_f64() * 1000.0
                );
            }

            let rows: Vec<PointRow> = positions
                .iter()
                .enumerate()
                .map(|(k, position)| PointRow::new(&loaded, ra[k], dec[k], *position))
                .collect();
            match format {
                OutputFormat::Table => print_table(&rows),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
                OutputFormat::Csv => print_csv(&rows),
            }
        }
        Commands::Convert {
            input,
            output,
            keep_ids,
            extra_columns,
            weight_column,
        } => {
            let load = LoadOptions::default()
                .keep_ids(keep_ids)
                .read_extra_columns(extra_columns);
            let mask = open(&input, &load)?;

            let mut write = WriteOptions::default()
                .keep_ids(keep_ids)
                .write_extra_columns(extra_columns);
            if let Some(name) = weight_column {
                write = write.weight_column(name);
            }
            save(&mask, &output, &write)?;
            println!("Wrote {} polygons to {}", mask.len(), output.display());
        }
        Commands::Select {
            input,
            output,
            start,
            end,
            step,
        } => {
            if step == 0 {
                bail!("--step must not be zero");
            }
            let mask = open(&input, &LoadOptions::default())?;
            let selected = mask.select(Selection::slice(start, end, step))?;
            save(&selected, &output, &WriteOptions::default())?;
            println!(
                "Selected {} of {} polygons into {}",
                selected.len(),
                mask.len(),
                output.display()
            );
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open(path: &Path, options: &LoadOptions) -> anyhow::Result<Mask> {
    let (mask, warnings) = Mask::open_with_report(path, options)
        .with_context(|| format!("failed to load {}", path.display()))?;
    if !warnings.is_empty() {
        eprintln!("{} consistency warning(s) while loading {}", warnings.len(), path.display());
    }
    Ok(mask)
}

fn save(mask: &Mask, path: &Path, options: &WriteOptions) -> anyhow::Result<()> {
    let warnings = mask
        .save_with_report(path, options)
        .with_context(|| format!("failed to write {}", path.display()))?;
    for warning in warnings {
        eprintln!("warning: {}", warning);
    }
    Ok(())
}

fn read_points(path: &Path) -> anyhow::Result<(Vec<f64>, Vec<f64>)> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mut ra = Vec::new();
    let mut dec = Vec::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace().map(str::parse::<f64>);
        match (fields.next(), fields.next()) {
            (Some(Ok(r)), Some(Ok(d))) => {
                ra.push(r);
                dec.push(d);
            }
            _ => bail!("{}:{}: expected `ra dec`, got \"{}\"", path.display(), number + 1, line),
        }
    }
    Ok((ra, dec))
}

fn print_info(path: &Path, mask: &Mask) {
    let header = mask.header();
    let (area, weighted) = mask.total_area();
    println!("Mask: {}", path.display());
    println!("Polygons: {}", mask.len());
    println!("Max caps per polygon: {}", mask.max_ncaps());
    match header.pixelization {
        Some(p) => println!("Pixelization: {}", p),
        None => println!("Pixelization: none"),
    }
    println!("Distinct pixels: {}", mask.distinct_pixel_count());
    println!("Snapped: {}  Balkanized: {}", header.snapped, header.balkanized);
    println!("Total area: {:.9} sr ({:.4} deg²)", area, area * SR_TO_DEG2);
    println!("Weighted area: {:.9} sr ({:.4} deg²)", weighted, weighted * SR_TO_DEG2);

    if mask.columns().is_empty() {
        println!("Columns: none");
    } else {
        println!("Columns:");
        for column in mask.columns().iter() {
            println!(
                "  {:<16} {:<10} {}",
                column.name(),
                column.data().type_name(),
                column.format().tform
            );
        }
    }
}

const SR_TO_DEG2: f64 = (180.0 / std::f64::consts::PI) * (180.0 / std::f64::consts::PI);

#[derive(serde::Serialize)]
struct PointRow {
    ra_deg: f64,
    dec_deg: f64,
    id: i64,
    weight: Option<f64>,
    area: Option<f64>,
}

impl PointRow {
    fn new(mask: &Mask, ra_deg: f64, dec_deg: f64, position: Option<usize>) -> Self {
        Self {
            ra_deg,
            dec_deg,
            id: position.map_or(celestial_mask::UNMATCHED, |i| mask.ids()[i]),
            weight: position.map(|i| mask.weights()[i]),
            area: position.map(|i| mask.areas()[i]),
        }
    }
}

fn print_table(rows: &[PointRow]) {
    for row in rows {
        match (row.weight, row.area) {
            (Some(weight), Some(area)) => println!(
                "{:>12.6} {:>+11.6} {:>10} {:>10.6} {:>14.6e}",
                row.ra_deg, row.dec_deg, row.id, weight, area
            ),
            _ => println!("{:>12.6} {:>+11.6} {:>10}", row.ra_deg, row.dec_deg, row.id),
        }
    }
    let matched = rows.iter().filter(|r| r.weight.is_some()).count();
    println!("\nMatched {} of {} points", matched, rows.len());
}

fn print_csv(rows: &[PointRow]) {
    println!("ra_deg,dec_deg,id,weight,area");
    for row in rows {
        println!(
            "{:.8},{:.8},{},{},{}",
            row.ra_deg,
            row.dec_deg,
            row.id,
            row.weight.map_or(String::new(), |w| w.to_string()),
            row.area.map_or(String::new(), |a| a.to_string())
        );
    }
}
