use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use hm_series::{
    list_strategies, Aggregation, HeatmapMatrix, PipelineConfig, RowRange, Session, Strategy,
};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT_HASH"), ")");

#[derive(Parser, Debug)]
#[command(
    author,
    version = VERSION,
    about = "Rolling heatmap builder for per-source numeric series",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reduce one column from each input file into a heatmap matrix
    Plot(PlotArgs),
    /// List data files in a folder with their row counts
    Scan(ScanArgs),
    /// Print the available reduction strategies as JSON
    Strategies,
}

#[derive(Parser, Debug)]
struct PlotArgs {
    /// Data files or folders of data files (one series per file)
    #[arg(required = true, value_hint = ValueHint::AnyPath)]
    inputs: Vec<PathBuf>,

    /// Column to read from every file (0-based)
    #[arg(short, long, default_value_t = 0)]
    column: usize,

    /// First row to read (0-based; the default skips a header row)
    #[arg(long, default_value_t = 1)]
    start_row: usize,

    /// Row to stop before (defaults to the shortest file's row count)
    #[arg(long)]
    end_row: Option<usize>,

    /// Samples per heatmap row
    #[arg(short, long)]
    length: Option<usize>,

    /// Number of heatmap rows
    #[arg(short, long)]
    groups: Option<usize>,

    /// Reduction strategy
    #[arg(short, long, value_enum)]
    strategy: Option<StrategyOpt>,

    /// Pipeline config JSON; explicit flags override its fields
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Extension used when expanding folders
    #[arg(long, default_value = "csv")]
    extension: String,

    /// Field delimiter
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// Output matrix CSV path (`-` for stdout)
    #[arg(short, long, default_value = "heatmap.csv", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Optional JSON report with the matrix and its provenance
    #[arg(long, value_hint = ValueHint::FilePath)]
    json: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Log stage timings
    #[arg(long, action = ArgAction::SetTrue)]
    profile: bool,
}

#[derive(Parser, Debug)]
struct ScanArgs {
    /// Folder to scan
    #[arg(value_hint = ValueHint::DirPath)]
    folder: PathBuf,

    /// File extension to include
    #[arg(long, default_value = "csv")]
    extension: String,

    /// Field delimiter
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum StrategyOpt {
    /// Chunk mean, -1 padding
    Standard,
    /// Largest-triangle sampling
    Triangle,
    /// Root mean square of balanced groups
    Rms,
    /// Grouped mean
    Mean,
    /// Grouped max
    Max,
}

impl From<StrategyOpt> for Strategy {
    fn from(value: StrategyOpt) -> Self {
        match value {
            StrategyOpt::Standard => Strategy::Standard,
            StrategyOpt::Triangle => Strategy::TriangleArea,
            StrategyOpt::Rms => Strategy::Rms,
            StrategyOpt::Mean => Strategy::MeanReduction {
                aggregation: Aggregation::Mean,
            },
            StrategyOpt::Max => Strategy::MeanReduction {
                aggregation: Aggregation::Max,
            },
        }
    }
}

#[derive(Serialize)]
struct HeatmapReport<'a> {
    generated_at: String,
    strategy_id: &'static str,
    strategy_params: JsonValue,
    params_hash: String,
    config: &'a PipelineConfig,
    sources: Vec<String>,
    row_range: RowRange,
    shape: (usize, usize),
    fingerprint: String,
    matrix: &'a HeatmapMatrix,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = match &cli.command {
        Command::Plot(args) if args.verbose => "debug",
        Command::Scan(args) if args.verbose => "debug",
        _ => "info",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Plot(args) => handle_plot(args),
        Command::Scan(args) => handle_scan(args),
        Command::Strategies => handle_strategies(),
    }
}

fn handle_plot(args: PlotArgs) -> Result<()> {
    let config = build_config(&args)?;
    let delimiter = delimiter_byte(args.delimiter)?;

    let mut files = Vec::new();
    for input in &args.inputs {
        if input.is_dir() {
            files.extend(list_data_files(input, &args.extension)?);
        } else {
            files.push(input.clone());
        }
    }
    if files.is_empty() {
        return Err(anyhow!("no input files supplied"));
    }

    let end_row = match args.end_row {
        Some(end) => end,
        None => {
            let min_rows = min_row_count(&files, delimiter)?
                .ok_or_else(|| anyhow!("none of the input files could be found"))?;
            debug!("Using shortest file row count {} as end row", min_rows);
            min_rows
        }
    };
    let range = RowRange::new(args.start_row, end_row)?;

    let t_read = Instant::now();
    let sources = read_sources(&files, args.column, range, delimiter)?;
    if args.profile || args.verbose {
        info!(
            "Read stage: {:.1} ms ({} sources)",
            t_read.elapsed().as_secs_f64() * 1000.0,
            sources.len()
        );
    }
    if sources.is_empty() {
        return Err(anyhow!("no valid data could be read from the selected files"));
    }
    let source_names: Vec<String> = sources
        .iter()
        .map(|(path, _)| path.display().to_string())
        .collect();
    let series_set: Vec<Vec<f64>> = sources.into_iter().map(|(_, s)| s).collect();

    let t_compute = Instant::now();
    let mut session = Session::new();
    let matrix = session.plot(series_set, &config)?;
    if args.profile || args.verbose {
        info!(
            "Compute stage: {:.1} ms",
            t_compute.elapsed().as_secs_f64() * 1000.0
        );
    }
    let (rows, cols) = matrix.shape();
    info!(
        "Heatmap built: {}x{} from {} sources, strategy {}",
        rows,
        cols,
        source_names.len(),
        config.strategy.id()
    );

    if args.output.as_os_str() == "-" {
        let stdout = io::stdout();
        write_matrix_csv(matrix, stdout.lock())?;
    } else {
        let file = File::create(&args.output)
            .with_context(|| format!("failed to create {}", args.output.display()))?;
        write_matrix_csv(matrix, file)?;
        info!("Wrote heatmap CSV: {}", args.output.display());
    }

    if let Some(path) = args.json.as_ref() {
        let report = HeatmapReport {
            generated_at: Utc::now().to_rfc3339(),
            strategy_id: config.strategy.id(),
            strategy_params: config.strategy.params_json(),
            params_hash: config.strategy.params_hash_sha256()?,
            config: &config,
            sources: source_names,
            row_range: range,
            shape: matrix.shape(),
            fingerprint: matrix.fingerprint(),
            matrix,
        };
        let text = serde_json::to_string_pretty(&report)?;
        fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
        info!("Wrote heatmap report: {}", path.display());
    }

    Ok(())
}

fn handle_scan(args: ScanArgs) -> Result<()> {
    let delimiter = delimiter_byte(args.delimiter)?;
    let files = list_data_files(&args.folder, &args.extension)?;
    if files.is_empty() {
        warn!(
            "No .{} files found in {}",
            args.extension,
            args.folder.display()
        );
        return Ok(());
    }

    let counts = scan_row_counts(&files, delimiter);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "index\tfile\trows")?;
    for (idx, (path, rows)) in files.iter().zip(&counts).enumerate() {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        writeln!(out, "{}\t{}\t{}", idx, name, rows.unwrap_or(0))?;
    }
    if let Some(min) = counts.iter().flatten().min() {
        info!(
            "{} files, shortest has {} rows (usable as --end-row)",
            files.len(),
            min
        );
    }
    Ok(())
}

fn handle_strategies() -> Result<()> {
    let text = serde_json::to_string_pretty(&list_strategies())?;
    println!("{}", text);
    Ok(())
}

fn build_config(args: &PlotArgs) -> Result<PipelineConfig> {
    let mut config = match args.config.as_ref() {
        Some(path) => load_config(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(length) = args.length {
        config.target_length = length;
    }
    if let Some(groups) = args.groups {
        config.data_groups = groups;
    }
    if let Some(strategy) = args.strategy {
        config.strategy = strategy.into();
    }
    config.validate()?;
    Ok(config)
}

fn load_config(path: &Path) -> Result<PipelineConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("{} is not a valid pipeline config", path.display()))
}

fn delimiter_byte(delimiter: char) -> Result<u8> {
    u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| anyhow!("delimiter must be a single ASCII character"))
}

/// Files in `dir` with the given extension, ordered by the number formed
/// from the digits in their names. Names without digits sort last.
fn list_data_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read folder {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to list {}", dir.display()))?
            .path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if path.is_file() && matches {
            files.push(path);
        }
    }
    files.sort_by_cached_key(|path| {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let number = digit_key(&name);
        (number.is_none(), number, name)
    });
    Ok(files)
}

fn digit_key(name: &str) -> Option<u128> {
    let digits: String = name.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn csv_reader(path: &Path, delimiter: u8) -> Result<csv::Reader<File>> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))
}

fn count_rows(path: &Path, delimiter: u8) -> Result<usize> {
    let mut reader = csv_reader(path, delimiter)?;
    let mut rows = 0;
    for record in reader.records() {
        record.with_context(|| format!("failed to read {}", path.display()))?;
        rows += 1;
    }
    Ok(rows)
}

/// Row count per file, in `files` order. Unreadable files are logged and
/// reported as `None` so one bad file does not hide the rest.
fn scan_row_counts(files: &[PathBuf], delimiter: u8) -> Vec<Option<usize>> {
    files
        .par_iter()
        .map(|path| match count_rows(path, delimiter) {
            Ok(rows) => Some(rows),
            Err(err) => {
                warn!("Could not read {}: {:#}", path.display(), err);
                None
            }
        })
        .collect()
}

/// Smallest row count among the files that exist, `None` if none do.
fn min_row_count(files: &[PathBuf], delimiter: u8) -> Result<Option<usize>> {
    let counts = files
        .par_iter()
        .filter(|path| path.is_file())
        .map(|path| count_rows(path, delimiter))
        .collect::<Result<Vec<_>>>()?;
    Ok(counts.into_iter().min())
}

/// Read `column` over `range` from one file. Reading stops early at the
/// first row that does not reach the column.
fn read_column(path: &Path, column: usize, range: RowRange, delimiter: u8) -> Result<Vec<f64>> {
    let mut reader = csv_reader(path, delimiter)?;
    let mut values = Vec::with_capacity(range.len());
    for (row_idx, record) in reader.records().enumerate().take(range.end) {
        if row_idx < range.start {
            continue;
        }
        let record = record
            .with_context(|| format!("failed to read {} row {}", path.display(), row_idx))?;
        let Some(cell) = record.get(column) else {
            debug!(
                "{}: row {} has no column {}, stopping",
                path.display(),
                row_idx,
                column
            );
            break;
        };
        let value: f64 = cell.trim().parse().with_context(|| {
            format!(
                "{}: row {} column {}: '{}' is not a number",
                path.display(),
                row_idx,
                column,
                cell
            )
        })?;
        if !value.is_finite() {
            return Err(anyhow!(
                "{}: row {} column {}: non-finite value",
                path.display(),
                row_idx,
                column
            ));
        }
        values.push(value);
    }
    Ok(values)
}

/// Read every file in parallel, keeping input order. Missing files are
/// skipped with a warning.
fn read_sources(
    files: &[PathBuf],
    column: usize,
    range: RowRange,
    delimiter: u8,
) -> Result<Vec<(PathBuf, Vec<f64>)>> {
    let mut sources = files
        .par_iter()
        .enumerate()
        .filter_map(|(idx, path)| {
            if !path.is_file() {
                warn!("File not found, skipping: {}", path.display());
                return None;
            }
            Some(read_column(path, column, range, delimiter).map(|s| (idx, path.clone(), s)))
        })
        .collect::<Result<Vec<_>>>()?;
    sources.sort_by_key(|(idx, _, _)| *idx);
    Ok(sources.into_iter().map(|(_, path, s)| (path, s)).collect())
}

fn write_matrix_csv<W: Write>(matrix: &HeatmapMatrix, writer: W) -> Result<()> {
    let array = matrix.to_array2()?;
    let mut writer = csv::Writer::from_writer(writer);
    for row in array.rows() {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hm_series::HeatmapBuffer;
    use tempfile::tempdir;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn plot_args(inputs: Vec<PathBuf>) -> PlotArgs {
        PlotArgs::parse_from(
            std::iter::once(PathBuf::from("plot"))
                .chain(inputs)
                .map(PathBuf::into_os_string),
        )
    }

    #[test]
    fn digit_key_orders_numerically() {
        assert_eq!(digit_key("run_10.csv"), Some(10));
        assert_eq!(digit_key("a2b3.csv"), Some(23));
        assert_eq!(digit_key("notes.csv"), None);
    }

    #[test]
    fn lists_files_in_numeric_order() {
        let dir = tempdir().unwrap();
        for name in ["s10.csv", "s2.csv", "s1.csv", "readme.txt", "extra.csv"] {
            write_file(dir.path(), name, "x\n1\n");
        }
        let files = list_data_files(dir.path(), "csv").unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["s1.csv", "s2.csv", "s10.csv", "extra.csv"]);
    }

    #[test]
    fn reads_column_within_range() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "a.csv", "t,v\n0,1.5\n1,2.5\n2,3.5\n3,4.5\n");
        let range = RowRange::new(1, 4).unwrap();
        assert_eq!(read_column(&path, 1, range, b',').unwrap(), vec![1.5, 2.5, 3.5]);
        assert_eq!(count_rows(&path, b',').unwrap(), 5);
    }

    #[test]
    fn short_rows_end_the_series() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "a.csv", "h,h\n1,2\n3\n5,6\n");
        let range = RowRange::new(1, 10).unwrap();
        assert_eq!(read_column(&path, 1, range, b',').unwrap(), vec![2.0]);
    }

    #[test]
    fn non_numeric_cells_are_errors() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "bad.csv", "h\n1\noops\n");
        let range = RowRange::new(1, 3).unwrap();
        let err = read_column(&path, 0, range, b',').unwrap_err();
        assert!(format!("{err:#}").contains("row 2"));
    }

    #[test]
    fn missing_files_are_skipped() {
        let dir = tempdir().unwrap();
        let a = write_file(dir.path(), "1.csv", "h\n1\n2\n");
        let missing = dir.path().join("2.csv");
        let b = write_file(dir.path(), "3.csv", "h;x\n4;0\n5;0\n");
        let range = RowRange::new(1, 3).unwrap();
        let sources = read_sources(&[a.clone(), missing.clone()], 0, range, b',').unwrap();
        assert_eq!(sources, vec![(a.clone(), vec![1.0, 2.0])]);
        let sources = read_sources(&[b.clone()], 0, range, b';').unwrap();
        assert_eq!(sources, vec![(b.clone(), vec![4.0, 5.0])]);
        assert_eq!(min_row_count(&[a, missing, b], b',').unwrap(), Some(3));
    }

    #[test]
    fn scan_reports_unreadable_files_and_continues() {
        let dir = tempdir().unwrap();
        let good = write_file(dir.path(), "1.csv", "h\n1\n");
        let bad = dir.path().join("2.csv");
        fs::write(&bad, b"a\n\xff\xfe\n").unwrap();
        let tail = write_file(dir.path(), "3.csv", "h\n1\n2\n");
        let counts = scan_row_counts(&[good, bad, tail], b',');
        assert_eq!(counts, vec![Some(2), None, Some(3)]);
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempdir().unwrap();
        let cfg = write_file(
            dir.path(),
            "cfg.json",
            r#"{"target_length": 8, "data_groups": 2, "strategy": {"id": "hm.rms.balanced.v1"}}"#,
        );
        let mut args = plot_args(vec![dir.path().to_path_buf()]);
        args.config = Some(cfg);
        args.groups = Some(3);
        let config = build_config(&args).unwrap();
        assert_eq!(config.target_length, 8);
        assert_eq!(config.data_groups, 3);
        assert_eq!(config.strategy, Strategy::Rms);

        args.length = Some(0);
        assert!(build_config(&args).is_err());
    }

    #[test]
    fn strategy_flag_maps_to_variants() {
        assert_eq!(Strategy::from(StrategyOpt::Triangle), Strategy::TriangleArea);
        assert_eq!(
            Strategy::from(StrategyOpt::Max),
            Strategy::MeanReduction {
                aggregation: Aggregation::Max
            }
        );
    }

    #[test]
    fn writes_matrix_rows_as_csv() {
        let matrix = HeatmapBuffer::new(3, 2)
            .unwrap()
            .append(vec![0.5, 1.0])
            .append(vec![0.25, 0.0, -1.0])
            .into_matrix();
        let mut out = Vec::new();
        write_matrix_csv(&matrix, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "0.5,1,0\n0.25,0,-1\n");
    }

    #[test]
    fn rejects_wide_delimiters() {
        assert_eq!(delimiter_byte(';').unwrap(), b';');
        assert!(delimiter_byte('é').is_err());
    }
}
