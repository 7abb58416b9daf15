use clap::{ArgAction, Parser, Subcommand};
use ejs_decoder::codec::{CodecId, CodecOptions, Decompressor};
use ejs_decoder::container::{frame, scan_sections, RawContainer};
use ejs_decoder::extract::protobuf::{walk_fields, DEFAULT_FIELD_LIMIT};
use ejs_decoder::extract::{ExtractOptions, Extractor};
use ejs_decoder::pipeline::{decode_batch, DecodeOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ejs-decode", about = "Recover cell text from EJS spreadsheet containers")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone)]
struct PipelineArgs {
    /// Also decode GBK in the multi-encoding pass
    #[arg(long)]
    gbk: bool,
    /// Time budget per payload for decompression and extraction, in ms
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Maximum decompressed payload size in MiB
    #[arg(long, default_value = "256")]
    max_output_mib: usize,
    /// Ignore the related_sheet payload
    #[arg(long)]
    no_related: bool,
}

impl PipelineArgs {
    fn options(&self) -> DecodeOptions {
        let budget = self.timeout_ms.map(Duration::from_millis);
        DecodeOptions {
            include_related: !self.no_related,
            extract: ExtractOptions {
                enable_gbk:  self.gbk,
                time_budget: budget,
                ..ExtractOptions::default()
            },
            codec: CodecOptions {
                max_output:  self.max_output_mib.saturating_mul(1024 * 1024),
                time_budget: budget,
            },
            ..DecodeOptions::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Decode containers to CSV files
    Decode {
        #[arg(required = true, num_args = 1..)]
        input: Vec<PathBuf>,
        /// Directory for CSV output (default: beside each input)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Cells per CSV row
        #[arg(long, default_value = "20")]
        row_width: usize,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    /// Print recovered cells as JSON lines
    Cells {
        input: PathBuf,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    /// Show container layout, envelope and payload diagnostics
    Inspect {
        input: PathBuf,
        /// Protobuf fields to list from the decompressed payload
        #[arg(long, default_value_t = DEFAULT_FIELD_LIMIT)]
        fields: usize,
    },
    /// Write the decompressed workbook payload to a file
    Dump {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Dump related_sheet instead of workbook
        #[arg(long)]
        related: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match command {

        // ── Decode ───────────────────────────────────────────────────────────
        Commands::Decode { input, output_dir, row_width, pipeline } => {
            let opts = DecodeOptions {
                row_width,
                output_dir,
                ..pipeline.options()
            };
            if let Some(dir) = &opts.output_dir {
                std::fs::create_dir_all(dir)?;
            }
            let summary = decode_batch(&input, &opts);

            for r in &summary.results {
                match &r.outcome {
                    Ok(rep) => {
                        println!("  ok      {}", r.path.display());
                        if let Some(title) = &rep.title {
                            println!("          title  {title}");
                        }
                        println!("          table  {} x {}", rep.max_row, rep.max_col);
                        let codec = rep.codec.map_or("uncompressed", CodecId::name);
                        println!("          cells  {} in {} rows ({codec})",
                            rep.cell_count, rep.row_count);
                        println!("          csv    {}", rep.csv_path.display());
                    }
                    Err(e) => println!("  failed  {}: {e}", r.path.display()),
                }
            }
            println!("Succeeded: {}  Failed: {}  Total: {}",
                summary.success_count(), summary.failure_count(), summary.results.len());

            return Ok(if summary.any_succeeded() { ExitCode::SUCCESS } else { ExitCode::FAILURE });
        }

        // ── Cells ────────────────────────────────────────────────────────────
        Commands::Cells { input, pipeline } => {
            let text = read_text(&input)?;
            let decoded = ejs_decoder::decode_text(&text, &pipeline.options())?;
            for cell in &decoded.cells {
                println!("{}", serde_json::to_string(cell)?);
            }
        }

        // ── Inspect ──────────────────────────────────────────────────────────
        Commands::Inspect { input, fields } => {
            let text = read_text(&input)?;
            let container = RawContainer::new(&text);

            println!("── EJS container ────────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Lines          {}", container.len());
            println!("  Sections:");
            for s in scan_sections(&container) {
                let note = if s.is_envelope() { "  (workbook envelope)" }
                    else if s.is_percent_encoded() { "  (percent-encoded)" }
                    else { "" };
                println!("    line {:<6} {:<8} declared {:>9}  actual {:>9}{note}",
                    s.line_index, s.kind.name(),
                    s.declared_len.map(|n| n.to_string()).unwrap_or_else(|| "-".into()),
                    s.actual_len());
            }

            let framed = frame(&text)?;
            println!("  Title          {}", framed.title().unwrap_or("N/A"));
            println!("  Envelope line  {}", framed.envelope_line);
            println!("  Table size     {} x {}", framed.max_row(), framed.max_col());
            println!("  End index      row {} col {}",
                framed.end_row_index(), framed.end_col_index());
            println!("  Workbook       {} base64 chars", framed.envelope.workbook.len());
            println!("  Related sheet  {} base64 chars",
                framed.related_sheet().map_or(0, str::len));

            let decompressor = Decompressor::default();
            let payload = decompressor.decompress(&framed.envelope.workbook)?;
            let magic = [CodecId::Zlib, CodecId::Gzip].into_iter().find(|c| c.sniff(&payload.head));
            println!("  Payload        {} bytes, head {}",
                payload.encoded_size, payload.head_hex());
            println!("  Magic          {}", magic.map_or("none", CodecId::name));
            println!("  Codec          {}",
                payload.codec.map(|c| c.name()).unwrap_or("none (raw pass-through)"));
            println!("  Decompressed   {} bytes", payload.bytes.len());
            println!("  Cells          {}", Extractor::default().extract(&payload.bytes).len());

            let walked = walk_fields(&payload.bytes, fields);
            println!("  Protobuf fields ({}):", walked.len());
            for f in walked {
                println!("    {f}");
            }
        }

        // ── Dump ─────────────────────────────────────────────────────────────
        Commands::Dump { input, output, related } => {
            let text = read_text(&input)?;
            let framed = frame(&text)?;
            let b64 = if related {
                framed.related_sheet().ok_or("container has no related_sheet")?
            } else {
                framed.envelope.workbook.as_str()
            };
            let payload = Decompressor::default().decompress(b64)?;
            let out = output.unwrap_or_else(|| dump_path(&input, related));
            std::fs::write(&out, &payload.bytes)?;
            println!("Wrote {} bytes → {}", payload.bytes.len(), out.display());
        }
    }

    Ok(ExitCode::SUCCESS)
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn read_text(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn dump_path(input: &Path, related: bool) -> PathBuf {
    let stem = input.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let kind = if related { "related_sheet" } else { "workbook" };
    input.with_file_name(format!("{stem}_{kind}_decompressed.bin"))
}
