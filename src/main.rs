use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use env_logger::Env;
use log::{info, warn};
use rayon::prelude::*;
use sfile_filter::{
    convert, text_to_record, BasicTokenizer, DocFreqBounds, ResolveConfig, SparseFormat, TokenHasher,
    Vocabulary,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Hash, repair and filter sparse (vw / svmlight) corpora", long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (-q, -qq)
    #[arg(short = 'q', long, global = true, action = ArgAction::Count)]
    quiet: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a vocabulary, trim it and rewrite the corpus with integer ids
    Filter(FilterArgs),
    /// Print per-token statistics as TSV
    Stats(StatsArgs),
    /// Convert a sparse file between vw and svmlight
    Convert(ConvertArgs),
    /// Tokenize text files into vw records
    FilesToVw(FilesToVwArgs),
}

#[derive(Args, Debug)]
struct VocabArgs {
    /// Sparse format of the corpus (vw, svmlight)
    #[arg(short, long, default_value = "vw")]
    format: SparseFormat,

    /// log2 of the id space
    #[arg(short, long, default_value_t = 18)]
    bit_precision: u32,

    /// Seed for collision probing
    #[arg(long)]
    seed: Option<u64>,

    /// Maximum fraction of colliding tokens before giving up
    #[arg(long, default_value_t = 0.05)]
    max_collision_ratio: f64,

    /// Random probes per colliding token
    #[arg(long, default_value_t = 10_000)]
    max_probes: usize,

    /// Only read this many records when building the vocabulary
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Use a saved vocabulary instead of scanning the corpus
    #[arg(long, value_name = "PATH")]
    load_vocab: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Sparse corpus to read (read twice, so it must be a file)
    infile: PathBuf,

    /// Write to this file instead of stdout
    #[arg(short, long, value_name = "PATH")]
    outfile: Option<PathBuf>,

    #[command(flatten)]
    vocab: VocabArgs,

    /// Remove this token (repeatable)
    #[arg(long = "remove-token", value_name = "TOKEN")]
    remove_tokens: Vec<String>,

    /// Remove the tokens listed in this file, one per line
    #[arg(long, value_name = "PATH")]
    remove_tokens_file: Option<PathBuf>,

    #[arg(long, default_value_t = 0)]
    doc_freq_min: u64,

    #[arg(long, default_value_t = u64::MAX)]
    doc_freq_max: u64,

    #[arg(long, default_value_t = 0.0)]
    doc_fraction_min: f64,

    #[arg(long, default_value_t = 1.0)]
    doc_fraction_max: f64,

    /// Only keep documents whose doc_id is listed in this file
    #[arg(long, value_name = "PATH")]
    doc_ids_file: Option<PathBuf>,

    /// Fail if a listed doc_id does not appear in the corpus
    #[arg(long)]
    enforce_all_doc_id: bool,

    /// Renumber ids to 0..vocab_size before rewriting
    #[arg(long)]
    compactify: bool,

    /// Save the final vocabulary (CBOR)
    #[arg(long, value_name = "PATH")]
    save_vocab: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct StatsArgs {
    /// Sparse corpus (not needed with --load-vocab)
    infile: Option<PathBuf>,

    #[command(flatten)]
    vocab: VocabArgs,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Input file, stdin if omitted
    infile: Option<PathBuf>,

    #[arg(short, long, value_name = "PATH")]
    outfile: Option<PathBuf>,

    #[arg(short, long)]
    from: SparseFormat,

    #[arg(short, long)]
    to: SparseFormat,

    #[arg(long, value_name = "N")]
    limit: Option<usize>,
}

#[derive(Args, Debug)]
struct FilesToVwArgs {
    /// Text files to convert; paths are read from stdin if none are given
    paths: Vec<PathBuf>,

    #[arg(short, long, value_name = "PATH")]
    outfile: Option<PathBuf>,

    /// Limit Rayon worker threads
    #[arg(long, value_name = "N")]
    threads: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose, cli.quiet);
    let start = Instant::now();

    match cli.command {
        Commands::Filter(args) => run_filter(args)?,
        Commands::Stats(args) => run_stats(args)?,
        Commands::Convert(args) => run_convert(args)?,
        Commands::FilesToVw(args) => run_files_to_vw(args)?,
    }

    info!("done in {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}

fn log_level(verbose: u8, quiet: u8) -> &'static str {
    match i16::from(verbose) - i16::from(quiet) {
        i16::MIN..=-2 => "off",
        -1 => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn init_logger(verbose: u8, quiet: u8) {
    let level = log_level(verbose, quiet);
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut lines = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    Ok(lines)
}

/// 保存済み語彙を読むか、コーパスを走査して衝突解決まで済ませる
fn build_vocabulary(args: &VocabArgs, infile: Option<&Path>) -> Result<Vocabulary> {
    if let Some(saved) = &args.load_vocab {
        let vocab = Vocabulary::load(saved).with_context(|| format!("loading vocabulary {}", saved.display()))?;
        info!("loaded vocabulary of {} tokens from {}", vocab.vocab_size(), saved.display());
        return Ok(vocab);
    }
    let Some(infile) = infile else {
        bail!("either an input corpus or --load-vocab is required");
    };

    let hasher = TokenHasher::new(args.bit_precision)?;
    let mut vocab = Vocabulary::new(args.format, hasher);
    vocab
        .load_sfile(infile, args.limit)
        .with_context(|| format!("scanning {}", infile.display()))?;
    let config = ResolveConfig {
        max_collision_ratio: args.max_collision_ratio,
        max_probes: args.max_probes,
        seed: args.seed,
    };
    vocab.resolve_collisions(&config)?;
    Ok(vocab)
}

fn run_filter(args: FilterArgs) -> Result<()> {
    let mut vocab = build_vocabulary(&args.vocab, Some(&args.infile))?;

    let mut to_remove = args.remove_tokens.clone();
    if let Some(path) = &args.remove_tokens_file {
        to_remove.extend(read_lines(path)?);
    }
    if !to_remove.is_empty() {
        let removed = vocab.remove_tokens(&to_remove)?;
        info!("removed {removed} listed tokens");
    }

    let bounds = DocFreqBounds {
        doc_freq_min: args.doc_freq_min,
        doc_freq_max: args.doc_freq_max,
        doc_fraction_min: args.doc_fraction_min,
        doc_fraction_max: args.doc_fraction_max,
    };
    if bounds != DocFreqBounds::default() {
        vocab.remove_extreme_tokens(&bounds)?;
    }
    if args.compactify {
        vocab.compactify()?;
    }

    let doc_ids = match &args.doc_ids_file {
        Some(path) => Some(read_lines(path)?),
        None => None,
    };
    if args.enforce_all_doc_id && doc_ids.is_none() {
        warn!("--enforce-all-doc-id has no effect without --doc-ids-file");
    }

    let reader = BufReader::new(
        File::open(&args.infile).with_context(|| format!("opening {}", args.infile.display()))?,
    );
    let writer = open_output(args.outfile.as_deref())?;
    let written = vocab.filter_sfile(reader, writer, doc_ids.as_deref(), args.enforce_all_doc_id)?;
    info!("{written} records written, vocabulary size {}", vocab.vocab_size());

    if let Some(path) = &args.save_vocab {
        vocab.save(path).with_context(|| format!("saving vocabulary to {}", path.display()))?;
    }
    Ok(())
}

fn run_stats(args: StatsArgs) -> Result<()> {
    let vocab = build_vocabulary(&args.vocab, args.infile.as_deref())?;
    let mut out = open_output(None)?;
    writeln!(out, "token\tid\tdoc_freq\tscore")?;
    for row in vocab.token_stats() {
        writeln!(out, "{}\t{}\t{}\t{}", row.token, row.id, row.doc_freq, row.score)?;
    }
    out.flush()?;
    Ok(())
}

fn run_convert(args: ConvertArgs) -> Result<()> {
    let reader: Box<dyn BufRead> = match &args.infile {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };
    let writer = open_output(args.outfile.as_deref())?;
    convert(reader, writer, args.from, args.to, args.limit)?;
    Ok(())
}

/// doc_id に使えない文字を置き換える
fn path_to_doc_id(path: &Path) -> String {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("unknown");
    stem.chars()
        .map(|c| if c.is_whitespace() || c == ':' || c == '|' { '_' } else { c })
        .collect()
}

fn run_files_to_vw(args: FilesToVwArgs) -> Result<()> {
    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new().num_threads(threads).build_global()?;
    }

    let paths: Vec<PathBuf> = if args.paths.is_empty() {
        // find . -type f | sfile-filter files-to-vw
        let mut paths = Vec::new();
        for line in io::stdin().lock().lines() {
            let line = line?;
            let line = line.trim();
            if !line.is_empty() {
                paths.push(PathBuf::from(line));
            }
        }
        paths
    } else {
        args.paths
    };

    let tokenizer = BasicTokenizer::new();
    // 並列でトークン化、出力順は入力順のまま
    let lines: Vec<String> = paths
        .par_iter()
        .map(|path| -> Result<String> {
            let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            let text = String::from_utf8_lossy(&bytes);
            let record = text_to_record(&tokenizer, &text, &path_to_doc_id(path));
            Ok(SparseFormat::Vw.serialize(&record)?)
        })
        .collect::<Result<_>>()?;

    let mut out = open_output(args.outfile.as_deref())?;
    for line in &lines {
        writeln!(out, "{line}")?;
    }
    out.flush()?;
    info!("tokenized {} files", lines.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_id_from_path_is_sanitized() {
        assert_eq!(path_to_doc_id(Path::new("/data/cables/1975 ROME|01.txt")), "1975_ROME_01");
        assert_eq!(path_to_doc_id(Path::new("memo.txt")), "memo");
    }

    #[test]
    fn log_level_handles_extreme_counts() {
        assert_eq!(log_level(0, 0), "warn");
        assert_eq!(log_level(1, 0), "info");
        assert_eq!(log_level(0, 1), "error");
        assert_eq!(log_level(127, 128), "error");
        assert_eq!(log_level(255, 0), "trace");
        assert_eq!(log_level(0, 255), "off");
    }

    #[test]
    fn cli_parses_filter_flags() {
        let cli = Cli::try_parse_from([
            "sfile-filter", "-v", "filter", "corpus.vw", "-o", "out.vw", "--bit-precision", "20",
            "--remove-token", "the", "--doc-freq-min", "2", "--seed", "9",
        ])
        .unwrap();
        match cli.command {
            Commands::Filter(args) => {
                assert_eq!(args.vocab.bit_precision, 20);
                assert_eq!(args.vocab.seed, Some(9));
                assert_eq!(args.vocab.format, SparseFormat::Vw);
                assert_eq!(args.remove_tokens, vec!["the".to_string()]);
                assert_eq!(args.doc_freq_min, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(cli.verbose, 1);
    }

    #[test]
    fn cli_parses_convert_formats() {
        let cli = Cli::try_parse_from(["sfile-filter", "convert", "--from", "vw", "--to", "svmlight"]).unwrap();
        match cli.command {
            Commands::Convert(args) => {
                assert_eq!(args.from, SparseFormat::Vw);
                assert_eq!(args.to, SparseFormat::SvmLight);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
