// Command-line interface for revdelta.
//
// Subcommands:
//   diff     two revision files -> encoded payload
//   apply    previous revision + payload -> current revision
//   inspect  list the parts of a payload
//   history  run the driver over consecutive revision files of one article
//   config   print build defaults

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use chrono::{DateTime, TimeDelta, Utc};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use serde_json::{Value, json};

use crate::codec::payload::{COMPRESSED_MARKER, COMPRESSED_TEXT_MARKER};
use crate::codec::{CodecOptions, EncodeError, RevisionCodec, RevisionCodecData, TextCharset};
use crate::config::{
    DEFAULT_FULL_REVISION_INTERVAL, DEFAULT_INPUT_TASK_LIMIT, DEFAULT_OUTPUT_TASK_LIMIT,
    DEFAULT_QUEUE_CAPACITY, DEFAULT_QUEUE_TIMEOUT, DiffConfig, SurrogateMode,
};
use crate::diff::{Diff, DiffPart};
use crate::driver::{DiffDriver, DriverStats};
use crate::engine::{self, EncodeOptions};
use crate::matching::{DEFAULT_MIN_MATCH, MIN_MATCH_FLOOR, MatcherConfig};
use crate::replay;
use crate::revision::{Revision, RevisionText};
use crate::task::{TaskHeader, split_into_tasks};

// ---------------------------------------------------------------------------
// Byte size parsing (supports K, M, G suffixes)
// ---------------------------------------------------------------------------

fn parse_byte_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".into());
    }
    let (num_part, multiplier) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 1024u64),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 1024 * 1024),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1u64),
    };
    let num: u64 = num_part
        .trim()
        .parse()
        .map_err(|e| format!("invalid size '{s}': {e}"))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: '{s}'"))
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Compact binary deltas between article revisions.
#[derive(Parser, Debug)]
#[command(
    name = "revdelta",
    version,
    about = "Revision delta encoder/decoder",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Encode the diff between two revision files.
    Diff(DiffArgs),
    /// Rebuild a revision from its predecessor and a payload.
    Apply(ApplyArgs),
    /// List the parts of a payload.
    Inspect(InspectArgs),
    /// Diff consecutive revision files of one article through the driver.
    History(HistoryArgs),
    /// Print build/configuration defaults.
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CharsetArg {
    Utf8,
    Utf16le,
    Utf16be,
}

impl From<CharsetArg> for TextCharset {
    fn from(arg: CharsetArg) -> Self {
        match arg {
            CharsetArg::Utf8 => TextCharset::Utf8,
            CharsetArg::Utf16le => TextCharset::Utf16Le,
            CharsetArg::Utf16be => TextCharset::Utf16Be,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SurrogateArg {
    Discard,
    Replace,
}

#[derive(Args, Debug)]
struct CodecArgs {
    /// Charset of text payloads.
    #[arg(long, value_enum, default_value_t = CharsetArg::Utf8)]
    charset: CharsetArg,

    /// Base64 text transport instead of raw bytes.
    #[arg(long)]
    text: bool,
}

#[derive(Args, Debug)]
struct CompressArgs {
    /// Deflate payloads when it makes them smaller.
    #[arg(long)]
    compress: bool,

    /// Deflate level (0-9).
    #[arg(long, short = 'l', value_parser = clap::value_parser!(u32).range(0..=9), default_value_t = 6)]
    level: u32,
}

#[derive(Args, Debug)]
struct DiffArgs {
    /// Previous revision text (UTF-8).
    #[arg(value_hint = ValueHint::FilePath)]
    previous: PathBuf,

    /// Current revision text (UTF-8).
    #[arg(value_hint = ValueHint::FilePath)]
    current: PathBuf,

    /// Output payload file (default: stdout).
    #[arg(long, short = 'o', value_hint = ValueHint::FilePath, conflicts_with = "output_pos")]
    output: Option<PathBuf>,

    /// Matched blocks must be longer than this many code units.
    #[arg(long = "min-match", value_parser = clap::value_parser!(u64).range(1..), default_value_t = DEFAULT_MIN_MATCH as u64)]
    min_match: u64,

    #[command(flatten)]
    codec: CodecArgs,

    #[command(flatten)]
    compression: CompressArgs,

    /// Output payload file (positional form).
    #[arg(value_hint = ValueHint::FilePath)]
    output_pos: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// Previous revision text (UTF-8).
    #[arg(value_hint = ValueHint::FilePath)]
    previous: PathBuf,

    /// Payload produced by `diff`.
    #[arg(value_hint = ValueHint::FilePath)]
    payload: PathBuf,

    /// Output file (default: stdout).
    #[arg(long, short = 'o', value_hint = ValueHint::FilePath, conflicts_with = "output_pos")]
    output: Option<PathBuf>,

    #[command(flatten)]
    codec: CodecArgs,

    /// Output file (positional form).
    #[arg(value_hint = ValueHint::FilePath)]
    output_pos: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Payload to list.
    #[arg(value_hint = ValueHint::FilePath)]
    payload: PathBuf,

    #[command(flatten)]
    codec: CodecArgs,
}

#[derive(Args, Debug)]
struct HistoryArgs {
    /// Revision files, oldest first.
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    files: Vec<PathBuf>,

    /// JSON lines output file (default: stdout).
    #[arg(long, short = 'o', value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Article id stored in the task header.
    #[arg(long = "article-id", default_value_t = 1)]
    article_id: u64,

    /// Article name stored in the task header.
    #[arg(long = "article-name", default_value = "article")]
    article_name: String,

    /// Every Nth stored revision is a full revision.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..), default_value_t = DEFAULT_FULL_REVISION_INTERVAL)]
    interval: u64,

    /// Matched blocks must be longer than this many code units.
    #[arg(long = "min-match", default_value_t = DEFAULT_MIN_MATCH)]
    min_match: usize,

    /// Input task size limit (supports K/M/G suffix).
    #[arg(long = "input-limit", value_parser = parse_byte_size, default_value_t = DEFAULT_INPUT_TASK_LIMIT as u64)]
    input_limit: u64,

    /// Output task size limit (supports K/M/G suffix).
    #[arg(long = "output-limit", value_parser = parse_byte_size, default_value_t = DEFAULT_OUTPUT_TASK_LIMIT as u64)]
    output_limit: u64,

    /// What to do with revisions holding unpaired surrogates.
    #[arg(long, value_enum, default_value_t = SurrogateArg::Discard)]
    surrogates: SurrogateArg,

    /// Skip applying each diff to check it.
    #[arg(long = "no-verify")]
    no_verify: bool,

    /// Replay the emitted diffs and compare with the input files.
    #[arg(long = "replay-check")]
    replay_check: bool,

    /// Directory for verification failure dumps.
    #[arg(long = "dump-dir", value_hint = ValueHint::DirPath)]
    dump_dir: Option<PathBuf>,

    /// Charset of text payloads.
    #[arg(long, value_enum, default_value_t = CharsetArg::Utf8)]
    charset: CharsetArg,

    #[command(flatten)]
    compression: CompressArgs,
}

// ---------------------------------------------------------------------------
// Resolved options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Diff {
        previous: PathBuf,
        current: PathBuf,
        output: Option<PathBuf>,
        text: bool,
        encode: EncodeOptions,
    },
    Apply {
        previous: PathBuf,
        payload: PathBuf,
        output: Option<PathBuf>,
        text: bool,
        codec: CodecOptions,
    },
    Inspect {
        payload: PathBuf,
        text: bool,
        codec: CodecOptions,
    },
    History {
        files: Vec<PathBuf>,
        output: Option<PathBuf>,
        header: TaskHeader,
        replay_check: bool,
        config: DiffConfig,
    },
    Config,
}

#[derive(Debug)]
struct Options {
    command: Command,
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
}

fn codec_options(charset: CharsetArg, compression: Option<&CompressArgs>) -> CodecOptions {
    CodecOptions {
        charset: charset.into(),
        compress: compression.is_some_and(|c| c.compress),
        level: compression.map_or(6, |c| c.level),
    }
}

fn resolve_options(cli: Cli) -> Options {
    let command = match cli.command {
        Cmd::Diff(args) => Command::Diff {
            previous: args.previous,
            current: args.current,
            output: args.output.or(args.output_pos),
            text: args.codec.text,
            encode: EncodeOptions {
                matcher: MatcherConfig::new(args.min_match as usize),
                codec: codec_options(args.codec.charset, Some(&args.compression)),
            },
        },
        Cmd::Apply(args) => Command::Apply {
            previous: args.previous,
            payload: args.payload,
            output: args.output.or(args.output_pos),
            text: args.codec.text,
            codec: codec_options(args.codec.charset, None),
        },
        Cmd::Inspect(args) => Command::Inspect {
            payload: args.payload,
            text: args.codec.text,
            codec: codec_options(args.codec.charset, None),
        },
        Cmd::History(args) => Command::History {
            files: args.files,
            output: args.output,
            header: TaskHeader::new(args.article_id, args.article_name),
            replay_check: args.replay_check,
            config: DiffConfig {
                min_match: args.min_match,
                full_revision_interval: args.interval,
                input_task_limit: args.input_limit as usize,
                output_task_limit: args.output_limit as usize,
                charset: args.charset.into(),
                surrogate_mode: match args.surrogates {
                    SurrogateArg::Discard => SurrogateMode::DiscardRevision,
                    SurrogateArg::Replace => SurrogateMode::ReplaceSurrogates,
                },
                verify: !args.no_verify,
                compress: args.compression.compress,
                compression_level: args.compression.level,
                debug_dump_dir: args.dump_dir,
                ..Default::default()
            },
        },
        Cmd::Config => Command::Config,
    };
    Options {
        command,
        force: cli.force,
        quiet: cli.quiet,
        verbose: cli.verbose.min(2),
        json_output: cli.json_output,
    }
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("revdelta".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = resolve_options(cli);
    }
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

fn read_revision(path: &Path) -> Result<RevisionText, String> {
    fs::read_to_string(path)
        .map(RevisionText::from)
        .map_err(|e| format!("{}: {e}", path.display()))
}

fn read_payload(path: &Path, text: bool) -> Result<Vec<u8>, String> {
    let bytes = fs::read(path).map_err(|e| format!("{}: {e}", path.display()))?;
    if !text {
        return Ok(bytes);
    }
    let transport = String::from_utf8(bytes).map_err(|e| format!("{}: {e}", path.display()))?;
    crate::codec::payload::unframe_text(&transport)
        .map_err(|e| format!("{}: {e}", path.display()))
}

/// Open the output file (or stdout), refusing to clobber without `-f`.
fn open_output(path: Option<&Path>, force: bool) -> Result<Box<dyn Write>, String> {
    match path {
        Some(path) => {
            if path.exists() && !force {
                return Err(format!(
                    "output file exists, use -f to overwrite: {}",
                    path.display()
                ));
            }
            let file = File::create(path).map_err(|e| format!("{}: {e}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout().lock()))),
    }
}

fn write_all(path: Option<&Path>, force: bool, data: &[u8]) -> Result<(), String> {
    let mut out = open_output(path, force)?;
    out.write_all(data)
        .and_then(|()| out.flush())
        .map_err(|e| format!("write error: {e}"))
}

fn report_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => eprintln!("{text}"),
        Err(e) => eprintln!("revdelta: json: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config() -> i32 {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("revdelta version {version}");
    eprintln!("PARALLEL={}", cfg!(feature = "parallel"));
    eprintln!("DEFAULT_MIN_MATCH={DEFAULT_MIN_MATCH}");
    eprintln!("MIN_MATCH_FLOOR={MIN_MATCH_FLOOR}");
    eprintln!("DEFAULT_FULL_REVISION_INTERVAL={DEFAULT_FULL_REVISION_INTERVAL}");
    eprintln!("DEFAULT_INPUT_TASK_LIMIT={DEFAULT_INPUT_TASK_LIMIT}");
    eprintln!("DEFAULT_OUTPUT_TASK_LIMIT={DEFAULT_OUTPUT_TASK_LIMIT}");
    eprintln!("DEFAULT_QUEUE_CAPACITY={DEFAULT_QUEUE_CAPACITY}");
    eprintln!("DEFAULT_QUEUE_TIMEOUT={}s", DEFAULT_QUEUE_TIMEOUT.as_secs());
    eprintln!("DEFAULT_CHARSET={}", TextCharset::default());
    eprintln!("DEFAULT_SURROGATE_MODE={}", SurrogateMode::default());
    eprintln!("sizeof(usize)={}", std::mem::size_of::<usize>());
    0
}

// ---------------------------------------------------------------------------
// Diff / apply commands
// ---------------------------------------------------------------------------

fn cmd_diff(opts: &Options) -> i32 {
    let Command::Diff {
        previous,
        current,
        output,
        text,
        encode,
    } = &opts.command
    else {
        return 1;
    };

    let (prev, cur) = match (read_revision(previous), read_revision(current)) {
        (Ok(prev), Ok(cur)) => (prev, cur),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("revdelta: {e}");
            return 1;
        }
    };

    let parts = engine::compute_diff_with(&prev, &cur, &encode.matcher);
    let codec = RevisionCodec::new(encode.codec);
    let payload = match codec.encode_parts(&parts) {
        Ok(payload) => payload,
        Err(e) => {
            eprintln!("revdelta: encode error: {e}");
            return 1;
        }
    };
    let compressed = payload.first() == Some(&COMPRESSED_MARKER);

    let data = if *text {
        match codec
            .encode_body(&parts)
            .and_then(|body| crate::codec::payload::frame_text(&body, codec.options()))
        {
            Ok(mut transport) => {
                transport.push('\n');
                transport.into_bytes()
            }
            Err(e) => {
                eprintln!("revdelta: encode error: {e}");
                return 1;
            }
        }
    } else {
        payload.clone()
    };

    if let Err(e) = write_all(output.as_deref(), opts.force, &data) {
        eprintln!("revdelta: {e}");
        return 1;
    }

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "revdelta: diff: {} -> {} units, payload {} bytes{}",
            prev.len(),
            cur.len(),
            payload.len(),
            if compressed { " (deflated)" } else { "" }
        );
    }
    if opts.json_output {
        report_json(&json!({
            "previous_units": prev.len(),
            "current_units": cur.len(),
            "parts": parts.len(),
            "payload_bytes": payload.len(),
            "written_bytes": data.len(),
            "compressed": compressed,
        }));
    }
    0
}

fn cmd_apply(opts: &Options) -> i32 {
    let Command::Apply {
        previous,
        payload,
        output,
        text,
        codec,
    } = &opts.command
    else {
        return 1;
    };

    let prev = match read_revision(previous) {
        Ok(prev) => prev,
        Err(e) => {
            eprintln!("revdelta: {e}");
            return 1;
        }
    };
    let bytes = match read_payload(payload, *text) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("revdelta: {e}");
            return 1;
        }
    };
    let rebuilt = match engine::decode(&prev, &bytes, codec) {
        Ok(rebuilt) => rebuilt,
        Err(e) => {
            eprintln!("revdelta: apply error: {e}");
            return 1;
        }
    };

    if let Err(e) = write_all(
        output.as_deref(),
        opts.force,
        rebuilt.to_string_lossy().as_bytes(),
    ) {
        eprintln!("revdelta: {e}");
        return 1;
    }
    if opts.verbose > 0 && !opts.quiet {
        eprintln!("revdelta: apply: output {} units", rebuilt.len());
    }
    0
}

// ---------------------------------------------------------------------------
// Inspect command
// ---------------------------------------------------------------------------

fn part_json(part: &DiffPart) -> Value {
    let text = |t: &RevisionText| t.to_string_lossy();
    match part {
        DiffPart::FullRevision { text: t } => json!({ "action": "full", "text": text(t) }),
        DiffPart::Insert { start, text: t } => {
            json!({ "action": "insert", "start": start, "text": text(t) })
        }
        DiffPart::Delete { start, length } => {
            json!({ "action": "delete", "start": start, "length": length })
        }
        DiffPart::Replace {
            start,
            length,
            text: t,
        } => json!({ "action": "replace", "start": start, "length": length, "text": text(t) }),
        DiffPart::Cut {
            start,
            length,
            block_id,
        } => json!({ "action": "cut", "start": start, "length": length, "block": block_id }),
        DiffPart::Paste { start, block_id } => {
            json!({ "action": "paste", "start": start, "block": block_id })
        }
    }
}

fn part_line(index: usize, part: &DiffPart) -> String {
    match part {
        DiffPart::FullRevision { text } => format!("{index:5}  full     units={}", text.len()),
        DiffPart::Insert { start, text } => {
            format!("{index:5}  insert   start={start} units={}", text.len())
        }
        DiffPart::Delete { start, length } => {
            format!("{index:5}  delete   start={start} length={length}")
        }
        DiffPart::Replace {
            start,
            length,
            text,
        } => format!(
            "{index:5}  replace  start={start} length={length} units={}",
            text.len()
        ),
        DiffPart::Cut {
            start,
            length,
            block_id,
        } => format!("{index:5}  cut      start={start} length={length} block={block_id}"),
        DiffPart::Paste { start, block_id } => {
            format!("{index:5}  paste    start={start} block={block_id}")
        }
    }
}

fn codec_data_json(data: &RevisionCodecData) -> Value {
    json!({
        "start_bits": data.start_bits,
        "length_bits": data.length_bits,
        "block_bits": data.block_bits,
        "text_bits": data.text_bits,
    })
}

fn cmd_inspect(opts: &Options) -> i32 {
    let Command::Inspect {
        payload,
        text,
        codec,
    } = &opts.command
    else {
        return 1;
    };

    let raw = match fs::read(payload) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("revdelta: {}: {e}", payload.display());
            return 1;
        }
    };
    let compressed = if *text {
        raw.first() == Some(&(COMPRESSED_TEXT_MARKER as u8))
    } else {
        raw.first() == Some(&COMPRESSED_MARKER)
    };

    let codec = RevisionCodec::new(*codec);
    let decoded = if *text {
        String::from_utf8(raw)
            .map_err(|e| e.to_string())
            .and_then(|s| codec.decode_text(&s).map_err(|e| e.to_string()))
    } else {
        codec.decode(&raw).map_err(|e| e.to_string())
    };
    let (data, parts) = match decoded {
        Ok(decoded) => decoded,
        Err(e) => {
            eprintln!("revdelta: invalid payload: {e}");
            return 1;
        }
    };

    let mut out = io::stdout().lock();
    let result = if opts.json_output {
        let doc = json!({
            "compressed": compressed,
            "codec_data": codec_data_json(&data),
            "parts": parts.iter().map(part_json).collect::<Vec<_>>(),
        });
        serde_json::to_writer_pretty(&mut out, &doc)
            .map_err(io::Error::from)
            .and_then(|()| writeln!(out))
    } else {
        let mut lines = vec![
            format!("codec data:  {data}"),
            format!("compressed:  {}", if compressed { "yes" } else { "no" }),
            format!("parts:       {}", parts.len()),
        ];
        lines.extend(parts.iter().enumerate().map(|(i, p)| part_line(i, p)));
        lines.iter().try_for_each(|line| writeln!(out, "{line}"))
    };
    if let Err(e) = result {
        eprintln!("revdelta: write error: {e}");
        return 1;
    }
    0
}

// ---------------------------------------------------------------------------
// History command
// ---------------------------------------------------------------------------

fn history_record(
    codec: &RevisionCodec,
    diff: &Diff,
    task: &crate::task::Task<Diff>,
) -> Result<Value, EncodeError> {
    let payload = codec.encode_text(diff)?;
    Ok(json!({
        "article_id": task.header.article_id,
        "part_index": task.part_index,
        "task_type": task.task_type.to_string(),
        "revision_counter": diff.meta.revision_counter,
        "revision_id": diff.meta.revision_id,
        "full": diff.is_full_revision(),
        "parts": diff.parts.len(),
        "codec_data": codec_data_json(&diff.codec_data),
        "payload": payload,
    }))
}

fn stats_json(stats: &DriverStats) -> Value {
    json!({
        "revisions_in": stats.revisions_in,
        "diffs_out": stats.diffs_out,
        "full_revisions": stats.full_revisions,
        "noop_drops": stats.noop_drops,
        "surrogate_drops": stats.surrogate_drops,
        "surrogates_replaced": stats.surrogates_replaced,
        "tasks_out": stats.tasks_out,
        "diff_bytes": stats.diff_bytes,
    })
}

fn cmd_history(opts: &Options) -> i32 {
    let Command::History {
        files,
        output,
        header,
        replay_check,
        config,
    } = &opts.command
    else {
        return 1;
    };

    let mut driver = match DiffDriver::new(config.clone()) {
        Ok(driver) => driver,
        Err(e) => {
            eprintln!("revdelta: {e}");
            return 1;
        }
    };

    let mut revisions = Vec::with_capacity(files.len());
    for (i, path) in files.iter().enumerate() {
        let text = match read_revision(path) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("revdelta: {e}");
                return 1;
            }
        };
        let timestamp = DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(i as i64);
        let mut revision = Revision::new(i as u64, i as u64 + 1, timestamp, text);
        revision.comment = path.display().to_string();
        revisions.push(revision);
    }
    let texts: Vec<RevisionText> = revisions.iter().map(|r| r.text.clone()).collect();

    let mut out = match open_output(output.as_deref(), opts.force) {
        Ok(out) => out,
        Err(e) => {
            eprintln!("revdelta: {e}");
            return 1;
        }
    };

    let codec = RevisionCodec::new(config.codec_options());
    let mut stored = Vec::new();
    for task in split_into_tasks(header.clone(), config.input_task_limit, revisions) {
        let done = match driver.process(task) {
            Ok(done) => done,
            Err(e) => {
                eprintln!("revdelta: {e}");
                return 1;
            }
        };
        for task in &done {
            for diff in task.payload() {
                let line = match history_record(&codec, diff, task) {
                    Ok(line) => line,
                    Err(e) => {
                        eprintln!(
                            "revdelta: revision {}: encode error: {e}",
                            diff.meta.revision_id
                        );
                        return 1;
                    }
                };
                if let Err(e) = writeln!(out, "{line}") {
                    eprintln!("revdelta: write error: {e}");
                    return 1;
                }
            }
        }
        stored.extend(done.into_iter().flat_map(|t| t.into_payload()));
    }
    if let Err(e) = out.flush() {
        eprintln!("revdelta: write error: {e}");
        return 1;
    }

    if *replay_check {
        let rebuilt = match replay::reconstruct_all(&stored) {
            Ok(rebuilt) => rebuilt,
            Err(e) => {
                eprintln!("revdelta: replay: {e}");
                return 1;
            }
        };
        // Dropped revisions leave no diff; compare against the stored ids.
        for (diff, text) in stored.iter().zip(&rebuilt) {
            let expected = &texts[(diff.meta.revision_id - 1) as usize];
            if expected.normalized_line_endings() != text.normalized_line_endings() {
                eprintln!(
                    "revdelta: replay: revision counter {} differs from {}",
                    diff.meta.revision_counter,
                    files[(diff.meta.revision_id - 1) as usize].display()
                );
                return 1;
            }
        }
        if !opts.quiet {
            eprintln!("revdelta: replay: {} revisions verified", rebuilt.len());
        }
    }

    let stats = driver.stats();
    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "revdelta: history: {} revisions in, {} diffs out ({} full), {} unchanged, {} dropped",
            stats.revisions_in,
            stats.diffs_out,
            stats.full_revisions,
            stats.noop_drops,
            stats.surrogate_drops
        );
    }
    if opts.json_output {
        report_json(&stats_json(stats));
    }
    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn log_filter(opts: &Options) -> &'static str {
    match (opts.quiet, opts.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        _ => "debug",
    }
}

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = Cli::parse();
    let opts = resolve_options(cli);

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_filter(&opts)))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let exit_code = match opts.command {
        Command::Diff { .. } => cmd_diff(&opts),
        Command::Apply { .. } => cmd_apply(&opts),
        Command::Inspect { .. } => cmd_inspect(&opts),
        Command::History { .. } => cmd_history(&opts),
        Command::Config => cmd_config(),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_opts(args: &[&str]) -> Options {
        let argv: Vec<String> = std::iter::once("revdelta".to_string())
            .chain(args.iter().map(|s| s.to_string()))
            .collect();
        let cli = Cli::try_parse_from(argv).expect("cli parse failed");
        resolve_options(cli)
    }

    #[test]
    fn parse_byte_size_suffixes() {
        assert_eq!(parse_byte_size("1").unwrap(), 1);
        assert_eq!(parse_byte_size("2K").unwrap(), 2 * 1024);
        assert_eq!(parse_byte_size("3m").unwrap(), 3 * 1024 * 1024);
        assert_eq!(parse_byte_size("4G").unwrap(), 4 * 1024 * 1024 * 1024);
        assert!(parse_byte_size("").is_err());
        assert!(parse_byte_size("12Q").is_err());
    }

    #[test]
    fn diff_subcommand_maps_correctly() {
        let opts = parse_opts(&[
            "diff",
            "--min-match",
            "3",
            "--compress",
            "--level",
            "9",
            "--charset",
            "utf16le",
            "old.txt",
            "new.txt",
            "out.bin",
        ]);
        let Command::Diff {
            previous,
            current,
            output,
            text,
            encode,
        } = opts.command
        else {
            panic!("expected diff, got {:?}", opts.command);
        };
        assert_eq!(previous, PathBuf::from("old.txt"));
        assert_eq!(current, PathBuf::from("new.txt"));
        assert_eq!(output, Some(PathBuf::from("out.bin")));
        assert!(!text);
        assert_eq!(encode.matcher.min_match, 3);
        assert!(encode.codec.compress);
        assert_eq!(encode.codec.level, 9);
        assert_eq!(encode.codec.charset, TextCharset::Utf16Le);
    }

    #[test]
    fn apply_subcommand_maps_correctly() {
        let opts = parse_opts(&["--quiet", "apply", "--text", "old.txt", "d.b64", "-o", "new.txt"]);
        assert!(opts.quiet);
        assert_eq!(
            opts.command,
            Command::Apply {
                previous: PathBuf::from("old.txt"),
                payload: PathBuf::from("d.b64"),
                output: Some(PathBuf::from("new.txt")),
                text: true,
                codec: CodecOptions::default(),
            }
        );
    }

    #[test]
    fn history_flags_build_config() {
        let opts = parse_opts(&[
            "history",
            "--interval",
            "50",
            "--min-match",
            "9",
            "--output-limit",
            "64K",
            "--surrogates",
            "replace",
            "--no-verify",
            "--article-id",
            "77",
            "--article-name",
            "Example",
            "r1.txt",
            "r2.txt",
        ]);
        let Command::History {
            files,
            header,
            config,
            ..
        } = opts.command
        else {
            panic!("expected history");
        };
        assert_eq!(files.len(), 2);
        assert_eq!(header, TaskHeader::new(77, "Example"));
        assert_eq!(config.full_revision_interval, 50);
        assert_eq!(config.min_match, 9);
        assert_eq!(config.output_task_limit, 64 * 1024);
        assert_eq!(config.surrogate_mode, SurrogateMode::ReplaceSurrogates);
        assert!(!config.verify);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn history_requires_files() {
        let argv = ["revdelta", "history"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn verbose_is_capped() {
        let opts = parse_opts(&["-v", "-v", "-v", "config"]);
        assert_eq!(opts.verbose, 2);
        assert_eq!(log_filter(&opts), "debug");
        assert_eq!(log_filter(&parse_opts(&["config"])), "warn");
    }

    #[test]
    fn inspect_and_config_map() {
        assert!(matches!(
            parse_opts(&["inspect", "d.bin"]).command,
            Command::Inspect { text: false, .. }
        ));
        assert_eq!(parse_opts(&["config"]).command, Command::Config);
    }

    #[test]
    fn fuzz_entry_tolerates_garbage() {
        fuzz_try_parse_args(&["diff".into(), "--min-match".into(), "zero".into()]);
        fuzz_try_parse_args(&["history".into(), "--output-limit".into(), "9Z".into()]);
    }
}
