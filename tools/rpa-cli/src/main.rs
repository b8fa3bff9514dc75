//! Ruida protocol analyzer command line.
//!
//! Decodes a tshark capture of Ruida CNC protocol traffic, either from a
//! recorded log file or live from a spawned tshark process.

mod collector;
mod emitter;

use std::io::BufReader;
use std::path::PathBuf;
use std::process::{Command, ExitCode, Stdio};

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};

use rpa_analyzer::{Analyzer, AnalyzerError};
use rpa_capture_reader::{CaptureInput, DumpReader, InputEncoding, PacketStream};
use rpa_decoder::ParserError;
use rpa_decoder::command_handler::combined::{CombinedCommandHandler, CombinedError};
use rpa_decoder::command_handler::log::CommandLogger;
use rpa_decoder::emit::{Direction, Emit};

use crate::collector::{CollectorError, MoveCollector};
use crate::emitter::{ConsoleEmitter, EmitterOptions};

/// Ruida Protocol Analyzer - Parse and decode Ruida CNC protocol packets.
///
/// The tshark log file must be in a specific format. Use this command to
/// capture:
///
///   tshark -Y "(ip.addr == <ruida_ip> && udp.payload)" -T fields
///          -e frame.time_delta -e udp.port -e udp.length -e data.data > capture.log
///
/// The decoded data is emitted to the console (stdout) which can be
/// redirected to a file. Set the environment variable RUST_LOG=trace for
/// internal logging.
#[derive(Parser)]
#[command(version, verbatim_doc_comment)]
struct Cmdline {
    /// Tshark log file to analyze (not needed with --on-the-fly)
    input_file: Option<PathBuf>,

    /// Input text encoding. Windows files can be encoded as utf-16.
    #[arg(long, value_enum, default_value = "utf-8")]
    input_encoding: Encoding,

    /// Spawn tshark and process the output in real time (requires --ip)
    #[arg(long, requires = "ip", conflicts_with = "input_file")]
    on_the_fly: bool,

    /// The IP address of the Ruida controller (required when using
    /// --on-the-fly)
    #[arg(long, value_name = "ip_address")]
    ip: Option<String>,

    /// The protocol to use for decoding the raw data. Currently only the
    /// ruida protocol is available.
    #[arg(long, default_value = "ruida")]
    protocol: String,

    /// Swizzle magic number (e.g. 0x88) rather than attempting to discover
    /// it in the capture
    #[arg(long, value_parser = parse_magic, value_name = "magic_number")]
    magic: Option<u8>,

    /// Write the decoded data to <file> in addition to the console
    #[arg(long = "out", short = 'o', value_name = "file")]
    output_file: Option<PathBuf>,

    /// Do not output to stdout -- disables --verbose, --raw, and
    /// --unswizzled
    #[arg(long, short, conflicts_with = "verbose")]
    quiet: bool,

    /// Generate verbose output
    #[arg(long)]
    verbose: bool,

    /// Output the raw dump lines with the decoded output
    #[arg(long)]
    raw: bool,

    /// Output the unswizzled and unprocessed data
    #[arg(long)]
    unswizzled: bool,

    /// Stop decode when an error is detected -- do not attempt to resync
    #[arg(long)]
    stop_on_error: bool,

    /// Pause output after each host packet has been parsed (ignored when
    /// --on-the-fly)
    #[arg(long)]
    step_packets: bool,

    /// Pause output after each decode message (disables --on-the-fly)
    #[arg(long)]
    step_decode: bool,

    /// Pause plot output after each move command has been parsed (ignored
    /// when --on-the-fly)
    #[arg(long)]
    step_moves: bool,

    /// Pause plot output after command N has been parsed and start stepping
    #[arg(long, default_value_t = 0, value_name = "n")]
    step_on_command: u64,

    /// Collect all moves and cuts and print a summary (ignored when
    /// --on-the-fly)
    #[arg(long)]
    plot_moves: bool,

    /// Enter an interactive mode on the console (ignored when --on-the-fly)
    #[arg(long)]
    interactive: bool,
}

/// Text encoding of the capture file
#[derive(ValueEnum, Clone, Copy, Default)]
enum Encoding {
    /// tshark's native output
    #[default]
    #[value(name = "utf-8")]
    Utf8,
    /// Windows shell redirection
    #[value(name = "utf-16")]
    Utf16,
}

impl From<Encoding> for InputEncoding {
    fn from(encoding: Encoding) -> Self {
        match encoding {
            Encoding::Utf8 => Self::Utf8,
            Encoding::Utf16 => Self::Utf16,
        }
    }
}

fn parse_magic(text: &str) -> Result<u8, String> {
    text.strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .and_then(|hex| u8::from_str_radix(hex, 16).ok())
        .ok_or_else(|| format!("invalid magic number format: {text}"))
}

type Handler = CombinedCommandHandler<CommandLogger, MoveCollector>;

/// Stepping prompts answered with `quit` unwind as operator interrupts, no
/// matter which component raised them
fn is_operator_interrupt(err: &AnalyzerError<Handler>) -> bool {
    err.is_interrupt()
        || matches!(
            err,
            AnalyzerError::Parser(ParserError::Handler(CombinedError::H2Error(
                CollectorError::Interrupted
            )))
        )
}

fn validate(args: &mut Cmdline) -> anyhow::Result<()> {
    if !args.on_the_fly && args.input_file.is_none() {
        bail!("input file required unless using --on-the-fly");
    }
    if args.protocol != "ruida" {
        bail!(
            "unsupported protocol {:?}: only ruida is available",
            args.protocol
        );
    }
    if args.quiet {
        args.raw = false;
        args.unswizzled = false;
    }
    if args.on_the_fly {
        // A live stream cannot pause or replay.
        if args.step_packets || args.step_decode || args.step_moves || args.plot_moves
            || args.interactive
        {
            log::info!("stepping and plotting are disabled when --on-the-fly is enabled");
        }
        args.step_packets = false;
        args.step_decode = false;
        args.step_moves = false;
        args.step_on_command = 0;
        args.plot_moves = false;
        args.interactive = false;
    }
    Ok(())
}

/// Either open the input file or spawn tshark. Both feed the same record
/// reader.
fn open_input(args: &Cmdline) -> anyhow::Result<CaptureInput> {
    if let Some(path) = &args.input_file {
        return CaptureInput::open_file(path, args.input_encoding.into())
            .with_context(|| format!("failed to open {}", path.display()));
    }
    let ip = args
        .ip
        .as_deref()
        .context("--ip is required when using --on-the-fly")?;
    let mut child = Command::new("tshark")
        .args([
            "-Y",
            &format!("(ip.addr == {ip} && udp.payload)"),
            "-T",
            "fields",
            "-e",
            "frame.time_delta",
            "-e",
            "udp.port",
            "-e",
            "udp.length",
            "-e",
            "data.data",
            "-l",
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .context("tshark not found. Please install Wireshark/tshark")?;
    let stdout = child
        .stdout
        .take()
        .context("tshark did not open its output")?;
    Ok(CaptureInput::from_stream(BufReader::new(stdout)))
}

fn run(mut args: Cmdline) -> anyhow::Result<ExitCode> {
    validate(&mut args)?;

    let input = open_input(&args)?;
    let options = EmitterOptions {
        quiet: args.quiet,
        verbose: args.verbose,
        raw: args.raw,
        unswizzled: args.unswizzled,
        stop_on_error: args.stop_on_error,
        step_packets: args.step_packets,
        step_decode: args.step_decode,
    };
    let mut out = ConsoleEmitter::new(options, args.output_file.as_deref())
        .context("failed to open the output file")?;

    let mut stream = PacketStream::new(DumpReader::new(input));
    if let Err(err) = stream.init_magic(args.magic) {
        let _ = out.critical(&err.to_string());
        let _ = out.critical("Verify incoming data is a tshark dump of a Ruida UDP session.");
        out.flush();
        return Ok(ExitCode::FAILURE);
    }

    // The collector also backs move stepping and the interactive browser.
    let collect = args.plot_moves || args.step_moves || args.interactive;
    let mut handler = CombinedCommandHandler::new(
        CommandLogger,
        MoveCollector::new(collect, args.step_moves, args.step_on_command),
    );
    let result = Analyzer::new(stream, &mut out, &mut handler).run();
    let collector = handler.handler2();

    let code = match result {
        Ok(_summary) => {
            out.set_direction(Direction::Internal);
            if args.plot_moves {
                for line in collector.render() {
                    out.info(&line);
                }
            }
            out.info("Decode complete.");
            if args.interactive {
                collector.interactive()?;
            }
            ExitCode::SUCCESS
        }
        Err(err) if is_operator_interrupt(&err) => {
            out.info("Exiting at user request.");
            ExitCode::SUCCESS
        }
        Err(err) => {
            let _ = out.critical(&format!("Shutting down: {err}"));
            let mut source = std::error::Error::source(&err);
            while let Some(cause) = source {
                let _ = out.critical(&cause.to_string());
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    };
    out.flush();
    Ok(code)
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Cmdline::parse();
    match run(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
