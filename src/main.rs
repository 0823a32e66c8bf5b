use std::io::{self, IsTerminal as _, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use colored::Colorize;
use miette::{IntoDiagnostic as _, Result, WrapErr as _};

use lc3vm::input::{self, Input, Scripted};
use lc3vm::{CrlfWriter, Image, Output, RawMode, RunState, PC_START};

/// Run LC3 object images in a virtual machine.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// `.obj` images to load, in order; later images overwrite earlier ones
    #[arg(required = true)]
    images: Vec<PathBuf>,
    /// Produce minimal output, suited for blackbox tests
    #[arg(short, long)]
    minimal: bool,
    /// Print registers once the machine halts
    #[arg(short, long)]
    registers: bool,
    /// Read keyboard input from argument instead of stdin
    #[arg(short, long)]
    input: Option<String>,
    /// Address to start executing at
    #[arg(short, long, default_value_t = PC_START, value_parser = parse_address)]
    origin: u16,
}

fn main() -> miette::Result<()> {
    use MsgColor::*;

    let args = Args::parse();
    lc3vm::env::init();
    Output::set_minimal(args.minimal);

    let mut images = Vec::with_capacity(args.images.len());
    for path in &args.images {
        file_message(Green, "Loading", path);
        let image = match Image::read(path) {
            Ok(image) => image,
            Err(err) => {
                file_message(Red, "Failed", path);
                return Err(err);
            }
        };
        if let Some(warning) = image.truncation_warning() {
            eprintln!("{:?}", warning);
        }
        images.push(image);
    }

    message(Green, "Running", &format!("from 0x{:04x}", args.origin));
    // Interactive terminal is held in raw mode while running, so typed keys are not echoed
    let interactive = args.input.is_none() && io::stdin().is_terminal();
    if interactive {
        message(Cyan, "Help", "press CTRL+C to exit");
    }
    let raw_mode = interactive
        .then(RawMode::enable)
        .transpose()
        .into_diagnostic()
        .wrap_err("Failed to set up terminal")?;

    let keyboard: Box<dyn Input> = match args.input {
        Some(input) => Box::new(Scripted::new(input)),
        None => input::stdin(),
    };
    let out: Box<dyn Write> = if interactive && io::stdout().is_terminal() {
        Box::new(CrlfWriter::new(io::stdout()))
    } else {
        Box::new(io::stdout())
    };
    let mut program = RunState::new(keyboard, out);
    program.set_trace(lc3vm::env::is_trace_enabled());
    for image in &images {
        program.load(image);
    }
    program.set_pc(args.origin);

    let result = program.run();
    drop(raw_mode);
    if let Err(err) = result {
        message(Red, "Aborted", "machine faulted");
        return Err(err.into());
    }

    if args.registers {
        Output::Normal.print_registers(&program);
    }
    message(Green, "Completed", "machine halted");
    Ok(())
}

enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message(color: MsgColor, left: &str, right: &str) {
    if Output::is_minimal() {
        return;
    }
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

/// Accepts `0x3000`, `x3000` or decimal.
fn parse_address(arg: &str) -> Result<u16, String> {
    let parsed = match arg.strip_prefix("0x").or_else(|| arg.strip_prefix('x')) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => arg.parse(),
    };
    parsed.map_err(|_| format!("`{arg}` is not an address; expected decimal, `0x3000` or `x3000`"))
}
