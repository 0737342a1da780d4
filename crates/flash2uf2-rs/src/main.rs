use clap::{Parser, ValueEnum};
use env_logger::Env;
use flash2uf2_core::boards::{BoardInfo, BoardIter, DEFAULT_FILESYSTEM_BLOCKS};
use log::*;

use std::io::Write;

use crate::{
    deploy::deploy,
    pack::pack,
    unpack::{inspect, unpack},
};

mod deploy;
mod pack;
mod reporter;
mod unpack;

#[derive(Parser, Debug)]
enum Command {
    /// Pack a raw filesystem image into a UF2 file
    #[command(arg_required_else_help = true)]
    Pack {
        /// Input raw filesystem image
        input: String,

        /// Output UF2 file
        output: String,

        #[clap(flatten)]
        target: Target,
    },
    /// Unpack the filesystem region of a UF2 file into a raw image
    #[command(arg_required_else_help = true)]
    Unpack {
        /// Input UF2 file
        input: String,

        /// Output raw filesystem image
        output: String,

        #[clap(flatten)]
        target: Target,
    },
    /// Show which blocks and pages of the filesystem region a UF2 file writes
    #[command(arg_required_else_help = true)]
    Info {
        /// Input UF2 file
        input: String,

        #[clap(flatten)]
        target: Target,
    },
    /// Pack a raw filesystem image and copy it to a board in BOOTSEL mode
    #[command(arg_required_else_help = true)]
    Deploy {
        /// Input raw filesystem image
        input: String,

        #[clap(flatten)]
        target: Target,
    },
}

#[derive(clap::Args, Debug)]
struct Target {
    /// Explicit board (rp2040, rp2350, etc.)
    #[clap(short, long, value_parser = board_parser)]
    board: String,

    /// Size of the filesystem region in erase blocks, counted back from the end of flash
    #[clap(long, default_value_t = DEFAULT_FILESYSTEM_BLOCKS)]
    blocks: u32,
}

impl Target {
    fn board(&self) -> Result<Box<dyn BoardInfo>, String> {
        BoardIter::find_by_name(&self.board)
            .ok_or_else(|| format!("Unknown board '{}'", self.board))
    }
}

fn board_parser(s: &str) -> Result<String, String> {
    if let Some(board) = BoardIter::find_by_name(s) {
        Ok(board.board_name().to_string())
    } else {
        Err(format!("Unknown board '{}'", s))
    }
}

#[derive(Parser, Debug, Default)]
#[clap(version, about, long_about = None)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Set the logging verbosity
    #[clap(short, long, value_enum, global = true, default_value_t = LogLevel::Info)]
    verbose: LogLevel,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Off => LevelFilter::Off,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(Env::default())
        .filter_level(cli.verbose.into())
        .target(env_logger::Target::Stdout)
        .format(|buf, record| {
            let level = record.level();
            if level == Level::Info {
                writeln!(buf, "{}", record.args())
            } else {
                writeln!(buf, "{}: {}", record.level(), record.args())
            }
        })
        .init();

    let command = match cli.command {
        Some(command) => command,
        None => return Ok(()),
    };

    match command {
        Command::Pack {
            input,
            output,
            target,
        } => pack(&input, &output, target.board()?.as_ref(), target.blocks),
        Command::Unpack {
            input,
            output,
            target,
        } => unpack(&input, &output, target.board()?.as_ref(), target.blocks),
        Command::Info { input, target } => {
            inspect(&input, target.board()?.as_ref(), target.blocks)
        }
        Command::Deploy { input, target } => {
            deploy(&input, target.board()?.as_ref(), target.blocks)
        }
    }
}
