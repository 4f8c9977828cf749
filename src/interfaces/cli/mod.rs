use std::path::PathBuf;

use anyhow::{self, format_err};
use clap::Parser;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::io::format::qunfold_output;

const VERSION: Option<&str> = option_env!("CARGO_PKG_VERSION");

/// Logs a nicely formatted qunfold heading to the `qunfold-output` logger.
pub fn log_heading() {
    let version = if let Some(ver) = VERSION {
        format!("v{ver}")
    } else {
        "v unknown".to_string()
    };
    qunfold_output!("╭─────────────────────────────────────────────────────────────────────────────────────────────────────╮");
    qunfold_output!("│                                                                                                     │");
    qunfold_output!("│                                           q u n f o l d                                             │");
    qunfold_output!("│                                                                                                     │");
    qunfold_output!("│                     Effective band structures from plane-wave supercell calculations                │");
    qunfold_output!("│                                                                                                     │");
    qunfold_output!("│                                                                                       {version:>13} │");
    qunfold_output!("╰─────────────────────────────────────────────────────────────────────────────────────────────────────╯");
    qunfold_output!("");
}

#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// The YAML input file specifying the calculations to run.
    #[arg(short, long)]
    pub config: PathBuf,

    /// An optional file to which the main output is also written.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Increases the verbosity of diagnostic messages. May be given more than once.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Configures the `log4rs` loggers.
///
/// Main output goes to the `qunfold-output` logger, which writes to the console and, if `output`
/// is given, to that file as well. All other messages go to the console at a level set by
/// `verbose`.
///
/// # Arguments
///
/// * `output` - An optional output file.
/// * `verbose` - The verbosity level: `0` for warnings, `1` for information, `2` for debugging
/// messages, and higher for tracing messages.
pub fn setup_logger(output: Option<&PathBuf>, verbose: u8) -> Result<(), anyhow::Error> {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{m}{n}")))
        .build();
    let stderr = ConsoleAppender::builder()
        .target(log4rs::append::console::Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("[{d(%H:%M:%S)} {h({l}):<5}] {t} - {m}{n}")))
        .build();

    let mut output_appenders = vec!["qunfold-stdout".to_string()];
    let mut builder = Config::builder()
        .appender(Appender::builder().build("qunfold-stdout", Box::new(stdout)))
        .appender(Appender::builder().build("stderr", Box::new(stderr)));
    if let Some(path) = output {
        let file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new("{m}{n}")))
            .append(false)
            .build(path)
            .map_err(|err| format_err!(err))?;
        builder = builder.appender(Appender::builder().build("qunfold-file", Box::new(file)));
        output_appenders.push("qunfold-file".to_string());
    }
    let config = builder
        .logger(
            Logger::builder()
                .appenders(output_appenders)
                .additive(false)
                .build("qunfold-output", LevelFilter::Info),
        )
        .build(Root::builder().appender("stderr").build(level))
        .map_err(|err| format_err!(err))?;
    log4rs::init_config(config).map_err(|err| format_err!(err))?;
    Ok(())
}
