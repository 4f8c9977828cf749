//! Nice qunfold output formatting.

use std::fmt;

use log;

const QUNFOLD_BANNER_LENGTH: usize = 103;

/// Logs a warning to the `qunfold-output` logger.
macro_rules! qunfold_warn {
    ($fmt:expr $(, $($arg:tt)*)?) => { log::warn!(target: "qunfold-output", $fmt, $($($arg)*)?); }
}

/// Logs a main output line to the `qunfold-output` logger.
macro_rules! qunfold_output {
    ($fmt:expr $(, $($arg:tt)*)?) => { log::info!(target: "qunfold-output", $fmt, $($($arg)*)?); }
}

pub(crate) use {qunfold_output, qunfold_warn};

/// Logs a nicely formatted section title to the `qunfold-output` logger.
pub(crate) fn log_title(title: &str) {
    let length = title.chars().count().max(QUNFOLD_BANNER_LENGTH - 6);
    let bar = "─".repeat(length);
    qunfold_output!("┌──{bar}──┐");
    qunfold_output!("│§ {title:^length$} §│");
    qunfold_output!("└──{bar}──┘");
}

/// Writes a nicely formatted subtitle.
pub(crate) fn write_subtitle(f: &mut fmt::Formatter<'_>, subtitle: &str) -> fmt::Result {
    let length = subtitle.chars().count();
    let bar = "═".repeat(length);
    writeln!(f, "{subtitle}")?;
    writeln!(f, "{bar}")?;
    Ok(())
}

/// Logs a nicely formatted subtitle to the `qunfold-output` logger.
pub(crate) fn log_subtitle(subtitle: &str) {
    let length = subtitle.chars().count();
    let bar = "═".repeat(length);
    qunfold_output!("{}", subtitle);
    qunfold_output!("{}", bar);
}

/// Logs a nicely formatted macro-section beginning to the `qunfold-output` logger.
pub(crate) fn log_macsec_begin(sectitle: &str) {
    let width = QUNFOLD_BANNER_LENGTH - 14;
    let sectitle_space = sectitle.to_string() + " ";
    qunfold_output!("❬❬❬❬❬ [Begin] {sectitle_space:❬<width$}");
}

/// Logs a nicely formatted macro-section ending to the `qunfold-output` logger.
pub(crate) fn log_macsec_end(sectitle: &str) {
    let width = QUNFOLD_BANNER_LENGTH - 14;
    let sectitle_space = sectitle.to_string() + " ";
    qunfold_output!("❭❭❭❭❭ [ End ] {sectitle_space:❭<width$}");
}

/// Turns a boolean into a string of `yes` or `no`.
pub(crate) fn nice_bool(b: bool) -> String {
    if b {
        "yes".to_string()
    } else {
        "no".to_string()
    }
}

/// Formats a fractional k-vector with a fixed number of decimal places.
pub(crate) fn format_kvector(k: &nalgebra::Vector3<f64>) -> String {
    format!("({:+8.4}, {:+8.4}, {:+8.4})", k[0], k[1], k[2])
}

/// A trait for logging qunfold outputs nicely.
pub(crate) trait QunfoldOutput: fmt::Debug + fmt::Display {
    /// Logs display output nicely.
    fn log_output_display(&self) {
        let lines = self.to_string();
        lines.lines().for_each(|line| {
            qunfold_output!("{line}");
        })
    }
}

// Blanket implementation
impl<T> QunfoldOutput for T where T: fmt::Debug + fmt::Display {}
