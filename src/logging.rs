//! Log sink for the daemon: console, append-mode file and optional syslog.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    sync::Mutex,
};

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record};
use syslog::{BasicLogger, Facility, Formatter3164};

use crate::config::LoggingCfg;

const PROCESS: &str = "thermal_rgbd";

pub struct DaemonLogger {
    level: LevelFilter,
    console: bool,
    file: Option<Mutex<File>>,
    syslog: Option<BasicLogger>,
}

impl DaemonLogger {
    pub fn new(level: LevelFilter, console: bool) -> Self {
        Self {
            level,
            console,
            file: None,
            syslog: None,
        }
    }

    /// Appends every record to `path`, creating the file if needed.
    pub fn with_file(mut self, path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        self.file = Some(Mutex::new(file));
        Ok(self)
    }
}

fn syslog_backend() -> Result<BasicLogger> {
    syslog::unix(Formatter3164 {
        facility: Facility::LOG_DAEMON,
        hostname: None,
        process: PROCESS.into(),
        pid: std::process::id(),
    })
    .map(BasicLogger::new)
    .map_err(|e| anyhow!("syslog unavailable: {e}"))
}

fn format_line(record: &Record<'_>) -> String {
    format!(
        "{} [{}] {}: {}",
        Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
        record.level(),
        record.target(),
        record.args()
    )
}

impl Log for DaemonLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format_line(record);
        if self.console {
            eprintln!("{line}");
        }
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = writeln!(file, "{line}");
            }
        }
        if let Some(syslog) = &self.syslog {
            syslog.log(record);
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
        if let Some(syslog) = &self.syslog {
            syslog.flush();
        }
    }
}

/// Installs the global logger described by `cfg`.
///
/// A missing syslog socket is not fatal: the daemon keeps logging to the
/// console and file and reports the problem once the logger is up.
pub fn init(cfg: &LoggingCfg, level: LevelFilter) -> Result<()> {
    let mut logger = DaemonLogger::new(level, true);
    if let Some(path) = &cfg.file {
        logger = logger.with_file(path)?;
    }

    let mut syslog_error = None;
    if cfg.syslog {
        match syslog_backend() {
            Ok(backend) => logger.syslog = Some(backend),
            Err(e) => syslog_error = Some(e),
        }
    }

    log::set_boxed_logger(Box::new(logger))
        .map(|()| log::set_max_level(level))
        .map_err(|e| anyhow!("{e}"))?;

    if let Some(e) = syslog_error {
        log::warn!("{e:#}");
    }
    Ok(())
}
