// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tracing subscriber setup from the Logging settings section.

use std::sync::Mutex;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

use crate::config::{ConfigError, LoggingSettings};

fn severity_directive(severity: &str) -> &'static str {
    match severity.to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    }
}

fn has_sink(settings: &LoggingSettings, name: &str) -> bool {
    settings.sinks.iter().any(|s| s.eq_ignore_ascii_case(name))
}

/// Initialize the global tracing subscriber. `RUST_LOG` overrides the
/// configured severity. Safe to call more than once; later calls are no-ops.
pub fn init(settings: &LoggingSettings) -> Result<(), ConfigError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(severity_directive(&settings.minimum_severity)));

    let console = has_sink(settings, "Console") || settings.sinks.is_empty();
    let file = match (&settings.file_path, has_sink(settings, "File")) {
        (Some(path), true) => Some(Mutex::new(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?,
        )),
        _ => None,
    };

    let writer = match (console, file) {
        (true, Some(file)) => BoxMakeWriter::new(std::io::stdout.and(file)),
        (false, Some(file)) => BoxMakeWriter::new(file),
        _ => BoxMakeWriter::new(std::io::stdout),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(settings.console_colors)
        .with_writer(writer)
        .try_init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_mapping() {
        assert_eq!(severity_directive("Debug"), "debug");
        assert_eq!(severity_directive("warning"), "warn");
        assert_eq!(severity_directive("ERROR"), "error");
        assert_eq!(severity_directive("Info"), "info");
        assert_eq!(severity_directive("bogus"), "info");
    }

    #[test]
    fn test_sink_match_is_case_insensitive() {
        let settings = LoggingSettings {
            sinks: vec!["console".to_string(), "FILE".to_string()],
            ..Default::default()
        };
        assert!(has_sink(&settings, "Console"));
        assert!(has_sink(&settings, "File"));
        assert!(!has_sink(&settings, "Syslog"));
    }

    #[test]
    fn test_init_with_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("constellation.log");
        let settings = LoggingSettings {
            sinks: vec!["File".to_string()],
            file_path: Some(path.to_string_lossy().into_owned()),
            ..Default::default()
        };
        assert!(init(&settings).is_ok());
        assert!(path.exists());
    }
}
