// Logging module — powered by tracing-subscriber
//
// The gateway crates emit through the `log` facade; a compatibility bridge
// (`tracing_log::LogTracer`) captures those records and routes them through
// the tracing subscriber so console and file layers see everything.

use std::fs::{self, OpenOptions};
use std::path::Path;

use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingSettings;

/// Log format type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Compact text format: timestamp LEVEL target - message
    Compact,
    /// JSON Lines format for log shippers
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" | "jsonl" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Dependencies that drown the gateway's own output at debug and below.
const NOISY_TARGETS: &[(&str, &str)] = &[
    ("actix_server", "warn"),
    ("actix_http", "warn"),
    ("actix_web", "warn"),
    ("mio", "warn"),
    ("tokio_util", "warn"),
];

fn build_env_filter(settings: &LoggingSettings) -> EnvFilter {
    let mut directives = vec![settings.level.clone()];
    for (target, level) in NOISY_TARGETS {
        if !settings.targets.contains_key(*target) {
            directives.push(format!("{target}={level}"));
        }
    }
    for (target, level) in &settings.targets {
        directives.push(format!("{target}={level}"));
    }
    EnvFilter::new(directives.join(","))
}

/// Install the global subscriber. Called once from `main` before anything
/// else logs.
pub fn init_logging(settings: &LoggingSettings) -> anyhow::Result<()> {
    LogTracer::init().ok();

    let format = LogFormat::parse(&settings.format);
    let filter = build_env_filter(settings);

    let console_layer = if settings.log_to_console {
        let layer = match format {
            LogFormat::Json => tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .boxed(),
            LogFormat::Compact => tracing_subscriber::fmt::layer()
                .compact()
                .with_ansi(true)
                .with_target(true)
                .boxed(),
        };
        Some(layer)
    } else {
        None
    };

    let file_layer = if settings.file_path.is_empty() {
        None
    } else {
        if let Some(parent) = Path::new(&settings.file_path).parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&settings.file_path)?;
        let layer = match format {
            LogFormat::Json => tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file)
                .with_ansi(false)
                .boxed(),
            LogFormat::Compact => tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(file)
                .with_ansi(false)
                .boxed(),
        };
        Some(layer)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("JSONL"), LogFormat::Json);
        assert_eq!(LogFormat::parse("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Compact);
    }

    #[test]
    fn test_target_override_replaces_noise_suppression() {
        let mut settings = LoggingSettings::default();
        settings.level = "debug".to_string();
        settings
            .targets
            .insert("actix_web".to_string(), "trace".to_string());
        let filter = build_env_filter(&settings);
        let rendered = format!("{filter}");
        assert!(rendered.contains("actix_web=trace"));
        assert!(!rendered.contains("actix_web=warn"));
    }
}
