use crate::logger::format::LoggerFormat;

/// Environment variable that overrides the configured filter directive.
pub const LOG_ENV: &str = "FLEET_LOG";

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directive, e.g. `info` or `fleet_core=debug,info`.
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl LoggerConfig {
    pub fn new(format: LoggerFormat, level: impl Into<String>) -> Self {
        Self {
            format,
            level: level.into(),
            ..Default::default()
        }
    }

    /// Directive actually used: `FLEET_LOG` wins over the configured level.
    pub fn directive(&self) -> String {
        match std::env::var(LOG_ENV) {
            Ok(v) if !v.trim().is_empty() => v,
            _ => self.level.clone(),
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        let use_color = cfg!(test) || atty::is(atty::Stream::Stdout);
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color,
        }
    }
}
