// RustPixel
// copyright zipxing@hotmail.com 2022～2025

//! Log module wires the `log` facade used by the graphics core to a log4rs
//! file appender, reference https://docs.rs/log4rs

use crate::error::GfxResult;
use log::LevelFilter;

#[cfg(feature = "log4rs")]
use crate::error::GfxError;
#[cfg(feature = "log4rs")]
use log4rs::{
    append::file::FileAppender,
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
};

/// init logs system
///
/// Can only succeed once per process, later calls return a config error
/// because the global logger is already set.
#[allow(unused)]
pub fn init_log(level: LevelFilter, file_path: &str) -> GfxResult<()> {
    #[cfg(feature = "log4rs")]
    {
        let logfile = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(
                "{d(%Y-%m-%d %H:%M:%S)} {l} {t} {m}{n}",
            )))
            .build(file_path)
            .map_err(|e| GfxError::Config(format!("log file {}: {}", file_path, e)))?;
        let config = Config::builder()
            .appender(
                Appender::builder()
                    .filter(Box::new(ThresholdFilter::new(level)))
                    .build("logfile", Box::new(logfile)),
            )
            .build(Root::builder().appender("logfile").build(level))
            .map_err(|e| GfxError::Config(e.to_string()))?;
        log4rs::init_config(config).map_err(|e| GfxError::Config(e.to_string()))?;
        Ok(())
    }
    #[cfg(not(feature = "log4rs"))]
    {
        log::set_max_level(level);
        Ok(())
    }
}

/// Parse a level name such as `"debug"`, unknown names map to `Info`.
pub fn parse_level(name: &str) -> LevelFilter {
    name.parse().unwrap_or(LevelFilter::Info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), LevelFilter::Debug);
        assert_eq!(parse_level("WARN"), LevelFilter::Warn);
        assert_eq!(parse_level("nonsense"), LevelFilter::Info);
    }
}
