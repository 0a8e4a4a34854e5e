use std::fs::OpenOptions;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Log file next to the working directory, kept across restarts.
pub const LOG_FILE: &str = "current.log";

/// Initializes tracing with the configured level, writing to both the
/// console and the log file. Unknown level strings fall back to INFO.
pub fn init(log_level: &str) -> anyhow::Result<()> {
    let level: Level = log_level.parse().unwrap_or(Level::INFO);

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(LOG_FILE)
        .map_err(|e| anyhow::anyhow!("cannot open log file '{}': {}", LOG_FILE, e))?;

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stdout.and(Arc::new(log_file)))
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_strings_parse_case_insensitively() {
        assert_eq!("DEBUG".parse::<Level>().unwrap(), Level::DEBUG);
        assert_eq!("debug".parse::<Level>().unwrap(), Level::DEBUG);
        assert_eq!("Info".parse::<Level>().unwrap(), Level::INFO);
        assert!("bogus".parse::<Level>().is_err());
    }
}
