use std::fs::OpenOptions;
use std::io::{BufWriter, Write};

/// Appends transcript lines to a user-chosen file. Inactive unless a path
/// was supplied, so every call site can log unconditionally.
pub struct LoggingState {
    file_path: Option<String>,
    is_active: bool,
}

impl LoggingState {
    pub fn new(log_file: Option<String>) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(path) = &log_file {
            test_file_access(path)?;
        }
        Ok(LoggingState {
            is_active: log_file.is_some(),
            file_path: log_file,
        })
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn log_message(&self, content: &str) -> Result<(), Box<dyn std::error::Error>> {
        let Some(file_path) = self.file_path.as_ref().filter(|_| self.is_active) else {
            return Ok(());
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        let mut writer = BufWriter::new(file);

        for line in content.lines() {
            writeln!(writer, "{line}")?;
        }
        // Empty line after each message for spacing.
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}

fn test_file_access(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.flush()?;
    Ok(())
}
