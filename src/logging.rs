use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use env_logger::{Builder, Env, Target};

use crate::error::{IngestError, Result};

/// Copies every log line to stdout and to an open file.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        self.file.flush()
    }
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| IngestError::from_io(parent, e))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| IngestError::from_io(path, e))
}

/// Install the global logger: `<timestamp> | <LEVEL> | <message>` on stdout,
/// and appended to `log_file` as well when one is given.
///
/// The level defaults to `info` and can be changed through `RUST_LOG`.
/// Calling it twice is harmless.
pub fn init(log_file: Option<&Path>) -> Result<()> {
    let target = match log_file {
        Some(path) => Target::Pipe(Box::new(Tee {
            file: open_log_file(path)?,
        })),
        None => Target::Stdout,
    };

    let _ = Builder::from_env(Env::default().default_filter_or("info"))
        .target(target)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} | {:<8} | {}",
                buf.timestamp_seconds(),
                record.level(),
                record.args()
            )
        })
        .try_init();
    Ok(())
}
