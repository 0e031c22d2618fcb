//! Log output routing.
//!
//! Records normally go to stderr. While the terminal keyboard owns the screen
//! they are appended to a file instead, since anything written to stderr in
//! raw mode lands in cells the frontend believes are unchanged.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

static DIVERTED: Mutex<Option<File>> = Mutex::new(None);

/// Install `env_logger` (`RUST_LOG`, default `info`, millisecond timestamps)
/// writing through [`LogSink`].
pub fn init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .target(env_logger::Target::Pipe(Box::new(LogSink)))
        .init();
}

/// Writes to the diverted file when one is set, stderr otherwise.
pub struct LogSink;

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match DIVERTED.lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(file) => file.write(buf),
                None => io::stderr().write(buf),
            },
            Err(_) => io::stderr().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match DIVERTED.lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(file) => file.flush(),
                None => io::stderr().flush(),
            },
            Err(_) => io::stderr().flush(),
        }
    }
}

/// Keeps log output in a file until dropped, then goes back to stderr.
pub struct LogDiversion(());

impl LogDiversion {
    pub fn start(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        set_target(Some(file));
        Ok(LogDiversion(()))
    }
}

impl Drop for LogDiversion {
    fn drop(&mut self) {
        set_target(None);
    }
}

fn set_target(file: Option<File>) {
    if let Ok(mut guard) = DIVERTED.lock() {
        if let Some(old) = guard.as_mut() {
            let _ = old.flush();
        }
        *guard = file;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diversion_captures_and_releases() {
        let path = std::env::temp_dir().join(format!("keyviz_log_{}.log", std::process::id()));
        let _ = std::fs::remove_file(&path);

        {
            let _diversion = LogDiversion::start(&path).unwrap();
            LogSink.write_all(b"adding token\n").unwrap();
            LogSink.flush().unwrap();
        }
        assert!(DIVERTED.lock().unwrap().is_none(), "stderr restored on drop");

        // A second diversion appends rather than truncating
        {
            let _diversion = LogDiversion::start(&path).unwrap();
            LogSink.write_all(b"retired token\n").unwrap();
        }

        let text = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(text, "adding token\nretired token\n");
    }

    #[test]
    fn test_unwritable_log_path_is_an_error() {
        let result = LogDiversion::start(Path::new("/no/such/dir/keyviz.log"));
        assert!(result.is_err());
    }
}
