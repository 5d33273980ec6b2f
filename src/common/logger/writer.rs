use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
};

use parking_lot::Mutex;

/// Removes ANSI escape sequences so the show log stays plain text.
pub fn strip_ansi_escapes(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' {
            in_escape = true;
        } else if in_escape {
            if c.is_ascii_alphabetic() {
                in_escape = false;
            }
        } else {
            result.push(c);
        }
    }
    result
}

/// Appends to a log file and keeps only the newest `max_lines` lines.
///
/// Trimming is batched: the file is rewritten once enough new lines have
/// accumulated, not on every write.
#[derive(Clone)]
pub struct LineCappedFileWriter {
    path: PathBuf,
    max_lines: u32,
    written: Arc<Mutex<u32>>,
}

impl LineCappedFileWriter {
    pub fn new(path: impl Into<PathBuf>, max_lines: u32) -> Self {
        Self {
            path: path.into(),
            max_lines: max_lines.max(1),
            written: Arc::new(Mutex::new(0)),
        }
    }

    fn trim_threshold(&self) -> u32 {
        (self.max_lines / 10).max(50)
    }

    fn trim(&self) -> io::Result<()> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        let lines: Vec<&str> = contents.lines().collect();
        let keep = self.max_lines as usize;
        if lines.len() <= keep {
            return Ok(());
        }

        let mut tail = lines[lines.len() - keep..].join("\n");
        tail.push('\n');
        fs::write(&self.path, tail)
    }
}

impl io::Write for LineCappedFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut written = self.written.lock();

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?
            .write_all(buf)?;

        *written += buf.iter().filter(|&&b| b == b'\n').count() as u32;
        if *written >= self.trim_threshold() {
            if let Err(e) = self.trim() {
                eprintln!("Failed to trim log file: {}", e);
            }
            *written = 0;
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LineCappedFileWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
