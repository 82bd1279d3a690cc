use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::debug;

/// Last lines of a relay's combined stdout and stderr
#[derive(Clone)]
pub struct LogTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    max_lines: usize,
    max_line_len: usize,
}

impl LogTail {
    pub fn new(max_lines: usize, max_line_len: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(max_lines))),
            max_lines: max_lines.max(1),
            max_line_len: max_line_len.max(1),
        }
    }

    pub fn push(&self, line: &str) {
        let line = line.trim_end();
        if line.is_empty() {
            return;
        }
        let line = truncate(line, self.max_line_len);
        let mut lines = self.lines.lock().unwrap();
        if lines.len() == self.max_lines {
            lines.pop_front();
        }
        lines.push_back(line.to_string());
    }

    pub fn text(&self) -> String {
        let lines = self.lines.lock().unwrap();
        lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }

    /// Copy every line of `reader` into the tail until EOF
    pub fn follow<R>(&self, reader: R, destination: String) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let tail = self.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        debug!(destination, "relay: {}", line.trim_end());
                        tail.push(&line);
                    }
                    Err(e) => {
                        debug!(destination, "relay output closed: {}", e);
                        break;
                    }
                }
            }
        })
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
