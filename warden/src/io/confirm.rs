//! Interactive confirmation for `ask` mode.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::Mutex;

use tracing::warn;

use crate::core::permissions::Confirmer;
use crate::core::types::PermissionLevel;

/// Prompts on a writer and reads a `y`/`yes` answer from a reader.
///
/// Any other answer, EOF or I/O error counts as a refusal.
pub struct TerminalConfirmer<R, W> {
    io: Mutex<(BufReader<R>, W)>,
}

impl TerminalConfirmer<io::Stdin, io::Stderr> {
    /// Prompt on stderr, answer on stdin.
    pub fn stdio() -> Self {
        Self::new(io::stdin(), io::stderr())
    }
}

impl<R: Read, W: Write> TerminalConfirmer<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((BufReader::new(reader), writer)),
        }
    }

    fn ask(&self, level: PermissionLevel, action_label: Option<&str>) -> io::Result<bool> {
        let mut guard = self
            .io
            .lock()
            .map_err(|_| io::Error::other("confirmer lock poisoned"))?;
        let (reader, writer) = &mut *guard;
        match action_label {
            Some(label) => write!(writer, "Allow {level} action '{label}'? [y/N] ")?,
            None => write!(writer, "Allow {level} action? [y/N] ")?,
        }
        writer.flush()?;

        let mut answer = String::new();
        reader.read_line(&mut answer)?;
        let answer = answer.trim().to_ascii_lowercase();
        Ok(answer == "y" || answer == "yes")
    }
}

impl<R, W> Confirmer for TerminalConfirmer<R, W>
where
    R: Read + Send,
    W: Write + Send,
{
    fn confirm(&self, level: PermissionLevel, action_label: Option<&str>) -> bool {
        self.ask(level, action_label).unwrap_or_else(|err| {
            warn!(err = %err, "confirmation prompt failed; denying");
            false
        })
    }
}
