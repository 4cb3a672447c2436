//! Child-output pumping: translation, pacing, and raw recording.

use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, BorrowedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::time::Duration;

use nix::errno::Errno;
use vttrans::Translator;

use crate::screen::write_all;

/// Read size for one pump pass, matching the pacing granularity.
const READ_CHUNK: usize = 128;

pub enum PumpStatus {
    Continue,
    /// The child side of the pty is gone.
    Eof,
}

/// Moves bytes from the child pty to the host terminal.
///
/// Raw bytes are appended to the recorder before translation, so a
/// recording replays into another emulator exactly as the child wrote
/// it. The per-byte delay applies to every *source* byte, passthrough
/// or control, which is what gives a throttled session its
/// line-speed feel.
pub struct OutputPump<'t> {
    translator: Option<Translator<'t>>,
    delay: Option<Duration>,
    scratch: Vec<u8>,
}

impl<'t> OutputPump<'t> {
    #[must_use]
    pub fn new(
        translator: Option<Translator<'t>>,
        delay: Option<Duration>,
    ) -> Self {
        OutputPump {
            translator,
            delay,
            scratch: Vec::with_capacity(64),
        }
    }

    /// Service one readable event on the pty master.
    ///
    /// # Errors
    ///
    /// Write failures toward the host terminal and translator
    /// invariant violations are fatal and surface here; recording
    /// failures are not.
    pub fn handle(
        &mut self,
        master: BorrowedFd<'_>,
        stdout: BorrowedFd<'_>,
        recorder: &mut Recorder,
    ) -> io::Result<PumpStatus> {
        let mut buf = [0u8; READ_CHUNK];
        let count = match nix::unistd::read(master.as_raw_fd(), &mut buf) {
            Ok(0) => return Ok(PumpStatus::Eof),
            Ok(n) => n,
            Err(Errno::EAGAIN) => return Ok(PumpStatus::Continue),
            // A pty master reads EIO once the child side is closed.
            Err(Errno::EIO) => return Ok(PumpStatus::Eof),
            Err(e) => return Err(e.into()),
        };

        recorder.append(&buf[..count]);

        for &byte in &buf[..count] {
            if let Some(delay) = self.delay {
                // Interrupted sleeps are simply cut short.
                std::thread::sleep(delay);
            }
            match &mut self.translator {
                Some(translator) => {
                    self.scratch.clear();
                    translator
                        .feed(byte, &mut self.scratch)
                        .map_err(io::Error::other)?;
                    write_all(stdout, &self.scratch)?;
                }
                None => write_all(stdout, &[byte])?,
            }
        }
        Ok(PumpStatus::Continue)
    }
}

/// Raw recording of child output (`~w`).
///
/// The file receives pre-translation bytes, append-only. Recording is
/// an optional resource: once open, write failures are ignored rather
/// than killing the session.
#[derive(Default)]
pub struct Recorder {
    file: Option<File>,
}

impl Recorder {
    #[must_use]
    pub fn active(&self) -> bool {
        self.file.is_some()
    }

    /// Handle a `~w [PATH]` command, returning the message to show.
    pub fn control(&mut self, path: &[u8]) -> String {
        if self.file.is_some() {
            if path.is_empty() {
                self.file = None;
                return "Recording stopped\r\n".into();
            }
            return "Recording already in progress, use ~w to stop\r\n"
                .into();
        }

        if path.is_empty() {
            return "No recording in progress, use ~? for help\r\n".into();
        }

        let name = String::from_utf8_lossy(path).into_owned();
        let path = Path::new(std::ffi::OsStr::from_bytes(path));
        match File::options().append(true).create(true).open(path) {
            Ok(file) => {
                self.file = Some(file);
                format!("Recording to '{name}'\r\n")
            }
            Err(err) => format!("{name}: {err}\r\n"),
        }
    }

    /// Append raw child output; best-effort.
    pub fn append(&mut self, bytes: &[u8]) {
        if let Some(file) = &mut self.file
            && let Err(err) = file.write_all(bytes)
        {
            tracing::warn!(%err, "recording write failed");
        }
    }

    /// Close the recording if one is open; true when one was.
    pub fn stop(&mut self) -> bool {
        self.file.take().is_some()
    }
}

/// Streaming a local file into the child (`~r`).
#[derive(Default)]
pub struct FileSender {
    file: Option<File>,
}

/// Outcome of one writable-pty send pass.
pub enum SendProgress {
    Sent,
    /// The send ended; an error message may need showing.
    Done(Option<String>),
}

impl FileSender {
    #[must_use]
    pub fn active(&self) -> bool {
        self.file.is_some()
    }

    /// Handle `~r PATH`, returning the message to show.
    pub fn start(&mut self, path: &[u8]) -> String {
        if path.is_empty() {
            return "vtemu: ~r requires a pathname\r\n".into();
        }
        let name = String::from_utf8_lossy(path).into_owned();
        let path = Path::new(std::ffi::OsStr::from_bytes(path));
        match File::open(path) {
            Ok(file) => {
                self.file = Some(file);
                format!("Sending '{name}'\r\n")
            }
            Err(err) => format!("{name}: {err}\r\n"),
        }
    }

    pub fn cancel(&mut self) {
        self.file = None;
    }

    /// Push the next chunk at the child.
    ///
    /// # Errors
    ///
    /// A failed write to the pty is fatal for the session; file read
    /// errors merely end the send.
    pub fn pump(
        &mut self,
        master: BorrowedFd<'_>,
    ) -> io::Result<SendProgress> {
        let Some(file) = &mut self.file else {
            return Ok(SendProgress::Done(None));
        };

        let mut buf = [0u8; 256];
        match io::Read::read(file, &mut buf) {
            Ok(0) => {
                self.file = None;
                Ok(SendProgress::Done(None))
            }
            Ok(n) => {
                write_all(master, &buf[..n])?;
                Ok(SendProgress::Sent)
            }
            Err(err) => {
                self.file = None;
                Ok(SendProgress::Done(Some(format!(
                    "\r\nread: {err}\r\n"
                ))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn recorder_control_dialogue() {
        let dir = std::env::temp_dir().join("vtemu-recorder-test");
        let _ = std::fs::remove_file(&dir);
        let path = dir.as_os_str().as_bytes();

        let mut recorder = Recorder::default();
        assert_eq!(
            recorder.control(b""),
            "No recording in progress, use ~? for help\r\n"
        );

        let msg = recorder.control(path);
        assert!(msg.starts_with("Recording to '"), "{msg}");
        assert!(recorder.active());

        recorder.append(b"raw bytes \x1b=! untranslated");
        assert_eq!(
            recorder.control(path),
            "Recording already in progress, use ~w to stop\r\n"
        );

        assert_eq!(recorder.control(b""), "Recording stopped\r\n");
        assert!(!recorder.active());

        let replay = std::fs::read(&dir).unwrap();
        assert_eq!(replay, b"raw bytes \x1b=! untranslated");
        let _ = std::fs::remove_file(&dir);
    }

    #[test]
    fn recorder_reports_open_failure() {
        let mut recorder = Recorder::default();
        let msg = recorder.control(b"/nonexistent-dir/file");
        assert!(msg.starts_with("/nonexistent-dir/file: "), "{msg}");
        assert!(!recorder.active());
    }

    #[test]
    fn sender_requires_a_path() {
        let mut sender = FileSender::default();
        assert_eq!(
            sender.start(b""),
            "vtemu: ~r requires a pathname\r\n"
        );
        assert!(!sender.active());
    }

    #[test]
    fn sender_reports_open_failure() {
        let mut sender = FileSender::default();
        let msg = sender.start(b"/nonexistent-dir/file");
        assert!(msg.starts_with("/nonexistent-dir/file: "), "{msg}");
        assert!(!sender.active());
    }
}
