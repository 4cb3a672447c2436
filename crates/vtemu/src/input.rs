//! User-input line discipline.
//!
//! Splits the byte stream from the user's keyboard into three paths:
//! plain pass-through to the child, xterm arrow-key sequences remapped
//! to the emulated terminal's arrow bindings, and the `~` escape
//! surface recognized at the start of a line. Commands that take an
//! argument (`~r`, `~w`) collect the rest of the line locally with
//! minimal editing; everything else fires on its command character.
//!
//! The discipline is a push state machine: feed it bytes, it appends
//! bytes for the child and echo bytes for the user, and occasionally
//! yields a [`Command`]. State persists across feeds, so escape
//! sequences and command lines may straddle read boundaries.

use smallvec::SmallVec;

/// Upper bound on a collected command line.
const CMD_MAX: usize = 512;

const CTRL_U: u8 = 0x15;
const CTRL_X: u8 = 0x18;
const CTRL_Z: u8 = 0x1a;
const ESC: u8 = 0x1b;
const DEL: u8 = 0x7f;
const BEL: u8 = 0x07;

/// An escape command recognized by the discipline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `~?` / `~h`
    Help,
    /// `~.` / `~q`
    Quit,
    /// `~^Z`
    Suspend,
    /// `~r PATH` — stream a file to the child.
    SendFile(Vec<u8>),
    /// `~w [PATH]` — start or stop raw recording.
    Record(Vec<u8>),
    /// Anything else after the escape character.
    Unrecognized(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgKind {
    Send,
    Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    /// Just saw a newline; a `~` here opens the escape surface.
    Newline,
    /// Saw ESC in a remappable position.
    Esc { after_newline: bool },
    /// Saw ESC plus `[` or `O`.
    EscSeq { intro: u8, after_newline: bool },
    /// Saw the escape character; the next byte picks the command.
    Tilde,
    /// Collecting the argument line of `~r` / `~w`.
    Collect { kind: ArgKind },
}

pub struct LineDiscipline {
    state: State,
    /// Arrow bindings (up/down/right/left) to substitute for xterm
    /// arrow sequences; `None` disables remapping.
    arrows: Option<[Vec<u8>; 4]>,
    cmd: SmallVec<[u8; CMD_MAX]>,
}

impl LineDiscipline {
    #[must_use]
    pub fn new(arrows: Option<[Vec<u8>; 4]>) -> Self {
        LineDiscipline {
            // A session opens at a fresh line.
            state: State::Newline,
            arrows,
            cmd: SmallVec::new(),
        }
    }

    /// Feed one byte. Bytes destined for the child accumulate in
    /// `to_child`, local echo in `echo`; a completed escape command is
    /// returned for the caller to dispatch (after flushing both
    /// buffers).
    pub fn feed(
        &mut self,
        byte: u8,
        to_child: &mut Vec<u8>,
        echo: &mut Vec<u8>,
    ) -> Option<Command> {
        match self.state {
            State::Normal | State::Newline => {
                let after_newline = self.state == State::Newline;
                if byte == ESC && self.arrows.is_some() {
                    self.state = State::Esc { after_newline };
                    return None;
                }
                if after_newline && byte == b'~' {
                    self.state = State::Tilde;
                    echo.push(b'~');
                    return None;
                }
                to_child.push(byte);
                self.state = if byte == b'\r' || byte == b'\n' {
                    State::Newline
                } else {
                    State::Normal
                };
                None
            }

            State::Esc { after_newline } => {
                if byte == b'[' || byte == b'O' {
                    self.state = State::EscSeq { intro: byte, after_newline };
                    return None;
                }
                // Not an arrow sequence after all.
                to_child.push(ESC);
                self.state = if after_newline {
                    State::Newline
                } else {
                    State::Normal
                };
                self.feed(byte, to_child, echo)
            }

            State::EscSeq { intro, after_newline } => {
                if let (b'A'..=b'D', Some(arrows)) = (byte, &self.arrows) {
                    let binding = &arrows[usize::from(byte - b'A')];
                    to_child.extend_from_slice(binding);
                    self.state = State::Normal;
                    return None;
                }
                to_child.push(ESC);
                to_child.push(intro);
                self.state = if after_newline {
                    State::Newline
                } else {
                    State::Normal
                };
                self.feed(byte, to_child, echo)
            }

            State::Tilde => {
                self.state = State::Normal;
                match byte {
                    b'~' => {
                        // Send a literal tilde; the one echo already
                        // happened when the escape opened.
                        to_child.push(b'~');
                        None
                    }
                    b'?' | b'h' => {
                        echo.extend_from_slice(b"\r\n");
                        Some(Command::Help)
                    }
                    b'.' | b'q' => {
                        echo.extend_from_slice(b"\r\n");
                        Some(Command::Quit)
                    }
                    CTRL_Z => {
                        echo.extend_from_slice(b"\r\n");
                        Some(Command::Suspend)
                    }
                    b'r' => {
                        echo.push(byte);
                        self.state = State::Collect { kind: ArgKind::Send };
                        None
                    }
                    b'w' => {
                        echo.push(byte);
                        self.state =
                            State::Collect { kind: ArgKind::Record };
                        None
                    }
                    other => {
                        echo.extend_from_slice(b"\r\n");
                        Some(Command::Unrecognized(other))
                    }
                }
            }

            State::Collect { kind } => self.collect(kind, byte, echo),
        }
    }

    fn collect(
        &mut self,
        kind: ArgKind,
        byte: u8,
        echo: &mut Vec<u8>,
    ) -> Option<Command> {
        match byte {
            CTRL_U | CTRL_X => {
                while let Some(prev) = self.cmd.pop() {
                    rub_out(prev, echo);
                }
                None
            }
            0x08 | DEL => {
                if let Some(prev) = self.cmd.pop() {
                    rub_out(prev, echo);
                }
                None
            }
            b'\r' | b'\n' => {
                echo.extend_from_slice(b"\r\n");
                self.state = State::Newline;
                let mut arg: &[u8] = &self.cmd;
                // One optional space between the command and its
                // argument.
                if arg.first() == Some(&b' ') {
                    arg = &arg[1..];
                }
                let arg = arg.to_vec();
                self.cmd.clear();
                Some(match kind {
                    ArgKind::Send => Command::SendFile(arg),
                    ArgKind::Record => Command::Record(arg),
                })
            }
            c if c < 0x20 => {
                if self.cmd.len() >= CMD_MAX {
                    echo.push(BEL);
                } else {
                    echo.push(b'^');
                    echo.push(c + 0x40);
                    self.cmd.push(c);
                }
                None
            }
            c => {
                if self.cmd.len() >= CMD_MAX {
                    echo.push(BEL);
                } else {
                    echo.push(c);
                    self.cmd.push(c);
                }
                None
            }
        }
    }
}

/// Echo the erasure of one collected byte. Control bytes were shown as
/// `^X`, two cells wide.
fn rub_out(byte: u8, echo: &mut Vec<u8>) {
    echo.extend_from_slice(b"\x08 \x08");
    if byte < 0x20 {
        echo.extend_from_slice(b"\x08 \x08");
    }
}
