//! The per-byte translation engine.
//!
//! A [`Translator`] walks the parse table one child-output byte at a
//! time, collecting arguments as directed by the entry steps, and
//! appends the xterm/ANSI replacement bytes to a caller-supplied
//! buffer. All state needed to resume mid-sequence is kept in the
//! cursor, so control sequences that straddle a read boundary resolve
//! exactly as if they had arrived in one piece.
//!
//! The translator performs no I/O and no pacing; the caller owns the
//! output descriptor, the output-rate throttle, and any raw recording.

use std::fmt;

use crate::dump;
use crate::table::{Action, ArgState, Entry, NodeId, Op, ParseTable, ROOT};

/// Error from the translation engine.
///
/// These indicate parse-table states the builder is supposed to make
/// unreachable; hitting one is a bug, reported after dumping the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslateError(&'static str);

impl fmt::Display for TranslateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "internal error: {}", self.0)
    }
}

impl std::error::Error for TranslateError {}

/// Geometry and quirks the translator needs from the loaded terminal.
#[derive(Debug, Clone, Copy)]
pub struct Screen {
    pub lines: i32,
    pub cols: i32,
    /// Hazeltine position encoding: reduce row mod 32 and column mod
    /// 96 before clamping.
    pub hazeltine: bool,
}

/// The runtime cursor over a parse table.
pub struct Translator<'t> {
    table: &'t ParseTable,
    screen: Screen,

    node: NodeId,
    at: Option<(NodeId, u8)>,
    step: usize,
    state: ArgState,
    args: [i32; 2],
    nargs: usize,
}

impl<'t> Translator<'t> {
    #[must_use]
    pub fn new(table: &'t ParseTable, screen: Screen) -> Self {
        Translator {
            table,
            screen,
            node: ROOT,
            at: None,
            step: 0,
            state: ArgState::Next,
            args: [0; 2],
            nargs: 0,
        }
    }

    /// True when the cursor sits mid-sequence, waiting for more bytes.
    #[must_use]
    pub fn pending(&self) -> bool {
        self.at.is_some() || self.node != ROOT
    }

    fn reset(&mut self) {
        self.node = ROOT;
        self.at = None;
        self.step = 0;
        self.args = [0; 2];
        self.nargs = 0;
    }

    fn internal(&mut self, what: &'static str) -> TranslateError {
        // The table is dumped for post-mortem inspection; these states
        // mean the builder let an invalid combination through.
        eprintln!("\r\ninternal error: {what}\r");
        eprint!("{}", dump::render(self.table));
        debug_assert!(false, "internal error: {what}");
        self.reset();
        TranslateError(what)
    }

    /// Feed one child-output byte, appending any translated output to
    /// `out`.
    ///
    /// # Errors
    ///
    /// Returns a [`TranslateError`] only for parse-table states the
    /// builder should have made impossible.
    pub fn feed(
        &mut self,
        byte: u8,
        out: &mut Vec<u8>,
    ) -> Result<(), TranslateError> {
        let c = byte & 0x7f; // strip legacy parity

        loop {
            if self.at.is_none() {
                self.at = Some((self.node, c));
                self.step = 0;
                let entry = self.table.entry(self.node, c);
                if entry.nsteps() > 0 {
                    // Arguments begin with the *next* byte.
                    self.state = entry.step(0).state;
                    return Ok(());
                }
                // No steps; fall through to the action for this byte.
            }

            let (node, entry_byte) = self.at.expect("entry set above");
            let entry = *self.table.entry(node, entry_byte);

            if self.step < entry.nsteps() {
                match self.run_step(&entry, c)? {
                    StepOutcome::NeedMore => return Ok(()),
                    StepOutcome::Redispatch(child) => {
                        self.node = child;
                        self.at = None;
                        continue; // same byte, child table
                    }
                    StepOutcome::Done => {}
                }
            }

            match entry.op() {
                Op::Ignore => {}
                Op::Print => out.push(c),
                Op::Next(child) => {
                    self.node = child;
                    self.at = None;
                    return Ok(()); // next byte dispatches in the child
                }
                Op::Emit(action, rep) => {
                    tracing::trace!(cap = ?entry.cap(), ?action, "emit");
                    self.emit(action, rep, out)?;
                }
            }

            self.reset();
            return Ok(());
        }
    }

    /// Feed a whole buffer; convenience for tests and passthrough-free
    /// callers that do not pace output.
    ///
    /// # Errors
    ///
    /// Propagates the first [`TranslateError`].
    pub fn feed_slice(
        &mut self,
        bytes: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<(), TranslateError> {
        for &b in bytes {
            self.feed(b, out)?;
        }
        Ok(())
    }

    fn run_step(
        &mut self,
        entry: &Entry,
        c: u8,
    ) -> Result<StepOutcome, TranslateError> {
        if self.nargs >= 2 {
            return Err(self.internal("params"));
        }
        let digit = c.is_ascii_digit().then(|| i32::from(c - b'0'));

        match self.state {
            ArgState::Next => {
                return Err(self.internal("state"));
            }
            ArgState::Digits => {
                if let Some(v) = digit {
                    self.args[self.nargs] = self.args[self.nargs] * 10 + v;
                    return Ok(StepOutcome::NeedMore);
                }
                // The non-digit ends the step and is *not* part of the
                // argument; it re-dispatches below.
            }
            ArgState::OneChar => {
                self.args[self.nargs] = i32::from(c);
            }
            ArgState::ThreeDigits | ArgState::TwoDigits => {
                self.args[self.nargs] =
                    self.args[self.nargs] * 10 + digit.unwrap_or(0);
                self.state = self.state.narrowed();
                return Ok(StepOutcome::NeedMore);
            }
            ArgState::OneDigit => {
                self.args[self.nargs] =
                    self.args[self.nargs] * 10 + digit.unwrap_or(0);
            }
        }

        // Step complete: apply the increment and bank the argument.
        let inc = entry.step(self.step).inc;
        self.args[self.nargs] = (self.args[self.nargs] - inc).max(0);
        self.nargs += 1;

        self.step += 1;
        if self.step < entry.nsteps() {
            self.state = entry.step(self.step).state;
            return Ok(StepOutcome::NeedMore);
        }

        if self.state == ArgState::Digits {
            // The byte that ended a %d cannot be un-read: proceed
            // immediately to the child table for that byte.
            match entry.op() {
                Op::Next(child) => Ok(StepOutcome::Redispatch(child)),
                _ => Err(self.internal("%d")),
            }
        } else {
            Ok(StepOutcome::Done)
        }
    }

    fn emit(
        &mut self,
        action: Action,
        rep: &'static str,
        out: &mut Vec<u8>,
    ) -> Result<(), TranslateError> {
        match action {
            Action::Fmt | Action::Stline => {
                out.extend_from_slice(rep.as_bytes());
            }
            Action::Fmt1 => {
                if self.nargs != 1 {
                    return Err(self.internal("fmt1"));
                }
                format_into(out, rep, &[self.args[0]]);
            }
            Action::Fmt2 | Action::Fmt2Rev => {
                if self.nargs != 2 {
                    return Err(self.internal("fmt2"));
                }
                let mut row = self.args[0];
                let mut col = self.args[1];
                if action == Action::Fmt2Rev {
                    std::mem::swap(&mut row, &mut col);
                }
                // Hazeltine encodes positions with a printable offset
                // that wraps; undo the wrap before clamping.
                if self.screen.hazeltine {
                    row %= 32;
                    col %= 96;
                }
                row = row.min(self.screen.lines - 1);
                col = col.min(self.screen.cols - 1);
                // termcap positions are 0-based, ANSI is 1-based.
                format_into(out, rep, &[row + 1, col + 1]);
            }
            Action::Ll => {
                format_into(out, rep, &[self.screen.lines]);
            }
            Action::Ignore | Action::Print => {
                return Err(self.internal("action"));
            }
        }
        Ok(())
    }
}

enum StepOutcome {
    NeedMore,
    Redispatch(NodeId),
    Done,
}

/// Substitute successive `%d` markers in a replacement template.
///
/// Templates are compile-time constants; `%%` emits a literal percent
/// sign and anything else is copied through.
fn format_into(out: &mut Vec<u8>, template: &str, args: &[i32]) {
    let mut args = args.iter();
    let mut bytes = template.bytes().peekable();
    while let Some(b) = bytes.next() {
        if b != b'%' {
            out.push(b);
            continue;
        }
        match bytes.next() {
            Some(b'd') => {
                let v = args.next().copied().unwrap_or(0);
                out.extend_from_slice(v.to_string().as_bytes());
            }
            Some(b'%') => out.push(b'%'),
            Some(other) => {
                out.push(b'%');
                out.push(other);
            }
            None => out.push(b'%'),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ParseTable;
    use pretty_assertions::assert_eq;
    use vtcap::CapName;

    fn cap(name: &str) -> CapName {
        CapName::new(name.as_bytes().try_into().unwrap())
    }

    fn screen() -> Screen {
        Screen { lines: 24, cols: 80, hazeltine: false }
    }

    fn run(table: &ParseTable, screen: Screen, input: &[u8]) -> Vec<u8> {
        let mut tr = Translator::new(table, screen);
        let mut out = Vec::new();
        tr.feed_slice(input, &mut out).unwrap();
        out
    }

    fn printable_table() -> ParseTable {
        let mut table = ParseTable::new();
        table.init_printable();
        table
    }

    #[test]
    fn printables_pass_through() {
        let table = printable_table();
        let out = run(&table, screen(), b"hello, world\r\n");
        assert_eq!(out, b"hello, world\r\n");
    }

    #[test]
    fn unbound_controls_are_swallowed() {
        let table = printable_table();
        let out = run(&table, screen(), b"a\x05b\x1bc");
        assert_eq!(out, b"abc");
    }

    #[test]
    fn parity_bit_is_stripped() {
        let table = printable_table();
        let out = run(&table, screen(), &[b'h' | 0x80, b'i']);
        assert_eq!(out, b"hi");
    }

    #[test]
    fn one_char_positioning() {
        // Terminal with cm=\e=%+ %+ , co#80, li#24: feeding \e=!"
        // addresses row 1, column 2 (0-based) and must produce the
        // 1-based ANSI motion.
        let mut table = printable_table();
        table
            .install(cap("cm"), b"\x1b=%+ %+ ", Action::Fmt2, "\x1b[%d;%dH")
            .unwrap();
        let out = run(&table, screen(), b"\x1b=!\"");
        assert_eq!(out, b"\x1b[2;3H");
    }

    #[test]
    fn hazeltine_positions_wrap() {
        let mut table = printable_table();
        table
            .install(cap("cm"), b"\x1b=%+ %+ ", Action::Fmt2, "\x1b[%d;%dH")
            .unwrap();
        let hz = Screen { lines: 24, cols: 80, hazeltine: true };
        assert_eq!(run(&table, hz, b"\x1b=\x20\x21"), b"\x1b[1;2H");
        // Wrapped encoding of the same row: 0x40 - 0x20 is 32, and
        // 32 % 32 is row 0 again; the column lands at 33.
        assert_eq!(run(&table, hz, b"\x1b=\x40\x41"), b"\x1b[1;34H");
    }

    #[test]
    fn positions_clamped_to_screen() {
        let mut table = printable_table();
        table
            .install(cap("cm"), b"\x1b=%.%.", Action::Fmt2, "\x1b[%d;%dH")
            .unwrap();
        let out = run(&table, screen(), &[0x1b, b'=', 0x7e, 0x7e]);
        assert_eq!(out, b"\x1b[24;80H");
    }

    #[test]
    fn reversed_arguments_swap() {
        let mut table = printable_table();
        table
            .install(
                cap("cm"),
                b"\x1b=%r%+ %+ ",
                Action::Fmt2,
                "\x1b[%d;%dH",
            )
            .unwrap();
        // Wire order is col, row; output must still be row;col.
        let out = run(&table, screen(), b"\x1b=\"!");
        assert_eq!(out, b"\x1b[2;3H");
    }

    #[test]
    fn decimal_arguments_redispatch_terminator() {
        let mut table = printable_table();
        table
            .install(cap("cm"), b"\x1b[%d;%dH", Action::Fmt2, "\x1b[%d;%dH")
            .unwrap();
        let out = run(&table, screen(), b"\x1b[3;7H");
        assert_eq!(out, b"\x1b[4;8H");
        // Empty decimal arguments parse as zero.
        let out = run(&table, screen(), b"\x1b[;H");
        assert_eq!(out, b"\x1b[1;1H");
    }

    #[test]
    fn sequences_straddle_read_boundaries() {
        let mut table = printable_table();
        table
            .install(cap("cm"), b"\x1b[%d;%dH", Action::Fmt2, "\x1b[%d;%dH")
            .unwrap();
        let mut tr = Translator::new(&table, screen());
        let mut out = Vec::new();
        tr.feed_slice(b"ab\x1b[1", &mut out).unwrap();
        assert_eq!(out, b"ab");
        assert!(tr.pending());
        tr.feed_slice(b"2;4", &mut out).unwrap();
        tr.feed_slice(b"0Hcd", &mut out).unwrap();
        assert_eq!(out, b"ab\x1b[13;41Hcd");
        assert!(!tr.pending());
    }

    #[test]
    fn fixed_width_digits() {
        let mut table = printable_table();
        table
            .install(cap("cm"), b"\x1bP%2%3.", Action::Fmt2, "\x1b[%d;%dH")
            .unwrap();
        let out = run(&table, screen(), b"\x1bP12003.");
        assert_eq!(out, b"\x1b[13;4H");
        // Non-digits inside a fixed run count as zero.
        let out = run(&table, screen(), b"\x1bPx20x3.");
        assert_eq!(out, b"\x1b[3;4H");
    }

    #[test]
    fn increment_subtracts_before_reformat() {
        let mut table = printable_table();
        table
            .install(
                cap("cm"),
                b"\x1b=%i%d;%dH",
                Action::Fmt2,
                "\x1b[%d;%dH",
            )
            .unwrap();
        // One-based on the wire; re-emitted one-based after the
        // internal zero-base round trip.
        let out = run(&table, screen(), b"\x1b=5;9H");
        assert_eq!(out, b"\x1b[5;9H");
    }

    #[test]
    fn argument_underflow_floors_at_zero() {
        let mut table = printable_table();
        table
            .install(cap("cm"), b"\x1b=%+ %+ ", Action::Fmt2, "\x1b[%d;%dH")
            .unwrap();
        // Bytes below the offset would go negative; they clamp to 0.
        let out = run(&table, screen(), b"\x1b=\x01\x01");
        assert_eq!(out, b"\x1b[1;1H");
    }

    #[test]
    fn line_count_formatting() {
        let mut table = printable_table();
        table
            .install(cap("ll"), b"\x1bL", Action::Ll, "\x1b[%dH")
            .unwrap();
        let out = run(&table, screen(), b"\x1bL");
        assert_eq!(out, b"\x1b[24H");
    }

    #[test]
    fn status_line_discards_argument() {
        let mut table = printable_table();
        table
            .install(cap("ts"), b"\x1bf%d\x1e", Action::Stline, "\x1b]0;")
            .unwrap();
        let out = run(&table, screen(), b"\x1bf42\x1e");
        assert_eq!(out, b"\x1b]0;");
    }

    #[test]
    fn format_template_substitution() {
        let mut out = Vec::new();
        format_into(&mut out, "\x1b[%d;%dH", &[5, 7]);
        assert_eq!(out, b"\x1b[5;7H");
        out.clear();
        format_into(&mut out, "100%% at %d", &[3]);
        assert_eq!(out, b"100% at 3");
    }
}
