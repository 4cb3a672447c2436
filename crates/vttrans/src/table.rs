//! The output parse table.
//!
//! A trie of 128-entry nodes indexed by 7-bit bytes. Each entry carries
//! up to two argument-parsing steps (compiled from the termcap
//! `%`-format markers) and an operation to perform once the sequence
//! resolves. Nodes live in a `Vec` arena addressed by `u16` ids, so a
//! trie position is just an index pair and the whole structure is
//! cache-friendly and clone-free.
//!
//! Conflicts between capabilities (two capabilities claiming the same
//! byte sequence with incompatible argument shapes or replacements) are
//! detected here, at build time, and reported with the name of the
//! earlier claimant.

use std::fmt;

use vtcap::CapName;

/// Entries per node: termcap control sequences use 7-bit bytes only.
pub const NODE_SIZE: usize = 128;

/// Sentinel-free node id. Index 0 is always the root.
pub type NodeId = u16;

/// The root node of every table.
pub const ROOT: NodeId = 0;

/// What a resolved sequence does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Action {
    /// Consume silently.
    Ignore,
    /// Emit the byte verbatim.
    Print,
    /// Emit a constant replacement string.
    Fmt,
    /// Emit the replacement formatted with one integer argument.
    Fmt1,
    /// Emit the replacement formatted with two integer arguments.
    Fmt2,
    /// [`Action::Fmt2`] with the arguments swapped (termcap `%r`).
    Fmt2Rev,
    /// Emit the replacement formatted with the terminal's line count.
    Ll,
    /// [`Action::Fmt`] that tolerates and discards an optional argument.
    Stline,
}

/// How one argument-parsing step consumes input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgState {
    /// Not a real step: blocks the slot once the entry grows a child,
    /// so a later capability cannot attach an argument here.
    Next,
    /// One raw byte carries the argument (`%.` and `%+X`).
    OneChar,
    /// Any number of digits, ended by a non-digit that is *not*
    /// consumed (`%d`).
    Digits,
    /// Exactly three digits (`%3`).
    ThreeDigits,
    /// Exactly two digits (`%2`, or `%3` after one digit).
    TwoDigits,
    /// Exactly one digit.
    OneDigit,
}

impl ArgState {
    /// The state that continues a fixed-width digit run.
    #[must_use]
    pub fn narrowed(self) -> ArgState {
        match self {
            ArgState::ThreeDigits => ArgState::TwoDigits,
            ArgState::TwoDigits => ArgState::OneDigit,
            other => other,
        }
    }
}

/// One compiled argument-parsing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub state: ArgState,
    /// Subtracted from the parsed argument (`%+X` offset, plus one per
    /// preceding `%i`).
    pub inc: i32,
}

/// The operation stored at an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// No action; the byte is swallowed.
    Ignore,
    /// Descend into a child node and continue with the next byte.
    Next(NodeId),
    /// Emit the byte verbatim.
    Print,
    /// Emit a replacement; the action says how to format it.
    Emit(Action, &'static str),
}

/// One of the 128 slots of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    steps: [Option<Step>; 2],
    nsteps: u8,
    /// First capability that claimed this entry, for diagnostics.
    cap: Option<CapName>,
    op: Op,
}

impl Default for Entry {
    fn default() -> Self {
        Entry {
            steps: [None, None],
            nsteps: 0,
            cap: None,
            op: Op::Ignore,
        }
    }
}

impl Entry {
    #[must_use]
    pub fn op(&self) -> Op {
        self.op
    }

    #[must_use]
    pub fn cap(&self) -> Option<CapName> {
        self.cap
    }

    #[must_use]
    pub fn nsteps(&self) -> usize {
        self.nsteps as usize
    }

    /// The compiled step at `idx`, which must be below
    /// [`Entry::nsteps`].
    #[must_use]
    pub fn step(&self, idx: usize) -> Step {
        self.steps[idx].expect("step within nsteps is always compiled")
    }

    /// All occupied step slots, including a trailing blocker.
    #[must_use]
    pub fn raw_steps(&self) -> &[Option<Step>; 2] {
        &self.steps
    }
}

/// Error installing a capability into the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    /// A byte with the high bit set appeared in the value.
    NonAscii,
    /// The value begins with a `%` format, leaving nothing to key on.
    LeadingFormat,
    /// `%` or `%+` at the end of the value.
    TruncatedFormat,
    /// `%d` must be followed by a non-digit.
    DigitsNeedTerminator,
    /// An unknown `%` escape.
    UnsupportedFormat(u8),
    /// `%r` given more than once.
    SwapRepeated,
    /// `%r` on a capability that does not take two arguments.
    SwapNotApplicable,
    /// More `%` formats than the action accepts.
    TooManyArguments,
    /// The value's `%` formats do not match the action's argument count.
    ArgumentCountMismatch { expected: u8, found: u8 },
    /// Another capability already claims this byte sequence.
    Conflict(Option<CapName>),
    /// An action that cannot be installed was requested.
    Internal(&'static str),
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableError::NonAscii => write!(f, "non-ASCII character"),
            TableError::LeadingFormat => {
                write!(f, "first character is an argument")
            }
            TableError::TruncatedFormat => write!(f, "% at end of value"),
            TableError::DigitsNeedTerminator => {
                write!(f, "%d must be followed by non-digit")
            }
            TableError::UnsupportedFormat(b) => {
                write!(f, "unsupported escape %{}", *b as char)
            }
            TableError::SwapRepeated => write!(f, "%r multiple times"),
            TableError::SwapNotApplicable => {
                write!(f, "%r is not relevant here")
            }
            TableError::TooManyArguments => write!(f, "too many arguments"),
            TableError::ArgumentCountMismatch { expected, found } => {
                write!(f, "incorrect # args: expected {expected}, got {found}")
            }
            TableError::Conflict(Some(cap)) => {
                write!(f, "conflict with '{cap}' capability")
            }
            TableError::Conflict(None) => {
                write!(f, "conflict with a built-in binding")
            }
            TableError::Internal(what) => {
                write!(f, "internal error: {what}")
            }
        }
    }
}

impl std::error::Error for TableError {}

/// A node: 128 entries indexed by byte value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    entries: Box<[Entry; NODE_SIZE]>,
}

impl Node {
    fn new() -> Self {
        Node {
            entries: Box::new([Entry::default(); NODE_SIZE]),
        }
    }
}

/// The compiled parse table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTable {
    nodes: Vec<Node>,
}

impl Default for ParseTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ParseTable {
    /// Creates a table containing only an empty root node.
    #[must_use]
    pub fn new() -> Self {
        ParseTable {
            nodes: vec![Node::new()],
        }
    }

    /// Number of nodes in the arena.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The entry for `byte` in `node`.
    ///
    /// # Panics
    ///
    /// Panics if `byte` is not 7-bit or `node` is out of range.
    #[inline]
    #[must_use]
    pub fn entry(&self, node: NodeId, byte: u8) -> &Entry {
        assert!(byte < 0x80, "parse table is keyed on 7-bit bytes");
        &self.nodes[node as usize].entries[byte as usize]
    }

    fn entry_mut(&mut self, node: NodeId, byte: u8) -> &mut Entry {
        assert!(byte < 0x80, "parse table is keyed on 7-bit bytes");
        &mut self.nodes[node as usize].entries[byte as usize]
    }

    fn alloc_node(&mut self) -> NodeId {
        let idx = self.nodes.len();
        assert!(
            idx < usize::from(u16::MAX),
            "parse table node limit exceeded (max 65535 nodes)"
        );
        self.nodes.push(Node::new());
        #[allow(clippy::cast_possible_truncation)] // checked above
        let idx = idx as NodeId;
        idx
    }

    /// Marks the printable range (space..`~`) plus `\n` and `\r` as
    /// pass-through at the root.
    pub fn init_printable(&mut self) {
        for byte in (0x20..0x7f).chain([b'\n', b'\r']) {
            self.entry_mut(ROOT, byte).op = Op::Print;
        }
    }

    /// Binds a single root byte to pass-through on behalf of `cap`.
    pub fn set_print(&mut self, byte: u8, cap: CapName) {
        let entry = self.entry_mut(ROOT, byte);
        entry.op = Op::Print;
        entry.cap = Some(cap);
    }

    /// Silences a single root byte.
    pub fn set_ignore(&mut self, byte: u8) {
        self.entry_mut(ROOT, byte).op = Op::Ignore;
    }

    /// Binds a single root byte to a constant replacement.
    pub fn set_fmt(&mut self, byte: u8, cap: CapName, rep: &'static str) {
        let entry = self.entry_mut(ROOT, byte);
        entry.op = Op::Emit(Action::Fmt, rep);
        entry.cap = Some(cap);
    }

    /// Installs a capability value into the table.
    ///
    /// `value` is the raw (padding-stripped) termcap string; `action`
    /// is the nominal action for the sequence and `rep` the xterm
    /// replacement to emit. `%`-formats in the value compile into
    /// argument steps; literal bytes extend the trie.
    ///
    /// # Errors
    ///
    /// Returns a [`TableError`] describing why the value cannot be
    /// compiled: malformed `%`-formats, argument counts that do not
    /// match `action`, or a conflict with a previously-installed
    /// capability. An empty value installs nothing (capabilities such
    /// as `im`/`ei` are legitimately empty).
    #[allow(clippy::too_many_lines)]
    pub fn install(
        &mut self,
        cap: CapName,
        value: &[u8],
        action: Action,
        rep: &'static str,
    ) -> Result<(), TableError> {
        if value.is_empty() {
            return Ok(());
        }
        tracing::trace!(cap = %cap, value = ?ByteSeq(value), "install");

        let mut action = action;
        let mut rep = Some(rep);
        let nargs: u8 = match action {
            Action::Fmt => {
                if value.len() == 1
                    && rep.is_some_and(|r| r.as_bytes() == value)
                {
                    // Shortcut: a one-byte sequence replaced by itself
                    // is a plain pass-through.
                    action = Action::Print;
                    rep = None;
                }
                0
            }
            Action::Fmt1 => 1,
            Action::Fmt2 => 2,
            Action::Ll => 0,
            Action::Stline => 1, // maximum, not required
            Action::Ignore | Action::Print | Action::Fmt2Rev => {
                debug_assert!(false, "not an installable action");
                return Err(TableError::Internal("action"));
            }
        };

        // `cur` is the entry of the last literal byte consumed;
        // `next_node` the node the following byte indexes into, `None`
        // while `cur` has no child allocated yet.
        let mut cur: Option<(NodeId, u8)> = None;
        let mut next_node: Option<NodeId> = Some(ROOT);
        let mut at_leaf = false; // walked onto an equal terminal entry
        let mut nfound: u8 = 0;
        let mut incr: i32 = 0; // %i applies to all later steps

        let mut bytes = value.iter().copied().peekable();
        while let Some(mut c) = bytes.next() {
            if c == 0o200 {
                // Embedded NUL in a control sequence.
                c = 0;
            }
            if c > 0x7f {
                return Err(TableError::NonAscii);
            }

            // A literal byte (including a quoted "%%")?
            if c != b'%' || bytes.peek() == Some(&b'%') {
                if c == b'%' {
                    bytes.next(); // skip the quoting '%'
                }

                if at_leaf {
                    // The sequence continues past a byte string some
                    // other capability already resolves at.
                    let (n, b) = cur.expect("leaf implies an entry");
                    return Err(TableError::Conflict(self.entry(n, b).cap));
                }

                let node = match next_node {
                    Some(id) => id,
                    None => {
                        let id = self.alloc_node();
                        let (n, b) = cur.expect(
                            "a child is only allocated below an entry",
                        );
                        let entry = self.entry_mut(n, b);
                        entry.cap = Some(cap);
                        entry.op = Op::Next(id);
                        if entry.nsteps < 2 {
                            // Block the next step slot: an entry with a
                            // child cannot also grow another argument.
                            entry.steps[entry.nsteps as usize] =
                                Some(Step { state: ArgState::Next, inc: 0 });
                        }
                        id
                    }
                };

                let entry = self.entry_mut(node, c);
                match entry.op {
                    Op::Next(child) => {
                        next_node = Some(child);
                    }
                    Op::Ignore => {
                        next_node = None;
                    }
                    Op::Print => {
                        if action != Action::Print {
                            return Err(TableError::Conflict(entry.cap));
                        }
                        at_leaf = true;
                        next_node = None;
                    }
                    Op::Emit(have_action, have_rep) => {
                        if have_action != action || Some(have_rep) != rep {
                            return Err(TableError::Conflict(entry.cap));
                        }
                        at_leaf = true;
                        next_node = None;
                    }
                }
                cur = Some((node, c));
                continue;
            }

            // A '%' format: attach a step to the current entry.
            let Some((n, b)) = cur else {
                return Err(TableError::LeadingFormat);
            };
            {
                let entry = self.entry(n, b);
                if at_leaf
                    || entry.nsteps >= 2
                    || entry.steps[entry.nsteps as usize].is_some()
                {
                    return Err(TableError::Conflict(entry.cap));
                }
            }

            let mut step = Step { state: ArgState::OneChar, inc: 0 };
            match bytes.next() {
                None => return Err(TableError::TruncatedFormat),

                Some(b'+') => {
                    let Some(offset) = bytes.next() else {
                        return Err(TableError::TruncatedFormat);
                    };
                    step.inc = i32::from(offset);
                    step.state = ArgState::OneChar;
                }

                Some(b'.') => step.state = ArgState::OneChar,
                Some(b'2') => step.state = ArgState::TwoDigits,
                Some(b'3') => step.state = ArgState::ThreeDigits,

                Some(b'd') => {
                    // The terminating non-digit stays in the stream, so
                    // there must be one, and it cannot itself start an
                    // argument.
                    match bytes.peek() {
                        None => {
                            return Err(TableError::DigitsNeedTerminator);
                        }
                        Some(next) if next.is_ascii_digit() => {
                            return Err(TableError::DigitsNeedTerminator);
                        }
                        Some(&b'%') => {
                            let mut ahead = bytes.clone();
                            ahead.next();
                            if ahead.peek() != Some(&b'%') {
                                return Err(
                                    TableError::DigitsNeedTerminator,
                                );
                            }
                        }
                        Some(_) => {}
                    }
                    step.state = ArgState::Digits;
                }

                Some(b'i') => {
                    incr = 1;
                    continue;
                }

                Some(b'r') => {
                    if action == Action::Fmt2Rev {
                        return Err(TableError::SwapRepeated);
                    }
                    if action != Action::Fmt2 {
                        return Err(TableError::SwapNotApplicable);
                    }
                    action = Action::Fmt2Rev;
                    continue;
                }

                Some(other) => {
                    return Err(TableError::UnsupportedFormat(other));
                }
            }

            nfound += 1;
            if nfound > nargs {
                return Err(TableError::TooManyArguments);
            }
            step.inc += incr;
            let entry = self.entry_mut(n, b);
            entry.steps[entry.nsteps as usize] = Some(step);
            entry.nsteps += 1;
        }

        if action != Action::Stline && nfound != nargs {
            return Err(TableError::ArgumentCountMismatch {
                expected: nargs,
                found: nfound,
            });
        }

        // Install the final operation.
        let (n, b) = cur.expect("non-empty value always consumes a byte");
        let entry = self.entry_mut(n, b);
        match entry.op {
            Op::Next(_) => {
                // Some longer capability runs through this entry; the
                // sequences are ambiguous.
                return Err(TableError::Conflict(entry.cap));
            }
            Op::Print | Op::Emit(..) if at_leaf => {
                // Identical re-install; keep the earlier claimant.
            }
            _ => {
                entry.op = match (action, rep) {
                    (Action::Print, None) => Op::Print,
                    (action, Some(rep)) => Op::Emit(action, rep),
                    (_, None) => unreachable!("only Print drops the rep"),
                };
            }
        }
        if entry.cap.is_none() {
            entry.cap = Some(cap);
        }
        Ok(())
    }
}

/// Byte-string debug rendering with octal escapes, used in trace logs
/// and the table dump.
pub(crate) struct ByteSeq<'a>(pub &'a [u8]);

impl fmt::Debug for ByteSeq<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"")?;
        for &b in self.0 {
            if b == b'\\' {
                write!(f, "\\\\")?;
            } else if (0x20..0x7f).contains(&b) {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\{b:03o}")?;
            }
        }
        write!(f, "\"")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cap(name: &str) -> CapName {
        CapName::new(name.as_bytes().try_into().unwrap())
    }

    fn walk<'t>(table: &'t ParseTable, seq: &[u8]) -> &'t Entry {
        let mut node = ROOT;
        let mut entry = table.entry(node, seq[0]);
        for &b in &seq[1..] {
            let Op::Next(child) = entry.op() else {
                panic!("expected Next at {entry:?}");
            };
            node = child;
            entry = table.entry(node, b);
        }
        entry
    }

    #[test]
    fn empty_value_is_noop() {
        let mut table = ParseTable::new();
        table
            .install(cap("im"), b"", Action::Fmt, "\x1b[4h")
            .unwrap();
        assert_eq!(table.node_count(), 1);
    }

    #[test]
    fn single_byte_identity_becomes_print() {
        let mut table = ParseTable::new();
        table.install(cap("cr"), b"\r", Action::Fmt, "\r").unwrap();
        let entry = table.entry(ROOT, b'\r');
        assert_eq!(entry.op(), Op::Print);
        assert_eq!(entry.cap(), Some(cap("cr")));
    }

    #[test]
    fn constant_sequence() {
        let mut table = ParseTable::new();
        table
            .install(cap("cl"), b"\x1b*", Action::Fmt, "\x1b[H\x1b[2J")
            .unwrap();
        let entry = walk(&table, b"\x1b*");
        assert_eq!(entry.op(), Op::Emit(Action::Fmt, "\x1b[H\x1b[2J"));
        assert_eq!(entry.cap(), Some(cap("cl")));
    }

    #[test]
    fn one_char_args_with_offset() {
        // adm3a-style cursor motion: ESC = then row+' ', col+' '.
        let mut table = ParseTable::new();
        table
            .install(
                cap("cm"),
                b"\x1b=%+ %+ ",
                Action::Fmt2,
                "\x1b[%d;%dH",
            )
            .unwrap();
        let entry = walk(&table, b"\x1b=");
        assert_eq!(entry.nsteps(), 2);
        assert_eq!(
            entry.step(0),
            Step { state: ArgState::OneChar, inc: i32::from(b' ') }
        );
        assert_eq!(
            entry.step(1),
            Step { state: ArgState::OneChar, inc: i32::from(b' ') }
        );
        assert_eq!(entry.op(), Op::Emit(Action::Fmt2, "\x1b[%d;%dH"));
    }

    #[test]
    fn increment_applies_to_following_steps() {
        // vt52-style with %i: both arguments arrive one-based.
        let mut table = ParseTable::new();
        table
            .install(
                cap("cm"),
                b"\x1b=%i%+ %+ ",
                Action::Fmt2,
                "\x1b[%d;%dH",
            )
            .unwrap();
        let entry = walk(&table, b"\x1b=");
        assert_eq!(entry.step(0).inc, i32::from(b' ') + 1);
        assert_eq!(entry.step(1).inc, i32::from(b' ') + 1);
    }

    #[test]
    fn digits_steps_share_child_with_literal_suffix() {
        let mut table = ParseTable::new();
        table
            .install(
                cap("cm"),
                b"\x1b[%d;%dH",
                Action::Fmt2,
                "\x1b[%d;%dH",
            )
            .unwrap();
        let open = walk(&table, b"\x1b[");
        assert_eq!(open.nsteps(), 1);
        assert_eq!(open.step(0).state, ArgState::Digits);
        // The '%d' terminator dispatches into the child node where ';'
        // lives; its own entry holds the second step.
        let Op::Next(child) = open.op() else {
            panic!("digits entry must descend")
        };
        let semi = table.entry(child, b';');
        assert_eq!(semi.nsteps(), 1);
        assert_eq!(semi.step(0).state, ArgState::Digits);
    }

    #[test]
    fn swap_becomes_reversed_action() {
        let mut table = ParseTable::new();
        table
            .install(
                cap("cm"),
                b"\x1b=%r%+ %+ ",
                Action::Fmt2,
                "\x1b[%d;%dH",
            )
            .unwrap();
        let entry = walk(&table, b"\x1b=");
        assert_eq!(entry.op(), Op::Emit(Action::Fmt2Rev, "\x1b[%d;%dH"));
    }

    #[test]
    fn swap_on_non_fmt2_rejected() {
        let mut table = ParseTable::new();
        assert_eq!(
            table.install(cap("ce"), b"\x1bK%r", Action::Fmt, "\x1b[K"),
            Err(TableError::SwapNotApplicable)
        );
    }

    #[test]
    fn quoted_percent_is_literal() {
        let mut table = ParseTable::new();
        table
            .install(cap("ce"), b"\x1b%%K", Action::Fmt, "\x1b[K")
            .unwrap();
        let entry = walk(&table, b"\x1b%K");
        assert_eq!(entry.op(), Op::Emit(Action::Fmt, "\x1b[K"));
    }

    #[test]
    fn embedded_nul_encoding() {
        let mut table = ParseTable::new();
        table
            .install(cap("ho"), b"\x1b\x80H", Action::Fmt, "\x1b[H")
            .unwrap();
        let entry = walk(&table, b"\x1b\x00H");
        assert_eq!(entry.op(), Op::Emit(Action::Fmt, "\x1b[H"));
    }

    #[test]
    fn high_bit_rejected() {
        let mut table = ParseTable::new();
        assert_eq!(
            table.install(cap("cl"), b"\x1b\xffZ", Action::Fmt, "x"),
            Err(TableError::NonAscii)
        );
    }

    #[test]
    fn leading_format_rejected() {
        let mut table = ParseTable::new();
        assert_eq!(
            table.install(cap("cm"), b"%d;%dH", Action::Fmt2, "x"),
            Err(TableError::LeadingFormat)
        );
    }

    #[test]
    fn truncated_formats_rejected() {
        let mut table = ParseTable::new();
        assert_eq!(
            table.install(cap("cm"), b"\x1b%", Action::Fmt2, "x"),
            Err(TableError::TruncatedFormat)
        );
        assert_eq!(
            table.install(cap("cm"), b"\x1b%+", Action::Fmt2, "x"),
            Err(TableError::TruncatedFormat)
        );
    }

    #[test]
    fn digits_need_a_terminator() {
        let mut table = ParseTable::new();
        assert_eq!(
            table.install(cap("cm"), b"\x1b[%d", Action::Fmt2, "x"),
            Err(TableError::DigitsNeedTerminator)
        );
        assert_eq!(
            table.install(cap("cm"), b"\x1b[%d5H", Action::Fmt2, "x"),
            Err(TableError::DigitsNeedTerminator)
        );
        assert_eq!(
            table.install(cap("cm"), b"\x1b[%d%.H", Action::Fmt2, "x"),
            Err(TableError::DigitsNeedTerminator)
        );
    }

    #[test]
    fn argument_count_checked_both_ways() {
        let mut table = ParseTable::new();
        assert_eq!(
            table.install(cap("cm"), b"\x1b=%+ ", Action::Fmt2, "x"),
            Err(TableError::ArgumentCountMismatch {
                expected: 2,
                found: 1
            })
        );
        assert_eq!(
            table.install(
                cap("ce"),
                b"\x1bK%.",
                Action::Fmt,
                "\x1b[K"
            ),
            Err(TableError::TooManyArguments)
        );
    }

    #[test]
    fn stline_argument_is_optional() {
        let mut table = ParseTable::new();
        table
            .install(cap("ts"), b"\x1bf", Action::Stline, "\x1b]0;")
            .unwrap();
        let mut other = ParseTable::new();
        other
            .install(cap("ts"), b"\x1bf%d\x1e", Action::Stline, "\x1b]0;")
            .unwrap();
    }

    #[test]
    fn conflicting_replacement_reports_claimant() {
        let mut table = ParseTable::new();
        table
            .install(cap("ce"), b"\x1bK", Action::Fmt, "\x1b[K")
            .unwrap();
        assert_eq!(
            table.install(cap("cd"), b"\x1bK", Action::Fmt, "\x1b[J"),
            Err(TableError::Conflict(Some(cap("ce"))))
        );
    }

    #[test]
    fn reinstalling_identical_capability_is_fine() {
        let mut table = ParseTable::new();
        table
            .install(cap("ce"), b"\x1bK", Action::Fmt, "\x1b[K")
            .unwrap();
        table
            .install(cap("kE"), b"\x1bK", Action::Fmt, "\x1b[K")
            .unwrap();
        assert_eq!(walk(&table, b"\x1bK").cap(), Some(cap("ce")));
    }

    #[test]
    fn extension_past_a_leaf_conflicts() {
        let mut table = ParseTable::new();
        table
            .install(cap("ce"), b"\x1bK", Action::Fmt, "\x1b[K")
            .unwrap();
        assert_eq!(
            table.install(cap("cd"), b"\x1bKJ", Action::Fmt, "\x1b[K"),
            Err(TableError::Conflict(Some(cap("ce"))))
        );
    }

    #[test]
    fn prefix_of_installed_sequence_conflicts() {
        let mut table = ParseTable::new();
        table
            .install(cap("cd"), b"\x1bKJ", Action::Fmt, "\x1b[J")
            .unwrap();
        assert_eq!(
            table.install(cap("ce"), b"\x1bK", Action::Fmt, "\x1b[K"),
            Err(TableError::Conflict(Some(cap("cd"))))
        );
    }

    #[test]
    fn third_argument_step_conflicts() {
        let mut table = ParseTable::new();
        assert_eq!(
            table.install(
                cap("cm"),
                b"\x1b=%+ %+ %+ ",
                Action::Fmt2,
                "x"
            ),
            Err(TableError::Conflict(Some(cap("cm"))))
        );
    }

    #[test]
    fn step_slot_blocked_once_entry_has_child() {
        let mut table = ParseTable::new();
        // "cm" leaves '=' with one step and a child for the ';'.
        table
            .install(cap("cm"), b"\x1b=%d;X", Action::Fmt1, "\x1b[%dH")
            .unwrap();
        // A second capability trying to hang another argument off the
        // same '=' entry must be refused.
        assert_eq!(
            table.install(cap("cv"), b"\x1b=%.", Action::Fmt1, "\x1b[%dH"),
            Err(TableError::Conflict(Some(cap("cm"))))
        );
    }

    #[test]
    fn print_init_does_not_conflict_with_print_caps() {
        let mut table = ParseTable::new();
        table.init_printable();
        table.set_print(b'\x08', cap("bs"));
        // bc=^H normalizes to Print and lands on the same entry.
        table
            .install(cap("bc"), b"\x08", Action::Fmt, "\x08")
            .unwrap();
        assert_eq!(table.entry(ROOT, 0x08).cap(), Some(cap("bs")));
    }
}
