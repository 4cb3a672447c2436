//! Translation of legacy terminal control sequences into xterm/ANSI.
//!
//! A termcap entry describes the control language a legacy terminal
//! *emits*. This crate compiles such an entry into a byte-keyed parse
//! table (a trie of 128-entry nodes with per-entry argument-parsing
//! steps) and drives that table one byte at a time to produce the
//! equivalent xterm/ANSI/DEC sequences.
//!
//! - [`table`] — the parse table and its builder, including conflict
//!   detection between capabilities.
//! - [`translate`] — the per-byte runtime cursor.
//! - [`profile`] — terminal-type validation and loading: binds the
//!   standard capabilities of a termcap entry into a parse table.
//! - [`dump`] — human-readable rendering of a parse table for
//!   diagnostics.

#![warn(clippy::pedantic)]

pub mod dump;
pub mod profile;
pub mod table;
pub mod translate;

pub use profile::{SetupError, TermProfile};
pub use table::{Action, ParseTable, TableError};
pub use translate::{TranslateError, Translator};
