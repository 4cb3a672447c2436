//! Emit shell commands exporting `TERM` and `TERMCAP` for a terminal
//! type, so programs on the far side of a login or chroot see the
//! emulated terminal's entry without a termcap database of their own.
//!
//! Designed to be run as ``eval `vtset <term>` ``. The entry is
//! re-quoted for the detected shell (csh dialects get `setenv` and a
//! `noglob` guard) and cleaned up on the way through: empty fields,
//! whitespace-led fields, cancellations (`xx@`) and duplicates of
//! earlier capabilities are suppressed.

#![warn(clippy::pedantic)]

use std::collections::HashSet;
use std::io::Write;

use clap::Parser;
use vtcap::Entry;

/// Print shell commands to set TERM and TERMCAP.
///
/// BSD tset(1) replacement designed to be run as "eval `vtset <term>`".
#[derive(Debug, Parser)]
#[command(name = "vtset", version)]
struct Cli {
    /// Don't display erase, interrupt, kill characters (always on).
    #[arg(short = 'Q')]
    quiet: bool,

    /// Print shell commands to set TERM and TERMCAP (always on).
    #[arg(short = 's')]
    shell_commands: bool,

    /// Terminal type to export.
    #[arg(value_name = "TERMTYPE")]
    term: String,
}

fn main() {
    let cli = Cli::parse();

    let entry = match Entry::open(&cli.term) {
        Ok(entry) => entry,
        Err(err) => {
            eprintln!("vtset: {err}");
            std::process::exit(1);
        }
    };

    let shell = std::env::var("SHELL").unwrap_or_default();
    let out = export_commands(&cli.term, entry.raw(), shell.ends_with("csh"));
    std::io::stdout()
        .write_all(&out)
        .expect("write to stdout");
}

/// Build the eval-able export text for a raw termcap entry.
fn export_commands(term: &str, entry: &[u8], csh: bool) -> Vec<u8> {
    let mut out = Vec::new();
    if csh {
        out.extend_from_slice(
            format!("set noglob;\nsetenv TERM '{term}';\nsetenv TERMCAP '")
                .as_bytes(),
        );
    } else {
        out.extend_from_slice(
            format!("export TERM='{term}';\nexport TERMCAP='").as_bytes(),
        );
    }

    let names_end =
        entry.iter().position(|&b| b == b':').unwrap_or(entry.len());
    write_names(&entry[..names_end], &mut out);
    write_capabilities(&entry[names_end..], &mut out);

    if csh {
        out.extend_from_slice(b":';\nunset noglob\n");
    } else {
        out.extend_from_slice(b":'\n");
    }
    out
}

/// Copy the terminal name list, dropping aliases that contain
/// whitespace (usually the trailing long description).
fn write_names(names: &[u8], out: &mut Vec<u8>) {
    let mut i = 0;
    while i < names.len() {
        let c = names[i];
        if c == b'|' {
            let end = names[i + 1..]
                .iter()
                .position(|&b| b == b'|')
                .map_or(names.len(), |p| i + 1 + p);
            let alias = &names[i + 1..end];
            if alias.iter().any(|&b| b == b' ' || b == b'\t') {
                i = end;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
}

/// Copy the capability fields with shell-safe quoting, suppressing the
/// fields [`should_skip`] rejects.
fn write_capabilities(mut rest: &[u8], out: &mut Vec<u8>) {
    let mut seen = HashSet::new();
    while let Some((&c, tail)) = rest.split_first() {
        rest = tail;
        match c {
            b' ' | b'"' | b'\'' | b'!' | b'`' => {
                // Octal-escape anything a shell might mangle inside
                // single quotes.
                out.extend_from_slice(format!("\\{c:03o}").as_bytes());
            }
            b'\\' | b'^' => {
                // Already a termcap escape; copy it with its operand.
                out.push(c);
                if let Some((&escaped, tail)) = rest.split_first() {
                    out.push(escaped);
                    rest = tail;
                }
            }
            b':' => {
                if should_skip(rest, &mut seen) {
                    let end = rest
                        .iter()
                        .position(|&b| b == b':')
                        .unwrap_or(rest.len());
                    rest = &rest[end..];
                } else {
                    out.push(c);
                }
            }
            c => out.push(c),
        }
    }
}

/// Is the capability field starting at `field` empty, whitespace-led,
/// a duplicate of an earlier two-letter name, or a cancellation?
fn should_skip(field: &[u8], seen: &mut HashSet<[u8; 2]>) -> bool {
    match field.first() {
        None | Some(b':' | b' ' | b'\t' | b'\r' | b'\n') => return true,
        Some(_) => {}
    }

    // A one-character field is odd but harmless.
    if field.len() < 2 || field[1] == b':' {
        return false;
    }

    let name = [field[0], field[1]];
    if !seen.insert(name) {
        return true;
    }

    field.get(2) == Some(&b'@')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn export(entry: &[u8]) -> String {
        String::from_utf8(export_commands("test", entry, false)).unwrap()
    }

    #[test]
    fn posix_wrapper() {
        let out = export(b"xx|test:co#80:");
        assert!(out.starts_with("export TERM='test';\nexport TERMCAP='"));
        assert!(out.ends_with(":'\n"));
        assert!(out.contains("xx|test"));
        assert!(out.contains(":co#80"));
    }

    #[test]
    fn csh_wrapper() {
        let out = String::from_utf8(export_commands(
            "test",
            b"xx|test:co#80:",
            true,
        ))
        .unwrap();
        assert!(out.starts_with(
            "set noglob;\nsetenv TERM 'test';\nsetenv TERMCAP '"
        ));
        assert!(out.ends_with(":';\nunset noglob\n"));
    }

    #[test]
    fn long_description_alias_dropped() {
        let out = export(b"xx|test|An Old Terminal:co#80:");
        assert!(out.contains("xx|test:"), "{out}");
        assert!(!out.contains("Old Terminal"), "{out}");
    }

    #[test]
    fn duplicate_capabilities_suppressed() {
        let out = export(b"xx:co#80:li#24:co#132:");
        assert_eq!(out.matches("co#").count(), 1, "{out}");
        assert!(out.contains("co#80"), "{out}");
        assert!(out.contains("li#24"), "{out}");
    }

    #[test]
    fn cancellations_suppressed() {
        let out = export(b"xx:bs@:am:");
        assert!(!out.contains("bs@"), "{out}");
        assert!(out.contains(":am"), "{out}");
    }

    #[test]
    fn empty_and_whitespace_fields_suppressed() {
        let out = export(b"xx:co#80:: \t:li#24:");
        assert!(!out.contains("::"), "{out}");
        assert!(!out.contains('\t'), "{out}");
        assert!(out.contains("li#24"), "{out}");
    }

    #[test]
    fn shell_metacharacters_escaped() {
        let out = export(b"xx:so=a b's:");
        assert!(out.contains("a\\040b\\047s"), "{out}");
    }

    #[test]
    fn termcap_escapes_copied_verbatim() {
        let out = export(b"xx:cm=\\E=%+ %+ :kb=^H:");
        // The backslash pair and caret pair survive; the spaces around
        // them are octal-escaped.
        assert!(out.contains("cm=\\E=%+\\040%+\\040"), "{out}");
        assert!(out.contains("kb=^H"), "{out}");
    }
}
