//! Human-readable rendering of a parse table.
//!
//! Used by the internal-error paths of the translator and by debug
//! logging after a terminal type loads. Lines end in `\r\n` because
//! the dump is typically emitted while the host terminal is raw.

use crate::table::{Action, ArgState, Op, ParseTable, ROOT};

/// Render the whole table starting from the root.
#[must_use]
pub fn render(table: &ParseTable) -> String {
    let mut out = String::new();
    render_node(table, ROOT, 0, &mut out);
    out
}

fn render_node(table: &ParseTable, node: u16, indent: usize, out: &mut String) {
    for byte in 0u8..0x80 {
        let entry = table.entry(node, byte);

        // Skip entries still holding their initialized default: the
        // printable pass-through range at the root, plain Ignore
        // everywhere else.
        let default_print = node == ROOT && byte >= 0x20;
        match entry.op() {
            Op::Print if default_print && entry.cap().is_none() => continue,
            Op::Ignore if !default_print => continue,
            _ => {}
        }

        out.push_str(&" ".repeat(indent));
        if (0x21..0x7f).contains(&byte) {
            out.push_str(&format!("  {}=", byte as char));
        } else {
            out.push_str(&format!("\\{byte:03o}="));
        }

        for slot in entry.raw_steps().iter().flatten() {
            out.push_str(match slot.state {
                ArgState::Next => "nx",
                ArgState::OneChar => "1c",
                ArgState::Digits => "dd",
                ArgState::ThreeDigits => "3d",
                ArgState::TwoDigits => "2d",
                ArgState::OneDigit => "1d",
            });
            if slot.inc != 0 {
                out.push_str(&format!("+{}", slot.inc));
            }
            out.push(',');
        }

        match entry.op() {
            Op::Ignore => out.push_str("ignore"),
            Op::Print => out.push_str("print"),
            Op::Next(child) => {
                out.push_str("{\r\n");
                render_node(table, child, indent + 4, out);
                out.push_str(&" ".repeat(indent + 4));
                out.push('}');
            }
            Op::Emit(action, rep) => {
                out.push_str(&format!(
                    "{:?}",
                    crate::table::ByteSeq(rep.as_bytes())
                ));
                if action != Action::Fmt {
                    let name: &'static str = action.into();
                    out.push(',');
                    out.push_str(name);
                }
            }
        }

        if let Some(cap) = entry.cap() {
            out.push_str(&format!(" [{cap}]"));
        }
        out.push_str("\r\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Action, ParseTable};
    use vtcap::CapName;

    #[test]
    fn renders_sequences_and_steps() {
        let mut table = ParseTable::new();
        table.init_printable();
        table
            .install(
                CapName::new(*b"cm"),
                b"\x1b=%+ %+ ",
                Action::Fmt2,
                "\x1b[%d;%dH",
            )
            .unwrap();
        let text = render(&table);
        assert!(text.contains("\\033="), "escape byte shown: {text}");
        assert!(text.contains("1c+32,1c+32,"), "steps shown: {text}");
        assert!(text.contains("[cm]"), "claimant shown: {text}");
        assert!(text.contains("FMT2"), "action shown: {text}");
    }
}
