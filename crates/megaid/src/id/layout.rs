use core::fmt;

use crate::id::{BitProfile, NumericId};

/// A single field of a rendered layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: &'static str,
    pub bits: u8,
    pub value: u64,
}

/// Human-readable bit layout of a [`NumericId`] under a [`BitProfile`].
///
/// Renders as:
///
/// ```text
/// NumericId (64-bit) {
///     raw id     : 0x000000400c801003 (274888462339)
///     padded     : 00000000274888462339
///     layout     :
///         +----------------+---------------+---------------+
///         | timestamp (42) | instance (10) | sequence (12) |
///         ...
/// }
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Layout {
    profile: BitProfile,
    id: NumericId,
}

impl BitProfile {
    /// Returns a [`Display`](fmt::Display)able bit-layout table for `id`.
    pub const fn layout(self, id: NumericId) -> Layout {
        Layout { profile: self, id }
    }
}

impl Layout {
    /// The unpacked fields, most significant first.
    pub fn fields(&self) -> [FieldLayout; 3] {
        let widths = self.profile.widths();
        let parts = self.profile.unpack(self.id);
        [
            FieldLayout {
                name: "timestamp",
                bits: widths.timestamp,
                value: parts.timestamp,
            },
            FieldLayout {
                name: "instance",
                bits: widths.instance_id,
                value: parts.instance_id,
            },
            FieldLayout {
                name: "sequence",
                bits: widths.sequence,
                value: parts.sequence,
            },
        ]
    }
}

fn center(s: impl ToString, width: usize) -> String {
    let s = s.to_string();
    let len = s.len();
    if len >= width {
        return s;
    }
    let pad = width - len;
    let left = pad / 2;
    let right = pad - left;
    format!("{}{}{}", " ".repeat(left), s, " ".repeat(right))
}

fn border(f: &mut fmt::Formatter<'_>, columns: &[usize]) -> fmt::Result {
    write!(f, "        +")?;
    for &w in columns {
        write!(f, "{}+", "-".repeat(w))?;
    }
    writeln!(f)
}

fn row(f: &mut fmt::Formatter<'_>, cells: &[String], columns: &[usize]) -> fmt::Result {
    write!(f, "        |")?;
    for (cell, &w) in cells.iter().zip(columns) {
        write!(f, "{}|", center(cell, w))?;
    }
    writeln!(f)
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self.fields();
        let labels: Vec<String> = fields
            .iter()
            .map(|field| format!("{} ({})", field.name, field.bits))
            .collect();
        let decimals: Vec<String> = fields.iter().map(|field| field.value.to_string()).collect();
        let hexes: Vec<String> = fields
            .iter()
            .map(|field| format!("0x{:x}", field.value))
            .collect();

        // Widest cell per column, +2 for padding
        let columns: Vec<usize> = (0..fields.len())
            .map(|i| labels[i].len().max(decimals[i].len()).max(hexes[i].len()) + 2)
            .collect();

        writeln!(f, "NumericId ({}-bit) {{", self.profile)?;
        writeln!(
            f,
            "    raw id     : 0x{:016x} ({})",
            self.id.to_raw(),
            self.id
        )?;
        writeln!(f, "    padded     : {}", self.id.to_padded_string())?;
        writeln!(f, "    layout     :")?;
        border(f, &columns)?;
        row(f, &labels, &columns)?;
        border(f, &columns)?;
        row(f, &decimals, &columns)?;
        row(f, &hexes, &columns)?;
        border(f, &columns)?;
        write!(f, "}}")
    }
}
