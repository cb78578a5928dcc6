//! Tagged CSV cells, rows, and a bounded row buffer that flushes to a sink.
//!
//! Column order within a row follows first-use: the first time a column
//! title is set on any row appended to a given [`Table`], that title is
//! recorded; later rows are expected to set the same set of columns.

use crate::containers::{FixedMap, FixedVec};
use std::io::Write;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Pointer(usize),
    Empty,
}

impl Cell {
    pub fn render(&self) -> String {
        match self {
            Cell::Str(s) => s.clone(),
            Cell::Int(i) => i.to_string(),
            Cell::Float(f) => format!("{:.6}", f),
            Cell::Bool(b) => b.to_string(),
            Cell::Pointer(p) => format!("0x{:x}", p),
            Cell::Empty => String::new(),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Str(s.to_owned())
    }
}
impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Int(v)
    }
}
impl From<u64> for Cell {
    fn from(v: u64) -> Self {
        Cell::Int(v as i64)
    }
}
impl From<usize> for Cell {
    fn from(v: usize) -> Self {
        Cell::Int(v as i64)
    }
}
impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Float(v)
    }
}
impl From<bool> for Cell {
    fn from(v: bool) -> Self {
        Cell::Bool(v)
    }
}

const MAX_COLUMNS: usize = 64;

/// One row of a [`Table`]. Columns are addressed by title, not index, so
/// measurement tests can build a row without tracking column ordering
/// themselves.
#[derive(Default)]
pub struct Row {
    cells: FixedMap<String, Cell, MAX_COLUMNS>,
    order: FixedVec<String, MAX_COLUMNS>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, column: &str, value: impl Into<Cell>) -> &mut Self {
        if !self.cells.contains_key(&column.to_string()) {
            let _ = self.order.push(column.to_string());
        }
        self.cells.put(column.to_string(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.cells.get(&column.to_string())
    }

    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.order.iter()
    }
}

/// A bounded, append-only buffer of [`Row`]s, with a title row derived from
/// the first row appended. Call [`Table::is_full`] after each append and
/// [`Table::write`] to flush, matching the original's "table fills up ->
/// emit and reset" discipline.
pub struct Table<const ROWS: usize> {
    name: String,
    rows: FixedVec<Row, ROWS>,
    title: Option<Vec<String>>,
}

impl<const ROWS: usize> Table<ROWS> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: FixedVec::new(),
            title: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends `row`, recording its column order as the table's title the
    /// first time a row is appended. Returns `false` (silently) if the
    /// table is already full — callers are expected to `write` and `clear`
    /// first, exactly like the original's capacity-then-flush protocol.
    pub fn append(&mut self, row: Row) -> bool {
        if self.title.is_none() {
            self.title = Some(row.columns().cloned().collect());
        }
        self.rows.push(row).is_ok()
    }

    pub fn is_full(&self) -> bool {
        self.rows.is_full()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Writes buffered rows to `sink`, emitting the title line first unless
    /// `sink` has already emitted one (tracked on the sink, so a table can
    /// be flushed across multiple files/sinks in tests without a spurious
    /// repeated header inside a single file).
    pub fn write(&self, sink: &mut dyn RowSink) -> std::io::Result<()> {
        let Some(title) = &self.title else {
            return Ok(());
        };
        sink.write_title(title)?;
        for row in self.rows.iter() {
            let line: Vec<String> = title
                .iter()
                .map(|col| row.get(col).map(Cell::render).unwrap_or_default())
                .collect();
            sink.write_row(&line)?;
        }
        Ok(())
    }
}

/// Destination for flushed [`Table`] rows. A single sink tracks whether it
/// has already emitted the title line, so appending to the same underlying
/// file never duplicates the header.
pub trait RowSink {
    fn write_title(&mut self, titles: &[String]) -> std::io::Result<()>;
    fn write_row(&mut self, cells: &[String]) -> std::io::Result<()>;
}

/// A [`RowSink`] backed by an append-mode file, flushed on every row and
/// closed implicitly on drop.
pub struct FileSink {
    file: std::fs::File,
    wrote_title: bool,
}

impl FileSink {
    pub fn create_or_append(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let wrote_title = path.exists() && path.metadata().map(|m| m.len() > 0).unwrap_or(false);
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self { file, wrote_title })
    }
}

impl RowSink for FileSink {
    fn write_title(&mut self, titles: &[String]) -> std::io::Result<()> {
        if self.wrote_title {
            return Ok(());
        }
        writeln!(self.file, "{}", titles.join(","))?;
        self.wrote_title = true;
        Ok(())
    }

    fn write_row(&mut self, cells: &[String]) -> std::io::Result<()> {
        writeln!(self.file, "{}", cells.join(","))
    }
}
