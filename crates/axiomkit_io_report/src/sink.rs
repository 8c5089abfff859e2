//! Sheet sink contract and the in-memory buffered sink.
//!
//! The renderer drives a sink with one call sequence per sheet:
//! `start_sheet` -> `write_title_row`? -> `write_header_row` ->
//! `write_data_row`* -> `write_summary_row` -> `finish_sheet`, and a single
//! `finalize` once all sheets are written. Row indices are sheet-absolute.

use std::io::Write;

use crate::spec::{EnumCellValue, SinkError, SpecCellFormat, SpecRenderedCell};

/// Physical encoder of rendered sheets.
pub trait SheetSink {
    /// Open a sheet; returns the final (possibly renamed) sheet name.
    ///
    /// `n_rows` counts every row the sheet will hold, title and summary included.
    fn start_sheet(&mut self, sheet_name: &str, n_cols: usize, n_rows: usize)
    -> Result<String, SinkError>;

    /// Write the title banner spanning `n_cols` columns.
    fn write_title_row(
        &mut self,
        row_idx: usize,
        title: &str,
        n_cols: usize,
        format: Option<&SpecCellFormat>,
    ) -> Result<(), SinkError>;

    /// Write the column header row.
    fn write_header_row(&mut self, row_idx: usize, cells: &[SpecRenderedCell])
    -> Result<(), SinkError>;

    /// Write one data row.
    fn write_data_row(&mut self, row_idx: usize, cells: &[SpecRenderedCell])
    -> Result<(), SinkError>;

    /// Write the summary (counter) row.
    fn write_summary_row(&mut self, row_idx: usize, cells: &[SpecRenderedCell])
    -> Result<(), SinkError>;

    /// Close the current sheet. `column_widths[i]` overrides the width of column `i`.
    fn finish_sheet(&mut self, column_widths: &[Option<f64>]) -> Result<(), SinkError>;

    /// Serialize everything written so far into `writer`.
    fn finalize(&mut self, writer: &mut dyn Write) -> Result<(), SinkError>;

    /// Drain non-fatal notes (renamed sheets and the like).
    fn take_warnings(&mut self) -> Vec<String> {
        Vec::new()
    }
}

////////////////////////////////////////////////////////////////////////////////
// #region MemorySheetSink

/// Kind of a buffered row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumRowKind {
    /// Merged title banner; holds one cell.
    Title,
    /// Column headers.
    Header,
    /// Record row.
    Data,
    /// Counter row.
    Summary,
}

/// One buffered row.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecBufferedRow {
    /// Sheet-absolute row index.
    pub row_idx: usize,
    /// Row kind.
    pub kind: EnumRowKind,
    /// Cells in column order.
    pub cells: Vec<SpecRenderedCell>,
}

/// One buffered sheet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecBufferedSheet {
    /// Sheet name as passed to `start_sheet`.
    pub sheet_name: String,
    /// Declared column count.
    pub n_cols: usize,
    /// Declared row count.
    pub n_rows: usize,
    /// Rows in write order.
    pub rows: Vec<SpecBufferedRow>,
    /// Width overrides given to `finish_sheet`.
    pub column_widths: Vec<Option<f64>>,
    /// `finish_sheet` was called.
    pub if_finished: bool,
}

impl SpecBufferedSheet {
    fn row_of(&self, kind: EnumRowKind) -> Option<&[SpecRenderedCell]> {
        self.rows
            .iter()
            .find(|row| row.kind == kind)
            .map(|row| row.cells.as_slice())
    }

    /// Title text, if a title row was written.
    pub fn title(&self) -> Option<String> {
        self.row_of(EnumRowKind::Title)
            .and_then(|cells| cells.first())
            .map(|cell| cell.value.to_string())
    }

    /// Header cells.
    pub fn header(&self) -> Option<&[SpecRenderedCell]> {
        self.row_of(EnumRowKind::Header)
    }

    /// Data rows in order.
    pub fn data_rows(&self) -> impl Iterator<Item = &[SpecRenderedCell]> {
        self.rows
            .iter()
            .filter(|row| row.kind == EnumRowKind::Data)
            .map(|row| row.cells.as_slice())
    }

    /// Summary cells.
    pub fn summary(&self) -> Option<&[SpecRenderedCell]> {
        self.row_of(EnumRowKind::Summary)
    }

    /// Values of column `col_idx` over the data rows.
    pub fn column_values(&self, col_idx: usize) -> Vec<EnumCellValue> {
        self.data_rows()
            .map(|cells| cells.get(col_idx).map(|cell| cell.value.clone()).unwrap_or_default())
            .collect()
    }
}

/// Sink that keeps every row in memory.
///
/// Used as the per-sheet buffer of parallel rendering and as a plain-text
/// output (tab-separated, one block per sheet) in tests and previews.
#[derive(Debug, Clone, Default)]
pub struct MemorySheetSink {
    sheets: Vec<SpecBufferedSheet>,
}

impl MemorySheetSink {
    /// Empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffered sheets in write order.
    pub fn sheets(&self) -> &[SpecBufferedSheet] {
        &self.sheets
    }

    /// Buffered sheet by name.
    pub fn sheet(&self, sheet_name: &str) -> Option<&SpecBufferedSheet> {
        self.sheets.iter().find(|sheet| sheet.sheet_name == sheet_name)
    }

    /// Re-emit every finished sheet into `sink`, returning the names it assigned.
    pub fn replay_into<S: SheetSink + ?Sized>(&self, sink: &mut S) -> Result<Vec<String>, SinkError> {
        let mut l_names = Vec::with_capacity(self.sheets.len());
        for sheet in &self.sheets {
            if !sheet.if_finished {
                return Err(SinkError::State(format!(
                    "sheet {:?} was not finished",
                    sheet.sheet_name
                )));
            }
            l_names.push(sink.start_sheet(&sheet.sheet_name, sheet.n_cols, sheet.n_rows)?);
            for row in &sheet.rows {
                match row.kind {
                    EnumRowKind::Title => {
                        let Some(cell) = row.cells.first() else {
                            continue;
                        };
                        sink.write_title_row(
                            row.row_idx,
                            &cell.value.to_string(),
                            sheet.n_cols,
                            cell.format.as_ref(),
                        )?;
                    }
                    EnumRowKind::Header => sink.write_header_row(row.row_idx, &row.cells)?,
                    EnumRowKind::Data => sink.write_data_row(row.row_idx, &row.cells)?,
                    EnumRowKind::Summary => sink.write_summary_row(row.row_idx, &row.cells)?,
                }
            }
            sink.finish_sheet(&sheet.column_widths)?;
        }
        Ok(l_names)
    }

    fn current_sheet(&mut self) -> Result<&mut SpecBufferedSheet, SinkError> {
        match self.sheets.last_mut() {
            Some(sheet) if !sheet.if_finished => Ok(sheet),
            _ => Err(SinkError::State("no sheet is open".to_string())),
        }
    }

    fn push_row(
        &mut self,
        row_idx: usize,
        kind: EnumRowKind,
        cells: &[SpecRenderedCell],
    ) -> Result<(), SinkError> {
        self.current_sheet()?.rows.push(SpecBufferedRow {
            row_idx,
            kind,
            cells: cells.to_vec(),
        });
        Ok(())
    }
}

impl SheetSink for MemorySheetSink {
    fn start_sheet(
        &mut self,
        sheet_name: &str,
        n_cols: usize,
        n_rows: usize,
    ) -> Result<String, SinkError> {
        if self.sheets.last().is_some_and(|sheet| !sheet.if_finished) {
            return Err(SinkError::State("previous sheet is still open".to_string()));
        }
        self.sheets.push(SpecBufferedSheet {
            sheet_name: sheet_name.to_string(),
            n_cols,
            n_rows,
            ..Default::default()
        });
        Ok(sheet_name.to_string())
    }

    fn write_title_row(
        &mut self,
        row_idx: usize,
        title: &str,
        _n_cols: usize,
        format: Option<&SpecCellFormat>,
    ) -> Result<(), SinkError> {
        let cell = SpecRenderedCell {
            value: EnumCellValue::String(title.to_string()),
            format: format.cloned(),
        };
        self.push_row(row_idx, EnumRowKind::Title, std::slice::from_ref(&cell))
    }

    fn write_header_row(
        &mut self,
        row_idx: usize,
        cells: &[SpecRenderedCell],
    ) -> Result<(), SinkError> {
        self.push_row(row_idx, EnumRowKind::Header, cells)
    }

    fn write_data_row(
        &mut self,
        row_idx: usize,
        cells: &[SpecRenderedCell],
    ) -> Result<(), SinkError> {
        self.push_row(row_idx, EnumRowKind::Data, cells)
    }

    fn write_summary_row(
        &mut self,
        row_idx: usize,
        cells: &[SpecRenderedCell],
    ) -> Result<(), SinkError> {
        self.push_row(row_idx, EnumRowKind::Summary, cells)
    }

    fn finish_sheet(&mut self, column_widths: &[Option<f64>]) -> Result<(), SinkError> {
        let sheet = self.current_sheet()?;
        sheet.column_widths = column_widths.to_vec();
        sheet.if_finished = true;
        Ok(())
    }

    fn finalize(&mut self, writer: &mut dyn Write) -> Result<(), SinkError> {
        for (n_idx, sheet) in self.sheets.iter().enumerate() {
            if n_idx > 0 {
                writeln!(writer)?;
            }
            writeln!(writer, "[{}]", sheet.sheet_name)?;
            for row in &sheet.rows {
                let c_line = row
                    .cells
                    .iter()
                    .map(|cell| derive_tsv_field(&cell.value))
                    .collect::<Vec<_>>()
                    .join("\t");
                writeln!(writer, "{c_line}")?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}

fn derive_tsv_field(value: &EnumCellValue) -> String {
    value
        .to_string()
        .chars()
        .map(|chr| if matches!(chr, '\t' | '\n' | '\r') { ' ' } else { chr })
        .collect()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
