//! XLSX sheet sink over `rust_xlsxwriter`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;
use std::path::Path;

use log::{debug, warn};
use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet};

use crate::conf::{EnumFmtKey, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX, derive_default_report_formats};
use crate::sink::SheetSink;
use crate::spec::{
    EnumCellValue, SinkError, SpecCellFormat, SpecRenderedCell, SpecReportWriteOptions,
};
use crate::util::{
    calculate_autofit_width, cast_col_num, cast_row_num, convert_date_to_excel_serial,
    convert_datetime_to_excel_serial, derive_unique_sheet_name, estimate_width_len,
    sanitize_sheet_name,
};

/// Largest integer magnitude stored as a number without precision loss.
const N_INT_EXACT_MAX: u64 = 1 << 53;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnumRowStyle {
    Header,
    Data,
    Summary,
}

struct SpecXlsxSheetState {
    idx_worksheet: usize,
    sheet_name: String,
    n_cols: usize,
    l_width_by_col_header: Vec<usize>,
    l_width_by_col_body: Vec<usize>,
    n_rows_seen_for_autofit: usize,
}

/// Stateful workbook sink.
///
/// Worksheets are created in constant-memory mode by default, so rows are
/// flushed to a temp file as soon as the next row starts. The workbook itself
/// is assembled on [`SheetSink::finalize`] or [`Self::save`].
pub struct XlsxSheetSink {
    workbook: Workbook,
    dict_formats: BTreeMap<EnumFmtKey, SpecCellFormat>,
    write_options: SpecReportWriteOptions,
    set_sheet_names_existing: BTreeSet<String>,
    dict_format_cache: HashMap<SpecCellFormat, Format>,
    state: Option<SpecXlsxSheetState>,
    n_worksheets: usize,
    l_warnings: Vec<String>,
    if_closed: bool,
}

impl Default for XlsxSheetSink {
    fn default() -> Self {
        Self::new()
    }
}

impl XlsxSheetSink {
    /// Sink with default presets and options.
    pub fn new() -> Self {
        Self::with_options(derive_default_report_formats(), SpecReportWriteOptions::default())
    }

    /// Sink with custom presets (missing keys fall back to an empty format) and options.
    pub fn with_options(
        dict_formats: BTreeMap<EnumFmtKey, SpecCellFormat>,
        write_options: SpecReportWriteOptions,
    ) -> Self {
        Self {
            workbook: Workbook::new(),
            dict_formats,
            write_options,
            set_sheet_names_existing: BTreeSet::new(),
            dict_format_cache: HashMap::new(),
            state: None,
            n_worksheets: 0,
            l_warnings: Vec::new(),
            if_closed: false,
        }
    }

    /// Write options in effect.
    pub fn write_options(&self) -> &SpecReportWriteOptions {
        &self.write_options
    }

    /// Assemble the workbook and write it to `path`.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<(), SinkError> {
        self.validate_closable()?;
        self.workbook.save(path.as_ref())?;
        self.if_closed = true;
        Ok(())
    }

    fn validate_closable(&self) -> Result<(), SinkError> {
        if self.if_closed {
            return Err(SinkError::State("workbook was already finalized".to_string()));
        }
        if let Some(state) = &self.state {
            return Err(SinkError::State(format!(
                "sheet {:?} is still open",
                state.sheet_name
            )));
        }
        Ok(())
    }

    fn derive_preset(&self, key: EnumFmtKey) -> SpecCellFormat {
        self.dict_formats.get(&key).cloned().unwrap_or_default()
    }

    fn derive_cell_format_spec(&self, row_style: EnumRowStyle, cell: &SpecRenderedCell) -> SpecCellFormat {
        let fmt_base = match row_style {
            EnumRowStyle::Header => self.derive_preset(EnumFmtKey::Header),
            EnumRowStyle::Data => self
                .derive_preset(derive_value_fmt_key(&cell.value))
                .merge(&self.write_options.base_format_patch),
            EnumRowStyle::Summary => self
                .derive_preset(EnumFmtKey::Summary)
                .merge(&self.derive_preset(derive_value_fmt_key(&cell.value)))
                .merge(&self.write_options.base_format_patch)
                .merge(&SpecCellFormat {
                    bold: self.derive_preset(EnumFmtKey::Summary).bold,
                    ..Default::default()
                }),
        };
        match &cell.format {
            Some(fmt_patch) => fmt_base.merge(fmt_patch),
            None => fmt_base,
        }
    }

    fn write_row(
        &mut self,
        row_idx: usize,
        cells: &[SpecRenderedCell],
        row_style: EnumRowStyle,
    ) -> Result<(), SinkError> {
        if self.if_closed {
            return Err(SinkError::State("cannot write after finalize".to_string()));
        }
        let l_fmt_specs: Vec<SpecCellFormat> = cells
            .iter()
            .map(|cell| self.derive_cell_format_spec(row_style, cell))
            .collect();

        let Some(state) = self.state.as_mut() else {
            return Err(SinkError::State("no sheet is open".to_string()));
        };
        if cells.len() > state.n_cols {
            return Err(SinkError::State(format!(
                "row {row_idx} has {} cells, sheet {:?} has {} columns",
                cells.len(),
                state.sheet_name,
                state.n_cols
            )));
        }

        let if_record_body = row_style != EnumRowStyle::Header
            && self
                .write_options
                .policy_autofit
                .height_body_inferred_max
                .is_none_or(|n_max| state.n_rows_seen_for_autofit < n_max);

        let worksheet = self.workbook.worksheet_from_index(state.idx_worksheet)?;
        for (col_idx, (cell, fmt_spec)) in cells.iter().zip(l_fmt_specs).enumerate() {
            let format = self
                .dict_format_cache
                .entry(fmt_spec)
                .or_insert_with_key(derive_rust_xlsx_format);
            write_cell_with_format(worksheet, row_idx, col_idx, &cell.value, format)?;

            let n_width = estimate_width_len(&cell.value);
            match row_style {
                EnumRowStyle::Header => {
                    state.l_width_by_col_header[col_idx] =
                        usize::max(state.l_width_by_col_header[col_idx], n_width);
                }
                _ if if_record_body => {
                    state.l_width_by_col_body[col_idx] =
                        usize::max(state.l_width_by_col_body[col_idx], n_width);
                }
                _ => {}
            }
        }

        if row_style == EnumRowStyle::Data && if_record_body {
            state.n_rows_seen_for_autofit += 1;
        }
        if row_style == EnumRowStyle::Header && self.write_options.if_freeze_header {
            worksheet.set_freeze_panes(cast_row_num(row_idx + 1)?, 0)?;
        }
        Ok(())
    }
}

impl SheetSink for XlsxSheetSink {
    fn start_sheet(
        &mut self,
        sheet_name: &str,
        n_cols: usize,
        n_rows: usize,
    ) -> Result<String, SinkError> {
        if self.if_closed {
            return Err(SinkError::State("cannot add sheets after finalize".to_string()));
        }
        if let Some(state) = &self.state {
            return Err(SinkError::State(format!(
                "sheet {:?} is still open",
                state.sheet_name
            )));
        }
        if n_rows > N_NROWS_EXCEL_MAX {
            return Err(SinkError::Limit(format!(
                "sheet {sheet_name:?} needs {n_rows} rows, Excel allows {N_NROWS_EXCEL_MAX}"
            )));
        }
        if n_cols > N_NCOLS_EXCEL_MAX {
            return Err(SinkError::Limit(format!(
                "sheet {sheet_name:?} needs {n_cols} columns, Excel allows {N_NCOLS_EXCEL_MAX}"
            )));
        }

        let c_name_sanitized = sanitize_sheet_name(sheet_name, "_");
        if c_name_sanitized != sheet_name {
            self.l_warnings.push(format!(
                "Sheet name {sheet_name:?} sanitized to {c_name_sanitized:?}."
            ));
        }
        let c_name_unique =
            derive_unique_sheet_name(&mut self.set_sheet_names_existing, &c_name_sanitized);
        if c_name_unique != c_name_sanitized {
            self.l_warnings.push(format!(
                "Sheet name {c_name_sanitized:?} already used; renamed to {c_name_unique:?}."
            ));
        }

        let worksheet = if self.write_options.if_constant_memory {
            self.workbook.add_worksheet_with_constant_memory()
        } else {
            self.workbook.add_worksheet()
        };
        worksheet.set_name(&c_name_unique)?;

        debug!("xlsx sheet {c_name_unique:?} opened ({n_rows} rows x {n_cols} columns)");
        self.state = Some(SpecXlsxSheetState {
            idx_worksheet: self.n_worksheets,
            sheet_name: c_name_unique.clone(),
            n_cols,
            l_width_by_col_header: vec![0; n_cols],
            l_width_by_col_body: vec![0; n_cols],
            n_rows_seen_for_autofit: 0,
        });
        self.n_worksheets += 1;
        Ok(c_name_unique)
    }

    fn write_title_row(
        &mut self,
        row_idx: usize,
        title: &str,
        n_cols: usize,
        format: Option<&SpecCellFormat>,
    ) -> Result<(), SinkError> {
        let fmt_spec = match format {
            Some(fmt_patch) => self.derive_preset(EnumFmtKey::Title).merge(fmt_patch),
            None => self.derive_preset(EnumFmtKey::Title),
        };
        let Some(state) = self.state.as_ref() else {
            return Err(SinkError::State("no sheet is open".to_string()));
        };
        let worksheet = self.workbook.worksheet_from_index(state.idx_worksheet)?;
        let format = self
            .dict_format_cache
            .entry(fmt_spec)
            .or_insert_with_key(derive_rust_xlsx_format);

        let n_row = cast_row_num(row_idx)?;
        if n_cols > 1 {
            worksheet.merge_range(n_row, 0, n_row, cast_col_num(n_cols - 1)?, title, format)?;
        } else {
            worksheet.write_string_with_format(n_row, 0, title, format)?;
        }
        Ok(())
    }

    fn write_header_row(
        &mut self,
        row_idx: usize,
        cells: &[SpecRenderedCell],
    ) -> Result<(), SinkError> {
        self.write_row(row_idx, cells, EnumRowStyle::Header)
    }

    fn write_data_row(
        &mut self,
        row_idx: usize,
        cells: &[SpecRenderedCell],
    ) -> Result<(), SinkError> {
        self.write_row(row_idx, cells, EnumRowStyle::Data)
    }

    fn write_summary_row(
        &mut self,
        row_idx: usize,
        cells: &[SpecRenderedCell],
    ) -> Result<(), SinkError> {
        self.write_row(row_idx, cells, EnumRowStyle::Summary)
    }

    fn finish_sheet(&mut self, column_widths: &[Option<f64>]) -> Result<(), SinkError> {
        let Some(state) = self.state.take() else {
            return Err(SinkError::State("no sheet is open".to_string()));
        };
        let worksheet = self.workbook.worksheet_from_index(state.idx_worksheet)?;

        for n_idx_col in 0..state.n_cols {
            let n_width = column_widths.get(n_idx_col).copied().flatten().or_else(|| {
                calculate_autofit_width(
                    &self.write_options.policy_autofit,
                    state.l_width_by_col_header[n_idx_col],
                    state.l_width_by_col_body[n_idx_col],
                )
            });
            if let Some(n_width) = n_width {
                worksheet.set_column_width(cast_col_num(n_idx_col)?, n_width)?;
            }
        }
        debug!("xlsx sheet {:?} closed", state.sheet_name);
        Ok(())
    }

    fn finalize(&mut self, writer: &mut dyn Write) -> Result<(), SinkError> {
        self.validate_closable()?;
        let v_buf = self.workbook.save_to_buffer()?;
        writer.write_all(&v_buf)?;
        writer.flush()?;
        self.if_closed = true;
        Ok(())
    }

    fn take_warnings(&mut self) -> Vec<String> {
        for c_warning in &self.l_warnings {
            warn!("{c_warning}");
        }
        std::mem::take(&mut self.l_warnings)
    }
}

fn derive_value_fmt_key(value: &EnumCellValue) -> EnumFmtKey {
    match value {
        EnumCellValue::Integer(_) => EnumFmtKey::Integer,
        EnumCellValue::Number(_) => EnumFmtKey::Decimal,
        EnumCellValue::Date(_) => EnumFmtKey::Date,
        EnumCellValue::DateTime(_) => EnumFmtKey::DateTime,
        EnumCellValue::None | EnumCellValue::Boolean(_) | EnumCellValue::String(_) => {
            EnumFmtKey::Text
        }
    }
}

fn write_cell_with_format(
    worksheet: &mut Worksheet,
    row_idx: usize,
    col_idx: usize,
    value: &EnumCellValue,
    format: &Format,
) -> Result<(), SinkError> {
    let n_row = cast_row_num(row_idx)?;
    let n_col = cast_col_num(col_idx)?;
    match value {
        EnumCellValue::None => {
            worksheet.write_blank(n_row, n_col, format)?;
        }
        EnumCellValue::Boolean(val) => {
            worksheet.write_boolean_with_format(n_row, n_col, *val, format)?;
        }
        EnumCellValue::Integer(val) => {
            if val.unsigned_abs() > N_INT_EXACT_MAX {
                worksheet.write_string_with_format(n_row, n_col, val.to_string(), format)?;
            } else {
                worksheet.write_number_with_format(n_row, n_col, *val as f64, format)?;
            }
        }
        EnumCellValue::Number(val) => {
            if val.is_finite() {
                worksheet.write_number_with_format(n_row, n_col, *val, format)?;
            } else {
                worksheet.write_string_with_format(n_row, n_col, val.to_string(), format)?;
            }
        }
        EnumCellValue::String(val) => {
            worksheet.write_string_with_format(n_row, n_col, val, format)?;
        }
        EnumCellValue::Date(val) => {
            worksheet.write_number_with_format(
                n_row,
                n_col,
                convert_date_to_excel_serial(val),
                format,
            )?;
        }
        EnumCellValue::DateTime(val) => {
            worksheet.write_number_with_format(
                n_row,
                n_col,
                convert_datetime_to_excel_serial(val),
                format,
            )?;
        }
    }
    Ok(())
}

fn derive_rust_xlsx_format(spec: &SpecCellFormat) -> Format {
    let mut format = Format::new();

    if let Some(val) = &spec.font_name {
        format = format.set_font_name(val.clone());
    }
    if let Some(val) = spec.font_size {
        format = format.set_font_size(val as f64);
    }
    if spec.bold.unwrap_or(false) {
        format = format.set_bold();
    }
    if spec.italic.unwrap_or(false) {
        format = format.set_italic();
    }

    if let Some(val) = &spec.align
        && let Some(align) = derive_format_align(val)
    {
        format = format.set_align(align);
    }
    if let Some(val) = &spec.valign
        && let Some(align) = derive_format_align(val)
    {
        format = format.set_align(align);
    }

    if let Some(val) = &spec.num_format {
        format = format.set_num_format(val.clone());
    }
    if let Some(val) = &spec.bg_color {
        format = format.set_background_color(val.as_str());
    }
    if let Some(val) = &spec.font_color {
        format = format.set_font_color(val.as_str());
    }

    if let Some(val) = spec.border {
        format = format.set_border(derive_format_border(val));
    }
    if let Some(val) = spec.top {
        format = format.set_border_top(derive_format_border(val));
    }
    if let Some(val) = spec.bottom {
        format = format.set_border_bottom(derive_format_border(val));
    }
    if let Some(val) = spec.left {
        format = format.set_border_left(derive_format_border(val));
    }
    if let Some(val) = spec.right {
        format = format.set_border_right(derive_format_border(val));
    }

    if spec.text_wrap.unwrap_or(false) {
        format = format.set_text_wrap();
    }

    format
}

fn derive_format_border(border: i64) -> FormatBorder {
    match border {
        1 => FormatBorder::Thin,
        2 => FormatBorder::Medium,
        3 => FormatBorder::Dashed,
        4 => FormatBorder::Dotted,
        5 => FormatBorder::Thick,
        6 => FormatBorder::Double,
        7 => FormatBorder::Hair,
        8 => FormatBorder::MediumDashed,
        9 => FormatBorder::DashDot,
        10 => FormatBorder::MediumDashDot,
        11 => FormatBorder::DashDotDot,
        12 => FormatBorder::MediumDashDotDot,
        13 => FormatBorder::SlantDashDot,
        _ => FormatBorder::None,
    }
}

fn derive_format_align(align: &str) -> Option<FormatAlign> {
    match align.trim().to_ascii_lowercase().as_str() {
        "general" => Some(FormatAlign::General),
        "left" => Some(FormatAlign::Left),
        "center" => Some(FormatAlign::Center),
        "right" => Some(FormatAlign::Right),
        "fill" => Some(FormatAlign::Fill),
        "justify" => Some(FormatAlign::Justify),
        "center_across" => Some(FormatAlign::CenterAcross),
        "distributed" => Some(FormatAlign::Distributed),
        "top" => Some(FormatAlign::Top),
        "bottom" => Some(FormatAlign::Bottom),
        "vcenter" | "vertical_center" => Some(FormatAlign::VerticalCenter),
        "vjustify" | "vertical_justify" => Some(FormatAlign::VerticalJustify),
        "vdistributed" | "vertical_distributed" => Some(FormatAlign::VerticalDistributed),
        _ => None,
    }
}
