//! Sheet descriptor: records, columns, handlers and style for one sheet.

use std::collections::BTreeMap;
use std::fmt;

use log::warn;

use crate::conf::N_NCOLS_EXCEL_MAX;
use crate::handler::{Converter, Counter, map_converter};
use crate::record::{EnumFieldPath, EnumResolvedValue, Record};
use crate::spec::{BoxError, EnumCellValue, ReportError, SpecCellFormat, SpecSheetContext};

////////////////////////////////////////////////////////////////////////////////
// #region SheetStyle

/// Per-sheet presentation hook.
///
/// Every method returns a format patch merged over the sink's preset for that
/// row kind; `None` keeps the preset. Data cells are styled after conversion,
/// from the display value only.
pub trait SheetStyle: Send + Sync {
    /// Patch for the merged title cell.
    fn title_format(&self, _ctx: &SpecSheetContext<'_>) -> Option<SpecCellFormat> {
        None
    }

    /// Patch for one header cell.
    fn header_format(&self, _ctx: &SpecSheetContext<'_>, _col_idx: usize) -> Option<SpecCellFormat> {
        None
    }

    /// Patch for one data cell.
    fn data_format(
        &self,
        _ctx: &SpecSheetContext<'_>,
        _value: &EnumCellValue,
        _row_idx: usize,
        _col_idx: usize,
    ) -> Option<SpecCellFormat> {
        None
    }

    /// Patch for one summary cell.
    fn summary_format(
        &self,
        _ctx: &SpecSheetContext<'_>,
        _value: &EnumCellValue,
        _col_idx: usize,
    ) -> Option<SpecCellFormat> {
        None
    }

    /// Fixed column width; `None` leaves the width to autofit.
    fn column_width(&self, _ctx: &SpecSheetContext<'_>, _col_idx: usize) -> Option<f64> {
        None
    }
}

impl<F> SheetStyle for F
where
    F: Fn(&SpecSheetContext<'_>, &EnumCellValue, usize, usize) -> Option<SpecCellFormat>
        + Send
        + Sync,
{
    fn data_format(
        &self,
        ctx: &SpecSheetContext<'_>,
        value: &EnumCellValue,
        row_idx: usize,
        col_idx: usize,
    ) -> Option<SpecCellFormat> {
        self(ctx, value, row_idx, col_idx)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetInfo

/// Declarative configuration for rendering one sheet.
///
/// Built once, configured through the chained `put_*`/`set_*` methods, then
/// borrowed by the renderer. The borrow keeps it frozen while rendering.
pub struct SheetInfo<'a, R: Record> {
    sheet_name: String,
    title: Option<String>,
    column_names: Vec<String>,
    column_keys: Vec<String>,
    l_paths: Vec<EnumFieldPath>,
    records: &'a [R],
    dict_converters: BTreeMap<String, Converter<R>>,
    dict_counters: BTreeMap<String, Counter<R>>,
    style: Option<Box<dyn SheetStyle + 'a>>,
}

impl<'a, R: Record> SheetInfo<'a, R> {
    /// Declare a sheet.
    ///
    /// `column_names[i]` is the header of the column whose value comes from
    /// `field_paths[i]`. Both lists must be non-empty and equally long.
    pub fn new<N, P>(
        sheet_name: &str,
        title: Option<&str>,
        column_names: &[N],
        field_paths: &[P],
        records: &'a [R],
    ) -> Result<Self, ReportError>
    where
        N: AsRef<str>,
        P: AsRef<str>,
    {
        let derive_err = |message: String| ReportError::InvalidSheet {
            sheet_name: sheet_name.to_string(),
            message,
        };

        if column_names.len() != field_paths.len() {
            return Err(derive_err(format!(
                "{} column names for {} field paths",
                column_names.len(),
                field_paths.len()
            )));
        }
        if field_paths.is_empty() {
            return Err(derive_err("sheet has no columns".to_string()));
        }
        if field_paths.len() > N_NCOLS_EXCEL_MAX {
            return Err(derive_err(format!(
                "{} columns exceed the limit of {N_NCOLS_EXCEL_MAX}",
                field_paths.len()
            )));
        }

        let l_paths = field_paths
            .iter()
            .map(|path| EnumFieldPath::parse(path.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            sheet_name: sheet_name.to_string(),
            title: title.map(ToString::to_string),
            column_names: column_names.iter().map(|c| c.as_ref().to_string()).collect(),
            column_keys: l_paths.iter().map(|p| p.as_str().to_string()).collect(),
            l_paths,
            records,
            dict_converters: BTreeMap::new(),
            dict_counters: BTreeMap::new(),
            style: None,
        })
    }

    /// Set or replace the title banner.
    pub fn set_title(&mut self, title: impl Into<String>) -> &mut Self {
        self.title = Some(title.into());
        self
    }

    /// Register a converter closure for every column with path `column_key`.
    pub fn put_converter<F>(&mut self, column_key: &str, f_convert: F) -> &mut Self
    where
        F: Fn(
                &SpecSheetContext<'_>,
                &EnumResolvedValue<'_, R>,
                usize,
                usize,
            ) -> Result<EnumCellValue, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.put_converter_handler(column_key, Converter::new(f_convert))
    }

    /// Register a prebuilt converter (see [`crate::handler`]).
    pub fn put_converter_handler(&mut self, column_key: &str, converter: Converter<R>) -> &mut Self {
        self.warn_if_undeclared("converter", column_key);
        self.dict_converters.insert(column_key.to_string(), converter);
        self
    }

    /// Register a value-to-label mapping converter.
    pub fn put_converter_map<K, V, I>(&mut self, column_key: &str, pairs: I) -> &mut Self
    where
        K: Into<EnumCellValue>,
        V: Into<EnumCellValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.put_converter_handler(column_key, map_converter(pairs))
    }

    /// Register a counter closure; the summary cell shows the accumulator's text.
    pub fn put_counter<A, F>(&mut self, column_key: &str, f_fold: F) -> &mut Self
    where
        A: fmt::Display + 'static,
        F: Fn(
                &SpecSheetContext<'_>,
                &EnumResolvedValue<'_, R>,
                usize,
                usize,
                Option<&A>,
            ) -> Result<A, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.put_counter_handler(column_key, Counter::new(f_fold))
    }

    /// Register a prebuilt counter (see [`crate::handler`]).
    pub fn put_counter_handler(&mut self, column_key: &str, counter: Counter<R>) -> &mut Self {
        self.warn_if_undeclared("counter", column_key);
        self.dict_counters.insert(column_key.to_string(), counter);
        self
    }

    /// Set the style hook; a closure acts as a data-cell hook.
    pub fn set_sheet_style(&mut self, style: impl SheetStyle + 'a) -> &mut Self {
        self.style = Some(Box::new(style));
        self
    }

    /// Set a closure as the data-cell style hook.
    pub fn set_data_style<F>(&mut self, f_style: F) -> &mut Self
    where
        F: Fn(&SpecSheetContext<'_>, &EnumCellValue, usize, usize) -> Option<SpecCellFormat>
            + Send
            + Sync
            + 'a,
    {
        self.set_sheet_style(f_style)
    }

    /// Declared sheet name.
    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    /// Title banner, if any.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Column headers in order.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Column keys (field path strings) in order.
    pub fn column_keys(&self) -> &[String] {
        &self.column_keys
    }

    /// Parsed field paths in order.
    pub fn field_paths(&self) -> &[EnumFieldPath] {
        &self.l_paths
    }

    /// Bound records.
    pub fn records(&self) -> &'a [R] {
        self.records
    }

    /// Number of declared columns.
    pub fn width(&self) -> usize {
        self.l_paths.len()
    }

    /// Converter for `column_key`, if registered.
    pub fn converter(&self, column_key: &str) -> Option<&Converter<R>> {
        self.dict_converters.get(column_key)
    }

    /// Counter for `column_key`, if registered.
    pub fn counter(&self, column_key: &str) -> Option<&Counter<R>> {
        self.dict_counters.get(column_key)
    }

    /// Style hook, if set.
    pub fn style(&self) -> Option<&dyn SheetStyle> {
        self.style.as_deref().map(|style| style as &dyn SheetStyle)
    }

    /// Read-only view handed to handlers and style hooks.
    pub fn context(&self) -> SpecSheetContext<'_> {
        SpecSheetContext {
            sheet_name: &self.sheet_name,
            title: self.title.as_deref(),
            column_names: &self.column_names,
            column_keys: &self.column_keys,
            n_records: self.records.len(),
        }
    }

    fn warn_if_undeclared(&self, kind: &str, column_key: &str) {
        if !self.column_keys.iter().any(|key| key == column_key) {
            warn!(
                "sheet {:?}: {kind} registered for undeclared column {column_key:?}",
                self.sheet_name
            );
        }
    }
}

impl<R: Record> fmt::Debug for SheetInfo<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SheetInfo")
            .field("sheet_name", &self.sheet_name)
            .field("title", &self.title)
            .field("column_keys", &self.column_keys)
            .field("n_records", &self.records.len())
            .field("converters", &self.dict_converters.keys().collect::<Vec<_>>())
            .field("counters", &self.dict_counters.keys().collect::<Vec<_>>())
            .field("if_styled", &self.style.is_some())
            .finish()
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
