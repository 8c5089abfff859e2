//! Shared report specification models, options and errors.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use rust_xlsxwriter::XlsxError;

use crate::conf::{C_DATE_FORMAT, C_DATETIME_FORMAT};

/// Error type returned by user-supplied converters and counters.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

////////////////////////////////////////////////////////////////////////////////
// #region CellFormatSpecification

/// Cell format specification.
///
/// Every field is optional so a format can act as a patch over a preset (see
/// [`SpecCellFormat::merge`]). Style hooks return these patches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SpecCellFormat {
    /// Font family name.
    pub font_name: Option<String>,
    /// Font size in points.
    pub font_size: Option<i64>,
    /// Bold style.
    pub bold: Option<bool>,
    /// Italic style.
    pub italic: Option<bool>,

    /// Horizontal alignment.
    pub align: Option<String>,
    /// Vertical alignment.
    pub valign: Option<String>,
    /// Border style for all sides.
    pub border: Option<i64>,
    /// Text wrap.
    pub text_wrap: Option<bool>,

    /// Top border override.
    pub top: Option<i64>,
    /// Bottom border override.
    pub bottom: Option<i64>,
    /// Left border override.
    pub left: Option<i64>,
    /// Right border override.
    pub right: Option<i64>,

    /// Number format code.
    pub num_format: Option<String>,
    /// Background fill color (`#RRGGBB`).
    pub bg_color: Option<String>,
    /// Font color (`#RRGGBB`).
    pub font_color: Option<String>,
}

impl SpecCellFormat {
    /// Return a new format by overlaying `patch` onto `self`.
    pub fn with_(&self, patch: SpecCellFormat) -> SpecCellFormat {
        self.merge(&patch)
    }

    /// Merge two formats with right-side non-`None` overwrite semantics.
    pub fn merge(&self, other: &SpecCellFormat) -> SpecCellFormat {
        SpecCellFormat {
            font_name: other.font_name.clone().or_else(|| self.font_name.clone()),
            font_size: other.font_size.or(self.font_size),
            bold: other.bold.or(self.bold),
            italic: other.italic.or(self.italic),
            align: other.align.clone().or_else(|| self.align.clone()),
            valign: other.valign.clone().or_else(|| self.valign.clone()),
            border: other.border.or(self.border),
            text_wrap: other.text_wrap.or(self.text_wrap),
            top: other.top.or(self.top),
            bottom: other.bottom.or(self.bottom),
            left: other.left.or(self.left),
            right: other.right.or(self.right),
            num_format: other.num_format.clone().or_else(|| self.num_format.clone()),
            bg_color: other.bg_color.clone().or_else(|| self.bg_color.clone()),
            font_color: other.font_color.clone().or_else(|| self.font_color.clone()),
        }
    }

    /// Patch that only sets the font color.
    pub fn font_color(color: impl Into<String>) -> SpecCellFormat {
        SpecCellFormat {
            font_color: Some(color.into()),
            ..Default::default()
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CellValue

/// Normalized cell value flowing from records through converters to the sink.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EnumCellValue {
    /// Missing/blank value.
    #[default]
    None,
    /// Boolean value.
    Boolean(bool),
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Number(f64),
    /// Text value.
    String(String),
    /// Calendar date.
    Date(NaiveDate),
    /// Date and time without zone.
    DateTime(NaiveDateTime),
}

impl EnumCellValue {
    /// `true` for the blank value.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Numeric view of integer/number values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(val) => Some(*val as f64),
            Self::Number(val) => Some(*val),
            _ => None,
        }
    }

    /// Integer view of integer values.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(val) => Some(*val),
            _ => None,
        }
    }

    /// Borrow the text of string values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(val) => Some(val),
            _ => None,
        }
    }
}

impl fmt::Display for EnumCellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::Boolean(val) => write!(f, "{val}"),
            Self::Integer(val) => write!(f, "{val}"),
            Self::Number(val) => write!(f, "{val}"),
            Self::String(val) => write!(f, "{val}"),
            Self::Date(val) => write!(f, "{}", val.format(C_DATE_FORMAT)),
            Self::DateTime(val) => write!(f, "{}", val.format(C_DATETIME_FORMAT)),
        }
    }
}

macro_rules! impl_from_lossless_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for EnumCellValue {
                fn from(value: $ty) -> Self {
                    Self::Integer(i64::from(value))
                }
            }
        )*
    };
}

impl_from_lossless_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for EnumCellValue {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(val) => Self::Integer(val),
            Err(_) => Self::Number(value as f64),
        }
    }
}

impl From<usize> for EnumCellValue {
    fn from(value: usize) -> Self {
        Self::from(value as u64)
    }
}

impl From<f32> for EnumCellValue {
    fn from(value: f32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<f64> for EnumCellValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for EnumCellValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<String> for EnumCellValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for EnumCellValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<&String> for EnumCellValue {
    fn from(value: &String) -> Self {
        Self::String(value.clone())
    }
}

impl From<NaiveDate> for EnumCellValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveDateTime> for EnumCellValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl<T: Into<EnumCellValue>> From<Option<T>> for EnumCellValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::None, Into::into)
    }
}

/// One cell handed to a [`crate::sink::SheetSink`]: value plus optional style patch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecRenderedCell {
    /// Display value after conversion.
    pub value: EnumCellValue,
    /// Style directive returned by the sheet style hook.
    pub format: Option<SpecCellFormat>,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetContext

/// Read-only view of the sheet handed to converters, counters and style hooks.
#[derive(Debug, Clone, Copy)]
pub struct SpecSheetContext<'a> {
    /// Declared sheet name (before sanitization).
    pub sheet_name: &'a str,
    /// Optional title banner.
    pub title: Option<&'a str>,
    /// Column display names in rendered order.
    pub column_names: &'a [String],
    /// Column keys (field path strings) in rendered order.
    pub column_keys: &'a [String],
    /// Number of records bound to the sheet.
    pub n_records: usize,
}

impl SpecSheetContext<'_> {
    /// Number of declared columns.
    pub fn width(&self) -> usize {
        self.column_keys.len()
    }

    /// Column key at `col_idx`.
    pub fn column_key(&self, col_idx: usize) -> Option<&str> {
        self.column_keys.get(col_idx).map(String::as_str)
    }

    /// Display name at `col_idx`.
    pub fn column_name(&self, col_idx: usize) -> Option<&str> {
        self.column_names.get(col_idx).map(String::as_str)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region WriteOptions

/// Autofit rule for column width inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumAutofitColumnsRule {
    /// Disable autofit.
    None,
    /// Infer width from header cells only.
    Header,
    /// Infer width from body cells only.
    Body,
    /// Infer width from both header and body cells (default).
    #[default]
    All,
}

/// Autofit policy for column widths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecAutofitCellsPolicy {
    /// Autofit width inference rule.
    pub rule_columns: EnumAutofitColumnsRule,
    /// Max body rows inspected when body-based inference is active.
    pub height_body_inferred_max: Option<usize>,
    /// Minimum final width.
    pub width_cell_min: usize,
    /// Maximum final width.
    pub width_cell_max: usize,
    /// Width padding added after inference.
    pub width_cell_padding: usize,
}

impl Default for SpecAutofitCellsPolicy {
    fn default() -> Self {
        Self {
            rule_columns: EnumAutofitColumnsRule::All,
            height_body_inferred_max: Some(20_000),
            width_cell_min: 8,
            width_cell_max: 60,
            width_cell_padding: 2,
        }
    }
}

/// Writer-wide options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecReportWriteOptions {
    /// Base patch merged into all data/summary formats.
    pub base_format_patch: SpecCellFormat,
    /// Column autofit policy, used where the style hook gives no width.
    pub policy_autofit: SpecAutofitCellsPolicy,
    /// Stream worksheet rows to a temp file instead of holding them in memory.
    pub if_constant_memory: bool,
    /// Freeze panes below the header row.
    pub if_freeze_header: bool,
    /// Emit a progress `debug!` line every this many data rows (0 disables).
    pub n_rows_log_every: usize,
    /// Maximum worker threads for parallel sheet rendering.
    pub num_workers_max: Option<usize>,
}

impl Default for SpecReportWriteOptions {
    fn default() -> Self {
        Self {
            base_format_patch: SpecCellFormat::default(),
            policy_autofit: SpecAutofitCellsPolicy::default(),
            if_constant_memory: true,
            if_freeze_header: true,
            n_rows_log_every: 10_000,
            num_workers_max: None,
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Failure to navigate a real field path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldResolutionError {
    /// The record has no property with this name.
    #[error("property {segment:?} of path {path:?} does not exist")]
    MissingProperty {
        /// Full field path.
        path: String,
        /// Segment that could not be read.
        segment: String,
    },
    /// A nested lookup was attempted on a value that is not a record.
    #[error("cannot read {segment:?} of path {path:?}: parent is not a record")]
    NotRecord {
        /// Full field path.
        path: String,
        /// Segment that required a record parent.
        segment: String,
    },
    /// The path string itself is malformed.
    #[error("invalid field path {path:?}: {message}")]
    InvalidPath {
        /// Offending path.
        path: String,
        /// Reason.
        message: String,
    },
}

impl FieldResolutionError {
    /// Segment that failed; the whole path when it could not be parsed.
    pub fn segment(&self) -> &str {
        match self {
            Self::MissingProperty { segment, .. } | Self::NotRecord { segment, .. } => segment,
            Self::InvalidPath { path, .. } => path,
        }
    }
}

/// Failure raised by a sheet sink (encoding or output stream).
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Output stream failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Workbook encoder failure.
    #[error("xlsx write error: {0}")]
    Xlsx(#[from] XlsxError),
    /// Sheet does not fit format limits.
    #[error("{0}")]
    Limit(String),
    /// Sink method called out of order.
    #[error("{0}")]
    State(String),
}

/// Fatal errors of a render call.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Sheet declaration is inconsistent.
    #[error("invalid sheet {sheet_name:?}: {message}")]
    InvalidSheet {
        /// Declared sheet name.
        sheet_name: String,
        /// Reason.
        message: String,
    },
    /// Field path cannot be parsed.
    #[error("invalid field path {path:?}: {message}")]
    InvalidFieldPath {
        /// Offending path.
        path: String,
        /// Reason.
        message: String,
    },
    /// A real path could not be navigated on one record.
    #[error("sheet {sheet_name:?}, row {row_idx}, column {col_idx}: {source}")]
    FieldResolution {
        /// Declared sheet name.
        sheet_name: String,
        /// Zero-based record index.
        row_idx: usize,
        /// Zero-based column index.
        col_idx: usize,
        /// Underlying resolution failure.
        #[source]
        source: FieldResolutionError,
    },
    /// Sink/output failure.
    #[error("sink error{}: {source}", derive_sheet_suffix(.sheet_name))]
    Sink {
        /// Sheet being written, if any.
        sheet_name: Option<String>,
        /// Underlying sink failure.
        #[source]
        source: SinkError,
    },
}

fn derive_sheet_suffix(sheet_name: &Option<String>) -> String {
    sheet_name
        .as_ref()
        .map(|name| format!(" in sheet {name:?}"))
        .unwrap_or_default()
}

impl ReportError {
    pub(crate) fn sink(sheet_name: Option<&str>, source: SinkError) -> Self {
        Self::Sink {
            sheet_name: sheet_name.map(ToString::to_string),
            source,
        }
    }
}

/// Kind of a recoverable per-cell failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumCellErrorKind {
    /// Converter returned an error or panicked; the cell was left empty.
    Converter,
    /// Counter returned an error or panicked; the accumulator was kept.
    Counter,
}

impl fmt::Display for EnumCellErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converter => write!(f, "converter"),
            Self::Counter => write!(f, "counter"),
        }
    }
}

/// One recoverable per-cell failure collected during render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecCellError {
    /// Failing handler kind.
    pub kind: EnumCellErrorKind,
    /// Sheet name assigned by the sink, as in [`crate::SpecSheetReport`].
    pub sheet_name: String,
    /// Column key the handler is registered under.
    pub column_key: String,
    /// Zero-based column index.
    pub col_idx: usize,
    /// Zero-based record index.
    pub row_idx: usize,
    /// User-facing error text.
    pub message: String,
}

impl fmt::Display for SpecCellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error in sheet {:?}, column {:?} (#{}), row {}: {}",
            self.kind, self.sheet_name, self.column_key, self.col_idx, self.row_idx, self.message
        )
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_prefers_right_side_values() {
        let base = SpecCellFormat {
            font_name: Some("Arial".to_string()),
            bold: Some(false),
            ..Default::default()
        };
        let merged = base.merge(&SpecCellFormat {
            bold: Some(true),
            font_color: Some("#FF0000".to_string()),
            ..Default::default()
        });
        assert_eq!(merged.font_name.as_deref(), Some("Arial"));
        assert_eq!(merged.bold, Some(true));
        assert_eq!(merged.font_color.as_deref(), Some("#FF0000"));
    }

    #[test]
    fn cell_value_text_form() {
        let date = NaiveDate::from_ymd_opt(2020, 3, 1).expect("date");
        assert_eq!(EnumCellValue::None.to_string(), "");
        assert_eq!(EnumCellValue::Boolean(true).to_string(), "true");
        assert_eq!(EnumCellValue::Boolean(false).to_string(), "false");
        assert_eq!(EnumCellValue::from(42u8).to_string(), "42");
        assert_eq!(EnumCellValue::from(date).to_string(), "2020-03-01");
        assert_eq!(EnumCellValue::from(Option::<i32>::None), EnumCellValue::None);
        assert_eq!(EnumCellValue::from(u64::MAX).as_f64(), Some(u64::MAX as f64));
    }

    #[test]
    fn sink_error_names_sheet() {
        let err = ReportError::sink(Some("scores"), SinkError::Limit("too many rows".to_string()));
        assert_eq!(err.to_string(), "sink error in sheet \"scores\": too many rows");
    }
}
