//! `axiomkit_io_report` v1:
//! Record-to-workbook report rendering kernel.
//!
//! Callers declare sheets over arbitrary records (columns as field paths,
//! per-column converters and counters, an optional style hook) and render
//! them into a sheet sink.
//!
//! Modules:
//! - `conf`    : constants and default presets
//! - `spec`    : specs/models/options/errors
//! - `record`  : record access and field path resolution
//! - `handler` : converters, counters and built-in handlers
//! - `sheet`   : sheet descriptor and style hook
//! - `sink`    : sink contract and in-memory sink
//! - `writer`  : xlsx sink
//! - `render`  : render orchestration
//! - `report`  : render report
//! - `util`    : pure helper functions
pub mod conf;
pub mod handler;
pub mod record;
pub mod render;
pub mod report;
pub mod sheet;
pub mod sink;
pub mod spec;
pub mod util;
pub mod writer;

pub use conf::{
    C_TOTAL_LABEL, C_VIRTUAL_MARKER, EnumFmtKey, N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX,
    N_NROWS_EXCEL_MAX, derive_default_report_formats, derive_default_report_write_options,
};
pub use handler::{
    Converter, Counter, count_if_counter, date_converter, date_converter_with_format,
    map_converter, order_converter, order_counter, order_counter_with_label, sum_counter,
};
pub use record::{EnumFieldPath, EnumPropertyValue, EnumResolvedValue, Record, resolve};
pub use render::{ReportRenderer, write_sheet, write_sheets, write_sheets_parallel};
pub use report::{ReportRender, ReportRenderBuilder, SpecSheetReport};
pub use sheet::{SheetInfo, SheetStyle};
pub use sink::{EnumRowKind, MemorySheetSink, SheetSink, SpecBufferedRow, SpecBufferedSheet};
pub use spec::{
    BoxError, EnumAutofitColumnsRule, EnumCellErrorKind, EnumCellValue, FieldResolutionError,
    ReportError, SinkError, SpecAutofitCellsPolicy, SpecCellError, SpecCellFormat,
    SpecRenderedCell, SpecReportWriteOptions, SpecSheetContext,
};
pub use writer::XlsxSheetSink;
