//! Render report models and mutable report builder.

use std::collections::BTreeMap;
use std::fmt;

use crate::spec::{EnumCellErrorKind, SpecCellError};

/// One rendered sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSheetReport {
    /// Name assigned by the sink (after sanitization/dedup).
    pub sheet_name: String,
    /// Number of data rows written.
    pub n_rows: usize,
    /// Number of columns written.
    pub n_cols: usize,
}

/// Outcome of one render call.
#[derive(Debug, Default, Clone)]
pub struct ReportRender {
    /// Sheets in output order.
    pub sheets: Vec<SpecSheetReport>,
    /// Non-fatal notes (renamed sheets, serial fallback).
    pub warnings: Vec<String>,
    /// Recoverable per-cell failures.
    pub errors: Vec<SpecCellError>,
}

impl ReportRender {
    /// Number of collected cell errors.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Number of collected warnings.
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Number of data rows across sheets.
    pub fn row_count(&self) -> usize {
        self.sheets.iter().map(|sheet| sheet.n_rows).sum()
    }

    /// Cell errors raised in `sheet_name`.
    pub fn errors_in(&self, sheet_name: &str) -> impl Iterator<Item = &SpecCellError> {
        self.errors
            .iter()
            .filter(move |err| err.sheet_name == sheet_name)
    }

    /// Machine-readable counters.
    pub fn to_dict(&self) -> BTreeMap<String, u64> {
        let n_errors_converter = self
            .errors
            .iter()
            .filter(|err| err.kind == EnumCellErrorKind::Converter)
            .count();

        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_sheets".to_string(), self.sheets.len() as u64);
        dict_counts.insert("cnt_rows".to_string(), self.row_count() as u64);
        dict_counts.insert("cnt_errors".to_string(), self.error_count() as u64);
        dict_counts.insert(
            "cnt_errors_converter".to_string(),
            n_errors_converter as u64,
        );
        dict_counts.insert(
            "cnt_errors_counter".to_string(),
            (self.error_count() - n_errors_converter) as u64,
        );
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        let dict_counts = self.to_dict();
        format!(
            "{prefix} sheets={} rows={} errors={} warnings={}",
            dict_counts["cnt_sheets"],
            dict_counts["cnt_rows"],
            dict_counts["cnt_errors"],
            dict_counts["cnt_warnings"]
        )
    }
}

impl fmt::Display for ReportRender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[REPORT]"))
    }
}

/// Mutable accumulator for render statistics.
#[derive(Debug, Default, Clone)]
pub struct ReportRenderBuilder {
    /// See [`ReportRender::sheets`].
    pub sheets: Vec<SpecSheetReport>,
    /// See [`ReportRender::warnings`].
    pub warnings: Vec<String>,
    /// See [`ReportRender::errors`].
    pub errors: Vec<SpecCellError>,
}

impl ReportRenderBuilder {
    /// Record a finished sheet.
    pub fn add_sheet(&mut self, sheet_name: String, n_rows: usize, n_cols: usize) {
        self.sheets.push(SpecSheetReport {
            sheet_name,
            n_rows,
            n_cols,
        });
    }

    /// Add warning message.
    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Add one cell-scoped error.
    pub fn add_error(&mut self, error: SpecCellError) {
        self.errors.push(error);
    }

    /// Append another builder's content, keeping order.
    pub fn extend(&mut self, other: ReportRenderBuilder) {
        self.sheets.extend(other.sheets);
        self.warnings.extend(other.warnings);
        self.errors.extend(other.errors);
    }

    /// Finalize builder into immutable report.
    pub fn build(self) -> ReportRender {
        ReportRender {
            sheets: self.sheets,
            warnings: self.warnings,
            errors: self.errors,
        }
    }
}
