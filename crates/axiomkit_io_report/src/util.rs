//! Stateless helper utilities used by the renderer and sinks.

use std::any::Any;
use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime, Timelike};

use crate::conf::{N_LEN_EXCEL_SHEET_NAME_MAX, TUP_EXCEL_ILLEGAL};
use crate::spec::{EnumAutofitColumnsRule, EnumCellValue, SinkError, SpecAutofitCellsPolicy};

////////////////////////////////////////////////////////////////////////////////
// #region SheetNormalization

/// Replace invalid chars and trim to valid Excel sheet name.
pub fn sanitize_sheet_name(name: &str, replace_to: &str) -> String {
    let mut c_name = name.to_string();
    for c_illegal in TUP_EXCEL_ILLEGAL {
        c_name = c_name.replace(c_illegal, replace_to);
    }
    c_name = c_name.trim().trim_matches('\'').to_string();
    if c_name.is_empty() {
        c_name = "Sheet".to_string();
    }

    c_name.chars().take(N_LEN_EXCEL_SHEET_NAME_MAX).collect()
}

/// Pick a name not yet in `names_existing` (`base`, `base__2`, ...) and record it.
///
/// Excel compares sheet names case-insensitively, so the set holds lowercase keys.
pub fn derive_unique_sheet_name(names_existing: &mut BTreeSet<String>, name: &str) -> String {
    if names_existing.insert(name.to_lowercase()) {
        return name.to_string();
    }

    let base_name: String = name
        .chars()
        .take(usize::max(1, N_LEN_EXCEL_SHEET_NAME_MAX - 3))
        .collect();

    let mut n_idx = 2usize;
    loop {
        let candidate: String = format!("{base_name}__{n_idx}")
            .chars()
            .take(N_LEN_EXCEL_SHEET_NAME_MAX)
            .collect();
        if names_existing.insert(candidate.to_lowercase()) {
            return candidate;
        }
        n_idx += 1;
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Autofit

/// Estimate displayed width units for one rendered cell value.
pub fn estimate_width_len(value: &EnumCellValue) -> usize {
    match value {
        EnumCellValue::None => 0,
        EnumCellValue::Boolean(val) => if *val { 4 } else { 5 },
        EnumCellValue::Integer(val) => val.to_string().len(),
        EnumCellValue::Number(val) => format!("{val:.2}").len(),
        EnumCellValue::String(val) => estimate_unicode_string_width(val),
        EnumCellValue::Date(_) => 10,
        EnumCellValue::DateTime(_) => 19,
    }
}

/// ASCII counts one unit, everything else 1.6 units.
pub fn estimate_unicode_string_width(s: &str) -> usize {
    let n_ascii = s.chars().filter(|chr| chr.is_ascii()).count();
    let n_non_ascii = s.chars().count().saturating_sub(n_ascii);
    n_ascii + (n_non_ascii as f64 * 1.6).round() as usize
}

/// Final column width from recorded header/body widths and the autofit policy.
///
/// Returns `None` when autofit is disabled.
pub fn calculate_autofit_width(
    policy: &SpecAutofitCellsPolicy,
    width_header: usize,
    width_body: usize,
) -> Option<f64> {
    let n_width_recorded = match policy.rule_columns {
        EnumAutofitColumnsRule::None => return None,
        EnumAutofitColumnsRule::Header => width_header,
        EnumAutofitColumnsRule::Body => width_body,
        EnumAutofitColumnsRule::All => usize::max(width_header, width_body),
    };
    let n_min = usize::max(1, policy.width_cell_min);
    let n_max = usize::min(255, usize::max(n_min, policy.width_cell_max));
    let n_width_final = usize::min(
        n_max,
        usize::max(n_min, n_width_recorded + policy.width_cell_padding),
    );
    Some(n_width_final as f64)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CellValueConversion

/// Days since the Excel epoch (1899-12-30).
pub fn convert_date_to_excel_serial(date: &NaiveDate) -> f64 {
    let date_epoch = NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or(NaiveDate::MIN);
    (*date - date_epoch).num_days() as f64
}

/// Excel serial with the time of day as fractional days.
pub fn convert_datetime_to_excel_serial(datetime: &NaiveDateTime) -> f64 {
    let n_secs = datetime.num_seconds_from_midnight() as f64
        + f64::from(datetime.nanosecond() % 1_000_000_000) / 1e9;
    convert_date_to_excel_serial(&datetime.date()) + n_secs / 86_400.0
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Misc

pub(crate) fn cast_row_num(value: usize) -> Result<u32, SinkError> {
    u32::try_from(value).map_err(|_| SinkError::Limit(format!("row index overflow: {value}")))
}

pub(crate) fn cast_col_num(value: usize) -> Result<u16, SinkError> {
    u16::try_from(value).map_err(|_| SinkError::Limit(format!("column index overflow: {value}")))
}

/// Calculate worker count for parallel sheet rendering.
pub(crate) fn calculate_worker_limit(num_workers_max: Option<usize>) -> usize {
    let n_cpu = std::thread::available_parallelism()
        .map(|v| v.get())
        .unwrap_or(1);

    match num_workers_max {
        Some(n) => n.clamp(1, n_cpu),
        None => n_cpu.clamp(1, 8),
    }
}

/// Text of a caught panic payload.
pub(crate) fn derive_panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(val) = payload.downcast_ref::<&str>() {
        return format!("panicked: {val}");
    }
    if let Some(val) = payload.downcast_ref::<String>() {
        return format!("panicked: {val}");
    }
    "panicked".to_string()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_sheet_name_replaces_and_truncates() {
        assert_eq!(sanitize_sheet_name("a/b:c", "_"), "a_b_c");
        assert_eq!(sanitize_sheet_name("   ", "_"), "Sheet");
        assert_eq!(sanitize_sheet_name(&"x".repeat(40), "_").len(), 31);
    }

    #[test]
    fn test_derive_unique_sheet_name_is_case_insensitive() {
        let mut set_names = BTreeSet::new();
        assert_eq!(derive_unique_sheet_name(&mut set_names, "Data"), "Data");
        assert_eq!(derive_unique_sheet_name(&mut set_names, "data"), "data__2");
        assert_eq!(derive_unique_sheet_name(&mut set_names, "Data"), "Data__3");
    }

    #[test]
    fn test_calculate_autofit_width_clamps() {
        let policy = SpecAutofitCellsPolicy::default();
        assert_eq!(calculate_autofit_width(&policy, 3, 0), Some(8.0));
        assert_eq!(calculate_autofit_width(&policy, 10, 20), Some(22.0));
        assert_eq!(calculate_autofit_width(&policy, 100, 0), Some(60.0));

        let policy = SpecAutofitCellsPolicy {
            rule_columns: EnumAutofitColumnsRule::None,
            ..Default::default()
        };
        assert_eq!(calculate_autofit_width(&policy, 10, 10), None);
    }

    #[test]
    fn test_excel_serial_dates() {
        let date = NaiveDate::from_ymd_opt(1900, 3, 1).expect("date");
        assert_eq!(convert_date_to_excel_serial(&date), 61.0);

        let dt = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .expect("datetime");
        assert_eq!(convert_datetime_to_excel_serial(&dt), 45292.5);
    }

    #[test]
    fn test_estimate_unicode_string_width() {
        assert_eq!(estimate_unicode_string_width("abc"), 3);
        assert_eq!(estimate_unicode_string_width("中文"), 3);
    }
}
