//! Report constants and default preset factories.

use std::collections::BTreeMap;

use crate::spec::{SpecCellFormat, SpecReportWriteOptions};

/// Leading marker of a virtual column path (`#order`, `#countGrade`).
pub const C_VIRTUAL_MARKER: &str = "#";
/// Separator between property names in a real field path.
pub const C_PATH_SEPARATOR: char = '.';
/// Label written by the ordinal counter into the summary row.
pub const C_TOTAL_LABEL: &str = "Total";
/// `chrono` pattern used by the default date converter.
pub const C_DATE_FORMAT: &str = "%Y-%m-%d";
/// `chrono` pattern used when a datetime is rendered as text.
pub const C_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Excel worksheet maximum row count.
pub const N_NROWS_EXCEL_MAX: usize = 1_048_576;
/// Excel worksheet maximum column count.
pub const N_NCOLS_EXCEL_MAX: usize = 16_384;
/// Excel sheet name maximum length.
pub const N_LEN_EXCEL_SHEET_NAME_MAX: usize = 31;
/// Characters not allowed in sheet names.
pub const TUP_EXCEL_ILLEGAL: [&str; 7] = ["*", ":", "?", "/", "\\", "[", "]"];

/// Canonical format preset keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EnumFmtKey {
    /// Generic text cell format.
    Text,
    /// Integer number format.
    Integer,
    /// Decimal number format.
    Decimal,
    /// Date-only cell format.
    Date,
    /// Date and time cell format.
    DateTime,
    /// Column header format.
    Header,
    /// Merged title banner format.
    Title,
    /// Summary (counter) row format.
    Summary,
}

/// Build default format presets used by [`crate::writer::XlsxSheetSink`].
pub fn derive_default_report_formats() -> BTreeMap<EnumFmtKey, SpecCellFormat> {
    let cfg_base_fmt_spec = SpecCellFormat {
        font_name: Some("Times New Roman".to_string()),
        font_size: Some(11),
        border: Some(1),
        align: Some("left".to_string()),
        valign: Some("vcenter".to_string()),
        ..Default::default()
    };

    let mut dict_fmt = BTreeMap::new();
    dict_fmt.insert(EnumFmtKey::Text, cfg_base_fmt_spec.clone());
    dict_fmt.insert(
        EnumFmtKey::Integer,
        cfg_base_fmt_spec.with_(SpecCellFormat {
            num_format: Some("0".to_string()),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        EnumFmtKey::Decimal,
        cfg_base_fmt_spec.with_(SpecCellFormat {
            num_format: Some("0.00".to_string()),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        EnumFmtKey::Date,
        cfg_base_fmt_spec.with_(SpecCellFormat {
            num_format: Some("yyyy-mm-dd".to_string()),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        EnumFmtKey::DateTime,
        cfg_base_fmt_spec.with_(SpecCellFormat {
            num_format: Some("yyyy-mm-dd hh:mm:ss".to_string()),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        EnumFmtKey::Header,
        cfg_base_fmt_spec.with_(SpecCellFormat {
            bold: Some(true),
            align: Some("center".to_string()),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        EnumFmtKey::Title,
        cfg_base_fmt_spec.with_(SpecCellFormat {
            font_size: Some(16),
            bold: Some(true),
            align: Some("center".to_string()),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        EnumFmtKey::Summary,
        cfg_base_fmt_spec.with_(SpecCellFormat {
            bold: Some(true),
            ..Default::default()
        }),
    );

    dict_fmt
}

/// Build default write options.
pub fn derive_default_report_write_options() -> SpecReportWriteOptions {
    SpecReportWriteOptions::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_formats_cover_every_key() {
        let dict_fmt = derive_default_report_formats();
        for key in [
            EnumFmtKey::Text,
            EnumFmtKey::Integer,
            EnumFmtKey::Decimal,
            EnumFmtKey::Date,
            EnumFmtKey::DateTime,
            EnumFmtKey::Header,
            EnumFmtKey::Title,
            EnumFmtKey::Summary,
        ] {
            assert!(dict_fmt.contains_key(&key), "missing preset {key:?}");
        }
        assert_eq!(dict_fmt[&EnumFmtKey::Header].bold, Some(true));
        assert_eq!(
            dict_fmt[&EnumFmtKey::Integer].font_name.as_deref(),
            Some("Times New Roman")
        );
    }
}
