//! Record access and field path resolution.
//!
//! A record exposes named properties through [`Record::get_property`]. A
//! column's field path is parsed once into [`EnumFieldPath`]:
//! - `grade.mathGrade` is a real path, navigated property by property,
//! - `#order` is a virtual path, resolving to the whole record.

use std::collections::BTreeMap;
use std::fmt;

use crate::conf::{C_PATH_SEPARATOR, C_VIRTUAL_MARKER};
use crate::spec::{EnumCellValue, FieldResolutionError, ReportError};

////////////////////////////////////////////////////////////////////////////////
// #region RecordAccess

/// Property read off a record: a scalar value or a nested record.
pub enum EnumPropertyValue<'a> {
    /// Scalar value; `EnumCellValue::None` stands for a present-but-null property.
    Value(EnumCellValue),
    /// Nested record that further path segments can navigate into.
    Record(&'a dyn Record),
}

impl<T: Into<EnumCellValue>> From<T> for EnumPropertyValue<'_> {
    fn from(value: T) -> Self {
        Self::Value(value.into())
    }
}

impl fmt::Debug for EnumPropertyValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(val) => f.debug_tuple("Value").field(val).finish(),
            Self::Record(_) => f.write_str("Record(..)"),
        }
    }
}

/// Capability interface for reading named properties off a record.
///
/// Implement it per record type; return `None` for names the type does not have.
pub trait Record {
    /// Read property `name`, or `None` when the record has no such property.
    fn get_property(&self, name: &str) -> Option<EnumPropertyValue<'_>>;

    /// Text written when the record itself lands in a cell without a converter.
    fn to_cell_text(&self) -> String {
        String::new()
    }
}

impl<T: Record + ?Sized> Record for &T {
    fn get_property(&self, name: &str) -> Option<EnumPropertyValue<'_>> {
        (**self).get_property(name)
    }

    fn to_cell_text(&self) -> String {
        (**self).to_cell_text()
    }
}

impl<T: Record + ?Sized> Record for Box<T> {
    fn get_property(&self, name: &str) -> Option<EnumPropertyValue<'_>> {
        (**self).get_property(name)
    }

    fn to_cell_text(&self) -> String {
        (**self).to_cell_text()
    }
}

impl Record for BTreeMap<String, EnumCellValue> {
    fn get_property(&self, name: &str) -> Option<EnumPropertyValue<'_>> {
        self.get(name).cloned().map(EnumPropertyValue::Value)
    }
}

impl Record for serde_json::Value {
    fn get_property(&self, name: &str) -> Option<EnumPropertyValue<'_>> {
        let serde_json::Value::Object(dict_fields) = self else {
            return None;
        };
        dict_fields.get(name).map(derive_property_from_json)
    }

    fn to_cell_text(&self) -> String {
        self.to_string()
    }
}

fn derive_property_from_json(value: &serde_json::Value) -> EnumPropertyValue<'_> {
    match value {
        serde_json::Value::Null => EnumPropertyValue::Value(EnumCellValue::None),
        serde_json::Value::Bool(val) => EnumPropertyValue::Value(EnumCellValue::Boolean(*val)),
        serde_json::Value::Number(val) => match val.as_i64() {
            Some(n) => EnumPropertyValue::Value(EnumCellValue::Integer(n)),
            None => EnumPropertyValue::Value(
                val.as_f64()
                    .map_or(EnumCellValue::None, EnumCellValue::Number),
            ),
        },
        serde_json::Value::String(val) => {
            EnumPropertyValue::Value(EnumCellValue::String(val.clone()))
        }
        serde_json::Value::Array(_) => {
            EnumPropertyValue::Value(EnumCellValue::String(value.to_string()))
        }
        serde_json::Value::Object(_) => EnumPropertyValue::Record(value),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ResolvedValue

/// Outcome of resolving a field path against one record.
pub enum EnumResolvedValue<'r, R: ?Sized> {
    /// Scalar reached by a real path.
    Value(EnumCellValue),
    /// Nested record reached by a real path.
    Nested(&'r dyn Record),
    /// Whole record, for virtual paths.
    WholeRecord(&'r R),
}

impl<'r, R: Record + ?Sized> EnumResolvedValue<'r, R> {
    /// Scalar value, if the path reached one.
    pub fn value(&self) -> Option<&EnumCellValue> {
        match self {
            Self::Value(val) => Some(val),
            _ => None,
        }
    }

    /// Whole record passed to a virtual column.
    pub fn record(&self) -> Option<&'r R> {
        match self {
            Self::WholeRecord(record) => Some(*record),
            _ => None,
        }
    }

    /// `true` when this value came from a virtual path.
    pub fn is_virtual(&self) -> bool {
        matches!(self, Self::WholeRecord(_))
    }

    /// Identity conversion used for columns without a converter.
    pub fn to_cell_value(&self) -> EnumCellValue {
        let c_text = match self {
            Self::Value(val) => return val.clone(),
            Self::Nested(record) => record.to_cell_text(),
            Self::WholeRecord(record) => record.to_cell_text(),
        };
        if c_text.is_empty() {
            EnumCellValue::None
        } else {
            EnumCellValue::String(c_text)
        }
    }
}

impl<R: ?Sized> Clone for EnumResolvedValue<'_, R> {
    fn clone(&self) -> Self {
        match self {
            Self::Value(val) => Self::Value(val.clone()),
            Self::Nested(record) => Self::Nested(*record),
            Self::WholeRecord(record) => Self::WholeRecord(*record),
        }
    }
}

impl<R: ?Sized> fmt::Debug for EnumResolvedValue<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(val) => f.debug_tuple("Value").field(val).finish(),
            Self::Nested(_) => f.write_str("Nested(..)"),
            Self::WholeRecord(_) => f.write_str("WholeRecord(..)"),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region FieldPath

/// Parsed column field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumFieldPath {
    /// `#name` token; resolves to the whole record.
    Virtual {
        /// Raw path string (column key).
        path: String,
    },
    /// Dotted property path.
    Real {
        /// Raw path string (column key).
        path: String,
        /// Property names, in navigation order.
        segments: Vec<String>,
    },
}

impl EnumFieldPath {
    /// Parse a raw field path.
    ///
    /// Rejects empty paths, empty segments (`a..b`) and a bare virtual marker.
    pub fn parse(path: &str) -> Result<Self, ReportError> {
        Self::parse_raw(path).map_err(|message| ReportError::InvalidFieldPath {
            path: path.to_string(),
            message: message.to_string(),
        })
    }

    fn parse_raw(path: &str) -> Result<Self, &'static str> {
        if path.is_empty() {
            return Err("path is empty");
        }

        let l_segments: Vec<&str> = path.split(C_PATH_SEPARATOR).collect();
        if let Some(c_name) = l_segments[0].strip_prefix(C_VIRTUAL_MARKER) {
            if c_name.is_empty() {
                return Err("virtual column needs a name after the marker");
            }
            return Ok(Self::Virtual {
                path: path.to_string(),
            });
        }

        if l_segments.iter().any(|c_segment| c_segment.is_empty()) {
            return Err("path contains an empty segment");
        }

        Ok(Self::Real {
            path: path.to_string(),
            segments: l_segments.into_iter().map(ToString::to_string).collect(),
        })
    }

    /// Raw path string, used as the column key.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Virtual { path } | Self::Real { path, .. } => path,
        }
    }

    /// `true` for `#name` paths.
    pub fn is_virtual(&self) -> bool {
        matches!(self, Self::Virtual { .. })
    }

    /// Resolve this path against `record`.
    pub fn resolve<'r, R: Record + ?Sized>(
        &self,
        record: &'r R,
    ) -> Result<EnumResolvedValue<'r, R>, FieldResolutionError> {
        match self {
            Self::Virtual { .. } => Ok(EnumResolvedValue::WholeRecord(record)),
            Self::Real { path, segments } => navigate_segments(record, path, segments),
        }
    }
}

impl fmt::Display for EnumFieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse `path` and resolve it against `record`.
///
/// Paths rejected by [`EnumFieldPath::parse`] fail with
/// [`FieldResolutionError::InvalidPath`].
pub fn resolve<'r, R: Record + ?Sized>(
    record: &'r R,
    path: &str,
) -> Result<EnumResolvedValue<'r, R>, FieldResolutionError> {
    EnumFieldPath::parse_raw(path)
        .map_err(|message| FieldResolutionError::InvalidPath {
            path: path.to_string(),
            message: message.to_string(),
        })?
        .resolve(record)
}

fn navigate_segments<'r, R, S>(
    record: &'r R,
    path: &str,
    segments: &[S],
) -> Result<EnumResolvedValue<'r, R>, FieldResolutionError>
where
    R: Record + ?Sized,
    S: AsRef<str>,
{
    let derive_missing = |segment: &str| FieldResolutionError::MissingProperty {
        path: path.to_string(),
        segment: segment.to_string(),
    };

    let Some((c_segment_first, l_segments_rest)) = segments.split_first() else {
        return Err(derive_missing(""));
    };

    let mut property = record
        .get_property(c_segment_first.as_ref())
        .ok_or_else(|| derive_missing(c_segment_first.as_ref()))?;

    for c_segment in l_segments_rest {
        let c_segment = c_segment.as_ref();
        let EnumPropertyValue::Record(record_nested) = property else {
            return Err(FieldResolutionError::NotRecord {
                path: path.to_string(),
                segment: c_segment.to_string(),
            });
        };
        property = record_nested
            .get_property(c_segment)
            .ok_or_else(|| derive_missing(c_segment))?;
    }

    Ok(match property {
        EnumPropertyValue::Value(val) => EnumResolvedValue::Value(val),
        EnumPropertyValue::Record(record_nested) => EnumResolvedValue::Nested(record_nested),
    })
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    struct Grade {
        math: i32,
    }

    impl Record for Grade {
        fn get_property(&self, name: &str) -> Option<EnumPropertyValue<'_>> {
            match name {
                "math" => Some(self.math.into()),
                _ => None,
            }
        }

        fn to_cell_text(&self) -> String {
            format!("math={}", self.math)
        }
    }

    struct Student {
        name: String,
        nickname: Option<String>,
        grade: Grade,
    }

    impl Record for Student {
        fn get_property(&self, name: &str) -> Option<EnumPropertyValue<'_>> {
            match name {
                "name" => Some((&self.name).into()),
                "nickname" => Some(self.nickname.clone().into()),
                "grade" => Some(EnumPropertyValue::Record(&self.grade)),
                _ => None,
            }
        }
    }

    fn make_student() -> Student {
        Student {
            name: "Ann".to_string(),
            nickname: None,
            grade: Grade { math: 91 },
        }
    }

    #[test]
    fn parse_classifies_virtual_and_real_paths() {
        assert!(EnumFieldPath::parse("#order").expect("parse").is_virtual());
        assert_eq!(
            EnumFieldPath::parse("grade.math").expect("parse"),
            EnumFieldPath::Real {
                path: "grade.math".to_string(),
                segments: vec!["grade".to_string(), "math".to_string()],
            }
        );
        assert!(EnumFieldPath::parse("").is_err());
        assert!(EnumFieldPath::parse("grade..math").is_err());
        assert!(EnumFieldPath::parse("#").is_err());
    }

    #[test]
    fn real_path_reaches_nested_value() {
        let student = make_student();
        let path = EnumFieldPath::parse("grade.math").expect("parse");
        let resolved = path.resolve(&student).expect("resolve");
        assert_eq!(resolved.value(), Some(&EnumCellValue::Integer(91)));
        assert!(!resolved.is_virtual());
    }

    #[test]
    fn null_terminal_is_empty_not_error() {
        let student = make_student();
        let resolved = resolve(&student, "nickname").expect("resolve");
        assert_eq!(resolved.value(), Some(&EnumCellValue::None));
    }

    #[test]
    fn missing_segment_is_named() {
        let student = make_student();
        let err = resolve(&student, "grade.physics").expect_err("missing");
        assert_eq!(err.segment(), "physics");
        assert!(matches!(err, FieldResolutionError::MissingProperty { .. }));
    }

    #[test]
    fn scalar_parent_is_not_a_record() {
        let student = make_student();
        let err = resolve(&student, "name.first").expect_err("not record");
        assert_eq!(
            err,
            FieldResolutionError::NotRecord {
                path: "name.first".to_string(),
                segment: "first".to_string(),
            }
        );
    }

    #[test]
    fn virtual_path_returns_whole_record_without_navigation() {
        let student = make_student();
        let resolved = resolve(&student, "#doesNotExist.either").expect("resolve");
        let record = resolved.record().expect("whole record");
        assert!(std::ptr::eq(record, &student));
    }

    #[test]
    fn resolve_rejects_what_parse_rejects() {
        let student = make_student();
        for c_path in ["#", "", "grade..math"] {
            assert!(EnumFieldPath::parse(c_path).is_err());
            let err = resolve(&student, c_path).expect_err("invalid path");
            assert!(matches!(err, FieldResolutionError::InvalidPath { .. }));
            assert_eq!(err.segment(), c_path);
        }
    }

    #[test]
    fn nested_record_terminal_uses_record_text() {
        let student = make_student();
        let resolved = resolve(&student, "grade").expect("resolve");
        assert_eq!(
            resolved.to_cell_value(),
            EnumCellValue::String("math=91".to_string())
        );
    }

    #[test]
    fn json_values_are_records() {
        let record = serde_json::json!({
            "name": "Bo",
            "grade": {"math": 70, "ratio": 0.5},
            "tags": ["a"],
            "missing": null
        });
        assert_eq!(
            resolve(&record, "grade.math").expect("math").value(),
            Some(&EnumCellValue::Integer(70))
        );
        assert_eq!(
            resolve(&record, "grade.ratio").expect("ratio").value(),
            Some(&EnumCellValue::Number(0.5))
        );
        assert_eq!(
            resolve(&record, "missing").expect("null").value(),
            Some(&EnumCellValue::None)
        );
        assert!(resolve(&record, "tags.first").is_err());
        assert!(resolve(&record, "grade.english").is_err());
    }
}
