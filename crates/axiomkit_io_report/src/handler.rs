//! Per-column converters and counters, plus the built-in handlers.
//!
//! Both handler kinds receive the sheet context, the resolved value (the whole
//! record for virtual columns), the zero-based row index and the zero-based
//! column index. Failures, including panics, are reported as text so the
//! orchestrator can record them per cell.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::conf::{C_DATE_FORMAT, C_TOTAL_LABEL};
use crate::record::{EnumResolvedValue, Record};
use crate::spec::{BoxError, EnumCellValue, SpecSheetContext};
use crate::util::derive_panic_message;

type FnConvert<R> = dyn Fn(
        &SpecSheetContext<'_>,
        &EnumResolvedValue<'_, R>,
        usize,
        usize,
    ) -> Result<EnumCellValue, BoxError>
    + Send
    + Sync;

type FnFold<R> = dyn Fn(
        &SpecSheetContext<'_>,
        &EnumResolvedValue<'_, R>,
        usize,
        usize,
        Option<&(dyn Any + 'static)>,
    ) -> Result<Box<dyn Any>, BoxError>
    + Send
    + Sync;

type FnRender = dyn Fn(&(dyn Any + 'static)) -> EnumCellValue + Send + Sync;

////////////////////////////////////////////////////////////////////////////////
// #region Converter

/// Pure per-cell conversion from resolved value to display value.
pub struct Converter<R: ?Sized> {
    f_convert: Arc<FnConvert<R>>,
}

impl<R: ?Sized> Clone for Converter<R> {
    fn clone(&self) -> Self {
        Self {
            f_convert: Arc::clone(&self.f_convert),
        }
    }
}

impl<R: ?Sized> fmt::Debug for Converter<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Converter(..)")
    }
}

impl<R: Record + ?Sized> Converter<R> {
    /// Wrap a conversion function.
    pub fn new<F>(f_convert: F) -> Self
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
        Self {
            f_convert: Arc::new(f_convert),
        }
    }

    /// Run the converter; errors and panics come back as text.
    pub fn apply(
        &self,
        ctx: &SpecSheetContext<'_>,
        value: &EnumResolvedValue<'_, R>,
        row_idx: usize,
        col_idx: usize,
    ) -> Result<EnumCellValue, String> {
        match panic::catch_unwind(AssertUnwindSafe(|| {
            (self.f_convert)(ctx, value, row_idx, col_idx)
        })) {
            Ok(Ok(val)) => Ok(val),
            Ok(Err(err)) => Err(err.to_string()),
            Err(payload) => Err(derive_panic_message(payload)),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Counter

/// Stateful per-column fold producing one summary value.
///
/// The accumulator type is chosen by the counter; the engine only threads it
/// from row to row and renders the final value into the summary row.
pub struct Counter<R: ?Sized> {
    f_fold: Arc<FnFold<R>>,
    f_render: Arc<FnRender>,
}

impl<R: ?Sized> Clone for Counter<R> {
    fn clone(&self) -> Self {
        Self {
            f_fold: Arc::clone(&self.f_fold),
            f_render: Arc::clone(&self.f_render),
        }
    }
}

impl<R: ?Sized> fmt::Debug for Counter<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Counter(..)")
    }
}

impl<R: Record + ?Sized> Counter<R> {
    /// Counter whose summary cell is the accumulator's `Display` text.
    pub fn new<A, F>(f_fold: F) -> Self
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
        Self::with_render(f_fold, |acc: &A| EnumCellValue::String(acc.to_string()))
    }

    /// Counter with a custom accumulator-to-cell renderer.
    pub fn with_render<A, F, G>(f_fold: F, f_render: G) -> Self
    where
        A: 'static,
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
        G: Fn(&A) -> EnumCellValue + Send + Sync + 'static,
    {
        Self {
            f_fold: box_fold(move |ctx, value, row_idx, col_idx, acc| {
                let acc_typed = acc.and_then(|val| val.downcast_ref::<A>());
                f_fold(ctx, value, row_idx, col_idx, acc_typed)
                    .map(|val| Box::new(val) as Box<dyn Any>)
            }),
            f_render: Arc::new(move |acc: &(dyn Any + 'static)| {
                acc.downcast_ref::<A>()
                    .map_or(EnumCellValue::None, &f_render)
            }),
        }
    }

    /// Fold one row into `acc`; on error the caller keeps `acc` unchanged.
    pub fn fold(
        &self,
        ctx: &SpecSheetContext<'_>,
        value: &EnumResolvedValue<'_, R>,
        row_idx: usize,
        col_idx: usize,
        acc: Option<&(dyn Any + 'static)>,
    ) -> Result<Box<dyn Any>, String> {
        match panic::catch_unwind(AssertUnwindSafe(|| {
            (self.f_fold)(ctx, value, row_idx, col_idx, acc)
        })) {
            Ok(Ok(val)) => Ok(val),
            Ok(Err(err)) => Err(err.to_string()),
            Err(payload) => Err(derive_panic_message(payload)),
        }
    }

    /// Render the final accumulator; no accumulator means a blank cell.
    pub fn render(&self, acc: Option<&(dyn Any + 'static)>) -> EnumCellValue {
        acc.map_or(EnumCellValue::None, |val| (self.f_render)(val))
    }
}

fn box_fold<R: ?Sized, F>(f_fold: F) -> Arc<FnFold<R>>
where
    F: Fn(
            &SpecSheetContext<'_>,
            &EnumResolvedValue<'_, R>,
            usize,
            usize,
            Option<&(dyn Any + 'static)>,
        ) -> Result<Box<dyn Any>, BoxError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f_fold)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region BuiltinConverters

/// 1-based position of the record within the sheet.
pub fn order_converter<R: Record + ?Sized>() -> Converter<R> {
    Converter::new(|_, _, row_idx, _| Ok(EnumCellValue::from(row_idx + 1)))
}

/// Format date/datetime values as `yyyy-mm-dd` text.
pub fn date_converter<R: Record + ?Sized>() -> Converter<R> {
    date_converter_with_format(C_DATE_FORMAT)
}

/// Format date/datetime values with a `chrono` pattern.
///
/// Blank values stay blank; anything else is a conversion error.
pub fn date_converter_with_format<R: Record + ?Sized>(pattern: impl Into<String>) -> Converter<R> {
    let c_pattern: String = pattern.into();
    Converter::new(move |_, value, _, _| {
        let mut c_text = String::new();
        let res_write = match value.value() {
            Some(EnumCellValue::None) => return Ok(EnumCellValue::None),
            Some(EnumCellValue::Date(val)) => write!(c_text, "{}", val.format(&c_pattern)),
            Some(EnumCellValue::DateTime(val)) => write!(c_text, "{}", val.format(&c_pattern)),
            Some(other) => return Err(format!("expected a date, got {other:?}").into()),
            None => return Err("expected a date, got a record".into()),
        };
        res_write.map_err(|_| format!("invalid date pattern {c_pattern:?}"))?;
        Ok(EnumCellValue::String(c_text))
    })
}

/// Map a value's text form to a display value; unmatched values render blank.
///
/// Keys and looked-up values share the cell text form, so `true`, `3` and
/// `3.0` match their typed counterparts.
pub fn map_converter<R, K, V, I>(pairs: I) -> Converter<R>
where
    R: Record + ?Sized,
    K: Into<EnumCellValue>,
    V: Into<EnumCellValue>,
    I: IntoIterator<Item = (K, V)>,
{
    let dict_mapping: BTreeMap<String, EnumCellValue> = pairs
        .into_iter()
        .map(|(key, val)| (key.into().to_string(), val.into()))
        .collect();
    Converter::new(move |_, value, _, _| {
        Ok(dict_mapping
            .get(&value.to_cell_value().to_string())
            .cloned()
            .unwrap_or_default())
    })
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region BuiltinCounters

/// Companion of [`order_converter`]: writes the total label in the summary row.
pub fn order_counter<R: Record + ?Sized>() -> Counter<R> {
    order_counter_with_label(C_TOTAL_LABEL)
}

/// Like [`order_counter`] with a custom label.
pub fn order_counter_with_label<R: Record + ?Sized>(label: impl Into<String>) -> Counter<R> {
    let c_label: String = label.into();
    Counter::with_render(
        |_, _, _, _, _: Option<&()>| Ok(()),
        move |_: &()| EnumCellValue::String(c_label.clone()),
    )
}

/// Count rows whose resolved value satisfies `predicate`.
pub fn count_if_counter<R, P>(predicate: P) -> Counter<R>
where
    R: Record + ?Sized,
    P: Fn(&EnumResolvedValue<'_, R>) -> bool + Send + Sync + 'static,
{
    Counter::with_render(
        move |_, value, _, _, acc: Option<&i64>| {
            let n_count = acc.copied().unwrap_or(0);
            Ok(if predicate(value) { n_count + 1 } else { n_count })
        },
        |acc: &i64| EnumCellValue::Integer(*acc),
    )
}

/// Sum numeric values; integers stay exact until a float shows up.
///
/// Blank values are skipped; non-numeric values are counter errors.
pub fn sum_counter<R: Record + ?Sized>() -> Counter<R> {
    Counter::with_render(
        |_, value, _, _, acc: Option<&EnumCellValue>| {
            let acc = acc.cloned().unwrap_or(EnumCellValue::Integer(0));
            let value = value.to_cell_value();
            match (&acc, &value) {
                (_, EnumCellValue::None) => Ok(acc),
                (EnumCellValue::Integer(lhs), EnumCellValue::Integer(rhs)) => Ok(lhs
                    .checked_add(*rhs)
                    .map_or(EnumCellValue::Number(*lhs as f64 + *rhs as f64), EnumCellValue::Integer)),
                _ => match (acc.as_f64(), value.as_f64()) {
                    (Some(lhs), Some(rhs)) => Ok(EnumCellValue::Number(lhs + rhs)),
                    _ => Err(format!("cannot sum non-numeric value {value:?}").into()),
                },
            }
        },
        |acc: &EnumCellValue| acc.clone(),
    )
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
