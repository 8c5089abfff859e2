//! Render orchestration: sheets in, rows out.
//!
//! Each sheet goes through `(title) -> header -> data rows -> summary`. Data
//! rows are produced one at a time into a reused row buffer, so memory stays
//! proportional to the column count whatever the record count.

use std::any::Any;
use std::io::Write;

use log::{debug, info, warn};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::handler::{Converter, Counter};
use crate::record::Record;
use crate::report::{ReportRender, ReportRenderBuilder};
use crate::sheet::SheetInfo;
use crate::sink::{MemorySheetSink, SheetSink};
use crate::spec::{
    EnumCellErrorKind, EnumCellValue, ReportError, SinkError, SpecCellError, SpecRenderedCell,
    SpecReportWriteOptions,
};
use crate::util::calculate_worker_limit;

////////////////////////////////////////////////////////////////////////////////
// #region Renderer

/// Stateful renderer writing sheets into one sink.
///
/// Sheets may bind different record types; call [`Self::render_sheet`] once
/// per sheet in output order, then [`Self::finish`].
pub struct ReportRenderer<'s, S: SheetSink + ?Sized> {
    sink: &'s mut S,
    write_options: SpecReportWriteOptions,
    builder: ReportRenderBuilder,
}

impl<'s, S: SheetSink + ?Sized> ReportRenderer<'s, S> {
    /// Renderer with default options.
    pub fn new(sink: &'s mut S) -> Self {
        Self::with_options(sink, SpecReportWriteOptions::default())
    }

    /// Renderer with custom options.
    pub fn with_options(sink: &'s mut S, write_options: SpecReportWriteOptions) -> Self {
        Self {
            sink,
            write_options,
            builder: ReportRenderBuilder::default(),
        }
    }

    /// Render one sheet into the sink.
    pub fn render_sheet<R: Record>(&mut self, sheet: &SheetInfo<'_, R>) -> Result<&mut Self, ReportError> {
        render_sheet_into(&mut *self.sink, sheet, &self.write_options, &mut self.builder)?;
        Ok(self)
    }

    /// Finalize the sink into `writer` and return the report.
    pub fn finish(self, writer: &mut dyn Write) -> Result<ReportRender, ReportError> {
        self.sink
            .finalize(writer)
            .map_err(|source| ReportError::sink(None, source))?;
        let report = self.builder.build();
        info!("{report}");
        Ok(report)
    }

    /// Return the report without finalizing the sink.
    pub fn into_report(self) -> ReportRender {
        self.builder.build()
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region EntryPoints

/// Render one sheet and finalize the sink into `writer`.
pub fn write_sheet<S, R>(
    sink: &mut S,
    sheet: &SheetInfo<'_, R>,
    writer: &mut dyn Write,
) -> Result<ReportRender, ReportError>
where
    S: SheetSink + ?Sized,
    R: Record,
{
    write_sheets(sink, std::slice::from_ref(sheet), writer)
}

/// Render sheets in order and finalize the sink into `writer`.
pub fn write_sheets<S, R>(
    sink: &mut S,
    sheets: &[SheetInfo<'_, R>],
    writer: &mut dyn Write,
) -> Result<ReportRender, ReportError>
where
    S: SheetSink + ?Sized,
    R: Record,
{
    let mut renderer = ReportRenderer::new(sink);
    for sheet in sheets {
        renderer.render_sheet(sheet)?;
    }
    renderer.finish(writer)
}

/// Render sheets on a worker pool, then write them into `sink` in order.
///
/// Each sheet is rendered into its own [`MemorySheetSink`]; the buffers are
/// replayed sequentially, so the output matches [`write_sheets`]. Falls back to
/// serial rendering when the pool cannot be built.
pub fn write_sheets_parallel<S, R>(
    sink: &mut S,
    sheets: &[SheetInfo<'_, R>],
    writer: &mut dyn Write,
    write_options: &SpecReportWriteOptions,
) -> Result<ReportRender, ReportError>
where
    S: SheetSink + ?Sized,
    R: Record + Sync,
{
    let n_workers_max = calculate_worker_limit(write_options.num_workers_max);

    let render_buffered = |sheet: &SheetInfo<'_, R>| {
        let mut sink_buffer = MemorySheetSink::new();
        let mut builder_sheet = ReportRenderBuilder::default();
        render_sheet_into(&mut sink_buffer, sheet, write_options, &mut builder_sheet)?;
        Ok::<_, ReportError>((sink_buffer, builder_sheet))
    };

    let mut builder = ReportRenderBuilder::default();
    let l_results: Vec<Result<(MemorySheetSink, ReportRenderBuilder), ReportError>> =
        match ThreadPoolBuilder::new().num_threads(n_workers_max).build() {
            Ok(thread_pool) => {
                debug!("rendering {} sheets on {n_workers_max} workers", sheets.len());
                thread_pool.install(|| sheets.par_iter().map(render_buffered).collect())
            }
            Err(err) => {
                let c_warning = format!(
                    "Failed to initialize thread pool (workers={n_workers_max}); fallback to serial render ({err})."
                );
                warn!("{c_warning}");
                builder.add_warning(c_warning);
                sheets.iter().map(render_buffered).collect()
            }
        };

    for res_sheet in l_results {
        let (sink_buffer, mut builder_sheet) = res_sheet?;
        let l_names = sink_buffer
            .replay_into(sink)
            .map_err(|source| ReportError::sink(None, source))?;
        for (spec_sheet, c_name) in builder_sheet.sheets.iter_mut().zip(l_names) {
            for err in builder_sheet
                .errors
                .iter_mut()
                .filter(|err| err.sheet_name == spec_sheet.sheet_name)
            {
                err.sheet_name.clone_from(&c_name);
            }
            spec_sheet.sheet_name = c_name;
        }
        builder.extend(builder_sheet);
        for c_warning in sink.take_warnings() {
            builder.add_warning(c_warning);
        }
    }

    sink.finalize(writer)
        .map_err(|source| ReportError::sink(None, source))?;
    let report = builder.build();
    info!("{report}");
    Ok(report)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetPipeline

fn render_sheet_into<S, R>(
    sink: &mut S,
    sheet: &SheetInfo<'_, R>,
    write_options: &SpecReportWriteOptions,
    builder: &mut ReportRenderBuilder,
) -> Result<(), ReportError>
where
    S: SheetSink + ?Sized,
    R: Record,
{
    let ctx = sheet.context();
    let style = sheet.style();
    let records = sheet.records();
    let n_cols = sheet.width();
    let n_rows_total = records.len() + 2 + usize::from(ctx.title.is_some());
    let derive_sink_err = |source: SinkError| ReportError::sink(Some(ctx.sheet_name), source);

    debug!(
        "sheet {:?}: rendering {} records x {n_cols} columns",
        ctx.sheet_name,
        records.len()
    );
    let c_sheet_name = sink
        .start_sheet(ctx.sheet_name, n_cols, n_rows_total)
        .map_err(derive_sink_err)?;

    let mut n_row_cursor = 0usize;
    if let Some(c_title) = ctx.title {
        let fmt_title = style.and_then(|s| s.title_format(&ctx));
        sink.write_title_row(n_row_cursor, c_title, n_cols, fmt_title.as_ref())
            .map_err(derive_sink_err)?;
        n_row_cursor += 1;
    }

    let l_header_cells: Vec<SpecRenderedCell> = ctx
        .column_names
        .iter()
        .enumerate()
        .map(|(col_idx, c_name)| SpecRenderedCell {
            value: EnumCellValue::String(c_name.clone()),
            format: style.and_then(|s| s.header_format(&ctx, col_idx)),
        })
        .collect();
    sink.write_header_row(n_row_cursor, &l_header_cells)
        .map_err(derive_sink_err)?;
    n_row_cursor += 1;

    let l_converters: Vec<Option<&Converter<R>>> = ctx
        .column_keys
        .iter()
        .map(|key| sheet.converter(key))
        .collect();
    let l_counters: Vec<Option<&Counter<R>>> = ctx
        .column_keys
        .iter()
        .map(|key| sheet.counter(key))
        .collect();
    let mut l_accs: Vec<Option<Box<dyn Any>>> = (0..n_cols).map(|_| None).collect();
    let mut l_row_cells = vec![SpecRenderedCell::default(); n_cols];

    for (row_idx, record) in records.iter().enumerate() {
        for (col_idx, path) in sheet.field_paths().iter().enumerate() {
            let resolved = path
                .resolve(record)
                .map_err(|source| ReportError::FieldResolution {
                    sheet_name: ctx.sheet_name.to_string(),
                    row_idx,
                    col_idx,
                    source,
                })?;

            if let Some(counter) = l_counters[col_idx] {
                match counter.fold(&ctx, &resolved, row_idx, col_idx, l_accs[col_idx].as_deref()) {
                    Ok(acc) => l_accs[col_idx] = Some(acc),
                    Err(message) => record_cell_error(
                        builder,
                        EnumCellErrorKind::Counter,
                        &c_sheet_name,
                        &ctx.column_keys[col_idx],
                        row_idx,
                        col_idx,
                        message,
                    ),
                }
            }

            let value = match l_converters[col_idx] {
                Some(converter) => converter
                    .apply(&ctx, &resolved, row_idx, col_idx)
                    .unwrap_or_else(|message| {
                        record_cell_error(
                            builder,
                            EnumCellErrorKind::Converter,
                            &c_sheet_name,
                            &ctx.column_keys[col_idx],
                            row_idx,
                            col_idx,
                            message,
                        );
                        EnumCellValue::None
                    }),
                None => resolved.to_cell_value(),
            };
            let format = style.and_then(|s| s.data_format(&ctx, &value, row_idx, col_idx));
            l_row_cells[col_idx] = SpecRenderedCell { value, format };
        }

        sink.write_data_row(n_row_cursor + row_idx, &l_row_cells)
            .map_err(derive_sink_err)?;

        let n_rows_done = row_idx + 1;
        if write_options.n_rows_log_every > 0 && n_rows_done % write_options.n_rows_log_every == 0 {
            debug!(
                "sheet {:?}: {n_rows_done}/{} rows written",
                ctx.sheet_name,
                records.len()
            );
        }
    }
    n_row_cursor += records.len();

    let l_summary_cells: Vec<SpecRenderedCell> = l_counters
        .iter()
        .zip(&l_accs)
        .enumerate()
        .map(|(col_idx, (counter, acc))| {
            let value = counter.map_or(EnumCellValue::None, |c| c.render(acc.as_deref()));
            let format = style.and_then(|s| s.summary_format(&ctx, &value, col_idx));
            SpecRenderedCell { value, format }
        })
        .collect();
    sink.write_summary_row(n_row_cursor, &l_summary_cells)
        .map_err(derive_sink_err)?;

    let l_widths: Vec<Option<f64>> = (0..n_cols)
        .map(|col_idx| style.and_then(|s| s.column_width(&ctx, col_idx)))
        .collect();
    sink.finish_sheet(&l_widths).map_err(derive_sink_err)?;

    for c_warning in sink.take_warnings() {
        builder.add_warning(c_warning);
    }
    debug!(
        "sheet {:?} rendered as {c_sheet_name:?}",
        ctx.sheet_name
    );
    builder.add_sheet(c_sheet_name, records.len(), n_cols);
    Ok(())
}

fn record_cell_error(
    builder: &mut ReportRenderBuilder,
    kind: EnumCellErrorKind,
    sheet_name: &str,
    column_key: &str,
    row_idx: usize,
    col_idx: usize,
    message: String,
) {
    let error = SpecCellError {
        kind,
        sheet_name: sheet_name.to_string(),
        column_key: column_key.to_string(),
        col_idx,
        row_idx,
        message,
    };
    warn!("{error}");
    builder.add_error(error);
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use calamine::{Data, Reader, Xlsx};

    use super::*;
    use crate::handler::{count_if_counter, order_converter, order_counter, sum_counter};
    use crate::record::{EnumPropertyValue, EnumResolvedValue};
    use crate::spec::{SpecCellFormat, SpecSheetContext};
    use crate::writer::XlsxSheetSink;

    struct Student {
        name: String,
        sex: i32,
        score: i64,
    }

    impl Record for Student {
        fn get_property(&self, name: &str) -> Option<EnumPropertyValue<'_>> {
            match name {
                "name" => Some((&self.name).into()),
                "sex" => Some(self.sex.into()),
                "score" => Some(self.score.into()),
                _ => None,
            }
        }
    }

    fn make_students(scores: &[i64]) -> Vec<Student> {
        scores
            .iter()
            .enumerate()
            .map(|(n_idx, score)| Student {
                name: format!("s{n_idx}"),
                sex: (n_idx % 2) as i32,
                score: *score,
            })
            .collect()
    }

    fn render_memory<R: Record>(sheets: &[SheetInfo<'_, R>]) -> (MemorySheetSink, ReportRender) {
        let mut sink = MemorySheetSink::new();
        let report = write_sheets(&mut sink, sheets, &mut Vec::new()).expect("render");
        (sink, report)
    }

    #[test]
    fn scores_end_to_end() {
        let students = make_students(&[55, 72, 88]);
        let mut sheet = SheetInfo::new("scores", None, &["Name", "Score"], &["name", "score"], &students)
            .expect("sheet");
        sheet
            .put_counter_handler("score", sum_counter())
            .set_data_style(|ctx, value, _, col_idx| {
                let if_failing = ctx.column_key(col_idx) == Some("score")
                    && value.as_i64().is_some_and(|score| score < 60);
                if_failing.then(|| SpecCellFormat::font_color("#FF0000"))
            });

        let (sink, report) = render_memory(std::slice::from_ref(&sheet));
        let buffered = sink.sheet("scores").expect("sheet");

        let summary = buffered.summary().expect("summary");
        assert_eq!(summary[1].value, EnumCellValue::Integer(215));
        assert_eq!(summary[0].value, EnumCellValue::None);

        let l_flags: Vec<bool> = buffered
            .data_rows()
            .map(|cells| cells[1].format.is_some())
            .collect();
        assert_eq!(l_flags, vec![true, false, false]);
        assert_eq!(report.error_count(), 0);
        assert_eq!(report.sheets[0].n_rows, 3);
    }

    #[test]
    fn raw_values_without_handlers() {
        let students = make_students(&[10, 20]);
        let sheet = SheetInfo::new("raw", None, &["Name", "Score"], &["name", "score"], &students)
            .expect("sheet");
        let (sink, _) = render_memory(std::slice::from_ref(&sheet));
        let buffered = &sink.sheets()[0];

        assert_eq!(
            buffered.column_values(0),
            vec![EnumCellValue::from("s0"), EnumCellValue::from("s1")]
        );
        assert_eq!(
            buffered.column_values(1),
            vec![EnumCellValue::Integer(10), EnumCellValue::Integer(20)]
        );
        assert!(buffered.summary().expect("summary").iter().all(|c| c.value.is_none()));
        assert!(buffered.title().is_none());
    }

    #[test]
    fn order_column_and_total_label() {
        let students = make_students(&[1, 2, 3, 4]);
        let mut sheet = SheetInfo::new("ord", Some("Roster"), &["No", "Name"], &["#order", "name"], &students)
            .expect("sheet");
        sheet
            .put_converter_handler("#order", order_converter())
            .put_counter_handler("#order", order_counter());

        let (sink, _) = render_memory(std::slice::from_ref(&sheet));
        let buffered = &sink.sheets()[0];
        assert_eq!(buffered.title().as_deref(), Some("Roster"));
        assert_eq!(
            buffered.column_values(0),
            (1..=4).map(EnumCellValue::Integer).collect::<Vec<_>>()
        );
        assert_eq!(
            buffered.summary().expect("summary")[0].value,
            EnumCellValue::from("Total")
        );
        let l_row_idx: Vec<usize> = buffered.rows.iter().map(|row| row.row_idx).collect();
        assert_eq!(l_row_idx, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn count_if_counter_over_empty_and_filled_sheets() {
        for n_records in [0usize, 5] {
            let scores: Vec<i64> = (0..n_records as i64).collect();
            let students = make_students(&scores);
            let mut sheet = SheetInfo::new("sex", None, &["Sex"], &["sex"], &students).expect("sheet");
            sheet.put_counter_handler(
                "sex",
                count_if_counter(|value: &EnumResolvedValue<'_, Student>| {
                    value.value() == Some(&EnumCellValue::Integer(1))
                }),
            );
            let (sink, report) = render_memory(std::slice::from_ref(&sheet));
            let expected = if n_records == 0 {
                EnumCellValue::None
            } else {
                EnumCellValue::Integer(2)
            };
            assert_eq!(sink.sheets()[0].summary().expect("summary")[0].value, expected);
            assert_eq!(report.error_count(), 0);
        }
    }

    #[test]
    fn handler_failures_are_recorded_and_rendering_continues() {
        let students = make_students(&[1, 2, 3, 4]);
        let mut sheet = SheetInfo::new("fail", None, &["Score", "Name"], &["score", "name"], &students)
            .expect("sheet");
        sheet
            .put_converter("score", |_, value, row_idx, _| {
                if row_idx == 1 {
                    return Err("row 1 is broken".into());
                }
                Ok(value.to_cell_value())
            })
            .put_counter("score", |_, value, row_idx, _, acc: Option<&i64>| {
                if row_idx == 2 {
                    panic!("counter exploded");
                }
                let n_score = value.value().and_then(EnumCellValue::as_i64).unwrap_or(0);
                Ok(acc.copied().unwrap_or(0) + n_score)
            });

        let (sink, report) = render_memory(std::slice::from_ref(&sheet));
        let buffered = &sink.sheets()[0];
        assert_eq!(
            buffered.column_values(0),
            vec![
                EnumCellValue::Integer(1),
                EnumCellValue::None,
                EnumCellValue::Integer(3),
                EnumCellValue::Integer(4)
            ]
        );
        assert_eq!(
            buffered.summary().expect("summary")[0].value,
            EnumCellValue::from("7")
        );
        assert_eq!(buffered.data_rows().count(), 4);

        assert_eq!(report.error_count(), 2);
        assert_eq!(report.errors[0].kind, EnumCellErrorKind::Converter);
        assert_eq!(report.errors[0].row_idx, 1);
        assert_eq!(report.errors[1].kind, EnumCellErrorKind::Counter);
        assert_eq!(report.errors[1].row_idx, 2);
        assert!(report.errors[1].message.contains("counter exploded"));
    }

    #[test]
    fn sheets_are_independent_with_shared_keys() {
        let students_a = make_students(&[1, 2]);
        let students_b = make_students(&[10, 20, 30]);
        let mut sheet_a = SheetInfo::new("a", None, &["Score"], &["score"], &students_a).expect("a");
        sheet_a.put_counter_handler("score", sum_counter());
        let mut sheet_b = SheetInfo::new("b", None, &["Score"], &["score"], &students_b).expect("b");
        sheet_b.put_counter_handler("score", sum_counter());

        let (sink, report) = render_memory(&[sheet_a, sheet_b]);
        let l_names: Vec<&str> = sink.sheets().iter().map(|s| s.sheet_name.as_str()).collect();
        assert_eq!(l_names, vec!["a", "b"]);
        assert_eq!(sink.sheets()[0].summary().expect("a")[0].value, EnumCellValue::Integer(3));
        assert_eq!(sink.sheets()[1].summary().expect("b")[0].value, EnumCellValue::Integer(60));
        assert_eq!(report.sheets.len(), 2);
    }

    #[test]
    fn missing_field_is_fatal_and_names_position() {
        let students = make_students(&[1]);
        let sheet = SheetInfo::new("bad", None, &["X"], &["grade.math"], &students).expect("sheet");
        let err = write_sheet(&mut MemorySheetSink::new(), &sheet, &mut Vec::new())
            .expect_err("fatal");
        match err {
            ReportError::FieldResolution {
                sheet_name,
                row_idx,
                col_idx,
                source,
            } => {
                assert_eq!(sheet_name, "bad");
                assert_eq!((row_idx, col_idx), (0, 0));
                assert_eq!(source.segment(), "grade");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn heterogeneous_sheets_share_one_renderer() {
        let students = make_students(&[5]);
        let rows_json = vec![serde_json::json!({"city": {"name": "Oslo"}})];
        let sheet_students = SheetInfo::new("students", None, &["Name"], &["name"], &students)
            .expect("students");
        let sheet_json = SheetInfo::new("cities", None, &["City"], &["city.name"], &rows_json)
            .expect("cities");

        let mut sink = MemorySheetSink::new();
        let mut renderer = ReportRenderer::new(&mut sink);
        renderer
            .render_sheet(&sheet_students)
            .and_then(|r| r.render_sheet(&sheet_json))
            .expect("render");
        let report = renderer.into_report();
        assert_eq!(report.sheets.len(), 2);
        assert_eq!(
            sink.sheet("cities").expect("cities").column_values(0),
            vec![EnumCellValue::from("Oslo")]
        );
    }

    #[test]
    fn parallel_render_matches_serial_order() {
        let l_students: Vec<Vec<Student>> = (0..4)
            .map(|n| make_students(&vec![n; n as usize + 1]))
            .collect();
        let sheets: Vec<SheetInfo<'_, Student>> = l_students
            .iter()
            .enumerate()
            .map(|(n_idx, students)| {
                let mut sheet = SheetInfo::new(&format!("s{n_idx}"), None, &["Score"], &["score"], students)
                    .expect("sheet");
                sheet.put_counter_handler("score", sum_counter());
                sheet
            })
            .collect();

        let mut sink_serial = MemorySheetSink::new();
        write_sheets(&mut sink_serial, &sheets, &mut Vec::new()).expect("serial");

        let mut sink_parallel = MemorySheetSink::new();
        let write_options = SpecReportWriteOptions {
            num_workers_max: Some(2),
            ..Default::default()
        };
        let report = write_sheets_parallel(&mut sink_parallel, &sheets, &mut Vec::new(), &write_options)
            .expect("parallel");

        assert_eq!(sink_parallel.sheets(), sink_serial.sheets());
        assert_eq!(report.sheets.len(), 4);
        assert_eq!(report.sheets[3].sheet_name, "s3");
    }

    #[test]
    fn xlsx_output_reads_back() {
        let students = make_students(&[55, 72, 88]);
        let mut sheet = SheetInfo::new("scores", Some("Exam"), &["No", "Name", "Score"], &["#order", "name", "score"], &students)
            .expect("sheet");
        sheet
            .put_converter_handler("#order", order_converter())
            .put_counter_handler("#order", order_counter())
            .put_counter_handler("score", sum_counter());

        let mut sink = XlsxSheetSink::with_options(
            crate::conf::derive_default_report_formats(),
            SpecReportWriteOptions {
                if_constant_memory: false,
                ..Default::default()
            },
        );
        let mut v_buf: Vec<u8> = Vec::new();
        let report = write_sheet(&mut sink, &sheet, &mut v_buf).expect("render");
        assert_eq!(report.sheets[0].sheet_name, "scores");

        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(v_buf)).expect("open xlsx");
        let range = workbook.worksheet_range("scores").expect("range");
        assert_eq!(range.get_value((0, 0)), Some(&Data::String("Exam".to_string())));
        assert_eq!(range.get_value((1, 2)), Some(&Data::String("Score".to_string())));
        assert_eq!(range.get_value((2, 0)), Some(&Data::Float(1.0)));
        assert_eq!(range.get_value((4, 2)), Some(&Data::Float(88.0)));
        assert_eq!(range.get_value((5, 0)), Some(&Data::String("Total".to_string())));
        assert_eq!(range.get_value((5, 2)), Some(&Data::Float(215.0)));
    }

    #[test]
    fn style_hook_context_is_read_only_view() {
        struct WidthStyle;

        impl crate::sheet::SheetStyle for WidthStyle {
            fn column_width(&self, ctx: &SpecSheetContext<'_>, col_idx: usize) -> Option<f64> {
                (ctx.column_key(col_idx) == Some("name")).then_some(30.0)
            }
        }

        let students = make_students(&[1]);
        let mut sheet = SheetInfo::new("w", None, &["Name", "Score"], &["name", "score"], &students)
            .expect("sheet");
        sheet.set_sheet_style(WidthStyle);
        let (sink, _) = render_memory(std::slice::from_ref(&sheet));
        assert_eq!(sink.sheets()[0].column_widths, vec![Some(30.0), None]);
    }

    #[test]
    fn map_converter_matches_boolean_and_integer_keys() {
        let rows_json = vec![
            serde_json::json!({"active": true, "sex": 1}),
            serde_json::json!({"active": false, "sex": 0}),
        ];
        let mut sheet = SheetInfo::new("flags", None, &["Active", "Sex"], &["active", "sex"], &rows_json)
            .expect("sheet");
        sheet
            .put_converter_map("active", [(true, "yes"), (false, "no")])
            .put_converter_map("sex", [(1, "male"), (0, "female")]);

        let (sink, report) = render_memory(std::slice::from_ref(&sheet));
        let buffered = &sink.sheets()[0];
        assert_eq!(
            buffered.column_values(0),
            vec![EnumCellValue::from("yes"), EnumCellValue::from("no")]
        );
        assert_eq!(
            buffered.column_values(1),
            vec![EnumCellValue::from("male"), EnumCellValue::from("female")]
        );
        assert_eq!(report.error_count(), 0);
    }

    #[test]
    fn cell_errors_use_the_sink_assigned_sheet_name() {
        let students = make_students(&[1, 2]);
        let mut sheet = SheetInfo::new("a/b", None, &["Score"], &["score"], &students).expect("sheet");
        sheet.put_converter("score", |_, _, _, _| Err("always broken".into()));
        let sheets = std::slice::from_ref(&sheet);

        let mut sink_serial = XlsxSheetSink::new();
        let report_serial = write_sheets(&mut sink_serial, sheets, &mut Vec::new()).expect("serial");

        let mut sink_parallel = XlsxSheetSink::new();
        let report_parallel = write_sheets_parallel(
            &mut sink_parallel,
            sheets,
            &mut Vec::new(),
            &SpecReportWriteOptions::default(),
        )
        .expect("parallel");

        for report in [report_serial, report_parallel] {
            let c_sheet_name = &report.sheets[0].sheet_name;
            assert_eq!(c_sheet_name, "a_b");
            assert_eq!(report.error_count(), 2);
            assert_eq!(report.errors_in(c_sheet_name).count(), 2);
            assert_eq!(report.errors_in("a/b").count(), 0);
        }
    }

    #[test]
    fn virtual_columns_and_row_kind_styles() {
        struct BannerStyle;

        impl crate::sheet::SheetStyle for BannerStyle {
            fn title_format(&self, _ctx: &SpecSheetContext<'_>) -> Option<SpecCellFormat> {
                Some(SpecCellFormat::font_color("#0000FF"))
            }

            fn header_format(&self, ctx: &SpecSheetContext<'_>, col_idx: usize) -> Option<SpecCellFormat> {
                (ctx.column_key(col_idx) == Some("#doubled")).then(|| SpecCellFormat {
                    italic: Some(true),
                    ..Default::default()
                })
            }

            fn summary_format(
                &self,
                _ctx: &SpecSheetContext<'_>,
                value: &EnumCellValue,
                _col_idx: usize,
            ) -> Option<SpecCellFormat> {
                (!value.is_none()).then(|| SpecCellFormat::font_color("#00AA00"))
            }
        }

        let students = make_students(&[3, 4]);
        let mut sheet = SheetInfo::new(
            "virtual",
            Some("Doubled"),
            &["Doubled", "Raw", "Score"],
            &["#doubled", "#raw", "score"],
            &students,
        )
        .expect("sheet");
        sheet
            .put_converter("#doubled", |_, value, _, _| {
                let student = value.record().ok_or("expected the whole record")?;
                Ok(EnumCellValue::from(student.score * 2 + i64::from(student.sex)))
            })
            .put_counter_handler("score", sum_counter())
            .set_sheet_style(BannerStyle);

        let (sink, report) = render_memory(std::slice::from_ref(&sheet));
        let buffered = &sink.sheets()[0];
        assert_eq!(report.error_count(), 0);

        assert_eq!(
            buffered.column_values(0),
            vec![EnumCellValue::Integer(6), EnumCellValue::Integer(9)]
        );
        assert_eq!(
            buffered.column_values(1),
            vec![EnumCellValue::None, EnumCellValue::None]
        );

        let title = &buffered.rows[0];
        assert_eq!(title.kind, crate::sink::EnumRowKind::Title);
        assert_eq!(
            title.cells[0].format,
            Some(SpecCellFormat::font_color("#0000FF"))
        );

        let header = buffered.header().expect("header");
        assert_eq!(header[0].format.as_ref().and_then(|f| f.italic), Some(true));
        assert!(header[1].format.is_none());

        let summary = buffered.summary().expect("summary");
        assert!(summary[0].format.is_none());
        assert_eq!(summary[2].value, EnumCellValue::Integer(7));
        assert_eq!(
            summary[2].format,
            Some(SpecCellFormat::font_color("#00AA00"))
        );
    }
}
