//! CSV rendering of sample rows.

use crate::{ModelDescriptor, SampleRow};

/// Renders [`SampleRow`]s as CSV lines.
///
/// In aligned mode every field but the last is padded to the longest value seen so far in its
/// column, so the output lines up while the read is running.
#[derive(Debug)]
pub struct CsvFormatter {
    model: &'static ModelDescriptor,
    align: bool,
    widths: Vec<usize>,
}

impl CsvFormatter {
    /// A formatter using the item precisions of `model`.
    pub fn new(model: &'static ModelDescriptor, align: bool) -> Self {
        Self {
            model,
            align,
            widths: Vec::new(),
        }
    }

    /// The header line, the item codes.
    pub fn header(&self, codes: &[&str]) -> String {
        codes.join(",")
    }

    /// Render one row.
    pub fn format_row(&mut self, row: &SampleRow) -> String {
        let fields: Vec<String> = row
            .values()
            .iter()
            .map(|(code, value)| {
                let precision = self.model.data_item(code).map(|d| d.precision);
                render(*value, precision)
            })
            .collect();

        if !self.align {
            return fields.join(",");
        }

        if self.widths.len() < fields.len() {
            self.widths.resize(fields.len(), 0);
        }
        let last = fields.len().saturating_sub(1);
        fields
            .into_iter()
            .enumerate()
            .map(|(idx, field)| {
                if idx == last {
                    return field;
                }
                self.widths[idx] = self.widths[idx].max(field.len() + 1);
                format!("{:<width$}", format!("{field},"), width = self.widths[idx])
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn render(value: f64, precision: Option<u32>) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    match precision {
        Some(precision) => {
            let scale = 10f64.powi(precision as i32);
            let rounded = (value * scale).round() / scale;
            // avoid printing "-0"
            if rounded == 0.0 {
                "0".to_string()
            } else {
                rounded.to_string()
            }
        }
        None => value.to_string(),
    }
}
