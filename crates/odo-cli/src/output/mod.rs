use serde::Serialize;

use crate::cli::OutputFormat;
use crate::ui;

pub mod table;

/// A response that can lay itself out as table rows.
///
/// JSON and raw output go through `Serialize`; the table layout is chosen
/// per response so column order stays stable and readable.
pub trait Tabular {
    fn headers(&self) -> Vec<&'static str>;
    fn rows(&self) -> Vec<Vec<String>>;

    /// Printed under the table when present.
    fn footer(&self) -> Option<String> {
        None
    }
}

/// Two-column `field`/`value` rows for single-record responses.
#[must_use]
pub fn field_rows(fields: &[(&str, Option<String>)]) -> Vec<Vec<String>> {
    fields
        .iter()
        .map(|(name, value)| {
            vec![
                (*name).to_string(),
                value.clone().unwrap_or_else(|| String::from("-")),
            ]
        })
        .collect()
}

/// Render a response to a string in the requested format.
pub fn render<T: Serialize + Tabular>(value: &T, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(value)?),
        OutputFormat::Raw => Ok(serde_json::to_string(value)?),
        OutputFormat::Table => Ok(render_table(value)),
    }
}

/// Print a response in the requested format.
pub fn output<T: Serialize + Tabular>(value: &T, format: OutputFormat) -> anyhow::Result<()> {
    let rendered = render(value, format)?;
    println!("{rendered}");
    Ok(())
}

fn render_table<T: Tabular>(value: &T) -> String {
    let prefs = ui::prefs();
    let options = table::TableOptions {
        max_width: prefs.term_width,
        color: prefs.table_color,
    };

    let rows = value.rows();
    let mut out = if rows.is_empty() {
        String::from("(no rows)")
    } else {
        table::render_table(&value.headers(), &rows, options)
    };
    if let Some(footer) = value.footer() {
        out.push('\n');
        out.push_str(&footer);
    }
    out
}
