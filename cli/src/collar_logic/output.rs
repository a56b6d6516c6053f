use std::io::Write;

use anyhow::Result;
use lib_collar::tables::{RawTable, cell_to_string};

use super::args::OutputFormat;

/// Writes `table` to `out` in the requested format.
pub fn write_table<W: Write>(table: &RawTable, format: OutputFormat, out: W) -> Result<()> {
    match format {
        OutputFormat::Json => write_json_lines(table, out),
        OutputFormat::Csv => write_csv(table, out),
    }
}

fn write_json_lines<W: Write>(table: &RawTable, mut out: W) -> Result<()> {
    for record in table.records() {
        serde_json::to_writer(&mut out, &record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

fn write_csv<W: Write>(table: &RawTable, out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(cell_to_string))?;
    }
    writer.flush()?;
    Ok(())
}
