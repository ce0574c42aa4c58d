use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::{QuoteStyle, WriterBuilder};
use log::info;

use super::filter::FilteredView;
use super::model::{Dataset, Opportunity, Schema};
use crate::error::{ExplorerError, Result};

/// Write records as CSV with every field quoted. Only source columns are
/// written; derived fields are recomputed on the next load.
pub fn write_csv<'a, W: Write>(
    writer: W,
    schema: &Schema,
    records: impl IntoIterator<Item = &'a Opportunity>,
) -> Result<usize> {
    let mut out = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(writer);
    out.write_record(schema.columns())?;

    let mut written = 0;
    for record in records {
        out.write_record(schema.columns().iter().map(|c| record.get(c).unwrap_or("")))?;
        written += 1;
    }
    out.flush().map_err(csv::Error::from)?;
    Ok(written)
}

fn create(path: &Path) -> Result<File> {
    File::create(path).map_err(|source| ExplorerError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Save the canonical dataset.
pub fn export_dataset(path: &Path, dataset: &Dataset) -> Result<()> {
    let n = write_csv(create(path)?, dataset.schema(), dataset.records())?;
    info!("wrote {n} rows to {}", path.display());
    Ok(())
}

/// Save a filtered view in the same format as the merged dataset.
pub fn export_view(path: &Path, view: &FilteredView<'_>) -> Result<()> {
    let n = write_csv(create(path)?, view.dataset().schema(), view.records())?;
    info!("wrote {n} filtered rows to {}", path.display());
    Ok(())
}
