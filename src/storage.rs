//! Dataset files: one JSON array of candle records per (symbol, timeframe)

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::types::CandleRecord;

/// `<dir>/<SYMBOL>_<timeframe>.json`
pub fn dataset_path(data_dir: &Path, symbol: &str, timeframe: &str) -> PathBuf {
    data_dir.join(format!("{}_{}.json", symbol, timeframe))
}

/// Write records as a bare JSON array
///
/// The array goes to a sibling `.tmp` file first and is renamed into place,
/// so the dataset path only ever holds a complete file.
pub fn write_dataset(path: &Path, records: &[CandleRecord]) -> io::Result<()> {
    let body = serde_json::to_vec(records)?;

    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &body)?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    Ok(())
}
