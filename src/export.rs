//! CSV export of a recorded trend
//!
//! Rows are `(t, co, y, ysp)` under the header `t [s], CO [%], y, ysp`.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::state::TrendView;

/// Column labels in export order
pub const HEADER: [&str; 4] = ["t [s]", "CO [%]", "y", "ysp"];

/// Number formatting of the exported file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CsvStyle {
    /// `,` delimiter, `.` decimal separator
    #[default]
    Standard,
    /// `;` delimiter, `,` decimal separator, for locales whose
    /// spreadsheets expect a decimal comma
    Spreadsheet,
}

impl CsvStyle {
    fn delimiter(&self) -> u8 {
        match self {
            CsvStyle::Standard => b',',
            CsvStyle::Spreadsheet => b';',
        }
    }

    fn format(&self, value: f64) -> String {
        match self {
            CsvStyle::Standard => value.to_string(),
            CsvStyle::Spreadsheet => value.to_string().replace('.', ","),
        }
    }
}

/// Write a trend to any writer
///
/// # Example
///
/// ```ignore
/// let mut buffer = Vec::new();
/// write_csv(clock.trend().view(), &mut buffer, CsvStyle::Standard)?;
/// ```
pub fn write_csv<W: Write>(trend: TrendView<'_>, writer: W, style: CsvStyle) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(style.delimiter())
        .from_writer(writer);

    wtr.write_record(HEADER)?;
    for sample in trend.iter() {
        wtr.write_record([sample.t, sample.co, sample.y, sample.ysp].map(|v| style.format(v)))?;
    }

    wtr.flush()?;
    Ok(())
}

/// Save a trend to a file, adding a `.csv` extension if missing
///
/// Returns the path actually written.
pub fn save_csv(path: impl AsRef<Path>, trend: TrendView<'_>, style: CsvStyle) -> Result<PathBuf> {
    let mut path = path.as_ref().to_path_buf();
    let has_extension = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if !has_extension {
        let mut name = path.as_os_str().to_os_string();
        name.push(".csv");
        path = PathBuf::from(name);
    }

    write_csv(trend, File::create(&path)?, style)?;
    info!("exported {} samples to {}", trend.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Trend;

    fn trend() -> Trend {
        Trend::from_series(
            vec![0.0, 0.1, 0.2],
            vec![50.0, 50.0, 50.25],
            vec![50.0, 51.5, 51.5],
            vec![52.0, 52.0, 52.0],
        )
        .unwrap()
    }

    fn export(style: CsvStyle) -> String {
        let mut buffer = Vec::new();
        write_csv(trend().view(), &mut buffer, style).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_standard_style() {
        let text = export(CsvStyle::Standard);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "t [s],CO [%],y,ysp");
        assert_eq!(lines[1], "0,50,50,52");
        assert_eq!(lines[3], "0.2,51.5,50.25,52");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_spreadsheet_style_uses_decimal_comma() {
        let text = export(CsvStyle::Spreadsheet);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "t [s];CO [%];y;ysp");
        assert_eq!(lines[2], "0,1;51,5;50;52");
    }

    #[test]
    fn test_save_adds_extension() {
        let dir = tempfile::tempdir().unwrap();
        let written = save_csv(dir.path().join("run"), trend().view(), CsvStyle::Standard).unwrap();
        assert_eq!(written, dir.path().join("run.csv"));
        assert!(std::fs::read_to_string(&written).unwrap().starts_with("t [s]"));

        let kept = save_csv(dir.path().join("run.CSV"), trend().view(), CsvStyle::Standard).unwrap();
        assert_eq!(kept, dir.path().join("run.CSV"));
    }
}
