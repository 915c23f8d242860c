//! CSV-backed sheet host with encoding and delimiter auto-detection.
//!
//! The first record is the header row; every following record becomes a
//! [`Row`] of string cells, blank ones included, so row positions match the
//! file's lines. Rows keep their own length, short rows are only padded when
//! written back. A sheet is written in the encoding it was read from.

use encoding_rs::Encoding;
use serde_json::Value;
use std::path::Path;

use crate::error::{SheetError, SheetResult};
use crate::strategy::Row;
use crate::utils::cell_text;

/// A header row plus data rows, with the format they were read in
#[derive(Debug, Clone)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
    /// Delimiter used when writing back
    pub delimiter: char,
    /// Encoding the content was decoded from
    pub encoding: String,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let charset = chardet::detect(bytes).0;

    match charset.to_lowercase().as_str() {
        "" | "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

fn encoding_for(name: &str) -> &'static Encoding {
    match name.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15,
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252,
        _ => encoding_rs::UTF_8,
    }
}

/// Decode bytes to a string using the given encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> SheetResult<String> {
    let (text, _, had_errors) = encoding_for(encoding).decode(bytes);
    let decoded = text.into_owned();

    if had_errors && decoded.chars().all(|c| c == char::REPLACEMENT_CHARACTER) {
        return Err(SheetError::Encoding(format!("content is not valid {}", encoding)));
    }
    Ok(decoded)
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let mut best_sep = ',';
    let mut best_count = 0;
    for sep in [',', ';', '\t', '|'] {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }
    best_sep
}

impl Sheet {
    /// Read a sheet file with auto-detection
    pub fn from_path(path: impl AsRef<Path>) -> SheetResult<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    /// Parse sheet bytes with auto-detection
    pub fn from_bytes(bytes: &[u8]) -> SheetResult<Self> {
        let encoding = detect_encoding(bytes);
        let content = decode_content(bytes, &encoding)?;
        let delimiter = detect_delimiter(&content);
        Self::from_str_with(&content, delimiter, encoding)
    }

    /// Parse sheet content with an explicit delimiter
    pub fn from_str_with(content: &str, delimiter: char, encoding: String) -> SheetResult<Self> {
        let content = content.trim_start_matches('\u{feff}');
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter as u8)
            .from_reader(content.as_bytes());

        let mut records = reader.records();
        let headers: Vec<String> = match records.next() {
            Some(record) => record?.iter().map(|h| h.trim().to_string()).collect(),
            None => return Err(SheetError::Empty),
        };
        if headers.iter().all(|h| h.is_empty()) {
            return Err(SheetError::Empty);
        }

        let mut rows = Vec::new();
        for record in records {
            let record = record?;
            rows.push(record.iter().map(|cell| Value::String(cell.to_string())).collect());
        }

        Ok(Self {
            headers,
            rows,
            delimiter,
            encoding,
        })
    }

    /// Serialize back to CSV (UTF-8), padding short rows to the header width
    pub fn to_csv_string(&self) -> SheetResult<String> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .delimiter(self.delimiter as u8)
            .from_writer(Vec::new());

        writer.write_record(&self.headers)?;
        for row in &self.rows {
            let mut cells: Vec<String> = row.iter().map(cell_text).collect();
            if cells.len() < self.headers.len() {
                cells.resize(self.headers.len(), String::new());
            }
            writer.write_record(&cells)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| SheetError::Io(e.into_error()))?;
        String::from_utf8(bytes).map_err(|e| SheetError::Encoding(e.to_string()))
    }

    /// Serialize to CSV bytes in the sheet's own encoding
    ///
    /// Characters the encoding cannot represent fail the write instead of
    /// being replaced.
    pub fn to_bytes(&self) -> SheetResult<Vec<u8>> {
        let text = self.to_csv_string()?;
        let encoding = encoding_for(&self.encoding);
        if encoding == encoding_rs::UTF_8 {
            return Ok(text.into_bytes());
        }

        let (bytes, _, unmappable) = encoding.encode(&text);
        if unmappable {
            return Err(SheetError::Encoding(format!(
                "content cannot be written as {}",
                self.encoding
            )));
        }
        Ok(bytes.into_owned())
    }

    /// Write the sheet to `path`
    pub fn write_to(&self, path: impl AsRef<Path>) -> SheetResult<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_parse_simple_sheet() {
        let csv = "Api URL,Latitude,api:main.temp\nhttps://x.test,48.85,\n";
        let sheet = Sheet::from_bytes(csv.as_bytes()).unwrap();

        assert_eq!(sheet.headers, vec!["Api URL", "Latitude", "api:main.temp"]);
        assert_eq!(sheet.rows.len(), 1);
        assert_eq!(sheet.rows[0][1], json!("48.85"));
        assert_eq!(sheet.delimiter, ',');
    }

    #[test]
    fn test_quoted_json_cells() {
        let csv = "Api Headers;Last Updated\n\"{\"\"headers\"\":{\"\"apikey\"\":\"\"k\"\"}}\";\n";
        let sheet = Sheet::from_bytes(csv.as_bytes()).unwrap();

        assert_eq!(sheet.delimiter, ';');
        assert_eq!(sheet.rows[0][0], json!(r#"{"headers":{"apikey":"k"}}"#));
    }

    #[test]
    fn test_short_rows_kept() {
        let csv = "a,b,c\n1,2,3\n4\n";
        let sheet = Sheet::from_bytes(csv.as_bytes()).unwrap();
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[1], vec![json!("4")]);
    }

    #[test]
    fn test_blank_rows_keep_their_position() {
        let csv = "Api URL,Note,Last Updated\n,first,\n,,\n,third,\n";
        let sheet = Sheet::from_bytes(csv.as_bytes()).unwrap();

        assert_eq!(sheet.rows.len(), 3);
        assert_eq!(sheet.rows[1], vec![json!(""), json!(""), json!("")]);
        assert_eq!(sheet.to_csv_string().unwrap(), csv);
    }

    #[test]
    fn test_latin1_sheet_written_back_as_latin1() {
        // "Ville,Note\nSociété,x\n" in ISO-8859-1
        let mut bytes = b"Ville,Note\nSoci".to_vec();
        bytes.extend_from_slice(&[0xE9, b't', 0xE9]);
        bytes.extend_from_slice(b",x\n");

        let content = decode_content(&bytes, "iso-8859-1").unwrap();
        let sheet = Sheet::from_str_with(&content, ',', "iso-8859-1".to_string()).unwrap();
        assert_eq!(sheet.rows[0][0], json!("Société"));
        assert_eq!(sheet.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_unmappable_character_fails_write() {
        let mut sheet = Sheet::from_str_with("City\nParis\n", ',', "iso-8859-1".to_string()).unwrap();
        sheet.rows[0][0] = json!("東京");
        assert!(matches!(sheet.to_bytes(), Err(SheetError::Encoding(_))));
    }

    #[test]
    fn test_empty_sheet_error() {
        assert!(matches!(Sheet::from_bytes(b""), Err(SheetError::Empty)));
    }

    #[test]
    fn test_write_back_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sheet.csv");

        let mut sheet = Sheet::from_bytes(b"Trigger,api:temp,Last Updated\nx\n").unwrap();
        sheet.rows[0] = vec![json!("x"), json!(21.5), json!(r#"{"AnyAPI":"2026-10-16T08:00:00.000Z"}"#)];
        sheet.write_to(&path).unwrap();

        let reread = Sheet::from_path(&path).unwrap();
        assert_eq!(reread.rows[0][1], json!("21.5"));
        assert_eq!(
            reread.rows[0][2],
            json!(r#"{"AnyAPI":"2026-10-16T08:00:00.000Z"}"#)
        );
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c"), ';');
        assert_eq!(detect_delimiter("a\tb\tc"), '\t');
        assert_eq!(detect_delimiter("a|b|c"), '|');
        assert_eq!(detect_delimiter("single"), ',');
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1").unwrap();
        assert_eq!(decoded, "Société");
    }
}
