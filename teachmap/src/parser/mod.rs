//! CSV reading and writing with encoding and delimiter auto-detection.
//!
//! Source rows become [`InputRecord`]s; canonical rows are written with the
//! contract headers in contract order.

use std::io::Write;
use std::path::Path;

use crate::error::{CsvError, CsvResult};
use crate::models::{Field, InputRecord, OutputRecord};

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub records: Vec<InputRecord>,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
    pub headers: Vec<String>,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding. A UTF-8 BOM is dropped.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let decoded = match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        // Unknown labels fall back to lossy UTF-8.
        other => match encoding_rs::Encoding::for_label(other.as_bytes()) {
            Some(enc) if enc != encoding_rs::UTF_8 => enc.decode(bytes).0.into_owned(),
            _ => String::from_utf8_lossy(bytes).into_owned(),
        },
    };
    decoded.trim_start_matches('\u{feff}').to_string()
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [';', ',', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse CSV text with an explicit delimiter.
///
/// Quoted fields may span lines. Rows with every cell blank are skipped.
/// A short row lacks the trailing columns rather than holding empty strings.
pub fn parse_records(content: &str, delimiter: char) -> CsvResult<(Vec<String>, Vec<InputRecord>)> {
    if content.trim().is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .flexible(true)
        .has_headers(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(CsvError::NoHeaders);
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let record: InputRecord = headers
            .iter()
            .zip(row.iter())
            .filter(|(h, _)| !h.is_empty())
            .map(|(h, v)| (h.clone(), v.to_string()))
            .collect();
        records.push(record);
    }

    Ok((headers, records))
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8]) -> CsvResult<ParseResult> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let delimiter = detect_delimiter(&content);
    let (headers, records) = parse_records(&content, delimiter)?;

    Ok(ParseResult {
        records,
        encoding,
        delimiter,
        headers,
    })
}

/// Parse CSV file with auto-detection of encoding and delimiter.
pub fn parse_csv_file_auto<P: AsRef<Path>>(path: P) -> CsvResult<ParseResult> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes)
}

/// Read an already canonical CSV back into output records.
///
/// Columns are matched to fields by contract name or known label; others
/// are ignored.
pub fn parse_output_records(bytes: &[u8]) -> CsvResult<Vec<OutputRecord>> {
    let parsed = parse_bytes_auto(bytes)?;
    let columns: Vec<(String, Field)> = parsed
        .headers
        .iter()
        .filter_map(|h| Field::from_label(h).map(|f| (h.clone(), f)))
        .collect();

    Ok(parsed
        .records
        .iter()
        .map(|input| {
            let mut record = OutputRecord::empty();
            for (column, field) in &columns {
                if let Some(value) = input.get(column) {
                    record.set(*field, value.trim());
                }
            }
            record
        })
        .collect())
}

/// Write canonical records, header row first.
pub fn write_output_csv<W: Write>(writer: W, records: &[OutputRecord]) -> CsvResult<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer
        .write_record(OutputRecord::headers())
        .map_err(|e| CsvError::WriteError(e.to_string()))?;
    for record in records {
        csv_writer
            .write_record(record.to_row())
            .map_err(|e| CsvError::WriteError(e.to_string()))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Canonical records as CSV text.
pub fn output_csv_string(records: &[OutputRecord]) -> CsvResult<String> {
    let mut buffer = Vec::new();
    write_output_csv(&mut buffer, records)?;
    String::from_utf8(buffer).map_err(|e| CsvError::WriteError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_csv() {
        let (headers, rows) = parse_records("name;age\nAlice;30\nBob;25", ';').unwrap();

        assert_eq!(headers, vec!["name", "age"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name"), Some("Alice"));
        assert_eq!(rows[1].get("age"), Some("25"));
    }

    #[test]
    fn test_quoted_values_with_delimiters_and_newlines() {
        let csv = "name,headline\n\"Doe, Jane\",\"Maths teacher\nIB certified\"\n";
        let (_, rows) = parse_records(csv, ',').unwrap();

        assert_eq!(rows[0].get("name"), Some("Doe, Jane"));
        assert_eq!(rows[0].get("headline"), Some("Maths teacher\nIB certified"));
    }

    #[test]
    fn test_blank_rows_skipped() {
        let (_, rows) = parse_records("a;b\n1;2\n;\n\n3;4\n", ';').unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_short_rows_lack_keys() {
        let (_, rows) = parse_records("a;b;c\n1;;", ';').unwrap();
        assert_eq!(rows[0].get("b"), Some(""));

        let (_, rows) = parse_records("a;b;c\n1", ';').unwrap();
        assert_eq!(rows[0].get("a"), Some("1"));
        assert_eq!(rows[0].get("b"), None);
    }

    #[test]
    fn test_extra_columns_ignored() {
        let (_, rows) = parse_records("a;b\n1;2;3;4", ';').unwrap();
        assert_eq!(rows[0].len(), 2);
    }

    #[test]
    fn test_empty_csv_error() {
        assert!(matches!(parse_records("", ';'), Err(CsvError::EmptyFile)));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), '\t');
        assert_eq!(detect_delimiter("a|b|c\n1|2|3"), '|');
    }

    #[test]
    fn test_auto_parse() {
        let result = parse_bytes_auto("\u{feff}name;age\nAlice;30\nBob;25".as_bytes()).unwrap();

        assert_eq!(result.delimiter, ';');
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.headers, vec!["name", "age"]);
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        assert_eq!(decode_content(bytes, "iso-8859-1"), "Société");
    }

    #[test]
    fn test_output_round_trip_keeps_contract_order() {
        let mut record = OutputRecord::empty();
        record.set(Field::Name, "Doe, Jane");
        record.set(Field::SourceId, "42");

        let text = output_csv_string(&[record.clone()]).unwrap();
        assert!(text.starts_with("teacher_id,name,subject,"));
        assert!(text.contains("\"Doe, Jane\""));

        let back = parse_output_records(text.as_bytes()).unwrap();
        assert_eq!(back, vec![record]);
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let file = std::fs::File::create(&path).unwrap();
        write_output_csv(file, &[OutputRecord::empty()]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.lines().next().unwrap().ends_with("Email,Source ID"));
    }
}
