use crate::error::{CoreError, CoreResult};
use crate::store::StudentInput;
use std::path::Path;

/// Parses a student list exported as CSV. The first row is a header; the
/// columns are full name, group and record book number, in that order.
/// Rows missing any of the three are dropped.
pub fn parse_students_csv(text: &str) -> CoreResult<Vec<StudentInput>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    // Skip blank lines ahead of the header.
    let mut rest = text;
    while let Some((line, tail)) = rest.split_once('\n') {
        if !line.trim().is_empty() {
            break;
        }
        rest = tail;
    }
    let text = rest;
    let header = text.lines().next().unwrap_or("");
    let delimiter = if header.contains(';') && !header.contains(',') {
        b';'
    } else {
        b','
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut out = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| CoreError::format(format!("malformed CSV: {}", e)))?;
        if record.len() < 3 {
            continue;
        }
        let row = StudentInput::new(&record[0], &record[1], &record[2]);
        if row.full_name.is_empty() || row.group_name.is_empty() || row.record_book_number.is_empty() {
            continue;
        }
        out.push(row);
    }
    Ok(out)
}

/// Reads an import file. Only CSV is decoded here; spreadsheets are handed
/// over as structured records by the caller.
pub fn read_import_file(path: &Path) -> CoreResult<Vec<StudentInput>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if ext != "csv" {
        return Err(CoreError::format(format!(
            "unsupported import format {:?}; use CSV or pass records",
            ext
        )));
    }
    let text = std::fs::read_to_string(path).map_err(|e| {
        CoreError::format(format!("cannot read {}: {}", path.to_string_lossy(), e))
    })?;
    parse_students_csv(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_skips_header_and_incomplete_rows() {
        let text = "ФИО,Группа,Номер\n\
                    Иванов Иван , Группа-101, 123456\n\
                    Петров Петр,Группа-101\n\
                    ,Группа-101,123458\n\
                    \n\
                    Сидоров Сидор,Группа-102,123459,extra\n";
        let rows = parse_students_csv(text).expect("parse");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].full_name, "Иванов Иван");
        assert_eq!(rows[0].group_name, "Группа-101");
        assert_eq!(rows[0].record_book_number, "123456");
        assert_eq!(rows[1].record_book_number, "123459");
    }

    #[test]
    fn csv_with_semicolons_and_bom() {
        let text = "\u{feff}name;group;book\nA;G;1\nB;G;2\n";
        let rows = parse_students_csv(text).expect("parse");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].full_name, "B");
    }

    #[test]
    fn delimiter_comes_from_the_first_non_blank_line() {
        let text = "\n  \nname;group;book\nA;G;1\nB;G;2\n";
        let rows = parse_students_csv(text).expect("parse");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].group_name, "G");
        assert_eq!(rows[1].record_book_number, "2");
    }

    #[test]
    fn header_only_yields_nothing() {
        assert!(parse_students_csv("a,b,c\n").expect("parse").is_empty());
        assert!(parse_students_csv("").expect("parse").is_empty());
    }

    #[test]
    fn non_csv_extension_is_a_format_error() {
        let e = read_import_file(Path::new("students.xlsx")).unwrap_err();
        assert!(matches!(e, CoreError::Format(_)));
    }

    #[test]
    fn reads_csv_from_disk() {
        let dir = std::env::temp_dir().join(format!("gradebookd-import-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("dir");
        let path = dir.join("list.CSV");
        std::fs::write(&path, "name,group,book\nA,G,1\n").expect("write");
        let rows = read_import_file(&path).expect("read");
        assert_eq!(rows.len(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
