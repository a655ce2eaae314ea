//! Minimal BIFF8 workbook writer
//!
//! Emits the records calamine (and Excel) need to read back cell values:
//! workbook globals with fonts, cell formats, sheet directory and shared
//! strings, then one substream per sheet holding NUMBER, LABELSST and BOOLERR
//! cells. The stream is stored as `Workbook` inside an OLE compound file.

use super::{check_sheet_name, Sheet, MAX_SHEET_NAME};
use crate::error::{RulesError, RulesResult};
use crate::types::CellValue;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Rows addressable by a BIFF8 sheet
pub const MAX_ROWS: usize = 65_536;
/// Columns addressable by a BIFF8 sheet
pub const MAX_COLS: usize = 256;

const BOF: u16 = 0x0809;
const EOF: u16 = 0x000A;
const CODEPAGE: u16 = 0x0042;
const WINDOW1: u16 = 0x003D;
const FONT: u16 = 0x0031;
const XF: u16 = 0x00E0;
const STYLE: u16 = 0x0293;
const BOUNDSHEET: u16 = 0x0085;
const SST: u16 = 0x00FC;
const CONTINUE: u16 = 0x003C;
const DIMENSIONS: u16 = 0x0200;
const WINDOW2: u16 = 0x023E;
const NUMBER: u16 = 0x0203;
const LABELSST: u16 = 0x00FD;
const BOOLERR: u16 = 0x0205;

/// Largest payload of a single record
const MAX_RECORD_DATA: usize = 8224;

const SUBSTREAM_GLOBALS: u16 = 0x0005;
const SUBSTREAM_WORKSHEET: u16 = 0x0010;

/// XF index for ordinary cells (0..=14 are style XFs)
const XF_GENERAL: u16 = 15;
/// XF index for date cells (built-in format 22, `m/d/yy h:mm`)
const XF_DATETIME: u16 = 16;

/// Serialize `sheets` and store them in a new compound file at `path`
pub fn write_workbook(path: &Path, sheets: &[Sheet]) -> RulesResult<()> {
    for sheet in sheets {
        check_sheet_name(sheet.name(), path)?;
    }
    let stream = workbook_stream(sheets)?;

    let save_error = |e: std::io::Error| RulesError::Save {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let file = File::create(path).map_err(save_error)?;
    let mut compound =
        cfb::CompoundFile::create_with_version(cfb::Version::V3, file).map_err(save_error)?;
    {
        let mut workbook = compound.create_stream("Workbook").map_err(save_error)?;
        workbook.write_all(&stream).map_err(save_error)?;
        workbook.flush().map_err(save_error)?;
    }
    compound.flush().map_err(save_error)?;

    debug!(path = %path.display(), bytes = stream.len(), "wrote xls workbook");
    Ok(())
}

/// Build the BIFF8 `Workbook` stream for `sheets`.
///
/// An empty sheet list produces a single empty `Sheet1`, since a workbook
/// without sheets cannot be opened.
pub fn workbook_stream(sheets: &[Sheet]) -> RulesResult<Vec<u8>> {
    let placeholder;
    let sheets = if sheets.is_empty() {
        placeholder = [Sheet::new("Sheet1")];
        &placeholder[..]
    } else {
        sheets
    };

    for sheet in sheets {
        if sheet.height() > MAX_ROWS || sheet.width() > MAX_COLS {
            return Err(RulesError::CellOutOfBounds {
                row: sheet.height().saturating_sub(1),
                col: sheet.width().saturating_sub(1),
                format: "xls",
            });
        }
    }

    let strings = SharedStrings::collect(sheets);

    //==========================================================================
    // Workbook globals
    //==========================================================================
    let mut out = Vec::new();
    write_bof(&mut out, SUBSTREAM_GLOBALS);
    write_record(&mut out, CODEPAGE, &1200u16.to_le_bytes());
    write_window1(&mut out);
    for _ in 0..4 {
        write_font(&mut out);
    }
    for _ in 0..15 {
        write_xf(&mut out, 0, true);
    }
    write_xf(&mut out, 0, false);
    write_xf(&mut out, 22, false);
    // Normal style bound to XF 0
    write_record(&mut out, STYLE, &[0x00, 0x80, 0x00, 0xFF]);

    // BOUNDSHEET positions are patched once the sheet offsets are known
    let mut position_slots = Vec::with_capacity(sheets.len());
    for sheet in sheets {
        position_slots.push(out.len() + 4);
        write_boundsheet(&mut out, sheet.name());
    }

    strings.write(&mut out);
    write_record(&mut out, EOF, &[]);

    //==========================================================================
    // Sheet substreams
    //==========================================================================
    for (index, sheet) in sheets.iter().enumerate() {
        let offset = out.len() as u32;
        out[position_slots[index]..position_slots[index] + 4].copy_from_slice(&offset.to_le_bytes());
        write_sheet(&mut out, sheet, index == 0, &strings);
    }

    Ok(out)
}

//==============================================================================
// Shared String Table
//==============================================================================

struct SharedStrings<'a> {
    unique: Vec<&'a str>,
    index: HashMap<&'a str, u32>,
    total: u32,
}

impl<'a> SharedStrings<'a> {
    fn collect(sheets: &'a [Sheet]) -> Self {
        let mut strings = SharedStrings {
            unique: Vec::new(),
            index: HashMap::new(),
            total: 0,
        };
        for sheet in sheets {
            for (_, _, value) in sheet.cells() {
                if let CellValue::String(s) = value {
                    strings.total += 1;
                    if !strings.index.contains_key(s.as_str()) {
                        strings.index.insert(s.as_str(), strings.unique.len() as u32);
                        strings.unique.push(s.as_str());
                    }
                }
            }
        }
        strings
    }

    fn get(&self, s: &str) -> u32 {
        self.index.get(s).copied().unwrap_or(0)
    }

    /// SST plus CONTINUE records. A string split across records repeats its
    /// encoding flag at the start of the continuation.
    fn write(&self, out: &mut Vec<u8>) {
        let mut records: Vec<Vec<u8>> = Vec::new();
        let mut current = Vec::with_capacity(MAX_RECORD_DATA);
        current.extend_from_slice(&self.total.to_le_bytes());
        current.extend_from_slice(&(self.unique.len() as u32).to_le_bytes());

        for s in &self.unique {
            let (flag, bytes, unit) = encode_string(s, 0xFFFF);
            let cch = (bytes.len() / unit) as u16;

            // cch + flag never straddle two records
            if MAX_RECORD_DATA - current.len() < 3 {
                records.push(std::mem::take(&mut current));
            }
            current.extend_from_slice(&cch.to_le_bytes());
            current.push(flag);

            let mut written = 0;
            while written < bytes.len() {
                let mut room = MAX_RECORD_DATA - current.len();
                room -= room % unit;
                if room == 0 {
                    records.push(std::mem::take(&mut current));
                    current.push(flag);
                    continue;
                }
                let take = room.min(bytes.len() - written);
                current.extend_from_slice(&bytes[written..written + take]);
                written += take;
            }
        }
        records.push(current);

        for (i, data) in records.iter().enumerate() {
            write_record(out, if i == 0 { SST } else { CONTINUE }, data);
        }
    }
}

/// Encode as compressed 8-bit when ASCII, UTF-16LE otherwise.
/// Returns (flag, bytes, bytes per character).
fn encode_string(s: &str, max_chars: usize) -> (u8, Vec<u8>, usize) {
    if s.is_ascii() {
        let bytes = &s.as_bytes()[..s.len().min(max_chars)];
        (0x00, bytes.to_vec(), 1)
    } else {
        let bytes = s
            .encode_utf16()
            .take(max_chars)
            .flat_map(u16::to_le_bytes)
            .collect();
        (0x01, bytes, 2)
    }
}

//==============================================================================
// Records
//==============================================================================

fn write_record(out: &mut Vec<u8>, record: u16, data: &[u8]) {
    out.extend_from_slice(&record.to_le_bytes());
    out.extend_from_slice(&(data.len() as u16).to_le_bytes());
    out.extend_from_slice(data);
}

fn write_bof(out: &mut Vec<u8>, substream: u16) {
    let mut data = Vec::with_capacity(16);
    data.extend_from_slice(&0x0600u16.to_le_bytes());
    data.extend_from_slice(&substream.to_le_bytes());
    data.extend_from_slice(&0x0DBBu16.to_le_bytes()); // build
    data.extend_from_slice(&0x07CCu16.to_le_bytes()); // year
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&6u32.to_le_bytes());
    write_record(out, BOF, &data);
}

fn write_window1(out: &mut Vec<u8>) {
    let fields: [u16; 9] = [0, 0, 0x3000, 0x1E00, 0x0038, 0, 0, 1, 0x0258];
    let data: Vec<u8> = fields.iter().flat_map(|f| f.to_le_bytes()).collect();
    write_record(out, WINDOW1, &data);
}

/// 10pt Arial
fn write_font(out: &mut Vec<u8>) {
    let name = b"Arial";
    let mut data = Vec::with_capacity(16 + name.len());
    data.extend_from_slice(&200u16.to_le_bytes()); // height in twips
    data.extend_from_slice(&0u16.to_le_bytes()); // attributes
    data.extend_from_slice(&0x7FFFu16.to_le_bytes()); // automatic colour
    data.extend_from_slice(&400u16.to_le_bytes()); // weight
    data.extend_from_slice(&0u16.to_le_bytes()); // escapement
    data.extend_from_slice(&[0, 0, 0, 0]); // underline, family, charset, reserved
    data.push(name.len() as u8);
    data.push(0x00);
    data.extend_from_slice(name);
    write_record(out, FONT, &data);
}

fn write_xf(out: &mut Vec<u8>, number_format: u16, style: bool) {
    let mut data = Vec::with_capacity(20);
    data.extend_from_slice(&0u16.to_le_bytes()); // font
    data.extend_from_slice(&number_format.to_le_bytes());
    data.extend_from_slice(&(if style { 0xFFF5u16 } else { 0x0001 }).to_le_bytes());
    data.extend_from_slice(&[0x20, 0, 0, 0]); // bottom aligned, no rotation/indent/used flags
    data.extend_from_slice(&0u16.to_le_bytes()); // borders
    data.extend_from_slice(&0u16.to_le_bytes()); // border palette
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&0x20C0u16.to_le_bytes()); // fill colours
    write_record(out, XF, &data);
}

/// Position (first four bytes) is written as zero and patched later
fn write_boundsheet(out: &mut Vec<u8>, name: &str) {
    let (flag, bytes, unit) = encode_string(name, MAX_SHEET_NAME);
    let mut data = Vec::with_capacity(8 + bytes.len());
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes()); // visible worksheet
    data.push((bytes.len() / unit) as u8);
    data.push(flag);
    data.extend_from_slice(&bytes);
    write_record(out, BOUNDSHEET, &data);
}

fn write_sheet(out: &mut Vec<u8>, sheet: &Sheet, active: bool, strings: &SharedStrings<'_>) {
    write_bof(out, SUBSTREAM_WORKSHEET);

    let mut data = Vec::with_capacity(14);
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&(sheet.height() as u32).to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&(sheet.width() as u16).to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes());
    write_record(out, DIMENSIONS, &data);

    let grbit: u16 = if active { 0x06B6 } else { 0x00B6 };
    let fields: [u16; 9] = [grbit, 0, 0, 0x0040, 0, 0, 0, 0, 0];
    let data: Vec<u8> = fields.iter().flat_map(|f| f.to_le_bytes()).collect();
    write_record(out, WINDOW2, &data);

    for (row, col, value) in sheet.cells() {
        let mut data = Vec::with_capacity(14);
        data.extend_from_slice(&(row as u16).to_le_bytes());
        data.extend_from_slice(&(col as u16).to_le_bytes());
        match value {
            CellValue::Number(n) => {
                data.extend_from_slice(&XF_GENERAL.to_le_bytes());
                data.extend_from_slice(&n.to_le_bytes());
                write_record(out, NUMBER, &data);
            }
            CellValue::DateTime(serial) => {
                data.extend_from_slice(&XF_DATETIME.to_le_bytes());
                data.extend_from_slice(&serial.to_le_bytes());
                write_record(out, NUMBER, &data);
            }
            CellValue::String(s) => {
                data.extend_from_slice(&XF_GENERAL.to_le_bytes());
                data.extend_from_slice(&strings.get(s).to_le_bytes());
                write_record(out, LABELSST, &data);
            }
            CellValue::Bool(b) => {
                data.extend_from_slice(&XF_GENERAL.to_le_bytes());
                data.extend_from_slice(&[u8::from(*b), 0]);
                write_record(out, BOOLERR, &data);
            }
            CellValue::Empty => {}
        }
    }

    write_record(out, EOF, &[]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook, Data, Reader, Xls};
    use tempfile::TempDir;

    fn records(stream: &[u8]) -> Vec<(u16, usize)> {
        let mut found = Vec::new();
        let mut pos = 0;
        while pos + 4 <= stream.len() {
            let id = u16::from_le_bytes([stream[pos], stream[pos + 1]]);
            let len = u16::from_le_bytes([stream[pos + 2], stream[pos + 3]]) as usize;
            found.push((id, len));
            pos += 4 + len;
        }
        found
    }

    #[test]
    fn test_stream_layout() {
        let mut sheet = Sheet::new("Data");
        sheet.set(0, 0, CellValue::from("Id"));
        sheet.set(1, 0, CellValue::Number(1.0));

        let stream = workbook_stream(&[sheet]).unwrap();
        let ids: Vec<u16> = records(&stream).into_iter().map(|(id, _)| id).collect();

        assert_eq!(ids.first(), Some(&BOF));
        assert_eq!(ids.last(), Some(&EOF));
        assert_eq!(ids.iter().filter(|id| **id == BOF).count(), 2);
        assert_eq!(ids.iter().filter(|id| **id == XF).count(), 17);
        assert!(ids.contains(&SST));
        assert!(ids.contains(&LABELSST));
        assert!(ids.contains(&NUMBER));
        assert!(records(&stream).iter().all(|(_, len)| *len <= MAX_RECORD_DATA));
    }

    #[test]
    fn test_large_string_table_uses_continue() {
        let mut sheet = Sheet::new("Big");
        for row in 0..400 {
            sheet.set(row, 0, CellValue::String(format!("{row:04}-{}", "x".repeat(40))));
        }
        let stream = workbook_stream(&[sheet]).unwrap();
        let records = records(&stream);
        assert!(records.iter().any(|(id, _)| *id == CONTINUE));
        assert!(records.iter().all(|(_, len)| *len <= MAX_RECORD_DATA));
    }

    #[test]
    fn test_empty_workbook_gets_placeholder_sheet() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.xls");
        write_workbook(&path, &[]).unwrap();

        let workbook: Xls<_> = open_workbook(&path).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["Sheet1".to_string()]);
    }

    #[test]
    fn test_round_trip_through_calamine() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.xls");

        let mut first = Sheet::new("First");
        first.set(0, 0, CellValue::from("Name"));
        first.set(0, 1, CellValue::from("Qty"));
        first.set(1, 0, CellValue::from("Grüße"));
        first.set(1, 1, CellValue::Number(12.5));
        first.set(2, 0, CellValue::from("Name"));
        first.set(2, 2, CellValue::Bool(true));
        let mut second = Sheet::new("Second");
        second.set(3, 4, CellValue::from("far"));

        write_workbook(&path, &[first, second]).unwrap();

        let mut workbook: Xls<_> = open_workbook(&path).unwrap();
        assert_eq!(
            workbook.sheet_names(),
            vec!["First".to_string(), "Second".to_string()]
        );

        let range = workbook.worksheet_range("First").unwrap();
        assert_eq!(range.get_value((0, 0)), Some(&Data::String("Name".into())));
        assert_eq!(range.get_value((1, 0)), Some(&Data::String("Grüße".into())));
        assert_eq!(range.get_value((1, 1)), Some(&Data::Float(12.5)));
        assert_eq!(range.get_value((2, 0)), Some(&Data::String("Name".into())));
        assert_eq!(range.get_value((2, 2)), Some(&Data::Bool(true)));

        let range = workbook.worksheet_range("Second").unwrap();
        let sheet = Sheet::from_range("Second", &range);
        assert_eq!(sheet.get(3, 4), &CellValue::from("far"));
    }

    #[test]
    fn test_oversized_sheet_rejected() {
        let mut sheet = Sheet::new("Wide");
        sheet.set(0, MAX_COLS, CellValue::from("x"));
        assert!(matches!(
            workbook_stream(&[sheet]),
            Err(RulesError::CellOutOfBounds { col: 256, .. })
        ));
    }

    #[test]
    fn test_long_sheet_name_rejected_before_writing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("long.xls");
        let sheet = Sheet::new("A name well beyond the sheet limit");

        assert!(matches!(
            write_workbook(&path, &[sheet]),
            Err(RulesError::Save { reason, .. }) if reason.contains("longer than 31")
        ));
        assert!(!path.exists());
    }
}
