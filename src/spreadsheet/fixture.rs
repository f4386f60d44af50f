//! In-memory workbook builders for tests.
//!
//! Cells that parse as numbers are written as numeric cells, `TRUE`/`FALSE` as
//! booleans, empty strings are left out and everything else is text.
//!
//! Legacy workbooks are BIFF8 streams inside a version 3 compound file with
//! 512-byte sectors: sector 0 holds the allocation table, sector 1 the
//! directory, and streams under 4096 bytes go to the mini stream.

use crate::helpers::cfb::SIGNATURE;
use std::io::Cursor;
use std::io::Write;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub(crate) type Rows<'a> = &'a [&'a [&'a str]];

/// Packs `(member name, content)` pairs into a zip archive.
pub(crate) fn zip(members: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in members {
        writer.start_file(*name, SimpleFileOptions::default()).expect("start zip member");
        writer.write_all(content.as_bytes()).expect("write zip member");
    }
    writer.finish().expect("finish zip").into_inner()
}

fn escape(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}

/// Builds a single-sheet xlsx workbook named `Sheet1`.
pub(crate) fn xlsx(rows: Rows) -> Vec<u8> {
    let mut shared_strings = Vec::<String>::new();
    let mut sheet_data = String::new();
    for (row_index, row) in rows.iter().enumerate() {
        sheet_data.push_str(&format!("<row r=\"{}\">", row_index + 1));
        for (col_index, value) in row.iter().enumerate() {
            let reference = crate::spreadsheet::reference::index_to_reference(row_index, col_index);
            if value.is_empty() {
                continue;
            } else if value.parse::<f64>().is_ok() {
                sheet_data.push_str(&format!("<c r=\"{reference}\"><v>{value}</v></c>"));
            } else if *value == "TRUE" || *value == "FALSE" {
                let flag = if *value == "TRUE" { 1 } else { 0 };
                sheet_data.push_str(&format!("<c r=\"{reference}\" t=\"b\"><v>{flag}</v></c>"));
            } else {
                sheet_data.push_str(&format!("<c r=\"{reference}\" t=\"s\"><v>{}</v></c>", shared_strings.len()));
                shared_strings.push(format!("<si><t>{}</t></si>", escape(value)));
            }
        }
        sheet_data.push_str("</row>");
    }

    let content_types = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>
</Types>"#;
    let workbook = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets>
</workbook>"#;
    let relationships = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>
</Relationships>"#;
    let worksheet = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{sheet_data}</sheetData></worksheet>"#
    );
    let strings = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{0}" uniqueCount="{0}">{1}</sst>"#,
        shared_strings.len(),
        shared_strings.concat(),
    );

    zip(&[
        ("[Content_Types].xml", content_types),
        ("xl/workbook.xml", workbook),
        ("xl/_rels/workbook.xml.rels", relationships),
        ("xl/worksheets/sheet1.xml", worksheet.as_str()),
        ("xl/sharedStrings.xml", strings.as_str()),
    ])
}

/// Builds a single-table ods document whose table is named `Sheet1`.
pub(crate) fn ods(rows: Rows) -> Vec<u8> {
    let mut table = String::new();
    for row in rows {
        table.push_str("<table:table-row>");
        for value in row.iter() {
            if value.is_empty() {
                table.push_str("<table:table-cell/>");
            } else if value.parse::<f64>().is_ok() {
                table.push_str(&format!(
                    "<table:table-cell office:value-type=\"float\" office:value=\"{value}\"><text:p>{value}</text:p></table:table-cell>"
                ));
            } else {
                table.push_str(&format!(
                    "<table:table-cell office:value-type=\"string\"><text:p>{}</text:p></table:table-cell>",
                    escape(value)
                ));
            }
        }
        table.push_str("</table:table-row>");
    }
    ods_table(&table)
}

/// An .ods package whose first table holds the given row markup.
pub(crate) fn ods_table(table: &str) -> Vec<u8> {
    let content = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:table="urn:oasis:names:tc:opendocument:xmlns:table:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0">
<office:body><office:spreadsheet><table:table table:name="Sheet1">{table}</table:table><table:table table:name="Other"/></office:spreadsheet></office:body>
</office:document-content>"#
    );
    let manifest = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest:manifest xmlns:manifest="urn:oasis:names:tc:opendocument:xmlns:manifest:1.0">
<manifest:file-entry manifest:full-path="/" manifest:media-type="application/vnd.oasis.opendocument.spreadsheet"/>
<manifest:file-entry manifest:full-path="content.xml" manifest:media-type="text/xml"/>
</manifest:manifest>"#;

    zip(&[
        ("mimetype", "application/vnd.oasis.opendocument.spreadsheet"),
        ("content.xml", content.as_str()),
        ("META-INF/manifest.xml", manifest),
    ])
}

const FREE_SECTOR: u32 = 0xFFFF_FFFF;
const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
const FAT_SECTOR: u32 = 0xFFFF_FFFD;
const NO_STREAM: u32 = 0xFFFF_FFFF;

/// One BIFF record: type, length, data.
pub(crate) fn biff_record(kind: u16, data: &[u8]) -> Vec<u8> {
    let mut record = Vec::with_capacity(data.len() + 4);
    record.extend(kind.to_le_bytes());
    record.extend((data.len() as u16).to_le_bytes());
    record.extend_from_slice(data);
    record
}

fn bof(substream: u16) -> Vec<u8> {
    let mut data = [0u8; 16];
    data[..2].copy_from_slice(&0x0600u16.to_le_bytes());
    data[2..4].copy_from_slice(&substream.to_le_bytes());
    biff_record(2057, &data)
}

/// A BIFF8 string body: Latin-1 text compressed, anything else as UTF-16.
fn biff_string(text: &str) -> Vec<u8> {
    let mut bytes = Vec::new();
    if text.chars().all(|char| (char as u32) < 0x100) {
        bytes.push(0u8);
        bytes.extend(text.chars().map(|char| char as u8));
    } else {
        bytes.push(1u8);
        bytes.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
    }
    bytes
}

/// A workbook stream with one worksheet `Sheet1` holding `cells`. `globals`
/// go right after the globals BOF.
pub(crate) fn workbook_stream(globals: &[u8], shared_strings: &[&str], cells: &[u8]) -> Vec<u8> {
    let mut sst = [(shared_strings.len() as u32).to_le_bytes(), (shared_strings.len() as u32).to_le_bytes()].concat();
    for text in shared_strings {
        sst.extend((text.encode_utf16().count() as u16).to_le_bytes());
        sst.extend(biff_string(text));
    }
    let head = [bof(0x0005), globals.to_vec(), biff_record(66, &1200u16.to_le_bytes()), biff_record(252, &sst)].concat();
    let bound_sheet = |pointer: u32| {
        let mut data = pointer.to_le_bytes().to_vec();
        data.extend([0u8, 0, 6, 0]);
        data.extend_from_slice(b"Sheet1");
        biff_record(133, &data)
    };
    let eof = biff_record(10, &[]);
    let pointer = (head.len() + bound_sheet(0).len() + eof.len()) as u32;
    [head, bound_sheet(pointer), eof.clone(), bof(0x0010), cells.to_vec(), eof].concat()
}

/// Builds a single-sheet xls workbook named `Sheet1`.
pub(crate) fn xls(rows: Rows) -> Vec<u8> {
    let mut shared_strings = Vec::<&str>::new();
    let mut cells = Vec::<u8>::new();
    for (row_index, row) in rows.iter().enumerate() {
        for (col_index, value) in row.iter().enumerate() {
            let position = [(row_index as u16).to_le_bytes(), (col_index as u16).to_le_bytes(), 0u16.to_le_bytes()].concat();
            if value.is_empty() {
                continue;
            } else if let Ok(number) = value.parse::<f64>() {
                cells.extend(biff_record(515, &[position, number.to_le_bytes().to_vec()].concat()));
            } else if *value == "TRUE" || *value == "FALSE" {
                let flag = if *value == "TRUE" { 1 } else { 0 };
                cells.extend(biff_record(517, &[position, vec![flag, 0]].concat()));
            } else {
                cells.extend(biff_record(253, &[position, (shared_strings.len() as u32).to_le_bytes().to_vec()].concat()));
                shared_strings.push(*value);
            }
        }
    }
    cfb(&[("Workbook", workbook_stream(&[], &shared_strings, &cells).as_slice())])
}

/// Appends `data` as a chain of `size`-byte blocks, returning the first block id.
fn chain(data: &[u8], size: usize, blocks: &mut Vec<Vec<u8>>, table: &mut Vec<u32>) -> u32 {
    if data.is_empty() {
        return END_OF_CHAIN;
    }
    let start = blocks.len() as u32;
    let count = data.len().div_ceil(size);
    for (offset, chunk) in data.chunks(size).enumerate() {
        let mut block = chunk.to_vec();
        block.resize(size, 0);
        blocks.push(block);
        table.push(if offset + 1 == count { END_OF_CHAIN } else { start + offset as u32 + 1 });
    }
    start
}

fn directory_entry(name: &str, kind: u8, child: u32, right: u32, start: u32, size: usize) -> Vec<u8> {
    let mut entry: Vec<u8> = name.encode_utf16().chain([0]).flat_map(u16::to_le_bytes).collect();
    let length = entry.len() as u16;
    entry.resize(64, 0);
    entry.extend(length.to_le_bytes());
    entry.extend([kind, 1]);
    entry.extend(NO_STREAM.to_le_bytes()); // left sibling
    entry.extend(right.to_le_bytes());
    entry.extend(child.to_le_bytes());
    entry.resize(116, 0);
    entry.extend(start.to_le_bytes());
    entry.extend((size as u64).to_le_bytes());
    entry
}

/// Packs up to three named streams into a compound file.
pub(crate) fn cfb(streams: &[(&str, &[u8])]) -> Vec<u8> {
    let mut sectors: Vec<Vec<u8>> = vec![Vec::new(), Vec::new()];
    let mut fat: Vec<u32> = vec![FAT_SECTOR, END_OF_CHAIN];
    let mut mini_blocks = Vec::<Vec<u8>>::new();
    let mut mini_fat = Vec::<u32>::new();
    let mut entries = Vec::new();
    for (name, data) in streams {
        let start = if data.len() < 4096 {
            chain(data, 64, &mut mini_blocks, &mut mini_fat)
        } else {
            chain(data, 512, &mut sectors, &mut fat)
        };
        entries.push((*name, start, data.len()));
    }
    let mini_stream = mini_blocks.concat();
    let root_start = chain(&mini_stream, 512, &mut sectors, &mut fat);
    let mini_fat_bytes: Vec<u8> = mini_fat.iter().flat_map(|next| next.to_le_bytes()).collect();
    let mini_fat_start = chain(&mini_fat_bytes, 512, &mut sectors, &mut fat);
    let mini_fat_count = mini_fat_bytes.len().div_ceil(512) as u32;

    let child = if entries.is_empty() { NO_STREAM } else { 1 };
    let mut directory = directory_entry("Root Entry", 5, child, NO_STREAM, root_start, mini_stream.len());
    for (index, (name, start, size)) in entries.iter().enumerate() {
        let right = if index + 1 < entries.len() { index as u32 + 2 } else { NO_STREAM };
        directory.extend(directory_entry(name, 2, NO_STREAM, right, *start, *size));
    }
    directory.resize(512, 0);
    sectors[1] = directory;

    fat.resize(128, FREE_SECTOR);
    sectors[0] = fat.iter().flat_map(|next| next.to_le_bytes()).collect();

    let mut header = SIGNATURE.to_vec();
    header.resize(24, 0);
    for half in [0x003Eu16, 3, 0xFFFE, 9, 6] {
        header.extend(half.to_le_bytes());
    }
    header.resize(44, 0);
    for word in [1u32, 1, 0, 4096, mini_fat_start, mini_fat_count, END_OF_CHAIN, 0, 0] {
        header.extend(word.to_le_bytes());
    }
    header.resize(512, 0xFF);

    [header, sectors.concat()].concat()
}
