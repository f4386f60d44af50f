//! Binary Interchange File Format (BIFF8) record reader for Excel 97-2003
//! workbook streams. Records longer than 8224 bytes spill into CONTINUE
//! records; the reader stitches them back together.

use crate::helpers::bytes::to_f64;
use crate::helpers::bytes::to_u16;
use crate::helpers::bytes::to_u32;
use crate::helpers::bytes::to_u64;
use crate::helpers::bytes::to_usize;
use encoding_rs::Encoding;
use encoding_rs::UTF_16BE;
use encoding_rs::UTF_16LE;
use thiserror::Error;

const CONTINUE: u16 = 60;

#[derive(Error, Debug)]
pub(crate) enum Biff8Error {
    #[error("Fewer than {0} bytes remaining in the record")]
    NoEnoughDataError(usize),
}

pub(crate) struct Biff8Reader {
    /// Code page for 8-bit strings, set by the CODEPAGE record
    pub(crate) encoding: &'static Encoding,
    buffer: Vec<u8>,
    pointer: usize,              // Start of the next record header
    chunks: Vec<(usize, usize)>, // Current record and its CONTINUE parts
    index: usize,                // Current chunk
    offset: usize,               // Offset within the current chunk
}

impl Biff8Reader {
    pub(crate) fn new(data: Vec<u8>) -> Biff8Reader {
        Biff8Reader {
            encoding: UTF_16LE,
            buffer: data,
            pointer: 0,
            chunks: Vec::new(),
            index: 0,
            offset: 0,
        }
    }

    /// Moves to the next record and returns its type; `None` at the end of the stream.
    pub(crate) fn next(&mut self) -> Result<Option<u16>, Biff8Error> {
        if self.pointer + 4 > self.buffer.len() {
            return Ok(None);
        }
        self.index = 0;
        self.offset = 0;
        self.chunks.clear();

        let kind = self.get_u16_at(self.pointer)?;
        self.push_chunk()?;
        while self.pointer + 4 <= self.buffer.len() && self.get_u16_at(self.pointer)? == CONTINUE {
            self.push_chunk()?;
        }
        Ok(Some(kind))
    }

    fn push_chunk(&mut self) -> Result<(), Biff8Error> {
        let size = self.get_u16_at(self.pointer + 2)? as usize;
        let lower = self.pointer + 4;
        let upper = self.buffer.len().min(lower + size);
        self.pointer = lower + size;
        self.chunks.push((lower, upper));
        Ok(())
    }

    /// Positions the reader at a record header, such as a sheet's BOF.
    pub(crate) fn goto(&mut self, pointer: usize) {
        self.pointer = pointer;
        self.chunks.clear();
    }

    fn read_exact(&mut self, length: usize) -> Result<&[u8], Biff8Error> {
        let (data, size) = self.read(length);
        if size == length {
            Ok(data)
        } else {
            Err(Biff8Error::NoEnoughDataError(length))
        }
    }

    /// Reads up to `length` bytes from the current chunk; never crosses into the next one.
    fn read(&mut self, length: usize) -> (&[u8], usize) {
        if let Some((lower, upper)) = self.chunks.get(self.index).copied() {
            let source = upper.min(lower + self.offset);
            let target = upper.min(source + length);
            let size = target - source;
            if source < upper {
                if target == upper {
                    self.index += 1;
                    self.offset = 0;
                } else {
                    self.offset += size;
                }
                return (&self.buffer[source..target], size);
            }
        }
        (&[], 0)
    }

    pub(crate) fn skip(&mut self, length: usize) -> Result<(), Biff8Error> {
        if length > 0 {
            self.read_exact(length)?;
        }
        Ok(())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, Biff8Error> {
        self.read_exact(1).map(|data| data[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, Biff8Error> {
        self.read_exact(2).map(to_u16)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, Biff8Error> {
        self.read_exact(4).map(to_u32)
    }

    pub(crate) fn read_usize(&mut self) -> Result<usize, Biff8Error> {
        self.read_exact(4).map(to_usize)
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, Biff8Error> {
        self.read_exact(8).map(to_u64)
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64, Biff8Error> {
        self.read_exact(8).map(to_f64)
    }

    /// Reads the u16 that ends `offset` bytes before the end of the record.
    pub(crate) fn get_u16_back(&self, offset: usize) -> Result<u16, Biff8Error> {
        let mut offset = offset;
        for (lower, upper) in self.chunks.iter().rev() {
            if *lower + offset <= *upper {
                return self.get_u16_at(*upper - offset);
            }
            offset -= *upper - *lower;
        }
        Err(Biff8Error::NoEnoughDataError(2))
    }

    fn get_u16_at(&self, index: usize) -> Result<u16, Biff8Error> {
        self.buffer
            .get(index..index + 2)
            .map(to_u16)
            .ok_or(Biff8Error::NoEnoughDataError(2))
    }

    /// Reads an RK value: a 30-bit integer or the top 30 bits of a double,
    /// optionally scaled by 1/100.
    pub(crate) fn read_rk_number(&mut self) -> Result<String, Biff8Error> {
        let value = self.read_u32()?;
        let is_percentage = (value & 0x01) != 0;
        let is_integer = (value & 0x02) != 0;

        let mut number = if is_integer {
            ((value as i32) >> 2) as f64
        } else {
            f64::from_bits(((value >> 2) as u64) << 34)
        };
        if is_percentage {
            number /= 100.0;
        }
        Ok(if is_integer && !is_percentage {
            (number as i64).to_string()
        } else {
            number.to_string()
        })
    }

    /// ShortXLUnicodeString: 1-byte character count.
    pub(crate) fn read_short_xl_unicode_string(&mut self) -> Result<String, Biff8Error> {
        let mut string = String::new();
        let chars = self.read_u8()? as usize;
        self.read_string_into(chars, false, &mut string)?;
        Ok(string)
    }

    /// XLUnicodeString: 2-byte character count.
    pub(crate) fn read_xl_unicode_string(&mut self) -> Result<String, Biff8Error> {
        let mut string = String::new();
        let chars = self.read_u16()? as usize;
        self.read_string_into(chars, false, &mut string)?;
        Ok(string)
    }

    /// XLUnicodeRichExtendedString, as stored in the shared string table. The
    /// text may continue in the next CONTINUE record, which repeats the flag byte.
    pub(crate) fn read_xl_unicode_rich_extended_string(&mut self) -> Result<String, Biff8Error> {
        let mut string = String::new();
        let mut expected = self.read_u16()? as usize;
        let mut actual = self.read_string_into(expected, true, &mut string)?;
        while actual < expected {
            expected -= actual;
            actual = self.read_string_into(expected, false, &mut string)?;
            if actual == 0 {
                return Err(Biff8Error::NoEnoughDataError(expected));
            }
        }
        Ok(string)
    }

    /// Appends up to `chars` characters to `content`, returning how many were read.
    fn read_string_into(&mut self, chars: usize, is_extended: bool, content: &mut String) -> Result<usize, Biff8Error> {
        let encoding = self.encoding;
        let flag = self.read_u8()?;
        let is_high_byte = (flag & 0x1) != 0;
        let rich_runs = if is_extended && (flag & 0x8) != 0 {
            self.read_u16()? as usize
        } else {
            0
        };
        let phonetic_size = if is_extended && (flag & 0x4) != 0 {
            self.read_usize()?
        } else {
            0
        };
        let expected = if is_high_byte { chars << 1 } else { chars };
        let (bytes, actual) = self.read(expected);
        if is_high_byte {
            content.push_str(&UTF_16LE.decode_without_bom_handling(bytes).0);
        } else if encoding == UTF_16LE || encoding == UTF_16BE {
            // Compressed text holds the low bytes of UTF-16 code units
            content.extend(bytes.iter().map(|byte| *byte as char));
        } else {
            content.push_str(&encoding.decode_without_bom_handling(bytes).0);
        }
        // Formatting runs, then the phonetic block
        self.skip(4 * rich_runs)?;
        self.skip(phonetic_size)?;
        Ok(if is_high_byte { actual >> 1 } else { actual })
    }
}

#[macro_export]
macro_rules! match_biff8_record {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(kind) = $reader.next()? {
            match kind {
                $($arms)*
                _ => (),
            }
        }
    };
}
