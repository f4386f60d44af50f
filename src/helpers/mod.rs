//! Archive, compound file, binary record and XML plumbing shared by the
//! spreadsheet readers.

pub(crate) mod biff8;
pub(crate) mod bytes;
pub(crate) mod cfb;
pub(crate) mod xml;
pub(crate) mod zip;
