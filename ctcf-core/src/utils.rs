use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use csv::StringRecord;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Zstd,
}

impl Compression {
    /// Guess the compression from the file extension.
    pub fn from_extension<P: AsRef<Path>>(file: P) -> Option<Self> {
        match file.as_ref().extension().and_then(|x| x.to_str()) {
            Some("gz") | Some("gzip") => Some(Compression::Gzip),
            Some("zst") | Some("zstd") => Some(Compression::Zstd),
            _ => None,
        }
    }
}

fn open<P: AsRef<Path>>(file: P) -> Result<File> {
    File::open(file.as_ref()).map_err(|source| Error::File { path: file.as_ref().to_path_buf(), source })
}

/// An output file, compressed or not. Call [`FileWriter::finish`] once
/// everything is written, otherwise errors from the compression trailer are
/// lost on drop.
pub enum FileWriter {
    Plain(BufWriter<File>),
    Gzip(flate2::write::GzEncoder<BufWriter<File>>),
    Zstd(zstd::stream::Encoder<'static, BufWriter<File>>),
}

impl FileWriter {
    /// Complete the compressed stream and flush the file.
    pub fn finish(self) -> Result<()> {
        let mut inner = match self {
            FileWriter::Plain(w) => w,
            FileWriter::Gzip(w) => w.finish()?,
            FileWriter::Zstd(w) => w.finish()?,
        };
        inner.flush()?;
        Ok(())
    }
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            FileWriter::Plain(w) => w.write(buf),
            FileWriter::Gzip(w) => w.write(buf),
            FileWriter::Zstd(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            FileWriter::Plain(w) => w.flush(),
            FileWriter::Gzip(w) => w.flush(),
            FileWriter::Zstd(w) => w.flush(),
        }
    }
}

/// Open a file for writing. The output is compressed when the file name
/// ends with `.gz` or `.zst`.
pub fn open_file_for_write<P: AsRef<Path>>(filename: P) -> Result<FileWriter> {
    let buffer = BufWriter::new(
        File::create(filename.as_ref())
            .map_err(|source| Error::File { path: filename.as_ref().to_path_buf(), source })?
    );
    let writer = match Compression::from_extension(filename.as_ref()) {
        None => FileWriter::Plain(buffer),
        Some(Compression::Gzip) => FileWriter::Gzip(
            flate2::write::GzEncoder::new(buffer, flate2::Compression::new(6))
        ),
        Some(Compression::Zstd) => FileWriter::Zstd(zstd::stream::Encoder::new(buffer, 3)?),
    };
    Ok(writer)
}

/// Open a file, possibly compressed. Supports gzip and zstd.
pub fn open_file_for_read<P: AsRef<Path>>(file: P) -> Result<Box<dyn BufRead>> {
    let reader: Box<dyn Read> = match detect_compression(file.as_ref())? {
        Some(Compression::Gzip) => Box::new(flate2::read::MultiGzDecoder::new(open(file.as_ref())?)),
        Some(Compression::Zstd) => Box::new(zstd::stream::read::Decoder::new(open(file.as_ref())?)?),
        None => Box::new(open(file.as_ref())?),
    };
    Ok(Box::new(BufReader::new(reader)))
}

/// Determine the file compression type. Gzip is detected from the magic
/// bytes, zstd from the extension.
fn detect_compression<P: AsRef<Path>>(file: P) -> Result<Option<Compression>> {
    let mut magic = [0u8; 2];
    let n = open(file.as_ref())?.read(&mut magic)?;
    if n == 2 && magic == [0x1f, 0x8b] {
        Ok(Some(Compression::Gzip))
    } else if Compression::from_extension(file.as_ref()) == Some(Compression::Zstd) {
        Ok(Some(Compression::Zstd))
    } else {
        Ok(None)
    }
}

/// A reader for a headed, delimited table. Lines starting with `#` are
/// skipped.
pub fn table_reader<R: Read>(reader: R, delimiter: u8) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(reader)
}

pub fn table_writer<W: Write>(writer: W, delimiter: u8) -> csv::Writer<W> {
    csv::WriterBuilder::new().delimiter(delimiter).from_writer(writer)
}

/// Locate every `required` column in `headers`. All absent columns are
/// reported at once.
pub fn require_columns(
    headers: &StringRecord,
    required: &[&str],
    source_name: &str,
) -> Result<Vec<usize>> {
    let (found, missing): (Vec<_>, Vec<_>) = required.iter()
        .map(|col| (col, column_index(headers, col)))
        .partition(|(_, idx)| idx.is_some());
    if !missing.is_empty() {
        return Err(Error::missing(source_name, missing.into_iter().map(|(col, _)| *col)));
    }
    Ok(found.into_iter().filter_map(|(_, idx)| idx).collect())
}

pub fn column_index(headers: &StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name)
}

/// 1-based line number of a record, for error messages.
pub(crate) fn line_of(record: &StringRecord) -> usize {
    record.position().map_or(0, |p| p.line() as usize)
}
