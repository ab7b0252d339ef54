use std::io::{self, BufRead};
use std::marker::PhantomData;
use std::str::FromStr;

use super::ParseError;
use crate::error::{Error, Result};

/// An iterator over records of a headerless, tab-delimited reader.
///
/// This is created by calling [`Reader::records`]. Blank lines and lines
/// starting with `#` are skipped.
pub struct Records<'a, B, R> {
    inner: &'a mut Reader<R>,
    buf: String,
    phantom: PhantomData<B>,
}

impl<'a, B, R> Records<'a, B, R>
where
    R: BufRead,
    B: FromStr<Err = ParseError>,
{
    pub fn new(inner: &'a mut Reader<R>) -> Self {
        Self {
            inner,
            buf: String::new(),
            phantom: PhantomData,
        }
    }
}

impl<'a, B, R> Iterator for Records<'a, B, R>
where
    R: BufRead,
    B: FromStr<Err = ParseError>,
{
    type Item = Result<B>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.inner.read_record(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {
                    if self.buf.trim().is_empty() || self.buf.starts_with('#') {
                        continue;
                    }
                    let line = self.inner.line;
                    return Some(self.buf.parse().map_err(|e| Error::record(line, e)));
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

/// A reader of headerless BED-like records.
pub struct Reader<R> {
    inner: R,
    line: usize,
}

impl<R> Reader<R>
where
    R: BufRead,
{
    pub fn new(inner: R) -> Self {
        Self { inner, line: 0 }
    }

    /// Reads a single raw line, without the line terminator.
    pub fn read_record(&mut self, buf: &mut String) -> io::Result<usize> {
        let n = read_line(&mut self.inner, buf)?;
        if n > 0 {
            self.line += 1;
        }
        Ok(n)
    }

    /// Returns an iterator over records starting from the current stream position.
    pub fn records<B: FromStr<Err = ParseError>>(&mut self) -> Records<'_, B, R> {
        Records::new(self)
    }
}

fn read_line<R>(reader: &mut R, buf: &mut String) -> io::Result<usize>
where
    R: BufRead,
{
    const LINE_FEED: char = '\n';
    const CARRIAGE_RETURN: char = '\r';

    let n = reader.read_line(buf)?;
    if buf.ends_with(LINE_FEED) {
        buf.pop();
        if buf.ends_with(CARRIAGE_RETURN) {
            buf.pop();
        }
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bed::NamedRegion;

    #[test]
    fn test_read_line() {
        fn t(buf: &mut String, mut reader: &[u8], expected: &str) {
            buf.clear();
            read_line(&mut reader, buf).unwrap();
            assert_eq!(buf, expected);
        }

        let mut buf = String::new();

        t(&mut buf, b"chr1\t1\t2\n", "chr1\t1\t2");
        t(&mut buf, b"chr1\t1\t2\r\n", "chr1\t1\t2");
        t(&mut buf, b"chr1\t1\t2", "chr1\t1\t2");
    }

    #[test]
    fn test_read_record() {
        let data = b"\
chr1\t200\t1000\tr1
# comment

chr10\t2000\t10000\tr3
" as &[u8];
        let mut reader = Reader::new(data);
        let records: Vec<NamedRegion> = reader.records().collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].name, "r3");
    }

    #[test]
    fn test_error_line_number() {
        let data = b"chr1\t200\t1000\tr1\nchr1\t200\t100\tr2\n" as &[u8];
        let mut reader = Reader::new(data);
        let err = reader.records::<NamedRegion>().collect::<Result<Vec<_>>>().unwrap_err();
        assert!(matches!(err, Error::InvalidInterval { line: 2, .. }));
    }
}
