pub mod io;
pub mod tree;

use once_cell::sync::Lazy;
use regex::Regex;
use std::{fmt, str::FromStr};

const DELIMITER: char = '\t';

static REGION_PATTERN: Lazy<Regex> = Lazy::new(||
    Regex::new(r"^(?P<chrom>[^:]+):(?P<start>\d+)-(?P<end>\d+)$").unwrap()
);

/// A half-open genomic interval: 0-based start, exclusive end.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct GenomicRange(String, u64, u64);

impl GenomicRange {
    pub fn new<C>(chrom: C, start: u64, end: u64) -> Self
    where
        C: Into<String>,
    { Self(chrom.into(), start, end) }

    /// Same as [`GenomicRange::new`] but rejects empty or inverted intervals.
    pub fn checked<C>(chrom: C, start: u64, end: u64) -> Result<Self, ParseError>
    where
        C: Into<String>,
    {
        let chrom = chrom.into();
        if start < end {
            Ok(Self(chrom, start, end))
        } else {
            Err(ParseError::InvalidInterval { chrom, start, end })
        }
    }
}

/// Common interval fields
pub trait BEDLike {
    /// Return the chromosome name of the record
    fn chrom(&self) -> &str;

    /// Return the 0-based start position of the record
    fn start(&self) -> u64;

    /// Return the end position (non-inclusive) of the record
    fn end(&self) -> u64;

    /// Whether two records share at least one base.
    fn overlaps<B: BEDLike>(&self, other: &B) -> bool {
        self.chrom() == other.chrom() && self.start() < other.end() && self.end() > other.start()
    }
}

impl BEDLike for GenomicRange {
    fn chrom(&self) -> &str { &self.0 }
    fn start(&self) -> u64 { self.1 }
    fn end(&self) -> u64 { self.2 }
}

impl fmt::Display for GenomicRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.0, self.1, self.2)
    }
}

/// Parse `chrom:start-end`. The whole string must match; the chromosome
/// may not contain ':'.
impl FromStr for GenomicRange {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = REGION_PATTERN.captures(s)
            .ok_or_else(|| ParseError::MalformedRegion(s.to_string()))?;
        let start = lexical::parse(&caps["start"])
            .map_err(|_| ParseError::InvalidStartPosition(caps["start"].to_string()))?;
        let end = lexical::parse(&caps["end"])
            .map_err(|_| ParseError::InvalidEndPosition(caps["end"].to_string()))?;
        GenomicRange::checked(&caps["chrom"], start, end)
    }
}

/// A BED4 record: an interval with a region identifier.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NamedRegion {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub name: String,
}

impl BEDLike for NamedRegion {
    fn chrom(&self) -> &str { &self.chrom }
    fn start(&self) -> u64 { self.start }
    fn end(&self) -> u64 { self.end }
}

/// Columns after the fourth are ignored.
impl FromStr for NamedRegion {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.split(DELIMITER);
        let chrom = parse_chrom(&mut fields)?;
        let start = parse_start(&mut fields)?;
        let end = parse_end(&mut fields)?;
        let name = fields.next().ok_or(ParseError::MissingName)?;
        let range = GenomicRange::checked(chrom, start, end)?;
        Ok(NamedRegion { chrom: range.0, start, end, name: name.to_string() })
    }
}

fn parse_chrom<'a, I>(fields: &mut I) -> Result<&'a str, ParseError>
where
    I: Iterator<Item = &'a str>,
{
    fields
        .next()
        .filter(|s| !s.is_empty())
        .ok_or(ParseError::MissingReferenceSequenceName)
}

fn parse_start<'a, I>(fields: &mut I) -> Result<u64, ParseError>
where
    I: Iterator<Item = &'a str>,
{
    fields
        .next()
        .ok_or(ParseError::MissingStartPosition)
        .and_then(|s| lexical::parse(s).map_err(|_| ParseError::InvalidStartPosition(s.to_string())))
}

fn parse_end<'a, I>(fields: &mut I) -> Result<u64, ParseError>
where
    I: Iterator<Item = &'a str>,
{
    fields
        .next()
        .ok_or(ParseError::MissingEndPosition)
        .and_then(|s| lexical::parse(s).map_err(|_| ParseError::InvalidEndPosition(s.to_string())))
}

/// An error returned when a raw record fails to parse.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("the reference sequence name is missing")]
    MissingReferenceSequenceName,
    #[error("the start position is missing")]
    MissingStartPosition,
    #[error("invalid start position '{0}'")]
    InvalidStartPosition(String),
    #[error("the end position is missing")]
    MissingEndPosition,
    #[error("invalid end position '{0}'")]
    InvalidEndPosition(String),
    #[error("the name is missing")]
    MissingName,
    #[error("interval {chrom}:{start}-{end} is empty or inverted")]
    InvalidInterval { chrom: String, start: u64, end: u64 },
    #[error("malformed region '{0}'")]
    MalformedRegion(String),
    #[error("the {0} field is missing")]
    MissingField(&'static str),
    #[error("invalid {0} field '{1}'")]
    InvalidField(&'static str, String),
}
