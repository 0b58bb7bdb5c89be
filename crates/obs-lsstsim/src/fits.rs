//! FITS header access.
//!
//! Files are opened through `fitsio`, so plain and gzip-compressed files
//! read the same way and cfitsio does the HDU navigation. Each header is
//! turned into a [`Header`], an ordered list of keyword cards that the
//! registries and the ingest step query. Writing produces HDUs that carry
//! a header and a zero-filled data unit; an output name ending in `.gz` is
//! compressed by cfitsio on close.
//!
//! Pixels are only handled for two-dimensional primary images, read as
//! `f32` and written back with an optional `u16` mask extension.

use std::fmt;
use std::path::Path;

use fitsio::hdu::FitsHdu;
use fitsio::images::{ImageDescription, ImageType};
use fitsio::FitsFile;

use crate::error::{Error, Result};

/// Keywords that describe HDU structure. cfitsio writes them itself.
const STRUCTURAL: &[&str] = &[
    "SIMPLE", "BITPIX", "NAXIS", "EXTEND", "XTENSION", "PCOUNT", "GCOUNT",
];

/// Scaling keywords of integer data, dropped when pixels are written as `f32`.
const SCALING: &[&str] = &["BZERO", "BSCALE", "BLANK"];

/// A header card value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Quoted character string.
    Text(String),
    /// Integer.
    Integer(i64),
    /// Floating point.
    Float(f64),
    /// `T` or `F`.
    Logical(bool),
}

impl Value {
    /// The string value, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The integer value; floats with no fractional part also convert.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    /// The numeric value as a float.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// The logical value, if this is a logical.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Logical(b) => Some(*b),
            _ => None,
        }
    }
}

/// Renders values the way they would be stored in a metadata table.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Logical(b) => f.write_str(if *b { "True" } else { "False" }),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Logical(b)
    }
}

/// A keyword card.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    /// Upper-case keyword, at most 8 characters.
    pub keyword: String,
    /// Card value.
    pub value: Value,
    /// Trailing comment, if any.
    pub comment: Option<String>,
}

/// An ordered list of keyword cards.
///
/// `COMMENT`, `HISTORY` and blank cards are not kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    cards: Vec<Card>,
}

impl Header {
    /// Create an empty header.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a primary image header with the mandatory keywords.
    #[must_use]
    pub fn image(bitpix: i64, axes: &[i64]) -> Self {
        let mut header = Self::new();
        header.set("SIMPLE", true);
        header.set("BITPIX", bitpix);
        header.set("NAXIS", axes.len() as i64);
        for (i, n) in axes.iter().enumerate() {
            header.set(&format!("NAXIS{}", i + 1), *n);
        }
        header
    }

    /// Create an empty image extension header.
    #[must_use]
    pub fn extension() -> Self {
        let mut header = Self::new();
        header.set("XTENSION", "IMAGE");
        header.set("BITPIX", 8);
        header.set("NAXIS", 0);
        header.set("PCOUNT", 0);
        header.set("GCOUNT", 1);
        header
    }

    /// Set a keyword, replacing any existing card with the same keyword.
    pub fn set(&mut self, keyword: &str, value: impl Into<Value>) {
        let keyword = keyword.to_uppercase();
        let value = value.into();
        match self.cards.iter_mut().find(|c| c.keyword == keyword) {
            Some(card) => card.value = value,
            None => self.cards.push(Card {
                keyword,
                value,
                comment: None,
            }),
        }
    }

    /// Remove a keyword, returning its value.
    pub fn remove(&mut self, keyword: &str) -> Option<Value> {
        let index = self
            .cards
            .iter()
            .position(|c| c.keyword.eq_ignore_ascii_case(keyword))?;
        Some(self.cards.remove(index).value)
    }

    /// Look up a keyword.
    #[must_use]
    pub fn get(&self, keyword: &str) -> Option<&Value> {
        self.cards
            .iter()
            .find(|c| c.keyword.eq_ignore_ascii_case(keyword))
            .map(|c| &c.value)
    }

    /// Whether a keyword is present.
    #[must_use]
    pub fn contains(&self, keyword: &str) -> bool {
        self.get(keyword).is_some()
    }

    /// Width and height of a two-dimensional image.
    ///
    /// # Errors
    ///
    /// Returns an error unless `NAXIS` is 2 and both axes are non-negative.
    pub fn image_size(&self) -> Result<(usize, usize)> {
        let naxis = self.require_i64("NAXIS")?;
        if naxis != 2 {
            return Err(Error::InvalidHeaderValue {
                keyword: "NAXIS".to_string(),
                value: naxis.to_string(),
            });
        }
        let axis = |keyword: &str| {
            let n = self.require_i64(keyword)?;
            usize::try_from(n).map_err(|_| Error::InvalidHeaderValue {
                keyword: keyword.to_string(),
                value: n.to_string(),
            })
        };
        Ok((axis("NAXIS1")?, axis("NAXIS2")?))
    }

    /// Cards in file order.
    #[must_use]
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Number of cards.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// Whether the header has no cards.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Look up a keyword that must be present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingHeaderKey`] if it is absent.
    pub fn require(&self, keyword: &str) -> Result<&Value> {
        self.get(keyword)
            .ok_or_else(|| Error::missing_header_key(keyword))
    }

    fn invalid(keyword: &str, value: &Value) -> Error {
        Error::InvalidHeaderValue {
            keyword: keyword.to_string(),
            value: value.to_string(),
        }
    }

    /// A required string keyword.
    ///
    /// # Errors
    ///
    /// Returns an error if the keyword is missing or not a string.
    pub fn require_str(&self, keyword: &str) -> Result<&str> {
        let value = self.require(keyword)?;
        value.as_str().ok_or_else(|| Self::invalid(keyword, value))
    }

    /// A required integer keyword.
    ///
    /// # Errors
    ///
    /// Returns an error if the keyword is missing or not integral.
    pub fn require_i64(&self, keyword: &str) -> Result<i64> {
        let value = self.require(keyword)?;
        value.as_i64().ok_or_else(|| Self::invalid(keyword, value))
    }

    /// A required numeric keyword.
    ///
    /// # Errors
    ///
    /// Returns an error if the keyword is missing or not numeric.
    pub fn require_f64(&self, keyword: &str) -> Result<f64> {
        let value = self.require(keyword)?;
        value.as_f64().ok_or_else(|| Self::invalid(keyword, value))
    }

    /// An optional numeric keyword; non-numeric values count as absent.
    #[must_use]
    pub fn get_f64(&self, keyword: &str) -> Option<f64> {
        self.get(keyword).and_then(Value::as_f64)
    }

    /// Build a header from raw 80-character keyword records.
    ///
    /// Records without a value indicator (`COMMENT`, `HISTORY`, blank) and
    /// records whose value does not parse are dropped. `END` stops parsing.
    #[must_use]
    pub fn from_records<S: AsRef<str>>(records: &[S]) -> Self {
        let mut header = Self::new();
        for record in records {
            let record = record.as_ref();
            let Some(keyword) = record.get(..8.min(record.len())).map(str::trim) else {
                continue;
            };
            if keyword == "END" {
                break;
            }
            if keyword.is_empty() || record.get(8..10) != Some("= ") {
                continue;
            }
            let Some(field) = record.get(10..) else {
                continue;
            };
            if let (Some(value), comment) = parse_value(field) {
                header.cards.push(Card {
                    keyword: keyword.to_uppercase(),
                    value,
                    comment,
                });
            }
        }
        header
    }

    fn image_description(&self, path: &Path) -> Result<(ImageType, Vec<usize>)> {
        let bitpix = self.get("BITPIX").and_then(Value::as_i64).unwrap_or(8);
        let data_type = match bitpix {
            8 => ImageType::UnsignedByte,
            16 => ImageType::Short,
            32 => ImageType::Long,
            64 => ImageType::LongLong,
            -32 => ImageType::Float,
            -64 => ImageType::Double,
            other => return Err(Error::fits(path, format!("unsupported BITPIX {other}"))),
        };
        let naxis = self.get("NAXIS").and_then(Value::as_i64).unwrap_or(0);
        let mut dimensions = (1..=naxis)
            .map(|i| {
                let keyword = format!("NAXIS{i}");
                self.require_i64(&keyword).and_then(|n| {
                    usize::try_from(n)
                        .map_err(|_| Error::fits(path, format!("{keyword} = {n} is negative")))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        // fitsio takes the slowest-varying axis first
        dimensions.reverse();
        Ok((data_type, dimensions))
    }
}

fn is_structural(keyword: &str) -> bool {
    STRUCTURAL.contains(&keyword)
        || keyword
            .strip_prefix("NAXIS")
            .is_some_and(|n| n.bytes().all(|b| b.is_ascii_digit()))
}

/// Parse the value field of a card (columns 11-80).
fn parse_value(field: &str) -> (Option<Value>, Option<String>) {
    let s = field.trim_start();
    if let Some(rest) = s.strip_prefix('\'') {
        let mut text = String::new();
        let mut chars = rest.chars().peekable();
        let mut closed = false;
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    text.push('\'');
                    chars.next();
                } else {
                    closed = true;
                    break;
                }
            } else {
                text.push(c);
            }
        }
        if !closed {
            return (None, None);
        }
        let remainder: String = chars.collect();
        let comment = remainder
            .trim()
            .strip_prefix('/')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        return (Some(Value::Text(text.trim_end().to_string())), comment);
    }

    let (value_part, comment) = match s.split_once('/') {
        Some((v, c)) => (v.trim(), Some(c.trim().to_string()).filter(|c| !c.is_empty())),
        None => (s.trim(), None),
    };
    let value = match value_part {
        "" => None,
        "T" => Some(Value::Logical(true)),
        "F" => Some(Value::Logical(false)),
        v => v
            .parse::<i64>()
            .map(Value::Integer)
            .or_else(|_| v.replace(['D', 'd'], "E").parse::<f64>().map(Value::Float))
            .ok(),
    };
    (value, comment)
}


fn fits_error(path: &Path) -> impl Fn(fitsio::errors::Error) -> Error + '_ {
    move |e| Error::fits(path, e.to_string())
}

fn open(path: &Path) -> Result<FitsFile> {
    FitsFile::open(path).map_err(fits_error(path))
}

fn read_hdu(path: &Path, fptr: &mut FitsFile, index: usize) -> Result<Header> {
    fptr.hdu(index)
        .map_err(|e| Error::fits(path, format!("HDU {index}: {e}")))?;
    let records = raw::header_records(fptr)
        .map_err(|status| Error::fits(path, format!("HDU {index}: cfitsio status {status}")))?;
    Ok(Header::from_records(&records))
}

/// Read the primary header.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or has no valid header.
pub fn read_primary_header(path: &Path) -> Result<Header> {
    read_header(path, 0)
}

/// Read the header of HDU `index` (0 is the primary HDU).
///
/// # Errors
///
/// Returns an error if the file cannot be opened, is malformed, or has
/// fewer HDUs.
pub fn read_header(path: &Path, index: usize) -> Result<Header> {
    let mut fptr = open(path)?;
    read_hdu(path, &mut fptr, index)
}

/// Read every header in the file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or is malformed.
pub fn read_headers(path: &Path) -> Result<Vec<Header>> {
    let mut fptr = open(path)?;
    let mut headers = Vec::new();
    while fptr.hdu(headers.len()).is_ok() {
        let index = headers.len();
        headers.push(read_hdu(path, &mut fptr, index)?);
    }
    Ok(headers)
}

/// Write a file made of the given HDUs, with zero-filled data units.
///
/// The first header becomes the primary HDU, the rest image extensions
/// named by their `EXTNAME` card (`HDU<n>` when absent). Structural
/// keywords are taken from `BITPIX` and `NAXISn`; every other card is
/// written as a keyword. An existing file is replaced.
///
/// # Errors
///
/// Returns an error if a header has no usable image description or the
/// file cannot be written.
pub fn write_headers(path: &Path, headers: &[Header]) -> Result<()> {
    let Some((primary, extensions)) = headers.split_first() else {
        return Err(Error::fits(path, "no headers to write"));
    };
    let (data_type, dimensions) = primary.image_description(path)?;
    let description = ImageDescription {
        data_type,
        dimensions: &dimensions,
    };
    let mut fptr = FitsFile::create(path)
        .with_custom_primary(&description)
        .overwrite()
        .open()
        .map_err(fits_error(path))?;
    let hdu = fptr.primary_hdu().map_err(fits_error(path))?;
    write_cards(path, &mut fptr, &hdu, primary, false)?;

    for (i, header) in extensions.iter().enumerate() {
        let (data_type, dimensions) = header.image_description(path)?;
        let description = ImageDescription {
            data_type,
            dimensions: &dimensions,
        };
        let name = header
            .get("EXTNAME")
            .and_then(Value::as_str)
            .map_or_else(|| format!("HDU{}", i + 1), str::to_string);
        let hdu = fptr
            .create_image(name, &description)
            .map_err(fits_error(path))?;
        write_cards(path, &mut fptr, &hdu, header, true)?;
    }
    Ok(())
}

/// Read the primary header and its pixels, converted to `f32`.
///
/// Pixels are in row-major order, `NAXIS1` values per row.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the primary HDU is not a
/// two-dimensional image.
pub fn read_image(path: &Path) -> Result<(Header, Vec<f32>)> {
    let mut fptr = open(path)?;
    let header = read_hdu(path, &mut fptr, 0)?;
    header.image_size()?;
    let hdu = fptr.primary_hdu().map_err(fits_error(path))?;
    let pixels: Vec<f32> = hdu.read_image(&mut fptr).map_err(fits_error(path))?;
    Ok((header, pixels))
}

/// Write a two-dimensional `f32` image, with an optional `MASK` extension
/// of the same size.
///
/// The size comes from the header's `NAXIS1` and `NAXIS2`; `BZERO`,
/// `BSCALE` and `BLANK` are dropped. An existing file is replaced.
///
/// # Errors
///
/// Returns an error if a plane does not match the header's size or the
/// file cannot be written.
pub fn write_image(path: &Path, header: &Header, pixels: &[f32], mask: Option<&[u16]>) -> Result<()> {
    let (width, height) = header.image_size()?;
    let expected = width
        .checked_mul(height)
        .ok_or_else(|| Error::fits(path, format!("image of {width}x{height} pixels is too large")))?;
    let mismatch = std::iter::once(pixels.len())
        .chain(mask.map(<[u16]>::len))
        .find(|&len| len != expected);
    if let Some(len) = mismatch {
        return Err(Error::fits(
            path,
            format!("plane has {len} pixels, expected {width}x{height}"),
        ));
    }

    let dimensions = [height, width];
    let mut fptr = FitsFile::create(path)
        .with_custom_primary(&ImageDescription {
            data_type: ImageType::Float,
            dimensions: &dimensions,
        })
        .overwrite()
        .open()
        .map_err(fits_error(path))?;
    let hdu = fptr.primary_hdu().map_err(fits_error(path))?;
    let mut cards = header.clone();
    for keyword in SCALING {
        cards.remove(keyword);
    }
    write_cards(path, &mut fptr, &hdu, &cards, false)?;
    hdu.write_image(&mut fptr, pixels).map_err(fits_error(path))?;

    if let Some(mask) = mask {
        let hdu = fptr
            .create_image(
                "MASK",
                &ImageDescription {
                    data_type: ImageType::UnsignedShort,
                    dimensions: &dimensions,
                },
            )
            .map_err(fits_error(path))?;
        hdu.write_image(&mut fptr, mask).map_err(fits_error(path))?;
    }
    Ok(())
}

fn write_cards(
    path: &Path,
    fptr: &mut FitsFile,
    hdu: &FitsHdu,
    header: &Header,
    extension: bool,
) -> Result<()> {
    for card in header.cards() {
        let keyword = card.keyword.as_str();
        if is_structural(keyword) || (extension && keyword == "EXTNAME") {
            continue;
        }
        match &card.value {
            Value::Text(s) => hdu.write_key(fptr, keyword, s.as_str()),
            Value::Integer(i) => hdu.write_key(fptr, keyword, *i),
            Value::Float(f) => hdu.write_key(fptr, keyword, *f),
            Value::Logical(b) => {
                raw::write_logical(fptr, keyword, *b).map_err(|status| {
                    Error::fits(path, format!("{keyword}: cfitsio status {status}"))
                })?;
                Ok(())
            }
        }
        .map_err(fits_error(path))?;
    }
    Ok(())
}

/// Keyword access the safe `fitsio` API does not offer: listing every
/// record of an HDU and writing logical values.
#[allow(unsafe_code)]
mod raw {
    use std::ffi::{c_char, c_int, CStr, CString};

    use fitsio::sys;
    use fitsio::FitsFile;

    /// 80 characters plus the terminator.
    const RECORD_LEN: usize = 81;
    /// cfitsio `BAD_KEYCHAR`.
    const BAD_KEYCHAR: c_int = 207;

    /// Every keyword record of the current HDU, in order.
    pub(super) fn header_records(fptr: &mut FitsFile) -> Result<Vec<String>, c_int> {
        let mut status: c_int = 0;
        let mut count: c_int = 0;
        let mut more: c_int = 0;
        // SAFETY: the handle belongs to an open file and the out-parameters
        // are live locals.
        unsafe {
            sys::ffghsp(fptr.as_raw(), &mut count, &mut more, &mut status);
        }
        if status != 0 {
            return Err(status);
        }
        let mut records = Vec::with_capacity(usize::try_from(count).unwrap_or_default());
        for n in 1..=count {
            let mut buf: [c_char; RECORD_LEN] = [0; RECORD_LEN];
            // SAFETY: ffgrec writes at most 80 characters and a NUL into `buf`.
            let record = unsafe {
                sys::ffgrec(fptr.as_raw(), n, buf.as_mut_ptr(), &mut status);
                if status != 0 {
                    return Err(status);
                }
                CStr::from_ptr(buf.as_ptr())
            };
            records.push(record.to_string_lossy().into_owned());
        }
        Ok(records)
    }

    /// Append a logical keyword to the current HDU.
    pub(super) fn write_logical(fptr: &mut FitsFile, keyword: &str, value: bool) -> Result<(), c_int> {
        let keyword = CString::new(keyword).map_err(|_| BAD_KEYCHAR)?;
        let comment = CString::default();
        let mut status: c_int = 0;
        // SAFETY: both strings outlive the call and the handle belongs to an
        // open file.
        unsafe {
            sys::ffpkyl(
                fptr.as_raw(),
                keyword.as_ptr(),
                c_int::from(value),
                comment.as_ptr(),
                &mut status,
            );
        }
        if status == 0 {
            Ok(())
        } else {
            Err(status)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Header {
        let mut h = Header::image(16, &[10, 20]);
        h.set("OBSID", "85471048");
        h.set("EXPTIME", 15.0);
        h.set("MJD-OBS", 51_544.5);
        h.set("SATURATE", 100_000);
        h.set("NOTE", "it's");
        h.set("SNAPCOMB", true);
        h
    }

    fn record(text: &str) -> String {
        format!("{text:<80}")
    }

    #[test]
    fn test_parse_value_kinds() {
        assert_eq!(parse_value("                   T").0, Some(Value::Logical(true)));
        assert_eq!(parse_value("  42 / answer"), (Some(Value::Integer(42)), Some("answer".into())));
        assert_eq!(parse_value(" 1.5D2").0, Some(Value::Float(150.0)));
        assert_eq!(
            parse_value("'R22_S11 '  / chip"),
            (Some(Value::Text("R22_S11".into())), Some("chip".into()))
        );
        assert_eq!(parse_value("'O''Brien'").0, Some(Value::Text("O'Brien".into())));
        assert_eq!(parse_value("'unterminated").0, None);
        assert_eq!(parse_value("   ").0, None);
    }

    #[test]
    fn test_from_records() {
        let header = Header::from_records(&[
            record("SIMPLE  =                    T"),
            record("COMMENT   not a keyword"),
            record("EXPTIME =                 15.0 / seconds"),
            record("CHIPID  = 'R22_S11 '"),
            record(""),
            record("END"),
            record("AFTER   =                    1"),
        ]);
        assert_eq!(header.len(), 3);
        assert_eq!(header.get_f64("EXPTIME"), Some(15.0));
        assert_eq!(header.cards()[1].comment.as_deref(), Some("seconds"));
        assert_eq!(header.require_str("CHIPID").unwrap(), "R22_S11");
        assert!(!header.contains("AFTER"));
    }

    #[test]
    fn test_from_records_tolerates_short_records() {
        let header = Header::from_records(&["END", "X", "NAXIS1  =", "NAXIS2  = 4"]);
        assert!(header.is_empty());
        let header = Header::from_records(&["NAXIS   = 2", "NAXIS2  ="]);
        assert_eq!(header.require_i64("NAXIS").unwrap(), 2);
        assert_eq!(header.len(), 1);
    }

    #[test]
    fn test_structural_keywords() {
        assert!(is_structural("NAXIS"));
        assert!(is_structural("NAXIS2"));
        assert!(is_structural("XTENSION"));
        assert!(!is_structural("NAXISX"));
        assert!(!is_structural("EXPTIME"));
    }

    #[test]
    fn test_image_description() {
        let path = Path::new("x.fits");
        let (data_type, dims) = Header::image(-32, &[16, 8]).image_description(path).unwrap();
        assert!(matches!(data_type, ImageType::Float));
        assert_eq!(dims, vec![8, 16]);
        assert!(Header::image(12, &[2]).image_description(path).is_err());
        let mut missing = Header::image(16, &[4, 4]);
        missing.set("NAXIS", 3);
        assert!(missing.image_description(path).is_err());
        assert!(Header::image(16, &[-1]).image_description(path).is_err());
    }

    #[test]
    fn test_write_and_read_multiple_hdus() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("defects.fits");
        let mut ext = Header::extension();
        ext.set("NAME", "R:2,2 S:1,1");
        write_headers(&path, &[sample(), ext]).unwrap();

        let headers = read_headers(&path).unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].require_str("OBSID").unwrap(), "85471048");
        assert_eq!(headers[0].require_str("NOTE").unwrap(), "it's");
        assert_eq!(headers[0].require_i64("SATURATE").unwrap(), 100_000);
        assert_eq!(headers[0].require_i64("NAXIS1").unwrap(), 10);
        assert_eq!(headers[0].get("SNAPCOMB").and_then(Value::as_bool), Some(true));
        assert!((headers[0].require_f64("MJD-OBS").unwrap() - 51_544.5).abs() < 1e-9);
        assert_eq!(
            read_header(&path, 1).unwrap().require_str("NAME").unwrap(),
            "R:2,2 S:1,1"
        );
        assert!(read_header(&path, 2).is_err());
    }

    #[test]
    fn test_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.fits");
        write_headers(&path, &[sample()]).unwrap();
        let mut other = Header::image(8, &[]);
        other.set("OBSID", "1");
        write_headers(&path, &[other]).unwrap();
        assert_eq!(read_primary_header(&path).unwrap().require_str("OBSID").unwrap(), "1");
    }

    #[test]
    fn test_write_requires_a_header() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_headers(&dir.path().join("none.fits"), &[]).is_err());
    }

    #[test]
    fn test_read_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lsst_a_1_R22_S11_C00.fits.gz");
        write_headers(&path, &[sample()]).unwrap();
        let header = read_primary_header(&path).unwrap();
        assert_eq!(header.require_i64("NAXIS2").unwrap(), 20);
    }

    #[test]
    fn test_missing_and_invalid_keywords() {
        let h = sample();
        assert!(matches!(
            h.require_f64("AIRMASS"),
            Err(Error::MissingHeaderKey { .. })
        ));
        assert!(matches!(
            h.require_f64("OBSID"),
            Err(Error::InvalidHeaderValue { .. })
        ));
    }

    #[test]
    fn test_read_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.fits");
        std::fs::write(&path, b"not a fits file").unwrap();
        assert!(matches!(read_primary_header(&path), Err(Error::Fits { .. })));
        assert!(matches!(
            read_primary_header(&dir.path().join("absent.fits")),
            Err(Error::Fits { .. })
        ));
    }

    #[test]
    fn test_oversized_axes_are_a_skippable_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.fits");
        let mut block: String = [
            "SIMPLE  =                    T",
            "BITPIX  =                   64",
            "NAXIS   =                    3",
            "NAXIS1  =             10000000",
            "NAXIS2  =             10000000",
            "NAXIS3  =             10000000",
            "END",
        ]
        .iter()
        .map(|card| record(card))
        .collect();
        block.push_str(&" ".repeat(2880 - block.len()));
        std::fs::write(&path, block).unwrap();

        match read_primary_header(&path) {
            Ok(header) => assert_eq!(header.require_i64("NAXIS3").unwrap(), 10_000_000),
            Err(e) => assert!(e.is_skippable()),
        }
        assert!(matches!(read_header(&path, 1), Err(Error::Fits { .. })));
        match read_headers(&path) {
            Ok(headers) => assert_eq!(headers.len(), 1),
            Err(e) => assert!(e.is_skippable()),
        }
    }

    #[test]
    fn test_remove() {
        let mut h = sample();
        assert_eq!(h.remove("exptime"), Some(Value::Float(15.0)));
        assert!(!h.contains("EXPTIME"));
        assert_eq!(h.remove("EXPTIME"), None);
    }

    #[test]
    fn test_image_size() {
        assert_eq!(Header::image(-32, &[4, 3]).image_size().unwrap(), (4, 3));
        assert!(matches!(
            Header::image(-32, &[4, 3, 2]).image_size(),
            Err(Error::InvalidHeaderValue { .. })
        ));
        assert!(Header::image(-32, &[-4, 3]).image_size().is_err());
        assert!(matches!(
            Header::new().image_size(),
            Err(Error::MissingHeaderKey { .. })
        ));
    }

    #[test]
    fn test_image_pixels_and_mask() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.fits");
        let mut header = Header::image(-32, &[3, 2]);
        header.set("BZERO", 32_768);
        header.set("EXPTIME", 15.0);
        let pixels = [0.0, 1.5, 2.0, 3.0, 4.0, 5.0];
        let mask = [0, 1, 2, 4, 8, 16];
        write_image(&path, &header, &pixels, Some(&mask)).unwrap();

        let (read, values) = read_image(&path).unwrap();
        assert_eq!(values, pixels);
        assert_eq!(read.require_i64("BITPIX").unwrap(), -32);
        assert_eq!(read.get_f64("EXPTIME"), Some(15.0));
        assert!(!read.contains("BZERO"));

        let headers = read_headers(&path).unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[1].require_str("EXTNAME").unwrap(), "MASK");
        assert_eq!(headers[1].require_i64("BITPIX").unwrap(), 16);
    }

    #[test]
    fn test_write_image_checks_plane_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.fits");
        let header = Header::image(-32, &[3, 2]);
        assert!(matches!(
            write_image(&path, &header, &[0.0; 5], None),
            Err(Error::Fits { .. })
        ));
        assert!(matches!(
            write_image(&path, &header, &[0.0; 6], Some(&[0; 4])),
            Err(Error::Fits { .. })
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_read_image_of_integer_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zeros.fits");
        write_headers(&path, &[Header::image(16, &[4, 2])]).unwrap();
        let (header, pixels) = read_image(&path).unwrap();
        assert_eq!(header.image_size().unwrap(), (4, 2));
        assert_eq!(pixels, vec![0.0; 8]);
    }

    #[test]
    fn test_set_replaces() {
        let mut h = Header::new();
        h.set("gain", 1.0);
        h.set("GAIN", 2.0);
        assert_eq!(h.len(), 1);
        assert_eq!(h.get_f64("gain"), Some(2.0));
    }
}
