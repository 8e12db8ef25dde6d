//! Typed response schemas and the `winnow` scanner that applies them.
//!
//! A schema names the marker that introduces the interesting part of a reply
//! and lists the literal text and typed fields expected after it, in order.
//! Scanning follows formatted-input conventions: whitespace inside a literal
//! matches any run of whitespace (including none), numeric and word fields
//! skip leading whitespace, and text after the last segment is ignored.

use core::fmt;

use heapless::{String, Vec};
use winnow::ascii::{digit1, multispace0};
use winnow::combinator::{delimited, opt, preceded};
use winnow::token::{any, one_of, take_till, take_while};
use winnow::{ModalResult, Parser};

/// Maximum number of fields a single schema may extract.
pub const MAX_FIELDS: usize = 8;

/// Maximum length of a text field value.
pub const MAX_FIELD_TEXT: usize = 96;

/// Text captured for a field.
pub type FieldText = String<MAX_FIELD_TEXT>;

/// Kind of value a field expects.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FieldKind {
    /// Optionally signed decimal integer.
    Int,
    /// Run of characters up to whitespace or a comma.
    Word,
    /// Text between double quotes; the quotes are not kept.
    Quoted,
    /// Exactly one character, whitespace included.
    Char,
    /// Everything up to the end of the line.
    Line,
}

/// One step of a schema.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Segment {
    Literal(&'static str),
    Field {
        name: &'static str,
        kind: FieldKind,
    },
}

impl Segment {
    #[must_use]
    pub const fn lit(text: &'static str) -> Self {
        Segment::Literal(text)
    }

    #[must_use]
    pub const fn int(name: &'static str) -> Self {
        Segment::Field {
            name,
            kind: FieldKind::Int,
        }
    }

    #[must_use]
    pub const fn word(name: &'static str) -> Self {
        Segment::Field {
            name,
            kind: FieldKind::Word,
        }
    }

    #[must_use]
    pub const fn quoted(name: &'static str) -> Self {
        Segment::Field {
            name,
            kind: FieldKind::Quoted,
        }
    }

    #[must_use]
    pub const fn char(name: &'static str) -> Self {
        Segment::Field {
            name,
            kind: FieldKind::Char,
        }
    }

    #[must_use]
    pub const fn line(name: &'static str) -> Self {
        Segment::Field {
            name,
            kind: FieldKind::Line,
        }
    }
}

/// Marker plus the ordered segments expected after it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ResponseSchema {
    pub marker: &'static str,
    pub segments: &'static [Segment],
}

impl ResponseSchema {
    #[must_use]
    pub const fn new(marker: &'static str, segments: &'static [Segment]) -> Self {
        Self { marker, segments }
    }

    /// Number of fields the schema produces.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|segment| matches!(segment, Segment::Field { .. }))
            .count()
    }
}

/// Value extracted for one field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldValue {
    Int(i32),
    Text(FieldText),
    Char(char),
}

/// Named values extracted by a scan, in schema order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Fields {
    entries: Vec<(&'static str, FieldValue), MAX_FIELDS>,
}

impl Fields {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
    }

    #[must_use]
    pub fn int(&self, name: &str) -> Option<i32> {
        match self.get(name) {
            Some(FieldValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(FieldValue::Text(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn char(&self, name: &str) -> Option<char> {
        match self.get(name) {
            Some(FieldValue::Char(value)) => Some(*value),
            _ => None,
        }
    }

    fn insert(&mut self, name: &'static str, value: FieldValue) -> Result<(), ScanError> {
        self.entries
            .push((name, value))
            .map_err(|_| ScanError::TooManyFields)
    }
}

/// Reasons a scan stops short of the full schema.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScanError {
    /// The marker never appears in the reply.
    MissingMarker,
    /// Literal text did not match.
    Literal(&'static str),
    /// A field could not be read.
    Field(&'static str),
    /// A text field is longer than [`MAX_FIELD_TEXT`].
    FieldTooLong(&'static str),
    /// The schema lists more than [`MAX_FIELDS`] fields.
    TooManyFields,
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::MissingMarker => f.write_str("marker not found"),
            ScanError::Literal(text) => write!(f, "expected `{text}`"),
            ScanError::Field(name) => write!(f, "could not read field `{name}`"),
            ScanError::FieldTooLong(name) => write!(f, "field `{name}` too long"),
            ScanError::TooManyFields => f.write_str("too many fields"),
        }
    }
}

/// Locates the schema marker in `reply` and scans the text after it.
///
/// # Errors
///
/// Returns [`ScanError`] when the marker is missing or a segment does not
/// match.
pub fn scan_reply(schema: &ResponseSchema, reply: &str) -> Result<Fields, ScanError> {
    let start = reply
        .find(schema.marker)
        .ok_or(ScanError::MissingMarker)?;
    scan(schema.segments, &reply[start + schema.marker.len()..])
}

/// Scans `input` segment by segment.
///
/// # Errors
///
/// Returns [`ScanError`] naming the first segment that failed.
pub fn scan(segments: &[Segment], input: &str) -> Result<Fields, ScanError> {
    let mut rest = input;
    let mut fields = Fields::new();

    for segment in segments {
        match *segment {
            Segment::Literal(text) => {
                literal(&mut rest, text).map_err(|_| ScanError::Literal(text))?;
            }
            Segment::Field { name, kind } => {
                let value = field(&mut rest, name, kind)?;
                fields.insert(name, value)?;
            }
        }
    }

    Ok(fields)
}

fn field(input: &mut &str, name: &'static str, kind: FieldKind) -> Result<FieldValue, ScanError> {
    let failed = |_| ScanError::Field(name);
    match kind {
        FieldKind::Int => int(input).map(FieldValue::Int).map_err(failed),
        FieldKind::Char => single(input).map(FieldValue::Char).map_err(failed),
        FieldKind::Word => text_value(name, word(input).map_err(failed)?),
        FieldKind::Quoted => text_value(name, quoted(input).map_err(failed)?),
        FieldKind::Line => text_value(name, line(input).map_err(failed)?),
    }
}

fn text_value(name: &'static str, text: &str) -> Result<FieldValue, ScanError> {
    let mut value = FieldText::new();
    value
        .push_str(text)
        .map_err(|_| ScanError::FieldTooLong(name))?;
    Ok(FieldValue::Text(value))
}

fn literal(input: &mut &str, expected: &str) -> ModalResult<()> {
    for ch in expected.chars() {
        if ch.is_ascii_whitespace() {
            space(input)?;
        } else {
            exact(input, ch)?;
        }
    }
    Ok(())
}

fn space(input: &mut &str) -> ModalResult<()> {
    multispace0.void().parse_next(input)
}

fn exact(input: &mut &str, expected: char) -> ModalResult<()> {
    one_of(expected).void().parse_next(input)
}

/// Signed decimal; leading zeros are allowed (`08`).
fn int(input: &mut &str) -> ModalResult<i32> {
    preceded(multispace0, (opt(one_of(['+', '-'])), digit1).take())
        .parse_to()
        .parse_next(input)
}

fn single(input: &mut &str) -> ModalResult<char> {
    any.parse_next(input)
}

fn word<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    preceded(
        multispace0,
        take_while(1.., |c: char| !c.is_ascii_whitespace() && c != ','),
    )
    .parse_next(input)
}

fn quoted<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    preceded(multispace0, delimited('"', take_till(0.., '"'), '"')).parse_next(input)
}

fn line<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    take_till(0.., ['\r', '\n']).parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIME: ResponseSchema = ResponseSchema::new(
        "+CIPSNTPTIME:",
        &[
            Segment::word("weekday"),
            Segment::word("month"),
            Segment::int("day"),
            Segment::int("hour"),
            Segment::lit(":"),
            Segment::int("minute"),
            Segment::lit(":"),
            Segment::int("second"),
            Segment::int("year"),
        ],
    );

    #[test]
    fn scans_network_time_reply() {
        let reply = "AT+CIPSNTPTIME?\r\n+CIPSNTPTIME:Thu Aug 08 20:45:07 2024\r\nOK\r\n";
        let fields = scan_reply(&TIME, reply).expect("scan");

        assert_eq!(fields.len(), TIME.field_count());
        assert_eq!(fields.text("weekday"), Some("Thu"));
        assert_eq!(fields.text("month"), Some("Aug"));
        assert_eq!(fields.int("day"), Some(8));
        assert_eq!(fields.int("hour"), Some(20));
        assert_eq!(fields.int("minute"), Some(45));
        assert_eq!(fields.int("second"), Some(7));
        assert_eq!(fields.int("year"), Some(2024));
    }

    #[test]
    fn quoted_and_signed_fields() {
        let segments = [
            Segment::quoted("ssid"),
            Segment::lit(","),
            Segment::quoted("bssid"),
            Segment::lit(","),
            Segment::int("channel"),
            Segment::lit(","),
            Segment::int("rssi"),
        ];
        let fields = scan(
            &segments,
            "\"lab\",\"aa:bb:cc:dd:ee:ff\",6,-61,1,0,0,0,0\r\n",
        )
        .expect("scan");

        assert_eq!(fields.text("ssid"), Some("lab"));
        assert_eq!(fields.text("bssid"), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(fields.int("channel"), Some(6));
        assert_eq!(fields.int("rssi"), Some(-61));
    }

    #[test]
    fn line_field_stops_at_line_end() {
        let segments = [Segment::int("len"), Segment::lit(","), Segment::line("data")];
        let fields = scan(&segments, "5,hello\r\nOK\r\n").expect("scan");
        assert_eq!(fields.int("len"), Some(5));
        assert_eq!(fields.text("data"), Some("hello"));
    }

    #[test]
    fn char_field_takes_one_character() {
        let segments = [Segment::char("flag"), Segment::int("value")];
        let fields = scan(&segments, "Y 12").expect("scan");
        assert_eq!(fields.char("flag"), Some('Y'));
        assert_eq!(fields.int("value"), Some(12));
    }

    #[test]
    fn reports_missing_marker() {
        assert_eq!(
            scan_reply(&TIME, "OK\r\n"),
            Err(ScanError::MissingMarker)
        );
    }

    #[test]
    fn reports_first_failing_segment() {
        let segments = [Segment::int("state"), Segment::lit(","), Segment::int("other")];
        assert_eq!(scan(&segments, "x,1"), Err(ScanError::Field("state")));
        assert_eq!(scan(&segments, "2;1"), Err(ScanError::Literal(",")));
    }
}
