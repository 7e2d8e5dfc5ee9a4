//! HL7v2 message tree.
//!
//! A [`Message`] is an ordered list of [`Segment`]s. Each segment holds numbered fields
//! (1-based, as in the HL7 standard: `PID-3` is `segment.field(3)`), each field holds one or
//! more repetitions, each repetition holds components, and each component holds
//! sub-components. Leaf values are stored exactly as received so that
//! [`Segment::encode`] reproduces the original segment text.
//!
//! MSH is special-cased the way the standard defines it: MSH-1 *is* the field separator and
//! MSH-2 holds the encoding characters verbatim.

use crate::{Hl7Error, Hl7Result};
use serde::Serialize;

const SEGMENT_TERMINATORS: [char; 2] = ['\r', '\n'];
const HEADER_SEGMENT: &str = "MSH";

/// Delimiters declared by a message header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Delimiters {
    pub field: char,
    pub component: char,
    pub repetition: char,
    pub escape: char,
    pub subcomponent: char,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            field: '|',
            component: '^',
            repetition: '~',
            escape: '\\',
            subcomponent: '&',
        }
    }
}

impl Delimiters {
    /// Reads the delimiters from a raw MSH line.
    ///
    /// The field separator is the character immediately after `MSH`; the next four characters
    /// are component, repetition, escape and sub-component separators, in that order.
    fn from_header(line: &str) -> Hl7Result<Self> {
        let mut chars = line.chars().skip(HEADER_SEGMENT.len());
        let field = chars
            .next()
            .ok_or_else(|| Hl7Error::InvalidEncodingCharacters(line.to_owned()))?;
        let encoding: Vec<char> = chars.take_while(|c| *c != field).collect();

        let [component, repetition, escape, subcomponent] = match encoding.as_slice() {
            [a, b, c, d, ..] => [*a, *b, *c, *d],
            _ => {
                return Err(Hl7Error::InvalidEncodingCharacters(
                    encoding.into_iter().collect(),
                ))
            }
        };

        let all = [field, component, repetition, escape, subcomponent];
        let distinct = all
            .iter()
            .enumerate()
            .all(|(i, c)| !all[i + 1..].contains(c));
        if !distinct || all.iter().any(|c| c.is_alphanumeric()) {
            return Err(Hl7Error::InvalidEncodingCharacters(
                encoding.into_iter().collect(),
            ));
        }

        Ok(Self {
            field,
            component,
            repetition,
            escape,
            subcomponent,
        })
    }

    /// Renders the MSH-2 encoding characters.
    pub fn encoding_characters(&self) -> String {
        [self.component, self.repetition, self.escape, self.subcomponent]
            .iter()
            .collect()
    }
}

/// A single component, split into its sub-components.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Component {
    subcomponents: Vec<String>,
}

impl Component {
    fn parse(raw: &str, delimiters: &Delimiters) -> Self {
        Self {
            subcomponents: raw
                .split(delimiters.subcomponent)
                .map(str::to_owned)
                .collect(),
        }
    }

    fn verbatim(raw: &str) -> Self {
        Self {
            subcomponents: vec![raw.to_owned()],
        }
    }

    /// The first sub-component, which is the whole value for simple components.
    pub fn value(&self) -> &str {
        self.subcomponent(1)
    }

    /// Returns sub-component `n` (1-based), or `""` when it is absent.
    pub fn subcomponent(&self, n: usize) -> &str {
        n.checked_sub(1)
            .and_then(|i| self.subcomponents.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.subcomponents.iter().all(|s| s.is_empty())
    }

    fn encode(&self, delimiters: &Delimiters, out: &mut String) {
        join_into(out, &self.subcomponents, delimiters.subcomponent, |s, out| {
            out.push_str(s)
        });
    }
}

/// One repetition of a field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Repetition {
    components: Vec<Component>,
}

impl Repetition {
    fn parse(raw: &str, delimiters: &Delimiters) -> Self {
        Self {
            components: raw
                .split(delimiters.component)
                .map(|c| Component::parse(c, delimiters))
                .collect(),
        }
    }

    /// Returns component `n` (1-based), if present.
    pub fn get(&self, n: usize) -> Option<&Component> {
        n.checked_sub(1).and_then(|i| self.components.get(i))
    }

    /// Returns the first sub-component of component `n`, or `""` when absent.
    pub fn component(&self, n: usize) -> &str {
        self.get(n).map(Component::value).unwrap_or("")
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn is_empty(&self) -> bool {
        self.components.iter().all(Component::is_empty)
    }

    fn encode(&self, delimiters: &Delimiters, out: &mut String) {
        join_into(out, &self.components, delimiters.component, |c, out| {
            c.encode(delimiters, out)
        });
    }
}

/// A field and all of its repetitions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Field {
    repetitions: Vec<Repetition>,
}

/// An empty field, as if the segment carried `||` at that position.
impl Default for Field {
    fn default() -> Self {
        Self::verbatim("")
    }
}

impl Field {
    fn parse(raw: &str, delimiters: &Delimiters) -> Self {
        Self {
            repetitions: raw
                .split(delimiters.repetition)
                .map(|r| Repetition::parse(r, delimiters))
                .collect(),
        }
    }

    /// A field whose text must not be split (MSH-1 and MSH-2).
    fn verbatim(raw: &str) -> Self {
        Self {
            repetitions: vec![Repetition {
                components: vec![Component::verbatim(raw)],
            }],
        }
    }

    pub fn repetitions(&self) -> &[Repetition] {
        &self.repetitions
    }

    /// The first repetition, which is the only one for non-repeating fields.
    pub fn first(&self) -> Option<&Repetition> {
        self.repetitions.first()
    }

    /// A copy of the field holding only its first repetition.
    pub fn first_repetition(&self) -> Field {
        Self {
            repetitions: self.repetitions.iter().take(1).cloned().collect(),
        }
    }

    /// Component `n` (1-based) of the first repetition, or `""`.
    pub fn component(&self, n: usize) -> &str {
        self.first().map(|r| r.component(n)).unwrap_or("")
    }

    /// Sub-component `s` of component `c` of the first repetition, or `""`.
    pub fn subcomponent(&self, c: usize, s: usize) -> &str {
        self.first()
            .and_then(|r| r.get(c))
            .map(|comp| comp.subcomponent(s))
            .unwrap_or("")
    }

    /// The first component of the first repetition.
    pub fn value(&self) -> &str {
        self.component(1)
    }

    pub fn is_empty(&self) -> bool {
        self.repetitions.iter().all(Repetition::is_empty)
    }

    /// Re-encodes the field with the given delimiters.
    pub fn encode(&self, delimiters: &Delimiters) -> String {
        let mut out = String::new();
        join_into(&mut out, &self.repetitions, delimiters.repetition, |r, out| {
            r.encode(delimiters, out)
        });
        out
    }
}

/// A named segment (`MSH`, `PID`, `OBX`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Segment {
    name: String,
    fields: Vec<Field>,
}

impl Segment {
    fn parse(line: &str, delimiters: &Delimiters) -> Hl7Result<Self> {
        let mut parts = line.split(delimiters.field);
        let name = parts.next().unwrap_or_default();
        validate_segment_name(name)?;

        let mut fields = Vec::new();
        if name == HEADER_SEGMENT {
            fields.push(Field::verbatim(&delimiters.field.to_string()));
            if let Some(encoding) = parts.next() {
                fields.push(Field::verbatim(encoding));
            }
        }
        fields.extend(parts.map(|raw| Field::parse(raw, delimiters)));

        Ok(Self {
            name: name.to_owned(),
            fields,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns field `n` (1-based), if the segment is long enough to carry it.
    pub fn field(&self, n: usize) -> Option<&Field> {
        n.checked_sub(1).and_then(|i| self.fields.get(i))
    }

    /// Component `c` of the first repetition of field `n`, or `""`.
    pub fn component(&self, n: usize, c: usize) -> &str {
        self.field(n).map(|f| f.component(c)).unwrap_or("")
    }

    /// The first component of field `n`, or `""`.
    pub fn value(&self, n: usize) -> &str {
        self.component(n, 1)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Re-encodes the segment.
    ///
    /// Encoding a parsed segment with the delimiters it was parsed with reproduces its original
    /// text exactly.
    pub fn encode(&self, delimiters: &Delimiters) -> String {
        let mut out = self.name.clone();
        // MSH-1 is the separator itself, not a field value between separators.
        let skip = usize::from(self.name == HEADER_SEGMENT);
        for field in self.fields.iter().skip(skip) {
            out.push(delimiters.field);
            out.push_str(&field.encode(delimiters));
        }
        out
    }
}

/// MSH-9 split into its parts, e.g. `ORU^R01^ORU_R01`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageType {
    pub code: String,
    pub trigger_event: String,
    pub structure: String,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}^{}", self.code, self.trigger_event)
    }
}

/// A parsed HL7v2 message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Message {
    delimiters: Delimiters,
    segments: Vec<Segment>,
}

impl Message {
    /// Parses a message from its pipe-delimited text.
    ///
    /// Segments may be terminated by `\r` (the standard), `\n` or `\r\n`; blank lines are
    /// ignored. The first segment must be MSH, and its delimiters apply to every segment.
    ///
    /// # Errors
    ///
    /// - [`Hl7Error::EmptyMessage`] if there are no segments at all
    /// - [`Hl7Error::MissingHeader`] if the first segment is not MSH
    /// - [`Hl7Error::InvalidEncodingCharacters`] if MSH-1/MSH-2 are unusable
    /// - [`Hl7Error::InvalidSegmentName`] if any segment name is not three alphanumerics
    pub fn parse(input: &str) -> Hl7Result<Self> {
        let mut lines = input
            .split(SEGMENT_TERMINATORS)
            .filter(|line| !line.trim().is_empty());

        let header = lines.next().ok_or(Hl7Error::EmptyMessage)?;
        if !header.starts_with(HEADER_SEGMENT) {
            let name: String = header.chars().take(HEADER_SEGMENT.len()).collect();
            return Err(Hl7Error::MissingHeader(name));
        }

        let delimiters = Delimiters::from_header(header)?;
        let mut segments = vec![Segment::parse(header, &delimiters)?];
        for line in lines {
            segments.push(Segment::parse(line, &delimiters)?);
        }

        tracing::debug!("parsed HL7 message with {} segments", segments.len());

        Ok(Self {
            delimiters,
            segments,
        })
    }

    pub fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The MSH segment. Parsing guarantees it is always present and first.
    pub fn header(&self) -> &Segment {
        &self.segments[0]
    }

    /// The first segment named `name`.
    pub fn segment(&self, name: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.name == name)
    }

    /// All segments named `name`, in document order.
    pub fn segments_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Segment> {
        self.segments.iter().filter(move |s| s.name == name)
    }

    /// MSH-9.
    pub fn message_type(&self) -> MessageType {
        let msh = self.header();
        MessageType {
            code: msh.component(9, 1).to_owned(),
            trigger_event: msh.component(9, 2).to_owned(),
            structure: msh.component(9, 3).to_owned(),
        }
    }

    /// MSH-10, the sender's unique identifier for this message.
    pub fn control_id(&self) -> &str {
        self.header().value(10)
    }

    /// MSH-12.
    pub fn version(&self) -> &str {
        self.header().value(12)
    }

    /// Re-encodes the whole message with `\r` segment terminators.
    pub fn encode(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.encode(&self.delimiters))
            .collect::<Vec<_>>()
            .join("\r")
    }
}

fn validate_segment_name(name: &str) -> Hl7Result<()> {
    let ok = name.len() == 3 && name.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
    if ok {
        Ok(())
    } else {
        Err(Hl7Error::InvalidSegmentName(name.to_owned()))
    }
}

fn join_into<T>(out: &mut String, items: &[T], sep: char, mut write: impl FnMut(&T, &mut String)) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(sep);
        }
        write(item, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "MSH|^~\\&|FORMENTRY|AMRS.ELD|HL7LISTENER|AMRS.ELD|20080226102656||ORU^R01|JqnfhKKtouEz8kzTk6Zo|P|2.5|1||||||||16^AMRS.ELD.FORMID\r\
PID|||3^^^^||John3^Doe^||\r\
PV1||O|1^Unknown Location||||1^Super User (1-8)|||||||||||||||||||||||||||||||||||||20080212|||||||V\r\
ORC|RE||||||||20080226102537|1^Super User\r\
OBR|1|||1238^MEDICAL RECORD OBSERVATIONS^99DCT\r\
OBX|1|NM|5497^CD4, BY FACS^99DCT||450|||||||||20080206\r\
OBX|2|CWE|5089^WEIGHT^99DCT|1.1|5090^HEIGHT^99DCT^123^HEIGHT NAME^99NAM|||||||||20080206";

    #[test]
    fn parses_header_delimiters_and_fields() {
        let message = Message::parse(SAMPLE).expect("sample parses");

        assert_eq!(message.delimiters(), &Delimiters::default());
        assert_eq!(message.segments().len(), 7);

        let msh = message.header();
        assert_eq!(msh.value(1), "|");
        assert_eq!(msh.value(2), "^~\\&");
        assert_eq!(msh.value(3), "FORMENTRY");
        assert_eq!(message.control_id(), "JqnfhKKtouEz8kzTk6Zo");
        assert_eq!(message.version(), "2.5");
        assert_eq!(msh.component(21, 1), "16");
        assert_eq!(msh.component(21, 2), "AMRS.ELD.FORMID");

        let kind = message.message_type();
        assert_eq!(kind.code, "ORU");
        assert_eq!(kind.trigger_event, "R01");
        assert_eq!(kind.to_string(), "ORU^R01");
    }

    #[test]
    fn reads_components_and_missing_fields_as_empty() {
        let message = Message::parse(SAMPLE).expect("sample parses");
        let obx = message.segments_named("OBX").nth(1).expect("second OBX");

        assert_eq!(obx.value(2), "CWE");
        assert_eq!(obx.value(4), "1.1");
        let value = obx.field(5).expect("OBX-5");
        assert_eq!(value.component(1), "5090");
        assert_eq!(value.component(4), "123");
        assert_eq!(value.component(6), "99NAM");
        assert_eq!(value.component(9), "");
        assert!(obx.field(40).is_none());
        assert_eq!(obx.value(40), "");
    }

    #[test]
    fn splits_repetitions_and_subcomponents() {
        let input = "MSH|^~\\&|A\rPID|||1^^^AUTH&1.2.3&ISO~2^^^OTHER";
        let message = Message::parse(input).expect("parses");
        let pid3 = message.segment("PID").and_then(|s| s.field(3)).expect("PID-3");

        assert_eq!(pid3.repetitions().len(), 2);
        assert_eq!(pid3.subcomponent(4, 1), "AUTH");
        assert_eq!(pid3.subcomponent(4, 2), "1.2.3");
        assert_eq!(pid3.repetitions()[1].component(1), "2");

        let first = pid3.first_repetition();
        assert_eq!(first.repetitions().len(), 1);
        assert_eq!(first.encode(message.delimiters()), "1^^^AUTH&1.2.3&ISO");
    }

    #[test]
    fn encode_reproduces_every_segment_exactly() {
        let message = Message::parse(SAMPLE).expect("sample parses");
        let expected: Vec<&str> = SAMPLE.split('\r').collect();

        for (segment, line) in message.segments().iter().zip(expected) {
            assert_eq!(segment.encode(message.delimiters()), line);
        }
        assert_eq!(message.encode(), SAMPLE);
    }

    #[test]
    fn honours_non_default_delimiters() {
        let input = "MSH#*%\\$#APP\nOBX#1#NM#5497*CD4**x$y#";
        let message = Message::parse(input).expect("parses");
        let obx = message.segment("OBX").expect("OBX");

        assert_eq!(obx.value(2), "NM");
        assert_eq!(obx.component(3, 2), "CD4");
        assert_eq!(obx.field(3).unwrap().subcomponent(4, 2), "y");
        assert_eq!(obx.encode(message.delimiters()), "OBX#1#NM#5497*CD4**x$y#");
    }

    #[test]
    fn accepts_mixed_line_endings_and_blank_lines() {
        let input = "MSH|^~\\&|A\r\n\r\nPID|1\nPV1|1\r";
        let message = Message::parse(input).expect("parses");
        let names: Vec<&str> = message.segments().iter().map(Segment::name).collect();
        assert_eq!(names, ["MSH", "PID", "PV1"]);
    }

    #[test]
    fn rejects_messages_without_header() {
        assert!(matches!(Message::parse(""), Err(Hl7Error::EmptyMessage)));
        assert!(matches!(
            Message::parse("PID|1"),
            Err(Hl7Error::MissingHeader(name)) if name == "PID"
        ));
    }

    #[test]
    fn rejects_bad_encoding_characters_and_segment_names() {
        assert!(matches!(
            Message::parse("MSH|^~|APP"),
            Err(Hl7Error::InvalidEncodingCharacters(_))
        ));
        assert!(matches!(
            Message::parse("MSH|^^\\&|APP"),
            Err(Hl7Error::InvalidEncodingCharacters(_))
        ));
        assert!(matches!(
            Message::parse("MSH|^~\\&|APP\robx|1"),
            Err(Hl7Error::InvalidSegmentName(name)) if name == "obx"
        ));
    }

    #[test]
    fn serialises_tree_as_nested_arrays() {
        let message = Message::parse("MSH|^~\\&|A\rOBX|1|ST|a^b").expect("parses");
        let obx = message.segment("OBX").unwrap();
        let json = serde_json::to_value(obx).unwrap();
        assert_eq!(json["name"], "OBX");
        assert_eq!(json["fields"][2], serde_json::json!([[["a"], ["b"]]]));
    }
}
