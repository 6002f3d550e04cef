//! 80-byte header cards in 2880-byte blocks.

use crate::errors::{MaskError, Result};
use std::collections::HashMap;
use std::fmt;
use std::str;

pub(crate) const CARD_SIZE: usize = 80;
pub(crate) const BLOCK_SIZE: usize = 2880;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum KeywordValue {
    Logical(bool),
    Integer(i64),
    Real(f64),
    String(String),
}

impl KeywordValue {
    pub fn as_logical(&self) -> Option<bool> {
        match self {
            Self::Logical(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Real(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Self::Real(f) => Some(*f),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for KeywordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Logical(b) => write!(f, "{}", if *b { "T" } else { "F" }),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Real(r) => write!(f, "{}", format_real(*r)),
            Self::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

/// Real values keep a decimal point or exponent so they read back as reals.
fn format_real(value: f64) -> String {
    let text = format!("{:?}", value);
    if text.contains(['.', 'e', 'E']) || !value.is_finite() {
        text
    } else {
        format!("{}.0", text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Keyword {
    pub name: String,
    pub value: Option<KeywordValue>,
    pub comment: Option<String>,
}

impl Keyword {
    pub fn logical(name: impl Into<String>, value: bool) -> Self {
        Self::with_value(name, KeywordValue::Logical(value))
    }

    pub fn integer(name: impl Into<String>, value: i64) -> Self {
        Self::with_value(name, KeywordValue::Integer(value))
    }

    pub fn real(name: impl Into<String>, value: f64) -> Self {
        Self::with_value(name, KeywordValue::Real(value))
    }

    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_value(name, KeywordValue::String(value.into()))
    }

    /// COMMENT card; the text sits where a value would.
    #[cfg(test)]
    pub fn comment(text: impl Into<String>) -> Self {
        Self {
            name: "COMMENT".to_string(),
            value: None,
            comment: Some(text.into()),
        }
    }

    fn with_value(name: impl Into<String>, value: KeywordValue) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
            comment: None,
        }
    }

    fn end() -> Self {
        Self {
            name: "END".to_string(),
            value: None,
            comment: None,
        }
    }

    /// Full card text, for free-text scans of commentary cards.
    pub fn text(&self) -> String {
        match (&self.value, &self.comment) {
            (Some(value), Some(comment)) => format!("{} = {} / {}", self.name, value, comment),
            (Some(value), None) => format!("{} = {}", self.name, value),
            (None, Some(comment)) => format!("{} {}", self.name, comment),
            (None, None) => self.name.clone(),
        }
    }
}

/// Ordered keywords with lookup by name. Later duplicates win.
#[derive(Debug, Clone, Default)]
pub(crate) struct Header {
    keywords: Vec<Keyword>,
    index: HashMap<String, usize>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, keyword: Keyword) {
        self.index.insert(keyword.name.clone(), self.keywords.len());
        self.keywords.push(keyword);
    }

    pub fn get(&self, name: &str) -> Option<&KeywordValue> {
        self.index
            .get(name)
            .and_then(|&i| self.keywords.get(i))
            .and_then(|k| k.value.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(KeywordValue::as_integer)
    }

    pub fn real(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(KeywordValue::as_real)
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(KeywordValue::as_string)
    }

    pub fn logical(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(KeywordValue::as_logical)
    }

    /// Integer keyword that must be present and non-negative.
    pub fn required_size(&self, name: &str, origin: &str) -> Result<usize> {
        match self.integer(name) {
            Some(v) if v >= 0 => Ok(v as usize),
            Some(v) => Err(MaskError::format(
                origin,
                &format!("keyword {} has negative value {}", name, v),
            )),
            None => Err(MaskError::format(
                origin,
                &format!("missing required keyword {}", name),
            )),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Keyword> {
        self.keywords.iter()
    }

    /// Serializes the header, END card included, padded to whole blocks.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity((self.keywords.len() + 1) * CARD_SIZE);
        for keyword in self.keywords.iter().chain(std::iter::once(&Keyword::end())) {
            bytes.extend_from_slice(&format_card(keyword));
        }
        pad_to_block(&mut bytes, b' ');
        bytes
    }
}

/// Pads `bytes` with `fill` up to the next block boundary.
pub(crate) fn pad_to_block(bytes: &mut Vec<u8>, fill: u8) {
    let remainder = bytes.len() % BLOCK_SIZE;
    if remainder != 0 {
        bytes.resize(bytes.len() + BLOCK_SIZE - remainder, fill);
    }
}

/// Rounds `len` up to a whole number of blocks.
pub(crate) fn padded_len(len: usize) -> usize {
    len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

fn format_card(keyword: &Keyword) -> [u8; CARD_SIZE] {
    let mut card = [b' '; CARD_SIZE];
    let put = |card: &mut [u8; CARD_SIZE], at: usize, text: &str| {
        let bytes = text.as_bytes();
        let len = bytes.len().min(CARD_SIZE.saturating_sub(at));
        card[at..at + len].copy_from_slice(&bytes[..len]);
    };

    put(&mut card, 0, &keyword.name[..keyword.name.len().min(8)]);

    let Some(value) = &keyword.value else {
        if let Some(comment) = &keyword.comment {
            put(&mut card, 8, comment);
        }
        return card;
    };

    card[8] = b'=';
    let text = match value {
        KeywordValue::String(s) => {
            let escaped: String = s.replace('\'', "''").chars().take(68).collect();
            format!("'{:<8}'", escaped)
        }
        other => format!("{:>20}", other.to_string()),
    };
    put(&mut card, 10, &text);

    if let Some(comment) = &keyword.comment {
        let at = (10 + text.len()).max(30);
        put(&mut card, at, &format!(" / {}", comment));
    }
    card
}

fn parse_card(card: &[u8], origin: &str) -> Result<Keyword> {
    if !card.is_ascii() {
        return Err(MaskError::format(origin, "header card is not ASCII"));
    }
    let text = str::from_utf8(card)
        .map_err(|_| MaskError::format(origin, "header card is not ASCII"))?;
    let name = text[..8].trim().to_string();

    if &text[8..10] != "= " {
        let comment = text[8..].trim();
        return Ok(Keyword {
            name,
            value: None,
            comment: (!comment.is_empty()).then(|| comment.to_string()),
        });
    }

    let rest = &text[10..];
    let (value, comment) = split_value_comment(rest);
    Ok(Keyword {
        name,
        value: value.map(parse_value),
        comment: comment.filter(|c| !c.is_empty()).map(str::to_string),
    })
}

fn split_value_comment(rest: &str) -> (Option<&str>, Option<&str>) {
    let trimmed = rest.trim_start();
    if trimmed.starts_with('\'') {
        let start = rest.len() - trimmed.len();
        let bytes = trimmed.as_bytes();
        let mut i = 1;
        while i < bytes.len() {
            if bytes[i] == b'\'' {
                if bytes.get(i + 1) == Some(&b'\'') {
                    i += 2;
                    continue;
                }
                let value = &rest[start..start + i + 1];
                let tail = &rest[start + i + 1..];
                let comment = tail.find('/').map(|p| tail[p + 1..].trim());
                return (Some(value), comment);
            }
            i += 1;
        }
        return (Some(trimmed.trim_end()), None);
    }

    match rest.find('/') {
        Some(pos) => {
            let value = rest[..pos].trim();
            (
                (!value.is_empty()).then_some(value),
                Some(rest[pos + 1..].trim()),
            )
        }
        None => {
            let value = rest.trim();
            ((!value.is_empty()).then_some(value), None)
        }
    }
}

fn parse_value(value: &str) -> KeywordValue {
    let trimmed = value.trim();
    match trimmed {
        "T" => return KeywordValue::Logical(true),
        "F" => return KeywordValue::Logical(false),
        _ => {}
    }
    if trimmed.len() >= 2 && trimmed.starts_with('\'') && trimmed.ends_with('\'') {
        let inner = &trimmed[1..trimmed.len() - 1];
        return KeywordValue::String(inner.replace("''", "'").trim_end().to_string());
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return KeywordValue::Integer(i);
    }
    if let Ok(f) = trimmed.replace(['D', 'd'], "E").parse::<f64>() {
        return KeywordValue::Real(f);
    }
    KeywordValue::String(trimmed.to_string())
}

/// Parses the header starting at `data[0]`.
///
/// Returns the header and its size in bytes, padding included.
pub(crate) fn parse_header(data: &[u8], origin: &str) -> Result<(Header, usize)> {
    let mut header = Header::new();
    for (i, card) in data.chunks_exact(CARD_SIZE).enumerate() {
        let keyword = parse_card(card, origin)?;
        if keyword.name == "END" {
            return Ok((header, padded_len((i + 1) * CARD_SIZE)));
        }
        header.add(keyword);
    }
    Err(MaskError::format(origin, "header has no END card"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card_text(keyword: &Keyword) -> String {
        String::from_utf8(format_card(keyword).to_vec()).unwrap()
    }

    #[test]
    fn test_format_logical_and_integer() {
        let text = card_text(&Keyword::logical("SNAPPED", true));
        assert_eq!(&text[..30], "SNAPPED =                    T");
        let text = card_text(&Keyword::integer("NAXIS2", 1234));
        assert_eq!(&text[..30], "NAXIS2  =                 1234");
    }

    #[test]
    fn test_format_string_pads_to_eight() {
        let text = card_text(&Keyword::string("PIXTYPE", "s"));
        assert_eq!(&text[..20], "PIXTYPE = 's       '");
    }

    #[test]
    fn test_real_keeps_decimal_point() {
        assert_eq!(KeywordValue::Real(2147483648.0).to_string(), "2147483648.0");
        assert_eq!(KeywordValue::Real(-128.0).to_string(), "-128.0");
        assert_eq!(KeywordValue::Real(0.25).to_string(), "0.25");
    }

    #[test]
    fn test_card_round_trip() {
        let keywords = vec![
            Keyword::logical("SIMPLE", true),
            Keyword::integer("PIXRES", -3),
            Keyword::real("TZERO7", 32768.0),
            Keyword::string("TTYPE1", "O'BRIEN / FIELD"),
            Keyword::comment("pixelization 6s"),
        ];
        for keyword in keywords {
            let card = format_card(&keyword);
            let parsed = parse_card(&card, "test").unwrap();
            assert_eq!(parsed, keyword);
        }
    }

    #[test]
    fn test_header_bytes_are_block_padded() {
        let mut header = Header::new();
        header.add(Keyword::logical("SIMPLE", true));
        header.add(Keyword::integer("NAXIS", 0));
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), BLOCK_SIZE);

        let (parsed, size) = parse_header(&bytes, "test").unwrap();
        assert_eq!(size, BLOCK_SIZE);
        assert_eq!(parsed.logical("SIMPLE"), Some(true));
        assert_eq!(parsed.integer("NAXIS"), Some(0));
        assert!(!parsed.contains("END"));
    }

    #[test]
    fn test_missing_end() {
        let bytes = vec![b' '; BLOCK_SIZE];
        assert!(parse_header(&bytes, "test").is_err());
    }

    #[test]
    fn test_comment_after_value() {
        let mut keyword = Keyword::integer("NCAPS", 4);
        keyword.comment = Some("caps per polygon".into());
        let parsed = parse_card(&format_card(&keyword), "test").unwrap();
        assert_eq!(parsed.comment.as_deref(), Some("caps per polygon"));
        assert_eq!(parsed.value, Some(KeywordValue::Integer(4)));
    }
}
