use serde::{Deserialize, Serialize};

/// Value of one header card: numeric when the value field parses as a
/// float, raw text otherwise.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CardValue {
    Number(f64),
    Text(String),
}

/// One FITS-style header card kept with the map image so the flag output
/// stays co-registered with the instrument's astrometry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeaderCard {
    pub name: String,
    pub value: CardValue,
    pub comment: String,
}

impl HeaderCard {
    /// Parse an 80-column card string: keyword in columns 0-7, value in
    /// 9-31, comment from 31 on. Returns `None` for the `END` card.
    pub fn parse(line: &str) -> Option<HeaderCard> {
        let name = field(line, 0, 7);
        if name == "END" {
            return None;
        }
        let raw_value = field(line, 9, 31);
        let value = match raw_value.parse::<f64>() {
            Ok(n) => CardValue::Number(n),
            Err(_) => CardValue::Text(raw_value),
        };
        let comment = field(line, 31, line.len());
        Some(HeaderCard {
            name,
            value,
            comment,
        })
    }
}

fn field(line: &str, start: usize, end: usize) -> String {
    let end = end.min(line.len());
    if start >= end {
        return String::new();
    }
    line[start..end].trim().to_string()
}

/// Parse a list of card strings, dropping the `END` terminator.
pub fn parse_cards<S: AsRef<str>>(lines: &[S]) -> Vec<HeaderCard> {
    lines
        .iter()
        .filter_map(|l| HeaderCard::parse(l.as_ref()))
        .collect()
}
