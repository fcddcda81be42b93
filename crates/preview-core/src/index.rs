//! Time-based sink index names.
//!
//! Templates use `{field}` placeholders, optionally zero padded with
//! `{field:0Nd}`. `{{` and `}}` produce literal braces.
//!
//! | Field     | Value                               |
//! |-----------|-------------------------------------|
//! | `isoyear` | ISO 8601 week-numbering year        |
//! | `isoweek` | ISO 8601 week number (1-53)         |
//! | `isoday`  | ISO 8601 weekday (1 = Monday)       |
//! | `year`    | calendar year                       |
//! | `month`   | calendar month (1-12)               |
//! | `day`     | day of month (1-31)                 |

use std::fmt::Write;

use chrono::DateTime;
use chrono::Datelike;
use chrono::Utc;

use crate::error::CoreError;
use crate::error::Result;

/// Characters an index name may not contain.
const FORBIDDEN_INDEX_CHARS: &[char] = &['\\', '/', '*', '?', '"', '<', '>', '|', ' ', ',', '#', ':'];

/// A date field available to index templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexField {
    IsoYear,
    IsoWeek,
    IsoDay,
    Year,
    Month,
    Day,
}

impl IndexField {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "isoyear" => Some(Self::IsoYear),
            "isoweek" => Some(Self::IsoWeek),
            "isoday" => Some(Self::IsoDay),
            "year" => Some(Self::Year),
            "month" => Some(Self::Month),
            "day" => Some(Self::Day),
            _ => None,
        }
    }

    fn value(self, at: &DateTime<Utc>) -> i64 {
        match self {
            Self::IsoYear => i64::from(at.iso_week().year()),
            Self::IsoWeek => i64::from(at.iso_week().week()),
            Self::IsoDay => i64::from(at.weekday().number_from_monday()),
            Self::Year => i64::from(at.year()),
            Self::Month => i64::from(at.month()),
            Self::Day => i64::from(at.day()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field { field: IndexField, width: usize },
}

/// A parsed index name template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl IndexTemplate {
    /// Parse a template.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidIndexTemplate`] for unknown fields,
    /// unbalanced braces, unsupported format specs, or literal text that
    /// cannot appear in an index name.
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::TimeZone;
    /// use chrono::Utc;
    /// use preview_core::IndexTemplate;
    ///
    /// let template = IndexTemplate::parse("preview-{isoyear}.{isoweek:02d}").unwrap();
    /// let at = Utc.with_ymd_and_hms(2021, 1, 3, 12, 0, 0).unwrap();
    /// assert_eq!(template.render(&at), "preview-2020.53");
    /// ```
    pub fn parse(template: &str) -> Result<Self> {
        let invalid = |reason: &str| CoreError::InvalidIndexTemplate {
            template: template.to_string(),
            reason: reason.to_string(),
        };

        if template.is_empty() {
            return Err(invalid("template is empty"));
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(invalid("unmatched '}'")),
                '{' => {
                    let mut spec = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => spec.push(c),
                            None => return Err(invalid("unclosed '{'")),
                        }
                    }
                    let (name, format) = match spec.split_once(':') {
                        Some((name, format)) => (name, Some(format)),
                        None => (spec.as_str(), None),
                    };
                    let field = IndexField::from_name(name)
                        .ok_or_else(|| invalid(&format!("unknown field {name:?}")))?;
                    let width = match format {
                        None => 0,
                        Some(format) => parse_width(format)
                            .ok_or_else(|| invalid(&format!("unsupported format {format:?}")))?,
                    };
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field { field, width });
                }
                c if c.is_uppercase() || FORBIDDEN_INDEX_CHARS.contains(&c) => {
                    return Err(invalid(&format!("character {c:?} is not allowed in index names")));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    /// Render the index name for a point in time.
    pub fn render(&self, at: &DateTime<Utc>) -> String {
        let mut out = String::with_capacity(self.source.len() + 8);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field { field, width } => {
                    // Writing to a String cannot fail.
                    let _ = write!(out, "{:0width$}", field.value(at), width = *width);
                }
            }
        }
        out
    }

    /// The template as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl std::str::FromStr for IndexTemplate {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for IndexTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

/// Accepts `0N` or `0Nd`.
fn parse_width(format: &str) -> Option<usize> {
    let digits = format.strip_suffix('d').unwrap_or(format);
    let width = digits.strip_prefix('0')?;
    if width.is_empty() || !width.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    width.parse().ok()
}
