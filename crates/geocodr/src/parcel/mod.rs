//! Parser for German cadastral parcel identifiers (Flurstückskennzeichen).
//!
//! A parcel is identified by its district (Gemarkung, a 6 digit number or a
//! name), sub-district (Flur), numerator (Zähler) and denominator (Nenner).
//! Users write these in many ways:
//!
//! ```
//! use geocodr::parcel::ParcelId;
//!
//! let a = ParcelId::parse("123456-56-1/2", None).unwrap();
//! let b = ParcelId::parse("123456056000010002", None).unwrap();
//! assert_eq!(a, b);
//! assert_eq!(a.flur, "056");
//! assert_eq!(a.zaehler, "00001");
//! ```

use std::fmt;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Full form: district, then optional sub-district, numerator and
/// denominator, each with optional delimiters.
static LONG_FORM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)^\s*",
        r"(?:(?:(?P<gemarkung>\d{6})[-/ ]?)|(?P<gemarkung_name>[^0-9]+?))",
        r"[-/, ]*",
        r"(?:(?:flur\s*)?(?P<flur>\d{1,3}))?",
        r"[-/, ]*",
        r"(?P<zaehler>\d{0,5})",
        r"[-/, ]*",
        r"(?P<nenner>\d{0,4})",
        r"\s*$",
    ))
    .expect("valid long form parcel regex")
});

/// Short form: optional district, then a numerator with a denominator, or a
/// 2-3 digit numerator alone.
static SHORT_FORM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)^\s*",
        r"(?:(?:(?:(?P<gemarkung>\d{4,6})[-/ ]?)|(?P<gemarkung_name>[^0-9]+?))[-/, ]+)?",
        r"(?:(?P<zaehler>\d{2,5})(?:[-/, ]+(?P<nenner>\d{1,4}))",
        r"|(?P<zaehler2>\d{2,3})(?:[-/, ]+(?P<nenner2>\d{1,4}))?)",
        r"\s*$",
    ))
    .expect("valid short form parcel regex")
});

static LEADING_DISTRICT_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}").expect("valid district number regex"));

/// A canonical parcel identifier. Numeric parts are zero padded (`flur` to
/// 3, `zaehler` to 5, `nenner` to 4 digits); missing parts are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ParcelId {
    pub gemarkung: String,
    pub flur: String,
    pub zaehler: String,
    pub nenner: String,
    pub gemarkung_name: String,
}

impl ParcelId {
    /// Parse a free-form parcel identifier.
    ///
    /// `gemarkung_prefix` is the state-wide prefix that turns 4 digit district
    /// numbers into 6 digit ones. Returns `None` if the input is not a parcel
    /// identifier.
    pub fn parse(token: &str, gemarkung_prefix: Option<&str>) -> Option<Self> {
        let prefix = gemarkung_prefix.filter(|p| !p.is_empty());

        if let Some(parcel) = SHORT_FORM.captures(token).map(|caps| Self::from_captures(&caps)) {
            // Canonicalized short district numbers drop name and sub-district.
            if let Some(prefix) = prefix
                && parcel.gemarkung.len() == 4
            {
                return Some(Self {
                    gemarkung: format!("{prefix}{}", parcel.gemarkung),
                    flur: String::new(),
                    gemarkung_name: String::new(),
                    ..parcel
                });
            }
            return parcel.non_empty();
        }

        let trimmed = token.trim_start();
        let token = match prefix {
            Some(prefix)
                if LEADING_DISTRICT_NUMBER.is_match(trimmed) && !trimmed.starts_with(prefix) =>
            {
                format!("{prefix}{trimmed}")
            }
            _ => token.to_string(),
        };
        LONG_FORM
            .captures(&token)
            .map(|caps| Self::from_captures(&caps))
            .and_then(Self::non_empty)
    }

    fn from_captures(caps: &Captures<'_>) -> Self {
        let group = |name: &str| {
            caps.name(name)
                .map(|m| m.as_str())
                .filter(|s| !s.is_empty())
        };
        Self {
            gemarkung: group("gemarkung").unwrap_or_default().to_string(),
            flur: group("flur").map(|v| pad(v, 3)).unwrap_or_default(),
            zaehler: group("zaehler")
                .or_else(|| group("zaehler2"))
                .map(|v| pad(v, 5))
                .unwrap_or_default(),
            nenner: group("nenner")
                .or_else(|| group("nenner2"))
                .map(|v| pad(v, 4))
                .unwrap_or_default(),
            gemarkung_name: group("gemarkung_name")
                .unwrap_or_default()
                .trim()
                .to_string(),
        }
    }

    fn non_empty(self) -> Option<Self> {
        (self != Self::default()).then_some(self)
    }

    fn head(&self) -> &str {
        if self.gemarkung.is_empty() {
            &self.gemarkung_name
        } else {
            &self.gemarkung
        }
    }
}

fn pad(digits: &str, width: usize) -> String {
    digits
        .parse::<u32>()
        .map(|n| format!("{n:0width$}"))
        .unwrap_or_default()
}

/// Renders a string that [`ParcelId::parse`] reads back into the same
/// identifier when given the same district prefix.
impl fmt::Display for ParcelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = self.head();
        if !self.flur.is_empty() {
            if head.is_empty() {
                // without a district the sub-district needs a leading space
                // and a trailing delimiter to not read as a short form
                write!(f, " {},{}", self.flur, self.zaehler)?;
            } else {
                write!(f, "{head} flur{}", self.flur)?;
                if !self.zaehler.is_empty() {
                    write!(f, " {}", self.zaehler)?;
                }
            }
            if !self.nenner.is_empty() {
                write!(f, "/{}", self.nenner)?;
            }
            return Ok(());
        }

        if self.zaehler.is_empty() && self.nenner.is_empty() {
            return f.write_str(head);
        }
        if !head.is_empty() {
            write!(f, "{head},")?;
        }
        if self.nenner.is_empty() {
            // a lone numerator only parses in its short 2-3 digit form
            let zaehler = self.zaehler.strip_prefix("00").unwrap_or(&self.zaehler);
            f.write_str(zaehler)
        } else {
            write!(f, "{}/{}", self.zaehler, self.nenner)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parcel(gemarkung: &str, flur: &str, zaehler: &str, nenner: &str, name: &str) -> ParcelId {
        ParcelId {
            gemarkung: gemarkung.into(),
            flur: flur.into(),
            zaehler: zaehler.into(),
            nenner: nenner.into(),
            gemarkung_name: name.into(),
        }
    }

    /// Inputs with optional district prefix and expected identifier.
    fn cases() -> Vec<(&'static str, Option<&'static str>, ParcelId)> {
        vec![
            ("123456", None, parcel("123456", "", "", "", "")),
            ("3456", Some("12"), parcel("123456", "", "", "", "")),
            ("123456-56-1/2", None, parcel("123456", "056", "00001", "0002", "")),
            ("123456-123-1234-1", None, parcel("123456", "123", "01234", "0001", "")),
            ("132232001001230001", None, parcel("132232", "001", "00123", "0001", "")),
            ("1322320010012301", None, parcel("132232", "001", "00123", "0001", "")),
            ("13223200100123", None, parcel("132232", "001", "00123", "", "")),
            ("223200100123", Some("13"), parcel("132232", "001", "00123", "", "")),
            ("132232 flur 1", None, parcel("132232", "001", "", "", "")),
            ("flurbezirk ii flur 1", None, parcel("", "001", "", "", "flurbezirk ii")),
            ("123232 1, 157", None, parcel("123232", "001", "00157", "", "")),
            ("3232 1, 157", Some("12"), parcel("123232", "001", "00157", "", "")),
            ("123232 1, 157/1", None, parcel("123232", "001", "00157", "0001", "")),
            ("Krummendorf 1 157", None, parcel("", "001", "00157", "", "Krummendorf")),
            (" 1", None, parcel("", "001", "", "", "")),
            (" 1234", None, parcel("", "123", "00004", "", "")),
            ("15", Some("12"), parcel("", "", "00015", "", "")),
            ("157", Some("12"), parcel("", "", "00157", "", "")),
            ("1573", Some("12"), parcel("121573", "", "", "", "")),
            ("15731", Some("12"), parcel("121573", "001", "", "", "")),
            ("15/1", Some("12"), parcel("", "", "00015", "0001", "")),
            ("157/1", Some("12"), parcel("", "", "00157", "0001", "")),
            ("1573/1", Some("12"), parcel("", "", "01573", "0001", "")),
            ("15731/1", Some("12"), parcel("", "", "15731", "0001", "")),
            ("1234,157/1", Some("13"), parcel("131234", "", "00157", "0001", "")),
            ("Krummendorf, 157/12", None, parcel("", "", "00157", "0012", "Krummendorf")),
        ]
    }

    #[test]
    fn test_parse() {
        for (input, prefix, expected) in cases() {
            assert_eq!(
                ParcelId::parse(input, prefix),
                Some(expected),
                "input {input:?} with prefix {prefix:?}"
            );
        }
    }

    #[test]
    fn test_short_form_district_prefix() {
        let parsed = ParcelId::parse("1234/157/1", Some("13")).unwrap();
        assert_eq!(parsed, parcel("131234", "", "00157", "0001", ""));
    }

    #[test]
    fn test_not_a_parcel() {
        assert_eq!(ParcelId::parse("", None), None);
        assert_eq!(ParcelId::parse("   ", None), None);
        assert_eq!(ParcelId::parse("1", None), None);
        assert_eq!(ParcelId::parse("Hauptstr. 5a", None), None);
    }

    #[test]
    fn test_display_reparses() {
        for (input, prefix, _) in cases() {
            let once = ParcelId::parse(input, prefix).unwrap();
            let twice = ParcelId::parse(&once.to_string(), prefix);
            assert_eq!(
                twice.as_ref(),
                Some(&once),
                "input {input:?} rendered as {:?}",
                once.to_string()
            );
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(
            parcel("123456", "056", "00001", "0002", "").to_string(),
            "123456 flur056 00001/0002"
        );
        assert_eq!(
            parcel("", "", "00157", "0012", "Krummendorf").to_string(),
            "Krummendorf,00157/0012"
        );
        assert_eq!(parcel("", "", "00157", "", "").to_string(), "157");
        assert_eq!(parcel("123456", "", "", "", "").to_string(), "123456");
        assert_eq!(parcel("", "001", "", "", "").to_string(), " 001,");
        assert_eq!(
            parcel("", "123", "00004", "0002", "").to_string(),
            " 123,00004/0002"
        );
    }

    #[test]
    fn test_sub_district_without_district_reparses() {
        for id in [
            parcel("", "001", "", "", ""),
            parcel("", "123", "00004", "", ""),
            parcel("", "123", "00004", "0002", ""),
        ] {
            assert_eq!(ParcelId::parse(&id.to_string(), None), Some(id.clone()));
            assert_eq!(ParcelId::parse(&id.to_string(), Some("13")), Some(id));
        }
    }
}
