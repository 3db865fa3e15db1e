use regex::Regex;
use std::sync::OnceLock;

use crate::error::{IngestError, Result};
use crate::types::Year;

static YEAR_TOKEN: OnceLock<Regex> = OnceLock::new();

fn year_token() -> &'static Regex {
    // Whole 4-digit token: anything but an ASCII digit (or the string edge)
    // on both sides. `\d` would also match non-ASCII digits.
    YEAR_TOKEN.get_or_init(|| {
        Regex::new(r"(?:^|[^0-9])((?:19|20)[0-9]{2})(?:[^0-9]|$)").expect("year pattern is valid")
    })
}

/// Extract the first standalone `19xx`/`20xx` token from a path or identifier.
pub fn extract_year(identifier: &str) -> Result<Year> {
    year_token()
        .captures(identifier)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok())
        .and_then(Year::new)
        .ok_or_else(|| IngestError::NoYearFound {
            identifier: identifier.to_string(),
        })
}
