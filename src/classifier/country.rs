use std::net::IpAddr;

use cached::proc_macro::cached;
use hashbrown::{HashMap, HashSet};
use once_cell::sync::Lazy;

use crate::{
    geolookup::GeoLookup,
    proxy::models::{ProxyConfig, UNKNOWN_COUNTRY},
};

const MAX_LABEL_LEN: usize = 30;

/// Country codes that are allowed to reach a country bucket.
static KNOWN_CODES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "US", "DE", "IR", "CA", "NL", "TR", "SE", "IN", "RU", "ES", "NO", "LT", "HK", "CN", "GB",
        "FR", "JP", "SG", "AU", "BR", "KR", "IT", "CH", "PL", "UA", "TW", "FI", "AT", "BE", "DK",
        "IE", "PT", "GR", "CZ", "RO", "BG", "HR", "SK", "SI", "EE", "LV", "IS", "LU", "MT", "CY",
    ]
    .into_iter()
    .collect()
});

/// Upper-case country names and abbreviations mapped to their code.
static COUNTRY_NAMES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("UNITED STATES", "US"),
        ("AMERICA", "US"),
        ("USA", "US"),
        ("GERMANY", "DE"),
        ("IRAN", "IR"),
        ("CANADA", "CA"),
        ("NETHERLANDS", "NL"),
        ("HOLLAND", "NL"),
        ("TURKEY", "TR"),
        ("SWEDEN", "SE"),
        ("INDIA", "IN"),
        ("RUSSIA", "RU"),
        ("SPAIN", "ES"),
        ("NORWAY", "NO"),
        ("LITHUANIA", "LT"),
        ("HONG KONG", "HK"),
        ("HONGKONG", "HK"),
        ("CHINA", "CN"),
        ("UNITED KINGDOM", "GB"),
        ("UK", "GB"),
        ("FRANCE", "FR"),
        ("JAPAN", "JP"),
        ("SINGAPORE", "SG"),
        ("AUSTRALIA", "AU"),
        ("BRAZIL", "BR"),
        ("SOUTH KOREA", "KR"),
        ("KOREA", "KR"),
        ("ITALY", "IT"),
        ("SWITZERLAND", "CH"),
        ("POLAND", "PL"),
        ("UKRAINE", "UA"),
        ("TAIWAN", "TW"),
        ("FINLAND", "FI"),
        ("AUSTRIA", "AT"),
        ("BELGIUM", "BE"),
        ("DENMARK", "DK"),
        ("IRELAND", "IE"),
        ("PORTUGAL", "PT"),
        ("GREECE", "GR"),
        ("ROMANIA", "RO"),
        ("BULGARIA", "BG"),
        ("LUXEMBOURG", "LU"),
    ]
    .into_iter()
    .collect()
});

fn unknown() -> String {
    UNKNOWN_COUNTRY.to_string()
}

/// Converts a pair of regional indicator symbols into their two letters.
fn flag_letters(first: char, second: char) -> Option<String> {
    let letter = |c: char| {
        let offset = (c as u32).checked_sub(0x1F1E6)?;
        (offset < 26).then(|| char::from(b'A' + offset as u8))
    };
    Some([letter(first)?, letter(second)?].iter().collect())
}

/// Finds the first emoji flag in `text`.
fn find_flag(text: &str) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .windows(2)
        .find_map(|pair| flag_letters(pair[0], pair[1]))
}

/// Normalizes a country label to a known code, or [`UNKNOWN_COUNTRY`].
///
/// Labels that start with a digit, contain a latency-like `ms` or an
/// underscore, or are longer than 30 characters are leftovers of a bad parse
/// and are rejected outright. Emoji flags and full names are mapped to their
/// code; bare codes are kept only if they are in the known list.
///
/// ```
/// use linkscout::classifier::validate_country;
///
/// assert_eq!(validate_country("USA"), "US");
/// assert_eq!(validate_country("germany"), "DE");
/// assert_eq!(validate_country("1ms"), "Unknown");
/// ```
#[cached(size = 1024, key = "String", convert = r#"{ label.to_string() }"#)]
pub fn validate_country(label: &str) -> String {
    let label = label.trim();
    if label.is_empty()
        || label.starts_with(|c: char| c.is_ascii_digit())
        || label.to_lowercase().contains("ms")
        || label.contains('_')
        || label.chars().count() > MAX_LABEL_LEN
    {
        return unknown();
    }

    let mut chars = label.chars();
    if let (Some(first), Some(second), None) = (chars.next(), chars.next(), chars.next()) {
        if let Some(code) = flag_letters(first, second) {
            return if KNOWN_CODES.contains(code.as_str()) {
                code
            } else {
                unknown()
            };
        }
    }

    let upper = label.to_uppercase();
    if let Some(code) = COUNTRY_NAMES.get(upper.as_str()) {
        return code.to_string();
    }
    if (2..=3).contains(&upper.len())
        && upper.chars().all(|c| c.is_ascii_uppercase())
        && KNOWN_CODES.contains(upper.as_str())
    {
        return upper;
    }
    unknown()
}

/// Looks for a country name or an upper-case code among the words of a remark.
fn country_from_remark(remark: &str) -> Option<String> {
    let words: Vec<&str> = remark
        .split(|c: char| !c.is_alphabetic())
        .filter(|word| !word.is_empty())
        .collect();

    let from_names = words
        .windows(2)
        .map(|pair| format!("{} {}", pair[0], pair[1]))
        .chain(words.iter().map(|word| word.to_string()))
        .find_map(|candidate| {
            COUNTRY_NAMES
                .get(candidate.to_uppercase().as_str())
                .map(|code| code.to_string())
        });
    if from_names.is_some() {
        return from_names;
    }

    // bare codes only count when written in capitals, "is" and "in" are words
    words
        .iter()
        .filter(|word| word.len() == 2 && word.chars().all(|c| c.is_ascii_uppercase()))
        .find(|word| KNOWN_CODES.contains(**word))
        .map(|word| word.to_string())
}

/// Country code from the top-level domain of a hostname.
fn country_from_domain(address: &str) -> Option<String> {
    if address.parse::<IpAddr>().is_ok() {
        return None;
    }
    let tld = address.trim_end_matches('.').rsplit('.').next()?;
    if tld.len() != 2 || tld == address {
        return None;
    }
    match tld.to_ascii_uppercase().as_str() {
        "UK" => Some("GB".into()),
        code => Some(code.to_string()),
    }
}

fn known(label: Option<String>) -> Option<String> {
    label
        .map(|label| validate_country(&label))
        .filter(|code| code != UNKNOWN_COUNTRY)
}

/// Derives the country of a record.
///
/// Tries, in order: the label set by the decoder, an emoji flag in the remark,
/// a country name or code in the remark, the ccTLD of the address (when
/// `from_domain` is set) and finally a GeoIP lookup of a literal IP address.
/// Every candidate goes through [`validate_country`].
pub fn infer_country(proxy: &ProxyConfig, from_domain: bool, geo: Option<&GeoLookup>) -> String {
    let remark = proxy.remark.as_deref().unwrap_or_default();

    known(Some(proxy.country.clone()))
        .or_else(|| known(find_flag(remark)))
        .or_else(|| known(country_from_remark(remark)))
        .or_else(|| {
            from_domain
                .then(|| country_from_domain(&proxy.address))
                .and_then(known)
        })
        .or_else(|| {
            let ip = proxy.address.parse::<IpAddr>().ok()?;
            known(geo?.lookup(ip))
        })
        .unwrap_or_else(unknown)
}
