//! Gram generation and boost formatting for the n-gram query fields.

/// All overlapping substrings of `min..=max` characters, shortest grams first.
pub(super) fn ngrams(term: &str, min: usize, max: usize) -> Vec<String> {
    let chars: Vec<char> = term.chars().collect();
    (min.max(1)..=max)
        .flat_map(|n| chars.windows(n).map(|w| w.iter().collect::<String>()))
        .collect()
}

/// Prefixes of `min..=max` characters, stopping at the full term.
pub(super) fn edge_ngrams(term: &str, min: usize, max: usize) -> Vec<String> {
    let len = term.chars().count();
    (min.max(1)..=max.min(len))
        .map(|n| term.chars().take(n).collect())
        .collect()
}

/// Fold German spelling variants so that `Straße`, `strasse`, `Müller` and
/// `Mueller` produce the same grams.
///
/// `ä`/`ae` → `a`, `ö`/`oe` → `o`, `ü`/`ue` → `u` (not after `q`), `ß` → `ss`.
/// Only digraphs spelled out in the input fold; an `e` after an umlaut stays.
pub(super) fn fold_german(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    // last two input characters, most recent first
    let mut prev: [Option<char>; 2] = [None, None];
    for c in term.chars().flat_map(char::to_lowercase) {
        match c {
            'ä' => out.push('a'),
            'ö' => out.push('o'),
            'ü' => out.push('u'),
            'ß' => out.push_str("ss"),
            'e' if is_digraph_head(prev) => {}
            _ => out.push(c),
        }
        prev = [Some(c), prev[0]];
    }
    out
}

fn is_digraph_head(prev: [Option<char>; 2]) -> bool {
    match prev {
        [Some('a' | 'o'), _] => true,
        [Some('u'), before] => before != Some('q'),
        _ => false,
    }
}

/// Format a boost with two significant digits (`0.33`, `1.0`, `2.5`).
pub(super) fn format_boost(boost: f64) -> String {
    let rounded = round_significant(boost, 2);
    if rounded.fract() == 0.0 {
        format!("{rounded:.1}")
    } else {
        rounded.to_string()
    }
}

fn round_significant(value: f64, digits: i32) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let exponent = digits - 1 - value.abs().log10().floor() as i32;
    if exponent >= 0 {
        let scale = 10f64.powi(exponent);
        (value * scale).round() / scale
    } else {
        let scale = 10f64.powi(-exponent);
        (value / scale).round() * scale
    }
}
