//! Text normalization for name/description comparison.
//!
//! ERPNext descriptions are edited in a rich-text widget and WooCommerce
//! stores whatever HTML it was given, so the raw strings rarely match even
//! when the visible text does.

/// Normalize for comparison: unescape entities, strip tags, collapse whitespace.
pub fn normalize(raw: &str) -> String {
    let unescaped = unescape_entities(raw);
    let stripped = strip_tags(&unescaped);
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `true` when both strings render to the same visible text.
pub fn same_text(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for ch in input.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                // tags separate words (`a<br>b` renders as two words)
                out.push(' ');
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

fn unescape_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];
        match candidate.find(';').filter(|end| *end <= 10) {
            Some(end) => match decode_entity(&candidate[1..end]) {
                Some(ch) => {
                    out.push(ch);
                    rest = &candidate[end + 1..];
                }
                None => {
                    out.push('&');
                    rest = &candidate[1..];
                }
            },
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }

    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "hellip" => '\u{2026}',
        "rsquo" => '\u{2019}',
        "lsquo" => '\u{2018}',
        "rdquo" => '\u{201d}',
        "ldquo" => '\u{201c}',
        "euro" => '\u{20ac}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "trade" => '\u{2122}',
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markup_and_collapses_whitespace() {
        assert_eq!(normalize("<p>Oak   chair</p>\n<br/>"), "Oak chair");
        assert_eq!(normalize("line<br>break"), "line break");
    }

    #[test]
    fn unescapes_entities() {
        assert_eq!(normalize("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(normalize("caf&#233;&nbsp;au lait"), "café au lait");
        assert_eq!(normalize("&#x41;BC"), "ABC");
    }

    #[test]
    fn escaped_markup_is_stripped_too() {
        assert_eq!(normalize("&lt;b&gt;Bold&lt;/b&gt;"), "Bold");
    }

    #[test]
    fn stray_ampersands_survive() {
        assert_eq!(normalize("R&D"), "R&D");
        assert_eq!(normalize("a & b; c"), "a & b; c");
        assert_eq!(normalize("&bogus;"), "&bogus;");
    }

    #[test]
    fn same_text_ignores_formatting() {
        assert!(same_text("<strong>Desk</strong> lamp", "Desk   lamp"));
        assert!(!same_text("Desk lamp", "desk lamp"));
    }
}
