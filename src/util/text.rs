use std::borrow::Cow;

/// Builds the collation key used to order catalog records.
///
/// The first character is titlecased and the rest of the string is
/// lowercased, so `"MIT"` collates as `"Mit"` and `"aWS"` as `"Aws"`. This is
/// not the same as a plain case-insensitive comparison: the leading character
/// is compared in its uppercase form, so `"alpha"` (`"Alpha"`) sorts before
/// `"_beta"` even though `'_' < 'a'`.
///
/// Lowercasing runs over the whole string, so a word-final `'Σ'` becomes
/// `'ς'`. Titlecasing keeps only the first character of a multi-character
/// uppercase mapping in upper case (`"ß"` -> `"Ss"`, `"ﬁ"` -> `"Fi"`), and
/// the Latin digraphs map to their titlecase forms (`"ǆ"` -> `"ǅ"`).
///
/// # Examples
///
/// ```
/// use blogroll::util::capitalize;
///
/// assert_eq!(capitalize("aWS"), "Aws");
/// assert_eq!(capitalize("MIT"), "Mit");
/// assert_eq!(capitalize(""), "");
/// ```
pub fn capitalize(s: &str) -> String {
    let Some(first) = s.chars().next() else {
        return String::new();
    };

    let mut out = String::with_capacity(s.len());
    push_titlecase(&mut out, first);

    // Lowercase in context, then drop the first character's lowercase form
    let lowered = s.to_lowercase();
    let skip: usize = first.to_lowercase().map(char::len_utf8).sum();
    out.push_str(&lowered[skip..]);
    out
}

fn push_titlecase(out: &mut String, c: char) {
    let digraph = match c {
        '\u{01C4}'..='\u{01C6}' => Some('\u{01C5}'), // Ǆ ǅ ǆ
        '\u{01C7}'..='\u{01C9}' => Some('\u{01C8}'), // Ǉ ǈ ǉ
        '\u{01CA}'..='\u{01CC}' => Some('\u{01CB}'), // Ǌ ǋ ǌ
        '\u{01F1}'..='\u{01F3}' => Some('\u{01F2}'), // Ǳ ǲ ǳ
        _ => None,
    };
    if let Some(title) = digraph {
        out.push(title);
        return;
    }

    let mut upper = c.to_uppercase();
    if let Some(head) = upper.next() {
        out.push(head);
    }
    for rest in upper {
        out.extend(rest.to_lowercase());
    }
}

/// Removes control characters (C0, DEL, C1) from a single-line string.
///
/// Names and feed URLs end up on the terminal and in XML attributes; neither
/// place has any use for escape sequences or NULs. Returns `Cow::Borrowed`
/// when nothing needs stripping.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(char::is_control) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|c| !c.is_control()).collect())
}

/// Strips control characters and surrounding whitespace.
pub fn clean_field(s: &str) -> String {
    strip_control_chars(s).trim().to_owned()
}
