//! Placeholder Expansion
//!
//! Shell-style substitution of `${name}` and `$name` placeholders.
//! The caller decides what each name resolves to; this module only
//! knows the syntax.

/// Expands every placeholder in `input` using `lookup`.
///
/// Supported forms:
/// - `${name}` - any text up to the closing brace
/// - `$name` - a run of ASCII letters, digits and underscores
///
/// A `$` that starts neither form is copied literally, as is an
/// unterminated `${`. An empty `${}` expands to nothing.
///
/// # Example
///
/// ```
/// use actionflow::variables::expand;
///
/// let out = expand("hello ${who} and $other!", |name| name.to_uppercase());
/// assert_eq!(out, "hello WHO and OTHER!");
/// ```
pub fn expand<F>(input: &str, mut lookup: F) -> String
where
    F: FnMut(&str) -> String,
{
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        output.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        match parse_placeholder(after) {
            Some((name, consumed)) => {
                if !name.is_empty() {
                    output.push_str(&lookup(name));
                }
                rest = &after[consumed..];
            }
            None => {
                output.push('$');
                rest = after;
            }
        }
    }

    output.push_str(rest);
    output
}

/// Lists the placeholder names referenced by `input`, in order.
pub fn placeholders(input: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        let after = &rest[pos + 1..];
        match parse_placeholder(after) {
            Some((name, consumed)) => {
                if !name.is_empty() {
                    names.push(name);
                }
                rest = &after[consumed..];
            }
            None => rest = after,
        }
    }

    names
}

/// Parses the placeholder that follows a `$`.
///
/// Returns the name and the number of bytes consumed after the `$`.
fn parse_placeholder(s: &str) -> Option<(&str, usize)> {
    if let Some(braced) = s.strip_prefix('{') {
        let end = braced.find('}')?;
        return Some((&braced[..end], end + 2));
    }

    let len = s
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
        .count();

    if len == 0 {
        None
    } else {
        Some((&s[..len], len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upper(name: &str) -> String {
        name.to_uppercase()
    }

    #[test]
    fn test_expand_braced_and_bare() {
        assert_eq!(expand("${a}-$b", upper), "A-B");
    }

    #[test]
    fn test_expand_dotted_names_need_braces() {
        assert_eq!(expand("${out.step.stdout}", upper), "OUT.STEP.STDOUT");
        // Bare names stop at the first dot.
        assert_eq!(expand("$out.step", upper), "OUT.step");
    }

    #[test]
    fn test_expand_keeps_lone_dollar() {
        assert_eq!(expand("cost: $ 5", upper), "cost: $ 5");
        assert_eq!(expand("trailing $", upper), "trailing $");
        assert_eq!(expand("$$", upper), "$$");
    }

    #[test]
    fn test_expand_unterminated_brace_is_literal() {
        assert_eq!(expand("${abc", upper), "${abc");
    }

    #[test]
    fn test_expand_empty_braces() {
        assert_eq!(expand("a${}b", upper), "ab");
    }

    #[test]
    fn test_expand_no_placeholders() {
        assert_eq!(expand("plain text", upper), "plain text");
        assert_eq!(expand("", upper), "");
    }

    #[test]
    fn test_expand_utf8_surroundings() {
        assert_eq!(expand("héllo ${x} wörld", upper), "héllo X wörld");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(
            placeholders("echo ${out.a.stdout} $HOME $ ${}"),
            vec!["out.a.stdout", "HOME"]
        );
    }
}
