//! The mandated built-in scalar function registry. Each entry is a pure
//! `(args) -> value` mapping with T-SQL arity/null semantics.

use fetchql_common::{Error, QueryValue, Result};

pub fn call(name: &str, args: &[QueryValue]) -> Result<QueryValue> {
    match name.to_ascii_uppercase().as_str() {
        "UPPER" => unary_string(name, args, |s| s.to_uppercase()),
        "LOWER" => unary_string(name, args, |s| s.to_lowercase()),
        "REVERSE" => unary_string(name, args, |s| s.chars().rev().collect()),
        "TRIM" => unary_string(name, args, |s| s.trim().to_string()),
        "LTRIM" => unary_string(name, args, |s| s.trim_start().to_string()),
        "RTRIM" => unary_string(name, args, |s| s.trim_end().to_string()),
        "LEN" => len(args),
        "LEFT" => left_right(args, true),
        "RIGHT" => left_right(args, false),
        "SUBSTRING" => substring(args),
        "REPLACE" => replace(args),
        "CHARINDEX" => charindex(args),
        "CONCAT" => concat(args),
        "STUFF" => stuff(args),
        other => Err(Error::invalid_request(format!("unknown function '{other}'"))),
    }
}

fn require_arity(name: &str, args: &[QueryValue], min: usize, max: usize) -> Result<()> {
    if args.len() < min || args.len() > max {
        return Err(Error::invalid_request(format!(
            "{name}() expects between {min} and {max} argument(s), got {}",
            args.len()
        )));
    }
    Ok(())
}

fn text(v: &QueryValue) -> Option<String> {
    v.as_display_string()
}

fn as_i64(v: &QueryValue) -> Result<i64> {
    match v {
        QueryValue::Simple(Some(serde_json::Value::Number(n))) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| Error::type_mismatch("integer", n.to_string())),
        other => Err(Error::type_mismatch("integer", format!("{other:?}"))),
    }
}

fn unary_string(name: &str, args: &[QueryValue], f: impl Fn(&str) -> String) -> Result<QueryValue> {
    require_arity(name, args, 1, 1)?;
    match text(&args[0]) {
        None => Ok(QueryValue::null()),
        Some(s) => Ok(QueryValue::from_str(f(&s))),
    }
}

/// `LEN`: trailing spaces excluded, leading spaces included (T-SQL quirk).
fn len(args: &[QueryValue]) -> Result<QueryValue> {
    require_arity("LEN", args, 1, 1)?;
    match text(&args[0]) {
        None => Ok(QueryValue::null()),
        Some(s) => Ok(QueryValue::from_i64(s.trim_end_matches(' ').chars().count() as i64)),
    }
}

fn left_right(args: &[QueryValue], from_left: bool) -> Result<QueryValue> {
    require_arity(if from_left { "LEFT" } else { "RIGHT" }, args, 2, 2)?;
    let (Some(s), Ok(len)) = (text(&args[0]), as_i64(&args[1])) else {
        return Ok(QueryValue::null());
    };
    let chars: Vec<char> = s.chars().collect();
    let take = len.max(0) as usize;
    let take = take.min(chars.len());
    let slice: String = if from_left {
        chars[..take].iter().collect()
    } else {
        chars[chars.len() - take..].iter().collect()
    };
    Ok(QueryValue::from_str(slice))
}

/// `SUBSTRING(str, start, length)`: 1-based; `start <= 0` shrinks `length`
/// by the same amount and clamps `start` to 1; out-of-range yields empty.
fn substring(args: &[QueryValue]) -> Result<QueryValue> {
    require_arity("SUBSTRING", args, 3, 3)?;
    let (Some(s), Ok(mut start), Ok(mut length)) =
        (text(&args[0]), as_i64(&args[1]), as_i64(&args[2]))
    else {
        return Ok(QueryValue::null());
    };
    if start <= 0 {
        length += start - 1;
        start = 1;
    }
    let chars: Vec<char> = s.chars().collect();
    if length <= 0 || start as usize > chars.len() {
        return Ok(QueryValue::from_str(""));
    }
    let start0 = (start - 1) as usize;
    let end = (start0 + length as usize).min(chars.len());
    Ok(QueryValue::from_str(chars[start0..end].iter().collect::<String>()))
}

/// `REPLACE(str, find, replacement)`: case-insensitive find; an empty
/// `find` returns the original string unchanged.
fn replace(args: &[QueryValue]) -> Result<QueryValue> {
    require_arity("REPLACE", args, 3, 3)?;
    let (Some(s), Some(find), Some(replacement)) =
        (text(&args[0]), text(&args[1]), text(&args[2]))
    else {
        return Ok(QueryValue::null());
    };
    if find.is_empty() {
        return Ok(QueryValue::from_str(s));
    }
    let lower_s = s.to_ascii_lowercase();
    let lower_find = find.to_ascii_lowercase();
    let mut out = String::with_capacity(s.len());
    let mut rest = s.as_str();
    let mut rest_lower = lower_s.as_str();
    while let Some(idx) = rest_lower.find(&lower_find) {
        out.push_str(&rest[..idx]);
        out.push_str(&replacement);
        rest = &rest[idx + find.len()..];
        rest_lower = &rest_lower[idx + find.len()..];
    }
    out.push_str(rest);
    Ok(QueryValue::from_str(out))
}

/// `CHARINDEX(find, str[, start])`: 1-based, 0 = not found. Matches
/// case-insensitively, consistent with [`replace`].
fn charindex(args: &[QueryValue]) -> Result<QueryValue> {
    require_arity("CHARINDEX", args, 2, 3)?;
    let (Some(find), Some(s)) = (text(&args[0]), text(&args[1])) else {
        return Ok(QueryValue::null());
    };
    let start = match args.get(2) {
        Some(v) => as_i64(v)?.max(1) as usize,
        None => 1,
    };
    let chars: Vec<char> = s.chars().collect();
    if start > chars.len() + 1 || find.is_empty() {
        return Ok(QueryValue::from_i64(0));
    }
    let haystack: String = chars[start - 1..].iter().collect();
    match haystack.to_ascii_lowercase().find(&find.to_ascii_lowercase()) {
        Some(byte_idx) => {
            let char_idx = haystack[..byte_idx].chars().count();
            Ok(QueryValue::from_i64((start + char_idx) as i64))
        }
        None => Ok(QueryValue::from_i64(0)),
    }
}

/// `CONCAT(a, b, ...)`: null arguments are treated as empty strings.
fn concat(args: &[QueryValue]) -> Result<QueryValue> {
    if args.len() < 2 {
        return Err(Error::invalid_request("CONCAT() expects at least 2 arguments"));
    }
    let joined: String = args.iter().map(|v| text(v).unwrap_or_default()).collect();
    Ok(QueryValue::from_str(joined))
}

/// `STUFF(str, start, length, replacement)`: `start <= 0`, `start` beyond
/// the string, or a negative delete length all yield null.
fn stuff(args: &[QueryValue]) -> Result<QueryValue> {
    require_arity("STUFF", args, 4, 4)?;
    let (Some(s), Ok(start), Ok(delete_len), Some(replacement)) =
        (text(&args[0]), as_i64(&args[1]), as_i64(&args[2]), text(&args[3]))
    else {
        return Ok(QueryValue::null());
    };
    let chars: Vec<char> = s.chars().collect();
    if start <= 0 || start as usize > chars.len() || delete_len < 0 {
        return Ok(QueryValue::null());
    }
    let start0 = (start - 1) as usize;
    let end = (start0 + delete_len as usize).min(chars.len());
    let mut out: String = chars[..start0].iter().collect();
    out.push_str(&replacement);
    out.push_str(&chars[end..].iter().collect::<String>());
    Ok(QueryValue::from_str(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> QueryValue {
        QueryValue::from_str(v)
    }

    fn n(v: i64) -> QueryValue {
        QueryValue::from_i64(v)
    }

    #[test]
    fn upper_of_null_is_null() {
        assert_eq!(call("UPPER", &[QueryValue::null()]).unwrap(), QueryValue::null());
    }

    #[test]
    fn len_excludes_trailing_spaces_but_keeps_leading() {
        assert_eq!(call("LEN", &[s("  abc  ")]).unwrap(), n(5));
    }

    #[test]
    fn left_clamps_to_string_length() {
        assert_eq!(call("LEFT", &[s("ab"), n(10)]).unwrap(), s("ab"));
    }

    #[test]
    fn substring_with_non_positive_start_shrinks_length() {
        // SUBSTRING('abcdef', -1, 5) -> start becomes 1, length becomes 5-2=3 -> "abc"
        assert_eq!(call("SUBSTRING", &[s("abcdef"), n(-1), n(5)]).unwrap(), s("abc"));
    }

    #[test]
    fn substring_start_beyond_length_is_empty() {
        assert_eq!(call("SUBSTRING", &[s("abc"), n(10), n(2)]).unwrap(), s(""));
    }

    #[test]
    fn replace_is_case_insensitive() {
        assert_eq!(call("REPLACE", &[s("Hello World"), s("world"), s("Rust")]).unwrap(), s("Hello Rust"));
    }

    #[test]
    fn replace_with_empty_find_is_unchanged() {
        assert_eq!(call("REPLACE", &[s("abc"), s(""), s("x")]).unwrap(), s("abc"));
    }

    #[test]
    fn charindex_not_found_returns_zero() {
        assert_eq!(call("CHARINDEX", &[s("zz"), s("abc")]).unwrap(), n(0));
    }

    #[test]
    fn charindex_returns_one_based_position() {
        assert_eq!(call("CHARINDEX", &[s("cd"), s("abcdef")]).unwrap(), n(3));
    }

    #[test]
    fn concat_treats_null_as_empty() {
        assert_eq!(call("CONCAT", &[s("a"), QueryValue::null(), s("b")]).unwrap(), s("ab"));
    }

    #[test]
    fn stuff_replaces_inner_range() {
        assert_eq!(call("STUFF", &[s("abcdef"), n(2), n(3), s("XY")]).unwrap(), s("aXYef"));
    }

    #[test]
    fn stuff_with_start_beyond_length_is_null() {
        assert_eq!(call("STUFF", &[s("abc"), n(10), n(1), s("X")]).unwrap(), QueryValue::null());
    }
}
