use num::{Num, Zero};
use std::num::ParseIntError;

/// Parses an unsigned integer literal, auto-detecting the base from a
/// C-style prefix: `0x`/`0X` hexadecimal, `0o`/`0O` octal, `0b`/`0B`
/// binary, plain digits decimal.
pub fn parse_uint<T>(text: &str) -> Result<T, ParseIntError>
where
    T: Num<FromStrRadixErr = ParseIntError>,
{
    let text = text.trim();

    let (radix, digits) = if text.starts_with("0x") || text.starts_with("0X") {
        (16, &text[2..])
    } else if text.starts_with("0o") || text.starts_with("0O") {
        (8, &text[2..])
    } else if text.starts_with("0b") || text.starts_with("0B") {
        (2, &text[2..])
    } else {
        (10, text)
    };

    T::from_str_radix(digits, radix)
}

/// Like [`parse_uint`], with an optional leading sign.
pub fn parse_int<T>(text: &str) -> Result<T, ParseIntError>
where
    T: Num<FromStrRadixErr = ParseIntError> + Zero,
{
    let text = text.trim();

    if let Some(rest) = text.strip_prefix('-') {
        Ok(T::zero() - parse_uint(rest)?)
    } else if let Some(rest) = text.strip_prefix('+') {
        parse_uint(rest)
    } else {
        parse_uint(text)
    }
}
