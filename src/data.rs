use crate::error::{Error, Result};
use crate::instructions::strip_comment;
use crate::int_util;
use crate::memory::{AllocationId, MemoryManager, Number, Value};
use crate::parser;
use std::collections::HashMap;

/// Every allocation produced under each data label, in source order.
pub type DataMap = HashMap<String, Vec<AllocationId>>;

/// The sentinel label collecting data that precedes any explicit label.
pub const ANONYMOUS_LABEL: &str = "__anonymous_data";

/// Streams the `.data` section of `source` into `allocator` and returns the
/// label map. Unknown directives and malformed size arguments are skipped;
/// bad literals fail fast.
pub fn parse_data(allocator: &mut MemoryManager, source: &str) -> Result<DataMap> {
    let mut labels: DataMap = HashMap::new();
    let mut current_label: Option<String> = None;
    let mut in_data = false;

    for raw_line in source.lines() {
        let mut line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with(".section .data") || line == ".data" {
            in_data = true;
            continue;
        }
        if line.starts_with(".section") || line == ".text" || line == ".bss" {
            in_data = false;
            continue;
        }
        if !in_data {
            continue;
        }

        // A label prefix sets the current label; the remainder of the line
        // (if any) is parsed as a directive.
        if let Some(colon) = line.find(':') {
            let possible_label = line[..colon].trim();
            if parser::is_symbol(possible_label) {
                labels.entry(possible_label.to_owned()).or_default();
                current_label = Some(possible_label.to_owned());
                line = line[colon + 1..].trim();
            }
            if line.is_empty() {
                continue;
            }
        }

        if current_label.is_none() {
            labels.entry(ANONYMOUS_LABEL.to_owned()).or_default();
            current_label = Some(ANONYMOUS_LABEL.to_owned());
        }
        let label = current_label.clone().unwrap();

        let (directive, args) = match line.split_once(|c: char| c.is_whitespace()) {
            Some((directive, args)) => (directive, args.trim()),
            None => (line, ""),
        };

        if let Some(id) = parse_directive(allocator, directive, args, &label)? {
            labels.get_mut(&label).unwrap().push(id);
        }
    }

    Ok(labels)
}

fn parse_directive(
    allocator: &mut MemoryManager,
    directive: &str,
    args: &str,
    label: &str,
) -> Result<Option<AllocationId>> {
    match directive {
        ".int" | ".long" => {
            let values = parse_int_list(args)?;
            allocate_number_list(allocator, values, label)
        }
        ".float" => {
            let mut values = Vec::new();
            for text in args.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                values.push(Number::Float(text.parse::<f32>()?));
            }
            allocate_number_list(allocator, values, label)
        }
        ".asciz" | ".string" | ".ascii" => match quoted_content(args) {
            Some(content) => {
                let decoded = unescape(content)?;
                let id = allocator.allocate_data(Value::Str(decoded), label, true)?;
                Ok(Some(id))
            }
            None => Ok(None),
        },
        ".zero" | ".space" | ".skip" => {
            let size_text = match args.split_whitespace().next() {
                Some(text) => text,
                None => return Ok(None),
            };
            match int_util::parse_int::<i64>(size_text) {
                Ok(size) => Ok(Some(allocator.allocate_empty(size, label, true)?)),
                Err(_) => Ok(None),
            }
        }
        _ => Ok(None),
    }
}

fn parse_int_list(args: &str) -> Result<Vec<Number>> {
    let mut values = Vec::new();
    for text in args.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        values.push(Number::Int(int_util::parse_int::<i64>(text)?));
    }
    Ok(values)
}

fn allocate_number_list(
    allocator: &mut MemoryManager,
    values: Vec<Number>,
    label: &str,
) -> Result<Option<AllocationId>> {
    let value = match values.len() {
        0 => return Ok(None),
        1 => match values[0] {
            Number::Int(value) => Value::Int(value),
            Number::Float(value) => Value::Float(value),
        },
        _ => Value::List(values),
    };

    Ok(Some(allocator.allocate_data(value, label, true)?))
}

/// The text between the first and last double quote of `args`, if any.
fn quoted_content(args: &str) -> Option<&str> {
    let first = args.find('"')?;
    let last = args.rfind('"')?;
    if last > first {
        Some(&args[first + 1..last])
    } else {
        None
    }
}

/// Decodes the common GAS string escapes.
fn unescape(text: &str) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('x') => {
                let digits: String = chars.by_ref().take(2).collect();
                match u8::from_str_radix(&digits, 16) {
                    Ok(byte) => out.push(byte as char),
                    Err(_) => {
                        return Err(Error::InvalidEscape {
                            sequence: format!("\\x{}", digits),
                        });
                    }
                }
            }
            other => {
                let mut sequence = String::from("\\");
                if let Some(c) = other {
                    sequence.push(c);
                }
                return Err(Error::InvalidEscape { sequence });
            }
        }
    }

    Ok(out)
}
