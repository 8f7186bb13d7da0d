//! STEP attribute tokenizer built on nom combinators.
//!
//! Parses the `( … )` attribute list of an entity instance into
//! [`AttributeValue`]s. The scanner (see [`crate::scanner`]) has already
//! isolated the entity span, so inputs here are single attribute lists.

use crate::types::AttributeValue;
use crate::types::EntityId;
use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::{opt, recognize},
    multi::separated_list0,
    sequence::{delimited, pair},
    IResult, Parser,
};

fn ws(input: &str) -> IResult<&str, ()> {
    let (input, _) = multispace0(input)?;
    Ok((input, ()))
}

/// `#123`
fn entity_ref(input: &str) -> IResult<&str, AttributeValue> {
    let (input, _) = char('#').parse(input)?;
    let (input, digits) = take_while1(|c: char| c.is_ascii_digit()).parse(input)?;
    let id = digits.parse::<u32>().unwrap_or(0);
    Ok((input, AttributeValue::EntityRef(EntityId(id))))
}

/// `'text'` with `''` as the escaped quote.
fn quoted_string(input: &str) -> IResult<&str, AttributeValue> {
    let (input, _) = char('\'').parse(input)?;

    let bytes = input.as_bytes();
    let mut end = 0;
    let mut has_escape = false;
    while end < bytes.len() {
        if bytes[end] == b'\'' {
            if end + 1 < bytes.len() && bytes[end + 1] == b'\'' {
                has_escape = true;
                end += 2;
                continue;
            }
            break;
        }
        end += 1;
    }

    let raw = &input[..end];
    let value = if has_escape {
        raw.replace("''", "'")
    } else {
        raw.to_string()
    };
    Ok((&input[end + 1..], AttributeValue::String(value)))
}

/// Integer or real, including scientific notation (`1.5E-3`).
fn number(input: &str) -> IResult<&str, AttributeValue> {
    let (input, text) = recognize((
        opt(char('-')),
        take_while1(|c: char| c.is_ascii_digit()),
        opt(pair(char('.'), take_while(|c: char| c.is_ascii_digit()))),
        opt((
            alt((char('e'), char('E'))),
            opt(alt((char('+'), char('-')))),
            take_while1(|c: char| c.is_ascii_digit()),
        )),
    ))
    .parse(input)?;

    let value = if text.contains(['.', 'e', 'E']) {
        AttributeValue::Float(lexical_core::parse(text.as_bytes()).unwrap_or(0.0))
    } else {
        AttributeValue::Integer(lexical_core::parse(text.as_bytes()).unwrap_or(0))
    };
    Ok((input, value))
}

/// `.LENGTHUNIT.`
fn enumeration(input: &str) -> IResult<&str, AttributeValue> {
    let (input, name) = delimited(
        char('.'),
        take_while1(|c: char| c.is_alphanumeric() || c == '_'),
        char('.'),
    )
    .parse(input)?;
    Ok((input, AttributeValue::Enum(name.to_string())))
}

fn null_value(input: &str) -> IResult<&str, AttributeValue> {
    let (input, _) = char('$').parse(input)?;
    Ok((input, AttributeValue::Null))
}

fn derived_value(input: &str) -> IResult<&str, AttributeValue> {
    let (input, _) = char('*').parse(input)?;
    Ok((input, AttributeValue::Derived))
}

fn list(input: &str) -> IResult<&str, AttributeValue> {
    let (input, items) = value_list(input)?;
    Ok((input, AttributeValue::List(items)))
}

/// Wrapped select value like `IFCLABEL('text')`.
fn typed_value(input: &str) -> IResult<&str, AttributeValue> {
    let (input, name) = take_while1(|c: char| c.is_alphanumeric() || c == '_').parse(input)?;
    let (input, _) = ws(input)?;
    let (input, args) = value_list(input)?;
    Ok((input, AttributeValue::Typed(name.to_string(), args)))
}

fn value(input: &str) -> IResult<&str, AttributeValue> {
    alt((
        entity_ref,
        quoted_string,
        null_value,
        derived_value,
        enumeration,
        number,
        list,
        typed_value,
    ))
    .parse(input)
}

/// `( v, v, … )`
fn value_list(input: &str) -> IResult<&str, Vec<AttributeValue>> {
    delimited(
        pair(char('('), ws),
        separated_list0((ws, char(','), ws), value),
        pair(ws, char(')')),
    )
    .parse(input)
}

/// Parse a full attribute list, e.g. `('gid',$,'Wall A',(#5,#6))`.
///
/// Returns an error string (the scanner attaches entity context).
pub fn parse_attributes(input: &str) -> Result<Vec<AttributeValue>, String> {
    let input = input.trim_start();
    match value_list(input) {
        Ok((_, values)) => Ok(values),
        Err(e) => Err(format!("attribute list did not parse: {e:?}")),
    }
}
