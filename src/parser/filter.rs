// Filter expression parser: `column OP value`

use super::lexer::{bare_word, identifier, string_literal, ws};
use crate::filter::FilterCondition;
use anyhow::{anyhow, Result};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, char},
    combinator::{eof, map, value},
    multi::separated_list0,
    sequence::delimited,
    IResult,
};
use serde_json::Value as JsonValue;

/// Symbolic operators map onto the operator words the evaluator knows;
/// any other word is passed through unchanged.
fn operator(input: &str) -> IResult<&str, String> {
    alt((
        map(
            alt((
                value("eq", tag("==")),
                value("ne", tag("!=")),
                value("ge", tag(">=")),
                value("le", tag("<=")),
                value("gt", tag(">")),
                value("lt", tag("<")),
                value("eq", tag("=")),
            )),
            String::from,
        ),
        map(alpha1, |w: &str| w.to_lowercase()),
    ))(input)
}

/// Classify an unquoted token: booleans, null, numbers, otherwise text.
fn scalar(token: &str) -> JsonValue {
    match token {
        "true" => return JsonValue::Bool(true),
        "false" => return JsonValue::Bool(false),
        "null" => return JsonValue::Null,
        _ => {}
    }
    let numeric_start = token
        .chars()
        .next()
        .map(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'))
        .unwrap_or(false);
    if numeric_start {
        if let Ok(i) = token.parse::<i64>() {
            return JsonValue::from(i);
        }
        if let Some(n) = token
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
        {
            return JsonValue::Number(n);
        }
    }
    JsonValue::String(token.to_string())
}

fn scalar_value(input: &str) -> IResult<&str, JsonValue> {
    alt((map(string_literal, JsonValue::String), map(bare_word, scalar)))(input)
}

fn list_value(input: &str) -> IResult<&str, JsonValue> {
    map(
        delimited(
            ws(char('[')),
            separated_list0(ws(char(',')), ws(scalar_value)),
            char(']'),
        ),
        JsonValue::Array,
    )(input)
}

/// Parse a complete filter expression
/// Format: column OP value, e.g. `price >= 10`, `name contains "app"`, `region in [north, south]`
pub fn parse_filter(input: &str) -> IResult<&str, FilterCondition> {
    let (input, column) = ws(alt((string_literal, identifier)))(input)?;
    let (input, op) = ws(operator)(input)?;
    let (input, value) = ws(alt((list_value, scalar_value)))(input)?;
    let (input, _) = eof(input)?;
    Ok((input, FilterCondition::new(column, op, value)))
}

/// Parse a filter expression, reporting failures as errors naming the input.
pub fn parse_filter_expr(expr: &str) -> Result<FilterCondition> {
    parse_filter(expr)
        .map(|(_, cond)| cond)
        .map_err(|e| anyhow!("Invalid filter expression '{}': {}", expr, e))
}
