use crate::error::{ParseError, Result};
use crate::expression::Expression;
use crate::int_util;
use crate::models::{ImmediateOperand, MemoryOperand, Operand, RegisterOperand};
use matches::debug_assert_matches;
use pest::iterators::Pair;
use pest::{Parser, Span};
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "asm.pest"]
pub struct AsmParser;

pub(crate) fn new_parser_error(span: Span, message: String) -> ParseError {
    ParseError::new_from_span(pest::error::ErrorVariant::CustomError { message }, span)
}

/// Parses a linear expression such as `2*(A-1)+3*A`. Empty input is the
/// scalar zero.
pub fn parse_expression(text: &str) -> Result<Expression> {
    let input = AsmParser::parse(Rule::expression_input, text)?.next().unwrap();
    debug_assert_matches!(input.as_rule(), Rule::expression_input);

    for pair in input.into_inner() {
        if pair.as_rule() == Rule::expr {
            return eval_expr(pair);
        }
    }

    Ok(Expression::scalar(0))
}

/// Parses a single operand: a register, a `$`-prefixed immediate, or a
/// memory reference `displacement(base,index,scale)`.
pub fn parse_operand(text: &str) -> Result<Operand> {
    let input = AsmParser::parse(Rule::operand_input, text)?.next().unwrap();
    debug_assert_matches!(input.as_rule(), Rule::operand_input);

    let operand = input.into_inner().next().unwrap();
    let inner = operand.into_inner().next().unwrap();

    match inner.as_rule() {
        Rule::register => Ok(Operand::Register(convert_register(&inner)?)),
        Rule::immediate => {
            let expr = eval_expr(inner.into_inner().next().unwrap())?;
            Ok(Operand::Immediate(ImmediateOperand(expr)))
        }
        Rule::memory => convert_memory(inner),
        _ => unreachable!(),
    }
}

/// True if `text` is a well-formed bare symbol (label) name.
pub fn is_symbol(text: &str) -> bool {
    AsmParser::parse(Rule::symbol_input, text).is_ok()
}

fn eval_expr(pair: Pair<Rule>) -> Result<Expression> {
    debug_assert_matches!(pair.as_rule(), Rule::expr);

    let mut pairs = pair.into_inner();
    let mut accumulator = eval_term(pairs.next().unwrap())?;

    while let Some(op) = pairs.next() {
        let rhs = eval_term(pairs.next().unwrap())?;
        accumulator = match op.as_str() {
            "+" => accumulator + rhs,
            "-" => accumulator - rhs,
            _ => unreachable!(),
        };
    }

    Ok(accumulator)
}

fn eval_term(pair: Pair<Rule>) -> Result<Expression> {
    debug_assert_matches!(pair.as_rule(), Rule::term);

    let span = pair.as_span();
    let mut pairs = pair.into_inner();
    let mut accumulator = eval_factor(pairs.next().unwrap())?;

    for factor in pairs {
        let rhs = eval_factor(factor)?;

        // Multiplication stays linear: at most one symbolic factor per
        // product.
        accumulator = if rhs.is_scalar() {
            accumulator * rhs.constant()
        } else if accumulator.is_scalar() {
            rhs * accumulator.constant()
        } else {
            return Err(new_parser_error(
                span,
                "Non-linear error: cannot multiply two symbolic expressions.".to_owned(),
            )
            .into());
        };
    }

    Ok(accumulator)
}

fn eval_factor(pair: Pair<Rule>) -> Result<Expression> {
    debug_assert_matches!(pair.as_rule(), Rule::factor);

    let mut pairs = pair.into_inner();
    let first = pairs.next().unwrap();

    match first.as_rule() {
        Rule::expr => eval_expr(first),
        Rule::sign => {
            let inner = eval_factor(pairs.next().unwrap())?;
            Ok(match first.as_str() {
                "-" => inner * -1,
                _ => inner,
            })
        }
        Rule::integer => {
            let span = first.as_span();
            let value = first.as_str().parse::<i64>().map_err(|err| {
                new_parser_error(span, format!("Parsing integer failed: {}", err))
            })?;
            Ok(Expression::scalar(value))
        }
        Rule::symbol => Ok(Expression::symbol(first.as_str())),
        _ => unreachable!(),
    }
}

fn convert_register(pair: &Pair<Rule>) -> Result<RegisterOperand> {
    let name = pair.as_str().trim_start_matches('%').to_uppercase();
    name.parse()
        .map_err(|err| new_parser_error(pair.as_span(), format!("{}", err)).into())
}

fn convert_memory(pair: Pair<Rule>) -> Result<Operand> {
    debug_assert_matches!(pair.as_rule(), Rule::memory);

    let mut displacement = Expression::scalar(0);
    let mut base = None;
    let mut index = None;
    let mut scale = 1;

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::expr => displacement = eval_expr(part)?,
            Rule::mem_ref => {
                for field in part.into_inner() {
                    match field.as_rule() {
                        Rule::base => {
                            base = Some(convert_register(&field.into_inner().next().unwrap())?);
                        }
                        Rule::index => {
                            index = Some(convert_register(&field.into_inner().next().unwrap())?);
                        }
                        Rule::scale => scale = convert_scale(&field)?,
                        _ => unreachable!(),
                    }
                }
            }
            _ => unreachable!(),
        }
    }

    Ok(Operand::Memory(MemoryOperand::new(
        base,
        index,
        scale,
        displacement,
    )))
}

fn convert_scale(pair: &Pair<Rule>) -> Result<u32> {
    let text = pair.as_str();
    let value = int_util::parse_uint::<u32>(text)
        .map_err(|err| new_parser_error(pair.as_span(), format!("Invalid scale factor: {}", err)))?;

    match value {
        1 | 2 | 4 | 8 => Ok(value),
        _ => Err(new_parser_error(pair.as_span(), format!("Invalid scale factor: {}", text)).into()),
    }
}
