//! A `nom`-based parser for the Liquid template grammar.
//!
//! The typed AST is built directly inside the combinators. Block tags
//! (`if`, `for`, `case`, `capture`) parse their bodies recursively and
//! group their branches as they go: a body is a plain node list that stops
//! at the first tag the enclosing block owns (`elsif`, `else`, `when`,
//! `end*`), which the block parser then consumes itself.

use crate::ast::*;
use crate::error::BrineError;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag, take_while},
    character::complete::{
        alpha1, anychar, char, digit1, i64 as nom_i64, multispace0, one_of, u64 as nom_u64,
    },
    combinator::{map, not, opt, recognize, verify},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded},
};
use serde_json::Value;

// --- Main Public Parser ---

/// Parses template source into a [`Template`], or fails with a syntax error
/// carrying the character offset of the first unparseable construct.
pub fn parse_template(source: &str) -> Result<Template, BrineError> {
    match template(source) {
        Ok(("", tpl)) => Ok(tpl),
        Ok((remainder, _)) => Err(syntax_error(source, remainder)),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(syntax_error(source, e.input)),
        Err(nom::Err::Incomplete(_)) => Err(BrineError::Syntax {
            offset: source.len(),
            message: "unexpected end of template".to_string(),
        }),
    }
}

fn syntax_error(source: &str, remainder: &str) -> BrineError {
    let snippet: String = remainder.chars().take(24).collect();
    BrineError::Syntax {
        offset: source.len() - remainder.len(),
        message: format!("unexpected input near '{snippet}'"),
    }
}

// --- Combinators & Helpers ---

/// A combinator that takes a parser `inner` and produces a parser that
/// consumes surrounding whitespace.
fn ws<'a, F, O, E>(inner: F) -> impl Parser<&'a str, Output = O, Error = E>
where
    F: Parser<&'a str, Output = O, Error = E>,
    E: nom::error::ParseError<&'a str>,
{
    delimited(multispace0, inner, multispace0)
}

/// A keyword that must not run into a following identifier character, so
/// that `or` never matches the head of a variable named `orange`.
fn word<'a>(
    keyword: &'static str,
) -> impl Parser<&'a str, Output = &'a str, Error = nom::error::Error<&'a str>> {
    pair(
        tag(keyword),
        not(verify(anychar, |c: &char| c.is_alphanumeric() || *c == '_')),
    )
    .map(|(w, _)| w)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))
    .parse(input)
}

fn parse_failure(input: &str) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))
}

// --- Template Structure ---

fn template(input: &str) -> IResult<&str, Template> {
    map(many0(node), |nodes| Template { nodes }).parse(input)
}

fn node(input: &str) -> IResult<&str, Node> {
    alt((output, tag_node, plain_text)).parse(input)
}

/// A run of characters up to the next `{{` or `{%`.
fn plain_text(input: &str) -> IResult<&str, Node> {
    let end = match (input.find("{{"), input.find("{%")) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => input.len(),
    };
    if end == 0 {
        return Err(parse_failure(input));
    }
    Ok((&input[end..], Node::Text(input[..end].to_string())))
}

/// `{{ expr | filter | ... }}`.
fn output(input: &str) -> IResult<&str, Node> {
    map(
        delimited(tag("{{"), filtered_expression, tag("}}")),
        Node::Output,
    )
    .parse(input)
}

/// `{% name ... %}`, dispatching on the tag name. Block terminators and
/// unknown names fail here, which is what ends an enclosing node list.
fn tag_node(input: &str) -> IResult<&str, Node> {
    let (i, _) = tag("{%").parse(input)?;
    let (i, _) = multispace0(i)?;
    let (i, name) = identifier(i)?;
    match name {
        "assign" => assign_tag(i),
        "capture" => capture_block(i),
        "increment" => map(var_payload, |var| Node::Increment { var }).parse(i),
        "decrement" => map(var_payload, |var| Node::Decrement { var }).parse(i),
        "if" => map(|j| conditional_block(j, "endif"), Node::If).parse(i),
        "unless" => map(|j| conditional_block(j, "endunless"), Node::Unless).parse(i),
        "case" => case_block(i),
        "for" => for_block(i),
        "break" => map(tag_close, |_| Node::Break).parse(i),
        "continue" => map(tag_close, |_| Node::Continue).parse(i),
        "raw" => raw_block(i),
        _ => Err(parse_failure(input)),
    }
}

/// The `%}` that closes a tag.
fn tag_close(input: &str) -> IResult<&str, ()> {
    let (i, _) = multispace0(input)?;
    let (i, _) = tag("%}").parse(i)?;
    Ok((i, ()))
}

/// A complete `{% name %}` tag with no payload.
fn bare_tag<'a>(name: &'static str, input: &'a str) -> IResult<&'a str, ()> {
    let (i, _) = tag("{%").parse(input)?;
    let (i, _) = multispace0(i)?;
    let (i, _) = word(name).parse(i)?;
    tag_close(i)
}

/// The single-identifier payload of `increment`/`decrement`.
fn var_payload(input: &str) -> IResult<&str, String> {
    let (i, name) = ws(identifier).parse(input)?;
    let (i, _) = tag("%}").parse(i)?;
    Ok((i, name.to_string()))
}

// --- Tags ---

fn assign_tag(input: &str) -> IResult<&str, Node> {
    let (i, var) = ws(identifier).parse(input)?;
    let (i, _) = char('=').parse(i)?;
    let (i, value) = filtered_expression(i)?;
    let (i, _) = tag("%}").parse(i)?;
    Ok((
        i,
        Node::Assign {
            var: var.to_string(),
            value,
        },
    ))
}

fn capture_block(input: &str) -> IResult<&str, Node> {
    let (i, var) = ws(identifier).parse(input)?;
    let (i, _) = tag("%}").parse(i)?;
    let (i, body) = template(i)?;
    let (i, _) = bare_tag("endcapture", i)?;
    Ok((
        i,
        Node::Capture {
            var: var.to_string(),
            body,
        },
    ))
}

fn conditional_block<'a>(input: &'a str, end_name: &'static str) -> IResult<&'a str, Conditional> {
    let (i, condition) = predicate(input)?;
    let (i, _) = tag("%}").parse(i)?;
    let (i, body) = template(i)?;
    let mut branches = vec![Branch { condition, body }];
    let (i, more) = many0(elsif_branch).parse(i)?;
    branches.extend(more);
    let (i, otherwise) = opt(else_clause).parse(i)?;
    let (i, _) = bare_tag(end_name, i)?;
    Ok((
        i,
        Conditional {
            branches,
            otherwise,
        },
    ))
}

fn elsif_branch(input: &str) -> IResult<&str, Branch> {
    let (i, _) = tag("{%").parse(input)?;
    let (i, _) = multispace0(i)?;
    let (i, _) = word("elsif").parse(i)?;
    let (i, condition) = predicate(i)?;
    let (i, _) = tag("%}").parse(i)?;
    let (i, body) = template(i)?;
    Ok((i, Branch { condition, body }))
}

fn else_clause(input: &str) -> IResult<&str, Template> {
    let (i, _) = bare_tag("else", input)?;
    template(i)
}

fn case_block(input: &str) -> IResult<&str, Node> {
    let (i, subject) = expression(input)?;
    let (i, _) = tag("%}").parse(i)?;
    // Only whitespace may sit between `case` and its first `when`.
    let (i, _) = multispace0(i)?;
    let (i, whens) = many0(when_clause).parse(i)?;
    let (i, otherwise) = opt(else_clause).parse(i)?;
    let (i, _) = bare_tag("endcase", i)?;
    Ok((
        i,
        Node::Case {
            subject,
            whens,
            otherwise,
        },
    ))
}

fn when_clause(input: &str) -> IResult<&str, When> {
    let (i, _) = tag("{%").parse(input)?;
    let (i, _) = multispace0(i)?;
    let (i, _) = word("when").parse(i)?;
    let (i, value) = expression(i)?;
    let (i, _) = tag("%}").parse(i)?;
    let (i, body) = template(i)?;
    Ok((i, When { value, body }))
}

fn for_block(input: &str) -> IResult<&str, Node> {
    let (i, var) = ws(identifier).parse(input)?;
    let (i, _) = word("in").parse(i)?;
    let (i, collection) = expression(i)?;
    let (i, opts) = for_options(i)?;
    let (i, _) = tag("%}").parse(i)?;
    let (i, body) = template(i)?;
    let (i, otherwise) = opt(else_clause).parse(i)?;
    let (i, _) = bare_tag("endfor", i)?;
    Ok((
        i,
        Node::For {
            var: var.to_string(),
            collection,
            opts,
            body,
            otherwise,
        },
    ))
}

/// `limit: n`, `offset: n` and `reversed` in any order, folded into one
/// [`ForOptions`] record.
fn for_options(input: &str) -> IResult<&str, ForOptions> {
    enum ForOpt {
        Limit(u64),
        Offset(u64),
        Reversed,
    }
    let (i, parsed) = many0(ws(alt((
        map(
            preceded(pair(word("limit"), ws(char(':'))), nom_u64),
            ForOpt::Limit,
        ),
        map(
            preceded(pair(word("offset"), ws(char(':'))), nom_u64),
            ForOpt::Offset,
        ),
        map(word("reversed"), |_| ForOpt::Reversed),
    ))))
    .parse(input)?;

    let mut opts = ForOptions::default();
    for o in parsed {
        match o {
            ForOpt::Limit(n) => opts.limit = Some(n),
            ForOpt::Offset(n) => opts.offset = Some(n),
            ForOpt::Reversed => opts.reversed = true,
        }
    }
    Ok((i, opts))
}

/// `{% raw %}` emits its contents verbatim, with no delimiter
/// interpretation, until the matching `{% endraw %}`.
fn raw_block(input: &str) -> IResult<&str, Node> {
    let (i, _) = tag_close(input)?;
    let mut content = String::new();
    let mut rest = i;
    loop {
        let Some(pos) = rest.find("{%") else {
            return Err(parse_failure(rest));
        };
        if let Ok((after, _)) = bare_tag("endraw", &rest[pos..]) {
            content.push_str(&rest[..pos]);
            return Ok((after, Node::Text(content)));
        }
        content.push_str(&rest[..pos + 2]);
        rest = &rest[pos + 2..];
    }
}

// --- Expressions ---

fn expression(input: &str) -> IResult<&str, Expression> {
    ws(alt((
        map(literal, Expression::Literal),
        map(range, Expression::Range),
        map(lookup, Expression::Lookup),
    )))
    .parse(input)
}

fn filtered_expression(input: &str) -> IResult<&str, FilteredExpression> {
    let (i, expr) = expression(input)?;
    let (i, filters) = many0(preceded(char('|'), filter_call)).parse(i)?;
    Ok((i, FilteredExpression { expr, filters }))
}

/// `name` or `name: arg, arg`. Arguments are full expressions, so literals,
/// lookups and ranges all work.
fn filter_call(input: &str) -> IResult<&str, FilterCall> {
    let (i, name) = ws(identifier).parse(input)?;
    let (i, args) = opt(preceded(char(':'), separated_list1(char(','), expression))).parse(i)?;
    Ok((
        i,
        FilterCall {
            name: name.to_string(),
            args: args.unwrap_or_default(),
        },
    ))
}

// --- Literal Parsers ---

fn literal(input: &str) -> IResult<&str, Value> {
    alt((
        map(alt((word("nil"), word("null"))), |_| Value::Null),
        map(word("true"), |_| Value::Bool(true)),
        map(word("false"), |_| Value::Bool(false)),
        number,
        map(quoted_string, Value::String),
    ))
    .parse(input)
}

/// Integer and float literals stay distinct: a float requires a decimal
/// point with digits on both sides.
fn number(input: &str) -> IResult<&str, Value> {
    alt((
        map(
            recognize((opt(one_of("+-")), digit1, char('.'), digit1)),
            |s: &str| Value::from(s.parse::<f64>().unwrap_or(0.0)),
        ),
        map(nom_i64, Value::from),
    ))
    .parse(input)
}

/// A single- or double-quoted string with backslash escapes.
fn quoted_string(input: &str) -> IResult<&str, String> {
    alt((
        delimited(
            char('"'),
            map(
                opt(escaped_transform(is_not("\\\""), '\\', escape_seq)),
                Option::unwrap_or_default,
            ),
            char('"'),
        ),
        delimited(
            char('\''),
            map(
                opt(escaped_transform(is_not("\\'"), '\\', escape_seq)),
                Option::unwrap_or_default,
            ),
            char('\''),
        ),
    ))
    .parse(input)
}

fn escape_seq(input: &str) -> IResult<&str, &str> {
    alt((
        map(char('"'), |_| "\""),
        map(char('\''), |_| "'"),
        map(char('\\'), |_| "\\"),
        map(char('n'), |_| "\n"),
        map(char('t'), |_| "\t"),
    ))
    .parse(input)
}

// --- Ranges & Lookups ---

fn range(input: &str) -> IResult<&str, Range> {
    let (i, _) = char('(').parse(input)?;
    let (i, start) = range_endpoint(i)?;
    let (i, _) = tag("..").parse(i)?;
    let (i, end) = range_endpoint(i)?;
    let (i, _) = char(')').parse(i)?;
    Ok((i, Range { start, end }))
}

fn range_endpoint(input: &str) -> IResult<&str, RangeEndpoint> {
    ws(alt((
        map(nom_i64, RangeEndpoint::Literal),
        map(lookup, RangeEndpoint::Lookup),
    )))
    .parse(input)
}

fn lookup(input: &str) -> IResult<&str, Lookup> {
    let (i, name) = identifier(input)?;
    let (i, path) = many0(accessor).parse(i)?;
    Ok((
        i,
        Lookup {
            name: name.to_string(),
            path,
        },
    ))
}

fn accessor(input: &str) -> IResult<&str, Accessor> {
    alt((
        map(preceded(char('.'), identifier), |key| {
            Accessor::Key(key.to_string())
        }),
        delimited(char('['), ws(index_key), char(']')),
    ))
    .parse(input)
}

fn index_key(input: &str) -> IResult<&str, Accessor> {
    alt((
        map(nom_i64, Accessor::Index),
        map(quoted_string, Accessor::Key),
        map(lookup, |l| Accessor::Dynamic(Box::new(l))),
    ))
    .parse(input)
}

// --- Predicates ---

/// `and` binds tighter than `or`; both are left-associative.
pub(crate) fn predicate(input: &str) -> IResult<&str, Predicate> {
    or_predicate(input)
}

fn or_predicate(input: &str) -> IResult<&str, Predicate> {
    let (i, first) = and_predicate(input)?;
    let (i, rest) = many0(preceded(ws(word("or")), and_predicate)).parse(i)?;
    let folded = rest
        .into_iter()
        .fold(first, |acc, p| Predicate::Or(Box::new(acc), Box::new(p)));
    Ok((i, folded))
}

fn and_predicate(input: &str) -> IResult<&str, Predicate> {
    let (i, first) = comparison(input)?;
    let (i, rest) = many0(preceded(ws(word("and")), comparison)).parse(i)?;
    let folded = rest
        .into_iter()
        .fold(first, |acc, p| Predicate::And(Box::new(acc), Box::new(p)));
    Ok((i, folded))
}

fn comparison(input: &str) -> IResult<&str, Predicate> {
    let (i, lhs) = expression(input)?;
    let (i, tail) = opt(pair(ws(compare_op), expression)).parse(i)?;
    let pred = match tail {
        Some((op, rhs)) => Predicate::Assertion { op, lhs, rhs },
        None => Predicate::Truthy(lhs),
    };
    Ok((i, pred))
}

fn compare_op(input: &str) -> IResult<&str, CompareOp> {
    alt((
        map(tag("=="), |_| CompareOp::Eq),
        map(tag("!="), |_| CompareOp::Ne),
        map(tag("<="), |_| CompareOp::Le),
        map(tag(">="), |_| CompareOp::Ge),
        map(tag("<"), |_| CompareOp::Lt),
        map(tag(">"), |_| CompareOp::Gt),
        map(word("contains"), |_| CompareOp::Contains),
    ))
    .parse(input)
}
