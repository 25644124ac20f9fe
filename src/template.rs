//! Placeholder rendering for task definitions.
//!
//! Placeholders are delimited `<%=` ... `=>` because double curly braces
//! collide with JSON far too often. The inner expression is a single
//! accessor call with string-literal arguments:
//!
//! ```text
//! {"server": "<%= a.k8s_service("influxsrv") =>"}
//! ```

use crate::context::Accessor;
use anyhow::{anyhow, Context, Result};
use regex::Regex;

/// Substitute every placeholder in `input` using the accessor, returning the
/// fully resolved text. Text without placeholders passes through unchanged.
pub fn render(input: &str, accessor: &Accessor<'_>) -> Result<String> {
    let placeholder = Regex::new(r"<%=\s*(?s)(.*?)\s*=>").expect("regex for placeholders");
    let mut output = String::with_capacity(input.len());
    let mut cursor = 0;
    for capture in placeholder.captures_iter(input) {
        let span = capture.get(0).expect("capture 0 always present");
        let expr = capture.get(1).map(|m| m.as_str()).unwrap_or_default();
        output.push_str(&input[cursor..span.start()]);
        let (method, args) = parse_call(expr)?;
        let value = accessor
            .call(&method, &args)
            .with_context(|| format!("resolve placeholder {:?}", span.as_str()))?;
        output.push_str(&value);
        cursor = span.end();
    }
    output.push_str(&input[cursor..]);
    Ok(output)
}

/// Parse an accessor-call expression `a.method("arg", ...)` into its method
/// name and string arguments.
fn parse_call(expr: &str) -> Result<(String, Vec<String>)> {
    let call = Regex::new(r"(?s)^a\.([A-Za-z_][A-Za-z0-9_]*)\(\s*(.*?)\s*\)$")
        .expect("regex for accessor calls");
    let capture = call
        .captures(expr)
        .ok_or_else(|| anyhow!("malformed placeholder expression {expr:?}"))?;
    let method = capture[1].to_string();
    let args = parse_args(capture.get(2).map(|m| m.as_str()).unwrap_or_default())
        .with_context(|| format!("malformed arguments in {expr:?}"))?;
    Ok((method, args))
}

/// Parse a comma-separated list of quoted string literals.
fn parse_args(raw: &str) -> Result<Vec<String>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    let literal = Regex::new(r#"^\s*(?:"([^"]*)"|'([^']*)')\s*(,|$)"#)
        .expect("regex for string literals");
    let mut args = Vec::new();
    let mut rest = raw;
    loop {
        let capture = literal
            .captures(rest)
            .ok_or_else(|| anyhow!("expected a quoted string at {rest:?}"))?;
        let value = capture
            .get(1)
            .or_else(|| capture.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        args.push(value.to_string());
        let matched = capture.get(0).expect("capture 0 always present");
        let had_comma = &capture[3] == ",";
        rest = &rest[matched.end()..];
        if !had_comma {
            if !rest.trim().is_empty() {
                return Err(anyhow!("trailing content after arguments: {rest:?}"));
            }
            return Ok(args);
        }
        if rest.trim().is_empty() {
            return Err(anyhow!("trailing comma in argument list"));
        }
    }
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
