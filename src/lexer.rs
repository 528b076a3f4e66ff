use crate::ease::Ease;
use crate::error::CadenzaError;
use crate::timestamp::Timestamp;
use crate::token::{Opcode, Token};
use crate::value::Value;

/// One non-blank, non-comment script line, parsed. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub args: Vec<Token>,
    /// 1-based source line.
    pub line: usize,
}

/// Lexes a whole script. Lexical failures are collected per line so one run
/// reports every problem; an error on one line never stops the next.
pub fn parse_script(src: &str) -> Result<Vec<Instruction>, Vec<CadenzaError>> {
    let mut instructions = Vec::new();
    let mut errors = Vec::new();

    for (idx, raw) in src.lines().enumerate() {
        let line_no = idx + 1;
        let line = strip_comment(raw);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_line(line, line_no) {
            Ok(inst) => instructions.push(inst),
            Err(msg) => errors.push(CadenzaError::parse(line_no, msg)),
        }
    }

    if errors.is_empty() {
        Ok(instructions)
    } else {
        Err(errors)
    }
}

/// Parses one stripped, non-empty line into an instruction. A timestamp
/// literal may precede the opcode; it becomes the first argument.
pub(crate) fn parse_line(line: &str, line_no: usize) -> Result<Instruction, String> {
    let fields = split_fields(line)?;
    let mut tokens = Vec::with_capacity(fields.len());
    for f in fields {
        tokens.push(parse_token(f)?);
    }

    let mut iter = tokens.into_iter();
    let first = iter.next().ok_or("empty instruction")?;

    match first {
        Token::Opcode(opcode) => Ok(Instruction {
            opcode,
            args: iter.collect(),
            line: line_no,
        }),
        Token::Constant(Value::Time(t)) => match iter.next() {
            Some(Token::Opcode(opcode)) => {
                let mut args = vec![Token::Constant(Value::Time(t))];
                args.extend(iter);
                Ok(Instruction {
                    opcode,
                    args,
                    line: line_no,
                })
            }
            _ => Err("expected opcode after leading timestamp".to_string()),
        },
        other => Err(format!("expected opcode, found {other:?}")),
    }
}

/// Cuts a `//` comment, ignoring slashes inside string literals.
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut in_quote = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => in_quote = !in_quote,
            b'/' if !in_quote && bytes.get(i + 1) == Some(&b'/') => return &line[..i],
            _ => {}
        }
        i += 1;
    }
    line
}

/// Splits a line into top-level fields on whitespace, keeping quoted segments
/// and `{}`/`()`/`[]` groups intact. Delimiters are tracked with an explicit
/// closer stack so nesting must balance exactly.
fn split_fields(s: &str) -> Result<Vec<&str>, String> {
    let bytes = s.as_bytes();
    let mut fields = Vec::new();
    let mut stack: Vec<u8> = Vec::new();
    let mut in_quote = false;
    let mut start: Option<usize> = None;

    for (i, &b) in bytes.iter().enumerate() {
        if in_quote {
            if b == b'"' {
                in_quote = false;
            }
            continue;
        }
        match b {
            b'"' => {
                in_quote = true;
                start.get_or_insert(i);
            }
            b'{' | b'(' | b'[' => {
                stack.push(closer_of(b));
                start.get_or_insert(i);
            }
            b'}' | b')' | b']' => {
                match stack.pop() {
                    Some(expected) if expected == b => {}
                    _ => return Err(format!("unbalanced '{}'", b as char)),
                }
                start.get_or_insert(i);
            }
            _ if b.is_ascii_whitespace() && stack.is_empty() => {
                if let Some(s0) = start.take() {
                    fields.push(&s[s0..i]);
                }
            }
            _ => {
                start.get_or_insert(i);
            }
        }
    }

    if in_quote {
        return Err("unterminated string literal".to_string());
    }
    if let Some(open) = stack.last() {
        return Err(format!("missing closing '{}'", *open as char));
    }
    if let Some(s0) = start {
        fields.push(&s[s0..]);
    }
    Ok(fields)
}

fn closer_of(open: u8) -> u8 {
    match open {
        b'{' => b'}',
        b'(' => b')',
        _ => b']',
    }
}

/// Parses one field into a token. Resolution order: string/array forms first,
/// then reserved keywords, then timestamp literal, then primitive literal,
/// then a (possibly dotted/indexed) name.
pub(crate) fn parse_token(s: &str) -> Result<Token, String> {
    debug_assert!(!s.is_empty());

    if let Some(rest) = s.strip_prefix('"') {
        let inner = rest
            .strip_suffix('"')
            .ok_or("unterminated string literal")?;
        if inner.contains('"') {
            return Err("string literal contains an embedded quote".to_string());
        }
        return Ok(Token::Constant(Value::Str(inner.to_string())));
    }

    if let Some(rest) = s.strip_prefix('{') {
        let inner = rest.strip_suffix('}').ok_or("missing closing '}'")?;
        let mut items = Vec::new();
        for f in split_fields(inner)? {
            items.push(parse_token(f)?);
        }
        return Ok(Token::Array(items));
    }

    if let Some(op) = Opcode::from_keyword(s) {
        return Ok(Token::Opcode(op));
    }
    if let Some(ease) = Ease::from_keyword(s) {
        return Ok(Token::constant_ease(ease));
    }
    if s == "true" {
        return Ok(Token::Constant(Value::Bool(true)));
    }
    if s == "false" {
        return Ok(Token::Constant(Value::Bool(false)));
    }

    if let Some(ts) = Timestamp::parse(s) {
        return Ok(Token::Constant(Value::Time(ts)));
    }

    let first = s.as_bytes()[0];
    if first.is_ascii_digit() || first == b'-' || first == b'.' {
        return parse_numeric(s).map(|v| Token::Constant(v));
    }

    parse_name_expr(s)
}

fn parse_numeric(s: &str) -> Result<Value, String> {
    if let Ok(i) = s.parse::<i32>() {
        return Ok(Value::Int(i));
    }
    if let Some((num, den)) = s.split_once('/') {
        let num: i32 = num
            .parse()
            .map_err(|_| format!("malformed rational literal '{s}'"))?;
        let den: i32 = den
            .parse()
            .map_err(|_| format!("malformed rational literal '{s}'"))?;
        if den == 0 {
            return Err(format!("rational literal '{s}' divides by zero"));
        }
        return Ok(Value::Float(num as f32 / den as f32));
    }
    s.parse::<f32>()
        .map(Value::Float)
        .map_err(|_| format!("malformed literal '{s}'"))
}

/// Parses `name`, `name(args)`, `name[expr]` and dotted chains of those.
fn parse_name_expr(s: &str) -> Result<Token, String> {
    let bytes = s.as_bytes();
    let mut i = 0usize;
    let head = scan_ident(bytes, &mut i).ok_or_else(|| format!("malformed name '{s}'"))?;

    if bytes.get(i) == Some(&b'(') {
        let close = matching_close(bytes, i)?;
        if close != bytes.len() - 1 {
            return Err(format!("unexpected text after call in '{s}'"));
        }
        let inner = &s[i + 1..close];
        let mut args = Vec::new();
        for a in split_call_args(inner)? {
            args.push(parse_token(a)?);
        }
        return Ok(Token::FuncCall { name: head, args });
    }

    let mut segs = vec![Token::Name(head)];
    while i < bytes.len() {
        match bytes[i] {
            b'.' => {
                i += 1;
                let name = scan_ident(bytes, &mut i)
                    .ok_or_else(|| format!("expected name after '.' in '{s}'"))?;
                segs.push(Token::Name(name));
            }
            b'[' => {
                let close = matching_close(bytes, i)?;
                let inner = s[i + 1..close].trim();
                if inner.is_empty() {
                    return Err(format!("empty indexer in '{s}'"));
                }
                segs.push(Token::Indexer(Box::new(parse_token(inner)?)));
                i = close + 1;
            }
            other => {
                return Err(format!("unexpected character '{}' in '{s}'", other as char));
            }
        }
    }

    if segs.len() == 1 {
        Ok(segs.pop().expect("one segment"))
    } else {
        Ok(Token::Chain(segs))
    }
}

fn scan_ident(bytes: &[u8], i: &mut usize) -> Option<String> {
    let start = *i;
    if !bytes
        .get(*i)
        .is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_')
    {
        return None;
    }
    *i += 1;
    while bytes
        .get(*i)
        .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
    {
        *i += 1;
    }
    Some(String::from_utf8_lossy(&bytes[start..*i]).into_owned())
}

/// Index of the close delimiter matching the open one at `open_at`.
fn matching_close(bytes: &[u8], open_at: usize) -> Result<usize, String> {
    let open = bytes[open_at];
    let close = closer_of(open);
    let mut depth = 0usize;
    let mut in_quote = false;
    for (i, &b) in bytes.iter().enumerate().skip(open_at) {
        if in_quote {
            if b == b'"' {
                in_quote = false;
            }
            continue;
        }
        if b == b'"' {
            in_quote = true;
        } else if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                return Ok(i);
            }
        }
    }
    Err(format!("missing closing '{}'", close as char))
}

/// Splits `a, b, c` on top-level commas.
fn split_call_args(s: &str) -> Result<Vec<&str>, String> {
    let bytes = s.as_bytes();
    let mut args = Vec::new();
    let mut stack: Vec<u8> = Vec::new();
    let mut in_quote = false;
    let mut start = 0usize;

    for (i, &b) in bytes.iter().enumerate() {
        if in_quote {
            if b == b'"' {
                in_quote = false;
            }
            continue;
        }
        match b {
            b'"' => in_quote = true,
            b'{' | b'(' | b'[' => stack.push(closer_of(b)),
            b'}' | b')' | b']' => match stack.pop() {
                Some(expected) if expected == b => {}
                _ => return Err(format!("unbalanced '{}'", b as char)),
            },
            b',' if stack.is_empty() => {
                let arg = s[start..i].trim();
                if arg.is_empty() {
                    return Err("empty call argument".to_string());
                }
                args.push(arg);
                start = i + 1;
            }
            _ => {}
        }
    }

    let last = s[start..].trim();
    if !last.is_empty() {
        args.push(last);
    } else if !args.is_empty() {
        return Err("trailing comma in call arguments".to_string());
    }
    Ok(args)
}
