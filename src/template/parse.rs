//! Lexer and parser for `[[ ... ]]` templates

use super::functions::is_builtin;
use crate::error::{Error, Result};

pub const LEFT_DELIM: &str = "[[";
pub const RIGHT_DELIM: &str = "]]";

// ============================================================================
// AST
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Action(Pipeline),
    If {
        cond: Pipeline,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

/// Commands separated by `|`; each result is passed as the last argument of the next
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub cmds: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub args: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// `.`
    Dot,
    /// `.a.b.c` rooted at the input document
    Field(Vec<String>),
    /// A function name
    Func(String),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
    Paren(Box<Pipeline>),
    /// `(expr).a.b` or `now.Unix`
    Chain(Box<Operand>, Vec<String>),
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Field(String),
    Dot,
    Ident(String),
    Str(String),
    Number(String),
    Pipe,
    LParen,
    RParen,
}

#[derive(Debug, Clone)]
struct Lexed {
    tok: Tok,
    /// whitespace preceded the token
    spaced: bool,
}

fn lex_action(src: &str) -> Result<Vec<Lexed>> {
    let chars: Vec<char> = src.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    let mut spaced = true;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            spaced = true;
            i += 1;
            continue;
        }
        let tok = match c {
            '|' => {
                i += 1;
                Tok::Pipe
            }
            '(' => {
                i += 1;
                Tok::LParen
            }
            ')' => {
                i += 1;
                Tok::RParen
            }
            '"' => {
                let (s, next) = lex_quoted(&chars, i)?;
                i = next;
                Tok::Str(s)
            }
            '`' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|c| *c == '`')
                    .ok_or_else(|| Error::template("unterminated raw quoted string"))?;
                i = start + end + 1;
                Tok::Str(chars[start..start + end].iter().collect())
            }
            '.' => {
                let start = i + 1;
                let len = chars[start..]
                    .iter()
                    .take_while(|c| c.is_alphanumeric() || **c == '_')
                    .count();
                if len == 0 {
                    if chars.get(start).is_some_and(char::is_ascii_digit) {
                        let (num, next) = lex_number(&chars, i);
                        i = next;
                        Tok::Number(num)
                    } else {
                        i = start;
                        Tok::Dot
                    }
                } else {
                    i = start + len;
                    Tok::Field(chars[start..start + len].iter().collect())
                }
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' => {
                let (num, next) = lex_number(&chars, i);
                if num.len() <= 1 && !c.is_ascii_digit() {
                    return Err(Error::template(format!("unexpected {c:?} in action")));
                }
                i = next;
                Tok::Number(num)
            }
            c if c.is_alphabetic() || c == '_' => {
                let len = chars[i..]
                    .iter()
                    .take_while(|c| c.is_alphanumeric() || **c == '_')
                    .count();
                let ident: String = chars[i..i + len].iter().collect();
                i += len;
                Tok::Ident(ident)
            }
            other => {
                return Err(Error::template(format!(
                    "unexpected {other:?} in action"
                )))
            }
        };
        out.push(Lexed { tok, spaced });
        spaced = false;
    }
    Ok(out)
}

fn lex_quoted(chars: &[char], start: usize) -> Result<(String, usize)> {
    let mut s = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '"' => return Ok((s, i + 1)),
            '\\' => {
                let esc = chars
                    .get(i + 1)
                    .ok_or_else(|| Error::template("unterminated quoted string"))?;
                match esc {
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    'r' => s.push('\r'),
                    '\\' => s.push('\\'),
                    '"' => s.push('"'),
                    other => {
                        s.push('\\');
                        s.push(*other);
                    }
                }
                i += 2;
            }
            c => {
                s.push(c);
                i += 1;
            }
        }
    }
    Err(Error::template("unterminated quoted string"))
}

fn lex_number(chars: &[char], start: usize) -> (String, usize) {
    let mut i = start;
    if matches!(chars.get(i), Some('-' | '+')) {
        i += 1;
    }
    while i < chars.len()
        && (chars[i].is_ascii_alphanumeric() || chars[i] == '.' || chars[i] == '_')
    {
        i += 1;
    }
    (chars[start..i].iter().collect(), i)
}

// ============================================================================
// Parser
// ============================================================================

/// Split the source into text and action segments
fn segments(src: &str) -> Result<Vec<Segment>> {
    let mut out = Vec::new();
    let mut rest = src;
    while let Some(open) = rest.find(LEFT_DELIM) {
        let mut text = &rest[..open];
        let mut inner = &rest[open + LEFT_DELIM.len()..];
        let close = inner
            .find(RIGHT_DELIM)
            .ok_or_else(|| Error::template("unclosed action"))?;
        let after = &inner[close + RIGHT_DELIM.len()..];
        inner = &inner[..close];

        // `[[-` and `-]]` trim adjacent whitespace
        if let Some(stripped) = inner.strip_prefix("- ") {
            text = text.trim_end();
            inner = stripped;
        }
        let mut trim_after = false;
        if let Some(stripped) = inner.strip_suffix(" -") {
            trim_after = true;
            inner = stripped;
        }
        if !text.is_empty() {
            out.push(Segment::Text(text.to_string()));
        }
        out.push(Segment::Action(inner.trim().to_string()));
        rest = if trim_after { after.trim_start() } else { after };
    }
    if !rest.is_empty() {
        out.push(Segment::Text(rest.to_string()));
    }
    Ok(out)
}

enum Segment {
    Text(String),
    Action(String),
}

/// Parse template source into nodes, checking every function exists
pub fn parse(src: &str) -> Result<Vec<Node>> {
    let segs = segments(src)?;
    let mut pos = 0;
    let (nodes, end) = parse_list(&segs, &mut pos)?;
    match end {
        Terminator::Eof => Ok(nodes),
        Terminator::End => Err(Error::template("unexpected [[end]]")),
        Terminator::Else(_) => Err(Error::template("unexpected [[else]]")),
    }
}

enum Terminator {
    Eof,
    End,
    Else(Option<Pipeline>),
}

fn parse_list(segs: &[Segment], pos: &mut usize) -> Result<(Vec<Node>, Terminator)> {
    let mut nodes = Vec::new();
    while *pos < segs.len() {
        let seg = &segs[*pos];
        *pos += 1;
        match seg {
            Segment::Text(t) => nodes.push(Node::Text(t.clone())),
            Segment::Action(a) => {
                let toks = lex_action(a)?;
                match toks.first().map(|l| &l.tok) {
                    Some(Tok::Ident(kw)) if kw == "end" => {
                        if toks.len() != 1 {
                            return Err(Error::template("unexpected arguments to end"));
                        }
                        return Ok((nodes, Terminator::End));
                    }
                    Some(Tok::Ident(kw)) if kw == "else" => {
                        let cond = match toks.get(1).map(|l| &l.tok) {
                            Some(Tok::Ident(kw)) if kw == "if" => {
                                Some(parse_pipeline_tokens(&toks[2..])?)
                            }
                            None => None,
                            Some(_) => return Err(Error::template("unexpected tokens after else")),
                        };
                        return Ok((nodes, Terminator::Else(cond)));
                    }
                    Some(Tok::Ident(kw)) if kw == "if" => {
                        let cond = parse_pipeline_tokens(&toks[1..])?;
                        nodes.push(parse_if(cond, segs, pos)?);
                    }
                    None => {}
                    _ => nodes.push(Node::Action(parse_pipeline_tokens(&toks)?)),
                }
            }
        }
    }
    Ok((nodes, Terminator::Eof))
}

fn parse_if(cond: Pipeline, segs: &[Segment], pos: &mut usize) -> Result<Node> {
    let (then, term) = parse_list(segs, pos)?;
    let otherwise = match term {
        Terminator::End => Vec::new(),
        Terminator::Else(None) => {
            let (otherwise, term) = parse_list(segs, pos)?;
            if !matches!(term, Terminator::End) {
                return Err(Error::template("missing [[end]] for if"));
            }
            otherwise
        }
        // `else if` shares the enclosing `end`
        Terminator::Else(Some(cond)) => vec![parse_if(cond, segs, pos)?],
        Terminator::Eof => return Err(Error::template("missing [[end]] for if")),
    };
    Ok(Node::If {
        cond,
        then,
        otherwise,
    })
}

fn parse_pipeline_tokens(toks: &[Lexed]) -> Result<Pipeline> {
    let mut p = TokenParser { toks, pos: 0 };
    let pipe = p.pipeline()?;
    if p.pos != toks.len() {
        return Err(Error::template(format!(
            "unexpected {:?} in action",
            toks[p.pos].tok
        )));
    }
    Ok(pipe)
}

struct TokenParser<'a> {
    toks: &'a [Lexed],
    pos: usize,
}

impl TokenParser<'_> {
    fn peek(&self) -> Option<&Lexed> {
        self.toks.get(self.pos)
    }

    fn pipeline(&mut self) -> Result<Pipeline> {
        let mut cmds = vec![self.command()?];
        while matches!(self.peek().map(|l| &l.tok), Some(Tok::Pipe)) {
            self.pos += 1;
            let cmd = self.command()?;
            match cmd.args.first() {
                Some(Operand::Func(_) | Operand::Field(_) | Operand::Chain(..)) => cmds.push(cmd),
                _ => return Err(Error::template("non executable command in pipeline stage")),
            }
        }
        Ok(Pipeline { cmds })
    }

    fn command(&mut self) -> Result<Command> {
        let mut args = Vec::new();
        while let Some(lexed) = self.peek() {
            if matches!(lexed.tok, Tok::Pipe | Tok::RParen) {
                break;
            }
            args.push(self.operand()?);
        }
        if args.is_empty() {
            return Err(Error::template("missing value for command"));
        }
        Ok(Command { args })
    }

    fn operand(&mut self) -> Result<Operand> {
        let lexed = self.toks[self.pos].clone();
        self.pos += 1;
        let term = match lexed.tok {
            Tok::Dot => Operand::Dot,
            Tok::Field(name) => {
                let mut path = vec![name];
                path.extend(self.chain());
                return Ok(Operand::Field(path));
            }
            Tok::Ident(name) => match name.as_str() {
                "true" => Operand::Bool(true),
                "false" => Operand::Bool(false),
                "nil" => Operand::Nil,
                _ if is_builtin(&name) => Operand::Func(name),
                _ => {
                    return Err(Error::template(format!(
                        "function {name:?} not defined"
                    )))
                }
            },
            Tok::Str(s) => Operand::Str(s),
            Tok::Number(n) => parse_number(&n)?,
            Tok::LParen => {
                let inner = self.pipeline()?;
                match self.peek().map(|l| &l.tok) {
                    Some(Tok::RParen) => self.pos += 1,
                    _ => return Err(Error::template("unclosed left paren")),
                }
                Operand::Paren(Box::new(inner))
            }
            Tok::Pipe | Tok::RParen => {
                return Err(Error::template(format!("unexpected {:?}", lexed.tok)))
            }
        };
        let chain = self.chain();
        if chain.is_empty() {
            Ok(term)
        } else {
            Ok(Operand::Chain(Box::new(term), chain))
        }
    }

    /// Field names written directly after the previous token with no space
    fn chain(&mut self) -> Vec<String> {
        let mut names = Vec::new();
        while let Some(Lexed {
            tok: Tok::Field(name),
            spaced: false,
        }) = self.peek()
        {
            names.push(name.clone());
            self.pos += 1;
        }
        names
    }
}

fn parse_number(n: &str) -> Result<Operand> {
    let cleaned = n.replace('_', "");
    if let Ok(i) = cleaned.parse::<i64>() {
        return Ok(Operand::Int(i));
    }
    if let Some(hex) = cleaned.strip_prefix("0x") {
        if let Ok(i) = i64::from_str_radix(hex, 16) {
            return Ok(Operand::Int(i));
        }
    }
    cleaned
        .parse::<f64>()
        .map(Operand::Float)
        .map_err(|_| Error::template(format!("bad number syntax: {n:?}")))
}
