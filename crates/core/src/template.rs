use crate::context::{FileContext, MetadataError};
use crate::eval::Renderer;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template syntax error at byte {offset}: {message}")]
    Syntax { offset: usize, message: String },
    #[error("template execution failed: {0}")]
    Execution(String),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

impl TemplateError {
    fn syntax(offset: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            offset,
            message: message.into(),
        }
    }
}

/// Built-in functions callable as the first word of a command.
pub(crate) const FUNCTIONS: &[&str] = &[
    "printf", "print", "lower", "upper", "replace", "eq", "ne", "not",
];

/// A parsed path template, checked once before any file is rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    nodes: Vec<Node>,
}

impl Template {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn nodes(&self) -> &[Node] {
        &self.nodes
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Action(Pipeline),
    If {
        cond: Pipeline,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    With {
        value: Pipeline,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Pipeline {
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Command {
    pub head: Term,
    pub args: Vec<Term>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Term {
    Dot,
    /// `.A.B` evaluated against the current dot.
    Field(Vec<String>),
    Func(String),
    Str(String),
    Int(i64),
    Bool(bool),
    /// `(pipeline).A.B`
    Sub(Box<Pipeline>, Vec<String>),
}

pub fn validate_template(input: &str) -> Result<(), TemplateError> {
    compile_template(input).map(|_| ())
}

pub fn compile_template(input: &str) -> Result<Template, TemplateError> {
    let tokens = lex(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        len: input.len(),
    };
    let (nodes, end) = parser.parse_list()?;
    if let Some(keyword) = end {
        return Err(TemplateError::syntax(
            parser.offset(),
            format!("unexpected {{{{{keyword}}}}}"),
        ));
    }

    Ok(Template {
        source: input.to_string(),
        nodes,
    })
}

/// Renders the destination for one file. An empty result means "leave this file alone".
pub fn render_template(template: &Template, ctx: &FileContext) -> Result<String, TemplateError> {
    Renderer::new(ctx).render(template)
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Text(String),
    Open,
    Close,
    Dot,
    Field(String),
    Ident(String),
    Str(String),
    Int(i64),
    Pipe,
    LParen,
    RParen,
}

#[derive(Debug, Clone)]
struct Spanned {
    tok: Tok,
    start: usize,
    end: usize,
}

fn lex(src: &str) -> Result<Vec<Spanned>, TemplateError> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut pos = 0usize;
    let mut trim_next = false;

    while pos < src.len() {
        let Some(rel) = src[pos..].find("{{") else {
            push_text(&mut out, &src[pos..], pos, trim_next, false);
            break;
        };
        let open = pos + rel;
        let mut cursor = open + 2;
        let trim_prev = bytes.get(cursor) == Some(&b'-')
            && bytes.get(cursor + 1).is_some_and(u8::is_ascii_whitespace);
        if trim_prev {
            cursor += 1;
        }
        push_text(&mut out, &src[pos..open], pos, trim_next, trim_prev);
        trim_next = false;

        let after_ws = skip_ws(bytes, cursor);
        if src[after_ws..].starts_with("/*") {
            let Some(close_rel) = src[after_ws + 2..].find("*/") else {
                return Err(TemplateError::syntax(open, "unclosed comment"));
            };
            cursor = skip_ws(bytes, after_ws + 2 + close_rel + 2);
            if src[cursor..].starts_with("-}}") {
                trim_next = true;
                cursor += 3;
            } else if src[cursor..].starts_with("}}") {
                cursor += 2;
            } else {
                return Err(TemplateError::syntax(cursor, "comment ends before closing delimiter"));
            }
            pos = cursor;
            continue;
        }

        out.push(Spanned {
            tok: Tok::Open,
            start: open,
            end: cursor,
        });
        let (next, trim) = lex_action(src, cursor, &mut out)?;
        pos = next;
        trim_next = trim;
    }

    Ok(out)
}

fn push_text(out: &mut Vec<Spanned>, text: &str, start: usize, trim_left: bool, trim_right: bool) {
    let mut text = text;
    if trim_left {
        text = text.trim_start();
    }
    if trim_right {
        text = text.trim_end();
    }
    if !text.is_empty() {
        out.push(Spanned {
            tok: Tok::Text(text.to_string()),
            start,
            end: start + text.len(),
        });
    }
}

fn skip_ws(bytes: &[u8], mut pos: usize) -> usize {
    while bytes.get(pos).is_some_and(u8::is_ascii_whitespace) {
        pos += 1;
    }
    pos
}

/// Lexes one action body up to and including its closing delimiter. Returns the position after
/// the delimiter and whether it asked to trim the following text.
fn lex_action(
    src: &str,
    mut pos: usize,
    out: &mut Vec<Spanned>,
) -> Result<(usize, bool), TemplateError> {
    let bytes = src.as_bytes();

    loop {
        let ws_start = pos;
        pos = skip_ws(bytes, pos);
        let rest = &src[pos..];
        if rest.is_empty() {
            return Err(TemplateError::syntax(pos, "unclosed action"));
        }

        if pos > ws_start && rest.starts_with("-}}") {
            out.push(Spanned {
                tok: Tok::Close,
                start: pos,
                end: pos + 3,
            });
            return Ok((pos + 3, true));
        }
        if rest.starts_with("}}") {
            out.push(Spanned {
                tok: Tok::Close,
                start: pos,
                end: pos + 2,
            });
            return Ok((pos + 2, false));
        }

        let start = pos;
        let ch = bytes[pos];
        let tok = match ch {
            b'|' => {
                pos += 1;
                Tok::Pipe
            }
            b'(' => {
                pos += 1;
                Tok::LParen
            }
            b')' => {
                pos += 1;
                Tok::RParen
            }
            b'"' => {
                let (value, next) = lex_quoted(src, pos)?;
                pos = next;
                Tok::Str(value)
            }
            b'`' => {
                let Some(close) = src[pos + 1..].find('`') else {
                    return Err(TemplateError::syntax(pos, "unterminated raw string"));
                };
                let value = src[pos + 1..pos + 1 + close].to_string();
                pos += close + 2;
                Tok::Str(value)
            }
            b'.' => {
                let name_end = ident_end(bytes, pos + 1);
                if name_end == pos + 1 {
                    pos += 1;
                    Tok::Dot
                } else {
                    let name = src[pos + 1..name_end].to_string();
                    pos = name_end;
                    Tok::Field(name)
                }
            }
            b'0'..=b'9' | b'-' | b'+' => {
                let mut end = pos + 1;
                while bytes.get(end).is_some_and(u8::is_ascii_digit) {
                    end += 1;
                }
                let literal = &src[pos..end];
                let value = literal.parse::<i64>().map_err(|_| {
                    TemplateError::syntax(pos, format!("bad number syntax: {literal:?}"))
                })?;
                pos = end;
                Tok::Int(value)
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let end = ident_end(bytes, pos);
                let word = src[pos..end].to_string();
                pos = end;
                Tok::Ident(word)
            }
            _ => {
                let found = rest.chars().next().unwrap_or_default();
                return Err(TemplateError::syntax(
                    pos,
                    format!("unexpected {found:?} in action"),
                ));
            }
        };
        out.push(Spanned {
            tok,
            start,
            end: pos,
        });
    }
}

fn ident_end(bytes: &[u8], mut pos: usize) -> usize {
    while bytes
        .get(pos)
        .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
    {
        pos += 1;
    }
    pos
}

fn lex_quoted(src: &str, start: usize) -> Result<(String, usize), TemplateError> {
    let mut value = String::new();
    let mut chars = src[start + 1..].char_indices();

    while let Some((i, ch)) = chars.next() {
        match ch {
            '"' => return Ok((value, start + 1 + i + 1)),
            '\\' => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, '\\')) => value.push('\\'),
                Some((_, '"')) => value.push('"'),
                Some((j, other)) => {
                    return Err(TemplateError::syntax(
                        start + 1 + j,
                        format!("unknown escape sequence \\{other}"),
                    ))
                }
                None => break,
            },
            '\n' => break,
            _ => value.push(ch),
        }
    }

    Err(TemplateError::syntax(start, "unterminated quoted string"))
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    len: usize,
}

impl Parser {
    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|t| t.start)
            .unwrap_or(self.len)
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn bump(&mut self) -> Option<Spanned> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect_close(&mut self) -> Result<(), TemplateError> {
        let offset = self.offset();
        match self.bump() {
            Some(Spanned { tok: Tok::Close, .. }) => Ok(()),
            _ => Err(TemplateError::syntax(offset, "expected closing delimiter }}")),
        }
    }

    /// Parses nodes until end of input or an `else`/`end` action, which is consumed up to the
    /// keyword and returned.
    fn parse_list(&mut self) -> Result<(Vec<Node>, Option<&'static str>), TemplateError> {
        let mut nodes = Vec::new();

        while let Some(spanned) = self.bump() {
            match spanned.tok {
                Tok::Text(text) => nodes.push(Node::Text(text)),
                Tok::Open => {
                    let keyword = match self.peek() {
                        Some(Tok::Ident(word)) => word.clone(),
                        _ => String::new(),
                    };
                    match keyword.as_str() {
                        "end" => {
                            self.pos += 1;
                            return Ok((nodes, Some("end")));
                        }
                        "else" => {
                            self.pos += 1;
                            return Ok((nodes, Some("else")));
                        }
                        "if" => {
                            self.pos += 1;
                            nodes.push(self.parse_if()?);
                        }
                        "with" => {
                            self.pos += 1;
                            nodes.push(self.parse_with()?);
                        }
                        _ => {
                            let pipeline = self.parse_pipeline()?;
                            self.expect_close()?;
                            nodes.push(Node::Action(pipeline));
                        }
                    }
                }
                _ => {
                    return Err(TemplateError::syntax(spanned.start, "unexpected token"));
                }
            }
        }

        Ok((nodes, None))
    }

    fn parse_if(&mut self) -> Result<Node, TemplateError> {
        let cond = self.parse_pipeline()?;
        self.expect_close()?;
        let (then, otherwise) = self.parse_branches("if", true)?;
        Ok(Node::If {
            cond,
            then,
            otherwise,
        })
    }

    fn parse_with(&mut self) -> Result<Node, TemplateError> {
        let value = self.parse_pipeline()?;
        self.expect_close()?;
        let (then, otherwise) = self.parse_branches("with", false)?;
        Ok(Node::With {
            value,
            then,
            otherwise,
        })
    }

    fn parse_branches(
        &mut self,
        keyword: &str,
        allow_else_if: bool,
    ) -> Result<(Vec<Node>, Vec<Node>), TemplateError> {
        let start = self.offset();
        let (then, end) = self.parse_list()?;
        match end {
            Some("end") => {
                self.expect_close()?;
                Ok((then, Vec::new()))
            }
            Some("else") => {
                if allow_else_if && matches!(self.peek(), Some(Tok::Ident(w)) if w == "if") {
                    // `else if` shares the outer `end`
                    self.pos += 1;
                    let nested = self.parse_if()?;
                    return Ok((then, vec![nested]));
                }
                self.expect_close()?;
                let (otherwise, end) = self.parse_list()?;
                if end != Some("end") {
                    return Err(TemplateError::syntax(
                        self.offset(),
                        format!("missing {{{{end}}}} for {{{{{keyword}}}}}"),
                    ));
                }
                self.expect_close()?;
                Ok((then, otherwise))
            }
            _ => Err(TemplateError::syntax(
                start,
                format!("missing {{{{end}}}} for {{{{{keyword}}}}}"),
            )),
        }
    }

    fn parse_pipeline(&mut self) -> Result<Pipeline, TemplateError> {
        let mut commands = Vec::new();

        loop {
            commands.push(self.parse_command()?);
            if matches!(self.peek(), Some(Tok::Pipe)) {
                self.pos += 1;
                continue;
            }
            break;
        }

        Ok(Pipeline { commands })
    }

    fn parse_command(&mut self) -> Result<Command, TemplateError> {
        let start = self.offset();
        let mut terms = Vec::new();
        while let Some(tok) = self.peek() {
            if matches!(tok, Tok::Pipe | Tok::Close | Tok::RParen) {
                break;
            }
            terms.push(self.parse_term()?);
        }

        let mut terms = terms.into_iter();
        let Some(head) = terms.next() else {
            return Err(TemplateError::syntax(start, "missing value for command"));
        };
        let args: Vec<Term> = terms.collect();

        if let Some(bad) = args.iter().find_map(|t| match t {
            Term::Func(name) => Some(name.clone()),
            _ => None,
        }) {
            return Err(TemplateError::syntax(
                start,
                format!("function {bad:?} used as an argument needs parentheses"),
            ));
        }
        let takes_args = matches!(head, Term::Func(_) | Term::Field(_) | Term::Sub(_, _));
        if !args.is_empty() && !takes_args {
            return Err(TemplateError::syntax(
                start,
                "can't give arguments to a non-function",
            ));
        }

        Ok(Command { head, args })
    }

    fn parse_term(&mut self) -> Result<Term, TemplateError> {
        let offset = self.offset();
        let Some(spanned) = self.bump() else {
            return Err(TemplateError::syntax(offset, "unclosed action"));
        };

        let term = match spanned.tok {
            Tok::Dot => Term::Dot,
            Tok::Field(name) => {
                let mut chain = vec![name];
                chain.extend(self.field_chain(spanned.end));
                Term::Field(chain)
            }
            Tok::Ident(word) => match word.as_str() {
                "true" => Term::Bool(true),
                "false" => Term::Bool(false),
                name if FUNCTIONS.contains(&name) => Term::Func(name.to_string()),
                "if" | "with" | "else" | "end" => {
                    return Err(TemplateError::syntax(
                        spanned.start,
                        format!("unexpected keyword {word:?}"),
                    ))
                }
                _ => {
                    return Err(TemplateError::syntax(
                        spanned.start,
                        format!("function {word:?} not defined"),
                    ))
                }
            },
            Tok::Str(value) => Term::Str(value),
            Tok::Int(value) => Term::Int(value),
            Tok::LParen => {
                let inner = self.parse_pipeline()?;
                let close_offset = self.offset();
                let close_end = match self.bump() {
                    Some(Spanned {
                        tok: Tok::RParen,
                        end,
                        ..
                    }) => end,
                    _ => return Err(TemplateError::syntax(close_offset, "unclosed left paren")),
                };
                Term::Sub(Box::new(inner), self.field_chain(close_end))
            }
            Tok::RParen => return Err(TemplateError::syntax(spanned.start, "unexpected right paren")),
            _ => return Err(TemplateError::syntax(spanned.start, "unexpected token in command")),
        };

        Ok(term)
    }

    /// Collects `.Name` tokens glued directly onto the previous token.
    fn field_chain(&mut self, mut end: usize) -> Vec<String> {
        let mut chain = Vec::new();
        while let Some(Spanned {
            tok: Tok::Field(name),
            start,
            end: next_end,
        }) = self.tokens.get(self.pos)
        {
            if *start != end {
                break;
            }
            chain.push(name.clone());
            end = *next_end;
            self.pos += 1;
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(names: &[&str]) -> Term {
        Term::Field(names.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn compile_splits_text_and_actions() {
        let t = compile_template("{{.Dir}}/{{.BaseName}}_bak{{.Ext}}").expect("must parse");
        assert_eq!(t.nodes().len(), 5);
        assert_eq!(t.nodes()[1], Node::Text("/".to_string()));
        assert_eq!(t.source(), "{{.Dir}}/{{.BaseName}}_bak{{.Ext}}");
    }

    #[test]
    fn compile_reads_field_chains_and_method_args() {
        let t = compile_template(r#"{{.Times.ModTime.Format "%Y_%m_%d"}}"#).expect("must parse");
        let Node::Action(pipeline) = &t.nodes()[0] else {
            panic!("expected action");
        };
        let command = &pipeline.commands[0];
        assert_eq!(command.head, fields(&["Times", "ModTime", "Format"]));
        assert_eq!(command.args, vec![Term::Str("%Y_%m_%d".to_string())]);
    }

    #[test]
    fn compile_separates_spaced_fields_into_arguments() {
        let t = compile_template(r#"{{printf "%s-%s" .Base .Ext}}"#).expect("must parse");
        let Node::Action(pipeline) = &t.nodes()[0] else {
            panic!("expected action");
        };
        assert_eq!(pipeline.commands[0].args.len(), 3);
    }

    #[test]
    fn compile_parses_pipelines_and_parens() {
        let t = compile_template(r#"{{(.Stat).Size | printf "%05d"}}"#).expect("must parse");
        let Node::Action(pipeline) = &t.nodes()[0] else {
            panic!("expected action");
        };
        assert_eq!(pipeline.commands.len(), 2);
        assert!(matches!(&pipeline.commands[0].head, Term::Sub(_, chain) if chain == &["Size"]));
    }

    #[test]
    fn compile_builds_if_else_chain() {
        let t = compile_template(
            r#"{{if eq .Ext ".jpg"}}img{{else if eq .Ext ".pdf"}}doc{{else}}{{end}}"#,
        )
        .expect("must parse");
        let Node::If { otherwise, .. } = &t.nodes()[0] else {
            panic!("expected if");
        };
        assert!(matches!(&otherwise[0], Node::If { .. }));
    }

    #[test]
    fn compile_trims_whitespace_around_markers() {
        let t = compile_template("a  {{- .Base -}}  \n b").expect("must parse");
        assert_eq!(t.nodes()[0], Node::Text("a".to_string()));
        assert_eq!(t.nodes()[2], Node::Text("b".to_string()));
    }

    #[test]
    fn compile_drops_comments() {
        let t = compile_template("x{{/* note */}}y").expect("must parse");
        assert_eq!(
            t.nodes(),
            &[Node::Text("x".to_string()), Node::Text("y".to_string())]
        );
    }

    #[test]
    fn compile_accepts_negative_numbers() {
        let t = compile_template("{{-3}}").expect("must parse");
        let Node::Action(pipeline) = &t.nodes()[0] else {
            panic!("expected action");
        };
        assert_eq!(pipeline.commands[0].head, Term::Int(-3));
    }

    #[test]
    fn compile_rejects_bad_syntax() {
        for bad in [
            "{{.Base",
            "{{.Base}}}}x{{",
            "{{if .Base}}x",
            "{{end}}",
            "{{nosuchfunc .Base}}",
            r#"{{"x" .Base}}"#,
            "{{}}",
            r#"{{printf "%s}}"#,
            "{{ (.Base }}",
        ] {
            let err = compile_template(bad).expect_err(bad);
            assert!(matches!(err, TemplateError::Syntax { .. }), "{bad}: {err}");
        }
    }

    #[test]
    fn empty_template_compiles_and_renders_nothing() {
        let ctx = FileContext::resolve(0, "a.txt", std::path::Path::new("/tmp")).expect("context");
        for source in ["", "{{/* nothing */}}"] {
            let template = compile_template(source).expect(source);
            assert!(template.nodes().is_empty(), "{source}");
            assert_eq!(render_template(&template, &ctx).expect("render"), "");
        }
    }

    #[test]
    fn validate_template_reports_offset() {
        let err = validate_template("ok {{ $x }}").expect_err("must fail");
        let TemplateError::Syntax { offset, .. } = err else {
            panic!("expected syntax error");
        };
        assert_eq!(offset, 6);
    }
}
