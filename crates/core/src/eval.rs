use crate::context::{FileContext, StatInfo, TimestampInfo};
use crate::exif_reader::ExifData;
use crate::printf::sprintf;
use crate::template::{Command, Node, Pipeline, Template, TemplateError, Term};
use chrono::{DateTime, Datelike, Local, Timelike};
use std::fmt::Write;

const TIME_DISPLAY: &str = "%Y-%m-%d %H:%M:%S%.f %z";

/// A value flowing through a template pipeline.
#[derive(Debug, Clone)]
pub(crate) enum Value<'a> {
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
    Time(DateTime<Local>),
    File(&'a FileContext),
    Stat(StatInfo),
    Times(TimestampInfo),
    Exif(ExifData),
}

impl<'a> Value<'a> {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::Time(_) => "time",
            Value::File(_) => "file",
            Value::Stat(_) => "stat",
            Value::Times(_) => "times",
            Value::Exif(_) => "exif",
        }
    }

    pub(crate) fn truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
            Value::Exif(data) => !data.is_empty(),
            Value::Time(_) | Value::File(_) | Value::Stat(_) | Value::Times(_) => true,
        }
    }

    /// Text form used when a value is printed. Struct-like values cannot be printed.
    pub(crate) fn to_text(&self) -> Result<String, TemplateError> {
        match self {
            Value::Nil => Ok(String::new()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Int(n) => Ok(n.to_string()),
            Value::Str(s) => Ok(s.clone()),
            Value::Time(t) => Ok(t.format(TIME_DISPLAY).to_string()),
            other => Err(exec(format!(
                "cannot print a {} value; select one of its fields",
                other.kind()
            ))),
        }
    }

    /// Resolves `.name` on this value. `args` are only accepted by methods.
    fn field(self, name: &str, args: Vec<Value<'a>>) -> Result<Value<'a>, TemplateError> {
        if let Value::Nil = self {
            return Err(exec(format!("nil value has no field {name}")));
        }

        let method_arg = match name {
            "Format" | "Tag" => Some(single_string_arg(name, &args)?),
            _ if !args.is_empty() => {
                return Err(exec(format!(
                    "{name} is not a method but has arguments"
                )));
            }
            _ => None,
        };

        let value = match (&self, name) {
            (Value::File(ctx), _) => file_field(*ctx, name)?,
            (Value::Stat(stat), "Name") => Value::Str(stat.name.clone()),
            (Value::Stat(stat), "Size") => Value::Int(i64::try_from(stat.size).unwrap_or(i64::MAX)),
            (Value::Stat(stat), "Mode") => Value::Str(stat.mode_string()),
            (Value::Stat(stat), "ModTime") => Value::Time(stat.mod_time),
            (Value::Stat(stat), "IsDir") => Value::Bool(stat.is_dir),
            (Value::Times(times), "ModTime") => Value::Time(times.mod_time),
            (Value::Times(times), "AccessTime") => Value::Time(times.access_time),
            (Value::Times(times), "HasChangeTime") => Value::Bool(times.change_time.is_some()),
            (Value::Times(times), "HasBirthTime") => Value::Bool(times.birth_time.is_some()),
            (Value::Times(times), "ChangeTime") => Value::Time(
                times
                    .change_time
                    .ok_or_else(|| exec("change time is not recorded on this platform"))?,
            ),
            (Value::Times(times), "BirthTime") => Value::Time(
                times
                    .birth_time
                    .ok_or_else(|| exec("birth time is not recorded on this platform"))?,
            ),
            (Value::Exif(data), "DateTime") => Value::Time(
                data.date_time()
                    .ok_or_else(|| exec("exif data has no capture date"))?,
            ),
            (Value::Exif(data), "Make" | "Model") => exif_tag(data, name)?,
            (Value::Exif(data), "Tag") => exif_tag(data, method_arg.unwrap_or_default())?,
            (Value::Time(t), "Format") => {
                Value::Str(format_time(t, method_arg.unwrap_or_default())?)
            }
            (Value::Time(t), "Year") => Value::Int(i64::from(t.year())),
            (Value::Time(t), "Month") => Value::Int(i64::from(t.month())),
            (Value::Time(t), "Day") => Value::Int(i64::from(t.day())),
            (Value::Time(t), "Hour") => Value::Int(i64::from(t.hour())),
            (Value::Time(t), "Minute") => Value::Int(i64::from(t.minute())),
            (Value::Time(t), "Second") => Value::Int(i64::from(t.second())),
            (Value::Time(t), "Unix") => Value::Int(t.timestamp()),
            (other, _) => {
                return Err(exec(format!(
                    "can't evaluate field {name} in type {}",
                    other.kind()
                )))
            }
        };

        Ok(value)
    }
}

fn file_field<'a>(ctx: &'a FileContext, name: &str) -> Result<Value<'a>, TemplateError> {
    let value = match name {
        "I" => Value::Int(index_value(ctx.index())),
        "N" => Value::Int(index_value(ctx.index()).saturating_add(1)),
        "Raw" => Value::Str(ctx.raw().to_string()),
        "Abs" => Value::Str(ctx.abs().to_string()),
        "Dir" => Value::Str(ctx.dir().to_string()),
        "Base" => Value::Str(ctx.base().to_string()),
        "Ext" => Value::Str(ctx.ext().to_string()),
        "BaseName" => Value::Str(ctx.base_name().to_string()),
        "Stat" => Value::Stat(ctx.stat()?),
        "Times" => Value::Times(ctx.timestamps()?),
        "Exif" => ctx.exif_data().map(Value::Exif).unwrap_or(Value::Nil),
        _ => return Err(exec(format!("can't evaluate field {name} in type file"))),
    };
    Ok(value)
}

fn index_value(index: usize) -> i64 {
    i64::try_from(index).unwrap_or(i64::MAX)
}

fn exif_tag<'a>(data: &ExifData, name: &str) -> Result<Value<'a>, TemplateError> {
    data.tag(name)
        .map(|v| Value::Str(v.to_string()))
        .ok_or_else(|| exec(format!("exif tag {name} not present")))
}

fn single_string_arg<'b>(name: &str, args: &'b [Value<'_>]) -> Result<&'b str, TemplateError> {
    match args {
        [Value::Str(s)] => Ok(s.as_str()),
        [other] => Err(exec(format!(
            "{name} wants a string argument, got {}",
            other.kind()
        ))),
        _ => Err(exec(format!(
            "wrong number of args for {name}: want 1 got {}",
            args.len()
        ))),
    }
}

fn format_time(t: &DateTime<Local>, layout: &str) -> Result<String, TemplateError> {
    let mut out = String::new();
    write!(out, "{}", t.format(layout))
        .map_err(|_| exec(format!("invalid time layout {layout:?}")))?;
    Ok(out)
}

fn exec(message: impl Into<String>) -> TemplateError {
    TemplateError::Execution(message.into())
}

/// Walks a compiled template against one file's context.
pub(crate) struct Renderer<'a> {
    ctx: &'a FileContext,
}

impl<'a> Renderer<'a> {
    pub(crate) fn new(ctx: &'a FileContext) -> Self {
        Self { ctx }
    }

    pub(crate) fn render(&self, template: &Template) -> Result<String, TemplateError> {
        let mut out = String::new();
        self.walk(template.nodes(), &Value::File(self.ctx), &mut out)?;
        Ok(out)
    }

    fn walk(&self, nodes: &[Node], dot: &Value<'a>, out: &mut String) -> Result<(), TemplateError> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Action(pipeline) => {
                    let value = self.pipeline(pipeline, dot)?;
                    out.push_str(&value.to_text()?);
                }
                Node::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    if self.pipeline(cond, dot)?.truthy() {
                        self.walk(then, dot, out)?;
                    } else {
                        self.walk(otherwise, dot, out)?;
                    }
                }
                Node::With {
                    value,
                    then,
                    otherwise,
                } => {
                    let value = self.pipeline(value, dot)?;
                    if value.truthy() {
                        self.walk(then, &value, out)?;
                    } else {
                        self.walk(otherwise, dot, out)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn pipeline(&self, pipeline: &Pipeline, dot: &Value<'a>) -> Result<Value<'a>, TemplateError> {
        let mut piped: Option<Value<'a>> = None;
        for command in &pipeline.commands {
            piped = Some(self.command(command, dot, piped.take())?);
        }
        Ok(piped.unwrap_or(Value::Nil))
    }

    fn command(
        &self,
        command: &Command,
        dot: &Value<'a>,
        piped: Option<Value<'a>>,
    ) -> Result<Value<'a>, TemplateError> {
        let mut args = command
            .args
            .iter()
            .map(|term| self.term(term, dot))
            .collect::<Result<Vec<_>, _>>()?;
        args.extend(piped);

        match &command.head {
            Term::Func(name) => call_function(name, args),
            Term::Field(chain) => walk_chain(dot.clone(), chain, args),
            Term::Sub(inner, chain) => walk_chain(self.pipeline(inner, dot)?, chain, args),
            literal => {
                if !args.is_empty() {
                    return Err(exec("can't give arguments to a non-function"));
                }
                self.term(literal, dot)
            }
        }
    }

    fn term(&self, term: &Term, dot: &Value<'a>) -> Result<Value<'a>, TemplateError> {
        match term {
            Term::Dot => Ok(dot.clone()),
            Term::Field(chain) => walk_chain(dot.clone(), chain, Vec::new()),
            Term::Sub(inner, chain) => walk_chain(self.pipeline(inner, dot)?, chain, Vec::new()),
            Term::Str(s) => Ok(Value::Str(s.clone())),
            Term::Int(n) => Ok(Value::Int(*n)),
            Term::Bool(b) => Ok(Value::Bool(*b)),
            Term::Func(name) => Err(exec(format!("function {name} needs parentheses here"))),
        }
    }
}

/// Applies `.A.B.C`; only the last link receives `args`.
fn walk_chain<'a>(
    start: Value<'a>,
    chain: &[String],
    args: Vec<Value<'a>>,
) -> Result<Value<'a>, TemplateError> {
    let Some((last, init)) = chain.split_last() else {
        if args.is_empty() {
            return Ok(start);
        }
        return Err(exec("can't give arguments to a non-function"));
    };

    let mut current = start;
    for name in init {
        current = current.field(name, Vec::new())?;
    }
    current.field(last, args)
}

fn call_function<'a>(name: &str, args: Vec<Value<'a>>) -> Result<Value<'a>, TemplateError> {
    match name {
        "printf" => {
            let Some((format, rest)) = args.split_first() else {
                return Err(exec("printf needs a format string"));
            };
            let Value::Str(format) = format else {
                return Err(exec(format!(
                    "printf format must be a string, got {}",
                    format.kind()
                )));
            };
            Ok(Value::Str(sprintf(format, rest)?))
        }
        "print" => Ok(Value::Str(print(&args)?)),
        "lower" => Ok(Value::Str(one_arg(name, &args)?.to_text()?.to_lowercase())),
        "upper" => Ok(Value::Str(one_arg(name, &args)?.to_text()?.to_uppercase())),
        "replace" => {
            let [old, new, subject] = args.as_slice() else {
                return Err(arity(name, 3, args.len()));
            };
            let subject = subject.to_text()?;
            Ok(Value::Str(subject.replace(&old.to_text()?, &new.to_text()?)))
        }
        "eq" => {
            let Some((first, rest)) = args.split_first() else {
                return Err(arity(name, 2, 0));
            };
            if rest.is_empty() {
                return Err(arity(name, 2, 1));
            }
            for other in rest {
                if values_equal(first, other)? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "ne" => {
            let [a, b] = args.as_slice() else {
                return Err(arity(name, 2, args.len()));
            };
            Ok(Value::Bool(!values_equal(a, b)?))
        }
        "not" => Ok(Value::Bool(!one_arg(name, &args)?.truthy())),
        other => Err(exec(format!("function {other:?} not defined"))),
    }
}

fn one_arg<'b, 'a>(name: &str, args: &'b [Value<'a>]) -> Result<&'b Value<'a>, TemplateError> {
    match args {
        [value] => Ok(value),
        _ => Err(arity(name, 1, args.len())),
    }
}

fn arity(name: &str, want: usize, got: usize) -> TemplateError {
    exec(format!("wrong number of args for {name}: want {want} got {got}"))
}

/// Operands are separated by a space when neither side is a string.
fn print(args: &[Value<'_>]) -> Result<String, TemplateError> {
    let mut out = String::new();
    for (i, value) in args.iter().enumerate() {
        if i > 0 {
            let prev_is_str = matches!(args[i - 1], Value::Str(_));
            let is_str = matches!(value, Value::Str(_));
            if !prev_is_str && !is_str {
                out.push(' ');
            }
        }
        out.push_str(&value.to_text()?);
    }
    Ok(out)
}

fn values_equal(a: &Value<'_>, b: &Value<'_>) -> Result<bool, TemplateError> {
    match (a, b) {
        (Value::Nil, Value::Nil) => Ok(true),
        (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
        (Value::Int(x), Value::Int(y)) => Ok(x == y),
        (Value::Str(x), Value::Str(y)) => Ok(x == y),
        (Value::Time(x), Value::Time(y)) => Ok(x == y),
        _ => Err(exec(format!(
            "incompatible types for comparison: {} and {}",
            a.kind(),
            b.kind()
        ))),
    }
}
