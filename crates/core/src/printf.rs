use crate::eval::Value;
use crate::template::TemplateError;

#[derive(Debug, Default, Clone, Copy)]
struct Directive {
    left: bool,
    zero: bool,
    plus: bool,
    width: usize,
    precision: Option<usize>,
}

/// `printf`-style formatting over template values.
///
/// Supported verbs: `%d %s %v %q %x %X %o %f %t %%` with the `-`, `+` and `0` flags, a width
/// and a precision. A verb that does not fit its operand is an error.
pub(crate) fn sprintf(format: &str, args: &[Value<'_>]) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();
    let mut next_arg = args.iter();

    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut directive = Directive::default();
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => directive.left = true,
                '0' => directive.zero = true,
                '+' => directive.plus = true,
                _ => break,
            }
            chars.next();
        }
        directive.width = take_number(&mut chars).unwrap_or(0);
        if chars.peek() == Some(&'.') {
            chars.next();
            directive.precision = Some(take_number(&mut chars).unwrap_or(0));
        }

        let Some(verb) = chars.next() else {
            return Err(bad("format ends in the middle of a verb"));
        };
        let Some(arg) = next_arg.next() else {
            return Err(bad(format!("missing operand for %{verb}")));
        };
        let body = format_one(verb, &directive, arg)?;
        out.push_str(&pad(&body, &directive, is_numeric(verb, arg)));
    }

    let extra = next_arg.count();
    if extra > 0 {
        return Err(bad(format!("{extra} unused printf operand(s)")));
    }
    Ok(out)
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<usize> {
    let mut digits = String::new();
    while let Some(&c) = chars.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits.parse().ok()
}

fn format_one(verb: char, directive: &Directive, arg: &Value<'_>) -> Result<String, TemplateError> {
    let text = match (verb, arg) {
        ('d', Value::Int(n)) => signed(*n, directive, n.unsigned_abs().to_string()),
        ('x', Value::Int(n)) => signed(*n, directive, format!("{:x}", n.unsigned_abs())),
        ('X', Value::Int(n)) => signed(*n, directive, format!("{:X}", n.unsigned_abs())),
        ('o', Value::Int(n)) => signed(*n, directive, format!("{:o}", n.unsigned_abs())),
        ('x', Value::Str(s)) => s.bytes().map(|b| format!("{b:02x}")).collect(),
        ('X', Value::Str(s)) => s.bytes().map(|b| format!("{b:02X}")).collect(),
        ('f', Value::Int(n)) => {
            let precision = directive.precision.unwrap_or(6);
            let body = format!("{:.*}", precision, (*n as f64).abs());
            signed(*n, directive, body)
        }
        ('t', Value::Bool(b)) => b.to_string(),
        ('q', Value::Str(s)) => format!("{s:?}"),
        ('s' | 'v', value) => {
            let text = value.to_text()?;
            match directive.precision {
                Some(max) => text.chars().take(max).collect(),
                None => text,
            }
        }
        (verb, value) => {
            return Err(bad(format!(
                "verb %{verb} does not apply to a {} operand",
                value.kind()
            )))
        }
    };
    Ok(text)
}

fn signed(n: i64, directive: &Directive, digits: String) -> String {
    if n < 0 {
        format!("-{digits}")
    } else if directive.plus {
        format!("+{digits}")
    } else {
        digits
    }
}

fn is_numeric(verb: char, arg: &Value<'_>) -> bool {
    matches!(verb, 'd' | 'x' | 'X' | 'o' | 'f') && matches!(arg, Value::Int(_))
}

fn pad(body: &str, directive: &Directive, numeric: bool) -> String {
    let len = body.chars().count();
    if len >= directive.width {
        return body.to_string();
    }
    let fill = directive.width - len;

    if directive.left {
        format!("{body}{}", " ".repeat(fill))
    } else if directive.zero && numeric {
        // zeros go between the sign and the digits
        let (sign, digits) = match body.chars().next() {
            Some(c @ ('-' | '+')) => (c.to_string(), &body[1..]),
            _ => (String::new(), body),
        };
        format!("{sign}{}{digits}", "0".repeat(fill))
    } else {
        format!("{}{body}", " ".repeat(fill))
    }
}

fn bad(message: impl Into<String>) -> TemplateError {
    TemplateError::Execution(format!("printf: {}", message.into()))
}

#[cfg(test)]
mod tests {
    use super::sprintf;
    use crate::eval::Value;

    fn s(v: &str) -> Value<'static> {
        Value::Str(v.to_string())
    }

    #[test]
    fn pads_integers() {
        assert_eq!(sprintf("%02d", &[Value::Int(7)]).expect("fmt"), "07");
        assert_eq!(sprintf("%05d", &[Value::Int(-42)]).expect("fmt"), "-0042");
        assert_eq!(sprintf("%+d|%-4d|", &[Value::Int(3), Value::Int(9)]).expect("fmt"), "+3|9   |");
        assert_eq!(sprintf("%4d", &[Value::Int(12)]).expect("fmt"), "  12");
    }

    #[test]
    fn formats_radix_and_float() {
        assert_eq!(sprintf("%x %X %o", &[Value::Int(255), Value::Int(255), Value::Int(8)]).expect("fmt"), "ff FF 10");
        assert_eq!(sprintf("%.2f", &[Value::Int(3)]).expect("fmt"), "3.00");
        assert_eq!(sprintf("%x", &[s("hi")]).expect("fmt"), "6869");
    }

    #[test]
    fn formats_strings() {
        assert_eq!(sprintf("%s-%v", &[s("a"), Value::Int(1)]).expect("fmt"), "a-1");
        assert_eq!(sprintf("%.3s", &[s("abcdef")]).expect("fmt"), "abc");
        assert_eq!(sprintf("%q", &[s("a b")]).expect("fmt"), "\"a b\"");
        assert_eq!(sprintf("100%%", &[]).expect("fmt"), "100%");
        assert_eq!(sprintf("%-3s|", &[s("a")]).expect("fmt"), "a  |");
    }

    #[test]
    fn rejects_operand_mismatches() {
        assert!(sprintf("%d", &[s("x")]).is_err());
        assert!(sprintf("%d %d", &[Value::Int(1)]).is_err());
        assert!(sprintf("%d", &[Value::Int(1), Value::Int(2)]).is_err());
        assert!(sprintf("%", &[]).is_err());
    }
}
