//! Text formatting: format specs, `str.format` and `%` interpolation.

use super::{
    evaluator::{EvalError, EvalResult, ExceptionKind},
    value::{float_repr, Number, Value},
};

#[derive(Debug, Clone, PartialEq)]
struct FormatSpec {
    fill: char,
    align: Option<char>,
    sign: char,
    alternate: bool,
    zero: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

impl Default for FormatSpec {
    fn default() -> Self {
        Self {
            fill: ' ',
            align: None,
            sign: '-',
            alternate: false,
            zero: false,
            width: 0,
            grouping: None,
            precision: None,
            kind: None,
        }
    }
}

fn parse_spec(spec: &str) -> EvalResult<FormatSpec> {
    let chars: Vec<char> = spec.chars().collect();
    let mut parsed = FormatSpec::default();
    let mut i = 0;
    let is_align = |c: char| matches!(c, '<' | '>' | '=' | '^');

    if chars.len() >= 2 && is_align(chars[1]) {
        parsed.fill = chars[0];
        parsed.align = Some(chars[1]);
        i = 2;
    } else if chars.first().is_some_and(|&c| is_align(c)) {
        parsed.align = Some(chars[0]);
        i = 1;
    }
    if let Some(&c) = chars.get(i).filter(|&&c| matches!(c, '+' | '-' | ' ')) {
        parsed.sign = c;
        i += 1;
    }
    if chars.get(i) == Some(&'#') {
        parsed.alternate = true;
        i += 1;
    }
    if chars.get(i) == Some(&'0') {
        parsed.zero = true;
        i += 1;
    }
    let (width, next) = read_number(&chars, i);
    parsed.width = width.unwrap_or(0);
    i = next;
    if let Some(&c) = chars.get(i).filter(|&&c| c == ',' || c == '_') {
        parsed.grouping = Some(c);
        i += 1;
    }
    if chars.get(i) == Some(&'.') {
        let (precision, next) = read_number(&chars, i + 1);
        if precision.is_none() {
            return Err(EvalError::value_error("Format specifier missing precision"));
        }
        parsed.precision = precision;
        i = next;
    }
    if let Some(&c) = chars.get(i) {
        parsed.kind = Some(c);
        i += 1;
    }
    if i != chars.len() {
        return Err(EvalError::value_error("Invalid format specifier"));
    }
    Ok(parsed)
}

fn read_number(chars: &[char], start: usize) -> (Option<usize>, usize) {
    let mut end = start;
    while end < chars.len() && chars[end].is_ascii_digit() {
        end += 1;
    }
    if end == start {
        return (None, start);
    }
    let digits: String = chars[start..end].iter().collect();
    (digits.parse().ok(), end)
}

fn pad(sign: &str, body: &str, spec: &FormatSpec, default_align: char) -> String {
    let (fill, align) = match spec.align {
        Some(align) => (spec.fill, align),
        None if spec.zero => ('0', '='),
        None => (' ', default_align),
    };
    let len = sign.chars().count() + body.chars().count();
    if len >= spec.width {
        return format!("{}{}", sign, body);
    }
    let padding = spec.width - len;
    let fill_run = |n: usize| std::iter::repeat(fill).take(n).collect::<String>();
    match align {
        '<' => format!("{}{}{}", sign, body, fill_run(padding)),
        '^' => {
            let left = padding / 2;
            format!("{}{}{}{}", fill_run(left), sign, body, fill_run(padding - left))
        }
        '=' => format!("{}{}{}", sign, fill_run(padding), body),
        _ => format!("{}{}{}", fill_run(padding), sign, body),
    }
}

fn group_digits(digits: &str, separator: Option<char>) -> String {
    let Some(separator) = separator else {
        return digits.to_string();
    };
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(separator);
        }
        grouped.push(c);
    }
    grouped
}

/// `1.5e3` as `1.5e+03`.
fn python_exponent(formatted: &str, upper: bool) -> String {
    let (mantissa, exponent) = formatted.split_once('e').unwrap_or((formatted, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    let e = if upper { 'E' } else { 'e' };
    format!("{}{}{}{:02}", mantissa, e, sign, exponent.abs())
}

fn format_general(x: f64, precision: usize, upper: bool, alternate: bool) -> String {
    let precision = precision.max(1);
    let scientific = format!("{:.*e}", precision - 1, x);
    let exponent: i32 = scientific
        .split_once('e')
        .and_then(|(_, exp)| exp.parse().ok())
        .unwrap_or(0);
    let body = if exponent >= -4 && exponent < precision as i32 {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        format!("{:.*}", decimals, x)
    } else {
        python_exponent(&scientific, upper)
    };
    if alternate {
        return body;
    }
    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(at) => body.split_at(at),
        None => (body.as_str(), ""),
    };
    let mantissa = if mantissa.contains('.') {
        mantissa.trim_end_matches('0').trim_end_matches('.')
    } else {
        mantissa
    };
    format!("{}{}", mantissa, exponent)
}

fn format_float(x: f64, spec: &FormatSpec) -> EvalResult<String> {
    let upper = spec.kind.is_some_and(|k| k.is_ascii_uppercase());
    let negative = x.is_sign_negative() && !x.is_nan();
    let magnitude = x.abs();
    let mut body = if magnitude.is_nan() {
        "nan".to_string()
    } else if magnitude.is_infinite() {
        "inf".to_string()
    } else {
        match spec.kind {
            Some('f') | Some('F') => format!("{:.*}", spec.precision.unwrap_or(6), magnitude),
            Some('%') => format!("{:.*}%", spec.precision.unwrap_or(6), magnitude * 100.0),
            Some('e') | Some('E') => python_exponent(
                &format!("{:.*e}", spec.precision.unwrap_or(6), magnitude),
                upper,
            ),
            Some('g') | Some('G') | Some('n') => format_general(
                magnitude,
                spec.precision.unwrap_or(6),
                upper,
                spec.alternate,
            ),
            None => match spec.precision {
                Some(precision) => format_general(magnitude, precision, false, spec.alternate),
                None => float_repr(magnitude),
            },
            Some(c) => {
                return Err(EvalError::value_error(format!(
                    "Unknown format code '{}' for object of type 'float'",
                    c
                )))
            }
        }
    };
    if upper {
        body = body.to_uppercase();
    }
    if spec.grouping.is_some() {
        let split = body
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(body.len());
        let (integer, rest) = body.split_at(split);
        body = format!("{}{}", group_digits(integer, spec.grouping), rest);
    }
    Ok(pad(sign_prefix(negative, spec.sign), &body, spec, '>'))
}

fn sign_prefix(negative: bool, sign: char) -> &'static str {
    match (negative, sign) {
        (true, _) => "-",
        (false, '+') => "+",
        (false, ' ') => " ",
        _ => "",
    }
}

fn format_int(n: i64, spec: &FormatSpec) -> EvalResult<String> {
    let magnitude = n.unsigned_abs();
    let body = match spec.kind {
        None | Some('d') | Some('n') => group_digits(&magnitude.to_string(), spec.grouping),
        Some('x') => prefixed(spec.alternate, "0x", format!("{:x}", magnitude)),
        Some('X') => prefixed(spec.alternate, "0X", format!("{:X}", magnitude)),
        Some('o') => prefixed(spec.alternate, "0o", format!("{:o}", magnitude)),
        Some('b') => prefixed(spec.alternate, "0b", format!("{:b}", magnitude)),
        Some('c') => {
            let c = u32::try_from(n)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| {
                    EvalError::exception(ExceptionKind::OverflowError, "%c arg not in range(0x110000)")
                })?;
            return Ok(pad("", &c.to_string(), spec, '<'));
        }
        Some('e' | 'E' | 'f' | 'F' | 'g' | 'G' | '%') => return format_float(n as f64, spec),
        Some(c) => {
            return Err(EvalError::value_error(format!(
                "Unknown format code '{}' for object of type 'int'",
                c
            )))
        }
    };
    Ok(pad(sign_prefix(n < 0, spec.sign), &body, spec, '>'))
}

fn prefixed(alternate: bool, prefix: &str, digits: String) -> String {
    if alternate {
        format!("{}{}", prefix, digits)
    } else {
        digits
    }
}

fn format_str(text: &str, spec: &FormatSpec) -> EvalResult<String> {
    if let Some(c) = spec.kind.filter(|&c| c != 's') {
        return Err(EvalError::value_error(format!(
            "Unknown format code '{}' for object of type 'str'",
            c
        )));
    }
    if spec.align == Some('=') {
        return Err(EvalError::value_error(
            "'=' alignment not allowed in string format specifier",
        ));
    }
    let truncated: String = match spec.precision {
        Some(precision) => text.chars().take(precision).collect(),
        None => text.to_string(),
    };
    Ok(pad("", &truncated, spec, '<'))
}

/// `format(value, spec)`.
pub fn format_value(value: &Value, spec: &str) -> EvalResult<String> {
    if spec.is_empty() {
        return Ok(value.to_str()?);
    }
    let parsed = parse_spec(spec)?;
    match value {
        Value::Str(text) => format_str(text, &parsed),
        other => match other.as_number() {
            Some(Number::Int(n)) => format_int(n, &parsed),
            Some(Number::Float(x)) => format_float(x, &parsed),
            None => Err(EvalError::type_error(format!(
                "unsupported format string passed to {}.__format__",
                other.type_name()
            ))),
        },
    }
}

fn convert(value: &Value, conversion: Option<char>) -> EvalResult<Value> {
    Ok(match conversion {
        None => value.clone(),
        Some('r') | Some('a') => Value::Str(value.repr()?),
        Some('s') => Value::Str(value.to_str()?),
        Some(c) => {
            return Err(EvalError::value_error(format!(
                "Unknown conversion specifier {}",
                c
            )))
        }
    })
}

/// One f-string replacement field.
pub fn format_field(value: &Value, conversion: Option<char>, spec: Option<&str>) -> EvalResult<String> {
    let converted = convert(value, conversion)?;
    format_value(&converted, spec.unwrap_or(""))
}

/// `str.format(*args, **kwargs)`.
pub fn str_format(template: &str, args: &[Value], kwargs: &[(String, Value)]) -> EvalResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut auto_index = 0usize;
    let mut numbering: Option<bool> = None;

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return Err(EvalError::value_error(
                    "Single '}' encountered in format string",
                ))
            }
            '{' => {
                let mut field = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    field.push(c);
                }
                if !closed {
                    return Err(EvalError::value_error("expected '}' before end of string"));
                }
                let (head, spec) = match field.split_once(':') {
                    Some((head, spec)) => (head, spec),
                    None => (field.as_str(), ""),
                };
                let (name, conversion) = match head.split_once('!') {
                    Some((name, conv)) => (name, conv.chars().next()),
                    None => (head, None),
                };

                let value = if name.is_empty() {
                    if numbering == Some(true) {
                        return Err(EvalError::value_error(
                            "cannot switch from manual field specification to automatic field numbering",
                        ));
                    }
                    numbering = Some(false);
                    let index = auto_index;
                    auto_index += 1;
                    positional(args, index)?
                } else if let Ok(index) = name.parse::<usize>() {
                    if numbering == Some(false) {
                        return Err(EvalError::value_error(
                            "cannot switch from automatic field numbering to manual field specification",
                        ));
                    }
                    numbering = Some(true);
                    positional(args, index)?
                } else {
                    kwargs
                        .iter()
                        .find(|(key, _)| key == name)
                        .map(|(_, value)| value)
                        .ok_or_else(|| {
                            EvalError::exception(
                                ExceptionKind::KeyError,
                                super::value::string_repr(name),
                            )
                        })?
                };
                out.push_str(&format_field(value, conversion, Some(spec))?);
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

fn positional(args: &[Value], index: usize) -> EvalResult<&Value> {
    args.get(index).ok_or_else(|| {
        EvalError::exception(
            ExceptionKind::IndexError,
            format!(
                "Replacement index {} out of range for positional args tuple",
                index
            ),
        )
    })
}

/// `template % args`.
pub fn percent_format(template: &str, args: &Value) -> EvalResult<String> {
    let snapshot;
    let (positional, mapping) = match args {
        Value::Tuple(items) => (items.as_slice(), None),
        Value::Dict(dict) => {
            snapshot = dict.snapshot();
            (&[][..], Some(&snapshot))
        }
        other => (std::slice::from_ref(other), None),
    };
    let mut next_arg = 0usize;
    let mut out = String::with_capacity(template.len());
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        i += 1;
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(&first) = chars.get(i) else {
            return Err(EvalError::value_error("incomplete format"));
        };
        if first == '%' {
            out.push('%');
            i += 1;
            continue;
        }

        let mut key = None;
        if first == '(' {
            let close = chars[i..]
                .iter()
                .position(|&c| c == ')')
                .ok_or_else(|| EvalError::value_error("incomplete format key"))?;
            key = Some(chars[i + 1..i + close].iter().collect::<String>());
            i += close + 1;
        }

        let mut spec = FormatSpec::default();
        while let Some(&flag) = chars.get(i) {
            match flag {
                '-' => spec.align = Some('<'),
                '+' => spec.sign = '+',
                ' ' if spec.sign != '+' => spec.sign = ' ',
                ' ' => {}
                '0' => spec.zero = true,
                '#' => spec.alternate = true,
                _ => break,
            }
            i += 1;
        }
        let (width, next) = read_number(&chars, i);
        spec.width = width.unwrap_or(0);
        i = next;
        if chars.get(i) == Some(&'.') {
            let (precision, next) = read_number(&chars, i + 1);
            spec.precision = Some(precision.unwrap_or(0));
            i = next;
        }
        if spec.align == Some('<') {
            spec.zero = false;
        }
        let Some(&conversion) = chars.get(i) else {
            return Err(EvalError::value_error("incomplete format"));
        };
        i += 1;

        let value = match (&key, mapping) {
            (Some(key), Some(dict)) => dict
                .get(&Value::Str(key.clone()))?
                .ok_or_else(|| {
                    EvalError::exception(ExceptionKind::KeyError, super::value::string_repr(key))
                })?,
            (Some(_), None) => return Err(EvalError::type_error("format requires a mapping")),
            (None, Some(_)) => args,
            (None, _) => {
                let value = positional.get(next_arg).ok_or_else(|| {
                    EvalError::type_error("not enough arguments for format string")
                })?;
                next_arg += 1;
                value
            }
        };
        out.push_str(&percent_conversion(value, conversion, &mut spec)?);
    }

    if mapping.is_none() && next_arg < positional.len() {
        return Err(EvalError::type_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(out)
}

fn percent_conversion(value: &Value, conversion: char, spec: &mut FormatSpec) -> EvalResult<String> {
    let real_required = || {
        EvalError::type_error(format!(
            "%{} format: a real number is required, not {}",
            conversion,
            value.type_name()
        ))
    };
    match conversion {
        's' | 'r' | 'a' => {
            let text = if conversion == 's' {
                value.to_str()?
            } else {
                value.repr()?
            };
            spec.zero = false;
            format_str(&text, spec)
        }
        'd' | 'i' | 'u' => {
            let n = match value.as_number().ok_or_else(real_required)? {
                Number::Int(n) => n,
                Number::Float(x) => x.trunc() as i64,
            };
            spec.precision = None;
            spec.kind = Some('d');
            format_int(n, spec)
        }
        'x' | 'X' | 'o' => match value.as_number() {
            Some(Number::Int(n)) => {
                spec.kind = Some(conversion);
                format_int(n, spec)
            }
            _ => Err(EvalError::type_error(format!(
                "%{} format: an integer is required, not {}",
                conversion,
                value.type_name()
            ))),
        },
        'f' | 'F' | 'e' | 'E' | 'g' | 'G' => {
            let x = value.as_number().ok_or_else(real_required)?.as_f64();
            spec.kind = Some(conversion);
            spec.precision = Some(spec.precision.unwrap_or(6));
            format_float(x, spec)
        }
        'c' => match value {
            Value::Str(s) if s.chars().count() == 1 => format_str(s, spec),
            Value::Int(n) => {
                spec.kind = Some('c');
                format_int(*n, spec)
            }
            _ => Err(EvalError::type_error("%c requires int or char")),
        },
        other => Err(EvalError::value_error(format!(
            "unsupported format character '{}' ({:#x})",
            other, other as u32
        ))),
    }
}
