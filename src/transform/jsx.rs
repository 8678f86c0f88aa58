//! JSX to `createElement` calls
//!
//! Newlines swallowed by an element are re-emitted before its closing
//! parenthesis, so code after the element keeps its original line.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::utils::is_ident_char;

static ENTITY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#x[0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").unwrap()
});

/// Rewrite every JSX element in `source`
pub fn transform_jsx(source: &str, pragma: &str, fragment: &str) -> Result<String, String> {
    let mut parser = JsxParser {
        src: source,
        pos: 0,
        pragma,
        fragment,
    };
    parser.script(false)
}

enum Attr {
    Prop(String, String),
    Spread(String),
}

struct JsxParser<'a> {
    src: &'a str,
    pos: usize,
    pragma: &'a str,
    fragment: &'a str,
}

impl<'a> JsxParser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn expect(&mut self, expected: char) -> Result<(), String> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(format!(
                "expected '{}' but found '{}' at offset {}",
                expected, c, self.pos
            )),
            None => Err(format!("expected '{}' but reached end of file", expected)),
        }
    }

    /// Skip whitespace, returning the number of newlines skipped
    fn skip_ws(&mut self) -> usize {
        let mut newlines = 0;
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            if c == '\n' {
                newlines += 1;
            }
            self.pos += c.len_utf8();
        }
        newlines
    }

    /// Copy plain script, rewriting JSX; with `until_brace` stop before the
    /// `}` closing the current expression container
    fn script(&mut self, until_brace: bool) -> Result<String, String> {
        let mut out = String::new();
        let mut depth = 0usize;

        while let Some(c) = self.peek() {
            match c {
                '"' | '\'' => self.copy_string(c, &mut out)?,
                '`' => self.copy_template(&mut out)?,
                '/' if self.rest().starts_with("//") => self.copy_line_comment(&mut out),
                '/' if self.rest().starts_with("/*") => self.copy_block_comment(&mut out)?,
                '/' if regex_can_start(&out) => self.copy_regex(&mut out)?,
                '{' => {
                    depth += 1;
                    out.push(c);
                    self.pos += 1;
                }
                '}' => {
                    if depth == 0 && until_brace {
                        return Ok(out);
                    }
                    depth = depth.saturating_sub(1);
                    out.push(c);
                    self.pos += 1;
                }
                '<' if self.starts_element() && jsx_can_start(&out) => {
                    let element = self.element()?;
                    out.push_str(&element);
                }
                _ => {
                    out.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }

        if until_brace {
            return Err("unterminated JSX expression container".to_string());
        }

        Ok(out)
    }

    fn starts_element(&self) -> bool {
        let mut chars = self.rest().chars();
        chars.next() == Some('<')
            && matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '>')
    }

    fn copy_string(&mut self, quote: char, out: &mut String) -> Result<(), String> {
        let start = self.pos;
        self.pos += quote.len_utf8();
        loop {
            match self.bump() {
                Some('\\') => {
                    self.bump();
                }
                Some(c) if c == quote => break,
                Some('\n') | None => {
                    return Err(format!("unterminated string literal at offset {}", start));
                }
                Some(_) => {}
            }
        }
        out.push_str(&self.src[start..self.pos]);
        Ok(())
    }

    fn copy_template(&mut self, out: &mut String) -> Result<(), String> {
        out.push('`');
        self.pos += 1;
        loop {
            if self.rest().starts_with("${") {
                out.push_str("${");
                self.pos += 2;
                let inner = self.script(true)?;
                out.push_str(&inner);
                self.expect('}')?;
                out.push('}');
                continue;
            }
            match self.bump() {
                Some('\\') => {
                    out.push('\\');
                    if let Some(escaped) = self.bump() {
                        out.push(escaped);
                    }
                }
                Some('`') => {
                    out.push('`');
                    return Ok(());
                }
                Some(c) => out.push(c),
                None => return Err("unterminated template literal".to_string()),
            }
        }
    }

    /// Copy a regular expression literal and its flags
    fn copy_regex(&mut self, out: &mut String) -> Result<(), String> {
        let start = self.pos;
        self.pos += 1;
        let mut in_class = false;
        loop {
            match self.bump() {
                Some('\\') => {
                    self.bump();
                }
                Some('[') => in_class = true,
                Some(']') => in_class = false,
                Some('/') if !in_class => break,
                Some('\n') | None => {
                    return Err(format!("unterminated regular expression at offset {}", start));
                }
                Some(_) => {}
            }
        }
        while let Some(c) = self.peek() {
            if !is_ident_char(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        out.push_str(&self.src[start..self.pos]);
        Ok(())
    }

    fn copy_line_comment(&mut self, out: &mut String) {
        let end = self.rest().find('\n').map_or(self.src.len(), |i| self.pos + i);
        out.push_str(&self.src[self.pos..end]);
        self.pos = end;
    }

    fn copy_block_comment(&mut self, out: &mut String) -> Result<(), String> {
        match self.rest()[2..].find("*/") {
            Some(i) => {
                let end = self.pos + 2 + i + 2;
                out.push_str(&self.src[self.pos..end]);
                self.pos = end;
                Ok(())
            }
            None => Err("unterminated block comment".to_string()),
        }
    }

    fn name(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if is_ident_char(c) || c == '-' || c == '.' || c == ':' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        self.src[start..self.pos].to_string()
    }

    /// Parse an element starting at `<` and return the call expression
    fn element(&mut self) -> Result<String, String> {
        self.expect('<')?;
        let mut newlines = self.skip_ws();

        let tag = if self.peek() == Some('>') {
            None
        } else {
            Some(self.name())
        };

        let mut attrs = Vec::new();
        let self_closing = loop {
            newlines += self.skip_ws();
            match self.peek() {
                Some('/') => {
                    self.pos += 1;
                    self.expect('>')?;
                    break true;
                }
                Some('>') => {
                    self.pos += 1;
                    break false;
                }
                Some('{') => {
                    self.pos += 1;
                    newlines += self.skip_ws();
                    if !self.rest().starts_with("...") {
                        return Err("expected '...' in JSX spread attribute".to_string());
                    }
                    self.pos += 3;
                    let expr = self.script(true)?;
                    self.expect('}')?;
                    attrs.push(Attr::Spread(trim_counting(&expr, &mut newlines)));
                }
                Some(c) if is_ident_char(c) => {
                    let key = self.name();
                    newlines += self.skip_ws();
                    let value = if self.peek() == Some('=') {
                        self.pos += 1;
                        newlines += self.skip_ws();
                        self.attr_value(&mut newlines)?
                    } else {
                        "true".to_string()
                    };
                    attrs.push(Attr::Prop(key, value));
                }
                Some(c) => return Err(format!("unexpected '{}' in JSX tag", c)),
                None => return Err("unterminated JSX tag".to_string()),
            }
        };

        if tag.is_none() && !attrs.is_empty() {
            return Err("JSX fragments cannot have attributes".to_string());
        }

        let mut children = Vec::new();
        if !self_closing {
            loop {
                if self.rest().starts_with("</") {
                    self.pos += 2;
                    newlines += self.skip_ws();
                    let closing = if self.peek() == Some('>') {
                        None
                    } else {
                        Some(self.name())
                    };
                    newlines += self.skip_ws();
                    self.expect('>')?;
                    if closing != tag {
                        return Err(format!(
                            "expected closing tag </{}> but found </{}>",
                            tag.as_deref().unwrap_or(""),
                            closing.as_deref().unwrap_or("")
                        ));
                    }
                    break;
                }

                match self.peek() {
                    Some('<') => children.push(self.element()?),
                    Some('{') => {
                        self.pos += 1;
                        let expr = self.script(true)?;
                        self.expect('}')?;
                        let trimmed = trim_counting(&expr, &mut newlines);
                        if !trimmed.is_empty() && !is_comment_only(&trimmed) {
                            children.push(trimmed);
                        } else {
                            newlines += trimmed.matches('\n').count();
                        }
                    }
                    Some(_) => {
                        let text = self.text();
                        newlines += text.matches('\n').count();
                        if let Some(cleaned) = clean_text(text) {
                            children.push(string_literal(&decode_entities(&cleaned)));
                        }
                    }
                    None => {
                        return Err(format!(
                            "unterminated JSX element <{}>",
                            tag.as_deref().unwrap_or("")
                        ))
                    }
                }
            }
        }

        Ok(self.create_element(tag.as_deref(), &attrs, &children, newlines))
    }

    fn attr_value(&mut self, newlines: &mut usize) -> Result<String, String> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let end = self
                    .rest()
                    .find(quote)
                    .ok_or_else(|| "unterminated JSX attribute string".to_string())?;
                let raw = &self.src[self.pos..self.pos + end];
                self.pos += end + 1;
                *newlines += raw.matches('\n').count();
                Ok(string_literal(&decode_entities(raw)))
            }
            Some('{') => {
                self.pos += 1;
                let expr = self.script(true)?;
                self.expect('}')?;
                Ok(trim_counting(&expr, newlines))
            }
            Some('<') => self.element(),
            _ => Err("expected JSX attribute value".to_string()),
        }
    }

    fn text(&mut self) -> &'a str {
        let end = self
            .rest()
            .find(['<', '{'])
            .map_or(self.src.len(), |i| self.pos + i);
        let text = &self.src[self.pos..end];
        self.pos = end;
        text
    }

    fn create_element(
        &self,
        tag: Option<&str>,
        attrs: &[Attr],
        children: &[String],
        newlines: usize,
    ) -> String {
        let tag = match tag {
            None => self.fragment.to_string(),
            Some(name) if is_intrinsic(name) => string_literal(name),
            Some(name) => name.to_string(),
        };

        let mut call = format!("{}({}, {}", self.pragma, tag, props(attrs));
        for child in children {
            call.push_str(", ");
            call.push_str(child);
        }
        call.push_str(&"\n".repeat(newlines));
        call.push(')');
        call
    }
}

fn props(attrs: &[Attr]) -> String {
    if attrs.is_empty() {
        return "null".to_string();
    }

    let mut groups: Vec<String> = Vec::new();
    let mut object: Vec<String> = Vec::new();

    for attr in attrs {
        match attr {
            Attr::Prop(key, value) => object.push(format!("{}: {}", prop_key(key), value)),
            Attr::Spread(expr) => {
                if !object.is_empty() {
                    groups.push(format!("{{{}}}", object.join(", ")));
                    object.clear();
                }
                groups.push(expr.clone());
            }
        }
    }

    let has_spread = attrs.iter().any(|a| matches!(a, Attr::Spread(_)));
    if !object.is_empty() {
        groups.push(format!("{{{}}}", object.join(", ")));
    }

    if has_spread {
        format!("Object.assign({{}}, {})", groups.join(", "))
    } else {
        groups.remove(0)
    }
}

fn prop_key(key: &str) -> String {
    let valid = key.chars().all(is_ident_char)
        && !key.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        key.to_string()
    } else {
        string_literal(key)
    }
}

/// Lowercase tags without a member access are DOM elements
fn is_intrinsic(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_lowercase()) && !name.contains('.')
}

/// Whether the previous token allows an expression to start here
fn jsx_can_start(out: &str) -> bool {
    let trimmed = out.trim_end();
    let Some(last) = trimmed.chars().last() else {
        return true;
    };

    if "(,=:?[{&|!;".contains(last) {
        return true;
    }
    if last == '>' {
        return trimmed.ends_with("=>");
    }

    ends_with_keyword(trimmed, &["return", "yield", "default", "case", "else", "do"])
}

/// Whether a `/` here starts a regular expression rather than a division
pub(crate) fn regex_can_start(out: &str) -> bool {
    let trimmed = out.trim_end();
    match trimmed.chars().last() {
        None => true,
        Some(last) if "+-*%~^<>".contains(last) => true,
        Some(_) => {
            jsx_can_start(out)
                || ends_with_keyword(trimmed, &["typeof", "instanceof", "in", "void", "delete", "throw"])
        }
    }
}

fn ends_with_keyword(trimmed: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| {
        trimmed.ends_with(keyword)
            && !trimmed[..trimmed.len() - keyword.len()]
                .chars()
                .last()
                .is_some_and(is_ident_char)
    })
}

fn trim_counting(expr: &str, newlines: &mut usize) -> String {
    let trimmed = expr.trim();
    *newlines += expr.matches('\n').count() - trimmed.matches('\n').count();
    trimmed.to_string()
}

fn is_comment_only(expr: &str) -> bool {
    expr.starts_with("/*") && expr.ends_with("*/") && expr[2..].find("*/") == Some(expr.len() - 4)
}

/// Collapse JSX text the way React expects: lines are trimmed, blank lines
/// dropped and the remaining lines joined with a single space
fn clean_text(raw: &str) -> Option<String> {
    let lines: Vec<&str> = raw.split('\n').collect();
    let last_non_empty = lines
        .iter()
        .rposition(|line| line.chars().any(|c| c != ' ' && c != '\t' && c != '\r'))
        .unwrap_or(0);

    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        let mut line = line.replace('\t', " ");
        if i != 0 {
            line = line.trim_start_matches(' ').to_string();
        }
        if i != lines.len() - 1 {
            line = line.trim_end_matches([' ', '\r']).to_string();
        }
        if !line.is_empty() {
            if i != last_non_empty {
                line.push(' ');
            }
            out.push_str(&line);
        }
    }

    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn decode_entities(text: &str) -> String {
    ENTITY_REGEX
        .replace_all(text, |caps: &Captures<'_>| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity.strip_prefix("#x") {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match entity {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some('\u{a0}'),
                    "copy" => Some('\u{a9}'),
                    _ => None,
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}

fn string_literal(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}
