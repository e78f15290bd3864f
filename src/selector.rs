use super::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SelectorAttrCondition {
    Exists { key: String },
    Eq { key: String, value: String },
    StartsWith { key: String, value: String },
    EndsWith { key: String, value: String },
    Contains { key: String, value: String },
    Includes { key: String, value: String },
    DashMatch { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SelectorPseudoClass {
    FirstChild,
    LastChild,
    Disabled,
    Enabled,
    Empty,
    Not(Vec<Vec<SelectorPart>>),
}

const KEYWORD_PSEUDO_CLASSES: &[(&str, SelectorPseudoClass)] = &[
    ("first-child", SelectorPseudoClass::FirstChild),
    ("last-child", SelectorPseudoClass::LastChild),
    ("disabled", SelectorPseudoClass::Disabled),
    ("enabled", SelectorPseudoClass::Enabled),
    ("empty", SelectorPseudoClass::Empty),
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SelectorStep {
    pub(crate) tag: Option<String>,
    pub(crate) universal: bool,
    pub(crate) id: Option<String>,
    pub(crate) classes: Vec<String>,
    pub(crate) attrs: Vec<SelectorAttrCondition>,
    pub(crate) pseudo_classes: Vec<SelectorPseudoClass>,
}

impl SelectorStep {
    fn is_blank(&self) -> bool {
        self.tag.is_none()
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attrs.is_empty()
            && !self.universal
            && self.pseudo_classes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SelectorCombinator {
    Descendant,
    Child,
    AdjacentSibling,
    GeneralSibling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SelectorPart {
    pub(crate) step: SelectorStep,
    // Relation to the part on the left.
    pub(crate) combinator: Option<SelectorCombinator>,
}

fn unsupported(selector: &str) -> Error {
    Error::UnsupportedSelector(selector.to_string())
}

pub(crate) fn parse_selector_groups(selector: &str) -> Result<Vec<Vec<SelectorPart>>> {
    split_selector_groups(selector)?
        .iter()
        .map(|group| parse_selector_chain(group))
        .collect()
}

pub(crate) fn parse_selector_chain(selector: &str) -> Result<Vec<SelectorPart>> {
    let selector = selector.trim();
    if selector.is_empty() {
        return Err(unsupported(selector));
    }

    let mut parts = Vec::new();
    let mut pending: Option<SelectorCombinator> = None;
    for token in tokenize_selector(selector)? {
        let combinator = match token.as_str() {
            ">" => Some(SelectorCombinator::Child),
            "+" => Some(SelectorCombinator::AdjacentSibling),
            "~" => Some(SelectorCombinator::GeneralSibling),
            _ => None,
        };
        if let Some(combinator) = combinator {
            if pending.is_some() || parts.is_empty() {
                return Err(unsupported(selector));
            }
            pending = Some(combinator);
            continue;
        }

        let step = parse_selector_step(&token)?;
        let combinator = if parts.is_empty() {
            None
        } else {
            Some(pending.take().unwrap_or(SelectorCombinator::Descendant))
        };
        parts.push(SelectorPart { step, combinator });
    }

    if parts.is_empty() || pending.is_some() {
        return Err(unsupported(selector));
    }
    Ok(parts)
}

/// Tracks `[..]` and `(..)` nesting so separators inside them are ignored.
#[derive(Default)]
struct Nesting {
    brackets: usize,
    parens: usize,
}

impl Nesting {
    fn step(&mut self, ch: char, selector: &str) -> Result<()> {
        match ch {
            '[' => self.brackets += 1,
            ']' => self.brackets = self.brackets.checked_sub(1).ok_or_else(|| unsupported(selector))?,
            '(' => self.parens += 1,
            ')' => self.parens = self.parens.checked_sub(1).ok_or_else(|| unsupported(selector))?,
            _ => {}
        }
        Ok(())
    }

    fn at_top(&self) -> bool {
        self.brackets == 0 && self.parens == 0
    }
}

pub(crate) fn split_selector_groups(selector: &str) -> Result<Vec<String>> {
    let mut groups = Vec::new();
    let mut current = String::new();
    let mut nesting = Nesting::default();

    for ch in selector.chars() {
        if ch == ',' && nesting.at_top() {
            let trimmed = current.trim();
            if trimmed.is_empty() {
                return Err(unsupported(selector));
            }
            groups.push(trimmed.to_string());
            current.clear();
            continue;
        }
        nesting.step(ch, selector)?;
        current.push(ch);
    }

    let trimmed = current.trim();
    if !nesting.at_top() || trimmed.is_empty() {
        return Err(unsupported(selector));
    }
    groups.push(trimmed.to_string());
    Ok(groups)
}

pub(crate) fn tokenize_selector(selector: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut nesting = Nesting::default();

    fn flush(current: &mut String, tokens: &mut Vec<String>) {
        let trimmed = current.trim();
        if !trimmed.is_empty() {
            tokens.push(trimmed.to_string());
        }
        current.clear();
    }

    for ch in selector.chars() {
        if nesting.at_top() {
            if matches!(ch, '>' | '+' | '~') {
                flush(&mut current, &mut tokens);
                tokens.push(ch.to_string());
                continue;
            }
            if ch.is_ascii_whitespace() {
                flush(&mut current, &mut tokens);
                continue;
            }
        }
        nesting.step(ch, selector)?;
        current.push(ch);
    }

    if !nesting.at_top() {
        return Err(unsupported(selector));
    }
    flush(&mut current, &mut tokens);
    Ok(tokens)
}

pub(crate) fn parse_selector_step(part: &str) -> Result<SelectorStep> {
    let part = part.trim();
    let bytes = part.as_bytes();
    let mut i = 0usize;
    let mut step = SelectorStep::default();

    while i < bytes.len() {
        match bytes[i] {
            b'*' => {
                if step.universal || step.tag.is_some() {
                    return Err(unsupported(part));
                }
                step.universal = true;
                i += 1;
            }
            b'#' => {
                let (id, next) = parse_selector_ident(part, i + 1).ok_or_else(|| unsupported(part))?;
                if step.id.replace(id).is_some() {
                    return Err(unsupported(part));
                }
                i = next;
            }
            b'.' => {
                let (class_name, next) =
                    parse_selector_ident(part, i + 1).ok_or_else(|| unsupported(part))?;
                step.classes.push(class_name);
                i = next;
            }
            b'[' => {
                let (attr, next) = parse_selector_attr_condition(part, i)?;
                step.attrs.push(attr);
                i = next;
            }
            b':' => {
                let (pseudo, next) = parse_selector_pseudo(part, i)?;
                step.pseudo_classes.push(pseudo);
                i = next;
            }
            _ => {
                if !step.is_blank() {
                    return Err(unsupported(part));
                }
                let (tag, next) = parse_selector_ident(part, i).ok_or_else(|| unsupported(part))?;
                step.tag = Some(tag.to_ascii_lowercase());
                i = next;
            }
        }
    }

    if step.is_blank() {
        return Err(unsupported(part));
    }
    Ok(step)
}

fn parse_selector_pseudo(part: &str, colon: usize) -> Result<(SelectorPseudoClass, usize)> {
    let start = colon + 1;
    let tail = part.get(start..).ok_or_else(|| unsupported(part))?;

    if let Some(rest) = tail.strip_prefix("not(") {
        let close = find_matching_paren(rest).ok_or_else(|| unsupported(part))?;
        let inner = parse_selector_groups(&rest[..close])?;
        let next = start + "not(".len() + close + 1;
        ensure_step_boundary(part, next)?;
        return Ok((SelectorPseudoClass::Not(inner), next));
    }

    for (keyword, pseudo) in KEYWORD_PSEUDO_CLASSES {
        if tail.starts_with(keyword) {
            let next = start + keyword.len();
            if ensure_step_boundary(part, next).is_ok() {
                return Ok((pseudo.clone(), next));
            }
        }
    }
    Err(unsupported(part))
}

fn ensure_step_boundary(part: &str, next: usize) -> Result<()> {
    match part.as_bytes().get(next) {
        None | Some(b'.' | b'#' | b'[' | b':') => Ok(()),
        Some(_) => Err(unsupported(part)),
    }
}

/// Index of the `)` closing a group whose `(` was already consumed.
pub(crate) fn find_matching_paren(body: &str) -> Option<usize> {
    let mut depth = 1usize;
    let mut quote: Option<u8> = None;
    for (idx, b) in body.bytes().enumerate() {
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'\'' | b'"' => quote = Some(b),
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

pub(crate) fn parse_selector_ident(src: &str, start: usize) -> Option<(String, usize)> {
    let bytes = src.as_bytes();
    let mut end = start;
    while end < bytes.len() && is_selector_ident_char(bytes[end]) {
        end += 1;
    }
    if end == start {
        return None;
    }
    Some((src.get(start..end)?.to_string(), end))
}

fn is_selector_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

fn is_selector_attr_name_char(b: u8) -> bool {
    is_selector_ident_char(b) || b == b':'
}

fn skip_selector_ws(bytes: &[u8], i: &mut usize) {
    while *i < bytes.len() && bytes[*i].is_ascii_whitespace() {
        *i += 1;
    }
}

pub(crate) fn parse_selector_attr_condition(
    src: &str,
    open_bracket: usize,
) -> Result<(SelectorAttrCondition, usize)> {
    let bytes = src.as_bytes();
    let mut i = open_bracket + 1;
    skip_selector_ws(bytes, &mut i);

    let key_start = i;
    while i < bytes.len() && is_selector_attr_name_char(bytes[i]) {
        i += 1;
    }
    if key_start == i {
        return Err(unsupported(src));
    }
    let key = src
        .get(key_start..i)
        .ok_or_else(|| unsupported(src))?
        .to_ascii_lowercase();

    skip_selector_ws(bytes, &mut i);
    if bytes.get(i) == Some(&b']') {
        return Ok((SelectorAttrCondition::Exists { key }, i + 1));
    }

    let (operator, width) = match (bytes.get(i), bytes.get(i + 1)) {
        (Some(b'='), _) => (b'=', 1),
        (Some(op @ (b'^' | b'$' | b'*' | b'~' | b'|')), Some(b'=')) => (*op, 2),
        _ => return Err(unsupported(src)),
    };
    i += width;
    skip_selector_ws(bytes, &mut i);

    let (value, next) = parse_selector_attr_value(src, i)?;
    i = next;
    skip_selector_ws(bytes, &mut i);
    if bytes.get(i) != Some(&b']') {
        return Err(unsupported(src));
    }

    let condition = match operator {
        b'=' => SelectorAttrCondition::Eq { key, value },
        b'^' => SelectorAttrCondition::StartsWith { key, value },
        b'$' => SelectorAttrCondition::EndsWith { key, value },
        b'*' => SelectorAttrCondition::Contains { key, value },
        b'~' => SelectorAttrCondition::Includes { key, value },
        _ => SelectorAttrCondition::DashMatch { key, value },
    };
    Ok((condition, i + 1))
}

fn parse_selector_attr_value(src: &str, start: usize) -> Result<(String, usize)> {
    let bytes = src.as_bytes();
    match bytes.get(start) {
        None => Err(unsupported(src)),
        Some(&quote) if quote == b'"' || quote == b'\'' => {
            let mut value = String::new();
            let mut chars = src.get(start + 1..).ok_or_else(|| unsupported(src))?.char_indices();
            while let Some((offset, ch)) = chars.next() {
                match ch {
                    '\\' => {
                        if let Some((_, escaped)) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    ch if ch == char::from(quote) => {
                        return Ok((value, start + 1 + offset + 1));
                    }
                    ch => value.push(ch),
                }
            }
            Err(unsupported(src))
        }
        Some(_) => {
            let mut end = start;
            while end < bytes.len() && !bytes[end].is_ascii_whitespace() && bytes[end] != b']' {
                end += 1;
            }
            let raw = src.get(start..end).ok_or_else(|| unsupported(src))?;
            Ok((raw.to_string(), end))
        }
    }
}
