use super::*;

/// Parses rendered markup into a [`Dom`].
///
/// Only what component output needs is supported: elements, void tags,
/// comments, declarations, raw-text `script`/`style` and character
/// references. Unbalanced end tags close up to the nearest matching open
/// element, as browsers do.
pub(crate) fn parse_html(html: &str) -> Result<Dom> {
    let mut dom = Dom::new();
    let mut stack = vec![dom.root];
    let bytes = html.as_bytes();
    let mut i = 0usize;

    while i < bytes.len() {
        if starts_with_at(bytes, i, b"<!--") {
            let end = find_subslice(bytes, i + 4, b"-->")
                .ok_or_else(|| Error::HtmlParse("unclosed HTML comment".into()))?;
            i = end + 3;
            continue;
        }

        if bytes[i] == b'<' && bytes.get(i + 1) == Some(&b'/') {
            let (tag, next) = parse_end_tag(html, i)?;
            i = next;
            if let Some(pos) = stack
                .iter()
                .rposition(|node| dom.tag_name(*node) == Some(tag.as_str()))
            {
                stack.truncate(pos.max(1));
            }
            continue;
        }

        if bytes[i] == b'<' && bytes.get(i + 1) == Some(&b'!') {
            i = parse_declaration_tag(html, i)?;
            continue;
        }

        if bytes[i] == b'<' && bytes.get(i + 1).is_some_and(u8::is_ascii_alphabetic) {
            let (tag, attrs, self_closing, next) = parse_start_tag(html, i)?;
            i = next;
            let parent = *stack
                .last()
                .ok_or_else(|| Error::HtmlParse("missing parent element".into()))?;
            let node = dom.create_element(parent, tag.clone(), attrs);

            if is_raw_text_tag(&tag) && !self_closing {
                let close = find_case_insensitive_raw_end_tag(bytes, i, tag.as_bytes())
                    .ok_or_else(|| Error::HtmlParse(format!("unclosed <{tag}>")))?;
                if let Some(body) = html.get(i..close).filter(|body| !body.is_empty()) {
                    dom.create_text(node, body.to_string());
                }
                let (_, after_end) = parse_end_tag(html, close)?;
                i = after_end;
                continue;
            }

            if !self_closing && !is_void_tag(&tag) {
                stack.push(node);
            }
            continue;
        }

        // A lone '<' that does not start a tag is text.
        let text_start = i;
        i += 1;
        while i < bytes.len() && bytes[i] != b'<' {
            i += 1;
        }
        let text = html
            .get(text_start..i)
            .ok_or_else(|| Error::HtmlParse("invalid text boundary".into()))?;
        let parent = *stack
            .last()
            .ok_or_else(|| Error::HtmlParse("missing parent element".into()))?;
        let decoded = decode_html_character_references(text);
        if !decoded.is_empty() {
            append_text(&mut dom, parent, decoded);
        }
    }

    Ok(dom)
}

/// Adjacent text runs (split by comments or stray '<') merge into one node.
fn append_text(dom: &mut Dom, parent: NodeId, text: String) {
    if let Some(last) = dom.nodes[parent.0].children.last().copied() {
        if let NodeType::Text(existing) = &mut dom.nodes[last.0].node_type {
            existing.push_str(&text);
            return;
        }
    }
    dom.create_text(parent, text);
}

fn parse_start_tag(html: &str, at: usize) -> Result<(String, HashMap<String, String>, bool, usize)> {
    let bytes = html.as_bytes();
    let mut i = at + 1;
    let tag_start = i;
    while i < bytes.len() && is_tag_char(bytes[i]) {
        i += 1;
    }
    let tag = html
        .get(tag_start..i)
        .ok_or_else(|| Error::HtmlParse("invalid tag name".into()))?
        .to_ascii_lowercase();
    if tag.is_empty() {
        return Err(Error::HtmlParse("empty tag name".into()));
    }

    let mut attrs = HashMap::new();
    loop {
        skip_ws(bytes, &mut i);
        match bytes.get(i) {
            None => return Err(Error::HtmlParse(format!("unclosed start tag <{tag}"))),
            Some(b'>') => return Ok((tag, attrs, false, i + 1)),
            Some(b'/') if bytes.get(i + 1) == Some(&b'>') => {
                return Ok((tag, attrs, true, i + 2));
            }
            Some(b) if !is_attr_name_char(*b) => {
                // Skip junk up to the next attribute boundary.
                while i < bytes.len()
                    && !bytes[i].is_ascii_whitespace()
                    && bytes[i] != b'>'
                    && !(bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'>'))
                {
                    i += 1;
                }
                continue;
            }
            Some(_) => {}
        }

        let name_start = i;
        while i < bytes.len() && is_attr_name_char(bytes[i]) {
            i += 1;
        }
        let name = html
            .get(name_start..i)
            .ok_or_else(|| Error::HtmlParse("invalid attribute name".into()))?
            .to_ascii_lowercase();

        skip_ws(bytes, &mut i);
        let value = if bytes.get(i) == Some(&b'=') {
            i += 1;
            skip_ws(bytes, &mut i);
            parse_attr_value(html, &mut i)?
        } else {
            String::new()
        };
        // First occurrence wins, as in browsers.
        attrs.entry(name).or_insert(value);
    }
}

fn parse_attr_value(html: &str, i: &mut usize) -> Result<String> {
    let bytes = html.as_bytes();
    let Some(&first) = bytes.get(*i) else {
        return Err(Error::HtmlParse("missing attribute value".into()));
    };

    let (start, end, next) = if first == b'"' || first == b'\'' {
        let start = *i + 1;
        let end = find_subslice(bytes, start, &[first])
            .ok_or_else(|| Error::HtmlParse("unclosed quoted attribute value".into()))?;
        (start, end, end + 1)
    } else {
        let start = *i;
        let mut end = start;
        while end < bytes.len()
            && !bytes[end].is_ascii_whitespace()
            && bytes[end] != b'>'
            && !(bytes[end] == b'/' && bytes.get(end + 1) == Some(&b'>'))
        {
            end += 1;
        }
        (start, end, end)
    };

    let raw = html
        .get(start..end)
        .ok_or_else(|| Error::HtmlParse("invalid attribute value".into()))?;
    *i = next;
    Ok(decode_html_character_references(raw))
}

fn parse_end_tag(html: &str, at: usize) -> Result<(String, usize)> {
    let bytes = html.as_bytes();
    let mut i = at + 2;
    skip_ws(bytes, &mut i);
    let tag_start = i;
    while i < bytes.len() && is_tag_char(bytes[i]) {
        i += 1;
    }
    let tag = html
        .get(tag_start..i)
        .ok_or_else(|| Error::HtmlParse("invalid end tag".into()))?
        .to_ascii_lowercase();
    let close = find_subslice(bytes, i, b">")
        .ok_or_else(|| Error::HtmlParse(format!("unclosed end tag </{tag}")))?;
    Ok((tag, close + 1))
}

fn parse_declaration_tag(html: &str, at: usize) -> Result<usize> {
    let bytes = html.as_bytes();
    let mut quote: Option<u8> = None;
    let mut bracket_depth = 0usize;
    for (offset, &b) in bytes.iter().enumerate().skip(at + 2) {
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'\'' | b'"' => quote = Some(b),
            b'[' => bracket_depth += 1,
            b']' => bracket_depth = bracket_depth.saturating_sub(1),
            b'>' if bracket_depth == 0 => return Ok(offset + 1),
            _ => {}
        }
    }
    Err(Error::HtmlParse("unclosed declaration tag".into()))
}

pub(crate) fn decode_html_character_references(src: &str) -> String {
    if !src.contains('&') {
        return src.to_string();
    }

    let mut out = String::with_capacity(src.len());
    let mut rest = src;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp + 1..];
        let decoded = tail.find(';').and_then(|semicolon| {
            let name = &tail[..semicolon];
            if name.is_empty() || name.len() > 32 || !name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '#') {
                return None;
            }
            decode_reference(name).map(|ch| (ch, semicolon))
        });
        match decoded {
            Some((ch, semicolon)) => {
                out.push(ch);
                rest = &tail[semicolon + 1..];
            }
            None => {
                out.push('&');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_reference(name: &str) -> Option<char> {
    if let Some(numeric) = name.strip_prefix('#') {
        let codepoint = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse::<u32>().ok()?,
        };
        return char::from_u32(codepoint);
    }
    let ch = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{00A0}',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        "hellip" => '…',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "laquo" => '«',
        "raquo" => '»',
        "times" => '×',
        "divide" => '÷',
        "euro" => '€',
        "middot" => '·',
        _ => return None,
    };
    Some(ch)
}

fn skip_ws(bytes: &[u8], i: &mut usize) {
    while *i < bytes.len() && bytes[*i].is_ascii_whitespace() {
        *i += 1;
    }
}

fn is_tag_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-'
}

pub(crate) fn is_attr_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.' | b'@')
}

pub(crate) fn is_void_tag(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

pub(crate) fn is_raw_text_tag(tag: &str) -> bool {
    matches!(tag, "script" | "style")
}

fn starts_with_at(bytes: &[u8], at: usize, needle: &[u8]) -> bool {
    bytes
        .get(at..at + needle.len())
        .is_some_and(|window| window == needle)
}

fn find_subslice(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || from > bytes.len() {
        return None;
    }
    bytes[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| from + pos)
}

fn find_case_insensitive_raw_end_tag(bytes: &[u8], from: usize, tag: &[u8]) -> Option<usize> {
    let mut i = from;
    while let Some(open) = find_subslice(bytes, i, b"</") {
        let name_start = open + 2;
        let matches_tag = bytes
            .get(name_start..name_start + tag.len())
            .is_some_and(|name| name.eq_ignore_ascii_case(tag));
        let at_boundary = bytes
            .get(name_start + tag.len())
            .is_none_or(|b| !b.is_ascii_alphanumeric());
        if matches_tag && at_boundary {
            return Some(open);
        }
        i = open + 2;
    }
    None
}
