use trellis_dom::is_void_element;

use crate::error::TemplateError;
use crate::template_ast::{Node, TemplateAttr};

/// Hand-rolled markup parser with support for:
/// - nested elements, self-closing tags (`<input/>`) and void elements
/// - quoted, unquoted and valueless attributes, including `data-bind:text`
/// - comments and `<!doctype>` (skipped), basic character entities
///
/// Whitespace-only text is dropped. Mismatched or unclosed tags are errors.
pub fn parse_template_to_ast(input: &str) -> Result<Vec<Node>, TemplateError> {
    let bytes = input.as_bytes();
    let mut i = 0usize;
    let mut stack: Vec<Node> = Vec::new();
    let mut roots: Vec<Node> = Vec::new();

    fn push_child(stack: &mut [Node], roots: &mut Vec<Node>, node: Node) {
        if let Some(Node::Element { children, .. }) = stack.last_mut() {
            children.push(node);
        } else {
            roots.push(node);
        }
    }

    while i < bytes.len() {
        if bytes[i] != b'<' {
            let start = i;
            while i < bytes.len() && bytes[i] != b'<' {
                i += 1;
            }
            let text = &input[start..i];
            if !is_all_ws(text) {
                push_child(&mut stack, &mut roots, Node::Text(decode_entities(text)));
            }
            continue;
        }

        if input[i..].starts_with("<!--") {
            let start = i;
            match input[i + 4..].find("-->") {
                Some(end) => i += 4 + end + 3,
                None => return Err(TemplateError::UnterminatedComment { offset: start }),
            }
            continue;
        }

        if input[i..].starts_with("<!") {
            // doctype and friends
            while i < bytes.len() && bytes[i] != b'>' {
                i += 1;
            }
            i += 1;
            continue;
        }

        // closing tag
        if bytes.get(i + 1) == Some(&b'/') {
            let offset = i;
            i += 2;
            let tag = read_ident(bytes, &mut i).to_ascii_lowercase();
            skip_ws(bytes, &mut i);
            if bytes.get(i) == Some(&b'>') {
                i += 1;
            }
            match stack.pop() {
                Some(node) if node.tag() == Some(tag.as_str()) => {
                    push_child(&mut stack, &mut roots, node);
                }
                _ => return Err(TemplateError::UnexpectedClosingTag { tag, offset }),
            }
            continue;
        }

        // opening or self-closing tag
        let offset = i;
        i += 1;
        let tag = read_ident(bytes, &mut i).to_ascii_lowercase();
        if tag.is_empty() {
            return Err(TemplateError::MissingTagName { offset });
        }
        let mut attrs: Vec<TemplateAttr> = Vec::new();
        let mut self_closing = false;
        let mut closed = false;

        while i < bytes.len() {
            skip_ws(bytes, &mut i);
            match bytes.get(i) {
                None => break,
                Some(b'/') => {
                    self_closing = true;
                    i += 1;
                }
                Some(b'>') => {
                    i += 1;
                    closed = true;
                    break;
                }
                Some(_) => match read_attribute(input, &mut i)? {
                    Some(attr) => attrs.push(attr),
                    // skip unknown token
                    None => i += 1,
                },
            }
        }
        if !closed {
            return Err(TemplateError::UnclosedTag { tag });
        }

        let node = Node::Element {
            tag: tag.clone(),
            attrs,
            children: Vec::new(),
            self_closing,
        };
        if self_closing || is_void_element(&tag) {
            push_child(&mut stack, &mut roots, node);
        } else {
            stack.push(node);
        }
    }

    if let Some(Node::Element { tag, .. }) = stack.pop() {
        return Err(TemplateError::UnclosedTag { tag });
    }

    Ok(roots)
}

fn is_all_ws(s: &str) -> bool {
    s.chars().all(|c| c.is_whitespace())
}

fn skip_ws(bytes: &[u8], i: &mut usize) {
    while *i < bytes.len() && bytes[*i].is_ascii_whitespace() {
        *i += 1;
    }
}

fn read_ident<'a>(bytes: &'a [u8], i: &mut usize) -> &'a str {
    let start = *i;
    while *i < bytes.len() {
        let c = bytes[*i];
        if c.is_ascii_alphanumeric() || c == b'_' || c == b'-' {
            *i += 1;
        } else {
            break;
        }
    }
    std::str::from_utf8(&bytes[start..*i]).unwrap_or_default()
}

fn is_name_byte(c: u8) -> bool {
    !(c.is_ascii_whitespace() || matches!(c, b'=' | b'>' | b'/' | b'"' | b'\'' | b'<'))
}

fn read_attribute(input: &str, i: &mut usize) -> Result<Option<TemplateAttr>, TemplateError> {
    let bytes = input.as_bytes();
    let name_start = *i;
    while *i < bytes.len() && is_name_byte(bytes[*i]) {
        *i += 1;
    }
    if *i == name_start {
        return Ok(None);
    }
    let name = input[name_start..*i].to_string();

    skip_ws(bytes, i);
    let mut value: Option<String> = None;
    if bytes.get(*i) == Some(&b'=') {
        *i += 1;
        skip_ws(bytes, i);
        value = Some(read_value(input, i)?);
    }

    Ok(Some(TemplateAttr::new(name, value)))
}

fn read_value(input: &str, i: &mut usize) -> Result<String, TemplateError> {
    let bytes = input.as_bytes();
    match bytes.get(*i) {
        Some(&quote) if quote == b'"' || quote == b'\'' => {
            let offset = *i;
            *i += 1;
            let start = *i;
            while *i < bytes.len() && bytes[*i] != quote {
                *i += 1;
            }
            if *i >= bytes.len() {
                return Err(TemplateError::UnterminatedQuote { offset });
            }
            let raw = &input[start..*i];
            *i += 1; // consume closing quote
            Ok(decode_entities(raw))
        }
        _ => {
            let start = *i;
            while *i < bytes.len() && !bytes[*i].is_ascii_whitespace() && bytes[*i] != b'>' {
                *i += 1;
            }
            Ok(decode_entities(&input[start..*i]))
        }
    }
}

fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let decoded = rest.find(';').and_then(|end| {
            let ch = match &rest[1..end] {
                "amp" => '&',
                "lt" => '<',
                "gt" => '>',
                "quot" => '"',
                "apos" | "#39" => '\'',
                "nbsp" => '\u{a0}',
                _ => return None,
            };
            Some((ch, end + 1))
        });
        match decoded {
            Some((ch, len)) => {
                out.push(ch);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entities_are_decoded() {
        assert_eq!(decode_entities("a &amp; b &lt;c&gt;"), "a & b <c>");
        assert_eq!(decode_entities("AT&T"), "AT&T");
        assert_eq!(decode_entities("&bogus; x"), "&bogus; x");
    }
}
