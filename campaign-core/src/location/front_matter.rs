//! Splitting and joining `---` fenced metadata blocks.
//!
//! The body returned by [`split`] is a sub-slice of the input, so writing it back
//! with [`join`] reproduces the prose byte-for-byte.

/// A narrative document split into its metadata block and prose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Document<'a> {
    /// Raw text between the fences, without the fence lines.
    pub front_matter: Option<&'a str>,
    /// Everything after the closing fence line.
    pub body: &'a str,
}

/// Split a document. Without a well-formed block the whole input is the body.
pub fn split(content: &str) -> Document<'_> {
    let rest = match content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
    {
        Some(rest) => rest,
        None => {
            return Document {
                front_matter: None,
                body: content,
            }
        }
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(|c: char| c == '\n' || c == '\r') == "---" {
            return Document {
                front_matter: Some(&rest[..offset]),
                body: &rest[offset + line.len()..],
            };
        }
        offset += line.len();
    }

    // unterminated block
    Document {
        front_matter: None,
        body: content,
    }
}

/// Prefix `body` with a fenced block holding `front_matter`.
pub fn join(front_matter: &str, body: &str) -> String {
    let mut out = String::with_capacity(front_matter.len() + body.len() + 8);
    out.push_str("---\n");
    out.push_str(front_matter);
    if !front_matter.is_empty() && !front_matter.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("---\n");
    out.push_str(body);
    out
}
