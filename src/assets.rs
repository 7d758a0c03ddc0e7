use crate::error::AssetError;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

const INCLUDE_PREFIX: &str = "#include ";
const REDIS_OPEN: &str = "{{#redis}}";
const REDIS_CLOSE: &str = "{{/redis}}";

/// A file compiled into the binary
#[derive(Debug, Clone, Copy)]
pub struct Resource {
    pub body: &'static [u8],
    pub content_type: &'static str,
}

/// Look up an embedded file by name
pub fn resource(name: &str) -> Option<Resource> {
    let (body, content_type): (&'static [u8], &'static str) = match name {
        "index.html" => (
            include_bytes!("../assets/index.html"),
            "text/html; charset=utf-8",
        ),
        "style.css" => (include_bytes!("../assets/style.css"), "text/css"),
        "robots.txt" => (include_bytes!("../assets/robots.txt"), "text/plain"),
        "humans.txt" => (include_bytes!("../assets/humans.txt"), "text/plain"),
        "favicon.ico" => (include_bytes!("../assets/favicon.ico"), "image/x-icon"),
        _ => return None,
    };
    Some(Resource { body, content_type })
}

/// Values substituted into the index page
#[derive(Debug, Clone)]
pub struct PageData<'a> {
    pub hostname: &'a str,
    pub version: &'a str,
    pub redis: bool,
}

/// Expands `#include` lines in text resources, caching each expansion
#[derive(Debug, Default)]
pub struct Assets {
    expanded: Mutex<HashMap<String, String>>,
}

impl Assets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `name` with every `#include <file>` line replaced by that file.
    /// Included files are inserted verbatim, so they cannot include others.
    pub fn expand(&self, name: &str) -> Result<String, AssetError> {
        if let Some(cached) = self.expanded.lock().get(name) {
            return Ok(cached.clone());
        }

        let source = text(name)?;
        let mut output = String::with_capacity(source.len());
        for line in source.lines() {
            match line.strip_prefix(INCLUDE_PREFIX) {
                Some(include) => {
                    debug!("Expanding #include {} in {}", include.trim(), name);
                    output.push_str(text(include.trim())?);
                }
                None => {
                    output.push_str(line);
                    output.push('\n');
                }
            }
        }

        self.expanded
            .lock()
            .insert(name.to_string(), output.clone());
        Ok(output)
    }

    /// Render the front page for a request addressed to `page.hostname`
    pub fn render_index(&self, page: &PageData<'_>) -> Result<String, AssetError> {
        let template = self.expand("index.html")?;
        Ok(render(&template, page))
    }
}

fn text(name: &str) -> Result<&'static str, AssetError> {
    resource(name)
        .and_then(|r| std::str::from_utf8(r.body).ok())
        .ok_or_else(|| AssetError::NotFound(name.to_string()))
}

fn render(template: &str, page: &PageData<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(REDIS_OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + REDIS_OPEN.len()..];
        match after_open.find(REDIS_CLOSE) {
            Some(end) => {
                if page.redis {
                    out.push_str(&after_open[..end]);
                }
                rest = &after_open[end + REDIS_CLOSE.len()..];
            }
            // Unterminated section runs to the end of the page
            None => {
                if page.redis {
                    out.push_str(after_open);
                }
                rest = "";
            }
        }
    }
    out.push_str(rest);

    out.replace("{{hostname}}", &escape_html(page.hostname))
        .replace("{{version}}", &escape_html(page.version))
}

fn escape_html(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
