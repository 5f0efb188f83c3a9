// template.rs - Text templates with `{name}` placeholders
//
// The syntax is the small subset the production templates use:
// `{name}` is replaced by the context value called `name`, `{{` and `}}`
// are literal braces. Substitution is single-pass, so a value that itself
// contains `{...}` is emitted verbatim.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::context::Context;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    name:     String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse `text`; `name` is only used in error messages and for
    /// deriving output file names.
    pub fn parse(name: &str, text: &str) -> Result<Self> {
        let malformed = |offset, reason| Error::MalformedTemplate {
            name: name.to_owned(),
            offset,
            reason,
        };

        let mut segments = Vec::new();
        let mut literal  = String::new();
        let mut chars    = text.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' => {
                    if matches!(chars.peek(), Some((_, '{'))) {
                        chars.next();
                        literal.push('{');
                        continue;
                    }
                    let mut key = String::new();
                    let mut closed = false;
                    for (_, k) in chars.by_ref() {
                        if k == '}' { closed = true; break; }
                        key.push(k);
                    }
                    if !closed {
                        return Err(malformed(pos, "unclosed placeholder"));
                    }
                    if key.is_empty() {
                        return Err(malformed(pos, "empty placeholder"));
                    }
                    if !key.chars().all(|k| k.is_ascii_alphanumeric() || k == '_') {
                        return Err(malformed(pos, "invalid placeholder name"));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(key));
                }
                '}' => {
                    if matches!(chars.peek(), Some((_, '}'))) {
                        chars.next();
                        literal.push('}');
                    } else {
                        return Err(malformed(pos, "single `}` outside a placeholder"));
                    }
                }
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { name: name.to_owned(), segments })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Placeholder names in order of first appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for s in &self.segments {
            if let Segment::Placeholder(k) = s {
                if !seen.contains(&k.as_str()) {
                    seen.push(k.as_str());
                }
            }
        }
        seen
    }

    /// First placeholder not present in `context`, if any.
    pub fn first_missing<'a>(&'a self, context: &Context) -> Option<&'a str> {
        self.placeholders().into_iter().find(|k| !context.contains(k))
    }

    /// Substitute every placeholder. Nothing is produced unless all keys
    /// resolve.
    pub fn render(&self, context: &Context) -> Result<String> {
        if let Some(key) = self.first_missing(context) {
            return Err(Error::MissingSubstitutionKey {
                template: self.name.clone(),
                key:      key.to_owned(),
            });
        }
        let mut out = String::new();
        for s in &self.segments {
            match s {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(key) => {
                    if let Some(v) = context.get(key) {
                        out.push_str(&v.to_string());
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Render `template` against `context`.
pub fn render(template: &Template, context: &Context) -> Result<String> {
    template.render(context)
}

/// Read and parse the template at `path`.
pub fn load_template(path: &Path) -> Result<Template> {
    let text = fs::read_to_string(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => Error::TemplateNotFound { path: path.to_path_buf() },
        _ => Error::TemplateUnreadable { path: path.to_path_buf(), source },
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    debug!(template = %path.display(), bytes = text.len(), "loaded template");
    Template::parse(&name, &text)
}

/// File names of the three templates a campaign renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateNames {
    pub init:   String,
    pub config: String,
    pub job:    String,
}

impl TemplateNames {
    pub fn paths(&self, prod_dir: &Path) -> [PathBuf; 3] {
        [
            prod_dir.join(&self.init),
            prod_dir.join(&self.config),
            prod_dir.join(&self.job),
        ]
    }
}

/// The three templates, loaded once per run.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    pub init:   Template,
    pub config: Template,
    pub job:    Template,
    /// Production directory the templates came from.
    pub dir:    PathBuf,
}

impl TemplateSet {
    pub fn load(prod_dir: &Path, names: &TemplateNames) -> Result<Self> {
        let [init, config, job] = names.paths(prod_dir);
        Ok(Self {
            init:   load_template(&init)?,
            config: load_template(&config)?,
            job:    load_template(&job)?,
            dir:    prod_dir.to_path_buf(),
        })
    }
}
