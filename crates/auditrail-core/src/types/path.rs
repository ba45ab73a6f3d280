//! Log file naming
//!
//! File locations are built from templates with placeholders:
//! - `{app_type}` - the configured application type
//! - `{hostname}` - the local host name
//! - `{pid}` - the current process id
//! - `{time:<strftime>}` - the UTC time a fresh file is minted, chrono syntax
//!
//! `{{` and `}}` produce literal braces.

use crate::config::DestinationConfig;
use crate::error::{AuditError, Result};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    AppType,
    Hostname,
    Pid,
    Time(String),
}

/// Values substituted into path templates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateContext {
    pub app_type: String,
    pub hostname: String,
    pub pid: u32,
}

impl TemplateContext {
    /// Context for this process on this host
    pub fn detect(app_type: impl Into<String>) -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "localhost".to_string());

        Self {
            app_type: app_type.into(),
            hostname,
            pid: std::process::id(),
        }
    }
}

/// A parsed path template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(AuditError::Template(format!(
                            "unterminated placeholder in '{}'",
                            template
                        )));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Self::placeholder(template, &name)?);
                }
                '}' => {
                    return Err(AuditError::Template(format!(
                        "unmatched '}}' in '{}'",
                        template
                    )));
                }
                _ => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    fn placeholder(template: &str, name: &str) -> Result<Segment> {
        match name {
            "app_type" => Ok(Segment::AppType),
            "hostname" => Ok(Segment::Hostname),
            "pid" => Ok(Segment::Pid),
            _ => match name.strip_prefix("time:") {
                Some(format) => {
                    let invalid = format.is_empty()
                        || StrftimeItems::new(format).any(|item| matches!(item, Item::Error));
                    if invalid {
                        return Err(AuditError::Template(format!(
                            "invalid time format '{}' in '{}'",
                            format, template
                        )));
                    }
                    Ok(Segment::Time(format.to_string()))
                }
                None => Err(AuditError::Template(format!(
                    "unknown placeholder '{{{}}}' in '{}'",
                    name, template
                ))),
            },
        }
    }

    /// Whether the template renders to an empty string
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether the rendered value depends on the time
    pub fn is_time_bucketed(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, Segment::Time(_)))
    }

    pub fn render(&self, context: &TemplateContext, now: DateTime<Utc>) -> String {
        let mut out = String::with_capacity(self.source.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::AppType => out.push_str(&context.app_type),
                Segment::Hostname => out.push_str(&context.hostname),
                Segment::Pid => out.push_str(&context.pid.to_string()),
                Segment::Time(format) => out.push_str(&now.format(format).to_string()),
            }
        }
        out
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Resolved location of one log file
///
/// Fixed for the whole life of an open file; a new one is minted only when a
/// fresh file is opened.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuditPath {
    directory: PathBuf,
    file_name: String,
    resolved: PathBuf,
}

impl AuditPath {
    pub fn new(directory: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        let directory = directory.into();
        let file_name = file_name.into();
        let resolved = directory.join(&file_name);
        Self {
            directory,
            file_name,
            resolved,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Full path of the file
    pub fn resolved(&self) -> &Path {
        &self.resolved
    }

    /// Same location with a sequence number before the extension
    ///
    /// `audit.log` becomes `audit.<n>.log`; `audit` becomes `audit.<n>`.
    pub fn with_sequence(&self, n: u32) -> Self {
        let file_name = match self.file_name.rfind('.') {
            Some(dot) if dot > 0 => format!(
                "{}.{}{}",
                &self.file_name[..dot],
                n,
                &self.file_name[dot..]
            ),
            _ => format!("{}.{}", self.file_name, n),
        };
        Self::new(self.directory.clone(), file_name)
    }
}

impl fmt::Display for AuditPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resolved.display())
    }
}

/// Templates for the directory, bucketing subdirectory and file name
#[derive(Debug, Clone)]
pub struct AuditPathTemplate {
    directory: PathTemplate,
    subdirectory: Option<PathTemplate>,
    file_name: PathTemplate,
    context: TemplateContext,
}

impl AuditPathTemplate {
    pub fn new(
        directory: PathTemplate,
        subdirectory: Option<PathTemplate>,
        file_name: PathTemplate,
        context: TemplateContext,
    ) -> Result<Self> {
        if directory.is_empty() {
            return Err(AuditError::Template("directory template is empty".into()));
        }
        if file_name.is_empty() {
            return Err(AuditError::Template("file name template is empty".into()));
        }
        Ok(Self {
            directory,
            subdirectory: subdirectory.filter(|t| !t.is_empty()),
            file_name,
            context,
        })
    }

    pub fn from_config(config: &DestinationConfig) -> Result<Self> {
        let subdirectory = if config.subdirectory.trim().is_empty() {
            None
        } else {
            Some(PathTemplate::parse(&config.subdirectory)?)
        };

        Self::new(
            PathTemplate::parse(&config.directory)?,
            subdirectory,
            PathTemplate::parse(&config.file_name_template)?,
            TemplateContext::detect(config.app_type.clone()),
        )
    }

    pub fn context(&self) -> &TemplateContext {
        &self.context
    }

    /// Resolve the path of a file opened at `now`
    pub fn resolve(&self, now: DateTime<Utc>) -> AuditPath {
        let mut directory = PathBuf::from(self.directory.render(&self.context, now));
        if let Some(subdirectory) = &self.subdirectory {
            directory.push(subdirectory.render(&self.context, now));
        }
        AuditPath::new(directory, self.file_name.render(&self.context, now))
    }
}
