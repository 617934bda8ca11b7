// src/logs/format.rs

//! Line templates.
//!
//! A template is literal text with `{field}` placeholders. A placeholder may
//! truncate its value with `{field:.N}`. `{{` and `}}` are literal braces.
//!
//! Fields: `alloc`, `group`, `task`, `node`, `eval`, `job`, `stream`,
//! `time`, `message`.

use std::fmt::Write as _;
use std::str::FromStr;

use chrono::format::{Item, StrftimeItems};

use super::sink::{LineKind, OutputLine};
use crate::config::settings::DEFAULT_TIME_FORMAT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Alloc,
    Group,
    Task,
    Node,
    Eval,
    Job,
    Stream,
    Time,
    Message,
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "alloc" => Field::Alloc,
            "group" => Field::Group,
            "task" => Field::Task,
            "node" => Field::Node,
            "eval" => Field::Eval,
            "job" => Field::Job,
            "stream" => Field::Stream,
            "time" => Field::Time,
            "message" => Field::Message,
            other => return Err(format!("unknown field '{{{other}}}'")),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Field { field: Field, max: Option<usize> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineTemplate {
    parts: Vec<Part>,
}

impl FromStr for LineTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = s.chars().peekable();

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
                    let mut spec = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => spec.push(c),
                            None => return Err(format!("unclosed '{{' in template '{s}'")),
                        }
                    }
                    if !literal.is_empty() {
                        parts.push(Part::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(parse_placeholder(&spec)?);
                }
                '}' => return Err(format!("unmatched '}}' in template '{s}'")),
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }
        Ok(LineTemplate { parts })
    }
}

fn parse_placeholder(spec: &str) -> Result<Part, String> {
    let (name, max) = match spec.split_once(':') {
        Some((name, precision)) => {
            let digits = precision
                .strip_prefix('.')
                .ok_or_else(|| format!("invalid format spec ':{precision}', expected ':.N'"))?;
            let max = digits
                .parse::<usize>()
                .map_err(|_| format!("invalid precision '{digits}'"))?;
            (name, Some(max))
        }
        None => (spec, None),
    };
    Ok(Part::Field {
        field: name.trim().parse()?,
        max,
    })
}

impl LineTemplate {
    /// Render one line. `time_format` must have passed [`validate_time_format`].
    pub fn render(&self, line: &OutputLine, time_format: &str) -> String {
        let mut out = String::with_capacity(line.message.len() + 32);
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Field { field, max } => {
                    let value = match field {
                        Field::Alloc => line.source.alloc_id.clone(),
                        Field::Group => line.source.group.clone(),
                        Field::Task => line.source.task.clone(),
                        Field::Node => line.source.node.clone(),
                        Field::Eval => line.source.eval_id.clone(),
                        Field::Job => line.source.job_id.clone(),
                        Field::Stream => line.kind.as_str().to_string(),
                        Field::Time => {
                            let mut t = String::new();
                            let _ = write!(
                                t,
                                "{}",
                                line.time.format_with_items(StrftimeItems::new(time_format))
                            );
                            t
                        }
                        Field::Message => line.message.clone(),
                    };
                    match max {
                        Some(n) => out.extend(value.chars().take(*n)),
                        None => out.push_str(&value),
                    }
                }
            }
        }
        out
    }
}

/// Reject strftime strings chrono cannot render.
pub fn validate_time_format(fmt: &str) -> Result<(), String> {
    if StrftimeItems::new(fmt).any(|item| matches!(item, Item::Error)) {
        return Err(format!("invalid strftime format '{fmt}'"));
    }
    Ok(())
}

/// Switches that shape the default line prefixes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefixOptions {
    pub timestamp: bool,
    pub long_alloc: bool,
    pub no_group: bool,
    pub no_task: bool,
    pub only_task: bool,
    pub none: bool,
}

/// The four templates plus the timestamp format they share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineFormats {
    pub alloc: LineTemplate,
    pub stdout: LineTemplate,
    pub stderr: LineTemplate,
    pub eval: LineTemplate,
    pub time_format: String,
}

impl LineFormats {
    pub fn defaults(opts: &PrefixOptions) -> Self {
        let [alloc, stdout, stderr, eval] = default_templates(opts);
        let parse = |t: String| {
            // Built from known fields only.
            t.parse::<LineTemplate>().unwrap_or(LineTemplate {
                parts: vec![Part::Field {
                    field: Field::Message,
                    max: None,
                }],
            })
        };
        Self {
            alloc: parse(alloc),
            stdout: parse(stdout),
            stderr: parse(stderr),
            eval: parse(eval),
            time_format: DEFAULT_TIME_FORMAT.to_string(),
        }
    }

    pub fn template(&self, kind: LineKind) -> &LineTemplate {
        match kind {
            LineKind::Alloc => &self.alloc,
            LineKind::Stdout => &self.stdout,
            LineKind::Stderr => &self.stderr,
            LineKind::Eval => &self.eval,
        }
    }

    pub fn render(&self, line: &OutputLine) -> String {
        self.template(line.kind).render(line, &self.time_format)
    }
}

impl Default for LineFormats {
    fn default() -> Self {
        Self::defaults(&PrefixOptions::default())
    }
}

/// Default template text for `[alloc, stdout, stderr, eval]` lines.
pub fn default_templates(opts: &PrefixOptions) -> [String; 4] {
    let alloc_field = if opts.long_alloc { "{alloc}" } else { "{alloc:.6}" };
    let prefix = if opts.none {
        String::new()
    } else if opts.only_task {
        "{task}:".to_string()
    } else {
        let mut p = format!("{alloc_field}:");
        if !opts.no_group {
            p.push_str("{group}:");
        }
        if !opts.no_task {
            p.push_str("{task}:");
        }
        p
    };
    let (now, alloc_now) = if opts.timestamp {
        ("{time} ", "")
    } else {
        ("", " {time}")
    };
    [
        format!("{now}{prefix}A{alloc_now} {{message}}"),
        format!("{now}{prefix}O {{message}}"),
        format!("{now}{prefix}E {{message}}"),
        format!("{now}{{eval:.6}}:eval {{message}}"),
    ]
}
