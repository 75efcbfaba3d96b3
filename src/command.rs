//! What gets sent to each host.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;

use handlebars::Handlebars;

use crate::error::{DispatchError, Result};
use crate::host::HostRecord;

/// Path value that means "read the commands from standard input".
pub const STDIN_SENTINEL: &str = "-";

/// Either one ad hoc command or an ordered script of command lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSource {
    Single(String),
    Script(Vec<String>),
}

impl CommandSource {
    /// Loads a script from `path`, or from standard input when `path` is `-`.
    ///
    /// The input is read in full before it is split into lines.
    pub fn from_path(path: &str, trim: bool) -> Result<Self> {
        Self::from_path_with(path, trim, std::io::stdin())
    }

    /// Like `from_path`, with `stdin` standing in for standard input. It is only read for `-`.
    pub fn from_path_with<R: Read>(path: &str, trim: bool, stdin: R) -> Result<Self> {
        if path == STDIN_SENTINEL {
            Self::from_reader(stdin, trim)
        } else {
            Self::from_reader(File::open(path)?, trim)
        }
    }

    pub fn from_reader<R: Read>(mut reader: R, trim: bool) -> Result<Self> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Ok(Self::from_text(&text, trim))
    }

    /// Splits `text` into lines in order. Line terminators are kept unless `trim` is set, in which
    /// case all trailing whitespace goes.
    pub fn from_text(text: &str, trim: bool) -> Self {
        let lines = text
            .split_inclusive('\n')
            .map(|line| {
                if trim {
                    line.trim_end().to_string()
                } else {
                    line.to_string()
                }
            })
            .collect();
        Self::Script(lines)
    }

    /// Command lines in the order they are sent.
    pub fn lines(&self) -> &[String] {
        match self {
            Self::Single(command) => std::slice::from_ref(command),
            Self::Script(lines) => lines,
        }
    }

    pub fn is_script(&self) -> bool {
        matches!(self, Self::Script(_))
    }
}

/// Creates the template registry a unit uses for its command lines.
pub fn template_registry() -> Handlebars<'static> {
    let mut registry = Handlebars::new();
    registry.register_escape_fn(handlebars::no_escape);
    handlebars_misc_helpers::register(&mut registry);
    registry
}

/// Fills host fields into `line` when it is a template. Plain lines are returned as is.
///
/// Available fields: `name`, `group`, `model`, `address`.
pub fn render_line(registry: &mut Handlebars, line: &str, host: &HostRecord) -> Result<String> {
    if !line.contains("{{") {
        return Ok(line.to_string());
    }
    if !registry.has_template(line) {
        registry
            .register_template_string(line, line)
            .map_err(|e| DispatchError::Template(e.to_string()))?;
    }
    let mut params = BTreeMap::new();
    params.insert("name", host.name.clone());
    params.insert("group", host.group.clone().unwrap_or_default());
    params.insert("model", host.model.clone());
    params.insert("address", host.address().to_string());
    registry
        .render(line, &params)
        .map_err(|e| DispatchError::Template(e.to_string()))
}
