//! Size breakdown of a serialized tree.
//!
//! [`DiagnosticsReader`] wraps another reader and records the name and
//! encoded size of every object, array and block property it passes through.
//! The logical result of the read is unchanged. Binary streams are measured
//! in bytes and JSON documents in tokens.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::block::{BlockKind, BlockVec};
use super::settings::TreeSerializationSettings;
use super::tree::{SizeUnit, TreeReader, TreeToken};

/// One node of a size breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeDiagnostics {
    pub name: String,
    /// Encoded size in `unit`s.
    pub size: u64,
    #[serde(default)]
    pub unit: SizeUnit,
    pub children: Vec<TreeDiagnostics>,
}

impl TreeDiagnostics {
    /// A node measured in bytes.
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            unit: SizeUnit::Bytes,
            children: Vec::new(),
        }
    }

    /// First direct child with the given name.
    pub fn child(&self, name: &str) -> Option<&TreeDiagnostics> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Render as indented text, descending at most `max_depth` levels below
    /// this node (`None` for no limit).
    pub fn write_text(&self, out: &mut dyn io::Write, max_depth: Option<usize>) -> io::Result<()> {
        let mut text = String::new();
        self.render(&mut text, 0, max_depth);
        out.write_all(text.as_bytes())
    }

    fn render(&self, out: &mut String, depth: usize, max_depth: Option<usize>) {
        out.push_str(&format!(
            "{:indent$}{}  {}\n",
            "",
            self.name,
            format_size(self.size, self.unit),
            indent = depth * 2
        ));
        if max_depth.is_some_and(|max| depth >= max) {
            return;
        }
        for child in &self.children {
            child.render(out, depth + 1, max_depth);
        }
    }
}

impl fmt::Display for TreeDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut text = String::new();
        self.render(&mut text, 0, None);
        f.write_str(&text)
    }
}

fn format_size(size: u64, unit: SizeUnit) -> String {
    let bytes = match unit {
        SizeUnit::Bytes => size,
        SizeUnit::Tokens => return format!("{size} tokens"),
    };
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b >= KB * KB {
        format!("{:.1} MB", b / (KB * KB))
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{bytes} B")
    }
}

struct PendingNode {
    name: String,
    start: u64,
    children: Vec<TreeDiagnostics>,
}

/// A reader that records a [`TreeDiagnostics`] tree while delegating every
/// read to the wrapped reader.
pub struct DiagnosticsReader<'r> {
    inner: Box<dyn TreeReader + 'r>,
    root_name: String,
    root_start: u64,
    children: Vec<TreeDiagnostics>,
    // `None` entries stand for scalar properties, which are not recorded.
    stack: Vec<Option<PendingNode>>,
}

impl<'r> DiagnosticsReader<'r> {
    pub fn new(inner: Box<dyn TreeReader + 'r>, root_name: impl Into<String>) -> Self {
        let root_start = inner.token_position();
        Self {
            inner,
            root_name: root_name.into(),
            root_start,
            children: Vec::new(),
            stack: Vec::new(),
        }
    }

    /// Finish and return the collected tree. Call after the read completes.
    pub fn into_diagnostics(self) -> TreeDiagnostics {
        TreeDiagnostics {
            name: self.root_name,
            size: self.inner.token_position().saturating_sub(self.root_start),
            unit: self.inner.position_unit(),
            children: self.children,
        }
    }
}

impl TreeReader for DiagnosticsReader<'_> {
    fn settings(&self) -> &TreeSerializationSettings {
        self.inner.settings()
    }

    fn token(&self) -> TreeToken {
        self.inner.token()
    }

    fn token_position(&self) -> u64 {
        self.inner.token_position()
    }

    fn position_unit(&self) -> SizeUnit {
        self.inner.position_unit()
    }

    fn expect(&mut self, token: TreeToken) -> Result<()> {
        self.inner.expect(token)
    }

    fn read_property_name(&mut self) -> Result<String> {
        self.inner.read_property_name()
    }

    fn read_string(&mut self) -> Result<String> {
        self.inner.read_string()
    }

    fn read_i64(&mut self) -> Result<i64> {
        self.inner.read_i64()
    }

    fn read_f64(&mut self) -> Result<f64> {
        self.inner.read_f64()
    }

    fn read_bool(&mut self) -> Result<bool> {
        self.inner.read_bool()
    }

    fn read_block(&mut self, kind: BlockKind) -> Result<BlockVec> {
        self.inner.read_block(kind)
    }

    fn skip(&mut self) -> Result<()> {
        self.inner.skip()
    }

    fn begin_property(&mut self, name: &str) {
        let node = match self.inner.token() {
            TreeToken::StartObject | TreeToken::StartArray | TreeToken::BlockArray => {
                Some(PendingNode {
                    name: name.to_string(),
                    start: self.inner.token_position(),
                    children: Vec::new(),
                })
            }
            _ => None,
        };
        self.stack.push(node);
    }

    fn end_property(&mut self) {
        let Some(Some(node)) = self.stack.pop() else {
            return;
        };
        let finished = TreeDiagnostics {
            name: node.name,
            size: self.inner.token_position().saturating_sub(node.start),
            unit: self.inner.position_unit(),
            children: node.children,
        };
        match self.stack.iter_mut().rev().find_map(Option::as_mut) {
            Some(parent) => parent.children.push(finished),
            None => self.children.push(finished),
        }
    }
}
