use anyhow::{Context, Result, bail};
use std::collections::HashMap;
use std::path::Path;

use crate::error::CtmcResult;
use crate::io::json::read_to_string;
use crate::tree::Tree;

/// Rooted topology parsed from a Newick string.
///
/// Nodes are numbered in preorder from the root (node 0); edge `i` leads
/// into node `i + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewickTopology {
    pub node_count: usize,
    pub edges: Vec<(usize, usize)>,
    pub lengths: Vec<Option<f64>>,
    pub labels: HashMap<String, usize>,
}

impl NewickTopology {
    pub fn to_tree(&self) -> CtmcResult<Tree> {
        Tree::new(self.node_count, self.edges.clone())
    }

    /// Edge lengths, if every edge carries one.
    pub fn complete_lengths(&self) -> Option<Vec<f64>> {
        self.lengths.iter().copied().collect()
    }
}

pub fn read_newick(path: &Path) -> Result<NewickTopology> {
    let text = read_to_string(path)?;
    parse_newick(&text).with_context(|| format!("failed to parse Newick {:?}", path))
}

struct Cursor<'a> {
    chars: Vec<char>,
    pos: usize,
    src: &'a str,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    /// Skip whitespace and bracketed comments.
    fn skip_blank(&mut self) -> Result<()> {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += 1;
            } else if c == '[' {
                let start = self.pos;
                while self.peek().is_some_and(|c| c != ']') {
                    self.pos += 1;
                }
                if self.peek().is_none() {
                    bail!("unterminated comment starting at offset {start}");
                }
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(())
    }

    fn label(&mut self) -> Result<Option<String>> {
        self.skip_blank()?;
        let mut out = String::new();
        if self.peek() == Some('\'') {
            self.pos += 1;
            loop {
                match self.peek() {
                    None => bail!("unterminated quoted label in {:?}", self.src),
                    Some('\'') => {
                        self.pos += 1;
                        // doubled quote is a literal quote
                        if self.peek() == Some('\'') {
                            out.push('\'');
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                    Some(c) => {
                        out.push(c);
                        self.pos += 1;
                    }
                }
            }
            return Ok(Some(out));
        }
        while let Some(c) = self.peek() {
            if "(),:;[".contains(c) || c.is_whitespace() {
                break;
            }
            out.push(c);
            self.pos += 1;
        }
        Ok((!out.is_empty()).then_some(out))
    }

    fn length(&mut self) -> Result<Option<f64>> {
        self.skip_blank()?;
        if self.peek() != Some(':') {
            return Ok(None);
        }
        self.pos += 1;
        self.skip_blank()?;
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || "+-.eE".contains(c))
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let value: f64 = text
            .parse()
            .with_context(|| format!("bad branch length {text:?} at offset {start}"))?;
        if !value.is_finite() || value < 0.0 {
            bail!("branch length {value} at offset {start} must be finite and nonnegative");
        }
        Ok(Some(value))
    }
}

/// Parse one `;`-terminated Newick tree without recursion.
pub fn parse_newick(text: &str) -> Result<NewickTopology> {
    let mut cur = Cursor {
        chars: text.chars().collect(),
        pos: 0,
        src: text,
    };
    let mut parents: Vec<Option<usize>> = Vec::new();
    let mut lengths: Vec<Option<f64>> = Vec::new();
    let mut labels: HashMap<String, usize> = HashMap::new();
    let mut open: Vec<usize> = Vec::new();
    let mut expect_node = true;

    let mut annotate = |cur: &mut Cursor, node: usize, lengths: &mut Vec<Option<f64>>| -> Result<()> {
        if let Some(label) = cur.label()? {
            if labels.insert(label.clone(), node).is_some() {
                bail!("duplicate label {label:?}");
            }
        }
        lengths[node] = cur.length()?;
        Ok(())
    };

    loop {
        cur.skip_blank()?;
        let Some(c) = cur.peek() else {
            bail!("missing ';' terminator");
        };
        if expect_node {
            let id = parents.len();
            if id > 0 && open.is_empty() {
                bail!("unexpected content after the root at offset {}", cur.pos);
            }
            parents.push(open.last().copied());
            lengths.push(None);
            if c == '(' {
                open.push(id);
                cur.pos += 1;
            } else {
                annotate(&mut cur, id, &mut lengths)?;
                expect_node = false;
            }
            continue;
        }
        match c {
            ',' => {
                if open.is_empty() {
                    bail!("',' outside parentheses at offset {}", cur.pos);
                }
                cur.pos += 1;
                expect_node = true;
            }
            ')' => {
                let Some(id) = open.pop() else {
                    bail!("unbalanced ')' at offset {}", cur.pos);
                };
                cur.pos += 1;
                annotate(&mut cur, id, &mut lengths)?;
            }
            ';' => {
                if !open.is_empty() {
                    bail!("{} unclosed '('", open.len());
                }
                cur.pos += 1;
                break;
            }
            other => bail!("unexpected {other:?} at offset {}", cur.pos),
        }
    }
    cur.skip_blank()?;
    if cur.peek().is_some() {
        bail!("trailing content after ';' at offset {}", cur.pos);
    }

    let node_count = parents.len();
    let mut edges = Vec::with_capacity(node_count.saturating_sub(1));
    let mut edge_lengths = Vec::with_capacity(node_count.saturating_sub(1));
    for (child, parent) in parents.iter().enumerate() {
        if let Some(parent) = parent {
            edges.push((*parent, child));
            edge_lengths.push(lengths[child]);
        }
    }
    Ok(NewickTopology {
        node_count,
        edges,
        lengths: edge_lengths,
        labels,
    })
}
