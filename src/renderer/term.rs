//! Reference terminal backend built on crossterm.
//!
//! Keeps a retained copy of the primitive tree, applies each patch script
//! to it, and redraws the whole screen line by line. Deliberately simple:
//! every `text` node occupies one row in depth-first order, a `box` node
//! only groups its children. It exists so the engine is runnable end to
//! end; anything resembling layout belongs to a real backend.

use std::io::{self, Write};

use crossterm::style::{Attribute, Print, SetAttribute};
use crossterm::terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute, queue};

use crate::element::PrimitiveNode;
use crate::reconciler::{apply_patch, PatchScript};
use crate::renderer::Backend;
use crate::types::Attr;

pub struct TermBackend {
    out: io::Stdout,
    tree: Option<PrimitiveNode>,
    active: bool,
}

impl TermBackend {
    /// Enter the alternate screen in raw mode. The terminal is restored
    /// on drop.
    pub fn new() -> io::Result<Self> {
        let mut out = io::stdout();
        terminal::enable_raw_mode()?;
        execute!(out, EnterAlternateScreen, cursor::Hide)?;
        Ok(Self {
            out,
            tree: None,
            active: true,
        })
    }

    fn redraw(&mut self) -> io::Result<()> {
        queue!(self.out, Clear(ClearType::All), cursor::MoveTo(0, 0))?;
        let mut row: u16 = 0;
        if let Some(tree) = self.tree.clone() {
            self.draw_node(&tree, &mut row)?;
        }
        self.out.flush()
    }

    fn draw_node(&mut self, node: &PrimitiveNode, row: &mut u16) -> io::Result<()> {
        if node.kind == "text" {
            queue!(self.out, cursor::MoveTo(0, *row))?;
            for attribute in attributes_of(node) {
                queue!(self.out, SetAttribute(attribute))?;
            }
            let content = node.props.get("content").and_then(|v| v.as_str()).unwrap_or("");
            queue!(self.out, Print(content), SetAttribute(Attribute::Reset))?;
            *row = row.saturating_add(1);
        }
        for child in &node.children {
            self.draw_node(child, row)?;
        }
        Ok(())
    }
}

impl Backend for TermBackend {
    fn apply(&mut self, script: &PatchScript) -> io::Result<()> {
        apply_patch(&mut self.tree, script);
        if !script.is_empty() {
            self.redraw()?;
        }
        Ok(())
    }
}

impl Drop for TermBackend {
    fn drop(&mut self) {
        if self.active {
            // Restoration errors at teardown have nowhere to go.
            let _ = execute!(self.out, cursor::Show, LeaveAlternateScreen);
            let _ = terminal::disable_raw_mode();
            self.active = false;
        }
    }
}

fn attributes_of(node: &PrimitiveNode) -> Vec<Attribute> {
    let bits = node
        .props
        .get("attrs")
        .and_then(|v| v.as_int())
        .unwrap_or(0);
    let attrs = Attr::from_bits_truncate(bits as u8);
    let mut out = Vec::new();
    if attrs.contains(Attr::BOLD) {
        out.push(Attribute::Bold);
    }
    if attrs.contains(Attr::DIM) {
        out.push(Attribute::Dim);
    }
    if attrs.contains(Attr::ITALIC) {
        out.push(Attribute::Italic);
    }
    if attrs.contains(Attr::UNDERLINE) {
        out.push(Attribute::Underlined);
    }
    if attrs.contains(Attr::INVERSE) {
        out.push(Attribute::Reverse);
    }
    if attrs.contains(Attr::STRIKETHROUGH) {
        out.push(Attribute::CrossedOut);
    }
    out
}

// =============================================================================
// Tests
// =============================================================================
