//! Elements - the values render functions produce.
//!
//! An element is either a reference to another component (to be recursively
//! materialized) or a primitive description (an opaque kind tag plus props
//! and child elements). Elements are transient: rebuilt on every render and
//! folded into the persistent structures immediately afterwards.
//!
//! Component identity is the render *function pointer*. Components are a
//! closed pair of (pure render fn, prop record) rather than trait objects;
//! two descriptions have the same type identity iff they carry the same
//! function.

use crate::error::EngineError;
use crate::hooks::Scope;
use crate::types::Props;

// =============================================================================
// Render functions
// =============================================================================

/// A pure shallow-render function: props + hook scope in, element out.
///
/// Render functions must be synchronous and non-blocking; long-running work
/// belongs in a background task spawned from an effect (see [`crate::task`]).
pub type RenderFn = fn(&Props, &mut Scope<'_>) -> Result<Element, EngineError>;

/// The type identity of a component: a render function plus a display name.
///
/// Equality ignores the name - the function pointer is the identity that
/// decides instance reuse.
#[derive(Clone, Copy)]
pub struct ComponentType {
    name: &'static str,
    render: RenderFn,
}

impl ComponentType {
    /// Define a component type.
    pub const fn new(name: &'static str, render: RenderFn) -> Self {
        Self { name, render }
    }

    /// Display name, used in diagnostics and errors.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The render function.
    pub fn render(&self) -> RenderFn {
        self.render
    }
}

impl PartialEq for ComponentType {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::fn_addr_eq(self.render, other.render)
    }
}

impl Eq for ComponentType {}

impl std::fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ComponentType({})", self.name)
    }
}

// =============================================================================
// Descriptions
// =============================================================================

/// An immutable description of a component occurrence: type identity plus a
/// prop record and an optional reconciliation key.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDesc {
    pub ty: ComponentType,
    pub props: Props,
    pub key: Option<String>,
}

impl ComponentDesc {
    /// Describe a component occurrence.
    pub fn new(ty: ComponentType, props: Props) -> Self {
        Self {
            ty,
            props,
            key: None,
        }
    }

    /// Attach an explicit reconciliation key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// An immutable description of a drawable primitive: opaque kind tag, props,
/// optional key, and ordered child elements.
///
/// The catalogue of kinds and their visual semantics belong to the drawing
/// backend; the core only copies kinds through and compares them for
/// equality.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveDesc {
    pub kind: &'static str,
    pub props: Props,
    pub key: Option<String>,
    pub children: Vec<Element>,
}

impl PrimitiveDesc {
    /// Describe a primitive with no children.
    pub fn new(kind: &'static str, props: Props) -> Self {
        Self {
            kind,
            props,
            key: None,
            children: Vec::new(),
        }
    }

    /// Attach child elements.
    pub fn with_children(mut self, children: Vec<Element>) -> Self {
        self.children = children;
        self
    }

    /// Attach an explicit reconciliation key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// The value a render call returns: a component reference or a primitive.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Component(ComponentDesc),
    Primitive(PrimitiveDesc),
}

impl From<ComponentDesc> for Element {
    fn from(desc: ComponentDesc) -> Self {
        Element::Component(desc)
    }
}

impl From<PrimitiveDesc> for Element {
    fn from(desc: PrimitiveDesc) -> Self {
        Element::Primitive(desc)
    }
}

/// Shorthand for a component element.
pub fn component(ty: ComponentType, props: Props) -> Element {
    Element::Component(ComponentDesc::new(ty, props))
}

/// Shorthand for a childless primitive element.
pub fn primitive(kind: &'static str, props: Props) -> Element {
    Element::Primitive(PrimitiveDesc::new(kind, props))
}

// =============================================================================
// Primitive tree - materialized output
// =============================================================================

/// A node of the fully materialized primitive tree.
///
/// No component references remain; this is what the reconciler compares and
/// what the drawing backend ultimately retains.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveNode {
    pub kind: &'static str,
    pub key: Option<String>,
    pub props: Props,
    pub children: Vec<PrimitiveNode>,
}

impl PrimitiveNode {
    /// Render the subtree as an indented debug listing.
    pub fn debug_tree(&self) -> String {
        let mut out = String::new();
        self.write_debug(&mut out, 0);
        out
    }

    fn write_debug(&self, out: &mut String, depth: usize) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push_str(self.kind);
        if let Some(key) = &self.key {
            out.push_str(&format!(" key={key}"));
        }
        for (name, value) in self.props.iter() {
            out.push_str(&format!(" {name}={value:?}"));
        }
        out.push('\n');
        for child in &self.children {
            child.write_debug(out, depth + 1);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn render_a(_: &Props, _: &mut Scope<'_>) -> Result<Element, EngineError> {
        Ok(primitive("text", Props::new()))
    }

    fn render_b(_: &Props, _: &mut Scope<'_>) -> Result<Element, EngineError> {
        Ok(primitive("text", Props::new()))
    }

    #[test]
    fn test_component_type_identity() {
        let a1 = ComponentType::new("A", render_a);
        let a2 = ComponentType::new("AliasOfA", render_a);
        let b = ComponentType::new("B", render_b);

        assert_eq!(a1, a2);
        assert_ne!(a1, b);
    }

    #[test]
    fn test_component_desc_key() {
        let desc = ComponentDesc::new(ComponentType::new("A", render_a), Props::new())
            .with_key("row-3");
        assert_eq!(desc.key.as_deref(), Some("row-3"));
    }

    #[test]
    fn test_debug_tree_indents_children() {
        let tree = PrimitiveNode {
            kind: "box",
            key: None,
            props: Props::new(),
            children: vec![PrimitiveNode {
                kind: "text",
                key: None,
                props: Props::new().with("content", Value::from("hi")),
                children: vec![],
            }],
        };

        let dump = tree.debug_tree();
        assert!(dump.starts_with("box\n"));
        assert!(dump.contains("  text content="));
    }
}
