//! Monotone access structures over named parties
//!
//! Trees are described with [`AccessNode`] and frozen into an
//! [`AccessStructure`], an arena of nodes addressed by index with the root
//! at index 0. Every node except the root carries a name that is unique in
//! the tree; leaf names are party names.

mod sharing;

pub use sharing::{lagrange_at, lagrange_at_zero, LeafShares, PublicData};

use crate::curve::Curve;
use crate::mpc::wire::Reader;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Index of a node inside an [`AccessStructure`]
pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Leaf,
    And,
    Or,
    Threshold,
}

impl NodeKind {
    fn code(&self) -> u8 {
        match self {
            NodeKind::Leaf => 1,
            NodeKind::And => 2,
            NodeKind::Or => 3,
            NodeKind::Threshold => 4,
        }
    }

    fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(NodeKind::Leaf),
            2 => Ok(NodeKind::And),
            3 => Ok(NodeKind::Or),
            4 => Ok(NodeKind::Threshold),
            other => Err(Error::invalid_argument(
                "access",
                format!("unknown node kind {}", other),
            )),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeKind::Leaf => "LEAF",
            NodeKind::And => "AND",
            NodeKind::Or => "OR",
            NodeKind::Threshold => "THRESHOLD",
        })
    }
}

/// Tree description used to build an [`AccessStructure`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessNode {
    pub kind: NodeKind,
    pub name: String,
    /// Threshold `k`; zero for every other kind
    pub k: usize,
    pub children: Vec<AccessNode>,
}

impl AccessNode {
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Leaf,
            name: name.into(),
            k: 0,
            children: Vec::new(),
        }
    }

    pub fn and(name: impl Into<String>, children: Vec<AccessNode>) -> Self {
        Self {
            kind: NodeKind::And,
            name: name.into(),
            k: 0,
            children,
        }
    }

    pub fn or(name: impl Into<String>, children: Vec<AccessNode>) -> Self {
        Self {
            kind: NodeKind::Or,
            name: name.into(),
            k: 0,
            children,
        }
    }

    pub fn threshold(name: impl Into<String>, k: usize, children: Vec<AccessNode>) -> Self {
        Self {
            kind: NodeKind::Threshold,
            name: name.into(),
            k,
            children,
        }
    }

    fn format(&self, f: &mut fmt::Formatter<'_>, level: usize) -> fmt::Result {
        write!(f, "{:indent$}{}", "", self.kind, indent = level * 2)?;
        if !self.name.is_empty() {
            write!(f, " {}", self.name)?;
        }
        if self.kind == NodeKind::Threshold {
            write!(f, " ({}/{})", self.k, self.children.len())?;
        }
        writeln!(f)?;
        for child in &self.children {
            child.format(f, level + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for AccessNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.format(f, 0)
    }
}

/// Shorthand for [`AccessNode::leaf`]
pub fn leaf(name: impl Into<String>) -> AccessNode {
    AccessNode::leaf(name)
}

/// Unnamed AND node, for use as a root
pub fn and(children: Vec<AccessNode>) -> AccessNode {
    AccessNode::and("", children)
}

/// Unnamed OR node, for use as a root
pub fn or(children: Vec<AccessNode>) -> AccessNode {
    AccessNode::or("", children)
}

/// Unnamed THRESHOLD node, for use as a root
pub fn threshold(k: usize, children: Vec<AccessNode>) -> AccessNode {
    AccessNode::threshold("", k, children)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Node {
    pub kind: NodeKind,
    pub name: String,
    pub k: usize,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
}

/// Validated access tree bound to the curve used for sharing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AccessRepr", into = "AccessRepr")]
pub struct AccessStructure {
    curve: Curve,
    nodes: Vec<Node>,
}

#[derive(Serialize, Deserialize)]
struct AccessRepr {
    curve: Curve,
    root: AccessNode,
}

impl TryFrom<AccessRepr> for AccessStructure {
    type Error = Error;

    fn try_from(repr: AccessRepr) -> Result<Self> {
        AccessStructure::new(repr.curve, &repr.root)
    }
}

impl From<AccessStructure> for AccessRepr {
    fn from(ac: AccessStructure) -> Self {
        AccessRepr {
            curve: ac.curve,
            root: ac.to_node(),
        }
    }
}

impl AccessStructure {
    /// Validate `root` and freeze it
    ///
    /// The root must be unnamed and every other node named, with names unique
    /// across the tree. AND, OR and THRESHOLD nodes need at least one child
    /// and THRESHOLD needs `1 ≤ k ≤ children`.
    pub fn new(curve: Curve, root: &AccessNode) -> Result<Self> {
        if !root.name.is_empty() {
            return Err(Error::invalid_argument("access", "named root node"));
        }
        let mut ac = Self {
            curve,
            nodes: Vec::new(),
        };
        let mut names = BTreeSet::new();
        ac.push(root, None, &mut names)?;
        Ok(ac)
    }

    fn push(
        &mut self,
        node: &AccessNode,
        parent: Option<NodeId>,
        names: &mut BTreeSet<String>,
    ) -> Result<NodeId> {
        let n = node.children.len();
        match node.kind {
            NodeKind::Leaf => {
                if n != 0 {
                    return Err(Error::invalid_argument("access", "leaf node with children"));
                }
                if node.k != 0 {
                    return Err(Error::invalid_argument("access", "threshold on a leaf"));
                }
            }
            NodeKind::And | NodeKind::Or => {
                if n == 0 {
                    return Err(Error::invalid_argument(
                        "access",
                        format!("{} node without children", node.kind),
                    ));
                }
                if node.k != 0 {
                    return Err(Error::invalid_argument(
                        "access",
                        format!("threshold on an {} node", node.kind),
                    ));
                }
            }
            NodeKind::Threshold => {
                if node.k < 1 || node.k > n {
                    return Err(Error::invalid_argument(
                        "access",
                        format!("threshold {} out of range for {} children", node.k, n),
                    ));
                }
            }
        }
        if parent.is_some() {
            if node.name.is_empty() {
                return Err(Error::invalid_argument("access", "unnamed non-root node"));
            }
            if !names.insert(node.name.clone()) {
                return Err(Error::invalid_argument(
                    "access",
                    format!("duplicate node name {}", node.name),
                ));
            }
        }

        let id = self.nodes.len();
        self.nodes.push(Node {
            kind: node.kind,
            name: node.name.clone(),
            k: node.k,
            children: Vec::with_capacity(n),
            parent,
        });
        for child in &node.children {
            let child_id = self.push(child, Some(id), names)?;
            self.nodes[id].children.push(child_id);
        }
        Ok(id)
    }

    pub fn curve(&self) -> Curve {
        self.curve
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.nodes[id].kind
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.nodes[id].name
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    /// Find a node by name
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name)
    }

    /// Find a leaf by name
    pub fn find_leaf(&self, name: &str) -> Option<NodeId> {
        self.find(name)
            .filter(|&id| self.nodes[id].kind == NodeKind::Leaf)
    }

    /// Leaf names in tree order
    pub fn leaf_names(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Leaf)
            .map(|n| n.name.clone())
            .collect()
    }

    pub fn has_leaf(&self, name: &str) -> bool {
        self.find_leaf(name).is_some()
    }

    /// Whether the set of leaf names satisfies the root
    pub fn satisfies<S: AsRef<str>>(&self, names: &[S]) -> bool {
        let set: BTreeSet<&str> = names.iter().map(|s| s.as_ref()).collect();
        self.satisfied(self.root(), &set)
    }

    pub(crate) fn satisfied(&self, id: NodeId, names: &BTreeSet<&str>) -> bool {
        let node = &self.nodes[id];
        match node.kind {
            NodeKind::Leaf => names.contains(node.name.as_str()),
            NodeKind::And => node.children.iter().all(|&c| self.satisfied(c, names)),
            NodeKind::Or => node.children.iter().any(|&c| self.satisfied(c, names)),
            NodeKind::Threshold => {
                node.children
                    .iter()
                    .filter(|&&c| self.satisfied(c, names))
                    .count()
                    >= node.k
            }
        }
    }

    /// Rebuild the description tree
    pub fn to_node(&self) -> AccessNode {
        self.subtree(self.root())
    }

    fn subtree(&self, id: NodeId) -> AccessNode {
        let node = &self.nodes[id];
        AccessNode {
            kind: node.kind,
            name: node.name.clone(),
            k: node.k,
            children: node.children.iter().map(|&c| self.subtree(c)).collect(),
        }
    }

    /// Canonical encoding: curve nid, then nodes depth-first as
    /// `kind ‖ len ‖ name ‖ k ‖ child count`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.curve.nid().to_be_bytes());
        self.encode_node(self.root(), &mut out);
        out
    }

    fn encode_node(&self, id: NodeId, out: &mut Vec<u8>) {
        let node = &self.nodes[id];
        out.push(node.kind.code());
        out.extend_from_slice(&(node.name.len() as u32).to_be_bytes());
        out.extend_from_slice(node.name.as_bytes());
        out.extend_from_slice(&(node.k as u32).to_be_bytes());
        out.extend_from_slice(&(node.children.len() as u32).to_be_bytes());
        for &c in &node.children {
            self.encode_node(c, out);
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let curve = Curve::from_nid(reader.take_u32()?)?;
        let root = decode_node(&mut reader, 0)?;
        reader.finish()?;
        Self::new(curve, &root)
    }
}

const MAX_DEPTH: usize = 64;

fn decode_node(reader: &mut Reader<'_>, depth: usize) -> Result<AccessNode> {
    if depth > MAX_DEPTH {
        return Err(Error::invalid_argument("access", "tree too deep"));
    }
    let kind = NodeKind::from_code(reader.take(1)?[0])?;
    let name = String::from_utf8(reader.take_framed()?.to_vec())
        .map_err(|_| Error::invalid_argument("access", "node name is not UTF-8"))?;
    let k = reader.take_u32()? as usize;
    let n = reader.take_u32()? as usize;
    let mut children = Vec::new();
    for _ in 0..n {
        children.push(decode_node(reader, depth + 1)?);
    }
    Ok(AccessNode {
        kind,
        name,
        k,
        children,
    })
}

impl fmt::Display for AccessStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Curve: {}", self.curve)?;
        write!(f, "{}", self.to_node())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_of_three() -> AccessNode {
        threshold(2, vec![leaf("party_0"), leaf("party_1"), leaf("party_2")])
    }

    fn nested() -> AccessNode {
        and(vec![
            leaf("leaf1"),
            AccessNode::threshold("th", 2, vec![leaf("leaf2"), leaf("leaf3"), leaf("leaf4")]),
        ])
    }

    #[test]
    fn test_display() {
        assert_eq!(
            two_of_three().to_string(),
            "THRESHOLD (2/3)\n  LEAF party_0\n  LEAF party_1\n  LEAF party_2\n"
        );
        let ac = AccessStructure::new(Curve::P256, &nested()).unwrap();
        assert_eq!(
            ac.to_string(),
            "Curve: P-256\nAND\n  LEAF leaf1\n  THRESHOLD th (2/3)\n    LEAF leaf2\n    LEAF leaf3\n    LEAF leaf4\n"
        );
    }

    #[test]
    fn test_validation() {
        let bad_k = threshold(4, vec![leaf("a"), leaf("b"), leaf("c")]);
        assert!(AccessStructure::new(Curve::Secp256k1, &bad_k).is_err());
        let zero_k = threshold(0, vec![leaf("a")]);
        assert!(AccessStructure::new(Curve::Secp256k1, &zero_k).is_err());
        assert!(AccessStructure::new(Curve::Secp256k1, &and(vec![])).is_err());
        let dup = or(vec![leaf("a"), leaf("a")]);
        assert!(AccessStructure::new(Curve::Secp256k1, &dup).is_err());
        let unnamed = and(vec![leaf("a"), or(vec![leaf("b")])]);
        assert!(AccessStructure::new(Curve::Secp256k1, &unnamed).is_err());
        let named_root = AccessNode::and("root", vec![leaf("a")]);
        assert!(AccessStructure::new(Curve::Secp256k1, &named_root).is_err());
    }

    #[test]
    fn test_satisfies() {
        let ac = AccessStructure::new(Curve::P256, &nested()).unwrap();
        assert!(ac.satisfies(&["leaf1", "leaf2", "leaf4"]));
        assert!(!ac.satisfies(&["leaf2", "leaf3", "leaf4"]));
        assert!(!ac.satisfies(&["leaf1", "leaf3"]));
        assert!(!ac.satisfies::<&str>(&[]));
        assert_eq!(ac.leaf_names(), vec!["leaf1", "leaf2", "leaf3", "leaf4"]);
    }

    #[test]
    fn test_arena_links() {
        let ac = AccessStructure::new(Curve::P256, &nested()).unwrap();
        let th = ac.find("th").unwrap();
        assert_eq!(ac.kind(th), NodeKind::Threshold);
        assert_eq!(ac.parent(th), Some(ac.root()));
        let leaf3 = ac.find_leaf("leaf3").unwrap();
        assert_eq!(ac.parent(leaf3), Some(th));
        assert!(ac.find_leaf("th").is_none());
    }

    #[test]
    fn test_bytes_and_serde() {
        let ac = AccessStructure::new(Curve::Secp256k1, &nested()).unwrap();
        let bytes = ac.to_bytes();
        assert_eq!(AccessStructure::from_bytes(&bytes).unwrap(), ac);
        assert!(AccessStructure::from_bytes(&bytes[..bytes.len() - 1]).is_err());

        let json = serde_json::to_string(&ac).unwrap();
        let back: AccessStructure = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ac);
    }
}
