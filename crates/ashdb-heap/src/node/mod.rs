//! Tree node variants held by the heap.

mod branch;
mod leaf;

pub use branch::{BranchEntry, TreeBranch};
pub use leaf::TreeLeaf;

use ashdb_common::{AshError, Result};

/// Kind of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Branch,
    Leaf,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Branch => f.write_str("branch"),
            NodeKind::Leaf => f.write_str("leaf"),
        }
    }
}

/// A tree node: either a branch or a leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeNode {
    Branch(TreeBranch),
    Leaf(TreeLeaf),
}

impl TreeNode {
    /// Returns the node kind.
    pub fn kind(&self) -> NodeKind {
        match self {
            TreeNode::Branch(_) => NodeKind::Branch,
            TreeNode::Leaf(_) => NodeKind::Leaf,
        }
    }

    /// Copies this node, re-bounding branches to `max_branch` children and
    /// leaves to `max_leaf` bytes.
    pub fn copy_bounded(&self, max_branch: usize, max_leaf: usize) -> Result<TreeNode> {
        match self {
            TreeNode::Branch(b) => Ok(TreeNode::Branch(TreeBranch::copy_bounded(b, max_branch))),
            TreeNode::Leaf(l) => Ok(TreeNode::Leaf(TreeLeaf::copy_bounded(l, max_leaf)?)),
        }
    }

    /// Estimated resident size in bytes, excluding heap bookkeeping.
    pub fn memory_footprint(&self) -> u64 {
        match self {
            TreeNode::Branch(b) => b.memory_footprint(),
            TreeNode::Leaf(l) => l.memory_footprint(),
        }
    }

    /// Returns the branch, or `TypeMismatch` for a leaf.
    pub fn as_branch(&self) -> Result<&TreeBranch> {
        match self {
            TreeNode::Branch(b) => Ok(b),
            TreeNode::Leaf(_) => Err(mismatch(NodeKind::Branch, NodeKind::Leaf)),
        }
    }

    /// Returns the branch mutably, or `TypeMismatch` for a leaf.
    pub fn as_branch_mut(&mut self) -> Result<&mut TreeBranch> {
        match self {
            TreeNode::Branch(b) => Ok(b),
            TreeNode::Leaf(_) => Err(mismatch(NodeKind::Branch, NodeKind::Leaf)),
        }
    }

    /// Returns the leaf, or `TypeMismatch` for a branch.
    pub fn as_leaf(&self) -> Result<&TreeLeaf> {
        match self {
            TreeNode::Leaf(l) => Ok(l),
            TreeNode::Branch(_) => Err(mismatch(NodeKind::Leaf, NodeKind::Branch)),
        }
    }

    /// Returns the leaf mutably, or `TypeMismatch` for a branch.
    pub fn as_leaf_mut(&mut self) -> Result<&mut TreeLeaf> {
        match self {
            TreeNode::Leaf(l) => Ok(l),
            TreeNode::Branch(_) => Err(mismatch(NodeKind::Leaf, NodeKind::Branch)),
        }
    }
}

fn mismatch(expected: NodeKind, actual: NodeKind) -> AshError {
    AshError::TypeMismatch {
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}
