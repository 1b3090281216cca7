//! Decision trees of a boosted stage, stored as index-addressed arenas.

use std::collections::VecDeque;

use serde_json::{json, Value};

use crate::constants::{INTERNAL_NODES, LEAF_VALUES};
use crate::features::{FeatureEvaluator, FeatureUsageMap};

#[derive(Debug, Clone, PartialEq)]
pub enum Split {
    /// Go left when `value <= threshold`.
    Ordered(f32),
    /// Go left when bit `value` is set in the subset words.
    Categorical(Vec<i32>),
}

impl Split {
    pub fn goes_left(&self, value: f32) -> bool {
        match self {
            Self::Ordered(threshold) => value <= *threshold,
            Self::Categorical(subset) => {
                let c = value as i32;
                c >= 0
                    && subset
                        .get((c >> 5) as usize)
                        .is_some_and(|word| word & (1 << (c & 31)) != 0)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TreeNode {
    Split {
        var: usize,
        split: Split,
        left: usize,
        right: usize,
    },
    Leaf(f32),
}

/// Child reference of a breadth-first linearised node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChildRef {
    Node(usize),
    Leaf(f32),
}

/// Split node of the legacy layout, addressed by its breadth-first position.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyNode {
    pub var: usize,
    pub threshold: f32,
    pub left: ChildRef,
    pub right: ChildRef,
}

/// A tree whose root lives at index 0 of `nodes`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Builds a tree from an arena. Every node other than the root must have
    /// exactly one parent and be reachable from the root, so the links can
    /// hold no cycles.
    pub fn from_nodes(nodes: Vec<TreeNode>) -> Result<Self, String> {
        if nodes.is_empty() {
            return Err("tree has no nodes".into());
        }
        let mut parents = vec![0usize; nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            if let TreeNode::Split { left, right, .. } = node {
                if *left >= nodes.len() || *right >= nodes.len() || *left == 0 || *right == 0 {
                    return Err(format!("node {i} links outside the tree"));
                }
                parents[*left] += 1;
                parents[*right] += 1;
            }
        }
        if let Some((i, n)) = parents.iter().enumerate().skip(1).find(|&(_, &n)| n != 1) {
            return Err(format!("node {i} has {n} parents"));
        }

        // With single parents a walk from the root visits each node once.
        let mut reached = 0;
        let mut stack = vec![0usize];
        while let Some(idx) = stack.pop() {
            reached += 1;
            if let TreeNode::Split { left, right, .. } = &nodes[idx] {
                stack.push(*right);
                stack.push(*left);
            }
        }
        if reached != nodes.len() {
            return Err(format!(
                "{} nodes are not reachable from the root",
                nodes.len() - reached
            ));
        }
        Ok(Self { nodes })
    }

    pub fn nodes(&self) -> &[TreeNode] { &self.nodes }

    /// Leaf value reached by the sample bound into `slot`.
    pub fn predict(&self, features: &dyn FeatureEvaluator, slot: usize) -> f32 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf(value) => return *value,
                TreeNode::Split {
                    var,
                    split,
                    left,
                    right,
                } => {
                    idx = if split.goes_left(features.value(*var, slot)) {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn mark_used(&self, usage: &mut FeatureUsageMap) {
        for node in &self.nodes {
            if let TreeNode::Split { var, .. } = node {
                usage.mark(*var);
            }
        }
    }

    /// Highest variable index referenced by a split.
    pub fn max_var(&self) -> Option<usize> {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                TreeNode::Split { var, .. } => Some(*var),
                TreeNode::Leaf(_) => None,
            })
            .max()
    }

    /// Visits split nodes breadth-first from the root, left before right.
    fn bfs_splits(&self) -> impl Iterator<Item = usize> + '_ {
        let mut queue = VecDeque::from([0usize]);
        std::iter::from_fn(move || {
            while let Some(idx) = queue.pop_front() {
                if let TreeNode::Split { left, right, .. } = &self.nodes[idx] {
                    queue.push_back(*left);
                    queue.push_back(*right);
                    return Some(idx);
                }
            }
            None
        })
    }

    /// Current-format node: a flat `internalNodes` list of
    /// `left, right, var, threshold|subset...` and the `leafValues` list.
    ///
    /// Children `> 0` are split indices in breadth-first order, children
    /// `<= 0` are negated leaf indices in emission order.
    pub fn write(&self, usage: &FeatureUsageMap) -> Value {
        // Breadth-first position of every split node.
        let mut position = vec![0usize; self.nodes.len()];
        for (pos, idx) in self.bfs_splits().enumerate() {
            position[idx] = pos;
        }

        let mut internal = Vec::new();
        let mut leaves = Vec::new();
        for idx in self.bfs_splits() {
            let TreeNode::Split {
                var,
                split,
                left,
                right,
            } = &self.nodes[idx]
            else {
                continue;
            };
            for child in [*left, *right] {
                match &self.nodes[child] {
                    TreeNode::Leaf(value) => {
                        internal.push(json!(-(leaves.len() as i64)));
                        leaves.push(json!(value));
                    }
                    TreeNode::Split { .. } => internal.push(json!(position[child])),
                }
            }
            internal.push(json!(usage.remap(*var)));
            match split {
                Split::Ordered(threshold) => internal.push(json!(threshold)),
                Split::Categorical(subset) => internal.extend(subset.iter().map(|w| json!(w))),
            }
        }
        if internal.is_empty() {
            if let Some(TreeNode::Leaf(value)) = self.nodes.first() {
                leaves.push(json!(value));
            }
        }
        json!({ INTERNAL_NODES: internal, LEAF_VALUES: leaves })
    }

    /// Inverse of [`DecisionTree::write`]. Split `k` of the list lands at
    /// arena index `k`, leaves follow the splits.
    pub fn read(node: &Value, max_cat_count: usize) -> Result<Self, String> {
        let internal = node
            .get(INTERNAL_NODES)
            .and_then(Value::as_array)
            .ok_or_else(|| format!("`{INTERNAL_NODES}` is missing"))?;
        let leaves: Vec<f32> = node
            .get(LEAF_VALUES)
            .and_then(Value::as_array)
            .ok_or_else(|| format!("`{LEAF_VALUES}` is missing"))?
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Option<_>>()
            .ok_or("leaf value is not a number")?;

        let subset_words = (max_cat_count + 31) / 32;
        let stride = 3 + if max_cat_count > 0 { subset_words } else { 1 };
        if internal.len() % stride != 0 {
            return Err(format!(
                "{} internal values do not form records of {stride}",
                internal.len()
            ));
        }
        let n_splits = internal.len() / stride;
        if n_splits == 0 {
            return match leaves.as_slice() {
                [value] => Self::from_nodes(vec![TreeNode::Leaf(*value)]),
                _ => Err("a tree without splits needs exactly one leaf".into()),
            };
        }

        let child = |value: &Value| -> Result<usize, String> {
            let r = value.as_i64().ok_or("child reference is not an integer")?;
            if r > 0 {
                let r = r as usize;
                (r < n_splits)
                    .then_some(r)
                    .ok_or_else(|| format!("split reference {r} out of range"))
            } else {
                let leaf = r.unsigned_abs() as usize;
                (leaf < leaves.len())
                    .then_some(n_splits + leaf)
                    .ok_or_else(|| format!("leaf reference {r} out of range"))
            }
        };

        let mut nodes = Vec::with_capacity(n_splits + leaves.len());
        for record in internal.chunks_exact(stride) {
            let var = record[2]
                .as_u64()
                .ok_or("feature index is not a non-negative integer")? as usize;
            let split = if max_cat_count > 0 {
                let subset = record[3..]
                    .iter()
                    .map(|w| w.as_i64().map(|w| w as i32))
                    .collect::<Option<Vec<_>>>()
                    .ok_or("subset word is not an integer")?;
                Split::Categorical(subset)
            } else {
                let threshold = record[3].as_f64().ok_or("threshold is not a number")?;
                Split::Ordered(threshold as f32)
            };
            nodes.push(TreeNode::Split {
                var,
                split,
                left: child(&record[0])?,
                right: child(&record[1])?,
            });
        }
        nodes.extend(leaves.iter().copied().map(TreeNode::Leaf));
        Self::from_nodes(nodes)
    }

    /// Breadth-first re-linearisation for the legacy layout: the root gets
    /// index 0 and each enqueued split child the next running index, so every
    /// reference is either an index of this list or a leaf value.
    pub fn legacy_nodes(&self) -> Vec<LegacyNode> {
        let mut out = Vec::new();
        let mut queue = VecDeque::new();
        let mut next_index = 0usize;
        if matches!(self.nodes.first(), Some(TreeNode::Split { .. })) {
            queue.push_back(0usize);
        }

        while let Some(idx) = queue.pop_front() {
            let TreeNode::Split {
                var,
                split,
                left,
                right,
            } = &self.nodes[idx]
            else {
                continue;
            };
            let mut link = |child: usize| match self.nodes[child] {
                TreeNode::Leaf(value) => ChildRef::Leaf(value),
                TreeNode::Split { .. } => {
                    queue.push_back(child);
                    next_index += 1;
                    ChildRef::Node(next_index)
                }
            };
            let left = link(*left);
            let right = link(*right);
            out.push(LegacyNode {
                var: *var,
                threshold: match split {
                    Split::Ordered(t) => *t,
                    Split::Categorical(_) => 0.0,
                },
                left,
                right,
            });
        }
        out
    }
}
