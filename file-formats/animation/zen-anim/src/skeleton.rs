//! Skeleton assets: named bone hierarchy with a rest pose
//!
//! Bones are stored parent-first, so a single forward pass over the node list
//! is enough to derive model-space matrices.

use glam::Mat4;

use crate::error::{AnimError, Result};

/// Name of the root bone used for facing direction
pub const ROOT_BONE: &str = "BIP01";

/// A single bone of a skeleton
#[derive(Debug, Clone, PartialEq)]
pub struct SkeletonNode {
    /// Bone name, unique within the skeleton
    pub name: String,
    /// Parent bone index (`None` for root bones)
    pub parent: Option<usize>,
    /// Rest-pose transform relative to the parent
    pub rest: Mat4,
}

impl SkeletonNode {
    /// Create a bone with the given parent and rest transform
    pub fn new<S: Into<String>>(name: S, parent: Option<usize>, rest: Mat4) -> Self {
        Self {
            name: name.into(),
            parent,
            rest,
        }
    }
}

/// Named, ordered bone list
#[derive(Debug, Clone, PartialEq)]
pub struct Skeleton {
    name: String,
    nodes: Vec<SkeletonNode>,
    root_nodes: Vec<usize>,
    collision_height: f32,
}

impl Skeleton {
    /// Build a skeleton from its bones
    ///
    /// Every parent index must refer to an earlier bone.
    pub fn new<S: Into<String>>(name: S, nodes: Vec<SkeletonNode>) -> Result<Self> {
        let mut root_nodes = Vec::new();
        for (i, node) in nodes.iter().enumerate() {
            match node.parent {
                None => root_nodes.push(i),
                Some(parent) if parent < i => {}
                Some(parent) => {
                    return Err(AnimError::ParseError(format!(
                        "bone '{}' ({i}) references parent {parent} that does not precede it",
                        node.name
                    )));
                }
            }
        }

        Ok(Self {
            name: name.into(),
            nodes,
            root_nodes,
            collision_height: 0.0,
        })
    }

    /// Set the collision height used for overhead display positions
    pub fn with_collision_height(mut self, height: f32) -> Self {
        self.collision_height = height;
        self
    }

    /// Skeleton (model) name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All bones, parent-first
    pub fn nodes(&self) -> &[SkeletonNode] {
        &self.nodes
    }

    /// Indices of bones without a parent
    pub fn root_nodes(&self) -> &[usize] {
        &self.root_nodes
    }

    /// Number of bones
    pub fn bone_count(&self) -> usize {
        self.nodes.len()
    }

    /// Collision height of the model
    pub fn collision_height(&self) -> f32 {
        self.collision_height
    }

    /// Resolve a bone name to its index
    pub fn find_node(&self, name: &str) -> Option<usize> {
        if name.is_empty() {
            return None;
        }
        self.nodes.iter().position(|n| n.name == name)
    }

    /// Name of the bone at `index`
    pub fn node_name(&self, index: usize) -> Option<&str> {
        self.nodes.get(index).map(|n| n.name.as_str())
    }

    /// Model-space matrices of the rest pose
    pub fn rest_pose(&self) -> Vec<Mat4> {
        let local: Vec<Mat4> = self.nodes.iter().map(|n| n.rest).collect();
        let mut out = vec![Mat4::IDENTITY; local.len()];
        self.to_model_space(&local, &mut out);
        out
    }

    /// Compose local bone transforms into model space
    pub fn to_model_space(&self, local: &[Mat4], out: &mut [Mat4]) {
        for (i, node) in self.nodes.iter().enumerate() {
            let Some(&m) = local.get(i) else {
                break;
            };
            out[i] = match node.parent {
                Some(parent) => out[parent] * m,
                None => m,
            };
        }
    }
}
