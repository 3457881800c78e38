//! Read-only tree queries over a channel snapshot.
//!
//! Every walk keeps a visited set, so a corrupted store containing a loop
//! terminates instead of spinning.

use std::collections::{HashMap, HashSet};
use traq_types::{Channel, ChannelId};

/// An immutable snapshot of the channel tree.
#[derive(Debug, Clone, Default)]
pub struct ChannelTree {
    channels: HashMap<ChannelId, Channel>,
    children: HashMap<Option<ChannelId>, Vec<ChannelId>>,
}

impl ChannelTree {
    /// Build a snapshot from a list of channels.
    pub fn new(channels: Vec<Channel>) -> Self {
        let mut children: HashMap<Option<ChannelId>, Vec<ChannelId>> = HashMap::new();
        for channel in &channels {
            children.entry(channel.parent_id).or_default().push(channel.id);
        }
        Self {
            channels: channels.into_iter().map(|c| (c.id, c)).collect(),
            children,
        }
    }

    pub fn get(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(&id)
    }

    pub fn contains(&self, id: ChannelId) -> bool {
        self.channels.contains_key(&id)
    }

    /// Direct children of `id`, or top-level channels for `None`.
    pub fn children(&self, id: Option<ChannelId>) -> &[ChannelId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All descendants of `id`, breadth first, excluding `id` itself.
    pub fn descendants(&self, id: ChannelId) -> Vec<ChannelId> {
        let mut result = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut queue = vec![id];
        while let Some(current) = queue.pop() {
            for child in self.children(Some(current)) {
                if seen.insert(*child) {
                    result.push(*child);
                    queue.push(*child);
                }
            }
        }
        result
    }

    /// Ancestors of `id`, nearest first, excluding `id` itself.
    pub fn ascendants(&self, id: ChannelId) -> Vec<ChannelId> {
        let mut result = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut current = self.channels.get(&id).and_then(|c| c.parent_id);
        while let Some(parent) = current {
            if !seen.insert(parent) {
                break;
            }
            result.push(parent);
            current = self.channels.get(&parent).and_then(|c| c.parent_id);
        }
        result
    }

    /// Depth of `id` counting itself. Top-level channels have depth 1.
    pub fn depth(&self, id: ChannelId) -> usize {
        self.ascendants(id).len() + 1
    }

    /// Height of the subtree rooted at `id`. A leaf has height 1.
    pub fn subtree_depth(&self, id: ChannelId) -> usize {
        let mut max = 1;
        let mut seen = HashSet::from([id]);
        let mut stack = vec![(id, 1usize)];
        while let Some((current, level)) = stack.pop() {
            max = max.max(level);
            for child in self.children(Some(current)) {
                if seen.insert(*child) {
                    stack.push((*child, level + 1));
                }
            }
        }
        max
    }

    /// True if `candidate` is `id` or one of its descendants.
    pub fn is_in_subtree(&self, id: ChannelId, candidate: ChannelId) -> bool {
        candidate == id || self.ascendants(candidate).contains(&id)
    }

    /// Slash-separated path of names from the top level down to `id`.
    pub fn path(&self, id: ChannelId) -> Option<String> {
        let channel = self.channels.get(&id)?;
        let mut names: Vec<&str> = self
            .ascendants(id)
            .iter()
            .filter_map(|a| self.channels.get(a).map(|c| c.name.as_str()))
            .collect();
        names.reverse();
        names.push(&channel.name);
        Some(names.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn chain(len: usize) -> (ChannelTree, Vec<ChannelId>) {
        let creator = Uuid::new_v4();
        let mut channels: Vec<Channel> = Vec::new();
        for i in 0..len {
            let parent = channels.last().map(|c| c.id);
            channels.push(Channel::new(format!("c{}", i), parent, true, creator));
        }
        let ids = channels.iter().map(|c| c.id).collect();
        (ChannelTree::new(channels), ids)
    }

    #[test]
    fn test_chain_queries() {
        let (tree, ids) = chain(4);
        assert_eq!(tree.depth(ids[0]), 1);
        assert_eq!(tree.depth(ids[3]), 4);
        assert_eq!(tree.ascendants(ids[3]), vec![ids[2], ids[1], ids[0]]);
        assert_eq!(tree.descendants(ids[1]).len(), 2);
        assert_eq!(tree.subtree_depth(ids[0]), 4);
        assert_eq!(tree.subtree_depth(ids[3]), 1);
        assert!(tree.is_in_subtree(ids[1], ids[3]));
        assert!(!tree.is_in_subtree(ids[3], ids[1]));
        assert_eq!(tree.path(ids[2]).as_deref(), Some("c0/c1/c2"));
        assert_eq!(tree.children(None), &[ids[0]]);
    }

    #[test]
    fn test_queries_survive_loops() {
        let creator = Uuid::new_v4();
        let mut a = Channel::new("a", None, true, creator);
        let b = Channel::new("b", Some(a.id), true, creator);
        a.parent_id = Some(b.id);
        let tree = ChannelTree::new(vec![a.clone(), b.clone()]);

        assert_eq!(tree.ascendants(a.id), vec![b.id]);
        assert_eq!(tree.descendants(a.id), vec![b.id]);
        assert_eq!(tree.subtree_depth(a.id), 2);
    }
}
