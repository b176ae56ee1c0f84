//! Bounded FIFO of prior-window text fragments used as decoding context.

use std::collections::VecDeque;

use crate::utterance::PromptNode;

/// An ordered FIFO of [`PromptNode`]s with head-first eviction.
///
/// The segmenter pushes one node per processed utterance fragment and, at the
/// start of every window, trims the buffer to the prompt token budget. Evicted
/// nodes are permanently gone; there is no way to restore them.
#[derive(Debug, Default)]
pub struct PromptBuffer {
    nodes: VecDeque<PromptNode>,
    total_tokens: usize,
}

impl PromptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node at the tail.
    pub fn push(&mut self, node: PromptNode) {
        self.total_tokens += node.token_count;
        self.nodes.push_back(node);
    }

    /// Evict nodes from the head until the remaining total token count fits
    /// within `budget`, then return the remaining nodes' text concatenated in
    /// original order.
    pub fn read_and_trim(&mut self, budget: usize) -> String {
        while self.total_tokens > budget {
            let Some(evicted) = self.nodes.pop_front() else {
                break;
            };
            self.total_tokens -= evicted.token_count;
        }

        self.nodes.iter().map(|node| node.text.as_str()).collect()
    }

    /// Empty the buffer unconditionally (context reset after a discarded window).
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.total_tokens = 0;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The summed token cost of all buffered nodes.
    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(text: &str, token_count: usize) -> PromptNode {
        PromptNode {
            text: text.to_string(),
            token_count,
        }
    }

    #[test]
    fn read_within_budget_keeps_everything() {
        let mut buffer = PromptBuffer::new();
        buffer.push(node("a", 2));
        buffer.push(node("b", 3));

        assert_eq!(buffer.read_and_trim(10), "ab");
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn trims_oldest_nodes_until_the_budget_fits() {
        let mut buffer = PromptBuffer::new();
        buffer.push(node("oldest", 5));
        buffer.push(node("middle", 5));
        buffer.push(node("newest", 5));

        // 15 > 8, drop "oldest" (10 > 8), drop "middle" (5 <= 8), stop.
        assert_eq!(buffer.read_and_trim(8), "newest");
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.total_tokens(), 5);

        // The evicted nodes are gone: a wider budget does not bring them back.
        assert_eq!(buffer.read_and_trim(100), "newest");
    }

    #[test]
    fn a_single_over_budget_node_is_evicted_too() {
        let mut buffer = PromptBuffer::new();
        buffer.push(node("huge", 50));

        assert_eq!(buffer.read_and_trim(8), "");
        assert!(buffer.is_empty());
    }

    #[test]
    fn clear_empties_the_buffer() {
        let mut buffer = PromptBuffer::new();
        buffer.push(node("a", 1));
        buffer.clear();

        assert!(buffer.is_empty());
        assert_eq!(buffer.total_tokens(), 0);
        assert_eq!(buffer.read_and_trim(10), "");
    }
}
