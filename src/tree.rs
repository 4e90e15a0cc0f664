/// Plain-text outline used for terminal summaries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Tree {
    nodes: Vec<Node>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Node {
    pub(crate) level: usize,
    pub(crate) text: String,
}

impl Tree {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, text: impl Into<String>) -> &mut Self {
        self.add_at(text, 0)
    }

    pub(crate) fn add_at(&mut self, text: impl Into<String>, level: usize) -> &mut Self {
        self.nodes.push(Node {
            level,
            text: text.into(),
        });
        self
    }

    #[cfg(test)]
    pub(crate) fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Render with two spaces of indent per level. Multi-line node text keeps
    /// the indent of its node.
    pub(crate) fn render(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            let indent = "  ".repeat(node.level);
            let mut lines = node.text.lines();
            let first = lines.next().unwrap_or_default();
            out.push_str(&format!("{indent}- {first}\n"));
            for line in lines {
                out.push_str(&format!("{indent}  {line}\n"));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_indents_by_level() {
        let mut tree = Tree::new();
        tree.add("Rule Execution").add_at("Rules executed: 3", 1);

        assert_eq!(tree.render(), "- Rule Execution\n  - Rules executed: 3\n");
    }

    #[test]
    fn render_keeps_continuation_lines_aligned() {
        let mut tree = Tree::new();
        tree.add_at("Message: first\nsecond", 1);

        assert_eq!(tree.render(), "  - Message: first\n    second\n");
    }

    #[test]
    fn empty_node_renders_bare_bullet() {
        let mut tree = Tree::new();
        tree.add("");

        assert_eq!(tree.render(), "- \n");
    }
}
