//! Rendering a [`MoveTree`] as nested, linkable movetext.
//!
//! Every token keeps the id of the node it came from, so a click on a move
//! maps straight back to `MoveTree::jump_to` without recomputing anything.

use serde::{Deserialize, Serialize};
use shakmaty::Color;

use crate::error::TreeError;
use crate::game_data::GameHeaders;
use crate::move_tree::{MoveTree, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveToken {
    pub node_id: NodeId,
    pub ply: u32,
    pub move_number: u32,
    pub color: Side,
    pub san: String,
    /// `"12."` before White moves, `"12..."` before a Black move that needs one.
    pub number_prefix: Option<String>,
    pub starting_comment: Option<String>,
    pub comment: Option<String>,
    pub nags: Vec<u8>,
    pub current: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LineItem {
    Move(MoveToken),
    Variation(Line),
}

pub type Line = Vec<LineItem>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedNotation {
    pub headers: GameHeaders,
    pub line: Line,
}

impl RenderedNotation {
    pub fn is_empty(&self) -> bool {
        self.line.is_empty()
    }

    pub fn find(&self, id: NodeId) -> Option<&MoveToken> {
        find_in(&self.line, id)
    }

    pub fn current(&self) -> Option<&MoveToken> {
        self.tokens().into_iter().find(|t| t.current)
    }

    /// All tokens in document order, variations included.
    pub fn tokens(&self) -> Vec<&MoveToken> {
        let mut out = Vec::new();
        collect_tokens(&self.line, &mut out);
        out
    }

    /// Movetext only, e.g. `1. e4 (1. d4) 1... e5`.
    pub fn to_text(&self) -> String {
        let mut parts = Vec::new();
        write_line(&self.line, &mut parts);
        parts.join(" ")
    }

    /// Tag section, blank line, movetext and result token.
    pub fn to_pgn(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.headers.iter() {
            let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
            out.push_str(&format!("[{key} \"{escaped}\"]\n"));
        }
        out.push('\n');

        let text = self.to_text();
        if !text.is_empty() {
            out.push_str(&text);
            out.push(' ');
        }
        out.push_str(self.headers.result());
        out.push('\n');
        out
    }
}

fn find_in(line: &Line, id: NodeId) -> Option<&MoveToken> {
    line.iter().find_map(|item| match item {
        LineItem::Move(token) if token.node_id == id => Some(token),
        LineItem::Move(_) => None,
        LineItem::Variation(inner) => find_in(inner, id),
    })
}

fn collect_tokens<'a>(line: &'a Line, out: &mut Vec<&'a MoveToken>) {
    for item in line {
        match item {
            LineItem::Move(token) => out.push(token),
            LineItem::Variation(inner) => collect_tokens(inner, out),
        }
    }
}

fn write_line(line: &Line, parts: &mut Vec<String>) {
    for item in line {
        match item {
            LineItem::Move(token) => {
                let mut text = String::new();
                if let Some(comment) = &token.starting_comment {
                    text.push_str(&format!("{{{comment}}} "));
                }
                if let Some(prefix) = &token.number_prefix {
                    text.push_str(prefix);
                    text.push(' ');
                }
                text.push_str(&token.san);
                for nag in &token.nags {
                    text.push_str(&format!(" ${nag}"));
                }
                if let Some(comment) = &token.comment {
                    text.push_str(&format!(" {{{comment}}}"));
                }
                parts.push(text);
            }
            LineItem::Variation(inner) => {
                let mut inner_parts = Vec::new();
                write_line(inner, &mut inner_parts);
                parts.push(format!("({})", inner_parts.join(" ")));
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NotationRenderer;

impl NotationRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Render the whole tree. An empty tree gives an empty line.
    pub fn render(&self, tree: &MoveTree) -> Result<RenderedNotation, TreeError> {
        let root = tree.node(tree.root())?;
        let line = match root.main_child() {
            Some(first) => self.render_line(tree, tree.root(), first)?,
            None => Vec::new(),
        };
        Ok(RenderedNotation {
            headers: tree.headers().clone(),
            line,
        })
    }

    /// Render the line that starts with `first` (a child of `parent`) and follows
    /// main-line children from there. Alternatives to each move are nested right
    /// after it.
    fn render_line(
        &self,
        tree: &MoveTree,
        parent: NodeId,
        first: NodeId,
    ) -> Result<Line, TreeError> {
        let mut line = Vec::new();
        let mut parent = parent;
        let mut current = first;
        let mut needs_number = true;

        loop {
            let token = self.token(tree, parent, current, needs_number)?;
            needs_number = token.comment.is_some();
            line.push(LineItem::Move(token));

            let parent_node = tree.node(parent)?;
            if parent_node.main_child() == Some(current) {
                for alternative in parent_node.children().iter().skip(1) {
                    line.push(LineItem::Variation(
                        self.render_line(tree, parent, *alternative)?,
                    ));
                    needs_number = true;
                }
            }

            match tree.node(current)?.main_child() {
                Some(next) => {
                    parent = current;
                    current = next;
                }
                None => break,
            }
        }
        Ok(line)
    }

    fn token(
        &self,
        tree: &MoveTree,
        parent: NodeId,
        id: NodeId,
        needs_number: bool,
    ) -> Result<MoveToken, TreeError> {
        let node = tree.node(id)?;
        let mv = node
            .move_record()
            .ok_or_else(|| TreeError::CorruptTree(format!("node {id} has no move")))?;
        let before = tree.position_at(parent)?;
        let san = tree
            .rules()
            .to_san(&before, mv)
            .map_err(|e| TreeError::CorruptTree(format!("cannot render {id}: {e}")))?;

        let ply = node.ply();
        let color = Side::from(tree.mover_at_ply(ply));
        let move_number = tree.move_number_at_ply(ply);
        let starting_comment = node.starting_comment().map(str::to_string);
        let number_prefix = match color {
            Side::White => Some(format!("{move_number}.")),
            Side::Black if needs_number || starting_comment.is_some() => {
                Some(format!("{move_number}..."))
            }
            Side::Black => None,
        };

        Ok(MoveToken {
            node_id: id,
            ply,
            move_number,
            color,
            san,
            number_prefix,
            starting_comment,
            comment: node.comment().map(str::to_string),
            nags: node.nags().to_vec(),
            current: tree.cursor() == id,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::rules::{MoveRecord, StandardRules};

    fn tree_with(moves: &[&str]) -> MoveTree {
        let mut tree = MoveTree::new_game(Arc::new(StandardRules), None);
        for uci in moves {
            tree.record_move(MoveRecord::from_uci(uci).unwrap()).unwrap();
        }
        tree
    }

    #[test]
    fn test_empty_tree_renders_empty() {
        let tree = tree_with(&[]);
        let rendered = NotationRenderer.render(&tree).unwrap();
        assert!(rendered.is_empty());
        assert_eq!(rendered.to_text(), "");
        assert!(rendered.to_pgn().ends_with("\n*\n"));
    }

    #[test]
    fn test_main_line_numbers() {
        let tree = tree_with(&["e2e4", "e7e5", "g1f3"]);
        let rendered = NotationRenderer.render(&tree).unwrap();
        assert_eq!(rendered.to_text(), "1. e4 e5 2. Nf3");
        assert!(rendered.current().is_some_and(|t| t.san == "Nf3"));
    }

    #[test]
    fn test_root_variation_marked_current() {
        let mut tree = tree_with(&["e2e4"]);
        tree.navigate_back();
        let d4 = tree
            .record_move(MoveRecord::from_uci("d2d4").unwrap())
            .unwrap()
            .id;

        let rendered = NotationRenderer.render(&tree).unwrap();
        assert_eq!(rendered.to_text(), "1. e4 (1. d4)");
        let token = rendered.find(d4).unwrap();
        assert!(token.current);
        assert_eq!(rendered.tokens().iter().filter(|t| t.current).count(), 1);
    }

    #[test]
    fn test_black_resumes_after_variation() {
        let mut tree = tree_with(&["e2e4", "e7e5"]);
        tree.navigate_back();
        tree.record_move(MoveRecord::from_uci("c7c5").unwrap()).unwrap();

        let rendered = NotationRenderer.render(&tree).unwrap();
        assert_eq!(rendered.to_text(), "1. e4 e5 (1... c5)");
    }

    #[test]
    fn test_comment_rendered() {
        let mut tree = tree_with(&["e2e4", "e7e5"]);
        let e4 = tree.main_line()[0];
        tree.set_comment(e4, Some("best by test".into())).unwrap();

        let rendered = NotationRenderer.render(&tree).unwrap();
        assert_eq!(rendered.to_text(), "1. e4 {best by test} 1... e5");
    }

    #[test]
    fn test_starting_comments_survive_import() {
        let game =
            crate::pgn::parse_pgn("{Opening notes} 1. e4 e5 ({Sharper} 1... c5) 2. Nf3 *")
                .unwrap();
        let tree = MoveTree::import_from_linear_game(Arc::new(StandardRules), &game).unwrap();

        let rendered = NotationRenderer.render(&tree).unwrap();
        assert_eq!(
            rendered.to_text(),
            "{Opening notes} 1. e4 e5 ({Sharper} 1... c5) 2. Nf3"
        );
        let reparsed = crate::pgn::parse_pgn(&rendered.to_pgn()).unwrap();
        assert_eq!(reparsed.moves, game.moves);
    }

    #[test]
    fn test_serializes_to_json() {
        let tree = tree_with(&["e2e4"]);
        let rendered = NotationRenderer.render(&tree).unwrap();
        let json = serde_json::to_value(&rendered).unwrap();
        assert_eq!(json["line"][0]["kind"], "move");
        assert_eq!(json["line"][0]["value"]["san"], "e4");
        assert_eq!(json["line"][0]["value"]["color"], "white");
    }
}
