//! Placeholder grammar
//!
//! Templates are plain text with `{{Name}}` placeholders and
//! `{{Name}} ... {{/Name}}` blocks. Openers and closers are paired with a
//! stack first, so an opener without a closer stays a plain placeholder and
//! a closer without an opener stays literal text.

use regex::Regex;
use std::sync::OnceLock;

/// A parsed template fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Placeholder(String),
    Block { name: String, body: Vec<Node> },
}

/// Literal form of a placeholder, used when it cannot be substituted.
pub fn placeholder_text(name: &str) -> String {
    format!("{{{{{}}}}}", name)
}

pub fn closer_text(name: &str) -> String {
    format!("{{{{/{}}}}}", name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Text(&'a str),
    Open(&'a str),
    Close(&'a str),
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{(/?)([A-Za-z][A-Za-z0-9_]*)\}\}").expect("tag pattern is valid"))
}

fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut last = 0;

    for caps in tag_pattern().captures_iter(input) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            tokens.push(Token::Text(&input[last..whole.start()]));
        }
        let name = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let is_close = caps.get(1).map(|m| !m.as_str().is_empty()).unwrap_or(false);
        tokens.push(if is_close { Token::Close(name) } else { Token::Open(name) });
        last = whole.end();
    }

    if last < input.len() {
        tokens.push(Token::Text(&input[last..]));
    }
    tokens
}

/// For each opener index, the index of its closer.
///
/// A closer pairs with the nearest open opener of the same name; openers
/// left above it on the stack are abandoned and stay placeholders.
fn match_blocks(tokens: &[Token<'_>]) -> Vec<Option<usize>> {
    let mut matches = vec![None; tokens.len()];
    let mut stack: Vec<(usize, &str)> = Vec::new();

    for (index, token) in tokens.iter().enumerate() {
        match token {
            Token::Open(name) => stack.push((index, *name)),
            Token::Close(name) => {
                if let Some(depth) = stack.iter().rposition(|(_, open)| open == name) {
                    let (open_index, _) = stack[depth];
                    matches[open_index] = Some(index);
                    stack.truncate(depth);
                }
            }
            Token::Text(_) => {}
        }
    }

    matches
}

/// Parse template text into nodes.
pub fn parse(input: &str) -> Vec<Node> {
    let tokens = tokenize(input);
    let matches = match_blocks(&tokens);
    parse_range(&tokens, &matches, 0, tokens.len())
}

fn parse_range(tokens: &[Token<'_>], matches: &[Option<usize>], start: usize, end: usize) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut index = start;

    while index < end {
        match tokens[index] {
            Token::Text(text) => push_text(&mut nodes, text),
            Token::Close(name) => push_text(&mut nodes, &closer_text(name)),
            Token::Open(name) => match matches[index] {
                Some(close) if close < end => {
                    nodes.push(Node::Block {
                        name: name.to_string(),
                        body: parse_range(tokens, matches, index + 1, close),
                    });
                    index = close;
                }
                _ => nodes.push(Node::Placeholder(name.to_string())),
            },
        }
        index += 1;
    }

    nodes
}

fn push_text(nodes: &mut Vec<Node>, text: &str) {
    if let Some(Node::Text(last)) = nodes.last_mut() {
        last.push_str(text);
    } else {
        nodes.push(Node::Text(text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Node {
        Node::Text(s.to_string())
    }

    fn placeholder(s: &str) -> Node {
        Node::Placeholder(s.to_string())
    }

    #[test]
    fn test_parse_placeholders() {
        let nodes = parse("id={{RecordId}}, {{Unknown}}!");
        assert_eq!(nodes, vec![text("id="), placeholder("RecordId"), text(", "), placeholder("Unknown"), text("!")]);
    }

    #[test]
    fn test_parse_nested_blocks() {
        let nodes = parse("{{Records}}[{{RecordFields}}{{FieldId}}{{/RecordFields}}]{{/Records}}");
        assert_eq!(
            nodes,
            vec![Node::Block {
                name: "Records".to_string(),
                body: vec![
                    text("["),
                    Node::Block {
                        name: "RecordFields".to_string(),
                        body: vec![placeholder("FieldId")],
                    },
                    text("]"),
                ],
            }]
        );
    }

    #[test]
    fn test_unmatched_tags() {
        assert_eq!(parse("a{{/Records}}b"), vec![text("a{{/Records}}b")]);

        let nodes = parse("{{Records}}{{RecordId}}{{/Records}}{{Records}}");
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1], placeholder("Records"));
    }

    #[test]
    fn test_abandoned_opener_inside_block() {
        let nodes = parse("{{Records}}{{Components}}x{{/Records}}");
        assert_eq!(
            nodes,
            vec![Node::Block {
                name: "Records".to_string(),
                body: vec![placeholder("Components"), text("x")],
            }]
        );
    }

    #[test]
    fn test_malformed_braces_are_text() {
        assert_eq!(parse("{{ RecordId }} {RecordId}"), vec![text("{{ RecordId }} {RecordId}")]);
    }
}
