use epub_pager::{MarkupTokenizer, MemoryStore, NodeType, Position, SlidingWindow};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Node {
    Text(String),
    Comment(String),
    Empty(String, Vec<(String, String)>),
    Element(String, Vec<(String, String)>, Vec<Node>),
}

fn render(node: &Node, out: &mut String) {
    match node {
        Node::Text(text) => out.push_str(text),
        Node::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        Node::Empty(name, attrs) => {
            open_tag(name, attrs, out);
            out.push_str("/>");
        }
        Node::Element(name, attrs, children) => {
            open_tag(name, attrs, out);
            out.push('>');
            for child in children {
                render(child, out);
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
    }
}

fn open_tag(name: &str, attrs: &[(String, String)], out: &mut String) {
    out.push('<');
    out.push_str(name);
    for (key, value) in attrs {
        out.push_str(&format!(" {key}=\"{value}\""));
    }
}

fn text_of(node: &Node, out: &mut String) {
    match node {
        Node::Text(text) => out.push_str(text),
        Node::Element(_, _, children) => children.iter().for_each(|c| text_of(c, out)),
        Node::Comment(_) | Node::Empty(..) => {}
    }
}

fn attrs() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(("[a-z]{1,6}", "[a-z0-9 >]{0,6}"), 0..3)
}

fn node() -> impl Strategy<Value = Node> {
    let leaf = prop_oneof![
        4 => "[a-zA-Z0-9 ,.>&;]{1,12}".prop_map(Node::Text),
        1 => "[a-z ]{0,8}".prop_map(Node::Comment),
        1 => ("[a-z][a-z0-9]{0,4}", attrs()).prop_map(|(n, a)| Node::Empty(n, a)),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        ("[a-z][a-z0-9]{0,4}", attrs(), prop::collection::vec(inner, 0..4))
            .prop_map(|(name, attrs, children)| Node::Element(name, attrs, children))
    })
}

fn document() -> impl Strategy<Value = (String, String)> {
    (any::<bool>(), prop::collection::vec(node(), 1..4)).prop_map(|(prolog, nodes)| {
        let mut doc = String::new();
        if prolog {
            doc.push_str("<?xml version=\"1.0\"?>\n");
        }
        let mut text = if prolog { "\n".to_string() } else { String::new() };
        for node in &nodes {
            render(node, &mut doc);
            text_of(node, &mut text);
        }
        (doc, text)
    })
}

fn tokenizer(doc: &str) -> MarkupTokenizer<SlidingWindow<MemoryStore>> {
    MarkupTokenizer::open_with_window(MemoryStore::from(doc), 64).expect("open")
}

fn forward_positions(doc: &str) -> Vec<Position> {
    let mut tok = tokenizer(doc);
    let mut out = Vec::new();
    while tok.read() {
        out.push(tok.position());
    }
    out
}

proptest! {
    #[test]
    fn text_nodes_carry_every_character_outside_markup((doc, expected) in document()) {
        let mut tok = tokenizer(&doc);
        let mut text = Vec::new();
        while tok.read() {
            while let Some(byte) = tok.read_text_node_char_forward() {
                text.push(byte);
            }
        }
        prop_assert_eq!(tok.node_type(), NodeType::EndOfFile);
        prop_assert_eq!(String::from_utf8(text).expect("utf8"), expected);
    }

    #[test]
    fn backward_reads_retrace_forward_reads((doc, _) in document()) {
        let forward = forward_positions(&doc);
        let mut tok = tokenizer(&doc);
        while tok.read() {}
        let mut backward = Vec::new();
        while tok.read_backward() {
            backward.push(tok.position());
        }
        backward.reverse();
        prop_assert_eq!(backward, forward);
    }

    #[test]
    fn restored_positions_resume_both_ways(
        (doc, _) in document(),
        pick in any::<prop::sample::Index>(),
    ) {
        let nodes = forward_positions(&doc);
        prop_assume!(!nodes.is_empty());
        let i = pick.index(nodes.len());

        let mut tok = tokenizer(&doc);
        prop_assert!(tok.set_position(&nodes[i]));
        prop_assert_eq!(&tok.position(), &nodes[i]);
        let mut rest = Vec::new();
        while tok.read() {
            rest.push(tok.position());
        }
        prop_assert_eq!(rest.as_slice(), &nodes[i + 1..]);

        prop_assert!(tok.set_position(&nodes[i]));
        let mut before = Vec::new();
        while tok.read_backward() {
            before.push(tok.position());
        }
        before.reverse();
        prop_assert_eq!(before.as_slice(), &nodes[..i]);
    }
}
