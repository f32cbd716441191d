use epub_pager::{
    normalize_markup, BoundaryKind, MemoryStore, NormalizeOptions, WordScanner, WordSource,
};
use proptest::prelude::*;

fn text_from(words: &[String], separators: &[usize]) -> String {
    const SEPARATORS: &[&str] = &[" ", "   ", "\n", "\t", " "];
    let mut out = String::new();
    for (i, word) in words.iter().enumerate() {
        if i > 0 {
            out.push_str(SEPARATORS[separators[i % separators.len()] % SEPARATORS.len()]);
        }
        out.push_str(word);
    }
    out
}

fn scanner(text: &str) -> WordScanner<MemoryStore> {
    WordScanner::with_window(MemoryStore::new(text), 64)
}

type StyledWord = (String, bool, bool, bool);

/// Paragraphs of emphasized words run through the normalizer, so the
/// stream carries alignment and style tokens the way a chapter does.
fn styled_text(paragraphs: &[(Option<usize>, Vec<StyledWord>)]) -> Vec<u8> {
    const ALIGNS: &[&str] = &["left", "right", "center", "justify"];
    let mut html = String::new();
    for (align, words) in paragraphs {
        match align {
            Some(a) => html.push_str(&format!(
                "<p style=\"text-align: {}\">",
                ALIGNS[a % ALIGNS.len()]
            )),
            None => html.push_str("<p>"),
        }
        for (i, (word, bold, italic, joined)) in words.iter().enumerate() {
            if i > 0 && !joined {
                html.push(' ');
            }
            let mut run = word.clone();
            if *italic {
                run = format!("<i>{run}</i>");
            }
            if *bold {
                run = format!("<b>{run}</b>");
            }
            html.push_str(&run);
        }
        html.push_str("</p>");
    }
    normalize_markup(html.as_bytes(), NormalizeOptions::styled())
}

fn paragraphs() -> impl Strategy<Value = Vec<(Option<usize>, Vec<StyledWord>)>> {
    prop::collection::vec(
        (
            prop::option::of(0usize..4),
            prop::collection::vec(
                ("[a-z]{1,8}", any::<bool>(), any::<bool>(), prop::bool::weighted(0.2)),
                1..12,
            ),
        ),
        1..6,
    )
}

proptest! {
    #[test]
    fn forward_tokens_reassemble_the_text(
        words in prop::collection::vec("[a-z]{1,12}", 1..80),
        separators in prop::collection::vec(0usize..5, 1..16),
    ) {
        let text = text_from(&words, &separators);
        let mut scanner = scanner(&text);
        let mut joined = String::new();
        let mut word_count = 0;
        while let Some(token) = scanner.next_word() {
            if token.kind == BoundaryKind::Word {
                word_count += 1;
            }
            joined.push_str(&token.text);
        }
        prop_assert_eq!(joined, text);
        prop_assert_eq!(word_count, words.len());
        prop_assert!(!scanner.has_next_word());
    }

    #[test]
    fn backward_scan_mirrors_forward_scan(
        words in prop::collection::vec("[a-z]{1,12}", 1..80),
        separators in prop::collection::vec(0usize..5, 1..16),
    ) {
        let text = text_from(&words, &separators);
        let mut scanner = scanner(&text);
        let forward: Vec<_> = std::iter::from_fn(|| scanner.next_word()).collect();
        let mut backward: Vec<_> = std::iter::from_fn(|| scanner.prev_word()).collect();
        backward.reverse();
        prop_assert_eq!(forward, backward);
        prop_assert_eq!(scanner.current_index(), 0);
    }

    #[test]
    fn seeking_to_a_token_start_resumes_there(
        words in prop::collection::vec("[a-z]{1,12}", 1..60),
        separators in prop::collection::vec(0usize..5, 1..16),
        pick in any::<prop::sample::Index>(),
    ) {
        let text = text_from(&words, &separators);
        let mut scanner = scanner(&text);
        let mut starts = Vec::new();
        loop {
            let at = scanner.current_index();
            match scanner.next_word() {
                Some(token) => starts.push((at, token)),
                None => break,
            }
        }
        let (at, token) = starts[pick.index(starts.len())].clone();
        scanner.set_position(at);
        prop_assert_eq!(scanner.current_index(), at);
        prop_assert_eq!(scanner.next_word(), Some(token));
    }

    #[test]
    fn chapter_percentage_never_decreases(
        words in prop::collection::vec("[a-z]{1,12}", 1..60),
        separators in prop::collection::vec(0usize..5, 1..16),
    ) {
        let text = text_from(&words, &separators);
        let mut scanner = scanner(&text);
        let mut last = 0.0f32;
        for index in 0..=text.len() + 4 {
            let pct = scanner.percentage_at(index);
            prop_assert!((0.0..=1.0).contains(&pct));
            prop_assert!(pct >= last);
            last = pct;
        }
        prop_assert_eq!(last, 1.0);
    }

    #[test]
    fn styled_backward_scan_mirrors_forward_scan(paragraphs in paragraphs()) {
        let bytes = styled_text(&paragraphs);
        let mut scanner = WordScanner::with_window(MemoryStore::new(bytes), 64);
        let forward: Vec<_> = std::iter::from_fn(|| scanner.next_word()).collect();
        let mut backward: Vec<_> = std::iter::from_fn(|| scanner.prev_word()).collect();
        backward.reverse();
        prop_assert_eq!(forward, backward);
        prop_assert_eq!(scanner.current_index(), 0);
    }

    #[test]
    fn seeking_replays_style_and_alignment(
        paragraphs in paragraphs(),
        pick in any::<prop::sample::Index>(),
    ) {
        let bytes = styled_text(&paragraphs);
        let mut scanner = WordScanner::with_window(MemoryStore::new(bytes), 64);
        let mut starts = Vec::new();
        loop {
            let at = scanner.current_index();
            let style = scanner.current_style();
            let align = scanner.paragraph_alignment();
            match scanner.next_word() {
                Some(token) => starts.push((at, style, align, token)),
                None => break,
            }
        }
        prop_assume!(!starts.is_empty());
        let i = pick.index(starts.len());
        let (at, style, align, _) = starts[i].clone();

        scanner.set_position(at);
        prop_assert_eq!(scanner.current_index(), at);
        prop_assert_eq!(scanner.current_style(), style);
        prop_assert_eq!(scanner.paragraph_alignment(), align);
        let rest: Vec<_> = std::iter::from_fn(|| scanner.next_word()).collect();
        let expected: Vec<_> = starts[i..].iter().map(|(.., token)| token.clone()).collect();
        prop_assert_eq!(rest, expected);
    }
}
