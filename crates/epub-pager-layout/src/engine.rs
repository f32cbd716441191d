use epub_pager::{FontStyle, TextAlign, WordSource};
use smallvec::SmallVec;

use crate::greedy::greedy_breaks;
use crate::knuth_plass::optimal_breaks;
use crate::layout_ir::{
    LayoutConfig, Line, PageLayout, PlacedWord, TextDrawer, TextMeasurer,
};
use crate::paragraph::{
    break_extra, collect_paragraph, line_ranges, resume_index, BreakKind, Fragment,
};

/// Line breaking algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LayoutStrategy {
    /// First-fit, line by line.
    Greedy,
    /// Total-fit over each paragraph.
    #[default]
    KnuthPlass,
}

/// Pages a [`WordSource`] into [`PageLayout`]s.
///
/// Holds no state between calls: every page is a function of the source
/// position, the measurer and the config.
#[derive(Clone, Debug, Default)]
pub struct LayoutEngine {
    config: LayoutConfig,
    strategy: LayoutStrategy,
}

impl LayoutEngine {
    /// Engine with the default (total-fit) strategy.
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            config,
            strategy: LayoutStrategy::default(),
        }
    }

    /// First-fit engine.
    pub fn greedy(config: LayoutConfig) -> Self {
        Self::new(config).with_strategy(LayoutStrategy::Greedy)
    }

    /// Total-fit engine.
    pub fn knuth_plass(config: LayoutConfig) -> Self {
        Self::new(config).with_strategy(LayoutStrategy::KnuthPlass)
    }

    /// Override the strategy.
    pub fn with_strategy(mut self, strategy: LayoutStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Active config.
    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Active strategy.
    pub fn strategy(&self) -> LayoutStrategy {
        self.strategy
    }

    /// Line start indices for one paragraph's fragments.
    pub fn break_lines(&self, fragments: &[Fragment], hyphen_width: i32) -> Vec<usize> {
        let width = self.config.content_width();
        match self.strategy {
            LayoutStrategy::Greedy => greedy_breaks(fragments, width, hyphen_width),
            LayoutStrategy::KnuthPlass => optimal_breaks(fragments, width, hyphen_width),
        }
    }

    /// Lay out one page starting at the source's cursor.
    ///
    /// The cursor is back where it started on return; resume the next page
    /// from [`PageLayout::end_position`].
    pub fn layout_text<S, M>(&self, source: &mut S, measurer: &M) -> PageLayout
    where
        S: WordSource + ?Sized,
        M: TextMeasurer + ?Sized,
    {
        self.layout_until(source, measurer, None)
    }

    /// Iterate pages from the source's cursor to its end.
    pub fn pages<'a, S, M>(&'a self, source: &'a mut S, measurer: &'a M) -> PageIter<'a, S, M>
    where
        S: WordSource + ?Sized,
        M: TextMeasurer + ?Sized,
    {
        PageIter {
            engine: self,
            source,
            measurer,
            done: false,
        }
    }

    /// Draw every word of `page`. Lines below the footer band are skipped.
    pub fn render_page<D>(&self, page: &PageLayout, drawer: &mut D) -> Result<(), D::Error>
    where
        D: TextDrawer + ?Sized,
    {
        for line in &page.lines {
            if !self.config.line_fits(line.y) {
                log::warn!("[LAYOUT] line at y={} crosses the footer band", line.y);
                break;
            }
            for word in &line.words {
                drawer.set_style(word.style);
                drawer.set_cursor(word.x, word.y);
                drawer.print(&word.text)?;
            }
        }
        Ok(())
    }

    /// Start index of the page that ends at `page_start`.
    ///
    /// Walks back to an earlier paragraph boundary, re-breaks the text up to
    /// `page_start` and picks the earliest line start whose page still ends
    /// there. The source cursor is left unchanged.
    pub fn previous_page_start<S, M>(&self, source: &mut S, measurer: &M, page_start: usize) -> usize
    where
        S: WordSource + ?Sized,
        M: TextMeasurer + ?Sized,
    {
        let origin = source.current_index();
        source.set_position(page_start);
        let target = source.current_index();
        let found = self.find_previous_start(source, measurer, target);
        source.set_position(origin);
        log::debug!("[LAYOUT] previous page of {} starts at {}", target, found);
        found
    }

    fn lines_per_page(&self) -> usize {
        let config = &self.config;
        let usable = config.content_bottom() - config.margin_top;
        (usable / config.line_height.max(1)).max(1) as usize
    }

    fn find_previous_start<S, M>(&self, source: &mut S, measurer: &M, target: usize) -> usize
    where
        S: WordSource + ?Sized,
        M: TextMeasurer + ?Sized,
    {
        let lines_per_page = self.lines_per_page();
        let char_width = measurer.space_width(FontStyle::Regular).max(1);
        let chars_per_line = (self.config.content_width() / char_width).max(1) as usize;
        let budget = lines_per_page * chars_per_line * 2;

        let mut anchor = target;
        let mut newlines = 0usize;
        while let Some(token) = source.prev_word() {
            let at = source.current_index();
            anchor = at;
            if token.is_newline() {
                newlines += 1;
                if newlines > lines_per_page || target - at >= budget {
                    anchor = at + 1;
                    break;
                }
            } else if token.is_word() && target - at >= budget * 2 {
                break;
            }
        }
        if anchor >= target {
            return target;
        }

        let mut line_starts = Vec::new();
        source.set_position(anchor);
        loop {
            let page = self.layout_until(source, measurer, Some(target));
            line_starts.extend(page.lines.iter().map(|line| line.start_position));
            if page.at_end || page.end_position <= page.start_position {
                break;
            }
            source.set_position(page.end_position);
        }
        line_starts.retain(|&start| start < target);

        let first = line_starts.len().saturating_sub(lines_per_page);
        for &candidate in &line_starts[first..] {
            source.set_position(candidate);
            if self.layout_until(source, measurer, Some(target)).at_end {
                return candidate;
            }
        }
        line_starts.last().copied().unwrap_or(anchor)
    }

    fn layout_until<S, M>(&self, source: &mut S, measurer: &M, limit: Option<usize>) -> PageLayout
    where
        S: WordSource + ?Sized,
        M: TextMeasurer + ?Sized,
    {
        let config = &self.config;
        let start = source.current_index();
        let hyphenator = config.hyphenator();
        let hyphen_width = measurer.measure_text("-", FontStyle::Regular).width;
        let mut page = PageLayout {
            start_position: start,
            end_position: start,
            ..PageLayout::default()
        };
        let mut y = config.margin_top;

        'page: while config.line_fits(y) {
            let Some(paragraph) = collect_paragraph(source, measurer, &hyphenator, limit) else {
                break;
            };
            let after = source.current_index();
            let fragments = &paragraph.fragments;
            let alignment = paragraph.alignment.unwrap_or(config.default_alignment);
            let starts = self.break_lines(fragments, hyphen_width);
            let kept = if paragraph.truncated && starts.len() > 1 {
                starts.len() - 1
            } else {
                starts.len()
            };

            let mut moved = false;
            for (line_no, (from, to)) in line_ranges(&starts, fragments.len())
                .take(kept)
                .enumerate()
            {
                moved |= fragments[from].word_offset != 0;
                let line_start = resume_index(source, &fragments[from]);
                if !config.line_fits(y) {
                    page.end_position = line_start;
                    break 'page;
                }
                let ends_paragraph = !paragraph.truncated && line_no + 1 == starts.len();
                let mut line = self.place_line(
                    fragments,
                    (from, to),
                    y,
                    alignment,
                    ends_paragraph,
                    hyphen_width,
                );
                line.start_position = line_start;
                page.lines.push(line);
                y += config.line_height;
            }

            if kept < starts.len() {
                let resume = resume_index(source, &fragments[starts[kept]]);
                source.set_position(resume);
                page.end_position = resume;
                continue;
            }
            if moved {
                source.set_position(after);
            }
            page.end_position = after;
            if paragraph.ended_by_newline && !fragments.is_empty() {
                if y + config.paragraph_spacing > config.content_bottom() {
                    break;
                }
                y += config.paragraph_spacing;
            }
        }

        page.at_end = !has_words_from(source, page.end_position, limit);
        source.set_position(start);
        log::debug!(
            "[LAYOUT] page {}..{} lines={} at_end={}",
            page.start_position,
            page.end_position,
            page.lines.len(),
            page.at_end
        );
        page
    }

    fn place_line(
        &self,
        fragments: &[Fragment],
        (from, to): (usize, usize),
        y: i32,
        alignment: TextAlign,
        ends_paragraph: bool,
        hyphen_width: i32,
    ) -> Line {
        let mut words: SmallVec<[PlacedWord; 12]> = SmallVec::new();
        let mut gaps: SmallVec<[i32; 12]> = SmallVec::new();
        for (i, fragment) in fragments[from..to].iter().enumerate() {
            let continues_word = i > 0 && matches!(fragment.break_before, BreakKind::Hyphen { .. });
            if continues_word {
                if let Some(last) = words.last_mut().filter(|w| w.style == fragment.style) {
                    last.text.push_str(&fragment.text);
                    last.width += fragment.width;
                    continue;
                }
            }
            words.push(PlacedWord {
                text: fragment.text.clone(),
                style: fragment.style,
                x: 0,
                y,
                width: fragment.width,
            });
            gaps.push(if i == 0 { 0 } else { fragment.glue_before });
        }
        if break_extra(fragments, to, hyphen_width) > 0 {
            if let Some(last) = words.last_mut() {
                last.text.push('-');
                last.width += hyphen_width;
            }
        }

        let natural: i32 = words.iter().map(|w| w.width).sum::<i32>() + gaps.iter().sum::<i32>();
        let slack = (self.config.content_width() - natural).max(0);
        let alignment = match alignment {
            TextAlign::Justify if ends_paragraph => TextAlign::Left,
            other => other,
        };
        let mut x = self.config.margin_left
            + match alignment {
                TextAlign::Right => slack,
                TextAlign::Center => slack / 2,
                TextAlign::Left | TextAlign::Justify => 0,
            };

        let stretchable = gaps.iter().filter(|&&gap| gap > 0).count() as i32;
        let (extra, mut remainder) = if alignment == TextAlign::Justify && stretchable > 0 {
            (slack / stretchable, slack % stretchable)
        } else {
            (0, 0)
        };
        for (word, &gap) in words.iter_mut().zip(&gaps) {
            x += gap;
            if gap > 0 {
                x += extra;
                if remainder > 0 {
                    x += 1;
                    remainder -= 1;
                }
            }
            word.x = x;
            x += word.width;
        }

        Line {
            words,
            y,
            alignment,
            ends_paragraph,
            start_position: 0,
        }
    }
}

fn has_words_from<S>(source: &mut S, from: usize, limit: Option<usize>) -> bool
where
    S: WordSource + ?Sized,
{
    source.set_position(from);
    loop {
        if limit.is_some_and(|limit| source.current_index() >= limit) {
            return false;
        }
        match source.next_word() {
            Some(token) if token.is_word() => return true,
            Some(_) => {}
            None => return false,
        }
    }
}

/// Pages from a source cursor to its end. See [`LayoutEngine::pages`].
pub struct PageIter<'a, S: ?Sized, M: ?Sized> {
    engine: &'a LayoutEngine,
    source: &'a mut S,
    measurer: &'a M,
    done: bool,
}

impl<S, M> Iterator for PageIter<'_, S, M>
where
    S: WordSource + ?Sized,
    M: TextMeasurer + ?Sized,
{
    type Item = PageLayout;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let page = self.engine.layout_text(self.source, self.measurer);
        if page.at_end || page.end_position <= page.start_position {
            self.done = true;
            if page.is_empty() {
                return None;
            }
        }
        self.source.set_position(page.end_position);
        Some(page)
    }
}
