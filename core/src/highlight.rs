use serde::{Deserialize, Serialize};

use crate::tokenizer::is_hangul;

/// Occurrences considered per term when choosing the best window.
const MAX_OCCURRENCES: usize = 64;

/// Excerpt of a document with the matched ranges marked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub text: String,
    /// Byte ranges into `text`, ascending and non-overlapping.
    pub spans: Vec<(usize, usize)>,
    pub truncated_start: bool,
    pub truncated_end: bool,
}

impl Snippet {
    /// Wrap every span in `open`/`close`, with `...` on cut edges.
    pub fn render(&self, open: &str, close: &str) -> String {
        let mut out = String::with_capacity(self.text.len() + self.spans.len() * (open.len() + close.len()) + 6);
        if self.truncated_start {
            out.push_str("...");
        }
        let mut cursor = 0;
        for &(start, end) in &self.spans {
            out.push_str(&self.text[cursor..start]);
            out.push_str(open);
            out.push_str(&self.text[start..end]);
            out.push_str(close);
            cursor = end;
        }
        out.push_str(&self.text[cursor..]);
        if self.truncated_end {
            out.push_str("...");
        }
        out
    }

    /// Concatenate snippets with `separator`, shifting spans to match.
    pub fn join(snippets: Vec<Snippet>, separator: &str) -> Snippet {
        let mut joined = Snippet::default();
        let count = snippets.len();
        for (i, s) in snippets.into_iter().enumerate() {
            if i == 0 {
                joined.truncated_start = s.truncated_start;
            } else {
                joined.text.push_str(separator);
            }
            if i + 1 == count {
                joined.truncated_end = s.truncated_end;
            }
            let offset = joined.text.len();
            joined.spans.extend(s.spans.into_iter().map(|(a, b)| (a + offset, b + offset)));
            joined.text.push_str(&s.text);
        }
        joined
    }
}

/// Builds match-centered snippets from a document's original text.
#[derive(Debug, Clone)]
pub struct Highlighter {
    window_size: usize,
}

impl Highlighter {
    pub fn new(window_size: usize) -> Self { Self { window_size: window_size.max(1) } }

    pub fn window_size(&self) -> usize { self.window_size }

    /// One snippet per group of overlapping match windows, in document order.
    /// Falls back to the document head when no term occurs literally.
    pub fn highlight<S: AsRef<str>>(&self, text: &str, matched_terms: &[S]) -> Vec<Snippet> {
        let chars: Vec<(usize, char)> = text.char_indices().collect();
        let folded: Vec<char> = chars.iter().map(|&(_, c)| fold(c)).collect();

        let mut occurrences: Vec<Vec<(usize, usize)>> = Vec::new();
        for term in matched_terms {
            let needle: Vec<char> = term.as_ref().chars().map(fold).collect();
            let found = find_all(&folded, &needle);
            if !found.is_empty() {
                occurrences.push(found);
            }
        }
        if occurrences.is_empty() {
            return vec![self.head(text, &chars)];
        }
        let all: Vec<(usize, usize)> = occurrences.iter().flatten().copied().collect();

        let mut windows: Vec<(usize, usize)> = occurrences
            .iter()
            .map(|occ| {
                occ.iter()
                    .map(|&m| self.window(&chars, m))
                    .enumerate()
                    .max_by_key(|&(i, w)| (all.iter().filter(|&&(s, e)| s >= w.0 && e <= w.1).count(), usize::MAX - i))
                    .map(|(_, w)| w)
                    .unwrap_or((0, 0))
            })
            .collect();
        windows.sort_unstable();

        let mut merged: Vec<(usize, usize)> = Vec::with_capacity(windows.len());
        for w in windows {
            match merged.last_mut() {
                Some(last) if w.0 <= last.1 => last.1 = last.1.max(w.1),
                _ => merged.push(w),
            }
        }

        merged.into_iter().map(|w| self.cut(text, &chars, w, &all)).collect()
    }

    /// Character window of `window_size` around match `m`, snapped to word edges.
    fn window(&self, chars: &[(usize, char)], m: (usize, usize)) -> (usize, usize) {
        let len = chars.len();
        let (ms, me) = m;
        let width = self.window_size.max(me - ms);
        let mut start = ms.saturating_sub((width - (me - ms)) / 2);
        let mut end = (start + width).min(len);
        start = end.saturating_sub(width).min(start);

        let word = |i: usize| is_word_char(chars[i].1);
        if start > 0 && word(start - 1) && word(start) {
            while start < ms && word(start) {
                start += 1;
            }
        }
        while start < ms && chars[start].1.is_whitespace() {
            start += 1;
        }
        if end < len && word(end - 1) && word(end) {
            while end > me && word(end - 1) {
                end -= 1;
            }
        }
        while end > me && chars[end - 1].1.is_whitespace() {
            end -= 1;
        }
        (start, end)
    }

    fn cut(&self, text: &str, chars: &[(usize, char)], (start, end): (usize, usize), all: &[(usize, usize)]) -> Snippet {
        let byte = |i: usize| chars.get(i).map_or(text.len(), |&(b, _)| b);
        let base = byte(start);
        let mut inside: Vec<(usize, usize)> = all.iter().copied().filter(|&(s, e)| s >= start && e <= end).collect();
        inside.sort_unstable();
        let mut spans: Vec<(usize, usize)> = Vec::with_capacity(inside.len());
        for (s, e) in inside {
            match spans.last_mut() {
                Some(last) if s <= last.1 => last.1 = last.1.max(e),
                _ => spans.push((s, e)),
            }
        }
        Snippet {
            text: text[base..byte(end)].to_string(),
            spans: spans.into_iter().map(|(s, e)| (byte(s) - base, byte(e) - base)).collect(),
            truncated_start: start > 0,
            truncated_end: end < chars.len(),
        }
    }

    fn head(&self, text: &str, chars: &[(usize, char)]) -> Snippet {
        let end = self.window_size.min(chars.len());
        let cut = chars.get(end).map_or(text.len(), |&(b, _)| b);
        Snippet { text: text[..cut].to_string(), spans: Vec::new(), truncated_start: false, truncated_end: end < chars.len() }
    }
}

/// Single-character lower-casing; characters whose lowercase form expands
/// to several characters are left alone so indexes stay aligned.
fn fold(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}

fn is_word_char(c: char) -> bool { c.is_alphanumeric() && !is_hangul(c) }

/// Start/end character indexes of non-overlapping occurrences of `needle`.
fn find_all(haystack: &[char], needle: &[char]) -> Vec<(usize, usize)> {
    let mut found = Vec::new();
    if needle.is_empty() || needle.len() > haystack.len() {
        return found;
    }
    let mut i = 0;
    while i + needle.len() <= haystack.len() && found.len() < MAX_OCCURRENCES {
        if haystack[i..i + needle.len()] == *needle {
            found.push((i, i + needle.len()));
            i += needle.len();
        } else {
            i += 1;
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marked(s: &Snippet) -> String { s.render("[", "]") }

    #[test]
    fn centers_on_match_and_marks_it() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let h = Highlighter::new(20);
        let out = h.highlight(text, &["delta"]);
        assert_eq!(out.len(), 1);
        let s = &out[0];
        assert!(s.text.contains("delta"));
        assert_eq!(&s.text[s.spans[0].0..s.spans[0].1], "delta");
        assert!(s.truncated_start && s.truncated_end);
        assert!(!s.text.starts_with(' '));
    }

    #[test]
    fn case_insensitive_match_keeps_original_case() {
        let out = Highlighter::new(40).highlight("Project Meeting Tomorrow", &["meeting"]);
        assert_eq!(marked(&out[0]), "Project [Meeting] Tomorrow");
    }

    #[test]
    fn overlapping_windows_merge() {
        let out = Highlighter::new(30).highlight("the budget and the meeting were fine", &["budget", "meeting"]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].spans.len(), 2);
    }

    #[test]
    fn distant_matches_give_separate_snippets() {
        let filler = "x ".repeat(100);
        let text = format!("start {filler}middle {filler}finish");
        let out = Highlighter::new(12).highlight(&text, &["start", "finish"]);
        assert_eq!(out.len(), 2);
        assert!(out[0].text.contains("start"));
        assert!(out[1].text.contains("finish"));
    }

    #[test]
    fn hangul_spans_are_byte_offsets() {
        let out = Highlighter::new(10).highlight("회의 일정은 내일입니다", &["일정"]);
        let s = &out[0];
        assert_eq!(&s.text[s.spans[0].0..s.spans[0].1], "일정");
    }

    #[test]
    fn nested_terms_merge_into_one_span() {
        let out = Highlighter::new(20).highlight("일정은 확정", &["일정은", "일정"]);
        assert_eq!(out[0].spans.len(), 1);
        assert_eq!(&out[0].text[out[0].spans[0].0..out[0].spans[0].1], "일정은");
    }

    #[test]
    fn falls_back_to_document_head() {
        let out = Highlighter::new(5).highlight("가나다라마바사", &["없음"]);
        assert_eq!(out, vec![Snippet { text: "가나다라마".into(), spans: vec![], truncated_start: false, truncated_end: true }]);
    }

    #[test]
    fn join_shifts_spans() {
        let a = Snippet { text: "ab".into(), spans: vec![(0, 1)], truncated_start: true, truncated_end: true };
        let b = Snippet { text: "cd".into(), spans: vec![(1, 2)], truncated_start: true, truncated_end: false };
        let j = Snippet::join(vec![a, b], " ... ");
        assert_eq!(j.text, "ab ... cd");
        assert_eq!(j.spans, vec![(0, 1), (8, 9)]);
        assert!(j.truncated_start && !j.truncated_end);
    }

    #[test]
    fn empty_text() {
        let out = Highlighter::new(5).highlight("", &["x"]);
        assert_eq!(out, vec![Snippet::default()]);
    }
}
