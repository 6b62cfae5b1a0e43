//! Text normalization and token windows.
//!
//! Every comparison in the engine happens on normalized text: lowercase,
//! whitespace collapsed, terminal punctuation and enclosing quotes stripped.
//! [`Utterance`] keeps the byte offsets of each raw token so that a window
//! found on normalized tokens can be substituted back into the input without
//! disturbing the rest of it.

/// Characters stripped from the end of every token.
const TERMINAL_PUNCTUATION: &[char] = &[
    '.', ',', '!', '?', ';', ':', '…', '"', '\'', '“', '”', '‘', '’', '»', '」', '』', '。', '、',
    '！', '？',
];

/// Characters stripped from the start of every token.
const OPENING_QUOTES: &[char] = &['"', '\'', '“', '‘', '«', '「', '『'];

/// Normalize a string for matching.
///
/// ```
/// use stt_corrector::normalize;
///
/// assert_eq!(normalize("  Start   Eating! "), "start eating");
/// assert_eq!(normalize("..."), "");
/// ```
pub fn normalize(text: &str) -> String {
    Utterance::new(text).normalized()
}

/// Byte range of the token core within `raw`, and its normalized text.
fn normalize_token(raw: &str) -> (usize, usize, String) {
    let trimmed = raw.trim_end_matches(TERMINAL_PUNCTUATION);
    let core = trimmed.trim_start_matches(OPENING_QUOTES);
    let lead = trimmed.len() - core.len();
    (lead, trimmed.len(), core.to_lowercase())
}

/// A half-open range `[start, end)` of token positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of tokens covered.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone)]
struct Token {
    /// Byte offset of the token in the input, after any opening quotes.
    start: usize,
    /// Byte offset just past the raw token without its terminal punctuation.
    core_end: usize,
    normalized: String,
}

/// An input string split into matchable tokens.
///
/// Tokens that normalize to nothing (a lone `"..."`) are not matchable but
/// stay in the input untouched.
#[derive(Debug, Clone)]
pub struct Utterance<'a> {
    input: &'a str,
    tokens: Vec<Token>,
}

impl<'a> Utterance<'a> {
    pub fn new(input: &'a str) -> Self {
        let mut tokens = Vec::new();
        let mut token_start = None;

        for (offset, c) in input.char_indices().chain(std::iter::once((input.len(), ' '))) {
            match (c.is_whitespace(), token_start) {
                (true, Some(start)) => {
                    let (lead, core_end, normalized) = normalize_token(&input[start..offset]);
                    if !normalized.is_empty() {
                        tokens.push(Token {
                            start: start + lead,
                            core_end: start + core_end,
                            normalized,
                        });
                    }
                    token_start = None;
                }
                (false, None) => token_start = Some(offset),
                _ => {}
            }
        }

        Self { input, tokens }
    }

    /// The raw input.
    pub fn input(&self) -> &'a str {
        self.input
    }

    /// Number of matchable tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Span covering every token.
    pub fn full_span(&self) -> Span {
        Span::new(0, self.tokens.len())
    }

    /// The whole utterance, normalized.
    pub fn normalized(&self) -> String {
        self.window(self.full_span())
    }

    /// Normalized text of the tokens in `span`.
    pub fn window(&self, span: Span) -> String {
        self.tokens[span.start..span.end]
            .iter()
            .map(|t| t.normalized.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Raw input text covered by `span`, without the trailing punctuation of
    /// its last token.
    pub fn raw_window(&self, span: Span) -> &'a str {
        if span.is_empty() {
            return "";
        }
        &self.input[self.tokens[span.start].start..self.tokens[span.end - 1].core_end]
    }

    /// Every window of `len` tokens, left to right.
    pub fn windows(&self, len: usize) -> impl Iterator<Item = Span> + '_ {
        let count = if len == 0 || len > self.len() {
            0
        } else {
            self.len() - len + 1
        };
        (0..count).map(move |start| Span::new(start, start + len))
    }

    /// Replace the raw text of `span` with `replacement`.
    ///
    /// A span covering the whole utterance yields `replacement` verbatim.
    /// Otherwise the surrounding input, including the terminal punctuation of
    /// the last replaced token, is kept as typed.
    pub fn substitute(&self, span: Span, replacement: &str) -> String {
        self.substitute_all(&[(span, replacement)])
    }

    /// Replace several non-overlapping spans at once.
    pub fn substitute_all(&self, replacements: &[(Span, &str)]) -> String {
        if let [(span, replacement)] = replacements {
            if *span == self.full_span() {
                return (*replacement).to_string();
            }
        }

        let mut ordered: Vec<&(Span, &str)> =
            replacements.iter().filter(|(s, _)| !s.is_empty()).collect();
        ordered.sort_by_key(|(span, _)| span.start);

        let mut out = String::with_capacity(self.input.len());
        let mut cursor = 0;
        for (span, replacement) in ordered {
            let from = self.tokens[span.start].start;
            let to = self.tokens[span.end - 1].core_end;
            if from < cursor {
                continue;
            }
            out.push_str(&self.input[cursor..from]);
            out.push_str(replacement);
            cursor = to;
        }
        out.push_str(&self.input[cursor..]);
        out
    }
}
