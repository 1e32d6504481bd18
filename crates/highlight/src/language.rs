use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::ops::Range;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::rules::LanguageRules;

/// Identifier for a registered language.
/// （註冊語言的識別子。）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LanguageId(Cow<'static, str>);

impl std::fmt::Display for LanguageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for LanguageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for LanguageId {
    fn from(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }
}

impl From<String> for LanguageId {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

/// Token class assigned to a fragment of source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightKind {
    Keyword,
    Function,
    Constant,
    Identifier,
    Number,
    String,
    Comment,
    Operator,
    Bracket,
    Delimiter,
}

impl HighlightKind {
    pub const ALL: [HighlightKind; 10] = [
        HighlightKind::Keyword,
        HighlightKind::Function,
        HighlightKind::Constant,
        HighlightKind::Identifier,
        HighlightKind::Number,
        HighlightKind::String,
        HighlightKind::Comment,
        HighlightKind::Operator,
        HighlightKind::Bracket,
        HighlightKind::Delimiter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HighlightKind::Keyword => "keyword",
            HighlightKind::Function => "function",
            HighlightKind::Constant => "constant",
            HighlightKind::Identifier => "identifier",
            HighlightKind::Number => "number",
            HighlightKind::String => "string",
            HighlightKind::Comment => "comment",
            HighlightKind::Operator => "operator",
            HighlightKind::Bracket => "bracket",
            HighlightKind::Delimiter => "delimiter",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "brackets" => Some(HighlightKind::Bracket),
            _ => Self::ALL.into_iter().find(|kind| kind.as_str() == name),
        }
    }

    fn merges_with_neighbour(&self) -> bool {
        matches!(self, HighlightKind::Comment | HighlightKind::Operator)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HighlightToken {
    pub range: Range<usize>,
    pub kind: HighlightKind,
}

/// Tokenizer state carried from one line to the next.
///
/// Block comments nest, so the state records how many openers are still
/// waiting for their closer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LexState {
    #[default]
    Root,
    BlockComment {
        depth: usize,
    },
}

impl LexState {
    fn push_comment(self) -> Self {
        match self {
            LexState::Root => LexState::BlockComment { depth: 1 },
            LexState::BlockComment { depth } => LexState::BlockComment { depth: depth + 1 },
        }
    }

    fn pop_comment(self) -> Self {
        match self {
            LexState::BlockComment { depth } if depth > 1 => {
                LexState::BlockComment { depth: depth - 1 }
            }
            _ => LexState::Root,
        }
    }
}

/// Tokens produced for a span of text together with the state the next span
/// should start in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedText {
    pub tokens: Vec<HighlightToken>,
    pub end_state: LexState,
}

#[derive(Debug, Error)]
pub enum HighlightError {
    #[error("language '{0}' is not registered")]
    LanguageNotRegistered(String),
    #[error("regex compilation failed: {0}")]
    RegexCompilation(String),
    #[error("invalid language rules: {0}")]
    Rules(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
struct BlockComment {
    start: String,
    end: String,
}

/// A compiled [`LanguageRules`] table.
#[derive(Debug, Clone)]
pub struct LanguageDefinition {
    pub id: LanguageId,
    pub display_name: String,
    pub extensions: Vec<String>,

    keywords: HashSet<String>,
    functions: HashSet<String>,
    constants: HashSet<String>,
    punctuation: Vec<String>,
    symbols: Vec<char>,
    brackets: Vec<char>,
    word_regex: Regex,
    number_regex: Regex,
    string_delimiter: Option<char>,
    line_comment: Option<String>,
    block_comment: Option<BlockComment>,
}

impl LanguageDefinition {
    pub fn from_rules(rules: LanguageRules) -> Result<Self, HighlightError> {
        let id = LanguageId::from(rules.identifier.clone().unwrap_or_else(|| rules.name.clone()));
        let word_regex = build_anchored_regex(&rules.word_pattern, "word")?;
        let number_regex = build_anchored_regex(&rules.number_pattern, "number")?;

        let mut punctuation: Vec<String> = rules
            .operators
            .into_iter()
            .filter(|operator| !operator.is_empty())
            .collect();
        // Longest first so that multi-character operators win over their prefixes.
        punctuation.sort_by(|a, b| b.len().cmp(&a.len()));

        let block_comment = rules
            .block_comment
            .filter(|(start, end)| !start.is_empty() && !end.is_empty())
            .map(|(start, end)| BlockComment { start, end });

        Ok(Self {
            id,
            display_name: rules.name,
            extensions: rules.extensions,
            keywords: rules.keywords.into_iter().collect(),
            functions: rules.functions.into_iter().collect(),
            constants: rules.constants.into_iter().collect(),
            punctuation,
            symbols: rules.symbols.chars().collect(),
            brackets: rules.brackets.chars().collect(),
            word_regex,
            number_regex,
            string_delimiter: rules.string_delimiter,
            line_comment: rules.line_comment.filter(|marker| !marker.is_empty()),
            block_comment,
        })
    }

    /// Resolves a scanned word: keyword first, then function, then constant.
    pub fn classify_word(&self, word: &str) -> HighlightKind {
        if self.keywords.contains(word) {
            HighlightKind::Keyword
        } else if self.functions.contains(word) {
            HighlightKind::Function
        } else if self.constants.contains(word) {
            HighlightKind::Constant
        } else {
            HighlightKind::Identifier
        }
    }

    /// Highlights a whole document starting from the root state.
    pub fn highlight(&self, input: &str) -> Vec<HighlightToken> {
        self.highlight_from(input, LexState::Root).tokens
    }

    /// Highlights a multi-line document, carrying block-comment state across
    /// lines. Token ranges are byte offsets into `input`.
    pub fn highlight_from(&self, input: &str, state: LexState) -> TokenizedText {
        let mut tokens = Vec::new();
        let mut state = state;
        let mut offset = 0;
        for line in input.split_inclusive('\n') {
            let body = line.strip_suffix('\n').unwrap_or(line);
            let result = self.tokenize_line(body, state);
            tokens.extend(result.tokens.into_iter().map(|token| HighlightToken {
                range: token.range.start + offset..token.range.end + offset,
                kind: token.kind,
            }));
            state = result.end_state;
            offset += line.len();
        }
        TokenizedText {
            tokens,
            end_state: state,
        }
    }

    /// Tokenizes a single line (without its terminator) starting in `state`.
    /// Token ranges are byte offsets into `line`.
    pub fn tokenize_line(&self, line: &str, state: LexState) -> TokenizedText {
        let mut tokens = Vec::new();
        let mut state = state;
        let mut pos = 0;

        while pos < line.len() {
            let rest = &line[pos..];
            let (len, kind, next_state) = match state {
                LexState::Root => self.scan_root(rest),
                LexState::BlockComment { .. } => self.scan_comment(rest, state),
            };
            if let Some(next) = next_state {
                state = next;
            }
            if let Some(kind) = kind {
                push_token(&mut tokens, pos..pos + len, kind);
            }
            pos += len;
        }

        TokenizedText {
            tokens,
            end_state: state,
        }
    }

    fn scan_root(&self, rest: &str) -> (usize, Option<HighlightKind>, Option<LexState>) {
        let Some(first) = rest.chars().next() else {
            return (0, None, None);
        };

        if let Some(found) = self.word_regex.find(rest).filter(|m| m.end() > 0) {
            return (found.end(), Some(self.classify_word(found.as_str())), None);
        }

        if is_whitespace(first) {
            let len = rest
                .find(|ch: char| !is_whitespace(ch))
                .unwrap_or(rest.len());
            return (len, None, None);
        }

        if let Some(block) = &self.block_comment {
            if rest.starts_with(&block.start) {
                return (
                    block.start.len(),
                    Some(HighlightKind::Comment),
                    Some(LexState::Root.push_comment()),
                );
            }
        }

        if let Some(marker) = &self.line_comment {
            if rest.starts_with(marker.as_str()) {
                let len = rest.find('\n').unwrap_or(rest.len());
                return (len, Some(HighlightKind::Comment), None);
            }
        }

        if let Some(found) = self.number_regex.find(rest).filter(|m| m.end() > 0) {
            return (found.end(), Some(HighlightKind::Number), None);
        }

        if self.brackets.contains(&first) {
            return (first.len_utf8(), Some(HighlightKind::Bracket), None);
        }

        if self.symbols.contains(&first) {
            return (first.len_utf8(), Some(HighlightKind::Operator), None);
        }

        if Some(first) == self.string_delimiter {
            let body = &rest[first.len_utf8()..];
            let closing = body
                .find(|ch: char| ch == first || ch == '\n')
                .filter(|index| body[*index..].starts_with(first));
            if let Some(index) = closing {
                let len = first.len_utf8() + index + first.len_utf8();
                return (len, Some(HighlightKind::String), None);
            }
        }

        if let Some(operator) = self
            .punctuation
            .iter()
            .find(|operator| rest.starts_with(operator.as_str()))
        {
            return (operator.len(), Some(HighlightKind::Delimiter), None);
        }

        (first.len_utf8(), None, None)
    }

    fn scan_comment(
        &self,
        rest: &str,
        state: LexState,
    ) -> (usize, Option<HighlightKind>, Option<LexState>) {
        let Some(block) = &self.block_comment else {
            return (rest.len(), Some(HighlightKind::Comment), Some(LexState::Root));
        };

        if rest.starts_with(&block.end) {
            return (
                block.end.len(),
                Some(HighlightKind::Comment),
                Some(state.pop_comment()),
            );
        }
        if rest.starts_with(&block.start) {
            return (
                block.start.len(),
                Some(HighlightKind::Comment),
                Some(state.push_comment()),
            );
        }

        let next_marker = [rest.find(&block.end), rest.find(&block.start)]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(rest.len());
        let len = if next_marker == 0 {
            rest.chars().next().map(char::len_utf8).unwrap_or(rest.len())
        } else {
            next_marker
        };
        (len, Some(HighlightKind::Comment), None)
    }
}

fn is_whitespace(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\r' | '\n')
}

fn push_token(tokens: &mut Vec<HighlightToken>, range: Range<usize>, kind: HighlightKind) {
    if range.is_empty() {
        return;
    }
    if let Some(last) = tokens.last_mut() {
        if last.kind == kind && last.range.end == range.start && kind.merges_with_neighbour() {
            last.range.end = range.end;
            return;
        }
    }
    tokens.push(HighlightToken { range, kind });
}

fn build_anchored_regex(pattern: &str, label: &str) -> Result<Regex, HighlightError> {
    Regex::new(&format!("^(?:{pattern})"))
        .map_err(|err| HighlightError::RegexCompilation(format!("{label} regex: {err}")))
}

#[derive(Default)]
pub struct LanguageRegistry {
    languages: HashMap<String, LanguageDefinition>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        Self {
            languages: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for language in builtin::builtins() {
            registry.register(language);
        }
        registry
    }

    pub fn register(&mut self, language: LanguageDefinition) {
        self.languages
            .insert(language.id.as_ref().to_string(), language);
    }

    /// 編譯並註冊使用者語言規則。 / Compiles and registers user rules,
    /// replacing any language with the same id.
    pub fn register_rules(
        &mut self,
        rules: LanguageRules,
    ) -> Result<&LanguageDefinition, HighlightError> {
        let definition = LanguageDefinition::from_rules(rules)?;
        let key = definition.id.as_ref().to_string();
        self.register(definition);
        self.get(&key)
            .ok_or(HighlightError::LanguageNotRegistered(key))
    }

    pub fn get(&self, id: impl AsRef<str>) -> Option<&LanguageDefinition> {
        self.languages.get(id.as_ref())
    }

    /// Finds the language whose extension list matches `file_name`.
    pub fn for_file_name(&self, file_name: &str) -> Option<&LanguageDefinition> {
        let (_, extension) = file_name.rsplit_once('.')?;
        self.languages.values().find(|language| {
            language
                .extensions
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(extension))
        })
    }

    pub fn highlight(
        &self,
        id: impl AsRef<str>,
        input: &str,
    ) -> Result<Vec<HighlightToken>, HighlightError> {
        let language = self
            .get(id.as_ref())
            .ok_or_else(|| HighlightError::LanguageNotRegistered(id.as_ref().to_string()))?;
        Ok(language.highlight(input))
    }
}

pub mod builtin {
    use once_cell::sync::Lazy;

    use super::*;

    static UPL: Lazy<LanguageDefinition> = Lazy::new(|| {
        LanguageDefinition::from_rules(LanguageRules::upl())
            .expect("built-in UPL rules should compile")
    });

    pub fn builtins() -> Vec<LanguageDefinition> {
        vec![upl().clone()]
    }

    pub fn upl() -> &'static LanguageDefinition {
        &UPL
    }
}
