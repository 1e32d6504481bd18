use serde::{Deserialize, Serialize};

use crate::language::HighlightError;

/// Declarative token rules for a language.
/// （語言的宣告式斷詞規則。）
///
/// The table is pure data; [`crate::LanguageDefinition::from_rules`] compiles it
/// into a tokenizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageRules {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub functions: Vec<String>,
    #[serde(default)]
    pub constants: Vec<String>,
    #[serde(default)]
    pub operators: Vec<String>,
    #[serde(default = "default_symbols")]
    pub symbols: String,
    #[serde(default = "default_brackets")]
    pub brackets: String,
    #[serde(default = "default_word_pattern")]
    pub word_pattern: String,
    #[serde(default = "default_number_pattern")]
    pub number_pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_delimiter: Option<char>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_comment: Option<(String, String)>,
}

fn default_symbols() -> String {
    "<>=+-*/".to_string()
}

fn default_brackets() -> String {
    "{}()[]".to_string()
}

fn default_word_pattern() -> String {
    r"[a-z_$][\w$]*".to_string()
}

fn default_number_pattern() -> String {
    r"\d+".to_string()
}

impl LanguageRules {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier: None,
            extensions: Vec::new(),
            keywords: Vec::new(),
            functions: Vec::new(),
            constants: Vec::new(),
            operators: Vec::new(),
            symbols: default_symbols(),
            brackets: default_brackets(),
            word_pattern: default_word_pattern(),
            number_pattern: default_number_pattern(),
            string_delimiter: None,
            line_comment: None,
            block_comment: None,
        }
    }

    /// 由 JSON 載入規則，未提供的欄位取預設值。 / Loads rules from JSON;
    /// omitted fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, HighlightError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Rules for UPL, the language the studio edits.
    pub fn upl() -> Self {
        Self {
            name: "UPL".into(),
            identifier: Some("upl".into()),
            extensions: vec!["upl".into()],
            keywords: words(&[
                "if", "else", "let", "loop", "save", "exit", "async", "await", "promise", "try",
                "catch",
            ]),
            functions: words(&[
                "print", "add", "multiply", "index", "access", "equals", "lessThan",
            ]),
            constants: words(&["true", "false", "null"]),
            operators: words(&["=", ",", ";", "(", ")", "{", "}", "[", "]", ":"]),
            symbols: default_symbols(),
            brackets: default_brackets(),
            word_pattern: default_word_pattern(),
            number_pattern: default_number_pattern(),
            string_delimiter: Some('"'),
            line_comment: Some("//".into()),
            block_comment: Some(("/*".into(), "*/".into())),
        }
    }
}

fn words(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let rules = LanguageRules::from_json(
            r##"{ "name": "Mini", "keywords": ["do"], "line_comment": "#" }"##,
        )
        .unwrap();
        assert_eq!(rules.keywords, vec!["do"]);
        assert_eq!(rules.line_comment.as_deref(), Some("#"));
        assert_eq!(rules.brackets, "{}()[]");
        assert_eq!(rules.number_pattern, r"\d+");
        assert!(rules.block_comment.is_none());
    }

    #[test]
    fn exported_upl_rules_load_back_unchanged() {
        let exported = LanguageRules::upl().to_json().unwrap();
        assert!(exported.contains("\"lessThan\""));
        assert_eq!(LanguageRules::from_json(&exported).unwrap(), LanguageRules::upl());
    }

    #[test]
    fn malformed_rules_are_a_rules_error() {
        assert!(matches!(
            LanguageRules::from_json(r#"{ "keywords": ["x"] }"#),
            Err(HighlightError::Rules(_))
        ));
    }

    #[test]
    fn upl_keyword_function_and_constant_sets_are_disjoint() {
        let rules = LanguageRules::upl();
        for keyword in &rules.keywords {
            assert!(!rules.functions.contains(keyword));
            assert!(!rules.constants.contains(keyword));
        }
        for function in &rules.functions {
            assert!(!rules.constants.contains(function));
        }
    }
}
