//! Rule definitions and their compiled matchers

use std::sync::OnceLock;

use regex::Regex;
use switchboard_core::Severity;
use tiktoken_rs::CoreBPE;

use crate::error::PolicyError;

/// A single policy rule
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum Rule {
    /// Case-insensitive substring match against a keyword list
    KeywordBlocklist {
        /// Rule name reported in blocks
        name: String,
        /// Keywords to match against
        keywords: Vec<String>,
        /// Severity when matched
        #[serde(default)]
        severity: Severity,
    },
    /// Regex pattern match
    RegexPattern {
        /// Rule name reported in blocks
        name: String,
        /// Regex pattern to match
        pattern: String,
        /// Severity when matched
        #[serde(default)]
        severity: Severity,
    },
    /// Token count ceiling, counted with the `o200k_base` encoding
    MaxTokens {
        /// Rule name reported in blocks
        name: String,
        /// Maximum token count
        limit: usize,
        /// Severity when exceeded
        #[serde(default)]
        severity: Severity,
    },
    /// Personal data detectors
    Pii {
        /// Rule name reported in blocks
        name: String,
        /// Detectors to run
        #[serde(default = "default_pii_types")]
        detect: Vec<PiiType>,
        /// Severity when detected
        #[serde(default)]
        severity: Severity,
    },
}

impl Rule {
    /// Configured rule name
    pub fn name(&self) -> &str {
        match self {
            Self::KeywordBlocklist { name, .. }
            | Self::RegexPattern { name, .. }
            | Self::MaxTokens { name, .. }
            | Self::Pii { name, .. } => name,
        }
    }
}

/// Kinds of personal data the `pii` rule can detect
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiType {
    /// Brazilian individual taxpayer id (000.000.000-00)
    Cpf,
    /// Brazilian company taxpayer id (00.000.000/0000-00)
    Cnpj,
    /// US Social Security numbers (XXX-XX-XXXX)
    Ssn,
    /// Credit card numbers (13-19 digit sequences)
    CreditCard,
    /// Email addresses
    Email,
    /// Phone numbers
    Phone,
}

fn default_pii_types() -> Vec<PiiType> {
    vec![PiiType::Cpf]
}

/// A rule with pre-compiled patterns
pub(crate) struct CompiledRule {
    pub(crate) name: String,
    pub(crate) severity: Severity,
    matcher: RuleMatcher,
}

enum RuleMatcher {
    Keywords(Vec<String>),
    Regex(Regex),
    MaxTokens(usize),
    Pii(Vec<PiiType>),
}

impl CompiledRule {
    /// Compile a configured rule
    pub(crate) fn compile(rule: &Rule) -> Result<Self, PolicyError> {
        let (severity, matcher) = match rule {
            Rule::KeywordBlocklist { keywords, severity, .. } => (
                *severity,
                RuleMatcher::Keywords(keywords.iter().map(|k| k.to_lowercase()).collect()),
            ),
            Rule::RegexPattern { pattern, severity, .. } => {
                let compiled =
                    Regex::new(pattern).map_err(|e| PolicyError::InvalidPattern(format!("{pattern}: {e}")))?;
                (*severity, RuleMatcher::Regex(compiled))
            }
            Rule::MaxTokens { limit, severity, .. } => (*severity, RuleMatcher::MaxTokens(*limit)),
            Rule::Pii { detect, severity, .. } => (*severity, RuleMatcher::Pii(detect.clone())),
        };

        Ok(Self {
            name: rule.name().to_owned(),
            severity,
            matcher,
        })
    }

    /// Evaluate the rule, returning a human-readable reason on match
    pub(crate) fn evaluate(&self, original: &str, lowered: &str) -> Result<Option<String>, PolicyError> {
        let reason = match &self.matcher {
            RuleMatcher::Keywords(keywords) => keywords
                .iter()
                .find(|keyword| lowered.contains(keyword.as_str()))
                .map(|keyword| format!("matched keyword: {keyword}")),
            RuleMatcher::Regex(pattern) => pattern
                .is_match(original)
                .then(|| format!("matched pattern: {}", pattern.as_str())),
            RuleMatcher::MaxTokens(limit) => {
                let bpe = tokenizer().map_err(|reason| PolicyError::Evaluation {
                    rule: self.name.clone(),
                    reason: reason.to_owned(),
                })?;
                let tokens = bpe.encode_with_special_tokens(original).len();
                (tokens > *limit).then(|| format!("{tokens} tokens exceeds limit of {limit}"))
            }
            RuleMatcher::Pii(detectors) => detectors
                .iter()
                .find(|pii_type| pii_regex(**pii_type).is_match(original))
                .map(|pii_type| format!("detected {pii_type:?} pattern")),
        };

        Ok(reason)
    }
}

/// Shared tokenizer, loaded on first use
fn tokenizer() -> Result<&'static CoreBPE, &'static str> {
    static BPE: OnceLock<Result<CoreBPE, String>> = OnceLock::new();
    BPE.get_or_init(|| tiktoken_rs::o200k_base().map_err(|e| format!("failed to load tokenizer: {e}")))
        .as_ref()
        .map_err(String::as_str)
}

fn pii_regex(pii_type: PiiType) -> &'static Regex {
    match pii_type {
        PiiType::Cpf => cpf_regex(),
        PiiType::Cnpj => cnpj_regex(),
        PiiType::Ssn => ssn_regex(),
        PiiType::CreditCard => credit_card_regex(),
        PiiType::Email => email_regex(),
        PiiType::Phone => phone_regex(),
    }
}

fn cpf_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{3}\.\d{3}\.\d{3}-\d{2}\b").expect("valid CPF regex"))
}

fn cnpj_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{2}\.\d{3}\.\d{3}/\d{4}-\d{2}\b").expect("valid CNPJ regex"))
}

fn ssn_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("valid SSN regex"))
}

fn credit_card_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:\d[ -]*?){13,19}\b").expect("valid credit card regex"))
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("valid email regex")
    })
}

fn phone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?:\+55\s?)?\(?\b\d{2}\)?\s?9?\d{4}-\d{4}\b",
            r"|\b(?:\+?1[-.\s]?)?\(?[2-9]\d{2}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b",
        ))
        .expect("valid phone regex")
    })
}
