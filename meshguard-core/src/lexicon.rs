//! Lexical classifier
//!
//! Per-language pattern tables score message text for each signal category.
//! Each table implements [`LanguageClassifier`]; [`LexicalClassifier`] picks the
//! table matching a language hint or, without a hint, takes the per-category
//! maximum across every table so a message cannot slip through by being
//! ambiguous about its language.
//!
//! A category score is the noisy-OR of the weights of its matched patterns:
//! `1 - Π(1 - wᵢ)`. Language-independent structural cues (exclamation bursts,
//! shouting, links) are folded in the same way.
//!
//! Everyday words ("ahora", "free", "oferta", "gobierno") and the structural
//! cues carry [`WEAK_CUE`], which stays below the default trigger floor on its
//! own. They only count once another cue in the same category corroborates them.
//!
//! [`quick_check`] is the regex-free pre-check used by the reduced power modes.

use regex::Regex;
use std::sync::LazyLock;

use crate::{Language, SignalCategory, SignalScores};

use SignalCategory::{Impersonation, Scam, Spam, UrgencyAbuse};

/// Weight of a cue too common in honest traffic to trigger by itself
pub const WEAK_CUE: f64 = 0.15;

/// Score added per critical stem found by [`quick_check`]
pub const QUICK_CHECK_STEP: f64 = 0.15;

/// Uniform scoring contract for one language
pub trait LanguageClassifier: Send + Sync {
    fn language(&self) -> Language;

    /// Score already-truncated text; must be a pure function of `text`
    fn score(&self, text: &str) -> SignalScores;
}

/// A weighted pattern for one category
#[derive(Debug)]
struct Pattern {
    category: SignalCategory,
    weight: f64,
    regex: Regex,
}

/// Pattern table for one language
#[derive(Debug)]
pub struct PatternTable {
    language: Language,
    patterns: Vec<Pattern>,
}

impl PatternTable {
    fn compile(language: Language, rules: &[(SignalCategory, f64, &str)]) -> Self {
        let patterns = rules
            .iter()
            .map(|(category, weight, pattern)| Pattern {
                category: *category,
                weight: *weight,
                regex: Regex::new(&format!("(?i){}", pattern)).unwrap(),
            })
            .collect();
        Self { language, patterns }
    }

    /// Number of patterns in the table
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl LanguageClassifier for PatternTable {
    fn language(&self) -> Language {
        self.language
    }

    fn score(&self, text: &str) -> SignalScores {
        let mut misses = [1.0_f64; 4];
        for pattern in self.patterns.iter().filter(|p| p.regex.is_match(text)) {
            let slot = &mut misses[category_slot(pattern.category)];
            *slot *= 1.0 - pattern.weight;
        }
        let mut scores = SignalScores::new();
        for category in SignalCategory::ALL {
            scores.set(category, 1.0 - misses[category_slot(category)]);
        }
        scores
    }
}

fn category_slot(category: SignalCategory) -> usize {
    match category {
        Spam => 0,
        Scam => 1,
        UrgencyAbuse => 2,
        Impersonation => 3,
    }
}

const SPANISH_RULES: &[(SignalCategory, f64, &str)] = &[
    // urgency
    (UrgencyAbuse, 0.6, r"\burgen(te|cia)\b"),
    (UrgencyAbuse, 0.5, r"\binmediata(mente)?\b"),
    (UrgencyAbuse, 0.45, r"\bahora mismo\b"),
    (UrgencyAbuse, WEAK_CUE, r"\bahora\b"),
    (UrgencyAbuse, 0.45, r"\bpeligro\b"),
    (UrgencyAbuse, 0.5, r"\b[uú]ltima oportunidad\b"),
    (UrgencyAbuse, 0.5, r"\bantes de que sea (demasiado )?tarde\b"),
    (UrgencyAbuse, 0.45, r"\bno hay tiempo\b"),
    (UrgencyAbuse, 0.5, r"\brend(irse|irte|irnos|anse)\b"),
    (UrgencyAbuse, 0.35, r"\b(la )?[uú]nica opci[oó]n\b"),
    (UrgencyAbuse, 0.3, r"\bya perdieron\b"),
    // scam
    (Scam, 0.6, r"\bentreg(a|ar|ue|uen)\s+(todo|toda|todos|la cosecha|el ma[ií]z|las semillas|el ganado)\b"),
    (Scam, 0.6, r"\b(env[ií]a|envi[ae]n|deposit[ae]n?|transfier[ae]n?|paga|pague)\b[^.]{0,30}\b(pago|dinero|anticipo|adelanto|cuota|efectivo)\b"),
    (Scam, 0.5, r"\bpago (por )?adelantado\b"),
    (Scam, 0.55, r"\bganancias? garantizadas?\b"),
    (Scam, 0.55, r"\bdoble (de )?(tu|su) (dinero|inversi[oó]n)\b"),
    (Scam, 0.45, r"\b(has ganado|ganaste|premio)\b"),
    (Scam, 0.5, r"\b(c[oó]digo de verificaci[oó]n|contrase[ñn]a|clave secreta)\b"),
    (Scam, 0.45, r"\bsolo yo (te|los) protejo\b"),
    (Scam, 0.45, r"\bno conf[ií](es|en) en nadie\b"),
    (Scam, 0.4, r"\blos dem[aá]s mienten\b"),
    // impersonation
    (Impersonation, 0.45, r"\blas autoridades\b"),
    (Impersonation, 0.65, r"\bsoy (de|del) (la )?(cooperativa|gobierno|ministerio|banco|polic[ií]a)\b"),
    (Impersonation, 0.45, r"\b(mensaje|aviso|comunicado) oficial\b"),
    (Impersonation, WEAK_CUE, r"\b(gobierno|ministerio)\b"),
    (Impersonation, 0.5, r"\b(administrador de la red|soporte t[eé]cnico)\b"),
    (Impersonation, 0.4, r"\bobedec(e|er|an)\b"),
    (Impersonation, 0.5, r"\bverific(a|ar|ue) (tu|su) cuenta\b"),
    // spam
    (Spam, WEAK_CUE, r"\bofertas?\b"),
    (Spam, WEAK_CUE, r"\bgratis\b"),
    (Spam, WEAK_CUE, r"\bpromoci[oó]n\b"),
    (Spam, 0.45, r"\bha(z|ga) clic\b"),
    (Spam, WEAK_CUE, r"\bdescuentos?\b"),
    (Spam, 0.45, r"\bcompra ya\b"),
    (Spam, WEAK_CUE, r"\bsuscr[ií]b(e|ete)\b"),
    (Spam, 0.45, r"\bgana dinero\b"),
];

const ENGLISH_RULES: &[(SignalCategory, f64, &str)] = &[
    // urgency
    (UrgencyAbuse, 0.6, r"\burgent(ly)?\b"),
    (UrgencyAbuse, 0.5, r"\bimmediately\b"),
    (UrgencyAbuse, 0.45, r"\bright now\b"),
    (UrgencyAbuse, WEAK_CUE, r"\bnow\b"),
    (UrgencyAbuse, 0.45, r"\bdanger\b"),
    (UrgencyAbuse, 0.5, r"\blast chance\b"),
    (UrgencyAbuse, 0.5, r"\bbefore it'?s too late\b"),
    (UrgencyAbuse, 0.45, r"\bno time (left|to lose)\b"),
    (UrgencyAbuse, 0.5, r"\bsurrender\b"),
    (UrgencyAbuse, 0.35, r"\b(the )?only option\b"),
    (UrgencyAbuse, 0.4, r"\bact fast\b"),
    // scam
    (Scam, 0.6, r"\b(hand over|deliver|give up)\s+(everything|all|the harvest|your (crops|seeds|cattle|grain))\b"),
    (Scam, 0.6, r"\b(send|wire|transfer|deposit|pay)\b[^.]{0,30}\b(payment|money|deposit|fee|cash|advance)\b"),
    (Scam, 0.5, r"\b(advance|upfront) (payment|fee)\b"),
    (Scam, 0.55, r"\bguaranteed (profit|returns?|income)\b"),
    (Scam, 0.55, r"\bdouble your (money|investment)\b"),
    (Scam, 0.45, r"\b(you('ve| have) won|prize|winner)\b"),
    (Scam, 0.5, r"\b(verification code|password|secret key|pin code)\b"),
    (Scam, 0.45, r"\bonly i can protect you\b"),
    (Scam, 0.45, r"\b(don'?t|do not) trust anyone\b"),
    (Scam, 0.4, r"\b(the )?others are lying\b"),
    // impersonation
    (Impersonation, 0.45, r"\bthe authorities\b"),
    (Impersonation, 0.65, r"\b(i am|i'm|this is) (from )?(the )?(cooperative|government|ministry|bank|police)\b"),
    (Impersonation, 0.45, r"\bofficial (message|notice|announcement)\b"),
    (Impersonation, WEAK_CUE, r"\b(government|ministry)\b"),
    (Impersonation, 0.5, r"\b(network administrator|tech(nical)? support)\b"),
    (Impersonation, 0.4, r"\bobey\b"),
    (Impersonation, 0.5, r"\bverify your account\b"),
    // spam
    (Spam, WEAK_CUE, r"\b(special )?offers?\b"),
    (Spam, WEAK_CUE, r"\bfree\b"),
    (Spam, WEAK_CUE, r"\bpromotion\b"),
    (Spam, 0.45, r"\bclick here\b"),
    (Spam, WEAK_CUE, r"\bdiscounts?\b"),
    (Spam, 0.45, r"\bbuy now\b"),
    (Spam, WEAK_CUE, r"\bsubscribe\b"),
    (Spam, 0.45, r"\bmake money\b"),
];

const PORTUGUESE_RULES: &[(SignalCategory, f64, &str)] = &[
    // urgency
    (UrgencyAbuse, 0.6, r"\burgent(e|emente)\b"),
    (UrgencyAbuse, 0.5, r"\bimediata(mente)?\b"),
    (UrgencyAbuse, 0.45, r"\bagora mesmo\b"),
    (UrgencyAbuse, WEAK_CUE, r"\bagora\b"),
    (UrgencyAbuse, 0.45, r"\bperigo\b"),
    (UrgencyAbuse, 0.5, r"\b[uú]ltima chance\b"),
    (UrgencyAbuse, 0.5, r"\bantes que seja (tarde|tarde demais)\b"),
    (UrgencyAbuse, 0.45, r"\bn[aã]o h[aá] tempo\b"),
    (UrgencyAbuse, 0.5, r"\brender(-se)?\b"),
    (UrgencyAbuse, 0.35, r"\b(a )?[uú]nica op[cç][aã]o\b"),
    // scam
    (Scam, 0.6, r"\bentreg(a|ar|ue|uem)\s+(tudo|toda|a colheita|o milho|as sementes|o gado)\b"),
    (Scam, 0.6, r"\b(envie|envia|deposite|transfira|pague|paga)\b[^.]{0,30}\b(pagamento|dinheiro|adiantamento|taxa|pix)\b"),
    (Scam, 0.5, r"\bpagamento antecipado\b"),
    (Scam, 0.55, r"\blucros? garantidos?\b"),
    (Scam, 0.55, r"\bdobr(e|ar) (seu|o) (dinheiro|investimento)\b"),
    (Scam, 0.45, r"\b(voc[eê] ganhou|pr[eê]mio)\b"),
    (Scam, 0.5, r"\b(c[oó]digo de verifica[cç][aã]o|senha)\b"),
    (Scam, 0.45, r"\bs[oó] eu (te|os) protejo\b"),
    (Scam, 0.45, r"\bn[aã]o confie em ningu[eé]m\b"),
    (Scam, 0.4, r"\bos outros mentem\b"),
    // impersonation
    (Impersonation, 0.45, r"\bas autoridades\b"),
    (Impersonation, 0.65, r"\bsou (da|do) (cooperativa|governo|minist[eé]rio|banco|pol[ií]cia)\b"),
    (Impersonation, 0.45, r"\b(mensagem|aviso|comunicado) oficial\b"),
    (Impersonation, WEAK_CUE, r"\b(governo|minist[eé]rio)\b"),
    (Impersonation, 0.5, r"\b(administrador da rede|suporte t[eé]cnico)\b"),
    (Impersonation, 0.4, r"\bobede[cç](a|er|am)\b"),
    (Impersonation, 0.5, r"\bverifi(que|car) (sua|a) conta\b"),
    // spam
    (Spam, WEAK_CUE, r"\bofertas?\b"),
    (Spam, WEAK_CUE, r"\bgr[aá]tis\b"),
    (Spam, WEAK_CUE, r"\bpromo[cç][aã]o\b"),
    (Spam, 0.45, r"\bclique aqui\b"),
    (Spam, WEAK_CUE, r"\bdescontos?\b"),
    (Spam, 0.45, r"\bcompre j[aá]\b"),
    (Spam, WEAK_CUE, r"\binscreva-se\b"),
    (Spam, 0.45, r"\bganhe dinheiro\b"),
];

static SPANISH: LazyLock<PatternTable> =
    LazyLock::new(|| PatternTable::compile(Language::Spanish, SPANISH_RULES));

static ENGLISH: LazyLock<PatternTable> =
    LazyLock::new(|| PatternTable::compile(Language::English, ENGLISH_RULES));

static PORTUGUESE: LazyLock<PatternTable> =
    LazyLock::new(|| PatternTable::compile(Language::Portuguese, PORTUGUESE_RULES));

static EXCLAMATION_BURST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[!¡]{2,}").unwrap());

static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(https?://|www\.)\S+").unwrap());

/// Built-in table for a language
pub fn builtin_table(language: Language) -> &'static PatternTable {
    match language {
        Language::Spanish => &*SPANISH,
        Language::English => &*ENGLISH,
        Language::Portuguese => &*PORTUGUESE,
    }
}

impl LanguageClassifier for &'static PatternTable {
    fn language(&self) -> Language {
        (**self).language()
    }

    fn score(&self, text: &str) -> SignalScores {
        (**self).score(text)
    }
}

/// Multi-language classifier with a text length bound
pub struct LexicalClassifier {
    tables: Vec<Box<dyn LanguageClassifier>>,
    max_text_len: usize,
}

impl LexicalClassifier {
    /// Classifier over the built-in Spanish, English and Portuguese tables
    pub fn new(max_text_len: usize) -> Self {
        let tables = Language::ALL
            .into_iter()
            .map(|lang| Box::new(builtin_table(lang)) as Box<dyn LanguageClassifier>)
            .collect();
        Self {
            tables,
            max_text_len: max_text_len.max(1),
        }
    }

    /// Add a table, replacing any existing table for the same language
    pub fn register(&mut self, table: Box<dyn LanguageClassifier>) {
        self.tables.retain(|t| t.language() != table.language());
        self.tables.push(table);
    }

    pub fn languages(&self) -> Vec<Language> {
        self.tables.iter().map(|t| t.language()).collect()
    }

    pub fn max_text_len(&self) -> usize {
        self.max_text_len
    }

    /// Quick check over the same truncated text `score` would see
    pub fn quick_check(&self, text: &str) -> QuickCheck {
        quick_check(truncate_chars(text, self.max_text_len))
    }

    /// Score text. Oversized text is truncated, never rejected.
    pub fn score(&self, text: &str, hint: Option<Language>) -> SignalScores {
        if text.trim().is_empty() {
            return SignalScores::new();
        }
        let text = truncate_chars(text, self.max_text_len);

        let hinted: Vec<&dyn LanguageClassifier> = match hint {
            Some(lang) => self
                .tables
                .iter()
                .filter(|t| t.language() == lang)
                .map(|t| t.as_ref())
                .collect(),
            None => Vec::new(),
        };
        let tables: Vec<&dyn LanguageClassifier> = if hinted.is_empty() {
            self.tables.iter().map(|t| t.as_ref()).collect()
        } else {
            hinted
        };

        let lexical = tables
            .iter()
            .map(|t| t.score(text))
            .fold(SignalScores::new(), |acc, s| acc.max_merge(&s));

        combine(&lexical, &structural_cues(text))
    }
}

impl Default for LexicalClassifier {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Language-independent cues
fn structural_cues(text: &str) -> SignalScores {
    let mut cues = SignalScores::new();

    if EXCLAMATION_BURST.is_match(text) {
        cues.set(UrgencyAbuse, WEAK_CUE);
    }

    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() >= 8 {
        let upper = letters.iter().filter(|c| c.is_uppercase()).count();
        if upper as f64 / letters.len() as f64 >= 0.6 {
            let current = cues.get(UrgencyAbuse);
            cues.set(UrgencyAbuse, 1.0 - (1.0 - current) * (1.0 - WEAK_CUE));
        }
    }

    if LINK.is_match(text) {
        cues.set(Spam, WEAK_CUE);
    }

    cues
}

/// Noisy-OR of two score sets
fn combine(a: &SignalScores, b: &SignalScores) -> SignalScores {
    let mut out = SignalScores::new();
    for category in SignalCategory::ALL {
        out.set(category, 1.0 - (1.0 - a.get(category)) * (1.0 - b.get(category)));
    }
    out
}

/// Word stems checked by the quick check, across all languages
const CRITICAL_STEMS: &[&str] = &[
    // pressure
    "urgent",
    "inmediat",
    "immediat",
    "imediat",
    "peligr",
    "danger",
    "perig",
    // authority and obedience
    "autoridad",
    "authorit",
    "obedec",
    "obey",
    "rendirse",
    "surrender",
    // hand-over and money
    "entreg",
    "deliver",
    "pago",
    "pague",
    "payment",
    "pagament",
    "garantiz",
    "guarante",
    "garantid",
];

/// Outcome of the quick check
#[derive(Debug, Clone, PartialEq)]
pub struct QuickCheck {
    /// `QUICK_CHECK_STEP` per distinct stem, capped at 1
    pub score: f64,
    pub stems: Vec<&'static str>,
}

/// Keyword-only pre-check: lowercase words are matched against critical
/// stems by prefix. No regex runs.
pub fn quick_check(text: &str) -> QuickCheck {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let stems: Vec<&'static str> = CRITICAL_STEMS
        .iter()
        .copied()
        .filter(|stem| words.iter().any(|w| w.starts_with(stem)))
        .collect();

    QuickCheck {
        score: (stems.len() as f64 * QUICK_CHECK_STEP).min(1.0),
        stems,
    }
}

/// Longest prefix of at most `max` characters
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
